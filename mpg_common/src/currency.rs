use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const USD_CURRENCY_CODE: &str = "USD";

/// The static currency registry: every currency the platform settles in, with its display scale.
///
/// The scale is only used at display boundaries; ledger arithmetic keeps full precision. Zero-decimal fiat
/// currencies (JPY, KRW, IDR, VND) are treated as integer minor units for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    CNY,
    INR,
    BRL,
    NGN,
    JPY,
    KRW,
    IDR,
    VND,
    USDT,
    BTC,
    ETH,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unsupported currency code: {0}")]
pub struct UnknownCurrencyError(pub String);

impl Currency {
    /// Number of fractional digits shown for this currency.
    pub fn scale(&self) -> u32 {
        use Currency::*;
        match self {
            JPY | KRW | IDR | VND => 0,
            USD | EUR | GBP | CNY | INR | BRL | NGN => 2,
            USDT => 6,
            BTC => 8,
            ETH => 18,
        }
    }

    pub fn code(&self) -> &'static str {
        use Currency::*;
        match self {
            USD => "USD",
            EUR => "EUR",
            GBP => "GBP",
            CNY => "CNY",
            INR => "INR",
            BRL => "BRL",
            NGN => "NGN",
            JPY => "JPY",
            KRW => "KRW",
            IDR => "IDR",
            VND => "VND",
            USDT => "USDT",
            BTC => "BTC",
            ETH => "ETH",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, UnknownCurrencyError> {
        use Currency::*;
        match code.to_ascii_uppercase().as_str() {
            "USD" => Ok(USD),
            "EUR" => Ok(EUR),
            "GBP" => Ok(GBP),
            "CNY" => Ok(CNY),
            "INR" => Ok(INR),
            "BRL" => Ok(BRL),
            "NGN" => Ok(NGN),
            "JPY" => Ok(JPY),
            "KRW" => Ok(KRW),
            "IDR" => Ok(IDR),
            "VND" => Ok(VND),
            "USDT" => Ok(USDT),
            "BTC" => Ok(BTC),
            "ETH" => Ok(ETH),
            other => Err(UnknownCurrencyError(other.to_string())),
        }
    }
}

impl FromStr for Currency {
    type Err = UnknownCurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::from_code(s)
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_scales() {
        assert_eq!(Currency::JPY.scale(), 0);
        assert_eq!(Currency::USD.scale(), 2);
        assert_eq!(Currency::USDT.scale(), 6);
        assert_eq!(Currency::BTC.scale(), 8);
        assert_eq!(Currency::ETH.scale(), 18);
    }

    #[test]
    fn codes_round_trip() {
        for ccy in [Currency::USD, Currency::VND, Currency::ETH] {
            assert_eq!(Currency::from_code(ccy.code()).unwrap(), ccy);
        }
        assert_eq!(Currency::from_code("usdt").unwrap(), Currency::USDT);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let err = Currency::from_code("DOGE").unwrap_err();
        assert_eq!(err, UnknownCurrencyError("DOGE".to_string()));
    }
}
