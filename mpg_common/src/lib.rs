mod currency;
mod money;
mod secret;

pub use currency::{Currency, UnknownCurrencyError, USD_CURRENCY_CODE};
pub use money::{Money, MoneyConversionError, Rate};
pub use secret::Secret;
