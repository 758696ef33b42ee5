//! Database-facing data types for the Meridian payment engine.
//!
//! All transaction flavours (payin, payout, refund, deposit, withdraw) share one [`Transaction`] record
//! discriminated by [`TrxType`]; there is deliberately no table-per-type split.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mpg_common::{Money, Rate, Secret};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => f.write_str($label)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(ConversionError(stringify!($name), other.to_string())),
                }
            }
        }
    };
}

//--------------------------------------      UserType      ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Merchant,
    Cashier,
    CashierTeam,
    Bank,
}

string_enum!(UserType {
    Merchant => "merchant",
    Cashier => "cashier",
    CashierTeam => "cashier_team",
    Bank => "bank",
});

//--------------------------------------   AccountStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Disabled,
}

string_enum!(AccountStatus { Active => "active", Suspended => "suspended", Disabled => "disabled" });

//--------------------------------------      FlowType      ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Income,
    Expense,
    Freeze,
    Unfreeze,
    Margin,
    ReleaseMargin,
}

string_enum!(FlowType {
    Income => "income",
    Expense => "expense",
    Freeze => "freeze",
    Unfreeze => "unfreeze",
    Margin => "margin",
    ReleaseMargin => "release_margin",
});

//--------------------------------------  BalanceOperation  ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BalanceOperation {
    Add,
    Subtract,
    Freeze,
    Unfreeze,
    Margin,
    ReleaseMargin,
}

string_enum!(BalanceOperation {
    Add => "add",
    Subtract => "subtract",
    Freeze => "freeze",
    Unfreeze => "unfreeze",
    Margin => "margin",
    ReleaseMargin => "release_margin",
});

impl BalanceOperation {
    /// The journal entry type a successful application of this operation produces.
    pub fn flow_type(&self) -> FlowType {
        match self {
            BalanceOperation::Add => FlowType::Income,
            BalanceOperation::Subtract => FlowType::Expense,
            BalanceOperation::Freeze => FlowType::Freeze,
            BalanceOperation::Unfreeze => FlowType::Unfreeze,
            BalanceOperation::Margin => FlowType::Margin,
            BalanceOperation::ReleaseMargin => FlowType::ReleaseMargin,
        }
    }
}

//--------------------------------------    BusinessType    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Deposit,
    Withdraw,
    /// Settlement-cycle postings carry their own label so they are distinguishable from generic deposits in the
    /// flow journal.
    Settle,
    Adjust,
}

string_enum!(BusinessType { Deposit => "deposit", Withdraw => "withdraw", Settle => "settle", Adjust => "adjust" });

//--------------------------------------      TrxType       ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrxType {
    Payin,
    Payout,
    Refund,
    Deposit,
    Withdraw,
}

string_enum!(TrxType {
    Payin => "payin",
    Payout => "payout",
    Refund => "refund",
    Deposit => "deposit",
    Withdraw => "withdraw",
});

//--------------------------------------      TrxStatus     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrxStatus {
    Pending,
    Processing,
    Confirming,
    Success,
    Failed,
    Cancelled,
    Expired,
}

string_enum!(TrxStatus {
    Pending => "pending",
    Processing => "processing",
    Confirming => "confirming",
    Success => "success",
    Failed => "failed",
    Cancelled => "cancelled",
    Expired => "expired",
});

impl TrxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrxStatus::Success | TrxStatus::Failed | TrxStatus::Cancelled | TrxStatus::Expired)
    }
}

//--------------------------------------    SettleStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SettleStatus {
    Pending,
    Success,
}

string_enum!(SettleStatus { Pending => "pending", Success => "success" });

//--------------------------------------     PeriodType     ----------------------------------------------------------
/// Settlement cadence. `T+N` settles N days after the transaction day, `W+1` the following ISO week,
/// `M+1` the following calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PeriodType {
    #[sqlx(rename = "T+0")]
    #[serde(rename = "T+0")]
    T0,
    #[sqlx(rename = "T+1")]
    #[serde(rename = "T+1")]
    T1,
    #[sqlx(rename = "T+2")]
    #[serde(rename = "T+2")]
    T2,
    #[sqlx(rename = "T+3")]
    #[serde(rename = "T+3")]
    T3,
    #[sqlx(rename = "W+1")]
    #[serde(rename = "W+1")]
    W1,
    #[sqlx(rename = "M+1")]
    #[serde(rename = "M+1")]
    M1,
}

string_enum!(PeriodType { T0 => "T+0", T1 => "T+1", T2 => "T+2", T3 => "T+3", W1 => "W+1", M1 => "M+1" });

impl PeriodType {
    /// For `T+N` cadences, the day offset between the transaction day and the settle day.
    pub fn day_offset(&self) -> Option<i64> {
        match self {
            PeriodType::T0 => Some(0),
            PeriodType::T1 => Some(1),
            PeriodType::T2 => Some(2),
            PeriodType::T3 => Some(3),
            _ => None,
        }
    }
}

//--------------------------------------   RouteStrategy    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// The caller may try the returned accounts in order until one succeeds.
    All,
    /// The caller must succeed on the first account or surface the failure.
    Once,
}

string_enum!(RouteStrategy { All => "all", Once => "once" });

//--------------------------------------     TaskStatus     ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Disabled,
}

string_enum!(TaskStatus { Active => "active", Disabled => "disabled" });

//--------------------------------------       TrxId        ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TrxId(pub String);

impl FromStr for TrxId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TrxId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for TrxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TrxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      SettleId      ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct SettleId(pub String);

impl From<String> for SettleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SettleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for SettleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SettleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      Account       ----------------------------------------------------------
/// A ledger account for one `(user_id, user_type, currency)` triple.
///
/// The five balance buckets satisfy `total = available + frozen + margin + reserve` between transactions, and each
/// bucket is non-negative. `version` increases by one on every mutation.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub account_id: String,
    pub user_id: String,
    pub user_type: UserType,
    pub currency: String,
    pub total: Money,
    pub available: Money,
    pub frozen: Money,
    pub margin: Money,
    pub reserve: Money,
    pub version: i64,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Account {
    /// Checks the at-rest asset invariants.
    pub fn invariants_hold(&self) -> bool {
        self.total == self.available + self.frozen + self.margin + self.reserve
            && !self.total.is_negative()
            && !self.available.is_negative()
            && !self.frozen.is_negative()
            && !self.margin.is_negative()
            && !self.reserve.is_negative()
    }
}

//--------------------------------------      FundFlow      ----------------------------------------------------------
/// One journal entry. Every successful account mutation emits exactly one of these; `after_balance` always equals
/// the account's `total` immediately after the mutation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FundFlow {
    pub id: i64,
    pub flow_no: String,
    pub user_id: String,
    pub user_type: UserType,
    pub account_id: String,
    pub transaction_id: Option<String>,
    pub bill_id: Option<String>,
    pub flow_type: FlowType,
    pub amount: Money,
    pub currency: String,
    pub before_balance: Money,
    pub after_balance: Money,
    pub business_type: BusinessType,
    pub description: Option<String>,
    pub flow_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFundFlow {
    pub flow_no: String,
    pub user_id: String,
    pub user_type: UserType,
    pub account_id: String,
    pub transaction_id: Option<String>,
    pub bill_id: Option<String>,
    pub flow_type: FlowType,
    pub amount: Money,
    pub currency: String,
    pub before_balance: Money,
    pub after_balance: Money,
    pub business_type: BusinessType,
    pub description: Option<String>,
}

//--------------------------------------     Transaction    ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub trx_id: TrxId,
    pub merchant_id: String,
    pub req_id: String,
    pub trx_type: TrxType,
    pub currency: String,
    pub amount: Money,
    pub usd_amount: Money,
    pub trx_method: Option<String>,
    pub trx_mode: Option<String>,
    pub country: Option<String>,
    pub status: TrxStatus,
    pub settle_status: SettleStatus,
    pub settle_id: Option<SettleId>,
    pub channel_account_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub trx_id: TrxId,
    pub merchant_id: String,
    pub req_id: String,
    pub trx_type: TrxType,
    pub currency: String,
    pub amount: Money,
    pub usd_amount: Money,
    pub trx_method: Option<String>,
    pub trx_mode: Option<String>,
    pub country: Option<String>,
}

impl NewTransaction {
    pub fn new(trx_id: TrxId, merchant_id: &str, req_id: &str, trx_type: TrxType, currency: &str, amount: Money) -> Self {
        Self {
            trx_id,
            merchant_id: merchant_id.to_string(),
            req_id: req_id.to_string(),
            trx_type,
            currency: currency.to_string(),
            amount,
            usd_amount: Money::zero(),
            trx_method: None,
            trx_mode: None,
            country: None,
        }
    }

    pub fn with_usd_amount(mut self, usd_amount: Money) -> Self {
        self.usd_amount = usd_amount;
        self
    }
}

//--------------------------------------     RouterRule     ----------------------------------------------------------
/// One routing rule for `(merchant_id, trx_type)`. Empty string filters are wildcards; exactly one of the three
/// targets (`channel_account_id`, `channel_code`, `channel_group_id`) should be set.
#[derive(Debug, Clone, FromRow)]
pub struct RouterRule {
    pub id: i64,
    pub merchant_id: String,
    pub trx_type: TrxType,
    pub priority: i64,
    pub currency: Option<String>,
    pub trx_method: Option<String>,
    pub trx_mode: Option<String>,
    pub trx_app: Option<String>,
    pub device_id: Option<String>,
    pub package: Option<String>,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub channel_account_id: Option<String>,
    pub channel_code: Option<String>,
    pub channel_group_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   ChannelAccount   ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct ChannelAccount {
    pub id: i64,
    pub channel_account_id: String,
    pub merchant_id: Option<String>,
    pub channel_code: String,
    pub currency: Option<String>,
    pub single_min: Option<Money>,
    pub single_max: Option<Money>,
    pub daily_limit: Option<Money>,
    pub credential: Option<Secret<String>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    ChannelGroup    ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct ChannelGroup {
    pub id: i64,
    pub group_id: String,
    pub strategy: RouteStrategy,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChannelGroupMember {
    pub id: i64,
    pub group_id: String,
    pub channel_account_id: String,
    pub sort_order: i64,
}

//--------------------------------------      Contract      ----------------------------------------------------------
/// A merchant's settlement contract for one transaction type, valid over `[effective_from, effective_to)`.
/// `strategy_codes` is a JSON array of strategy codes in evaluation order.
#[derive(Debug, Clone, FromRow)]
pub struct Contract {
    pub id: i64,
    pub merchant_id: String,
    pub trx_type: TrxType,
    pub period_type: PeriodType,
    pub settle_ccy: String,
    pub strategy_codes: String,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn strategy_code_list(&self) -> Vec<String> {
        serde_json::from_str(&self.strategy_codes).unwrap_or_default()
    }
}

//--------------------------------------   SettleStrategy   ----------------------------------------------------------
/// A tariff sheet. A strategy matches a transaction when every set filter agrees; its rules are then scanned
/// in `sort_order` for the priced row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SettleStrategy {
    pub id: i64,
    pub strategy_code: String,
    pub merchant_id: String,
    pub period_type: PeriodType,
    pub settle_ccy: Option<String>,
    pub trx_type: Option<TrxType>,
    pub trx_mode: Option<String>,
    pub trx_method: Option<String>,
    pub country: Option<String>,
    pub trx_ccy: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     SettleRule     ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SettleRule {
    pub id: i64,
    pub strategy_code: String,
    pub sort_order: i64,
    pub trx_type: Option<TrxType>,
    pub trx_mode: Option<String>,
    pub trx_method: Option<String>,
    pub country: Option<String>,
    pub trx_ccy: Option<String>,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub rate: Option<Rate>,
    pub fixed_fee: Option<Money>,
    pub usd_rate: Option<Rate>,
    pub fixed_usd_fee: Option<Money>,
    pub min_fee: Option<Money>,
    pub max_fee: Option<Money>,
    pub min_usd_fee: Option<Money>,
    pub max_usd_fee: Option<Money>,
}

/// A strategy together with its priced rules, loaded in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedStrategy {
    pub strategy: SettleStrategy,
    pub rules: Vec<SettleRule>,
}

//--------------------------------------   MerchantSettle   ----------------------------------------------------------
/// The aggregate settlement record for one `(merchant_id, period_type, period)` cycle.
#[derive(Debug, Clone, FromRow)]
pub struct MerchantSettle {
    pub id: i64,
    pub settle_id: SettleId,
    pub merchant_id: String,
    pub trx_type: TrxType,
    pub period_type: PeriodType,
    pub period: i64,
    pub settle_ccy: String,
    pub settle_amount: Money,
    pub settle_usd_amount: Money,
    pub trx_start_at: DateTime<Utc>,
    pub trx_end_at: DateTime<Utc>,
    pub strategy_codes: String,
    pub mature_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantSettle {
    pub fn strategy_code_list(&self) -> Vec<String> {
        serde_json::from_str(&self.strategy_codes).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NewSettleCycle {
    pub settle_id: SettleId,
    pub merchant_id: String,
    pub trx_type: TrxType,
    pub period_type: PeriodType,
    pub period: i64,
    pub settle_ccy: String,
    pub trx_start_at: DateTime<Utc>,
    pub trx_end_at: DateTime<Utc>,
    pub strategy_codes: Vec<String>,
    pub mature_at: DateTime<Utc>,
}

//---------------------------------- MerchantSettleTransaction -------------------------------------------------------
/// The per-transaction settlement record, carrying the computed amounts and snapshots of the strategy and rule
/// that priced it.
#[derive(Debug, Clone, FromRow)]
pub struct MerchantSettleTransaction {
    pub id: i64,
    pub trx_id: TrxId,
    pub settle_id: SettleId,
    pub merchant_id: String,
    pub currency: String,
    pub amount: Money,
    pub usd_amount: Money,
    pub fee: Money,
    pub usd_fee: Money,
    pub settle_amount: Money,
    pub settle_usd_amount: Money,
    pub strategy_snapshot: String,
    pub rule_snapshot: String,
    pub status: SettleStatus,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Task        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    pub id: i64,
    pub task_id: String,
    pub task_type: String,
    pub handler_key: String,
    pub cron: String,
    pub timeout_secs: i64,
    pub status: TaskStatus,
    pub params: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn params_map(&self) -> HashMap<String, serde_json::Value> {
        serde_json::from_str(&self.params).unwrap_or_default()
    }
}
