use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use mpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Account,
    BalanceOperation,
    BusinessType,
    FundFlow,
    RouteStrategy,
    SettleId,
    SettleRule,
    SettleStatus,
    SettleStrategy,
    TrxId,
    TrxStatus,
    TrxType,
    UserType,
};

//--------------------------------------  UpdateBalanceRequest  ------------------------------------------------------
/// One atomic balance mutation against `(user_id, user_type, currency)`.
///
/// When `transaction_id` is set, the ledger is idempotent over `(account, transaction_id, operation)`: replaying
/// the request returns the original result without writing a second flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBalanceRequest {
    pub user_id: String,
    pub user_type: UserType,
    pub currency: String,
    pub operation: BalanceOperation,
    pub amount: Money,
    pub transaction_id: Option<String>,
    pub bill_id: Option<String>,
    pub business_type: Option<BusinessType>,
    pub description: Option<String>,
}

impl UpdateBalanceRequest {
    pub fn new(user_id: &str, user_type: UserType, currency: &str, operation: BalanceOperation, amount: Money) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_type,
            currency: currency.to_string(),
            operation,
            amount,
            transaction_id: None,
            bill_id: None,
            business_type: None,
            description: None,
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: &str) -> Self {
        self.transaction_id = Some(transaction_id.to_string());
        self
    }

    pub fn with_business_type(mut self, business_type: BusinessType) -> Self {
        self.business_type = Some(business_type);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// The outcome of a successful [`UpdateBalanceRequest`].
#[derive(Debug, Clone)]
pub struct BalanceUpdate {
    pub account: Account,
    pub flow: FundFlow,
    /// True when the request was a replay of an already-applied `(transaction_id, operation)` pair and no new
    /// flow was written.
    pub replayed: bool,
}

//--------------------------------------       Balance       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Money,
    pub available: Money,
    pub frozen: Money,
    pub margin: Money,
    pub reserve: Money,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for Balance {
    fn from(account: &Account) -> Self {
        Self {
            total: account.total,
            available: account.available,
            frozen: account.frozen,
            margin: account.margin,
            reserve: account.reserve,
            currency: account.currency.clone(),
            updated_at: account.updated_at,
        }
    }
}

//--------------------------------------      FlowQuery      ---------------------------------------------------------
/// Filter for journal searches. Unset fields do not constrain the result. Results are ordered by insertion and
/// paged; page sizes above the ledger cap are clamped.
#[derive(Debug, Clone, Default)]
pub struct FlowQuery {
    pub account_id: Option<String>,
    pub user_id: Option<String>,
    pub transaction_id: Option<String>,
    pub flow_type: Option<crate::db_types::FlowType>,
    pub business_type: Option<BusinessType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: u64,
    pub page_size: u64,
}

impl FlowQuery {
    pub fn for_account(account_id: &str) -> Self {
        Self { account_id: Some(account_id.to_string()), page_size: 50, ..Default::default() }
    }

    pub fn for_user(user_id: &str) -> Self {
        Self { user_id: Some(user_id.to_string()), page_size: 50, ..Default::default() }
    }

    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

//--------------------------------------     RouteRequest    ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub merchant_id: String,
    pub trx_type: TrxType,
    pub req_id: String,
    pub currency: String,
    pub amount: Option<Money>,
    pub trx_method: Option<String>,
    pub trx_mode: Option<String>,
    pub trx_app: Option<String>,
    pub package: Option<String>,
    pub device_id: Option<String>,
    pub product_id: Option<String>,
}

impl RouteRequest {
    pub fn new(merchant_id: &str, trx_type: TrxType, req_id: &str, currency: &str) -> Self {
        Self {
            merchant_id: merchant_id.to_string(),
            trx_type,
            req_id: req_id.to_string(),
            currency: currency.to_string(),
            amount: None,
            trx_method: None,
            trx_mode: None,
            trx_app: None,
            package: None,
            device_id: None,
            product_id: None,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.trx_method = Some(method.to_string());
        self
    }
}

//--------------------------------------      RouteInfo      ---------------------------------------------------------
/// The routing decision: channel accounts to try (in order), the retry strategy, and each account's channel code.
/// An empty account list means no rule matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub channel_accounts: Vec<String>,
    pub strategy: RouteStrategy,
    pub channel_codes: HashMap<String, String>,
}

impl RouteInfo {
    pub fn empty() -> Self {
        Self { channel_accounts: Vec::new(), strategy: RouteStrategy::Once, channel_codes: HashMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.channel_accounts.is_empty()
    }
}

//--------------------------------------     SettleResult    ---------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SettleResult {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub duration: Duration,
    pub pages_total: u64,
    pub pages_processed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AccountingResult {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct BackfillResult {
    pub scanned: u64,
    pub updated: u64,
    pub failed: u64,
    pub duration: Duration,
}

//--------------------------------------  SettleComputation  ---------------------------------------------------------
/// The priced outcome of running a transaction through a settle rule, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SettleComputation {
    pub fee: Money,
    pub usd_fee: Money,
    pub settle_amount: Money,
    pub settle_usd_amount: Money,
}

/// A settlement ready to persist: the computed amounts plus snapshots of the strategy and rule that priced it.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub trx_id: TrxId,
    pub settle_id: SettleId,
    pub merchant_id: String,
    pub currency: String,
    pub amount: Money,
    pub usd_amount: Money,
    pub computation: SettleComputation,
    pub strategy: SettleStrategy,
    pub rule: SettleRule,
}

//-------------------------------- ModifyTransactionRequest ----------------------------------------------------------
/// A change-set for a transaction row. Only the populated fields are written; `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct ModifyTransactionRequest {
    pub status: Option<TrxStatus>,
    pub settle_status: Option<SettleStatus>,
    pub settle_id: Option<SettleId>,
    pub channel_account_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl ModifyTransactionRequest {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.settle_status.is_none()
            && self.settle_id.is_none()
            && self.channel_account_id.is_none()
            && self.completed_at.is_none()
            && self.settled_at.is_none()
    }
}
