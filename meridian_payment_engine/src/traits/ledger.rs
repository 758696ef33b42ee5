use mpg_common::UnknownCurrencyError;
use thiserror::Error;

use crate::{
    db_types::{Account, FundFlow, UserType},
    traits::data_objects::{Balance, BalanceUpdate, FlowQuery, UpdateBalanceRequest},
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Account not found for {0}")]
    AccountNotFound(String),
    #[error("Insufficient available balance: have {available}, need {requested}")]
    InsufficientAvailable { available: String, requested: String },
    #[error("Insufficient frozen balance: have {frozen}, need {requested}")]
    InsufficientFrozen { frozen: String, requested: String },
    #[error("Insufficient margin balance: have {margin}, need {requested}")]
    InsufficientMargin { margin: String, requested: String },
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(#[from] UnknownCurrencyError),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

impl LedgerError {
    /// Stable machine-readable code for the uniform `{code, message}` error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ledger.account_not_found",
            LedgerError::InsufficientAvailable { .. } => "ledger.insufficient_available",
            LedgerError::InsufficientFrozen { .. } => "ledger.insufficient_frozen",
            LedgerError::InsufficientMargin { .. } => "ledger.insufficient_margin",
            LedgerError::UnsupportedOperation(_) => "ledger.unsupported_operation",
            LedgerError::UnsupportedCurrency(_) => "ledger.unsupported_currency",
            LedgerError::InvalidAmount(_) => "ledger.invalid_amount",
            LedgerError::QueryError(_) => "ledger.query",
            LedgerError::DatabaseError(_) => "ledger.database",
        }
    }
}

/// The `LedgerManagement` trait defines the double-entry account store.
///
/// An account is the balance record for one `(user_id, user_type, currency)` triple, split into available, frozen,
/// margin and reserve buckets. Every successful mutation appends exactly one [`FundFlow`] journal entry; the journal
/// is the audit trail from which balances can be replayed.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    /// Applies one balance operation atomically. See [`UpdateBalanceRequest`] for idempotency semantics. On any
    /// precondition failure the account is untouched and no flow is written.
    async fn update_balance(&self, req: UpdateBalanceRequest) -> Result<BalanceUpdate, LedgerError>;

    /// Fetches the balance for `(user_id, user_type, currency)`, or `None` when no account exists yet.
    async fn fetch_balance(
        &self,
        user_id: &str,
        user_type: UserType,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError>;

    /// All accounts belonging to a user, across currencies and user types.
    async fn fetch_accounts(&self, user_id: &str) -> Result<Vec<Account>, LedgerError>;

    /// Journal search. The backend clamps `page_size` to the ledger's pagination cap.
    async fn search_flows(&self, query: FlowQuery) -> Result<Vec<FundFlow>, LedgerError>;
}
