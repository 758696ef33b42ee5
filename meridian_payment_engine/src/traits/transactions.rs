use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewTransaction, Transaction, TrxId},
    traits::data_objects::ModifyTransactionRequest,
};

#[derive(Debug, Clone, Error)]
pub enum TransactionError {
    #[error("Transaction not found: {0}")]
    NotFound(String),
    #[error("Invalid state transition for {0}: {1}")]
    InvalidTransition(TrxId, String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for TransactionError {
    fn from(e: sqlx::Error) -> Self {
        TransactionError::DatabaseError(e.to_string())
    }
}

impl TransactionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransactionError::NotFound(_) => "transaction.not_found",
            TransactionError::InvalidTransition(..) => "transaction.invalid_transition",
            TransactionError::DatabaseError(_) => "transaction.database",
        }
    }
}

/// The shared transaction store. Payins, payouts, refunds, deposits and withdrawals all live in one table,
/// discriminated by [`TrxType`](crate::db_types::TrxType).
#[allow(async_fn_in_trait)]
pub trait TransactionManagement {
    /// Inserts a new transaction in `pending` state. Idempotent over `(merchant_id, req_id, trx_type)`: replaying
    /// a request returns the previously created row unchanged.
    async fn insert_transaction(&self, new_trx: NewTransaction) -> Result<Transaction, TransactionError>;

    /// Marks a transaction successful and stamps `completed_at`. Terminal transactions are left untouched and an
    /// [`TransactionError::InvalidTransition`] is returned.
    async fn complete_transaction(
        &self,
        trx_id: &TrxId,
        completed_at: DateTime<Utc>,
    ) -> Result<Transaction, TransactionError>;

    /// Applies a change-set to the transaction row. An empty change-set is a no-op.
    async fn update_transaction(
        &self,
        trx_id: &TrxId,
        update: ModifyTransactionRequest,
    ) -> Result<Transaction, TransactionError>;

    async fn fetch_transaction(&self, trx_id: &TrxId) -> Result<Option<Transaction>, TransactionError>;
}
