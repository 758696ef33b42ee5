use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Contract,
        MerchantSettle,
        MerchantSettleTransaction,
        NewSettleCycle,
        PeriodType,
        PricedStrategy,
        SettleId,
        SettleRule,
        SettleStrategy,
        Transaction,
        TrxId,
        TrxType,
    },
    helpers::PeriodError,
    traits::{data_objects::SettlementRecord, LedgerError},
};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("No contract is in force for merchant {merchant_id} ({trx_type}) at {at}")]
    ContractNotFound { merchant_id: String, trx_type: TrxType, at: DateTime<Utc> },
    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),
    #[error("No strategy matches transaction {0}")]
    NoMatchingStrategy(TrxId),
    #[error("No rule matches transaction {0}")]
    NoMatchingRule(TrxId),
    #[error("Settlement cycle not found: {0}")]
    CycleNotFound(String),
    #[error("Settlement calculation failed: {0}")]
    Calculation(String),
    #[error("Period error: {0}")]
    Period(#[from] PeriodError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Settlement worker panicked: {0}")]
    WorkerPanic(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

impl SettlementError {
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::ContractNotFound { .. } => "settle.contract_not_found",
            SettlementError::StrategyNotFound(_) => "settle.strategy_not_found",
            SettlementError::NoMatchingStrategy(_) => "settle.no_matching_strategy",
            SettlementError::NoMatchingRule(_) => "settle.no_matching_rule",
            SettlementError::CycleNotFound(_) => "settle.cycle_not_found",
            SettlementError::Calculation(_) => "settle.calculation",
            SettlementError::Period(_) => "settle.period",
            SettlementError::Ledger(e) => e.code(),
            SettlementError::WorkerPanic(_) => "settle.worker_panic",
            SettlementError::DatabaseError(_) => "settle.database",
        }
    }
}

/// Storage behind the settlement engine: contracts, strategy sheets, cycle records and per-transaction
/// settlement records.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase {
    /// Number of successful, still-unsettled transactions of `trx_type` completed in `[start, end)`.
    async fn count_unsettled(
        &self,
        trx_type: TrxType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, SettlementError>;

    /// One page of the query set behind [`count_unsettled`], ordered by id for stable paging.
    ///
    /// [`count_unsettled`]: SettlementDatabase::count_unsettled
    async fn fetch_unsettled_page(
        &self,
        trx_type: TrxType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Transaction>, SettlementError>;

    /// The merchant's contract for `trx_type` in force at `at`, if any.
    async fn contract_at(
        &self,
        merchant_id: &str,
        trx_type: TrxType,
        at: DateTime<Utc>,
    ) -> Result<Option<Contract>, SettlementError>;

    /// Looks up the cycle record for the new cycle's `(merchant_id, period_type, period)` key, inserting it if
    /// absent. Race-safe: concurrent callers for the same key all receive the same row.
    async fn fetch_or_create_cycle(&self, cycle: NewSettleCycle) -> Result<MerchantSettle, SettlementError>;

    async fn fetch_cycle(
        &self,
        merchant_id: &str,
        period_type: PeriodType,
        period: i64,
    ) -> Result<Option<MerchantSettle>, SettlementError>;

    /// Loads the named strategies with their rules, preserving the order of `codes`. Unknown codes are skipped.
    async fn strategies_by_codes(&self, codes: &[String]) -> Result<Vec<PricedStrategy>, SettlementError>;

    /// Persists one settled transaction and folds its amounts into the cycle aggregates, in one database
    /// transaction. Returns `false` when the transaction was already settled and nothing was written.
    async fn persist_settlement(&self, record: SettlementRecord) -> Result<bool, SettlementError>;

    async fn fetch_settle_transaction(
        &self,
        trx_id: &TrxId,
    ) -> Result<Option<MerchantSettleTransaction>, SettlementError>;

    /// Cycle records whose `mature_at` has passed and which have not been posted to the ledger yet.
    async fn mature_cycles(&self, now: DateTime<Utc>) -> Result<Vec<MerchantSettle>, SettlementError>;

    async fn mark_cycle_completed(&self, settle_id: &SettleId, at: DateTime<Utc>) -> Result<(), SettlementError>;

    /// One page of settlement records created in `[start, end)`, for the settle-id backfill job.
    async fn fetch_settle_records_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<MerchantSettleTransaction>, SettlementError>;

    /// Writes `settle_id` onto the transaction iff its current `settle_id` is null or empty. Returns whether a
    /// row was updated.
    async fn backfill_transaction_settle_id(
        &self,
        trx_id: &TrxId,
        settle_id: &SettleId,
    ) -> Result<bool, SettlementError>;

    async fn insert_contract(&self, contract: Contract) -> Result<(), SettlementError>;

    async fn upsert_strategy(&self, strategy: SettleStrategy) -> Result<(), SettlementError>;

    async fn insert_rule(&self, rule: SettleRule) -> Result<(), SettlementError>;
}
