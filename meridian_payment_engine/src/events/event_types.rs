use crate::db_types::{FundFlow, MerchantSettle, MerchantSettleTransaction};

/// Emitted after every committed ledger mutation. Carries the journal entry, which is enough to reconstruct the
/// balance change without touching engine state.
#[derive(Debug, Clone)]
pub struct FundFlowEvent {
    pub flow: FundFlow,
}

impl FundFlowEvent {
    pub fn new(flow: FundFlow) -> Self {
        Self { flow }
    }
}

/// Emitted when a transaction has been priced and its settlement record persisted. The record carries the
/// transaction id, settle id and all computed amounts.
#[derive(Debug, Clone)]
pub struct TransactionSettledEvent {
    pub record: MerchantSettleTransaction,
}

impl TransactionSettledEvent {
    pub fn new(record: MerchantSettleTransaction) -> Self {
        Self { record }
    }
}

/// Emitted when a matured settlement cycle has been posted to the merchant's ledger account.
#[derive(Debug, Clone)]
pub struct SettleCyclePostedEvent {
    pub cycle: MerchantSettle,
}

impl SettleCyclePostedEvent {
    pub fn new(cycle: MerchantSettle) -> Self {
        Self { cycle }
    }
}
