use std::fmt::Debug;

use log::*;
use mpg_common::Currency;

use crate::{
    db_types::{Account, FundFlow, UserType},
    events::{EventProducers, FundFlowEvent},
    traits::{Balance, BalanceUpdate, FlowQuery, LedgerError, LedgerManagement, UpdateBalanceRequest},
};

/// `LedgerApi` validates and executes balance mutations against the ledger backend, and exposes the read paths
/// over accounts and the fund-flow journal.
pub struct LedgerApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, producers: EventProducers::default() }
    }

    pub fn new_with_producers(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    /// Applies one balance operation. The request is validated first: the currency must be in the registry and
    /// the amount strictly positive. A replayed request (same `transaction_id` and operation) returns the prior
    /// result without emitting a new event.
    pub async fn update_balance(&self, req: UpdateBalanceRequest) -> Result<BalanceUpdate, LedgerError> {
        let _ = Currency::from_code(&req.currency)?;
        if !req.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(req.amount.to_string()));
        }
        let update = self.db.update_balance(req).await?;
        if !update.replayed {
            self.call_fund_flow_hook(&update).await;
        }
        Ok(update)
    }

    pub async fn balance(
        &self,
        user_id: &str,
        user_type: UserType,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        let _ = Currency::from_code(currency)?;
        self.db.fetch_balance(user_id, user_type, currency).await
    }

    pub async fn accounts(&self, user_id: &str) -> Result<Vec<Account>, LedgerError> {
        self.db.fetch_accounts(user_id).await
    }

    /// Journal search. Page sizes above the ledger cap are clamped by the backend.
    pub async fn flows(&self, query: FlowQuery) -> Result<Vec<FundFlow>, LedgerError> {
        self.db.search_flows(query).await
    }

    async fn call_fund_flow_hook(&self, update: &BalanceUpdate) {
        for emitter in &self.producers.fund_flow_producer {
            debug!("📬️ Notifying fund flow subscribers of {}", update.flow.flow_no);
            let event = FundFlowEvent::new(update.flow.clone());
            emitter.publish_event(event).await;
        }
    }
}
