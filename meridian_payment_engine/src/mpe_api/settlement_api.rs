use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{stream, FutureExt, StreamExt};
use log::*;
use mpg_common::Money;
use tokio::sync::Semaphore;

use crate::{
    db_types::{
        BalanceOperation,
        BusinessType,
        NewSettleCycle,
        PricedStrategy,
        SettleRule,
        SettleStrategy,
        Transaction,
        TrxType,
        UserType,
    },
    events::{EventProducers, SettleCyclePostedEvent, TransactionSettledEvent},
    helpers::{matcher::Operand, ms_to_utc, new_settle_id, settle_window, Condition, Op, Predicate},
    traits::{
        AccountingResult,
        BackfillResult,
        LedgerManagement,
        SettleComputation,
        SettleResult,
        SettlementDatabase,
        SettlementError,
        SettlementRecord,
        UpdateBalanceRequest,
    },
};

/// Rows fetched per settlement page.
pub const SETTLE_PAGE_SIZE: u64 = 500;
/// Pages processed in parallel.
const PAGE_CONCURRENCY: usize = 5;
/// Global cap on concurrent transaction workers, across all pages. This is the admission control against the
/// database.
const WORKER_PERMITS: usize = 10;
/// Rows fetched per backfill page.
const BACKFILL_PAGE_SIZE: u64 = 50;
const BACKFILL_CONCURRENCY: usize = 10;

/// Per-run shared state: the strategy cache (keyed by cycle) and the worker admission semaphore. Dropped when the
/// run ends, so cached strategy snapshots never outlive a run.
struct RunContext {
    strategies: DashMap<String, Vec<PricedStrategy>>,
    permits: Semaphore,
}

impl RunContext {
    fn new() -> Arc<Self> {
        Arc::new(Self { strategies: DashMap::new(), permits: Semaphore::new(WORKER_PERMITS) })
    }
}

/// `SettlementApi` runs the settlement pipeline: it selects completed-but-unsettled transactions in a time window,
/// prices each one against the merchant's contract, and aggregates the results into settlement cycles. It also
/// posts matured cycles to the ledger and repairs missing settle ids.
pub struct SettlementApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B> SettlementApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, producers: EventProducers::default() }
    }

    pub fn new_with_producers(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase
{
    /// Settles every successful, still-unsettled `trx_type` transaction completed in `[start_ms, end_ms)`.
    ///
    /// The run is safe to repeat over the same window: settled transactions short-circuit, and cycle creation is
    /// race-safe. A worker failure (including a panic) marks that transaction failed and the run continues.
    pub async fn settle_by_time_range(
        &self,
        trx_type: TrxType,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<SettleResult, SettlementError> {
        let started = Instant::now();
        let start = ms_to_utc(start_ms)?;
        let end = ms_to_utc(end_ms)?;
        let total = self.db.count_unsettled(trx_type, start, end).await?;
        let pages_total = total.div_ceil(SETTLE_PAGE_SIZE);
        info!("🧮️ Settling {total} {trx_type} transaction(s) in [{start}, {end}) over {pages_total} page(s)");
        let ctx = RunContext::new();
        let outcomes = stream::iter(0..pages_total)
            .map(|page| self.process_page(trx_type, start, end, page, &ctx))
            .buffer_unordered(PAGE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        let mut result = SettleResult { total, pages_total, duration: started.elapsed(), ..Default::default() };
        for outcome in outcomes {
            match outcome {
                Ok((success, failed)) => {
                    result.pages_processed += 1;
                    result.success += success;
                    result.failed += failed;
                },
                Err(e) => {
                    error!("🧮️ Settlement page failed: {e}");
                },
            }
        }
        result.duration = started.elapsed();
        info!(
            "🧮️ Settlement run complete: {}/{} settled, {} failed, {:?}",
            result.success, result.total, result.failed, result.duration
        );
        Ok(result)
    }

    async fn process_page(
        &self,
        trx_type: TrxType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u64,
        ctx: &Arc<RunContext>,
    ) -> Result<(u64, u64), SettlementError> {
        let transactions =
            self.db.fetch_unsettled_page(trx_type, start, end, SETTLE_PAGE_SIZE, page * SETTLE_PAGE_SIZE).await?;
        trace!("🧮️ Page {page}: {} transaction(s)", transactions.len());
        let outcomes = stream::iter(transactions)
            .map(|trx| self.settle_one_guarded(trx, ctx))
            .buffer_unordered(WORKER_PERMITS)
            .collect::<Vec<_>>()
            .await;
        let mut success = 0;
        let mut failed = 0;
        for outcome in outcomes {
            match outcome {
                Ok(_) => success += 1,
                Err(e) => {
                    warn!("🧮️ Failed to settle transaction ({}): {e}", e.code());
                    failed += 1;
                },
            }
        }
        Ok((success, failed))
    }

    /// Wraps [`settle_one`] with the global admission semaphore and panic containment: a panicking worker is
    /// reported as a failed item, never as a crashed run.
    ///
    /// [`settle_one`]: Self::settle_one
    async fn settle_one_guarded(&self, trx: Transaction, ctx: &Arc<RunContext>) -> Result<bool, SettlementError> {
        let _permit = ctx
            .permits
            .acquire()
            .await
            .map_err(|e| SettlementError::WorkerPanic(format!("admission semaphore closed: {e}")))?;
        match std::panic::AssertUnwindSafe(self.settle_one(&trx, ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_string());
                Err(SettlementError::WorkerPanic(format!("worker for {} panicked: {msg}", trx.trx_id)))
            },
        }
    }

    /// The five-step pipeline for one transaction: resolve the cycle, pick a strategy, pick a rule, compute the
    /// settlement, persist. Returns `false` when the transaction was already settled.
    async fn settle_one(&self, trx: &Transaction, ctx: &Arc<RunContext>) -> Result<bool, SettlementError> {
        let completed_at = trx
            .completed_at
            .ok_or_else(|| SettlementError::Calculation(format!("{} has no completion time", trx.trx_id)))?;

        // Step 1: resolve the settlement cycle from the contract in force at completion time.
        let contract =
            self.db.contract_at(&trx.merchant_id, trx.trx_type, completed_at).await?.ok_or_else(|| {
                SettlementError::ContractNotFound {
                    merchant_id: trx.merchant_id.clone(),
                    trx_type: trx.trx_type,
                    at: completed_at,
                }
            })?;
        let window = settle_window(contract.period_type, completed_at)?;
        let cycle = self
            .db
            .fetch_or_create_cycle(NewSettleCycle {
                settle_id: new_settle_id(),
                merchant_id: trx.merchant_id.clone(),
                trx_type: trx.trx_type,
                period_type: contract.period_type,
                period: window.period,
                settle_ccy: contract.settle_ccy.clone(),
                trx_start_at: window.trx_start_at,
                trx_end_at: window.trx_end_at,
                strategy_codes: contract.strategy_code_list(),
                mature_at: window.mature_at,
            })
            .await?;

        // Step 2: pick the first matching strategy, via the per-run cache.
        let key = format!("settle.period_{}_{}_{}", trx.merchant_id, contract.period_type, window.period);
        let strategies = match ctx.strategies.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let mut codes = cycle.strategy_code_list();
                if codes.is_empty() {
                    codes = contract.strategy_code_list();
                }
                let loaded = self.db.strategies_by_codes(&codes).await?;
                ctx.strategies.insert(key, loaded.clone());
                loaded
            },
        };
        let priced = strategies
            .iter()
            .find(|p| strategy_matches(&p.strategy, &cycle.settle_ccy, trx))
            .ok_or_else(|| SettlementError::NoMatchingStrategy(trx.trx_id.clone()))?;

        // Step 3: pick the first matching rule within the strategy.
        let rule = priced
            .rules
            .iter()
            .find(|r| rule_matches(r, trx))
            .ok_or_else(|| SettlementError::NoMatchingRule(trx.trx_id.clone()))?;

        // Step 4: compute fees and settle amounts.
        let computation = compute_settlement(rule, trx.amount, trx.usd_amount);

        // Step 5: persist the record, the transaction update and the cycle aggregates atomically.
        let written = self
            .db
            .persist_settlement(SettlementRecord {
                trx_id: trx.trx_id.clone(),
                settle_id: cycle.settle_id.clone(),
                merchant_id: trx.merchant_id.clone(),
                currency: trx.currency.clone(),
                amount: trx.amount,
                usd_amount: trx.usd_amount,
                computation,
                strategy: priced.strategy.clone(),
                rule: rule.clone(),
            })
            .await?;
        if written {
            self.call_transaction_settled_hook(trx).await;
        }
        Ok(written)
    }

    async fn call_transaction_settled_hook(&self, trx: &Transaction) {
        if self.producers.transaction_settled_producer.is_empty() {
            return;
        }
        match self.db.fetch_settle_transaction(&trx.trx_id).await {
            Ok(Some(record)) => {
                for emitter in &self.producers.transaction_settled_producer {
                    debug!("📬️ Notifying settlement subscribers of {}", trx.trx_id);
                    emitter.publish_event(TransactionSettledEvent::new(record.clone())).await;
                }
            },
            Ok(None) => warn!("📬️ Settlement record for {} vanished before event dispatch", trx.trx_id),
            Err(e) => warn!("📬️ Could not load settlement record for event dispatch: {e}"),
        }
    }

    /// Repairs transactions that carry no `settle_id` despite having a settlement record, scanning records
    /// created in `[start_ms, end_ms)`.
    pub async fn backfill_settle_ids(&self, start_ms: i64, end_ms: i64) -> Result<BackfillResult, SettlementError> {
        let started = Instant::now();
        let start = ms_to_utc(start_ms)?;
        let end = ms_to_utc(end_ms)?;
        let mut result = BackfillResult::default();
        let mut offset = 0u64;
        loop {
            let page = self.db.fetch_settle_records_page(start, end, BACKFILL_PAGE_SIZE, offset).await?;
            let fetched = page.len() as u64;
            result.scanned += fetched;
            let outcomes = stream::iter(page)
                .map(|record| {
                    let db = &self.db;
                    async move { db.backfill_transaction_settle_id(&record.trx_id, &record.settle_id).await }
                })
                .buffer_unordered(BACKFILL_CONCURRENCY)
                .collect::<Vec<_>>()
                .await;
            for outcome in outcomes {
                match outcome {
                    Ok(true) => result.updated += 1,
                    Ok(false) => {},
                    Err(e) => {
                        warn!("🧮️ Settle-id backfill item failed: {e}");
                        result.failed += 1;
                    },
                }
            }
            if fetched < BACKFILL_PAGE_SIZE {
                break;
            }
            offset += BACKFILL_PAGE_SIZE;
        }
        result.duration = started.elapsed();
        info!("🧮️ Backfill complete: {} scanned, {} repaired, {} failed", result.scanned, result.updated, result.failed);
        Ok(result)
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase + LedgerManagement
{
    /// Posts every matured, unposted settlement cycle to its merchant's ledger account.
    ///
    /// The ledger add is keyed on the cycle's `settle_id`, so a cycle whose posting succeeded but whose
    /// completion stamp was lost is replayed harmlessly on the next tick.
    pub async fn process_batch_settle_accounting(&self, now_ms: i64) -> Result<AccountingResult, SettlementError> {
        let started = Instant::now();
        let now = ms_to_utc(now_ms)?;
        let cycles = self.db.mature_cycles(now).await?;
        let mut result = AccountingResult { total: cycles.len() as u64, ..Default::default() };
        info!("🧮️ Posting {} matured settlement cycle(s)", result.total);
        for cycle in cycles {
            let req = UpdateBalanceRequest::new(
                &cycle.merchant_id,
                UserType::Merchant,
                &cycle.settle_ccy,
                BalanceOperation::Add,
                cycle.settle_amount,
            )
            .with_transaction_id(cycle.settle_id.as_str())
            .with_business_type(BusinessType::Settle)
            .with_description(&format!("Settlement cycle {} period {}", cycle.period_type, cycle.period));
            let posted = match self.db.update_balance(req).await {
                Ok(_) => self.db.mark_cycle_completed(&cycle.settle_id, now).await.map_err(SettlementError::from),
                Err(e) => Err(e.into()),
            };
            match posted {
                Ok(()) => {
                    result.success += 1;
                    for emitter in &self.producers.cycle_posted_producer {
                        emitter.publish_event(SettleCyclePostedEvent::new(cycle.clone())).await;
                    }
                },
                Err(e) => {
                    // Left unposted; the next accounting tick retries.
                    warn!("🧮️ Could not post cycle {} ({}): {e}", cycle.settle_id, e.code());
                    result.failed += 1;
                },
            }
        }
        result.duration = started.elapsed();
        Ok(result)
    }
}

//--------------------------------------      matching      ----------------------------------------------------------

fn transaction_fields(trx: &Transaction, settle_ccy: &str) -> HashMap<String, Operand> {
    let mut fields = HashMap::from([
        ("merchant_id".to_string(), Operand::from(trx.merchant_id.as_str())),
        ("trx_type".to_string(), Operand::from(trx.trx_type.to_string().as_str())),
        ("trx_ccy".to_string(), Operand::from(trx.currency.as_str())),
        ("settle_ccy".to_string(), Operand::from(settle_ccy)),
        ("amount".to_string(), Operand::Num(trx.amount.value())),
    ]);
    if let Some(mode) = &trx.trx_mode {
        fields.insert("trx_mode".to_string(), Operand::from(mode.as_str()));
    }
    if let Some(method) = &trx.trx_method {
        fields.insert("trx_method".to_string(), Operand::from(method.as_str()));
    }
    if let Some(country) = &trx.country {
        fields.insert("country".to_string(), Operand::from(country.as_str()));
    }
    fields
}

fn push_eq(conditions: &mut Vec<Predicate>, field: &str, filter: Option<&str>) {
    if let Some(value) = filter.filter(|v| !v.is_empty()) {
        conditions.push(Predicate::Cond(Condition::new(field, Op::Eq, value)));
    }
}

/// A strategy matches a transaction when all of its set filters agree with the transaction and the cycle's
/// settlement currency.
pub fn strategy_matches(strategy: &SettleStrategy, settle_ccy: &str, trx: &Transaction) -> bool {
    let mut conditions =
        vec![Predicate::Cond(Condition::new("merchant_id", Op::Eq, strategy.merchant_id.as_str()))];
    push_eq(&mut conditions, "trx_type", strategy.trx_type.map(|t| t.to_string()).as_deref());
    push_eq(&mut conditions, "trx_ccy", strategy.trx_ccy.as_deref());
    push_eq(&mut conditions, "settle_ccy", strategy.settle_ccy.as_deref());
    push_eq(&mut conditions, "trx_mode", strategy.trx_mode.as_deref());
    push_eq(&mut conditions, "trx_method", strategy.trx_method.as_deref());
    push_eq(&mut conditions, "country", strategy.country.as_deref());
    Predicate::All(conditions).matches(&transaction_fields(trx, settle_ccy))
}

/// A rule matches when its set filters agree and the transaction amount falls within its bounds.
pub fn rule_matches(rule: &SettleRule, trx: &Transaction) -> bool {
    let mut conditions = Vec::new();
    push_eq(&mut conditions, "trx_type", rule.trx_type.map(|t| t.to_string()).as_deref());
    push_eq(&mut conditions, "trx_ccy", rule.trx_ccy.as_deref());
    push_eq(&mut conditions, "trx_mode", rule.trx_mode.as_deref());
    push_eq(&mut conditions, "trx_method", rule.trx_method.as_deref());
    push_eq(&mut conditions, "country", rule.country.as_deref());
    if let Some(min) = rule.min_amount {
        conditions.push(Predicate::Cond(Condition::new("amount", Op::Ge, min.value())));
    }
    if let Some(max) = rule.max_amount {
        conditions.push(Predicate::Cond(Condition::new("amount", Op::Le, max.value())));
    }
    Predicate::All(conditions).matches(&transaction_fields(trx, ""))
}

/// Prices a transaction against a rule. Percentage rates are in percent units; each fee is the percentage part
/// plus the fixed part, clamped into the rule's fee bounds before the settle amount is derived.
pub fn compute_settlement(rule: &SettleRule, amount: Money, usd_amount: Money) -> SettleComputation {
    let pct = |rate: Option<mpg_common::Rate>, base: Money| rate.map(|r| r.apply(base)).unwrap_or_else(Money::zero);
    let fee = (pct(rule.rate, amount) + rule.fixed_fee.unwrap_or_else(Money::zero)).clamp_to(rule.min_fee, rule.max_fee);
    let usd_fee = (pct(rule.usd_rate, usd_amount) + rule.fixed_usd_fee.unwrap_or_else(Money::zero))
        .clamp_to(rule.min_usd_fee, rule.max_usd_fee);
    SettleComputation { fee, usd_fee, settle_amount: amount - fee, settle_usd_amount: usd_amount - usd_fee }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db_types::{PeriodType, SettleStatus, TrxId, TrxStatus};

    fn rule() -> SettleRule {
        SettleRule {
            id: 1,
            strategy_code: "S1".into(),
            sort_order: 0,
            trx_type: None,
            trx_mode: None,
            trx_method: None,
            country: None,
            trx_ccy: None,
            min_amount: None,
            max_amount: None,
            rate: None,
            fixed_fee: None,
            usd_rate: None,
            fixed_usd_fee: None,
            min_fee: None,
            max_fee: None,
            min_usd_fee: None,
            max_usd_fee: None,
        }
    }

    fn trx(amount: Money) -> Transaction {
        Transaction {
            id: 1,
            trx_id: TrxId::from("trx_1"),
            merchant_id: "M1".into(),
            req_id: "req_1".into(),
            trx_type: TrxType::Payin,
            currency: "USD".into(),
            amount,
            usd_amount: amount,
            trx_method: Some("card".into()),
            trx_mode: None,
            country: None,
            status: TrxStatus::Success,
            settle_status: SettleStatus::Pending,
            settle_id: None,
            channel_account_id: None,
            completed_at: Some(Utc::now()),
            settled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn strategy() -> SettleStrategy {
        SettleStrategy {
            id: 1,
            strategy_code: "S1".into(),
            merchant_id: "M1".into(),
            period_type: PeriodType::T1,
            settle_ccy: None,
            trx_type: None,
            trx_mode: None,
            trx_method: None,
            country: None,
            trx_ccy: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percentage_fee_with_no_caps() {
        let mut r = rule();
        r.rate = Some(dec!(1.5).into());
        let c = compute_settlement(&r, Money::new(dec!(1000.00)), Money::new(dec!(1000.00)));
        assert_eq!(c.fee, Money::new(dec!(15)));
        assert_eq!(c.settle_amount, Money::new(dec!(985.00)));
        // No usd_rate configured, so the USD side is fee-free.
        assert_eq!(c.usd_fee, Money::zero());
        assert_eq!(c.settle_usd_amount, Money::new(dec!(1000.00)));
    }

    #[test]
    fn fee_is_clamped_into_bounds() {
        let mut r = rule();
        r.rate = Some(dec!(5).into());
        r.min_fee = Some(Money::new(dec!(1)));
        r.max_fee = Some(Money::new(dec!(10)));
        let c = compute_settlement(&r, Money::new(dec!(10)), Money::zero());
        assert_eq!(c.fee, Money::new(dec!(1)));
        assert_eq!(c.settle_amount, Money::new(dec!(9)));
        let c = compute_settlement(&r, Money::new(dec!(1000)), Money::zero());
        assert_eq!(c.fee, Money::new(dec!(10)));
        assert_eq!(c.settle_amount, Money::new(dec!(990)));
    }

    #[test]
    fn fixed_fee_adds_to_percentage() {
        let mut r = rule();
        r.rate = Some(dec!(1).into());
        r.fixed_fee = Some(Money::new(dec!(0.30)));
        let c = compute_settlement(&r, Money::new(dec!(100)), Money::zero());
        assert_eq!(c.fee, Money::new(dec!(1.30)));
        assert_eq!(c.settle_amount, Money::new(dec!(98.70)));
    }

    #[test]
    fn strategy_filters_apply_when_set() {
        let t = trx(Money::new(dec!(100)));
        let mut s = strategy();
        assert!(strategy_matches(&s, "USD", &t));
        s.trx_ccy = Some("EUR".into());
        assert!(!strategy_matches(&s, "USD", &t));
        s.trx_ccy = Some("USD".into());
        s.settle_ccy = Some("USD".into());
        assert!(strategy_matches(&s, "USD", &t));
        assert!(!strategy_matches(&s, "EUR", &t));
        s.merchant_id = "M2".into();
        assert!(!strategy_matches(&s, "USD", &t));
    }

    #[test]
    fn rule_amount_bounds() {
        let t = trx(Money::new(dec!(250)));
        let mut r = rule();
        assert!(rule_matches(&r, &t));
        r.min_amount = Some(Money::new(dec!(100)));
        r.max_amount = Some(Money::new(dec!(250)));
        assert!(rule_matches(&r, &t));
        r.max_amount = Some(Money::new(dec!(249.99)));
        assert!(!rule_matches(&r, &t));
        r.min_amount = Some(Money::new(dec!(300)));
        r.max_amount = None;
        assert!(!rule_matches(&r, &t));
    }

    #[test]
    fn rule_field_filters() {
        let t = trx(Money::new(dec!(50)));
        let mut r = rule();
        r.trx_method = Some("card".into());
        assert!(rule_matches(&r, &t));
        r.trx_method = Some("upi".into());
        assert!(!rule_matches(&r, &t));
        // A filter on a field the transaction does not carry never matches.
        r.trx_method = None;
        r.country = Some("IN".into());
        assert!(!rule_matches(&r, &t));
    }
}
