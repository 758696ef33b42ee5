//! `SqliteDatabase` is the concrete SQLite backend for the Meridian payment engine.
//!
//! It implements every trait in the [`crate::traits`] module. Operations that must be atomic (balance mutations,
//! settlement persistence) open a database transaction here and call through to the free functions in
//! [`super::db`]; read paths borrow a pool connection directly.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::db::{accounts, contracts, db_url, flows, new_pool, routers, settles, strategies, tasks, transactions};
use crate::{
    db_types::{
        Account,
        ChannelAccount,
        ChannelGroup,
        ChannelGroupMember,
        Contract,
        FundFlow,
        MerchantSettle,
        MerchantSettleTransaction,
        NewSettleCycle,
        NewTransaction,
        PeriodType,
        PricedStrategy,
        RouterRule,
        SettleId,
        SettleRule,
        SettleStrategy,
        Task,
        TaskStatus,
        Transaction,
        TrxId,
        TrxType,
        UserType,
    },
    traits::{
        Balance,
        BalanceUpdate,
        FlowQuery,
        LedgerError,
        LedgerManagement,
        ModifyTransactionRequest,
        RouterError,
        RouterManagement,
        SettlementDatabase,
        SettlementError,
        SettlementRecord,
        TaskError,
        TaskManagement,
        TransactionError,
        TransactionManagement,
        UpdateBalanceRequest,
    },
};

/// The ledger's pagination cap for journal searches.
pub const MAX_FLOW_PAGE_SIZE: u64 = 100;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database instance using the URL from `MPG_DATABASE_URL`, or the default URL.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn update_balance(&self, req: UpdateBalanceRequest) -> Result<BalanceUpdate, LedgerError> {
        let mut tx = self.pool.begin().await?;
        match accounts::update_balance(req, &mut tx).await {
            Ok(update) => {
                tx.commit().await?;
                Ok(update)
            },
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            },
        }
    }

    async fn fetch_balance(
        &self,
        user_id: &str,
        user_type: UserType,
        currency: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let account = accounts::fetch_account(user_id, user_type, currency, &mut conn).await?;
        Ok(account.as_ref().map(Balance::from))
    }

    async fn fetch_accounts(&self, user_id: &str) -> Result<Vec<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_accounts_for_user(user_id, &mut conn).await
    }

    async fn search_flows(&self, mut query: FlowQuery) -> Result<Vec<FundFlow>, LedgerError> {
        if query.page_size == 0 || query.page_size > MAX_FLOW_PAGE_SIZE {
            query.page_size = MAX_FLOW_PAGE_SIZE;
        }
        let mut conn = self.pool.acquire().await?;
        flows::search_flows(query, &mut conn).await
    }
}

impl RouterManagement for SqliteDatabase {
    async fn fetch_active_rules(&self, merchant_id: &str, trx_type: TrxType) -> Result<Vec<RouterRule>, RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::fetch_active_rules(merchant_id, trx_type, &mut conn).await
    }

    async fn fetch_channel_account(&self, channel_account_id: &str) -> Result<Option<ChannelAccount>, RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::fetch_channel_account(channel_account_id, &mut conn).await
    }

    async fn fetch_account_for_channel_code(
        &self,
        merchant_id: &str,
        channel_code: &str,
    ) -> Result<Option<ChannelAccount>, RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::fetch_account_for_channel_code(merchant_id, channel_code, &mut conn).await
    }

    async fn fetch_channel_group(&self, group_id: &str) -> Result<Option<ChannelGroup>, RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::fetch_channel_group(group_id, &mut conn).await
    }

    async fn fetch_group_accounts(&self, group_id: &str) -> Result<Vec<ChannelAccount>, RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::fetch_group_accounts(group_id, &mut conn).await
    }

    async fn insert_router_rule(&self, rule: RouterRule) -> Result<(), RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::insert_router_rule(rule, &mut conn).await
    }

    async fn upsert_channel_account(&self, account: ChannelAccount) -> Result<(), RouterError> {
        let mut conn = self.pool.acquire().await?;
        routers::upsert_channel_account(account, &mut conn).await
    }

    async fn upsert_channel_group(
        &self,
        group: ChannelGroup,
        members: Vec<ChannelGroupMember>,
    ) -> Result<(), RouterError> {
        let mut tx = self.pool.begin().await?;
        routers::upsert_channel_group(group, members, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl TransactionManagement for SqliteDatabase {
    async fn insert_transaction(&self, new_trx: NewTransaction) -> Result<Transaction, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        transactions::insert_transaction(new_trx, &mut conn).await
    }

    async fn complete_transaction(
        &self,
        trx_id: &TrxId,
        completed_at: DateTime<Utc>,
    ) -> Result<Transaction, TransactionError> {
        let mut tx = self.pool.begin().await?;
        let result = transactions::complete_transaction(trx_id, completed_at, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn update_transaction(
        &self,
        trx_id: &TrxId,
        update: ModifyTransactionRequest,
    ) -> Result<Transaction, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        transactions::update_transaction(trx_id, update, &mut conn).await
    }

    async fn fetch_transaction(&self, trx_id: &TrxId) -> Result<Option<Transaction>, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(trx_id, &mut conn).await
    }
}

impl SettlementDatabase for SqliteDatabase {
    async fn count_unsettled(
        &self,
        trx_type: TrxType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        transactions::count_unsettled(trx_type, start, end, &mut conn).await
    }

    async fn fetch_unsettled_page(
        &self,
        trx_type: TrxType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Transaction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_unsettled_page(trx_type, start, end, limit, offset, &mut conn).await
    }

    async fn contract_at(
        &self,
        merchant_id: &str,
        trx_type: TrxType,
        at: DateTime<Utc>,
    ) -> Result<Option<Contract>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        contracts::contract_at(merchant_id, trx_type, at, &mut conn).await
    }

    async fn fetch_or_create_cycle(&self, cycle: NewSettleCycle) -> Result<MerchantSettle, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        settles::fetch_or_create_cycle(cycle, &mut conn).await
    }

    async fn fetch_cycle(
        &self,
        merchant_id: &str,
        period_type: PeriodType,
        period: i64,
    ) -> Result<Option<MerchantSettle>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        settles::fetch_cycle(merchant_id, period_type, period, &mut conn).await
    }

    async fn strategies_by_codes(&self, codes: &[String]) -> Result<Vec<PricedStrategy>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        strategies::strategies_by_codes(codes, &mut conn).await
    }

    async fn persist_settlement(&self, record: SettlementRecord) -> Result<bool, SettlementError> {
        let mut tx = self.pool.begin().await?;
        match settles::persist_settlement(record, &mut tx).await {
            Ok(written) => {
                tx.commit().await?;
                Ok(written)
            },
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            },
        }
    }

    async fn fetch_settle_transaction(
        &self,
        trx_id: &TrxId,
    ) -> Result<Option<MerchantSettleTransaction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        settles::fetch_settle_transaction(trx_id, &mut conn).await
    }

    async fn mature_cycles(&self, now: DateTime<Utc>) -> Result<Vec<MerchantSettle>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        settles::mature_cycles(now, &mut conn).await
    }

    async fn mark_cycle_completed(&self, settle_id: &SettleId, at: DateTime<Utc>) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        settles::mark_cycle_completed(settle_id, at, &mut conn).await
    }

    async fn fetch_settle_records_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<MerchantSettleTransaction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        settles::fetch_settle_records_page(start, end, limit, offset, &mut conn).await
    }

    async fn backfill_transaction_settle_id(
        &self,
        trx_id: &TrxId,
        settle_id: &SettleId,
    ) -> Result<bool, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        transactions::backfill_settle_id(trx_id, settle_id, &mut conn).await
    }

    async fn insert_contract(&self, contract: Contract) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        contracts::insert_contract(contract, &mut conn).await
    }

    async fn upsert_strategy(&self, strategy: SettleStrategy) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        strategies::upsert_strategy(strategy, &mut conn).await
    }

    async fn insert_rule(&self, rule: SettleRule) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        strategies::insert_rule(rule, &mut conn).await
    }
}

impl TaskManagement for SqliteDatabase {
    async fn fetch_active_tasks(&self) -> Result<Vec<Task>, TaskError> {
        let mut conn = self.pool.acquire().await?;
        tasks::fetch_active_tasks(&mut conn).await
    }

    async fn upsert_task(&self, task: Task) -> Result<(), TaskError> {
        let mut conn = self.pool.acquire().await?;
        tasks::upsert_task(task, &mut conn).await
    }

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), TaskError> {
        let mut conn = self.pool.acquire().await?;
        tasks::set_task_status(task_id, status, &mut conn).await
    }
}
