use thiserror::Error;

use crate::db_types::{ChannelAccount, ChannelGroup, ChannelGroupMember, RouterRule, TrxType};

#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error("Channel account not found: {0}")]
    ChannelAccountNotFound(String),
    #[error("Channel group not found: {0}")]
    ChannelGroupNotFound(String),
    #[error("Invalid router configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for RouterError {
    fn from(e: sqlx::Error) -> Self {
        RouterError::DatabaseError(e.to_string())
    }
}

impl RouterError {
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::ChannelAccountNotFound(_) => "router.channel_account_not_found",
            RouterError::ChannelGroupNotFound(_) => "router.channel_group_not_found",
            RouterError::InvalidConfiguration(_) => "router.invalid_configuration",
            RouterError::DatabaseError(_) => "router.database",
        }
    }
}

/// Storage for routing configuration: per-merchant rules, channel accounts and channel groups.
///
/// The hot path is read-only; the upsert methods exist for provisioning and tests. Routing tolerates stale reads,
/// so no locking is required here.
#[allow(async_fn_in_trait)]
pub trait RouterManagement {
    /// Active rules for `(merchant_id, trx_type)`, sorted by ascending priority.
    async fn fetch_active_rules(&self, merchant_id: &str, trx_type: TrxType) -> Result<Vec<RouterRule>, RouterError>;

    async fn fetch_channel_account(&self, channel_account_id: &str) -> Result<Option<ChannelAccount>, RouterError>;

    /// The active channel account a merchant holds on the given channel code, if any.
    async fn fetch_account_for_channel_code(
        &self,
        merchant_id: &str,
        channel_code: &str,
    ) -> Result<Option<ChannelAccount>, RouterError>;

    async fn fetch_channel_group(&self, group_id: &str) -> Result<Option<ChannelGroup>, RouterError>;

    /// The group's member channel accounts, in declared member order. Inactive accounts are included; the caller
    /// filters.
    async fn fetch_group_accounts(&self, group_id: &str) -> Result<Vec<ChannelAccount>, RouterError>;

    async fn insert_router_rule(&self, rule: RouterRule) -> Result<(), RouterError>;

    async fn upsert_channel_account(&self, account: ChannelAccount) -> Result<(), RouterError>;

    async fn upsert_channel_group(
        &self,
        group: ChannelGroup,
        members: Vec<ChannelGroupMember>,
    ) -> Result<(), RouterError>;
}
