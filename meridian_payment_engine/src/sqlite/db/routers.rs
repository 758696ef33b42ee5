use sqlx::SqliteConnection;

use crate::{
    db_types::{ChannelAccount, ChannelGroup, ChannelGroupMember, RouterRule, TrxType},
    traits::RouterError,
};

pub async fn fetch_active_rules(
    merchant_id: &str,
    trx_type: TrxType,
    conn: &mut SqliteConnection,
) -> Result<Vec<RouterRule>, RouterError> {
    let rules = sqlx::query_as::<_, RouterRule>(
        r#"SELECT * FROM merchant_routers
        WHERE merchant_id = ? AND trx_type = ? AND active = 1
        ORDER BY priority ASC, id ASC"#,
    )
    .bind(merchant_id)
    .bind(trx_type)
    .fetch_all(conn)
    .await?;
    Ok(rules)
}

pub async fn fetch_channel_account(
    channel_account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ChannelAccount>, RouterError> {
    let account = sqlx::query_as::<_, ChannelAccount>("SELECT * FROM channel_accounts WHERE channel_account_id = ?")
        .bind(channel_account_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn fetch_account_for_channel_code(
    merchant_id: &str,
    channel_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ChannelAccount>, RouterError> {
    let account = sqlx::query_as::<_, ChannelAccount>(
        r#"SELECT * FROM channel_accounts
        WHERE merchant_id = ? AND channel_code = ? AND active = 1
        ORDER BY id ASC LIMIT 1"#,
    )
    .bind(merchant_id)
    .bind(channel_code)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}

pub async fn fetch_channel_group(
    group_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ChannelGroup>, RouterError> {
    let group = sqlx::query_as::<_, ChannelGroup>("SELECT * FROM channel_groups WHERE group_id = ?")
        .bind(group_id)
        .fetch_optional(conn)
        .await?;
    Ok(group)
}

/// Group members expanded to their channel accounts, in declared member order.
pub async fn fetch_group_accounts(
    group_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<ChannelAccount>, RouterError> {
    let accounts = sqlx::query_as::<_, ChannelAccount>(
        r#"SELECT channel_accounts.* FROM channel_accounts
        INNER JOIN channel_group_members ON channel_group_members.channel_account_id = channel_accounts.channel_account_id
        WHERE channel_group_members.group_id = ?
        ORDER BY channel_group_members.sort_order ASC, channel_group_members.id ASC"#,
    )
    .bind(group_id)
    .fetch_all(conn)
    .await?;
    Ok(accounts)
}

pub async fn insert_router_rule(rule: RouterRule, conn: &mut SqliteConnection) -> Result<(), RouterError> {
    sqlx::query(
        r#"INSERT INTO merchant_routers (
            merchant_id, trx_type, priority, currency, trx_method, trx_mode, trx_app, device_id, package,
            min_amount, max_amount, channel_account_id, channel_code, channel_group_id, active
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&rule.merchant_id)
    .bind(rule.trx_type)
    .bind(rule.priority)
    .bind(&rule.currency)
    .bind(&rule.trx_method)
    .bind(&rule.trx_mode)
    .bind(&rule.trx_app)
    .bind(&rule.device_id)
    .bind(&rule.package)
    .bind(rule.min_amount)
    .bind(rule.max_amount)
    .bind(&rule.channel_account_id)
    .bind(&rule.channel_code)
    .bind(&rule.channel_group_id)
    .bind(rule.active)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn upsert_channel_account(account: ChannelAccount, conn: &mut SqliteConnection) -> Result<(), RouterError> {
    sqlx::query(
        r#"INSERT INTO channel_accounts (
            channel_account_id, merchant_id, channel_code, currency, single_min, single_max, daily_limit,
            credential, active
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (channel_account_id) DO UPDATE SET
            merchant_id = excluded.merchant_id,
            channel_code = excluded.channel_code,
            currency = excluded.currency,
            single_min = excluded.single_min,
            single_max = excluded.single_max,
            daily_limit = excluded.daily_limit,
            credential = excluded.credential,
            active = excluded.active,
            updated_at = CURRENT_TIMESTAMP"#,
    )
    .bind(&account.channel_account_id)
    .bind(&account.merchant_id)
    .bind(&account.channel_code)
    .bind(&account.currency)
    .bind(account.single_min)
    .bind(account.single_max)
    .bind(account.daily_limit)
    .bind(&account.credential)
    .bind(account.active)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn upsert_channel_group(
    group: ChannelGroup,
    members: Vec<ChannelGroupMember>,
    conn: &mut SqliteConnection,
) -> Result<(), RouterError> {
    sqlx::query(
        r#"INSERT INTO channel_groups (group_id, strategy, active) VALUES (?, ?, ?)
        ON CONFLICT (group_id) DO UPDATE SET strategy = excluded.strategy, active = excluded.active"#,
    )
    .bind(&group.group_id)
    .bind(group.strategy)
    .bind(group.active)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM channel_group_members WHERE group_id = ?")
        .bind(&group.group_id)
        .execute(&mut *conn)
        .await?;
    for member in members {
        sqlx::query("INSERT INTO channel_group_members (group_id, channel_account_id, sort_order) VALUES (?, ?, ?)")
            .bind(&group.group_id)
            .bind(&member.channel_account_id)
            .bind(member.sort_order)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
