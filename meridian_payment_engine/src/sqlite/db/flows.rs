use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{FlowType, FundFlow, NewFundFlow},
    traits::{FlowQuery, LedgerError},
};

pub async fn insert_flow(flow: NewFundFlow, conn: &mut SqliteConnection) -> Result<FundFlow, LedgerError> {
    sqlx::query(
        r#"INSERT INTO fund_flows (
            flow_no, user_id, user_type, account_id, transaction_id, bill_id, flow_type, amount, currency,
            before_balance, after_balance, business_type, description
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&flow.flow_no)
    .bind(&flow.user_id)
    .bind(flow.user_type)
    .bind(&flow.account_id)
    .bind(&flow.transaction_id)
    .bind(&flow.bill_id)
    .bind(flow.flow_type)
    .bind(flow.amount)
    .bind(&flow.currency)
    .bind(flow.before_balance)
    .bind(flow.after_balance)
    .bind(flow.business_type)
    .bind(&flow.description)
    .execute(&mut *conn)
    .await?;
    let flow = sqlx::query_as::<_, FundFlow>("SELECT * FROM fund_flows WHERE flow_no = ?")
        .bind(&flow.flow_no)
        .fetch_one(conn)
        .await?;
    Ok(flow)
}

pub async fn fetch_flow_for_transaction(
    account_id: &str,
    transaction_id: &str,
    flow_type: FlowType,
    conn: &mut SqliteConnection,
) -> Result<Option<FundFlow>, LedgerError> {
    let flow = sqlx::query_as::<_, FundFlow>(
        "SELECT * FROM fund_flows WHERE account_id = ? AND transaction_id = ? AND flow_type = ?",
    )
    .bind(account_id)
    .bind(transaction_id)
    .bind(flow_type)
    .fetch_optional(conn)
    .await?;
    Ok(flow)
}

pub async fn search_flows(query: FlowQuery, conn: &mut SqliteConnection) -> Result<Vec<FundFlow>, LedgerError> {
    let mut builder = QueryBuilder::new("SELECT * FROM fund_flows ");
    let has_filter = query.account_id.is_some()
        || query.user_id.is_some()
        || query.transaction_id.is_some()
        || query.flow_type.is_some()
        || query.business_type.is_some()
        || query.since.is_some()
        || query.until.is_some();
    if has_filter {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(account_id) = query.account_id {
        where_clause.push("account_id = ");
        where_clause.push_bind_unseparated(account_id);
    }
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(transaction_id) = query.transaction_id {
        where_clause.push("transaction_id = ");
        where_clause.push_bind_unseparated(transaction_id);
    }
    if let Some(flow_type) = query.flow_type {
        where_clause.push("flow_type = ");
        where_clause.push_bind_unseparated(flow_type);
    }
    if let Some(business_type) = query.business_type {
        where_clause.push("business_type = ");
        where_clause.push_bind_unseparated(business_type);
    }
    if let Some(since) = query.since {
        where_clause.push("flow_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("flow_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY id ASC LIMIT ");
    builder.push_bind(query.page_size as i64);
    builder.push(" OFFSET ");
    builder.push_bind((query.page * query.page_size) as i64);
    trace!("📒️ Executing flow search: {}", builder.sql());
    let flows = builder.build_query_as::<FundFlow>().fetch_all(conn).await?;
    Ok(flows)
}
