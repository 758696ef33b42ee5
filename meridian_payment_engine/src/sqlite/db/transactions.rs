use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewTransaction, SettleId, SettleStatus, Transaction, TrxId, TrxStatus, TrxType},
    traits::{ModifyTransactionRequest, SettlementError, TransactionError},
};

pub async fn fetch_transaction(
    trx_id: &TrxId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, TransactionError> {
    let trx = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE trx_id = ?")
        .bind(trx_id)
        .fetch_optional(conn)
        .await?;
    Ok(trx)
}

/// Inserts a new pending transaction. Idempotent over `(merchant_id, req_id, trx_type)`: a replayed request
/// returns the row created the first time.
pub async fn insert_transaction(
    new_trx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, TransactionError> {
    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO transactions (
            trx_id, merchant_id, req_id, trx_type, currency, amount, usd_amount, trx_method, trx_mode, country
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&new_trx.trx_id)
    .bind(&new_trx.merchant_id)
    .bind(&new_trx.req_id)
    .bind(new_trx.trx_type)
    .bind(&new_trx.currency)
    .bind(new_trx.amount)
    .bind(new_trx.usd_amount)
    .bind(&new_trx.trx_method)
    .bind(&new_trx.trx_mode)
    .bind(&new_trx.country)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        debug!("💳️ Replayed transaction request {}/{} ({})", new_trx.merchant_id, new_trx.req_id, new_trx.trx_type);
    }
    let trx = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE merchant_id = ? AND req_id = ? AND trx_type = ?",
    )
    .bind(&new_trx.merchant_id)
    .bind(&new_trx.req_id)
    .bind(new_trx.trx_type)
    .fetch_one(conn)
    .await?;
    Ok(trx)
}

pub async fn complete_transaction(
    trx_id: &TrxId,
    completed_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Transaction, TransactionError> {
    let trx = fetch_transaction(trx_id, &mut *conn)
        .await?
        .ok_or_else(|| TransactionError::NotFound(trx_id.to_string()))?;
    if trx.status.is_terminal() {
        return Err(TransactionError::InvalidTransition(trx_id.clone(), format!("already {}", trx.status)));
    }
    sqlx::query("UPDATE transactions SET status = ?, completed_at = ?, updated_at = ? WHERE trx_id = ?")
        .bind(TrxStatus::Success)
        .bind(completed_at)
        .bind(Utc::now())
        .bind(trx_id)
        .execute(&mut *conn)
        .await?;
    fetch_transaction(trx_id, conn).await?.ok_or_else(|| TransactionError::NotFound(trx_id.to_string()))
}

pub async fn update_transaction(
    trx_id: &TrxId,
    update: ModifyTransactionRequest,
    conn: &mut SqliteConnection,
) -> Result<Transaction, TransactionError> {
    if update.is_empty() {
        return fetch_transaction(trx_id, conn).await?.ok_or_else(|| TransactionError::NotFound(trx_id.to_string()));
    }
    let mut builder = QueryBuilder::new("UPDATE transactions SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(status) = update.status {
        set_clause.push("status = ");
        set_clause.push_bind_unseparated(status);
    }
    if let Some(settle_status) = update.settle_status {
        set_clause.push("settle_status = ");
        set_clause.push_bind_unseparated(settle_status);
    }
    if let Some(settle_id) = update.settle_id {
        set_clause.push("settle_id = ");
        set_clause.push_bind_unseparated(settle_id);
    }
    if let Some(channel_account_id) = update.channel_account_id {
        set_clause.push("channel_account_id = ");
        set_clause.push_bind_unseparated(channel_account_id);
    }
    if let Some(completed_at) = update.completed_at {
        set_clause.push("completed_at = ");
        set_clause.push_bind_unseparated(completed_at);
    }
    if let Some(settled_at) = update.settled_at {
        set_clause.push("settled_at = ");
        set_clause.push_bind_unseparated(settled_at);
    }
    builder.push(" WHERE trx_id = ");
    builder.push_bind(trx_id);
    trace!("💳️ Executing transaction update: {}", builder.sql());
    builder.build().execute(&mut *conn).await?;
    fetch_transaction(trx_id, conn).await?.ok_or_else(|| TransactionError::NotFound(trx_id.to_string()))
}

//--------------------------------------  settlement scans  ----------------------------------------------------------

pub async fn count_unsettled(
    trx_type: TrxType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, SettlementError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM transactions
        WHERE trx_type = ? AND status = ? AND settle_status = ? AND completed_at >= ? AND completed_at < ?"#,
    )
    .bind(trx_type)
    .bind(TrxStatus::Success)
    .bind(SettleStatus::Pending)
    .bind(start)
    .bind(end)
    .fetch_one(conn)
    .await?;
    Ok(count as u64)
}

pub async fn fetch_unsettled_page(
    trx_type: TrxType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: u64,
    offset: u64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SettlementError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        r#"SELECT * FROM transactions
        WHERE trx_type = ? AND status = ? AND settle_status = ? AND completed_at >= ? AND completed_at < ?
        ORDER BY id ASC LIMIT ? OFFSET ?"#,
    )
    .bind(trx_type)
    .bind(TrxStatus::Success)
    .bind(SettleStatus::Pending)
    .bind(start)
    .bind(end)
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(conn)
    .await?;
    Ok(transactions)
}

/// Writes the settle id onto a transaction only if it is currently missing one. Returns whether a row changed.
pub async fn backfill_settle_id(
    trx_id: &TrxId,
    settle_id: &SettleId,
    conn: &mut SqliteConnection,
) -> Result<bool, SettlementError> {
    let result = sqlx::query(
        r#"UPDATE transactions SET settle_id = ?, updated_at = CURRENT_TIMESTAMP
        WHERE trx_id = ? AND (settle_id IS NULL OR settle_id = '')"#,
    )
    .bind(settle_id)
    .bind(trx_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
