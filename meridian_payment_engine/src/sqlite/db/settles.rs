use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        MerchantSettle,
        MerchantSettleTransaction,
        NewSettleCycle,
        PeriodType,
        SettleId,
        SettleStatus,
        TrxId,
    },
    sqlite::db::transactions,
    traits::{ModifyTransactionRequest, SettlementError, SettlementRecord},
};

pub async fn fetch_cycle(
    merchant_id: &str,
    period_type: PeriodType,
    period: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantSettle>, SettlementError> {
    let cycle = sqlx::query_as::<_, MerchantSettle>(
        "SELECT * FROM merchant_settles WHERE merchant_id = ? AND period_type = ? AND period = ?",
    )
    .bind(merchant_id)
    .bind(period_type)
    .bind(period)
    .fetch_optional(conn)
    .await?;
    Ok(cycle)
}

pub async fn fetch_cycle_by_settle_id(
    settle_id: &SettleId,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantSettle>, SettlementError> {
    let cycle = sqlx::query_as::<_, MerchantSettle>("SELECT * FROM merchant_settles WHERE settle_id = ?")
        .bind(settle_id)
        .fetch_optional(conn)
        .await?;
    Ok(cycle)
}

/// Insert-or-fetch on the cycle key `(merchant_id, period_type, period)`. Concurrent workers racing on the same
/// key all end up with the same row; losers of the insert race simply fetch the winner's record.
pub async fn fetch_or_create_cycle(
    cycle: NewSettleCycle,
    conn: &mut SqliteConnection,
) -> Result<MerchantSettle, SettlementError> {
    let strategy_codes = serde_json::to_string(&cycle.strategy_codes)
        .map_err(|e| SettlementError::Calculation(format!("strategy codes are not serializable: {e}")))?;
    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO merchant_settles (
            settle_id, merchant_id, trx_type, period_type, period, settle_ccy,
            trx_start_at, trx_end_at, strategy_codes, mature_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&cycle.settle_id)
    .bind(&cycle.merchant_id)
    .bind(cycle.trx_type)
    .bind(cycle.period_type)
    .bind(cycle.period)
    .bind(&cycle.settle_ccy)
    .bind(cycle.trx_start_at)
    .bind(cycle.trx_end_at)
    .bind(&strategy_codes)
    .bind(cycle.mature_at)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        debug!(
            "🧮️ Created settle cycle {} for ({}, {}, {})",
            cycle.settle_id, cycle.merchant_id, cycle.period_type, cycle.period
        );
    }
    fetch_cycle(&cycle.merchant_id, cycle.period_type, cycle.period, conn).await?.ok_or_else(|| {
        SettlementError::CycleNotFound(format!("({}, {}, {})", cycle.merchant_id, cycle.period_type, cycle.period))
    })
}

pub async fn fetch_settle_transaction(
    trx_id: &TrxId,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantSettleTransaction>, SettlementError> {
    let record =
        sqlx::query_as::<_, MerchantSettleTransaction>("SELECT * FROM merchant_settle_transactions WHERE trx_id = ?")
            .bind(trx_id)
            .fetch_optional(conn)
            .await?;
    Ok(record)
}

/// Persists one settled transaction. The caller wraps this in a database transaction so that the settlement
/// record, the transaction row and the cycle aggregates move together.
///
/// The first statement writes the cycle row, which takes SQLite's write lock before any read in this
/// transaction. Concurrent workers on the same cycle queue on the busy timeout instead of reading a stale
/// snapshot, so the aggregate read-modify-write below is serialized.
///
/// Returns `false` when a successful record already exists for the transaction: nothing is written and the
/// caller treats the item as settled.
pub async fn persist_settlement(
    record: SettlementRecord,
    conn: &mut SqliteConnection,
) -> Result<bool, SettlementError> {
    let locked = sqlx::query("UPDATE merchant_settles SET updated_at = ? WHERE settle_id = ?")
        .bind(Utc::now())
        .bind(&record.settle_id)
        .execute(&mut *conn)
        .await?;
    if locked.rows_affected() == 0 {
        return Err(SettlementError::CycleNotFound(record.settle_id.to_string()));
    }
    let existing = fetch_settle_transaction(&record.trx_id, &mut *conn).await?;
    if let Some(existing) = &existing {
        if existing.status == SettleStatus::Success {
            trace!("🧮️ Transaction {} is already settled under {}", record.trx_id, existing.settle_id);
            return Ok(false);
        }
    }
    let now = Utc::now();
    let strategy_snapshot = serde_json::to_string(&record.strategy)
        .map_err(|e| SettlementError::Calculation(format!("strategy snapshot: {e}")))?;
    let rule_snapshot = serde_json::to_string(&record.rule)
        .map_err(|e| SettlementError::Calculation(format!("rule snapshot: {e}")))?;
    let c = &record.computation;
    if existing.is_some() {
        sqlx::query(
            r#"UPDATE merchant_settle_transactions SET
                settle_id = ?, fee = ?, usd_fee = ?, settle_amount = ?, settle_usd_amount = ?,
                strategy_snapshot = ?, rule_snapshot = ?, status = ?, settled_at = ?, updated_at = ?
            WHERE trx_id = ?"#,
        )
        .bind(&record.settle_id)
        .bind(c.fee)
        .bind(c.usd_fee)
        .bind(c.settle_amount)
        .bind(c.settle_usd_amount)
        .bind(&strategy_snapshot)
        .bind(&rule_snapshot)
        .bind(SettleStatus::Success)
        .bind(now)
        .bind(now)
        .bind(&record.trx_id)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            r#"INSERT INTO merchant_settle_transactions (
                trx_id, settle_id, merchant_id, currency, amount, usd_amount, fee, usd_fee,
                settle_amount, settle_usd_amount, strategy_snapshot, rule_snapshot, status, settled_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.trx_id)
        .bind(&record.settle_id)
        .bind(&record.merchant_id)
        .bind(&record.currency)
        .bind(record.amount)
        .bind(record.usd_amount)
        .bind(c.fee)
        .bind(c.usd_fee)
        .bind(c.settle_amount)
        .bind(c.settle_usd_amount)
        .bind(&strategy_snapshot)
        .bind(&rule_snapshot)
        .bind(SettleStatus::Success)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    let update = ModifyTransactionRequest {
        settle_status: Some(SettleStatus::Success),
        settle_id: Some(record.settle_id.clone()),
        settled_at: Some(now),
        ..Default::default()
    };
    transactions::update_transaction(&record.trx_id, update, &mut *conn)
        .await
        .map_err(|e| SettlementError::DatabaseError(e.to_string()))?;

    // Amounts are TEXT decimals, so the aggregate arithmetic happens here, not in SQL. This read sees the
    // latest committed state because the write lock was taken at the top of the transaction.
    let cycle = fetch_cycle_by_settle_id(&record.settle_id, &mut *conn)
        .await?
        .ok_or_else(|| SettlementError::CycleNotFound(record.settle_id.to_string()))?;
    sqlx::query(
        "UPDATE merchant_settles SET settle_amount = ?, settle_usd_amount = ?, updated_at = ? WHERE settle_id = ?",
    )
    .bind(cycle.settle_amount + c.settle_amount)
    .bind(cycle.settle_usd_amount + c.settle_usd_amount)
    .bind(now)
    .bind(&record.settle_id)
    .execute(conn)
    .await?;
    Ok(true)
}

/// Cycle records that have matured and are still unposted. The positive-amount filter happens in Rust because
/// amounts are stored as TEXT.
pub async fn mature_cycles(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<MerchantSettle>, SettlementError> {
    let cycles = sqlx::query_as::<_, MerchantSettle>(
        "SELECT * FROM merchant_settles WHERE mature_at <= ? AND completed_at IS NULL ORDER BY id ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(cycles.into_iter().filter(|c| c.settle_amount.is_positive()).collect())
}

pub async fn mark_cycle_completed(
    settle_id: &SettleId,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    sqlx::query("UPDATE merchant_settles SET completed_at = ?, updated_at = ? WHERE settle_id = ?")
        .bind(at)
        .bind(Utc::now())
        .bind(settle_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_settle_records_page(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: u64,
    offset: u64,
    conn: &mut SqliteConnection,
) -> Result<Vec<MerchantSettleTransaction>, SettlementError> {
    let records = sqlx::query_as::<_, MerchantSettleTransaction>(
        r#"SELECT * FROM merchant_settle_transactions
        WHERE created_at >= ? AND created_at < ?
        ORDER BY id ASC LIMIT ? OFFSET ?"#,
    )
    .bind(start)
    .bind(end)
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(conn)
    .await?;
    Ok(records)
}
