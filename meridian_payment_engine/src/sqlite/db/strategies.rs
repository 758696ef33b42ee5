use sqlx::SqliteConnection;

use crate::{
    db_types::{PricedStrategy, SettleRule, SettleStrategy},
    traits::SettlementError,
};

/// Loads the named strategies and their rules, preserving the order of `codes`. Inactive and unknown codes are
/// skipped.
pub async fn strategies_by_codes(
    codes: &[String],
    conn: &mut SqliteConnection,
) -> Result<Vec<PricedStrategy>, SettlementError> {
    let mut result = Vec::with_capacity(codes.len());
    for code in codes {
        let strategy = sqlx::query_as::<_, SettleStrategy>(
            "SELECT * FROM settle_strategies WHERE strategy_code = ? AND active = 1",
        )
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;
        let Some(strategy) = strategy else { continue };
        let rules = sqlx::query_as::<_, SettleRule>(
            "SELECT * FROM settle_rules WHERE strategy_code = ? ORDER BY sort_order ASC, id ASC",
        )
        .bind(code)
        .fetch_all(&mut *conn)
        .await?;
        result.push(PricedStrategy { strategy, rules });
    }
    Ok(result)
}

pub async fn upsert_strategy(strategy: SettleStrategy, conn: &mut SqliteConnection) -> Result<(), SettlementError> {
    sqlx::query(
        r#"INSERT INTO settle_strategies (
            strategy_code, merchant_id, period_type, settle_ccy, trx_type, trx_mode, trx_method, country, trx_ccy, active
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (strategy_code) DO UPDATE SET
            merchant_id = excluded.merchant_id,
            period_type = excluded.period_type,
            settle_ccy = excluded.settle_ccy,
            trx_type = excluded.trx_type,
            trx_mode = excluded.trx_mode,
            trx_method = excluded.trx_method,
            country = excluded.country,
            trx_ccy = excluded.trx_ccy,
            active = excluded.active"#,
    )
    .bind(&strategy.strategy_code)
    .bind(&strategy.merchant_id)
    .bind(strategy.period_type)
    .bind(&strategy.settle_ccy)
    .bind(strategy.trx_type)
    .bind(&strategy.trx_mode)
    .bind(&strategy.trx_method)
    .bind(&strategy.country)
    .bind(&strategy.trx_ccy)
    .bind(strategy.active)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_rule(rule: SettleRule, conn: &mut SqliteConnection) -> Result<(), SettlementError> {
    sqlx::query(
        r#"INSERT INTO settle_rules (
            strategy_code, sort_order, trx_type, trx_mode, trx_method, country, trx_ccy,
            min_amount, max_amount, rate, fixed_fee, usd_rate, fixed_usd_fee,
            min_fee, max_fee, min_usd_fee, max_usd_fee
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&rule.strategy_code)
    .bind(rule.sort_order)
    .bind(rule.trx_type)
    .bind(&rule.trx_mode)
    .bind(&rule.trx_method)
    .bind(&rule.country)
    .bind(&rule.trx_ccy)
    .bind(rule.min_amount)
    .bind(rule.max_amount)
    .bind(rule.rate)
    .bind(rule.fixed_fee)
    .bind(rule.usd_rate)
    .bind(rule.fixed_usd_fee)
    .bind(rule.min_fee)
    .bind(rule.max_fee)
    .bind(rule.min_usd_fee)
    .bind(rule.max_usd_fee)
    .execute(conn)
    .await?;
    Ok(())
}
