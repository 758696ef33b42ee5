use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Contract, TrxType},
    traits::SettlementError,
};

/// The contract in force for `(merchant_id, trx_type)` at `at`. When several overlap, the most recently
/// effective one wins.
pub async fn contract_at(
    merchant_id: &str,
    trx_type: TrxType,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Contract>, SettlementError> {
    let contract = sqlx::query_as::<_, Contract>(
        r#"SELECT * FROM merchant_contracts
        WHERE merchant_id = ? AND trx_type = ? AND active = 1
          AND effective_from <= ? AND (effective_to IS NULL OR effective_to > ?)
        ORDER BY effective_from DESC LIMIT 1"#,
    )
    .bind(merchant_id)
    .bind(trx_type)
    .bind(at)
    .bind(at)
    .fetch_optional(conn)
    .await?;
    Ok(contract)
}

pub async fn insert_contract(contract: Contract, conn: &mut SqliteConnection) -> Result<(), SettlementError> {
    sqlx::query(
        r#"INSERT INTO merchant_contracts (
            merchant_id, trx_type, period_type, settle_ccy, strategy_codes, effective_from, effective_to, active
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&contract.merchant_id)
    .bind(contract.trx_type)
    .bind(contract.period_type)
    .bind(&contract.settle_ccy)
    .bind(&contract.strategy_codes)
    .bind(contract.effective_from)
    .bind(contract.effective_to)
    .bind(contract.active)
    .execute(conn)
    .await?;
    Ok(())
}
