use chrono::Utc;
use log::{debug, trace};
use mpg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Account, BalanceOperation, BusinessType, NewFundFlow, UserType},
    helpers::{new_account_id, new_flow_no},
    sqlite::db::flows,
    traits::{BalanceUpdate, LedgerError, UpdateBalanceRequest},
};

const ACCOUNT_COLUMNS: &str = r#"
    id,
    account_id,
    user_id,
    user_type,
    currency,
    total,
    available,
    frozen,
    margin,
    reserve,
    version,
    status,
    created_at,
    updated_at,
    last_active_at
"#;

pub async fn fetch_account(
    user_id: &str,
    user_type: UserType,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Account>, LedgerError> {
    let q = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ? AND user_type = ? AND currency = ?");
    let account = sqlx::query_as::<_, Account>(&q)
        .bind(user_id)
        .bind(user_type)
        .bind(currency)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn fetch_account_by_account_id(
    account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Account>, LedgerError> {
    let q = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = ?");
    let account = sqlx::query_as::<_, Account>(&q).bind(account_id).fetch_optional(conn).await?;
    Ok(account)
}

pub async fn fetch_accounts_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Account>, LedgerError> {
    let q = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ? ORDER BY id");
    let accounts = sqlx::query_as::<_, Account>(&q).bind(user_id).fetch_all(conn).await?;
    Ok(accounts)
}

/// Creates a zero-balance account for the owner triple if none exists, and returns the current row either way.
/// `INSERT OR IGNORE` plus the unique owner index makes this race-safe.
pub async fn fetch_or_create_account(
    user_id: &str,
    user_type: UserType,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Account, LedgerError> {
    let account_id = new_account_id();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO accounts (account_id, user_id, user_type, currency) VALUES (?, ?, ?, ?)",
    )
    .bind(&account_id)
    .bind(user_id)
    .bind(user_type)
    .bind(currency)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        debug!("🧑️ Created new {currency} account {account_id} for {user_type} {user_id}");
    }
    fetch_account(user_id, user_type, currency, conn)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(format!("{user_type} {user_id} ({currency})")))
}

/// Applies one balance operation atomically. The caller supplies a connection that is already inside a database
/// transaction; SQLite's single-writer lock serializes concurrent mutations on the same account.
///
/// When `transaction_id` is set and a flow for `(account, transaction_id, flow_type)` already exists, the request
/// is a replay: the prior flow is returned and nothing is written.
pub async fn update_balance(
    req: UpdateBalanceRequest,
    conn: &mut SqliteConnection,
) -> Result<BalanceUpdate, LedgerError> {
    let op = req.operation;
    let account = match fetch_account(&req.user_id, req.user_type, &req.currency, &mut *conn).await? {
        Some(account) => account,
        None if op == BalanceOperation::Add => {
            fetch_or_create_account(&req.user_id, req.user_type, &req.currency, &mut *conn).await?
        },
        None => {
            return Err(LedgerError::AccountNotFound(format!(
                "{} {} ({})",
                req.user_type, req.user_id, req.currency
            )))
        },
    };
    if let Some(txid) = &req.transaction_id {
        if let Some(flow) = flows::fetch_flow_for_transaction(&account.account_id, txid, op.flow_type(), &mut *conn).await? {
            trace!("📒️ Replayed balance update {txid}/{op} on account {}", account.account_id);
            return Ok(BalanceUpdate { account, flow, replayed: true });
        }
    }

    let before_balance = account.total;
    let updated = apply_operation(&account, op, req.amount)?;
    let now = Utc::now();
    sqlx::query(
        r#"UPDATE accounts SET
            total = ?,
            available = ?,
            frozen = ?,
            margin = ?,
            reserve = ?,
            version = version + 1,
            updated_at = ?,
            last_active_at = ?
        WHERE account_id = ?"#,
    )
    .bind(updated.total)
    .bind(updated.available)
    .bind(updated.frozen)
    .bind(updated.margin)
    .bind(updated.reserve)
    .bind(now)
    .bind(now)
    .bind(&account.account_id)
    .execute(&mut *conn)
    .await?;

    let new_flow = NewFundFlow {
        flow_no: new_flow_no(),
        user_id: req.user_id.clone(),
        user_type: req.user_type,
        account_id: account.account_id.clone(),
        transaction_id: req.transaction_id.clone(),
        bill_id: req.bill_id.clone(),
        flow_type: op.flow_type(),
        amount: req.amount,
        currency: req.currency.clone(),
        before_balance,
        after_balance: updated.total,
        business_type: req.business_type.unwrap_or(BusinessType::Adjust),
        description: req.description.clone(),
    };
    let flow = flows::insert_flow(new_flow, &mut *conn).await?;
    let account = fetch_account_by_account_id(&account.account_id, conn)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account.account_id.clone()))?;
    debug!(
        "🧑️ Applied {op} {} {} to account {}. Balance: {} -> {}",
        req.amount, req.currency, account.account_id, before_balance, account.total
    );
    Ok(BalanceUpdate { account, flow, replayed: false })
}

struct UpdatedBuckets {
    total: Money,
    available: Money,
    frozen: Money,
    margin: Money,
    reserve: Money,
}

fn apply_operation(account: &Account, op: BalanceOperation, amount: Money) -> Result<UpdatedBuckets, LedgerError> {
    let mut b = UpdatedBuckets {
        total: account.total,
        available: account.available,
        frozen: account.frozen,
        margin: account.margin,
        reserve: account.reserve,
    };
    match op {
        BalanceOperation::Add => {
            b.total += amount;
            b.available += amount;
        },
        BalanceOperation::Subtract => {
            if b.available < amount {
                return Err(insufficient_available(&b, amount));
            }
            b.total -= amount;
            b.available -= amount;
        },
        BalanceOperation::Freeze => {
            if b.available < amount {
                return Err(insufficient_available(&b, amount));
            }
            b.available -= amount;
            b.frozen += amount;
        },
        BalanceOperation::Unfreeze => {
            if b.frozen < amount {
                return Err(LedgerError::InsufficientFrozen {
                    frozen: b.frozen.to_string(),
                    requested: amount.to_string(),
                });
            }
            b.frozen -= amount;
            b.available += amount;
        },
        BalanceOperation::Margin => {
            if b.available < amount {
                return Err(insufficient_available(&b, amount));
            }
            b.available -= amount;
            b.margin += amount;
        },
        BalanceOperation::ReleaseMargin => {
            if b.margin < amount {
                return Err(LedgerError::InsufficientMargin {
                    margin: b.margin.to_string(),
                    requested: amount.to_string(),
                });
            }
            b.margin -= amount;
            b.available += amount;
        },
    }
    Ok(b)
}

fn insufficient_available(b: &UpdatedBuckets, requested: Money) -> LedgerError {
    LedgerError::InsufficientAvailable { available: b.available.to_string(), requested: requested.to_string() }
}
