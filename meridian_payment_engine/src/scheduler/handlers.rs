//! The stock settlement task handlers and their default schedules.

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{Task, TaskStatus, TrxType},
    helpers::utc_to_ms,
    scheduler::{TaskContext, TaskScheduler},
    traits::TaskError,
    SettlementApi,
    SqliteDatabase,
};

pub const SETTLE_PAYIN_KEY: &str = "settle.payin";
pub const SETTLE_PAYOUT_KEY: &str = "settle.payout";
pub const ACCOUNTING_KEY: &str = "settle.accounting";
pub const BACKFILL_KEY: &str = "settle.backfill";

fn default_task(task_id: &str, handler_key: &str, cron: &str, timeout_secs: i64, params: &str) -> Task {
    Task {
        id: 0,
        task_id: task_id.to_string(),
        task_type: "settlement".to_string(),
        handler_key: handler_key.to_string(),
        cron: cron.to_string(),
        timeout_secs,
        status: TaskStatus::Active,
        params: params.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// The stock schedule: payin settlement at 01:00, payout at 02:00, accounting every 15 minutes, settle-id
/// backfill at 03:00 (all UTC). Operators tune these by editing the task rows.
pub fn default_tasks() -> Vec<Task> {
    vec![
        default_task("settle_payin_daily", SETTLE_PAYIN_KEY, "0 0 1 * * *", 3600, r#"{"window_days": 3}"#),
        default_task("settle_payout_daily", SETTLE_PAYOUT_KEY, "0 0 2 * * *", 3600, r#"{"window_days": 3}"#),
        default_task("settle_accounting", ACCOUNTING_KEY, "0 */15 * * * *", 600, "{}"),
        default_task("settle_id_backfill", BACKFILL_KEY, "0 0 3 * * *", 1800, r#"{"window_days": 7}"#),
    ]
}

async fn run_settle_window(db: SqliteDatabase, trx_type: TrxType, ctx: TaskContext) -> Result<(), TaskError> {
    let days = ctx.param_i64("window_days", 3);
    let end = ctx.fired_at;
    let start = end - Duration::days(days);
    let api = SettlementApi::new(db);
    let result = api
        .settle_by_time_range(trx_type, utc_to_ms(start), utc_to_ms(end))
        .await
        .map_err(|e| TaskError::Execution(e.to_string()))?;
    info!(
        "⏰️ Scheduled {trx_type} settlement: {}/{} settled, {} failed",
        result.success, result.total, result.failed
    );
    Ok(())
}

/// Wires the four stock handlers to a SQLite backend.
pub fn register_settlement_handlers(scheduler: &mut TaskScheduler, db: SqliteDatabase) {
    let payin_db = db.clone();
    scheduler.register_handler(SETTLE_PAYIN_KEY, move |ctx| {
        let db = payin_db.clone();
        Box::pin(run_settle_window(db, TrxType::Payin, ctx))
    });
    let payout_db = db.clone();
    scheduler.register_handler(SETTLE_PAYOUT_KEY, move |ctx| {
        let db = payout_db.clone();
        Box::pin(run_settle_window(db, TrxType::Payout, ctx))
    });
    let accounting_db = db.clone();
    scheduler.register_handler(ACCOUNTING_KEY, move |ctx| {
        let db = accounting_db.clone();
        Box::pin(async move {
            let api = SettlementApi::new(db);
            let result = api
                .process_batch_settle_accounting(utc_to_ms(ctx.fired_at))
                .await
                .map_err(|e| TaskError::Execution(e.to_string()))?;
            info!("⏰️ Scheduled accounting: {}/{} cycles posted", result.success, result.total);
            Ok(())
        })
    });
    let backfill_db = db;
    scheduler.register_handler(BACKFILL_KEY, move |ctx| {
        let db = backfill_db.clone();
        Box::pin(async move {
            let days = ctx.param_i64("window_days", 7);
            let end = ctx.fired_at;
            let start = end - Duration::days(days);
            let api = SettlementApi::new(db);
            let result = api
                .backfill_settle_ids(utc_to_ms(start), utc_to_ms(end))
                .await
                .map_err(|e| TaskError::Execution(e.to_string()))?;
            info!("⏰️ Scheduled backfill: {} scanned, {} repaired", result.scanned, result.updated);
            Ok(())
        })
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_tasks_cover_the_stock_schedule() {
        let tasks = default_tasks();
        assert_eq!(tasks.len(), 4);
        let keys: Vec<&str> = tasks.iter().map(|t| t.handler_key.as_str()).collect();
        assert!(keys.contains(&SETTLE_PAYIN_KEY));
        assert!(keys.contains(&SETTLE_PAYOUT_KEY));
        assert!(keys.contains(&ACCOUNTING_KEY));
        assert!(keys.contains(&BACKFILL_KEY));
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Active));
        assert!(tasks.iter().all(|t| t.timeout_secs > 0));
    }

    #[test]
    fn window_params_parse() {
        let task = default_tasks().remove(0);
        let params = task.params_map();
        let ctx = TaskContext { task_id: task.task_id, handler_key: task.handler_key, params, fired_at: Utc::now() };
        assert_eq!(ctx.param_i64("window_days", 0), 3);
        assert_eq!(ctx.param_i64("missing", 9), 9);
    }
}
