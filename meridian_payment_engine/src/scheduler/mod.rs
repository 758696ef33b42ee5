//! Cron-driven task dispatch.
//!
//! Tasks live in the `tasks` table; each row names a cron expression, a handler key and a timeout. The scheduler
//! resolves keys against its handler registry at init time and launches handlers on schedule. A handler's future
//! is dropped when its timeout expires, which is the cancellation signal: any database work it was in the middle
//! of simply rolls back, and the settlement jobs are idempotent so the next tick repairs partial progress.

#[cfg(feature = "sqlite")]
mod handlers;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::db_types::Task;
#[cfg(feature = "sqlite")]
pub use crate::scheduler::handlers::{
    default_tasks,
    register_settlement_handlers,
    ACCOUNTING_KEY,
    BACKFILL_KEY,
    SETTLE_PAYIN_KEY,
    SETTLE_PAYOUT_KEY,
};
use crate::traits::TaskError;

/// What a handler receives when its task fires.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub handler_key: String,
    pub params: HashMap<String, serde_json::Value>,
    pub fired_at: DateTime<Utc>,
}

impl TaskContext {
    /// Reads an integer parameter, falling back to `default` when absent or malformed.
    pub fn param_i64(&self, key: &str, default: i64) -> i64 {
        self.params.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }
}

pub type TaskHandler =
    Arc<dyn Fn(TaskContext) -> Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>> + Send + Sync>;

/// `TaskScheduler` owns the cron runtime and the handler registry.
pub struct TaskScheduler {
    scheduler: JobScheduler,
    handlers: HashMap<String, TaskHandler>,
}

impl TaskScheduler {
    pub async fn new() -> Result<Self, TaskError> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self { scheduler, handlers: HashMap::new() })
    }

    /// Registers a handler under a key. Tasks reference handlers by key, so one handler can serve many task rows
    /// with different parameters.
    pub fn register_handler<F>(&mut self, key: &str, handler: F)
    where F: (Fn(TaskContext) -> Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>) + Send + Sync + 'static
    {
        self.handlers.insert(key.to_string(), Arc::new(handler));
    }

    /// Schedules every task against its registered handler. A task whose handler key is unknown fails the whole
    /// init, on the theory that a silently dropped job is worse than a loud startup error.
    pub async fn init_tasks(&mut self, tasks: Vec<Task>) -> Result<(), TaskError> {
        for task in tasks {
            let handler = self
                .handlers
                .get(&task.handler_key)
                .cloned()
                .ok_or_else(|| TaskError::HandlerNotFound(task.handler_key.clone()))?;
            let job = schedule_task(task, handler)?;
            self.scheduler.add(job).await?;
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<(), TaskError> {
        info!("⏰️ Starting task scheduler with {} handler(s)", self.handlers.len());
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), TaskError> {
        self.scheduler.shutdown().await?;
        info!("⏰️ Task scheduler shut down");
        Ok(())
    }
}

fn schedule_task(task: Task, handler: TaskHandler) -> Result<Job, TaskError> {
    let timeout = Duration::from_secs(task.timeout_secs.max(1) as u64);
    let cron = task.cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let handler = Arc::clone(&handler);
        let task = task.clone();
        Box::pin(async move {
            let ctx = TaskContext {
                task_id: task.task_id.clone(),
                handler_key: task.handler_key.clone(),
                params: task.params_map(),
                fired_at: Utc::now(),
            };
            debug!("⏰️ Task {} fired", task.task_id);
            match tokio::time::timeout(timeout, (handler)(ctx)).await {
                Ok(Ok(())) => debug!("⏰️ Task {} completed", task.task_id),
                Ok(Err(e)) => error!("⏰️ Task {} failed ({}): {e}", task.task_id, e.code()),
                Err(_) => {
                    let e = TaskError::Timeout(task.task_id.clone(), task.timeout_secs);
                    error!("⏰️ {e}");
                },
            }
        })
    })?;
    Ok(job)
}
