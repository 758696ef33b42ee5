use thiserror::Error;

use crate::db_types::{Task, TaskStatus};

#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("No handler registered for key {0}")]
    HandlerNotFound(String),
    #[error("Task {0} timed out after {1}s")]
    Timeout(String, i64),
    #[error("Task was cancelled: {0}")]
    Cancelled(String),
    #[error("Task execution failed: {0}")]
    Execution(String),
    #[error("Scheduler error: {0}")]
    Scheduler(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for TaskError {
    fn from(e: sqlx::Error) -> Self {
        TaskError::DatabaseError(e.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for TaskError {
    fn from(e: tokio_cron_scheduler::JobSchedulerError) -> Self {
        TaskError::Scheduler(e.to_string())
    }
}

impl TaskError {
    pub fn code(&self) -> &'static str {
        match self {
            TaskError::HandlerNotFound(_) => "task.handler_not_found",
            TaskError::Timeout(..) => "task.timeout",
            TaskError::Cancelled(_) => "task.cancelled",
            TaskError::Execution(_) => "task.execution",
            TaskError::Scheduler(_) => "task.scheduler",
            TaskError::DatabaseError(_) => "task.database",
        }
    }
}

/// The scheduled-task registry. Tasks live in a table so operators can retune cron expressions and timeouts
/// without a redeploy; the scheduler reads them at startup.
#[allow(async_fn_in_trait)]
pub trait TaskManagement {
    async fn fetch_active_tasks(&self) -> Result<Vec<Task>, TaskError>;

    async fn upsert_task(&self, task: Task) -> Result<(), TaskError>;

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), TaskError>;
}
