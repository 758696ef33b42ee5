use sqlx::SqliteConnection;

use crate::{
    db_types::{Task, TaskStatus},
    traits::TaskError,
};

pub async fn fetch_active_tasks(conn: &mut SqliteConnection) -> Result<Vec<Task>, TaskError> {
    let tasks = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE status = ? ORDER BY id ASC")
        .bind(TaskStatus::Active)
        .fetch_all(conn)
        .await?;
    Ok(tasks)
}

pub async fn upsert_task(task: Task, conn: &mut SqliteConnection) -> Result<(), TaskError> {
    sqlx::query(
        r#"INSERT INTO tasks (task_id, task_type, handler_key, cron, timeout_secs, status, params)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (task_id) DO UPDATE SET
            task_type = excluded.task_type,
            handler_key = excluded.handler_key,
            cron = excluded.cron,
            timeout_secs = excluded.timeout_secs,
            status = excluded.status,
            params = excluded.params,
            updated_at = CURRENT_TIMESTAMP"#,
    )
    .bind(&task.task_id)
    .bind(&task.task_type)
    .bind(&task.handler_key)
    .bind(&task.cron)
    .bind(task.timeout_secs)
    .bind(task.status)
    .bind(&task.params)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_task_status(task_id: &str, status: TaskStatus, conn: &mut SqliteConnection) -> Result<(), TaskError> {
    sqlx::query("UPDATE tasks SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE task_id = ?")
        .bind(status)
        .bind(task_id)
        .execute(conn)
        .await?;
    Ok(())
}
