use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlqueue_domain::entities::{Task, TaskStatus};
use mlqueue_domain::repositories::{TaskFilter, TaskRepository};
use mlqueue_errors::MLQueueResult;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

const TASK_COLUMNS: &str = "id, name, config, priority, status, metadata, result, \
     error_message, created_at, started_at, completed_at, user_id, updated_at";

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> MLQueueResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            config: row.try_get("config")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            metadata: row.try_get("metadata")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            user_id: row.try_get("user_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// 排序列白名单，默认 created_at
    fn sort_column(filter: &TaskFilter) -> &'static str {
        match filter.sort.as_deref() {
            Some("priority") => "priority",
            Some("status") => "status",
            Some("name") => "name",
            Some("started_at") => "started_at",
            _ => "created_at",
        }
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name))]
    async fn create(&self, task: &Task) -> MLQueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, name, config, priority, status, metadata, result,
                               error_message, created_at, started_at, completed_at, user_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&task.id)
        .bind(&task.name)
        .bind(&task.config)
        .bind(task.priority)
        .bind(task.status)
        .bind(&task.metadata)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(&task.user_id)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("任务已写入");
        Ok(())
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<Task>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get_unscoped(&self, id: &str) -> MLQueueResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self, user_id: &str, filter: &TaskFilter) -> MLQueueResult<(Vec<Task>, i64)> {
        let sort = Self::sort_column(filter);

        let (rows, total) = if let Some(status) = filter.status {
            let rows = sqlx::query(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 AND status = $2 \
                 ORDER BY {sort} DESC LIMIT $3 OFFSET $4"
            ))
            .bind(user_id)
            .bind(status)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = $1 AND status = $2")
                    .bind(user_id)
                    .bind(status)
                    .fetch_one(&self.pool)
                    .await?;
            (rows, total)
        } else {
            let rows = sqlx::query(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 \
                 ORDER BY {sort} DESC LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
            (rows, total)
        };

        let tasks: MLQueueResult<Vec<Task>> = rows.iter().map(Self::row_to_task).collect();
        Ok((tasks?, total))
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn update_priority(&self, id: &str, priority: i32) -> MLQueueResult<()> {
        sqlx::query("UPDATE tasks SET priority = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(priority)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_running(&self, id: &str, started_at: DateTime<Utc>) -> MLQueueResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', started_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_if_running(
        &self,
        id: &str,
        result: serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        // 条件写入：任务若已被取消（或以其他方式离开 running），完成结果不落盘
        let res = sqlx::query(
            "UPDATE tasks SET status = 'completed', result = $2, completed_at = $3, \
             updated_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(result)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn fail_if_running(
        &self,
        id: &str,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let res = sqlx::query(
            "UPDATE tasks SET status = 'failed', error_message = $2, completed_at = $3, \
             updated_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(error_message)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn cancel(&self, id: &str, error_message: &str) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'cancelled', error_message = $2, completed_at = NOW(), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upload_result(
        &self,
        id: &str,
        result: serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE tasks SET result = $2, status = 'completed', completed_at = $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(result)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> MLQueueResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_by_status(&self, user_id: &str, status: TaskStatus) -> MLQueueResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = $1 AND status = $2")
                .bind(user_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn running_sample(&self, user_id: &str, limit: i64) -> MLQueueResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 AND status = 'running' \
             ORDER BY started_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn count_created_between(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MLQueueResult<i64> {
        let count: i64 = if let Some(status) = status {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM tasks WHERE user_id = $1 AND status = $2 \
                 AND created_at >= $3 AND created_at <= $4",
            )
            .bind(user_id)
            .bind(status)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM tasks WHERE user_id = $1 \
                 AND created_at >= $2 AND created_at <= $3",
            )
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(count)
    }

    async fn completed_sample(&self, user_id: &str, limit: i64) -> MLQueueResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 AND status = 'completed' \
             AND started_at IS NOT NULL AND completed_at IS NOT NULL LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }
}
