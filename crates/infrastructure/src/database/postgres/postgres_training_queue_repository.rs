use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlqueue_domain::entities::{QueueStatus, TrainingQueue};
use mlqueue_domain::repositories::TrainingQueueRepository;
use mlqueue_errors::{MLQueueError, MLQueueResult};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

const QUEUE_COLUMNS: &str = "id, unit_id, name, parameters, queue_order, status, started_at, \
     completed_at, result, metrics, error_msg, created_by, created_at, updated_at, user_id";

pub struct PostgresTrainingQueueRepository {
    pool: PgPool,
}

impl PostgresTrainingQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_queue(row: &sqlx::postgres::PgRow) -> MLQueueResult<TrainingQueue> {
        Ok(TrainingQueue {
            id: row.try_get("id")?,
            unit_id: row.try_get("unit_id")?,
            name: row.try_get("name")?,
            parameters: row.try_get("parameters")?,
            queue_order: row.try_get("queue_order")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            result: row.try_get("result")?,
            metrics: row.try_get("metrics")?,
            error_msg: row.try_get("error_msg")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

#[async_trait]
impl TrainingQueueRepository for PostgresTrainingQueueRepository {
    #[instrument(skip(self, queue), fields(queue_id = %queue.id, unit_id = %queue.unit_id))]
    async fn create(&self, queue: &TrainingQueue) -> MLQueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO training_queues (id, unit_id, name, parameters, queue_order, status,
                                         started_at, completed_at, result, metrics, error_msg,
                                         created_by, created_at, updated_at, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&queue.id)
        .bind(&queue.unit_id)
        .bind(&queue.name)
        .bind(&queue.parameters)
        .bind(queue.queue_order)
        .bind(queue.status)
        .bind(queue.started_at)
        .bind(queue.completed_at)
        .bind(&queue.result)
        .bind(&queue.metrics)
        .bind(&queue.error_msg)
        .bind(queue.created_by)
        .bind(queue.created_at)
        .bind(queue.updated_at)
        .bind(&queue.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn max_order(&self, unit_id: &str) -> MLQueueResult<i32> {
        let max: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(queue_order), -1) FROM training_queues WHERE unit_id = $1",
        )
        .bind(unit_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<TrainingQueue>> {
        let row = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM training_queues WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_queue).transpose()
    }

    async fn get_many(
        &self,
        ids: &[String],
        user_id: &str,
    ) -> MLQueueResult<Vec<TrainingQueue>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM training_queues WHERE id = ANY($1) AND user_id = $2"
        ))
        .bind(ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_queue).collect()
    }

    async fn list_by_unit(
        &self,
        unit_id: &str,
        status: Option<QueueStatus>,
    ) -> MLQueueResult<Vec<TrainingQueue>> {
        let rows = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {QUEUE_COLUMNS} FROM training_queues \
                 WHERE unit_id = $1 AND status = $2 ORDER BY queue_order ASC"
            ))
            .bind(unit_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {QUEUE_COLUMNS} FROM training_queues \
                 WHERE unit_id = $1 ORDER BY queue_order ASC"
            ))
            .bind(unit_id)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(Self::row_to_queue).collect()
    }

    #[instrument(skip(self, queue), fields(queue_id = %queue.id))]
    async fn update_fields(&self, queue: &TrainingQueue) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE training_queues SET name = $2, parameters = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(&queue.id)
        .bind(&queue.name)
        .bind(&queue.parameters)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue_id = %id))]
    async fn delete(&self, id: &str) -> MLQueueResult<()> {
        // 不回填剩余队列的 order，留下空洞
        sqlx::query("DELETE FROM training_queues WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_by_unit(&self, unit_id: &str) -> MLQueueResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM training_queues WHERE unit_id = $1")
                .bind(unit_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_non_pending(&self, unit_id: &str) -> MLQueueResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM training_queues WHERE unit_id = $1 AND status <> 'pending'",
        )
        .bind(unit_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn start_if_pending(&self, id: &str, now: DateTime<Utc>) -> MLQueueResult<bool> {
        let result = sqlx::query(
            "UPDATE training_queues SET status = 'running', started_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_if_running(
        &self,
        id: &str,
        result: Option<serde_json::Value>,
        metrics: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let res = sqlx::query(
            "UPDATE training_queues SET status = 'completed', completed_at = $2, result = $3, \
             metrics = $4, updated_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(now)
        .bind(result)
        .bind(metrics)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn fail_if_running(
        &self,
        id: &str,
        error_msg: &str,
        now: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let res = sqlx::query(
            "UPDATE training_queues SET status = 'failed', completed_at = $2, error_msg = $3, \
             updated_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(now)
        .bind(error_msg)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self, ordered_ids), fields(unit_id = %unit_id, count = ordered_ids.len()))]
    async fn reorder(
        &self,
        unit_id: &str,
        ordered_ids: &[String],
        start_order: i32,
    ) -> MLQueueResult<()> {
        // 单事务内重排：任何一行不满足（不属于该单元 / 非 pending）则整体回滚
        let mut tx = self.pool.begin().await?;

        for (i, id) in ordered_ids.iter().enumerate() {
            let result = sqlx::query(
                "UPDATE training_queues SET queue_order = $1, updated_at = NOW() \
                 WHERE id = $2 AND unit_id = $3 AND status = 'pending'",
            )
            .bind(start_order + i as i32)
            .bind(id)
            .bind(unit_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(MLQueueError::InvalidQueueStatus(format!(
                    "队列 {id} 不属于该单元或不是 pending 状态"
                )));
            }
        }

        tx.commit().await?;
        debug!("队列重排完成");
        Ok(())
    }
}
