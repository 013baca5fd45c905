use async_trait::async_trait;
use mlqueue_domain::entities::WebhookSink;
use mlqueue_domain::repositories::WebhookRepository;
use mlqueue_errors::MLQueueResult;
use sqlx::{PgPool, Row};
use tracing::instrument;

pub struct PostgresWebhookRepository {
    pool: PgPool,
}

impl PostgresWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_sink(row: &sqlx::postgres::PgRow) -> MLQueueResult<WebhookSink> {
        Ok(WebhookSink {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            url: row.try_get("url")?,
            events: row.try_get("events")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl WebhookRepository for PostgresWebhookRepository {
    async fn list_active(&self, user_id: &str) -> MLQueueResult<Vec<WebhookSink>> {
        let rows = sqlx::query(
            "SELECT id, user_id, url, events, active, created_at FROM webhook_configs \
             WHERE user_id = $1 AND active = TRUE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_sink).collect()
    }

    #[instrument(skip(self, sink), fields(user_id = %sink.user_id, url = %sink.url))]
    async fn create(&self, sink: &WebhookSink) -> MLQueueResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO webhook_configs (user_id, url, events, active, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&sink.user_id)
        .bind(&sink.url)
        .bind(&sink.events)
        .bind(sink.active)
        .bind(sink.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}
