use async_trait::async_trait;
use mlqueue_domain::entities::ConfigTemplate;
use mlqueue_domain::repositories::TemplateRepository;
use mlqueue_errors::MLQueueResult;
use sqlx::{PgPool, Row};
use tracing::instrument;

pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_template(row: &sqlx::postgres::PgRow) -> MLQueueResult<ConfigTemplate> {
        Ok(ConfigTemplate {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            config: row.try_get("config")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    #[instrument(skip(self, template), fields(template_id = %template.id))]
    async fn create(&self, template: &ConfigTemplate) -> MLQueueResult<()> {
        sqlx::query(
            "INSERT INTO config_templates (id, name, config, description, created_at, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.config)
        .bind(&template.description)
        .bind(template.created_at)
        .bind(&template.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> MLQueueResult<Vec<ConfigTemplate>> {
        let rows = sqlx::query(
            "SELECT id, name, config, description, created_at, user_id FROM config_templates \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_template).collect()
    }
}
