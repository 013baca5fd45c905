use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlqueue_domain::entities::{TrainingUnit, UnitStatus};
use mlqueue_domain::repositories::UnitRepository;
use mlqueue_errors::MLQueueResult;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

const UNIT_COLUMNS: &str = "id, group_id, name, description, config, version, status, \
     connection_status, last_heartbeat, created_at, updated_at, user_id";

pub struct PostgresUnitRepository {
    pool: PgPool,
}

impl PostgresUnitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_unit(row: &sqlx::postgres::PgRow) -> MLQueueResult<TrainingUnit> {
        Ok(TrainingUnit {
            id: row.try_get("id")?,
            group_id: row.try_get("group_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            config: row.try_get("config")?,
            version: row.try_get("version")?,
            status: row.try_get("status")?,
            connection_status: row.try_get("connection_status")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

#[async_trait]
impl UnitRepository for PostgresUnitRepository {
    #[instrument(skip(self, unit), fields(unit_id = %unit.id, group_id = %unit.group_id))]
    async fn create(&self, unit: &TrainingUnit) -> MLQueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO training_units (id, group_id, name, description, config, version,
                                        status, connection_status, last_heartbeat,
                                        created_at, updated_at, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&unit.id)
        .bind(&unit.group_id)
        .bind(&unit.name)
        .bind(&unit.description)
        .bind(&unit.config)
        .bind(unit.version)
        .bind(unit.status)
        .bind(unit.connection_status)
        .bind(unit.last_heartbeat)
        .bind(unit.created_at)
        .bind(unit.updated_at)
        .bind(&unit.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<TrainingUnit>> {
        let row = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM training_units WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_unit).transpose()
    }

    async fn list_by_group(&self, group_id: &str) -> MLQueueResult<Vec<TrainingUnit>> {
        let rows = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM training_units WHERE group_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_unit).collect()
    }

    async fn count_by_group(&self, group_id: &str) -> MLQueueResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM training_units WHERE group_id = $1")
                .bind(group_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    #[instrument(skip(self, unit), fields(unit_id = %unit.id))]
    async fn update_fields(&self, unit: &TrainingUnit) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE training_units SET name = $2, description = $3, config = $4, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(&unit.id)
        .bind(&unit.name)
        .bind(&unit.description)
        .bind(&unit.config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bump_version(&self, id: &str) -> MLQueueResult<i32> {
        // 行内原子递增：并发写者不会互相丢失增量
        let version: i32 = sqlx::query_scalar(
            "UPDATE training_units SET version = version + 1, updated_at = NOW() \
             WHERE id = $1 RETURNING version",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        debug!(unit_id = id, version, "单元版本号递增");
        Ok(version)
    }

    async fn set_status(&self, id: &str, status: UnitStatus) -> MLQueueResult<()> {
        sqlx::query("UPDATE training_units SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_heartbeat(&self, id: &str, now: DateTime<Utc>) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE training_units SET last_heartbeat = $2, connection_status = 'connected', \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_disconnected(&self, id: &str) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE training_units SET connection_status = 'disconnected', updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(unit_id = %id))]
    async fn delete(&self, id: &str, user_id: &str) -> MLQueueResult<bool> {
        let result = sqlx::query("DELETE FROM training_units WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
