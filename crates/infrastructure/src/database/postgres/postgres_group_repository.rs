use async_trait::async_trait;
use mlqueue_domain::entities::Group;
use mlqueue_domain::repositories::GroupRepository;
use mlqueue_errors::MLQueueResult;
use sqlx::{PgPool, Row};
use tracing::instrument;

pub struct PostgresGroupRepository {
    pool: PgPool,
}

impl PostgresGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_group(row: &sqlx::postgres::PgRow) -> MLQueueResult<Group> {
        Ok(Group {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl GroupRepository for PostgresGroupRepository {
    #[instrument(skip(self, group), fields(group_id = %group.id))]
    async fn create(&self, group: &Group) -> MLQueueResult<()> {
        sqlx::query(
            "INSERT INTO groups (id, name, description, user_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&group.id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.user_id)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> MLQueueResult<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT id, name, description, user_id, created_at, updated_at FROM groups \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, description, user_id, created_at, updated_at FROM groups \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_group).transpose()
    }

    #[instrument(skip(self, group), fields(group_id = %group.id))]
    async fn update(&self, group: &Group) -> MLQueueResult<()> {
        sqlx::query(
            "UPDATE groups SET name = $2, description = $3, updated_at = NOW() \
             WHERE id = $1 AND user_id = $4",
        )
        .bind(&group.id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(group_id = %id))]
    async fn delete(&self, id: &str, user_id: &str) -> MLQueueResult<bool> {
        // 级联删除由外键约束完成（groups → training_units → training_queues）
        let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
