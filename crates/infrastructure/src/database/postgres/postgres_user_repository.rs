use async_trait::async_trait;
use mlqueue_domain::entities::User;
use mlqueue_domain::repositories::UserRepository;
use mlqueue_errors::MLQueueResult;
use sqlx::{PgPool, Row};
use tracing::instrument;

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> MLQueueResult<User> {
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            api_key: row.try_get("api_key")?,
            tier: row.try_get("tier")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_api_key(&self, api_key: &str) -> MLQueueResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, api_key, tier, created_at FROM users WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn create(&self, user: &User) -> MLQueueResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, api_key, tier, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW())",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.api_key)
        .bind(user.tier)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
