//! PostgreSQL 仓储实现
//!
//! 每个聚合一个仓储；全部查询按 user_id 做属主过滤（标注 unscoped 的除外）。

mod postgres_group_repository;
mod postgres_task_repository;
mod postgres_template_repository;
mod postgres_training_queue_repository;
mod postgres_unit_repository;
mod postgres_user_repository;
mod postgres_webhook_repository;

pub use postgres_group_repository::PostgresGroupRepository;
pub use postgres_task_repository::PostgresTaskRepository;
pub use postgres_template_repository::PostgresTemplateRepository;
pub use postgres_training_queue_repository::PostgresTrainingQueueRepository;
pub use postgres_unit_repository::PostgresUnitRepository;
pub use postgres_user_repository::PostgresUserRepository;
pub use postgres_webhook_repository::PostgresWebhookRepository;
