//! 仓储 trait 定义
//!
//! 所有读写都以 `user_id` 做属主过滤；跨租户访问表现为普通的未找到，
//! 不区分「不存在」与「无权限」。标注 `unscoped` 的方法仅供调度器内部使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlqueue_errors::MLQueueResult;

use crate::entities::{
    ConfigTemplate, Group, QueueStatus, Task, TaskStatus, TrainingQueue, TrainingUnit, UnitStatus,
    User, WebhookSink,
};

/// V1 任务列表过滤器
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub limit: i64,
    pub offset: i64,
    pub sort: Option<String>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
            sort: None,
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 按 API Key 精确匹配查找用户（认证路径）
    async fn find_by_api_key(&self, api_key: &str) -> MLQueueResult<Option<User>>;

    async fn create(&self, user: &User) -> MLQueueResult<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> MLQueueResult<()>;

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<Task>>;

    /// 不做属主过滤的读取，worker 从队列索引弹出 id 后加载用
    async fn get_unscoped(&self, id: &str) -> MLQueueResult<Option<Task>>;

    /// 返回 (任务列表, 过滤条件下的总数)
    async fn list(&self, user_id: &str, filter: &TaskFilter) -> MLQueueResult<(Vec<Task>, i64)>;

    async fn update_priority(&self, id: &str, priority: i32) -> MLQueueResult<()>;

    /// queued → running 的条件迁移，成功迁移返回 true
    async fn mark_running(&self, id: &str, started_at: DateTime<Utc>) -> MLQueueResult<bool>;

    /// running → completed 的条件迁移；当前状态已非 running 时不写入，返回 false
    async fn complete_if_running(
        &self,
        id: &str,
        result: serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<bool>;

    /// running → failed 的条件迁移
    async fn fail_if_running(
        &self,
        id: &str,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<bool>;

    /// 置为 cancelled 并记录原因
    async fn cancel(&self, id: &str, error_message: &str) -> MLQueueResult<()>;

    /// 写入结果并置为 completed（结果上传端点）
    async fn upload_result(
        &self,
        id: &str,
        result: serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<()>;

    /// 删除行（仅用于创建失败时的回滚）
    async fn delete(&self, id: &str) -> MLQueueResult<()>;

    async fn count_by_status(&self, user_id: &str, status: TaskStatus) -> MLQueueResult<i64>;

    /// 最近启动的 running 任务样本
    async fn running_sample(&self, user_id: &str, limit: i64) -> MLQueueResult<Vec<Task>>;

    /// 统计窗口内的任务数量
    async fn count_created_between(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MLQueueResult<i64>;

    /// 带起止时间戳的已完成任务样本，用于平均时长统计
    async fn completed_sample(&self, user_id: &str, limit: i64) -> MLQueueResult<Vec<Task>>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: &Group) -> MLQueueResult<()>;

    async fn list(&self, user_id: &str) -> MLQueueResult<Vec<Group>>;

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<Group>>;

    async fn update(&self, group: &Group) -> MLQueueResult<()>;

    /// 删除组（级联删除下属单元与队列），返回是否确有删除
    async fn delete(&self, id: &str, user_id: &str) -> MLQueueResult<bool>;
}

#[async_trait]
pub trait UnitRepository: Send + Sync {
    async fn create(&self, unit: &TrainingUnit) -> MLQueueResult<()>;

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<TrainingUnit>>;

    async fn list_by_group(&self, group_id: &str) -> MLQueueResult<Vec<TrainingUnit>>;

    async fn count_by_group(&self, group_id: &str) -> MLQueueResult<i64>;

    /// 更新名称/描述/配置，不触碰 version（版本号由 bump_version 单独推进）
    async fn update_fields(&self, unit: &TrainingUnit) -> MLQueueResult<()>;

    /// 原子的版本号递增（SET version = version + 1），返回新版本。
    /// 读改写会在并发下丢失增量，因此版本推进只允许走这条路径。
    async fn bump_version(&self, id: &str) -> MLQueueResult<i32>;

    async fn set_status(&self, id: &str, status: UnitStatus) -> MLQueueResult<()>;

    /// 记录心跳：last_heartbeat = now，connection_status = connected
    async fn record_heartbeat(&self, id: &str, now: DateTime<Utc>) -> MLQueueResult<()>;

    /// 活性窗口过期后的惰性降级
    async fn mark_disconnected(&self, id: &str) -> MLQueueResult<()>;

    async fn delete(&self, id: &str, user_id: &str) -> MLQueueResult<bool>;
}

#[async_trait]
pub trait TrainingQueueRepository: Send + Sync {
    async fn create(&self, queue: &TrainingQueue) -> MLQueueResult<()>;

    /// 单元内现有最大 order，空单元返回 -1
    async fn max_order(&self, unit_id: &str) -> MLQueueResult<i32>;

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<TrainingQueue>>;

    async fn get_many(&self, ids: &[String], user_id: &str)
        -> MLQueueResult<Vec<TrainingQueue>>;

    /// 按 order 升序返回单元内队列，可按状态过滤
    async fn list_by_unit(
        &self,
        unit_id: &str,
        status: Option<QueueStatus>,
    ) -> MLQueueResult<Vec<TrainingQueue>>;

    /// 更新名称/参数（order 不经此路径修改）
    async fn update_fields(&self, queue: &TrainingQueue) -> MLQueueResult<()>;

    async fn delete(&self, id: &str) -> MLQueueResult<()>;

    async fn count_by_unit(&self, unit_id: &str) -> MLQueueResult<i64>;

    /// 单元内非 pending 队列数（它们占据 order 前缀）
    async fn count_non_pending(&self, unit_id: &str) -> MLQueueResult<i64>;

    /// pending → running 的条件迁移
    async fn start_if_pending(&self, id: &str, now: DateTime<Utc>) -> MLQueueResult<bool>;

    /// running → completed 的条件迁移，写入 result 与 metrics
    async fn complete_if_running(
        &self,
        id: &str,
        result: Option<serde_json::Value>,
        metrics: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> MLQueueResult<bool>;

    /// running → failed 的条件迁移，写入 error_msg
    async fn fail_if_running(
        &self,
        id: &str,
        error_msg: &str,
        now: DateTime<Utc>,
    ) -> MLQueueResult<bool>;

    /// 事务性重排：第 i 个 id 赋 order = start_order + i。
    /// 任何一行不满足（不属于该单元 / 非 pending）则整体回滚。
    async fn reorder(
        &self,
        unit_id: &str,
        ordered_ids: &[String],
        start_order: i32,
    ) -> MLQueueResult<()>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn create(&self, template: &ConfigTemplate) -> MLQueueResult<()>;

    async fn list(&self, user_id: &str) -> MLQueueResult<Vec<ConfigTemplate>>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// 用户当前激活的订阅端点
    async fn list_active(&self, user_id: &str) -> MLQueueResult<Vec<WebhookSink>>;

    async fn create(&self, sink: &WebhookSink) -> MLQueueResult<i64>;
}
