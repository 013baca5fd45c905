//! 端口定义
//!
//! 领域层对外部设施的抽象：优先级队列索引、限流器、事件发布、
//! 调度控制与任务执行器。具体实现位于 infrastructure / dispatcher。

use std::time::Duration;

use async_trait::async_trait;
use mlqueue_errors::MLQueueResult;

use crate::entities::Task;
use crate::events::TaskEvent;

/// 优先级队列索引
///
/// 逻辑上是 (task_id, score) 的有序集合加一个伴随成员集合，
/// score = -priority（数值越小越先出队）。只有 queued 状态的任务在索引中。
#[async_trait]
pub trait TaskQueueIndex: Send + Sync {
    /// 入队；对已存在的成员等价于改分，不产生重复
    async fn enqueue(&self, task_id: &str, priority: i32) -> MLQueueResult<()>;

    /// 阻塞弹出最低 score 的成员，超时返回 None。
    /// 弹出是消费性的：并发消费者间至多一次送达。
    async fn blocking_pop(&self, timeout: Duration) -> MLQueueResult<Option<String>>;

    /// 当前队列长度
    async fn len(&self) -> MLQueueResult<i64>;

    /// 0 起始的队列排名，不在队列中返回 None
    async fn rank(&self, task_id: &str) -> MLQueueResult<Option<i64>>;

    /// 改分（重排优先级），保持成员身份不变
    async fn update_priority(&self, task_id: &str, priority: i32) -> MLQueueResult<()>;

    /// 从索引和成员集合中移除，幂等
    async fn remove(&self, task_id: &str) -> MLQueueResult<()>;

    /// 仅从伴随成员集合中移除（worker 完成任务后调用）
    async fn remove_member(&self, task_id: &str) -> MLQueueResult<()>;
}

/// 滑动窗口限流器
///
/// 窗口内的请求逐个过期，而非整窗重置。实现必须落在共享存储上，
/// 使窗口在进程重启后（TTL 内）仍然有效。
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// 检查并记录一次请求。返回 true 表示放行。
    async fn check_and_record(&self, key: &str, limit: u32) -> MLQueueResult<bool>;
}

/// 生命周期事件发布
///
/// 发布是尽力而为的异步扇出，不得阻塞触发方；失败由实现内部记录。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        user_id: &str,
        event: TaskEvent,
        task_id: &str,
        result: Option<serde_json::Value>,
    );
}

/// 调度器运行控制
///
/// Pause 阻止新的派发，不打断正在执行的任务；Resume 立即恢复轮询。
pub trait SchedulerControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
}

/// 任务执行器
///
/// worker 在完成 queued → running 迁移后调用。真实部署在此接入
/// 实际的训练执行；本服务内置模拟实现。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, worker_id: usize) -> MLQueueResult<serde_json::Value>;
}
