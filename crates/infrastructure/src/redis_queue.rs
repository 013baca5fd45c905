//! Redis 优先级队列索引
//!
//! 有序集合 `mlqueue:tasks` 保存 (task_id, -priority)，伴随集合
//! `mlqueue:tasks:set` 记录成员资格。BZPOPMIN 在并发消费者之间
//! 提供原子的、至多一次的弹出。

use std::time::Duration;

use async_trait::async_trait;
use mlqueue_domain::ports::TaskQueueIndex;
use mlqueue_errors::{MLQueueError, MLQueueResult};
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::debug;

pub const TASK_QUEUE_KEY: &str = "mlqueue:tasks";
pub const TASK_QUEUE_SET_KEY: &str = "mlqueue:tasks:set";

pub struct RedisQueueIndex {
    conn: ConnectionManager,
}

impl RedisQueueIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> MLQueueResult<Self> {
        let client = redis::Client::open(url).map_err(to_index_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(to_index_error)?;
        Ok(Self::new(conn))
    }
}

fn to_index_error(err: redis::RedisError) -> MLQueueError {
    MLQueueError::queue_index(err.to_string())
}

#[async_trait]
impl TaskQueueIndex for RedisQueueIndex {
    async fn enqueue(&self, task_id: &str, priority: i32) -> MLQueueResult<()> {
        let mut conn = self.conn.clone();
        // 取负分使高优先级排在前面；重复入队等价于改分
        let _: () = conn
            .zadd(TASK_QUEUE_KEY, task_id, -(priority as f64))
            .await
            .map_err(to_index_error)?;
        let _: () = conn
            .sadd(TASK_QUEUE_SET_KEY, task_id)
            .await
            .map_err(to_index_error)?;
        debug!(task_id, priority, "任务入队");
        Ok(())
    }

    async fn blocking_pop(&self, timeout: Duration) -> MLQueueResult<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String, f64)> = redis::cmd("BZPOPMIN")
            .arg(TASK_QUEUE_KEY)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(to_index_error)?;
        Ok(popped.map(|(_key, member, _score)| member))
    }

    async fn len(&self) -> MLQueueResult<i64> {
        let mut conn = self.conn.clone();
        conn.zcard(TASK_QUEUE_KEY).await.map_err(to_index_error)
    }

    async fn rank(&self, task_id: &str) -> MLQueueResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let rank: Option<i64> = conn
            .zrank(TASK_QUEUE_KEY, task_id)
            .await
            .map_err(to_index_error)?;
        Ok(rank)
    }

    async fn update_priority(&self, task_id: &str, priority: i32) -> MLQueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(TASK_QUEUE_KEY, task_id, -(priority as f64))
            .await
            .map_err(to_index_error)?;
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> MLQueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zrem(TASK_QUEUE_KEY, task_id)
            .await
            .map_err(to_index_error)?;
        let _: () = conn
            .srem(TASK_QUEUE_SET_KEY, task_id)
            .await
            .map_err(to_index_error)?;
        Ok(())
    }

    async fn remove_member(&self, task_id: &str) -> MLQueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .srem(TASK_QUEUE_SET_KEY, task_id)
            .await
            .map_err(to_index_error)?;
        Ok(())
    }
}
