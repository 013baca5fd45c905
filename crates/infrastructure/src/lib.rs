//! # MLQueue Infrastructure
//!
//! 外部设施实现：PostgreSQL 仓储、Redis 优先级队列索引与滑动窗口限流器、
//! 进程内队列索引（测试与嵌入式场景）、Webhook 事件出口。

pub mod database;
pub mod in_memory_queue;
pub mod rate_limiter;
pub mod redis_queue;
pub mod webhook;

pub use in_memory_queue::InMemoryQueueIndex;
pub use rate_limiter::{InMemoryRateLimiter, RedisRateLimiter};
pub use redis_queue::RedisQueueIndex;
pub use webhook::WebhookNotifier;
