//! 滑动窗口限流
//!
//! 每个主体（可按批量类单独计）一个 Redis 有序集合，成员为请求的纳秒
//! 时间戳，score 为秒级时间戳。每次请求先清掉窗口外的旧成员再计数，
//! 请求逐个过期而非整窗重置。键的 TTL 为窗口加一分钟，容忍时钟偏差。

use async_trait::async_trait;
use chrono::Utc;
use mlqueue_domain::ports::RateLimiter;
use mlqueue_errors::{MLQueueError, MLQueueResult};
use redis::{aio::ConnectionManager, AsyncCommands};

/// 滑动窗口长度（秒）
pub const RATE_LIMIT_WINDOW_SECONDS: i64 = 60;

pub struct RedisRateLimiter {
    conn: ConnectionManager,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn to_index_error(err: redis::RedisError) -> MLQueueError {
    MLQueueError::queue_index(err.to_string())
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(&self, key: &str, limit: u32) -> MLQueueResult<bool> {
        let mut conn = self.conn.clone();
        let now = Utc::now();
        let min_score = now.timestamp() - RATE_LIMIT_WINDOW_SECONDS;

        let _: () = conn
            .zrembyscore(key, 0, min_score)
            .await
            .map_err(to_index_error)?;

        let count: i64 = conn.zcard(key).await.map_err(to_index_error)?;
        if count >= limit as i64 {
            return Ok(false);
        }

        let member = now.timestamp_nanos_opt().unwrap_or_default().to_string();
        let _: () = conn
            .zadd(key, member, now.timestamp() as f64)
            .await
            .map_err(to_index_error)?;
        let _: () = conn
            .expire(key, RATE_LIMIT_WINDOW_SECONDS + 60)
            .await
            .map_err(to_index_error)?;

        Ok(true)
    }
}

/// 进程内滑动窗口限流器，仅用于测试。
/// 生产路径必须使用共享存储实现，窗口才能跨进程重启存续。
#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: std::sync::Mutex<std::collections::HashMap<String, Vec<chrono::DateTime<Utc>>>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：把某个键窗口内的全部请求整体前移
    pub fn shift_window(&self, key: &str, seconds: i64) {
        let mut windows = self.windows.lock().unwrap();
        if let Some(entries) = windows.get_mut(key) {
            for entry in entries.iter_mut() {
                *entry -= chrono::Duration::seconds(seconds);
            }
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_record(&self, key: &str, limit: u32) -> MLQueueResult<bool> {
        let now = Utc::now();
        let mut windows = self.windows.lock().unwrap();
        let entries = windows.entry(key.to_string()).or_default();
        entries.retain(|t| (now - *t).num_seconds() < RATE_LIMIT_WINDOW_SECONDS);
        if entries.len() >= limit as usize {
            return Ok(false);
        }
        entries.push(now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_enforced_within_window() {
        let limiter = InMemoryRateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check_and_record("ratelimit:u1", 5).await.unwrap());
        }
        // 第 N+1 个请求被拒绝
        assert!(!limiter.check_and_record("ratelimit:u1", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = InMemoryRateLimiter::new();
        assert!(limiter.check_and_record("ratelimit:u1", 1).await.unwrap());
        assert!(!limiter.check_and_record("ratelimit:u1", 1).await.unwrap());
        assert!(limiter.check_and_record("ratelimit:u2", 1).await.unwrap());
        assert!(limiter
            .check_and_record("ratelimit:batch:u1", 1)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = InMemoryRateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check_and_record("ratelimit:u1", 3).await.unwrap());
        }
        assert!(!limiter.check_and_record("ratelimit:u1", 3).await.unwrap());

        // 最早的请求老化出窗口后，预算逐个恢复
        limiter.shift_window("ratelimit:u1", RATE_LIMIT_WINDOW_SECONDS + 1);
        assert!(limiter.check_and_record("ratelimit:u1", 3).await.unwrap());
    }
}
