//! 进程内优先级队列索引
//!
//! 与 Redis 实现共用同一个 trait，语义一致：score = -priority，
//! 等分时按入队序稳定排序。用于测试与单进程嵌入式部署。

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mlqueue_domain::ports::TaskQueueIndex;
use mlqueue_errors::MLQueueResult;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    /// (task_id, score, 入队序号)，始终按 (score, 序号) 升序
    entries: Vec<(String, f64, u64)>,
    members: HashSet<String>,
    seq: u64,
}

impl Inner {
    fn position(&self, task_id: &str) -> Option<usize> {
        self.entries.iter().position(|(id, _, _)| id == task_id)
    }

    fn insert_sorted(&mut self, task_id: String, score: f64) {
        self.seq += 1;
        let seq = self.seq;
        let at = self
            .entries
            .partition_point(|(_, s, q)| (*s, *q) < (score, seq));
        self.entries.insert(at, (task_id, score, seq));
    }
}

#[derive(Default)]
pub struct InMemoryQueueIndex {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl InMemoryQueueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.is_empty() {
            return None;
        }
        let (id, _, _) = inner.entries.remove(0);
        Some(id)
    }
}

#[async_trait]
impl TaskQueueIndex for InMemoryQueueIndex {
    async fn enqueue(&self, task_id: &str, priority: i32) -> MLQueueResult<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(pos) = inner.position(task_id) {
                inner.entries.remove(pos);
            }
            inner.insert_sorted(task_id.to_string(), -(priority as f64));
            inner.members.insert(task_id.to_string());
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn blocking_pop(&self, timeout: Duration) -> MLQueueResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // 先注册唤醒再检查，避免丢失入队通知
            let notified = self.notify.notified();
            if let Some(id) = self.try_pop() {
                return Ok(Some(id));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> MLQueueResult<i64> {
        Ok(self.inner.lock().unwrap().entries.len() as i64)
    }

    async fn rank(&self, task_id: &str) -> MLQueueResult<Option<i64>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .position(task_id)
            .map(|p| p as i64))
    }

    async fn update_priority(&self, task_id: &str, priority: i32) -> MLQueueResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.position(task_id) {
            inner.entries.remove(pos);
        }
        inner.insert_sorted(task_id.to_string(), -(priority as f64));
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> MLQueueResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.position(task_id) {
            inner.entries.remove(pos);
        }
        inner.members.remove(task_id);
        Ok(())
    }

    async fn remove_member(&self, task_id: &str) -> MLQueueResult<()> {
        self.inner.lock().unwrap().members.remove(task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_priority_ordering() {
        let index = InMemoryQueueIndex::new();
        index.enqueue("task_a", 1).await.unwrap();
        index.enqueue("task_b", 5).await.unwrap();
        index.enqueue("task_c", 3).await.unwrap();

        // 优先级高者排名靠前
        assert_eq!(index.rank("task_b").await.unwrap(), Some(0));
        assert_eq!(index.rank("task_c").await.unwrap(), Some(1));
        assert_eq!(index.rank("task_a").await.unwrap(), Some(2));
        assert_eq!(index.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pop_lowest_score_first() {
        let index = InMemoryQueueIndex::new();
        index.enqueue("low", 0).await.unwrap();
        index.enqueue("high", 10).await.unwrap();

        let first = index
            .blocking_pop(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("high"));
        let second = index
            .blocking_pop(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(second.as_deref(), Some("low"));
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty() {
        let index = InMemoryQueueIndex::new();
        let popped = index
            .blocking_pop(Duration::from_millis(50))
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_enqueue() {
        let index = std::sync::Arc::new(InMemoryQueueIndex::new());
        let popper = {
            let index = index.clone();
            tokio::spawn(async move { index.blocking_pop(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        index.enqueue("task_x", 0).await.unwrap();
        let popped = popper.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("task_x"));
    }

    #[tokio::test]
    async fn test_rescore_is_idempotent() {
        let index = InMemoryQueueIndex::new();
        index.enqueue("task_a", 1).await.unwrap();
        index.enqueue("task_b", 2).await.unwrap();

        index.update_priority("task_a", 9).await.unwrap();
        index.update_priority("task_a", 9).await.unwrap();

        assert_eq!(index.len().await.unwrap(), 2);
        assert_eq!(index.rank("task_a").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let index = InMemoryQueueIndex::new();
        index.enqueue("task_a", 1).await.unwrap();
        index.remove("task_a").await.unwrap();
        index.remove("task_a").await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
        assert_eq!(index.rank("task_a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_pop_at_most_once() {
        let index = std::sync::Arc::new(InMemoryQueueIndex::new());
        for i in 0..20 {
            index.enqueue(&format!("task_{i}"), i).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(id) = index
                    .blocking_pop(Duration::from_millis(50))
                    .await
                    .unwrap()
                {
                    got.push(id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        // 每个任务恰好被一个消费者取走
        assert_eq!(all.len(), 20);
    }
}
