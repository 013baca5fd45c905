//! 任务执行器
//!
//! 真实部署在此接入实际训练；内置实现按 worker 编号比例模拟耗时。

use std::time::Duration;

use async_trait::async_trait;
use mlqueue_domain::entities::Task;
use mlqueue_domain::ports::TaskExecutor;
use mlqueue_errors::MLQueueResult;

/// 模拟训练执行器：睡眠 (base + worker_id) 秒后返回结果
pub struct SimulatedTrainingExecutor {
    base_seconds: u64,
}

impl SimulatedTrainingExecutor {
    pub fn new() -> Self {
        Self { base_seconds: 5 }
    }

    /// 测试用：缩短模拟耗时
    pub fn with_base_seconds(base_seconds: u64) -> Self {
        Self { base_seconds }
    }
}

impl Default for SimulatedTrainingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for SimulatedTrainingExecutor {
    async fn execute(&self, _task: &Task, worker_id: usize) -> MLQueueResult<serde_json::Value> {
        let start = std::time::Instant::now();
        tokio::time::sleep(Duration::from_secs(self.base_seconds + worker_id as u64)).await;
        Ok(serde_json::json!({
            "completed_by_worker": worker_id,
            "duration_seconds": start.elapsed().as_secs_f64(),
        }))
    }
}
