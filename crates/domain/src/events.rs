//! 任务生命周期事件
//!
//! 事件经 Webhook 出口投递给属主注册的订阅端点，至少一次送达，
//! 接收方需按 `(task_id, event)` 幂等处理。

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 生命周期事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Queued,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl TaskEvent {
    /// 事件的线上名称，如 `task.completed`
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Queued => "task.queued",
            TaskEvent::Started => "task.started",
            TaskEvent::Completed => "task.completed",
            TaskEvent::Failed => "task.failed",
            TaskEvent::Cancelled => "task.cancelled",
        }
    }

    /// 事件对应的任务状态
    pub fn status(&self) -> &'static str {
        match self {
            TaskEvent::Queued => "queued",
            TaskEvent::Started => "running",
            TaskEvent::Completed => "completed",
            TaskEvent::Failed => "failed",
            TaskEvent::Cancelled => "cancelled",
        }
    }
}

/// Webhook 投递载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventPayload {
    pub event: String,
    pub task_id: String,
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskEventPayload {
    pub fn new(event: TaskEvent, task_id: &str, result: Option<serde_json::Value>) -> Self {
        Self {
            event: event.name().to_string(),
            task_id: task_id.to_string(),
            status: event.status().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(TaskEvent::Queued.name(), "task.queued");
        assert_eq!(TaskEvent::Started.name(), "task.started");
        assert_eq!(TaskEvent::Started.status(), "running");
        assert_eq!(TaskEvent::Cancelled.status(), "cancelled");
    }

    #[test]
    fn test_payload_omits_empty_result() {
        let payload = TaskEventPayload::new(TaskEvent::Queued, "task_1", None);
        let v = serde_json::to_value(&payload).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["event"], "task.queued");
        assert_eq!(v["status"], "queued");
    }
}
