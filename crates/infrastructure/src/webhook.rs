//! Webhook 事件出口
//!
//! 每个生命周期事件对属主的激活订阅端点做异步扇出：每个端点一个
//! 独立的投递任务，不阻塞触发方。投递失败按 attempt² 秒退避重试，
//! 至少一次送达，不保证端点间或事件间的顺序。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mlqueue_domain::entities::WebhookSink;
use mlqueue_domain::events::{TaskEvent, TaskEventPayload};
use mlqueue_domain::ports::EventPublisher;
use mlqueue_domain::repositories::WebhookRepository;
use tracing::{debug, warn};

const USER_AGENT: &str = "MLQueue-Webhook/1.0";

pub struct WebhookNotifier {
    webhooks: Arc<dyn WebhookRepository>,
    client: reqwest::Client,
    retry_count: u32,
}

impl WebhookNotifier {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        timeout_seconds: u64,
        retry_count: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            webhooks,
            client,
            retry_count,
        }
    }

    /// 判断端点是否订阅了该事件。`events` 为空表示订阅全部；
    /// 形如 `{"events": [...]}` 时做成员匹配。
    fn is_subscribed(sink: &WebhookSink, event: TaskEvent) -> bool {
        let Some(events) = &sink.events else {
            return true;
        };
        match events.get("events").and_then(|v| v.as_array()) {
            Some(list) => list.iter().any(|e| e.as_str() == Some(event.name())),
            None => true,
        }
    }
}

async fn send_with_retry(
    client: reqwest::Client,
    url: String,
    payload: TaskEventPayload,
    max_retries: u32,
) {
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = Duration::from_secs((attempt * attempt) as u64);
            tokio::time::sleep(backoff).await;
        }

        let sent = client
            .post(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&payload)
            .send()
            .await;

        match sent {
            Ok(resp) if resp.status().is_success() => {
                debug!(url = %url, event = %payload.event, "Webhook投递成功");
                return;
            }
            Ok(resp) => {
                warn!(
                    url = %url,
                    status = %resp.status(),
                    attempt = attempt + 1,
                    total = max_retries + 1,
                    "Webhook投递收到非2xx响应"
                );
            }
            Err(err) => {
                warn!(
                    url = %url,
                    error = %err,
                    attempt = attempt + 1,
                    total = max_retries + 1,
                    "Webhook投递失败"
                );
            }
        }
    }

    warn!(url = %url, event = %payload.event, "Webhook在重试耗尽后仍未送达");
}

#[async_trait]
impl EventPublisher for WebhookNotifier {
    async fn publish(
        &self,
        user_id: &str,
        event: TaskEvent,
        task_id: &str,
        result: Option<serde_json::Value>,
    ) {
        let sinks = match self.webhooks.list_active(user_id).await {
            Ok(sinks) => sinks,
            Err(err) => {
                warn!(user_id, error = %err, "加载Webhook订阅失败，事件丢弃");
                return;
            }
        };

        let payload = TaskEventPayload::new(event, task_id, result);
        for sink in sinks {
            if !Self::is_subscribed(&sink, event) {
                continue;
            }
            let client = self.client.clone();
            let payload = payload.clone();
            let retries = self.retry_count;
            tokio::spawn(send_with_retry(client, sink.url, payload, retries));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sink(events: Option<serde_json::Value>) -> WebhookSink {
        WebhookSink {
            id: 1,
            user_id: "user_1".to_string(),
            url: "http://localhost/hook".to_string(),
            events,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_subscription_means_all_events() {
        let sink = sink(None);
        assert!(WebhookNotifier::is_subscribed(&sink, TaskEvent::Queued));
        assert!(WebhookNotifier::is_subscribed(&sink, TaskEvent::Failed));
    }

    #[test]
    fn test_explicit_subscription_filters() {
        let sink = sink(Some(serde_json::json!({
            "events": ["task.completed", "task.failed"]
        })));
        assert!(WebhookNotifier::is_subscribed(&sink, TaskEvent::Completed));
        assert!(WebhookNotifier::is_subscribed(&sink, TaskEvent::Failed));
        assert!(!WebhookNotifier::is_subscribed(&sink, TaskEvent::Queued));
        assert!(!WebhookNotifier::is_subscribed(&sink, TaskEvent::Started));
    }

    #[test]
    fn test_malformed_subscription_defaults_to_all() {
        let sink = sink(Some(serde_json::json!({"foo": "bar"})));
        assert!(WebhookNotifier::is_subscribed(&sink, TaskEvent::Cancelled));
    }
}
