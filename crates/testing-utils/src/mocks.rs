//! Mock implementations for repository and port traits
//!
//! In-memory doubles backed by `Mutex<HashMap>`, usable without a
//! database or Redis. Semantics mirror the Postgres implementations,
//! including the conditional (compare-and-set) status transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlqueue_domain::entities::{
    ConfigTemplate, Group, QueueStatus, Task, TaskStatus, TrainingQueue, TrainingUnit,
    UnitStatus, User, WebhookSink,
};
use mlqueue_domain::events::TaskEvent;
use mlqueue_domain::ports::EventPublisher;
use mlqueue_domain::repositories::{
    GroupRepository, TaskFilter, TaskRepository, TemplateRepository, TrainingQueueRepository,
    UnitRepository, UserRepository, WebhookRepository,
};
use mlqueue_errors::{MLQueueError, MLQueueResult};

// ============================================================================
// Users
// ============================================================================

#[derive(Default, Clone)]
pub struct MockUserRepository {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        let map = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: Arc::new(Mutex::new(map)),
        }
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_api_key(&self, api_key: &str) -> MLQueueResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.api_key == api_key)
            .cloned())
    }

    async fn create(&self, user: &User) -> MLQueueResult<()> {
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Default, Clone)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &Task) -> MLQueueResult<()> {
        self.tasks
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<Task>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .get(id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn get_unscoped(&self, id: &str) -> MLQueueResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn list(&self, user_id: &str, filter: &TaskFilter) -> MLQueueResult<(Vec<Task>, i64)> {
        let tasks = self.tasks.lock().unwrap();
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as i64;
        let page: Vec<Task> = matched
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_priority(&self, id: &str, priority: i32) -> MLQueueResult<()> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
            task.priority = priority;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_running(&self, id: &str, started_at: DateTime<Utc>) -> MLQueueResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Queued => {
                task.status = TaskStatus::Running;
                task.started_at = Some(started_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_if_running(
        &self,
        id: &str,
        result: serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Running => {
                task.status = TaskStatus::Completed;
                task.result = Some(result);
                task.completed_at = Some(completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_if_running(
        &self,
        id: &str,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Running => {
                task.status = TaskStatus::Failed;
                task.error_message = Some(error_message.to_string());
                task.completed_at = Some(completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(&self, id: &str, error_message: &str) -> MLQueueResult<()> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
            task.status = TaskStatus::Cancelled;
            task.error_message = Some(error_message.to_string());
            task.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn upload_result(
        &self,
        id: &str,
        result: serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> MLQueueResult<()> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
            task.result = Some(result);
            task.status = TaskStatus::Completed;
            task.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> MLQueueResult<()> {
        self.tasks.lock().unwrap().remove(id);
        Ok(())
    }

    async fn count_by_status(&self, user_id: &str, status: TaskStatus) -> MLQueueResult<i64> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id && t.status == status)
            .count() as i64)
    }

    async fn running_sample(&self, user_id: &str, limit: i64) -> MLQueueResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut running: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id && t.status == TaskStatus::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        running.truncate(limit.max(0) as usize);
        Ok(running)
    }

    async fn count_created_between(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MLQueueResult<i64> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| status.map_or(true, |s| t.status == s))
            .filter(|t| t.created_at >= start && t.created_at <= end)
            .count() as i64)
    }

    async fn completed_sample(&self, user_id: &str, limit: i64) -> MLQueueResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let completed: Vec<Task> = tasks
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.status == TaskStatus::Completed
                    && t.started_at.is_some()
                    && t.completed_at.is_some()
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(completed)
    }
}

// ============================================================================
// Groups / Units / Training queues
// ============================================================================

#[derive(Default, Clone)]
pub struct MockGroupRepository {
    groups: Arc<Mutex<HashMap<String, Group>>>,
}

impl MockGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepository for MockGroupRepository {
    async fn create(&self, group: &Group) -> MLQueueResult<()> {
        self.groups
            .lock()
            .unwrap()
            .insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str) -> MLQueueResult<Vec<Group>> {
        let groups = self.groups.lock().unwrap();
        let mut matched: Vec<Group> = groups
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<Group>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(id)
            .filter(|g| g.user_id == user_id)
            .cloned())
    }

    async fn update(&self, group: &Group) -> MLQueueResult<()> {
        self.groups
            .lock()
            .unwrap()
            .insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn delete(&self, id: &str, user_id: &str) -> MLQueueResult<bool> {
        let mut groups = self.groups.lock().unwrap();
        let owned = groups.get(id).map_or(false, |g| g.user_id == user_id);
        if owned {
            groups.remove(id);
        }
        Ok(owned)
    }
}

#[derive(Default, Clone)]
pub struct MockUnitRepository {
    units: Arc<Mutex<HashMap<String, TrainingUnit>>>,
}

impl MockUnitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_raw(&self, id: &str) -> Option<TrainingUnit> {
        self.units.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl UnitRepository for MockUnitRepository {
    async fn create(&self, unit: &TrainingUnit) -> MLQueueResult<()> {
        self.units
            .lock()
            .unwrap()
            .insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<TrainingUnit>> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .get(id)
            .filter(|u| u.user_id == user_id)
            .cloned())
    }

    async fn list_by_group(&self, group_id: &str) -> MLQueueResult<Vec<TrainingUnit>> {
        let units = self.units.lock().unwrap();
        let mut matched: Vec<TrainingUnit> = units
            .values()
            .filter(|u| u.group_id == group_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn count_by_group(&self, group_id: &str) -> MLQueueResult<i64> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.group_id == group_id)
            .count() as i64)
    }

    async fn update_fields(&self, unit: &TrainingUnit) -> MLQueueResult<()> {
        let mut units = self.units.lock().unwrap();
        if let Some(existing) = units.get_mut(&unit.id) {
            existing.name = unit.name.clone();
            existing.description = unit.description.clone();
            existing.config = unit.config.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn bump_version(&self, id: &str) -> MLQueueResult<i32> {
        let mut units = self.units.lock().unwrap();
        match units.get_mut(id) {
            Some(unit) => {
                unit.version += 1;
                unit.updated_at = Utc::now();
                Ok(unit.version)
            }
            None => Err(MLQueueError::NotFound),
        }
    }

    async fn set_status(&self, id: &str, status: UnitStatus) -> MLQueueResult<()> {
        if let Some(unit) = self.units.lock().unwrap().get_mut(id) {
            unit.status = status;
        }
        Ok(())
    }

    async fn record_heartbeat(&self, id: &str, now: DateTime<Utc>) -> MLQueueResult<()> {
        if let Some(unit) = self.units.lock().unwrap().get_mut(id) {
            unit.last_heartbeat = Some(now);
            unit.connection_status = mlqueue_domain::entities::ConnectionStatus::Connected;
        }
        Ok(())
    }

    async fn mark_disconnected(&self, id: &str) -> MLQueueResult<()> {
        if let Some(unit) = self.units.lock().unwrap().get_mut(id) {
            unit.connection_status = mlqueue_domain::entities::ConnectionStatus::Disconnected;
        }
        Ok(())
    }

    async fn delete(&self, id: &str, user_id: &str) -> MLQueueResult<bool> {
        let mut units = self.units.lock().unwrap();
        let owned = units.get(id).map_or(false, |u| u.user_id == user_id);
        if owned {
            units.remove(id);
        }
        Ok(owned)
    }
}

#[derive(Default, Clone)]
pub struct MockTrainingQueueRepository {
    queues: Arc<Mutex<HashMap<String, TrainingQueue>>>,
}

impl MockTrainingQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_raw(&self, id: &str) -> Option<TrainingQueue> {
        self.queues.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl TrainingQueueRepository for MockTrainingQueueRepository {
    async fn create(&self, queue: &TrainingQueue) -> MLQueueResult<()> {
        self.queues
            .lock()
            .unwrap()
            .insert(queue.id.clone(), queue.clone());
        Ok(())
    }

    async fn max_order(&self, unit_id: &str) -> MLQueueResult<i32> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .values()
            .filter(|q| q.unit_id == unit_id)
            .map(|q| q.queue_order)
            .max()
            .unwrap_or(-1))
    }

    async fn get(&self, id: &str, user_id: &str) -> MLQueueResult<Option<TrainingQueue>> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get(id)
            .filter(|q| q.user_id == user_id)
            .cloned())
    }

    async fn get_many(
        &self,
        ids: &[String],
        user_id: &str,
    ) -> MLQueueResult<Vec<TrainingQueue>> {
        let queues = self.queues.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| queues.get(id))
            .filter(|q| q.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_unit(
        &self,
        unit_id: &str,
        status: Option<QueueStatus>,
    ) -> MLQueueResult<Vec<TrainingQueue>> {
        let queues = self.queues.lock().unwrap();
        let mut matched: Vec<TrainingQueue> = queues
            .values()
            .filter(|q| q.unit_id == unit_id)
            .filter(|q| status.map_or(true, |s| q.status == s))
            .cloned()
            .collect();
        matched.sort_by_key(|q| q.queue_order);
        Ok(matched)
    }

    async fn update_fields(&self, queue: &TrainingQueue) -> MLQueueResult<()> {
        let mut queues = self.queues.lock().unwrap();
        if let Some(existing) = queues.get_mut(&queue.id) {
            existing.name = queue.name.clone();
            existing.parameters = queue.parameters.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> MLQueueResult<()> {
        self.queues.lock().unwrap().remove(id);
        Ok(())
    }

    async fn count_by_unit(&self, unit_id: &str) -> MLQueueResult<i64> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .values()
            .filter(|q| q.unit_id == unit_id)
            .count() as i64)
    }

    async fn count_non_pending(&self, unit_id: &str) -> MLQueueResult<i64> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .values()
            .filter(|q| q.unit_id == unit_id && q.status != QueueStatus::Pending)
            .count() as i64)
    }

    async fn start_if_pending(&self, id: &str, now: DateTime<Utc>) -> MLQueueResult<bool> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(id) {
            Some(queue) if queue.status == QueueStatus::Pending => {
                queue.status = QueueStatus::Running;
                queue.started_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_if_running(
        &self,
        id: &str,
        result: Option<serde_json::Value>,
        metrics: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(id) {
            Some(queue) if queue.status == QueueStatus::Running => {
                queue.status = QueueStatus::Completed;
                queue.completed_at = Some(now);
                queue.result = result;
                queue.metrics = metrics;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_if_running(
        &self,
        id: &str,
        error_msg: &str,
        now: DateTime<Utc>,
    ) -> MLQueueResult<bool> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(id) {
            Some(queue) if queue.status == QueueStatus::Running => {
                queue.status = QueueStatus::Failed;
                queue.completed_at = Some(now);
                queue.error_msg = Some(error_msg.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reorder(
        &self,
        unit_id: &str,
        ordered_ids: &[String],
        start_order: i32,
    ) -> MLQueueResult<()> {
        let mut queues = self.queues.lock().unwrap();

        // 与事务实现一致：先整体校验，失败时不留下部分写入
        for id in ordered_ids {
            match queues.get(id) {
                Some(q) if q.unit_id == unit_id && q.status == QueueStatus::Pending => {}
                _ => {
                    return Err(MLQueueError::InvalidQueueStatus(format!(
                        "队列 {id} 不属于该单元或不是 pending 状态"
                    )))
                }
            }
        }

        for (i, id) in ordered_ids.iter().enumerate() {
            if let Some(queue) = queues.get_mut(id) {
                queue.queue_order = start_order + i as i32;
                queue.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

// ============================================================================
// Templates / Webhooks / Events
// ============================================================================

#[derive(Default, Clone)]
pub struct MockTemplateRepository {
    templates: Arc<Mutex<HashMap<String, ConfigTemplate>>>,
}

impl MockTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for MockTemplateRepository {
    async fn create(&self, template: &ConfigTemplate) -> MLQueueResult<()> {
        self.templates
            .lock()
            .unwrap()
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str) -> MLQueueResult<Vec<ConfigTemplate>> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct MockWebhookRepository {
    sinks: Arc<Mutex<Vec<WebhookSink>>>,
}

impl MockWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookRepository for MockWebhookRepository {
    async fn list_active(&self, user_id: &str) -> MLQueueResult<Vec<WebhookSink>> {
        Ok(self
            .sinks
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id && s.active)
            .cloned()
            .collect())
    }

    async fn create(&self, sink: &WebhookSink) -> MLQueueResult<i64> {
        let mut sinks = self.sinks.lock().unwrap();
        let id = sinks.len() as i64 + 1;
        let mut sink = sink.clone();
        sink.id = id;
        sinks.push(sink);
        Ok(id)
    }
}

/// 记录型事件发布器：保存 (user_id, 事件名, task_id) 供断言
#[derive(Default, Clone)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<(String, String, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        user_id: &str,
        event: TaskEvent,
        task_id: &str,
        _result: Option<serde_json::Value>,
    ) {
        self.events.lock().unwrap().push((
            user_id.to_string(),
            event.name().to_string(),
            task_id.to_string(),
        ));
    }
}
