//! Test data builders
//!
//! Builder patterns for creating test entities with sensible defaults.

use chrono::Utc;
use mlqueue_domain::entities::{
    short_id, ConnectionStatus, CreatedBy, Group, QueueStatus, Task, TaskStatus, Tier,
    TrainingQueue, TrainingUnit, UnitStatus, User,
};

pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    pub fn new() -> Self {
        Self {
            user: User {
                id: "user_test".to_string(),
                email: "test@example.com".to_string(),
                api_key: "test-api-key".to_string(),
                tier: Tier::Standard,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.user.id = id.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.user.api_key = api_key.to_string();
        self
    }

    pub fn premium(mut self) -> Self {
        self.user.tier = Tier::Premium;
        self
    }

    pub fn build(self) -> User {
        self.user
    }
}

impl Default for UserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: short_id("task"),
                name: "test_task".to_string(),
                config: serde_json::json!({"model": "resnet50"}),
                priority: 0,
                status: TaskStatus::Queued,
                metadata: None,
                result: None,
                error_message: None,
                created_at: now,
                started_at: None,
                completed_at: None,
                user_id: "user_test".to_string(),
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.task.user_id = user_id.to_string();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.task.config = config;
        self
    }

    pub fn running(mut self) -> Self {
        self.task.status = TaskStatus::Running;
        self.task.started_at = Some(Utc::now());
        self
    }

    pub fn completed(mut self) -> Self {
        let now = Utc::now();
        self.task.status = TaskStatus::Completed;
        self.task.started_at = Some(now - chrono::Duration::seconds(30));
        self.task.completed_at = Some(now);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            group: Group {
                id: short_id("group"),
                name: "test_group".to_string(),
                description: None,
                user_id: "user_test".to_string(),
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.group.id = id.to_string();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.group.user_id = user_id.to_string();
        self
    }

    pub fn build(self) -> Group {
        self.group
    }
}

impl Default for GroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct UnitBuilder {
    unit: TrainingUnit,
}

impl UnitBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            unit: TrainingUnit {
                id: short_id("unit"),
                group_id: "group_test".to_string(),
                name: "test_unit".to_string(),
                description: None,
                config: None,
                version: 1,
                status: UnitStatus::Idle,
                connection_status: ConnectionStatus::Disconnected,
                last_heartbeat: None,
                created_at: now,
                updated_at: now,
                user_id: "user_test".to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.unit.id = id.to_string();
        self
    }

    pub fn with_group(mut self, group_id: &str) -> Self {
        self.unit.group_id = group_id.to_string();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.unit.user_id = user_id.to_string();
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.unit.version = version;
        self
    }

    pub fn connected(mut self) -> Self {
        self.unit.connection_status = ConnectionStatus::Connected;
        self.unit.last_heartbeat = Some(Utc::now());
        self
    }

    pub fn build(self) -> TrainingUnit {
        self.unit
    }
}

impl Default for UnitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TrainingQueueBuilder {
    queue: TrainingQueue,
}

impl TrainingQueueBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            queue: TrainingQueue {
                id: short_id("queue"),
                unit_id: "unit_test".to_string(),
                name: "test_queue".to_string(),
                parameters: serde_json::json!({"lr": 0.001}),
                queue_order: 0,
                status: QueueStatus::Pending,
                started_at: None,
                completed_at: None,
                result: None,
                metrics: None,
                error_msg: None,
                created_by: CreatedBy::Client,
                created_at: now,
                updated_at: now,
                user_id: "user_test".to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.queue.id = id.to_string();
        self
    }

    pub fn with_unit(mut self, unit_id: &str) -> Self {
        self.queue.unit_id = unit_id.to_string();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.queue.user_id = user_id.to_string();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.queue.queue_order = order;
        self
    }

    pub fn with_status(mut self, status: QueueStatus) -> Self {
        self.queue.status = status;
        self
    }

    pub fn running(mut self) -> Self {
        self.queue.status = QueueStatus::Running;
        self.queue.started_at = Some(Utc::now());
        self
    }

    pub fn completed(mut self) -> Self {
        let now = Utc::now();
        self.queue.status = QueueStatus::Completed;
        self.queue.started_at = Some(now - chrono::Duration::seconds(10));
        self.queue.completed_at = Some(now);
        self
    }

    pub fn build(self) -> TrainingQueue {
        self.queue
    }
}

impl Default for TrainingQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
