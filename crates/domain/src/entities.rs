//! Domain Entities
//!
//! 核心领域实体定义，包含 V1 任务、用户身份，以及 V2 的
//! Group → TrainingUnit → TrainingQueue 三级训练层级。
//! 所有不透明载荷（config/parameters/result/metrics）使用 `serde_json::Value`
//! 原样存储，服务端不施加 schema。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 生成带前缀的短 ID，如 `task_a1b2c3d4`
pub fn short_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &raw[..8])
}

// ============================================================================
// 用户与配额
// ============================================================================

/// 配额等级
///
/// 决定每分钟请求预算：standard / premium，批量操作另有独立限额。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tier {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "premium")]
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }
}

/// API 调用主体
///
/// 通过 `api_key` 精确匹配完成认证；所有资源按 `id` 做属主过滤。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: String,
    pub email: String,
    pub api_key: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// V1 任务
// ============================================================================

/// V1 任务状态
///
/// 合法迁移路径：queued → running → {completed, failed}，
/// 以及 {queued, running} → cancelled。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "queued" => Some(TaskStatus::Queued),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为终端状态（不再发生任何迁移）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// V1 训练任务
///
/// 由云端调度器消费：创建即入队（status = queued），
/// 被某个 worker 恰好取走一次，推进到 running，再写入终端状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: String,
    pub name: String,
    pub config: serde_json::Value,
    pub priority: i32,
    pub status: TaskStatus,
    pub metadata: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub user_id: String,
    #[serde(skip_serializing, default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 创建新任务，初始即为 queued
    pub fn new(
        name: String,
        config: serde_json::Value,
        priority: i32,
        metadata: Option<serde_json::Value>,
        user_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: short_id("task"),
            name,
            config,
            priority,
            status: TaskStatus::Queued,
            metadata,
            result: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            user_id,
            updated_at: now,
        }
    }
}

/// 配置模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTemplate {
    #[serde(rename = "template_id")]
    pub id: String,
    pub name: String,
    pub config: serde_json::Value,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
}

/// Webhook 订阅端点
///
/// `events` 为空表示订阅全部事件；非空时形如 `{"events": ["task.completed"]}`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSink {
    pub id: i64,
    pub user_id: String,
    pub url: String,
    pub events: Option<serde_json::Value>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// V2 训练层级
// ============================================================================

/// ML 项目组，拥有若干训练单元；删除时级联删除下属单元与队列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "group_id")]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 训练单元状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnitStatus {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Idle => "idle",
            UnitStatus::Running => "running",
            UnitStatus::Completed => "completed",
        }
    }
}

/// 客户端连接状态，由心跳驱动
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

/// 心跳活性窗口：最后一次心跳距今超过该时长即视为断开
pub const HEARTBEAT_LIVENESS_SECONDS: i64 = 10;

/// 训练单元
///
/// V2 的同步边界。`version` 是单调递增的同步游标：任何需要客户端
/// 刷新本地视图的变更（队列增删改、单元更新）都会使其恰好加一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingUnit {
    #[serde(rename = "unit_id")]
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub version: i32,
    pub status: UnitStatus,
    pub connection_status: ConnectionStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
}

impl TrainingUnit {
    /// 按活性窗口判断当前是否应视为在线。
    /// 恰好等于窗口边界时仍视为在线（严格大于才断开）。
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat {
            None => false,
            Some(hb) => (now - hb).num_seconds() <= HEARTBEAT_LIVENESS_SECONDS,
        }
    }
}

/// 训练队列状态，由外部客户端驱动
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Running => "running",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "running" => Some(QueueStatus::Running),
            "completed" => Some(QueueStatus::Completed),
            "failed" => Some(QueueStatus::Failed),
            "cancelled" => Some(QueueStatus::Cancelled),
            _ => None,
        }
    }
}

/// 队列创建来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CreatedBy {
    #[serde(rename = "client")]
    Client,
    #[serde(rename = "web")]
    Web,
}

impl CreatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatedBy::Client => "client",
            CreatedBy::Web => "web",
        }
    }
}

/// 训练队列
///
/// 单元内按 `order` 升序执行。非 pending 的队列占据 order 空间的前缀，
/// pending 队列占据后缀；重排只允许作用于 pending 后缀。
/// 删除不回填 order，剩余值保持严格递增但允许出现空洞。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingQueue {
    #[serde(rename = "queue_id")]
    pub id: String,
    pub unit_id: String,
    pub name: String,
    pub parameters: serde_json::Value,
    #[serde(rename = "order")]
    pub queue_order: i32,
    pub status: QueueStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub metrics: Option<serde_json::Value>,
    pub error_msg: Option<String>,
    pub created_by: CreatedBy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
}

// ============================================================================
// SQLx 数据库类型支持（VARCHAR 编码，仅 PostgreSQL）
// ============================================================================

macro_rules! varchar_codec {
    ($ty:ident, { $($variant:path => $text:literal),+ $(,)? }) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                match s {
                    $($text => Ok($variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($ty), ": {}"), s).into()),
                }
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                let s = match self {
                    $($variant => $text,)+
                };
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
            }
        }
    };
}

varchar_codec!(TaskStatus, {
    TaskStatus::Pending => "pending",
    TaskStatus::Queued => "queued",
    TaskStatus::Running => "running",
    TaskStatus::Completed => "completed",
    TaskStatus::Failed => "failed",
    TaskStatus::Cancelled => "cancelled",
});

varchar_codec!(Tier, {
    Tier::Standard => "standard",
    Tier::Premium => "premium",
});

varchar_codec!(UnitStatus, {
    UnitStatus::Idle => "idle",
    UnitStatus::Running => "running",
    UnitStatus::Completed => "completed",
});

varchar_codec!(ConnectionStatus, {
    ConnectionStatus::Connected => "connected",
    ConnectionStatus::Disconnected => "disconnected",
});

varchar_codec!(QueueStatus, {
    QueueStatus::Pending => "pending",
    QueueStatus::Running => "running",
    QueueStatus::Completed => "completed",
    QueueStatus::Failed => "failed",
    QueueStatus::Cancelled => "cancelled",
});

varchar_codec!(CreatedBy, {
    CreatedBy::Client => "client",
    CreatedBy::Web => "web",
});
