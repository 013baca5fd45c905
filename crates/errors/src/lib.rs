use thiserror::Error;

/// 服务统一错误类型
///
/// `code()` 给出对外稳定的机器可读错误码，客户端应据此分支；
/// `user_message()` 给出本地化的人类可读信息，文案不构成契约。
#[derive(Debug, Error)]
pub enum MLQueueError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("队列索引错误: {0}")]
    QueueIndex(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },
    #[error("资源未找到")]
    NotFound,
    #[error("需要身份验证")]
    AuthRequired,
    #[error("无效的Token")]
    InvalidToken,
    #[error("请求频率超限")]
    RateLimitExceeded,
    #[error("无效的请求参数: {0}")]
    InvalidParams(String),
    #[error("无效的优先级")]
    InvalidPriority,
    #[error("任务已在运行，无法修改优先级")]
    TaskAlreadyRunning,
    #[error("任务已完成或已取消")]
    TaskAlreadyCompleted,
    #[error("队列状态不允许该操作: {0}")]
    InvalidQueueStatus(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type MLQueueResult<T> = Result<T, MLQueueError>;

impl MLQueueError {
    pub fn queue_index<S: Into<String>>(msg: S) -> Self {
        Self::QueueIndex(msg.into())
    }

    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    /// 对外稳定的错误码
    pub fn code(&self) -> &'static str {
        match self {
            MLQueueError::AuthRequired => "AUTH_REQUIRED",
            MLQueueError::InvalidToken => "INVALID_TOKEN",
            MLQueueError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            MLQueueError::InvalidParams(_) => "INVALID_CONFIG",
            MLQueueError::InvalidPriority => "INVALID_PRIORITY",
            MLQueueError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            MLQueueError::NotFound => "TASK_NOT_FOUND",
            MLQueueError::TaskAlreadyRunning => "TASK_ALREADY_RUNNING",
            MLQueueError::TaskAlreadyCompleted => "TASK_ALREADY_COMPLETED",
            MLQueueError::InvalidQueueStatus(_) => "INVALID_QUEUE_STATUS",
            MLQueueError::Database(_)
            | MLQueueError::QueueIndex(_)
            | MLQueueError::Serialization(_)
            | MLQueueError::Configuration(_)
            | MLQueueError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 基础设施类错误（存储、队列索引）才值得调用方重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MLQueueError::Database(_) | MLQueueError::QueueIndex(_)
        )
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            MLQueueError::AuthRequired => "需要身份验证",
            MLQueueError::InvalidToken => "无效的Token",
            MLQueueError::RateLimitExceeded => "请求频率超限",
            MLQueueError::InvalidParams(_) => "无效的请求参数",
            MLQueueError::InvalidPriority => "无效的优先级",
            MLQueueError::TaskNotFound { .. } => "任务不存在",
            MLQueueError::NotFound => "资源不存在",
            MLQueueError::TaskAlreadyRunning => "只能修改队列中任务的优先级",
            MLQueueError::TaskAlreadyCompleted => "任务已完成或已取消",
            MLQueueError::InvalidQueueStatus(_) => "队列状态不允许该操作",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for MLQueueError {
    fn from(err: serde_json::Error) -> Self {
        MLQueueError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for MLQueueError {
    fn from(err: anyhow::Error) -> Self {
        MLQueueError::Internal(err.to_string())
    }
}
