use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mlqueue_errors::MLQueueError;
use serde::de::DeserializeOwned;
use serde_json::json;

/// API 错误类型
///
/// 错误响应统一为 `{"success": false, "error": <本地化消息>, "code": <稳定错误码>}`；
/// 客户端应按 `code` 分支，消息文案不构成契约。
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("服务错误: {0}")]
    Service(#[from] MLQueueError),

    #[error("需要身份验证")]
    AuthRequired,

    #[error("无效的Token")]
    InvalidToken,

    #[error("请求频率超限")]
    RateLimited,

    #[error("无效的请求参数: {0}")]
    InvalidConfig(String),

    #[error("无效的优先级")]
    InvalidPriority,

    #[error("任务不存在")]
    TaskNotFound,

    /// V2 资源未找到，携带资源相关的消息文案
    #[error("{0}")]
    NotFound(String),

    #[error("只能修改队列中任务的优先级")]
    TaskAlreadyRunning,

    #[error("任务已完成或已取消")]
    TaskAlreadyCompleted,

    #[error("{0}")]
    InvalidQueueStatus(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    fn status_and_body(&self) -> (StatusCode, String, Option<&'static str>) {
        match self {
            ApiError::Service(err) => {
                let status = match err.code() {
                    "AUTH_REQUIRED" | "INVALID_TOKEN" => StatusCode::UNAUTHORIZED,
                    "RATE_LIMIT_EXCEEDED" => StatusCode::TOO_MANY_REQUESTS,
                    "TASK_NOT_FOUND" => StatusCode::NOT_FOUND,
                    "INTERNAL_ERROR" => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, err.user_message().to_string(), Some(err.code()))
            }
            ApiError::AuthRequired => (
                StatusCode::UNAUTHORIZED,
                "需要身份验证".to_string(),
                Some("AUTH_REQUIRED"),
            ),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "无效的Token".to_string(),
                Some("INVALID_TOKEN"),
            ),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "请求频率超限".to_string(),
                Some("RATE_LIMIT_EXCEEDED"),
            ),
            ApiError::InvalidConfig(_) => (
                StatusCode::BAD_REQUEST,
                "无效的请求参数".to_string(),
                Some("INVALID_CONFIG"),
            ),
            ApiError::InvalidPriority => (
                StatusCode::BAD_REQUEST,
                "无效的优先级".to_string(),
                Some("INVALID_PRIORITY"),
            ),
            ApiError::TaskNotFound => (
                StatusCode::NOT_FOUND,
                "任务不存在".to_string(),
                Some("TASK_NOT_FOUND"),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            ApiError::TaskAlreadyRunning => (
                StatusCode::BAD_REQUEST,
                "只能修改队列中任务的优先级".to_string(),
                Some("TASK_ALREADY_RUNNING"),
            ),
            ApiError::TaskAlreadyCompleted => (
                StatusCode::BAD_REQUEST,
                "任务已完成或已取消".to_string(),
                Some("TASK_ALREADY_COMPLETED"),
            ),
            ApiError::InvalidQueueStatus(msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                Some("INVALID_QUEUE_STATUS"),
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统繁忙，请稍后重试".to_string(),
                Some("INTERNAL_ERROR"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = self.status_and_body();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "请求处理失败");
        }

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if let Some(code) = code {
            body["code"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}

/// API 结果类型
pub type ApiResult<T> = Result<T, ApiError>;

/// JSON 请求体提取器
///
/// 把 axum 默认的 JSON 解析失败改写成本服务的错误响应形状
/// （400 + INVALID_CONFIG），而不是框架默认的纯文本拒绝。
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::InvalidConfig(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_401() {
        let (status, _, code) = ApiError::AuthRequired.status_and_body();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, Some("AUTH_REQUIRED"));

        let (status, _, code) = ApiError::InvalidToken.status_and_body();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, Some("INVALID_TOKEN"));
    }

    #[test]
    fn test_state_machine_violations_map_to_400() {
        let (status, _, code) = ApiError::TaskAlreadyRunning.status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, Some("TASK_ALREADY_RUNNING"));

        let (status, _, code) =
            ApiError::InvalidQueueStatus("只能调整pending状态的队列".to_string()).status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, Some("INVALID_QUEUE_STATUS"));
    }

    #[test]
    fn test_service_errors_inherit_code() {
        let err = ApiError::Service(MLQueueError::task_not_found("task_x"));
        let (status, _, code) = err.status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, Some("TASK_NOT_FOUND"));

        let err = ApiError::Service(MLQueueError::internal("boom"));
        let (status, _, code) = err.status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, Some("INTERNAL_ERROR"));
    }

    #[test]
    fn test_v2_not_found_omits_code() {
        let (status, message, code) = ApiError::not_found("训练单元不存在").status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "训练单元不存在");
        assert_eq!(code, None);
    }
}
