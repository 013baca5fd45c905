//! Bearer 认证
//!
//! `Authorization: Bearer <token>` 按 api_key 精确匹配解析为主体 {id, tier}。
//! 缺失 header 返回 AUTH_REQUIRED，格式错误或无法匹配返回 INVALID_TOKEN。

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use mlqueue_domain::entities::Tier;
use tracing::warn;

use crate::{error::ApiError, routes::AppState};

pub const BEARER_PREFIX: &str = "Bearer ";

/// 认证后的请求主体
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub tier: Tier,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::AuthRequired)
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header) = header else {
        return Err(ApiError::AuthRequired);
    };

    let Some(token) = header.strip_prefix(BEARER_PREFIX) else {
        return Err(ApiError::InvalidToken);
    };

    let user = state.users.find_by_api_key(token).await?;
    let Some(user) = user else {
        warn!("认证失败: 未知 Token");
        return Err(ApiError::InvalidToken);
    };

    req.extensions_mut().insert(CurrentUser {
        user_id: user.id,
        tier: user.tier,
    });
    Ok(next.run(req).await)
}
