//! 配额中间件
//!
//! 在认证之后运行。限额类别的选取：批量端点用 batch 限额，
//! premium 用户用 premium 限额，其余用 standard 限额。
//! 批量操作使用独立的窗口键，不与普通请求共享预算。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use mlqueue_domain::entities::Tier;

use crate::{auth::CurrentUser, error::ApiError, routes::AppState};

pub async fn rate_limit_standard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    rate_limit(state, req, next, false).await
}

pub async fn rate_limit_batch(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    rate_limit(state, req, next, true).await
}

async fn rate_limit(
    state: AppState,
    req: Request,
    next: Next,
    is_batch: bool,
) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .cloned()
        .ok_or(ApiError::AuthRequired)?;

    let (key, limit) = if is_batch {
        (
            format!("ratelimit:batch:{}", user.user_id),
            state.rate_limits.batch,
        )
    } else if user.tier == Tier::Premium {
        (
            format!("ratelimit:{}", user.user_id),
            state.rate_limits.premium,
        )
    } else {
        (
            format!("ratelimit:{}", user.user_id),
            state.rate_limits.standard,
        )
    };

    let allowed = state.rate_limiter.check_and_record(&key, limit).await?;
    if !allowed {
        return Err(ApiError::RateLimited);
    }

    Ok(next.run(req).await)
}
