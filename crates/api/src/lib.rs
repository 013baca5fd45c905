//! # MLQueue API
//!
//! HTTP 接入层：/v1 云端调度接口与 /v2 客户端驱动接口，
//! 统一经过 Bearer 认证与滑动窗口限流。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiJson, ApiResult};
pub use routes::{create_routes, AppState};
