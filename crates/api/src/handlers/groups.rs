//! V2 组管理

use axum::{
    extract::{Path, State},
    response::Response,
};
use chrono::Utc;
use mlqueue_domain::entities::{short_id, Group};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiJson, ApiResult},
    response::{created, ok},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> ApiResult<Response> {
    let Some(name) = req.name.filter(|n| !n.is_empty()) else {
        return Err(ApiError::invalid_config("name 为必填字段"));
    };

    let now = Utc::now();
    let group = Group {
        id: short_id("group"),
        name,
        description: req.description,
        user_id: user.user_id,
        created_at: now,
        updated_at: now,
    };
    state.groups.create(&group).await?;

    Ok(created(json!({
        "group_id": group.id,
        "name": group.name,
    })))
}

pub async fn list_groups(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    let groups = state.groups.list(&user.user_id).await?;
    Ok(ok(json!({ "groups": groups })))
}

pub async fn get_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> ApiResult<Response> {
    let group = state
        .groups
        .get(&group_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("组不存在"))?;

    let unit_count = state.units.count_by_group(&group_id).await?;

    Ok(ok(json!({
        "group": group,
        "unit_count": unit_count,
    })))
}

pub async fn update_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
    ApiJson(req): ApiJson<UpdateGroupRequest>,
) -> ApiResult<Response> {
    let mut group = state
        .groups
        .get(&group_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("组不存在"))?;

    if let Some(name) = req.name.filter(|n| !n.is_empty()) {
        group.name = name;
    }
    group.description = req.description;
    state.groups.update(&group).await?;

    Ok(ok(json!({ "group": group })))
}

pub async fn delete_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> ApiResult<Response> {
    let deleted = state.groups.delete(&group_id, &user.user_id).await?;
    if !deleted {
        return Err(ApiError::not_found("组不存在"));
    }
    Ok(ok(json!({ "message": "组已删除" })))
}
