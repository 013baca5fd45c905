//! V2 训练单元管理
//!
//! 单元是同步边界：version 是客户端的同步游标，心跳驱动连接状态。
//! 所有对外暴露单元的读路径先做活性检查，过期即惰性降级为 disconnected。

use axum::{
    extract::{Path, State},
    response::Response,
};
use chrono::Utc;
use mlqueue_domain::entities::{short_id, ConnectionStatus, TrainingUnit, UnitStatus};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiJson, ApiResult},
    response::{created, ok},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUnitRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub client_version: i32,
}

/// 活性窗口过期的惰性降级：内存视图与存储一并转为 disconnected
async fn coerce_connection_status(state: &AppState, unit: &mut TrainingUnit) -> ApiResult<()> {
    if unit.is_live(Utc::now()) {
        return Ok(());
    }
    if unit.connection_status == ConnectionStatus::Connected {
        state.units.mark_disconnected(&unit.id).await?;
    }
    unit.connection_status = ConnectionStatus::Disconnected;
    Ok(())
}

pub async fn create_unit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
    ApiJson(req): ApiJson<CreateUnitRequest>,
) -> ApiResult<Response> {
    let Some(name) = req.name.filter(|n| !n.is_empty()) else {
        return Err(ApiError::invalid_config("name 为必填字段"));
    };

    state
        .groups
        .get(&group_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("组不存在"))?;

    let now = Utc::now();
    let unit = TrainingUnit {
        id: short_id("unit"),
        group_id,
        name,
        description: req.description,
        config: req.config,
        version: 1,
        status: UnitStatus::Idle,
        connection_status: ConnectionStatus::Disconnected,
        last_heartbeat: None,
        created_at: now,
        updated_at: now,
        user_id: user.user_id,
    };
    state.units.create(&unit).await?;

    Ok(created(json!({
        "unit_id": unit.id,
        "version": unit.version,
    })))
}

pub async fn list_units(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> ApiResult<Response> {
    state
        .groups
        .get(&group_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("组不存在"))?;

    let mut units = state.units.list_by_group(&group_id).await?;
    let mut payload = Vec::with_capacity(units.len());
    for unit in units.iter_mut() {
        coerce_connection_status(&state, unit).await?;
        let queue_count = state.queues.count_by_unit(&unit.id).await?;
        let mut entry =
            serde_json::to_value(&*unit).map_err(mlqueue_errors::MLQueueError::from)?;
        if let Some(map) = entry.as_object_mut() {
            map.insert("queue_count".to_string(), json!(queue_count));
        }
        payload.push(entry);
    }

    Ok(ok(json!({ "units": payload })))
}

pub async fn get_unit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
) -> ApiResult<Response> {
    let mut unit = state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    coerce_connection_status(&state, &mut unit).await?;

    Ok(ok(json!({ "unit": unit })))
}

/// 同步端点：客户端带上本地版本，服务端返回是否需要刷新及完整视图。
/// 响应中的队列顺序（order 升序）即客户端的权威执行顺序。
pub async fn sync_unit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
    ApiJson(req): ApiJson<SyncRequest>,
) -> ApiResult<Response> {
    let mut unit = state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    coerce_connection_status(&state, &mut unit).await?;

    let need_sync = unit.version > req.client_version;
    let queues = state.queues.list_by_unit(&unit_id, None).await?;

    Ok(ok(json!({
        "need_sync": need_sync,
        "cloud_version": unit.version,
        "unit": unit,
        "queues": queues,
    })))
}

pub async fn update_unit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
    ApiJson(req): ApiJson<UpdateUnitRequest>,
) -> ApiResult<Response> {
    let mut unit = state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    if let Some(name) = req.name.filter(|n| !n.is_empty()) {
        unit.name = name;
    }
    unit.description = req.description;
    if req.config.is_some() {
        unit.config = req.config;
    }
    state.units.update_fields(&unit).await?;

    // 客户端需要刷新本地配置，版本号推进一格
    let version = state.units.bump_version(&unit_id).await?;
    unit.version = version;

    Ok(ok(json!({
        "unit": unit,
        "version": version,
    })))
}

pub async fn delete_unit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
) -> ApiResult<Response> {
    let queue_count = state.queues.count_by_unit(&unit_id).await?;
    if queue_count > 0 {
        return Err(ApiError::invalid_config(
            "训练单元内还有训练队列，无法删除",
        ));
    }

    let deleted = state.units.delete(&unit_id, &user.user_id).await?;
    if !deleted {
        return Err(ApiError::not_found("训练单元不存在"));
    }
    Ok(ok(json!({ "message": "训练单元已删除" })))
}

/// 客户端心跳：刷新 last_heartbeat 并标记 connected
pub async fn heartbeat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
) -> ApiResult<Response> {
    state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    let now = Utc::now();
    state.units.record_heartbeat(&unit_id, now).await?;

    Ok(ok(json!({
        "connection_status": ConnectionStatus::Connected,
        "last_heartbeat": now,
    })))
}
