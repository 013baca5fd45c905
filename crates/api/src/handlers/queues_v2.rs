//! V2 训练队列管理
//!
//! 服务端只保管顺序与状态；创建后的状态迁移全部由客户端通过
//! start / complete / fail 三个端点驱动。影响客户端视图的变更
//! （增删改、重排）都会把所属单元的版本号原子地加一。

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use chrono::Utc;
use mlqueue_domain::entities::{short_id, CreatedBy, QueueStatus, TrainingQueue, UnitStatus};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiJson, ApiResult},
    response::{created, ok},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchQueueItem {
    pub name: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateQueuesRequest {
    pub queues: Option<Vec<BatchQueueItem>>,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQueuesParams {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQueueRequest {
    pub name: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteQueueRequest {
    pub result: Option<serde_json::Value>,
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct FailQueueRequest {
    #[serde(default)]
    pub error_msg: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderQueuesRequest {
    pub queue_ids: Option<Vec<String>>,
}

fn parse_created_by(value: Option<&str>) -> CreatedBy {
    match value {
        Some("client") => CreatedBy::Client,
        _ => CreatedBy::Web,
    }
}

/// 创建队列：order 追加到单元末尾（max + 1）
pub async fn create_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
    ApiJson(req): ApiJson<CreateQueueRequest>,
) -> ApiResult<Response> {
    let (Some(name), Some(parameters)) = (req.name.filter(|n| !n.is_empty()), req.parameters)
    else {
        return Err(ApiError::invalid_config("name 与 parameters 为必填字段"));
    };

    state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    let max_order = state.queues.max_order(&unit_id).await?;
    let now = Utc::now();
    let queue = TrainingQueue {
        id: short_id("queue"),
        unit_id: unit_id.clone(),
        name,
        parameters,
        queue_order: max_order + 1,
        status: QueueStatus::Pending,
        started_at: None,
        completed_at: None,
        result: None,
        metrics: None,
        error_msg: None,
        created_by: parse_created_by(req.created_by.as_deref()),
        created_at: now,
        updated_at: now,
        user_id: user.user_id,
    };
    state.queues.create(&queue).await?;
    state.units.bump_version(&unit_id).await?;

    Ok(created(json!({
        "queue_id": queue.id,
        "queue": queue,
    })))
}

/// 批量创建（超参搜索场景）：逐项尽力而为，整批只推进一次版本号
pub async fn batch_create_queues(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
    ApiJson(req): ApiJson<BatchCreateQueuesRequest>,
) -> ApiResult<Response> {
    let Some(items) = req.queues else {
        return Err(ApiError::invalid_config("queues 为必填字段"));
    };

    state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    let max_order = state.queues.max_order(&unit_id).await?;
    let created_by = parse_created_by(req.created_by.as_deref());
    let now = Utc::now();

    let mut queue_ids = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let (Some(name), Some(parameters)) = (item.name.filter(|n| !n.is_empty()), item.parameters)
        else {
            continue;
        };
        let queue = TrainingQueue {
            id: short_id("queue"),
            unit_id: unit_id.clone(),
            name,
            parameters,
            queue_order: max_order + 1 + i as i32,
            status: QueueStatus::Pending,
            started_at: None,
            completed_at: None,
            result: None,
            metrics: None,
            error_msg: None,
            created_by,
            created_at: now,
            updated_at: now,
            user_id: user.user_id.clone(),
        };
        if state.queues.create(&queue).await.is_err() {
            continue;
        }
        queue_ids.push(queue.id);
    }

    state.units.bump_version(&unit_id).await?;

    Ok(created(json!({
        "queue_ids": queue_ids,
        "created_count": queue_ids.len(),
    })))
}

pub async fn list_queues(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
    Query(params): Query<ListQueuesParams>,
) -> ApiResult<Response> {
    state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            QueueStatus::parse(s).ok_or_else(|| ApiError::invalid_config("无效的状态过滤"))?,
        ),
    };

    let queues = state.queues.list_by_unit(&unit_id, status).await?;

    Ok(ok(json!({
        "count": queues.len(),
        "queues": queues,
    })))
}

pub async fn get_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(queue_id): Path<String>,
) -> ApiResult<Response> {
    let queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    Ok(ok(json!({ "queue": queue })))
}

/// 更新队列参数：仅 pending 可改；order 不经此路径修改（走 reorder）
pub async fn update_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(queue_id): Path<String>,
    ApiJson(req): ApiJson<UpdateQueueRequest>,
) -> ApiResult<Response> {
    let mut queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    if queue.status == QueueStatus::Running {
        return Err(ApiError::invalid_config("无法修改运行中的队列"));
    }
    if queue.status == QueueStatus::Completed {
        return Err(ApiError::invalid_config("无法修改已完成的队列"));
    }

    if let Some(name) = req.name.filter(|n| !n.is_empty()) {
        queue.name = name;
    }
    if let Some(parameters) = req.parameters {
        queue.parameters = parameters;
    }
    state.queues.update_fields(&queue).await?;
    state.units.bump_version(&queue.unit_id).await?;

    Ok(ok(json!({ "queue": queue })))
}

/// 删除队列：running 拒绝；不回填剩余队列的 order
pub async fn delete_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(queue_id): Path<String>,
) -> ApiResult<Response> {
    let queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    if queue.status == QueueStatus::Running {
        return Err(ApiError::invalid_config("无法删除运行中的队列"));
    }

    state.queues.delete(&queue_id).await?;
    state.units.bump_version(&queue.unit_id).await?;

    Ok(ok(json!({ "message": "队列已删除" })))
}

// ============ 客户端执行控制 ============

/// 客户端开始执行：仅 pending 可开始，同时把所属单元置为 running
pub async fn start_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(queue_id): Path<String>,
) -> ApiResult<Response> {
    let queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    let started = state.queues.start_if_pending(&queue_id, Utc::now()).await?;
    if !started {
        return Err(ApiError::InvalidQueueStatus(
            "队列状态不是pending，无法开始".to_string(),
        ));
    }

    state
        .units
        .set_status(&queue.unit_id, UnitStatus::Running)
        .await?;

    let queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    Ok(ok(json!({ "queue": queue })))
}

/// 客户端标记完成：要求当前为 running，写入 result 与 metrics
pub async fn complete_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(queue_id): Path<String>,
    ApiJson(req): ApiJson<CompleteQueueRequest>,
) -> ApiResult<Response> {
    state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    let completed = state
        .queues
        .complete_if_running(&queue_id, req.result, req.metrics, Utc::now())
        .await?;
    if !completed {
        return Err(ApiError::InvalidQueueStatus(
            "队列状态不是running，无法标记完成".to_string(),
        ));
    }

    let queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    Ok(ok(json!({ "queue": queue })))
}

/// 客户端标记失败：要求当前为 running，记录 error_msg
pub async fn fail_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(queue_id): Path<String>,
    ApiJson(req): ApiJson<FailQueueRequest>,
) -> ApiResult<Response> {
    state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    let failed = state
        .queues
        .fail_if_running(&queue_id, &req.error_msg, Utc::now())
        .await?;
    if !failed {
        return Err(ApiError::InvalidQueueStatus(
            "队列状态不是running，无法标记失败".to_string(),
        ));
    }

    let queue = state
        .queues
        .get(&queue_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练队列不存在"))?;

    Ok(ok(json!({ "queue": queue })))
}

/// 重排 pending 后缀
///
/// 请求只枚举 pending 队列的新顺序；非 pending 队列占据 order 前缀
/// （0..P-1），pending 按请求顺序获得 P、P+1、…。行更新在单个事务内
/// 完成，整体成功或整体回滚，最后推进一次版本号。
pub async fn reorder_queues(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(unit_id): Path<String>,
    ApiJson(req): ApiJson<ReorderQueuesRequest>,
) -> ApiResult<Response> {
    let Some(queue_ids) = req.queue_ids else {
        return Err(ApiError::invalid_config("queue_ids 为必填字段"));
    };

    state
        .units
        .get(&unit_id, &user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("训练单元不存在"))?;

    let queues = state.queues.get_many(&queue_ids, &user.user_id).await?;
    if queues.len() != queue_ids.len() {
        return Err(ApiError::invalid_config("部分队列不存在或无权限"));
    }
    for queue in &queues {
        if queue.unit_id != unit_id {
            return Err(ApiError::invalid_config("部分队列不属于该训练单元"));
        }
    }
    for queue in &queues {
        if queue.status != QueueStatus::Pending {
            return Err(ApiError::InvalidQueueStatus(
                "只能调整pending状态的队列".to_string(),
            ));
        }
    }

    // pending 的新 order 从非 pending 的数量开始，保持前缀不被侵占
    let start_order = state.queues.count_non_pending(&unit_id).await? as i32;
    state
        .queues
        .reorder(&unit_id, &queue_ids, start_order)
        .await?;
    state.units.bump_version(&unit_id).await?;

    Ok(ok(json!({
        "message": "队列顺序已更新",
        "count": queue_ids.len(),
    })))
}
