//! V1 任务接口
//!
//! 创建即入队；所有写操作先经过存储，再同步队列索引。

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use mlqueue_domain::entities::{Task, TaskStatus};
use mlqueue_domain::events::TaskEvent;
use mlqueue_domain::repositories::TaskFilter;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiJson, ApiResult},
    response::{created, ok},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: i32,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub tasks: Option<Vec<CreateTaskRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CancelTaskRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadResultRequest {
    pub result: Option<serde_json::Value>,
    pub artifacts: Option<serde_json::Value>,
}

/// 创建训练任务
pub async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> ApiResult<Response> {
    let (Some(name), Some(config)) = (req.name, req.config) else {
        return Err(ApiError::invalid_config("name 与 config 为必填字段"));
    };

    let task = Task::new(name, config, req.priority, req.metadata, user.user_id.clone());
    state.tasks.create(&task).await?;

    if let Err(err) = state.queue_index.enqueue(&task.id, task.priority).await {
        // 入队失败时尽力回滚行插入，避免产生永远不被调度的 queued 行
        let _ = state.tasks.delete(&task.id).await;
        return Err(err.into());
    }

    let position = queue_position(&state, &task.id).await;
    state
        .events
        .publish(&user.user_id, TaskEvent::Queued, &task.id, None)
        .await;

    Ok(created(json!({
        "task_id": task.id,
        "status": task.status,
        "queue_position": position,
    })))
}

/// 批量创建任务：逐项尽力而为，失败项跳过，不提供跨项事务
pub async fn batch_create_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<BatchCreateRequest>,
) -> ApiResult<Response> {
    let Some(items) = req.tasks else {
        return Err(ApiError::invalid_config("tasks 为必填字段"));
    };

    let mut task_ids = Vec::with_capacity(items.len());
    for item in items {
        let (Some(name), Some(config)) = (item.name, item.config) else {
            continue;
        };
        let task = Task::new(name, config, item.priority, None, user.user_id.clone());
        if state.tasks.create(&task).await.is_err() {
            continue;
        }
        if state
            .queue_index
            .enqueue(&task.id, task.priority)
            .await
            .is_err()
        {
            continue;
        }
        state
            .events
            .publish(&user.user_id, TaskEvent::Queued, &task.id, None)
            .await;
        task_ids.push(task.id);
    }

    Ok(created(json!({
        "task_ids": task_ids,
        "created_count": task_ids.len(),
    })))
}

/// 任务列表，支持状态过滤与分页
pub async fn list_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<ListTasksParams>,
) -> ApiResult<Response> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            TaskStatus::parse(s).ok_or_else(|| ApiError::invalid_config("无效的状态过滤"))?,
        ),
    };

    let filter = TaskFilter {
        status,
        limit: params.limit.unwrap_or(100),
        offset: params.offset.unwrap_or(0),
        sort: params.sort,
    };

    let (tasks, total) = state.tasks.list(&user.user_id, &filter).await?;
    let task_list: Vec<serde_json::Value> = tasks
        .iter()
        .map(|t| {
            json!({
                "task_id": t.id,
                "name": t.name,
                "status": t.status,
                "priority": t.priority,
                "created_at": t.created_at,
            })
        })
        .collect();

    Ok(ok(json!({
        "tasks": task_list,
        "total": total,
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

/// 任务详情
pub async fn get_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let task = state
        .tasks
        .get(&task_id, &user.user_id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    Ok(ok(json!({
        "task_id": task.id,
        "name": task.name,
        "config": task.config,
        "priority": task.priority,
        "status": task.status,
        "created_at": task.created_at,
        "started_at": task.started_at,
        "completed_at": task.completed_at,
        "result": task.result,
        "error_message": task.error_message,
    })))
}

/// 修改优先级：仅允许 queued/pending 状态
pub async fn update_task_priority(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
    ApiJson(req): ApiJson<UpdatePriorityRequest>,
) -> ApiResult<Response> {
    let Some(priority) = req.priority else {
        return Err(ApiError::InvalidPriority);
    };

    let task = state
        .tasks
        .get(&task_id, &user.user_id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    if task.status != TaskStatus::Queued && task.status != TaskStatus::Pending {
        return Err(ApiError::TaskAlreadyRunning);
    }

    state.tasks.update_priority(&task_id, priority).await?;
    state.queue_index.update_priority(&task_id, priority).await?;
    let position = queue_position(&state, &task_id).await;

    Ok(ok(json!({
        "task_id": task_id,
        "new_priority": priority,
        "new_queue_position": position,
    })))
}

/// 取消任务：终端状态（completed/cancelled）拒绝；running 允许，
/// 执行中的 worker 不被打断，但其完成结果不会覆盖取消状态
pub async fn cancel_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
    ApiJson(req): ApiJson<CancelTaskRequest>,
) -> ApiResult<Response> {
    let task = state
        .tasks
        .get(&task_id, &user.user_id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    if task.status == TaskStatus::Completed || task.status == TaskStatus::Cancelled {
        return Err(ApiError::TaskAlreadyCompleted);
    }

    let message = format!("用户取消: {}", req.reason);
    state.tasks.cancel(&task_id, &message).await?;

    // 索引移除失败不影响取消结果（行状态是权威）
    if let Err(err) = state.queue_index.remove(&task_id).await {
        tracing::warn!(task_id = %task_id, error = %err, "从队列索引移除失败");
    }

    state
        .events
        .publish(&user.user_id, TaskEvent::Cancelled, &task_id, None)
        .await;

    Ok(ok(json!({
        "task_id": task_id,
        "status": TaskStatus::Cancelled,
    })))
}

/// 上传结果：写入 result（合并 artifacts）并置为 completed
pub async fn upload_result(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
    ApiJson(req): ApiJson<UploadResultRequest>,
) -> ApiResult<Response> {
    let Some(mut result) = req.result else {
        return Err(ApiError::invalid_config("result 为必填字段"));
    };

    state
        .tasks
        .get(&task_id, &user.user_id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    if let Some(artifacts) = req.artifacts {
        if let Some(map) = result.as_object_mut() {
            map.insert("artifacts".to_string(), artifacts);
        }
    }

    state
        .tasks
        .upload_result(&task_id, result.clone(), chrono::Utc::now())
        .await?;

    state
        .events
        .publish(&user.user_id, TaskEvent::Completed, &task_id, Some(result))
        .await;

    Ok(ok(json!({
        "task_id": task_id,
        "status": TaskStatus::Completed,
    })))
}

/// 任务日志：由生命周期时间戳合成
pub async fn get_task_logs(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let task = state
        .tasks
        .get(&task_id, &user.user_id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    let mut logs = vec![json!({
        "timestamp": task.created_at.to_rfc3339(),
        "level": "INFO",
        "message": "任务已创建",
    })];

    if let Some(started_at) = task.started_at {
        logs.push(json!({
            "timestamp": started_at.to_rfc3339(),
            "level": "INFO",
            "message": "开始训练...",
        }));
    }

    if let Some(completed_at) = task.completed_at {
        logs.push(json!({
            "timestamp": completed_at.to_rfc3339(),
            "level": "INFO",
            "message": "训练完成",
        }));
    }

    Ok(ok(json!({
        "task_id": task_id,
        "logs": logs,
    })))
}

/// 1 起始的队列位置，不在队列中返回 -1
async fn queue_position(state: &AppState, task_id: &str) -> i64 {
    match state.queue_index.rank(task_id).await {
        Ok(Some(rank)) => rank + 1,
        _ => -1,
    }
}
