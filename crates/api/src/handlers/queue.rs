//! V1 队列管理接口：状态查询、重排、暂停/恢复

use axum::{extract::State, response::Response};
use mlqueue_domain::entities::TaskStatus;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiJson, ApiResult},
    response::ok,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ReorderQueueRequest {
    pub task_ids: Option<Vec<String>>,
}

/// 队列状态：按状态统计 + 正在运行的任务样本 + 队列长度
pub async fn get_queue_status(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Response> {
    let uid = &user.user_id;
    let stats = json!({
        "pending": state.tasks.count_by_status(uid, TaskStatus::Pending).await?,
        "queued": state.tasks.count_by_status(uid, TaskStatus::Queued).await?,
        "running": state.tasks.count_by_status(uid, TaskStatus::Running).await?,
        "completed": state.tasks.count_by_status(uid, TaskStatus::Completed).await?,
        "failed": state.tasks.count_by_status(uid, TaskStatus::Failed).await?,
        "cancelled": state.tasks.count_by_status(uid, TaskStatus::Cancelled).await?,
    });

    let current_tasks: Vec<serde_json::Value> = state
        .tasks
        .running_sample(uid, 10)
        .await?
        .iter()
        .map(|t| {
            json!({
                "task_id": t.id,
                "name": t.name,
                "status": t.status,
                "started_at": t.started_at,
            })
        })
        .collect();

    let queue_length = state.queue_index.len().await?;
    // 粗略估算：平均每个任务 5 分钟
    let estimated_wait = format!("{}m0s", queue_length * 5);

    Ok(ok(json!({
        "queue_name": "default",
        "statistics": stats,
        "current_tasks": current_tasks,
        "queue_length": queue_length,
        "estimated_wait_time": estimated_wait,
    })))
}

/// 手动重排：按给定顺序重写优先级（第一个最高）
pub async fn reorder_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ReorderQueueRequest>,
) -> ApiResult<Response> {
    let Some(task_ids) = req.task_ids else {
        return Err(ApiError::invalid_config("task_ids 为必填字段"));
    };

    // 全部任务必须存在且属于当前用户
    for task_id in &task_ids {
        if state.tasks.get(task_id, &user.user_id).await?.is_none() {
            return Err(ApiError::TaskNotFound);
        }
    }

    let mut new_order = Vec::with_capacity(task_ids.len());
    for (i, task_id) in task_ids.iter().enumerate() {
        let priority = (task_ids.len() - i) as i32;
        state.tasks.update_priority(task_id, priority).await?;
        state.queue_index.update_priority(task_id, priority).await?;
        new_order.push(json!({
            "task_id": task_id,
            "position": i + 1,
        }));
    }

    Ok(ok(json!({
        "message": "队列已重新排序",
        "new_order": new_order,
    })))
}

/// 暂停调度：阻止新的派发，不打断执行中的任务
pub async fn pause_queue(State(state): State<AppState>, _user: CurrentUser) -> ApiResult<Response> {
    state.scheduler.pause();
    Ok(ok(json!({
        "queue_status": "paused",
        "message": "队列已暂停",
    })))
}

/// 恢复调度
pub async fn resume_queue(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Response> {
    state.scheduler.resume();
    Ok(ok(json!({
        "queue_status": "active",
        "message": "队列已恢复",
    })))
}
