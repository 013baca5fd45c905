//! 任务统计

use axum::{
    extract::{Query, State},
    response::Response,
};
use chrono::{Duration, NaiveDate, Utc};
use mlqueue_domain::entities::TaskStatus;
use serde::Deserialize;
use serde_json::json;

use crate::{auth::CurrentUser, error::ApiResult, response::ok, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// 统计窗口内的任务数量、成功率与平均时长（默认最近 30 天）
pub async fn get_task_statistics(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<StatisticsParams>,
) -> ApiResult<Response> {
    let now = Utc::now();
    let start = params
        .start_date
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(now - Duration::days(30));
    let end = params
        .end_date
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .unwrap_or(now);

    let uid = &user.user_id;
    let total = state.tasks.count_created_between(uid, None, start, end).await?;
    let completed = state
        .tasks
        .count_created_between(uid, Some(TaskStatus::Completed), start, end)
        .await?;
    let failed = state
        .tasks
        .count_created_between(uid, Some(TaskStatus::Failed), start, end)
        .await?;

    let sample = state.tasks.completed_sample(uid, 100).await?;
    let average_duration = if sample.is_empty() {
        "0s".to_string()
    } else {
        let total_seconds: i64 = sample
            .iter()
            .filter_map(|t| Some((t.completed_at? - t.started_at?).num_seconds()))
            .sum();
        format!("{}s", total_seconds / sample.len() as i64)
    };

    let success_rate = if total > 0 {
        completed as f64 / total as f64
    } else {
        0.0
    };

    Ok(ok(json!({
        "period": {
            "start": start.format("%Y-%m-%d").to_string(),
            "end": end.format("%Y-%m-%d").to_string(),
        },
        "statistics": {
            "total_tasks": total,
            "completed_tasks": completed,
            "failed_tasks": failed,
            "average_duration": average_duration,
            "success_rate": success_rate,
        },
    })))
}
