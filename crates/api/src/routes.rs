use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use mlqueue_config::RateLimitConfig;
use mlqueue_domain::ports::{EventPublisher, RateLimiter, SchedulerControl, TaskQueueIndex};
use mlqueue_domain::repositories::{
    GroupRepository, TaskRepository, TemplateRepository, TrainingQueueRepository, UnitRepository,
    UserRepository, WebhookRepository,
};

use crate::{
    auth::auth_middleware,
    handlers::{
        groups::{create_group, delete_group, get_group, list_groups, update_group},
        health::health_check,
        queue::{get_queue_status, pause_queue, reorder_queue, resume_queue},
        queues_v2::{
            batch_create_queues, complete_queue, create_queue, delete_queue, fail_queue,
            get_queue, list_queues, reorder_queues, start_queue, update_queue,
        },
        statistics::get_task_statistics,
        tasks::{
            batch_create_tasks, cancel_task, create_task, get_task, get_task_logs, list_tasks,
            update_task_priority, upload_result,
        },
        templates::{create_template, list_templates},
        units::{
            create_unit, delete_unit, get_unit, heartbeat, list_units, sync_unit, update_unit,
        },
    },
    middleware::{cors_layer, trace_layer},
    rate_limit::{rate_limit_batch, rate_limit_standard},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub units: Arc<dyn UnitRepository>,
    pub queues: Arc<dyn TrainingQueueRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub queue_index: Arc<dyn TaskQueueIndex>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub events: Arc<dyn EventPublisher>,
    pub scheduler: Arc<dyn SchedulerControl>,
    pub rate_limits: RateLimitConfig,
}

pub fn create_routes(state: AppState) -> Router {
    // V1: 云端调度接口
    let v1_standard = Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{task_id}", get(get_task))
        .route("/tasks/{task_id}/priority", patch(update_task_priority))
        .route("/tasks/{task_id}/cancel", post(cancel_task))
        .route("/tasks/{task_id}/result", post(upload_result))
        .route("/tasks/{task_id}/logs", get(get_task_logs))
        .route("/queue/status", get(get_queue_status))
        .route("/queue/reorder", post(reorder_queue))
        .route("/queue/pause", post(pause_queue))
        .route("/queue/resume", post(resume_queue))
        .route("/configs/templates", get(list_templates).post(create_template))
        .route("/statistics/tasks", get(get_task_statistics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_standard,
        ));

    let v1_batch = Router::new()
        .route("/tasks/batch", post(batch_create_tasks))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_batch,
        ));

    // V2: 客户端驱动接口
    let v2_standard = Router::new()
        .route("/groups", post(create_group).get(list_groups))
        .route(
            "/groups/{group_id}",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route("/groups/{group_id}/units", post(create_unit).get(list_units))
        .route(
            "/units/{unit_id}",
            get(get_unit).put(update_unit).delete(delete_unit),
        )
        .route("/units/{unit_id}/sync", post(sync_unit))
        .route("/units/{unit_id}/heartbeat", post(heartbeat))
        .route("/units/{unit_id}/queues", post(create_queue).get(list_queues))
        .route("/units/{unit_id}/queues/reorder", post(reorder_queues))
        .route(
            "/queues/{queue_id}",
            get(get_queue).put(update_queue).delete(delete_queue),
        )
        .route("/queues/{queue_id}/start", post(start_queue))
        .route("/queues/{queue_id}/complete", post(complete_queue))
        .route("/queues/{queue_id}/fail", post(fail_queue))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_standard,
        ));

    let v2_batch = Router::new()
        .route("/units/{unit_id}/queues/batch", post(batch_create_queues))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_batch,
        ));

    let authed = Router::new()
        .nest("/v1", v1_standard.merge(v1_batch))
        .nest("/v2", v2_standard.merge(v2_batch))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(authed)
        .layer(cors_layer())
        .layer(trace_layer())
        .with_state(state)
}
