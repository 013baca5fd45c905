use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mlqueue_api::{create_routes, AppState};
use mlqueue_config::RateLimitConfig;
use mlqueue_domain::entities::{QueueStatus, TaskStatus};
use mlqueue_domain::ports::{SchedulerControl, TaskQueueIndex};
use mlqueue_domain::repositories::{
    GroupRepository, TaskRepository, TrainingQueueRepository, UnitRepository,
};
use mlqueue_infrastructure::InMemoryQueueIndex;
use mlqueue_testing_utils::{
    GroupBuilder, MockGroupRepository, MockTaskRepository, MockTemplateRepository,
    MockTrainingQueueRepository, MockUnitRepository, MockUserRepository, MockWebhookRepository,
    RecordingEventPublisher, TaskBuilder, TrainingQueueBuilder, UnitBuilder, UserBuilder,
};
use mlqueue_infrastructure::InMemoryRateLimiter;
use tower::ServiceExt;

const API_KEY: &str = "test-api-key";
const OTHER_KEY: &str = "other-api-key";

#[derive(Default)]
struct TestPauseFlag {
    paused: std::sync::RwLock<bool>,
}

impl SchedulerControl for TestPauseFlag {
    fn pause(&self) {
        *self.paused.write().unwrap() = true;
    }
    fn resume(&self) {
        *self.paused.write().unwrap() = false;
    }
    fn is_paused(&self) -> bool {
        *self.paused.read().unwrap()
    }
}

struct TestApp {
    router: Router,
    tasks: MockTaskRepository,
    units: MockUnitRepository,
    queues: MockTrainingQueueRepository,
    groups: MockGroupRepository,
    index: Arc<InMemoryQueueIndex>,
    events: RecordingEventPublisher,
    pause: Arc<TestPauseFlag>,
}

fn test_app_with_limits(limits: RateLimitConfig) -> TestApp {
    let users = MockUserRepository::with_users(vec![
        UserBuilder::new()
            .with_id("user_test")
            .with_api_key(API_KEY)
            .build(),
        UserBuilder::new()
            .with_id("user_other")
            .with_api_key(OTHER_KEY)
            .build(),
    ]);
    let tasks = MockTaskRepository::new();
    let groups = MockGroupRepository::new();
    let units = MockUnitRepository::new();
    let queues = MockTrainingQueueRepository::new();
    let index = Arc::new(InMemoryQueueIndex::new());
    let events = RecordingEventPublisher::new();
    let pause = Arc::new(TestPauseFlag::default());

    let state = AppState {
        users: Arc::new(users),
        tasks: Arc::new(tasks.clone()),
        groups: Arc::new(groups.clone()),
        units: Arc::new(units.clone()),
        queues: Arc::new(queues.clone()),
        templates: Arc::new(MockTemplateRepository::new()),
        webhooks: Arc::new(MockWebhookRepository::new()),
        queue_index: index.clone(),
        rate_limiter: Arc::new(InMemoryRateLimiter::new()),
        events: Arc::new(events.clone()),
        scheduler: pause.clone(),
        rate_limits: limits,
    };

    TestApp {
        router: create_routes(state),
        tasks,
        units,
        queues,
        groups,
        index,
        events,
        pause,
    }
}

fn test_app() -> TestApp {
    test_app_with_limits(RateLimitConfig {
        standard: 100,
        premium: 1000,
        batch: 10,
    })
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

// ============================================================================
// 认证与配额
// ============================================================================

#[tokio::test]
async fn test_health_requires_no_auth() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_token_is_401_auth_required() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/v1/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_unknown_token_is_401_invalid_token() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/v1/tasks", Some("nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_rate_limit_returns_429_after_budget() {
    let app = test_app_with_limits(RateLimitConfig {
        standard: 2,
        premium: 1000,
        batch: 10,
    });
    for _ in 0..2 {
        let (status, _) = send(&app.router, "GET", "/v1/tasks", Some(API_KEY), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app.router, "GET", "/v1/tasks", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_batch_quota_is_separate_from_standard() {
    let app = test_app_with_limits(RateLimitConfig {
        standard: 1,
        premium: 1000,
        batch: 1,
    });
    // 标准预算耗尽后，批量端点仍有独立预算
    let (status, _) = send(&app.router, "GET", "/v1/tasks", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app.router, "GET", "/v1/tasks", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(
        &app.router,
        "POST",
        "/v1/tasks/batch",
        Some(API_KEY),
        Some(serde_json::json!({"tasks": []})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ============================================================================
// V1 任务
// ============================================================================

#[tokio::test]
async fn test_create_task_enqueues_and_returns_position() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/tasks",
        Some(API_KEY),
        Some(serde_json::json!({
            "name": "train-1",
            "config": {"epochs": 3},
            "priority": 5,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["queue_position"], 1);

    let task_id = body["task_id"].as_str().unwrap();
    assert!(task_id.starts_with("task_"));
    assert_eq!(app.index.len().await.unwrap(), 1);
    assert!(app.events.event_names().contains(&"task.queued".to_string()));
}

#[tokio::test]
async fn test_create_task_missing_config_is_invalid() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/tasks",
        Some(API_KEY),
        Some(serde_json::json!({"name": "no-config"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_CONFIG");
    assert_eq!(app.tasks.count(), 0);
}

#[tokio::test]
async fn test_priority_overtaking_order() {
    // S1: priority 1, 5, 3 → 队列位置 b=1, c=2, a=3
    let app = test_app();
    let mut ids = Vec::new();
    for (name, priority) in [("a", 1), ("b", 5), ("c", 3)] {
        let (status, body) = send(
            &app.router,
            "POST",
            "/v1/tasks",
            Some(API_KEY),
            Some(serde_json::json!({"name": name, "config": {}, "priority": priority})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["task_id"].as_str().unwrap().to_string());
    }

    assert_eq!(app.index.rank(&ids[1]).await.unwrap(), Some(0));
    assert_eq!(app.index.rank(&ids[2]).await.unwrap(), Some(1));
    assert_eq!(app.index.rank(&ids[0]).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_cross_tenant_task_is_404() {
    let app = test_app();
    let task = TaskBuilder::new().with_user("user_other").build();
    app.tasks.create(&task).await.unwrap();

    let uri = format!("/v1/tasks/{}", task.id);
    let (status, body) = send(&app.router, "GET", &uri, Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TASK_NOT_FOUND");

    // 属主访问正常
    let (status, _) = send(&app.router, "GET", &uri, Some(OTHER_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_priority_rejected_for_running() {
    let app = test_app();
    let task = TaskBuilder::new().with_user("user_test").running().build();
    app.tasks.create(&task).await.unwrap();

    let (status, body) = send(
        &app.router,
        "PATCH",
        &format!("/v1/tasks/{}/priority", task.id),
        Some(API_KEY),
        Some(serde_json::json!({"priority": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TASK_ALREADY_RUNNING");
}

#[tokio::test]
async fn test_update_priority_rescores_queue() {
    let app = test_app();
    let low = TaskBuilder::new().with_user("user_test").with_priority(1).build();
    let high = TaskBuilder::new().with_user("user_test").with_priority(5).build();
    for t in [&low, &high] {
        app.tasks.create(t).await.unwrap();
        app.index.enqueue(&t.id, t.priority).await.unwrap();
    }

    let (status, body) = send(
        &app.router,
        "PATCH",
        &format!("/v1/tasks/{}/priority", low.id),
        Some(API_KEY),
        Some(serde_json::json!({"priority": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_priority"], 9);
    assert_eq!(body["new_queue_position"], 1);
    assert_eq!(app.index.rank(&low.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_cancel_removes_from_queue() {
    // S2: 取消后行状态为 cancelled、原因写入 error_message、队列长度减一
    let app = test_app();
    let (_, body) = send(
        &app.router,
        "POST",
        "/v1/tasks",
        Some(API_KEY),
        Some(serde_json::json!({"name": "t", "config": {}, "priority": 0})),
    )
    .await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    assert_eq!(app.index.len().await.unwrap(), 1);

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v1/tasks/{task_id}/cancel"),
        Some(API_KEY),
        Some(serde_json::json!({"reason": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let task = app.tasks.get_unscoped(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.error_message.unwrap().contains("x"));
    assert_eq!(app.index.len().await.unwrap(), 0);
    assert_eq!(app.index.rank(&task_id).await.unwrap(), None);
    assert!(app
        .events
        .event_names()
        .contains(&"task.cancelled".to_string()));
}

#[tokio::test]
async fn test_cancel_completed_task_is_rejected() {
    let app = test_app();
    let task = TaskBuilder::new().with_user("user_test").completed().build();
    app.tasks.create(&task).await.unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v1/tasks/{}/cancel", task.id),
        Some(API_KEY),
        Some(serde_json::json!({"reason": "late"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TASK_ALREADY_COMPLETED");
}

#[tokio::test]
async fn test_empty_batch_create_returns_zero() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/tasks/batch",
        Some(API_KEY),
        Some(serde_json::json!({"tasks": []})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created_count"], 0);
}

#[tokio::test]
async fn test_batch_create_skips_invalid_items() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/tasks/batch",
        Some(API_KEY),
        Some(serde_json::json!({"tasks": [
            {"name": "ok-1", "config": {}},
            {"name": "missing-config"},
            {"name": "ok-2", "config": {}, "priority": 2},
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created_count"], 2);
    assert_eq!(body["task_ids"].as_array().unwrap().len(), 2);
    assert_eq!(app.index.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_upload_result_merges_artifacts() {
    let app = test_app();
    let task = TaskBuilder::new().with_user("user_test").running().build();
    app.tasks.create(&task).await.unwrap();

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/v1/tasks/{}/result", task.id),
        Some(API_KEY),
        Some(serde_json::json!({
            "result": {"accuracy": 0.97},
            "artifacts": {"model": "s3://bucket/model.pt"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let task = app.tasks.get_unscoped(&task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let result = task.result.unwrap();
    assert_eq!(result["accuracy"], 0.97);
    assert_eq!(result["artifacts"]["model"], "s3://bucket/model.pt");
}

#[tokio::test]
async fn test_pause_and_resume_toggle_scheduler() {
    let app = test_app();
    let (status, body) = send(&app.router, "POST", "/v1/queue/pause", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_status"], "paused");
    assert!(app.pause.is_paused());

    let (status, body) = send(&app.router, "POST", "/v1/queue/resume", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_status"], "active");
    assert!(!app.pause.is_paused());
}

// ============================================================================
// V2 层级与同步
// ============================================================================

async fn seed_unit(app: &TestApp) -> String {
    let group = GroupBuilder::new().with_id("group_g1").with_user("user_test").build();
    app.groups.create(&group).await.unwrap();
    let unit = UnitBuilder::new()
        .with_id("unit_u1")
        .with_group("group_g1")
        .with_user("user_test")
        .build();
    app.units.create(&unit).await.unwrap();
    unit.id
}

#[tokio::test]
async fn test_create_queue_appends_order_and_bumps_version() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;

    for (i, name) in ["q0", "q1"].iter().enumerate() {
        let (status, body) = send(
            &app.router,
            "POST",
            &format!("/v2/units/{unit_id}/queues"),
            Some(API_KEY),
            Some(serde_json::json!({"name": name, "parameters": {"lr": 0.1}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["queue"]["order"], i as i64);
    }

    // 每次创建推进一次版本：1 → 3
    let unit = app.units.get_raw(&unit_id).unwrap();
    assert_eq!(unit.version, 3);
}

#[tokio::test]
async fn test_batch_create_queues_bumps_version_once() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/queues/batch"),
        Some(API_KEY),
        Some(serde_json::json!({"queues": [
            {"name": "lr-0.1", "parameters": {"lr": 0.1}},
            {"name": "lr-0.01", "parameters": {"lr": 0.01}},
            {"name": "lr-0.001", "parameters": {"lr": 0.001}},
        ], "created_by": "client"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created_count"], 3);

    // 整批只推进一次版本
    assert_eq!(app.units.get_raw(&unit_id).unwrap().version, 2);

    // order 连续追加：0、1、2
    let queues = app.queues.list_by_unit(&unit_id, None).await.unwrap();
    let orders: Vec<i32> = queues.iter().map(|q| q.queue_order).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_sync_version_cursor() {
    // S5: client_version == cloud_version → need_sync=false；队列创建后 → true
    let app = test_app();
    let unit_id = seed_unit(&app).await;

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/sync"),
        Some(API_KEY),
        Some(serde_json::json!({"client_version": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["need_sync"], false);
    assert_eq!(body["cloud_version"], 1);
    assert!(body["queues"].as_array().unwrap().is_empty());

    send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/queues"),
        Some(API_KEY),
        Some(serde_json::json!({"name": "q", "parameters": {}})),
    )
    .await;

    let (_, body) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/sync"),
        Some(API_KEY),
        Some(serde_json::json!({"client_version": 1})),
    )
    .await;
    assert_eq!(body["need_sync"], true);
    assert_eq!(body["cloud_version"], 2);
    assert_eq!(body["queues"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reorder_respects_non_pending_prefix() {
    // S4: Q0 completed(0), Q1 running(1), Q2/Q3 pending(2/3)；重排 [Q3, Q2]
    let app = test_app();
    let unit_id = seed_unit(&app).await;

    let q0 = TrainingQueueBuilder::new()
        .with_id("queue_q0").with_unit(&unit_id).with_user("user_test")
        .with_order(0).completed().build();
    let q1 = TrainingQueueBuilder::new()
        .with_id("queue_q1").with_unit(&unit_id).with_user("user_test")
        .with_order(1).running().build();
    let q2 = TrainingQueueBuilder::new()
        .with_id("queue_q2").with_unit(&unit_id).with_user("user_test")
        .with_order(2).build();
    let q3 = TrainingQueueBuilder::new()
        .with_id("queue_q3").with_unit(&unit_id).with_user("user_test")
        .with_order(3).build();
    for q in [&q0, &q1, &q2, &q3] {
        app.queues.create(q).await.unwrap();
    }

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/queues/reorder"),
        Some(API_KEY),
        Some(serde_json::json!({"queue_ids": ["queue_q3", "queue_q2"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.queues.get_raw("queue_q0").unwrap().queue_order, 0);
    assert_eq!(app.queues.get_raw("queue_q1").unwrap().queue_order, 1);
    assert_eq!(app.queues.get_raw("queue_q3").unwrap().queue_order, 2);
    assert_eq!(app.queues.get_raw("queue_q2").unwrap().queue_order, 3);
    assert_eq!(app.units.get_raw(&unit_id).unwrap().version, 2);
}

#[tokio::test]
async fn test_reorder_rejects_non_pending_ids() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let running = TrainingQueueBuilder::new()
        .with_id("queue_r").with_unit(&unit_id).with_user("user_test")
        .with_order(0).running().build();
    app.queues.create(&running).await.unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/queues/reorder"),
        Some(API_KEY),
        Some(serde_json::json!({"queue_ids": ["queue_r"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_QUEUE_STATUS");
    // 无写入
    assert_eq!(app.queues.get_raw("queue_r").unwrap().queue_order, 0);
    assert_eq!(app.units.get_raw(&unit_id).unwrap().version, 1);
}

#[tokio::test]
async fn test_reorder_rejects_foreign_unit_ids() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let other_unit = UnitBuilder::new()
        .with_id("unit_u2").with_group("group_g1").with_user("user_test").build();
    app.units.create(&other_unit).await.unwrap();
    let foreign = TrainingQueueBuilder::new()
        .with_id("queue_f").with_unit("unit_u2").with_user("user_test")
        .with_order(0).build();
    app.queues.create(&foreign).await.unwrap();

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/queues/reorder"),
        Some(API_KEY),
        Some(serde_json::json!({"queue_ids": ["queue_f"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.queues.get_raw("queue_f").unwrap().queue_order, 0);
}

#[tokio::test]
async fn test_queue_lifecycle_start_complete() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let queue = TrainingQueueBuilder::new()
        .with_id("queue_l").with_unit(&unit_id).with_user("user_test")
        .with_order(0).build();
    app.queues.create(&queue).await.unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        "/v2/queues/queue_l/start",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["status"], "running");
    assert!(body["queue"]["started_at"].is_string());
    // 所属单元进入 running
    assert_eq!(
        app.units.get_raw(&unit_id).unwrap().status,
        mlqueue_domain::entities::UnitStatus::Running
    );

    // 重复 start 拒绝
    let (status, body) = send(
        &app.router,
        "POST",
        "/v2/queues/queue_l/start",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_QUEUE_STATUS");

    let (status, body) = send(
        &app.router,
        "POST",
        "/v2/queues/queue_l/complete",
        Some(API_KEY),
        Some(serde_json::json!({"result": {"acc": 0.9}, "metrics": {"loss": 0.1}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["status"], "completed");
    assert_eq!(body["queue"]["result"]["acc"], 0.9);
    assert_eq!(body["queue"]["metrics"]["loss"], 0.1);
}

#[tokio::test]
async fn test_complete_requires_running() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let queue = TrainingQueueBuilder::new()
        .with_id("queue_p").with_unit(&unit_id).with_user("user_test").build();
    app.queues.create(&queue).await.unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        "/v2/queues/queue_p/complete",
        Some(API_KEY),
        Some(serde_json::json!({"result": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_QUEUE_STATUS");
    assert_eq!(
        app.queues.get_raw("queue_p").unwrap().status,
        QueueStatus::Pending
    );
}

#[tokio::test]
async fn test_fail_records_error_msg() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let queue = TrainingQueueBuilder::new()
        .with_id("queue_x").with_unit(&unit_id).with_user("user_test")
        .running().build();
    app.queues.create(&queue).await.unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        "/v2/queues/queue_x/fail",
        Some(API_KEY),
        Some(serde_json::json!({"error_msg": "CUDA OOM"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["status"], "failed");
    assert_eq!(body["queue"]["error_msg"], "CUDA OOM");
    assert!(body["queue"]["completed_at"].is_string());
}

#[tokio::test]
async fn test_update_queue_rejected_for_running() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let queue = TrainingQueueBuilder::new()
        .with_id("queue_run").with_unit(&unit_id).with_user("user_test")
        .running().build();
    app.queues.create(&queue).await.unwrap();

    let (status, _) = send(
        &app.router,
        "PUT",
        "/v2/queues/queue_run",
        Some(API_KEY),
        Some(serde_json::json!({"parameters": {"lr": 1.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_running_queue_rejected_and_gap_left() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let q0 = TrainingQueueBuilder::new()
        .with_id("queue_a").with_unit(&unit_id).with_user("user_test")
        .with_order(0).build();
    let q1 = TrainingQueueBuilder::new()
        .with_id("queue_b").with_unit(&unit_id).with_user("user_test")
        .with_order(1).build();
    let q2 = TrainingQueueBuilder::new()
        .with_id("queue_c").with_unit(&unit_id).with_user("user_test")
        .with_order(2).build();
    for q in [&q0, &q1, &q2] {
        app.queues.create(q).await.unwrap();
    }

    // 删除中间一个：剩余 order 不回填，保持 0 和 2
    let (status, _) = send(&app.router, "DELETE", "/v2/queues/queue_b", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.queues.get_raw("queue_a").unwrap().queue_order, 0);
    assert_eq!(app.queues.get_raw("queue_c").unwrap().queue_order, 2);

    let running = TrainingQueueBuilder::new()
        .with_id("queue_d").with_unit(&unit_id).with_user("user_test")
        .running().build();
    app.queues.create(&running).await.unwrap();
    let (status, _) = send(&app.router, "DELETE", "/v2/queues/queue_d", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_heartbeat_marks_connected() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v2/units/{unit_id}/heartbeat"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connection_status"], "connected");

    let (_, body) = send(
        &app.router,
        "GET",
        &format!("/v2/units/{unit_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(body["unit"]["connection_status"], "connected");
}

#[tokio::test]
async fn test_stale_heartbeat_is_lazily_disconnected() {
    let app = test_app();
    let group = GroupBuilder::new().with_id("group_g1").with_user("user_test").build();
    app.groups.create(&group).await.unwrap();
    let mut unit = UnitBuilder::new()
        .with_id("unit_stale")
        .with_group("group_g1")
        .with_user("user_test")
        .connected()
        .build();
    // 心跳落在活性窗口之外
    unit.last_heartbeat = Some(chrono::Utc::now() - chrono::Duration::seconds(11));
    app.units.create(&unit).await.unwrap();

    let (_, body) = send(&app.router, "GET", "/v2/units/unit_stale", Some(API_KEY), None).await;
    assert_eq!(body["unit"]["connection_status"], "disconnected");
    // 惰性降级已持久化
    assert_eq!(
        app.units.get_raw("unit_stale").unwrap().connection_status,
        mlqueue_domain::entities::ConnectionStatus::Disconnected
    );
}

#[tokio::test]
async fn test_unit_delete_refused_while_queues_exist() {
    let app = test_app();
    let unit_id = seed_unit(&app).await;
    let queue = TrainingQueueBuilder::new()
        .with_unit(&unit_id).with_user("user_test").build();
    app.queues.create(&queue).await.unwrap();

    let (status, _) = send(
        &app.router,
        "DELETE",
        &format!("/v2/units/{unit_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_group_crud_flow() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/v2/groups",
        Some(API_KEY),
        Some(serde_json::json!({"name": "cv-experiments", "description": "vision"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = body["group_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/v2/groups/{group_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"]["name"], "cv-experiments");
    assert_eq!(body["unit_count"], 0);

    // 其他租户不可见
    let (status, _) = send(
        &app.router,
        "GET",
        &format!("/v2/groups/{group_id}"),
        Some(OTHER_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        "DELETE",
        &format!("/v2/groups/{group_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
