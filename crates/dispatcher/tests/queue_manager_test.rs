use std::sync::Arc;
use std::time::Duration;

use mlqueue_dispatcher::{QueueManager, SimulatedTrainingExecutor};
use mlqueue_domain::entities::TaskStatus;
use mlqueue_domain::ports::{SchedulerControl, TaskQueueIndex};
use mlqueue_domain::repositories::TaskRepository;
use mlqueue_infrastructure::InMemoryQueueIndex;
use mlqueue_testing_utils::{MockTaskRepository, RecordingEventPublisher, TaskBuilder};

struct Harness {
    manager: QueueManager,
    index: Arc<InMemoryQueueIndex>,
    tasks: MockTaskRepository,
    events: RecordingEventPublisher,
}

fn harness(worker_count: usize) -> Harness {
    let index = Arc::new(InMemoryQueueIndex::new());
    let tasks = MockTaskRepository::new();
    let events = RecordingEventPublisher::new();
    let manager = QueueManager::new(
        index.clone(),
        Arc::new(tasks.clone()),
        Arc::new(events.clone()),
        Arc::new(SimulatedTrainingExecutor::with_base_seconds(0)),
        worker_count,
    )
    .with_pop_timeout(Duration::from_millis(100));
    Harness {
        manager,
        index,
        tasks,
        events,
    }
}

async fn wait_for_status(
    tasks: &MockTaskRepository,
    task_id: &str,
    status: TaskStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(Some(task)) = tasks.get_unscoped(task_id).await {
            if task.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_worker_completes_queued_task() {
    let h = harness(2);

    let task = TaskBuilder::new().with_priority(3).build();
    h.tasks.create(&task).await.unwrap();
    h.index.enqueue(&task.id, task.priority).await.unwrap();

    h.manager.start();
    assert!(wait_for_status(&h.tasks, &task.id, TaskStatus::Completed, Duration::from_secs(5)).await);
    h.manager.stop().await;

    let done = h.tasks.get_unscoped(&task.id).await.unwrap().unwrap();
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.started_at.unwrap() <= done.completed_at.unwrap());
    let result = done.result.unwrap();
    assert!(result.get("completed_by_worker").is_some());

    let names = h.events.event_names();
    assert!(names.contains(&"task.started".to_string()));
    assert!(names.contains(&"task.completed".to_string()));
}

#[tokio::test]
async fn test_pause_blocks_new_dispatch_and_resume_recovers() {
    let h = harness(2);
    let pause = h.manager.pause_flag();

    h.manager.start();
    pause.pause();
    // 给 worker 一个轮询间隔观察到暂停标志
    tokio::time::sleep(Duration::from_millis(300)).await;

    let task = TaskBuilder::new().build();
    h.tasks.create(&task).await.unwrap();
    h.index.enqueue(&task.id, task.priority).await.unwrap();

    // 暂停期间不派发新任务
    tokio::time::sleep(Duration::from_secs(2)).await;
    let still = h.tasks.get_unscoped(&task.id).await.unwrap().unwrap();
    assert_eq!(still.status, TaskStatus::Queued);

    pause.resume();
    assert!(wait_for_status(&h.tasks, &task.id, TaskStatus::Completed, Duration::from_secs(5)).await);
    h.manager.stop().await;
}

#[tokio::test]
async fn test_cancelled_task_is_not_overwritten_by_completion() {
    let index = Arc::new(InMemoryQueueIndex::new());
    let tasks = MockTaskRepository::new();
    let events = RecordingEventPublisher::new();
    // 执行耗时 1 秒，留出取消的窗口
    let manager = QueueManager::new(
        index.clone(),
        Arc::new(tasks.clone()),
        Arc::new(events.clone()),
        Arc::new(SimulatedTrainingExecutor::with_base_seconds(1)),
        1,
    )
    .with_pop_timeout(Duration::from_millis(100));

    let task = TaskBuilder::new().build();
    tasks.create(&task).await.unwrap();
    index.enqueue(&task.id, task.priority).await.unwrap();

    manager.start();
    assert!(wait_for_status(&tasks, &task.id, TaskStatus::Running, Duration::from_secs(3)).await);

    // 执行中取消：worker 不被打断，但完成结果不得覆盖 cancelled
    tasks.cancel(&task.id, "用户取消: test").await.unwrap();
    index.remove(&task.id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.stop().await;

    let after = tasks.get_unscoped(&task.id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Cancelled);
    assert!(after.result.is_none());
    assert!(!h_contains(&events.event_names(), "task.completed"));
}

fn h_contains(names: &[String], needle: &str) -> bool {
    names.iter().any(|n| n == needle)
}

#[tokio::test]
async fn test_priority_order_is_respected() {
    let h = harness(1);

    let low = TaskBuilder::new().with_priority(1).build();
    let high = TaskBuilder::new().with_priority(9).build();
    for task in [&low, &high] {
        h.tasks.create(task).await.unwrap();
    }
    h.index.enqueue(&low.id, low.priority).await.unwrap();
    h.index.enqueue(&high.id, high.priority).await.unwrap();

    h.manager.start();
    assert!(wait_for_status(&h.tasks, &high.id, TaskStatus::Completed, Duration::from_secs(5)).await);
    assert!(wait_for_status(&h.tasks, &low.id, TaskStatus::Completed, Duration::from_secs(5)).await);
    h.manager.stop().await;

    // 单 worker 下高优先级任务先开始
    let high_done = h.tasks.get_unscoped(&high.id).await.unwrap().unwrap();
    let low_done = h.tasks.get_unscoped(&low.id).await.unwrap().unwrap();
    assert!(high_done.started_at.unwrap() <= low_done.started_at.unwrap());
}

#[tokio::test]
async fn test_stop_waits_for_workers() {
    let h = harness(4);
    h.manager.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // stop 返回即代表全部 worker 已退出；限时断言防止挂起
    tokio::time::timeout(Duration::from_secs(3), h.manager.stop())
        .await
        .expect("stop() 应在弹出超时内返回");
}

#[tokio::test]
async fn test_missing_row_is_skipped() {
    let h = harness(1);
    // 队列索引中有 id，但任务行不存在（弹出与加载之间被删除的情形）
    h.index.enqueue("task_ghost", 0).await.unwrap();

    let task = TaskBuilder::new().build();
    h.tasks.create(&task).await.unwrap();
    h.index.enqueue(&task.id, 0).await.unwrap();

    h.manager.start();
    // 幽灵任务被跳过，正常任务仍被处理
    assert!(wait_for_status(&h.tasks, &task.id, TaskStatus::Completed, Duration::from_secs(5)).await);
    h.manager.stop().await;
}
