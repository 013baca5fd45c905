//! 队列管理器
//!
//! W 个 worker 共享一个阻塞式优先级队列索引。原子的阻塞弹出保证同一
//! 任务至多被一个 worker 取走；暂停标志在一个轮询间隔内被所有 worker
//! 观察到，已在执行的任务不被打断。停机通过广播通道协作完成，
//! stop() 等待全部 worker 退出后才返回。

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use mlqueue_domain::events::TaskEvent;
use mlqueue_domain::ports::{EventPublisher, SchedulerControl, TaskExecutor, TaskQueueIndex};
use mlqueue_domain::repositories::TaskRepository;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 阻塞弹出的单次超时
const POP_TIMEOUT: Duration = Duration::from_secs(2);
/// 暂停状态下的轮询间隔
const PAUSE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 全局暂停标志：handler 读写，worker 每轮读取
#[derive(Default)]
pub struct PauseFlag {
    paused: RwLock<bool>,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulerControl for PauseFlag {
    fn pause(&self) {
        *self.paused.write().unwrap() = true;
        info!("队列已暂停");
    }

    fn resume(&self) {
        *self.paused.write().unwrap() = false;
        info!("队列已恢复");
    }

    fn is_paused(&self) -> bool {
        *self.paused.read().unwrap()
    }
}

struct WorkerContext {
    index: Arc<dyn TaskQueueIndex>,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn EventPublisher>,
    executor: Arc<dyn TaskExecutor>,
    pause: Arc<PauseFlag>,
    pop_timeout: Duration,
}

pub struct QueueManager {
    index: Arc<dyn TaskQueueIndex>,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn EventPublisher>,
    executor: Arc<dyn TaskExecutor>,
    pause: Arc<PauseFlag>,
    worker_count: usize,
    pop_timeout: Duration,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueManager {
    pub fn new(
        index: Arc<dyn TaskQueueIndex>,
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn EventPublisher>,
        executor: Arc<dyn TaskExecutor>,
        worker_count: usize,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            index,
            tasks,
            events,
            executor,
            pause: Arc::new(PauseFlag::new()),
            worker_count,
            pop_timeout: POP_TIMEOUT,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// 测试用：缩短弹出超时，加快停机
    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }

    /// 暂停标志的共享句柄，交给 API 层的 pause/resume 端点
    pub fn pause_flag(&self) -> Arc<PauseFlag> {
        Arc::clone(&self.pause)
    }

    /// 启动 worker 池
    pub fn start(&self) {
        info!("启动队列管理器，{} 个 worker", self.worker_count);
        let mut handles = self.handles.lock().unwrap();
        for worker_id in 0..self.worker_count {
            let ctx = WorkerContext {
                index: Arc::clone(&self.index),
                tasks: Arc::clone(&self.tasks),
                events: Arc::clone(&self.events),
                executor: Arc::clone(&self.executor),
                pause: Arc::clone(&self.pause),
                pop_timeout: self.pop_timeout,
            };
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(run_worker(ctx, shutdown_rx, worker_id)));
        }
    }

    /// 优雅停机：广播关闭信号并等待全部 worker 退出
    pub async fn stop(&self) {
        info!("停止队列管理器...");
        let _ = self.shutdown_tx.send(());
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap();
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("队列管理器已停止");
    }
}

async fn run_worker(
    ctx: WorkerContext,
    mut shutdown_rx: broadcast::Receiver<()>,
    worker_id: usize,
) {
    info!(worker_id, "worker 启动");

    loop {
        // 关闭信号只在循环顶部检查：已取走的任务总是做完再退出
        match shutdown_rx.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            _ => {
                info!(worker_id, "worker 停止");
                return;
            }
        }

        if ctx.pause.is_paused() {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            continue;
        }

        match ctx.index.blocking_pop(ctx.pop_timeout).await {
            Ok(None) => continue,
            Ok(Some(task_id)) => process_task(&ctx, worker_id, &task_id).await,
            Err(err) => {
                warn!(worker_id, error = %err, "从队列弹出失败");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

async fn process_task(ctx: &WorkerContext, worker_id: usize, task_id: &str) {
    debug!(worker_id, task_id, "开始处理任务");

    // 弹出与加载之间任务行可能已被删除；弹出是消费性的，直接跳过即可
    let task = match ctx.tasks.get_unscoped(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(worker_id, task_id, "任务行不存在，跳过");
            return;
        }
        Err(err) => {
            error!(worker_id, task_id, error = %err, "加载任务失败");
            return;
        }
    };

    match ctx.tasks.mark_running(task_id, Utc::now()).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(worker_id, task_id, "任务已不在 queued 状态，跳过");
            return;
        }
        Err(err) => {
            error!(worker_id, task_id, error = %err, "更新任务状态失败");
            return;
        }
    }

    ctx.events
        .publish(&task.user_id, TaskEvent::Started, task_id, None)
        .await;

    match ctx.executor.execute(&task, worker_id).await {
        Ok(result) => {
            // 条件写回：执行期间被取消的任务保留 cancelled，不覆盖
            match ctx
                .tasks
                .complete_if_running(task_id, result.clone(), Utc::now())
                .await
            {
                Ok(true) => {
                    if let Err(err) = ctx.index.remove_member(task_id).await {
                        warn!(task_id, error = %err, "清理成员集合失败");
                    }
                    ctx.events
                        .publish(&task.user_id, TaskEvent::Completed, task_id, Some(result))
                        .await;
                    info!(worker_id, task_id, "任务完成");
                }
                Ok(false) => {
                    info!(worker_id, task_id, "任务已离开 running 状态，完成结果不写回");
                }
                Err(err) => {
                    error!(worker_id, task_id, error = %err, "写入完成状态失败");
                }
            }
        }
        Err(err) => {
            let message = err.to_string();
            match ctx
                .tasks
                .fail_if_running(task_id, &message, Utc::now())
                .await
            {
                Ok(true) => {
                    if let Err(err) = ctx.index.remove_member(task_id).await {
                        warn!(task_id, error = %err, "清理成员集合失败");
                    }
                    ctx.events
                        .publish(
                            &task.user_id,
                            TaskEvent::Failed,
                            task_id,
                            Some(serde_json::json!({ "error": message })),
                        )
                        .await;
                    warn!(worker_id, task_id, "任务执行失败");
                }
                Ok(false) => {
                    info!(worker_id, task_id, "任务已离开 running 状态，失败结果不写回");
                }
                Err(err) => {
                    error!(worker_id, task_id, error = %err, "写入失败状态失败");
                }
            }
        }
    }
}
