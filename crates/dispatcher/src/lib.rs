//! # MLQueue Dispatcher
//!
//! V1 云端调度：固定大小的 worker 池从共享优先级队列索引阻塞消费，
//! 推进任务状态机并发布生命周期事件。支持暂停/恢复与优雅停机。

pub mod executor;
pub mod queue_manager;

pub use executor::SimulatedTrainingExecutor;
pub use queue_manager::{PauseFlag, QueueManager};
