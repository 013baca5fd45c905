//! # MLQueue Domain
//!
//! 核心领域模型：任务、用户、训练层级（Group → TrainingUnit → TrainingQueue）、
//! 生命周期事件，以及仓储与端口 trait。本 crate 不依赖具体的存储或网络实现。

pub mod entities;
pub mod events;
pub mod ports;
pub mod repositories;

pub use entities::*;
pub use events::{TaskEvent, TaskEventPayload};
pub use ports::{EventPublisher, RateLimiter, SchedulerControl, TaskExecutor, TaskQueueIndex};
pub use repositories::*;
