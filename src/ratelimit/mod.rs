//! 限流模块
//!
//! 基于 SQLite 事务的固定窗口计数器，支持多维度并发检查和可配置的故障策略

pub mod limiter;
pub mod store;
pub mod types;

pub use limiter::RateLimiter;
pub use store::{CounterStore, SqliteCounterStore};
