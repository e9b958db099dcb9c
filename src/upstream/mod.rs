//! 上游模块
//!
//! 凭据池、单次上游调用和带轮换的重试分发

pub mod client;
pub mod dispatcher;
pub mod pool;
pub mod types;

pub use client::{HttpUpstreamClient, UpstreamClient};
pub use dispatcher::{DispatchOutcome, ExhaustionReport, RetryDispatcher};
pub use pool::CredentialPool;
