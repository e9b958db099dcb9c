//! Chat Completions 网关
//!
//! 请求校验、配额检查、上游分发和用量上报

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod quota;
pub mod router;
pub mod token;
pub mod types;
pub mod usage;
pub mod validate;

pub use middleware::{AppState, cors_layer};
pub use quota::QuotaGate;
pub use router::create_router;
pub use token::{CharLengthEstimator, TokenEstimator};
pub use usage::UsageRecorder;
