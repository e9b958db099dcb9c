//! Admin API 模块
//!
//! 凭据池状态、失败计数重置和账户用量报表

mod error;
mod handlers;
mod middleware;
mod router;
mod service;
pub mod types;

pub use middleware::AdminState;
pub use router::create_admin_router;
pub use service::AdminService;
