mod account;
mod admin;
mod common;
mod gateway;
mod http_client;
mod model;
mod ratelimit;
mod upstream;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use gateway::{AppState, CharLengthEstimator, QuotaGate, UsageRecorder};
use model::arg::Args;
use model::config::Config;
use ratelimit::{RateLimiter, SqliteCounterStore};
use upstream::{CredentialPool, HttpUpstreamClient, RetryDispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 加载配置
    let config_path = args
        .config
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = Config::load(&config_path)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = config.config_path() {
        tracing::info!("已加载配置: {}", path.display());
    }

    if config.models.is_empty() {
        tracing::warn!("未配置任何模型，所有请求都会返回 400");
    }

    // 限流计数器
    let counter_store = SqliteCounterStore::new(&config.rate_limit.db_path)
        .with_context(|| format!("打开限流数据库失败: {}", config.rate_limit.db_path))?;
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(counter_store),
        config.rate_limit.fail_policy,
        config.rate_limit.gc_batch_size,
    ));
    tracing::info!(
        db_path = %config.rate_limit.db_path,
        fail_policy = ?config.rate_limit.fail_policy,
        "限流器已初始化"
    );

    // 上游凭据池和分发器
    let pool = Arc::new(CredentialPool::from_config(&config));
    let upstream = Arc::new(HttpUpstreamClient::from_config(&config)?);
    let dispatcher = Arc::new(RetryDispatcher::from_config(
        pool.clone(),
        upstream,
        &config.retry,
    ));

    // 账户存储
    let accounts = account::from_config(&config)?;

    let quota = QuotaGate::new(
        accounts.clone(),
        limiter,
        Arc::new(CharLengthEstimator),
    );
    let usage = UsageRecorder::new(accounts.clone());

    let config = Arc::new(config);
    let state = AppState::new(config.clone(), quota, dispatcher, usage);
    let gateway_app = gateway::create_router(state);

    // 构建 Admin API 路由（如果配置了非空 admin_api_key）
    let admin_key_valid = config
        .admin_api_key
        .as_ref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);

    let app = if let Some(admin_key) = &config.admin_api_key {
        if admin_key.trim().is_empty() {
            tracing::warn!("admin_api_key 配置为空，Admin API 未启用");
            gateway_app
        } else {
            let admin_service = admin::AdminService::new(pool, accounts);
            let admin_state = admin::AdminState::new(admin_key, admin_service);
            let admin_app = admin::create_admin_router(admin_state);

            tracing::info!("Admin API 已启用");
            gateway_app.nest("/api/admin", admin_app)
        }
    } else {
        gateway_app
    };
    let app = app.layer(gateway::cors_layer());

    // 启动服务器
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("启动配额网关: {}", addr);
    tracing::info!("可用 API:");
    tracing::info!("  POST /v1/chat/completions");
    tracing::info!("  POST /v1/{{model}}/chat/completions");
    if admin_key_valid {
        tracing::info!("Admin API:");
        tracing::info!("  GET  /api/admin/pools");
        tracing::info!("  POST /api/admin/pools/{{model}}/reset");
        tracing::info!("  GET  /api/admin/accounts/{{account_id}}/stats");
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听地址失败: {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
