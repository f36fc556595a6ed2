// src/lib.rs
//! 每日任务与连续打卡服务
//!
//! 用户注册登录后创建、完成每日任务；服务端计算连续打卡天数与近 14 天完成数。
//! 数据以平面 JSON 文件保存 (见 [`storage`])。

use std::sync::Arc;

use axum::{
    http::Method,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod stats;
pub mod storage;
pub mod streak;
pub mod tips;
pub mod tracker;
pub mod validation;

pub use error::AppError;

use auth::JwtKeys;
use handlers::*;
use tracker::Tracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(tracker: Tracker, jwt: JwtKeys) -> Self {
        Self {
            tracker: Arc::new(tracker),
            jwt: Arc::new(jwt),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        // 认证
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/whoami", get(whoami_handler))
        // 任务路由
        .route("/api/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/api/tasks/:id", delete(delete_task_handler))
        .route("/api/tasks/:id/complete", post(complete_task_handler))
        // 打卡与统计
        .route("/api/streak", get(streak_handler))
        .route("/api/stats/daily", get(daily_stats_handler))
        // 其他
        .route("/api/recommendation", get(recommendation_handler))
        .route("/api/quote", get(quote_handler))
        .route("/api/feedback", post(feedback_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// RUST_LOG 优先，未设置时使用配置中的级别
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
