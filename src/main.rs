// src/main.rs
use std::sync::Arc;

use streak_tracker::{
    auth::JwtKeys,
    clock::SystemClock,
    config::Config,
    create_app, init_tracing,
    storage::JsonFileStore,
    tracker::Tracker,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    let store = JsonFileStore::new(&config.data_dir);
    let tracker = Tracker::open(Arc::new(store), Arc::new(SystemClock)).await?;
    tracing::info!("✅ 数据目录已就绪: {}", config.data_dir.display());

    let state = AppState::new(
        tracker,
        JwtKeys::new(&config.jwt_secret, config.token_ttl_minutes),
    );
    let app = create_app(state);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 服务器运行在: {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
