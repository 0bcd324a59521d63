//! 主应用程序入口
//!
//! 组装存储、在线状态注册表和投递路由，启动 Axum Web API 服务
//! 以及两个后台定时任务（过期清理、在线列表周期广播）。

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use application::{
    Clock, ConnectionRegistry, DeliveryRouter, MessageRepository, PresenceRegistry, ServerEvent,
    SystemClock, TokenVerifier,
};
use config::AppConfig;
use infrastructure::{create_pg_pool, JwtTokenService, PgMessageRepository};
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repository: Arc<dyn MessageRepository> = Arc::new(PgMessageRepository::new(pg_pool));
    let presence = Arc::new(PresenceRegistry::new(
        clock.clone(),
        chrono::Duration::seconds(config.presence.staleness_secs as i64),
    ));
    let connections = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(DeliveryRouter::new(
        repository.clone(),
        presence.clone(),
        connections.clone(),
        clock,
    ));
    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtTokenService::new(config.jwt.clone()));

    spawn_presence_sweeper(presence.clone(), config.presence.sweep_interval_secs);
    spawn_online_users_broadcast(
        presence.clone(),
        connections.clone(),
        config.presence.broadcast_interval_secs,
    );

    let state = AppState::new(presence, connections, delivery, repository, verifier);
    let app = router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("消息服务器启动在 http://{bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// 周期清理过期的在线条目，下线事件由注册表自己广播。
fn spawn_presence_sweeper(presence: Arc<PresenceRegistry>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let swept = presence.sweep().await;
            if swept > 0 {
                tracing::info!(swept, "清理过期在线条目");
            }
        }
    });
}

/// 周期向所有连接推送完整在线列表，兜底单条状态事件的丢失。
fn spawn_online_users_broadcast(
    presence: Arc<PresenceRegistry>,
    connections: Arc<ConnectionRegistry>,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let users = presence.list_online().await;
            connections
                .broadcast_all(ServerEvent::OnlineUsers { users })
                .await;
        }
    });
}
