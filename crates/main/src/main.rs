//! 主应用程序入口
//!
//! 启动 Axum Web API 与 WebSocket 实时分发服务。

use std::{env, sync::Arc};

use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 指定配置文件时叠加 SOCIAL__ 前缀的环境变量，否则只读环境变量
    let config = match env::var("SOCIAL_CONFIG") {
        Ok(path) => AppConfig::load(&path)?,
        Err(_) => {
            let config = AppConfig::from_env_with_defaults();
            config.validate()?;
            config
        }
    };

    let infra = Infrastructure::from_config(&config.database).await?;
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(
        &config.fanout,
        jwt_service,
        infra.social_graph,
        infra.notifications,
    );

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        connection_buffer = config.fanout.connection_buffer,
        announce_online = config.fanout.announce_online,
        "社交实时分发服务启动"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
    }
}
