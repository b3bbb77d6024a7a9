use order_server::{Config, Server, ServerState, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. .env 必须在读配置之前加载
    let _ = dotenv::dotenv();
    let config = Config::from_env();

    // 2. 日志
    setup_environment(&config);
    tracing::info!(environment = %config.environment, "Order server starting...");

    // 3. 初始化服务器状态 (数据库、迁移、平台 clients)
    let state = ServerState::initialize(&config).await?;

    // 4. 启动 HTTP 服务器
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
