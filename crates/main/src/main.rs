//! 主应用程序入口
//!
//! 装配仓储、服务和广播器，启动 Axum Web API 服务。

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, EventBroadcaster, LocalEventBroadcaster, MessageService,
    MessageServiceDependencies, SubscriptionService, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, PgChatMemberRepository, PgChatRepository, PgMessageRepository,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "connecting to database: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let chat_repository = Arc::new(PgChatRepository::new(pg_pool.clone()));
    let member_repository = Arc::new(PgChatMemberRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool));

    let clock = Arc::new(SystemClock);
    let broadcaster = Arc::new(LocalEventBroadcaster::with_capacity(
        config.broadcast.capacity,
    ));

    let chat_service = ChatService::new(ChatServiceDependencies {
        chat_repository: chat_repository.clone(),
        member_repository: member_repository.clone(),
        clock: clock.clone(),
        broadcaster: broadcaster.clone() as Arc<dyn EventBroadcaster>,
    });

    let message_service = MessageService::new(MessageServiceDependencies {
        chat_repository,
        member_repository: member_repository.clone(),
        message_repository,
        clock,
        broadcaster: broadcaster.clone() as Arc<dyn EventBroadcaster>,
    });

    let subscription_service = SubscriptionService::new(member_repository, broadcaster);
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        Arc::new(chat_service),
        Arc::new(message_service),
        Arc::new(subscription_service),
        jwt_service,
    );

    let app = router(state);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("group chat server listening on http://{address}");
    axum::serve(listener, app).await?;

    Ok(())
}
