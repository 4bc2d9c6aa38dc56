//! 社区审核服务主入口

use chrono::Duration;
use community_moderation::{
    auth::JwtService,
    clock::SystemClock,
    config::AppConfig,
    db,
    handlers::health,
    middleware::AppState,
    repository::{PgAuditStore, PgCommunityDirectory, PgMembershipStore},
    routes,
    services::{AuditService, ModerationService},
    telemetry,
};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("community-moderation {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境），生产环境直接设置环境变量
    if let Ok(env) = std::env::var("MOD_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // 2. 初始化日志与指标
    telemetry::init_telemetry(&config);
    telemetry::init_metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Community moderation service starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!("Database initialized");

    // 4. 构建应用状态
    let audit_service = Arc::new(AuditService::new(Arc::new(PgAuditStore::new(
        db_pool.clone(),
    ))));
    let moderation_service = Arc::new(
        ModerationService::new(
            Arc::new(PgMembershipStore::new(db_pool.clone())),
            audit_service.clone(),
            Arc::new(SystemClock),
        )
        .with_default_ban_duration(Duration::seconds(config.moderation.default_ban_duration_secs))
        .with_max_ban_duration(Duration::seconds(config.moderation.max_ban_duration_secs)),
    );

    let app_state = Arc::new(AppState {
        jwt_service: Arc::new(JwtService::from_config(&config)?),
        community_directory: Arc::new(PgCommunityDirectory::new(db_pool.clone())),
        db: Some(db_pool),
        config: config.clone(),
        moderation_service,
        audit_service,
    });

    // 5. 构建路由
    let app = routes::create_router(app_state);

    // 6. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭：收到信号后最多等待 graceful_shutdown_timeout_secs
    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        signal_shutdown.notify_one();
    })
    .into_future();

    let timeout_secs = config.server.graceful_shutdown_timeout_secs;
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(std::time::Duration::from_secs(timeout_secs)).await;
        } => {
            tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("community-moderation {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: community-moderation [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 MOD_ 前缀的环境变量完成");
    println!("  可用选项请参考 .env.example");
}
