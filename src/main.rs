use anyhow::{Context, Result};
use clap::{Arg, Command};
use mlqueue_config::AppConfig;
use tokio::{signal, sync::broadcast};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;

use app::Application;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("mlqueue")
        .version("1.0.0")
        .about("机器学习训练任务队列服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（TOML，可选）"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let log_level = matches.get_one::<String>("log-level").unwrap();

    init_logging(log_level)?;

    let config = AppConfig::load(config_path.map(|s| s.as_str())).context("加载配置失败")?;
    info!(
        "启动 MLQueue API 服务器（环境: {}）",
        config.server.env
    );

    let application = Application::new(config).await?;

    // ctrl-c / SIGTERM 触发优雅停机
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    application.run(shutdown_rx).await
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mlqueue={log_level},tower_http=info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("初始化日志失败")?;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
