use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use clue_server::server::{run, run_timeout_sweeper};
use clue_server::{setup_logging, Args, ServerConfig, ServerState};
use protocol::{Listener, TcpListener};

/// 计时巡检间隔
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::from_args(&args).await?;
    setup_logging(&config.logging)?;

    info!("Clue-Less 服务端启动中...");

    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("无法监听 {}", config.server.listen_addr))?;
    info!(
        addr = %listener.local_addr().unwrap_or_default(),
        turn_timeout_secs = config.game.turn_timeout_secs,
        disprove_timeout_secs = config.game.disprove_timeout_secs,
        "开始监听"
    );

    let state = Arc::new(ServerState::new(config));
    tokio::spawn(run_timeout_sweeper(Arc::clone(&state), SWEEP_INTERVAL));

    tokio::select! {
        _ = run(Arc::clone(&state), listener) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("无法监听退出信号")?;
            info!(lobbies = state.lobbies.count().await, "收到退出信号，服务端关闭");
        }
    }

    Ok(())
}
