use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;

use app::{list_available_targets, run_capture};
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 根据verbose参数设置默认日志级别，RUST_LOG 优先
    let default_level = if cli.verbose { "stream_snap=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    if cli.list_targets {
        list_available_targets();
        return Ok(());
    }

    run_capture(&cli).await
}
