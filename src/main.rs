mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use missive::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    cli::run(cli, cfg).await
}
