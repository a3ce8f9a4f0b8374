use clap::Parser;
use gateway::config::Config;
use gateway::{Gateway, GatewayError, init_logging, init_metrics};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Auction gateway dispatch core")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: PathBuf,
}

fn main() -> Result<(), GatewayError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    // Kept alive until exit so buffered events are flushed
    let _sentry = init_logging(&config.logging);

    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), GatewayError> {
    let mut gateway = Gateway::build(&config).await?;
    tracing::info!(
        geolocation = gateway.geolocation.is_some(),
        "Gateway started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    gateway.shutdown();
    Ok(())
}
