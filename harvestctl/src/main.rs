use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = harvestctl::Cli::parse();
    if let Err(err) = harvestctl::run(cli).await {
        tracing::error!(error = %err, "harvestctl failed");
        std::process::exit(1);
    }
}
