use anyhow::Result;
use clap::Parser;
use pdq_push::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let report = run(cli).await;
    match &report {
        Ok(_) => tracing::info!("CLI completed"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    let report = report?;
    if report.failed() > 0 {
        anyhow::bail!("{} documents failed; see logs", report.failed());
    }
    Ok(())
}
