use ghcr_prune::{run, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Initialize tracing at the configured verbosity
    tracing_subscriber::fmt()
        .with_max_level(config.log_level.as_tracing())
        .init();

    tracing::info!(
        owner = %config.owner,
        package = %config.package,
        dry_run = config.dry_run,
        "starting prune"
    );

    let summary = run(config).await?;

    tracing::info!(
        tags = summary.tags_deleted,
        versions = summary.versions_deleted,
        failures = summary.failures,
        "done"
    );
    Ok(())
}
