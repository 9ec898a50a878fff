use eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a compact stdout subscriber filtered by `RUST_LOG`, defaulting
/// to `info`.
pub fn initialize_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty().compact())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init()?;
    Ok(())
}
