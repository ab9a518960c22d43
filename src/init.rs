use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "narrated_shorts=info,warn";

/// Install the global subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

pub async fn ensure_output_root(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!("Created directory: {}", dir.display());
    }
    Ok(())
}
