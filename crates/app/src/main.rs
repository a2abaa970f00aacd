//! Image Classification App - Main Entry Point

use std::path::PathBuf;

use app::{init_logging, run, AppConfig, DEFAULT_CONFIG_FILE};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = AppConfig::load(DEFAULT_CONFIG_FILE)?;
    config.images.extend(std::env::args().skip(1).map(PathBuf::from));

    init_logging(&config.log_level, config.log_json)?;

    info!("=== Image Classifier v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Model {} from {}, {} images queued",
        config.model_name,
        config.model_dir.display(),
        config.images.len()
    );

    let view = run(&config).await?;

    for event in &view.history {
        println!("{}", serde_json::to_string(event)?);
    }
    if !view.result.is_empty() {
        info!("{}", view.result);
    }

    Ok(())
}
