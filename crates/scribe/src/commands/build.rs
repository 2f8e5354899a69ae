//! Static site build command.

use std::path::PathBuf;

use anyhow::Result;
use scribe_static::StaticBuilder;

use crate::config::ConfigFile;

/// Run the build command.
pub async fn run(
    file_config: &ConfigFile,
    output: Option<PathBuf>,
    minify: Option<bool>,
    drafts: bool,
) -> Result<()> {
    tracing::info!("Building static site...");

    let mut config = file_config.build_config();
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(minify) = minify {
        config.minify = minify;
    }
    config.include_drafts |= drafts;

    let result = StaticBuilder::new(config)?.build().await?;

    tracing::info!(
        "Built {} pages from {} posts and {} tags in {}ms",
        result.pages,
        result.posts,
        result.tags,
        result.duration_ms
    );
    tracing::info!("Copied {} assets", result.assets);
    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
