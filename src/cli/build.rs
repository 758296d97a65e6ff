//! Build command implementation

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::bundler::{BuildResult, Bundler, ChunkType};
use crate::config::Config;
use crate::utils::{format_duration, format_size};

/// Build the project once
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory (overrides output.path)
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Remove previous output before writing
    #[arg(long)]
    pub clean: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;

        eprintln!("{} Building project...", "→".blue());

        let bundler = Bundler::new(config, self.into())?;
        let result = bundler.build().await?;

        print_summary(&result, start.elapsed());

        Ok(())
    }
}

/// Print the bundles written by a build
pub(crate) fn print_summary(result: &BuildResult, elapsed: std::time::Duration) {
    eprintln!(
        "\n{} Built {} bundle(s) from {} module(s) in {}\n",
        "✓".green().bold(),
        result.bundles.len(),
        result.module_count,
        format_duration(elapsed)
    );

    for bundle in &result.bundles {
        let kind = match bundle.chunk_type {
            ChunkType::Entry => "entry",
            ChunkType::Shared => "shared",
        };

        eprintln!(
            "  {} {} {} {}",
            "•".dimmed(),
            bundle.output_path.display().to_string().cyan(),
            format_size(bundle.size).dimmed(),
            format!("[{kind}]").dimmed()
        );
    }

    eprintln!();
}

/// Build options derived from command arguments
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub outdir: Option<PathBuf>,
    pub clean: bool,
}

impl From<&BuildCommand> for BuildOptions {
    fn from(cmd: &BuildCommand) -> Self {
        Self {
            outdir: cmd.outdir.clone(),
            clean: cmd.clean,
        }
    }
}
