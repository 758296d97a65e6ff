//! Watch command implementation
//!
//! Builds once, then rebuilds whenever files under the context directory
//! change. The configuration is reloaded before every rebuild; a failed build
//! is reported and the watcher keeps running.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::build::{print_summary, BuildOptions};
use crate::bundler::Bundler;
use crate::config::Config;
use crate::utils::normalize_path;

/// Rebuild on file changes
#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Output directory (overrides output.path)
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Remove previous output before the first build
    #[arg(long)]
    pub clean: bool,
}

impl WatchCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        let options = BuildOptions {
            outdir: self.outdir.clone(),
            clean: self.clean,
        };

        let output_dir = options.outdir.clone().unwrap_or_else(|| config.output_dir());
        let filter = ChangeFilter::new(&config, &output_dir, Path::new(config_path))?;
        let watch_root = config.context_dir.clone();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
        let (event_tx, event_rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer(Duration::from_millis(config.watch.debounce_ms), event_tx)?;
        debouncer
            .watcher()
            .watch(&watch_root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", watch_root.display()))?;

        // Also pick up edits to the config file itself
        if !config.root.starts_with(&watch_root) {
            debouncer
                .watcher()
                .watch(&config.root, RecursiveMode::NonRecursive)?;
        }

        // The debouncer is moved into the thread to keep it alive
        std::thread::spawn(move || {
            let _debouncer = debouncer;

            loop {
                match event_rx.recv() {
                    Ok(Ok(events)) => {
                        let changed: Vec<PathBuf> = events
                            .into_iter()
                            .map(|event| event.path)
                            .filter(|path| filter.is_relevant(path))
                            .collect();

                        if !changed.is_empty() && tx.send(changed).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Watch error: {:?}", e);
                    }
                    Err(_) => break,
                }
            }
        });

        eprintln!(
            "{} Watching {} for changes ({} to stop)\n",
            "→".blue(),
            watch_root.display().to_string().cyan(),
            "Ctrl+C".yellow()
        );

        rebuild(config, options.clone()).await;

        // Later builds only clean when the config asks for it
        let options = BuildOptions {
            clean: false,
            ..options
        };

        while let Some(changed) = rx.recv().await {
            for path in &changed {
                eprintln!(
                    "  {} File changed: {}",
                    "↻".yellow(),
                    path.display().to_string().dimmed()
                );
            }

            match Config::load(config_path) {
                Ok(config) => rebuild(config, options.clone()).await,
                Err(e) => error!("Configuration error: {:#}", e),
            }
        }

        Ok(())
    }
}

async fn rebuild(config: Config, options: BuildOptions) {
    let start = Instant::now();

    let result = match Bundler::new(config, options) {
        Ok(bundler) => bundler.build().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(result) => print_summary(&result, start.elapsed()),
        Err(e) => error!("Build failed: {:#}", e),
    }
}

/// Decides which changed paths trigger a rebuild
struct ChangeFilter {
    context: PathBuf,
    output_dir: PathBuf,
    config_file: PathBuf,
    ignore: GlobSet,
}

impl ChangeFilter {
    fn new(config: &Config, output_dir: &Path, config_file: &Path) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.watch.ignore {
            builder.add(
                Glob::new(pattern).with_context(|| format!("Invalid watch ignore pattern: {pattern}"))?,
            );
        }

        // notify reports absolute paths
        let cwd = std::env::current_dir()?;
        let absolute = |path: &Path| normalize_path(&cwd.join(path));

        Ok(Self {
            context: absolute(&config.context_dir),
            output_dir: absolute(output_dir),
            config_file: absolute(config_file),
            ignore: builder.build()?,
        })
    }

    fn is_relevant(&self, path: &Path) -> bool {
        if path == self.config_file {
            return true;
        }

        // Writing bundles must not trigger another build
        if path.starts_with(&self.output_dir) {
            return false;
        }

        let relative = path.strip_prefix(&self.context).unwrap_or(path);
        if self.ignore.is_match(relative) {
            debug!("Ignoring change to {}", path.display());
            return false;
        }

        true
    }
}
