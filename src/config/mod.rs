//! Configuration handling for Packwright
//!
//! Parses, resolves and validates packwright.toml files. A `Config` is built
//! once per build and never changes afterwards.

mod schema;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};

use crate::bundler::FilenameTemplate;
use crate::error::BundleError;
use crate::plugins;
use crate::resolver::{Resolved, Resolver};
use crate::transform::RuleSet;

pub use schema::*;

/// Default config file name
pub const CONFIG_FILE: &str = "packwright.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for entry paths, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Entry points: bundle name -> module path(s)
    #[serde(default)]
    pub entry: BTreeMap<String, EntryValue>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Transform rules
    #[serde(default)]
    pub module: ModuleConfig,

    /// Module resolution
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Bare requests served from globals instead of being bundled
    #[serde(default)]
    pub externals: BTreeMap<String, String>,

    /// Plugin configuration
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Directory containing the config file
    #[serde(skip)]
    pub root: PathBuf,

    /// Absolute context directory (computed during load)
    #[serde(skip)]
    pub context_dir: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        // Set root directory to the directory containing the config file
        let root = canonical_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_toml(&content, root)
            .with_context(|| format!("Invalid configuration in {}", canonical_path.display()))
    }

    /// Parse and validate configuration text rooted at `root`
    pub fn from_toml(content: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).with_context(|| format!("Failed to parse {CONFIG_FILE}"))?;

        config.root = root.into();
        config.context_dir = match &config.context {
            Some(context) => config.root.join(context),
            None => config.root.clone(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Runs every check that can fail before a build touches the output
    /// directory.
    fn validate(&self) -> Result<()> {
        if !self.context_dir.is_dir() {
            return Err(BundleError::ContextNotFound(self.context_dir.clone()).into());
        }

        if self.entry.is_empty() {
            return Err(BundleError::NoEntries.into());
        }

        for (name, value) in &self.entry {
            if value.paths().is_empty() {
                return Err(BundleError::EmptyEntry(name.clone()).into());
            }
        }

        for (request, global) in &self.externals {
            if request.trim().is_empty() || global.trim().is_empty() {
                return Err(BundleError::InvalidExternal {
                    request: request.clone(),
                    global: global.clone(),
                }
                .into());
            }
        }

        FilenameTemplate::parse(&self.output.filename)?;
        RuleSet::from_config(&self.module.rules)?;
        plugins::from_config(&self.plugins)?;

        for pattern in self.output.keep.iter().chain(&self.watch.ignore) {
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        }

        // Resolves every entry; fails on the first missing module
        self.resolved_entries()?;

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.path)
    }

    /// Resolve every entry to absolute module paths, in entry-name order
    pub fn resolved_entries(&self) -> Result<Vec<(String, Vec<PathBuf>)>> {
        let resolver = Resolver::from_config(self);
        let mut entries = Vec::with_capacity(self.entry.len());

        for (name, value) in &self.entry {
            let mut paths = Vec::new();
            for request in value.paths() {
                match resolver.resolve_from_dir(request, &self.context_dir) {
                    Some(Resolved::File(path)) => paths.push(path),
                    // An external cannot start a bundle
                    Some(Resolved::External { .. }) | None => {
                        return Err(BundleError::EntryNotFound {
                            name: name.clone(),
                            path: self.context_dir.join(request),
                        }
                        .into());
                    }
                }
            }
            entries.push((name.clone(), paths));
        }

        Ok(entries)
    }
}
