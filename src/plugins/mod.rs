//! Plugin system for Packwright
//!
//! Plugins hook into the build at fixed points: before the graph is built,
//! after each module is transformed, once chunks exist, and after each chunk
//! is rendered. Built-in plugins are configured through `[[plugins]]`.

mod banner;
mod commons_chunk;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::bundler::{Chunk, ModuleGraph};
use crate::config::PluginConfig;
use crate::error::BundleError;

pub use banner::{BannerOptions, BannerPlugin};
pub use commons_chunk::{CommonsChunkOptions, CommonsChunkPlugin, MinChunks};

/// Plugin hook context
pub struct PluginContext {
    /// Context directory of the build
    pub root: PathBuf,
}

/// Result of a transform hook
pub enum TransformResult {
    /// Continue to next plugin (no transformation)
    Skip,
    /// Transformed code
    Transformed(String),
}

/// Plugin trait - implement this to extend the bundler
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Whether this plugin decides which modules go into a shared chunk
    fn is_shared_chunk_policy(&self) -> bool {
        false
    }

    /// Called when the build starts
    async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Transform a module after its loader ran
    async fn transform(&self, _code: &str, _id: &str, _ctx: &PluginContext) -> Result<TransformResult> {
        Ok(TransformResult::Skip)
    }

    /// Rearrange chunks before they are rendered
    async fn optimize_chunks(
        &self,
        _chunks: &mut Vec<Chunk>,
        _graph: &ModuleGraph,
        _ctx: &PluginContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Rewrite a rendered chunk; `None` leaves it unchanged
    async fn render_chunk(
        &self,
        _code: &str,
        _chunk: &Chunk,
        _ctx: &PluginContext,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    /// Called when the build ends
    async fn build_end(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }
}

/// Instantiate the configured plugins
///
/// Rejects unknown names, malformed options and more than one shared-chunk
/// policy.
pub fn from_config(configs: &[PluginConfig]) -> Result<Vec<Arc<dyn Plugin>>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::with_capacity(configs.len());

    for config in configs {
        let plugin: Arc<dyn Plugin> = match config.name.as_str() {
            "commons-chunk" | "CommonsChunkPlugin" => {
                Arc::new(CommonsChunkPlugin::new(parse_options(config)?)?)
            }
            "banner" | "BannerPlugin" => Arc::new(BannerPlugin::new(parse_options(config)?)),
            other => return Err(BundleError::UnknownPlugin(other.to_string()).into()),
        };
        plugins.push(plugin);
    }

    let policies = plugins.iter().filter(|p| p.is_shared_chunk_policy()).count();
    if policies > 1 {
        return Err(BundleError::MultipleSharedChunkPolicies(policies).into());
    }

    Ok(plugins)
}

fn parse_options<T: DeserializeOwned>(config: &PluginConfig) -> Result<T> {
    let table = config.options.clone().unwrap_or_default();

    toml::Value::Table(table).try_into::<T>().map_err(|e| {
        BundleError::InvalidPluginOptions {
            plugin: config.name.clone(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Plugin manager
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
    context: PluginContext,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new(root: PathBuf) -> Self {
        Self {
            plugins: Vec::new(),
            context: PluginContext { root },
        }
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run build_start hooks
    pub async fn run_build_start(&self) -> Result<()> {
        for plugin in &self.plugins {
            plugin.build_start(&self.context).await?;
        }
        Ok(())
    }

    /// Run build_end hooks
    pub async fn run_build_end(&self) -> Result<()> {
        for plugin in &self.plugins {
            plugin.build_end(&self.context).await?;
        }
        Ok(())
    }

    /// Run transform hooks in registration order
    pub async fn transform(&self, code: String, id: &str) -> Result<String> {
        let mut current = code;

        for plugin in &self.plugins {
            if let TransformResult::Transformed(code) =
                plugin.transform(&current, id, &self.context).await?
            {
                current = code;
            }
        }

        Ok(current)
    }

    /// Run optimize_chunks hooks
    pub async fn optimize_chunks(&self, chunks: &mut Vec<Chunk>, graph: &ModuleGraph) -> Result<()> {
        for plugin in &self.plugins {
            plugin.optimize_chunks(chunks, graph, &self.context).await?;
        }
        Ok(())
    }

    /// Run render_chunk hooks
    pub async fn render_chunk(&self, code: String, chunk: &Chunk) -> Result<String> {
        let mut current = code;

        for plugin in &self.plugins {
            if let Some(code) = plugin.render_chunk(&current, chunk, &self.context).await? {
                current = code;
            }
        }

        Ok(current)
    }
}
