//! Shared-chunk extraction
//!
//! Moves modules that several entry chunks have in common (and every module an
//! explicit vendor entry reaches) into one shared chunk. The shared chunk
//! carries the runtime; the entry chunks it drew from no longer do.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Plugin, PluginContext};
use crate::bundler::{Chunk, ChunkType, FilenameTemplate, ModuleGraph, ModuleId};
use crate::error::BundleError;

/// How many chunks must share a module before it is extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMinChunks")]
pub enum MinChunks {
    Count(usize),
    /// Only modules reachable from the vendor entry are extracted
    Infinity,
}

impl Default for MinChunks {
    fn default() -> Self {
        MinChunks::Count(2)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMinChunks {
    Count(i64),
    Keyword(String),
}

impl TryFrom<RawMinChunks> for MinChunks {
    type Error = String;

    fn try_from(raw: RawMinChunks) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawMinChunks::Count(n) if n >= 2 => Ok(MinChunks::Count(n as usize)),
            RawMinChunks::Count(n) => Err(format!("min_chunks must be at least 2, got {n}")),
            RawMinChunks::Keyword(k) if k.eq_ignore_ascii_case("infinity") => Ok(MinChunks::Infinity),
            RawMinChunks::Keyword(k) => Err(format!("min_chunks must be a number or \"infinity\", got \"{k}\"")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommonsChunkOptions {
    /// Name of the shared chunk; an entry with this name becomes it
    pub name: String,

    /// Filename template for the shared chunk
    #[serde(default)]
    pub filename: Option<String>,

    /// Entry chunks considered; defaults to every other entry
    #[serde(default)]
    pub chunks: Option<Vec<String>>,

    #[serde(default)]
    pub min_chunks: MinChunks,
}

pub struct CommonsChunkPlugin {
    options: CommonsChunkOptions,
}

impl CommonsChunkPlugin {
    pub fn new(options: CommonsChunkOptions) -> Result<Self> {
        if options.name.trim().is_empty() {
            return Err(BundleError::InvalidPluginOptions {
                plugin: "commons-chunk".to_string(),
                message: "name must not be empty".to_string(),
            }
            .into());
        }

        if let Some(filename) = &options.filename {
            FilenameTemplate::parse(filename)?;
        }

        Ok(Self { options })
    }

    fn is_considered(&self, chunk: &Chunk) -> bool {
        chunk.chunk_type == ChunkType::Entry
            && chunk.name != self.options.name
            && self
                .options
                .chunks
                .as_ref()
                .map_or(true, |names| names.contains(&chunk.name))
    }
}

#[async_trait]
impl Plugin for CommonsChunkPlugin {
    fn name(&self) -> &str {
        "commons-chunk"
    }

    fn is_shared_chunk_policy(&self) -> bool {
        true
    }

    async fn optimize_chunks(
        &self,
        chunks: &mut Vec<Chunk>,
        _graph: &ModuleGraph,
        _ctx: &PluginContext,
    ) -> Result<()> {
        let shared_index = match chunks.iter().position(|c| c.name == self.options.name) {
            Some(index) => {
                debug!("Entry '{}' becomes the shared chunk", self.options.name);
                chunks[index].chunk_type = ChunkType::Shared;
                index
            }
            None => {
                chunks.push(Chunk::shared(chunks.len(), self.options.name.clone()));
                chunks.len() - 1
            }
        };

        let considered: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| self.is_considered(chunk))
            .map(|(index, _)| index)
            .collect();

        // Everything the vendor entry reaches is extracted unconditionally
        let mut extracted: BTreeSet<ModuleId> = chunks[shared_index].module_ids.iter().copied().collect();

        if let MinChunks::Count(min) = self.options.min_chunks {
            let mut usage: BTreeMap<ModuleId, usize> = BTreeMap::new();
            for &index in &considered {
                for &module in &chunks[index].module_ids {
                    *usage.entry(module).or_default() += 1;
                }
            }
            extracted.extend(
                usage
                    .into_iter()
                    .filter(|&(_, count)| count >= min)
                    .map(|(module, _)| module),
            );
        }

        for &index in &considered {
            let chunk = &mut chunks[index];
            chunk.module_ids.retain(|m| !extracted.contains(m));
            chunk.has_runtime = false;
        }

        let shared = &mut chunks[shared_index];
        shared.module_ids = extracted.into_iter().collect();
        shared.has_runtime = true;
        if self.options.filename.is_some() {
            shared.filename_template = self.options.filename.clone();
        }

        if shared.is_empty() {
            debug!("Shared chunk '{}' is empty", shared.name);
        }

        info!(
            "Shared chunk '{}' holds {} module(s) drawn from {} chunk(s)",
            shared.name,
            shared.module_ids.len(),
            considered.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Module, ModuleKind, ModuleType};
    use std::path::PathBuf;

    fn add(graph: &mut ModuleGraph, name: &str) -> ModuleId {
        graph.add_module(Module {
            path: PathBuf::from(name),
            name: name.to_string(),
            kind: ModuleKind::Source,
            module_type: ModuleType::JavaScript,
            rule: None,
            code: String::new(),
            dependencies: Vec::new(),
        })
    }

    /// app -> [lib, util], admin -> [lib], vendor -> [react]
    fn fixture() -> (ModuleGraph, Vec<Chunk>) {
        let mut graph = ModuleGraph::new();
        let app = add(&mut graph, "./app.js");
        let admin = add(&mut graph, "./admin.js");
        let vendor = add(&mut graph, "./vendor.js");
        let lib = add(&mut graph, "./lib.js");
        let util = add(&mut graph, "./util.js");
        let react = add(&mut graph, "./react.js");

        graph.add_dependency(app, "./lib", lib);
        graph.add_dependency(app, "./util", util);
        graph.add_dependency(admin, "./lib", lib);
        graph.add_dependency(vendor, "./react", react);

        let chunks = vec![
            Chunk::entry(0, "admin".to_string(), vec![admin], &graph),
            Chunk::entry(1, "app".to_string(), vec![app], &graph),
            Chunk::entry(2, "vendor".to_string(), vec![vendor], &graph),
        ];

        (graph, chunks)
    }

    fn plugin(name: &str, min_chunks: MinChunks) -> CommonsChunkPlugin {
        CommonsChunkPlugin::new(CommonsChunkOptions {
            name: name.to_string(),
            filename: None,
            chunks: None,
            min_chunks,
        })
        .unwrap()
    }

    fn ctx() -> PluginContext {
        PluginContext {
            root: PathBuf::from("/"),
        }
    }

    #[tokio::test]
    async fn test_vendor_entry_becomes_shared_chunk() {
        let (graph, mut chunks) = fixture();
        plugin("vendor", MinChunks::default())
            .optimize_chunks(&mut chunks, &graph, &ctx())
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        let vendor = &chunks[2];
        assert_eq!(vendor.chunk_type, ChunkType::Shared);
        assert!(vendor.has_runtime);
        // vendor.js, lib.js (shared by app and admin), react.js
        assert_eq!(vendor.module_ids, vec![2, 3, 5]);
        assert_eq!(vendor.entry_modules, vec![2]);

        assert_eq!(chunks[0].module_ids, vec![1]);
        assert_eq!(chunks[1].module_ids, vec![0, 4]);
        assert!(!chunks[0].has_runtime && !chunks[1].has_runtime);
    }

    #[tokio::test]
    async fn test_infinity_only_extracts_vendor_modules() {
        let (graph, mut chunks) = fixture();
        plugin("vendor", MinChunks::Infinity)
            .optimize_chunks(&mut chunks, &graph, &ctx())
            .await
            .unwrap();

        assert_eq!(chunks[2].module_ids, vec![2, 5]);
        assert_eq!(chunks[1].module_ids, vec![0, 3, 4]);
    }

    #[tokio::test]
    async fn test_new_shared_chunk_created() {
        let (graph, mut chunks) = fixture();
        chunks.truncate(2);
        plugin("common", MinChunks::default())
            .optimize_chunks(&mut chunks, &graph, &ctx())
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].name, "common");
        assert_eq!(chunks[2].id, 2);
        assert_eq!(chunks[2].module_ids, vec![3]);
        assert!(chunks[2].entry_modules.is_empty());
    }

    #[tokio::test]
    async fn test_chunks_option_limits_candidates() {
        let (graph, mut chunks) = fixture();
        let plugin = CommonsChunkPlugin::new(CommonsChunkOptions {
            name: "vendor".to_string(),
            filename: Some("vendor.[chunkhash:8].js".to_string()),
            chunks: Some(vec!["app".to_string()]),
            min_chunks: MinChunks::default(),
        })
        .unwrap();

        plugin.optimize_chunks(&mut chunks, &graph, &ctx()).await.unwrap();

        // admin keeps its own runtime and its copy of lib.js
        assert!(chunks[0].has_runtime);
        assert_eq!(chunks[0].module_ids, vec![1, 3]);
        assert!(!chunks[1].has_runtime);
        assert_eq!(chunks[2].filename_template.as_deref(), Some("vendor.[chunkhash:8].js"));
    }

    #[test]
    fn test_min_chunks_parsing() {
        let options: CommonsChunkOptions = toml::from_str("name = \"v\"\nmin_chunks = \"Infinity\"").unwrap();
        assert_eq!(options.min_chunks, MinChunks::Infinity);

        let options: CommonsChunkOptions = toml::from_str("name = \"v\"\nmin_chunks = 3").unwrap();
        assert_eq!(options.min_chunks, MinChunks::Count(3));

        assert!(toml::from_str::<CommonsChunkOptions>("name = \"v\"\nmin_chunks = 1").is_err());
    }
}
