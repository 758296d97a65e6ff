//! Core bundler implementation
//!
//! Builds the module graph from the configured entries, lets plugins shape the
//! chunks, renders and names every chunk in memory and only then writes the
//! output directory.

mod chunk;
mod filename;
mod graph;
mod render;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSetBuilder};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cli::BuildOptions;
use crate::config::Config;
use crate::error::BundleError;
use crate::plugins::{self, PluginManager};
use crate::resolver::{Resolved, Resolver};
use crate::transform::{RuleSet, Transformer};
use crate::utils::{hash_content, module_id};

pub use chunk::{load_order, Chunk, ChunkType};
pub use filename::{FilenameContext, FilenameTemplate, DEFAULT_HASH_LENGTH};
pub use graph::{Module, ModuleGraph, ModuleId, ModuleKind, ModuleType};
pub use render::render_chunk;

/// Name of the manifest written next to the bundles
pub const MANIFEST_FILE: &str = "manifest.json";

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// Generated bundles, in chunk order
    pub bundles: Vec<BundleInfo>,

    /// Chunk name -> emitted filename
    pub manifest: Manifest,

    /// Number of modules in the graph
    pub module_count: usize,
}

/// Contents of manifest.json
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Build hash (`[hash]`)
    pub hash: String,

    /// Chunk name -> filename
    pub chunks: BTreeMap<String, String>,

    /// Filenames in the order a page must load them
    pub load_order: Vec<String>,
}

/// Information about a generated bundle
#[derive(Debug, Clone)]
pub struct BundleInfo {
    /// Chunk name
    pub name: String,

    pub chunk_type: ChunkType,

    /// Filename relative to the output directory
    pub filename: String,

    /// Output file path
    pub output_path: PathBuf,

    /// Full content hash of the bundle
    pub chunk_hash: String,

    /// Bundle size in bytes
    pub size: usize,

    /// Modules written into this bundle
    pub module_count: usize,
}

/// A chunk rendered and named, waiting to be written
struct RenderedChunk {
    chunk: Chunk,
    code: String,
    chunk_hash: String,
}

/// The main bundler
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Build options
    options: BuildOptions,

    /// Canonical context directory
    context: PathBuf,

    /// Module resolver
    resolver: Resolver,

    /// Code transformer
    transformer: Transformer,

    /// Build plugins
    plugins: PluginManager,

    /// Module graph
    graph: Arc<RwLock<ModuleGraph>>,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Config, options: BuildOptions) -> Result<Self> {
        let config = Arc::new(config);
        let context = fs::canonicalize(&config.context_dir).with_context(|| {
            format!("Failed to resolve context directory: {}", config.context_dir.display())
        })?;

        let resolver = Resolver::from_config(&config);
        let rules = RuleSet::from_config(&config.module.rules)?;

        let mut plugins = PluginManager::new(context.clone());
        for plugin in plugins::from_config(&config.plugins)? {
            plugins.register(plugin);
        }

        debug!(
            "{} transform rule(s), {} plugin(s)",
            rules.len(),
            plugins.len()
        );
        let transformer = Transformer::new(rules);

        Ok(Self {
            config,
            options,
            context,
            resolver,
            transformer,
            plugins,
            graph: Arc::new(RwLock::new(ModuleGraph::new())),
        })
    }

    /// Directory bundles are written to
    pub fn output_dir(&self) -> PathBuf {
        self.options
            .outdir
            .clone()
            .unwrap_or_else(|| self.config.output_dir())
    }

    /// Build the project
    pub async fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();
        *self.graph.write() = ModuleGraph::new();

        self.plugins.run_build_start().await?;

        // 1. Build the module graph from entrypoints
        info!("Building module graph...");
        let entries = self.build_module_graph().await?;
        let graph = std::mem::take(&mut *self.graph.write());
        debug!("Module graph has {} module(s)", graph.len());

        // 2. Generate chunks
        info!("Generating chunks...");
        let chunks = self.generate_chunks(&entries, &graph).await?;

        // 3. Render and name chunks
        info!("Rendering {} chunk(s)...", chunks.len());
        let rendered = self.render_chunks(chunks, &graph).await?;
        let (named, manifest) = self.assign_filenames(&rendered)?;

        // 4. Write output bundles
        info!("Writing bundles...");
        let bundles = self.write_bundles(&rendered, &named, &manifest)?;

        self.plugins.run_build_end().await?;

        debug!("Build completed in {:?}", start.elapsed());

        Ok(BuildResult {
            bundles,
            manifest,
            module_count: graph.len(),
        })
    }

    /// Build the module graph by traversing from entrypoints
    ///
    /// Returns each entry name with its entry module ids.
    async fn build_module_graph(&self) -> Result<Vec<(String, Vec<ModuleId>)>> {
        let mut entries = Vec::new();

        for (name, paths) in self.config.resolved_entries()? {
            let mut ids = Vec::with_capacity(paths.len());
            for path in paths {
                debug!("Processing entrypoint: {} -> {}", name, path.display());
                ids.push(self.process_module(&path).await?);
            }
            entries.push((name, ids));
        }

        Ok(entries)
    }

    /// Process a single module and its dependencies
    ///
    /// Uses Box::pin for async recursion to avoid infinite type size issues
    async fn process_module(&self, path: &Path) -> Result<ModuleId> {
        let canonical_path = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve module path: {}", path.display()))?;

        // Check if already processed
        if let Some(id) = self.graph.read().get_module_id(&canonical_path) {
            return Ok(id);
        }

        let source = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read module: {}", canonical_path.display()))?;

        let name = module_id(&canonical_path, &self.context);
        let module_type = ModuleType::from_path(&canonical_path);

        let transformed = self.transformer.transform(&source, &canonical_path)?;
        let code = self.plugins.transform(transformed.code, &name).await?;

        // Pass-through files of unknown dialects are not scanned
        let dependencies = if transformed.rule.is_some() || module_type.is_js_like() {
            self.resolver.extract_dependencies(&code)
        } else {
            Vec::new()
        };

        let module_id = {
            let mut graph = self.graph.write();
            graph.add_module(Module {
                path: canonical_path.clone(),
                name,
                kind: ModuleKind::Source,
                module_type,
                rule: transformed.rule,
                code,
                dependencies: Vec::new(),
            })
        };

        // Process dependencies recursively (Box::pin needed for async recursion)
        for specifier in dependencies {
            let dep_id = match self.resolver.resolve(&specifier, &canonical_path)? {
                Resolved::File(resolved_path) => {
                    Box::pin(self.process_module(&resolved_path)).await?
                }
                Resolved::External { request, global } => {
                    self.graph.write().add_module(Module::external(&request, &global))
                }
            };

            self.graph.write().add_dependency(module_id, &specifier, dep_id);
        }

        Ok(module_id)
    }

    /// One chunk per entry, then the plugins' chunk optimizations
    async fn generate_chunks(
        &self,
        entries: &[(String, Vec<ModuleId>)],
        graph: &ModuleGraph,
    ) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = entries
            .iter()
            .enumerate()
            .map(|(id, (name, modules))| Chunk::entry(id, name.clone(), modules.clone(), graph))
            .collect();

        self.plugins.optimize_chunks(&mut chunks, graph).await?;

        for chunk in &chunks {
            debug!(
                "Chunk '{}' ({:?}): {} module(s), runtime: {}",
                chunk.name,
                chunk.chunk_type,
                chunk.len(),
                chunk.has_runtime
            );
        }

        Ok(chunks)
    }

    async fn render_chunks(&self, chunks: Vec<Chunk>, graph: &ModuleGraph) -> Result<Vec<RenderedChunk>> {
        let mut rendered = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let code = render_chunk(&chunk, graph);
            let code = self.plugins.render_chunk(code, &chunk).await?;
            let chunk_hash = hash_content(code.as_bytes());

            rendered.push(RenderedChunk {
                chunk,
                code,
                chunk_hash,
            });
        }

        Ok(rendered)
    }

    /// Fill in filename templates and detect collisions
    fn assign_filenames(&self, rendered: &[RenderedChunk]) -> Result<(Vec<String>, Manifest)> {
        let default_template = FilenameTemplate::parse(&self.config.output.filename)?;

        let all_hashes: String = rendered.iter().map(|r| r.chunk_hash.as_str()).collect();
        let build_hash = hash_content(all_hashes.as_bytes());

        let mut filenames = Vec::with_capacity(rendered.len());
        let mut owners: BTreeMap<String, String> = BTreeMap::new();

        for r in rendered {
            let template = match &r.chunk.filename_template {
                Some(raw) => FilenameTemplate::parse(raw)?,
                None => default_template.clone(),
            };

            let filename = template.render(&FilenameContext {
                name: &r.chunk.name,
                id: r.chunk.id,
                chunk_hash: &r.chunk_hash,
                build_hash: &build_hash,
            });

            if let Some(first) = owners.insert(filename.clone(), r.chunk.name.clone()) {
                return Err(BundleError::FilenameConflict {
                    filename,
                    first,
                    second: r.chunk.name.clone(),
                }
                .into());
            }

            filenames.push(filename);
        }

        let chunks: Vec<Chunk> = rendered.iter().map(|r| r.chunk.clone()).collect();
        let load_order = load_order(&chunks)
            .into_iter()
            .filter_map(|c| chunks.iter().position(|o| o.id == c.id))
            .map(|index| filenames[index].clone())
            .collect();

        let manifest = Manifest {
            hash: build_hash,
            chunks: rendered
                .iter()
                .zip(&filenames)
                .map(|(r, f)| (r.chunk.name.clone(), f.clone()))
                .collect(),
            load_order,
        };

        Ok((filenames, manifest))
    }

    /// Write bundles to disk
    ///
    /// Bundles and the manifest are first written into a staging directory
    /// inside the output directory and moved into place only once every write
    /// succeeded. A failed build leaves previous output as it was.
    fn write_bundles(
        &self,
        rendered: &[RenderedChunk],
        filenames: &[String],
        manifest: &Manifest,
    ) -> Result<Vec<BundleInfo>> {
        let output_dir = self.output_dir();
        let created = !output_dir.exists();

        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        let result = self.emit(&output_dir, rendered, filenames, manifest);

        if result.is_err() && created {
            let _ = fs::remove_dir_all(&output_dir);
        }

        result
    }

    fn emit(
        &self,
        output_dir: &Path,
        rendered: &[RenderedChunk],
        filenames: &[String],
        manifest: &Manifest,
    ) -> Result<Vec<BundleInfo>> {
        let staging = tempfile::Builder::new()
            .prefix(".packwright-staging-")
            .tempdir_in(output_dir)
            .with_context(|| format!("Failed to create staging directory in {}", output_dir.display()))?;

        let manifest_json = if self.config.output.manifest {
            Some(serde_json::to_string_pretty(manifest)?)
        } else {
            None
        };

        let mut files: Vec<(String, &str)> = rendered
            .iter()
            .zip(filenames)
            .map(|(r, filename)| (filename.clone(), r.code.as_str()))
            .collect();
        if let Some(json) = &manifest_json {
            files.push((MANIFEST_FILE.to_string(), json.as_str()));
        }

        for (filename, content) in &files {
            let staged = staging.path().join(filename);
            if let Some(parent) = staged.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(&staged, content)
                .with_context(|| format!("Failed to write {}", output_dir.join(filename).display()))?;
        }

        for (filename, _) in &files {
            let target = output_dir.join(filename);
            if target.is_dir() {
                bail!("Cannot write {}: a directory is in the way", target.display());
            }
        }

        if self.options.clean || self.config.output.clean {
            self.clean_output(output_dir, staging.path())?;
        }

        for (filename, _) in &files {
            let target = output_dir.join(filename);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::rename(staging.path().join(filename), &target)
                .with_context(|| format!("Failed to write bundle: {}", target.display()))?;
        }

        let mut bundles = Vec::with_capacity(rendered.len());
        for (r, filename) in rendered.iter().zip(filenames) {
            let output_path = output_dir.join(filename);
            debug!("Wrote {} ({} bytes)", output_path.display(), r.code.len());

            bundles.push(BundleInfo {
                name: r.chunk.name.clone(),
                chunk_type: r.chunk.chunk_type,
                filename: filename.clone(),
                output_path,
                chunk_hash: r.chunk_hash.clone(),
                size: r.code.len(),
                module_count: r.chunk.len(),
            });
        }

        Ok(bundles)
    }

    /// Remove previous output, sparing files matched by `output.keep`
    fn clean_output(&self, output_dir: &Path, staging: &Path) -> Result<()> {
        let mut keep = GlobSetBuilder::new();
        for pattern in &self.config.output.keep {
            keep.add(Glob::new(pattern).with_context(|| format!("Invalid keep pattern: {pattern}"))?);
        }
        let keep = keep.build()?;

        let mut removed = 0usize;
        let entries = WalkDir::new(output_dir)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_entry(|entry| entry.path() != staging);

        for entry in entries {
            let entry = entry?;
            let relative = entry.path().strip_prefix(output_dir).unwrap_or(entry.path());

            if entry.file_type().is_dir() {
                // Only succeeds for directories the walk has emptied
                let _ = fs::remove_dir(entry.path());
            } else if !keep.is_match(relative) {
                fs::remove_file(entry.path())
                    .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
                removed += 1;
            }
        }

        info!("Cleaned {} file(s) from {}", removed, output_dir.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn bundler(dir: &TempDir, config: &str) -> Bundler {
        let config = Config::from_toml(config, dir.path()).unwrap();
        Bundler::new(config, BuildOptions::default()).unwrap()
    }

    const APP_AND_VENDOR: &str = r#"
[entry]
app = "./src/index"
vendor = "./src/vendor"

[output]
filename = "[name].bundle.[chunkhash:8].js"

[[plugins]]
name = "commons-chunk"
options = { name = "vendor" }
"#;

    #[tokio::test]
    async fn test_single_entry_bundle() {
        let dir = project(&[
            ("src/index.js", "var add = require('./add');\nconsole.log(add(1, 2));"),
            ("src/add.js", "module.exports = function (a, b) { return a + b; };"),
        ]);
        let result = bundler(&dir, "[entry]\napp = \"./src/index\"\n").build().await.unwrap();

        assert_eq!(result.bundles.len(), 1);
        assert_eq!(result.module_count, 2);

        let bundle = &result.bundles[0];
        assert_eq!(bundle.name, "app");
        assert_eq!(bundle.filename, format!("app.bundle.{}.js", &bundle.chunk_hash[..20]));
        assert_eq!(bundle.module_count, 2);

        let code = fs::read_to_string(&bundle.output_path).unwrap();
        assert!(code.contains("\"./src/add.js\""));
        assert!(code.contains("{\"./add\": \"./src/add.js\"}"));
        assert!(dir.path().join("dist/manifest.json").exists());
    }

    #[tokio::test]
    async fn test_shared_chunk_emitted_separately() {
        let dir = project(&[
            ("src/index.js", "var lib = require('./lib');"),
            ("src/vendor.js", "var lib = require('./lib');"),
            ("src/lib.js", "module.exports = 42;"),
        ]);
        let result = bundler(&dir, APP_AND_VENDOR).build().await.unwrap();

        assert_eq!(result.bundles.len(), 2);
        let app = result.bundles.iter().find(|b| b.name == "app").unwrap();
        let vendor = result.bundles.iter().find(|b| b.name == "vendor").unwrap();

        assert_eq!(vendor.chunk_type, ChunkType::Shared);
        assert_eq!(app.module_count, 1);
        assert_eq!(vendor.module_count, 2);

        let app_code = fs::read_to_string(&app.output_path).unwrap();
        assert!(!app_code.contains("./src/lib.js\": ["));
        assert!(!app_code.contains("function install"));

        assert_eq!(
            result.manifest.load_order,
            vec![vendor.filename.clone(), app.filename.clone()]
        );
    }

    #[tokio::test]
    async fn test_chunk_hash_stable_until_content_changes() {
        let dir = project(&[
            ("src/index.js", "require('./lib');"),
            ("src/vendor.js", "module.exports = 'v1';"),
            ("src/lib.js", "module.exports = 1;"),
        ]);

        let first = bundler(&dir, APP_AND_VENDOR).build().await.unwrap();
        let second = bundler(&dir, APP_AND_VENDOR).build().await.unwrap();
        let names = |r: &BuildResult| r.bundles.iter().map(|b| b.filename.clone()).collect::<Vec<_>>();
        assert_eq!(names(&first), names(&second));

        fs::write(dir.path().join("src/lib.js"), "module.exports = 2;").unwrap();
        let third = bundler(&dir, APP_AND_VENDOR).build().await.unwrap();

        let filename = |r: &BuildResult, name: &str| {
            r.bundles.iter().find(|b| b.name == name).unwrap().filename.clone()
        };
        assert_ne!(filename(&first, "app"), filename(&third, "app"));
        assert_eq!(filename(&first, "vendor"), filename(&third, "vendor"));
    }

    #[tokio::test]
    async fn test_first_matching_rule_transforms() {
        let dir = project(&[
            ("src/index.js", "var data = require('./data.json');\nexport default data;"),
            ("src/data.json", "{\"a\": 1}"),
        ]);
        let config = r#"
[entry]
app = "./src/index"

[[module.rules]]
test = '\.js$'
loader = "babel-loader"

[[module.rules]]
test = '\.js$'
loader = "raw"
"#;
        let result = bundler(&dir, config).build().await.unwrap();
        let code = fs::read_to_string(&result.bundles[0].output_path).unwrap();

        assert!(code.contains("__esModule"));
        assert!(code.contains("\"./src/data.json\""));
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_without_output() {
        let dir = project(&[("src/index.js", "require('./missing');")]);
        let err = bundler(&dir, "[entry]\napp = \"./src/index\"\n")
            .build()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::ModuleNotFound { request, .. }) if request == "./missing"
        ));
        assert!(!dir.path().join("dist").exists());
    }

    #[tokio::test]
    async fn test_filename_conflict_detected() {
        let dir = project(&[("src/a.js", ""), ("src/b.js", "")]);
        let config = "[entry]\na = \"./src/a\"\nb = \"./src/b\"\n\n[output]\nfilename = \"bundle.js\"\n";
        let err = bundler(&dir, config).build().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::FilenameConflict { filename, .. }) if filename == "bundle.js"
        ));
        assert!(!dir.path().join("dist").exists());
    }

    #[tokio::test]
    async fn test_clean_keeps_matching_files() {
        let dir = project(&[
            ("src/index.js", ""),
            ("dist/old.js", "stale"),
            ("dist/static/logo.svg", "<svg/>"),
        ]);
        let config = "[entry]\napp = \"./src/index\"\n\n[output]\nclean = true\nkeep = [\"static/**\"]\n";
        bundler(&dir, config).build().await.unwrap();

        assert!(!dir.path().join("dist/old.js").exists());
        assert!(dir.path().join("dist/static/logo.svg").exists());
        assert!(dir.path().join("dist/manifest.json").exists());
    }

    #[tokio::test]
    async fn test_externals_not_bundled() {
        let dir = project(&[("src/index.js", "var React = require('react');")]);
        let config = "[entry]\napp = \"./src/index\"\n\n[externals]\nreact = \"React\"\n";
        let result = bundler(&dir, config).build().await.unwrap();
        let code = fs::read_to_string(&result.bundles[0].output_path).unwrap();

        assert!(code.contains("module.exports = root[\"React\"];"));
        assert!(code.contains("{\"react\": \"external:react\"}"));
    }

    #[tokio::test]
    async fn test_blocked_bundle_leaves_previous_output() {
        let dir = project(&[
            ("src/a.js", ""),
            ("src/b.js", ""),
            ("dist/a.js", "previous"),
            ("dist/b.js/stray.txt", ""),
        ]);
        let config = "[entry]\na = \"./src/a\"\nb = \"./src/b\"\n\n[output]\nfilename = \"[name].js\"\nclean = true\n";
        let err = bundler(&dir, config).build().await.unwrap_err();

        assert!(format!("{err:#}").contains("b.js"));
        assert_eq!(fs::read_to_string(dir.path().join("dist/a.js")).unwrap(), "previous");
        assert!(dir.path().join("dist/b.js/stray.txt").exists());
        assert!(!dir.path().join("dist/manifest.json").exists());

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("dist"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".packwright-staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_output_dir_reported() {
        let dir = project(&[("src/index.js", ""), ("dist", "not a directory")]);
        let err = bundler(&dir, "[entry]\napp = \"./src/index\"\n")
            .build()
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("Failed to create output directory"));
        assert_eq!(fs::read_to_string(dir.path().join("dist")).unwrap(), "not a directory");
    }
}
