//! Module graph data structures

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Unique identifier for a module; also its discovery order
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Jsx,
    Css,
    Json,
    Unknown,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleType::JavaScript,
            "jsx" => ModuleType::Jsx,
            "css" => ModuleType::Css,
            "json" => ModuleType::Json,
            _ => ModuleType::Unknown,
        }
    }

    /// Determine module type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleType::from_extension)
            .unwrap_or(ModuleType::Unknown)
    }

    /// Check if this is a JavaScript-like module
    pub fn is_js_like(&self) -> bool {
        matches!(self, ModuleType::JavaScript | ModuleType::Jsx)
    }
}

/// Where a module's code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// A file under the context (or node_modules)
    Source,
    /// A request answered by a global variable
    External { global: String },
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Canonical path (the request itself for externals)
    pub path: PathBuf,

    /// Stable id used inside bundles, e.g. `./src/index.js`
    pub name: String,

    pub kind: ModuleKind,

    pub module_type: ModuleType,

    /// Index of the transform rule that applied
    pub rule: Option<usize>,

    /// Code after loaders and plugin transforms
    pub code: String,

    /// Request specifier -> resolved module, in source order
    pub dependencies: Vec<(String, ModuleId)>,
}

impl Module {
    pub fn external(request: &str, global: &str) -> Self {
        Self {
            path: PathBuf::from(request),
            name: format!("external:{request}"),
            kind: ModuleKind::External {
                global: global.to_string(),
            },
            module_type: ModuleType::JavaScript,
            rule: None,
            code: String::new(),
            dependencies: Vec::new(),
        }
    }
}

/// The module dependency graph
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    /// All modules, indexed by their ID
    modules: Vec<Module>,

    /// Map from path to module ID
    path_to_id: HashMap<PathBuf, ModuleId>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph; returns the existing id for known paths
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }

        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);

        id
    }

    /// Record that `from` requests `specifier`, which resolved to `to`
    pub fn add_dependency(&mut self, from: ModuleId, specifier: &str, to: ModuleId) {
        if let Some(module) = self.modules.get_mut(from) {
            if !module.dependencies.iter().any(|(s, _)| s == specifier) {
                module.dependencies.push((specifier.to_string(), to));
            }
        }
    }

    /// Get module ID from path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// All modules reachable from the given roots, in id order
    pub fn get_reachable_modules(&self, roots: &[ModuleId]) -> Vec<ModuleId> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<ModuleId> = roots.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }

            if let Some(module) = self.modules.get(id) {
                queue.extend(module.dependencies.iter().map(|(_, dep)| *dep));
            }
        }

        visited.into_iter().collect()
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
