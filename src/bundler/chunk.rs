//! Chunks: named groups of modules written to one output file

use super::{ModuleGraph, ModuleId};

/// Type of chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Entry point chunk - executes its entry modules when loaded
    Entry,
    /// Shared chunk - contains modules used by multiple entry points
    Shared,
}

/// A chunk is a group of modules that will be bundled together
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the chunk list, exposed as `[id]`
    pub id: usize,

    /// Chunk name (used for output filename)
    pub name: String,

    /// Type of chunk
    pub chunk_type: ChunkType,

    /// Module IDs included in this chunk, in id order
    pub module_ids: Vec<ModuleId>,

    /// Modules executed when the chunk loads, in declared order
    pub entry_modules: Vec<ModuleId>,

    /// Whether this chunk carries the module runtime
    pub has_runtime: bool,

    /// Filename template overriding `output.filename`
    pub filename_template: Option<String>,
}

impl Chunk {
    /// Create a new entry chunk holding everything its entries reach
    pub fn entry(id: usize, name: String, entry_modules: Vec<ModuleId>, graph: &ModuleGraph) -> Self {
        Self {
            id,
            name,
            chunk_type: ChunkType::Entry,
            module_ids: graph.get_reachable_modules(&entry_modules),
            entry_modules,
            has_runtime: true,
            filename_template: None,
        }
    }

    /// Create a new, empty shared chunk
    pub fn shared(id: usize, name: String) -> Self {
        Self {
            id,
            name,
            chunk_type: ChunkType::Shared,
            module_ids: Vec::new(),
            entry_modules: Vec::new(),
            has_runtime: true,
            filename_template: None,
        }
    }

    /// Check if chunk is empty
    pub fn is_empty(&self) -> bool {
        self.module_ids.is_empty()
    }

    /// Number of modules in chunk
    pub fn len(&self) -> usize {
        self.module_ids.len()
    }
}

/// Order in which chunks must be loaded: runtime carriers first
pub fn load_order(chunks: &[Chunk]) -> Vec<&Chunk> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| (c.chunk_type != ChunkType::Shared, c.id));
    ordered
}
