//! Chunk data structures

use std::path::PathBuf;

/// Type of chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Loaded eagerly from the entry document; always loads first
    Entry,
    /// Loaded on demand over a dynamic edge
    Async,
    /// Modules factored out because two or more chunks need them;
    /// loaded before any entry chunk
    Shared,
}

/// A named group of modules emitted as one output file
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk name, used in the output filename
    pub name: String,

    pub kind: ChunkKind,

    /// Constituent module paths in deterministic dependency-first order
    pub modules: Vec<PathBuf>,

    /// Entry module or dynamic-import target this chunk is rooted at.
    /// None for the shared chunk.
    pub root: Option<PathBuf>,
}

impl Chunk {
    pub fn contains(&self, path: &PathBuf) -> bool {
        self.modules.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }
}
