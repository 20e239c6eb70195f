//! Module graph
//!
//! One [`ModuleRecord`] per distinct resolved path, keyed by that path.
//! The graph is built once from the entrypoints, becomes read-only after
//! the transform phase, and is then consumed by the optimizer and emitter.

mod builder;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

pub use builder::GraphBuilder;

/// Detected file kind, derived from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    TypeScript,
    Stylesheet,
    Json,
    Image,
    Font,
    Media,
    Other,
}

impl ModuleKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleKind::Script,
            "ts" | "tsx" | "mts" | "cts" => ModuleKind::TypeScript,
            "css" | "scss" | "sass" | "less" | "styl" => ModuleKind::Stylesheet,
            "json" => ModuleKind::Json,
            "png" | "jpg" | "jpeg" | "bmp" | "gif" | "webp" | "svg" => ModuleKind::Image,
            "woff" | "woff2" | "eot" | "ttf" | "otf" => ModuleKind::Font,
            "mp3" | "mp4" | "webm" => ModuleKind::Media,
            _ => ModuleKind::Other,
        }
    }

    pub fn detect(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleKind::from_extension)
            .unwrap_or(ModuleKind::Other)
    }

    /// Kinds whose content is scanned for imports
    pub fn is_script_like(self) -> bool {
        matches!(self, ModuleKind::Script | ModuleKind::TypeScript)
    }

    /// Destination directory name for emitted asset kinds
    pub fn asset_dir(self) -> &'static str {
        match self {
            ModuleKind::Image => "image",
            ModuleKind::Font => "font",
            _ => "media",
        }
    }
}

/// One import edge: the specifier as written plus its resolution.
/// Static edges always carry a resolved path (resolution failure is fatal);
/// dynamic edges may stay unresolved.
#[derive(Debug, Clone)]
pub struct ImportEdge {
    pub specifier: String,
    pub resolved: Option<PathBuf>,
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Resolved absolute path: the module's identity
    pub path: PathBuf,

    /// Stable root-relative identifier used in emitted output
    pub id: String,

    /// Raw file content
    pub bytes: Vec<u8>,

    /// Detected file kind
    pub kind: ModuleKind,

    /// Whether this is a designated build root
    pub is_entry: bool,

    /// Eager edges, in source declaration order
    pub static_imports: Vec<ImportEdge>,

    /// Deferred edges, in source declaration order
    pub dynamic_imports: Vec<ImportEdge>,

    /// Transformed script output, set once when the chain completes
    pub transformed: Option<String>,

    /// Extracted stylesheet text destined for the css chunk
    /// (production ExtractCss rules only)
    pub css_extract: Option<String>,
}

impl ModuleRecord {
    /// Source as UTF-8 text; fails for binary content
    pub fn source_text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }

    /// Output code for chunk assembly: transformed if set, raw otherwise
    pub fn output_code(&self) -> String {
        match &self.transformed {
            Some(code) => code.clone(),
            None => String::from_utf8_lossy(&self.bytes).into_owned(),
        }
    }

    /// Resolved static dependency paths in declaration order
    pub fn static_deps(&self) -> impl Iterator<Item = &PathBuf> {
        self.static_imports.iter().filter_map(|e| e.resolved.as_ref())
    }

    /// Resolved dynamic dependency paths in declaration order
    pub fn dynamic_deps(&self) -> impl Iterator<Item = &PathBuf> {
        self.dynamic_imports.iter().filter_map(|e| e.resolved.as_ref())
    }
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All records keyed by resolved path. BTreeMap so iteration order is
    /// path order, independent of traversal order.
    modules: BTreeMap<PathBuf, ModuleRecord>,

    /// Entry module paths in entrypoint name order
    entries: Vec<PathBuf>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. The path-keyed map guarantees one record per
    /// distinct resolved path; a duplicate insert is ignored.
    pub fn insert(&mut self, record: ModuleRecord) {
        if record.is_entry && !self.entries.contains(&record.path) {
            self.entries.push(record.path.clone());
        }
        self.modules.entry(record.path.clone()).or_insert(record);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&ModuleRecord> {
        self.modules.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut ModuleRecord> {
        self.modules.get_mut(path)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// All records in path order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut ModuleRecord> {
        self.modules.values_mut()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules reachable from `start` over static edges, in deterministic
    /// breadth-first order with sorted neighbor expansion.
    pub fn static_closure(&self, start: &Path) -> Vec<PathBuf> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(start.to_path_buf());
        visited.insert(start.to_path_buf());

        while let Some(path) = queue.pop_front() {
            order.push(path.clone());

            if let Some(record) = self.modules.get(&path) {
                let mut deps: Vec<&PathBuf> = record.static_deps().collect();
                deps.sort();
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }

        order
    }

    /// Modules reachable from `start` over static and dynamic edges
    pub fn full_closure(&self, start: &Path) -> Vec<PathBuf> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(start.to_path_buf());
        visited.insert(start.to_path_buf());

        while let Some(path) = queue.pop_front() {
            order.push(path.clone());

            if let Some(record) = self.modules.get(&path) {
                let mut deps: Vec<&PathBuf> =
                    record.static_deps().chain(record.dynamic_deps()).collect();
                deps.sort();
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }

        order
    }

    /// Every distinct resolved dynamic-import target, in path order
    pub fn dynamic_targets(&self) -> Vec<PathBuf> {
        let mut targets = BTreeSet::new();
        for record in self.modules.values() {
            for dep in record.dynamic_deps() {
                targets.insert(dep.clone());
            }
        }
        targets.into_iter().collect()
    }

    /// Paths of modules whose static imports resolve to `target`
    pub fn static_importers(&self, target: &Path) -> Vec<PathBuf> {
        self.modules
            .values()
            .filter(|m| m.static_deps().any(|d| d == target))
            .map(|m| m.path.clone())
            .collect()
    }

    /// Paths of modules with a dynamic edge to `target`
    pub fn dynamic_importers(&self, target: &Path) -> Vec<PathBuf> {
        self.modules
            .values()
            .filter(|m| m.dynamic_deps().any(|d| d == target))
            .map(|m| m.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn record(path: &str, statics: &[&str], dynamics: &[&str]) -> ModuleRecord {
        ModuleRecord {
            path: PathBuf::from(path),
            id: path.trim_start_matches('/').to_string(),
            bytes: Vec::new(),
            kind: ModuleKind::Script,
            is_entry: false,
            static_imports: statics
                .iter()
                .map(|s| ImportEdge {
                    specifier: s.to_string(),
                    resolved: Some(PathBuf::from(s)),
                })
                .collect(),
            dynamic_imports: dynamics
                .iter()
                .map(|s| ImportEdge {
                    specifier: s.to_string(),
                    resolved: Some(PathBuf::from(s)),
                })
                .collect(),
            transformed: None,
            css_extract: None,
        }
    }

    #[test]
    fn test_kind_detection() {
        assert_eq!(ModuleKind::from_extension("js"), ModuleKind::Script);
        assert_eq!(ModuleKind::from_extension("ts"), ModuleKind::TypeScript);
        assert_eq!(ModuleKind::from_extension("less"), ModuleKind::Stylesheet);
        assert_eq!(ModuleKind::from_extension("webp"), ModuleKind::Image);
        assert_eq!(ModuleKind::from_extension("woff2"), ModuleKind::Font);
        assert_eq!(ModuleKind::from_extension("mp4"), ModuleKind::Media);
        assert_eq!(ModuleKind::from_extension("xyz"), ModuleKind::Other);
    }

    #[test]
    fn test_no_duplicate_records_per_path() {
        let mut graph = ModuleGraph::new();
        graph.insert(record("/a.js", &[], &[]));
        graph.insert(record("/a.js", &["/b.js"], &[]));

        assert_eq!(graph.len(), 1);
        // first insert wins
        assert!(graph.get(&PathBuf::from("/a.js")).unwrap().static_imports.is_empty());
    }

    #[test]
    fn test_static_closure_ignores_dynamic_edges() {
        let mut graph = ModuleGraph::new();
        graph.insert(record("/main.js", &["/a.js"], &[]));
        graph.insert(record("/a.js", &[], &["/b.js"]));
        graph.insert(record("/b.js", &[], &[]));

        let closure = graph.static_closure(&PathBuf::from("/main.js"));
        assert_eq!(closure, vec![PathBuf::from("/main.js"), PathBuf::from("/a.js")]);
    }

    #[test]
    fn test_closure_terminates_on_cycles() {
        let mut graph = ModuleGraph::new();
        graph.insert(record("/a.js", &["/b.js"], &[]));
        graph.insert(record("/b.js", &["/a.js"], &[]));

        let closure = graph.static_closure(&PathBuf::from("/a.js"));
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn test_importer_queries() {
        let mut graph = ModuleGraph::new();
        graph.insert(record("/main.js", &["/a.js"], &["/lazy.js"]));
        graph.insert(record("/a.js", &[], &[]));
        graph.insert(record("/lazy.js", &[], &[]));

        assert_eq!(graph.static_importers(&PathBuf::from("/a.js")), vec![PathBuf::from("/main.js")]);
        assert_eq!(
            graph.dynamic_importers(&PathBuf::from("/lazy.js")),
            vec![PathBuf::from("/main.js")]
        );
        assert_eq!(graph.dynamic_targets(), vec![PathBuf::from("/lazy.js")]);
    }
}
