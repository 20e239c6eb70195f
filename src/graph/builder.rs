//! Graph construction
//!
//! Walks resolved imports from the entrypoints with an explicit worklist
//! and a tri-state visit marker (unvisited / in-progress / done), so
//! cyclic graphs terminate without unbounded recursion. Traversal order is
//! not observable in the final graph; per-module import lists keep source
//! declaration order.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ImportEdge, ModuleGraph, ModuleKind, ModuleRecord};
use crate::config::Config;
use crate::error::BuildError;
use crate::resolver::{extract_imports, Resolver};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

/// Builds the module graph from one or more entrypoints
pub struct GraphBuilder<'a> {
    config: Arc<Config>,
    resolver: &'a Resolver,
    graph: ModuleGraph,
    state: HashMap<PathBuf, VisitState>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: Arc<Config>, resolver: &'a Resolver) -> Self {
        Self {
            config,
            resolver,
            graph: ModuleGraph::new(),
            state: HashMap::new(),
        }
    }

    /// Walk every entrypoint and return the completed graph
    pub fn build(mut self, entrypoints: &[(String, PathBuf)]) -> Result<ModuleGraph, BuildError> {
        for (name, path) in entrypoints {
            debug!("processing entrypoint '{}': {}", name, path.display());
            let resolved = self
                .resolver
                .resolve(
                    &path.display().to_string(),
                    path.parent().unwrap_or(Path::new(".")),
                )
                .map_err(|source| BuildError::Resolve {
                    path: path.clone(),
                    source,
                })?;
            self.walk(resolved, true)?;
        }

        Ok(self.graph)
    }

    /// Iterative traversal from one root. A re-encountered in-progress or
    /// done path is an existing edge, not a new traversal.
    fn walk(&mut self, root: PathBuf, is_entry: bool) -> Result<(), BuildError> {
        let mut worklist = vec![(root, is_entry)];

        while let Some((path, is_entry)) = worklist.pop() {
            if self.state.contains_key(&path) {
                continue;
            }
            self.state.insert(path.clone(), VisitState::InProgress);

            let record = self.load_module(&path, is_entry)?;

            for dep in record.static_deps() {
                worklist.push((dep.clone(), false));
            }
            for dep in record.dynamic_deps() {
                worklist.push((dep.clone(), false));
            }

            self.graph.insert(record);
            self.state.insert(path, VisitState::Done);
        }

        Ok(())
    }

    /// Read one file and resolve its import edges. Static-edge resolution
    /// failure is fatal; a dynamic edge that fails to resolve is recorded
    /// as unresolved with a warning.
    fn load_module(&self, path: &Path, is_entry: bool) -> Result<ModuleRecord, BuildError> {
        let bytes = fs::read(path).map_err(|e| BuildError::Module {
            path: path.to_path_buf(),
            message: format!("failed to read module: {}", e),
        })?;

        let kind = ModuleKind::detect(path);
        let from_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut static_imports = Vec::new();
        let mut dynamic_imports = Vec::new();

        if kind.is_script_like() {
            let source = std::str::from_utf8(&bytes).map_err(|_| BuildError::Module {
                path: path.to_path_buf(),
                message: "module is not valid UTF-8".to_string(),
            })?;

            let extracted = extract_imports(source);

            for spec in extracted.static_specifiers {
                if self.resolver.is_external(&spec) {
                    debug!("skipping external specifier '{}'", spec);
                    continue;
                }
                let resolved =
                    self.resolver
                        .resolve(&spec, &from_dir)
                        .map_err(|source| BuildError::Resolve {
                            path: path.to_path_buf(),
                            source,
                        })?;
                static_imports.push(ImportEdge {
                    specifier: spec,
                    resolved: Some(resolved),
                });
            }

            for spec in extracted.dynamic_specifiers {
                if self.resolver.is_external(&spec) {
                    continue;
                }
                let resolved = match self.resolver.resolve(&spec, &from_dir) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!("{}: unresolved dynamic import: {}", path.display(), e);
                        None
                    }
                };
                dynamic_imports.push(ImportEdge {
                    specifier: spec,
                    resolved,
                });
            }
        }

        Ok(ModuleRecord {
            path: path.to_path_buf(),
            id: utils::module_id(&self.config.root, path),
            bytes,
            kind,
            is_entry,
            static_imports,
            dynamic_imports,
            transformed: None,
            css_extract: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project(files: &[(&str, &str)]) -> (tempfile::TempDir, Arc<Config>) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let mut config = Config::default_config();
        config.root = dir.path().to_path_buf();
        config
            .resolve
            .alias
            .insert("@".to_string(), "src".to_string());
        (dir, Arc::new(config))
    }

    fn build(config: Arc<Config>, entry: &str) -> Result<ModuleGraph, BuildError> {
        let resolver = Resolver::new(config.clone());
        let entry_path = config.root.join(entry);
        GraphBuilder::new(config, &resolver).build(&[("main".to_string(), entry_path)])
    }

    #[test]
    fn test_walks_static_imports() {
        let (_dir, config) = project(&[
            ("src/main.js", "import { a } from './a';\nconsole.log(a);"),
            ("src/a.js", "export const a = 1;"),
        ]);

        let graph = build(config.clone(), "src/main.js").unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.contains(&config.root.join("src/a.js")));
    }

    #[test]
    fn test_cyclic_imports_terminate() {
        let (_dir, config) = project(&[
            ("src/main.js", "import './a';"),
            ("src/a.js", "import './b';\nexport const a = 1;"),
            ("src/b.js", "import './a';\nexport const b = 2;"),
        ]);

        let graph = build(config.clone(), "src/main.js").unwrap();
        // a and b appear exactly once each despite the cycle
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_self_import_terminates() {
        let (_dir, config) = project(&[("src/main.js", "import './main';\nexport const x = 1;")]);

        let graph = build(config.clone(), "src/main.js").unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_dynamic_imports_recorded_as_deferred() {
        let (_dir, config) = project(&[
            ("src/main.js", "const p = import('./lazy');"),
            ("src/lazy.js", "export default 42;"),
        ]);

        let graph = build(config.clone(), "src/main.js").unwrap();
        let main = graph.get(&config.root.join("src/main.js")).unwrap();
        assert!(main.static_imports.is_empty());
        assert_eq!(main.dynamic_imports.len(), 1);
        assert!(graph.contains(&config.root.join("src/lazy.js")));
    }

    #[test]
    fn test_unresolved_static_import_is_fatal() {
        let (_dir, config) = project(&[("src/main.js", "import './missing';")]);

        let err = build(config, "src/main.js").unwrap_err();
        assert!(err.to_string().contains("main.js"));
    }

    #[test]
    fn test_unresolved_dynamic_import_is_recorded() {
        let (_dir, config) = project(&[("src/main.js", "const p = import('./missing');")]);

        let graph = build(config.clone(), "src/main.js").unwrap();
        let main = graph.get(&config.root.join("src/main.js")).unwrap();
        assert_eq!(main.dynamic_imports.len(), 1);
        assert!(main.dynamic_imports[0].resolved.is_none());
    }

    #[test]
    fn test_missing_entrypoint_fails() {
        let (_dir, config) = project(&[("src/other.js", "")]);
        assert!(build(config, "src/main.js").is_err());
    }

    #[test]
    fn test_import_order_preserved() {
        let (_dir, config) = project(&[
            ("src/main.js", "import './z';\nimport './a';\nimport './m';"),
            ("src/z.js", ""),
            ("src/a.js", ""),
            ("src/m.js", ""),
        ]);

        let graph = build(config.clone(), "src/main.js").unwrap();
        let main = graph.get(&config.root.join("src/main.js")).unwrap();
        let specs: Vec<&str> = main.static_imports.iter().map(|e| e.specifier.as_str()).collect();
        assert_eq!(specs, vec!["./z", "./a", "./m"]);
    }
}
