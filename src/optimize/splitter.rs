//! Chunk splitting
//!
//! Production builds get one chunk per entrypoint, one chunk per dynamic
//! import target, and a shared chunk for anything needed by two or more of
//! them. Development builds (or `split_chunks = false`) keep the full
//! closure of each entry in one chunk so the dev server stays simple.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{Config, Mode};
use crate::graph::ModuleGraph;

use super::chunk::{Chunk, ChunkKind};

/// Partition the graph into chunks. Every script-like module reachable
/// from an entry ends up in exactly one chunk; iteration order is
/// deterministic for a given graph.
pub fn split(graph: &ModuleGraph, config: &Config, mode: Mode) -> Vec<Chunk> {
    let splitting = mode == Mode::Production && config.optimize.split_chunks;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut entry_members: Vec<PathBuf> = Vec::new();

    for entry in graph.entries() {
        let closure = script_closure(graph, entry, splitting);
        for m in &closure {
            if !entry_members.contains(m) {
                entry_members.push(m.clone());
            }
        }
        chunks.push(Chunk {
            name: chunk_name(config, entry),
            kind: ChunkKind::Entry,
            modules: closure,
            root: Some(entry.clone()),
        });
    }

    if !splitting {
        return dedupe_entries(chunks);
    }

    // One async chunk per dynamic target. Members already present in an
    // entry chunk stay there; the runtime has them loaded before the
    // dynamic import can fire.
    let mut targets = graph.dynamic_targets();
    targets.sort();
    targets.dedup();
    for target in targets {
        let modules: Vec<PathBuf> = graph
            .static_closure(&target)
            .into_iter()
            .filter(|p| !entry_members.contains(p))
            .collect();
        chunks.push(Chunk {
            name: chunk_name(config, &target),
            kind: ChunkKind::Async,
            modules,
            root: Some(target),
        });
    }

    factor_shared(&mut chunks);
    chunks.retain(|c| !c.is_empty());
    chunks
}

/// Chunk membership of an entry before shared extraction. With splitting
/// off it also pulls in every dynamic target's closure so one file serves
/// the whole app. Every reachable module gets a registry wrapper, asset
/// kinds included; their wrapper just exports a URL.
fn script_closure(graph: &ModuleGraph, root: &Path, splitting: bool) -> Vec<PathBuf> {
    if splitting {
        graph.static_closure(root)
    } else {
        graph.full_closure(root)
    }
}

/// Move any module claimed by two or more chunks into one shared chunk.
/// Entry-chunk members never move; duplicating them would be worse than
/// the extra request, and the entry chunk loads first anyway.
fn factor_shared(chunks: &mut Vec<Chunk>) {
    let mut owners: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
    for (i, chunk) in chunks.iter().enumerate() {
        for m in &chunk.modules {
            owners.entry(m.clone()).or_default().push(i);
        }
    }

    let mut shared: Vec<PathBuf> = Vec::new();
    for (module, holders) in &owners {
        if holders.len() < 2 {
            continue;
        }
        let in_entry = holders
            .iter()
            .any(|&i| chunks[i].kind == ChunkKind::Entry);
        if in_entry {
            // keep it in the entry chunk, drop from async chunks
            for &i in holders {
                if chunks[i].kind != ChunkKind::Entry {
                    chunks[i].modules.retain(|m| m != module);
                }
            }
        } else {
            for &i in holders {
                chunks[i].modules.retain(|m| m != module);
            }
            shared.push(module.clone());
        }
    }

    if !shared.is_empty() {
        chunks.push(Chunk {
            name: "shared".to_string(),
            kind: ChunkKind::Shared,
            modules: shared,
            root: None,
        });
    }
}

/// Without splitting, overlapping entry closures would emit a module
/// twice. Assign each module to the first entry chunk that claims it.
fn dedupe_entries(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen: Vec<PathBuf> = Vec::new();
    for chunk in &mut chunks {
        chunk.modules.retain(|m| {
            if seen.contains(m) {
                false
            } else {
                seen.push(m.clone());
                true
            }
        });
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}

fn chunk_name(config: &Config, root: &Path) -> String {
    for (name, path) in config.all_entrypoints() {
        if path == root {
            return name;
        }
    }

    let stem = root
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chunk");
    if stem == "index" {
        // disambiguate pages/about/index.ts from pages/home/index.ts
        if let Some(parent) = root.parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()) {
            return format!("{}-{}", parent, stem);
        }
    }
    stem.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ImportEdge, ModuleGraph, ModuleKind, ModuleRecord};
    use std::path::PathBuf;

    fn record(path: &str, statics: &[&str], dynamics: &[&str]) -> ModuleRecord {
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

    fn graph(entries: &[&str], records: Vec<ModuleRecord>) -> ModuleGraph {
        let mut g = ModuleGraph::new();
        for mut r in records {
            r.is_entry = entries.contains(&r.path.to_str().unwrap());
            g.insert(r);
        }
        g
    }

    fn test_config() -> Config {
        Config::default_config()
    }

    #[test]
    fn test_dynamic_target_gets_own_chunk() {
        let g = graph(
            &["/app/main.js"],
            vec![
                record("/app/main.js", &[], &["/app/lazy.js"]),
                record("/app/lazy.js", &[], &[]),
            ],
        );
        let chunks = split(&g, &test_config(), Mode::Production);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::Entry);
        assert!(chunks[0].contains(&PathBuf::from("/app/main.js")));
        assert_eq!(chunks[1].kind, ChunkKind::Async);
        assert!(chunks[1].contains(&PathBuf::from("/app/lazy.js")));
    }

    #[test]
    fn test_entry_modules_stay_out_of_async_chunks() {
        // util is both statically imported by main and by the lazy target
        let g = graph(
            &["/app/main.js"],
            vec![
                record("/app/main.js", &["/app/util.js"], &["/app/lazy.js"]),
                record("/app/util.js", &[], &[]),
                record("/app/lazy.js", &["/app/util.js"], &[]),
            ],
        );
        let chunks = split(&g, &test_config(), Mode::Production);

        let entry = chunks.iter().find(|c| c.kind == ChunkKind::Entry).unwrap();
        let lazy = chunks.iter().find(|c| c.kind == ChunkKind::Async).unwrap();
        assert!(entry.contains(&PathBuf::from("/app/util.js")));
        assert!(!lazy.contains(&PathBuf::from("/app/util.js")));
        assert!(chunks.iter().all(|c| c.kind != ChunkKind::Shared));
    }

    #[test]
    fn test_shared_chunk_for_async_overlap() {
        let g = graph(
            &["/app/main.js"],
            vec![
                record("/app/main.js", &[], &["/app/a.js", "/app/b.js"]),
                record("/app/a.js", &["/app/common.js"], &[]),
                record("/app/b.js", &["/app/common.js"], &[]),
                record("/app/common.js", &[], &[]),
            ],
        );
        let chunks = split(&g, &test_config(), Mode::Production);

        let shared = chunks.iter().find(|c| c.kind == ChunkKind::Shared).unwrap();
        assert_eq!(shared.modules, vec![PathBuf::from("/app/common.js")]);
        for c in chunks.iter().filter(|c| c.kind == ChunkKind::Async) {
            assert!(!c.contains(&PathBuf::from("/app/common.js")));
        }
    }

    #[test]
    fn test_development_keeps_full_closure_in_entry() {
        let g = graph(
            &["/app/main.js"],
            vec![
                record("/app/main.js", &[], &["/app/lazy.js"]),
                record("/app/lazy.js", &[], &[]),
            ],
        );
        let chunks = split(&g, &test_config(), Mode::Development);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains(&PathBuf::from("/app/lazy.js")));
    }

    #[test]
    fn test_no_split_overlap_goes_to_first_entry() {
        let g = graph(
            &["/app/a.js", "/app/b.js"],
            vec![
                record("/app/a.js", &["/app/common.js"], &[]),
                record("/app/b.js", &["/app/common.js"], &[]),
                record("/app/common.js", &[], &[]),
            ],
        );
        let chunks = split(&g, &test_config(), Mode::Development);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains(&PathBuf::from("/app/common.js")));
        assert!(!chunks[1].contains(&PathBuf::from("/app/common.js")));
    }

    #[test]
    fn test_asset_modules_ride_along() {
        let mut img = record("/app/logo.png", &[], &[]);
        img.kind = ModuleKind::Image;
        let g = graph(
            &["/app/main.js"],
            vec![record("/app/main.js", &["/app/logo.png"], &[]), img],
        );
        let chunks = split(&g, &test_config(), Mode::Production);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains(&PathBuf::from("/app/logo.png")));
    }
}
