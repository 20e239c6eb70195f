//! Production optimizer and bundle rendering
//!
//! Orchestrates tree shaking, chunk splitting, module concatenation, and
//! minification, then renders every chunk plus the extracted stylesheet.
//! Development builds go through the same path with the optimizer passes
//! switched off, so chunk rendering has exactly one implementation.

pub mod chunk;
pub mod minify;
pub mod render;
pub mod splitter;
pub mod treeshake;

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::{Config, Mode};
use crate::graph::ModuleGraph;
use crate::utils;

pub use chunk::{Chunk, ChunkKind};
pub use render::ChunkMap;

/// One finished chunk, ready to write
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub name: String,
    pub kind: ChunkKind,
    /// Output-root-relative path, e.g. `static/js/main.1a2b3c4d.js`
    pub filename: String,
    pub code: String,
    /// Ids of the member modules, for the manifest
    pub module_ids: Vec<String>,
}

/// The single extracted stylesheet
#[derive(Debug, Clone)]
pub struct RenderedCss {
    pub filename: String,
    pub code: String,
}

/// Everything the emitter needs to write script and style output
#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub chunks: Vec<RenderedChunk>,
    pub stylesheet: Option<RenderedCss>,
}

impl BundleOutput {
    /// Chunks in document load order: shared first, then entries.
    /// Async chunks load themselves and never appear in the page.
    pub fn page_chunks(&self) -> impl Iterator<Item = &RenderedChunk> {
        let shared = self.chunks.iter().filter(|c| c.kind == ChunkKind::Shared);
        let entries = self.chunks.iter().filter(|c| c.kind == ChunkKind::Entry);
        shared.chain(entries)
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.code.len()).sum::<usize>()
            + self.stylesheet.as_ref().map(|s| s.code.len()).unwrap_or(0)
    }
}

/// Run the optimizer passes and render the bundle
pub fn render_bundle(graph: &mut ModuleGraph, config: &Config, mode: Mode) -> Result<BundleOutput> {
    let prod = mode.is_production();

    if prod && config.optimize.tree_shaking {
        treeshake::shake(graph);
        debug!("tree shaking complete");
    }

    let chunks = splitter::split(graph, config, mode);
    debug!(chunks = chunks.len(), "chunk graph partitioned");

    let minifying = prod && config.optimize.minify;
    let protected = if minifying { protected_names(graph) } else { BTreeSet::new() };

    let mut out = BundleOutput::default();
    let mut chunk_map = ChunkMap::new();
    let mut used_names: BTreeSet<String> = BTreeSet::new();

    // async and shared chunks first; the entry runtime embeds their URLs
    for c in chunks.iter().filter(|c| c.kind != ChunkKind::Entry) {
        let rendered = finish_chunk(graph, config, mode, c, &chunk_map, &protected, &mut used_names)?;
        if c.kind == ChunkKind::Async {
            let url = config.public_path(&rendered.filename);
            for id in &rendered.module_ids {
                chunk_map.insert(id.clone(), url.clone());
            }
        }
        out.chunks.push(rendered);
    }

    for c in chunks.iter().filter(|c| c.kind == ChunkKind::Entry) {
        let rendered = finish_chunk(graph, config, mode, c, &chunk_map, &protected, &mut used_names)?;
        out.chunks.push(rendered);
    }

    out.stylesheet = assemble_css(graph, config, mode, &chunks)?;

    Ok(out)
}

fn finish_chunk(
    graph: &ModuleGraph,
    config: &Config,
    mode: Mode,
    chunk: &Chunk,
    chunk_map: &ChunkMap,
    protected: &BTreeSet<String>,
    used_names: &mut BTreeSet<String>,
) -> Result<RenderedChunk> {
    let mut code = render::render_chunk(graph, config, mode, chunk, chunk_map);

    if mode.is_production() && config.optimize.minify {
        code = minify::minify_js(&code, &config.optimize.drop_calls, true, protected);
    }

    let name = unique_name(&chunk.name, used_names);
    let filename = if mode.is_production() && config.output.hash {
        format!("static/js/{}.{}.js", name, utils::hash_content(code.as_bytes()))
    } else {
        format!("static/js/{}.js", name)
    };

    Ok(RenderedChunk {
        name,
        kind: chunk.kind,
        filename,
        code,
        module_ids: chunk
            .modules
            .iter()
            .filter_map(|p| graph.get(p))
            .map(|m| m.id.clone())
            .collect(),
    })
}

/// Names the mangler must preserve, gathered from pre-render sources
fn protected_names(graph: &ModuleGraph) -> BTreeSet<String> {
    let mut protected = BTreeSet::new();
    for m in graph.modules() {
        if m.kind.is_script_like() {
            let source = m.output_code();
            protected.extend(treeshake::imported_bindings(&source));
            protected.extend(treeshake::exported_bindings(&source));
        }
    }
    protected
}

/// Distinct filenames even when two chunk roots share a stem
fn unique_name(base: &str, used: &mut BTreeSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Concatenate every module's extracted stylesheet text in chunk order
fn assemble_css(
    graph: &ModuleGraph,
    config: &Config,
    mode: Mode,
    chunks: &[Chunk],
) -> Result<Option<RenderedCss>> {
    let mut css = String::new();
    for chunk in chunks {
        for path in &chunk.modules {
            if let Some(text) = graph.get(path).and_then(|m| m.css_extract.as_ref()) {
                css.push_str(text);
                if !text.ends_with('\n') {
                    css.push('\n');
                }
            }
        }
    }
    if css.is_empty() {
        return Ok(None);
    }

    if mode.is_production() && config.optimize.minify {
        css = minify::minify_css(&css)
            .map_err(|e| anyhow::anyhow!(e))
            .context("failed to minify extracted stylesheet")?;
    }

    let filename = if mode.is_production() && config.output.hash {
        format!("static/css/styles.{}.css", utils::hash_content(css.as_bytes()))
    } else {
        "static/css/styles.css".to_string()
    };

    Ok(Some(RenderedCss { filename, code: css }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ImportEdge, ModuleKind, ModuleRecord};
    use std::path::PathBuf;

    fn record(path: &str, id: &str, source: &str, is_entry: bool) -> ModuleRecord {
        ModuleRecord {
            path: PathBuf::from(path),
            id: id.to_string(),
            bytes: source.as_bytes().to_vec(),
            kind: ModuleKind::Script,
            is_entry,
            static_imports: Vec::new(),
            dynamic_imports: Vec::new(),
            transformed: None,
            css_extract: None,
        }
    }

    fn edge(spec: &str, target: &str) -> ImportEdge {
        ImportEdge {
            specifier: spec.to_string(),
            resolved: Some(PathBuf::from(target)),
        }
    }

    fn sample_graph() -> ModuleGraph {
        let mut g = ModuleGraph::new();
        let mut main = record(
            "/p/src/main.js",
            "src/main.js",
            "import { greet } from './lib';\ngreet();\nimport('./lazy');",
            true,
        );
        main.static_imports = vec![edge("./lib", "/p/src/lib.js")];
        main.dynamic_imports = vec![edge("./lazy", "/p/src/lazy.js")];
        g.insert(main);
        g.insert(record(
            "/p/src/lib.js",
            "src/lib.js",
            "export function greet() { return 'hi'; }\nexport function unused_helper() { return 0; }\n",
            false,
        ));
        g.insert(record(
            "/p/src/lazy.js",
            "src/lazy.js",
            "export const payload = 99;\n",
            false,
        ));
        g
    }

    #[test]
    fn test_production_bundle_splits_and_maps_chunks() {
        let mut g = sample_graph();
        let config = Config::default_config();
        let out = render_bundle(&mut g, &config, Mode::Production).unwrap();

        assert_eq!(out.chunks.len(), 2);
        let entry = out.chunks.iter().find(|c| c.kind == ChunkKind::Entry).unwrap();
        let lazy = out.chunks.iter().find(|c| c.kind == ChunkKind::Async).unwrap();

        assert!(entry.filename.starts_with("static/js/main."));
        assert!(entry.filename.ends_with(".js"));
        // the runtime knows where to fetch the async chunk
        assert!(entry.code.contains(&config.public_path(&lazy.filename)));
        // the async module is not registered in the entry chunk
        assert!(!entry.code.contains("src/lazy.js\"] ="));
        assert!(lazy.code.contains("__skein_modules__[\"src/lazy.js\"]"));
    }

    #[test]
    fn test_tree_shaking_reaches_bundle_output() {
        let mut g = sample_graph();
        let config = Config::default_config();
        let out = render_bundle(&mut g, &config, Mode::Production).unwrap();

        let all: String = out.chunks.iter().map(|c| c.code.as_str()).collect();
        assert!(!all.contains("unused_helper"));
    }

    #[test]
    fn test_bundle_is_deterministic() {
        let config = Config::default_config();
        let mut a = sample_graph();
        let mut b = sample_graph();
        let out_a = render_bundle(&mut a, &config, Mode::Production).unwrap();
        let out_b = render_bundle(&mut b, &config, Mode::Production).unwrap();

        let names_a: Vec<_> = out_a.chunks.iter().map(|c| &c.filename).collect();
        let names_b: Vec<_> = out_b.chunks.iter().map(|c| &c.filename).collect();
        assert_eq!(names_a, names_b);
        for (x, y) in out_a.chunks.iter().zip(&out_b.chunks) {
            assert_eq!(x.code, y.code);
        }
    }

    #[test]
    fn test_development_bundle_single_plain_chunk() {
        let mut g = sample_graph();
        let config = Config::default_config();
        let out = render_bundle(&mut g, &config, Mode::Development).unwrap();

        assert_eq!(out.chunks.len(), 1);
        assert_eq!(out.chunks[0].filename, "static/js/main.js");
        // no minification in development
        assert!(out.chunks[0].code.contains("unused_helper"));
    }

    #[test]
    fn test_css_assembled_and_hashed() {
        let mut g = ModuleGraph::new();
        let mut main = record("/p/src/main.js", "src/main.js", "import './a.css';", true);
        main.static_imports = vec![edge("./a.css", "/p/src/a.css")];
        g.insert(main);
        let mut css = record("/p/src/a.css", "src/a.css", "", false);
        css.kind = ModuleKind::Stylesheet;
        css.transformed = Some("module.exports = {};".to_string());
        css.css_extract = Some("body { color: red; }".to_string());
        g.insert(css);

        let config = Config::default_config();
        let out = render_bundle(&mut g, &config, Mode::Production).unwrap();

        let sheet = out.stylesheet.expect("stylesheet");
        assert!(sheet.filename.starts_with("static/css/styles."));
        assert!(sheet.code.contains("color:red"));
    }

    #[test]
    fn test_no_css_means_no_stylesheet() {
        let mut g = sample_graph();
        let config = Config::default_config();
        let out = render_bundle(&mut g, &config, Mode::Production).unwrap();
        assert!(out.stylesheet.is_none());
    }
}
