//! Build pipeline
//!
//! End-to-end orchestration: resolve the module graph, run the transform
//! chains in parallel, classify assets, optimize and render the bundle,
//! then emit. Any failure aborts the build; nothing is written until
//! every module has transformed cleanly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::assets::{self, AssetOutput};
use crate::config::{Config, Mode, OutputKind};
use crate::emit::{AssetFile, AssetMap, EmitSummary, Emitter};
use crate::error::BuildError;
use crate::graph::{GraphBuilder, ModuleKind};
use crate::optimize;
use crate::resolver::Resolver;
use crate::rules::RuleSet;
use crate::transform;

/// Outcome of one finished build
#[derive(Debug)]
pub struct BuildReport {
    pub mode: Mode,
    pub modules: usize,
    pub chunks: usize,
    pub summary: EmitSummary,
    pub duration: Duration,
}

/// One-shot build runner; cheap to construct, reusable across rebuilds
pub struct Pipeline {
    config: Arc<Config>,
}

/// Per-module transform result, applied back onto the graph
struct ModuleOutput {
    path: PathBuf,
    transformed: Option<String>,
    css_extract: Option<String>,
    asset: Option<(String, AssetFile)>,
}

impl Pipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub async fn build(&self, mode: Mode) -> Result<BuildReport> {
        let started = Instant::now();

        let resolver = Resolver::new(self.config.clone());
        let mut graph = GraphBuilder::new(self.config.clone(), &resolver)
            .build(&self.config.all_entrypoints())?;
        info!(modules = graph.len(), "module graph complete");

        let rules = Arc::new(RuleSet::compile(&self.config.rules)?);

        // transform chains are pure per module, so they fan out to
        // blocking threads and join in graph order
        let mut tasks = Vec::new();
        for record in graph.modules() {
            let path = record.path.clone();
            let id = record.id.clone();
            let kind = record.kind;
            let bytes = record.bytes.clone();
            let config = self.config.clone();
            let rules = rules.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                transform_one(&config, &rules, path, id, kind, bytes, mode)
            }));
        }

        let mut assets_map = AssetMap::new();
        let joined = try_join_all(tasks).await.context("transform worker panicked")?;
        for result in joined {
            let output = result?;
            if let Some((id, file)) = output.asset {
                assets_map.insert(id, file);
            }
            if let Some(record) = graph.get_mut(&output.path) {
                record.transformed = output.transformed;
                record.css_extract = output.css_extract;
            }
        }
        debug!(assets = assets_map.len(), "transforms complete");

        let bundle = optimize::render_bundle(&mut graph, &self.config, mode)?;

        let emitter = Emitter::new(self.config.clone());
        let summary = emitter.emit(mode, &bundle, &assets_map)?;

        Ok(BuildReport {
            mode,
            modules: graph.len(),
            chunks: bundle.chunks.len(),
            summary,
            duration: started.elapsed(),
        })
    }
}

fn transform_one(
    config: &Config,
    rules: &RuleSet,
    path: PathBuf,
    id: String,
    kind: ModuleKind,
    bytes: Vec<u8>,
    mode: Mode,
) -> Result<ModuleOutput, BuildError> {
    let matched = rules.matching(&path);

    if matched.is_empty() {
        if kind.is_script_like() {
            // no chain configured; the source is used as-is
            return Ok(ModuleOutput { path, transformed: None, css_extract: None, asset: None });
        }
        let out = assets::classify(config, &path, kind, &matched, &bytes);
        return Ok(asset_output(config, path, id, out));
    }

    match matched.kind() {
        OutputKind::Asset => {
            let out = assets::classify(config, &path, kind, &matched, &bytes);
            Ok(asset_output(config, path, id, out))
        }
        OutputKind::Inline => {
            let source = text(&path, &bytes)?;
            let transformed = transform::execute(&source, &matched.chain())
                .map_err(|source| BuildError::Transform { path: path.clone(), source })?;
            Ok(ModuleOutput {
                path,
                transformed: Some(transformed),
                css_extract: None,
                asset: None,
            })
        }
        OutputKind::ExtractCss => {
            let source = text(&path, &bytes)?;
            let css = transform::execute(&source, &matched.chain())
                .map_err(|source| BuildError::Transform { path: path.clone(), source })?;
            match mode {
                // the stylesheet file carries the content; the module
                // itself only has to exist in the registry
                Mode::Production => Ok(ModuleOutput {
                    path,
                    transformed: Some("module.exports = {};".to_string()),
                    css_extract: Some(css),
                    asset: None,
                }),
                Mode::Development => {
                    let options = toml::Table::new();
                    let injected = transform::execute(&css, &[("style", &options)])
                        .map_err(|source| BuildError::Transform { path: path.clone(), source })?;
                    Ok(ModuleOutput {
                        path,
                        transformed: Some(injected),
                        css_extract: None,
                        asset: None,
                    })
                }
            }
        }
    }
}

fn asset_output(config: &Config, path: PathBuf, id: String, out: AssetOutput) -> ModuleOutput {
    let url = out.url(config);
    let asset = match out {
        AssetOutput::Emit { dest, bytes } => Some((id, AssetFile { dest, bytes })),
        AssetOutput::Inline(_) => None,
    };
    ModuleOutput {
        path,
        transformed: Some(format!("module.exports = \"{}\";", url)),
        css_extract: None,
        asset,
    }
}

fn text(path: &PathBuf, bytes: &[u8]) -> Result<String, BuildError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| BuildError::Module {
        path: path.clone(),
        message: "file is not valid UTF-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(dir: &std::path::Path) {
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(
            dir.join("src/main.js"),
            "import { greet } from './lib';\nimport './styles.css';\ngreet();\n",
        )
        .unwrap();
        fs::write(
            dir.join("src/lib.js"),
            "export function greet() { return 'hi'; }\nexport function unused() { return 0; }\n",
        )
        .unwrap();
        fs::write(dir.join("src/styles.css"), "body { color: red; }\n").unwrap();
        fs::write(
            dir.join("skein.toml"),
            "[project]\nname = \"fixture\"\n\n[entrypoints]\nmain = \"src/main.js\"\n",
        )
        .unwrap();
    }

    async fn run(dir: &std::path::Path, mode: Mode) -> BuildReport {
        let config = Arc::new(Config::load(dir.join("skein.toml")).unwrap());
        Pipeline::new(config).build(mode).await.unwrap()
    }

    #[tokio::test]
    async fn test_production_build_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let report = run(dir.path(), Mode::Production).await;
        assert_eq!(report.modules, 3);
        assert_eq!(report.chunks, 1);

        let html = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
        assert!(html.contains("static/js/main."));
        assert!(html.contains("static/css/styles."));

        // hashed chunk filename, shaken and minified content
        let (chunk_name, _) = report
            .summary
            .files
            .iter()
            .find(|(name, _)| name.starts_with("static/js/main."))
            .unwrap();
        let code = fs::read_to_string(dir.path().join("dist").join(chunk_name)).unwrap();
        assert!(!code.contains("unused"));
        assert!(code.contains("__skein_require__"));
    }

    #[tokio::test]
    async fn test_development_build_injects_styles() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let report = run(dir.path(), Mode::Development).await;
        assert!(report
            .summary
            .files
            .iter()
            .any(|(name, _)| name == "static/js/main.js"));
        assert!(!report
            .summary
            .files
            .iter()
            .any(|(name, _)| name.starts_with("static/css/")));

        let code = fs::read_to_string(dir.path().join("dist/static/js/main.js")).unwrap();
        assert!(code.contains("document.createElement('style')"));
        assert!(code.contains("unused"));
    }

    #[tokio::test]
    async fn test_unresolvable_import_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        fs::write(dir.path().join("src/main.js"), "import { x } from './missing';\n").unwrap();

        let config = Arc::new(Config::load(dir.path().join("skein.toml")).unwrap());
        let err = Pipeline::new(config).build(Mode::Production).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(!dir.path().join("dist").exists());
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let first = run(dir.path(), Mode::Production).await;
        let mut names_a: Vec<String> =
            first.summary.files.iter().map(|(n, _)| n.clone()).collect();
        let second = run(dir.path(), Mode::Production).await;
        let mut names_b: Vec<String> =
            second.summary.files.iter().map(|(n, _)| n.clone()).collect();
        names_a.sort();
        names_b.sort();
        assert_eq!(names_a, names_b);
    }
}
