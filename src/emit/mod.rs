//! Output emission
//!
//! Writes the rendered bundle to the output root: chunk files, the
//! extracted stylesheet, classified asset files, the entry document, the
//! manifest, and verbatim passthrough copies. The output root is cleared
//! first so stale files from earlier builds never survive.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{Config, Mode};
use crate::error::EmitError;
use crate::optimize::BundleOutput;

/// One classified asset destined for its own output file
#[derive(Debug, Clone)]
pub struct AssetFile {
    /// Output-root-relative destination
    pub dest: String,
    pub bytes: Vec<u8>,
}

/// Module id to emitted asset file
pub type AssetMap = BTreeMap<String, AssetFile>;

/// What was written, for the build summary
#[derive(Debug, Default)]
pub struct EmitSummary {
    /// Relative path and size of every written file
    pub files: Vec<(String, usize)>,
}

impl EmitSummary {
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|(_, size)| size).sum()
    }

    fn record(&mut self, rel: &str, size: usize) {
        self.files.push((rel.to_string(), size));
    }
}

/// Writes build output under the configured output root
pub struct Emitter {
    config: Arc<Config>,
}

impl Emitter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Write the whole output set. The output root is cleared first.
    pub fn emit(
        &self,
        mode: Mode,
        bundle: &BundleOutput,
        assets: &AssetMap,
    ) -> Result<EmitSummary, EmitError> {
        let mut summary = EmitSummary::default();
        self.clear_output()?;

        for chunk in &bundle.chunks {
            self.write_file(&chunk.filename, chunk.code.as_bytes())?;
            summary.record(&chunk.filename, chunk.code.len());
        }

        if let Some(sheet) = &bundle.stylesheet {
            self.write_file(&sheet.filename, sheet.code.as_bytes())?;
            summary.record(&sheet.filename, sheet.code.len());
        }

        for asset in assets.values() {
            self.write_file(&asset.dest, &asset.bytes)?;
            summary.record(&asset.dest, asset.bytes.len());
        }

        let html = self.render_entry_document(bundle)?;
        self.write_file("index.html", html.as_bytes())?;
        summary.record("index.html", html.len());

        if self.config.output.manifest {
            let manifest = self.render_manifest(bundle, assets);
            self.write_file("manifest.json", manifest.as_bytes())?;
            summary.record("manifest.json", manifest.len());
        }

        if mode.is_production() {
            self.copy_passthrough(&mut summary)?;
        }

        Ok(summary)
    }

    fn clear_output(&self) -> Result<(), EmitError> {
        let dir = self.config.output_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| EmitError::Clear {
                path: dir.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&dir).map_err(|source| EmitError::Clear { path: dir, source })
    }

    fn write_file(&self, rel: &str, bytes: &[u8]) -> Result<(), EmitError> {
        let path = self.config.output_dir().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EmitError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, bytes).map_err(|source| EmitError::Write { path, source })
    }

    /// Entry document: the configured template, or a built-in skeleton.
    /// Stylesheet links land before `</head>`, scripts before `</body>`.
    fn render_entry_document(&self, bundle: &BundleOutput) -> Result<String, EmitError> {
        let mut html = match &self.config.output.template {
            Some(rel) => {
                let path = self.config.root.join(rel);
                fs::read_to_string(&path)
                    .map_err(|source| EmitError::Template { path, source })?
            }
            None => format!(
                "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\">\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n    <title>{}</title>\n  </head>\n  <body>\n    <div id=\"app\"></div>\n  </body>\n</html>\n",
                self.config.output.title
            ),
        };

        let mut links = String::new();
        if let Some(sheet) = &bundle.stylesheet {
            links.push_str(&format!(
                "    <link rel=\"stylesheet\" href=\"{}\">\n",
                self.config.public_path(&sheet.filename)
            ));
        }

        let mut scripts = String::new();
        for chunk in bundle.page_chunks() {
            scripts.push_str(&format!(
                "    <script src=\"{}\"></script>\n",
                self.config.public_path(&chunk.filename)
            ));
        }

        html = insert_before(&html, "</head>", &links);
        html = insert_before(&html, "</body>", &scripts);
        Ok(html)
    }

    /// manifest.json maps stable logical names to hashed output paths
    fn render_manifest(&self, bundle: &BundleOutput, assets: &AssetMap) -> String {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        for chunk in &bundle.chunks {
            entries.insert(
                format!("{}.js", chunk.name),
                self.config.public_path(&chunk.filename),
            );
        }
        if let Some(sheet) = &bundle.stylesheet {
            entries.insert(
                "styles.css".to_string(),
                self.config.public_path(&sheet.filename),
            );
        }
        for (id, asset) in assets {
            entries.insert(id.clone(), self.config.public_path(&asset.dest));
        }
        entries.insert("index.html".to_string(), self.config.public_path("index.html"));

        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "{}".to_string())
    }

    /// Copy passthrough directories verbatim, honoring configured excludes
    /// and a .gitignore at the directory root. Files already emitted by the
    /// build win collisions.
    fn copy_passthrough(&self, summary: &mut EmitSummary) -> Result<(), EmitError> {
        let out_root = self.config.output_dir();

        for dir in &self.config.passthrough {
            let base = self.config.root.join(&dir.from);
            let mut patterns = dir.exclude.clone();
            patterns.extend(gitignore_patterns(&base));
            let excluded = build_globset(&patterns);

            for entry in WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&base) else { continue };
                if rel == Path::new(".gitignore") {
                    continue;
                }
                if excluded.as_ref().is_some_and(|set| set.is_match(rel)) {
                    continue;
                }

                let dest = out_root.join(rel);
                if dest.exists() {
                    warn!(path = %rel.display(), "passthrough file collides with build output, skipped");
                    continue;
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|source| EmitError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                let copied = fs::copy(entry.path(), &dest).map_err(|source| EmitError::Copy {
                    from: entry.path().to_path_buf(),
                    to: dest.clone(),
                    source,
                })?;
                summary.record(&rel.display().to_string(), copied as usize);
            }
            debug!(dir = %base.display(), "passthrough copy complete");
        }
        Ok(())
    }
}

fn insert_before(html: &str, marker: &str, insert: &str) -> String {
    if insert.is_empty() {
        return html.to_string();
    }
    match html.find(marker) {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + insert.len());
            out.push_str(&html[..pos]);
            out.push_str(insert);
            out.push_str(&html[pos..]);
            out
        }
        None => {
            let mut out = html.to_string();
            out.push_str(insert);
            out
        }
    }
}

fn gitignore_patterns(base: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(base.join(".gitignore")) else {
        return Vec::new();
    };
    content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.trim_start_matches('/').to_string())
        .collect()
}

/// Compile exclusion patterns. Bare names match at any depth, and every
/// pattern also covers its directory contents.
fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        let base = p.trim_end_matches('/');
        let anchored = if base.contains('/') {
            vec![base.to_string(), format!("{}/**", base)]
        } else {
            vec![
                base.to_string(),
                format!("{}/**", base),
                format!("**/{}", base),
                format!("**/{}/**", base),
            ]
        };
        for pat in anchored {
            match Glob::new(&pat) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => warn!(pattern = %pat, %err, "ignoring invalid exclude pattern"),
            }
        }
    }
    builder.build().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::{ChunkKind, RenderedChunk, RenderedCss};

    fn chunk(name: &str, kind: ChunkKind, filename: &str) -> RenderedChunk {
        RenderedChunk {
            name: name.to_string(),
            kind,
            filename: filename.to_string(),
            code: format!("// {}\n", name),
            module_ids: Vec::new(),
        }
    }

    fn test_config(root: &Path) -> Arc<Config> {
        let mut config = Config::default_config();
        config.root = root.to_path_buf();
        Arc::new(config)
    }

    fn sample_bundle() -> BundleOutput {
        BundleOutput {
            chunks: vec![
                chunk("shared", ChunkKind::Shared, "static/js/shared.aaaa1111.js"),
                chunk("lazy", ChunkKind::Async, "static/js/lazy.bbbb2222.js"),
                chunk("main", ChunkKind::Entry, "static/js/main.cccc3333.js"),
            ],
            stylesheet: Some(RenderedCss {
                filename: "static/css/styles.dddd4444.css".to_string(),
                code: "body{color:red}".to_string(),
            }),
        }
    }

    #[test]
    fn test_emit_writes_chunks_html_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let emitter = Emitter::new(config.clone());

        let summary = emitter
            .emit(Mode::Production, &sample_bundle(), &AssetMap::new())
            .unwrap();

        assert!(dir.path().join("dist/static/js/main.cccc3333.js").exists());
        assert!(dir.path().join("dist/static/css/styles.dddd4444.css").exists());
        assert!(summary.files.iter().any(|(name, _)| name == "index.html"));

        let html = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
        let link_pos = html.find("static/css/styles.dddd4444.css").unwrap();
        assert!(link_pos < html.find("</head>").unwrap());

        // shared loads before the entry, async chunk is absent
        let shared_pos = html.find("shared.aaaa1111.js").unwrap();
        let main_pos = html.find("main.cccc3333.js").unwrap();
        assert!(shared_pos < main_pos);
        assert!(!html.contains("lazy.bbbb2222.js"));

        let manifest: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("dist/manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["main.js"], "/static/js/main.cccc3333.js");
        assert_eq!(manifest["styles.css"], "/static/css/styles.dddd4444.css");
    }

    #[test]
    fn test_emit_clears_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/stale.js"), "old").unwrap();

        let emitter = Emitter::new(config);
        emitter
            .emit(Mode::Production, &BundleOutput::default(), &AssetMap::new())
            .unwrap();

        assert!(!dir.path().join("dist/stale.js").exists());
        assert!(dir.path().join("dist/index.html").exists());
    }

    #[test]
    fn test_custom_template_used() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("page.html"),
            "<html><head><title>custom</title></head><body></body></html>",
        )
        .unwrap();
        let mut config = Config::default_config();
        config.root = dir.path().to_path_buf();
        config.output.template = Some("page.html".to_string());

        let emitter = Emitter::new(Arc::new(config));
        emitter
            .emit(Mode::Production, &sample_bundle(), &AssetMap::new())
            .unwrap();

        let html = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
        assert!(html.contains("<title>custom</title>"));
        assert!(html.contains("main.cccc3333.js"));
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_config();
        config.root = dir.path().to_path_buf();
        config.output.template = Some("nope.html".to_string());

        let emitter = Emitter::new(Arc::new(config));
        let err = emitter
            .emit(Mode::Production, &sample_bundle(), &AssetMap::new())
            .unwrap_err();
        assert!(matches!(err, EmitError::Template { .. }));
    }

    #[test]
    fn test_passthrough_copies_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("public");
        fs::create_dir_all(public.join("icons")).unwrap();
        fs::write(public.join("robots.txt"), "User-agent: *").unwrap();
        fs::write(public.join("icons/fav.ico"), "ico").unwrap();
        fs::write(public.join("notes.tmp"), "scratch").unwrap();
        fs::write(public.join(".gitignore"), "*.tmp\n# comment\n").unwrap();

        let mut config = Config::default_config();
        config.root = dir.path().to_path_buf();
        config.passthrough = vec![crate::config::PassthroughConfig {
            from: "public".to_string(),
            exclude: vec!["icons".to_string()],
        }];

        let emitter = Emitter::new(Arc::new(config));
        emitter
            .emit(Mode::Production, &BundleOutput::default(), &AssetMap::new())
            .unwrap();

        assert!(dir.path().join("dist/robots.txt").exists());
        assert!(!dir.path().join("dist/icons/fav.ico").exists());
        assert!(!dir.path().join("dist/notes.tmp").exists());
        assert!(!dir.path().join("dist/.gitignore").exists());
    }

    #[test]
    fn test_passthrough_skipped_in_development() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("public");
        fs::create_dir_all(&public).unwrap();
        fs::write(public.join("robots.txt"), "x").unwrap();

        let mut config = Config::default_config();
        config.root = dir.path().to_path_buf();
        config.passthrough = vec![crate::config::PassthroughConfig {
            from: "public".to_string(),
            exclude: Vec::new(),
        }];

        let emitter = Emitter::new(Arc::new(config));
        emitter
            .emit(Mode::Development, &BundleOutput::default(), &AssetMap::new())
            .unwrap();

        assert!(!dir.path().join("dist/robots.txt").exists());
    }
}
