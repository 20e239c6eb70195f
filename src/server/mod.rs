//! Development server
//!
//! Serves the development build output over HTTP and watches the project
//! root for changes. Every change triggers a full development rebuild;
//! the browser picks it up on refresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tower_http::cors::CorsLayer;

use crate::config::{Config, Mode};
use crate::pipeline::Pipeline;
use crate::utils;

/// Shared request state
#[derive(Clone)]
struct ServerState {
    /// Directory the development build writes to
    output_dir: PathBuf,
}

/// Development server
pub struct DevServer {
    config: Arc<Config>,
}

impl DevServer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Build once, then serve the output and rebuild on change
    pub async fn run(&self) -> Result<()> {
        let pipeline = Pipeline::new(self.config.clone());
        let report = pipeline
            .build(Mode::Development)
            .await
            .context("initial development build failed")?;
        info!(
            modules = report.modules,
            "initial build finished in {}",
            utils::format_duration(report.duration)
        );

        let (change_tx, change_rx) = mpsc::channel::<Vec<PathBuf>>(64);
        self.setup_file_watcher(change_tx)?;
        self.spawn_rebuild_loop(change_rx);

        let state = ServerState {
            output_dir: self.config.output_dir(),
        };

        let app = Router::new()
            .route("/", get(serve_index))
            .route("/*path", get(serve_file))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let host = self.config.dev.host.clone();
        let port = self.config.dev.port;
        let url = format!("http://{}:{}", host, port);

        if self.config.dev.open {
            if let Err(e) = open_browser(&url) {
                debug!("failed to open browser: {}", e);
            }
        }

        eprintln!("  {} serving on {}\n", "→".blue(), url.cyan().underline());
        info!("server listening on {}", url);

        let listener = tokio::net::TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("failed to bind {}:{}", host, port))?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Watch the project root; forward batched change paths to the
    /// rebuild loop. Events under the output directory are the build's
    /// own writes and are dropped here.
    fn setup_file_watcher(&self, change_tx: mpsc::Sender<Vec<PathBuf>>) -> Result<()> {
        let root = self.config.root.clone();
        let output_dir = self.config.output_dir();

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer(Duration::from_millis(150), tx)?;
        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

        // The debouncer is moved into the thread to keep it alive
        std::thread::spawn(move || {
            let _debouncer = debouncer;

            loop {
                match rx.recv() {
                    Ok(Ok(events)) => {
                        let paths: Vec<PathBuf> = events
                            .into_iter()
                            .map(|event| event.path)
                            .filter(|path| is_relevant(path, &output_dir))
                            .collect();
                        if !paths.is_empty() && change_tx.blocking_send(paths).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        error!("watch error: {:?}", e);
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(())
    }

    /// Rebuild on every change batch. A failed rebuild keeps the previous
    /// output on disk and the server running.
    fn spawn_rebuild_loop(&self, mut change_rx: mpsc::Receiver<Vec<PathBuf>>) {
        let config = self.config.clone();

        tokio::spawn(async move {
            while let Some(paths) = change_rx.recv().await {
                for path in &paths {
                    eprintln!(
                        "  {} changed: {}",
                        "↻".yellow(),
                        path.display().to_string().dimmed()
                    );
                }

                let pipeline = Pipeline::new(config.clone());
                match pipeline.build(Mode::Development).await {
                    Ok(report) => {
                        eprintln!(
                            "  {} rebuilt {} modules in {}",
                            "✓".green(),
                            report.modules,
                            utils::format_duration(report.duration).dimmed()
                        );
                    }
                    Err(e) => {
                        error!("rebuild failed: {:#}", e);
                        eprintln!("  {} rebuild failed: {:#}", "✗".red(), e);
                    }
                }
            }
        });
    }
}

/// Changes inside the output directory or editor noise never trigger
/// a rebuild.
fn is_relevant(path: &Path, output_dir: &Path) -> bool {
    if path.starts_with(output_dir) {
        return false;
    }
    if path
        .components()
        .any(|c| matches!(c.as_os_str().to_str(), Some("node_modules") | Some(".git")))
    {
        return false;
    }
    true
}

async fn serve_index(State(state): State<ServerState>) -> Response {
    serve_from(&state.output_dir, "index.html").await
}

async fn serve_file(
    State(state): State<ServerState>,
    axum::extract::Path(path): axum::extract::Path<String>,
) -> Response {
    serve_from(&state.output_dir, &path).await
}

/// Read a file under the output root, with path traversal cleaned out
async fn serve_from(output_dir: &Path, rel: &str) -> Response {
    let clean = utils::clean_path(rel);
    let mut full = output_dir.join(clean.trim_start_matches('/'));
    if full.is_dir() {
        full = full.join("index.html");
    }

    match tokio::fs::read(&full).await {
        Ok(content) => {
            let ext = full.extension().and_then(|e| e.to_str()).unwrap_or("");
            let content_type = utils::mime_for_ext(ext);
            ([(header::CONTENT_TYPE, content_type)], content).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, format!("not found: /{}", clean)).into_response(),
    }
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd").args(["/C", "start", url]).spawn()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dir_changes_are_ignored() {
        let out = PathBuf::from("/proj/dist");
        assert!(!is_relevant(Path::new("/proj/dist/static/js/main.js"), &out));
        assert!(is_relevant(Path::new("/proj/src/main.js"), &out));
    }

    #[test]
    fn test_dependency_and_vcs_noise_is_ignored() {
        let out = PathBuf::from("/proj/dist");
        assert!(!is_relevant(Path::new("/proj/node_modules/x/index.js"), &out));
        assert!(!is_relevant(Path::new("/proj/.git/HEAD"), &out));
    }
}
