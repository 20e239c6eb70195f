//! Skein - a config-driven frontend asset build pipeline
//!
//! Skein reads a `skein.toml`, walks the import graph from the configured
//! entrypoints, runs each module through its matching transform chain,
//! and emits a content-hashed bundle plus an entry HTML document. The
//! production path adds tree shaking, chunk splitting, module
//! concatenation, and minification; the development path serves the
//! plain build and rebuilds on change.

pub mod assets;
pub mod cli;
pub mod config;
pub mod emit;
pub mod error;
pub mod graph;
pub mod optimize;
pub mod pipeline;
pub mod resolver;
pub mod rules;
pub mod server;
pub mod transform;
pub mod utils;

pub use cli::Cli;
pub use config::{Config, Mode};
pub use error::BuildError;
pub use pipeline::{BuildReport, Pipeline};
