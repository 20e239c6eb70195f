//! Configuration schema definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Module resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Alias tokens mapped to root-relative base directories,
    /// e.g. `"@" = "src"`
    #[serde(default)]
    pub alias: BTreeMap<String, String>,

    /// Extension search order for extensionless specifiers
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            alias: BTreeMap::new(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["ts", "js", "mjs", "json"].iter().map(|s| s.to_string()).collect()
}

/// How a matched file's output leaves the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Transformed content becomes a script module in its chunk
    Inline,
    /// Stylesheet content is extracted into the css chunk in production
    /// and style-injected in development
    ExtractCss,
    /// Content goes to the asset classifier (data URI or emitted file)
    Asset,
}

impl Default for OutputKind {
    fn default() -> Self {
        OutputKind::Inline
    }
}

/// A single file-type rule: predicate, transform chain, output kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regex matched against the root-relative path
    pub pattern: String,

    /// Optional narrowing regex; when present the path must also match it
    #[serde(default)]
    pub include: Option<String>,

    /// Optional exclusion regex; takes precedence over pattern and include
    #[serde(default)]
    pub exclude: Option<String>,

    /// Ordered transform chain, applied left to right
    #[serde(default, rename = "use")]
    pub chain: Vec<String>,

    /// Output kind declared by this rule
    #[serde(default)]
    pub kind: OutputKind,

    /// Whether an asset-kind match is eligible for data-URI inlining
    #[serde(default)]
    pub inline: bool,

    /// Opaque per-stage options (preset tables); stages read what they need
    #[serde(default)]
    pub options: toml::Table,
}

/// Asset classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Inline-eligible assets below this many bytes become data URIs
    #[serde(default = "default_inline_limit")]
    pub inline_limit: u64,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            inline_limit: default_inline_limit(),
        }
    }
}

fn default_inline_limit() -> u64 {
    10 * 1024
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory, relative to the project root
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Public URL prefix for emitted files
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Optional entry-document template, relative to the project root
    #[serde(default)]
    pub template: Option<String>,

    /// Title used by the built-in entry document skeleton
    #[serde(default = "default_title")]
    pub title: String,

    /// Embed content hashes in production filenames
    #[serde(default = "default_true")]
    pub hash: bool,

    /// Write manifest.json mapping logical names to output paths
    #[serde(default = "default_true")]
    pub manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            public_url: default_public_url(),
            template: None,
            title: default_title(),
            hash: true,
            manifest: true,
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_public_url() -> String {
    "/".to_string()
}

fn default_title() -> String {
    "skein app".to_string()
}

fn default_true() -> bool {
    true
}

/// Production optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeConfig {
    /// Remove exports no importer reaches
    #[serde(default = "default_true")]
    pub tree_shaking: bool,

    /// Splice single-importer side-effect-free modules into their importer
    #[serde(default = "default_true")]
    pub concatenate: bool,

    /// Partition dynamic-import subtrees into separate chunks
    #[serde(default = "default_true")]
    pub split_chunks: bool,

    /// Strip comments/whitespace and shorten local identifiers
    #[serde(default = "default_true")]
    pub minify: bool,

    /// Diagnostic calls to strip during minification, e.g. "console.log".
    /// Lossy and therefore empty (disabled) by default.
    #[serde(default)]
    pub drop_calls: Vec<String>,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            tree_shaking: true,
            concatenate: true,
            split_chunks: true,
            minify: true,
            drop_calls: Vec::new(),
        }
    }
}

/// A directory copied verbatim into the output root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassthroughConfig {
    /// Source directory, relative to the project root
    pub from: String,

    /// Glob patterns to skip
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Port to run the dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Open browser automatically
    #[serde(default)]
    pub open: bool,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            open: false,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "localhost".to_string()
}
