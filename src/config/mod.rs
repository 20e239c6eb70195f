//! Configuration handling
//!
//! Parses and validates skein.toml. The loaded [`Config`] is immutable for
//! the duration of one build and is passed by `Arc` to every component;
//! there is no cross-build mutable state.

mod schema;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use schema::*;

/// Build mode flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No optimizer pass, plain filenames, style-injected CSS
    Development,
    /// Full optimizer pass plus passthrough copy
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project metadata
    pub project: ProjectConfig,

    /// Entry points: logical name -> root-relative path
    #[serde(default)]
    pub entrypoints: BTreeMap<String, String>,

    /// Module resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// File-type rules, evaluated in declaration order.
    /// Empty means the built-in rule table applies.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Asset classification settings
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Production optimizer settings
    #[serde(default)]
    pub optimize: OptimizeConfig,

    /// Directories copied verbatim into the output root
    #[serde(default)]
    pub passthrough: Vec<PassthroughConfig>,

    /// Development server settings
    #[serde(default)]
    pub dev: DevConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config =
            toml::from_str(&content).with_context(|| "failed to parse skein.toml")?;

        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        if config.rules.is_empty() {
            config.rules = default_rules();
        }

        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration (used by tests)
    pub fn default_config() -> Self {
        Self {
            project: ProjectConfig {
                name: "my-app".to_string(),
                version: "0.1.0".to_string(),
            },
            entrypoints: {
                let mut map = BTreeMap::new();
                map.insert("main".to_string(), "src/main.js".to_string());
                map
            },
            resolve: ResolveConfig::default(),
            rules: default_rules(),
            assets: AssetsConfig::default(),
            output: OutputConfig::default(),
            optimize: OptimizeConfig::default(),
            passthrough: Vec::new(),
            dev: DevConfig::default(),
            root: PathBuf::from("."),
        }
    }

    /// Validate the configuration. Malformed values are rejected here,
    /// never clamped.
    fn validate(&self) -> Result<()> {
        if self.entrypoints.is_empty() {
            anyhow::bail!("at least one entrypoint must be specified in skein.toml");
        }

        for (name, path) in &self.entrypoints {
            let full_path = self.root.join(path);
            if !full_path.exists() {
                anyhow::bail!(
                    "entrypoint '{}' points to non-existent file: {}",
                    name,
                    full_path.display()
                );
            }
        }

        if self.assets.inline_limit == 0 || self.assets.inline_limit > 64 * 1024 * 1024 {
            anyhow::bail!(
                "assets.inline_limit must be between 1 byte and 64 MiB, got {}",
                self.assets.inline_limit
            );
        }

        if self.resolve.extensions.is_empty() {
            anyhow::bail!("resolve.extensions must not be empty");
        }

        // Rule predicates must compile and every stage name must be known.
        crate::rules::RuleSet::compile(&self.rules)?;
        for rule in &self.rules {
            for stage in &rule.chain {
                if !crate::transform::stage_exists(stage) {
                    anyhow::bail!("rule '{}' names unknown transform stage '{}'", rule.pattern, stage);
                }
            }
        }

        for dir in &self.passthrough {
            let full = self.root.join(&dir.from);
            if !full.is_dir() {
                anyhow::bail!("passthrough directory does not exist: {}", full.display());
            }
        }

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// Get all entrypoint paths in stable name order
    pub fn all_entrypoints(&self) -> Vec<(String, PathBuf)> {
        self.entrypoints
            .iter()
            .map(|(name, path)| (name.clone(), self.root.join(path)))
            .collect()
    }

    /// Public URL for a path under the output root
    pub fn public_path(&self, rel: &str) -> String {
        let base = self.output.public_url.trim_end_matches('/');
        format!("{}/{}", base, rel)
    }
}

/// Built-in rule table, applied when skein.toml declares no rules.
pub fn default_rules() -> Vec<RuleConfig> {
    let rule = |pattern: &str, chain: &[&str], kind: OutputKind, inline: bool| RuleConfig {
        pattern: pattern.to_string(),
        include: None,
        exclude: Some("node_modules".to_string()),
        chain: chain.iter().map(|s| s.to_string()).collect(),
        kind,
        inline,
        options: toml::Table::new(),
    };

    vec![
        rule(r"\.tsx?$", &["strip-types", "lower"], OutputKind::Inline, false),
        rule(r"\.m?js$", &["lower"], OutputKind::Inline, false),
        rule(r"\.css$", &["css"], OutputKind::ExtractCss, false),
        rule(r"\.json$", &["json"], OutputKind::Inline, false),
        rule(r"\.(png|jpe?g|bmp|gif|webp|svg)$", &[], OutputKind::Asset, true),
        rule(r"\.(woff2?|eot|ttf|otf)$", &[], OutputKind::Asset, false),
        rule(r"\.(mp3|mp4|webm)$", &[], OutputKind::Asset, false),
    ]
}
