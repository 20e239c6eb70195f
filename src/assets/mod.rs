//! Asset classification
//!
//! Decides whether a matched file is inlined as a data URI or emitted as a
//! standalone, content-hashed file. Files with zero matching rules pass
//! through here unchanged as emitted bytes.

use std::path::Path;

use crate::config::Config;
use crate::graph::ModuleKind;
use crate::rules::MatchedRules;
use crate::utils;

/// Classification outcome for one file
#[derive(Debug, Clone, PartialEq)]
pub enum AssetOutput {
    /// Content encoded as a data URI, no file written
    Inline(String),
    /// Standalone file at a hash-bearing destination under the output root
    Emit {
        /// Root-relative destination, e.g. `static/image/logo.1a2b3c4d.png`
        dest: String,
        bytes: Vec<u8>,
    },
}

impl AssetOutput {
    /// The URL importing modules receive for this asset
    pub fn url(&self, config: &Config) -> String {
        match self {
            AssetOutput::Inline(uri) => uri.clone(),
            AssetOutput::Emit { dest, .. } => config.public_path(dest),
        }
    }
}

/// Classify one file's content against its effective rule.
///
/// Inline when the rule declares inline eligibility and the content is
/// below the configured threshold; emit otherwise. The destination path
/// embeds a content hash so identical bytes always land on the same name.
pub fn classify(
    config: &Config,
    path: &Path,
    kind: ModuleKind,
    matched: &MatchedRules<'_>,
    bytes: &[u8],
) -> AssetOutput {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_lowercase();

    let inline_eligible = matched.inline_eligible();
    if inline_eligible && (bytes.len() as u64) < config.assets.inline_limit {
        return AssetOutput::Inline(utils::data_uri(utils::mime_for_ext(&ext), bytes));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");

    AssetOutput::Emit {
        dest: format!(
            "static/{}/{}",
            kind.asset_dir(),
            utils::hash_filename(stem, bytes, &ext)
        ),
        bytes: bytes.to_vec(),
    }
}
