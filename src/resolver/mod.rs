//! Module resolution
//!
//! Maps import specifiers to files on disk: alias substitution first, then
//! extension probing in configured order, then directory-index fallback.
//! Also extracts the static and dynamic import specifiers from a module's
//! source.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::error::ResolveError;

/// Static imports, exports-from, and require calls
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:import|export)\s+(?:(?:\{[^}]*\}|\*\s+as\s+\w+|[\w$]+(?:\s*,\s*\{[^}]*\})?)\s+from\s+)?["']([^"']+)["']|require\s*\(\s*["']([^"']+)["']\s*\)"#,
    )
    .unwrap()
});

/// Dynamic (lazy) imports: `import("...")`
static DYNAMIC_IMPORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

/// Import specifiers found in one module, in source declaration order
#[derive(Debug, Default, PartialEq)]
pub struct ExtractedImports {
    pub static_specifiers: Vec<String>,
    pub dynamic_specifiers: Vec<String>,
}

/// Extract static and dynamic import specifiers from source code.
/// A specifier imported both ways is kept on the static side only,
/// since the eager edge subsumes the lazy one.
pub fn extract_imports(source: &str) -> ExtractedImports {
    let mut imports = ExtractedImports::default();

    for cap in IMPORT_REGEX.captures_iter(source) {
        if let Some(specifier) = cap.get(1).or_else(|| cap.get(2)) {
            let spec = specifier.as_str().to_string();
            if !imports.static_specifiers.contains(&spec) {
                imports.static_specifiers.push(spec);
            }
        }
    }

    for cap in DYNAMIC_IMPORT_REGEX.captures_iter(source) {
        if let Some(specifier) = cap.get(1) {
            let spec = specifier.as_str().to_string();
            if !imports.static_specifiers.contains(&spec)
                && !imports.dynamic_specifiers.contains(&spec)
            {
                imports.dynamic_specifiers.push(spec);
            }
        }
    }

    imports
}

/// Module resolver
pub struct Resolver {
    config: Arc<Config>,
}

impl Resolver {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Whether a specifier names an external package the build leaves
    /// untouched (a bare specifier with no matching alias).
    pub fn is_external(&self, specifier: &str) -> bool {
        if specifier.starts_with('.') || specifier.starts_with('/') {
            return false;
        }
        !self.has_alias(specifier)
    }

    /// Resolve an import specifier to an absolute file path
    pub fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError> {
        debug!("resolving '{}' from '{}'", specifier, from_dir.display());

        let candidate = if let Some(aliased) = self.apply_alias(specifier) {
            aliased
        } else if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else {
            from_dir.join(specifier)
        };

        self.probe(&candidate).ok_or_else(|| ResolveError {
            specifier: specifier.to_string(),
            from_dir: from_dir.to_path_buf(),
        })
    }

    fn has_alias(&self, specifier: &str) -> bool {
        self.config.resolve.alias.keys().any(|token| {
            specifier == token || specifier.starts_with(&format!("{}/", token))
        })
    }

    /// Substitute a configured alias token for its base directory.
    /// Longest token wins when several match.
    fn apply_alias(&self, specifier: &str) -> Option<PathBuf> {
        let mut best: Option<(&String, &String)> = None;
        for (token, target) in &self.config.resolve.alias {
            let hit = specifier == token.as_str()
                || specifier.starts_with(&format!("{}/", token));
            if hit && best.map_or(true, |(t, _)| token.len() > t.len()) {
                best = Some((token, target));
            }
        }

        let (token, target) = best?;
        let rest = specifier[token.len()..].trim_start_matches('/');
        let base = self.config.root.join(target);
        Some(if rest.is_empty() { base } else { base.join(rest) })
    }

    /// Probe for an existing file: exact path, then appended extensions in
    /// configured order, then `index.<ext>` for directories.
    fn probe(&self, candidate: &Path) -> Option<PathBuf> {
        if candidate.is_file() {
            return Some(candidate.to_path_buf());
        }

        for ext in &self.config.resolve.extensions {
            let with_ext = PathBuf::from(format!("{}.{}", candidate.display(), ext));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        if candidate.is_dir() {
            for ext in &self.config.resolve.extensions {
                let index = candidate.join(format!("index.{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config(root: &Path) -> Arc<Config> {
        let mut config = Config::default_config();
        config.root = root.to_path_buf();
        config
            .resolve
            .alias
            .insert("@".to_string(), "src".to_string());
        Arc::new(config)
    }

    #[test]
    fn test_extract_static_imports() {
        let source = r#"
            import foo from './foo';
            import { bar } from './bar.js';
            import * as baz from '../baz';
            export { qux } from './qux';
            const x = require('./x');
        "#;

        let imports = extract_imports(source);
        assert_eq!(
            imports.static_specifiers,
            vec!["./foo", "./bar.js", "../baz", "./qux", "./x"]
        );
        assert!(imports.dynamic_specifiers.is_empty());
    }

    #[test]
    fn test_extract_dynamic_imports() {
        let source = r#"
            const page = import('./pages/Home');
            const other = import("./other");
        "#;

        let imports = extract_imports(source);
        assert!(imports.static_specifiers.is_empty());
        assert_eq!(imports.dynamic_specifiers, vec!["./pages/Home", "./other"]);
    }

    #[test]
    fn test_static_edge_subsumes_dynamic() {
        let source = r#"
            import a from './a';
            const later = import('./a');
        "#;

        let imports = extract_imports(source);
        assert_eq!(imports.static_specifiers, vec!["./a"]);
        assert!(imports.dynamic_specifiers.is_empty());
    }

    #[test]
    fn test_extension_probing_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/util.ts"), "").unwrap();
        fs::write(dir.path().join("src/util.js"), "").unwrap();

        let resolver = Resolver::new(test_config(dir.path()));
        // "ts" precedes "js" in the default search order
        let resolved = resolver.resolve("./util", &dir.path().join("src")).unwrap();
        assert_eq!(resolved, dir.path().join("src/util.ts"));
    }

    #[test]
    fn test_directory_index_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/router")).unwrap();
        fs::write(dir.path().join("src/router/index.ts"), "").unwrap();

        let resolver = Resolver::new(test_config(dir.path()));
        let resolved = resolver.resolve("./router", &dir.path().join("src")).unwrap();
        assert_eq!(resolved, dir.path().join("src/router/index.ts"));
    }

    #[test]
    fn test_alias_substitution() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/pages")).unwrap();
        fs::write(dir.path().join("src/pages/Home.ts"), "").unwrap();

        let resolver = Resolver::new(test_config(dir.path()));
        let resolved = resolver
            .resolve("@/pages/Home", &dir.path().join("somewhere/else"))
            .unwrap();
        assert_eq!(resolved, dir.path().join("src/pages/Home.ts"));
    }

    #[test]
    fn test_unresolvable_specifier_fails() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(test_config(dir.path()));

        let err = resolver.resolve("./missing", dir.path()).unwrap_err();
        assert!(err.to_string().contains("./missing"));
    }

    #[test]
    fn test_bare_specifiers_are_external() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(test_config(dir.path()));

        assert!(resolver.is_external("vue"));
        assert!(resolver.is_external("vue-router"));
        assert!(!resolver.is_external("./local"));
        assert!(!resolver.is_external("@/pages/Home"));
    }
}
