//! Build error taxonomy
//!
//! Every variant is fatal to the build as a whole: the pipeline aborts on
//! the first error and no partial output is published.

use std::path::PathBuf;

use thiserror::Error;

/// An import specifier could not be mapped to a file on disk.
#[derive(Debug, Error)]
#[error("cannot resolve '{specifier}' from {}", from_dir.display())]
pub struct ResolveError {
    /// The specifier as written in the source
    pub specifier: String,

    /// Directory the import was resolved against
    pub from_dir: PathBuf,
}

/// A transform chain stage rejected its input. Partial output from
/// earlier stages is discarded.
#[derive(Debug, Error)]
#[error("transform stage '{stage}' failed: {cause}")]
pub struct TransformError {
    /// Name of the failing stage
    pub stage: String,

    /// Stage-reported failure reason
    pub cause: String,
}

/// A module-level failure with graph context attached.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: ResolveError,
    },

    #[error("{}: {source}", path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: TransformError,
    },

    #[error("{}: {message}", path.display())]
    Module { path: PathBuf, message: String },
}

impl BuildError {
    /// Path of the module the build failed on
    pub fn path(&self) -> &PathBuf {
        match self {
            BuildError::Resolve { path, .. }
            | BuildError::Transform { path, .. }
            | BuildError::Module { path, .. } => path,
        }
    }
}

/// A failure while writing the output set.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {} -> {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to clear output root {}: {source}", path.display())]
    Clear {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read entry template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_path_and_stage() {
        let err = BuildError::Transform {
            path: PathBuf::from("/proj/src/app.ts"),
            source: TransformError {
                stage: "strip-types".to_string(),
                cause: "unbalanced braces".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("/proj/src/app.ts"));

        let inner = std::error::Error::source(&err).unwrap().to_string();
        assert!(inner.contains("strip-types"));
        assert!(inner.contains("unbalanced braces"));
    }
}
