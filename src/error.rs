//! Error kinds raised while resolving, collecting and combining bundles.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CombinerError>;

/// Failures surfaced by the bundle pipeline.
#[derive(Debug, Error)]
pub enum CombinerError {
  /// The `depends` graph contains a cycle passing through `bundle`.
  #[error("a circular dependency is detected for bundle '{bundle}'")]
  CircularDependency {
    /// Bundle that was reached again while still being resolved.
    bundle: String,
  },

  /// Unknown bundle, invalid filter type, incompatible position or unusable output directory.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// A filter reported failure or did not produce its output file.
  #[error("failed to process files with filter '{filter}' into {}: {reason}", output.display())]
  Filter {
    /// Name of the filter that failed.
    filter: String,
    /// Output file the filter was asked to produce.
    output: PathBuf,
    /// Rendered cause chain.
    reason: String,
  },

  /// Filesystem access failed.
  #[error("failed to access {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },

  /// The fingerprint function could not produce a change marker.
  #[error("failed to fingerprint {}: {reason}", path.display())]
  Fingerprint {
    /// File being fingerprinted.
    path: PathBuf,
    /// Rendered cause chain.
    reason: String,
  },

  /// A definition or configuration file could not be parsed.
  #[error("failed to parse {}: {reason}", path.display())]
  Parse {
    /// Path that caused the error.
    path: PathBuf,
    /// Parser message.
    reason: String,
  },
}

impl CombinerError {
  /// Shorthand for [`CombinerError::Configuration`].
  pub fn config(message: impl Into<String>) -> Self {
    Self::Configuration(message.into())
  }

  /// Wrap an I/O error with the path it concerns.
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }

  /// Build a filter failure from an `anyhow` chain.
  pub fn filter(filter: &str, output: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
    Self::Filter {
      filter: filter.to_string(),
      output: output.into(),
      reason: reason.to_string(),
    }
  }
}
