//! Combiner configuration loader describing output layout and build behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{CombinerError, Result};
use crate::filter::FilterConfig;
use crate::registry::{ContentFingerprint, Fingerprint, MtimeFingerprint};

const DEFAULT_CONFIG_FILE: &str = "asset-combiner.json";

/// Which change marker is recorded per local file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
  /// File modification time.
  #[default]
  Mtime,
  /// Hash of the file contents.
  Content,
}

impl FingerprintKind {
  /// Instantiate the matching fingerprint function.
  pub fn build(self) -> Box<dyn Fingerprint> {
    match self {
      Self::Mtime => Box::new(MtimeFingerprint),
      Self::Content => Box::new(ContentFingerprint),
    }
  }
}

/// Discoverable configuration for combining bundles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombinerConfig {
  /// Directory combined files are written to.
  pub output_path: PathBuf,
  /// Public URL of `output_path`.
  pub output_url: String,
  /// Document root; stripped from provenance comments and used for source-map prefixes.
  pub web_root: PathBuf,
  /// Public URL of `web_root`.
  pub web_url: String,
  /// Hash full file paths into output names. When false only basenames are used.
  pub use_file_path_for_hash: bool,
  /// Change marker recorded per file.
  pub fingerprint: FingerprintKind,
  /// Salt mixed into both name digests so incompatible builds never share outputs.
  pub build_tag: String,
  /// Filter used for JavaScript.
  pub filter_js: FilterConfig,
  /// Filter used for stylesheets.
  pub filter_css: FilterConfig,
  /// Directory scanned for bundle definition files.
  pub assets_dir: PathBuf,
  /// Descend into sub-directories of `assets_dir`.
  pub recursive: bool,
  /// Also process bundles only reachable through `depends`.
  pub process_dependent: bool,
  /// Combine monolith bundles together with their dependency closure.
  pub precompile_monolith: bool,
  /// Additional bundle names to process, found under `assets_dir` even when not discovered.
  pub bundles: Vec<String>,
}

impl Default for CombinerConfig {
  fn default() -> Self {
    Self {
      output_path: "web/assets/ac".into(),
      output_url: "/assets/ac".into(),
      web_root: "web".into(),
      web_url: "/".into(),
      use_file_path_for_hash: true,
      fingerprint: FingerprintKind::default(),
      build_tag: env!("CARGO_PKG_VERSION").into(),
      filter_js: FilterConfig::Concat,
      filter_css: FilterConfig::Css,
      assets_dir: "assets".into(),
      recursive: true,
      process_dependent: false,
      precompile_monolith: false,
      bundles: Vec::new(),
    }
  }
}

impl CombinerConfig {
  /// Attempt to load configuration from the provided directory.
  ///
  /// A missing configuration file yields the defaults. So does a broken one, with a warning.
  pub fn discover(dir: &Path) -> Self {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    if !candidate.exists() {
      return Self::default();
    }
    Self::from_path(&candidate).unwrap_or_else(|err| {
      warn!(path = %candidate.display(), error = %err, "ignoring unusable configuration file, using defaults");
      Self::default()
    })
  }

  /// Read configuration from a specific JSON file.
  pub fn from_path(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path).map_err(|err| CombinerError::io(path, err))?;
    serde_json::from_str(&content).map_err(|err| CombinerError::Parse {
      path: path.to_path_buf(),
      reason: err.to_string(),
    })
  }

  /// Resolve every relative directory against `base`.
  pub fn rebase(mut self, base: &Path) -> Self {
    self.output_path = base.join(&self.output_path);
    self.web_root = base.join(&self.web_root);
    self.assets_dir = base.join(&self.assets_dir);
    self
  }

  /// Create the output directory and make sure it can be written to.
  pub fn prepare_output_dir(&self) -> Result<PathBuf> {
    fs::create_dir_all(&self.output_path).map_err(|err| {
      CombinerError::config(format!(
        "failed to create directory {}: {err}",
        self.output_path.display()
      ))
    })?;

    let metadata = fs::metadata(&self.output_path)
      .map_err(|err| CombinerError::io(&self.output_path, err))?;
    if metadata.permissions().readonly() {
      return Err(CombinerError::config(format!(
        "the directory is not writable: {}",
        self.output_path.display()
      )));
    }

    fs::canonicalize(&self.output_path).map_err(|err| CombinerError::io(&self.output_path, err))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn discover_falls_back_to_defaults() {
    let temp = tempdir().unwrap();
    let config = CombinerConfig::discover(temp.path());
    assert_eq!(config.output_url, "/assets/ac");
    assert!(config.use_file_path_for_hash);
    assert_eq!(config.filter_js, FilterConfig::Concat);
    assert_eq!(config.build_tag, env!("CARGO_PKG_VERSION"));
  }

  #[test]
  fn reads_partial_configuration() {
    let temp = tempdir().unwrap();
    fs::write(
      temp.path().join(DEFAULT_CONFIG_FILE),
      r#"{
        "outputPath": "public/ac",
        "fingerprint": "content",
        "precompileMonolith": true,
        "filterJs": {"type": "uglifyjs", "compress": true}
      }"#,
    )
    .unwrap();

    let config = CombinerConfig::discover(temp.path());
    assert_eq!(config.output_path, PathBuf::from("public/ac"));
    assert_eq!(config.fingerprint, FingerprintKind::Content);
    assert!(config.precompile_monolith);
    assert!(config.recursive);
    assert!(matches!(config.filter_js, FilterConfig::Uglifyjs(ref opts) if opts.compress));
  }

  #[test]
  fn discover_ignores_malformed_file() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join(DEFAULT_CONFIG_FILE), r#"{"outputPath": "public/ac",}"#).unwrap();

    let config = CombinerConfig::discover(temp.path());
    assert_eq!(config.output_path, PathBuf::from("web/assets/ac"));
  }

  #[test]
  fn from_path_reports_parse_errors() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = CombinerConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, CombinerError::Parse { .. }));
  }

  #[test]
  fn prepare_output_dir_creates_missing_directories() {
    let temp = tempdir().unwrap();
    let config = CombinerConfig::default().rebase(temp.path());

    let output = config.prepare_output_dir().unwrap();
    assert!(output.is_dir());
    assert!(output.ends_with("web/assets/ac"));
  }
}
