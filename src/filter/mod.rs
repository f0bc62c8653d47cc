//! Pluggable filters that merge an ordered file list into one output file.
//!
//! A filter reports success through its return value, but the combiner only trusts the
//! presence of the output file afterwards. Filters that run external tools never rely on the
//! tool's exit status.

mod concat;
mod css;
mod external;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CombinerError, Result};

pub use concat::ConcatFilter;
pub use css::CssFilter;
pub use external::{UglifyCssFilter, UglifyCssOptions, UglifyJsFilter, UglifyJsOptions};

/// Merges files into `output`.
pub trait Filter {
  /// Name used in logs and errors.
  fn name(&self) -> &str;

  /// Merge `files`, in order, into `output`. `Ok(false)` signals failure.
  fn process(&self, files: &[PathBuf], output: &Path) -> anyhow::Result<bool>;
}

/// Locations filters need besides their own options.
#[derive(Debug, Clone)]
pub struct FilterContext {
  /// Document root, stripped from provenance comments.
  pub web_root: PathBuf,
  /// Public URL of the document root, used as source-map root.
  pub web_url: String,
}

/// Filter selection as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterConfig {
  /// Plain concatenation with a provenance comment per file.
  Concat,
  /// Stylesheet concatenation with URL rewriting and import hoisting.
  Css,
  /// External UglifyJS-compatible minifier.
  Uglifyjs(UglifyJsOptions),
  /// External UglifyCSS-compatible minifier.
  Uglifycss(UglifyCssOptions),
}

impl FilterConfig {
  /// Filter with default options by type name.
  pub fn from_name(name: &str) -> Result<Self> {
    match name {
      "concat" => Ok(Self::Concat),
      "css" => Ok(Self::Css),
      "uglifyjs" => Ok(Self::Uglifyjs(UglifyJsOptions::default())),
      "uglifycss" => Ok(Self::Uglifycss(UglifyCssOptions::default())),
      other => Err(CombinerError::config(format!("invalid filter type: {other}"))),
    }
  }

  /// Instantiate the configured filter.
  pub fn build(&self, context: &FilterContext) -> Box<dyn Filter> {
    match self {
      Self::Concat => Box::new(ConcatFilter::new(&context.web_root)),
      Self::Css => Box::new(CssFilter::new(&context.web_root)),
      Self::Uglifyjs(options) => Box::new(UglifyJsFilter::new(options.clone(), context.clone())),
      Self::Uglifycss(options) => Box::new(UglifyCssFilter::new(options.clone(), context.clone())),
    }
  }
}

/// `file` relative to `web_root` with a leading slash, or the full path outside of it.
pub(crate) fn provenance(file: &Path, web_root: &Path) -> String {
  match file.strip_prefix(web_root) {
    Ok(relative) => format!("/{}", relative.to_string_lossy().replace('\\', "/")),
    Err(_) => file.display().to_string(),
  }
}
