//! Data structures shared by the resolver, collector, combiner and build orchestration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CombinerError, Result};

/// Kind of asset a file list or combined output holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
  /// JavaScript.
  Js,
  /// Stylesheets.
  Css,
}

impl MediaType {
  /// File extension of combined outputs, without the dot.
  pub fn extension(self) -> &'static str {
    match self {
      Self::Js => "js",
      Self::Css => "css",
    }
  }
}

impl fmt::Display for MediaType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.extension())
  }
}

impl FromStr for MediaType {
  type Err = CombinerError;

  fn from_str(value: &str) -> Result<Self> {
    match value {
      "js" => Ok(Self::Js),
      "css" => Ok(Self::Css),
      other => Err(CombinerError::config(format!("invalid filter type: {other}"))),
    }
  }
}

/// Options attached to a bundle's `<script>` tags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JsOptions {
  /// Load-position hint; lower positions load earlier.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<u32>,
  /// Any other tag attributes, passed through untouched.
  #[serde(flatten)]
  pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Options attached to a bundle's `<link>` tags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CssOptions {
  /// Tag attributes such as `media`, passed through untouched.
  #[serde(flatten)]
  pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Publishing flags that steer monolith handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
  /// Combine this bundle with its whole dependency closure into one output.
  #[serde(default)]
  pub monolith: bool,
  /// The bundle's file lists already point at combined outputs.
  #[serde(default)]
  pub acc_processed: bool,
  /// Bundles folded into this bundle's combined output.
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub acc_included: BTreeSet<String>,
}

/// A named group of JavaScript and CSS files with dependencies on other bundles.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
  /// Unique bundle name. Definition files leave it out; discovery fills it in.
  #[serde(default, skip_serializing)]
  pub name: String,
  /// Directory local file references are resolved against.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_path: Option<PathBuf>,
  /// Public URL matching `base_path`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_url: Option<String>,
  /// JavaScript references in load order; local paths or absolute URLs.
  #[serde(default)]
  pub js: Vec<String>,
  /// Stylesheet references in load order; local paths or absolute URLs.
  #[serde(default)]
  pub css: Vec<String>,
  /// Names of bundles that must load before this one.
  #[serde(default)]
  pub depends: Vec<String>,
  /// Script tag options.
  #[serde(default)]
  pub js_options: JsOptions,
  /// Stylesheet tag options.
  #[serde(default)]
  pub css_options: CssOptions,
  /// Monolith flags.
  #[serde(default)]
  pub publish_options: PublishOptions,
}

impl Bundle {
  /// Create an empty bundle with the given name.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  /// Set the directory local references resolve against.
  pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
    self.base_path = Some(base_path.into());
    self
  }

  /// Append a JavaScript reference.
  pub fn with_js(mut self, file: impl Into<String>) -> Self {
    self.js.push(file.into());
    self
  }

  /// Append a stylesheet reference.
  pub fn with_css(mut self, file: impl Into<String>) -> Self {
    self.css.push(file.into());
    self
  }

  /// Append a dependency.
  pub fn depends_on(mut self, name: impl Into<String>) -> Self {
    self.depends.push(name.into());
    self
  }

  /// Set the JavaScript load-position hint.
  pub fn with_position(mut self, position: u32) -> Self {
    self.js_options.position = Some(position);
    self
  }

  /// Mark the bundle as a monolith.
  pub fn monolith(mut self) -> Self {
    self.publish_options.monolith = true;
    self
  }

  /// References of the given media type.
  pub fn files(&self, media: MediaType) -> &[String] {
    match media {
      MediaType::Js => &self.js,
      MediaType::Css => &self.css,
    }
  }

  /// Whether the bundle is a precombined monolith that can be registered as is.
  pub fn is_precombined(&self) -> bool {
    self.publish_options.monolith && self.publish_options.acc_processed && self.depends.is_empty()
  }
}

/// Files gathered while walking a bundle and its dependencies.
///
/// A fingerprint is empty exactly when the matching local list is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
  /// Local JavaScript paths in emission order.
  pub js: Vec<PathBuf>,
  /// Local stylesheet paths in emission order.
  pub css: Vec<PathBuf>,
  /// JavaScript references that are not local files.
  pub external_js: Vec<String>,
  /// Stylesheet references that are not local files.
  pub external_css: Vec<String>,
  /// Order-sensitive change markers of `js`.
  pub js_fingerprint: String,
  /// Order-sensitive change markers of `css`.
  pub css_fingerprint: String,
}

impl FileSet {
  /// Local paths of the given media type.
  pub fn local(&self, media: MediaType) -> &[PathBuf] {
    match media {
      MediaType::Js => &self.js,
      MediaType::Css => &self.css,
    }
  }

  /// External references of the given media type.
  pub fn external(&self, media: MediaType) -> &[String] {
    match media {
      MediaType::Js => &self.external_js,
      MediaType::Css => &self.external_css,
    }
  }

  /// Fingerprint of the given media type.
  pub fn fingerprint(&self, media: MediaType) -> &str {
    match media {
      MediaType::Js => &self.js_fingerprint,
      MediaType::Css => &self.css_fingerprint,
    }
  }

  /// Append a local file together with its change marker.
  pub fn push_local(&mut self, media: MediaType, path: PathBuf, marker: &str) {
    let (files, fingerprint) = match media {
      MediaType::Js => (&mut self.js, &mut self.js_fingerprint),
      MediaType::Css => (&mut self.css, &mut self.css_fingerprint),
    };
    files.push(path);
    fingerprint.push('|');
    fingerprint.push_str(marker);
  }

  /// Append a passthrough reference.
  pub fn push_external(&mut self, media: MediaType, reference: String) {
    match media {
      MediaType::Js => self.external_js.push(reference),
      MediaType::Css => self.external_css.push(reference),
    }
  }

  /// Whether the set holds local files worth combining for `media`.
  pub fn has_local(&self, media: MediaType) -> bool {
    !self.local(media).is_empty() && !self.fingerprint(media).is_empty()
  }
}

/// Persisted, already-combined form of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBundleEntry {
  /// Directory holding the combined outputs.
  pub base_path: PathBuf,
  /// Public URL of `base_path`.
  pub base_url: String,
  /// External scripts followed by the combined script, if any.
  pub js: Vec<String>,
  /// External stylesheets followed by the combined stylesheet, if any.
  pub css: Vec<String>,
  /// Original script options.
  pub js_options: JsOptions,
  /// Original stylesheet options.
  pub css_options: CssOptions,
  /// Publish options with `accProcessed` set.
  pub publish_options: PublishOptions,
  /// Remaining dependencies; empty for monoliths.
  pub depends: Vec<String>,
}

impl ResolvedBundleEntry {
  /// Turn the persisted record back into a bundle whose files are the combined outputs.
  pub fn into_bundle(self, name: impl Into<String>) -> Bundle {
    Bundle {
      name: name.into(),
      base_path: Some(self.base_path),
      base_url: Some(self.base_url),
      js: self.js,
      css: self.css,
      depends: self.depends,
      js_options: self.js_options,
      css_options: self.css_options,
      publish_options: self.publish_options,
    }
  }
}

/// The artifact written by a successful build, keyed by bundle name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BundleManifest {
  /// Resolved entries in build order.
  pub bundles: IndexMap<String, ResolvedBundleEntry>,
}

impl BundleManifest {
  /// Read a manifest written by a previous build.
  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path).map_err(|err| CombinerError::io(path, err))?;
    serde_json::from_str(&content).map_err(|err| CombinerError::Parse {
      path: path.to_path_buf(),
      reason: err.to_string(),
    })
  }
}
