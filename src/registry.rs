//! Collaborators the pipeline consults: bundle lookup, physical path resolution and
//! per-file change markers, plus a registry backed by bundle definition files.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Context;
use indexmap::IndexMap;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{CombinerError, Result};
use crate::models::{Bundle, BundleManifest};
use crate::urls::is_absolute_url;

/// Lookup of bundles by name.
pub trait BundleSource {
  /// Fetch a bundle, failing with a configuration error when the name is unknown.
  fn get_bundle(&self, name: &str) -> Result<Bundle>;
}

/// Maps a bundle's file reference to a local path.
pub trait AssetResolver {
  /// Returns `None` when the reference is not a local file and must be passed through.
  fn asset_path(&self, bundle: &Bundle, file: &str) -> Option<PathBuf>;
}

/// Produces the change marker recorded for a local file.
pub trait Fingerprint {
  /// Change marker for `path`; any change to the file should change the marker.
  fn fingerprint(&self, path: &Path) -> anyhow::Result<String>;
}

impl<F> Fingerprint for F
where
  F: Fn(&Path) -> anyhow::Result<String>,
{
  fn fingerprint(&self, path: &Path) -> anyhow::Result<String> {
    self(path)
  }
}

/// Uses the modification time of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtimeFingerprint;

impl Fingerprint for MtimeFingerprint {
  fn fingerprint(&self, path: &Path) -> anyhow::Result<String> {
    let modified = fs::metadata(path)
      .and_then(|meta| meta.modified())
      .with_context(|| format!("failed to read modification time of {}", path.display()))?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(format!(
      "{}.{:09}",
      since_epoch.as_secs(),
      since_epoch.subsec_nanos()
    ))
  }
}

/// Hashes the file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprint;

impl Fingerprint for ContentFingerprint {
  fn fingerprint(&self, path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("{:016x}", xxh3_64(&bytes)))
  }
}

/// Resolves references against the bundle's base path.
#[derive(Debug, Clone)]
pub struct BasePathResolver {
  fallback_root: PathBuf,
}

impl BasePathResolver {
  /// Bundles without a base path resolve against `fallback_root`.
  pub fn new(fallback_root: impl Into<PathBuf>) -> Self {
    Self {
      fallback_root: fallback_root.into(),
    }
  }
}

impl AssetResolver for BasePathResolver {
  fn asset_path(&self, bundle: &Bundle, file: &str) -> Option<PathBuf> {
    if is_absolute_url(file) {
      return None;
    }
    let root = bundle.base_path.as_deref().unwrap_or(&self.fallback_root);
    Some(root.join(file.trim_start_matches('/')))
  }
}

const DEFINITION_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// In-memory registry, usually filled from definition files on disk.
///
/// A discovered registry also loads definitions it did not list, so dependencies outside
/// the scanned part of the tree still resolve.
#[derive(Debug, Clone, Default)]
pub struct BundleRegistry {
  bundles: IndexMap<String, Bundle>,
  root: Option<PathBuf>,
}

impl BundleRegistry {
  /// Registry holding exactly the given bundles, keyed by their names.
  pub fn from_bundles(bundles: impl IntoIterator<Item = Bundle>) -> Self {
    Self {
      bundles: bundles
        .into_iter()
        .map(|bundle| (bundle.name.clone(), bundle))
        .collect(),
      root: None,
    }
  }

  /// Registry of the precombined bundles in a manifest written by a previous build.
  pub fn from_manifest(manifest: BundleManifest) -> Self {
    Self {
      bundles: manifest
        .bundles
        .into_iter()
        .map(|(name, entry)| {
          let bundle = entry.into_bundle(name.clone());
          (name, bundle)
        })
        .collect(),
      root: None,
    }
  }

  /// Load every bundle definition below `root`.
  ///
  /// Names are the definition's path relative to `root` without extension, using `/`.
  pub fn discover(root: &Path, recursive: bool) -> Result<Self> {
    let mut bundles = IndexMap::new();
    collect_definitions_recursively(root, Path::new(""), recursive, &mut bundles)?;
    bundles.sort_keys();
    debug!(root = %root.display(), count = bundles.len(), "discovered bundle definitions");
    Ok(Self {
      bundles,
      root: Some(root.to_path_buf()),
    })
  }

  /// Names of all listed bundles in registry order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.bundles.keys().map(String::as_str)
  }

  /// Number of known bundles.
  pub fn len(&self) -> usize {
    self.bundles.len()
  }

  /// Whether the registry is empty.
  pub fn is_empty(&self) -> bool {
    self.bundles.is_empty()
  }
}

impl BundleSource for BundleRegistry {
  fn get_bundle(&self, name: &str) -> Result<Bundle> {
    if let Some(bundle) = self.bundles.get(name) {
      return Ok(bundle.clone());
    }
    if let Some(bundle) = self.load_unlisted(name)? {
      return Ok(bundle);
    }
    Err(CombinerError::config(format!("unknown asset bundle '{name}'")))
  }
}

impl BundleRegistry {
  fn load_unlisted(&self, name: &str) -> Result<Option<Bundle>> {
    let Some(root) = &self.root else {
      return Ok(None);
    };
    let relative = Path::new(name);
    if !relative
      .components()
      .all(|component| matches!(component, Component::Normal(_)))
    {
      return Ok(None);
    }

    for extension in DEFINITION_EXTENSIONS {
      let path = root.join(format!("{name}.{extension}"));
      if !path.is_file() {
        continue;
      }
      debug!(bundle = %name, path = %path.display(), "loading unlisted bundle definition");
      return load_definition(&path, extension, name, root).map(Some);
    }
    Ok(None)
  }
}

fn collect_definitions_recursively(
  dir: &Path,
  relative_root: &Path,
  recursive: bool,
  bundles: &mut IndexMap<String, Bundle>,
) -> Result<()> {
  let entries = fs::read_dir(dir).map_err(|err| CombinerError::io(dir, err))?;
  for entry in entries {
    let entry = entry.map_err(|err| CombinerError::io(dir, err))?;
    let file_name = entry.file_name();
    let name_str = file_name.to_string_lossy();
    if name_str.starts_with('.') {
      continue;
    }

    let path = entry.path();
    let file_type = entry.file_type().map_err(|err| CombinerError::io(&path, err))?;
    let next_relative = relative_root.join(&file_name);

    if file_type.is_dir() {
      if recursive {
        collect_definitions_recursively(&path, &next_relative, recursive, bundles)?;
      }
      continue;
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    if !file_type.is_file() || !DEFINITION_EXTENSIONS.contains(&extension) {
      continue;
    }

    let name = next_relative
      .with_extension("")
      .to_string_lossy()
      .replace('\\', "/");
    if bundles.contains_key(&name) {
      warn!(bundle = %name, path = %path.display(), "duplicate bundle definition ignored");
      continue;
    }

    let bundle = load_definition(&path, extension, &name, dir)?;
    bundles.insert(name, bundle);
  }

  Ok(())
}

/// Join without touching the filesystem, folding `.` and `..` segments.
fn lexical_join(dir: &Path, relative: &Path) -> PathBuf {
  let mut joined = PathBuf::new();
  for component in dir.join(relative).components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !joined.pop() {
          joined.push(component);
        }
      }
      other => joined.push(other),
    }
  }
  joined
}

/// Read a definition and anchor its base path at the definition's directory.
fn load_definition(path: &Path, extension: &str, name: &str, fallback_dir: &Path) -> Result<Bundle> {
  let mut bundle = read_definition(path, extension)?;
  bundle.name = name.to_string();
  let definition_dir = path.parent().unwrap_or(fallback_dir);
  bundle.base_path = Some(match bundle.base_path.take() {
    Some(base) if base.is_absolute() => base,
    Some(base) => lexical_join(definition_dir, &base),
    None => definition_dir.to_path_buf(),
  });
  Ok(bundle)
}

fn read_definition(path: &Path, extension: &str) -> Result<Bundle> {
  let content = fs::read_to_string(path).map_err(|err| CombinerError::io(path, err))?;
  let parsed = if extension == "json" {
    serde_json::from_str(&content).map_err(|err| err.to_string())
  } else {
    serde_yaml::from_str(&content).map_err(|err| err.to_string())
  };
  parsed.map_err(|reason| CombinerError::Parse {
    path: path.to_path_buf(),
    reason,
  })
}
