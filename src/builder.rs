//! Precompile build: combines every discovered bundle ahead of time and writes the manifest
//! the page-time pipeline loads instead of resolving bundles on each request.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, info, warn};

use crate::collector::FileCollector;
use crate::combiner::Combiner;
use crate::config::CombinerConfig;
use crate::error::{CombinerError, Result};
use crate::models::{BundleManifest, FileSet, MediaType, ResolvedBundleEntry};
use crate::registry::{AssetResolver, BasePathResolver, BundleRegistry, BundleSource, Fingerprint};
use crate::resolver::{BundleGraph, PositionHint};

/// Flags of a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
  /// Also assemble bundles only reachable through `depends`.
  pub process_dependent: bool,
  /// Combine monoliths together with their dependency closure.
  pub precompile_monolith: bool,
  /// Names assembled in addition to the registry's bundles.
  pub extra_bundles: Vec<String>,
}

impl BuildOptions {
  /// Options taken from `config`.
  pub fn from_config(config: &CombinerConfig) -> Self {
    Self {
      process_dependent: config.process_dependent,
      precompile_monolith: config.precompile_monolith,
      extra_bundles: config.bundles.clone(),
    }
  }
}

/// What happened to one bundle during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
  /// At least one combined file was written.
  Created,
  /// Every combined file already existed.
  Unchanged,
  /// Folded into the named monolith and left out of the manifest.
  Absorbed(String),
  /// Assembling failed; the reason is the rendered error.
  Failed(String),
}

/// Per-bundle line of a [`BuildReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutcome {
  /// Bundle name.
  pub name: String,
  /// Result of assembling it.
  pub status: BundleStatus,
}

/// Summary of a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
  /// Outcomes in processing order.
  pub bundles: Vec<BundleOutcome>,
  /// Manifest path when it was written.
  pub artifact: Option<PathBuf>,
}

impl BuildReport {
  /// Whether any bundle failed.
  pub fn has_errors(&self) -> bool {
    self.failed().next().is_some()
  }

  /// Outcomes of failed bundles.
  pub fn failed(&self) -> impl Iterator<Item = &BundleOutcome> {
    self
      .bundles
      .iter()
      .filter(|outcome| matches!(outcome.status, BundleStatus::Failed(_)))
  }

  /// Status of a bundle by name.
  pub fn status(&self, name: &str) -> Option<&BundleStatus> {
    self
      .bundles
      .iter()
      .find(|outcome| outcome.name == name)
      .map(|outcome| &outcome.status)
  }
}

/// A bundle in its persisted form.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledBundle {
  /// Manifest entry.
  pub entry: ResolvedBundleEntry,
  /// Whether a combined file was written for it.
  pub changed: bool,
}

/// Assembles bundles from a registry into a [`BundleManifest`].
pub struct PrecompileBuilder {
  registry: BundleRegistry,
  combiner: Combiner,
  resolver: Box<dyn AssetResolver>,
  fingerprint: Box<dyn Fingerprint>,
  output_url: String,
  options: BuildOptions,
}

impl PrecompileBuilder {
  /// Builder over `registry` publishing outputs of `combiner` under `output_url`.
  pub fn new(
    registry: BundleRegistry,
    combiner: Combiner,
    resolver: Box<dyn AssetResolver>,
    fingerprint: Box<dyn Fingerprint>,
    output_url: impl Into<String>,
  ) -> Self {
    Self {
      registry,
      combiner,
      resolver,
      fingerprint,
      output_url: output_url.into(),
      options: BuildOptions::default(),
    }
  }

  /// Builder discovering bundle definitions under the configured assets directory.
  ///
  /// The manifest should not be written inside that directory, or a later run would
  /// discover it as a bundle definition.
  pub fn from_config(config: &CombinerConfig) -> Result<Self> {
    let registry = BundleRegistry::discover(&config.assets_dir, config.recursive)?;
    let output_dir = config.prepare_output_dir()?;
    Ok(
      Self::new(
        registry,
        Combiner::from_config(config, output_dir),
        Box::new(BasePathResolver::new(&config.assets_dir)),
        config.fingerprint.build(),
        config.output_url.clone(),
      )
      .with_options(BuildOptions::from_config(config)),
    )
  }

  /// Replace the build flags.
  pub fn with_options(mut self, options: BuildOptions) -> Self {
    self.options = options;
    self
  }

  /// Assemble every selected bundle and write the manifest to `config_file`.
  ///
  /// An existing manifest is removed first. When any bundle fails nothing is written, so
  /// the manifest on disk is either complete or absent.
  pub fn build(&self, config_file: &Path) -> Result<BuildReport> {
    remove_existing(config_file)?;

    let names = self.bundle_names()?;
    info!(count = names.len(), "assembling bundles");

    let mut report = BuildReport::default();
    let mut manifest = BundleManifest::default();
    let mut absorbed: IndexMap<String, String> = IndexMap::new();

    let (monoliths, rest): (Vec<&String>, Vec<&String>) =
      names.iter().partition(|name| self.is_precompiled_monolith(name));

    for name in monoliths.into_iter().chain(rest) {
      if let Some(owner) = absorbed.get(name.as_str()) {
        debug!(bundle = %name, monolith = %owner, "skipping bundle absorbed by monolith");
        report.bundles.push(BundleOutcome {
          name: name.clone(),
          status: BundleStatus::Absorbed(owner.clone()),
        });
        continue;
      }

      let status = match self.assemble_bundle(name) {
        Ok(assembled) => {
          for included in &assembled.entry.publish_options.acc_included {
            absorbed.entry(included.clone()).or_insert_with(|| name.clone());
          }
          manifest.bundles.insert(name.clone(), assembled.entry);
          if assembled.changed {
            info!(bundle = %name, "created output bundle");
            BundleStatus::Created
          } else {
            debug!(bundle = %name, "output bundle unchanged");
            BundleStatus::Unchanged
          }
        }
        Err(err) => {
          error!(bundle = %name, error = %err, "failed to create output bundle");
          BundleStatus::Failed(err.to_string())
        }
      };
      report.bundles.push(BundleOutcome {
        name: name.clone(),
        status,
      });
    }

    // A bundle assembled before a monolith absorbed it must not stay in the manifest either.
    for (name, owner) in &absorbed {
      manifest.bundles.shift_remove(name);
      for outcome in report.bundles.iter_mut().filter(|outcome| &outcome.name == name) {
        if matches!(outcome.status, BundleStatus::Created | BundleStatus::Unchanged) {
          outcome.status = BundleStatus::Absorbed(owner.clone());
        }
      }
    }
    redirect_absorbed(&mut manifest, &absorbed);

    if report.has_errors() {
      warn!("errors occurred during generation, configuration file was not created");
      return Ok(report);
    }

    write_manifest(config_file, &manifest)?;
    info!(path = %config_file.display(), "output bundle configuration created");
    report.artifact = Some(config_file.to_path_buf());
    Ok(report)
  }

  /// Discovered names plus extra names, de-duplicated, and optionally expanded with every
  /// bundle reachable through `depends`.
  pub fn bundle_names(&self) -> Result<Vec<String>> {
    let mut names: IndexSet<String> = self
      .registry
      .names()
      .map(str::to_string)
      .chain(self.options.extra_bundles.iter().cloned())
      .collect();

    if self.options.process_dependent {
      let mut graph = BundleGraph::new();
      let roots: Vec<String> = names.iter().cloned().collect();
      for name in &roots {
        graph.resolve(name, &self.registry, PositionHint::Suppressed)?;
      }
      names.extend(graph.order().iter().cloned());
    }

    Ok(names.into_iter().collect())
  }

  fn is_precompiled_monolith(&self, name: &str) -> bool {
    self.options.precompile_monolith
      && self
        .registry
        .get_bundle(name)
        .is_ok_and(|bundle| bundle.publish_options.monolith)
  }

  /// Combine one bundle into its persisted form.
  ///
  /// With monolith precompilation a monolith is combined together with its whole dependency
  /// closure and loses its `depends`; any other bundle contributes only its own files.
  pub fn assemble_bundle(&self, name: &str) -> Result<AssembledBundle> {
    let mut bundle = self.registry.get_bundle(name)?;
    bundle.name = name.to_string();
    let monolith = bundle.publish_options.monolith && self.options.precompile_monolith;

    let collector = FileCollector::new(self.resolver.as_ref(), self.fingerprint.as_ref());
    let mut files = FileSet::default();
    let mut included = BTreeSet::new();

    if monolith {
      let mut graph = BundleGraph::new();
      bundle = graph.resolve(name, &self.registry, PositionHint::Free)?.clone();
      let mut working = graph.into_bundles();
      included = working
        .keys()
        .filter(|member| member.as_str() != name)
        .cloned()
        .collect();
      collector.collect(name, &mut working, &mut files)?;
    } else {
      collector.collect_bundle_files(&bundle, &mut files)?;
    }

    let scripts = self.combiner.emit(&files, MediaType::Js)?;
    let styles = self.combiner.emit(&files, MediaType::Css)?;

    let mut publish_options = bundle.publish_options;
    publish_options.acc_processed = true;
    if monolith && !included.is_empty() {
      publish_options.acc_included = included;
    }

    Ok(AssembledBundle {
      changed: scripts.created() || styles.created(),
      entry: ResolvedBundleEntry {
        base_path: self.combiner.output_dir().to_path_buf(),
        base_url: self.output_url.clone(),
        js: scripts.references(),
        css: styles.references(),
        js_options: bundle.js_options,
        css_options: bundle.css_options,
        publish_options,
        depends: if monolith { Vec::new() } else { bundle.depends },
      },
    })
  }
}

/// Point every remaining `depends` entry at the monolith that absorbed it.
fn redirect_absorbed(manifest: &mut BundleManifest, absorbed: &IndexMap<String, String>) {
  if absorbed.is_empty() {
    return;
  }
  for (name, entry) in manifest.bundles.iter_mut() {
    let depends: IndexSet<String> = entry
      .depends
      .drain(..)
      .map(|dependency| absorbed.get(&dependency).cloned().unwrap_or(dependency))
      .filter(|dependency| dependency != name)
      .collect();
    entry.depends = depends.into_iter().collect();
  }
}

fn remove_existing(path: &Path) -> Result<()> {
  match fs::remove_file(path) {
    Ok(()) => {
      debug!(path = %path.display(), "removed previous configuration file");
      Ok(())
    }
    Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
    Err(err) => Err(CombinerError::io(path, err)),
  }
}

/// Write `manifest` through a temporary file in the target directory, then rename it.
fn write_manifest(path: &Path, manifest: &BundleManifest) -> Result<()> {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  fs::create_dir_all(dir).map_err(|err| CombinerError::io(dir, err))?;

  let json = serde_json::to_string_pretty(manifest)
    .map_err(|err| CombinerError::io(path, std::io::Error::from(err)))?;
  let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|err| CombinerError::io(dir, err))?;
  staged
    .write_all(json.as_bytes())
    .map_err(|err| CombinerError::io(staged.path(), err))?;
  staged
    .persist(path)
    .map_err(|err| CombinerError::io(path, err.error))?;
  Ok(())
}
