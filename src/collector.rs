//! Gathering of local and external files from bundles in dependency-first order.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{CombinerError, Result};
use crate::models::{Bundle, FileSet, MediaType};
use crate::registry::{AssetResolver, Fingerprint};

/// Working set of bundles still waiting to contribute their files.
pub type WorkingSet = IndexMap<String, Bundle>;

/// Walks bundles and appends their files to a shared [`FileSet`].
pub struct FileCollector<'a> {
  resolver: &'a dyn AssetResolver,
  fingerprint: &'a dyn Fingerprint,
}

enum Step {
  Enter(String),
  Emit(Bundle),
}

impl<'a> FileCollector<'a> {
  /// Collector resolving references with `resolver` and marking files with `fingerprint`.
  pub fn new(resolver: &'a dyn AssetResolver, fingerprint: &'a dyn Fingerprint) -> Self {
    Self {
      resolver,
      fingerprint,
    }
  }

  /// Collect `name` after its dependencies, removing every visited bundle from `working_set`.
  ///
  /// Bundles that are no longer in the working set are skipped, so each bundle contributes
  /// its files at most once however many times it is reached.
  pub fn collect(&self, name: &str, working_set: &mut WorkingSet, files: &mut FileSet) -> Result<()> {
    let mut stack = vec![Step::Enter(name.to_string())];

    while let Some(step) = stack.pop() {
      match step {
        Step::Enter(name) => {
          let Some(bundle) = working_set.shift_remove(&name) else {
            continue;
          };
          let depends = bundle.depends.clone();
          stack.push(Step::Emit(bundle));
          for dep in depends.into_iter().rev() {
            stack.push(Step::Enter(dep));
          }
        }
        Step::Emit(bundle) => self.collect_bundle_files(&bundle, files)?,
      }
    }

    Ok(())
  }

  /// Append a single bundle's own files, ignoring its dependencies.
  pub fn collect_bundle_files(&self, bundle: &Bundle, files: &mut FileSet) -> Result<()> {
    debug!(bundle = %bundle.name, "collecting bundle files");
    for media in [MediaType::Js, MediaType::Css] {
      for file in bundle.files(media) {
        match self.resolver.asset_path(bundle, file) {
          Some(path) => {
            let marker =
              self
                .fingerprint
                .fingerprint(&path)
                .map_err(|err| CombinerError::Fingerprint {
                  path: path.clone(),
                  reason: format!("{err:#}"),
                })?;
            files.push_local(media, path, &marker);
          }
          None => files.push_external(media, file.clone()),
        }
      }
    }
    Ok(())
  }
}
