//! Content-addressed writer for collected file sets.
//!
//! An output is named `<pathHash>-<contentHash>.<ext>`: the first digest covers the
//! identities of the local files, the second their fingerprint, both salted with the
//! build tag. An existing output with the derived name is reused without running a filter.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::CombinerConfig;
use crate::error::{CombinerError, Result};
use crate::filter::{Filter, FilterContext};
use crate::models::{FileSet, MediaType};

/// Result of [`Combiner::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
  /// Derived file name inside the output directory.
  pub file_name: String,
  /// Whether a filter ran to produce the file during this call.
  pub created: bool,
}

/// References emitted for one media type: passthrough references, then the combined file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
  /// External references in collection order.
  pub external: Vec<String>,
  /// Combined local output, absent when there were no local files.
  pub combined: Option<WriteOutcome>,
}

impl Emission {
  /// External references followed by the combined file name.
  pub fn references(&self) -> Vec<String> {
    self
      .external
      .iter()
      .cloned()
      .chain(self.combined.iter().map(|outcome| outcome.file_name.clone()))
      .collect()
  }

  /// Whether a filter ran to produce the combined file.
  pub fn created(&self) -> bool {
    self.combined.as_ref().is_some_and(|outcome| outcome.created)
  }
}

/// Writes combined outputs into one directory.
pub struct Combiner {
  output_dir: PathBuf,
  build_tag: String,
  use_file_path_for_hash: bool,
  js_filter: Box<dyn Filter>,
  css_filter: Box<dyn Filter>,
}

impl Combiner {
  /// Combiner hashing full paths into names.
  pub fn new(
    output_dir: impl Into<PathBuf>,
    build_tag: impl Into<String>,
    js_filter: Box<dyn Filter>,
    css_filter: Box<dyn Filter>,
  ) -> Self {
    Self {
      output_dir: output_dir.into(),
      build_tag: build_tag.into(),
      use_file_path_for_hash: true,
      js_filter,
      css_filter,
    }
  }

  /// Combiner with the filters and naming options of `config`, writing into `output_dir`.
  pub fn from_config(config: &CombinerConfig, output_dir: impl Into<PathBuf>) -> Self {
    let context = FilterContext {
      web_root: config.web_root.clone(),
      web_url: config.web_url.clone(),
    };
    Self::new(
      output_dir,
      config.build_tag.clone(),
      config.filter_js.build(&context),
      config.filter_css.build(&context),
    )
    .hash_file_paths(config.use_file_path_for_hash)
  }

  /// Hash full paths (`true`) or only basenames (`false`) into the first digest.
  pub fn hash_file_paths(mut self, enabled: bool) -> Self {
    self.use_file_path_for_hash = enabled;
    self
  }

  /// Directory outputs are written to.
  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  fn filter(&self, media: MediaType) -> &dyn Filter {
    match media {
      MediaType::Js => self.js_filter.as_ref(),
      MediaType::Css => self.css_filter.as_ref(),
    }
  }

  /// Name the local files of `media` would be combined into.
  pub fn output_name(&self, files: &FileSet, media: MediaType) -> String {
    let names = files
      .local(media)
      .iter()
      .map(|path| {
        if self.use_file_path_for_hash {
          path.to_string_lossy().into_owned()
        } else {
          path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
        }
      })
      .collect::<Vec<_>>()
      .join("|");

    format!(
      "{:x}-{:x}.{}",
      self.salted_hash(&names),
      self.salted_hash(files.fingerprint(media)),
      media.extension()
    )
  }

  fn salted_hash(&self, value: &str) -> u64 {
    xxh3_64(format!("{value}{}", self.build_tag).as_bytes())
  }

  /// Combine the local files of `media` unless an output with the derived name exists.
  pub fn write(&self, files: &FileSet, media: MediaType) -> Result<WriteOutcome> {
    let file_name = self.output_name(files, media);
    let output = self.output_dir.join(&file_name);

    if output.exists() {
      debug!(output = %output.display(), "reusing combined file");
      return Ok(WriteOutcome {
        file_name,
        created: false,
      });
    }

    let filter = self.filter(media);
    info!(
      filter = filter.name(),
      count = files.local(media).len(),
      output = %output.display(),
      "writing combined file"
    );
    let processed = filter
      .process(files.local(media), &output)
      .map_err(|err| CombinerError::filter(filter.name(), &output, format!("{err:#}")))?;

    if !processed || !output.exists() {
      return Err(CombinerError::filter(
        filter.name(),
        &output,
        "no output file was produced",
      ));
    }

    Ok(WriteOutcome {
      file_name,
      created: true,
    })
  }

  /// Passthrough references of `media` plus the combined output of its local files.
  pub fn emit(&self, files: &FileSet, media: MediaType) -> Result<Emission> {
    let combined = if files.has_local(media) {
      Some(self.write(files, media)?)
    } else {
      None
    };
    Ok(Emission {
      external: files.external(media).to_vec(),
      combined,
    })
  }
}
