//! Filters delegating minification to external command-line tools.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::{Filter, FilterContext};
use crate::css::combine_files;

/// Options of [`UglifyJsFilter`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UglifyJsOptions {
  /// Executable to run.
  pub lib_path: String,
  /// Pass `--compress`.
  pub compress: bool,
  /// Pass `--mangle`.
  pub mangle: bool,
  /// Write `<output>.map` next to the output.
  pub source_map: bool,
  /// Extra whitespace-separated arguments appended to the command.
  pub options: Option<String>,
  /// Copy `*.min.js` files verbatim instead of minifying them again.
  pub skip_minified: bool,
}

impl Default for UglifyJsOptions {
  fn default() -> Self {
    Self {
      lib_path: "uglifyjs".into(),
      compress: false,
      mangle: false,
      source_map: false,
      options: None,
      skip_minified: false,
    }
  }
}

/// Options of [`UglifyCssFilter`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UglifyCssOptions {
  /// Executable to run.
  pub lib_path: String,
  /// Extra whitespace-separated arguments placed before the input file.
  pub options: Option<String>,
}

impl Default for UglifyCssOptions {
  fn default() -> Self {
    Self {
      lib_path: "uglifycss".into(),
      options: None,
    }
  }
}

/// Minifies JavaScript with an UglifyJS-compatible tool (`<files> -o <output> [flags]`).
#[derive(Debug, Clone)]
pub struct UglifyJsFilter {
  options: UglifyJsOptions,
  context: FilterContext,
}

enum Segment<'a> {
  Minified(&'a Path),
  Batch(Vec<PathBuf>),
}

impl UglifyJsFilter {
  /// Filter with the given options.
  pub fn new(options: UglifyJsOptions, context: FilterContext) -> Self {
    Self { options, context }
  }

  /// Arguments passed to the tool when minifying `files` into `output`.
  pub fn command_args(&self, files: &[PathBuf], output: &Path, with_source_map: bool) -> Vec<String> {
    let mut args: Vec<String> = files.iter().map(|file| lossy(file)).collect();
    args.push("-o".into());
    args.push(lossy(output));

    if with_source_map {
      let depth = lossy(&self.context.web_root).matches('/').count();
      let file_name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
      args.extend([
        "-p".into(),
        depth.to_string(),
        "--source-map".into(),
        format!("{}.map", lossy(output)),
        "--source-map-root".into(),
        format!("{}/", self.context.web_url.trim_end_matches('/')),
        "--source-map-url".into(),
        format!("{file_name}.map"),
      ]);
    }

    if self.options.compress {
      args.push("--compress".into());
    }
    if self.options.mangle {
      args.push("--mangle".into());
    }
    extend_with_options(&mut args, self.options.options.as_deref());
    args
  }

  /// Split `files` into pre-minified files and runs of files that still need minifying.
  fn segments<'a>(&self, files: &'a [PathBuf]) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut batch = Vec::new();
    for file in files {
      if is_pre_minified(file) {
        if !batch.is_empty() {
          segments.push(Segment::Batch(std::mem::take(&mut batch)));
        }
        segments.push(Segment::Minified(file));
      } else {
        batch.push(file.clone());
      }
    }
    if !batch.is_empty() {
      segments.push(Segment::Batch(batch));
    }
    segments
  }

  fn process_skipping_minified(&self, files: &[PathBuf], output: &Path) -> Result<bool> {
    let scratch_root = output.parent().unwrap_or(Path::new("."));
    let scratch = tempfile::Builder::new()
      .prefix(".uglify-")
      .tempdir_in(scratch_root)
      .with_context(|| format!("failed to create scratch directory in {}", scratch_root.display()))?;
    let mut combined = Vec::new();

    for (index, segment) in self.segments(files).into_iter().enumerate() {
      let piece = match segment {
        Segment::Minified(file) => {
          fs::read(file).with_context(|| format!("failed to read {}", file.display()))?
        }
        Segment::Batch(batch) => {
          let minified = scratch.path().join(format!("{index}.js"));
          let args = self.command_args(&batch, &minified, false);
          run_tool(&self.options.lib_path, &args)?;

          if !minified.exists() {
            error!(command = %render_command(&self.options.lib_path, &args), "minifier produced no output");
            return Ok(false);
          }
          fs::read(&minified).with_context(|| format!("failed to read {}", minified.display()))?
        }
      };

      if piece.is_empty() {
        continue;
      }
      combined.extend(piece);
      if combined.last() != Some(&b'\n') {
        combined.push(b'\n');
      }
    }

    fs::write(output, combined).with_context(|| format!("failed to write {}", output.display()))?;
    Ok(output.exists())
  }
}

impl Filter for UglifyJsFilter {
  fn name(&self) -> &str {
    "uglifyjs"
  }

  fn process(&self, files: &[PathBuf], output: &Path) -> Result<bool> {
    if self.options.skip_minified {
      if self.options.source_map {
        debug!("source maps are not written when pre-minified files are skipped");
      }
      return self.process_skipping_minified(files, output);
    }

    let args = self.command_args(files, output, self.options.source_map);
    run_tool(&self.options.lib_path, &args)?;

    if !output.exists() {
      error!(command = %render_command(&self.options.lib_path, &args), "failed to process JS files");
      return Ok(false);
    }
    Ok(true)
  }
}

/// Minifies stylesheets with an UglifyCSS-compatible tool that prints to stdout.
///
/// Files are first merged with URL rewriting into a scratch file, which is then minified.
#[derive(Debug, Clone)]
pub struct UglifyCssFilter {
  options: UglifyCssOptions,
  context: FilterContext,
}

impl UglifyCssFilter {
  /// Filter with the given options.
  pub fn new(options: UglifyCssOptions, context: FilterContext) -> Self {
    Self { options, context }
  }

  /// Arguments passed to the tool for the merged scratch file at `input`.
  pub fn command_args(&self, input: &Path) -> Vec<String> {
    let mut args = Vec::new();
    extend_with_options(&mut args, self.options.options.as_deref());
    args.push(lossy(input));
    args
  }
}

impl Filter for UglifyCssFilter {
  fn name(&self) -> &str {
    "uglifycss"
  }

  fn process(&self, files: &[PathBuf], output: &Path) -> Result<bool> {
    let combined = combine_files(files, output, &self.context.web_root)?;
    let mut scratch = tempfile::Builder::new()
      .prefix(".uglify-")
      .suffix(".css")
      .tempfile()
      .context("failed to create scratch stylesheet")?;
    scratch
      .write_all(&combined)
      .context("failed to write scratch stylesheet")?;

    let args = self.command_args(scratch.path());
    let stdout = run_tool(&self.options.lib_path, &args)?;
    if !stdout.is_empty() {
      fs::write(output, stdout).with_context(|| format!("failed to write {}", output.display()))?;
    }

    if !output.exists() {
      error!(command = %render_command(&self.options.lib_path, &args), "failed to process CSS files");
      return Ok(false);
    }
    Ok(true)
  }
}

fn is_pre_minified(file: &Path) -> bool {
  file
    .file_name()
    .and_then(|name| name.to_str())
    .is_some_and(|name| name.ends_with(".min.js"))
}

fn lossy(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

fn extend_with_options(args: &mut Vec<String>, options: Option<&str>) {
  if let Some(options) = options {
    args.extend(options.split_whitespace().map(str::to_string));
  }
}

fn render_command(program: &str, args: &[String]) -> String {
  std::iter::once(program)
    .chain(args.iter().map(String::as_str))
    .collect::<Vec<_>>()
    .join(" ")
}

/// Run `program` to completion and return its stdout. The exit status is only logged.
fn run_tool(program: &str, args: &[String]) -> Result<Vec<u8>> {
  debug!(command = %render_command(program, args), "running external filter");
  let result = Command::new(program)
    .args(args)
    .output()
    .with_context(|| format!("failed to run {program}"))?;

  if !result.status.success() {
    warn!(
      program,
      status = %result.status,
      stderr = %String::from_utf8_lossy(&result.stderr).trim(),
      "external filter exited unsuccessfully"
    );
  }
  Ok(result.stdout)
}
