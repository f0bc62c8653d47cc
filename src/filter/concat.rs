use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{Filter, provenance};

/// Concatenates files, each preceded by a `// File: ...` comment.
#[derive(Debug, Clone)]
pub struct ConcatFilter {
  web_root: PathBuf,
}

impl ConcatFilter {
  /// Filter naming files relative to `web_root`.
  pub fn new(web_root: impl Into<PathBuf>) -> Self {
    Self {
      web_root: web_root.into(),
    }
  }
}

impl Filter for ConcatFilter {
  fn name(&self) -> &str {
    "concat"
  }

  fn process(&self, files: &[PathBuf], output: &Path) -> Result<bool> {
    let mut content = Vec::new();
    for file in files {
      content.extend_from_slice(format!("// File: {}\n", provenance(file, &self.web_root)).as_bytes());
      content.extend(fs::read(file).with_context(|| format!("failed to read {}", file.display()))?);
      content.push(b'\n');
    }

    fs::write(output, content).with_context(|| format!("failed to write {}", output.display()))?;
    Ok(true)
  }
}
