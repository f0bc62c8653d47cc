use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Filter;
use crate::css::combine_files;

/// Concatenates stylesheets, rewriting relative URLs for the output location.
#[derive(Debug, Clone)]
pub struct CssFilter {
  web_root: PathBuf,
}

impl CssFilter {
  /// Filter naming files relative to `web_root`.
  pub fn new(web_root: impl Into<PathBuf>) -> Self {
    Self {
      web_root: web_root.into(),
    }
  }
}

impl Filter for CssFilter {
  fn name(&self) -> &str {
    "css"
  }

  fn process(&self, files: &[PathBuf], output: &Path) -> Result<bool> {
    let combined = combine_files(files, output, &self.web_root)?;
    fs::write(output, combined).with_context(|| format!("failed to write {}", output.display()))?;
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn writes_rewritten_stylesheet() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("a/b")).unwrap();
    fs::write(
      root.join("a/b/style.css"),
      "@import \"shared.css\";\n.x { background: url(images/x.png); }",
    )
    .unwrap();
    let output = root.join("a/out.css");

    assert!(CssFilter::new(root).process(&[root.join("a/b/style.css")], &output).unwrap());

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("@import url(b/shared.css);\n/* File: /a/b/style.css */"));
    assert!(written.contains("url(b/images/x.png)"));
  }

  #[test]
  fn keeps_latin1_stylesheets_intact() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("css")).unwrap();
    fs::write(root.join("css/a.css"), b".caf\xe9:after { content: \"\xe9\"; }").unwrap();
    let output = root.join("out.css");

    assert!(CssFilter::new(root).process(&[root.join("css/a.css")], &output).unwrap());
    assert_eq!(
      fs::read(&output).unwrap(),
      b"/* File: /css/a.css */\n.caf\xe9:after { content: \"\xe9\"; }\n"
    );
  }
}
