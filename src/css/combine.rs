use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use super::paths::{find_root, to_slash};
use super::rewrite::rewrite;
use crate::filter::provenance;

/// Merge stylesheets destined for `output`, hoisting every `@import` ahead of the bodies.
///
/// Each file body is preceded by a `/* File: ... */` comment naming it relative to `web_root`.
pub fn combine_files(files: &[PathBuf], output: &Path, web_root: &Path) -> Result<Vec<u8>> {
  let slashed: Vec<String> = files.iter().map(|file| to_slash(file)).collect();
  debug!(
    root = %find_root(&slashed),
    count = files.len(),
    output = %output.display(),
    "combining stylesheets"
  );

  let mut imports = Vec::new();
  let mut body = Vec::new();
  for file in files {
    body.extend_from_slice(format!("/* File: {} */\n", provenance(file, web_root)).as_bytes());
    body.extend(rewrite(file, output, &mut imports)?);
    body.push(b'\n');
  }

  let mut combined = Vec::new();
  for import in &imports {
    combined.extend_from_slice(format!("{import}\n").as_bytes());
  }
  combined.extend(body);
  Ok(combined)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn hoists_imports_from_all_files() {
    let temp = tempdir().unwrap();
    let web = temp.path().join("web");
    fs::create_dir_all(web.join("css/b")).unwrap();
    fs::create_dir_all(web.join("ac")).unwrap();
    fs::write(web.join("css/a.css"), ".a { color: red; }").unwrap();
    fs::write(
      web.join("css/b/b.css"),
      "@import \"shared.css\";\n.b { background: url(img/b.png); }",
    )
    .unwrap();

    let combined = combine_files(
      &[web.join("css/a.css"), web.join("css/b/b.css")],
      &web.join("ac/out.css"),
      &web,
    )
    .unwrap();
    let combined = String::from_utf8(combined).unwrap();

    assert!(combined.starts_with("@import url(../css/b/shared.css);\n/* File: /css/a.css */\n"));
    assert!(combined.contains("/* File: /css/b/b.css */"));
    assert!(combined.contains("url(../css/b/img/b.png)"));
    assert_eq!(combined.matches("@import").count(), 1);
  }

  #[test]
  fn missing_file_is_an_error() {
    let temp = tempdir().unwrap();
    let result = combine_files(
      &[temp.path().join("missing.css")],
      &temp.path().join("out.css"),
      temp.path(),
    );
    assert!(result.is_err());
  }
}
