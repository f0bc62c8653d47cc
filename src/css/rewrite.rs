use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::bytes::{Captures, Regex};

use super::paths::{normalize_path, relative_prefix, to_slash};
use crate::urls::is_fixed_reference;

/// A hoisted `@import` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssImport {
  /// Import target, already rewritten for the output location.
  pub url: String,
  /// Media query list following the target, if any.
  pub media: Option<String>,
}

impl fmt::Display for CssImport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.media {
      Some(media) => write!(f, "@import url({}) {};", self.url, media),
      None => write!(f, "@import url({});", self.url),
    }
  }
}

fn import_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r#"(?i-u)@import\s+(?:url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)|"([^"]*)"|'([^']*)')[ \t]*([^;\n{}]*?)[ \t]*(?:;|$)"#,
    )
    .expect("invalid import regex")
  })
}

fn url_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i-u)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#).expect("invalid url regex")
  })
}

/// Rewrite `url` for a stylesheet whose directory is reached through `prefix`.
fn rebase_url(url: &str, prefix: &str) -> String {
  if is_fixed_reference(url) {
    url.to_string()
  } else {
    normalize_path(&format!("{prefix}{url}"))
  }
}

/// Strip `@import` rules from `content` into `imports`, then prefix every relative `url()`.
///
/// Works on raw bytes so stylesheets in any ASCII-compatible encoding pass through; a `url()`
/// whose target is not UTF-8 is left as is. An empty prefix leaves URLs untouched. Imports
/// already present in `imports` are not added twice.
pub fn rewrite_content(content: &[u8], prefix: &str, imports: &mut Vec<CssImport>) -> Vec<u8> {
  let body = import_pattern().replace_all(content, |caps: &Captures<'_>| {
    let target = (1..=5)
      .find_map(|group| caps.get(group))
      .map_or(Cow::Borrowed(""), |m| String::from_utf8_lossy(m.as_bytes()));
    let media = caps
      .get(6)
      .map(|m| String::from_utf8_lossy(m.as_bytes()).trim().to_string())
      .filter(|media| !media.is_empty());

    let import = CssImport {
      url: rebase_url(&target, prefix),
      media,
    };
    if !imports.contains(&import) {
      imports.push(import);
    }
    Vec::<u8>::new()
  });

  if prefix.is_empty() {
    return body.into_owned();
  }

  url_pattern()
    .replace_all(&body, |caps: &Captures<'_>| {
      let whole = caps.get(0).map_or(&[][..], |m| m.as_bytes());
      let Some(url) = (1..=3).find_map(|group| caps.get(group)) else {
        return whole.to_vec();
      };
      let Ok(target) = std::str::from_utf8(url.as_bytes()) else {
        return whole.to_vec();
      };
      if is_fixed_reference(target) {
        return whole.to_vec();
      }

      let offset = caps.get(0).map_or(0, |m| m.start());
      let (start, end) = (url.start() - offset, url.end() - offset);
      let mut rewritten = whole[..start].to_vec();
      rewritten.extend_from_slice(rebase_url(target, prefix).as_bytes());
      rewritten.extend_from_slice(&whole[end..]);
      rewritten
    })
    .into_owned()
}

/// Read the stylesheet at `from` and rewrite it for a new home at `to`.
///
/// Relative URLs are re-rooted at the directory of `to`; `@import` rules are removed from the
/// returned body and appended to `imports`.
pub fn rewrite(from: &Path, to: &Path, imports: &mut Vec<CssImport>) -> Result<Vec<u8>> {
  let content = fs::read(from).with_context(|| format!("failed to read {}", from.display()))?;

  let dir_from = normalize_path(&to_slash(from.parent().unwrap_or(Path::new("."))));
  let dir_to = normalize_path(&to_slash(to.parent().unwrap_or(Path::new("."))));
  let prefix = if dir_from == dir_to {
    String::new()
  } else {
    relative_prefix(&dir_from, &dir_to)
  };

  Ok(rewrite_content(&content, &prefix, imports))
}
