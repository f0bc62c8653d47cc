//! Classification of asset references found in bundle definitions and stylesheets.

use regex::Regex;

fn absolute_reference_patterns() -> &'static [Regex] {
  use std::sync::OnceLock;

  static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
  PATTERNS
    .get_or_init(|| {
      vec![
        Regex::new(r"^//").expect("invalid protocol-relative regex"),
        Regex::new(r"://").expect("invalid scheme regex"),
      ]
    })
    .as_slice()
}

/// Whether a reference names a host, either through a scheme or as protocol-relative `//host`.
///
/// Such references never resolve to a local file and are emitted as they are.
pub fn is_absolute_url(value: &str) -> bool {
  absolute_reference_patterns()
    .iter()
    .any(|pattern| pattern.is_match(value))
}

/// Whether a reference is an inline `data:` URI.
pub fn is_data_uri(value: &str) -> bool {
  value
    .get(..5)
    .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
}

/// Whether a stylesheet URL must be kept verbatim when the stylesheet moves.
///
/// Absolute URLs, data URIs, root-relative paths and fragment-only references are kept; anything
/// else is relative to the stylesheet's own directory.
pub fn is_fixed_reference(value: &str) -> bool {
  value.is_empty()
    || value.starts_with('/')
    || value.starts_with('#')
    || is_data_uri(value)
    || is_absolute_url(value)
}
