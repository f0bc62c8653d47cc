use std::path::Path;

/// Render a path with forward slashes regardless of the host separator.
pub fn to_slash(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

/// Collapse `.` segments, `..` segments and repeated slashes.
///
/// Leading `..` segments that cannot be collapsed are kept, a leading `/` is preserved and a
/// path that collapses to nothing becomes `.`.
pub fn normalize_path(path: &str) -> String {
  let path = path.replace('\\', "/");
  let path = path.trim_end_matches('/');
  if !format!("/{path}").contains("/.") && !path.contains("//") {
    return path.to_string();
  }

  let mut parts: Vec<&str> = Vec::new();
  for part in path.split('/') {
    if part == ".." && parts.last().is_some_and(|last| *last != "..") {
      parts.pop();
    } else if part == "." || (part.is_empty() && !parts.is_empty()) {
      continue;
    } else {
      parts.push(part);
    }
  }

  let joined = parts.join("/");
  if joined.is_empty() {
    ".".to_string()
  } else {
    joined
  }
}

/// Prefix that turns a URL relative to `dir_from` into one relative to `dir_to`.
///
/// Walks up from `dir_to` until it is an ancestor of `dir_from`, then descends into the rest
/// of `dir_from`. Both arguments are normalized, slash-separated directories.
pub fn relative_prefix(dir_from: &str, dir_to: &str) -> String {
  let from = format!("{dir_from}/");
  let mut to = dir_to.to_string();
  let mut prefix = String::new();

  while !from.starts_with(&format!("{to}/")) {
    prefix.push_str("../");
    match to.rfind('/') {
      Some(pos) => to.truncate(pos),
      None => {
        to.clear();
        break;
      }
    }
  }

  prefix.push_str(from[to.len()..].trim_start_matches('/'));
  prefix
}

/// Longest common run of leading path segments shared by all `files`.
pub fn find_root<S: AsRef<str>>(files: &[S]) -> String {
  let Some((first, rest)) = files.split_first() else {
    return String::new();
  };

  let mut common: Vec<&str> = first.as_ref().split('/').collect();
  for file in rest {
    let shared = common
      .iter()
      .zip(file.as_ref().split('/'))
      .take_while(|(left, right)| *left == right)
      .count();
    common.truncate(shared);
  }

  common.join("/")
}
