//! Stylesheet merging with relative URL rewriting.
//!
//! A stylesheet moved into the combined output's directory keeps working once every relative
//! `url()` is prefixed with the path from the output directory back to the original one.
//! `@import` rules are pulled out of each file and hoisted ahead of the merged body, since
//! imports must precede all other rules.

mod combine;
mod paths;
mod rewrite;

pub use combine::combine_files;
pub use paths::{find_root, normalize_path, relative_prefix, to_slash};
pub use rewrite::{CssImport, rewrite, rewrite_content};
