//! Path matching helpers
//!
//! Matching is always done on lexically normalized absolute paths and by
//! whole components: `/repo` contains `/repo/src` but not `/repository`.

use std::path::Path;

pub use weft_core::normalize_path;

/// Whether `path` is `prefix` or one of its descendants.
pub fn is_within(path: &Path, prefix: &Path) -> bool {
    path.starts_with(prefix)
}
