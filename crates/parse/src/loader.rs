use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    NotFound { path: String },
}

/// Host-provided access to include-file text. `read` resolves `path`
/// against `base_dir` and returns the canonical path alongside the text;
/// the canonical path is the include-dedup key, so the loader must map
/// spellings of the same file (`x`, `./x`) to one value.
pub trait SourceLoader {
    fn read(&self, path: &str, base_dir: &Path) -> Result<(PathBuf, String), LoadError>;
}
