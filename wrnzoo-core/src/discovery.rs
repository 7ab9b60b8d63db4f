//! Weight-file discovery under a models directory.

use crate::error::ZooError;
use crate::hierarchy::Granularity;
use crate::identity::{self, Superclass};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Narrows discovery results.
///
/// Files whose names cannot be decoded are kept by the identity-based filters
/// so the caller's own decode reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFilter {
    /// Substring the file name must contain. Parent directories are not matched.
    pub pattern: Option<String>,
    pub superclass: Option<Superclass>,
    pub granularity: Option<Granularity>,
}

impl ModelFilter {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.superclass.is_none() && self.granularity.is_none()
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if let Some(pattern) = &self.pattern {
            let name = path.file_name().map(|n| n.to_string_lossy());
            if !name.is_some_and(|n| n.contains(pattern.as_str())) {
                return false;
            }
        }
        if self.superclass.is_none() && self.granularity.is_none() {
            return true;
        }
        match identity::parse_path(path) {
            Ok(id) => {
                self.superclass.is_none_or(|s| s == id.superclass)
                    && self.granularity.is_none_or(|g| g == id.granularity)
            }
            Err(_) => true,
        }
    }
}

/// Lazy walk over weight files below a root, in file-name order per directory.
pub struct ModelFiles {
    walker: walkdir::IntoIter,
    filter: ModelFilter,
}

impl Iterator for ModelFiles {
    type Item = Result<PathBuf, ZooError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !identity::is_weight_file_name(&name) {
                continue;
            }
            if self.filter.accepts(entry.path()) {
                return Some(Ok(entry.into_path()));
            }
        }
    }
}

/// Walk `root` for `model_*.pt` / `model_*.pth` files.
///
/// Paths are absolute. Names are not validated here.
pub fn find_model_files(root: &Path, filter: ModelFilter) -> Result<ModelFiles, ZooError> {
    let root = root
        .canonicalize()
        .map_err(|e| ZooError::not_found(format!("models directory {}: {e}", root.display())))?;
    tracing::debug!(root = %root.display(), ?filter, "Scanning for model files");
    Ok(ModelFiles {
        walker: WalkDir::new(root)
            .sort_by_file_name()
            .into_iter(),
        filter,
    })
}
