use async_trait::async_trait;
use std::path::PathBuf;

use crate::corpus::{count_files, resolve_root, CorpusSource};
use crate::utils::{
    config::absolute_path,
    error::{CorpusError, GateResult},
    types::CorpusLocation,
};

/// A corpus that is already unpacked on local disk
pub struct LocalSource {
    path: PathBuf,
    subdir: Option<String>,
}

impl LocalSource {
    /// Create a source for an existing directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            subdir: None,
        }
    }

    /// Descend into a subdirectory of the corpus
    pub fn with_subdir(mut self, subdir: Option<String>) -> Self {
        self.subdir = subdir;
        self
    }
}

#[async_trait]
impl CorpusSource for LocalSource {
    fn describe(&self) -> String {
        format!("local directory {}", self.path.display())
    }

    async fn fetch(&self) -> GateResult<CorpusLocation> {
        if !self.path.is_dir() {
            return Err(CorpusError::NotFound(self.path.clone()).into());
        }

        let base = absolute_path(&self.path).map_err(|e| CorpusError::io(&self.path, e))?;
        let root = resolve_root(&base, self.subdir.as_deref())?;
        let file_count = count_files(&root);
        if file_count == 0 {
            return Err(CorpusError::Empty(root).into());
        }

        tracing::info!(root = %root.display(), files = file_count, "using local corpus");

        Ok(CorpusLocation {
            root,
            source: self.describe(),
            freshly_fetched: false,
            file_count,
        })
    }
}
