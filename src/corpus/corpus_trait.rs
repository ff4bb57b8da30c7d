use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::corpus::{ArchiveSource, LocalSource};
use crate::utils::{
    config::CorpusSpec,
    error::{CorpusError, GateResult},
    types::CorpusLocation,
};

/// Marker written once an archive has been fully unpacked
pub const COMPLETE_MARKER: &str = ".smokegate-complete";

/// A place a sample corpus can be obtained from
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Human-readable description used in logs and reports
    fn describe(&self) -> String;

    /// Make the corpus available on local disk and return its root
    async fn fetch(&self) -> GateResult<CorpusLocation>;
}

/// Build the source matching a resolved `CorpusSpec`
pub fn source_for(spec: &CorpusSpec) -> GateResult<Box<dyn CorpusSource>> {
    match spec {
        CorpusSpec::Archive {
            url,
            subdir,
            cache_dir,
            refresh,
        } => {
            let source = ArchiveSource::new(url, cache_dir)?
                .with_subdir(subdir.clone())
                .with_refresh(*refresh);
            Ok(Box::new(source))
        }
        CorpusSpec::Local { path, subdir } => {
            Ok(Box::new(LocalSource::new(path.clone()).with_subdir(subdir.clone())))
        }
    }
}

/// Directory holding the content of an unpacked archive
///
/// Archives produced by code hosts wrap their content in one top-level
/// directory. When `base` holds exactly one directory and no other entries
/// (the completion marker aside) that directory is returned.
pub fn unwrap_archive_root(base: &Path) -> Result<PathBuf, CorpusError> {
    let entries: Vec<_> = std::fs::read_dir(base)
        .map_err(|e| CorpusError::io(base, e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name() != COMPLETE_MARKER)
        .collect();

    if entries.len() == 1 && entries[0].path().is_dir() {
        return Ok(entries[0].path());
    }
    Ok(base.to_path_buf())
}

/// Join the optional `subdir` onto `base`; it must exist
pub fn resolve_root(base: &Path, subdir: Option<&str>) -> Result<PathBuf, CorpusError> {
    match subdir {
        Some(subdir) => {
            let candidate = base.join(subdir);
            if !candidate.is_dir() {
                return Err(CorpusError::NotFound(candidate));
            }
            Ok(candidate)
        }
        None => Ok(base.to_path_buf()),
    }
}

/// Count regular files below `root`
pub fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name() != COMPLETE_MARKER)
        .count()
}
