use std::fs::File;
use std::path::Path;

use crate::utils::error::CorpusError;

/// Safety limits applied while unpacking a corpus archive
#[derive(Debug, Clone, Copy)]
pub struct ExtractionLimits {
    pub max_entries: usize,
    pub max_total_uncompressed_bytes: u64,
    pub max_compression_ratio: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: 500_000,
            max_total_uncompressed_bytes: 16 * 1024 * 1024 * 1024,
            max_compression_ratio: 1_000,
        }
    }
}

/// Summary of a completed extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Unpack a zip archive into `dest_dir`
///
/// Entries whose names would escape `dest_dir` are skipped.
pub fn unzip_to_dir(
    zip_path: &Path,
    dest_dir: &Path,
    limits: ExtractionLimits,
) -> Result<ExtractionStats, CorpusError> {
    let file = File::open(zip_path).map_err(|e| CorpusError::io(zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| CorpusError::Extract(e.to_string()))?;

    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(CorpusError::Extract(format!(
            "Archive has {} entries, limit is {}",
            entry_count, limits.max_entries
        )));
    }

    let mut stats = ExtractionStats::default();
    for i in 0..entry_count {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| CorpusError::Extract(e.to_string()))?;

        let uncompressed = entry.size();
        let compressed = entry.compressed_size();
        if uncompressed > 0 && compressed > 0 && uncompressed > compressed.saturating_mul(limits.max_compression_ratio) {
            return Err(CorpusError::Extract(format!(
                "Entry '{}' exceeds compression ratio limit",
                entry.name()
            )));
        }
        stats.bytes = stats
            .bytes
            .checked_add(uncompressed)
            .ok_or_else(|| CorpusError::Extract("Archive size overflow".to_string()))?;
        if stats.bytes > limits.max_total_uncompressed_bytes {
            return Err(CorpusError::Extract(format!(
                "Archive extracted size {} exceeds limit {}",
                stats.bytes, limits.max_total_uncompressed_bytes
            )));
        }

        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => {
                tracing::warn!(entry = entry.name(), "skipping archive entry with unsafe path");
                stats.skipped += 1;
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| CorpusError::io(&outpath, e))?;
            stats.directories += 1;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| CorpusError::io(&outpath, e))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| CorpusError::io(&outpath, e))?;
        stats.files += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let safe_mode = if mode & 0o111 != 0 { 0o755 } else { 0o644 };
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(safe_mode))
                    .map_err(|e| CorpusError::io(&outpath, e))?;
            }
        }
    }

    Ok(stats)
}
