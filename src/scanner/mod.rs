use crate::error::Error;
use crate::host::content::FILEDIR;
use crate::progress::ProgressReporter;
use crate::storage::Database;
use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_seen: usize,
    pub candidates: usize,
    /// Bytes held by the candidates.
    pub total_size: u64,
}

/// Walks the content store and records every content object no file record refers to.
///
/// Object file names are content hashes. The scanner only records candidates;
/// removal is left to the ghost files step.
pub struct UnlinkedFileScanner<'a> {
    db: &'a Database,
    data_root: PathBuf,
    ignore_patterns: Vec<Pattern>,
}

impl<'a> UnlinkedFileScanner<'a> {
    pub fn new(db: &'a Database, data_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            data_root: data_root.into(),
            ignore_patterns: Vec::new(),
        }
    }

    /// Invalid patterns are logged and dropped.
    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    pub fn scan(&self, reporter: &dyn ProgressReporter) -> Result<ScanSummary, Error> {
        let root = self.data_root.join(FILEDIR);
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "Content directory {}",
                root.display()
            )));
        }

        let mut summary = ScanSummary::default();
        self.scan_dir(Path::new(FILEDIR), true, &mut summary, reporter)?;
        debug!(
            "Scan finished: {} files seen, {} candidates, {} bytes",
            summary.files_seen, summary.candidates, summary.total_size
        );
        Ok(summary)
    }

    /// Depth-first. Progress is only reported for the top level listing.
    fn scan_dir(
        &self,
        relative: &Path,
        print_progress: bool,
        summary: &mut ScanSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), Error> {
        let absolute = self.data_root.join(relative);

        let entries = match list_dir(&absolute) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                error!("Access denied reading directory {}: {}", absolute.display(), e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let count = entries.len();

        for (index, entry) in entries.into_iter().enumerate() {
            // Content hashes are ASCII; a name that is not UTF-8 cannot be one.
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!("Skipping non UTF-8 file name {:?}", entry.path());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let item_relative = relative.join(&name);
            if self.is_ignored(&item_relative) {
                continue;
            }
            let item_path = entry.path();

            if entry.file_type().is_dir() {
                if print_progress {
                    reporter.write_line(&format!(
                        "Searching in \"{}\" ({}%)...",
                        item_path.display(),
                        index * 100 / count
                    ));
                }
                self.scan_dir(&item_relative, false, summary, reporter)?;
                continue;
            }

            summary.files_seen += 1;
            if self.db.file_hash_exists(&name)? {
                continue;
            }

            let size = entry.metadata().map_err(io::Error::from)?.len();
            let mime = detect_mime(item_path);

            self.db.upsert_stray_file(
                &item_relative.to_string_lossy(),
                &mime,
                size as i64,
            )?;
            summary.candidates += 1;
            summary.total_size += size;

            reporter.write_line(&format!(
                "Record NOT found for file \"{}\", added for removal.",
                item_path.display()
            ));
        }

        Ok(())
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative))
    }
}

/// Immediate children of `dir`, sorted by name.
fn list_dir(dir: &Path) -> io::Result<Vec<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(io::Error::from))
        .collect()
}

fn detect_mime(path: &Path) -> String {
    match infer::get_from_path(path) {
        Ok(Some(kind)) => kind.mime_type().to_string(),
        Ok(None) => FALLBACK_MIME.to_string(),
        Err(e) => {
            debug!("Could not sniff {}: {}", path.display(), e);
            FALLBACK_MIME.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mime_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        std::fs::write(&path, b"just some text").unwrap();
        assert_eq!(detect_mime(&path), FALLBACK_MIME);

        let png = dir.path().join("image");
        std::fs::write(&png, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).unwrap();
        assert_eq!(detect_mime(&png), "image/png");
    }

    #[test]
    fn test_missing_filedir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let scanner = UnlinkedFileScanner::new(&db, dir.path());

        let err = scanner.scan(&crate::progress::SilentReporter).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
