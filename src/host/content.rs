use crate::error::Error;
use crate::storage::models::FileRecord;
use crate::storage::Database;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the data root holding content objects.
pub const FILEDIR: &str = "filedir";

/// Access to file records and the physical content objects behind them.
pub trait ContentStore {
    fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>, Error>;

    /// On-disk location of the record's content, or `None` when it is missing or unreadable.
    fn content_path(&self, file: &FileRecord) -> Option<PathBuf>;

    /// Unlink the content object. `Ok(false)` when it was already gone.
    fn delete_content(&self, file: &FileRecord) -> Result<bool, Error>;
}

/// Content objects laid out as `<data_root>/filedir/<h0h1>/<h2h3>/<hash>`.
pub struct FileDirStore<'a> {
    db: &'a Database,
    data_root: PathBuf,
}

impl<'a> FileDirStore<'a> {
    pub fn new(db: &'a Database, data_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Path of a content object relative to the data root, or `None` for a malformed hash.
    pub fn relative_path(contenthash: &str) -> Option<PathBuf> {
        if contenthash.len() < 4 || !contenthash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(
            Path::new(FILEDIR)
                .join(&contenthash[0..2])
                .join(&contenthash[2..4])
                .join(contenthash),
        )
    }

    pub fn hash_path(&self, contenthash: &str) -> Option<PathBuf> {
        Self::relative_path(contenthash).map(|relative| self.data_root.join(relative))
    }
}

impl ContentStore for FileDirStore<'_> {
    fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>, Error> {
        Ok(self.db.get_file(id)?)
    }

    fn content_path(&self, file: &FileRecord) -> Option<PathBuf> {
        let path = self.hash_path(&file.contenthash)?;
        match File::open(&path) {
            Ok(_) => Some(path),
            Err(e) => {
                debug!("Content for file {} unreadable at {:?}: {}", file.id, path, e);
                None
            }
        }
    }

    fn delete_content(&self, file: &FileRecord) -> Result<bool, Error> {
        let path = match self.hash_path(&file.contenthash) {
            Some(path) => path,
            None => return Ok(false),
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_layout() {
        let path = FileDirStore::relative_path("ab12cd34").unwrap();
        assert_eq!(path, Path::new("filedir/ab/12/ab12cd34"));
    }

    #[test]
    fn test_relative_path_rejects_malformed_hash() {
        assert!(FileDirStore::relative_path("abc").is_none());
        assert!(FileDirStore::relative_path("../../etc/passwd").is_none());
    }
}
