//! Filesystem storage of encrypted image envelopes.
//!
//! The store only moves opaque bytes; callers encrypt before [`ImageStore::save`]
//! and decrypt after [`ImageStore::load`]. Files live under a single root
//! directory, grouped in caller-chosen subdirectories.

pub mod paths;

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use paths::TEMP_SUFFIX;

/// Errors produced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A directory or file name would escape the storage root or is otherwise unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The addressed file or directory does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A file addressed relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Directory relative to the root (empty for the root itself).
    pub dir: PathBuf,
    /// Bare file name.
    pub filename: String,
}

impl StoredFile {
    /// Validate and build a location from untrusted directory and file strings.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] if either part fails validation.
    pub fn parse(dir: &str, filename: &str) -> Result<Self, StorageError> {
        Ok(Self {
            dir: paths::relative_dir(dir)?,
            filename: paths::file_name(filename)?.to_owned(),
        })
    }

    /// Directory with `/` separators.
    pub fn dir_slash(&self) -> String {
        paths::to_slash(&self.dir)
    }
}

/// Encrypted-file store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: Arc<PathBuf>,
}

impl ImageStore {
    /// Create a store rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: Arc::new(root.as_ref().to_path_buf()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.as_path()).await?;
        Ok(())
    }

    fn absolute(&self, file: &StoredFile) -> PathBuf {
        self.root.join(&file.dir).join(&file.filename)
    }

    /// Write `envelope` as the entire content of `file`, replacing any previous blob.
    ///
    /// Missing directories are created. The bytes go to a sibling scratch file
    /// that is renamed over the target, so readers see either the old blob or
    /// the new one, never a partial write.
    pub async fn save(&self, file: &StoredFile, envelope: &[u8]) -> Result<(), StorageError> {
        let dir = self.root.join(&file.dir);
        fs::create_dir_all(&dir).await?;

        let target = dir.join(&file.filename);
        let scratch = dir.join(format!(
            "{}.{:016x}{TEMP_SUFFIX}",
            file.filename,
            rand::random::<u64>()
        ));

        if let Err(e) = write_then_rename(&scratch, &target, envelope).await {
            if let Err(cleanup) = fs::remove_file(&scratch).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(error = %cleanup, "failed to remove scratch file");
                }
            }
            return Err(e.into());
        }
        debug!(bytes = envelope.len(), "envelope stored");
        Ok(())
    }

    /// Read the entire stored blob for `file`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no regular file at that location.
    pub async fn load(&self, file: &StoredFile) -> Result<Vec<u8>, StorageError> {
        let path = self.absolute(file);
        self.require_file(&path, file).await?;
        Ok(fs::read(&path).await.map_err(|e| not_found_or_io(e, file))?)
    }

    /// Delete the stored blob for `file`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no regular file at that location.
    pub async fn remove(&self, file: &StoredFile) -> Result<(), StorageError> {
        let path = self.absolute(file);
        self.require_file(&path, file).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, file))
    }

    /// Returns `true` if a regular file is stored at `file`.
    pub async fn exists(&self, file: &StoredFile) -> Result<bool, StorageError> {
        match self.require_file(&self.absolute(file), file).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Collect every stored file under `dir` (recursively).
    ///
    /// Scratch files from in-flight writes and symlinks are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if `dir` does not exist.
    pub async fn list_recursive(&self, dir: &Path) -> Result<Vec<StoredFile>, StorageError> {
        let root = self.root.clone();
        let start = dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let absolute = root.join(&start);
            if !absolute.is_dir() {
                return Err(StorageError::NotFound(paths::to_slash(&start)));
            }
            let mut found = Vec::new();
            walk(&absolute, &start, &mut found)?;
            Ok(found)
        })
        .await
        .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    async fn require_file(&self, path: &Path, file: &StoredFile) -> Result<(), StorageError> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(StorageError::NotFound(describe(file))),
            Err(e) => Err(not_found_or_io(e, file)),
        }
    }
}

async fn write_then_rename(scratch: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(scratch, bytes).await?;
    fs::rename(scratch, target).await
}

fn walk(absolute: &Path, relative: &Path, found: &mut Vec<StoredFile>) -> io::Result<()> {
    for entry in std::fs::read_dir(absolute)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        if file_type.is_dir() {
            walk(&entry.path(), &relative.join(&name), found)?;
        } else if file_type.is_file() {
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            found.push(StoredFile {
                dir: relative.to_path_buf(),
                filename: name.to_owned(),
            });
        }
    }
    Ok(())
}

fn describe(file: &StoredFile) -> String {
    let dir = file.dir_slash();
    if dir.is_empty() {
        file.filename.clone()
    } else {
        format!("{dir}/{}", file.filename)
    }
}

fn not_found_or_io(e: io::Error, file: &StoredFile) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(describe(file))
    } else {
        StorageError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ImageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        (dir, store)
    }

    fn at(dir: &str, name: &str) -> StoredFile {
        StoredFile::parse(dir, name).unwrap()
    }

    #[tokio::test]
    async fn save_creates_directories_and_load_reads_back() {
        let (_tmp, store) = store();
        let file = at("cats/2024", "tom.png");
        store.save(&file, b"envelope").await.unwrap();
        assert_eq!(store.load(&file).await.unwrap(), b"envelope");
        assert!(store.root().join("cats").join("2024").join("tom.png").is_file());
    }

    #[tokio::test]
    async fn save_replaces_existing_blob_and_leaves_no_scratch() {
        let (_tmp, store) = store();
        let file = at("", "tom.png");
        store.save(&file, b"first").await.unwrap();
        store.save(&file, b"second").await.unwrap();
        assert_eq!(store.load(&file).await.unwrap(), b"second");

        let names: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["tom.png".to_owned()]);
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let (_tmp, store) = store();
        let err = store.load(&at("nowhere", "x.png")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref p) if p == "nowhere/x.png"));
    }

    #[tokio::test]
    async fn load_directory_is_not_found() {
        let (_tmp, store) = store();
        store.save(&at("cats", "tom.png"), b"x").await.unwrap();
        let err = store.load(&at("", "cats")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_deletes_file() {
        let (_tmp, store) = store();
        let file = at("a", "b.png");
        store.save(&file, b"x").await.unwrap();
        store.remove(&file).await.unwrap();
        assert!(matches!(
            store.load(&file).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            store.remove(&file).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_recursive_finds_nested_files_only() {
        let (_tmp, store) = store();
        store.save(&at("", "root.png"), b"1").await.unwrap();
        store.save(&at("a", "one.png"), b"2").await.unwrap();
        store.save(&at("a/b", "two.png"), b"3").await.unwrap();
        std::fs::write(store.root().join("a").join("x.png.1234.vault-tmp"), b"partial").unwrap();

        let mut all = store.list_recursive(Path::new("")).await.unwrap();
        all.sort_by(|x, y| x.filename.cmp(&y.filename));
        let names: Vec<_> = all.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["one.png", "root.png", "two.png"]);

        let sub = store.list_recursive(Path::new("a/b")).await.unwrap();
        assert_eq!(sub, vec![at("a/b", "two.png")]);
        assert_eq!(sub[0].dir_slash(), "a/b");
    }

    #[tokio::test]
    async fn exists_reports_regular_files_only() {
        let (_tmp, store) = store();
        store.save(&at("cats", "tom.png"), b"x").await.unwrap();
        assert!(store.exists(&at("cats", "tom.png")).await.unwrap());
        assert!(!store.exists(&at("cats", "jerry.png")).await.unwrap());
        assert!(!store.exists(&at("", "cats")).await.unwrap());
    }

    #[tokio::test]
    async fn list_recursive_missing_dir_is_not_found() {
        let (_tmp, store) = store();
        let err = store.list_recursive(Path::new("ghost")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn ensure_root_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new(tmp.path().join("images"));
        store.ensure_root().await.unwrap();
        assert!(store.root().is_dir());
    }

    #[test]
    fn parse_rejects_traversal() {
        assert!(matches!(
            StoredFile::parse("../etc", "passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            StoredFile::parse("", "../passwd"),
            Err(StorageError::InvalidPath(_))
        ));
    }
}
