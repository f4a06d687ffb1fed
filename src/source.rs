//! Dataset storage
//!
//! A dataset lives either in a directory or in a zip archive. Both are
//! addressed with `/`-separated paths relative to the dataset root, e.g.
//! `LinkTables/Subject.csv`.
//!
//! Archives may hold the dataset at their top level or inside a single
//! top-level directory (the usual result of zipping a dataset folder).
//! Zip entries are decompressed into memory when opened.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::metadata::METADATA_FILE;

/// Byte stream over one dataset file
pub type SourceReader = Box<dyn Read + Send>;

/// Where the files of a dataset are stored
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// Plain directory on disk
    Directory(PathBuf),
    /// Zip archive, shared by every reader of the dataset
    Zip(Arc<ZipSource>),
}

impl DatasetSource {
    /// Picks the storage for `path`: a directory, or else a zip archive.
    ///
    /// # Errors
    ///
    /// `DatasetFormat` if the path does not exist or is a file that is not
    /// a readable zip archive.
    pub fn open(path: &Path) -> ProgsnapResult<Self> {
        if path.is_dir() {
            Ok(DatasetSource::Directory(path.to_path_buf()))
        } else if path.is_file() {
            Ok(DatasetSource::Zip(Arc::new(ZipSource::open(path)?)))
        } else {
            Err(ProgsnapError::format_at(path, "dataset root does not exist"))
        }
    }

    /// Directory-backed storage at `root`
    pub fn directory(root: &Path) -> Self {
        DatasetSource::Directory(root.to_path_buf())
    }

    /// Directory or archive the dataset was opened from
    pub fn root(&self) -> &Path {
        match self {
            DatasetSource::Directory(root) => root,
            DatasetSource::Zip(zip) => &zip.path,
        }
    }

    pub fn is_zip(&self) -> bool {
        matches!(self, DatasetSource::Zip(_))
    }

    /// Location of a dataset file, for messages and logs.
    ///
    /// Inside an archive this is the archive path followed by the entry name.
    pub fn location(&self, relative: &str) -> PathBuf {
        match self {
            DatasetSource::Directory(root) => root.join(relative),
            DatasetSource::Zip(zip) => zip.path.join(zip.entry_name(relative)),
        }
    }

    /// Whether `relative` names a regular file
    pub fn is_file(&self, relative: &str) -> bool {
        match self {
            DatasetSource::Directory(root) => root.join(relative).is_file(),
            DatasetSource::Zip(zip) => zip.files.contains(&zip.entry_name(relative)),
        }
    }

    /// Opens a dataset file for reading.
    ///
    /// A missing file is reported as `io::ErrorKind::NotFound`.
    pub fn open_file(&self, relative: &str) -> io::Result<SourceReader> {
        match self {
            DatasetSource::Directory(root) => Ok(Box::new(File::open(root.join(relative))?)),
            DatasetSource::Zip(zip) => Ok(Box::new(Cursor::new(zip.read_entry(relative)?))),
        }
    }

    /// Reads a whole dataset file.
    pub fn read(&self, relative: &str) -> io::Result<Vec<u8>> {
        match self {
            DatasetSource::Directory(root) => std::fs::read(root.join(relative)),
            DatasetSource::Zip(zip) => zip.read_entry(relative),
        }
    }
}

/// A zip archive holding a dataset
pub struct ZipSource {
    path: PathBuf,
    /// Entry name prefix of the dataset root, empty or ending in `/`
    prefix: String,
    files: BTreeSet<String>,
    archive: Mutex<ZipArchive<File>>,
}

impl ZipSource {
    fn open(path: &Path) -> ProgsnapResult<Self> {
        let file = File::open(path)
            .map_err(|e| ProgsnapError::format_at(path, format!("cannot open dataset: {}", e)))?;
        let archive = ZipArchive::new(file).map_err(|e| {
            ProgsnapError::format_at(path, format!("not a directory or zip archive: {}", e))
        })?;

        let files: BTreeSet<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        let prefix = dataset_prefix(&files);

        Ok(Self {
            path: path.to_path_buf(),
            prefix,
            files,
            archive: Mutex::new(archive),
        })
    }

    /// Archive path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry name prefix of the dataset root
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn entry_name(&self, relative: &str) -> String {
        format!("{}{}", self.prefix, relative)
    }

    fn read_entry(&self, relative: &str) -> io::Result<Vec<u8>> {
        let name = self.entry_name(relative);
        let mut archive = self.archive.lock().unwrap_or_else(|p| p.into_inner());
        let mut entry = archive.by_name(&name).map_err(|e| match e {
            ZipError::FileNotFound => {
                io::Error::new(io::ErrorKind::NotFound, format!("no entry '{}' in archive", name))
            }
            ZipError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        })?;

        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Debug for ZipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipSource")
            .field("path", &self.path)
            .field("prefix", &self.prefix)
            .field("entries", &self.files.len())
            .finish()
    }
}

/// Finds the dataset root inside an archive: the top level if it holds the
/// descriptor, else the single top-level directory that does.
fn dataset_prefix(files: &BTreeSet<String>) -> String {
    if files.contains(METADATA_FILE) {
        return String::new();
    }

    let mut candidates = files.iter().filter_map(|name| {
        let dir = name.strip_suffix(METADATA_FILE)?.strip_suffix('/')?;
        (!dir.is_empty() && !dir.contains('/')).then(|| format!("{}/", dir))
    });
    match (candidates.next(), candidates.next()) {
        (Some(prefix), None) => prefix,
        _ => String::new(),
    }
}
