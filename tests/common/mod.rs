//! Dataset fixtures for integration tests
//!
//! Builds Progsnap dataset directories inside a `TempDir`. Every builder
//! starts from a minimal valid inline-storage dataset.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const MAIN_HEADER: &str = "EventID,EventType,Order,SubjectID,ToolInstanceID,CodeStateID,ServerTimestamp";

/// Builder for a dataset directory
pub struct DatasetBuilder {
    dir: TempDir,
    metadata: Vec<(String, String)>,
}

impl DatasetBuilder {
    /// Version 6.0, inline code states, no rows
    pub fn new() -> Self {
        let builder = Self {
            dir: TempDir::new().unwrap(),
            metadata: vec![("Version".to_string(), "6.0".to_string())],
        };
        builder
            .main_table(&format!("{}\n", MAIN_HEADER))
            .code_states("CodeStateID,Code\n")
    }

    /// Adds or replaces a metadata property
    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.metadata.retain(|(n, _)| n != name);
        self.metadata.push((name.to_string(), value.to_string()));
        self
    }

    /// Removes a metadata property
    pub fn without_property(mut self, name: &str) -> Self {
        self.metadata.retain(|(n, _)| n != name);
        self
    }

    pub fn consistent_ordering(self) -> Self {
        self.property("IsEventOrderingConsistent", "true")
    }

    pub fn external_code_states(self) -> Self {
        let builder = self.property("CodeStateRepresentation", "Directory");
        let _ = fs::remove_file(builder.dir.path().join("CodeStates/CodeStates.csv"));
        builder
    }

    pub fn main_table(self, content: &str) -> Self {
        self.file("MainTable.csv", content)
    }

    pub fn subjects(self, content: &str) -> Self {
        self.file("LinkTables/Subject.csv", content)
    }

    pub fn tool_instances(self, content: &str) -> Self {
        self.file("LinkTables/ToolInstance.csv", content)
    }

    pub fn code_states(self, content: &str) -> Self {
        self.file("CodeStates/CodeStates.csv", content)
    }

    pub fn table_schemas(self, json: &str) -> Self {
        self.file("TableSchemas.json", json)
    }

    /// Writes an arbitrary file relative to the dataset root
    pub fn file(self, relative: &str, content: &str) -> Self {
        self.bytes(relative, content.as_bytes())
    }

    pub fn bytes(self, relative: &str, content: &[u8]) -> Self {
        write_file(self.dir.path(), relative, content);
        self
    }

    /// Writes the metadata descriptor and returns the directory
    pub fn build(self) -> TempDir {
        let mut metadata = String::from("Property,Value\n");
        for (name, value) in &self.metadata {
            metadata.push_str(&format!("{},{}\n", name, value));
        }
        write_file(self.dir.path(), "DatasetMetadata.csv", metadata.as_bytes());
        self.dir
    }
}

pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Main Table content with the standard header
pub fn main_rows(rows: &[&str]) -> String {
    let mut content = format!("{}\n", MAIN_HEADER);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    content
}

/// Zips every file under `dataset`, placing entries under `prefix`
/// (empty, or a directory name ending in `/`).
///
/// Returns the directory holding the archive and the archive path.
pub fn zip_dataset(dataset: &Path, prefix: &str) -> (TempDir, PathBuf) {
    let out = TempDir::new().unwrap();
    let archive = out.path().join("dataset.zip");
    let mut writer = ZipWriter::new(File::create(&archive).unwrap());

    let mut pending = vec![dataset.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries: Vec<_> = fs::read_dir(&dir).unwrap().map(|e| e.unwrap().path()).collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path.strip_prefix(dataset).unwrap();
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_str().unwrap())
                .collect::<Vec<_>>()
                .join("/");
            writer
                .start_file(format!("{}{}", prefix, name), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(&fs::read(&path).unwrap()).unwrap();
        }
    }
    writer.finish().unwrap();
    (out, archive)
}
