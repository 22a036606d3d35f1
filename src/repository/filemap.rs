//! Index of legacy data files built from `FILMAP.TAB` files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Name of the index files listing the data files of an archive
pub const INDEX_FILE_NAME: &str = "FILMAP.TAB";

const ENTRY_LENGTH: usize = 20;
const NAME_LENGTH: usize = 12;
const SKIPPED_EXTENSIONS: [&str; 2] = ["XML", "TAB"];

/// Table name to data files, built once per run
#[derive(Debug, Clone, Default)]
pub struct FileMap {
    root: PathBuf,
    tables: BTreeMap<String, Vec<PathBuf>>,
}

impl FileMap {
    /// Scan `root` recursively for index files and resolve their entries.
    ///
    /// Each entry is a 12 character file name followed by an 8 character
    /// subdirectory code. The data file lives at
    /// `root/<subdir>/<index dir name>/<file name>`.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(ArchiveError::PathNotFound(root.to_path_buf()));
        }

        let index_files = discover_index_files(root)?;
        if index_files.is_empty() {
            return Err(ArchiveError::repository(
                "scan_file_map",
                format!("no {} found below {}", INDEX_FILE_NAME, root.display()),
            ));
        }

        let mut map = FileMap {
            root: root.to_path_buf(),
            tables: BTreeMap::new(),
        };
        for index_file in &index_files {
            map.add_index_file(index_file)?;
        }

        tracing::info!(
            root = %root.display(),
            index_files = index_files.len(),
            tables = map.tables.len(),
            "Indexed legacy data files"
        );
        Ok(map)
    }

    fn add_index_file(&mut self, index_file: &Path) -> Result<()> {
        let archive_number = index_file
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ArchiveError::repository(
                    "scan_file_map",
                    format!("index file {} has no parent directory", index_file.display()),
                )
            })?;

        let bytes = fs::read(index_file).map_err(|e| {
            ArchiveError::repository(
                "scan_file_map",
                format!("{}: {}", index_file.display(), e),
            )
        })?;
        let content: Vec<u8> = bytes
            .into_iter()
            .filter(|b| !matches!(b, b'\r' | b'\n' | 0x1A))
            .collect();

        for entry in content.chunks(ENTRY_LENGTH) {
            if entry.len() < ENTRY_LENGTH {
                tracing::warn!(
                    index_file = %index_file.display(),
                    "Ignoring truncated index entry"
                );
                continue;
            }
            let file_name = latin1(&entry[..NAME_LENGTH]).trim().to_string();
            let subdir = latin1(&entry[NAME_LENGTH..]).trim().to_string();
            if file_name.is_empty() {
                continue;
            }

            let directory = self.root.join(&subdir).join(&archive_number);
            if !directory.is_dir() {
                return Err(ArchiveError::repository(
                    "scan_file_map",
                    format!(
                        "directory {} referenced by {} does not exist",
                        directory.display(),
                        index_file.display()
                    ),
                ));
            }

            let path = directory.join(&file_name);
            if is_skipped(&path) {
                continue;
            }
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "Skipping missing data file");
                continue;
            }

            let files = self.tables.entry(table_name(&file_name)).or_default();
            if !files.contains(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Data files of `table` in index order, case-insensitive lookup
    pub fn files(&self, table: &str) -> &[PathBuf] {
        self.tables
            .get(&table.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn discover_index_files(root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        INDEX_FILE_NAME
    );
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let entries = glob::glob_with(&pattern, options)
        .map_err(|e| ArchiveError::repository("scan_file_map", e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("Error accessing path: {}", e),
        }
    }
    files.sort();
    Ok(files)
}

/// Legacy files are single-byte encoded
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn is_skipped(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            SKIPPED_EXTENSIONS
                .iter()
                .any(|skipped| ext.eq_ignore_ascii_case(skipped))
        })
        .unwrap_or(false)
}

/// `SAG.001` and `sag.002` both belong to table `SAG`
fn table_name(file_name: &str) -> String {
    file_name
        .split('.')
        .next()
        .unwrap_or(file_name)
        .to_uppercase()
}
