//! Package-wide index of every emitted file

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ArchiveError, Result};

use super::ArchiveLayout;

/// One registered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// `/`-separated path relative to the package root
    pub path: String,
    pub size: u64,
    /// Lowercase hex SHA-256 of the content
    pub sha256: String,
}

/// Registry shared by all table writers of a package.
///
/// Registration is serialized behind a mutex.
#[derive(Debug)]
pub struct FileIndex {
    layout: ArchiveLayout,
    entries: Mutex<Vec<FileEntry>>,
}

impl FileIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: ArchiveLayout::new(root),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Hash `path` and record it, replacing an earlier entry for the same
    /// file
    pub fn register(&self, path: &Path) -> Result<FileEntry> {
        let entry = FileEntry {
            path: self.layout.relative(path),
            size: fs::metadata(path)
                .map_err(|e| {
                    ArchiveError::repository("register_file", format!("{}: {}", path.display(), e))
                })?
                .len(),
            sha256: digest(path)?,
        };

        let mut entries = self.lock()?;
        entries.retain(|e| e.path != entry.path);
        entries.push(entry.clone());
        tracing::trace!(path = %entry.path, size = entry.size, "Registered file");
        Ok(entry)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Registered files sorted by path
    pub fn entries(&self) -> Result<Vec<FileEntry>> {
        let mut entries = self.lock()?.clone();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Write `fileIndex.xml` listing every registered file
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path).map_err(|e| {
            ArchiveError::repository("write_file_index", format!("{}: {}", path.display(), e))
        })?;
        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("fileIndex")))?;
        for entry in self.entries()? {
            writer.write_event(Event::Start(BytesStart::new("f")))?;
            for (name, value) in [
                ("path", entry.path.as_str()),
                ("size", entry.size.to_string().as_str()),
                ("sha256", entry.sha256.as_str()),
            ] {
                writer.write_event(Event::Start(BytesStart::new(name)))?;
                writer.write_event(Event::Text(BytesText::new(value)))?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            writer.write_event(Event::End(BytesEnd::new("f")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("fileIndex")))?;
        writer.into_inner().flush()?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<FileEntry>>> {
        self.entries
            .lock()
            .map_err(|_| ArchiveError::system("file index lock poisoned"))
    }
}

/// Streaming SHA-256 of a file
pub fn digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        ArchiveError::repository("digest_file", format!("{}: {}", path.display(), e))
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
