//! Read-only archive index used for packaged markup books.
//!
//! EPUB traversal only needs two things from a container: the list of entry
//! names and the bytes of one entry. [`ArchiveIndex`] captures exactly that,
//! so the extractor does not depend on a particular compression library.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use crate::extract::ExtractError;

/// Maximum decompressed bytes read from a single entry (zip-bomb protection).
pub const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Enumerate entries and read one entry as bytes.
pub trait ArchiveIndex {
    /// Names of all entries, in container order.
    fn entry_names(&self) -> Vec<String>;

    /// Reads the full contents of the named entry.
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ExtractError>;
}

/// [`ArchiveIndex`] over an in-memory ZIP container.
pub struct ZipIndex<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> ZipIndex<'a> {
    /// Opens the central directory. A damaged container is a corrupt document.
    pub fn open(bytes: &'a [u8]) -> Result<Self, ExtractError> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ExtractError::CorruptDocument(format!("invalid archive: {}", e)))?;
        Ok(Self { archive })
    }
}

impl ArchiveIndex for ZipIndex<'_> {
    fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(|n| n.to_string()).collect()
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ExtractError> {
        let entry = self
            .archive
            .by_name(name)
            .map_err(|e| ExtractError::CorruptDocument(format!("{}: {}", name, e)))?;
        let mut out = Vec::new();
        entry
            .take(MAX_ENTRY_BYTES)
            .read_to_end(&mut out)
            .map_err(|e| ExtractError::CorruptDocument(format!("{}: {}", name, e)))?;
        if out.len() as u64 >= MAX_ENTRY_BYTES {
            return Err(ExtractError::CorruptDocument(format!(
                "archive entry {} exceeds size limit ({} bytes)",
                name, MAX_ENTRY_BYTES
            )));
        }
        Ok(out)
    }
}

/// [`ArchiveIndex`] backed by a map of entry name to bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(name.into(), bytes.into());
        self
    }
}

impl ArchiveIndex for MemoryArchive {
    fn entry_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ExtractError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ExtractError::CorruptDocument(format!("missing archive entry {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn zip_index_lists_and_reads_entries() {
        let bytes = zip_with(&[("mimetype", "application/epub+zip"), ("OEBPS/a.html", "<p>a</p>")]);
        let mut index = ZipIndex::open(&bytes).unwrap();
        let names = index.entry_names();
        assert!(names.contains(&"mimetype".to_string()));
        assert!(names.contains(&"OEBPS/a.html".to_string()));
        assert_eq!(index.read_entry("OEBPS/a.html").unwrap(), b"<p>a</p>");
    }

    #[test]
    fn zip_index_rejects_garbage() {
        assert!(matches!(
            ZipIndex::open(b"definitely not a zip"),
            Err(ExtractError::CorruptDocument(_))
        ));
    }

    #[test]
    fn missing_entry_is_corrupt() {
        let mut archive = MemoryArchive::new().with_entry("a.html", "x");
        assert!(archive.read_entry("b.html").is_err());
        assert_eq!(archive.read_entry("a.html").unwrap(), b"x");
    }
}
