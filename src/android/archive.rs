use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;

use log::debug;
use zip::read::ZipArchive;

/// Result alias for archive reads.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors surfaced while pulling a DEX member out of an archive.
#[derive(Debug)]
pub enum ArchiveError {
    Io(io::Error),
    Zip(zip::result::ZipError),
    MissingEntry(String),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Io(err) => write!(f, "I/O error: {err}"),
            ArchiveError::Zip(err) => write!(f, "ZIP error: {err}"),
            ArchiveError::MissingEntry(name) => write!(f, "archive has no {name} entry"),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<io::Error> for ArchiveError {
    fn from(value: io::Error) -> Self {
        ArchiveError::Io(value)
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(value: zip::result::ZipError) -> Self {
        ArchiveError::Zip(value)
    }
}

/// A ZIP container (APK, JAR) holding a DEX file under a fixed member name.
pub struct DexArchive<R> {
    archive: ZipArchive<R>,
}

impl DexArchive<File> {
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        debug!("Opening archive {}", path.display());
        DexArchive::new(File::open(path)?)
    }
}

impl<R: Read + Seek> DexArchive<R> {
    pub fn new(reader: R) -> ArchiveResult<Self> {
        Ok(DexArchive { archive: ZipArchive::new(reader)? })
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }

    /// Reads the member named `entry` fully into memory.
    pub fn read_dex(&mut self, entry: &str) -> ArchiveResult<Vec<u8>> {
        let mut file = match self.archive.by_name(entry) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Err(ArchiveError::MissingEntry(entry.to_string())),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_named_member() {
        let bytes = archive(&[("AndroidManifest.xml", b"<m/>"), ("classes.dex", b"dex\n035\0")]);
        let mut a = DexArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(a.entry_names().count(), 2);
        assert_eq!(a.read_dex("classes.dex").unwrap(), b"dex\n035\0");
    }

    #[test]
    fn missing_member() {
        let bytes = archive(&[("classes2.dex", b"x")]);
        let mut a = DexArchive::new(Cursor::new(bytes)).unwrap();
        match a.read_dex("classes.dex") {
            Err(ArchiveError::MissingEntry(name)) => assert_eq!(name, "classes.dex"),
            other => panic!("unexpected {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(DexArchive::new(Cursor::new(b"dex\n035\0".to_vec())), Err(ArchiveError::Zip(_))));
    }
}
