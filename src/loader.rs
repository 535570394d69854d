//! Class loading over an ordered list of DEX inputs.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::debug;
use once_cell::sync::OnceCell;

use crate::android::archive::{ArchiveError, DexArchive};
use crate::dex::error::DexError;
use crate::dex::DexFile;
use crate::jvm::tree::ClassNode;
use crate::jvm::visitor::{ClassVisitor, ClassWriter};
use crate::settings::Settings;
use crate::translate::ClassTranslator;

#[derive(Debug)]
pub enum LoadError {
    ClassNotFound(String),
    Dex(DexError),
    Io(io::Error),
    Archive(zip::result::ZipError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ClassNotFound(name) => write!(f, "class {name} not found"),
            LoadError::Dex(err) => write!(f, "{err}"),
            LoadError::Io(err) => write!(f, "I/O error: {err}"),
            LoadError::Archive(err) => write!(f, "archive error: {err}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<DexError> for LoadError {
    fn from(value: DexError) -> Self {
        LoadError::Dex(value)
    }
}

impl From<io::Error> for LoadError {
    fn from(value: io::Error) -> Self {
        LoadError::Io(value)
    }
}

impl From<zip::result::ZipError> for LoadError {
    fn from(value: zip::result::ZipError) -> Self {
        LoadError::Archive(value)
    }
}

impl From<ArchiveError> for LoadError {
    fn from(value: ArchiveError) -> Self {
        match value {
            ArchiveError::Io(e) => LoadError::Io(e),
            ArchiveError::Zip(e) => LoadError::Archive(e),
            ArchiveError::MissingEntry(_) => LoadError::Archive(zip::result::ZipError::FileNotFound),
        }
    }
}

/// One input of a [`ClassLoader`].
#[derive(Debug, Clone)]
pub enum Source {
    /// DEX bytes already in memory
    Dex(Vec<u8>),
    DexFile(PathBuf),
    /// An APK or JAR holding the DEX under [`Settings::archive_entry`]
    Archive(PathBuf),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Dex(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Source::DexFile(path) | Source::Archive(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Source {
    fn open(&self, settings: &Settings) -> Result<DexFile, LoadError> {
        let bytes = match self {
            Source::Dex(bytes) => bytes.clone(),
            Source::DexFile(path) => fs::read(path)?,
            Source::Archive(path) => DexArchive::open(path)?.read_dex(&settings.archive_entry)?,
        };
        Ok(DexFile::from_bytes(bytes)?)
    }
}

/// Looks classes up across its sources in order and translates the first definition found.
///
/// Sources are opened and parsed once, on the first lookup. Concurrent first lookups race to
/// build the index; exactly one result is kept.
pub struct ClassLoader {
    sources: Vec<Source>,
    settings: Settings,
    index: OnceCell<Vec<DexFile>>,
}

impl ClassLoader {
    pub fn new(sources: Vec<Source>, settings: Settings) -> ClassLoader {
        ClassLoader { sources, settings, index: OnceCell::new() }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn index(&self) -> Result<&[DexFile], LoadError> {
        let files = self.index.get_or_try_init(|| {
            let mut files = vec![];
            for source in &self.sources {
                debug!("Indexing {}", source);
                files.push(source.open(&self.settings)?);
            }
            Ok::<_, LoadError>(files)
        })?;
        Ok(files)
    }

    /// Internal names of every class defined by the sources, in source order.
    pub fn class_names(&self) -> Result<Vec<String>, LoadError> {
        let mut names = vec![];
        for dex in self.index()? {
            for def in dex.class_defs() {
                let descriptor = def?.descriptor;
                names.push(descriptor.trim_start_matches('L').trim_end_matches(';').to_string());
            }
        }
        Ok(names)
    }

    /// Translates the class with internal name `name` (e.g. `java/lang/Object`) into `cv`.
    pub fn accept_class(&self, name: &str, cv: &mut dyn ClassVisitor) -> Result<(), LoadError> {
        let descriptor = format!("L{};", name);
        for (i, dex) in self.index()?.iter().enumerate() {
            match dex.find_class(&descriptor)? {
                Some(def) => {
                    ClassTranslator::new(dex, &self.settings).translate(&def, cv)?;
                    return Ok(());
                }
                None => debug!("{} is not defined by {}", name, self.sources[i]),
            }
        }
        Err(LoadError::ClassNotFound(name.to_string()))
    }

    pub fn load_class(&self, name: &str) -> Result<ClassNode, LoadError> {
        let mut node = ClassNode::new();
        self.accept_class(name, &mut node)?;
        Ok(node)
    }

    /// Translates `name` through `writer` and returns the bytes it produced.
    pub fn define_class<W: ClassWriter>(&self, name: &str, mut writer: W) -> Result<Vec<u8>, LoadError> {
        self.accept_class(name, &mut writer)?;
        Ok(writer.into_bytes())
    }
}
