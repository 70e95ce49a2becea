//! External collaborator traits (§6, §6.1).
//!
//! Script file I/O and parsing, archive/filesystem readers, and CLI
//! argument parsing are all out of scope for this crate. It depends on
//! narrow, dependency-inverted traits instead of implementing them,
//! mirroring how `render3` consumes `resource_loader`/schema-registry
//! traits without providing a production implementation itself. Only
//! in-memory test doubles ship here, for this crate's own test suite.

use crate::node::Node;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("script source not found: {0}")]
    NotFound(String),
    #[error("failed to parse script source '{0}': {1}")]
    Parse(String, String),
}

/// Identifies where a script comes from: an archive-relative path, or a
/// URL-form reference (skipped during compilation per §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Path(String),
    Url(String),
}

impl ScriptSource {
    pub fn is_url(&self) -> bool {
        matches!(self, ScriptSource::Url(_))
    }
}

/// Parses a `ScriptSource` into a `Node` tree. The compiler disables
/// caching while inlining so each call site gets a distinct subtree
/// instance (deep copies must not alias).
pub trait ScriptLoader {
    fn load(&self, source: &ScriptSource, cache: bool) -> Result<Node, LoaderError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("no such path in archive: {0}")]
    NotFound(String),
}

/// A file-descriptor-ish summary of an archive entry; real implementations
/// would carry size/mtime/etc, but the core never inspects more than
/// presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub path: String,
    pub is_directory: bool,
}

pub trait ArchetypeArchive {
    fn get_file(&self, path: &str) -> Result<PathBuf, ArchiveError>;
    fn get_descriptor(&self, path: &str) -> Result<Descriptor, ArchiveError>;
    fn paths(&self) -> Vec<String>;
}

/// Narrows blob reads/writes used by output rendering and `Image::write`.
/// Read content has its newlines normalized to LF before hashing (§6).
pub trait Filesystem {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
    fn write_dir(&self, dir: &Path, files: &[(PathBuf, Vec<u8>)]) -> std::io::Result<()>;
}

/// In-memory `ScriptLoader` + `ArchetypeArchive` + `Filesystem` test double.
/// Used only by this crate's own test suite (§6.1).
#[derive(Default)]
pub struct InMemoryArchive {
    scripts: HashMap<String, Node>,
    files: HashMap<String, Vec<u8>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, path: impl Into<String>, root: Node) -> Self {
        self.scripts.insert(path.into(), root);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl ScriptLoader for InMemoryArchive {
    fn load(&self, source: &ScriptSource, _cache: bool) -> Result<Node, LoaderError> {
        match source {
            ScriptSource::Url(url) => Err(LoaderError::NotFound(url.clone())),
            ScriptSource::Path(path) => self
                .scripts
                .get(path)
                .map(|n| n.deep_copy())
                .ok_or_else(|| LoaderError::NotFound(path.clone())),
        }
    }
}

impl ArchetypeArchive for InMemoryArchive {
    fn get_file(&self, path: &str) -> Result<PathBuf, ArchiveError> {
        if self.files.contains_key(path) {
            Ok(PathBuf::from(path))
        } else {
            Err(ArchiveError::NotFound(path.to_string()))
        }
    }

    fn get_descriptor(&self, path: &str) -> Result<Descriptor, ArchiveError> {
        if self.files.contains_key(path) || self.scripts.contains_key(path) {
            Ok(Descriptor {
                path: path.to_string(),
                is_directory: false,
            })
        } else {
            Err(ArchiveError::NotFound(path.to_string()))
        }
    }

    fn paths(&self) -> Vec<String> {
        let mut out: Vec<String> = self.files.keys().cloned().collect();
        out.extend(self.scripts.keys().cloned());
        out.sort();
        out
    }
}

impl Filesystem for InMemoryArchive {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        self.files
            .get(&path.to_string_lossy().to_string())
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such blob"))
    }

    fn write_dir(&self, _dir: &Path, _files: &[(PathBuf, Vec<u8>)]) -> std::io::Result<()> {
        // The in-memory double only needs to satisfy the trait for tests
        // that exercise reads; writes are verified by inspecting
        // `Image::write`'s in-memory result directly instead.
        Ok(())
    }
}
