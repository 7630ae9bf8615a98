//! Byte access to product files by key.
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Read-by-key and glob-by-pattern over a product's files. Keys are
/// `/`-separated and relative to the product root. Mappers are shared
/// across the threads reading sibling files.
pub trait Mapper: Sync {
    fn read(&self, key: &str) -> io::Result<Vec<u8>>;

    /// Keys matching `pattern`, sorted
    fn glob(&self, pattern: &str) -> io::Result<Vec<String>>;
}

/// [`Mapper`] over a local directory
#[derive(Clone, Debug)]
pub struct DirMapper {
    root: PathBuf,
}

impl DirMapper {
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|p| !p.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Some(parts.join("/"))
    }
}

impl Mapper for DirMapper {
    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        let path = self.path_of(key);
        debug!("reading {}", path.display());
        std::fs::read(path)
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<String>> {
        let full = self.path_of(pattern);
        let full = full.to_str().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "pattern is not valid UTF-8")
        })?;
        let paths = glob::glob(full)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let mut keys = Vec::new();
        for entry in paths {
            let path = entry.map_err(glob::GlobError::into_error)?;
            if let Some(key) = self.key_of(&path) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
