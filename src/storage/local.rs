//! Local filesystem store

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::Store;
use crate::error::{Error, Result};

/// Store rooted at a directory; object names are paths relative to it.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Store for LocalStore {
    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.resolve(name);
        let file = File::open(&path)
            .map_err(|e| Error::storage(format!("opening {} for read: {}", path.display(), e)))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn Write + Send>> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("creating {}: {}", parent.display(), e)))?;
        }
        let file = File::create(&path)
            .map_err(|e| Error::storage(format!("opening {} for write: {}", path.display(), e)))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.resolve(name).is_file())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name);
        fs::remove_file(&path)
            .map_err(|e| Error::storage(format!("removing {}: {}", path.display(), e)))
    }

    fn status(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::storage(format!(
                "store root {} is not a directory",
                self.root.display()
            )))
        }
    }
}
