//! Pluggable object stores.
//!
//! The backup layer treats artifacts as named byte streams; a store hides
//! where they live and how they travel. The engine consumes nothing beyond
//! this trait.

pub mod local;

pub use local::LocalStore;

use std::io::{Read, Write};

use crate::error::Result;

/// Object-addressed byte store.
pub trait Store {
    /// Open a named object for reading.
    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    /// Open a named object for writing, replacing any previous content.
    /// The caller flushes and drops the writer to complete the object.
    fn open_write(&self, name: &str) -> Result<Box<dyn Write + Send>>;

    /// Whether a named object exists.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Remove a named object.
    fn delete(&self, name: &str) -> Result<()>;

    /// Liveness probe: `Ok` when the store is operating.
    fn status(&self) -> Result<()>;
}
