use std::{fmt, path::Path, sync::Arc};

/// Contract for the per-topic ordered message log that both sides of the relay use
pub mod message_store;

/// Contract for durable subscriber checkpoints
pub mod offset_store;

/// Stores that keep everything in process memory, for tests and single process setups
pub mod in_memory;

/// Stores that persist to files in a local directory
pub mod file_system;

/// Miscelaneous utility functions
pub mod utils;

use offset_store::{OffsetError, OffsetStore};

/// Selects how subscriber offsets are persisted. The scheme is normally read from
/// configuration using the names accepted by `from_string`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PersistenceScheme {
    InMemory,
    FileSystem,
}

#[derive(Debug, PartialEq)]
pub struct UnknownSchemeError {
    pub name: String,
}

impl fmt::Display for UnknownSchemeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Unknown persistence scheme '{}', expected 'in-memory' or 'file-system'",
            self.name
        )
    }
}

impl std::error::Error for UnknownSchemeError {}

impl PersistenceScheme {
    pub fn from_string(name: &str) -> Result<Self, UnknownSchemeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "in-memory" | "memory" => Ok(PersistenceScheme::InMemory),
            "file-system" | "file" => Ok(PersistenceScheme::FileSystem),
            _ => Err(UnknownSchemeError {
                name: name.to_owned(),
            }),
        }
    }
}

/// Builds the offset store for a persistence scheme. The path is only used by schemes
/// that write to disk.
pub fn build_offset_store(
    scheme: PersistenceScheme,
    path: &Path,
) -> Result<Arc<dyn OffsetStore>, OffsetError> {
    match scheme {
        PersistenceScheme::InMemory => Ok(Arc::new(in_memory::InMemoryOffsetStore::new())),
        PersistenceScheme::FileSystem => {
            Ok(Arc::new(file_system::FileSystemOffsetStore::new(path)?))
        }
    }
}
