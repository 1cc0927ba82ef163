//! Local persistent storage for the RoadWatch app core.
//!
//! This crate is the native-side analogue of the mobile shell's
//! AsyncStorage: a small key-value store for session tokens, the
//! background timestamp, and app flags. The [`KeyValueStore`] trait is
//! the seam; production uses the JSON-file backend, tests inject an
//! in-memory map.

mod file;
mod keys;
mod mem;
mod prefs;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use mem::MemoryStorage;
pub use prefs::{PrefsManager, SessionMeta};
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a PrefsManager backed by the default file store at the given path.
pub fn create_prefs_manager(prefs_path: std::path::PathBuf) -> PrefsManager {
    PrefsManager::new(Box::new(FileStorage::new(prefs_path)))
}
