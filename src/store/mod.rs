//! Small persisted JSON-list stores.
//!
//! Each repository is one JSON array file at a stable location. Writes
//! are whole-file rewrites with last-writer-wins semantics; no further
//! concurrency guarantees are made or needed here.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};

/// A bookmarked URL with a free-form description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub description: String,
}

/// JSON-array file repository for one item type.
pub struct FileRepository<T> {
    file_path: PathBuf,
    _marker: PhantomData<T>,
}

/// Default store directory: the platform config dir under `dotlens/`.
pub fn default_store_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dotlens")
}

impl<T: Serialize + DeserializeOwned> FileRepository<T> {
    /// Open (creating if needed) the store named `name` under `dir`.
    /// The directory is explicit so tests never touch the real config dir.
    pub fn open(dir: &Path, name: &str) -> StoreResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let file_path = dir.join(format!("{name}.json"));
        if !file_path.exists() {
            std::fs::write(&file_path, "[]").map_err(|e| StoreError::Io {
                path: file_path.clone(),
                source: e,
            })?;
        }
        Ok(Self {
            file_path,
            _marker: PhantomData,
        })
    }

    pub fn list(&self) -> StoreResult<Vec<T>> {
        let json = std::fs::read_to_string(&self.file_path).map_err(|e| StoreError::Io {
            path: self.file_path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            path: self.file_path.clone(),
            source: e,
        })
    }

    pub fn add(&self, item: T) -> StoreResult<()> {
        let mut items = self.list()?;
        items.push(item);
        self.save(&items)
    }

    pub fn delete_where(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<()> {
        let mut items = self.list()?;
        items.retain(|item| !predicate(item));
        self.save(&items)
    }

    /// Replace the first item matching the predicate; no-op when none does.
    pub fn update_where(&self, predicate: impl Fn(&T) -> bool, new_item: T) -> StoreResult<()> {
        let mut items = self.list()?;
        if let Some(slot) = items.iter_mut().find(|item| predicate(item)) {
            *slot = new_item;
            self.save(&items)?;
        }
        Ok(())
    }

    fn save(&self, items: &[T]) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(items).map_err(|e| StoreError::Corrupt {
            path: self.file_path.clone(),
            source: e,
        })?;
        std::fs::write(&self.file_path, json).map_err(|e| StoreError::Io {
            path: self.file_path.clone(),
            source: e,
        })
    }
}
