use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::account::User;
use super::block::Block;
use super::property::Property;

const ACCOUNTS_FILE: &str = "accounts.json";
const PROPERTIES_FILE: &str = "properties.json";
const CHAIN_FILE: &str = "chain.json";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    IoError { path: PathBuf, source: io::Error },

    #[error("Serialization error on {}: {source}", .path.display())]
    SerializationError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Storage for the registry as three whole-document JSON files
#[derive(Debug, Clone)]
pub struct JsonStorage {
    /// The data directory
    dir: PathBuf,
}

impl JsonStorage {
    /// Opens a storage directory, creating it if needed
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory holding `accounts.json`, `properties.json` and `chain.json`
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();

        fs::create_dir_all(&dir).map_err(|source| StorageError::IoError {
            path: dir.clone(),
            source,
        })?;

        Ok(Self { dir })
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the users, `None` if the accounts file does not exist yet
    pub fn load_accounts(&self) -> Result<Option<Vec<User>>, StorageError> {
        read_json(&self.dir.join(ACCOUNTS_FILE))
    }

    pub fn save_accounts(&self, users: &[User]) -> Result<(), StorageError> {
        write_json(&self.dir.join(ACCOUNTS_FILE), users)
    }

    /// Loads the properties, `None` if the properties file does not exist yet
    pub fn load_properties(&self) -> Result<Option<BTreeMap<Uuid, Property>>, StorageError> {
        read_json(&self.dir.join(PROPERTIES_FILE))
    }

    pub fn save_properties(
        &self,
        properties: &BTreeMap<Uuid, Property>,
    ) -> Result<(), StorageError> {
        write_json(&self.dir.join(PROPERTIES_FILE), properties)
    }

    /// Loads the blocks, `None` if the chain file does not exist yet
    pub fn load_chain(&self) -> Result<Option<Vec<Block>>, StorageError> {
        read_json(&self.dir.join(CHAIN_FILE))
    }

    pub fn save_chain(&self, blocks: &[Block]) -> Result<(), StorageError> {
        write_json(&self.dir.join(CHAIN_FILE), blocks)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::IoError {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::SerializationError {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes the whole document next to `path`, then renames it into place
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::SerializationError {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    let io_error = |source| StorageError::IoError {
        path: path.to_path_buf(),
        source,
    };

    fs::write(&tmp_path, bytes).map_err(io_error)?;
    fs::rename(&tmp_path, path).map_err(io_error)?;

    debug!("Wrote {}", path.display());
    Ok(())
}
