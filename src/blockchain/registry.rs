use std::path::Path;

use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use super::account::{AccountError, AccountStore, User};
use super::block::Block;
use super::chain::{Blockchain, BlockchainError, DEFAULT_DIFFICULTY, DEFAULT_MAX_NONCE};
use super::property::{Property, PropertyError, PropertyEvent, PropertyStore};
use super::storage::{JsonStorage, StorageError};

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    AccountError(#[from] AccountError),

    #[error(transparent)]
    PropertyError(#[from] PropertyError),

    #[error(transparent)]
    BlockchainError(#[from] BlockchainError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Parameters for a new or reloaded registry
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Mining difficulty for new blocks
    pub difficulty: u8,

    /// Nonce search bound
    pub max_nonce: u64,

    /// Seed the demo users when no accounts exist yet
    pub seed_demo_users: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        RegistryOptions {
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce: DEFAULT_MAX_NONCE,
            seed_demo_users: true,
        }
    }
}

/// The property registry: users, properties and the chain recording every action
///
/// With storage configured, the three stores are loaded when the registry is
/// opened and written back after every mutation.
#[derive(Debug)]
pub struct Registry {
    accounts: AccountStore,
    properties: PropertyStore,
    chain: Blockchain,
    storage: Option<JsonStorage>,
}

impl Registry {
    /// Creates an in-memory registry
    pub fn new(options: &RegistryOptions) -> Result<Self, RegistryError> {
        let accounts = if options.seed_demo_users {
            AccountStore::with_demo_users()
        } else {
            AccountStore::new()
        };

        Ok(Registry {
            accounts,
            properties: PropertyStore::new(),
            chain: Blockchain::with_difficulty(options.difficulty, options.max_nonce)?,
            storage: None,
        })
    }

    /// Opens a registry persisted in `data_dir`
    ///
    /// Missing files start fresh stores, which are written immediately.
    /// Files that exist but cannot be read are an error, and so are
    /// properties whose owner or renter is not a loaded user.
    pub fn with_storage<P: AsRef<Path>>(
        data_dir: P,
        options: &RegistryOptions,
    ) -> Result<Self, RegistryError> {
        let storage = JsonStorage::new(data_dir)?;
        let mut registry = Registry::new(options)?;

        match storage.load_accounts()? {
            Some(users) => {
                info!("Loaded {} users from storage", users.len());
                registry.accounts = AccountStore::from_users(users)?;
            }
            None => info!(
                "No accounts file found, starting with {} users",
                registry.list_users().len()
            ),
        }

        if let Some(properties) = storage.load_properties()? {
            info!("Loaded {} properties from storage", properties.len());
            registry.properties = PropertyStore::from_properties(properties);
        }
        registry.properties.check_records(&registry.accounts)?;

        match storage.load_chain()? {
            Some(blocks) => {
                info!("Loaded {} blocks from storage", blocks.len());
                registry.chain =
                    Blockchain::from_blocks(blocks, options.difficulty, options.max_nonce)?;

                if let Err(err) = registry.chain.validate_chain() {
                    warn!("Loaded chain does not validate: {}", err);
                }
            }
            None => info!("No existing chain found in storage, creating genesis block"),
        }

        registry.storage = Some(storage);
        registry.save()?;

        Ok(registry)
    }

    /// Writes all three stores to storage, if configured
    pub fn save(&self) -> Result<(), RegistryError> {
        let storage = match &self.storage {
            Some(storage) => storage,
            None => return Ok(()),
        };

        storage.save_accounts(self.accounts.list_users())?;
        storage.save_properties(self.properties.properties())?;
        storage.save_chain(self.chain.blocks())?;

        Ok(())
    }

    /// Registers a new user
    pub fn add_user(
        &mut self,
        name: &str,
        display_name: Option<&str>,
    ) -> Result<User, RegistryError> {
        let user = self.accounts.add_user(name, display_name)?.clone();
        self.save()?;

        info!("Added user {}", user.name);
        Ok(user)
    }

    /// Gets all users in insertion order
    pub fn list_users(&self) -> &[User] {
        self.accounts.list_users()
    }

    /// Registers a property owned by `owner` and mines its `create` block
    pub fn create_property(
        &mut self,
        owner: &str,
        title: &str,
        description: &str,
    ) -> Result<(Property, Block), RegistryError> {
        let created = self.properties.create_property(
            &self.accounts,
            &mut self.chain,
            owner,
            title,
            description,
        )?;
        self.save()?;

        Ok(created)
    }

    /// Transfers a property from its owner `from_user` to `to_user`
    pub fn transfer(
        &mut self,
        property_id: Uuid,
        from_user: &str,
        to_user: &str,
    ) -> Result<(Property, Block), RegistryError> {
        let transferred = self.properties.transfer(
            &self.accounts,
            &mut self.chain,
            property_id,
            from_user,
            to_user,
        )?;
        self.save()?;

        Ok(transferred)
    }

    /// Rents a property from its owner to `renter`
    pub fn rent(
        &mut self,
        property_id: Uuid,
        owner: &str,
        renter: &str,
    ) -> Result<(Property, Block), RegistryError> {
        let rented = self.properties.rent(
            &self.accounts,
            &mut self.chain,
            property_id,
            owner,
            renter,
        )?;
        self.save()?;

        Ok(rented)
    }

    /// Gets the ordered history of a property, empty for unknown ids
    pub fn get_history(&self, property_id: Uuid) -> &[PropertyEvent] {
        self.properties.get_history(property_id)
    }

    pub fn get_property(&self, property_id: Uuid) -> Result<&Property, RegistryError> {
        self.properties
            .get_property(property_id)
            .ok_or(RegistryError::PropertyError(PropertyError::NotFound(property_id)))
    }

    pub fn list_properties(&self) -> Vec<&Property> {
        self.properties.list_properties()
    }

    /// Gets the most recent `n` blocks, oldest first
    pub fn get_last_n_blocks(&self, n: usize) -> &[Block] {
        self.chain.get_last_n_blocks(n)
    }

    /// Checks hashes and links of the whole chain
    pub fn validate_chain(&self) -> Result<(), RegistryError> {
        Ok(self.chain.validate_chain()?)
    }

    pub fn difficulty(&self) -> u8 {
        self.chain.difficulty()
    }

    /// Changes the difficulty used for future blocks
    pub fn set_difficulty(&mut self, difficulty: u8) -> Result<(), RegistryError> {
        self.chain.set_difficulty(difficulty)?;

        info!("Mining difficulty set to {}", difficulty);
        Ok(())
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }
}
