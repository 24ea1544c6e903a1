use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::account::{AccountError, AccountStore};
use super::block::Block;
use super::chain::{Blockchain, BlockchainError};
use super::transaction::{Transaction, TransactionKind};

/// Errors that can occur during property operations
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("Property not found: {0}")]
    NotFound(Uuid),

    #[error("User {user} does not own property {property}")]
    NotOwner { property: Uuid, user: String },

    #[error("Owner cannot rent to themselves: {0}")]
    SelfRent(String),

    #[error("Cannot transfer to same owner: {0}")]
    SelfTransfer(String),

    #[error("Invalid property record {property}: {reason}")]
    InvalidRecord { property: Uuid, reason: String },

    #[error("Account error: {0}")]
    AccountError(#[from] AccountError),

    #[error("Blockchain error: {0}")]
    BlockchainError(#[from] BlockchainError),
}

/// An entry in a property's history, pointing at the block that recorded it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PropertyEvent {
    /// Identifier of the recorded transaction
    pub transaction_id: String,

    #[serde(rename = "type")]
    pub kind: TransactionKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    pub to: String,

    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Index of the block holding the transaction
    pub block_index: u64,
}

impl PropertyEvent {
    fn recorded(transaction: &Transaction, block: &Block) -> Self {
        PropertyEvent {
            transaction_id: transaction.id.clone(),
            kind: transaction.kind,
            from: transaction.from.clone(),
            to: transaction.to.clone(),
            timestamp: transaction.timestamp,
            block_index: block.index,
        }
    }
}

/// Represents a registered property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Property {
    /// Version of the property structure
    #[serde(default = "default_version")]
    pub version: u32,

    #[schema(value_type = String, example = "5f0c8a3e-6e4a-4b53-9a76-0c4f1f6c1e2d")]
    pub id: Uuid,

    pub title: String,

    pub description: String,

    /// Name of the owning user
    pub owner: String,

    /// Name of the user currently renting, never the owner
    #[serde(default)]
    pub renter: Option<String>,

    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    /// Every recorded action, oldest first
    #[serde(default)]
    pub history: Vec<PropertyEvent>,
}

/// Default version for properties
fn default_version() -> u32 {
    1
}

/// Registered properties keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyStore {
    properties: BTreeMap<Uuid, Property>,
}

impl PropertyStore {
    /// Creates an empty property store
    pub fn new() -> Self {
        PropertyStore {
            properties: BTreeMap::new(),
        }
    }

    /// Rebuilds a store from persisted properties
    pub fn from_properties(properties: BTreeMap<Uuid, Property>) -> Self {
        PropertyStore { properties }
    }

    /// Checks every record against the registered users
    ///
    /// Each record must sit under its own id, have a registered owner, and
    /// have no renter or a registered renter other than the owner.
    pub fn check_records(&self, accounts: &AccountStore) -> Result<(), PropertyError> {
        for (key, property) in &self.properties {
            let invalid = |reason: String| PropertyError::InvalidRecord {
                property: *key,
                reason,
            };

            if property.id != *key {
                return Err(invalid(format!("stored under a different id {}", property.id)));
            }
            if !accounts.contains(&property.owner) {
                return Err(invalid(format!("owner {} is not registered", property.owner)));
            }
            if let Some(renter) = &property.renter {
                if renter == &property.owner {
                    return Err(invalid(format!("renter {} is also the owner", renter)));
                }
                if !accounts.contains(renter) {
                    return Err(invalid(format!("renter {} is not registered", renter)));
                }
            }
        }

        Ok(())
    }

    /// Gets the underlying map, for persistence
    pub fn properties(&self) -> &BTreeMap<Uuid, Property> {
        &self.properties
    }

    /// Registers a new property and records its creation on the chain
    ///
    /// # Arguments
    ///
    /// * `accounts` - Registered users, `owner` must be one of them
    /// * `chain` - The chain the `create` transaction is mined into
    /// * `owner` - Name of the owning user
    /// * `title` - Property title
    /// * `description` - Property description
    ///
    /// # Returns
    ///
    /// The new property and the block that recorded it
    pub fn create_property(
        &mut self,
        accounts: &AccountStore,
        chain: &mut Blockchain,
        owner: &str,
        title: &str,
        description: &str,
    ) -> Result<(Property, Block), PropertyError> {
        accounts.require(owner)?;

        let id = Uuid::new_v4();
        let transaction = Transaction::create(id, owner);
        let block = chain.record_transaction(transaction.clone())?;

        let property = Property {
            version: default_version(),
            id,
            title: title.to_string(),
            description: description.to_string(),
            owner: owner.to_string(),
            renter: None,
            created_at: transaction.timestamp,
            history: vec![PropertyEvent::recorded(&transaction, &block)],
        };
        self.properties.insert(id, property.clone());

        info!("Property {} created by {} in block {}", id, owner, block.index);
        Ok((property, block))
    }

    /// Transfers ownership of a property
    ///
    /// Checks, in order: the property exists, `from_user` owns it, `to_user`
    /// is someone else, and `to_user` is registered. Transferring to the
    /// current renter ends the rental; any other renter is kept.
    pub fn transfer(
        &mut self,
        accounts: &AccountStore,
        chain: &mut Blockchain,
        property_id: Uuid,
        from_user: &str,
        to_user: &str,
    ) -> Result<(Property, Block), PropertyError> {
        let property = self.require(property_id)?;
        if property.owner != from_user {
            return Err(PropertyError::NotOwner {
                property: property_id,
                user: from_user.to_string(),
            });
        }
        if to_user == from_user {
            return Err(PropertyError::SelfTransfer(to_user.to_string()));
        }
        accounts.require(to_user)?;

        let transaction = Transaction::transfer(property_id, from_user, to_user);
        let block = chain.record_transaction(transaction.clone())?;

        let property = self.require_mut(property_id)?;
        property.owner = to_user.to_string();
        if property.renter.as_deref() == Some(to_user) {
            property.renter = None;
        }
        property.history.push(PropertyEvent::recorded(&transaction, &block));

        info!(
            "Property {} transferred from {} to {} in block {}",
            property_id, from_user, to_user, block.index
        );
        Ok((property.clone(), block))
    }

    /// Rents a property out; the owner stays the same
    ///
    /// Checks, in order: the property exists, `renter` differs from `owner`,
    /// `owner` owns it, and `renter` is registered.
    pub fn rent(
        &mut self,
        accounts: &AccountStore,
        chain: &mut Blockchain,
        property_id: Uuid,
        owner: &str,
        renter: &str,
    ) -> Result<(Property, Block), PropertyError> {
        let property = self.require(property_id)?;
        if renter == owner {
            return Err(PropertyError::SelfRent(renter.to_string()));
        }
        if property.owner != owner {
            return Err(PropertyError::NotOwner {
                property: property_id,
                user: owner.to_string(),
            });
        }
        accounts.require(renter)?;

        let transaction = Transaction::rent(property_id, owner, renter);
        let block = chain.record_transaction(transaction.clone())?;

        let property = self.require_mut(property_id)?;
        property.renter = Some(renter.to_string());
        property.history.push(PropertyEvent::recorded(&transaction, &block));

        info!(
            "Property {} rented by {} to {} in block {}",
            property_id, owner, renter, block.index
        );
        Ok((property.clone(), block))
    }

    /// Gets the ordered history of a property, empty if there is none
    pub fn get_history(&self, property_id: Uuid) -> &[PropertyEvent] {
        self.properties
            .get(&property_id)
            .map(|property| property.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_property(&self, property_id: Uuid) -> Option<&Property> {
        self.properties.get(&property_id)
    }

    /// Gets every property, oldest first
    pub fn list_properties(&self) -> Vec<&Property> {
        let mut properties: Vec<&Property> = self.properties.values().collect();
        properties.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        properties
    }

    fn require(&self, property_id: Uuid) -> Result<&Property, PropertyError> {
        self.properties
            .get(&property_id)
            .ok_or(PropertyError::NotFound(property_id))
    }

    fn require_mut(&mut self, property_id: Uuid) -> Result<&mut Property, PropertyError> {
        self.properties
            .get_mut(&property_id)
            .ok_or(PropertyError::NotFound(property_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain::{DEFAULT_MAX_NONCE, MAX_DIFFICULTY};

    fn setup() -> (AccountStore, Blockchain, PropertyStore) {
        let accounts = AccountStore::with_demo_users();
        let chain = Blockchain::with_difficulty(1, DEFAULT_MAX_NONCE).unwrap();
        (accounts, chain, PropertyStore::new())
    }

    #[test]
    fn test_create_property() {
        let (accounts, mut chain, mut store) = setup();

        let (property, block) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();

        assert_eq!(property.owner, "alice");
        assert_eq!(property.title, "T");
        assert_eq!(property.description, "D");
        assert!(property.renter.is_none());
        assert_eq!(block.index, 1);
        assert_eq!(block.transactions[0].kind, TransactionKind::Create);
        assert_eq!(block.transactions[0].property_id, property.id);

        let history = store.get_history(property.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Create);
        assert_eq!(history[0].to, "alice");
        assert_eq!(history[0].block_index, 1);
    }

    #[test]
    fn test_create_property_unknown_owner() {
        let (accounts, mut chain, mut store) = setup();

        let result = store.create_property(&accounts, &mut chain, "mallory", "T", "D");

        assert!(matches!(
            result,
            Err(PropertyError::AccountError(AccountError::UnknownUser(_)))
        ));
        assert!(store.list_properties().is_empty());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_transfer() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();
        store
            .rent(&accounts, &mut chain, property.id, "alice", "carlos")
            .unwrap();
        let chain_len = chain.len();

        let (updated, block) = store
            .transfer(&accounts, &mut chain, property.id, "alice", "bob")
            .unwrap();

        assert_eq!(updated.owner, "bob");
        assert_eq!(updated.renter.as_deref(), Some("carlos"));
        assert_eq!(chain.len(), chain_len + 1);
        assert!(block.transactions.iter().any(|tx| {
            tx.kind == TransactionKind::Transfer
                && tx.property_id == property.id
                && tx.from.as_deref() == Some("alice")
                && tx.to == "bob"
        }));

        let history = store.get_history(property.id);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].kind, TransactionKind::Transfer);
        assert_eq!(history[2].block_index, block.index);
    }

    #[test]
    fn test_transfer_by_non_owner() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();

        let result = store.transfer(&accounts, &mut chain, property.id, "bob", "carlos");

        assert!(matches!(result, Err(PropertyError::NotOwner { .. })));
        assert_eq!(store.get_property(property.id).unwrap().owner, "alice");
        assert_eq!(store.get_history(property.id).len(), 1);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_transfer_errors() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();

        assert!(matches!(
            store.transfer(&accounts, &mut chain, Uuid::new_v4(), "alice", "bob"),
            Err(PropertyError::NotFound(_))
        ));
        assert!(matches!(
            store.transfer(&accounts, &mut chain, property.id, "alice", "alice"),
            Err(PropertyError::SelfTransfer(_))
        ));
        assert!(matches!(
            store.transfer(&accounts, &mut chain, property.id, "alice", "mallory"),
            Err(PropertyError::AccountError(AccountError::UnknownUser(_)))
        ));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_transfer_to_renter_ends_rental() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();
        store
            .rent(&accounts, &mut chain, property.id, "alice", "bob")
            .unwrap();

        let (updated, _) = store
            .transfer(&accounts, &mut chain, property.id, "alice", "bob")
            .unwrap();

        assert_eq!(updated.owner, "bob");
        assert!(updated.renter.is_none());
    }

    #[test]
    fn test_rent() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();

        let (updated, block) = store
            .rent(&accounts, &mut chain, property.id, "alice", "bob")
            .unwrap();

        assert_eq!(updated.owner, "alice");
        assert_eq!(updated.renter.as_deref(), Some("bob"));
        assert_eq!(block.transactions[0].kind, TransactionKind::Rent);

        let history = store.get_history(property.id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, TransactionKind::Rent);
        assert_eq!(history[1].from.as_deref(), Some("alice"));
        assert_eq!(history[1].to, "bob");
    }

    #[test]
    fn test_rent_to_self() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();
        store
            .transfer(&accounts, &mut chain, property.id, "alice", "bob")
            .unwrap();

        let result = store.rent(&accounts, &mut chain, property.id, "bob", "bob");
        assert!(matches!(result, Err(PropertyError::SelfRent(_))));

        // Also when the caller is not the owner
        let result = store.rent(&accounts, &mut chain, property.id, "carlos", "carlos");
        assert!(matches!(result, Err(PropertyError::SelfRent(_))));

        assert!(store.get_property(property.id).unwrap().renter.is_none());
    }

    #[test]
    fn test_rent_errors() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();

        assert!(matches!(
            store.rent(&accounts, &mut chain, Uuid::new_v4(), "alice", "bob"),
            Err(PropertyError::NotFound(_))
        ));
        assert!(matches!(
            store.rent(&accounts, &mut chain, property.id, "bob", "carlos"),
            Err(PropertyError::NotOwner { .. })
        ));
        assert!(matches!(
            store.rent(&accounts, &mut chain, property.id, "alice", "mallory"),
            Err(PropertyError::AccountError(AccountError::UnknownUser(_)))
        ));
    }

    #[test]
    fn test_failed_mining_leaves_property_unchanged() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();

        let mut stuck_chain = Blockchain::with_difficulty(MAX_DIFFICULTY, 10).unwrap();
        let result = store.transfer(&accounts, &mut stuck_chain, property.id, "alice", "bob");

        assert!(matches!(
            result,
            Err(PropertyError::BlockchainError(
                BlockchainError::MiningExhausted { .. }
            ))
        ));
        assert_eq!(store.get_property(property.id).unwrap(), &property);
    }

    #[test]
    fn test_history_of_unknown_property_is_empty() {
        let store = PropertyStore::new();
        assert!(store.get_history(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_list_properties_oldest_first() {
        let (accounts, mut chain, mut store) = setup();
        let (first, _) = store
            .create_property(&accounts, &mut chain, "alice", "First", "")
            .unwrap();
        let (second, _) = store
            .create_property(&accounts, &mut chain, "bob", "Second", "")
            .unwrap();

        let listed: Vec<Uuid> = store.list_properties().iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }

    #[test]
    fn test_check_records() {
        let (accounts, mut chain, mut store) = setup();
        let (property, _) = store
            .create_property(&accounts, &mut chain, "alice", "T", "D")
            .unwrap();
        store
            .rent(&accounts, &mut chain, property.id, "alice", "bob")
            .unwrap();
        assert!(store.check_records(&accounts).is_ok());

        // Owner missing from the accounts
        let mut only_bob = AccountStore::new();
        only_bob.add_user("bob", None).unwrap();
        assert!(matches!(
            store.check_records(&only_bob),
            Err(PropertyError::InvalidRecord { property: id, .. }) if id == property.id
        ));

        // Renter equal to the owner
        let mut record = store.get_property(property.id).unwrap().clone();
        record.renter = Some("alice".to_string());
        let rented_to_owner = PropertyStore::from_properties(BTreeMap::from([(record.id, record)]));
        assert!(matches!(
            rented_to_owner.check_records(&accounts),
            Err(PropertyError::InvalidRecord { .. })
        ));

        // Record stored under another key
        let record = store.get_property(property.id).unwrap().clone();
        let misfiled = PropertyStore::from_properties(BTreeMap::from([(Uuid::new_v4(), record)]));
        assert!(matches!(
            misfiled.check_records(&accounts),
            Err(PropertyError::InvalidRecord { .. })
        ));
    }
}
