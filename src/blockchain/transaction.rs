use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The kind of property action a transaction records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// A new property was registered
    Create,

    /// Ownership moved from one user to another
    Transfer,

    /// The owner rented the property to another user
    Rent,
}

/// Represents a transaction in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Version of the transaction structure
    #[serde(default = "default_version")]
    pub version: u32,

    /// Unique identifier for the transaction
    pub id: String,

    /// What happened to the property
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// The property this transaction refers to
    #[schema(value_type = String, example = "5f0c8a3e-6e4a-4b53-9a76-0c4f1f6c1e2d")]
    pub property_id: Uuid,

    /// Previous owner for transfers, owner for rentals, absent for creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Owner for creation, new owner for transfers, renter for rentals
    pub to: String,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,
}

/// Default version for transactions
fn default_version() -> u32 {
    1
}

impl Transaction {
    fn new(kind: TransactionKind, property_id: Uuid, from: Option<String>, to: String) -> Self {
        Transaction {
            version: default_version(),
            id: Uuid::new_v4().to_string(),
            kind,
            property_id,
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    /// Creates a transaction recording the registration of a property
    pub fn create(property_id: Uuid, owner: &str) -> Self {
        Self::new(TransactionKind::Create, property_id, None, owner.to_string())
    }

    /// Creates a transaction recording an ownership transfer
    pub fn transfer(property_id: Uuid, from: &str, to: &str) -> Self {
        Self::new(
            TransactionKind::Transfer,
            property_id,
            Some(from.to_string()),
            to.to_string(),
        )
    }

    /// Creates a transaction recording a rental from `owner` to `renter`
    pub fn rent(property_id: Uuid, owner: &str, renter: &str) -> Self {
        Self::new(
            TransactionKind::Rent,
            property_id,
            Some(owner.to_string()),
            renter.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transaction() {
        let property_id = Uuid::new_v4();
        let transaction = Transaction::create(property_id, "alice");

        assert_eq!(transaction.kind, TransactionKind::Create);
        assert_eq!(transaction.property_id, property_id);
        assert!(transaction.from.is_none());
        assert_eq!(transaction.to, "alice");
        assert!(!transaction.id.is_empty());
    }

    #[test]
    fn test_transfer_and_rent_transactions() {
        let property_id = Uuid::new_v4();

        let transfer = Transaction::transfer(property_id, "alice", "bob");
        assert_eq!(transfer.kind, TransactionKind::Transfer);
        assert_eq!(transfer.from.as_deref(), Some("alice"));
        assert_eq!(transfer.to, "bob");

        let rent = Transaction::rent(property_id, "bob", "carlos");
        assert_eq!(rent.kind, TransactionKind::Rent);
        assert_eq!(rent.from.as_deref(), Some("bob"));
        assert_eq!(rent.to, "carlos");
    }

    #[test]
    fn test_serialized_shape_is_tagged_by_type() {
        let transaction = Transaction::create(Uuid::new_v4(), "alice");
        let value = serde_json::to_value(&transaction).unwrap();

        assert_eq!(value["type"], "create");
        assert_eq!(value["to"], "alice");
        assert!(value.get("from").is_none());

        let parsed: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, transaction);
    }
}
