// Blockchain module
//
// This module contains the property ledger implementation including:
// - Block structure and proof of work
// - Chain structure
// - Transaction records
// - Account and property stores
// - JSON file storage
// - The registry tying them together

pub mod account;
pub mod block;
pub mod chain;
pub mod property;
pub mod registry;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use account::User;
pub use block::Block;
pub use property::{Property, PropertyEvent};
pub use registry::{Registry, RegistryError, RegistryOptions};
pub use transaction::{Transaction, TransactionKind};
