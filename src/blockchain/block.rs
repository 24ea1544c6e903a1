use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Previous hash recorded by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Represents a block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Version of the block structure
    #[serde(default = "default_version")]
    pub version: u32,

    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work (nonce)
    pub nonce: u64,

    /// Number of leading zero hex digits the hash was mined to
    #[serde(default)]
    pub difficulty: u8,

    /// Hash of the current block (calculated)
    pub hash: String,
}

/// Default version for blocks
fn default_version() -> u32 {
    1
}

impl Block {
    /// Creates a new block and computes its hash
    ///
    /// The hash is not checked against `difficulty`; use
    /// [`Block::meets_difficulty`] or mine it through the chain.
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
        nonce: u64,
        difficulty: u8,
    ) -> Self {
        let mut block = Block {
            version: default_version(),
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            difficulty,
            hash: String::new(),
        };

        block.hash = block.calculate_hash();
        block
    }

    /// Creates the genesis block (first block in the chain)
    pub fn genesis() -> Self {
        Block::new(0, Utc::now(), Vec::new(), GENESIS_PREVIOUS_HASH.to_string(), 0, 0)
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of every field except `hash`, as a lowercase hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let block_data = serde_json::json!({
            "version": self.version,
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
            "difficulty": self.difficulty,
        });

        let mut hasher = Sha256::new();
        hasher.update(block_data.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Checks that the stored hash has the leading zeros this block was mined for
    pub fn meets_difficulty(&self) -> bool {
        hash_meets_difficulty(&self.hash, self.difficulty)
    }

    /// Checks that the stored hash matches the block contents
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }
}

/// Checks that `hash` starts with at least `difficulty` zero characters
pub fn hash_meets_difficulty(hash: &str, difficulty: u8) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
