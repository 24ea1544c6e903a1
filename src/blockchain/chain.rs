use chrono::{DateTime, Utc};
use log::{debug, info};
use thiserror::Error;

use super::block::{Block, GENESIS_PREVIOUS_HASH};
use super::transaction::Transaction;

/// Difficulty used when none is configured
pub const DEFAULT_DIFFICULTY: u8 = 2;

/// A SHA-256 hex digest has 64 characters, so no hash can have more leading zeros
pub const MAX_DIFFICULTY: u8 = 64;

/// Upper bound on nonces tried before mining gives up
pub const DEFAULT_MAX_NONCE: u64 = 10_000_000;

/// Errors that can occur during chain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Chain integrity broken at block {index}: {reason}")]
    ChainIntegrityBroken { index: u64, reason: String },

    #[error("No nonce below {attempts} gives block {index} a hash with {difficulty} leading zeros")]
    MiningExhausted {
        index: u64,
        difficulty: u8,
        attempts: u64,
    },

    #[error("Invalid difficulty: {0} (maximum: 64)")]
    InvalidDifficulty(u8),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),
}

/// Append-only chain of mined blocks
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks, never empty
    chain: Vec<Block>,

    /// Transactions waiting to be included in the next block
    pending_transactions: Vec<Transaction>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: u8,

    /// Nonce search bound
    max_nonce: u64,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new chain holding only a genesis block
    pub fn new() -> Self {
        Blockchain {
            chain: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce: DEFAULT_MAX_NONCE,
        }
    }

    /// Creates a new chain with explicit mining parameters
    pub fn with_difficulty(difficulty: u8, max_nonce: u64) -> Result<Self, BlockchainError> {
        let mut blockchain = Self::new();
        blockchain.set_difficulty(difficulty)?;
        blockchain.max_nonce = max_nonce;
        Ok(blockchain)
    }

    /// Rebuilds a chain from previously persisted blocks
    ///
    /// The blocks are taken as they are; call [`Blockchain::validate_chain`]
    /// to check them.
    pub fn from_blocks(
        blocks: Vec<Block>,
        difficulty: u8,
        max_nonce: u64,
    ) -> Result<Self, BlockchainError> {
        if blocks.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "a chain needs at least a genesis block".to_string(),
            ));
        }

        let mut blockchain = Blockchain {
            chain: blocks,
            pending_transactions: Vec::new(),
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce,
        };
        blockchain.set_difficulty(difficulty)?;
        Ok(blockchain)
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Adds a transaction to the pending list without mining
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn append_transaction(&mut self, transaction: Transaction) -> u64 {
        self.pending_transactions.push(transaction);
        self.last_block().map_or(0, |block| block.index + 1)
    }

    /// Mines a new block holding every pending transaction and appends it
    ///
    /// On failure the pending transactions are kept.
    pub fn mine_pending(&mut self) -> Result<Block, BlockchainError> {
        if self.pending_transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "no pending transactions to mine".to_string(),
            ));
        }

        let last_block = self.last_block().ok_or_else(|| {
            BlockchainError::InvalidBlock("chain has no genesis block".to_string())
        })?;
        let new_block = mine_block(
            last_block.index + 1,
            Utc::now(),
            self.pending_transactions.clone(),
            last_block.hash.clone(),
            self.difficulty,
            self.max_nonce,
        )?;

        self.pending_transactions.clear();
        self.chain.push(new_block.clone());

        info!(
            "Mined block {} with {} transaction(s), nonce {}",
            new_block.index,
            new_block.transactions.len(),
            new_block.nonce
        );

        Ok(new_block)
    }

    /// Records a single transaction in its own freshly mined block
    ///
    /// If mining fails the transaction is dropped from the pending list, so a
    /// failed action never leaks into a later block.
    pub fn record_transaction(
        &mut self,
        transaction: Transaction,
    ) -> Result<Block, BlockchainError> {
        let id = transaction.id.clone();
        self.append_transaction(transaction);

        self.mine_pending().map_err(|err| {
            self.pending_transactions.retain(|pending| pending.id != id);
            err
        })
    }

    /// Gets the most recent `n` blocks, oldest first
    pub fn get_last_n_blocks(&self, n: usize) -> &[Block] {
        let start = self.chain.len().saturating_sub(n);
        &self.chain[start..]
    }

    /// Gets the entire chain
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Gets all pending transactions
    #[cfg(test)]
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Changes the difficulty used for future blocks
    pub fn set_difficulty(&mut self, difficulty: u8) -> Result<(), BlockchainError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::InvalidDifficulty(difficulty));
        }

        self.difficulty = difficulty;
        Ok(())
    }

    /// Validates the chain
    ///
    /// # Returns
    ///
    /// `Ok(())` if every block is intact, or `ChainIntegrityBroken` for the
    /// first block that is not
    pub fn validate_chain(&self) -> Result<(), BlockchainError> {
        let broken = |index: u64, reason: &str| BlockchainError::ChainIntegrityBroken {
            index,
            reason: reason.to_string(),
        };

        let genesis = self
            .chain
            .first()
            .ok_or_else(|| broken(0, "chain has no genesis block"))?;
        if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(broken(0, "genesis block is malformed"));
        }
        if !genesis.has_valid_hash() {
            return Err(broken(0, "stored hash does not match block contents"));
        }

        for (position, pair) in self.chain.windows(2).enumerate() {
            let previous_block = &pair[0];
            let current_block = &pair[1];
            let expected_index = position as u64 + 1;

            if current_block.index != expected_index {
                return Err(broken(expected_index, "block index is out of sequence"));
            }

            // Check if the hash is correct
            if !current_block.has_valid_hash() {
                return Err(broken(
                    current_block.index,
                    "stored hash does not match block contents",
                ));
            }

            // Check if the previous hash is correct
            if current_block.previous_hash != previous_block.hash {
                return Err(broken(
                    current_block.index,
                    "previous hash does not match the preceding block",
                ));
            }

            if !current_block.meets_difficulty() {
                return Err(broken(
                    current_block.index,
                    "hash does not satisfy the recorded difficulty",
                ));
            }
        }

        Ok(())
    }
}

/// Performs proof of work to find a valid hash
///
/// Nonces are tried in ascending order starting at zero, so the same inputs
/// always yield the same block.
///
/// # Arguments
///
/// * `index` - The index of the new block
/// * `timestamp` - The block timestamp, fixed for the whole search
/// * `transactions` - The transactions to include in the block
/// * `previous_hash` - The hash of the previous block
/// * `difficulty` - Leading zero hex digits required
/// * `max_nonce` - Number of nonces to try before giving up
pub fn mine_block(
    index: u64,
    timestamp: DateTime<Utc>,
    transactions: Vec<Transaction>,
    previous_hash: String,
    difficulty: u8,
    max_nonce: u64,
) -> Result<Block, BlockchainError> {
    let mut block = Block::new(index, timestamp, transactions, previous_hash, 0, difficulty);

    for nonce in 0..max_nonce {
        block.nonce = nonce;
        block.hash = block.calculate_hash();

        if block.meets_difficulty() {
            debug!("Found nonce {} for block {} at difficulty {}", nonce, index, difficulty);
            return Ok(block);
        }
    }

    Err(BlockchainError::MiningExhausted {
        index,
        difficulty,
        attempts: max_nonce,
    })
}
