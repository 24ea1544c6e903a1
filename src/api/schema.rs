use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, Property};

/// Request for the add user endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddUserRequest {
    /// Unique user name
    pub name: String,

    /// Human readable name, defaults to `name`
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Request for the create property endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePropertyRequest {
    /// The acting user, who becomes the owner
    pub owner: String,

    pub title: String,

    #[serde(default)]
    pub description: String,
}

/// Request for the transfer endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// The acting user, who must own the property
    pub from: String,

    /// The new owner
    pub to: String,
}

/// Request for the rent endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RentRequest {
    /// The acting user, who must own the property
    pub owner: String,

    pub renter: String,
}

/// Response for endpoints that change a property
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PropertyResponse {
    /// The property after the change
    pub property: Property,

    /// The block mined for the change
    pub block: Block,
}

/// Response for the blocks endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlocksResponse {
    /// The length of the whole chain
    pub length: usize,

    /// Difficulty used for the next block
    pub difficulty: u8,

    /// The requested blocks, newest first
    pub blocks: Vec<Block>,
}

/// Response for the validate endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether the chain is valid
    pub is_valid: bool,

    /// Index of the first broken block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_index: Option<u64>,

    /// Why that block is broken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Request and response body for the difficulty endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DifficultyBody {
    /// Leading zero hex digits required of new block hashes
    pub difficulty: u8,
}

/// Query parameters for the blocks endpoint
#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    /// Number of blocks to return
    pub n: Option<usize>,
}
