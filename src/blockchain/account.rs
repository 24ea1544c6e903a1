use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors that can occur during account operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User name must not be empty")]
    InvalidName,
}

/// Represents a registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Version of the user structure
    #[serde(default = "default_version")]
    pub version: u32,

    /// Unique name, used to reference the user everywhere else
    pub name: String,

    /// Human readable name
    pub display_name: String,

    /// Timestamp when the user was added
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,
}

/// Default version for users
fn default_version() -> u32 {
    1
}

impl User {
    /// Creates a new user
    ///
    /// # Arguments
    ///
    /// * `name` - The unique user name
    /// * `display_name` - Human readable name, defaults to `name`
    pub fn new(name: &str, display_name: Option<&str>) -> Self {
        User {
            version: default_version(),
            name: name.to_string(),
            display_name: display_name.unwrap_or(name).to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Registered users in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountStore {
    users: Vec<User>,
}

impl AccountStore {
    /// Creates an empty account store
    pub fn new() -> Self {
        AccountStore { users: Vec::new() }
    }

    /// Creates a store seeded with the demo users of a fresh installation
    pub fn with_demo_users() -> Self {
        let users = [("alice", "Alice Demo"), ("bob", "Bob Demo"), ("carlos", "Carlos Demo")]
            .into_iter()
            .map(|(name, display_name)| User::new(name, Some(display_name)))
            .collect();

        AccountStore { users }
    }

    /// Rebuilds a store from persisted users
    ///
    /// # Returns
    ///
    /// `DuplicateUser` if two records share a name
    pub fn from_users(users: Vec<User>) -> Result<Self, AccountError> {
        let mut store = AccountStore::new();

        for user in users {
            if store.contains(&user.name) {
                return Err(AccountError::DuplicateUser(user.name));
            }
            store.users.push(user);
        }

        Ok(store)
    }

    /// Registers a new user
    ///
    /// # Arguments
    ///
    /// * `name` - The unique user name
    /// * `display_name` - Optional human readable name
    ///
    /// # Returns
    ///
    /// The newly added user, or `DuplicateUser` if the name is taken
    pub fn add_user(
        &mut self,
        name: &str,
        display_name: Option<&str>,
    ) -> Result<&User, AccountError> {
        if name.is_empty() {
            return Err(AccountError::InvalidName);
        }

        if self.contains(name) {
            return Err(AccountError::DuplicateUser(name.to_string()));
        }

        self.users.push(User::new(name, display_name));
        Ok(&self.users[self.users.len() - 1])
    }

    /// Gets all users in insertion order
    pub fn list_users(&self) -> &[User] {
        &self.users
    }

    /// Gets a user by name
    pub fn get_user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.name == name)
    }

    /// Checks if a user is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get_user(name).is_some()
    }

    /// Gets a user by name, failing with `UnknownUser` if absent
    pub fn require(&self, name: &str) -> Result<&User, AccountError> {
        self.get_user(name)
            .ok_or_else(|| AccountError::UnknownUser(name.to_string()))
    }
}
