use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;

use crate::blockchain::chain::{DEFAULT_DIFFICULTY, DEFAULT_MAX_NONCE};
use crate::blockchain::RegistryOptions;

/// Runtime configuration, read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the three JSON files
    pub data_dir: PathBuf,

    pub host: String,

    pub port: u16,

    /// Initial mining difficulty
    pub difficulty: u8,

    /// Nonce search bound
    pub max_nonce: u64,

    /// Seed the demo users in a fresh data directory
    pub seed_demo_users: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data_demo"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce: DEFAULT_MAX_NONCE,
            seed_demo_users: true,
        }
    }
}

impl Config {
    /// Reads the configuration from `PROPERTY_CHAIN_*` variables, after loading `.env` if present
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    ///
    /// Missing variables use the default; unparseable ones do too, with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Config {
            data_dir: lookup("PROPERTY_CHAIN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: lookup("PROPERTY_CHAIN_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PROPERTY_CHAIN_PORT", defaults.port),
            difficulty: parse_or(&lookup, "PROPERTY_CHAIN_DIFFICULTY", defaults.difficulty),
            max_nonce: parse_or(&lookup, "PROPERTY_CHAIN_MAX_NONCE", defaults.max_nonce),
            seed_demo_users: parse_or(
                &lookup,
                "PROPERTY_CHAIN_SEED_DEMO_USERS",
                defaults.seed_demo_users,
            ),
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            difficulty: self.difficulty,
            max_nonce: self.max_nonce,
            seed_demo_users: self.seed_demo_users,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        None => default,
    }
}
