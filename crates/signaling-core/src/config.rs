//! Signaling core configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults. Nothing here is secret; collaborator credentials live with the
//! collaborator implementations.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default registry mailbox buffer size.
pub const DEFAULT_REGISTRY_MAILBOX_BUFFER: usize = 1000;

/// Default per-endpoint notice mailbox buffer size.
pub const DEFAULT_ENDPOINT_MAILBOX_BUFFER: usize = 64;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sb";

/// Signaling core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this signaling instance (log correlation).
    pub instance_id: String,

    /// Registry actor mailbox buffer size.
    pub registry_mailbox_buffer: usize,

    /// Per-endpoint notice mailbox buffer size.
    pub endpoint_mailbox_buffer: usize,

    /// Nicks of resident members seeded into every channel. The embedding
    /// service spawns a bot task per nick and hands the resulting peers to
    /// the registry at startup.
    pub resident_members: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instance_id: generated_instance_id(),
            registry_mailbox_buffer: DEFAULT_REGISTRY_MAILBOX_BUFFER,
            endpoint_mailbox_buffer: DEFAULT_ENDPOINT_MAILBOX_BUFFER,
            resident_members: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not
    /// parse or is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not
    /// parse or is zero.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let instance_id = vars
            .get("SB_INSTANCE_ID")
            .cloned()
            .unwrap_or_else(generated_instance_id);

        let registry_mailbox_buffer = parse_buffer(
            vars,
            "SB_REGISTRY_MAILBOX_BUFFER",
            DEFAULT_REGISTRY_MAILBOX_BUFFER,
        )?;

        let endpoint_mailbox_buffer = parse_buffer(
            vars,
            "SB_ENDPOINT_MAILBOX_BUFFER",
            DEFAULT_ENDPOINT_MAILBOX_BUFFER,
        )?;

        let resident_members = vars
            .get("SB_RESIDENT_MEMBERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|nick| !nick.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            instance_id,
            registry_mailbox_buffer,
            endpoint_mailbox_buffer,
            resident_members,
        })
    }
}

fn parse_buffer(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => {
            let value: usize = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue(name, raw.clone()))?;
            if value == 0 {
                return Err(ConfigError::InvalidValue(name, raw.clone()));
            }
            Ok(value)
        }
    }
}

fn generated_instance_id() -> String {
    let uuid_suffix = uuid::Uuid::new_v4().to_string();
    let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
    format!("{DEFAULT_INSTANCE_ID_PREFIX}-{short_suffix}")
}
