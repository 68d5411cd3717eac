//! Error types for the moderation core
//!
//! Every fallible operation of the store, scheduler, event bus and platform
//! bindings reports one of these variants.

use thiserror::Error;

/// Errors that can occur inside the moderation core
#[derive(Debug, Error)]
pub enum PaladinError {
    /// The persistence backend could not be read or written
    #[error("Store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    /// A value could not be encoded for storage
    #[error("Failed to serialize {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be decoded
    #[error("Malformed record at {key}: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The store snapshot file could not be encoded or decoded
    #[error("Store snapshot error: {0}")]
    Snapshot(#[from] serde_yaml::Error),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// A required guild setting has not been configured
    #[error("Guild {guild_id} has no {setting} configured")]
    NotConfigured {
        guild_id: u64,
        setting: &'static str,
    },

    /// No audit record exists for an action id
    #[error("No action {action_id} recorded in guild {guild_id}")]
    ActionNotFound { guild_id: u64, action_id: u64 },

    /// The timer engine is not accepting jobs
    #[error("Scheduler is not running")]
    SchedulerNotRunning,

    /// The event bus has been shut down
    #[error("Event bus is closed")]
    BusClosed,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for PaladinError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl From<String> for PaladinError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for core operations
pub type PaladinResult<T> = Result<T, PaladinError>;
