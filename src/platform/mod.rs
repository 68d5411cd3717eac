//! Chat-platform capabilities the moderation core depends on
//!
//! The core never talks to Discord directly. It asks a [`Platform`] to change
//! roles, post log messages and look members up, which keeps the scheduler and
//! audit log testable with a mock.

mod discord;

pub use discord::{SerenityPlatform, embed, to_utc};

use crate::error::PaladinResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A rendered moderation log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub title: String,
    pub colour: u32,
    pub description: Option<String>,
    /// `(name, value, inline)`
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
}

impl LogMessage {
    #[must_use]
    pub fn new(title: impl Into<String>, colour: u32) -> Self {
        Self {
            title: title.into(),
            colour,
            description: None,
            fields: Vec::new(),
            footer: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push((name.into(), value.into(), inline));
        self
    }

    #[must_use]
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Value of the first field called `name`
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _, _)| field == name)
            .map(|(_, value, _)| value.as_str())
    }
}

/// A guild member as seen by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: u64,
    pub display_name: String,
    pub roles: Vec<u64>,
}

/// Enough of a channel message to decide whether to delete it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: u64,
    pub author_id: u64,
    pub timestamp: DateTime<Utc>,
    pub pinned: bool,
}

/// Platform operations used by the scheduler, audit log and gateway handlers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Give `user_id` a role
    async fn add_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: Option<String>,
    ) -> PaladinResult<()>;

    /// Take a role away from `user_id`
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64)
    -> PaladinResult<()>;

    async fn kick_member(&self, guild_id: u64, user_id: u64, reason: Option<String>)
    -> PaladinResult<()>;

    async fn ban_member(&self, guild_id: u64, user_id: u64, reason: Option<String>)
    -> PaladinResult<()>;

    /// Post a log entry, returning the id of the sent message
    async fn send_moderation_log(&self, channel_id: u64, message: &LogMessage)
    -> PaladinResult<u64>;

    /// Look a member up, `None` if they are not in the guild
    async fn resolve_member(&self, guild_id: u64, user_id: u64)
    -> PaladinResult<Option<MemberInfo>>;

    /// The most recent `limit` messages of a channel, newest first
    async fn recent_messages(&self, channel_id: u64, limit: u8)
    -> PaladinResult<Vec<MessageSummary>>;

    /// Delete messages from a channel
    async fn delete_messages(&self, channel_id: u64, message_ids: Vec<u64>) -> PaladinResult<()>;

    /// Id of the bot account, used as the moderator of automatic actions
    fn current_user_id(&self) -> u64;
}
