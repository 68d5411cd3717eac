//! Moderation action events
//!
//! An [`Action`] describes a moderation effect that just happened. Producers
//! build one, hand it to the bus, and every subscriber of its topic reads the
//! same shared instance.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Topic every moderation action is published under by default
pub const MOD_ACTION_TOPIC: &str = "modAction";

/// Kind of moderation action, stored as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ActionKind {
    #[display("Kick")]
    Kick,
    #[display("Ban")]
    Ban,
    #[display("Purge")]
    Purge,
    #[display("Warn")]
    Warn,
    #[display("Role Give")]
    RoleGive,
    #[display("Role Remove")]
    RoleRemove,
    #[display("Mute")]
    Mute,
    #[display("Unmute")]
    Unmute,
    /// A code this build does not know about
    #[display("Unknown ({_0})")]
    Unknown(u8),
}

impl From<u8> for ActionKind {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Kick,
            2 => Self::Ban,
            3 => Self::Purge,
            4 => Self::Warn,
            5 => Self::RoleGive,
            6 => Self::RoleRemove,
            7 => Self::Mute,
            8 => Self::Unmute,
            other => {
                warn!("Unrecognized action kind code {other}");
                Self::Unknown(other)
            }
        }
    }
}

impl From<ActionKind> for u8 {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Kick => 1,
            ActionKind::Ban => 2,
            ActionKind::Purge => 3,
            ActionKind::Warn => 4,
            ActionKind::RoleGive => 5,
            ActionKind::RoleRemove => 6,
            ActionKind::Mute => 7,
            ActionKind::Unmute => 8,
            ActionKind::Unknown(code) => code,
        }
    }
}

/// Who performed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Moderator {
    /// A guild moderator
    #[display("<@{_0}>")]
    User(u64),
    /// The bot itself, acting automatically
    #[display("Automatic")]
    System,
}

/// Kind-specific payload of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionExtra {
    /// Warning count after a warn
    Warnings(u32),
    /// Channel a purge ran in
    Channel(u64),
    /// Role given or removed
    Role { id: u64, name: String },
    /// Free text
    Note(String),
}

/// Whether the action actually took effect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    #[default]
    Succeeded,
    /// The action was attempted but failed
    Failed(String),
}

impl ActionOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A moderation action destined for the audit and notification subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub moderator: Moderator,
    pub guild_id: u64,
    pub user_id: Option<u64>,
    pub role_id: Option<u64>,
    pub reason: Option<String>,
    pub extra: Option<ActionExtra>,
    pub outcome: ActionOutcome,
    /// Routing key on the event bus
    pub topic: String,
}

impl Action {
    /// Create an action on the default `modAction` topic
    #[must_use]
    pub fn new(kind: ActionKind, moderator: Moderator, guild_id: u64) -> Self {
        Self {
            kind,
            moderator,
            guild_id,
            user_id: None,
            role_id: None,
            reason: None,
            extra: None,
            outcome: ActionOutcome::Succeeded,
            topic: MOD_ACTION_TOPIC.to_string(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_role(mut self, role_id: u64, name: impl Into<String>) -> Self {
        self.role_id = Some(role_id);
        self.extra = Some(ActionExtra::Role {
            id: role_id,
            name: name.into(),
        });
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<Option<String>>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: ActionExtra) -> Self {
        self.extra = Some(extra);
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Mark the action as attempted but failed
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.outcome = ActionOutcome::Failed(error.into());
        self
    }
}
