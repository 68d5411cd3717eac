//! Per-member moderation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Warning and mute state of one user in one guild.
///
/// `muted` with no `unmute_time` is an indefinite mute. `muted` with an
/// `unmute_time` in the past is a mute whose expiry has not fired yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub guild_id: u64,
    pub user_id: u64,
    pub warnings: u32,
    pub muted: bool,
    pub unmute_time: Option<DateTime<Utc>>,
}

impl MemberState {
    #[must_use]
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self {
            guild_id,
            user_id,
            warnings: 0,
            muted: false,
            unmute_time: None,
        }
    }

    /// Whether this member needs a live unmute timer
    #[must_use]
    pub fn has_pending_unmute(&self) -> bool {
        self.muted && self.unmute_time.is_some()
    }

    /// Whether the mute has a deadline at or before `now`
    #[must_use]
    pub fn mute_expired(&self, now: DateTime<Utc>) -> bool {
        self.muted && self.unmute_time.is_some_and(|deadline| deadline <= now)
    }
}
