//! Per-guild configuration record

use serde::{Deserialize, Serialize};

/// A channel whose messages are deleted after a fixed age
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDeleteChannel {
    pub channel_id: u64,
    pub delete_after_minutes: u32,
}

/// Guild configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    // The ID of the guild
    pub guild_id: u64,
    // Role given to muted members
    #[serde(default)]
    pub role_mute_id: Option<u64>,
    // Channel receiving the audit entry of every moderation action
    #[serde(default)]
    pub channel_action_log_id: Option<u64>,
    // Channel receiving link detection and other moderation notices
    #[serde(default)]
    pub channel_mod_log_id: Option<u64>,
    #[serde(default)]
    pub auto_delete_data: Vec<AutoDeleteChannel>,
    #[serde(default)]
    pub vote_channel_data: Vec<u64>,
    #[serde(default)]
    pub block_guild_invites: bool,
    // Guilds whose invites are never deleted
    #[serde(default)]
    pub allowed_guild_invites: Vec<u64>,
    #[serde(default)]
    pub block_bot_invites: bool,
    #[serde(default)]
    pub log_urls: bool,
    #[serde(default)]
    pub moderation_roles: Vec<u64>,
}

impl GuildConfig {
    /// Default configuration for a guild
    #[must_use]
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            role_mute_id: None,
            channel_action_log_id: None,
            channel_mod_log_id: None,
            auto_delete_data: Vec::new(),
            vote_channel_data: Vec::new(),
            block_guild_invites: false,
            allowed_guild_invites: Vec::new(),
            block_bot_invites: false,
            log_urls: false,
            moderation_roles: Vec::new(),
        }
    }

    /// Add or update an auto-delete channel.
    ///
    /// Returns `false` if `delete_after_minutes` is zero.
    pub fn upsert_auto_delete(&mut self, channel_id: u64, delete_after_minutes: u32) -> bool {
        if delete_after_minutes == 0 {
            return false;
        }

        if let Some(existing) = self
            .auto_delete_data
            .iter_mut()
            .find(|entry| entry.channel_id == channel_id)
        {
            existing.delete_after_minutes = delete_after_minutes;
        } else {
            self.auto_delete_data.push(AutoDeleteChannel {
                channel_id,
                delete_after_minutes,
            });
        }
        true
    }

    /// Stop auto-deleting in a channel. Returns `false` if it was not configured.
    pub fn remove_auto_delete(&mut self, channel_id: u64) -> bool {
        let before = self.auto_delete_data.len();
        self.auto_delete_data
            .retain(|entry| entry.channel_id != channel_id);
        before != self.auto_delete_data.len()
    }

    /// Toggle a vote channel, returning whether it is now enabled
    pub fn toggle_vote_channel(&mut self, channel_id: u64) -> bool {
        if self.vote_channel_data.contains(&channel_id) {
            self.vote_channel_data.retain(|id| *id != channel_id);
            false
        } else {
            self.vote_channel_data.push(channel_id);
            true
        }
    }

    /// Toggle an allow-listed invite guild, returning whether it is now allowed
    pub fn toggle_allowed_invite(&mut self, invite_guild_id: u64) -> bool {
        if self.allowed_guild_invites.contains(&invite_guild_id) {
            self.allowed_guild_invites
                .retain(|id| *id != invite_guild_id);
            false
        } else {
            self.allowed_guild_invites.push(invite_guild_id);
            true
        }
    }

    /// Whether an invite to `invite_guild_id` should be deleted
    #[must_use]
    pub fn blocks_invite_to(&self, invite_guild_id: Option<u64>) -> bool {
        self.block_guild_invites
            && invite_guild_id.is_none_or(|id| !self.allowed_guild_invites.contains(&id))
    }

    /// Toggle a moderation role, returning whether it is now a moderation role
    pub fn toggle_moderation_role(&mut self, role_id: u64) -> bool {
        if self.moderation_roles.contains(&role_id) {
            self.moderation_roles.retain(|id| *id != role_id);
            false
        } else {
            self.moderation_roles.push(role_id);
            true
        }
    }

    /// Whether any of `roles` is a configured moderation role
    #[must_use]
    pub fn is_moderation_role(&self, roles: &[u64]) -> bool {
        roles.iter().any(|role| self.moderation_roles.contains(role))
    }
}
