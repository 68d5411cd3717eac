//! Slash and prefix commands
//!
//! Commands are thin: they read arguments, call into the moderation core and
//! report back. Every state change of a member or action goes through the core
//! so the audit log sees it.

mod info;
mod moderation;
mod settings;

pub use info::{Profile, user_info, user_info_message};
pub use moderation::{
    Escalation, WarnOutcome, ban, escalation, kick, mute, mute_until, purge, purge_messages,
    purge_selection, reason, role, unmute, warn, warn_member,
};
pub use settings::{
    VOTE_MIN_SLOWMODE_SECS, allow_invite, autodelete, block_bot_invites, block_invites, config,
    log_channel, log_urls, mod_role, modlog_channel, mute_role, update_guild, vote_channel,
    vote_slowmode_ok,
};

use crate::events::Moderator;
use crate::{Context, Data, Error};

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        mute(),
        unmute(),
        warn(),
        kick(),
        ban(),
        role(),
        purge(),
        reason(),
        user_info(),
        config(),
        mute_role(),
        mod_role(),
        log_channel(),
        modlog_channel(),
        block_invites(),
        allow_invite(),
        block_bot_invites(),
        log_urls(),
        autodelete(),
        vote_channel(),
    ]
}

fn guild_of(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|id| id.get())
        .ok_or_else(|| "This command can only be used in a server".into())
}

fn moderator_of(ctx: Context<'_>) -> Moderator {
    Moderator::User(ctx.author().id.get())
}

/// Passes when the guild has no moderation roles configured, or the author
/// holds one of them
async fn is_moderator(ctx: Context<'_>) -> Result<bool, Error> {
    let guild_id = guild_of(ctx)?;
    let config = ctx.data().guilds.get_or_load(guild_id).await?;
    if config.moderation_roles.is_empty() {
        return Ok(true);
    }

    let Some(member) = ctx.author_member().await else {
        return Ok(false);
    };
    let roles: Vec<u64> = member.roles.iter().map(|role| role.get()).collect();
    Ok(config.is_moderation_role(&roles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_unique() {
        let commands = all();
        let mut names: Vec<&str> = commands.iter().map(|cmd| cmd.name.as_str()).collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_all_commands_are_guild_only() {
        for cmd in all() {
            assert!(cmd.guild_only, "{} should be guild only", cmd.name);
            assert!(cmd.create_as_slash_command().is_some(), "{} should be a slash command", cmd.name);
        }
    }
}
