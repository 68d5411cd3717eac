//! Guild configuration commands
//!
//! Each change is saved and followed by a `guildConfigRefresh` signal so the
//! in-memory guild cache picks it up.

use super::{guild_of, is_moderator};
use crate::entities::GuildConfig;
use crate::error::PaladinResult;
use crate::events::GUILD_CONFIG_REFRESH;
use crate::{Context, Data, Error};
use poise::command;
use poise::serenity_prelude as serenity;

/// Slow-mode a vote channel needs, so reactions cannot be farmed
pub const VOTE_MIN_SLOWMODE_SECS: u16 = 60;

/// Load, change and save a guild's configuration, then signal the refresh
///
/// # Errors
/// Returns an error if the configuration cannot be read or written, or the bus
/// is closed.
pub async fn update_guild<T>(
    data: &Data,
    guild_id: u64,
    change: impl FnOnce(&mut GuildConfig) -> T,
) -> PaladinResult<T> {
    let mut config = data.entities.get_guild_data(guild_id).await?;
    let result = change(&mut config);
    data.entities.save_guild(&config).await?;
    data.bus.publish(GUILD_CONFIG_REFRESH)?;
    Ok(result)
}

fn channel_or_current(ctx: Context<'_>, channel: Option<&serenity::GuildChannel>) -> u64 {
    channel.map_or_else(|| ctx.channel_id().get(), |channel| channel.id.get())
}

fn describe_channel(channel_id: Option<u64>) -> String {
    channel_id.map_or_else(|| "None Set".to_string(), |id| format!("<#{id}>"))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

/// Show the current configuration for this server
#[command(slash_command, prefix_command, guild_only, check = "is_moderator")]
pub async fn config(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let config = ctx.data().guilds.get_or_load(guild_id).await?;

    let mut lines = vec![
        format!(
            "**Mute Role:** {}",
            config
                .role_mute_id
                .map_or_else(|| "None Set".to_string(), |id| format!("<@&{id}>"))
        ),
        format!("**Action Log Channel:** {}", describe_channel(config.channel_action_log_id)),
        format!("**Mod Log Channel:** {}", describe_channel(config.channel_mod_log_id)),
        format!("**Block Guild Invites:** {}", on_off(config.block_guild_invites)),
        format!("**Block Bot Invites:** {}", on_off(config.block_bot_invites)),
        format!("**Log URLs:** {}", on_off(config.log_urls)),
    ];
    if !config.allowed_guild_invites.is_empty() {
        let allowed: Vec<String> = config.allowed_guild_invites.iter().map(u64::to_string).collect();
        lines.push(format!("**Allowed Guild Invites:** {}", allowed.join(", ")));
    }
    if !config.vote_channel_data.is_empty() {
        let channels: Vec<String> = config.vote_channel_data.iter().map(|id| format!("<#{id}>")).collect();
        lines.push(format!("**Vote Channels:** {}", channels.join(" ")));
    }
    for channel in &config.auto_delete_data {
        lines.push(format!(
            "**Auto-Delete:** <#{}> after {} minute(s)",
            channel.channel_id, channel.delete_after_minutes
        ));
    }

    ctx.send(
        poise::CreateReply::default()
            .content(lines.join("\n"))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Set the role given to muted members
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "mute-role",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn mute_role(
    ctx: Context<'_>,
    #[description = "The role muted members get"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let role_id = role.id.get();
    update_guild(ctx.data(), guild_id, |config| config.role_mute_id = Some(role_id)).await?;
    ctx.say(format!("Mute role set to `{}`", role.name)).await?;
    Ok(())
}

/// Let a role use moderation commands, or take that away again
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "mod-role",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn mod_role(
    ctx: Context<'_>,
    #[description = "The role in question"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let role_id = role.id.get();
    let enabled = update_guild(ctx.data(), guild_id, |config| {
        config.toggle_moderation_role(role_id)
    })
    .await?;
    let reply = if enabled {
        format!("`{}` can now use moderation commands", role.name)
    } else {
        format!("`{}` can no longer use moderation commands", role.name)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Set the channel moderation actions are logged to
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "log-channel",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn log_channel(
    ctx: Context<'_>,
    #[description = "Log channel, leave empty to stop logging"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let channel_id = channel.map(|channel| channel.id.get());
    update_guild(ctx.data(), guild_id, |config| config.channel_action_log_id = channel_id).await?;
    ctx.say(format!("Action log channel: {}", describe_channel(channel_id)))
        .await?;
    Ok(())
}

/// Set the channel link detection and other notices go to
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "modlog-channel",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn modlog_channel(
    ctx: Context<'_>,
    #[description = "Mod log channel, leave empty to disable"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let channel_id = channel.map(|channel| channel.id.get());
    update_guild(ctx.data(), guild_id, |config| config.channel_mod_log_id = channel_id).await?;
    ctx.say(format!("Mod log channel: {}", describe_channel(channel_id)))
        .await?;
    Ok(())
}

/// Delete invites to other servers
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "block-invites",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn block_invites(
    ctx: Context<'_>,
    #[description = "Enable or disable this feature"] toggle: bool,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    update_guild(ctx.data(), guild_id, |config| config.block_guild_invites = toggle).await?;
    ctx.say(format!("Guild invite blocking {}", on_off(toggle))).await?;
    Ok(())
}

/// Always allow invites to a server, or stop allowing them
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "allow-invite",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn allow_invite(
    ctx: Context<'_>,
    #[description = "The id of the server to allow invites for"] server: String,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let Ok(invite_guild) = server.trim().parse::<u64>() else {
        ctx.say(format!("`{server}` is not a server id")).await?;
        return Ok(());
    };

    let allowed = update_guild(ctx.data(), guild_id, |config| {
        config.toggle_allowed_invite(invite_guild)
    })
    .await?;
    let reply = if allowed {
        format!("Invites to `{invite_guild}` are now allowed")
    } else {
        format!("Invites to `{invite_guild}` are no longer allowed")
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Delete bot invite links
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "block-bot-invites",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn block_bot_invites(
    ctx: Context<'_>,
    #[description = "Enable or disable this feature"] toggle: bool,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    update_guild(ctx.data(), guild_id, |config| config.block_bot_invites = toggle).await?;
    ctx.say(format!("Bot invite blocking {}", on_off(toggle))).await?;
    Ok(())
}

/// Report every posted link to the mod log
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "log-urls",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn log_urls(
    ctx: Context<'_>,
    #[description = "Enable or disable this feature"] toggle: bool,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    update_guild(ctx.data(), guild_id, |config| config.log_urls = toggle).await?;
    ctx.say(format!("URL logging {}", on_off(toggle))).await?;
    Ok(())
}

/// Delete messages in a channel after a while
#[command(
    slash_command,
    prefix_command,
    guild_only,
    subcommands("autodelete_setup", "autodelete_disable"),
    subcommand_required
)]
pub async fn autodelete(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Start deleting messages older than `time` minutes
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "setup",
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn autodelete_setup(
    ctx: Context<'_>,
    #[description = "How many minutes before a message is deleted"]
    #[min = 1]
    time: u32,
    #[description = "The channel, defaults to this one"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let channel_id = channel_or_current(ctx, channel.as_ref());
    let accepted = update_guild(ctx.data(), guild_id, |config| {
        config.upsert_auto_delete(channel_id, time)
    })
    .await?;

    let reply = if accepted {
        format!("Messages in <#{channel_id}> will be deleted after {time} minute(s)")
    } else {
        "The time must be at least 1 minute".to_string()
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Stop deleting messages in a channel
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "disable",
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn autodelete_disable(
    ctx: Context<'_>,
    #[description = "The channel, defaults to this one"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let channel_id = channel_or_current(ctx, channel.as_ref());
    let removed = update_guild(ctx.data(), guild_id, |config| {
        config.remove_auto_delete(channel_id)
    })
    .await?;

    let reply = if removed {
        format!("Auto-delete disabled in <#{channel_id}>")
    } else {
        format!("<#{channel_id}> is not an auto-delete channel")
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Whether a channel's slow-mode is long enough for vote reactions
#[must_use]
pub fn vote_slowmode_ok(rate_limit_per_user: Option<u16>) -> bool {
    rate_limit_per_user.unwrap_or(0) >= VOTE_MIN_SLOWMODE_SECS
}

/// Add vote reactions to every message in a channel, or stop doing so
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "vote-channel",
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn vote_channel(
    ctx: Context<'_>,
    #[description = "The channel, defaults to this one"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let channel = match channel {
        Some(channel) => channel,
        None => ctx
            .channel_id()
            .to_channel(ctx)
            .await?
            .guild()
            .ok_or("Only server text channels can have vote reactions")?,
    };
    let channel_id = channel.id.get();

    let config = ctx.data().guilds.get_or_load(guild_id).await?;
    let enabling = !config.vote_channel_data.contains(&channel_id);
    if enabling && !vote_slowmode_ok(channel.rate_limit_per_user) {
        ctx.say("A vote channel needs a slow-mode of at least 1 minute to prevent abuse")
            .await?;
        return Ok(());
    }

    let enabled = update_guild(ctx.data(), guild_id, |config| {
        config.toggle_vote_channel(channel_id)
    })
    .await?;
    ctx.say(format!("Vote reactions in <#{channel_id}> {}", on_off(enabled)))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::platform::MockPlatform;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn data() -> Data {
        Data::new(
            BotConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(MockPlatform::new()),
        )
    }

    #[tokio::test]
    async fn test_update_guild_saves_and_refreshes_cache() {
        let data = data();
        data.bus.start();

        let enabled = update_guild(&data, 4, |config| config.toggle_vote_channel(40))
            .await
            .unwrap();
        assert!(enabled);
        data.bus.wait_idle().await;

        assert_eq!(
            data.entities.get_guild_data(4).await.unwrap().vote_channel_data,
            vec![40]
        );
        assert_eq!(data.guilds.get(4).unwrap().vote_channel_data, vec![40]);
    }

    #[tokio::test]
    async fn test_update_guild_after_shutdown_fails() {
        let data = data();
        data.bus.shutdown().await;
        assert!(update_guild(&data, 4, |config| config.log_urls = true).await.is_err());
    }

    #[test]
    fn test_vote_slowmode() {
        assert!(!vote_slowmode_ok(None));
        assert!(!vote_slowmode_ok(Some(30)));
        assert!(vote_slowmode_ok(Some(60)));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(mute_role().name, "mute-role");
        assert_eq!(log_channel().name, "log-channel");
        assert_eq!(block_bot_invites().name, "block-bot-invites");
        let names: Vec<String> = autodelete().subcommands.iter().map(|cmd| cmd.name.clone()).collect();
        assert_eq!(names, vec!["setup", "disable"]);
    }
}
