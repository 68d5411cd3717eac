use super::{guild_of, is_moderator, moderator_of};
use crate::auto_delete::BULK_DELETE_MAX_AGE;
use crate::duration::{MuteLength, parse_mute_length};
use crate::error::{PaladinError, PaladinResult};
use crate::events::{Action, ActionExtra, ActionKind, Moderator};
use crate::platform::MessageSummary;
use crate::{COMMAND_TARGET, Context, Data, Error};
use chrono::{DateTime, Utc};
use poise::command;
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

/// Messages the platform returns per fetch, and so the most one purge removes
const PURGE_LIMIT: u8 = 100;

/// Resolve a mute length argument against `now`.
///
/// `None` means the input is not a duration, `Some(None)` an indefinite mute.
#[must_use]
pub fn mute_until(input: Option<&str>, now: DateTime<Utc>) -> Option<Option<DateTime<Utc>>> {
    match parse_mute_length(input)? {
        MuteLength::Forever => Some(None),
        MuteLength::For(length) => now.checked_add_signed(length).map(Some),
    }
}

/// Mute a user, optionally for a limited time
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    check = "is_moderator"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "The user in question"] user: serenity::User,
    #[description = "How long, e.g. 30m, 1h30m or 2d. Leave empty to mute forever"]
    duration: Option<String>,
    #[description = "Why they are being muted"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let Some(until) = mute_until(duration.as_deref(), Utc::now()) else {
        ctx.say(format!(
            "`{}` is not a duration. Try something like `30m`, `1h30m` or `2d`",
            duration.unwrap_or_default()
        ))
        .await?;
        return Ok(());
    };

    ctx.defer().await?;
    let result = ctx
        .data()
        .mutes
        .mute(guild_id, user.id.get(), moderator_of(ctx), until, reason)
        .await;

    match result {
        Ok(_) => {
            let reply = match until {
                Some(until) => format!("Muted <@{}> until <t:{}:f>", user.id, until.timestamp()),
                None => format!("Muted <@{}> indefinitely", user.id),
            };
            ctx.say(reply).await?;
        }
        Err(PaladinError::NotConfigured { .. }) => {
            ctx.say("No mute role is set. Use `/mute-role` first").await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Lift a mute
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    check = "is_moderator"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "The user in question"] user: serenity::User,
    #[description = "Why they are being unmuted"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    ctx.defer().await?;
    ctx.data()
        .mutes
        .unmute(guild_id, user.id.get(), moderator_of(ctx), reason)
        .await?;
    ctx.say(format!("Unmuted <@{}>", user.id)).await?;
    Ok(())
}

/// What happens to a member once they collect enough warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Kick,
    Ban,
}

impl Escalation {
    #[must_use]
    pub fn kind(self) -> ActionKind {
        match self {
            Self::Kick => ActionKind::Kick,
            Self::Ban => ActionKind::Ban,
        }
    }
}

/// The 4th warning kicks, the 5th and later ban
#[must_use]
pub fn escalation(warnings: u32) -> Option<Escalation> {
    match warnings {
        4 => Some(Escalation::Kick),
        n if n >= 5 => Some(Escalation::Ban),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnOutcome {
    /// Warning count after this warning
    pub warnings: u32,
    pub escalation: Option<Escalation>,
    /// Set when the kick or ban could not be carried out
    pub escalation_error: Option<String>,
}

/// Record a warning, kicking or banning the member when the count calls for it.
///
/// The escalation and the warning are each published as their own action. A
/// failed kick or ban is published with a failed outcome and does not undo
/// the warning.
///
/// # Errors
/// Returns an error if the member record cannot be read or written, or the bus
/// is closed.
pub async fn warn_member(
    data: &Data,
    guild_id: u64,
    user_id: u64,
    moderator: Moderator,
    reason: Option<String>,
) -> PaladinResult<WarnOutcome> {
    let mut member = data.entities.get_member_data(guild_id, user_id).await?;
    member.warnings = member.warnings.saturating_add(1);
    data.entities.save_member(&member).await?;

    let mut outcome = WarnOutcome {
        warnings: member.warnings,
        escalation: escalation(member.warnings),
        escalation_error: None,
    };

    if let Some(step) = outcome.escalation {
        let auto_reason = format!("Auto: {}th warning", member.warnings);
        let result = match step {
            Escalation::Kick => {
                data.platform
                    .kick_member(guild_id, user_id, Some(auto_reason.clone()))
                    .await
            }
            Escalation::Ban => {
                data.platform
                    .ban_member(guild_id, user_id, Some(auto_reason.clone()))
                    .await
            }
        };

        let mut action = Action::new(step.kind(), moderator, guild_id)
            .with_user(user_id)
            .with_reason(Some(auto_reason));
        if let Err(e) = result {
            warn!(
                target: COMMAND_TARGET,
                guild_id = %guild_id,
                user_id = %user_id,
                "Warning escalation failed: {e}"
            );
            outcome.escalation_error = Some(e.to_string());
            action = action.failed(e.to_string());
        }
        data.bus.publish(action)?;
    }

    data.bus.publish(
        Action::new(ActionKind::Warn, moderator, guild_id)
            .with_user(user_id)
            .with_extra(ActionExtra::Warnings(member.warnings))
            .with_reason(reason),
    )?;
    Ok(outcome)
}

/// Warn a user. 4 warnings kick, 5 ban
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "KICK_MEMBERS",
    check = "is_moderator"
)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "The user in question"] user: serenity::User,
    #[description = "Why they are being warned"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    ctx.defer().await?;
    let outcome = warn_member(ctx.data(), guild_id, user.id.get(), moderator_of(ctx), reason).await?;

    let mut reply = format!("<@{}> now has {} warning(s)", user.id, outcome.warnings);
    match (outcome.escalation, outcome.escalation_error) {
        (Some(Escalation::Kick), None) => reply.push_str(", they have been kicked"),
        (Some(Escalation::Ban), None) => reply.push_str(", they have been banned"),
        (Some(_), Some(error)) => {
            reply.push_str(&format!(" but the automatic action failed: {error}"));
        }
        (None, _) => {}
    }
    ctx.say(reply).await?;
    Ok(())
}

/// Kick a user from the server
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "KICK_MEMBERS",
    check = "is_moderator"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "The user in question"] user: serenity::User,
    #[description = "Why they are being kicked"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let data = ctx.data();
    data.platform
        .kick_member(guild_id, user.id.get(), reason.clone())
        .await?;
    data.bus.publish(
        Action::new(ActionKind::Kick, moderator_of(ctx), guild_id)
            .with_user(user.id.get())
            .with_reason(reason),
    )?;
    ctx.say(format!("Kicked <@{}>", user.id)).await?;
    Ok(())
}

/// Ban a user from the server
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    check = "is_moderator"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "The user in question"] user: serenity::User,
    #[description = "Why they are being banned"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let data = ctx.data();
    data.platform
        .ban_member(guild_id, user.id.get(), reason.clone())
        .await?;
    data.bus.publish(
        Action::new(ActionKind::Ban, moderator_of(ctx), guild_id)
            .with_user(user.id.get())
            .with_reason(reason),
    )?;
    ctx.say(format!("Banned <@{}>", user.id)).await?;
    Ok(())
}

/// Give or take roles
#[command(
    slash_command,
    prefix_command,
    guild_only,
    subcommands("role_add", "role_remove"),
    subcommand_required
)]
pub async fn role(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give a user a role
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "add",
    required_permissions = "MANAGE_ROLES",
    check = "is_moderator"
)]
pub async fn role_add(
    ctx: Context<'_>,
    #[description = "The role to add"] role: serenity::Role,
    #[description = "The user in question"] user: serenity::User,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let data = ctx.data();
    data.platform
        .add_role(guild_id, user.id.get(), role.id.get(), reason.clone())
        .await?;
    data.bus.publish(
        Action::new(ActionKind::RoleGive, moderator_of(ctx), guild_id)
            .with_user(user.id.get())
            .with_role(role.id.get(), role.name.clone())
            .with_reason(reason),
    )?;
    ctx.say(format!("Gave <@{}> the `{}` role", user.id, role.name))
        .await?;
    Ok(())
}

/// Take a role away from a user
#[command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "remove",
    required_permissions = "MANAGE_ROLES",
    check = "is_moderator"
)]
pub async fn role_remove(
    ctx: Context<'_>,
    #[description = "The role to remove"] role: serenity::Role,
    #[description = "The user in question"] user: serenity::User,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let data = ctx.data();
    data.platform
        .remove_role(guild_id, user.id.get(), role.id.get())
        .await?;
    data.bus.publish(
        Action::new(ActionKind::RoleRemove, moderator_of(ctx), guild_id)
            .with_user(user.id.get())
            .with_role(role.id.get(), role.name.clone())
            .with_reason(reason),
    )?;
    ctx.say(format!("Removed the `{}` role from <@{}>", role.name, user.id))
        .await?;
    Ok(())
}

/// Ids of up to `total` messages a purge may remove, newest first.
///
/// Messages older than 14 days cannot be bulk deleted and are skipped.
#[must_use]
pub fn purge_selection(
    messages: &[MessageSummary],
    now: DateTime<Utc>,
    total: usize,
    author_id: Option<u64>,
) -> Vec<u64> {
    let oldest_allowed = now - BULK_DELETE_MAX_AGE;
    messages
        .iter()
        .filter(|message| message.timestamp > oldest_allowed)
        .filter(|message| author_id.is_none_or(|author| message.author_id == author))
        .take(total)
        .map(|message| message.id)
        .collect()
}

/// Delete recent messages from a channel and publish the purge
///
/// # Errors
/// Returns an error if messages cannot be fetched or deleted, or the bus is
/// closed.
pub async fn purge_messages(
    data: &Data,
    guild_id: u64,
    channel_id: u64,
    total: usize,
    author_id: Option<u64>,
    moderator: Moderator,
    reason: Option<String>,
) -> PaladinResult<usize> {
    let messages = data.platform.recent_messages(channel_id, PURGE_LIMIT).await?;
    let selected = purge_selection(&messages, Utc::now(), total, author_id);
    let deleted = selected.len();
    if deleted > 0 {
        data.platform.delete_messages(channel_id, selected).await?;
    }

    data.bus.publish(
        Action::new(ActionKind::Purge, moderator, guild_id)
            .with_extra(ActionExtra::Channel(channel_id))
            .with_reason(reason),
    )?;
    info!(
        target: COMMAND_TARGET,
        guild_id = %guild_id,
        channel_id = %channel_id,
        deleted = deleted,
        "Channel purged"
    );
    Ok(deleted)
}

/// Purge messages from a channel
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    check = "is_moderator"
)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "How many messages should be purged"]
    #[min = 1]
    #[max = 100]
    total: u8,
    #[description = "Purge only messages from this user"] user: Option<serenity::User>,
    #[description = "Channel to purge, defaults to this one"] channel: Option<serenity::GuildChannel>,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let channel_id = channel.map_or_else(|| ctx.channel_id().get(), |channel| channel.id.get());
    ctx.defer_ephemeral().await?;

    let deleted = purge_messages(
        ctx.data(),
        guild_id,
        channel_id,
        usize::from(total),
        user.as_ref().map(|user| user.id.get()),
        moderator_of(ctx),
        reason,
    )
    .await?;

    let reply = if deleted == 0 {
        "Nothing to purge. Only messages less than 2 weeks old can be purged".to_string()
    } else {
        format!("Purged {deleted} message(s) from <#{channel_id}>")
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Set the reason of a logged moderation action
#[command(slash_command, prefix_command, guild_only, check = "is_moderator")]
pub async fn reason(
    ctx: Context<'_>,
    #[description = "The action ID shown in the log"] action_id: u64,
    #[description = "The reason"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    match ctx.data().audit.set_reason(guild_id, action_id, &reason).await {
        Ok(_) => ctx.say(format!("Reason for action {action_id} updated")).await?,
        Err(PaladinError::ActionNotFound { .. }) => {
            ctx.say(format!("There is no action {action_id} in this server")).await?
        }
        Err(e) => return Err(e.into()),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::platform::MockPlatform;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use mockall::predicate::eq;
    use std::sync::Arc;

    const GUILD: u64 = 10;
    const USER: u64 = 20;
    const MODERATOR: Moderator = Moderator::User(30);

    fn data(mut platform: MockPlatform) -> Data {
        platform.expect_current_user_id().return_const(99u64);
        Data::new(
            BotConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(platform),
        )
    }

    async fn logged_kinds(data: &Data) -> Vec<ActionKind> {
        data.bus.start();
        data.bus.wait_idle().await;
        let count = data.entities.action_count(GUILD).await.unwrap();
        let mut kinds = Vec::new();
        for id in 1..=count as u64 {
            let record = data.entities.get_action_data(GUILD, id).await.unwrap().unwrap();
            kinds.push(record.action_kind);
        }
        kinds.sort_by_key(|kind| u8::from(*kind));
        kinds
    }

    #[test]
    fn test_mute_until() {
        let now = Utc::now();
        assert_eq!(mute_until(None, now), Some(None));
        assert_eq!(mute_until(Some("forever"), now), Some(None));
        assert_eq!(mute_until(Some("1h"), now), Some(Some(now + Duration::hours(1))));
        assert_eq!(mute_until(Some("later"), now), None);
    }

    #[test]
    fn test_escalation_thresholds() {
        assert_eq!(escalation(1), None);
        assert_eq!(escalation(3), None);
        assert_eq!(escalation(4), Some(Escalation::Kick));
        assert_eq!(escalation(5), Some(Escalation::Ban));
        assert_eq!(escalation(9), Some(Escalation::Ban));
    }

    #[tokio::test]
    async fn test_first_warning_only_warns() {
        let data = data(MockPlatform::new());
        let outcome = warn_member(&data, GUILD, USER, MODERATOR, None).await.unwrap();

        assert_eq!(outcome.warnings, 1);
        assert_eq!(outcome.escalation, None);
        assert_eq!(logged_kinds(&data).await, vec![ActionKind::Warn]);
    }

    #[tokio::test]
    async fn test_fourth_warning_kicks() {
        let mut platform = MockPlatform::new();
        platform
            .expect_kick_member()
            .with(eq(GUILD), eq(USER), eq(Some("Auto: 4th warning".to_string())))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let data = data(platform);

        let mut member = data.entities.get_member_data(GUILD, USER).await.unwrap();
        member.warnings = 3;
        data.entities.save_member(&member).await.unwrap();

        let outcome = warn_member(&data, GUILD, USER, MODERATOR, Some("spam".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome.warnings, 4);
        assert_eq!(outcome.escalation, Some(Escalation::Kick));
        assert_eq!(logged_kinds(&data).await, vec![ActionKind::Kick, ActionKind::Warn]);
    }

    #[tokio::test]
    async fn test_failed_ban_is_reported() {
        let mut platform = MockPlatform::new();
        platform
            .expect_ban_member()
            .times(1)
            .returning(|_, _, _| Err(PaladinError::Other("Missing Permissions".to_string())));
        let data = data(platform);

        let mut member = data.entities.get_member_data(GUILD, USER).await.unwrap();
        member.warnings = 4;
        data.entities.save_member(&member).await.unwrap();

        let outcome = warn_member(&data, GUILD, USER, MODERATOR, None).await.unwrap();
        assert_eq!(outcome.escalation, Some(Escalation::Ban));
        assert_eq!(outcome.escalation_error.as_deref(), Some("Missing Permissions"));
        assert_eq!(
            data.entities.get_member_data(GUILD, USER).await.unwrap().warnings,
            5
        );
        assert_eq!(logged_kinds(&data).await, vec![ActionKind::Ban, ActionKind::Warn]);
    }

    fn message(id: u64, author_id: u64, age: Duration, now: DateTime<Utc>) -> MessageSummary {
        MessageSummary {
            id,
            author_id,
            timestamp: now - age,
            pinned: false,
        }
    }

    #[test]
    fn test_purge_selection() {
        let now = Utc::now();
        let messages = vec![
            message(5, 1, Duration::minutes(1), now),
            message(4, 2, Duration::minutes(2), now),
            message(3, 1, Duration::minutes(3), now),
            message(2, 1, Duration::days(20), now),
        ];
        assert_eq!(purge_selection(&messages, now, 2, None), vec![5, 4]);
        assert_eq!(purge_selection(&messages, now, 10, Some(1)), vec![5, 3]);
        assert!(purge_selection(&messages, now, 0, None).is_empty());
    }

    #[tokio::test]
    async fn test_purge_deletes_and_publishes() {
        let mut platform = MockPlatform::new();
        platform
            .expect_recent_messages()
            .with(eq(77), eq(PURGE_LIMIT))
            .returning(|_, _| {
                let now = Utc::now();
                Ok(vec![
                    message(9, USER, Duration::minutes(1), now),
                    message(8, 1, Duration::minutes(2), now),
                ])
            });
        platform
            .expect_delete_messages()
            .with(eq(77), eq(vec![9]))
            .times(1)
            .returning(|_, _| Ok(()));
        let data = data(platform);

        let deleted = purge_messages(&data, GUILD, 77, 5, Some(USER), MODERATOR, None)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(logged_kinds(&data).await, vec![ActionKind::Purge]);
    }

    #[test]
    fn test_command_definitions() {
        let cmd = mute();
        assert_eq!(cmd.name, "mute");
        assert!(cmd.guild_only);
        assert_eq!(cmd.parameters.len(), 3);

        let cmd = role();
        let names: Vec<&str> = cmd.subcommands.iter().map(|sub| sub.name.as_str()).collect();
        assert_eq!(names, vec!["add", "remove"]);
        assert!(cmd.subcommand_required);

        let cmd = purge();
        assert!(cmd.required_permissions.contains(serenity::Permissions::MANAGE_MESSAGES));
    }
}
