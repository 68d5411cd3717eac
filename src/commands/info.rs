use super::{guild_of, is_moderator};
use crate::audit::BLURPLE;
use crate::entities::MemberState;
use crate::event_log::format_age;
use crate::platform::{LogMessage, embed, to_utc};
use crate::{Context, Error};
use chrono::{DateTime, Utc};
use poise::command;
use poise::serenity_prelude as serenity;

/// What a member lookup shows about someone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: u64,
    pub tag: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
    pub top_role: Option<String>,
    pub bot: bool,
    pub owner: bool,
    pub booster: bool,
    pub pending: bool,
}

fn dated(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!("<t:{}:f>\n*{}*", at.timestamp(), format_age(now - at))
}

/// Render a member lookup. `record` is only passed for moderators.
#[must_use]
pub fn user_info_message(profile: &Profile, record: Option<&MemberState>, now: DateTime<Utc>) -> LogMessage {
    let mut notes = Vec::new();
    if let Some(record) = record {
        match record.warnings {
            0 => {}
            1 => notes.push("1 warning".to_string()),
            n => notes.push(format!("{n} warnings")),
        }
        if record.muted {
            notes.push("Muted".to_string());
        }
    }
    if profile.bot {
        notes.push("Bot Account".to_string());
    }
    if profile.owner {
        notes.push("Server Owner".to_string());
    }
    if profile.pending {
        notes.push("⚠ User is pending verification".to_string());
    }
    if profile.booster {
        notes.push("Server Booster".to_string());
    }

    let mut message = LogMessage::new(&profile.tag, BLURPLE)
        .field("ID", profile.user_id.to_string(), false)
        .field("Username", &profile.tag, false);
    if !notes.is_empty() {
        message = message.description(notes.join("\n"));
    }
    if profile.display_name != profile.tag {
        message = message.field("Display name", &profile.display_name, false);
    }
    message = message.field("Account Creation Date", dated(profile.created_at, now), false);
    if let Some(joined_at) = profile.joined_at {
        message = message.field("Join Date", dated(joined_at, now), false);
    }
    if let Some(role) = &profile.top_role {
        message = message.field("Highest Role", role, false);
    }
    message
}

/// Look up a member
#[command(prefix_command, slash_command, guild_only, rename = "user-info")]
pub async fn user_info(
    ctx: Context<'_>,
    #[description = "Member to look up"] member: serenity::Member,
) -> Result<(), Error> {
    let guild_id = guild_of(ctx)?;
    let (owner, top_role) = match ctx.guild() {
        Some(guild) => (
            guild.owner_id == member.user.id,
            member
                .roles
                .iter()
                .filter_map(|id| guild.roles.get(id))
                .max_by_key(|role| role.position)
                .map(|role| role.name.clone()),
        ),
        None => (false, None),
    };
    let profile = Profile {
        user_id: member.user.id.get(),
        tag: member.user.tag(),
        display_name: member.display_name().to_string(),
        created_at: to_utc(member.user.created_at()),
        joined_at: member.joined_at.map(to_utc),
        top_role,
        bot: member.user.bot,
        owner,
        booster: member.premium_since.is_some(),
        pending: member.pending,
    };

    // Warnings and mutes are only shown to moderators
    let record = if is_moderator(ctx).await? {
        Some(
            ctx.data()
                .entities
                .get_member_data(guild_id, profile.user_id)
                .await?,
        )
    } else {
        None
    };

    let message = user_info_message(&profile, record.as_ref(), Utc::now());
    ctx.send(poise::CreateReply::default().embed(embed(&message)))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn profile() -> Profile {
        Profile {
            user_id: 42,
            tag: "someone".to_string(),
            display_name: "someone".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            joined_at: None,
            top_role: Some("Regulars".to_string()),
            bot: false,
            owner: false,
            booster: false,
            pending: false,
        }
    }

    #[test]
    fn test_record_shown_to_moderators() {
        let mut record = MemberState::new(1, 42);
        record.warnings = 3;
        record.muted = true;
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let message = user_info_message(&profile(), Some(&record), now);

        assert_eq!(message.description.as_deref(), Some("3 warnings\nMuted"));
        assert_eq!(message.field_value("Highest Role"), Some("Regulars"));
        assert!(
            message
                .field_value("Account Creation Date")
                .is_some_and(|value| value.ends_with("*2 years, 1 day*"))
        );
    }

    #[test]
    fn test_record_hidden_without_it() {
        let message = user_info_message(&profile(), None, Utc::now());
        assert!(message.description.is_none());
        assert!(message.field_value("Display name").is_none());
        assert!(message.field_value("Join Date").is_none());
    }

    #[test]
    fn test_flags_and_nickname() {
        let mut profile = profile();
        profile.display_name = "nick".to_string();
        profile.owner = true;
        profile.joined_at = Some(Utc::now() - Duration::days(3));
        let mut record = MemberState::new(1, 42);
        record.warnings = 1;

        let message = user_info_message(&profile, Some(&record), Utc::now());

        assert_eq!(message.description.as_deref(), Some("1 warning\nServer Owner"));
        assert_eq!(message.field_value("Display name"), Some("nick"));
        assert!(message.field_value("Join Date").is_some());
    }

    #[test]
    fn test_user_info_command() {
        let cmd = user_info();
        assert_eq!(cmd.name, "user-info");
        assert!(cmd.guild_only);
    }
}
