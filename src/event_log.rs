//! Mod log of gateway events
//!
//! Joins, leaves, bans, edits and deletions are rendered into a [`LogMessage`]
//! and sent to the guild's mod log channel, when one is set.

use crate::audit::{BLURPLE, DARK_RED, GREEN, ORANGE, RED};
use crate::cache::GuildCache;
use crate::error::PaladinResult;
use crate::platform::{LogMessage, Platform};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Longest text Discord accepts in an embed field
const FIELD_LIMIT: usize = 1024;

/// A gateway event worth a mod log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    MemberJoined {
        user_id: u64,
        tag: String,
        created_at: DateTime<Utc>,
    },
    MemberLeft {
        user_id: u64,
        tag: String,
        /// Unknown when the member was not cached
        joined_at: Option<DateTime<Utc>>,
    },
    MemberBanned {
        user_id: u64,
        tag: String,
    },
    MemberUnbanned {
        user_id: u64,
        tag: String,
    },
    MessageEdited {
        author_tag: String,
        /// Unknown when the original message was not cached
        before: Option<String>,
        after: String,
        jump_url: String,
        edited_at: Option<DateTime<Utc>>,
    },
    MessageDeleted {
        channel_id: u64,
        message_id: u64,
        jump_url: String,
    },
    MessagesPurged {
        channel_id: u64,
        count: usize,
    },
}

/// Human readable length of time, using the largest unit and the one below it
#[must_use]
pub fn format_age(age: Duration) -> String {
    const UNITS: [(&str, i64); 5] = [
        ("year", 365 * 86_400),
        ("day", 86_400),
        ("hour", 3_600),
        ("minute", 60),
        ("second", 1),
    ];

    let total = age.num_seconds().max(0);
    let Some(index) = UNITS.iter().position(|(_, seconds)| total >= *seconds) else {
        return "0 seconds".to_string();
    };

    let (name, seconds) = UNITS[index];
    let mut text = count_of(total / seconds, name);
    if let Some((next_name, next_seconds)) = UNITS.get(index + 1) {
        let rest = (total % seconds) / next_seconds;
        if rest > 0 {
            text.push_str(", ");
            text.push_str(&count_of(rest, next_name));
        }
    }
    text
}

fn count_of(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

fn clip(text: &str) -> String {
    if text.is_empty() {
        return "*No text*".to_string();
    }
    if text.chars().count() <= FIELD_LIMIT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(FIELD_LIMIT - 3).collect();
    clipped.push_str("...");
    clipped
}

fn date(at: DateTime<Utc>) -> String {
    format!("<t:{}:f>", at.timestamp())
}

/// Render the mod log entry for `event`
#[must_use]
pub fn render(event: &GatewayEvent, now: DateTime<Utc>) -> LogMessage {
    match event {
        GatewayEvent::MemberJoined {
            user_id,
            tag,
            created_at,
        } => LogMessage::new("User Joined", GREEN)
            .field("ID", user_id.to_string(), false)
            .field("Account Creation Date", date(*created_at), false)
            .field("Account Age", format_age(now - *created_at), false)
            .footer(tag),
        GatewayEvent::MemberLeft {
            user_id,
            tag,
            joined_at,
        } => {
            let message = LogMessage::new("User Left", RED).field("ID", user_id.to_string(), false);
            let message = match joined_at {
                Some(joined_at) => message
                    .field("Join Date", date(*joined_at), false)
                    .field("Left After", format_age(now - *joined_at), false),
                None => message,
            };
            message.footer(tag)
        }
        GatewayEvent::MemberBanned { user_id, tag } => LogMessage::new("User Banned", DARK_RED)
            .field("User", format!("<@{user_id}>"), false)
            .footer(tag),
        GatewayEvent::MemberUnbanned { user_id, tag } => LogMessage::new("User Unbanned", GREEN)
            .field("User", format!("<@{user_id}>"), false)
            .footer(tag),
        GatewayEvent::MessageEdited {
            author_tag,
            before,
            after,
            jump_url,
            edited_at,
        } => {
            let original = before
                .as_deref()
                .map_or_else(|| "*Not cached*".to_string(), clip);
            let message = LogMessage::new("Message Edited", BLURPLE)
                .description(format!("[**Jump To Message**]({jump_url})"))
                .field("Original", original, false)
                .field("Edited", clip(after), false);
            let message = match edited_at {
                Some(edited_at) => message.field("Edit Time", date(*edited_at), false),
                None => message,
            };
            message.footer(author_tag)
        }
        GatewayEvent::MessageDeleted {
            channel_id,
            message_id,
            jump_url,
        } => LogMessage::new("Message Deleted", ORANGE)
            .description(format!("[**Jump To Location**]({jump_url})"))
            .field("Channel", format!("<#{channel_id}>"), false)
            .field("Message ID", message_id.to_string(), false),
        GatewayEvent::MessagesPurged { channel_id, count } => {
            let plural = if *count == 1 { "" } else { "s" };
            LogMessage::new(format!("{count} Message{plural} Deleted"), RED)
                .field("Channel", format!("<#{channel_id}>"), true)
        }
    }
}

/// Sends gateway events to each guild's mod log channel
#[derive(Clone)]
pub struct EventLog {
    guilds: GuildCache,
    platform: Arc<dyn Platform>,
}

impl EventLog {
    #[must_use]
    pub fn new(guilds: GuildCache, platform: Arc<dyn Platform>) -> Self {
        Self { guilds, platform }
    }

    /// Log `event` for a guild. Returns the sent message id, or `None` when
    /// the guild has no mod log channel.
    ///
    /// # Errors
    /// Returns an error if the guild configuration cannot be read or the
    /// message cannot be sent.
    pub async fn record(&self, guild_id: u64, event: &GatewayEvent) -> PaladinResult<Option<u64>> {
        let config = self.guilds.get_or_load(guild_id).await?;
        let Some(channel_id) = config.channel_mod_log_id else {
            return Ok(None);
        };
        let message = render(event, Utc::now());
        let message_id = self.platform.send_moderation_log(channel_id, &message).await?;
        Ok(Some(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EntityStore, GuildConfig};
    use crate::error::PaladinError;
    use crate::platform::MockPlatform;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    const GUILD: u64 = 7;
    const MOD_LOG: u64 = 70;

    async fn event_log(platform: MockPlatform, mod_log: Option<u64>) -> EventLog {
        let entities = EntityStore::new(Arc::new(MemoryStore::new()));
        let mut config = GuildConfig::new(GUILD);
        config.channel_mod_log_id = mod_log;
        entities.save_guild(&config).await.unwrap();
        EventLog::new(GuildCache::new(entities), Arc::new(platform))
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::seconds(-5)), "0 seconds");
        assert_eq!(format_age(Duration::seconds(1)), "1 second");
        assert_eq!(format_age(Duration::minutes(90)), "1 hour, 30 minutes");
        assert_eq!(format_age(Duration::days(400)), "1 year, 35 days");
        assert_eq!(
            format_age(Duration::days(2) + Duration::seconds(5)),
            "2 days"
        );
    }

    #[test]
    fn test_join_shows_account_age() {
        let event = GatewayEvent::MemberJoined {
            user_id: 5,
            tag: "newbie".to_string(),
            created_at: at(1),
        };
        let message = render(&event, at(4));
        assert_eq!(message.title, "User Joined");
        assert_eq!(message.field_value("Account Age"), Some("3 days"));
        assert_eq!(message.footer.as_deref(), Some("newbie"));
    }

    #[test]
    fn test_leave_without_join_date() {
        let event = GatewayEvent::MemberLeft {
            user_id: 5,
            tag: "gone".to_string(),
            joined_at: None,
        };
        let message = render(&event, at(4));
        assert_eq!(message.title, "User Left");
        assert!(message.field_value("Left After").is_none());
    }

    #[test]
    fn test_edit_clips_long_content() {
        let event = GatewayEvent::MessageEdited {
            author_tag: "writer".to_string(),
            before: None,
            after: "x".repeat(2000),
            jump_url: "https://discord.com/channels/7/8/9".to_string(),
            edited_at: Some(at(2)),
        };
        let message = render(&event, at(2));
        assert_eq!(message.field_value("Original"), Some("*Not cached*"));
        let edited = message.field_value("Edited").unwrap();
        assert_eq!(edited.chars().count(), FIELD_LIMIT);
        assert!(edited.ends_with("..."));
    }

    #[test]
    fn test_purge_title_counts_messages() {
        let one = render(&GatewayEvent::MessagesPurged { channel_id: 8, count: 1 }, at(1));
        let many = render(&GatewayEvent::MessagesPurged { channel_id: 8, count: 12 }, at(1));
        assert_eq!(one.title, "1 Message Deleted");
        assert_eq!(many.title, "12 Messages Deleted");
        assert_eq!(many.field_value("Channel"), Some("<#8>"));
    }

    #[tokio::test]
    async fn test_event_sent_to_mod_log() {
        let mut platform = MockPlatform::new();
        platform
            .expect_send_moderation_log()
            .withf(|channel, message| *channel == MOD_LOG && message.title == "User Banned")
            .times(1)
            .returning(|_, _| Ok(123));
        let log = event_log(platform, Some(MOD_LOG)).await;

        let event = GatewayEvent::MemberBanned {
            user_id: 5,
            tag: "raider".to_string(),
        };
        assert_eq!(log.record(GUILD, &event).await.unwrap(), Some(123));
    }

    #[tokio::test]
    async fn test_no_mod_log_channel_sends_nothing() {
        // No expectations: any platform call fails the test
        let log = event_log(MockPlatform::new(), None).await;

        let event = GatewayEvent::MemberUnbanned {
            user_id: 5,
            tag: "forgiven".to_string(),
        };
        assert_eq!(log.record(GUILD, &event).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_failure_is_returned() {
        let mut platform = MockPlatform::new();
        platform
            .expect_send_moderation_log()
            .returning(|_, _| Err(PaladinError::Other("Missing Access".to_string())));
        let log = event_log(platform, Some(MOD_LOG)).await;

        let event = GatewayEvent::MessagesPurged {
            channel_id: 8,
            count: 3,
        };
        assert!(log.record(GUILD, &event).await.is_err());
    }
}
