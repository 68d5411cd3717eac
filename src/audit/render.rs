//! Moderation log formatting

use crate::events::{Action, ActionExtra, ActionKind, ActionOutcome, Moderator};
use crate::platform::LogMessage;
use tracing::warn;

pub(crate) const BLURPLE: u32 = 0x0058_65F2;
pub(crate) const RED: u32 = 0x00ED_4245;
pub(crate) const DARK_RED: u32 = 0x0099_2D22;
pub(crate) const ORANGE: u32 = 0x00E6_7E22;
pub(crate) const YELLOW: u32 = 0x00FE_E75C;
pub(crate) const GREEN: u32 = 0x0057_F287;
pub(crate) const GREY: u32 = 0x0095_A5A6;

/// Text shown when an action was logged without a reason
#[must_use]
pub fn missing_reason_prompt(action_id: u64) -> String {
    format!("**Moderator:** Please use `/reason {action_id}`")
}

fn mention(user_id: Option<u64>) -> String {
    user_id.map_or_else(|| "Unknown".to_string(), |id| format!("<@{id}>"))
}

/// Render the log entry for `action`.
///
/// `bot_id` stands in for the moderator of automatic actions.
#[must_use]
pub fn render(action: &Action, action_id: u64, bot_id: u64) -> LogMessage {
    let user = mention(action.user_id);

    let mut message = match action.kind {
        ActionKind::Kick => LogMessage::new("User Kicked", ORANGE).field("User", user, false),
        ActionKind::Ban => LogMessage::new("User Banned", DARK_RED).field("User", user, false),
        ActionKind::Purge => {
            let channel = match &action.extra {
                Some(ActionExtra::Channel(id)) => format!("<#{id}>"),
                _ => "Unknown".to_string(),
            };
            let message = LogMessage::new("Channel Purged", RED).field("Channel", channel, false);
            match action.user_id {
                Some(_) => message.field("User", user, false),
                None => message,
            }
        }
        ActionKind::Warn => {
            let warnings = match &action.extra {
                Some(ActionExtra::Warnings(count)) => count.to_string(),
                _ => "Unknown".to_string(),
            };
            LogMessage::new("User Warned", YELLOW)
                .field("User", user, false)
                .field("Warnings", warnings, false)
        }
        ActionKind::RoleGive | ActionKind::RoleRemove => {
            let title = if action.kind == ActionKind::RoleGive {
                "Role Given"
            } else {
                "Role Removed"
            };
            let role = match (&action.extra, action.role_id) {
                (Some(ActionExtra::Role { name, .. }), _) => name.clone(),
                (_, Some(id)) => format!("<@&{id}>"),
                _ => "Unknown".to_string(),
            };
            LogMessage::new(title, BLURPLE)
                .field("User", user, false)
                .field("Role", role, false)
        }
        ActionKind::Mute => {
            let message = LogMessage::new("User Muted", GREY).field("User", user, false);
            match &action.extra {
                Some(ActionExtra::Note(note)) => message.field("Duration", note, false),
                _ => message.field("Duration", "Indefinite", false),
            }
        }
        ActionKind::Unmute => LogMessage::new("User Unmuted", GREEN).field("User", user, false),
        ActionKind::Unknown(code) => {
            warn!(action_kind = code, guild_id = %action.guild_id, "Rendering unknown action kind");
            let message = LogMessage::new(format!("Moderation Action ({code})"), BLURPLE);
            match action.user_id {
                Some(_) => message.field("User", user, false),
                None => message,
            }
        }
    };

    let moderator = match action.moderator {
        Moderator::User(id) => format!("<@{id}>"),
        Moderator::System => format!("<@{bot_id}> (automatic)"),
    };
    message = message.field("Moderator", moderator, false).field(
        "Reason",
        action
            .reason
            .clone()
            .unwrap_or_else(|| missing_reason_prompt(action_id)),
        false,
    );

    if let ActionOutcome::Failed(error) = &action.outcome {
        message.title = format!("Failed: {}", message.title);
        message.colour = RED;
        message = message.field("Error", error, false);
    }

    message.footer(format!("Action ID: {action_id}"))
}
