//! Link detection for posted messages

use crate::entities::GuildConfig;
use crate::platform::LogMessage;
use regex::Regex;
use std::sync::LazyLock;

static GUILD_INVITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)discord(?:\.gg|(?:app)?\.com/invite)/([A-Za-z0-9-]+)").expect("invite pattern")
});

static BOT_INVITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)discord(?:app)?\.com/(?:api/)?oauth2/authorize\?(?:[^\s]*&)?client_id=(\d{17,20})")
        .expect("bot invite pattern")
});

static GENERIC_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:https?|ftp)://|www\.)[^\s<>]+").expect("url pattern")
});

/// The first kind of link found in a message, most specific first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMatch {
    GuildInvite { code: String, url: String },
    BotInvite { client_id: u64, url: String },
    Url(String),
}

impl LinkMatch {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::GuildInvite { url, .. } | Self::BotInvite { url, .. } | Self::Url(url) => url,
        }
    }
}

/// Find the first link in `content`
#[must_use]
pub fn detect_link(content: &str) -> Option<LinkMatch> {
    if let Some(caps) = GUILD_INVITE.captures(content) {
        return Some(LinkMatch::GuildInvite {
            code: caps[1].to_string(),
            url: caps[0].to_string(),
        });
    }
    if let Some(caps) = BOT_INVITE.captures(content) {
        if let Ok(client_id) = caps[1].parse() {
            return Some(LinkMatch::BotInvite {
                client_id,
                url: caps[0].to_string(),
            });
        }
    }
    GENERIC_URL
        .find(content)
        .map(|found| LinkMatch::Url(found.as_str().to_string()))
}

/// What to do with a message containing a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkVerdict {
    /// Delete the message and report it
    Delete,
    /// Leave the message and report it
    Report,
    Ignore,
}

/// Decide how a guild treats `link`.
///
/// `invite_guild_id` is the guild a guild invite points to, when it could be resolved.
#[must_use]
pub fn judge(config: &GuildConfig, link: &LinkMatch, invite_guild_id: Option<u64>) -> LinkVerdict {
    match link {
        LinkMatch::GuildInvite { .. } if config.blocks_invite_to(invite_guild_id) => LinkVerdict::Delete,
        LinkMatch::GuildInvite { .. } => LinkVerdict::Report,
        LinkMatch::BotInvite { .. } if config.block_bot_invites => LinkVerdict::Delete,
        LinkMatch::BotInvite { .. } => LinkVerdict::Report,
        LinkMatch::Url(_) if config.log_urls => LinkVerdict::Report,
        LinkMatch::Url(_) => LinkVerdict::Ignore,
    }
}

/// Moderation log notice for a detected link
#[must_use]
pub fn link_notice(link: &LinkMatch, verdict: LinkVerdict, author_id: u64, jump_url: &str) -> LogMessage {
    let deleted = verdict == LinkVerdict::Delete;
    let (title, colour) = match (link, deleted) {
        (LinkMatch::GuildInvite { .. }, true) => ("Invite Deleted", 0x00ED_4245),
        (LinkMatch::GuildInvite { .. }, false) => ("Invite Detected", 0x00E6_7E22),
        (LinkMatch::BotInvite { .. }, true) => ("Bot Invite Deleted", 0x00ED_4245),
        (LinkMatch::BotInvite { .. }, false) => ("Bot Invite Detected", 0x00E6_7E22),
        (LinkMatch::Url(_), _) => ("URL Detected", 0x00E6_7E22),
    };
    let jump = if deleted {
        format!("[**Jump To Location**]({jump_url})")
    } else {
        format!("[**Jump To Message**]({jump_url})")
    };

    let mut message = LogMessage::new(title, colour).description(jump);
    if let LinkMatch::GuildInvite { code, .. } = link {
        message = message.field("Code", code, true);
    }
    message
        .field("URL", link.url(), false)
        .field("Sent By", format!("<@{author_id}>"), true)
}
