//! Discord implementation of [`Platform`] over serenity's HTTP client

use super::{LogMessage, MemberInfo, MessageSummary, Platform};
use crate::error::PaladinResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, GetMessages, GuildId, MessageId,
    RoleId, Timestamp, UserId,
};
use serenity::http::{Http, HttpError};
use std::sync::Arc;
use tracing::debug;

/// Platform backed by a live bot connection
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
    bot_id: u64,
}

impl SerenityPlatform {
    #[must_use]
    pub fn new(http: Arc<Http>, bot_id: u64) -> Self {
        Self { http, bot_id }
    }

}

/// Convert a Discord timestamp, to the second
#[must_use]
pub fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// Build the Discord embed for a rendered message
#[must_use]
pub fn embed(message: &LogMessage) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(&message.title)
        .colour(message.colour)
        .timestamp(Timestamp::now());
    if let Some(description) = &message.description {
        embed = embed.description(description);
    }
    for (name, value, inline) in &message.fields {
        embed = embed.field(name, value, *inline);
    }
    if let Some(footer) = &message.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    embed
}

#[async_trait]
impl Platform for SerenityPlatform {
    async fn add_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: Option<String>,
    ) -> PaladinResult<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                reason.as_deref(),
            )
            .await?;
        Ok(())
    }

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> PaladinResult<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                None,
            )
            .await?;
        Ok(())
    }

    async fn kick_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: Option<String>,
    ) -> PaladinResult<()> {
        let guild = GuildId::new(guild_id);
        match reason {
            Some(reason) => {
                guild
                    .kick_with_reason(&*self.http, UserId::new(user_id), &reason)
                    .await?;
            }
            None => guild.kick(&*self.http, UserId::new(user_id)).await?,
        }
        Ok(())
    }

    async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: Option<String>,
    ) -> PaladinResult<()> {
        let guild = GuildId::new(guild_id);
        match reason {
            Some(reason) => {
                guild
                    .ban_with_reason(&*self.http, UserId::new(user_id), 0, &reason)
                    .await?;
            }
            None => guild.ban(&*self.http, UserId::new(user_id), 0).await?,
        }
        Ok(())
    }

    async fn send_moderation_log(
        &self,
        channel_id: u64,
        message: &LogMessage,
    ) -> PaladinResult<u64> {
        let sent = ChannelId::new(channel_id)
            .send_message(&*self.http, CreateMessage::new().embed(embed(message)))
            .await?;
        Ok(sent.id.get())
    }

    async fn resolve_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> PaladinResult<Option<MemberInfo>> {
        match GuildId::new(guild_id)
            .member(&*self.http, UserId::new(user_id))
            .await
        {
            Ok(member) => Ok(Some(MemberInfo {
                user_id: member.user.id.get(),
                display_name: member.display_name().to_string(),
                roles: member.roles.iter().map(|role| role.get()).collect(),
            })),
            Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response)))
                if response.status_code.as_u16() == 404 =>
            {
                debug!(guild_id = %guild_id, user_id = %user_id, "Member not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> PaladinResult<Vec<MessageSummary>> {
        let messages = ChannelId::new(channel_id)
            .messages(&*self.http, GetMessages::new().limit(limit))
            .await?;
        Ok(messages
            .into_iter()
            .filter_map(|message| {
                let timestamp = DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)?;
                Some(MessageSummary {
                    id: message.id.get(),
                    author_id: message.author.id.get(),
                    timestamp,
                    pinned: message.pinned,
                })
            })
            .collect())
    }

    async fn delete_messages(&self, channel_id: u64, message_ids: Vec<u64>) -> PaladinResult<()> {
        let channel = ChannelId::new(channel_id);
        // Bulk delete takes between 2 and 100 ids
        for chunk in message_ids.chunks(100) {
            if let [single] = chunk {
                channel
                    .delete_message(&self.http, MessageId::new(*single))
                    .await?;
            } else {
                let ids: Vec<String> = chunk.iter().map(u64::to_string).collect();
                let body = serde_json::json!({ "messages": ids });
                self.http.delete_messages(channel, &body, None).await?;
            }
        }
        Ok(())
    }

    fn current_user_id(&self) -> u64 {
        self.bot_id
    }
}
