use crate::commands::{update_guild, vote_slowmode_ok};
use crate::entities::GuildConfig;
use crate::event_log::GatewayEvent;
use crate::filters::{LinkMatch, LinkVerdict, detect_link, judge, link_notice};
use crate::platform::to_utc;
use crate::scheduler::RejoinOutcome;
use crate::{Data, EVENT_TARGET, auto_delete};
use poise::serenity_prelude::{
    self as serenity, ChannelId, Context, EventHandler, GuildId, Invite, Member, Message,
    MessageId, MessageUpdateEvent, Ready, User,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const VOTE_YES: char = '✅';
const VOTE_NO: char = '❌';

fn jump_url(guild_id: u64, channel_id: u64, message_id: u64) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
}

/// Gateway events that feed the moderation core
pub struct Handler {
    data: Data,
    started: AtomicBool,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self {
            data,
            started: AtomicBool::new(false),
        }
    }

    async fn handle_vote_channel(&self, ctx: &Context, msg: &Message, guild_id: u64) {
        let slowmode = ctx
            .cache
            .channel(msg.channel_id)
            .map(|channel| channel.rate_limit_per_user);
        if let Some(rate_limit) = slowmode {
            if !vote_slowmode_ok(rate_limit) {
                // Slow-mode was lifted, stop reacting in this channel
                let channel_id = msg.channel_id.get();
                info!(target: EVENT_TARGET, guild_id = %guild_id, channel_id = %channel_id, "Vote channel lost its slow-mode, disabling");
                if let Err(e) = update_guild(&self.data, guild_id, |config| {
                    config.vote_channel_data.retain(|id| *id != channel_id);
                })
                .await
                {
                    error!(target: EVENT_TARGET, "Failed to disable vote channel: {e}");
                }
                return;
            }
        }

        for emoji in [VOTE_YES, VOTE_NO] {
            if let Err(e) = msg.react(ctx, emoji).await {
                warn!(target: EVENT_TARGET, channel_id = %msg.channel_id, "Failed to add vote reaction: {e}");
                return;
            }
        }
    }

    async fn log_event(&self, guild_id: u64, event: GatewayEvent) {
        if let Err(e) = self.data.event_log.record(guild_id, &event).await {
            warn!(target: EVENT_TARGET, guild_id = %guild_id, "Failed to send mod log entry: {e}");
        }
    }

    async fn handle_link(&self, ctx: &Context, msg: &Message, config: &GuildConfig, link: LinkMatch) {
        let invite_guild = match &link {
            LinkMatch::GuildInvite { code, .. } => match Invite::get(ctx, code, false, false, None).await {
                Ok(invite) => invite.guild.map(|guild| guild.id.get()),
                Err(e) => {
                    debug!(target: EVENT_TARGET, code = %code, "Could not resolve invite: {e}");
                    None
                }
            },
            _ => None,
        };

        let verdict = judge(config, &link, invite_guild);
        if verdict == LinkVerdict::Ignore {
            return;
        }

        if verdict == LinkVerdict::Delete {
            if let Err(e) = msg.delete(ctx).await {
                warn!(target: EVENT_TARGET, message_id = %msg.id, "Failed to delete message with link: {e}");
            }
        }

        let Some(channel_id) = config.channel_mod_log_id else {
            return;
        };
        let notice = link_notice(&link, verdict, msg.author.id.get(), &msg.link());
        if let Err(e) = self.data.platform.send_moderation_log(channel_id, &notice).await {
            warn!(target: EVENT_TARGET, channel_id = %channel_id, "Failed to send link notice: {e}");
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Start the core once the gateway is connected. Later ready events, such
    /// as after a reconnect, are only logged.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");

        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.data.bus.start();
        match self.data.guilds.refresh().await {
            Ok(count) => info!(target: EVENT_TARGET, guilds = count, "Guild configuration cached"),
            Err(e) => error!(target: EVENT_TARGET, "Failed to load guild configuration: {e}"),
        }
        match self.data.mutes.start().await {
            Ok(count) => info!(target: EVENT_TARGET, jobs = count, "Pending unmutes restored"),
            Err(e) => error!(target: EVENT_TARGET, "Failed to restore pending unmutes: {e}"),
        }
        auto_delete::spawn(
            self.data.guilds.clone(),
            Arc::clone(&self.data.platform),
            self.data.config.auto_delete_interval(),
            self.data.shutdown.subscribe(),
        );
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        let guild_id = new_member.guild_id.get();
        let user_id = new_member.user.id.get();
        match self.data.mutes.on_member_rejoin(guild_id, user_id).await {
            Ok(RejoinOutcome::NotMuted) => {}
            Ok(outcome) => debug!(target: EVENT_TARGET, guild_id = %guild_id, user_id = %user_id, outcome = ?outcome, "Mute state restored on join"),
            Err(e) => error!(target: EVENT_TARGET, guild_id = %guild_id, user_id = %user_id, "Failed to restore mute on join: {e}"),
        }

        let event = GatewayEvent::MemberJoined {
            user_id,
            tag: new_member.user.tag(),
            created_at: to_utc(new_member.user.created_at()),
        };
        self.log_event(guild_id, event).await;
    }

    async fn guild_member_removal(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        user: User,
        member_data_if_available: Option<Member>,
    ) {
        let event = GatewayEvent::MemberLeft {
            user_id: user.id.get(),
            tag: user.tag(),
            joined_at: member_data_if_available
                .and_then(|member| member.joined_at)
                .map(to_utc),
        };
        self.log_event(guild_id.get(), event).await;
    }

    async fn guild_ban_addition(&self, _ctx: Context, guild_id: GuildId, banned_user: User) {
        let event = GatewayEvent::MemberBanned {
            user_id: banned_user.id.get(),
            tag: banned_user.tag(),
        };
        self.log_event(guild_id.get(), event).await;
    }

    async fn guild_ban_removal(&self, _ctx: Context, guild_id: GuildId, unbanned_user: User) {
        let event = GatewayEvent::MemberUnbanned {
            user_id: unbanned_user.id.get(),
            tag: unbanned_user.tag(),
        };
        self.log_event(guild_id.get(), event).await;
    }

    async fn message_update(
        &self,
        _ctx: Context,
        old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let Some(guild_id) = event.guild_id.map(|id| id.get()) else {
            return;
        };
        // Embed-only updates carry no author or content
        let (Some(author), Some(after)) = (event.author, event.content) else {
            return;
        };
        if author.id.get() == self.data.platform.current_user_id() {
            return;
        }
        let before = old_if_available.map(|message| message.content);
        if before.as_deref() == Some(after.as_str()) {
            return;
        }

        let event = GatewayEvent::MessageEdited {
            author_tag: author.tag(),
            before,
            after,
            jump_url: jump_url(guild_id, event.channel_id.get(), event.id.get()),
            edited_at: event.edited_timestamp.map(to_utc),
        };
        self.log_event(guild_id, event).await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id.map(|id| id.get()) else {
            return;
        };
        let event = GatewayEvent::MessageDeleted {
            channel_id: channel_id.get(),
            message_id: deleted_message_id.get(),
            jump_url: jump_url(guild_id, channel_id.get(), deleted_message_id.get()),
        };
        self.log_event(guild_id, event).await;
    }

    async fn message_delete_bulk(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        multiple_deleted_messages_ids: Vec<MessageId>,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id.map(|id| id.get()) else {
            return;
        };
        let event = GatewayEvent::MessagesPurged {
            channel_id: channel_id.get(),
            count: multiple_deleted_messages_ids.len(),
        };
        self.log_event(guild_id, event).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.id.get() == self.data.platform.current_user_id() {
            return;
        }
        let Some(guild_id) = msg.guild_id.map(|id| id.get()) else {
            return;
        };

        let config = match self.data.guilds.get_or_load(guild_id).await {
            Ok(config) => config,
            Err(e) => {
                error!(target: EVENT_TARGET, guild_id = %guild_id, "Failed to load guild configuration: {e}");
                return;
            }
        };

        if config.vote_channel_data.contains(&msg.channel_id.get()) {
            self.handle_vote_channel(&ctx, &msg, guild_id).await;
        }

        if let Some(link) = detect_link(&msg.content) {
            self.handle_link(&ctx, &msg, &config, link).await;
        }
    }
}
