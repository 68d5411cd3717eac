//! Audit trail of moderation actions
//!
//! [`AuditLog`] subscribes to the `modAction` topic. Each action gets the next
//! per-guild id, a log message in the guild's action log channel and a stored
//! [`ModActionRecord`].

mod render;

pub use render::{missing_reason_prompt, render};
pub(crate) use render::{BLURPLE, DARK_RED, GREEN, ORANGE, RED};

use crate::entities::{EntityStore, ModActionRecord};
use crate::error::{PaladinError, PaladinResult};
use crate::events::{Action, BusEvent, EventBus, MOD_ACTION_TOPIC, Moderator, Subscriber};
use crate::{EVENT_BUS_TARGET, Error};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Writes every moderation action to the log channel and the store
#[derive(Clone)]
pub struct AuditLog {
    entities: EntityStore,
    platform: Arc<dyn crate::platform::Platform>,
}

impl AuditLog {
    #[must_use]
    pub fn new(entities: EntityStore, platform: Arc<dyn crate::platform::Platform>) -> Self {
        Self { entities, platform }
    }

    /// Subscribe to moderation actions on `bus`
    pub fn register(&self, bus: &EventBus) {
        bus.subscribe(MOD_ACTION_TOPIC, Arc::new(self.clone()));
    }

    /// Log one action and return the stored record
    ///
    /// A log message that cannot be sent is reported and the record is still
    /// stored, without a message id.
    ///
    /// # Errors
    /// Returns an error if the guild configuration or the record cannot be
    /// read or written.
    pub async fn log_action(&self, action: &Action) -> PaladinResult<ModActionRecord> {
        let action_id = self.entities.next_action_id(action.guild_id).await?;
        let guild = self.entities.get_guild_data(action.guild_id).await?;
        let bot_id = self.platform.current_user_id();
        let message = render(action, action_id, bot_id);

        let mut message_id = None;
        if let Some(channel_id) = guild.channel_action_log_id {
            match self.platform.send_moderation_log(channel_id, &message).await {
                Ok(id) => message_id = Some(id),
                Err(e) => warn!(
                    target: EVENT_BUS_TARGET,
                    guild_id = %action.guild_id,
                    channel_id = %channel_id,
                    "Failed to send action log message: {e}"
                ),
            }
        }

        let reason = action
            .reason
            .clone()
            .unwrap_or_else(|| missing_reason_prompt(action_id));
        let record = ModActionRecord {
            guild_id: action.guild_id,
            action_id,
            action_kind: action.kind,
            moderator_id: match action.moderator {
                Moderator::User(id) => id,
                Moderator::System => bot_id,
            },
            user_id: action.user_id,
            role_id: action.role_id,
            reason: ModActionRecord::encode_reason(&reason),
            message_id,
            channel_id: message_id.and(guild.channel_action_log_id),
            outcome: action.outcome.clone(),
        };
        self.entities.save_action(&record).await?;

        info!(
            target: EVENT_BUS_TARGET,
            guild_id = %action.guild_id,
            action_id = action_id,
            action_kind = %action.kind,
            failed = action.outcome.is_failure(),
            "Moderation action logged"
        );
        Ok(record)
    }

    /// Attach a moderator-supplied reason to a logged action
    ///
    /// # Errors
    /// Returns [`PaladinError::ActionNotFound`] for an unknown id, or a store
    /// error if the record cannot be read or written.
    pub async fn set_reason(
        &self,
        guild_id: u64,
        action_id: u64,
        reason: &str,
    ) -> PaladinResult<ModActionRecord> {
        let mut record = self
            .entities
            .get_action_data(guild_id, action_id)
            .await?
            .ok_or(PaladinError::ActionNotFound {
                guild_id,
                action_id,
            })?;
        record.set_reason(reason);
        self.entities.save_action(&record).await?;
        Ok(record)
    }
}

#[async_trait]
impl Subscriber for AuditLog {
    fn name(&self) -> &str {
        "audit_log"
    }

    async fn handle(&self, event: BusEvent) -> Result<(), Error> {
        let Some(action) = event.action() else {
            return Ok(());
        };
        self.log_action(action).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::GuildConfig;
    use crate::events::{ActionKind, ActionOutcome};
    use crate::platform::MockPlatform;
    use crate::store::MemoryStore;

    const GUILD: u64 = 1;
    const LOG_CHANNEL: u64 = 500;

    async fn audit_log(platform: MockPlatform, log_channel: Option<u64>) -> (AuditLog, EntityStore) {
        let entities = EntityStore::new(Arc::new(MemoryStore::new()));
        let mut guild = GuildConfig::new(GUILD);
        guild.channel_action_log_id = log_channel;
        entities.save_guild(&guild).await.unwrap();
        (AuditLog::new(entities.clone(), Arc::new(platform)), entities)
    }

    fn platform() -> MockPlatform {
        let mut platform = MockPlatform::new();
        platform.expect_current_user_id().return_const(99u64);
        platform
    }

    #[tokio::test]
    async fn test_action_is_sent_and_stored() {
        let mut platform = platform();
        platform
            .expect_send_moderation_log()
            .withf(|channel, message| *channel == LOG_CHANNEL && message.title == "User Banned")
            .times(1)
            .returning(|_, _| Ok(777));
        let (audit, entities) = audit_log(platform, Some(LOG_CHANNEL)).await;

        let action = Action::new(ActionKind::Ban, Moderator::User(5), GUILD)
            .with_user(6)
            .with_reason(Some("raid".to_string()));
        let record = audit.log_action(&action).await.unwrap();

        assert_eq!(record.action_id, 1);
        assert_eq!(record.message_id, Some(777));
        assert_eq!(record.channel_id, Some(LOG_CHANNEL));
        assert_eq!(record.decoded_reason().as_deref(), Some("raid"));
        assert_eq!(
            entities.get_action_data(GUILD, 1).await.unwrap(),
            Some(record)
        );
    }

    #[tokio::test]
    async fn test_no_log_channel_still_stores() {
        let (audit, _) = audit_log(platform(), None).await;

        let action = Action::new(ActionKind::Unmute, Moderator::System, GUILD).with_user(6);
        let record = audit.log_action(&action).await.unwrap();

        assert_eq!(record.moderator_id, 99);
        assert!(record.message_id.is_none());
        assert_eq!(
            record.decoded_reason().as_deref(),
            Some("**Moderator:** Please use `/reason 1`")
        );
    }

    #[tokio::test]
    async fn test_send_failure_still_stores() {
        let mut platform = platform();
        platform
            .expect_send_moderation_log()
            .returning(|_, _| Err(PaladinError::Other("Missing Access".to_string())));
        let (audit, entities) = audit_log(platform, Some(LOG_CHANNEL)).await;

        let action = Action::new(ActionKind::Kick, Moderator::User(5), GUILD).with_user(6);
        let record = audit.log_action(&action).await.unwrap();

        assert!(record.channel_id.is_none());
        assert_eq!(entities.action_count(GUILD).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_action_is_stored_as_failed() {
        let (audit, entities) = audit_log(platform(), None).await;

        let unmuted = Action::new(ActionKind::Unmute, Moderator::System, GUILD).with_user(6);
        let failed = unmuted.clone().failed("Missing Permissions");
        audit.log_action(&unmuted).await.unwrap();
        audit.log_action(&failed).await.unwrap();

        let first = entities.get_action_data(GUILD, 1).await.unwrap().unwrap();
        let second = entities.get_action_data(GUILD, 2).await.unwrap().unwrap();
        assert_eq!(first.outcome, ActionOutcome::Succeeded);
        assert_eq!(
            second.outcome,
            ActionOutcome::Failed("Missing Permissions".to_string())
        );
    }

    #[tokio::test]
    async fn test_ids_increase_per_guild() {
        let (audit, _) = audit_log(platform(), None).await;
        for expected in 1..=3 {
            let action = Action::new(ActionKind::Warn, Moderator::User(5), GUILD).with_user(6);
            assert_eq!(audit.log_action(&action).await.unwrap().action_id, expected);
        }
    }

    #[tokio::test]
    async fn test_set_reason() {
        let (audit, entities) = audit_log(platform(), None).await;
        let action = Action::new(ActionKind::Kick, Moderator::User(5), GUILD).with_user(6);
        audit.log_action(&action).await.unwrap();

        audit.set_reason(GUILD, 1, "alt account").await.unwrap();
        let stored = entities.get_action_data(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(stored.decoded_reason().as_deref(), Some("alt account"));

        let missing = audit.set_reason(GUILD, 9, "nope").await.unwrap_err();
        assert!(matches!(missing, PaladinError::ActionNotFound { action_id: 9, .. }));
    }

    #[tokio::test]
    async fn test_subscribed_to_bus() {
        let (audit, entities) = audit_log(platform(), None).await;
        let bus = EventBus::new();
        audit.register(&bus);
        bus.start();

        bus.publish(Action::new(ActionKind::Purge, Moderator::User(5), GUILD))
            .unwrap();
        bus.publish("guildConfigRefresh").unwrap();
        bus.wait_idle().await;

        assert_eq!(entities.action_count(GUILD).await.unwrap(), 1);
    }
}
