//! Typed entity accessors over the key-value store
//!
//! Every record is stored as a JSON snapshot. Guild and member records are
//! created with default values the first time they are read.

mod guild;
pub mod keys;
mod member;
mod mod_action;

pub use guild::{AutoDeleteChannel, GuildConfig};
pub use member::MemberState;
pub use mod_action::ModActionRecord;

use crate::error::{PaladinError, PaladinResult};
use crate::store::KeyValueStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Typed load/save layer for guild, member and audit records
#[derive(Clone)]
pub struct EntityStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").finish_non_exhaustive()
    }
}

impl EntityStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> PaladinResult<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PaladinError::Deserialize {
                key: key.to_string(),
                source,
            })
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> PaladinResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|source| PaladinError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, bytes).await
    }

    /// Load a guild's configuration, creating and persisting the default if absent
    ///
    /// # Errors
    /// Returns an error if the store fails or the stored record is malformed.
    pub async fn get_guild_data(&self, guild_id: u64) -> PaladinResult<GuildConfig> {
        let key = keys::guild_key(guild_id);
        if let Some(config) = self.load(&key).await? {
            return Ok(config);
        }

        debug!(guild_id = %guild_id, "Creating default guild configuration");
        let config = GuildConfig::new(guild_id);
        self.save(&key, &config).await?;
        Ok(config)
    }

    /// Persist a guild's configuration
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub async fn save_guild(&self, config: &GuildConfig) -> PaladinResult<()> {
        self.save(&keys::guild_key(config.guild_id), config).await
    }

    /// Load a member's state, creating and persisting a clean record if absent
    ///
    /// # Errors
    /// Returns an error if the store fails or the stored record is malformed.
    pub async fn get_member_data(&self, guild_id: u64, user_id: u64) -> PaladinResult<MemberState> {
        let key = keys::member_key(guild_id, user_id);
        if let Some(member) = self.load(&key).await? {
            return Ok(member);
        }

        let member = MemberState::new(guild_id, user_id);
        self.save(&key, &member).await?;
        Ok(member)
    }

    /// Persist a member's state
    ///
    /// Mute fields should only change through the mute scheduler, which keeps
    /// live timers in step with what is stored here.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub async fn save_member(&self, member: &MemberState) -> PaladinResult<()> {
        self.save(&keys::member_key(member.guild_id, member.user_id), member)
            .await
    }

    /// Load an audit record
    ///
    /// # Errors
    /// Returns an error if the store fails or the stored record is malformed.
    pub async fn get_action_data(
        &self,
        guild_id: u64,
        action_id: u64,
    ) -> PaladinResult<Option<ModActionRecord>> {
        self.load(&keys::action_key(guild_id, action_id)).await
    }

    /// Persist an audit record
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub async fn save_action(&self, record: &ModActionRecord) -> PaladinResult<()> {
        self.save(&keys::action_key(record.guild_id, record.action_id), record)
            .await
    }

    /// Allocate the next audit id for a guild
    ///
    /// # Errors
    /// Returns an error if the counter cannot be incremented.
    pub async fn next_action_id(&self, guild_id: u64) -> PaladinResult<u64> {
        self.store.incr(&keys::action_counter_key(guild_id)).await
    }

    /// Number of audit records stored for a guild
    ///
    /// # Errors
    /// Returns an error if the keys cannot be listed.
    pub async fn action_count(&self, guild_id: u64) -> PaladinResult<usize> {
        Ok(self
            .store
            .keys(&keys::guild_action_pattern(guild_id))
            .await?
            .len())
    }

    /// Every stored member record, each with its own parse result
    ///
    /// # Errors
    /// Returns an error only if the keys themselves cannot be listed.
    pub async fn scan_members(&self) -> PaladinResult<Vec<(String, PaladinResult<MemberState>)>> {
        let member_keys = self.store.keys(keys::MEMBER_PATTERN).await?;
        let mut members = Vec::with_capacity(member_keys.len());
        for key in member_keys {
            let result = self.load::<MemberState>(&key).await.and_then(|member| {
                member.ok_or_else(|| PaladinError::Other(format!("Record at {key} disappeared")))
            });
            members.push((key, result));
        }
        Ok(members)
    }

    /// Every stored guild configuration, skipping records that fail to parse
    ///
    /// # Errors
    /// Returns an error only if the keys themselves cannot be listed.
    pub async fn all_guilds(&self) -> PaladinResult<Vec<GuildConfig>> {
        let guild_keys = self.store.keys(keys::GUILD_PATTERN).await?;
        let mut guilds = Vec::with_capacity(guild_keys.len());
        for key in guild_keys {
            match self.load::<GuildConfig>(&key).await {
                Ok(Some(config)) => guilds.push(config),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping guild record: {e}"),
            }
        }
        Ok(guilds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActionKind, ActionOutcome};
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn entity_store() -> (EntityStore, MemoryStore) {
        let memory = MemoryStore::new();
        (EntityStore::new(Arc::new(memory.clone())), memory)
    }

    #[tokio::test]
    async fn test_guild_created_lazily() {
        let (store, memory) = entity_store();
        let config = store.get_guild_data(5).await.unwrap();
        assert_eq!(config, GuildConfig::new(5));
        assert!(memory.snapshot().contains_key("guild||5"));
    }

    #[tokio::test]
    async fn test_guild_round_trip() {
        let (store, _) = entity_store();
        let mut config = GuildConfig::new(5);
        config.role_mute_id = Some(77);
        config.toggle_vote_channel(8);
        store.save_guild(&config).await.unwrap();
        assert_eq!(store.get_guild_data(5).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_member_created_lazily() {
        let (store, memory) = entity_store();
        let member = store.get_member_data(1, 2).await.unwrap();
        assert_eq!(member, MemberState::new(1, 2));
        assert!(memory.snapshot().contains_key("member||1|2"));
    }

    #[tokio::test]
    async fn test_members_do_not_collide() {
        let (store, _) = entity_store();
        let mut first = MemberState::new(1, 23);
        first.warnings = 3;
        store.save_member(&first).await.unwrap();

        let second = store.get_member_data(12, 3).await.unwrap();
        assert_eq!(second.warnings, 0);
        assert_eq!(store.get_member_data(1, 23).await.unwrap().warnings, 3);
    }

    #[tokio::test]
    async fn test_malformed_member_is_reported() {
        let memory = MemoryStore::from_entries([(
            "member||1|2".to_string(),
            br#"{"guild_id":1}"#.to_vec(),
        )]);
        let store = EntityStore::new(Arc::new(memory));
        let error = store.get_member_data(1, 2).await.unwrap_err();
        assert!(matches!(error, PaladinError::Deserialize { .. }));
    }

    #[tokio::test]
    async fn test_scan_members_isolates_bad_records() {
        let mut good = MemberState::new(1, 2);
        good.muted = true;
        good.unmute_time = Some(Utc::now() + Duration::minutes(5));
        let memory = MemoryStore::from_entries([
            (
                "member||1|2".to_string(),
                serde_json::to_vec(&good).unwrap(),
            ),
            ("member||1|3".to_string(), b"not json".to_vec()),
            ("guild||1".to_string(), b"{}".to_vec()),
        ]);
        let store = EntityStore::new(Arc::new(memory));

        let scanned = store.scan_members().await.unwrap();
        assert_eq!(scanned.len(), 2);
        let (ok, bad): (Vec<_>, Vec<_>) = scanned.into_iter().partition(|(_, r)| r.is_ok());
        assert_eq!(ok.len(), 1);
        assert_eq!(bad[0].0, "member||1|3");
        assert_eq!(ok[0].1.as_ref().unwrap(), &good);
    }

    #[tokio::test]
    async fn test_action_ids_are_sequential_per_guild() {
        let (store, _) = entity_store();
        assert_eq!(store.next_action_id(1).await.unwrap(), 1);
        assert_eq!(store.next_action_id(1).await.unwrap(), 2);
        assert_eq!(store.next_action_id(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_action_record_round_trip() {
        let (store, _) = entity_store();
        let record = ModActionRecord {
            guild_id: 1,
            action_id: 4,
            action_kind: ActionKind::Warn,
            moderator_id: 9,
            user_id: Some(3),
            role_id: None,
            reason: ModActionRecord::encode_reason("spam"),
            message_id: None,
            channel_id: None,
            outcome: ActionOutcome::Succeeded,
        };
        store.save_action(&record).await.unwrap();
        assert_eq!(store.get_action_data(1, 4).await.unwrap(), Some(record));
        assert!(store.get_action_data(1, 5).await.unwrap().is_none());
        assert_eq!(store.action_count(1).await.unwrap(), 1);
        assert_eq!(store.action_count(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_all_guilds() {
        let (store, _) = entity_store();
        store.get_guild_data(1).await.unwrap();
        store.get_guild_data(2).await.unwrap();
        let mut ids: Vec<u64> = store
            .all_guilds()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.guild_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}
