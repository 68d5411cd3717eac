//! In-memory guild configuration for the message hot path

use crate::entities::{EntityStore, GuildConfig};
use crate::error::PaladinResult;
use crate::events::{BusEvent, EventBus, GUILD_CONFIG_REFRESH, Subscriber};
use crate::{EVENT_BUS_TARGET, Error};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Copy of every stored guild configuration, reloaded on `guildConfigRefresh`
#[derive(Clone)]
pub struct GuildCache {
    entities: EntityStore,
    guilds: Arc<DashMap<u64, GuildConfig>>,
}

impl GuildCache {
    #[must_use]
    pub fn new(entities: EntityStore) -> Self {
        Self {
            entities,
            guilds: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe to refresh signals on `bus`
    pub fn register(&self, bus: &EventBus) {
        bus.subscribe(GUILD_CONFIG_REFRESH, Arc::new(self.clone()));
    }

    /// Reload every guild configuration from the store
    ///
    /// # Errors
    /// Returns an error if the guild records cannot be listed.
    pub async fn refresh(&self) -> PaladinResult<usize> {
        let configs = self.entities.all_guilds().await?;
        self.guilds.clear();
        for config in configs {
            self.guilds.insert(config.guild_id, config);
        }
        debug!(target: EVENT_BUS_TARGET, guilds = self.guilds.len(), "Guild cache refreshed");
        Ok(self.guilds.len())
    }

    #[must_use]
    pub fn get(&self, guild_id: u64) -> Option<GuildConfig> {
        self.guilds.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Cached configuration, falling back to the store on a miss
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn get_or_load(&self, guild_id: u64) -> PaladinResult<GuildConfig> {
        if let Some(config) = self.get(guild_id) {
            return Ok(config);
        }
        let config = self.entities.get_guild_data(guild_id).await?;
        self.guilds.insert(guild_id, config.clone());
        Ok(config)
    }

    /// Every cached configuration
    #[must_use]
    pub fn all(&self) -> Vec<GuildConfig> {
        self.guilds.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl Subscriber for GuildCache {
    fn name(&self) -> &str {
        "guild_cache"
    }

    async fn handle(&self, _event: BusEvent) -> Result<(), Error> {
        self.refresh().await?;
        Ok(())
    }
}
