use crate::audit::AuditLog;
use crate::cache::GuildCache;
use crate::config::BotConfig;
use crate::entities::EntityStore;
use crate::event_log::EventLog;
use crate::events::EventBus;
use crate::platform::Platform;
use crate::scheduler::MuteScheduler;
use crate::store::KeyValueStore;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared context handed to every command and gateway event
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

pub struct DataInner {
    pub config: BotConfig,
    pub entities: EntityStore,
    pub bus: EventBus,
    pub mutes: MuteScheduler,
    pub audit: AuditLog,
    pub guilds: GuildCache,
    pub event_log: EventLog,
    pub platform: Arc<dyn Platform>,
    // Flipped to true to stop background tasks
    pub shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("entities", &self.entities)
            .field("bus", &self.bus)
            .field("mutes", &self.mutes)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Wire every component together. Subscribers are registered but nothing
    /// is started.
    #[must_use]
    pub fn new(config: BotConfig, store: Arc<dyn KeyValueStore>, platform: Arc<dyn Platform>) -> Self {
        let entities = EntityStore::new(store);
        let bus = EventBus::new();
        let mutes = MuteScheduler::new(
            entities.clone(),
            bus.clone(),
            Arc::clone(&platform),
            config.unmute_grace(),
        );
        let audit = AuditLog::new(entities.clone(), Arc::clone(&platform));
        let guilds = GuildCache::new(entities.clone());
        let event_log = EventLog::new(guilds.clone(), Arc::clone(&platform));

        audit.register(&bus);
        guilds.register(&bus);

        let (shutdown, _) = watch::channel(false);

        Self(Arc::new(DataInner {
            config,
            entities,
            bus,
            mutes,
            audit,
            guilds,
            event_log,
            platform,
            shutdown,
        }))
    }

    /// Stop timers, drain the bus and signal background tasks
    pub async fn shutdown(&self) {
        self.mutes.shutdown();
        self.bus.shutdown().await;
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{GUILD_CONFIG_REFRESH, MOD_ACTION_TOPIC};
    use crate::platform::MockPlatform;
    use crate::store::MemoryStore;

    fn data() -> Data {
        Data::new(
            BotConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(MockPlatform::new()),
        )
    }

    #[test]
    fn test_subscribers_registered() {
        let data = data();
        assert_eq!(data.bus.subscriber_count(MOD_ACTION_TOPIC), 1);
        assert_eq!(data.bus.subscriber_count(GUILD_CONFIG_REFRESH), 1);
    }

    #[tokio::test]
    async fn test_shutdown_signals_tasks() {
        let data = data();
        let mut rx = data.shutdown.subscribe();
        data.bus.start();
        data.shutdown().await;
        assert!(*rx.borrow_and_update());
        assert!(!data.bus.is_running());
    }
}
