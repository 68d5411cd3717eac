//! Periodic clean-up of auto-delete channels

use crate::cache::GuildCache;
use crate::platform::{MessageSummary, Platform};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Messages older than this cannot be bulk deleted
pub const BULK_DELETE_MAX_AGE: Duration = Duration::days(14);

/// Messages fetched per channel on each sweep
const SWEEP_BATCH: u8 = 100;

/// Ids of messages that have outlived `delete_after_minutes` but can still be
/// bulk deleted. Pinned messages are kept.
#[must_use]
pub fn expired_messages(
    messages: &[MessageSummary],
    now: DateTime<Utc>,
    delete_after_minutes: u32,
) -> Vec<u64> {
    let newest_allowed = now - Duration::minutes(i64::from(delete_after_minutes));
    let oldest_allowed = now - BULK_DELETE_MAX_AGE;
    messages
        .iter()
        .filter(|message| !message.pinned)
        .filter(|message| message.timestamp <= newest_allowed && message.timestamp > oldest_allowed)
        .map(|message| message.id)
        .collect()
}

/// Run one pass over every cached guild. Returns the number of messages deleted.
pub async fn sweep(cache: &GuildCache, platform: &dyn Platform) -> usize {
    let now = Utc::now();
    let mut deleted = 0;

    for guild in cache.all() {
        for channel in &guild.auto_delete_data {
            let messages = match platform.recent_messages(channel.channel_id, SWEEP_BATCH).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(
                        guild_id = %guild.guild_id,
                        channel_id = %channel.channel_id,
                        "Failed to fetch messages for auto-delete: {e}"
                    );
                    continue;
                }
            };

            let expired = expired_messages(&messages, now, channel.delete_after_minutes);
            if expired.is_empty() {
                continue;
            }

            let count = expired.len();
            match platform.delete_messages(channel.channel_id, expired).await {
                Ok(()) => {
                    debug!(channel_id = %channel.channel_id, count = count, "Auto-deleted messages");
                    deleted += count;
                }
                Err(e) => error!(
                    guild_id = %guild.guild_id,
                    channel_id = %channel.channel_id,
                    "Failed to auto-delete messages: {e}"
                ),
            }
        }
    }
    deleted
}

/// Sweep every `interval` until `shutdown` turns true
pub fn spawn(
    cache: GuildCache,
    platform: Arc<dyn Platform>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting auto-delete task with {}s interval", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let deleted = sweep(&cache, platform.as_ref()).await;
                    if deleted > 0 {
                        info!(deleted = deleted, "Auto-delete sweep finished");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Auto-delete task shut down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EntityStore, GuildConfig};
    use crate::platform::MockPlatform;
    use crate::store::MemoryStore;
    use mockall::predicate::eq;

    fn message(id: u64, age: Duration, pinned: bool, now: DateTime<Utc>) -> MessageSummary {
        MessageSummary {
            id,
            author_id: 1,
            timestamp: now - age,
            pinned,
        }
    }

    #[test]
    fn test_expired_window() {
        let now = Utc::now();
        let messages = vec![
            message(1, Duration::minutes(1), false, now),
            message(2, Duration::minutes(10), false, now),
            message(3, Duration::minutes(10), true, now),
            message(4, Duration::days(15), false, now),
        ];
        assert_eq!(expired_messages(&messages, now, 5), vec![2]);
    }

    #[tokio::test]
    async fn test_sweep_deletes_expired_messages() {
        let entities = EntityStore::new(Arc::new(MemoryStore::new()));
        let mut config = GuildConfig::new(1);
        config.upsert_auto_delete(40, 5);
        entities.save_guild(&config).await.unwrap();
        let cache = GuildCache::new(entities);
        cache.refresh().await.unwrap();

        let mut platform = MockPlatform::new();
        platform
            .expect_recent_messages()
            .with(eq(40), eq(SWEEP_BATCH))
            .returning(|_, _| {
                let now = Utc::now();
                Ok(vec![
                    message(7, Duration::minutes(30), false, now),
                    message(8, Duration::minutes(1), false, now),
                ])
            });
        platform
            .expect_delete_messages()
            .with(eq(40), eq(vec![7]))
            .times(1)
            .returning(|_, _| Ok(()));

        assert_eq!(sweep(&cache, &platform).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_on_shutdown() {
        let cache = GuildCache::new(EntityStore::new(Arc::new(MemoryStore::new())));
        let (tx, rx) = watch::channel(false);
        let handle = spawn(
            cache,
            Arc::new(MockPlatform::new()),
            std::time::Duration::from_secs(60),
            rx,
        );

        tokio::time::sleep(std::time::Duration::from_secs(130)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
