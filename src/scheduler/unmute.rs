//! Durable auto-unmute scheduling
//!
//! Stored member state is the source of truth. Every write of mute state goes
//! through [`MuteScheduler::write_mute_state`], which persists the record and
//! then brings the live timer for that member in line with it. On start the
//! timers are rebuilt from every stored member.

use super::jobs::{JobCallback, JobScheduler};
use crate::SCHEDULER_TARGET;
use crate::entities::{EntityStore, MemberState, keys};
use crate::error::{PaladinError, PaladinResult};
use crate::events::{Action, ActionExtra, ActionKind, EventBus, Moderator};
use crate::platform::Platform;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Delay applied to deadlines that passed while the bot was offline
pub const DEFAULT_UNMUTE_GRACE: Duration = Duration::seconds(10);

/// Wait before trying a failed automatic unmute again
pub const UNMUTE_RETRY_DELAY: Duration = Duration::minutes(1);

/// Timer jitter tolerated before a fire is treated as early
const DRIFT_TOLERANCE: Duration = Duration::seconds(1);

const REJOIN_REASON: &str = "AUTOMATIC ACTION: Re-applying mute role - user rejoined";

/// What happened when a member rejoined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinOutcome {
    NotMuted,
    /// The mute expired while they were away and was cleared
    Cleared,
    /// The mute role was given back
    Reapplied,
}

/// Keeps one live unmute timer per muted member
#[derive(Clone)]
pub struct MuteScheduler(Arc<MuteInner>);

struct MuteInner {
    jobs: JobScheduler,
    entities: EntityStore,
    bus: EventBus,
    platform: Arc<dyn Platform>,
    grace: Duration,
}

impl std::fmt::Debug for MuteScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuteScheduler")
            .field("jobs", &self.0.jobs.job_count())
            .field("running", &self.0.jobs.is_running())
            .finish()
    }
}

impl MuteScheduler {
    #[must_use]
    pub fn new(
        entities: EntityStore,
        bus: EventBus,
        platform: Arc<dyn Platform>,
        grace: Duration,
    ) -> Self {
        Self(Arc::new(MuteInner {
            jobs: JobScheduler::new(),
            entities,
            bus,
            platform,
            grace,
        }))
    }

    /// Start the timer engine and rebuild a timer for every stored pending unmute.
    ///
    /// A malformed member record is logged and skipped. Returns the number of
    /// members scheduled.
    ///
    /// # Errors
    /// Returns an error only if the member records cannot be listed.
    pub async fn start(&self) -> PaladinResult<usize> {
        self.0.jobs.start();

        let mut scheduled = 0;
        for (key, member) in self.0.entities.scan_members().await? {
            match member {
                Ok(member) if member.has_pending_unmute() => {
                    self.schedule_job(&member);
                    scheduled += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(target: SCHEDULER_TARGET, key = %key, "Skipping member record: {e}"),
            }
        }

        info!(target: SCHEDULER_TARGET, jobs = scheduled, "Mute scheduler started");
        Ok(scheduled)
    }

    /// Stop all timers without waiting. The next `start` rebuilds them.
    pub fn shutdown(&self) {
        self.0.jobs.shutdown();
    }

    /// Bring the live timer for `member` in line with its stored state
    pub fn schedule_job(&self, member: &MemberState) {
        let job_id = keys::job_id(member.guild_id, member.user_id);

        let Some(deadline) = member.unmute_time.filter(|_| member.muted) else {
            if self.0.jobs.remove_job(&job_id) {
                debug!(target: SCHEDULER_TARGET, job_id = %job_id, "Unmute job removed");
            }
            return;
        };

        let now = Utc::now();
        let fire_at = if deadline <= now {
            now + self.0.grace
        } else {
            deadline
        };

        if self.0.jobs.reschedule(&job_id, fire_at) {
            debug!(target: SCHEDULER_TARGET, job_id = %job_id, fire_at = %fire_at, "Unmute job rescheduled");
            return;
        }

        let callback = self.unmute_job(member.guild_id, member.user_id);
        match self.0.jobs.add_job(job_id.clone(), fire_at, callback) {
            Ok(()) => {
                debug!(target: SCHEDULER_TARGET, job_id = %job_id, fire_at = %fire_at, "Unmute job scheduled");
            }
            Err(e) => error!(target: SCHEDULER_TARGET, job_id = %job_id, "Error scheduling unmute job: {e}"),
        }
    }

    fn unmute_job(&self, guild_id: u64, user_id: u64) -> JobCallback {
        let scheduler: Weak<MuteInner> = Arc::downgrade(&self.0);
        Box::new(move || {
            Box::pin(async move {
                if let Some(inner) = scheduler.upgrade() {
                    MuteScheduler(inner).unmute_callback(user_id, guild_id).await;
                }
            })
        })
    }

    /// Persist a member's mute state and reschedule their timer to match
    ///
    /// # Errors
    /// Returns an error if the member record cannot be read or written.
    pub async fn write_mute_state(
        &self,
        guild_id: u64,
        user_id: u64,
        muted: bool,
        unmute_time: Option<DateTime<Utc>>,
    ) -> PaladinResult<MemberState> {
        let mut member = self.0.entities.get_member_data(guild_id, user_id).await?;
        member.muted = muted;
        member.unmute_time = unmute_time;
        self.0.entities.save_member(&member).await?;

        self.schedule_job(&member);
        Ok(member)
    }

    /// Fire time of the live timer for a member, if any
    #[must_use]
    pub fn next_unmute(&self, guild_id: u64, user_id: u64) -> Option<DateTime<Utc>> {
        self.0.jobs.next_run_time(&keys::job_id(guild_id, user_id))
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.0.jobs.job_count()
    }

    /// Unmute a member whose timer fired.
    ///
    /// State is re-read first: a member unmuted some other way is left alone,
    /// and a deadline that moved without its timer following is rescheduled
    /// instead of fired. Failures are logged, never returned.
    pub async fn unmute_callback(&self, user_id: u64, guild_id: u64) {
        debug!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Running unmute task");
        if let Err(e) = self.auto_unmute(guild_id, user_id).await {
            error!(
                target: SCHEDULER_TARGET,
                guild_id = %guild_id,
                user_id = %user_id,
                "Error un-muting: {e}"
            );
        }
    }

    async fn auto_unmute(&self, guild_id: u64, user_id: u64) -> PaladinResult<()> {
        let member = self.0.entities.get_member_data(guild_id, user_id).await?;
        if !member.muted {
            debug!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Member already unmuted");
            return Ok(());
        }

        let Some(deadline) = member.unmute_time else {
            debug!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Mute is indefinite");
            return Ok(());
        };

        let job_id = keys::job_id(guild_id, user_id);
        let due = deadline <= Utc::now() + DRIFT_TOLERANCE;
        let timer_in_step = self.0.jobs.next_run_time(&job_id) == Some(deadline);
        if !due && !timer_in_step {
            self.schedule_job(&member);
            info!(
                target: SCHEDULER_TARGET,
                job_id = %job_id,
                deadline = %deadline,
                "Unmute ran before its deadline, rescheduled"
            );
            return Ok(());
        }

        if self
            .0
            .platform
            .resolve_member(guild_id, user_id)
            .await?
            .is_none()
        {
            info!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Muted member is not in the guild");
            return Ok(());
        }

        let reason = format!(
            "AUTOMATIC ACTION: \nMute scheduled to be removed at `{}` (UTC)",
            deadline.format("%a %b %e %H:%M:%S %Y")
        );
        let action = Action::new(ActionKind::Unmute, Moderator::System, guild_id)
            .with_user(user_id)
            .with_reason(Some(reason));

        let removed = match self.mute_role(guild_id).await {
            Ok(role_id) => self.0.platform.remove_role(guild_id, user_id, role_id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Automatic unmute failed, retrying: {e}");
            if self.0.jobs.next_run_time(&job_id).is_none() {
                self.schedule_retry(guild_id, user_id);
            }
            self.0.bus.publish(action.failed(e.to_string()))?;
            return Ok(());
        }

        self.write_mute_state(guild_id, user_id, false, None).await?;
        self.0.bus.publish(action)?;
        info!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Member automatically unmuted");
        Ok(())
    }

    fn schedule_retry(&self, guild_id: u64, user_id: u64) {
        let job_id = keys::job_id(guild_id, user_id);
        let retry_at = Utc::now() + UNMUTE_RETRY_DELAY;
        let callback = self.unmute_job(guild_id, user_id);
        match self.0.jobs.add_job(job_id.clone(), retry_at, callback) {
            Ok(()) => debug!(target: SCHEDULER_TARGET, job_id = %job_id, retry_at = %retry_at, "Unmute retry scheduled"),
            Err(e) => error!(target: SCHEDULER_TARGET, job_id = %job_id, "Error scheduling unmute retry: {e}"),
        }
    }

    async fn mute_role(&self, guild_id: u64) -> PaladinResult<u64> {
        self.0
            .entities
            .get_guild_data(guild_id)
            .await?
            .role_mute_id
            .ok_or(PaladinError::NotConfigured {
                guild_id,
                setting: "mute role",
            })
    }

    /// Mute a member until `until`, or indefinitely when `None`
    ///
    /// # Errors
    /// Returns an error if no mute role is configured, the role cannot be
    /// given, or the new state cannot be stored.
    pub async fn mute(
        &self,
        guild_id: u64,
        user_id: u64,
        moderator: Moderator,
        until: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> PaladinResult<MemberState> {
        let role_id = self.mute_role(guild_id).await?;
        self.0
            .platform
            .add_role(guild_id, user_id, role_id, reason.clone())
            .await?;
        let member = self.write_mute_state(guild_id, user_id, true, until).await?;

        let mut action = Action::new(ActionKind::Mute, moderator, guild_id)
            .with_user(user_id)
            .with_reason(reason);
        if let Some(until) = until {
            action = action.with_extra(ActionExtra::Note(format!(
                "Until <t:{}:f>",
                until.timestamp()
            )));
        }
        self.0.bus.publish(action)?;
        Ok(member)
    }

    /// Lift a mute by hand
    ///
    /// # Errors
    /// Returns an error if no mute role is configured, the role cannot be
    /// removed, or the new state cannot be stored.
    pub async fn unmute(
        &self,
        guild_id: u64,
        user_id: u64,
        moderator: Moderator,
        reason: Option<String>,
    ) -> PaladinResult<MemberState> {
        let role_id = self.mute_role(guild_id).await?;
        self.0
            .platform
            .remove_role(guild_id, user_id, role_id)
            .await?;
        let member = self.write_mute_state(guild_id, user_id, false, None).await?;

        self.0.bus.publish(
            Action::new(ActionKind::Unmute, moderator, guild_id)
                .with_user(user_id)
                .with_reason(reason),
        )?;
        Ok(member)
    }

    /// Restore or clear a mute for a member who just joined
    ///
    /// # Errors
    /// Returns an error if stored state cannot be read or written, or the
    /// mute role cannot be given back.
    pub async fn on_member_rejoin(&self, guild_id: u64, user_id: u64) -> PaladinResult<RejoinOutcome> {
        let member = self.0.entities.get_member_data(guild_id, user_id).await?;
        if !member.muted {
            return Ok(RejoinOutcome::NotMuted);
        }

        if member.mute_expired(Utc::now()) {
            self.write_mute_state(guild_id, user_id, false, None).await?;
            info!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Expired mute cleared on rejoin");
            return Ok(RejoinOutcome::Cleared);
        }

        let role_id = self.mute_role(guild_id).await?;
        self.0
            .platform
            .add_role(guild_id, user_id, role_id, Some(REJOIN_REASON.to_string()))
            .await?;
        self.0.bus.publish(
            Action::new(ActionKind::Mute, Moderator::System, guild_id)
                .with_user(user_id)
                .with_reason(Some(REJOIN_REASON.to_string())),
        )?;
        info!(target: SCHEDULER_TARGET, guild_id = %guild_id, user_id = %user_id, "Mute role re-applied on rejoin");
        Ok(RejoinOutcome::Reapplied)
    }
}
