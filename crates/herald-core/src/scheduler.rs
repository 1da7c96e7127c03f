//! Deferred-reminder lifecycle: parse a time expression, wait out the delay
//! on a cancellable unit, then broadcast to the current target channels.
//!
//! The scheduler owns the cancellation registry. A unit is live iff it is
//! registered; the unit deregisters itself the moment its wait elapses, before
//! any send goes out. The delay wait is the single suspension point
//! cancellation can interrupt — once the wait has been passed, the broadcast
//! runs to completion and a late cancel finds nothing to stop.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Duration, Utc};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::Config,
    delivery::{self, BroadcastReport},
    domain::{ChannelId, GuildId, ReminderId},
    ports::{Directory, Messenger},
    targets,
    timeparse::{self, DurationParts},
    Result,
};

/// A user-submitted reminder command, before parsing.
#[derive(Clone, Debug)]
pub struct ReminderRequest {
    pub guild: GuildId,
    /// Channel the command came from; outcome reports go back here.
    pub origin: ChannelId,
    pub time_expression: String,
    pub message: String,
}

/// Handle returned to the requester after scheduling.
#[derive(Clone, Copy, Debug)]
pub struct ScheduledReminder {
    pub id: ReminderId,
    pub fires_at: DateTime<Utc>,
    pub delay: DurationParts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The unit already passed its wait (broadcast finished or in flight),
    /// failed, or was cancelled earlier. Double-cancellation always lands
    /// here.
    AlreadyFinished,
}

#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    directory: Arc<dyn Directory>,
    messenger: Arc<dyn Messenger>,
    audit: AuditLogger,

    channel_search_string: String,
    broadcast_batch_size: usize,
    max_horizon: Duration,

    next_id: AtomicU64,
    units: tokio::sync::Mutex<HashMap<ReminderId, ScheduledUnit>>,
}

struct ScheduledUnit {
    cancel: CancellationToken,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl ReminderScheduler {
    pub fn new(
        cfg: &Config,
        directory: Arc<dyn Directory>,
        messenger: Arc<dyn Messenger>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                directory,
                messenger,
                audit,
                channel_search_string: cfg.channel_search_string.clone(),
                broadcast_batch_size: cfg.broadcast_batch_size,
                max_horizon: Duration::days(cfg.reminder_horizon_days),
                next_id: AtomicU64::new(1),
                units: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Validate the time expression, register a cancellable unit, and spawn
    /// the delay wait. On a parse or range rejection no unit is registered.
    pub async fn schedule(&self, req: ReminderRequest) -> Result<ScheduledReminder> {
        let now = Utc::now();
        let fires_at = timeparse::parse_future_time(&req.time_expression, now, self.inner.max_horizon)?;
        let delay = fires_at - now;

        let id = ReminderId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();
        let unit_cancel = cancel.child_token();

        let scheduler = self.clone();
        let ReminderRequest { guild, origin, message, .. } = req;
        // Strictly in the future, so the conversion cannot fail.
        let std_delay = delay.to_std().unwrap_or_default();
        // Hold the registry lock across the spawn: the unit cannot reach its
        // own terminal cleanup before the insert is visible, even for a
        // near-zero delay.
        {
            let mut units = self.inner.units.lock().await;
            let handle = tokio::spawn(async move {
                scheduler
                    .run_unit(id, guild, origin, message, std_delay, unit_cancel)
                    .await;
            });
            units.insert(id, ScheduledUnit { cancel, handle });
        }

        info!(reminder = %id, %fires_at, "reminder scheduled");
        self.inner.audit.record(AuditEvent::reminder(
            "reminder_scheduled",
            &format!("id={id} fires_at={fires_at}"),
        ));

        Ok(ScheduledReminder {
            id,
            fires_at,
            delay: DurationParts::from_duration(delay),
        })
    }

    /// Signal cancellation to a live unit. Idempotent: a second call for the
    /// same id finds nothing to cancel.
    pub async fn cancel(&self, id: ReminderId) -> CancelOutcome {
        let unit = self.inner.units.lock().await.remove(&id);
        match unit {
            Some(unit) => {
                unit.cancel.cancel();
                info!(reminder = %id, "reminder cancel requested");
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::AlreadyFinished,
        }
    }

    /// A unit is live iff it is registered.
    pub async fn is_scheduled(&self, id: ReminderId) -> bool {
        self.inner.units.lock().await.contains_key(&id)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.units.lock().await.len()
    }

    async fn run_unit(
        self,
        id: ReminderId,
        guild: GuildId,
        origin: ChannelId,
        message: String,
        delay: std::time::Duration,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(reminder = %id, "reminder cancelled during delay");
                self.inner.audit.record(AuditEvent::reminder(
                    "reminder_cancelled",
                    &format!("id={id}"),
                ));
            }
            _ = sleep(delay) => {
                // The wait is over: deregister before sending so a cancel
                // arriving mid-broadcast finds nothing and reports the unit
                // as already finished.
                self.inner.units.lock().await.remove(&id);
                match self.fire(guild, &message).await {
                    Ok(report) => {
                        info!(
                            reminder = %id,
                            sent = report.sent,
                            failed = report.failed,
                            without_role = report.without_role,
                            "reminder broadcast complete"
                        );
                        self.inner.audit.record(AuditEvent::reminder(
                            "reminder_sent",
                            &format!("id={id} channels={}", report.sent),
                        ));
                        let note = format!("Reminder message sent to {} channels.", report.sent);
                        if let Err(e) = self.inner.messenger.send_channel(origin, &note).await {
                            error!(reminder = %id, %e, "failed to report reminder outcome");
                        }
                    }
                    Err(e) => {
                        // Never propagates: logged and reported asynchronously.
                        error!(reminder = %id, %e, "reminder broadcast failed");
                        self.inner.audit.record(AuditEvent::reminder(
                            "reminder_failed",
                            &format!("id={id} error={e}"),
                        ));
                        let note = format!("Reminder failed: {e}");
                        if let Err(e) = self.inner.messenger.send_channel(origin, &note).await {
                            error!(reminder = %id, %e, "failed to report reminder failure");
                        }
                    }
                }
            }
        }

        // Terminal cleanup is unconditional; after the expiry arm this is a
        // no-op, after the cancel arm the canceller already removed the entry.
        self.inner.units.lock().await.remove(&id);
    }

    async fn fire(&self, guild: GuildId, message: &str) -> Result<BroadcastReport> {
        let records = self.inner.directory.guild_channels(guild).await?;
        let matches = targets::match_group_channels(&records, &self.inner.channel_search_string);
        Ok(delivery::broadcast(
            self.inner.messenger.as_ref(),
            &matches,
            message,
            self.inner.broadcast_batch_size,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{ChannelInfo, ChannelRecord, RoleId, RoleInfo, UserId};
    use crate::errors::{Error, RangeError};

    #[derive(Default)]
    struct FakeMessenger {
        channel_sends: Mutex<Vec<(ChannelId, String)>>,
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_channel(&self, channel: ChannelId, text: &str) -> Result<()> {
            self.channel_sends
                .lock()
                .unwrap()
                .push((channel, text.to_string()));
            Ok(())
        }

        async fn send_direct(&self, _user: UserId, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Holds sends to `ChannelId(1)` open until the gate gets a permit.
    struct GatedMessenger {
        gate: tokio::sync::Semaphore,
        channel_sends: Mutex<Vec<(ChannelId, String)>>,
    }

    #[async_trait]
    impl Messenger for GatedMessenger {
        async fn send_channel(&self, channel: ChannelId, text: &str) -> Result<()> {
            if channel == ChannelId(1) {
                self.gate.acquire().await.unwrap().forget();
            }
            self.channel_sends
                .lock()
                .unwrap()
                .push((channel, text.to_string()));
            Ok(())
        }

        async fn send_direct(&self, _user: UserId, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeDirectory {
        records: Vec<ChannelRecord>,
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn guild_channels(&self, _guild: GuildId) -> Result<Vec<ChannelRecord>> {
            Ok(self.records.clone())
        }

        async fn resolve_roles(&self, _guild: GuildId, _ids: &[RoleId]) -> Result<Vec<RoleInfo>> {
            Ok(Vec::new())
        }

        async fn role_members(&self, _guild: GuildId, _roles: &[RoleId]) -> Result<Vec<UserId>> {
            Ok(Vec::new())
        }

        async fn known_members(&self, _guild: GuildId, _ids: &[UserId]) -> Result<Vec<UserId>> {
            Ok(Vec::new())
        }
    }

    fn test_config() -> Config {
        Config {
            discord_token: "test".to_string(),
            channel_search_string: "-group-chat".to_string(),
            reminder_horizon_days: 365,
            dm_batch_size: 3,
            broadcast_batch_size: 5,
            audit_log_path: None,
            audit_log_json: false,
        }
    }

    fn record(id: u64, name: &str, role: Option<(u64, &str)>) -> ChannelRecord {
        ChannelRecord {
            channel: ChannelInfo {
                id: ChannelId(id),
                name: name.to_string(),
                category_name: None,
            },
            overwrite_roles: role
                .map(|(rid, rname)| {
                    vec![RoleInfo {
                        id: RoleId(rid),
                        name: rname.to_string(),
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn scheduler_with(
        records: Vec<ChannelRecord>,
    ) -> (ReminderScheduler, Arc<FakeMessenger>) {
        let messenger = Arc::new(FakeMessenger::default());
        let directory = Arc::new(FakeDirectory { records });
        let scheduler = ReminderScheduler::new(
            &test_config(),
            directory,
            messenger.clone(),
            AuditLogger::default(),
        );
        (scheduler, messenger)
    }

    fn request(expr: &str, message: &str) -> ReminderRequest {
        ReminderRequest {
            guild: GuildId(1),
            origin: ChannelId(999),
            time_expression: expr.to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_fires_after_delay_and_registry_is_cleaned() {
        let (scheduler, messenger) = scheduler_with(vec![
            record(1, "spring-1-group-chat", Some((100, "Team 1"))),
            record(2, "spring-2-group-chat", None),
        ]);

        let scheduled = scheduler.schedule(request("in 2 hours", "Check-in!")).await.unwrap();
        assert!(scheduler.is_scheduled(scheduled.id).await);
        assert_eq!(scheduled.delay.hours, 2);

        sleep(StdDuration::from_secs(2 * 3600 + 5)).await;

        let sends = messenger.channel_sends.lock().unwrap().clone();
        assert!(sends.contains(&(ChannelId(1), "Check-in! <@&100>".to_string())));
        assert!(sends.contains(&(ChannelId(2), "Check-in!".to_string())));
        assert!(sends.contains(&(
            ChannelId(999),
            "Reminder message sent to 2 channels.".to_string()
        )));
        assert!(!scheduler.is_scheduled(scheduled.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_suppresses_broadcast() {
        let (scheduler, messenger) =
            scheduler_with(vec![record(1, "spring-1-group-chat", Some((100, "Team 1")))]);

        let scheduled = scheduler.schedule(request("10m", "ping")).await.unwrap();

        sleep(StdDuration::from_secs(3 * 60)).await;
        assert_eq!(scheduler.cancel(scheduled.id).await, CancelOutcome::Cancelled);

        sleep(StdDuration::from_secs(10 * 60)).await;
        assert!(messenger.channel_sends.lock().unwrap().is_empty());
        assert!(!scheduler.is_scheduled(scheduled.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn double_cancel_is_idempotent() {
        let (scheduler, _messenger) = scheduler_with(Vec::new());

        let scheduled = scheduler.schedule(request("10m", "ping")).await.unwrap();
        assert_eq!(scheduler.cancel(scheduled.id).await, CancelOutcome::Cancelled);
        assert_eq!(
            scheduler.cancel(scheduled.id).await,
            CancelOutcome::AlreadyFinished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_completion_reports_already_finished() {
        let (scheduler, _messenger) = scheduler_with(Vec::new());

        let scheduled = scheduler.schedule(request("5s", "ping")).await.unwrap();
        sleep(StdDuration::from_secs(10)).await;

        assert_eq!(
            scheduler.cancel(scheduled.id).await,
            CancelOutcome::AlreadyFinished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_in_flight_broadcast_reports_already_finished() {
        let messenger = Arc::new(GatedMessenger {
            gate: tokio::sync::Semaphore::new(0),
            channel_sends: Mutex::new(Vec::new()),
        });
        let directory = Arc::new(FakeDirectory {
            records: vec![record(1, "spring-1-group-chat", Some((100, "Team 1")))],
        });
        let scheduler = ReminderScheduler::new(
            &test_config(),
            directory,
            messenger.clone(),
            AuditLogger::default(),
        );

        let scheduled = scheduler.schedule(request("5s", "fire")).await.unwrap();

        // Let the wait elapse; the channel send is held open by the gate.
        sleep(StdDuration::from_secs(6)).await;
        assert!(!scheduler.is_scheduled(scheduled.id).await);
        assert_eq!(
            scheduler.cancel(scheduled.id).await,
            CancelOutcome::AlreadyFinished
        );

        // Releasing the gate lets the broadcast run to completion anyway.
        messenger.gate.add_permits(1);
        sleep(StdDuration::from_secs(1)).await;
        let sends = messenger.channel_sends.lock().unwrap().clone();
        assert!(sends.contains(&(ChannelId(1), "fire <@&100>".to_string())));
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn short_delay_leaves_no_stale_registry_entry() {
        let (scheduler, _messenger) = scheduler_with(Vec::new());

        let scheduled = scheduler.schedule(request("1s", "soon")).await.unwrap();
        assert!(scheduler.is_scheduled(scheduled.id).await);

        sleep(StdDuration::from_secs(2)).await;
        assert_eq!(scheduler.active_count().await, 0);
        assert_eq!(
            scheduler.cancel(scheduled.id).await,
            CancelOutcome::AlreadyFinished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn past_time_is_rejected_without_registering() {
        let (scheduler, _messenger) = scheduler_with(Vec::new());

        let err = scheduler
            .schedule(request("2020-01-01 00:00", "too late"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::PastTime)));
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn beyond_horizon_is_rejected_without_registering() {
        let (scheduler, _messenger) = scheduler_with(Vec::new());

        let err = scheduler
            .schedule(request("in 400 days", "too far"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::TooFar { .. })));
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_reminders_run_independently() {
        let (scheduler, messenger) =
            scheduler_with(vec![record(1, "spring-1-group-chat", Some((100, "Team 1")))]);

        let first = scheduler.schedule(request("5m", "first")).await.unwrap();
        let second = scheduler.schedule(request("10m", "second")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(scheduler.active_count().await, 2);

        assert_eq!(scheduler.cancel(second.id).await, CancelOutcome::Cancelled);

        sleep(StdDuration::from_secs(11 * 60)).await;
        let sends = messenger.channel_sends.lock().unwrap().clone();
        assert!(sends.contains(&(ChannelId(1), "first <@&100>".to_string())));
        assert!(!sends.iter().any(|(_, text)| text.starts_with("second")));
        assert_eq!(scheduler.active_count().await, 0);
    }
}
