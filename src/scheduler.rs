//! Monthly reminder jobs, one per group.
//!
//! Every job is a tokio task that sleeps until the next occurrence of its
//! schedule (in the local time zone of the host), runs the callback and goes
//! back to sleep. The set of jobs always follows the stored settings through
//! [`ReminderScheduler::resync`].

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, MutexGuard, PoisonError},
};

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone};
use log::{debug, error, info, warn};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    database::Database,
    error::DatabaseError,
    types::{ActiveNotification, MonthlySchedule},
};

/// How far ahead we look for a month that contains the configured day.
const MAX_MONTHS_AHEAD: u32 = 48;

/// Longest DST gap we expect in any time zone, in minutes.
const MAX_GAP_MINUTES: i64 = 3 * 60;

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// What a job runs when it fires. It receives the chat ID of the group.
///
/// An error is logged and the job stays scheduled for the next month.
pub type JobCallback = Arc<dyn Fn(i64) -> JobFuture + Send + Sync>;

/// Where the jobs read the current local time from.
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

type NextRun = Arc<std::sync::Mutex<Option<DateTime<Local>>>>;

struct ScheduledJob {
    schedule: MonthlySchedule,
    next_run: NextRun,
    handle: JoinHandle<()>,
}

pub struct ReminderScheduler {
    jobs: std::sync::Mutex<HashMap<i64, ScheduledJob>>,
    callback: JobCallback,
    clock: Clock,
}

impl ReminderScheduler {
    pub fn new(callback: JobCallback) -> ReminderScheduler {
        ReminderScheduler::with_clock(callback, Arc::new(Local::now))
    }

    pub fn with_clock(callback: JobCallback, clock: Clock) -> ReminderScheduler {
        ReminderScheduler {
            jobs: std::sync::Mutex::new(HashMap::new()),
            callback,
            clock,
        }
    }

    /// Schedule the reminder of a group, replacing any previous job of the same group.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, chat_id: i64, schedule: MonthlySchedule) {
        let next_run = Arc::new(std::sync::Mutex::new(next_occurrence(
            &schedule,
            &(self.clock)(),
        )));
        let handle = tokio::spawn(run_job(
            chat_id,
            schedule,
            next_run.clone(),
            self.callback.clone(),
            self.clock.clone(),
        ));

        let job = ScheduledJob {
            schedule,
            next_run,
            handle,
        };
        if let Some(previous) = self.lock_jobs().insert(chat_id, job) {
            previous.handle.abort();
        }
        debug!(
            "Reminder scheduled. Chat ID: {chat_id}. Day: {}. Time: {}",
            schedule.day, schedule.time
        );
    }

    /// Remove the job of a group. Returns false if there was none.
    pub fn cancel(&self, chat_id: i64) -> bool {
        match self.lock_jobs().remove(&chat_id) {
            Some(job) => {
                job.handle.abort();
                info!("Reminder cancelled. Chat ID: {chat_id}");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut jobs = self.lock_jobs();
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
    }

    /// The currently scheduled jobs, ordered by chat ID.
    pub fn active_jobs(&self) -> Vec<ActiveNotification> {
        let mut active: Vec<_> = self
            .lock_jobs()
            .iter()
            .map(|(chat_id, job)| ActiveNotification {
                chat_id: *chat_id,
                schedule: job.schedule,
            })
            .collect();
        active.sort_by_key(|a| a.chat_id);
        active
    }

    pub fn is_scheduled(&self, chat_id: i64) -> bool {
        self.lock_jobs().contains_key(&chat_id)
    }

    /// When the job of a group fires next, if it is scheduled.
    pub fn next_run(&self, chat_id: i64) -> Option<DateTime<Local>> {
        self.lock_jobs()
            .get(&chat_id)
            .and_then(|job| *lock_next_run(&job.next_run))
    }

    /// Make the jobs match the groups that have both reminder fields set.
    ///
    /// The settings are read first: if the read fails, the current jobs are
    /// left untouched. Jobs whose schedule did not change keep running.
    /// Returns the number of scheduled jobs.
    pub async fn resync<D: Database>(
        &self,
        database: &Arc<Mutex<D>>,
    ) -> Result<usize, DatabaseError> {
        // The store lock is kept while rebuilding, so that a concurrent
        // settings change cannot be overwritten by an older read.
        let database = database.lock().await;
        let active = database.list_active_notification_settings()?;

        for job in self.active_jobs() {
            if !active.contains(&job) {
                self.cancel(job.chat_id);
            }
        }
        for notification in &active {
            if !self.is_scheduled(notification.chat_id) {
                self.register(notification.chat_id, notification.schedule);
            }
        }

        info!("Reminder jobs rebuilt. Active jobs: {}", active.len());
        Ok(active.len())
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<i64, ScheduledJob>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock_next_run(next_run: &NextRun) -> MutexGuard<'_, Option<DateTime<Local>>> {
    next_run.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_job(
    chat_id: i64,
    schedule: MonthlySchedule,
    next_run: NextRun,
    callback: JobCallback,
    clock: Clock,
) {
    loop {
        let next = *lock_next_run(&next_run);
        let next = match next {
            Some(next) => next,
            None => {
                warn!("Reminder of chat {chat_id} will never fire: {schedule:?}");
                return;
            }
        };

        let wait = (next - clock()).to_std().unwrap_or_default();
        debug!("Next reminder of chat {chat_id} at {next} (in {wait:?})");
        tokio::time::sleep(wait).await;

        debug!("Firing reminder of chat {chat_id}");
        if let Err(e) = callback(chat_id).await {
            error!("Reminder of chat {chat_id} failed: {e:#}");
        }

        // If the process was suspended for a while, skip the occurrences we missed.
        let after = std::cmp::max(next, clock());
        *lock_next_run(&next_run) = next_occurrence(&schedule, &after);
    }
}

/// The first instant strictly after `after` that matches the schedule.
///
/// Months without the configured day are skipped. A time that falls in a DST
/// gap fires at the first valid instant after the gap; an ambiguous time
/// fires at the earlier of the two instants.
pub fn next_occurrence<Tz: TimeZone>(
    schedule: &MonthlySchedule,
    after: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let time = schedule.time.to_naive_time()?;
    let timezone = after.timezone();
    let local = after.naive_local();
    let (mut year, mut month) = (local.year(), local.month());

    for _ in 0..MAX_MONTHS_AHEAD {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, schedule.day as u32) {
            if let Some(candidate) = resolve_local(&timezone, date.and_time(time)) {
                if candidate > *after {
                    return Some(candidate);
                }
            }
        }

        (year, month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
    }

    None
}

fn resolve_local<Tz: TimeZone>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    if let Some(instant) = timezone.from_local_datetime(&naive).earliest() {
        return Some(instant);
    }
    (1..=MAX_GAP_MINUTES).find_map(|minutes| {
        timezone
            .from_local_datetime(&(naive + Duration::minutes(minutes)))
            .earliest()
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Timelike, Utc};
    use tempdir::TempDir;

    use crate::database::sqlite::SqliteDatabase;
    use crate::types::{
        Amount, Group, HistoryEntry, NewTransaction, NotificationSetting, NotificationTime,
        RecordedTransaction, SettingChange,
    };

    use super::*;

    fn noop_callback() -> JobCallback {
        Arc::new(|_chat_id| -> JobFuture { Box::pin(async { Ok(()) }) })
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn schedule(day: u8, hour: u8, minute: u8) -> MonthlySchedule {
        MonthlySchedule::new(day, NotificationTime::new(hour, minute))
    }

    #[test]
    fn test_next_occurrence_same_month() {
        let next = next_occurrence(&schedule(15, 10, 0), &utc(2024, 3, 1, 12, 0));
        assert_eq!(next, Some(utc(2024, 3, 15, 10, 0)));
    }

    #[test]
    fn test_next_occurrence_is_strictly_after() {
        let next = next_occurrence(&schedule(15, 10, 0), &utc(2024, 3, 15, 10, 0));
        assert_eq!(next, Some(utc(2024, 4, 15, 10, 0)));

        let next = next_occurrence(&schedule(15, 10, 0), &utc(2024, 3, 15, 9, 59));
        assert_eq!(next, Some(utc(2024, 3, 15, 10, 0)));
    }

    #[test]
    fn test_next_occurrence_wraps_year() {
        let next = next_occurrence(&schedule(1, 8, 30), &utc(2024, 12, 15, 0, 0));
        assert_eq!(next, Some(utc(2025, 1, 1, 8, 30)));
    }

    #[test]
    fn test_next_occurrence_skips_short_months() {
        let next = next_occurrence(&schedule(31, 10, 0), &utc(2024, 4, 1, 0, 0));
        assert_eq!(next, Some(utc(2024, 5, 31, 10, 0)));

        let next = next_occurrence(&schedule(30, 10, 0), &utc(2024, 1, 31, 0, 0));
        assert_eq!(next, Some(utc(2024, 3, 30, 10, 0)));

        let next = next_occurrence(&schedule(29, 10, 0), &utc(2023, 2, 1, 0, 0));
        assert_eq!(next, Some(utc(2023, 3, 29, 10, 0)));

        let next = next_occurrence(&schedule(29, 10, 0), &utc(2024, 2, 1, 0, 0));
        assert_eq!(next, Some(utc(2024, 2, 29, 10, 0)));
    }

    #[test]
    fn test_next_occurrence_invalid_schedule() {
        assert_eq!(
            next_occurrence(&schedule(32, 10, 0), &utc(2024, 1, 1, 0, 0)),
            None
        );
        assert_eq!(
            next_occurrence(&schedule(1, 24, 0), &utc(2024, 1, 1, 0, 0)),
            None
        );
    }

    #[tokio::test]
    async fn test_register_and_cancel() {
        let scheduler = ReminderScheduler::new(noop_callback());
        assert!(!scheduler.is_scheduled(1));

        scheduler.register(2, schedule(15, 10, 0));
        scheduler.register(1, schedule(1, 9, 0));
        // Registering again replaces the job.
        scheduler.register(2, schedule(20, 18, 0));

        assert_eq!(
            scheduler.active_jobs(),
            vec![
                ActiveNotification {
                    chat_id: 1,
                    schedule: schedule(1, 9, 0)
                },
                ActiveNotification {
                    chat_id: 2,
                    schedule: schedule(20, 18, 0)
                },
            ]
        );

        assert!(scheduler.cancel(1));
        assert!(!scheduler.cancel(1));
        assert!(!scheduler.is_scheduled(1));
        assert!(scheduler.is_scheduled(2));

        scheduler.cancel_all();
        assert!(scheduler.active_jobs().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resync_matches_stored_settings() {
        let dir = TempDir::new("kitty").expect("test");
        let database = SqliteDatabase::new(dir.path().join("kitty.db")).expect("test");
        let database = Arc::new(Mutex::new(database));
        let scheduler = ReminderScheduler::new(noop_callback());
        let ten = NotificationTime::new(10, 0);

        // Only the time: nothing is scheduled yet.
        database
            .lock()
            .await
            .upsert_notification_setting(1, SettingChange::Set(ten), SettingChange::Unchanged)
            .expect("test");
        assert_eq!(scheduler.resync(&database).await.expect("test"), 0);
        assert!(!scheduler.is_scheduled(1));

        database
            .lock()
            .await
            .upsert_notification_setting(1, SettingChange::Unchanged, SettingChange::Set(15))
            .expect("test");
        assert_eq!(scheduler.resync(&database).await.expect("test"), 1);
        assert_eq!(
            scheduler.active_jobs(),
            database
                .lock()
                .await
                .list_active_notification_settings()
                .expect("test")
        );

        // A job that is not backed by a stored setting disappears.
        scheduler.register(99, schedule(1, 0, 0));
        database
            .lock()
            .await
            .upsert_notification_setting(1, SettingChange::Unchanged, SettingChange::Clear)
            .expect("test");
        assert_eq!(scheduler.resync(&database).await.expect("test"), 0);
        assert!(scheduler.active_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_resync_failure_keeps_jobs() {
        let database = Arc::new(Mutex::new(StubDatabase(None)));
        let scheduler = ReminderScheduler::new(noop_callback());
        scheduler.register(1, schedule(15, 10, 0));

        assert!(scheduler.resync(&database).await.is_err());
        assert!(scheduler.is_scheduled(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_monthly_and_survives_failures() {
        // Local time that follows the paused tokio clock.
        let start = tokio::time::Instant::now();
        let base = Local
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .earliest()
            .expect("test");
        let clock: Clock = Arc::new(move || {
            base + Duration::from_std(start.elapsed()).expect("test")
        });

        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let callback: JobCallback = {
            let clock = clock.clone();
            Arc::new(move |chat_id| -> JobFuture {
                sender.send((chat_id, clock())).expect("test");
                Box::pin(async { Err(anyhow::anyhow!("chat is not reachable")) })
            })
        };

        let scheduler = ReminderScheduler::with_clock(callback, clock);
        let reminder = schedule(15, 10, 0);
        scheduler.register(7, reminder);

        let mut expected = next_occurrence(&reminder, &base).expect("test");
        assert_eq!(scheduler.next_run(7), Some(expected));
        assert!(receiver.try_recv().is_err());

        for _ in 0..3 {
            let (chat_id, fired_at) = receiver.recv().await.expect("test");
            assert_eq!(chat_id, 7);
            assert!(fired_at >= expected);
            assert!(fired_at - expected < Duration::seconds(1));
            expected = next_occurrence(&reminder, &expected).expect("test");
        }
        assert_eq!(expected.month(), 6);

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(scheduler.is_scheduled(7));
        assert_eq!(scheduler.next_run(7), Some(expected));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resync_follows_schedule_changes() {
        let database = Arc::new(Mutex::new(StubDatabase(Some(vec![ActiveNotification {
            chat_id: 1,
            schedule: schedule(15, 10, 0),
        }]))));
        let scheduler = ReminderScheduler::new(noop_callback());

        scheduler.resync(&database).await.expect("test");
        let first = scheduler.next_run(1).expect("test");
        scheduler.resync(&database).await.expect("test");
        assert_eq!(scheduler.next_run(1), Some(first));

        database.lock().await.0 = Some(vec![ActiveNotification {
            chat_id: 1,
            schedule: schedule(20, 18, 30),
        }]);
        scheduler.resync(&database).await.expect("test");
        let next = scheduler.next_run(1).expect("test");
        assert_eq!((next.day(), next.hour(), next.minute()), (20, 18, 30));
    }

    /// A store that only knows the active settings (or nothing at all, if
    /// `None`). Every other call fails.
    struct StubDatabase(Option<Vec<ActiveNotification>>);

    fn unavailable<T>() -> Result<T, DatabaseError> {
        Err(DatabaseError::new("unavailable", anyhow::anyhow!("offline")))
    }

    impl Database for StubDatabase {
        fn upsert_group(
            &mut self,
            _: i64,
            _: Option<&str>,
            _: DateTime<Utc>,
        ) -> Result<(), DatabaseError> {
            unavailable()
        }

        fn get_group(&self, _: i64) -> Result<Option<Group>, DatabaseError> {
            unavailable()
        }

        fn record_transaction(
            &mut self,
            _: i64,
            _: &NewTransaction,
            _: DateTime<Utc>,
        ) -> Result<RecordedTransaction, DatabaseError> {
            unavailable()
        }

        fn get_balance(&self, _: i64) -> Result<Amount, DatabaseError> {
            unavailable()
        }

        fn get_history(&self, _: i64, _: usize) -> Result<Vec<HistoryEntry>, DatabaseError> {
            unavailable()
        }

        fn count_transactions(&self, _: i64) -> Result<usize, DatabaseError> {
            unavailable()
        }

        fn upsert_notification_setting(
            &mut self,
            _: i64,
            _: SettingChange<NotificationTime>,
            _: SettingChange<u8>,
        ) -> Result<NotificationSetting, DatabaseError> {
            unavailable()
        }

        fn get_notification_setting(&self, _: i64) -> Result<NotificationSetting, DatabaseError> {
            unavailable()
        }

        fn list_active_notification_settings(
            &self,
        ) -> Result<Vec<ActiveNotification>, DatabaseError> {
            self.0.clone().map_or_else(unavailable, Ok)
        }
    }
}
