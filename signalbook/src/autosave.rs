//! Debounced background saving
//!
//! [`AutoSaver`] is the clock-driven state machine: it ignores changes during
//! the grace window that follows the initial load, waits for a quiet period
//! before handing out a snapshot to save, and tracks the save status shown to
//! the user. [`AutoSaveHandle`] runs it on a worker thread against a
//! [`ContentStore`].
//!
//! Saves run one at a time on the worker. Every snapshot carries the
//! manager's revision number, and a snapshot that is not newer than the last
//! successful save is never written.

use crate::content_model::TableOfContents;
use crate::notify::{Notification, Notifier};
use crate::store::{ContentStore, StoreError};
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Quiet period before a change is saved
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);
/// Window after the initial load in which nothing is auto-saved
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);
/// How long the "saved" status stays visible
pub const DEFAULT_SAVED_RESET: Duration = Duration::from_millis(2000);

/// Timing parameters of the autosave protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveTiming {
    pub debounce: Duration,
    pub grace: Duration,
    pub saved_reset: Duration,
}

impl Default for AutoSaveTiming {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            grace: DEFAULT_GRACE,
            saved_reset: DEFAULT_SAVED_RESET,
        }
    }
}

/// Save status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavingStatus {
    #[default]
    Idle,
    Saving,
    Saved,
}

impl fmt::Display for SavingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavingStatus::Idle => write!(f, "idle"),
            SavingStatus::Saving => write!(f, "saving"),
            SavingStatus::Saved => write!(f, "saved"),
        }
    }
}

/// A document snapshot waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    /// Manager revision the snapshot was taken at
    pub revision: u64,
    /// The whole document
    pub toc: TableOfContents,
}

/// Errors reported by an explicit flush
#[derive(Error, Debug)]
pub enum AutoSaveError {
    #[error("Save failed: {0}")]
    Store(#[from] StoreError),

    #[error("Autosave worker is not running")]
    WorkerStopped,
}

/// Debounce, grace window and status tracking
#[derive(Debug)]
pub struct AutoSaver {
    timing: AutoSaveTiming,
    started_at: Instant,
    pending: Option<(PendingSave, Instant)>,
    in_flight: Option<u64>,
    last_saved_revision: u64,
    status: SavingStatus,
    saved_at: Option<Instant>,
}

impl AutoSaver {
    /// Start tracking at `now`; `baseline_revision` counts as already saved
    pub fn new(timing: AutoSaveTiming, baseline_revision: u64, now: Instant) -> Self {
        Self {
            timing,
            started_at: now,
            pending: None,
            in_flight: None,
            last_saved_revision: baseline_revision,
            status: SavingStatus::Idle,
            saved_at: None,
        }
    }

    /// Current save status
    pub fn status(&self) -> SavingStatus {
        self.status
    }

    /// Revision of the last successful save
    pub fn last_saved_revision(&self) -> u64 {
        self.last_saved_revision
    }

    /// Whether a snapshot is waiting for its quiet period to end
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether `now` still falls in the grace window after startup
    pub fn in_grace(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) < self.timing.grace
    }

    /// Record a tree change, restarting the quiet period
    ///
    /// Returns `false` when the change is ignored because it is not newer
    /// than what was already saved or scheduled.
    pub fn track_change(&mut self, save: PendingSave, now: Instant) -> bool {
        if save.revision <= self.last_saved_revision {
            return false;
        }
        if let Some((pending, _)) = &self.pending {
            if pending.revision > save.revision {
                return false;
            }
        }

        self.pending = Some((save, now));
        true
    }

    /// When the pending snapshot becomes due, if any
    ///
    /// Changes made during the grace window wait for it to end.
    pub fn deadline(&self) -> Option<Instant> {
        let grace_end = self.started_at + self.timing.grace;
        self.pending
            .as_ref()
            .map(|(_, changed_at)| (*changed_at + self.timing.debounce).max(grace_end))
    }

    /// Earliest instant at which [`take_due`](Self::take_due) or
    /// [`tick`](Self::tick) has something to do
    pub fn next_wakeup(&self) -> Option<Instant> {
        let reset = match self.status {
            SavingStatus::Saved => self.saved_at.map(|at| at + self.timing.saved_reset),
            _ => None,
        };
        match (self.deadline(), reset) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Hand out the pending snapshot once its quiet period has passed
    ///
    /// Sets the status to saving. Nothing is handed out while another save
    /// is in flight.
    pub fn take_due(&mut self, now: Instant) -> Option<PendingSave> {
        let due = self.deadline().is_some_and(|deadline| deadline <= now);
        if !due || self.in_flight.is_some() {
            return None;
        }
        let (save, _) = self.pending.take()?;
        self.begin(save)
    }

    /// Hand out a snapshot right away, bypassing the grace window and the
    /// quiet period
    ///
    /// `latest` is the caller's current snapshot, if it has one; the newer of
    /// it and the pending snapshot wins.
    pub fn take_now(&mut self, latest: Option<PendingSave>) -> Option<PendingSave> {
        if self.in_flight.is_some() {
            return None;
        }
        let pending = self.pending.take().map(|(save, _)| save);
        let candidate = match (pending, latest) {
            (Some(a), Some(b)) => Some(if b.revision >= a.revision { b } else { a }),
            (a, b) => a.or(b),
        }?;
        self.begin(candidate)
    }

    fn begin(&mut self, save: PendingSave) -> Option<PendingSave> {
        if save.revision <= self.last_saved_revision {
            log::debug!(
                "Skipping stale revision {} (saved {})",
                save.revision,
                self.last_saved_revision
            );
            return None;
        }
        self.in_flight = Some(save.revision);
        self.status = SavingStatus::Saving;
        Some(save)
    }

    /// Record the outcome of a save handed out earlier
    ///
    /// Success shows "saved" until the reset delay passes; failure goes
    /// straight back to idle. Failed saves are not retried; the next change
    /// schedules a new one.
    pub fn complete(&mut self, revision: u64, succeeded: bool, now: Instant) {
        if self.in_flight == Some(revision) {
            self.in_flight = None;
        }
        if succeeded {
            self.last_saved_revision = self.last_saved_revision.max(revision);
            self.status = SavingStatus::Saved;
            self.saved_at = Some(now);
        } else {
            self.status = SavingStatus::Idle;
            self.saved_at = None;
        }
    }

    /// Let time pass; returns the status afterwards
    pub fn tick(&mut self, now: Instant) -> SavingStatus {
        if self.status == SavingStatus::Saved {
            let expired = self
                .saved_at
                .is_some_and(|at| now.saturating_duration_since(at) >= self.timing.saved_reset);
            if expired {
                self.status = SavingStatus::Idle;
                self.saved_at = None;
            }
        }
        self.status
    }
}

/// What the worker publishes for the editing thread
#[derive(Debug, Clone, Copy)]
struct Progress {
    status: SavingStatus,
    saved_revision: u64,
}

enum Command {
    Changed(PendingSave),
    Flush(Option<PendingSave>, Sender<Result<bool, StoreError>>),
    Shutdown,
}

/// Background autosave worker
///
/// Dropping the handle stops the worker after writing any pending change.
pub struct AutoSaveHandle {
    tx: Sender<Command>,
    progress: Arc<Mutex<Progress>>,
    thread: Option<JoinHandle<()>>,
}

impl AutoSaveHandle {
    /// Start the worker; `baseline_revision` is the revision of the document
    /// as loaded
    pub fn spawn(
        store: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        timing: AutoSaveTiming,
        baseline_revision: u64,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let progress = Arc::new(Mutex::new(Progress {
            status: SavingStatus::Idle,
            saved_revision: baseline_revision,
        }));
        let saver = AutoSaver::new(timing, baseline_revision, Instant::now());

        let worker = Worker {
            saver,
            store,
            notifier,
            progress: Arc::clone(&progress),
        };
        let thread = thread::Builder::new()
            .name("signalbook-autosave".to_string())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            tx,
            progress,
            thread: Some(thread),
        })
    }

    /// Report a tree change
    pub fn track(&self, revision: u64, toc: TableOfContents) {
        if self
            .tx
            .send(Command::Changed(PendingSave { revision, toc }))
            .is_err()
        {
            log::warn!("Autosave worker stopped; revision {} not tracked", revision);
        }
    }

    /// Save now, without waiting for the quiet period
    ///
    /// Returns `Ok(false)` when there was nothing newer than the last save.
    pub fn flush(&self, latest: Option<PendingSave>) -> Result<bool, AutoSaveError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Flush(latest, reply_tx))
            .map_err(|_| AutoSaveError::WorkerStopped)?;
        let result = reply_rx.recv().map_err(|_| AutoSaveError::WorkerStopped)?;
        Ok(result?)
    }

    /// Current save status
    pub fn status(&self) -> SavingStatus {
        read_progress(&self.progress).status
    }

    /// Revision of the last successful save, background or flushed
    pub fn last_saved_revision(&self) -> u64 {
        read_progress(&self.progress).saved_revision
    }
}

impl Drop for AutoSaveHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    saver: AutoSaver,
    store: Arc<dyn ContentStore>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<Mutex<Progress>>,
}

impl Worker {
    fn run(mut self, rx: Receiver<Command>) {
        loop {
            let command = match self.saver.next_wakeup() {
                Some(wakeup) => {
                    let timeout = wakeup.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(timeout) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => Some(Command::Shutdown),
                    }
                }
                None => Some(rx.recv().unwrap_or(Command::Shutdown)),
            };

            match command {
                Some(Command::Changed(save)) => {
                    self.saver.track_change(save, Instant::now());
                }
                Some(Command::Flush(latest, reply)) => {
                    let result = match self.saver.take_now(latest) {
                        Some(save) => self.save(save).map(|()| true),
                        None => Ok(false),
                    };
                    let _ = reply.send(result);
                }
                Some(Command::Shutdown) => {
                    if let Some(save) = self.saver.take_now(None) {
                        let _ = self.save(save);
                    }
                    break;
                }
                None => {}
            }

            if let Some(save) = self.saver.take_due(Instant::now()) {
                let _ = self.save(save);
            }
            self.saver.tick(Instant::now());
            self.publish();
        }
        log::debug!("Autosave worker stopped");
    }

    fn save(&mut self, save: PendingSave) -> Result<(), StoreError> {
        self.publish();
        let result = self.store.save(&save.toc);
        self.saver.complete(save.revision, result.is_ok(), Instant::now());
        self.publish();

        match &result {
            Ok(()) => log::info!(
                "Saved revision {} to {}",
                save.revision,
                self.store.describe()
            ),
            Err(e) => {
                log::error!("Auto-save of revision {} failed: {}", save.revision, e);
                self.notifier.notify(Notification::error(
                    "Auto-save failed",
                    format!("Your latest changes could not be saved: {}", e),
                ));
            }
        }
        result
    }

    fn publish(&self) {
        let current = Progress {
            status: self.saver.status(),
            saved_revision: self.saver.last_saved_revision(),
        };
        match self.progress.lock() {
            Ok(mut progress) => *progress = current,
            Err(poisoned) => *poisoned.into_inner() = current,
        }
    }
}

fn read_progress(progress: &Mutex<Progress>) -> Progress {
    match progress.lock() {
        Ok(progress) => *progress,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::Chapter;
    use crate::notify::RecordingNotifier;

    fn timing() -> AutoSaveTiming {
        AutoSaveTiming::default()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn snapshot(revision: u64) -> PendingSave {
        PendingSave {
            revision,
            toc: vec![Chapter::new("1", format!("rev {}", revision), Vec::new())],
        }
    }

    #[test]
    fn test_changes_in_grace_window_are_saved_after_it() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new(timing(), 0, t0);
        assert!(saver.in_grace(t0 + ms(100)));

        assert!(saver.track_change(snapshot(1), t0 + ms(100)));
        assert!(saver.has_pending());
        assert_eq!(saver.deadline(), Some(t0 + ms(2100)));
        assert!(saver.take_due(t0 + ms(2000)).is_none());

        let save = saver.take_due(t0 + ms(2100)).unwrap();
        assert_eq!(save.revision, 1);
    }

    #[test]
    fn test_nothing_is_due_before_grace_ends() {
        let t0 = Instant::now();
        let quick = AutoSaveTiming {
            debounce: ms(100),
            grace: ms(500),
            saved_reset: ms(100),
        };
        let mut saver = AutoSaver::new(quick, 0, t0);

        saver.track_change(snapshot(1), t0 + ms(50));
        assert_eq!(saver.deadline(), Some(t0 + ms(500)));
        assert!(saver.take_due(t0 + ms(150)).is_none());
        assert_eq!(saver.take_due(t0 + ms(500)).unwrap().revision, 1);
    }

    #[test]
    fn test_debounce_waits_for_quiet_period() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new(timing(), 0, t0);

        saver.track_change(snapshot(1), t0 + ms(1000));
        saver.track_change(snapshot(2), t0 + ms(2500));
        // the first change would have been due at 3000, but the second one restarted the window
        assert!(saver.take_due(t0 + ms(3000)).is_none());
        assert_eq!(saver.deadline(), Some(t0 + ms(4500)));

        let save = saver.take_due(t0 + ms(4500)).unwrap();
        assert_eq!(save.revision, 2);
        assert_eq!(saver.status(), SavingStatus::Saving);
    }

    #[test]
    fn test_successful_save_shows_saved_then_idle() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new(timing(), 0, t0);
        saver.track_change(snapshot(1), t0 + ms(1000));
        let save = saver.take_due(t0 + ms(3000)).unwrap();

        saver.complete(save.revision, true, t0 + ms(3100));
        assert_eq!(saver.status(), SavingStatus::Saved);
        assert_eq!(saver.last_saved_revision(), 1);
        assert_eq!(saver.next_wakeup(), Some(t0 + ms(5100)));

        assert_eq!(saver.tick(t0 + ms(5000)), SavingStatus::Saved);
        assert_eq!(saver.tick(t0 + ms(5100)), SavingStatus::Idle);
    }

    #[test]
    fn test_failed_save_goes_back_to_idle_without_retry() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new(timing(), 0, t0);
        saver.track_change(snapshot(1), t0 + ms(1000));
        let save = saver.take_due(t0 + ms(3000)).unwrap();
        assert_eq!(saver.status(), SavingStatus::Saving);

        saver.complete(save.revision, false, t0 + ms(3100));
        assert_eq!(saver.status(), SavingStatus::Idle);
        assert!(!saver.has_pending());
        assert!(saver.take_due(t0 + ms(10_000)).is_none());

        // the next change schedules a fresh attempt
        assert!(saver.track_change(snapshot(2), t0 + ms(11_000)));
    }

    #[test]
    fn test_saves_are_serialized_and_stale_snapshots_dropped() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new(timing(), 0, t0);
        saver.track_change(snapshot(1), t0 + ms(1000));
        let first = saver.take_due(t0 + ms(3000)).unwrap();

        // a newer change becomes due while the first save is still running
        saver.track_change(snapshot(2), t0 + ms(3001));
        assert!(saver.take_due(t0 + ms(6000)).is_none());

        saver.complete(first.revision, true, t0 + ms(6100));
        let second = saver.take_due(t0 + ms(6100)).unwrap();
        assert_eq!(second.revision, 2);
        saver.complete(second.revision, true, t0 + ms(6200));

        // an older snapshot arriving late is never written
        assert!(!saver.track_change(snapshot(1), t0 + ms(7000)));
        assert!(saver.take_now(Some(snapshot(2))).is_none());
    }

    #[test]
    fn test_take_now_skips_grace_and_debounce() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new(timing(), 0, t0);
        assert!(saver.track_change(snapshot(1), t0 + ms(10)));

        let save = saver.take_now(Some(snapshot(1))).unwrap();
        assert_eq!(save.revision, 1);
        assert_eq!(saver.status(), SavingStatus::Saving);
    }

    struct FailingStore;

    impl ContentStore for FailingStore {
        fn load(&self) -> Result<Option<TableOfContents>, StoreError> {
            Ok(None)
        }

        fn save(&self, _toc: &TableOfContents) -> Result<(), StoreError> {
            Err(StoreError::Transport("connection refused".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn test_worker_failed_save_notifies_once() {
        let recorder = RecordingNotifier::new();
        let handle = AutoSaveHandle::spawn(
            Arc::new(FailingStore),
            Arc::new(recorder.clone()),
            timing(),
            0,
        )
        .unwrap();

        let result = handle.flush(Some(snapshot(1)));

        assert!(matches!(result, Err(AutoSaveError::Store(_))));
        assert_eq!(handle.status(), SavingStatus::Idle);
        assert_eq!(recorder.errors().len(), 1);
        assert_eq!(recorder.errors()[0].title, "Auto-save failed");
    }

    #[test]
    fn test_worker_flush_with_nothing_new_is_noop() {
        let recorder = RecordingNotifier::new();
        let handle = AutoSaveHandle::spawn(
            Arc::new(FailingStore),
            Arc::new(recorder.clone()),
            timing(),
            3,
        )
        .unwrap();

        assert!(!handle.flush(Some(snapshot(3))).unwrap());
        assert!(!handle.flush(None).unwrap());
        assert!(recorder.entries().is_empty());
        assert_eq!(handle.last_saved_revision(), 3);
    }
}
