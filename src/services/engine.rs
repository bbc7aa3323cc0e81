use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{MutexGuard as PortalTurn, watch};
use tracing::{info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::{CourseSnapshot, RegistrationOutcome, WatchStatus, WatchlistEntry};
use crate::portal::Credentials;
use crate::services::MonitorContext;
use crate::services::scheduler::{MonitorScheduler, MonitorState, RunReport, StopHandle};

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub running: bool,
    pub session_released: bool,
    pub last_run: Option<RunReport>,
}

#[derive(Default)]
struct RunSlot {
    active: Option<StopHandle>,
    last_report: Option<RunReport>,
}

/// Core operations offered to the presentation layer.
pub struct Engine {
    ctx: MonitorContext,
    scheduler: MonitorScheduler,
    state: Arc<watch::Sender<MonitorState>>,
    slot: Mutex<RunSlot>,
}

impl Engine {
    pub fn new(ctx: MonitorContext) -> Self {
        let (state, _rx) = watch::channel(MonitorState::Idle);
        let state = Arc::new(state);
        let scheduler = MonitorScheduler::new(&ctx, state.clone());

        Self {
            ctx,
            scheduler,
            state,
            slot: Mutex::new(RunSlot::default()),
        }
    }

    /// Logs in, selects the term and takes an initial snapshot of the listings.
    ///
    /// Login and term selection failures are fatal; a failed initial scrape is not.
    pub async fn connect(
        ctx: MonitorContext,
        credentials: &Credentials,
        endpoint_url: &str,
    ) -> Result<Self, AppError> {
        let adapter = ctx.session.adapter()?;
        adapter.login(credentials, endpoint_url).await?;
        info!("Login successful");
        adapter.select_term(&ctx.term).await?;

        let engine = Self::new(ctx);
        {
            let _turn = engine.ctx.session.lock().await;
            match engine.scheduler.refresh().await {
                Ok(count) => info!("Initial scrape stored {} courses", count),
                Err(e) => warn!("Initial scrape failed, using stored snapshots: {}", e),
            }
        }
        Ok(engine)
    }

    pub async fn add_to_watchlist(
        &self,
        course_code: &str,
        priority: u32,
        auto_register: bool,
    ) -> Result<WatchlistEntry, AppError> {
        let course_code = normalize_code(course_code)?;
        if priority == 0 {
            return Err(AppError::BadRequest("priority must be at least 1".to_string()));
        }

        let entry = WatchlistEntry {
            course_code,
            priority,
            auto_register,
            added_at: self.ctx.clock.now(),
        };
        repository::upsert_watch_entry(&self.ctx.db, &entry).await?;
        info!("Added {} to watchlist (priority {})", entry.course_code, entry.priority);
        Ok(entry)
    }

    pub async fn remove_from_watchlist(&self, course_code: &str) -> Result<bool, AppError> {
        let course_code = normalize_code(course_code)?;
        Ok(repository::remove_watch_entry(&self.ctx.db, &course_code).await?)
    }

    pub async fn list_watchlist(&self) -> Result<Vec<WatchlistEntry>, AppError> {
        Ok(repository::fetch_watchlist_ordered(&self.ctx.db).await?)
    }

    /// Ordered watchlist joined with each entry's latest snapshot.
    pub async fn list_watchlist_status(&self) -> Result<Vec<WatchStatus>, AppError> {
        let mut statuses = Vec::new();
        for entry in self.list_watchlist().await? {
            let snapshot = repository::find_course_by_code(&self.ctx.db, &entry.course_code).await?;
            statuses.push(WatchStatus::new(entry, snapshot));
        }
        Ok(statuses)
    }

    pub async fn get_course_snapshot(&self, course_code: &str) -> Result<Option<CourseSnapshot>, AppError> {
        let course_code = normalize_code(course_code)?;
        Ok(repository::find_course_by_code(&self.ctx.db, &course_code).await?)
    }

    pub async fn list_available_courses(&self) -> Result<Vec<CourseSnapshot>, AppError> {
        Ok(repository::fetch_available_courses(&self.ctx.db).await?)
    }

    /// One refresh outside the loop. Portal errors go back to the caller.
    pub async fn refresh_courses(&self) -> Result<usize, AppError> {
        let _turn = self.manual_turn().await?;
        self.scheduler.refresh().await
    }

    /// One registration attempt outside the loop, whatever the stored availability.
    pub async fn register_now(&self, course_code: &str) -> Result<RegistrationOutcome, AppError> {
        let course_code = normalize_code(course_code)?;
        let _turn = self.manual_turn().await?;

        let outcome = self.scheduler.coordinator().attempt(&course_code).await;
        if outcome.is_success() {
            repository::remove_watch_entry(&self.ctx.db, &course_code).await?;
        }
        Ok(outcome)
    }

    /// Runs the monitor loop in the caller's task and returns its report.
    pub async fn run_monitor_cycle(&self, max_attempts: u32, delay_seconds: u64) -> Result<RunReport, AppError> {
        let stop = self.claim_run()?;
        Ok(self.execute_run(stop, max_attempts, delay_seconds).await)
    }

    /// Starts the monitor loop on a background task.
    pub fn start_monitor(self: &Arc<Self>, max_attempts: u32, delay_seconds: u64) -> Result<(), AppError> {
        let stop = self.claim_run()?;
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.execute_run(stop, max_attempts, delay_seconds).await;
        });
        Ok(())
    }

    /// Signals the active run, if any. Returns whether a run was signalled.
    pub fn stop(&self) -> bool {
        match &self.lock_slot().active {
            Some(handle) => {
                info!("Stop requested");
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> MonitorStatus {
        let slot = self.lock_slot();
        MonitorStatus {
            state: *self.state.borrow(),
            running: slot.active.is_some(),
            session_released: self.ctx.session.is_released(),
            last_run: slot.last_report.clone(),
        }
    }

    /// Stops any active run, waits for it to reach `Stopped`, then makes sure
    /// the portal session is released once any manual interaction finishes.
    pub async fn shutdown(&self) {
        let mut rx = self.state.subscribe();
        if self.stop() {
            loop {
                if *rx.borrow_and_update() == MonitorState::Stopped {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
        self.ctx.session.release().await;
    }

    fn claim_run(&self) -> Result<StopHandle, AppError> {
        let mut slot = self.lock_slot();
        if slot.active.is_some() {
            return Err(AppError::Conflict("a monitor run is already active".to_string()));
        }
        if self.ctx.session.is_released() {
            return Err(AppError::Conflict("portal session has been released".to_string()));
        }
        let stop = StopHandle::new();
        slot.active = Some(stop.clone());
        Ok(stop)
    }

    async fn execute_run(&self, stop: StopHandle, max_attempts: u32, delay_seconds: u64) -> RunReport {
        let report = self
            .scheduler
            .run(max_attempts, Duration::from_secs(delay_seconds), &stop)
            .await;

        let mut slot = self.lock_slot();
        slot.active = None;
        slot.last_report = Some(report.clone());
        report
    }

    /// Exclusive use of the portal outside a run. Refused while a run is
    /// active or once the session has been released.
    async fn manual_turn(&self) -> Result<PortalTurn<'_, ()>, AppError> {
        self.ensure_idle()?;
        let turn = self.ctx.session.lock().await;
        // A run may have been claimed while we waited.
        self.ensure_idle()?;
        if self.ctx.session.is_released() {
            return Err(AppError::Conflict("portal session has been released".to_string()));
        }
        Ok(turn)
    }

    fn ensure_idle(&self) -> Result<(), AppError> {
        if self.lock_slot().active.is_some() {
            return Err(AppError::Conflict("a monitor run is active".to_string()));
        }
        Ok(())
    }

    fn lock_slot(&self) -> MutexGuard<'_, RunSlot> {
        // A poisoned slot only means a panic elsewhere; its data is still usable.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn normalize_code(course_code: &str) -> Result<String, AppError> {
    let code = course_code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(AppError::BadRequest("course code is required".to_string()));
    }
    Ok(code)
}
