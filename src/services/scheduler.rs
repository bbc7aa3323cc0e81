use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::{CourseSnapshot, RegistrationOutcome, WatchlistEntry};
use crate::portal::PortalError;
use crate::services::MonitorContext;
use crate::services::clock::Clock;
use crate::services::registration::RegistrationCoordinator;
use crate::services::session::PortalSession;

/// Consecutive aborted cycles after which persistence trouble is reported loudly.
pub const PERSISTENCE_ALERT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Idle,
    Refreshing,
    Scanning,
    Acting,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// `max_attempts` cycles ran.
    Completed,
    Cancelled,
}

/// External stop signal, observed at state boundaries only.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub course_code: String,
    pub outcome: RegistrationOutcome,
    /// Whether the entry was removed from the watchlist afterwards.
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u32,
    pub started_at: DateTime<Utc>,
    pub snapshots_refreshed: usize,
    pub refresh_error: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    /// Open, watched, but not set to auto-register.
    pub available_not_auto: Vec<String>,
    /// Watched codes with no stored snapshot.
    pub missing_snapshot: Vec<String>,
    /// Set when a persistence error cut the cycle short.
    pub aborted: Option<String>,
}

impl CycleReport {
    fn new(cycle: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle,
            started_at,
            snapshots_refreshed: 0,
            refresh_error: None,
            attempts: Vec::new(),
            available_not_auto: Vec::new(),
            missing_snapshot: Vec::new(),
            aborted: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cycles: Vec<CycleReport>,
    pub stop_reason: StopReason,
    pub registered: Vec<String>,
    /// Aborted cycles over the whole run.
    pub persistence_failures: u32,
    /// Aborted cycles in a row at the end of the run.
    pub consecutive_persistence_failures: u32,
}

/// Drives refresh → scan → act → sleep until `max_attempts` cycles have run
/// or a stop is requested.
pub struct MonitorScheduler {
    db: SqlitePool,
    session: Arc<PortalSession>,
    clock: Arc<dyn Clock>,
    coordinator: RegistrationCoordinator,
    term: String,
    scrape_timeout: Duration,
    state: Arc<watch::Sender<MonitorState>>,
}

impl MonitorScheduler {
    pub fn new(ctx: &MonitorContext, state: Arc<watch::Sender<MonitorState>>) -> Self {
        Self {
            db: ctx.db.clone(),
            session: ctx.session.clone(),
            clock: ctx.clock.clone(),
            coordinator: RegistrationCoordinator::new(ctx.session.clone(), ctx.registration_timeout),
            term: ctx.term.clone(),
            scrape_timeout: ctx.scrape_timeout,
            state,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn coordinator(&self) -> &RegistrationCoordinator {
        &self.coordinator
    }

    /// Runs the loop to completion and releases the portal session.
    pub async fn run(&self, max_attempts: u32, delay: Duration, stop: &StopHandle) -> RunReport {
        let span = info_span!("monitor_run", term = %self.term);
        async {
            info!("Starting monitor (max_attempts: {}, delay: {:?})", max_attempts, delay);
            self.enter(MonitorState::Idle);

            let mut report = RunReport {
                cycles: Vec::new(),
                stop_reason: StopReason::Completed,
                registered: Vec::new(),
                persistence_failures: 0,
                consecutive_persistence_failures: 0,
            };
            let mut iteration = 0;

            report.stop_reason = loop {
                if stop.is_stopped() {
                    break StopReason::Cancelled;
                }
                if iteration >= max_attempts {
                    break StopReason::Completed;
                }
                iteration += 1;
                info!("Monitoring attempt {}/{}", iteration, max_attempts);

                let cycle = self.run_cycle(iteration, stop).await;
                report.registered.extend(
                    cycle
                        .attempts
                        .iter()
                        .filter(|a| a.outcome.is_success())
                        .map(|a| a.course_code.clone()),
                );

                if cycle.aborted.is_some() {
                    report.persistence_failures += 1;
                    report.consecutive_persistence_failures += 1;
                    if report.consecutive_persistence_failures >= PERSISTENCE_ALERT_THRESHOLD {
                        error!(
                            "Persistence has failed {} cycles in a row",
                            report.consecutive_persistence_failures
                        );
                    }
                } else {
                    report.consecutive_persistence_failures = 0;
                }
                report.cycles.push(cycle);

                if iteration >= max_attempts {
                    break StopReason::Completed;
                }
                if stop.is_stopped() {
                    break StopReason::Cancelled;
                }

                self.enter(MonitorState::Sleeping);
                debug!("Waiting {:?} before next check", delay);
                let cancelled = tokio::select! {
                    _ = self.clock.sleep(delay) => false,
                    _ = stop.stopped() => true,
                };
                if cancelled {
                    break StopReason::Cancelled;
                }
            };

            self.enter(MonitorState::Stopped);
            self.session.release().await;
            info!(
                "Monitor stopped ({:?}) after {} cycles, registered: {:?}",
                report.stop_reason,
                report.cycles.len(),
                report.registered
            );
            report
        }
        .instrument(span)
        .await
    }

    /// One refresh → scan → act pass, holding the portal for its whole length.
    /// Persistence errors end the cycle early and are recorded in the report.
    pub async fn run_cycle(&self, number: u32, stop: &StopHandle) -> CycleReport {
        let _turn = self.session.lock().await;
        let mut report = CycleReport::new(number, self.clock.now());

        self.enter(MonitorState::Refreshing);
        match self.refresh().await {
            Ok(count) => report.snapshots_refreshed = count,
            Err(e) if e.is_persistence() => return self.abort(report, e),
            Err(e) => {
                warn!("Refresh failed, continuing with stored snapshots: {}", e);
                report.refresh_error = Some(e.to_string());
            }
        }
        if stop.is_stopped() {
            return report;
        }

        self.enter(MonitorState::Scanning);
        let actionable = match self.scan(&mut report).await {
            Ok(entries) => entries,
            Err(e) => return self.abort(report, e),
        };
        if stop.is_stopped() {
            return report;
        }

        self.enter(MonitorState::Acting);
        if let Err(e) = self.act(actionable, &mut report).await {
            return self.abort(report, e);
        }
        report
    }

    /// Scrapes the term and stores every listing, stamped with the current time.
    /// Callers hold the portal lock.
    pub async fn refresh(&self) -> Result<usize, AppError> {
        let adapter = self.session.adapter()?;
        let listings = tokio::time::timeout(self.scrape_timeout, adapter.scrape_courses(&self.term))
            .await
            .map_err(|_| PortalError::Timeout(self.scrape_timeout))??;

        let observed_at = self.clock.now();
        let snapshots: Vec<CourseSnapshot> = listings
            .into_iter()
            .map(|listing| CourseSnapshot::from_listing(listing, observed_at))
            .collect();

        let stored = repository::upsert_courses(&self.db, &snapshots).await?;
        info!("Saved {} courses", stored);
        Ok(stored)
    }

    /// Works from one read of the watchlist; entries added later wait for the
    /// next cycle.
    async fn scan(&self, report: &mut CycleReport) -> Result<Vec<WatchlistEntry>, AppError> {
        let watchlist = repository::fetch_watchlist_ordered(&self.db).await?;
        let mut actionable = Vec::new();

        for entry in watchlist {
            match repository::find_course_by_code(&self.db, &entry.course_code).await? {
                None => report.missing_snapshot.push(entry.course_code),
                Some(snapshot) if snapshot.has_open_seats() => {
                    if entry.auto_register {
                        info!("{} is available, queued for registration", entry.course_code);
                        actionable.push(entry);
                    } else {
                        info!(
                            "{} is available ({}/{}), auto-register is off",
                            entry.course_code, snapshot.available_spots, snapshot.total_spots
                        );
                        report.available_not_auto.push(entry.course_code);
                    }
                }
                Some(_) => debug!("{} is full", entry.course_code),
            }
        }
        Ok(actionable)
    }

    /// Attempts are strictly sequential; a failed attempt never stops the rest.
    async fn act(&self, actionable: Vec<WatchlistEntry>, report: &mut CycleReport) -> Result<(), AppError> {
        for entry in actionable {
            let outcome = self.coordinator.attempt(&entry.course_code).await;
            let success = outcome.is_success();

            report.attempts.push(AttemptRecord {
                course_code: entry.course_code.clone(),
                outcome,
                removed: false,
            });

            if success {
                repository::remove_watch_entry(&self.db, &entry.course_code).await?;
                if let Some(last) = report.attempts.last_mut() {
                    last.removed = true;
                }
                info!("Removed {} from watchlist", entry.course_code);
            }
        }
        Ok(())
    }

    fn abort(&self, mut report: CycleReport, e: AppError) -> CycleReport {
        error!("Cycle {} aborted: {}", report.cycle, e);
        report.aborted = Some(e.to_string());
        report
    }

    fn enter(&self, state: MonitorState) {
        debug!("Monitor state -> {:?}", state);
        self.state.send_replace(state);
    }
}
