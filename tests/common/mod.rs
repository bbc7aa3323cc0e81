#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;

use seatwatch::db::{self, repository};
use seatwatch::models::{CourseListing, WatchlistEntry};
use seatwatch::portal::{Credentials, PortalAdapter, PortalError, RegistrationReply};
use seatwatch::services::{Clock, MonitorContext, PortalSession, StopHandle};

pub const TERM: &str = "Winter 2026";

pub enum Scripted {
    Reply(RegistrationReply),
    Error(String),
    /// Never answers within any sane timeout.
    Hang,
}

/// In-process portal that records every call.
#[derive(Default)]
pub struct ScriptedPortal {
    pub listings: Mutex<Vec<CourseListing>>,
    pub replies: Mutex<HashMap<String, Scripted>>,
    pub fail_login: AtomicBool,
    pub fail_scrape: AtomicBool,
    pub logins: AtomicUsize,
    pub scrapes: AtomicUsize,
    pub scraped_terms: Mutex<Vec<String>>,
    pub attempts: Mutex<Vec<String>>,
    pub disposed: AtomicUsize,
    /// Written to the watchlist from inside the first registration attempt.
    pub add_during_attempt: Mutex<Option<(SqlitePool, WatchlistEntry)>>,
    /// Raised from inside the first registration attempt.
    pub stop_during_attempt: Mutex<Option<StopHandle>>,
    /// How long each registration attempt takes to answer.
    pub attempt_delay: Mutex<Option<Duration>>,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    /// `dispose` calls that arrived while an attempt was still running.
    pub disposed_mid_attempt: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedPortal {
    pub fn with_listings(listings: Vec<CourseListing>) -> Arc<Self> {
        let portal = Self::default();
        *portal.listings.lock().unwrap() = listings;
        Arc::new(portal)
    }

    pub fn script(&self, code: &str, scripted: Scripted) {
        self.replies.lock().unwrap().insert(code.to_string(), scripted);
    }

    pub fn set_listings(&self, listings: Vec<CourseListing>) {
        *self.listings.lock().unwrap() = listings;
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortalAdapter for ScriptedPortal {
    async fn login(&self, _credentials: &Credentials, _endpoint_url: &str) -> Result<(), PortalError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(PortalError::Login("invalid credentials".to_string()));
        }
        Ok(())
    }

    async fn select_term(&self, _term: &str) -> Result<(), PortalError> {
        Ok(())
    }

    async fn scrape_courses(&self, term: &str) -> Result<Vec<CourseListing>, PortalError> {
        self.scrapes.fetch_add(1, Ordering::SeqCst);
        self.scraped_terms.lock().unwrap().push(term.to_string());
        if self.fail_scrape.load(Ordering::SeqCst) {
            return Err(PortalError::Scrape("course table not found".to_string()));
        }
        Ok(self.listings.lock().unwrap().clone())
    }

    async fn attempt_registration(&self, course_code: &str) -> Result<RegistrationReply, PortalError> {
        self.attempts.lock().unwrap().push(course_code.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let stop = self.stop_during_attempt.lock().unwrap().take();
        if let Some(handle) = stop {
            handle.stop();
        }

        let delay = *self.attempt_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let pending = self.add_during_attempt.lock().unwrap().take();
        if let Some((pool, entry)) = pending {
            repository::upsert_watch_entry(&pool, &entry).await.unwrap();
        }

        let scripted = self.replies.lock().unwrap().remove(course_code);
        match scripted {
            None => Ok(RegistrationReply::Confirmed),
            Some(Scripted::Reply(reply)) => {
                // Keep answering the same way on later attempts.
                self.script(course_code, Scripted::Reply(reply.clone()));
                Ok(reply)
            }
            Some(Scripted::Error(message)) => Err(PortalError::Navigation(message)),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(RegistrationReply::Confirmed)
            }
        }
    }

    async fn dispose(&self) {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            self.disposed_mid_attempt.fetch_add(1, Ordering::SeqCst);
        }
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock that never waits: sleeps are recorded and advance `now`.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    stop_on_sleep: Mutex<Option<StopHandle>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()),
            sleeps: Mutex::new(Vec::new()),
            stop_on_sleep: Mutex::new(None),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// The next sleep raises `handle` and then never returns.
    pub fn stop_on_sleep(&self, handle: StopHandle) {
        *self.stop_on_sleep.lock().unwrap() = Some(handle);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let stop = self.stop_on_sleep.lock().unwrap().take();
        if let Some(handle) = stop {
            handle.stop();
            std::future::pending::<()>().await;
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

pub fn listing(code: &str, availability: &str, status: &str) -> CourseListing {
    CourseListing {
        code: code.to_string(),
        name: format!("{} lecture", code),
        credits: "3".to_string(),
        availability: availability.to_string(),
        instructor: "Dr. Smith".to_string(),
        schedule: "MW 10:10-11:30".to_string(),
        prerequisites: String::new(),
        status: status.to_string(),
    }
}

pub async fn memory_pool() -> SqlitePool {
    db::connect_in_memory().await.expect("Failed to create database")
}

pub fn context(pool: SqlitePool, portal: Arc<ScriptedPortal>, clock: Arc<ManualClock>) -> MonitorContext {
    MonitorContext {
        db: pool,
        session: Arc::new(PortalSession::new(portal)),
        clock,
        term: TERM.to_string(),
        registration_timeout: Duration::from_millis(200),
        scrape_timeout: Duration::from_secs(5),
    }
}

pub fn watch(code: &str, priority: u32, auto_register: bool, added_at: DateTime<Utc>) -> WatchlistEntry {
    WatchlistEntry {
        course_code: code.to_string(),
        priority,
        auto_register,
        added_at,
    }
}
