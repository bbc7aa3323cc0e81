pub mod clock;
pub mod engine;
pub mod registration;
pub mod scheduler;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

pub use clock::{Clock, SystemClock};
pub use engine::{Engine, MonitorStatus};
pub use registration::RegistrationCoordinator;
pub use scheduler::{MonitorScheduler, MonitorState, RunReport, StopHandle, StopReason};
pub use session::PortalSession;

/// Everything a run needs, built once and handed to each component.
#[derive(Clone)]
pub struct MonitorContext {
    pub db: SqlitePool,
    pub session: Arc<PortalSession>,
    pub clock: Arc<dyn Clock>,
    /// Academic term to scrape. Always explicit.
    pub term: String,
    pub registration_timeout: Duration,
    pub scrape_timeout: Duration,
}
