use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::{RegistrationError, RegistrationOutcome};
use crate::portal::{PortalError, RegistrationReply};
use crate::services::session::PortalSession;

/// Invokes the portal's registration action and classifies the reply.
///
/// Callers must already know the course has open seats. The coordinator never
/// touches the watchlist; acting on the outcome is the caller's job.
pub struct RegistrationCoordinator {
    session: Arc<PortalSession>,
    timeout: Duration,
}

impl RegistrationCoordinator {
    pub fn new(session: Arc<PortalSession>, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    pub async fn attempt(&self, course_code: &str) -> RegistrationOutcome {
        let outcome = self.classify(course_code).await;

        match &outcome {
            RegistrationOutcome::Success => info!("Registered for {}", course_code),
            RegistrationOutcome::Failure(reason) => {
                warn!("Registration rejected for {}: {}", course_code, reason)
            }
            RegistrationOutcome::Ambiguous(reason) => {
                warn!("Registration state unknown for {}: {}", course_code, reason)
            }
        }
        outcome
    }

    async fn classify(&self, course_code: &str) -> RegistrationOutcome {
        let adapter = match self.session.adapter() {
            Ok(adapter) => adapter,
            // Nothing was sent, so nothing can have been registered.
            Err(e) => return RegistrationOutcome::Failure(RegistrationError::Unknown(e.to_string())),
        };

        let reply = tokio::time::timeout(self.timeout, adapter.attempt_registration(course_code)).await;

        match reply {
            Err(_elapsed) => RegistrationOutcome::Ambiguous(RegistrationError::Timeout),
            Ok(Ok(RegistrationReply::Confirmed)) => RegistrationOutcome::Success,
            Ok(Ok(RegistrationReply::Rejected(reason))) => {
                RegistrationOutcome::Failure(RegistrationError::classify(&reason))
            }
            Ok(Ok(RegistrationReply::Indeterminate)) => {
                RegistrationOutcome::Ambiguous(RegistrationError::Timeout)
            }
            Ok(Err(PortalError::Timeout(_))) => RegistrationOutcome::Ambiguous(RegistrationError::Timeout),
            Ok(Err(e)) => RegistrationOutcome::Ambiguous(RegistrationError::Unknown(e.to_string())),
        }
    }
}
