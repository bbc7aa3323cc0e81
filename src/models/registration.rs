use serde::Serialize;
use thiserror::Error;

/// Why a single registration attempt did not succeed.
///
/// Returned as data inside [`RegistrationOutcome`]; never propagated as a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "reason")]
pub enum RegistrationError {
    #[error("course full: {0}")]
    CourseFull(String),

    #[error("prerequisite not met: {0}")]
    PrerequisiteNotMet(String),

    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    #[error("no confirmation or rejection before timeout")]
    Timeout,

    #[error("{0}")]
    Unknown(String),
}

impl RegistrationError {
    /// Maps portal rejection text onto a known reason. The text is kept verbatim.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let text = message.to_string();

        if lower.contains("prerequisite") {
            RegistrationError::PrerequisiteNotMet(text)
        } else if lower.contains("already registered") || lower.contains("already enrolled") {
            RegistrationError::AlreadyRegistered(text)
        } else if lower.contains("full") || lower.contains("closed") || lower.contains("no seats") {
            RegistrationError::CourseFull(text)
        } else {
            RegistrationError::Unknown(text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error")]
pub enum RegistrationOutcome {
    Success,
    /// The portal explicitly rejected the request.
    Failure(RegistrationError),
    /// Server-side state is unknown (timeout, lost response).
    Ambiguous(RegistrationError),
}

impl RegistrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RegistrationOutcome::Success)
    }
}
