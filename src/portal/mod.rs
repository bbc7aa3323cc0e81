pub mod availability;
pub mod dto;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::CourseListing;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transient failures talking to the registration portal.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("login failed: {0}")]
    Login(String),

    #[error("term selection failed: {0}")]
    TermSelection(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("failed to parse course listings: {0}")]
    Scrape(String),

    #[error("portal did not respond within {0:?}")]
    Timeout(Duration),

    #[error("portal session is closed")]
    SessionClosed,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// What the portal said about a registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationReply {
    Confirmed,
    Rejected(String),
    Indeterminate,
}

/// The external layer that drives the registration website.
#[async_trait]
pub trait PortalAdapter: Send + Sync {
    async fn login(&self, credentials: &Credentials, endpoint_url: &str) -> Result<(), PortalError>;
    async fn select_term(&self, term: &str) -> Result<(), PortalError>;
    async fn scrape_courses(&self, term: &str) -> Result<Vec<CourseListing>, PortalError>;
    async fn attempt_registration(&self, course_code: &str) -> Result<RegistrationReply, PortalError>;
    /// Releases the underlying session. Called exactly once at shutdown.
    async fn dispose(&self);
}

#[derive(Debug, Clone)]
struct PortalSessionToken {
    base_url: Url,
    token: String,
}

/// Adapter for portals exposing a JSON API under the login endpoint.
pub struct PortalHttpClient {
    client: Client,
    request_timeout: Duration,
    session: RwLock<Option<PortalSessionToken>>,
}

impl PortalHttpClient {
    pub fn new(request_timeout: Duration) -> Result<Self, PortalError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PortalError::Navigation(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            request_timeout,
            session: RwLock::new(None),
        })
    }

    async fn authorized(&self, build: impl FnOnce(&Client, &Url) -> RequestBuilder) -> Result<Response, PortalError> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(PortalError::SessionClosed)?;

        let response = build(&self.client, &session.base_url)
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(response)
    }

    fn transport_error(&self, e: reqwest::Error) -> PortalError {
        if e.is_timeout() {
            PortalError::Timeout(self.request_timeout)
        } else {
            PortalError::Http(e)
        }
    }
}

/// `base` joined with `segments`, each percent-encoded as a single path segment.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

async fn error_body(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("portal returned {}: {}", status, body)
}

#[async_trait]
impl PortalAdapter for PortalHttpClient {
    async fn login(&self, credentials: &Credentials, endpoint_url: &str) -> Result<(), PortalError> {
        let base_url = Url::parse(endpoint_url)
            .map_err(|e| PortalError::Login(format!("Invalid portal url {}: {}", endpoint_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PortalError::Login(format!("Invalid portal url {}", endpoint_url)));
        }
        info!("Logging in to {}", base_url);

        let response = self
            .client
            .post(endpoint(&base_url, &["login"]))
            .json(&dto::LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| PortalError::Login(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortalError::Login(error_body(response).await));
        }

        let body: dto::LoginResponse = response
            .json()
            .await
            .map_err(|e| PortalError::Login(format!("Failed to parse login response: {}", e)))?;

        *self.session.write().await = Some(PortalSessionToken {
            base_url,
            token: body.token,
        });
        Ok(())
    }

    async fn select_term(&self, term: &str) -> Result<(), PortalError> {
        let response = self
            .authorized(|client, base| {
                client
                    .post(endpoint(base, &["terms", "select"]))
                    .json(&dto::SelectTermRequest { term })
            })
            .await?;

        if !response.status().is_success() {
            return Err(PortalError::TermSelection(error_body(response).await));
        }
        info!("Selected term: {}", term);
        Ok(())
    }

    async fn scrape_courses(&self, term: &str) -> Result<Vec<CourseListing>, PortalError> {
        let response = self
            .authorized(|client, base| client.get(endpoint(base, &["terms", term, "courses"])))
            .await?;

        if !response.status().is_success() {
            return Err(PortalError::Navigation(error_body(response).await));
        }

        let body_text = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: dto::CourseListResponse = serde_json::from_str(&body_text)
            .map_err(|e| PortalError::Scrape(e.to_string()))?;

        debug!("Scraped {} course rows for {}", parsed.courses.len(), term);
        Ok(parsed.courses)
    }

    async fn attempt_registration(&self, course_code: &str) -> Result<RegistrationReply, PortalError> {
        let response = self
            .authorized(|client, base| {
                client
                    .post(endpoint(base, &["registrations"]))
                    .json(&dto::RegistrationRequest { course_code })
            })
            .await?;

        if response.status().is_server_error() {
            return Err(PortalError::Navigation(error_body(response).await));
        }

        // Rejections may come back as 4xx with the same body shape.
        let body: dto::RegistrationResponse = response
            .json()
            .await
            .map_err(|e| PortalError::Scrape(format!("Failed to parse registration response: {}", e)))?;

        Ok(match body.status {
            dto::RegistrationStatus::Confirmed => RegistrationReply::Confirmed,
            dto::RegistrationStatus::Rejected => {
                RegistrationReply::Rejected(body.message.unwrap_or_default())
            }
            dto::RegistrationStatus::Pending => RegistrationReply::Indeterminate,
        })
    }

    async fn dispose(&self) {
        let Some(session) = self.session.write().await.take() else {
            return;
        };

        let result = self
            .client
            .post(endpoint(&session.base_url, &["logout"]))
            .bearer_auth(&session.token)
            .send()
            .await;

        match result {
            Ok(_) => info!("Portal session released"),
            Err(e) => warn!("Portal logout failed: {}", e),
        }
    }
}

/// Adapter that never touches the network.
pub struct NoopPortalAdapter;

#[async_trait]
impl PortalAdapter for NoopPortalAdapter {
    async fn login(&self, _credentials: &Credentials, _endpoint_url: &str) -> Result<(), PortalError> {
        Ok(())
    }

    async fn select_term(&self, _term: &str) -> Result<(), PortalError> {
        Ok(())
    }

    async fn scrape_courses(&self, _term: &str) -> Result<Vec<CourseListing>, PortalError> {
        Ok(Vec::new())
    }

    async fn attempt_registration(&self, _course_code: &str) -> Result<RegistrationReply, PortalError> {
        Ok(RegistrationReply::Indeterminate)
    }

    async fn dispose(&self) {}
}
