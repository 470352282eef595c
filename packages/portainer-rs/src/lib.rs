//! Minimal Portainer REST API client.
//!
//! A client instance is bound to a single container: the intended use is to
//! start and stop one crawler container from a controlling service.
//!
//! # Example
//!
//! ```rust,ignore
//! use portainer::{PortainerClient, PortainerOptions};
//!
//! let client = PortainerClient::new(PortainerOptions {
//!     url: "https://portainer.example.org/api".into(),
//!     user: "admin".into(),
//!     password: "secret".into(),
//!     env_id: 1,
//!     container_name: "crawler".into(),
//! })?;
//!
//! client.login().await?;
//! client.start_container().await?;
//! ```

pub mod error;
pub mod types;

pub use error::{PortainerError, Result};
pub use types::{ActionOutcome, ContainerAction, ContainerSummary};

use std::sync::RwLock;
use std::time::Duration;

use reqwest::StatusCode;
use types::{AuthRequest, AuthResponse};

#[derive(Debug, Clone)]
pub struct PortainerOptions {
    /// API root WITH the `/api` suffix and WITHOUT a trailing slash.
    pub url: String,
    pub user: String,
    pub password: String,
    /// Portainer environment ID (1 for a single local environment).
    pub env_id: u32,
    pub container_name: String,
}

pub struct PortainerClient {
    client: reqwest::Client,
    options: PortainerOptions,
    jwt: RwLock<Option<String>>,
}

impl PortainerClient {
    pub fn new(options: PortainerOptions) -> Result<Self> {
        Self::with_timeout(options, Duration::from_secs(30))
    }

    /// Build a client whose requests are bounded by `timeout`.
    pub fn with_timeout(options: PortainerOptions, timeout: Duration) -> Result<Self> {
        if options.url.is_empty() {
            return Err(PortainerError::InvalidConfig("no url set".into()));
        }
        if options.user.is_empty() || options.password.is_empty() {
            return Err(PortainerError::InvalidConfig("no credentials".into()));
        }
        if options.container_name.is_empty() {
            return Err(PortainerError::InvalidConfig("no container name".into()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            options: PortainerOptions {
                url: options.url.trim_end_matches('/').to_string(),
                ..options
            },
            jwt: RwLock::new(None),
        })
    }

    pub fn container_name(&self) -> &str {
        &self.options.container_name
    }

    pub fn is_logged_in(&self) -> bool {
        self.jwt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Log in with the configured credentials and keep the access token.
    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/auth", self.options.url);
        let resp = self
            .client
            .post(&url)
            .json(&AuthRequest {
                username: &self.options.user,
                password: &self.options.password,
            })
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let auth: AuthResponse = resp.json().await?;
                *self.jwt.write().unwrap_or_else(|e| e.into_inner()) = Some(auth.jwt);
                tracing::info!("Portainer login succeeded");
                Ok(())
            }
            // Portainer answers bad credentials with 422 rather than 401
            StatusCode::UNPROCESSABLE_ENTITY => {
                tracing::error!("Portainer rejected credentials");
                Err(PortainerError::InvalidCredentials)
            }
            status => Err(PortainerError::UnexpectedStatus {
                action: "login",
                status: status.as_u16(),
            }),
        }
    }

    fn token(&self) -> Result<String> {
        self.jwt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(PortainerError::NotLoggedIn)
    }

    fn docker_url(&self, path: &str) -> String {
        format!(
            "{}/endpoints/{}/docker/{}",
            self.options.url, self.options.env_id, path
        )
    }

    /// Resolve the configured container name to its ID.
    pub async fn find_container(&self) -> Result<String> {
        let token = self.token()?;
        let filters = name_filter(&self.options.container_name);
        let resp = self
            .client
            .get(self.docker_url("containers/json"))
            .bearer_auth(token)
            .query(&[("all", "true"), ("filters", filters.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(PortainerError::UnexpectedStatus {
                action: "find container",
                status: status.as_u16(),
            });
        }

        let mut containers: Vec<ContainerSummary> = resp.json().await?;
        if containers.len() != 1 {
            return Err(PortainerError::ContainerLookup {
                name: self.options.container_name.clone(),
                found: containers.len(),
            });
        }
        Ok(containers.remove(0).id)
    }

    async fn container_action(&self, action: ContainerAction) -> Result<ActionOutcome> {
        let container_id = self.find_container().await?;
        let token = self.token()?;
        let resp = self
            .client
            .post(self.docker_url(&format!(
                "containers/{}/{}",
                container_id,
                action.as_str()
            )))
            .bearer_auth(token)
            .send()
            .await?;

        let outcome = classify_action(action, resp.status())?;
        match outcome {
            ActionOutcome::Done => {
                tracing::info!(action = action.as_str(), container = %self.options.container_name, "Container action applied")
            }
            ActionOutcome::Unchanged => {
                tracing::warn!(action = action.as_str(), container = %self.options.container_name, "Container already in requested state")
            }
        }
        Ok(outcome)
    }

    /// Start the container. Succeeds if it is already running.
    pub async fn start_container(&self) -> Result<ActionOutcome> {
        self.container_action(ContainerAction::Start).await
    }

    /// Stop the container. Succeeds if it is not running.
    pub async fn stop_container(&self) -> Result<ActionOutcome> {
        self.container_action(ContainerAction::Stop).await
    }
}

/// Docker filter expression selecting containers by exact name.
fn name_filter(name: &str) -> String {
    serde_json::json!({ "name": [name] }).to_string()
}

/// Map the Docker proxy's response code for `action` to an outcome.
pub fn classify_action(action: ContainerAction, status: StatusCode) -> Result<ActionOutcome> {
    match (action, status) {
        (_, StatusCode::NO_CONTENT) => Ok(ActionOutcome::Done),
        (_, StatusCode::NOT_MODIFIED) => Ok(ActionOutcome::Unchanged),
        (action, status) => Err(PortainerError::UnexpectedStatus {
            action: action.as_str(),
            status: status.as_u16(),
        }),
    }
}
