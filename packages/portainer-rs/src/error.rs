use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortainerError>;

#[derive(Debug, Error)]
pub enum PortainerError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("login failed, invalid credentials")]
    InvalidCredentials,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("expected exactly one container named {name}, found {found}")]
    ContainerLookup { name: String, found: usize },

    #[error("unexpected status code from portainer ({status}) during {action}")]
    UnexpectedStatus { action: &'static str, status: u16 },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}
