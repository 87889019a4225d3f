//! Error types for flow execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Could not open {resource}: {reason}")]
    Acquire { resource: &'static str, reason: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error(
        "Playwright not found. Install with: npm i playwright && npx playwright install chromium"
    )]
    PlaywrightNotFound,

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("No element matches {0}")]
    NoMatch(String),

    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Flow parse error: {0}")]
    FlowParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Target server failed to start: {0}")]
    ServerStartup(String),

    #[error("Target {url} unreachable after {attempts} attempts")]
    TargetUnreachable { url: String, attempts: usize },

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether the failure is an expired bound rather than a hard fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, E2eError::Timeout { .. })
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
