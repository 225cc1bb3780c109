use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store returned http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid remote store URL: {0}")]
    Url(String),
    #[error("no remote store configured for user {0}")]
    RemoteNotConfigured(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
