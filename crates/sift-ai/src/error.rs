use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion api returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("completion response carried no text")]
    EmptyResponse,
}

impl AiError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(*status, 429 | 500 | 502 | 503 | 504 | 529),
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }
}
