use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{context} failed with status {status}")]
    Status { context: &'static str, status: u16 },
    #[error("invalid data: {0}")]
    Data(String),
    #[error("message build error: {0}")]
    Build(String),
    #[error("download blocked: {filename} was flagged as unsafe")]
    UnsafeAttachment { filename: String },
}

/// Outcome of a mailbox sync that did not complete. A user stop is reported
/// separately from a provider failure.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync cancelled after {delivered} messages")]
    Cancelled { delivered: usize },
    #[error("sync failed: {0}")]
    Fetch(#[from] MailError),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
