mod error;
mod session;
mod store;

pub use error::SessionError;
pub use session::{Session, SyncReport};
pub use store::{CategoryCounts, EmailFilter, MailStats, MailStore, SentimentCounts};
