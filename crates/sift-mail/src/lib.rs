mod error;
mod gmail;
mod provider;
mod scanner;
mod sync;

pub use error::{MailError, SyncError};
pub use gmail::{encode_raw_message, reply_subject, GmailClient};
pub use provider::{MailboxProvider, MessagePage, MessageStub, OutgoingMail, PageQuery};
pub use scanner::{
    extension_of, guard_download, looks_executable, synthetic_url, AttachmentScanner,
    SafeBrowsingClient, ThreatLookup,
};
pub use sync::{
    list_mailbox, received_timestamp, sort_newest_first, BatchSink, FnSink, SyncOptions,
};
