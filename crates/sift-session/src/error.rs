use sift_mail::MailError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("unknown email: {0}")]
    UnknownEmail(String),
    #[error("email {email_id} has no attachment {attachment_id}")]
    UnknownAttachment {
        email_id: String,
        attachment_id: String,
    },
    #[error("generate or type a reply first")]
    EmptyReply,
    #[error("could not detect a recipient address in `{0}`")]
    NoRecipient(String),
    #[error("email {0} has no suggested event")]
    NoSuggestedEvent(String),
}
