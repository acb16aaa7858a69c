use crate::MailError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sift_core::{EmailDetail, EmailRef};

/// One page request against the mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub label: String,
    pub max_results: u32,
    /// Only messages received after this date are listed.
    pub after: NaiveDate,
    pub page_token: Option<String>,
}

impl PageQuery {
    pub fn search_query(&self) -> String {
        format!("after:{}", self.after.format("%Y/%m/%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStub {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageStub>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub from: String,
    /// Comma separated recipients.
    pub to: String,
    pub subject: String,
    pub body_text: String,
}

/// Remote mailbox reached with a bearer token obtained elsewhere.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    async fn list_page(&self, token: &str, query: &PageQuery) -> Result<MessagePage, MailError>;

    /// Subject/From/Date headers, snippet, labels and whether attachments are present.
    async fn fetch_metadata(&self, token: &str, id: &str) -> Result<EmailRef, MailError>;

    async fn fetch_detail(&self, token: &str, id: &str) -> Result<EmailDetail, MailError>;

    async fn fetch_attachment(
        &self,
        token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailError>;

    async fn send(&self, token: &str, outgoing: &OutgoingMail) -> Result<(), MailError>;

    async fn create_draft(&self, token: &str, outgoing: &OutgoingMail) -> Result<(), MailError>;

    async fn modify_labels(
        &self,
        token: &str,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailError>;
}
