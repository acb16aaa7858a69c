use crate::{MailboxProvider, MessageStub, PageQuery, SyncError};
use async_trait::async_trait;
use chrono::{Local, Months, NaiveDate};
use futures::future::join_all;
use sift_config::SyncConfig;
use sift_core::EmailRef;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub page_size: u32,
    pub recency_months: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            recency_months: 3,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            recency_months: config.recency_months,
        }
    }
}

impl SyncOptions {
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_months(Months::new(self.recency_months))
            .unwrap_or(today)
    }
}

/// Receives each page of messages as soon as it has been fetched and sorted.
#[async_trait]
pub trait BatchSink: Send {
    async fn on_batch(&mut self, batch: &[EmailRef]) -> ControlFlow<()>;
}

/// Adapts a closure into a [`BatchSink`].
pub struct FnSink<F>(pub F);

#[async_trait]
impl<F> BatchSink for FnSink<F>
where
    F: FnMut(&[EmailRef]) -> ControlFlow<()> + Send,
{
    async fn on_batch(&mut self, batch: &[EmailRef]) -> ControlFlow<()> {
        (self.0)(batch)
    }
}

/// Unix seconds from an RFC 2822 `Date` header; unparsable dates sort last.
pub fn received_timestamp(date: &str) -> i64 {
    mailparse::dateparse(date).unwrap_or(0)
}

pub fn sort_newest_first(emails: &mut [EmailRef]) {
    emails.sort_by_key(|email| Reverse(received_timestamp(&email.date)));
}

/// Walks the mailbox label page by page. Metadata for one page is fetched
/// concurrently; messages that fail to load are skipped. Returns every
/// delivered message sorted newest first.
pub async fn list_mailbox<P>(
    provider: &P,
    token: &str,
    label: &str,
    options: &SyncOptions,
    mut sink: Option<&mut dyn BatchSink>,
    cancel: &CancellationToken,
) -> Result<Vec<EmailRef>, SyncError>
where
    P: MailboxProvider + ?Sized,
{
    let after = options.cutoff(Local::now().date_naive());
    let mut seen = HashSet::new();
    let mut collected: Vec<EmailRef> = Vec::new();
    let mut page_token: Option<String> = None;
    let mut page_number = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled {
                delivered: collected.len(),
            });
        }

        let query = PageQuery {
            label: label.to_string(),
            max_results: options.page_size,
            after,
            page_token: page_token.take(),
        };
        let page = provider.list_page(token, &query).await?;
        page_number += 1;
        if page.messages.is_empty() {
            break;
        }

        let stubs: Vec<MessageStub> = page
            .messages
            .into_iter()
            .filter(|stub| seen.insert(stub.id.clone()))
            .collect();
        let results = join_all(
            stubs
                .iter()
                .map(|stub| provider.fetch_metadata(token, &stub.id)),
        )
        .await;

        let mut batch = Vec::with_capacity(results.len());
        for (stub, result) in stubs.iter().zip(results) {
            match result {
                Ok(email) => batch.push(email),
                Err(err) => {
                    tracing::warn!(
                        message_id = %stub.id,
                        error = %err,
                        "skipping message that failed to load"
                    );
                }
            }
        }
        sort_newest_first(&mut batch);
        tracing::debug!(page = page_number, count = batch.len(), "mailbox page loaded");

        let flow = match sink.as_deref_mut() {
            Some(sink) if !batch.is_empty() => sink.on_batch(&batch).await,
            _ => ControlFlow::Continue(()),
        };
        collected.extend(batch);
        if flow.is_break() {
            return Err(SyncError::Cancelled {
                delivered: collected.len(),
            });
        }

        match page.next_page_token {
            Some(next) if !next.is_empty() => page_token = Some(next),
            _ => break,
        }
    }

    sort_newest_first(&mut collected);
    Ok(collected)
}
