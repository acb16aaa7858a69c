use crate::{EmailFilter, MailStore, SessionError};
use async_trait::async_trait;
use sift_ai::AiService;
use sift_config::AppConfig;
use sift_core::{EmailDetail, EmailRef, ReplyTone, ScanStatus, ScanVerdict, ShadowEvent};
use sift_mail::{
    guard_download, list_mailbox, looks_executable, reply_subject, AttachmentScanner, BatchSink,
    GmailClient, MailError, MailboxProvider, OutgoingMail, SyncError, SyncOptions,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;

const STARRED: &str = "STARRED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    Completed { fetched: usize, triaged: usize },
    /// Stopped by the caller. Messages delivered before the stop are kept.
    Cancelled { delivered: usize, triaged: usize },
}

impl SyncReport {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Stores each streamed batch and triages the messages it has not seen yet,
/// one message at a time.
struct StoreSink<'a> {
    store: &'a RwLock<MailStore>,
    ai: &'a AiService,
    cancel: &'a CancellationToken,
    triaged: usize,
}

#[async_trait]
impl<'a> BatchSink for StoreSink<'a> {
    async fn on_batch(&mut self, batch: &[EmailRef]) -> ControlFlow<()> {
        let added = self.store.write().await.append(batch);
        for email in &added {
            let input = email.to_analyze_input();
            let analysis = self.ai.analyze(&input).await;
            if self.store.write().await.set_analysis_once(&input.id, analysis) {
                self.triaged += 1;
            }
        }

        if self.cancel.is_cancelled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// One signed-in mailbox: the in-memory store plus the services that fill it.
pub struct Session {
    sender: String,
    provider: Arc<dyn MailboxProvider>,
    ai: AiService,
    scanner: AttachmentScanner,
    sync_options: SyncOptions,
    store: RwLock<MailStore>,
}

impl Session {
    pub fn new(
        sender: impl Into<String>,
        provider: Arc<dyn MailboxProvider>,
        ai: AiService,
        scanner: AttachmentScanner,
    ) -> Self {
        Self {
            sender: sender.into(),
            provider,
            ai,
            scanner,
            sync_options: SyncOptions::default(),
            store: RwLock::new(MailStore::new()),
        }
    }

    /// Gmail-backed session with every service built from the loaded config.
    pub fn from_config(config: &AppConfig, sender: impl Into<String>) -> Self {
        Self::new(
            sender,
            Arc::new(GmailClient::new(&config.sync)),
            AiService::from_config(&config.ai),
            AttachmentScanner::from_config(&config.scanner),
        )
        .with_sync_options(SyncOptions::from(&config.sync))
    }

    pub fn with_sync_options(mut self, options: SyncOptions) -> Self {
        self.sync_options = options;
        self
    }

    pub async fn store(&self) -> RwLockReadGuard<'_, MailStore> {
        self.store.read().await
    }

    pub async fn set_filter(&self, filter: EmailFilter) {
        self.store.write().await.set_filter(filter);
    }

    /// Streams the label into the store page by page. A caller stop is a
    /// report, not an error; only a failed listing is an error.
    pub async fn sync(
        &self,
        token: &str,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SessionError> {
        let mut sink = StoreSink {
            store: &self.store,
            ai: &self.ai,
            cancel,
            triaged: 0,
        };

        let result = list_mailbox(
            self.provider.as_ref(),
            token,
            label,
            &self.sync_options,
            Some(&mut sink),
            cancel,
        )
        .await;
        let triaged = sink.triaged;

        match result {
            Ok(all) => {
                tracing::info!(label, fetched = all.len(), triaged, "mailbox sync completed");
                Ok(SyncReport::Completed {
                    fetched: all.len(),
                    triaged,
                })
            }
            Err(SyncError::Cancelled { delivered }) => {
                tracing::info!(label, delivered, triaged, "mailbox sync cancelled");
                Ok(SyncReport::Cancelled { delivered, triaged })
            }
            Err(SyncError::Fetch(err)) => {
                tracing::error!(label, error = %err, "mailbox sync failed");
                Err(err.into())
            }
        }
    }

    /// Loads the full message, selects it, and triages it with its body if it
    /// has no analysis yet.
    pub async fn open_email(&self, token: &str, id: &str) -> Result<EmailDetail, SessionError> {
        let detail = self.ensure_detail(token, id).await?;

        let needs_analysis = self.store.read().await.analysis(id).is_none();
        let analysis = if needs_analysis {
            Some(self.ai.analyze(&detail.to_analyze_input()).await)
        } else {
            None
        };

        let mut store = self.store.write().await;
        if let Some(analysis) = analysis {
            store.set_analysis_once(id, analysis);
        }
        store.select(Some(id));
        Ok(detail)
    }

    async fn ensure_detail(&self, token: &str, id: &str) -> Result<EmailDetail, SessionError> {
        let cached = self.store.read().await.detail(id).cloned();
        if let Some(detail) = cached {
            return Ok(detail);
        }

        let mut detail = self.provider.fetch_detail(token, id).await?;
        for attachment in detail.attachments.iter_mut() {
            if attachment.is_scanned() {
                continue;
            }
            let verdict = self
                .scanner
                .scan(&attachment.filename, &attachment.mime_type, None)
                .await;
            tracing::debug!(
                email_id = %id,
                filename = %attachment.filename,
                status = ?verdict.status,
                "attachment scanned"
            );
            attachment.apply_verdict(verdict, false);
        }

        self.store.write().await.upsert_detail(detail.clone());
        Ok(detail)
    }

    /// Fetches attachment bytes. Unsafe attachments are refused before any
    /// request is made; content that turns out to be executable is flagged
    /// and refused as well.
    pub async fn download_attachment(
        &self,
        token: &str,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, SessionError> {
        let detail = self.ensure_detail(token, email_id).await?;
        let attachment = detail
            .attachments
            .iter()
            .find(|attachment| attachment.attachment_id == attachment_id)
            .ok_or_else(|| SessionError::UnknownAttachment {
                email_id: email_id.to_string(),
                attachment_id: attachment_id.to_string(),
            })?;
        guard_download(attachment)?;

        let bytes = self
            .provider
            .fetch_attachment(token, email_id, attachment_id)
            .await?;
        if looks_executable(&bytes) {
            let mut store = self.store.write().await;
            if let Some(stored) = store.detail_mut(email_id).and_then(|detail| {
                detail
                    .attachments
                    .iter_mut()
                    .find(|attachment| attachment.attachment_id == attachment_id)
            }) {
                stored.apply_verdict(
                    ScanVerdict::new(
                        ScanStatus::Unsafe,
                        "Blocked: the file contents look like a program.",
                    ),
                    true,
                );
            }
            tracing::warn!(
                email_id = %email_id,
                filename = %attachment.filename,
                "downloaded attachment is executable"
            );
            return Err(MailError::UnsafeAttachment {
                filename: attachment.filename.clone(),
            }
            .into());
        }
        Ok(bytes)
    }

    pub async fn generate_reply(&self, id: &str, tone: ReplyTone) -> Result<String, SessionError> {
        let input = {
            let store = self.store.read().await;
            match store.detail(id) {
                Some(detail) => detail.to_analyze_input(),
                None => store
                    .email(id)
                    .ok_or_else(|| SessionError::UnknownEmail(id.to_string()))?
                    .to_analyze_input(),
            }
        };

        let reply = self.ai.draft_reply(tone, &input).await;
        self.store.write().await.set_draft(id, tone, reply.clone());
        Ok(reply)
    }

    pub async fn edit_reply(
        &self,
        id: &str,
        tone: ReplyTone,
        text: &str,
    ) -> Result<(), SessionError> {
        let mut store = self.store.write().await;
        if store.email(id).is_none() {
            return Err(SessionError::UnknownEmail(id.to_string()));
        }
        store.set_draft(id, tone, text);
        Ok(())
    }

    /// Sends the current draft to the original sender and clears it.
    pub async fn send_reply(&self, token: &str, id: &str) -> Result<(), SessionError> {
        let outgoing = self.outgoing_reply(id).await?;
        self.provider.send(token, &outgoing).await?;
        self.store.write().await.clear_draft(id);
        tracing::info!(email_id = %id, "reply sent");
        Ok(())
    }

    /// Saves the current draft in the remote mailbox; the local draft is kept.
    pub async fn save_reply_draft(&self, token: &str, id: &str) -> Result<(), SessionError> {
        let outgoing = self.outgoing_reply(id).await?;
        self.provider.create_draft(token, &outgoing).await?;
        Ok(())
    }

    async fn outgoing_reply(&self, id: &str) -> Result<OutgoingMail, SessionError> {
        let store = self.store.read().await;
        let email = store
            .email(id)
            .ok_or_else(|| SessionError::UnknownEmail(id.to_string()))?;
        let body_text = store
            .draft(id)
            .map(|draft| draft.text.trim())
            .filter(|text| !text.is_empty())
            .ok_or(SessionError::EmptyReply)?
            .to_string();
        let to = recipient_address(&email.from)
            .ok_or_else(|| SessionError::NoRecipient(email.from.clone()))?;

        Ok(OutgoingMail {
            from: self.sender.clone(),
            to,
            subject: reply_subject(&email.subject),
            body_text,
        })
    }

    /// Removes the message from the remote inbox, then hides it locally.
    pub async fn archive(&self, token: &str, id: &str) -> Result<(), SessionError> {
        if self.store.read().await.email(id).is_none() {
            return Err(SessionError::UnknownEmail(id.to_string()));
        }
        self.provider
            .modify_labels(token, id, &[], &["INBOX"])
            .await?;
        self.store.write().await.archive(id);
        Ok(())
    }

    /// Stars or unstars the message remotely, then mirrors the label locally.
    pub async fn set_starred(
        &self,
        token: &str,
        id: &str,
        starred: bool,
    ) -> Result<(), SessionError> {
        if self.store.read().await.email(id).is_none() {
            return Err(SessionError::UnknownEmail(id.to_string()));
        }
        if starred {
            self.provider.modify_labels(token, id, &[STARRED], &[]).await?;
        } else {
            self.provider.modify_labels(token, id, &[], &[STARRED]).await?;
        }
        self.store.write().await.set_label(id, STARRED, starred);
        Ok(())
    }

    pub async fn accept_suggested_event(&self, id: &str) -> Result<ShadowEvent, SessionError> {
        let mut store = self.store.write().await;
        let suggestion = store
            .analysis(id)
            .and_then(|analysis| analysis.suggested_event.clone())
            .ok_or_else(|| SessionError::NoSuggestedEvent(id.to_string()))?;
        Ok(store.add_shadow_event(ShadowEvent::from_suggestion(&suggestion)))
    }
}

/// Bare address from a `From` header: the bracketed part when present.
fn recipient_address(from: &str) -> Option<String> {
    if let Some((_, rest)) = from.split_once('<') {
        if let Some((address, _)) = rest.split_once('>') {
            let address = address.trim();
            if !address.is_empty() {
                return Some(address.to_string());
            }
        }
    }
    let trimmed = from.trim();
    trimmed.contains('@').then(|| trimmed.to_string())
}
