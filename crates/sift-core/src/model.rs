use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Character caps applied to triage input before it reaches any model.
pub const MAX_FROM_CHARS: usize = 400;
pub const MAX_SUBJECT_CHARS: usize = 500;
pub const MAX_SNIPPET_CHARS: usize = 5_000;
pub const MAX_BODY_CHARS: usize = 20_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Urgent,
    Promotional,
    Social,
    Updates,
    Personal,
    General,
}

impl Category {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "urgent" => Some(Self::Urgent),
            "promotional" => Some(Self::Promotional),
            "social" => Some(Self::Social),
            "updates" => Some(Self::Updates),
            "personal" => Some(Self::Personal),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    NeedsReply,
    ScheduleMeeting,
    ReviewDocument,
    FollowUp,
    Archive,
    Unsubscribe,
}

impl SuggestedAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "needs_reply" => Some(Self::NeedsReply),
            "schedule_meeting" => Some(Self::ScheduleMeeting),
            "review_document" => Some(Self::ReviewDocument),
            "follow_up" => Some(Self::FollowUp),
            "archive" => Some(Self::Archive),
            "unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyTone {
    #[default]
    Professional,
    Friendly,
    Short,
}

impl ReplyTone {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "professional" => Some(Self::Professional),
            "friendly" => Some(Self::Friendly),
            "short" => Some(Self::Short),
            _ => None,
        }
    }
}

/// A calendar entry inferred from message text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedEvent {
    pub title: String,
    pub date: NaiveDate,
    pub description: String,
    pub email_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub priority: Priority,
    pub summary: String,
    pub sentiment: Sentiment,
    pub category: Category,
    pub suggested_actions: Vec<SuggestedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_event: Option<SuggestedEvent>,
}

/// Mailbox listing entry. Identity is the provider-assigned `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmailRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub from: String,
    pub subject: String,
    /// Raw `Date` header as sent by the provider.
    pub date: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
}

impl EmailRef {
    /// Merges a later fetch of the same message. Only fields that were absent
    /// before are filled in; present values are never replaced.
    pub fn absorb(&mut self, later: EmailRef) {
        if later.id != self.id {
            return;
        }
        if self.thread_id.is_none() {
            self.thread_id = later.thread_id;
        }
        if self.has_attachments.is_none() {
            self.has_attachments = later.has_attachments;
        }
        if self.label_ids.is_none() {
            self.label_ids = later.label_ids;
        }
        for (slot, value) in [
            (&mut self.from, later.from),
            (&mut self.subject, later.subject),
            (&mut self.date, later.date),
            (&mut self.snippet, later.snippet),
        ] {
            if slot.is_empty() {
                *slot = value;
            }
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids
            .as_ref()
            .is_some_and(|labels| labels.iter().any(|id| id == label))
    }

    pub fn to_analyze_input(&self) -> AnalyzeInput {
        AnalyzeInput {
            id: self.id.clone(),
            from: self.from.clone(),
            subject: self.subject.clone(),
            snippet: Some(self.snippet.clone()),
            body_text: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Safe,
    Warning,
    Unsafe,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanVerdict {
    pub status: ScanStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ScanVerdict {
    pub fn new(status: ScanStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub scan_status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_details: Option<Vec<String>>,
}

impl AttachmentMeta {
    pub fn pending(
        attachment_id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            size,
            scan_status: ScanStatus::Pending,
            scan_message: None,
            scan_details: None,
        }
    }

    pub fn is_scanned(&self) -> bool {
        self.scan_status != ScanStatus::Pending
    }

    /// Records a scan result. A settled status is kept unless `rescan` is set.
    /// Returns whether the verdict was applied.
    pub fn apply_verdict(&mut self, verdict: ScanVerdict, rescan: bool) -> bool {
        if self.is_scanned() && !rescan {
            return false;
        }
        self.scan_status = verdict.status;
        self.scan_message = Some(verdict.message);
        self.scan_details = verdict.details;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailDetail {
    #[serde(flatten)]
    pub reference: EmailRef,
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

impl EmailDetail {
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    pub fn to_analyze_input(&self) -> AnalyzeInput {
        AnalyzeInput {
            body_text: Some(self.body_text.clone()),
            ..self.reference.to_analyze_input()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyDraft {
    pub tone: ReplyTone,
    pub text: String,
}

/// Locally stored calendar entry accepted from a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShadowEvent {
    pub id: String,
    pub email_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub description: String,
}

impl ShadowEvent {
    pub fn from_suggestion(event: &SuggestedEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email_id: event.email_id.clone(),
            title: event.title.clone(),
            date: event.date,
            description: event.description.clone(),
        }
    }
}

/// Text handed to the triage and reply facades.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeInput {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub body_text: Option<String>,
}

impl AnalyzeInput {
    pub fn snippet(&self) -> &str {
        self.snippet.as_deref().unwrap_or_default()
    }

    pub fn body_text(&self) -> &str {
        self.body_text.as_deref().unwrap_or_default()
    }

    pub fn has_content(&self) -> bool {
        !self.subject.is_empty() || !self.snippet().is_empty() || !self.body_text().is_empty()
    }

    /// Truncates every field to its character cap.
    pub fn capped(mut self) -> Self {
        truncate_chars(&mut self.from, MAX_FROM_CHARS);
        truncate_chars(&mut self.subject, MAX_SUBJECT_CHARS);
        if let Some(snippet) = self.snippet.as_mut() {
            truncate_chars(snippet, MAX_SNIPPET_CHARS);
        }
        if let Some(body) = self.body_text.as_mut() {
            truncate_chars(body, MAX_BODY_CHARS);
        }
        self
    }

    /// The message block sent to the completion model.
    pub fn combined(&self) -> String {
        format!(
            "From: {}\nSubject: {}\n\n{}\n\n{}",
            self.from,
            self.subject,
            self.snippet(),
            self.body_text()
        )
    }
}

pub fn truncate_chars(value: &mut String, max_chars: usize) {
    if let Some((index, _)) = value.char_indices().nth(max_chars) {
        value.truncate(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_truncates_by_characters() {
        let input = AnalyzeInput {
            subject: "é".repeat(MAX_SUBJECT_CHARS + 10),
            snippet: Some("x".repeat(MAX_SNIPPET_CHARS)),
            ..AnalyzeInput::default()
        }
        .capped();

        assert_eq!(input.subject.chars().count(), MAX_SUBJECT_CHARS);
        assert_eq!(input.snippet().len(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn absorb_only_fills_missing_fields() {
        let mut first = EmailRef {
            id: "m1".to_string(),
            subject: "Hello".to_string(),
            ..EmailRef::default()
        };
        first.absorb(EmailRef {
            id: "m1".to_string(),
            subject: "Changed".to_string(),
            label_ids: Some(vec!["INBOX".to_string()]),
            ..EmailRef::default()
        });

        assert_eq!(first.subject, "Hello");
        assert!(first.has_label("INBOX"));
    }

    #[test]
    fn verdict_is_applied_once_unless_rescanned() {
        let mut meta = AttachmentMeta::pending("a1", "report.pdf", "application/pdf", 10);
        assert!(meta.apply_verdict(ScanVerdict::new(ScanStatus::Safe, "ok"), false));
        assert!(!meta.apply_verdict(ScanVerdict::new(ScanStatus::Unsafe, "bad"), false));
        assert_eq!(meta.scan_status, ScanStatus::Safe);
        assert!(meta.apply_verdict(ScanVerdict::new(ScanStatus::Warning, "again"), true));
        assert_eq!(meta.scan_status, ScanStatus::Warning);
    }

    #[test]
    fn analysis_uses_camel_case_wire_names() {
        let analysis = Analysis {
            priority: Priority::Low,
            summary: "s".to_string(),
            sentiment: Sentiment::Neutral,
            category: Category::General,
            suggested_actions: vec![SuggestedAction::NeedsReply],
            suggested_event: None,
        };
        let json = serde_json::to_value(&analysis).expect("serialize");
        assert_eq!(json["suggestedActions"][0], "needs_reply");
        assert!(json.get("suggestedEvent").is_none());
    }
}
