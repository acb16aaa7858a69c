use serde::{Deserialize, Serialize};
use sift_core::{
    Analysis, Category, EmailDetail, EmailRef, Priority, ReplyDraft, ReplyTone, Sentiment,
    ShadowEvent,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailFilter {
    #[default]
    All,
    High,
    Medium,
    Low,
    Archived,
}

impl EmailFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    fn priority(self) -> Option<Priority> {
        match self {
            Self::High => Some(Priority::High),
            Self::Medium => Some(Priority::Medium),
            Self::Low => Some(Priority::Low),
            Self::All | Self::Archived => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCounts {
    fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub urgent: usize,
    pub promotional: usize,
    pub social: usize,
    pub updates: usize,
    pub personal: usize,
    pub general: usize,
}

impl CategoryCounts {
    fn record(&mut self, category: Category) {
        match category {
            Category::Urgent => self.urgent += 1,
            Category::Promotional => self.promotional += 1,
            Category::Social => self.social += 1,
            Category::Updates => self.updates += 1,
            Category::Personal => self.personal += 1,
            Category::General => self.general += 1,
        }
    }
}

/// Mailbox statistics. Every message lands in exactly one of the priority,
/// `archived` or `unanalyzed` buckets; the sentiment and category breakdowns
/// cover every analyzed message, archived ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MailStats {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub archived: usize,
    pub unanalyzed: usize,
    pub total: usize,
    pub sentiment: SentimentCounts,
    pub category: CategoryCounts,
}

/// Everything known about one mailbox during a session. Nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct MailStore {
    emails: Vec<EmailRef>,
    details: HashMap<String, EmailDetail>,
    analyses: HashMap<String, Analysis>,
    drafts: HashMap<String, ReplyDraft>,
    archived: Vec<String>,
    shadow_events: Vec<ShadowEvent>,
    filter: EmailFilter,
    selected: Option<String>,
}

impl MailStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds messages not seen before and returns them. A repeated id only
    /// fills in fields the stored copy is missing.
    pub fn append(&mut self, batch: &[EmailRef]) -> Vec<EmailRef> {
        let mut added = Vec::new();
        for email in batch {
            match self.emails.iter_mut().find(|known| known.id == email.id) {
                Some(known) => known.absorb(email.clone()),
                None => {
                    self.emails.push(email.clone());
                    added.push(email.clone());
                }
            }
        }
        added
    }

    pub fn emails(&self) -> &[EmailRef] {
        &self.emails
    }

    pub fn email(&self, id: &str) -> Option<&EmailRef> {
        self.emails.iter().find(|email| email.id == id)
    }

    pub fn detail(&self, id: &str) -> Option<&EmailDetail> {
        self.details.get(id)
    }

    pub fn detail_mut(&mut self, id: &str) -> Option<&mut EmailDetail> {
        self.details.get_mut(id)
    }

    pub fn upsert_detail(&mut self, detail: EmailDetail) {
        self.append(std::slice::from_ref(&detail.reference));
        self.details.insert(detail.id().to_string(), detail);
    }

    pub fn analysis(&self, id: &str) -> Option<&Analysis> {
        self.analyses.get(id)
    }

    /// Stores the first analysis for a message; later ones are ignored.
    pub fn set_analysis_once(&mut self, id: &str, analysis: Analysis) -> bool {
        if self.analyses.contains_key(id) {
            return false;
        }
        self.analyses.insert(id.to_string(), analysis);
        true
    }

    pub fn draft(&self, id: &str) -> Option<&ReplyDraft> {
        self.drafts.get(id)
    }

    pub fn set_draft(&mut self, id: &str, tone: ReplyTone, text: impl Into<String>) {
        self.drafts.insert(
            id.to_string(),
            ReplyDraft {
                tone,
                text: text.into(),
            },
        );
    }

    pub fn clear_draft(&mut self, id: &str) {
        if let Some(draft) = self.drafts.get_mut(id) {
            draft.text.clear();
        }
    }

    pub fn archive(&mut self, id: &str) {
        if !self.is_archived(id) {
            self.archived.push(id.to_string());
        }
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
    }

    /// Adds or removes one label on a stored message. Returns false for an
    /// unknown id.
    pub fn set_label(&mut self, id: &str, label: &str, present: bool) -> bool {
        let Some(email) = self.emails.iter_mut().find(|email| email.id == id) else {
            return false;
        };
        let labels = email.label_ids.get_or_insert_with(Vec::new);
        labels.retain(|known| known != label);
        if present {
            labels.push(label.to_string());
        }
        true
    }

    pub fn is_archived(&self, id: &str) -> bool {
        self.archived.iter().any(|archived| archived == id)
    }

    pub fn shadow_events(&self) -> &[ShadowEvent] {
        &self.shadow_events
    }

    /// At most one event is kept per message; accepting again returns the
    /// event already stored.
    pub fn add_shadow_event(&mut self, event: ShadowEvent) -> ShadowEvent {
        if let Some(existing) = self
            .shadow_events
            .iter()
            .find(|known| known.email_id == event.email_id)
        {
            return existing.clone();
        }
        self.shadow_events.push(event.clone());
        event
    }

    pub fn filter(&self) -> EmailFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: EmailFilter) {
        self.filter = filter;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, id: Option<&str>) {
        self.selected = id.map(str::to_string);
    }

    /// Messages shown under the current filter. Archived messages appear only
    /// under [`EmailFilter::Archived`]; priority filters skip unanalyzed ones.
    pub fn visible_emails(&self) -> Vec<&EmailRef> {
        self.emails
            .iter()
            .filter(|email| match self.filter {
                EmailFilter::Archived => self.is_archived(&email.id),
                EmailFilter::All => !self.is_archived(&email.id),
                filter => {
                    !self.is_archived(&email.id)
                        && self.analysis(&email.id).map(|analysis| analysis.priority)
                            == filter.priority()
                }
            })
            .collect()
    }

    pub fn stats(&self) -> MailStats {
        let mut stats = MailStats {
            total: self.emails.len(),
            ..MailStats::default()
        };
        for email in &self.emails {
            let analysis = self.analysis(&email.id);
            if self.is_archived(&email.id) {
                stats.archived += 1;
            } else {
                match analysis.map(|analysis| analysis.priority) {
                    Some(Priority::High) => stats.high += 1,
                    Some(Priority::Medium) => stats.medium += 1,
                    Some(Priority::Low) => stats.low += 1,
                    None => stats.unanalyzed += 1,
                }
            }

            if let Some(analysis) = analysis {
                stats.sentiment.record(analysis.sentiment);
                stats.category.record(analysis.category);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sift_core::{SuggestedAction, SuggestedEvent};

    fn email(id: &str) -> EmailRef {
        EmailRef {
            id: id.to_string(),
            subject: format!("Subject {id}"),
            ..EmailRef::default()
        }
    }

    fn analysis(priority: Priority) -> Analysis {
        Analysis {
            priority,
            summary: "s".to_string(),
            sentiment: Sentiment::Neutral,
            category: Category::General,
            suggested_actions: vec![SuggestedAction::FollowUp],
            suggested_event: None,
        }
    }

    #[test]
    fn append_skips_known_ids_and_fills_gaps() {
        let mut store = MailStore::new();
        assert_eq!(store.append(&[email("a"), email("b")]).len(), 2);

        let mut repeat = email("a");
        repeat.subject = "Changed".to_string();
        repeat.snippet = "late snippet".to_string();
        let added = store.append(&[repeat, email("c")]);

        assert_eq!(added.len(), 1);
        assert_eq!(store.emails().len(), 3);
        let a = store.email("a").expect("stored");
        assert_eq!(a.subject, "Subject a");
        assert_eq!(a.snippet, "late snippet");
    }

    #[test]
    fn first_analysis_wins() {
        let mut store = MailStore::new();
        assert!(store.set_analysis_once("a", analysis(Priority::High)));
        assert!(!store.set_analysis_once("a", analysis(Priority::Low)));
        assert_eq!(store.analysis("a").map(|a| a.priority), Some(Priority::High));
    }

    #[test]
    fn filters_respect_priority_and_archive() {
        let mut store = MailStore::new();
        store.append(&[email("a"), email("b"), email("c"), email("d")]);
        store.set_analysis_once("a", analysis(Priority::High));
        store.set_analysis_once("b", analysis(Priority::Low));
        store.set_analysis_once("c", analysis(Priority::High));
        store.select(Some("c"));
        store.archive("c");

        let ids = |store: &MailStore| {
            store
                .visible_emails()
                .iter()
                .map(|email| email.id.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(&store), vec!["a", "b", "d"]);
        store.set_filter(EmailFilter::High);
        assert_eq!(ids(&store), vec!["a"]);
        store.set_filter(EmailFilter::Archived);
        assert_eq!(ids(&store), vec!["c"]);
        assert_eq!(store.selected(), None);
    }

    #[test]
    fn stats_bucket_archived_and_unanalyzed_separately() {
        let mut store = MailStore::new();
        store.append(&[email("a"), email("b"), email("c"), email("d"), email("e")]);
        store.set_analysis_once("a", analysis(Priority::High));
        store.set_analysis_once(
            "b",
            Analysis {
                sentiment: Sentiment::Positive,
                category: Category::Promotional,
                ..analysis(Priority::Low)
            },
        );
        store.set_analysis_once(
            "c",
            Analysis {
                sentiment: Sentiment::Negative,
                category: Category::Urgent,
                ..analysis(Priority::High)
            },
        );
        store.archive("c");
        store.archive("d");

        let stats = store.stats();

        assert_eq!(
            (stats.high, stats.medium, stats.low, stats.archived, stats.unanalyzed),
            (1, 0, 1, 2, 1)
        );
        assert_eq!(stats.total, 5);
        assert_eq!(
            stats.sentiment,
            SentimentCounts {
                positive: 1,
                neutral: 1,
                negative: 1,
            }
        );
        assert_eq!(
            stats.category,
            CategoryCounts {
                urgent: 1,
                promotional: 1,
                general: 1,
                ..CategoryCounts::default()
            }
        );
    }

    #[test]
    fn shadow_event_is_kept_once_per_email() {
        let mut store = MailStore::new();
        let suggestion = SuggestedEvent {
            title: "Kickoff".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).expect("date"),
            description: "call".to_string(),
            email_id: "a".to_string(),
        };

        let first = store.add_shadow_event(ShadowEvent::from_suggestion(&suggestion));
        let second = store.add_shadow_event(ShadowEvent::from_suggestion(&suggestion));

        assert_eq!(first.id, second.id);
        assert_eq!(store.shadow_events().len(), 1);
    }

    #[test]
    fn cleared_draft_keeps_tone() {
        let mut store = MailStore::new();
        store.set_draft("a", ReplyTone::Friendly, "hey");
        store.clear_draft("a");
        let draft = store.draft("a").expect("draft");
        assert_eq!(draft.tone, ReplyTone::Friendly);
        assert!(draft.text.is_empty());
    }

    #[test]
    fn filter_parses_wire_names() {
        assert_eq!(EmailFilter::parse("Archived"), Some(EmailFilter::Archived));
        assert_eq!(EmailFilter::parse("urgent"), None);
    }
}
