use crate::signals::{
    count_present, matches_any, DOCUMENT_PHRASES, FOLLOW_UP_PHRASES, HIGH_SIGNALS,
    MARKETING_SENDERS, MEDIUM_SIGNALS, MEETING_PHRASES, NEGATIVE_SIGNALS, NO_REPLY_SENDERS,
    POSITIVE_SIGNALS, PROMO_SIGNALS, REPLY_REQUEST_PHRASES, SOCIAL_SENDERS, SOCIAL_SIGNALS,
    UPDATE_SIGNALS, WEBMAIL_DOMAINS,
};
use chrono::{Datelike, Days, Local, NaiveDate};
use regex::Regex;
use sift_core::{
    Analysis, AnalyzeInput, Category, Priority, Sentiment, SuggestedAction, SuggestedEvent,
};

const SUMMARY_MAX_CHARS: usize = 160;
const DEFAULT_EVENT_TITLE: &str = "Scheduled Meeting";
const EVENT_DESCRIPTION: &str = "Detected a scheduling request.";

/// Keyword triage of a message, evaluated against the local calendar date.
pub fn classify(input: &AnalyzeInput) -> Analysis {
    classify_on(input, Local::now().date_naive())
}

/// Keyword triage with an explicit "today" used for relative dates.
pub fn classify_on(input: &AnalyzeInput, today: NaiveDate) -> Analysis {
    let from = input.from.to_lowercase();
    let text = format!(
        "{}\n{}\n{}\n{}",
        input.from,
        input.subject,
        input.snippet(),
        input.body_text()
    )
    .to_lowercase();

    let priority = priority_of(&text);

    Analysis {
        priority,
        summary: summarize(input),
        sentiment: sentiment_of(&text),
        category: category_of(&text, &from),
        suggested_actions: actions_for(&text, priority),
        suggested_event: suggest_event(input, &text, today),
    }
}

pub fn priority_of(text: &str) -> Priority {
    if matches_any(text, HIGH_SIGNALS) {
        Priority::High
    } else if matches_any(text, MEDIUM_SIGNALS) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn sentiment_of(text: &str) -> Sentiment {
    let positive = count_present(text, POSITIVE_SIGNALS);
    let negative = count_present(text, NEGATIVE_SIGNALS);
    match negative.cmp(&positive) {
        std::cmp::Ordering::Greater => Sentiment::Negative,
        std::cmp::Ordering::Less => Sentiment::Positive,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

fn category_of(text: &str, from: &str) -> Category {
    if matches_any(text, HIGH_SIGNALS) {
        Category::Urgent
    } else if matches_any(text, PROMO_SIGNALS) || matches_any(from, MARKETING_SENDERS) {
        Category::Promotional
    } else if matches_any(text, SOCIAL_SIGNALS) || matches_any(from, SOCIAL_SENDERS) {
        Category::Social
    } else if matches_any(text, UPDATE_SIGNALS) || matches_any(from, NO_REPLY_SENDERS) {
        Category::Updates
    } else if matches_any(from, WEBMAIL_DOMAINS) {
        Category::Personal
    } else {
        Category::General
    }
}

fn actions_for(text: &str, priority: Priority) -> Vec<SuggestedAction> {
    let mut actions: Vec<SuggestedAction> = Vec::new();
    let mut push = |action: SuggestedAction| {
        if !actions.contains(&action) {
            actions.push(action);
        }
    };

    if text.contains('?') || matches_any(text, REPLY_REQUEST_PHRASES) {
        push(SuggestedAction::NeedsReply);
    }
    if matches_any(text, MEETING_PHRASES) {
        push(SuggestedAction::ScheduleMeeting);
    }
    if matches_any(text, DOCUMENT_PHRASES) {
        push(SuggestedAction::ReviewDocument);
    }
    if matches_any(text, FOLLOW_UP_PHRASES) {
        push(SuggestedAction::FollowUp);
    }
    if priority == Priority::Low {
        if matches_any(text, PROMO_SIGNALS) {
            push(SuggestedAction::Unsubscribe);
        }
        push(SuggestedAction::Archive);
    }

    // Low priority always yields `archive` above, so an empty list here is
    // a high or medium message with nothing else to do but keep track of it.
    if actions.is_empty() {
        actions.push(SuggestedAction::FollowUp);
    }
    actions
}

fn summarize(input: &AnalyzeInput) -> String {
    let source = [input.snippet(), input.body_text(), input.subject.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty());

    match source {
        Some(text) if text.chars().count() > SUMMARY_MAX_CHARS => {
            let mut summary: String = text.chars().take(SUMMARY_MAX_CHARS - 3).collect();
            summary.push('…');
            summary
        }
        Some(text) => text.to_string(),
        None => "(no content)".to_string(),
    }
}

fn suggest_event(input: &AnalyzeInput, text: &str, today: NaiveDate) -> Option<SuggestedEvent> {
    let mentions_tomorrow = text.contains("tomorrow");
    let mentions_monday = text.contains("monday");
    if !matches_any(text, MEDIUM_SIGNALS) && !mentions_tomorrow && !mentions_monday {
        return None;
    }

    let date = if mentions_tomorrow {
        today + Days::new(1)
    } else if mentions_monday {
        next_monday(today)
    } else {
        today
    };

    Some(SuggestedEvent {
        title: event_title(&input.subject),
        date,
        description: EVENT_DESCRIPTION.to_string(),
        email_id: input.id.clone(),
    })
}

/// The first Monday strictly after `today`.
pub fn next_monday(today: NaiveDate) -> NaiveDate {
    let offset = 7 - u64::from(today.weekday().num_days_from_monday());
    today + Days::new(offset)
}

fn event_title(subject: &str) -> String {
    let stripped = Regex::new(r"(?i)^\s*(?:(?:re|fwd?)\s*:\s*)+")
        .ok()
        .map(|re| re.replace(subject, "").into_owned())
        .unwrap_or_else(|| subject.to_string());
    let title = stripped.trim();

    if title.is_empty() {
        DEFAULT_EVENT_TITLE.to_string()
    } else {
        title.to_string()
    }
}
