use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use sift_core::{Analysis, Category, Priority, Sentiment, SuggestedAction, SuggestedEvent};

/// Parses model output as a JSON object. Falls back to the slice between the
/// first `{` and the last `}` when the text carries extra prose around it.
pub fn parse_json_object(text: &str) -> Option<Value> {
    let direct = serde_json::from_str::<Value>(text.trim()).ok();
    if let Some(value @ Value::Object(_)) = direct {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Model output before any field has been checked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnvalidatedAnalysis {
    #[serde(default)]
    pub priority: Option<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
    #[serde(default)]
    pub sentiment: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub suggested_actions: Option<Value>,
    #[serde(default)]
    pub suggested_event: Option<Value>,
}

impl UnvalidatedAnalysis {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Keeps every field that checks out and takes the rest from `fallback`.
    /// `email_id` is stamped on any accepted event.
    pub fn validate(self, email_id: &str, fallback: Analysis) -> Analysis {
        Analysis {
            priority: enum_field(self.priority, Priority::parse).unwrap_or(fallback.priority),
            summary: self
                .summary
                .as_ref()
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|summary| !summary.is_empty())
                .map(str::to_string)
                .unwrap_or(fallback.summary),
            sentiment: enum_field(self.sentiment, Sentiment::parse).unwrap_or(fallback.sentiment),
            category: enum_field(self.category, Category::parse).unwrap_or(fallback.category),
            suggested_actions: actions_field(self.suggested_actions)
                .unwrap_or(fallback.suggested_actions),
            suggested_event: self
                .suggested_event
                .and_then(|value| event_field(&value, email_id))
                .or(fallback.suggested_event),
        }
    }
}

fn enum_field<T>(value: Option<Value>, parse: fn(&str) -> Option<T>) -> Option<T> {
    value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|raw| parse(raw.trim().to_ascii_lowercase().as_str()))
}

fn actions_field(value: Option<Value>) -> Option<Vec<SuggestedAction>> {
    let items = value?.as_array()?.clone();
    let mut actions = Vec::new();
    for action in items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(SuggestedAction::parse)
    {
        if !actions.contains(&action) {
            actions.push(action);
        }
    }

    if actions.is_empty() {
        None
    } else {
        Some(actions)
    }
}

/// A model-proposed event is kept only when it is complete.
fn event_field(value: &Value, email_id: &str) -> Option<SuggestedEvent> {
    let title = value.get("title")?.as_str()?.trim();
    let description = value.get("description")?.as_str()?.trim();
    let date = value.get("date")?.as_str()?;
    let date = NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d").ok()?;
    if title.is_empty() {
        return None;
    }

    Some(SuggestedEvent {
        title: title.to_string(),
        date,
        description: description.to_string(),
        email_id: email_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fallback() -> Analysis {
        Analysis {
            priority: Priority::Low,
            summary: "fallback".to_string(),
            sentiment: Sentiment::Neutral,
            category: Category::General,
            suggested_actions: vec![SuggestedAction::Archive],
            suggested_event: None,
        }
    }

    #[test]
    fn recovers_object_wrapped_in_noise() {
        let text = r#"noise{"priority":"high","summary":"x","sentiment":"negative","category":"urgent","suggestedActions":["needs_reply"]}trailing"#;
        let value = parse_json_object(text).expect("object recovered");
        let analysis = UnvalidatedAnalysis::from_value(value).validate("m-1", fallback());

        assert_eq!(analysis.priority, Priority::High);
        assert_eq!(analysis.summary, "x");
        assert_eq!(analysis.sentiment, Sentiment::Negative);
        assert_eq!(analysis.category, Category::Urgent);
        assert_eq!(analysis.suggested_actions, vec![SuggestedAction::NeedsReply]);
    }

    #[test]
    fn rejects_text_without_an_object() {
        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("} backwards {").is_none());
        assert!(parse_json_object("[1, 2]").is_none());
    }

    #[test]
    fn bad_fields_are_repaired_independently() {
        let raw = json!({
            "priority": "critical",
            "summary": 42,
            "sentiment": "positive",
            "category": "general",
            "suggestedActions": ["dance", "archive", "archive"]
        });
        let analysis = UnvalidatedAnalysis::from_value(raw).validate("m-1", fallback());

        assert_eq!(analysis.priority, Priority::Low);
        assert_eq!(analysis.summary, "fallback");
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(analysis.suggested_actions, vec![SuggestedAction::Archive]);
    }

    #[test]
    fn incomplete_event_falls_back_to_heuristic() {
        let raw = json!({ "suggestedEvent": {"title": "Kickoff", "date": "next week"} });
        let analysis = UnvalidatedAnalysis::from_value(raw).validate("m-1", fallback());
        assert!(analysis.suggested_event.is_none());
    }

    #[test]
    fn unknown_only_actions_fall_back() {
        let raw = json!({ "suggestedActions": ["dance"] });
        let mut heuristic = fallback();
        heuristic.suggested_actions = vec![SuggestedAction::FollowUp];
        let analysis = UnvalidatedAnalysis::from_value(raw).validate("m-1", heuristic);
        assert_eq!(analysis.suggested_actions, vec![SuggestedAction::FollowUp]);
    }

    #[test]
    fn remote_event_is_stamped_with_email_id() {
        let raw = json!({
            "suggestedEvent": {"title": "Kickoff", "date": "2024-02-03T10:00:00Z", "description": "call"}
        });
        let event = UnvalidatedAnalysis::from_value(raw)
            .validate("m-9", fallback())
            .suggested_event
            .expect("event kept");

        assert_eq!(event.title, "Kickoff");
        assert_eq!(event.email_id, "m-9");
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2024, 2, 3).expect("date"));
    }
}
