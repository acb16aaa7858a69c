use crate::classifier::classify;
use crate::provider::{
    CompletionProvider, CompletionRequest, OpenAiCompatibleProvider, RetryingProvider,
};
use crate::repair::{parse_json_object, UnvalidatedAnalysis};
use sift_config::AiConfig;
use sift_core::{Analysis, AnalyzeInput, ReplyTone};
use std::sync::Arc;

const TRIAGE_SYSTEM_PROMPT: &str = "You are an email triage engine. Return ONLY valid JSON with exactly these keys: \
priority (\"high\"|\"medium\"|\"low\"), summary (1-2 sentences), \
sentiment (\"positive\"|\"neutral\"|\"negative\"), \
category (\"urgent\"|\"promotional\"|\"social\"|\"updates\"|\"personal\"|\"general\"), \
suggestedActions (non-empty array of \"needs_reply\"|\"schedule_meeting\"|\"review_document\"|\"follow_up\"|\"archive\"|\"unsubscribe\"), \
suggestedEvent (null or {\"title\", \"date\" as YYYY-MM-DD, \"description\"}). No extra keys.";

const REPLY_SYSTEM_PROMPT: &str = "You draft email replies. Return ONLY valid JSON with key \"reply\" \
(a complete email reply body). No extra keys. Do not claim you performed actions you did not do.";

/// Post-processing applied to every drafted reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyPolicy {
    pub required_phrase: Option<String>,
}

impl ReplyPolicy {
    pub fn apply(&self, reply: String) -> String {
        let Some(phrase) = self
            .required_phrase
            .as_deref()
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
        else {
            return reply;
        };

        if reply.to_lowercase().contains(&phrase.to_lowercase()) {
            reply
        } else {
            format!("{}\n\n{phrase}", reply.trim_end())
        }
    }
}

#[derive(Clone)]
pub struct AiService {
    provider: Option<Arc<dyn CompletionProvider>>,
    analyze_temperature: f32,
    reply_temperature: f32,
    reply_policy: ReplyPolicy,
}

impl AiService {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        Self {
            provider,
            analyze_temperature: 0.2,
            reply_temperature: 0.4,
            reply_policy: ReplyPolicy::default(),
        }
    }

    /// Answers everything from the keyword classifier and reply templates.
    pub fn heuristic_only() -> Self {
        Self::new(None)
    }

    /// Uses the configured completion endpoint when an API key is present.
    pub fn from_config(config: &AiConfig) -> Self {
        let provider: Option<Arc<dyn CompletionProvider>> = match config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => match OpenAiCompatibleProvider::new(config) {
                Ok(provider) => Some(Arc::new(RetryingProvider::new(
                    provider,
                    config.retry.clone(),
                ))),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "completion provider unavailable, using heuristics"
                    );
                    None
                }
            },
            _ => None,
        };

        Self {
            provider,
            analyze_temperature: config.analyze_temperature,
            reply_temperature: config.reply_temperature,
            reply_policy: ReplyPolicy {
                required_phrase: config.required_reply_phrase.clone(),
            },
        }
    }

    pub fn with_reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.reply_policy = policy;
        self
    }

    pub fn is_remote(&self) -> bool {
        self.provider.is_some()
    }

    /// Triage a message. Never fails: invalid model fields are repaired one by
    /// one from the heuristic result, and any call or parse failure returns
    /// the heuristic result unchanged.
    pub async fn analyze(&self, input: &AnalyzeInput) -> Analysis {
        let heuristic = classify(input);
        let Some(provider) = self.provider.as_ref() else {
            return heuristic;
        };

        let request = CompletionRequest {
            system: TRIAGE_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Analyze this email and classify strictly.\n\n{}",
                input.combined()
            ),
            temperature: self.analyze_temperature,
        };

        match provider.complete(request).await {
            Ok(text) => match parse_json_object(&text) {
                Some(value) => {
                    UnvalidatedAnalysis::from_value(value).validate(&input.id, heuristic)
                }
                None => {
                    tracing::warn!(email_id = %input.id, "triage response was not a JSON object");
                    heuristic
                }
            },
            Err(err) => {
                tracing::warn!(
                    email_id = %input.id,
                    error = %err,
                    "triage call failed, using heuristics"
                );
                heuristic
            }
        }
    }

    /// Draft a reply body in the given tone. Never fails: falls back to a
    /// tone-specific template.
    pub async fn draft_reply(&self, tone: ReplyTone, email: &AnalyzeInput) -> String {
        let remote = match self.provider.as_ref() {
            Some(provider) => self.remote_reply(provider.as_ref(), tone, email).await,
            None => None,
        };

        self.reply_policy
            .apply(remote.unwrap_or_else(|| fallback_reply(tone)))
    }

    async fn remote_reply(
        &self,
        provider: &dyn CompletionProvider,
        tone: ReplyTone,
        email: &AnalyzeInput,
    ) -> Option<String> {
        let request = CompletionRequest {
            system: REPLY_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Write a reply in a {} tone. Keep it human and helpful.\n\nEMAIL:\n{}",
                tone_instruction(tone),
                email.combined()
            ),
            temperature: self.reply_temperature,
        };

        let text = match provider.complete(request).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    email_id = %email.id,
                    error = %err,
                    "reply call failed, using template"
                );
                return None;
            }
        };

        let reply = parse_json_object(&text)
            .as_ref()
            .and_then(|value| value.get("reply"))
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|reply| !reply.is_empty())
            .map(str::to_string);
        if reply.is_none() {
            tracing::warn!(email_id = %email.id, "reply response had no usable `reply` field");
        }
        reply
    }
}

pub fn tone_instruction(tone: ReplyTone) -> &'static str {
    match tone {
        ReplyTone::Professional => "professional, clear, formal",
        ReplyTone::Friendly => "friendly, warm, casual",
        ReplyTone::Short => "very concise, direct, minimal",
    }
}

/// Deterministic reply used whenever no model answer is available.
pub fn fallback_reply(tone: ReplyTone) -> String {
    let opener = match tone {
        ReplyTone::Friendly => "Hey",
        ReplyTone::Professional | ReplyTone::Short => "Hi",
    };
    let closer = match tone {
        ReplyTone::Short => "Thanks.",
        ReplyTone::Friendly => "Thanks so much!",
        ReplyTone::Professional => "Thank you.",
    };

    format!(
        "{opener},\n\nThanks for the note. I've reviewed this and will follow up with the next steps shortly.\n\n{closer}\n"
    )
}
