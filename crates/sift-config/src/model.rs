use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub version: u32,
    pub server: ServerConfig,
    pub ai: AiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    /// Presence of a key selects the remote model; without one every
    /// request is answered by the heuristic classifier.
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub analyze_temperature: f32,
    pub reply_temperature: f32,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Phrase every drafted reply must contain.
    #[serde(default)]
    pub required_reply_phrase: Option<String>,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("analyze_temperature", &self.analyze_temperature)
            .field("reply_temperature", &self.reply_temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field("required_reply_phrase", &self.required_reply_phrase)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    pub page_size: u32,
    pub recency_months: u32,
    pub gmail_api_base: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            recency_months: 3,
            gmail_api_base: "https://gmail.googleapis.com/gmail/v1/users/me".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScannerConfig {
    pub safe_browsing_api_key: Option<String>,
    pub safe_browsing_endpoint: String,
    pub client_id: String,
    pub client_version: String,
    pub lookup_timeout_secs: u64,
}

impl std::fmt::Debug for ScannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerConfig")
            .field(
                "safe_browsing_api_key",
                &self.safe_browsing_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("safe_browsing_endpoint", &self.safe_browsing_endpoint)
            .field("client_id", &self.client_id)
            .field("client_version", &self.client_version)
            .field("lookup_timeout_secs", &self.lookup_timeout_secs)
            .finish()
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            safe_browsing_api_key: None,
            safe_browsing_endpoint: "https://safebrowsing.googleapis.com/v4/threatMatches:find"
                .to_string(),
            client_id: "sift".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            lookup_timeout_secs: 5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 8787,
                body_limit_bytes: 1024 * 1024,
            },
            ai: AiConfig {
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                analyze_temperature: 0.2,
                reply_temperature: 0.4,
                request_timeout_secs: 30,
                retry: RetryConfig::default(),
                required_reply_phrase: None,
            },
            sync: SyncConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}
