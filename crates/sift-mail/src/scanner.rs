use crate::MailError;
use async_trait::async_trait;
use serde::Deserialize;
use sift_config::ScannerConfig;
use sift_core::{AttachmentMeta, ScanStatus, ScanVerdict};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "scr", "bat", "cmd", "com", "pif", "msi", "msp", "vbs", "vbe", "js", "jse", "wsf",
    "wsh", "ps1", "psm1", "jar", "hta", "cpl", "dll", "reg", "lnk", "sh", "app", "scpt",
];

const DANGEROUS_MIME_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-ms-installer",
    "application/x-dosexec",
    "application/x-executable",
    "application/x-sh",
    "application/java-archive",
    "application/hta",
    "application/x-bat",
];

/// Archives can hide payloads and macro-enabled office files run code on open.
const SUSPICIOUS_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "tar", "gz", "tgz", "iso", "img", "docm", "xlsm", "pptm", "dotm", "xltm",
];

const EXECUTABLE_MAGIC: &[&[u8]] = &[b"MZ", b"\x7fELF"];

const SYNTHETIC_BASE: &str = "https://attachments.invalid/";

/// Lower-cased text after the last `.`, or an empty string.
pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// URL-shaped key under which a filename is looked up in the threat list.
pub fn synthetic_url(filename: &str) -> String {
    Url::parse(SYNTHETIC_BASE)
        .ok()
        .and_then(|mut url| {
            url.path_segments_mut().ok()?.clear().push(filename);
            Some(url.to_string())
        })
        .unwrap_or_else(|| format!("{SYNTHETIC_BASE}{filename}"))
}

/// Executable headers (PE or ELF) at the start of the content.
pub fn looks_executable(data: &[u8]) -> bool {
    EXECUTABLE_MAGIC.iter().any(|magic| data.starts_with(magic))
}

/// Refuses to fetch an attachment that has been scored unsafe.
pub fn guard_download(attachment: &AttachmentMeta) -> Result<(), MailError> {
    if attachment.scan_status == ScanStatus::Unsafe {
        tracing::warn!(filename = %attachment.filename, "blocked download of unsafe attachment");
        return Err(MailError::UnsafeAttachment {
            filename: attachment.filename.clone(),
        });
    }
    Ok(())
}

/// Remote threat list keyed by URL. Returns the matched threat types.
#[async_trait]
pub trait ThreatLookup: Send + Sync {
    async fn lookup(&self, urls: &[String]) -> Result<Vec<String>, MailError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatchesResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatch {
    threat_type: String,
}

#[derive(Clone)]
pub struct SafeBrowsingClient {
    endpoint: String,
    api_key: String,
    client_id: String,
    client_version: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for SafeBrowsingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeBrowsingClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl SafeBrowsingClient {
    pub fn new(config: &ScannerConfig, api_key: impl Into<String>) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.lookup_timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.safe_browsing_endpoint.clone(),
            api_key: api_key.into(),
            client_id: config.client_id.clone(),
            client_version: config.client_version.clone(),
            http,
        })
    }
}

#[async_trait]
impl ThreatLookup for SafeBrowsingClient {
    async fn lookup(&self, urls: &[String]) -> Result<Vec<String>, MailError> {
        let entries: Vec<_> = urls
            .iter()
            .map(|url| serde_json::json!({ "url": url }))
            .collect();
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "client": {
                    "clientId": self.client_id,
                    "clientVersion": self.client_version
                },
                "threatInfo": {
                    "threatTypes": [
                        "MALWARE",
                        "SOCIAL_ENGINEERING",
                        "UNWANTED_SOFTWARE",
                        "POTENTIALLY_HARMFUL_APPLICATION"
                    ],
                    "platformTypes": ["ANY_PLATFORM"],
                    "threatEntryTypes": ["URL"],
                    "threatEntries": entries
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Status {
                context: "threat lookup",
                status: response.status().as_u16(),
            });
        }

        let body: ThreatMatchesResponse = response.json().await?;
        let mut threats: Vec<String> = Vec::new();
        for threat in body.matches.into_iter().map(|m| m.threat_type) {
            if !threats.contains(&threat) {
                threats.push(threat);
            }
        }
        Ok(threats)
    }
}

#[derive(Clone, Default)]
pub struct AttachmentScanner {
    lookup: Option<Arc<dyn ThreatLookup>>,
}

impl AttachmentScanner {
    pub fn new(lookup: Option<Arc<dyn ThreatLookup>>) -> Self {
        Self { lookup }
    }

    /// Enables the remote lookup only when an API key is configured.
    pub fn from_config(config: &ScannerConfig) -> Self {
        let lookup = config
            .safe_browsing_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .and_then(|key| match SafeBrowsingClient::new(config, key) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn ThreatLookup>),
                Err(err) => {
                    tracing::warn!(error = %err, "threat lookup unavailable, scanning locally");
                    None
                }
            });
        Self { lookup }
    }

    pub fn has_remote_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// Scores an attachment. The first matching rule wins; a failed remote
    /// lookup never fails the scan. An attachment with no name, no type and
    /// no bytes cannot be evaluated and scores `error`.
    pub async fn scan(&self, filename: &str, mime_type: &str, data: Option<&[u8]>) -> ScanVerdict {
        let ext = extension_of(filename);
        let mime = mime_type.trim().to_ascii_lowercase();

        if filename.trim().is_empty() && mime.is_empty() && data.is_none() {
            return ScanVerdict::new(
                ScanStatus::Error,
                "Could not scan: the attachment has no name or type.",
            );
        }

        if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
            return ScanVerdict::new(
                ScanStatus::Unsafe,
                format!("Blocked: .{ext} files can run code on this computer."),
            );
        }
        if DANGEROUS_MIME_TYPES.contains(&mime.as_str()) {
            return ScanVerdict::new(
                ScanStatus::Unsafe,
                format!("Blocked: {mime} content is executable."),
            );
        }
        if let Some(bytes) = data {
            if looks_executable(bytes) {
                return ScanVerdict::new(
                    ScanStatus::Unsafe,
                    "Blocked: the file contents look like a program.",
                );
            }
        }

        if let Some(lookup) = self.lookup.as_ref() {
            match lookup.lookup(&[synthetic_url(filename)]).await {
                Ok(threats) if !threats.is_empty() => {
                    return ScanVerdict::new(
                        ScanStatus::Unsafe,
                        "Blocked: this file matches a known threat list.",
                    )
                    .with_details(threats);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        filename,
                        error = %err,
                        "threat lookup failed, using local rules only"
                    );
                }
            }
        }

        if SUSPICIOUS_EXTENSIONS.contains(&ext.as_str()) {
            return ScanVerdict::new(
                ScanStatus::Warning,
                format!(
                    "Caution: .{ext} files can hide other content. \
                     Open only if you trust the sender."
                ),
            );
        }

        ScanVerdict::new(ScanStatus::Safe, "No known risks found.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingLookup {
        calls: AtomicUsize,
        result: Result<Vec<String>, u16>,
        seen: Mutex<Vec<String>>,
    }

    impl CountingLookup {
        fn new(result: Result<Vec<String>, u16>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ThreatLookup for CountingLookup {
        async fn lookup(&self, urls: &[String]) -> Result<Vec<String>, MailError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().expect("lock").extend(urls.iter().cloned());
            match &self.result {
                Ok(threats) => Ok(threats.clone()),
                Err(status) => Err(MailError::Status {
                    context: "threat lookup",
                    status: *status,
                }),
            }
        }
    }

    #[tokio::test]
    async fn executable_is_unsafe_without_lookup() {
        let lookup = CountingLookup::new(Ok(Vec::new()));
        let scanner = AttachmentScanner::new(Some(lookup.clone()));

        let verdict = scanner.scan("Invoice.PDF.exe", "application/pdf", None).await;

        assert_eq!(verdict.status, ScanStatus::Unsafe);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dangerous_mime_and_magic_bytes_are_unsafe() {
        let scanner = AttachmentScanner::default();
        let by_mime = scanner.scan("setup", "application/x-msdownload", None).await;
        let by_magic = scanner
            .scan("notes.bin", "application/octet-stream", Some(b"MZ\x90\x00"))
            .await;

        assert_eq!(by_mime.status, ScanStatus::Unsafe);
        assert_eq!(by_magic.status, ScanStatus::Unsafe);
    }

    #[tokio::test]
    async fn lookup_match_carries_threat_types() {
        let lookup = CountingLookup::new(Ok(vec!["MALWARE".to_string()]));
        let scanner = AttachmentScanner::new(Some(lookup.clone()));

        let verdict = scanner.scan("report q3.pdf", "application/pdf", None).await;

        assert_eq!(verdict.status, ScanStatus::Unsafe);
        assert_eq!(verdict.details, Some(vec!["MALWARE".to_string()]));
        assert_eq!(
            *lookup.seen.lock().expect("lock"),
            vec!["https://attachments.invalid/report%20q3.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn lookup_failure_falls_through_to_local_rules() {
        let scanner = AttachmentScanner::new(Some(CountingLookup::new(Err(503))));
        let archive = scanner.scan("photos.zip", "application/zip", None).await;
        let document = scanner.scan("notes.txt", "text/plain", None).await;

        assert_eq!(archive.status, ScanStatus::Warning);
        assert_eq!(document.status, ScanStatus::Safe);
    }

    #[tokio::test]
    async fn macro_documents_warn() {
        let verdict = AttachmentScanner::default()
            .scan("budget.xlsm", "application/vnd.ms-excel.sheet.macroEnabled.12", None)
            .await;
        assert_eq!(verdict.status, ScanStatus::Warning);
    }

    #[tokio::test]
    async fn nameless_untyped_attachment_cannot_be_scanned() {
        let lookup = CountingLookup::new(Ok(Vec::new()));
        let scanner = AttachmentScanner::new(Some(lookup.clone()));

        let blank = scanner.scan("  ", "", None).await;
        let with_bytes = scanner.scan("", "", Some(b"%PDF-1.7")).await;

        assert_eq!(blank.status, ScanStatus::Error);
        assert_eq!(with_bytes.status, ScanStatus::Safe);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        let mut attachment = AttachmentMeta::pending("a1", "", "", 0);
        attachment.apply_verdict(blank, false);
        assert!(attachment.is_scanned());
        assert!(guard_download(&attachment).is_ok());
    }

    #[test]
    fn guard_blocks_only_unsafe() {
        let mut attachment =
            AttachmentMeta::pending("a1", "tool.exe", "application/octet-stream", 10);
        assert!(guard_download(&attachment).is_ok());

        attachment.apply_verdict(ScanVerdict::new(ScanStatus::Unsafe, "blocked"), false);
        assert!(matches!(
            guard_download(&attachment),
            Err(MailError::UnsafeAttachment { filename }) if filename == "tool.exe"
        ));

        attachment.apply_verdict(ScanVerdict::new(ScanStatus::Warning, "careful"), true);
        assert!(guard_download(&attachment).is_ok());
    }

    #[test]
    fn extension_is_lowercased_suffix() {
        assert_eq!(extension_of("Archive.TAR.GZ"), "gz");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn scanner_without_key_has_no_lookup() {
        let scanner = AttachmentScanner::from_config(&ScannerConfig::default());
        assert!(!scanner.has_remote_lookup());
    }
}
