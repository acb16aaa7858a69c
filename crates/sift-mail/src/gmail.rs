use crate::{MailError, MailboxProvider, MessagePage, OutgoingMail, PageQuery};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use regex::Regex;
use serde::Deserialize;
use sift_config::SyncConfig;
use sift_core::{AttachmentMeta, EmailDetail, EmailRef};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    payload: Option<GmailPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    filename: Option<String>,
    headers: Option<Vec<GmailHeader>>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    attachment_id: Option<String>,
    size: Option<u64>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailAttachmentResponse {
    data: Option<String>,
}

/// An inline image referenced from the html body as `cid:<content_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InlineImage {
    content_id: String,
    mime_type: String,
    attachment_id: Option<String>,
    data: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    base: String,
    http: reqwest::Client,
}

impl GmailClient {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_base(config.gmail_api_base.clone())
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_message(
        &self,
        token: &str,
        id: &str,
        query: &[(&str, &str)],
        context: &'static str,
    ) -> Result<GmailMessage, MailError> {
        let response = self
            .http
            .get(format!("{}/messages/{id}", self.base))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Status {
                context,
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn post_json(
        &self,
        token: &str,
        path: &str,
        body: serde_json::Value,
        context: &'static str,
    ) -> Result<(), MailError> {
        let response = self
            .http
            .post(format!("{}/{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Status {
                context,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MailboxProvider for GmailClient {
    async fn list_page(&self, token: &str, query: &PageQuery) -> Result<MessagePage, MailError> {
        let mut params = vec![
            ("maxResults", query.max_results.to_string()),
            ("labelIds", query.label.clone()),
            ("q", query.search_query()),
        ];
        if let Some(page_token) = &query.page_token {
            params.push(("pageToken", page_token.clone()));
        }

        let response = self
            .http
            .get(format!("{}/messages", self.base))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Status {
                context: "Gmail list messages",
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn fetch_metadata(&self, token: &str, id: &str) -> Result<EmailRef, MailError> {
        let message = self
            .get_message(
                token,
                id,
                &[
                    ("format", "metadata"),
                    ("metadataHeaders", "Subject"),
                    ("metadataHeaders", "From"),
                    ("metadataHeaders", "Date"),
                ],
                "Gmail message metadata",
            )
            .await?;
        Ok(email_ref_from_message(&message))
    }

    async fn fetch_detail(&self, token: &str, id: &str) -> Result<EmailDetail, MailError> {
        let message = self
            .get_message(token, id, &[("format", "full")], "Gmail message detail")
            .await?;
        let (mut detail, mut inline_images) = detail_from_message(&message);

        for image in inline_images.iter_mut().filter(|image| image.data.is_none()) {
            let Some(attachment_id) = image.attachment_id.clone() else {
                continue;
            };
            match self.fetch_attachment(token, id, &attachment_id).await {
                Ok(bytes) => image.data = Some(bytes),
                Err(err) => {
                    tracing::warn!(
                        message_id = %id,
                        cid = %image.content_id,
                        error = %err,
                        "inline image fetch failed"
                    );
                }
            }
        }

        if let Some(html) = detail.html_body.take() {
            detail.html_body = Some(embed_inline_images(&sanitize_html(&html), &inline_images));
        }

        Ok(detail)
    }

    async fn fetch_attachment(
        &self,
        token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailError> {
        let response = self
            .http
            .get(format!(
                "{}/messages/{message_id}/attachments/{attachment_id}",
                self.base
            ))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Status {
                context: "Gmail attachment",
                status: response.status().as_u16(),
            });
        }

        let payload: GmailAttachmentResponse = response.json().await?;
        let data = payload
            .data
            .ok_or_else(|| MailError::Data("attachment response carried no data".to_string()))?;
        decode_base64url(&data)
    }

    async fn send(&self, token: &str, outgoing: &OutgoingMail) -> Result<(), MailError> {
        let raw = encode_raw_message(outgoing)?;
        self.post_json(
            token,
            "messages/send",
            serde_json::json!({ "raw": raw }),
            "Gmail send",
        )
        .await
    }

    async fn create_draft(&self, token: &str, outgoing: &OutgoingMail) -> Result<(), MailError> {
        let raw = encode_raw_message(outgoing)?;
        self.post_json(
            token,
            "drafts",
            serde_json::json!({ "message": { "raw": raw } }),
            "Gmail create draft",
        )
        .await
    }

    async fn modify_labels(
        &self,
        token: &str,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailError> {
        self.post_json(
            token,
            &format!("messages/{id}/modify"),
            serde_json::json!({ "addLabelIds": add, "removeLabelIds": remove }),
            "Gmail modify labels",
        )
        .await
    }
}

fn decode_base64url(data: &str) -> Result<Vec<u8>, MailError> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('=').as_bytes())
        .or_else(|_| URL_SAFE.decode(data.as_bytes()))
        .map_err(|err| MailError::Data(format!("invalid Gmail base64 payload: {err}")))
}

fn header_value<'a>(headers: Option<&'a [GmailHeader]>, key: &str) -> Option<&'a str> {
    headers?
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(key))
        .map(|header| header.value.as_str())
}

fn part_headers(part: &GmailPart) -> Option<&[GmailHeader]> {
    part.headers.as_deref()
}

fn has_attachment_parts(part: &GmailPart) -> bool {
    part.filename.as_deref().is_some_and(|name| !name.is_empty())
        || part
            .parts
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(has_attachment_parts)
}

fn email_ref_from_message(message: &GmailMessage) -> EmailRef {
    let payload = message.payload.as_ref();
    let headers = payload.and_then(part_headers);
    let header = |key: &str| header_value(headers, key).unwrap_or_default().to_string();

    let has_attachments = payload.map(|part| {
        part.mime_type
            .as_deref()
            .is_some_and(|mime| mime.eq_ignore_ascii_case("multipart/mixed"))
            || has_attachment_parts(part)
    });

    EmailRef {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        from: header("From"),
        subject: header("Subject"),
        date: header("Date"),
        snippet: message.snippet.clone().unwrap_or_default(),
        has_attachments,
        label_ids: message.label_ids.clone(),
    }
}

#[derive(Default)]
struct Collected {
    text: String,
    html: String,
    attachments: Vec<AttachmentMeta>,
    inline_images: Vec<InlineImage>,
}

fn collect_parts(part: &GmailPart, out: &mut Collected) {
    let mime = part
        .mime_type
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let headers = part_headers(part);
    let body = part.body.as_ref();
    let inline_data = body
        .and_then(|body| body.data.as_deref())
        .and_then(|data| decode_base64url(data).ok());
    let filename = part.filename.as_deref().unwrap_or_default();
    let content_id = header_value(headers, "Content-ID")
        .map(|value| value.trim().trim_matches(|c| c == '<' || c == '>').to_string());

    if mime.starts_with("image/") && content_id.is_some() {
        out.inline_images.push(InlineImage {
            content_id: content_id.unwrap_or_default(),
            mime_type: mime.clone(),
            attachment_id: body.and_then(|body| body.attachment_id.clone()),
            data: inline_data,
        });
    } else if !filename.is_empty() {
        if let Some(attachment_id) = body.and_then(|body| body.attachment_id.clone()) {
            out.attachments.push(AttachmentMeta::pending(
                attachment_id,
                filename,
                mime.clone(),
                body.and_then(|body| body.size).unwrap_or(0),
            ));
        }
    } else if mime == "text/plain" {
        if let Some(bytes) = inline_data {
            out.text.push_str(&String::from_utf8_lossy(&bytes));
        }
    } else if mime == "text/html" {
        if let Some(bytes) = inline_data {
            out.html.push_str(&String::from_utf8_lossy(&bytes));
        }
    }

    for child in part.parts.as_deref().unwrap_or_default() {
        collect_parts(child, out);
    }
}

fn detail_from_message(message: &GmailMessage) -> (EmailDetail, Vec<InlineImage>) {
    let mut collected = Collected::default();
    if let Some(payload) = message.payload.as_ref() {
        collect_parts(payload, &mut collected);
    }

    let mut reference = email_ref_from_message(message);
    reference.has_attachments = Some(!collected.attachments.is_empty());

    let body_text = if collected.text.trim().is_empty() {
        strip_tags(&collected.html)
    } else {
        collected.text
    };
    let html_body = if collected.html.is_empty() {
        None
    } else {
        Some(collected.html)
    };

    (
        EmailDetail {
            reference,
            body_text,
            html_body,
            attachments: collected.attachments,
        },
        collected.inline_images,
    )
}

fn strip_tags(html: &str) -> String {
    Regex::new(r"<[^>]+>")
        .ok()
        .map(|re| re.replace_all(html, "").into_owned())
        .unwrap_or_else(|| html.to_string())
        .trim()
        .to_string()
}

fn sanitize_html(html: &str) -> String {
    let mut builder = ammonia::Builder::default();
    builder.add_url_schemes(["cid", "data"]);
    builder.clean(html).to_string()
}

fn embed_inline_images(html: &str, images: &[InlineImage]) -> String {
    images.iter().fold(html.to_string(), |html, image| match &image.data {
        Some(bytes) => html.replace(
            &format!("cid:{}", image.content_id),
            &format!("data:{};base64,{}", image.mime_type, STANDARD.encode(bytes)),
        ),
        None => html,
    })
}

/// Builds an RFC 5322 plain-text message and encodes it the way the Gmail
/// `raw` field expects.
pub fn encode_raw_message(outgoing: &OutgoingMail) -> Result<String, MailError> {
    let parse = |address: &str| {
        address
            .trim()
            .parse::<Mailbox>()
            .map_err(|err| MailError::Build(format!("invalid address `{address}`: {err}")))
    };

    let mut builder = Message::builder()
        .from(parse(&outgoing.from)?)
        .subject(outgoing.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    let mut recipients = 0;
    for address in outgoing.to.split(',').filter(|a| !a.trim().is_empty()) {
        builder = builder.to(parse(address)?);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(MailError::Build("message has no recipients".to_string()));
    }

    let message = builder
        .body(outgoing.body_text.clone())
        .map_err(|err| MailError::Build(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(message.formatted()))
}

/// `Re: ` is added once, regardless of how the original subject was prefixed.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let base = match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("re:") => trimmed[3..].trim_start(),
        _ => trimmed,
    };
    format!("Re: {base}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text.as_bytes())
    }

    fn message(value: serde_json::Value) -> GmailMessage {
        serde_json::from_value(value).expect("valid gmail message")
    }

    #[test]
    fn metadata_maps_headers_case_insensitively() {
        let msg = message(json!({
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "hello there",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "subject", "value": "Quarterly numbers"},
                    {"name": "FROM", "value": "Ann <ann@corp.io>"},
                    {"name": "Date", "value": "Tue, 14 Nov 2023 22:13:20 +0000"}
                ]
            }
        }));
        let reference = email_ref_from_message(&msg);

        assert_eq!(reference.subject, "Quarterly numbers");
        assert_eq!(reference.from, "Ann <ann@corp.io>");
        assert_eq!(reference.has_attachments, Some(true));
        assert!(reference.has_label("UNREAD"));
    }

    #[test]
    fn detail_walks_the_mime_tree() {
        let msg = message(json!({
            "id": "m2",
            "snippet": "s",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [{"name": "Subject", "value": "Report"}],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": encode("Plain body")}},
                            {"mimeType": "text/html", "body": {"data": encode("<p>Html <img src=\"cid:logo\"></p>")}}
                        ]
                    },
                    {
                        "mimeType": "image/png",
                        "headers": [{"name": "Content-ID", "value": "<logo>"}],
                        "body": {"data": encode("png")}
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "q3.pdf",
                        "body": {"attachmentId": "att-1", "size": 2048}
                    }
                ]
            }
        }));
        let (detail, images) = detail_from_message(&msg);

        assert_eq!(detail.body_text, "Plain body");
        assert_eq!(detail.attachments.len(), 1);
        assert_eq!(detail.attachments[0].filename, "q3.pdf");
        assert_eq!(detail.attachments[0].size, 2048);
        assert_eq!(detail.reference.has_attachments, Some(true));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].content_id, "logo");

        let html = embed_inline_images(detail.html_body.as_deref().unwrap_or_default(), &images);
        assert!(html.contains("data:image/png;base64,"));
        assert!(!html.contains("cid:logo"));
    }

    #[test]
    fn html_only_message_gets_text_from_tags() {
        let msg = message(json!({
            "id": "m3",
            "payload": {"mimeType": "text/html", "body": {"data": encode("<div>Hi <b>there</b></div>")}}
        }));
        let (detail, _) = detail_from_message(&msg);
        assert_eq!(detail.body_text, "Hi there");
        assert!(detail.html_body.is_some());
    }

    #[test]
    fn sanitizer_drops_scripts() {
        let clean = sanitize_html("<p>ok</p><script>alert(1)</script>");
        assert!(clean.contains("<p>ok</p>"));
        assert!(!clean.contains("script"));
    }

    #[test]
    fn raw_message_is_url_safe_rfc5322() {
        let raw = encode_raw_message(&OutgoingMail {
            from: "me@corp.io".to_string(),
            to: "ann@corp.io, bob@corp.io".to_string(),
            subject: "Re: Numbers".to_string(),
            body_text: "Looks good.".to_string(),
        })
        .expect("message builds");
        let decoded =
            String::from_utf8(URL_SAFE_NO_PAD.decode(raw).expect("base64")).expect("utf8");

        assert!(decoded.contains("To: ann@corp.io, bob@corp.io"));
        assert!(decoded.contains("Subject: Re: Numbers"));
        assert!(decoded.contains("Looks good."));
    }

    #[test]
    fn raw_message_requires_recipients() {
        let err = encode_raw_message(&OutgoingMail {
            from: "me@corp.io".to_string(),
            to: " ".to_string(),
            subject: "x".to_string(),
            body_text: String::new(),
        })
        .expect_err("no recipients");
        assert!(matches!(err, MailError::Build(_)));
    }

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Numbers"), "Re: Numbers");
        assert_eq!(reply_subject("RE:  Numbers"), "Re: Numbers");
    }

    #[test]
    fn base64_accepts_padded_and_unpadded() {
        assert_eq!(decode_base64url("aGk").expect("unpadded"), b"hi");
        assert_eq!(decode_base64url("aGk=").expect("padded"), b"hi");
    }

    #[test]
    fn client_uses_configured_base_without_trailing_slash() {
        let config = SyncConfig {
            gmail_api_base: "http://localhost:8025/gmail/v1/users/me/".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(
            GmailClient::new(&config).base,
            "http://localhost:8025/gmail/v1/users/me"
        );
        assert_eq!(
            GmailClient::new(&SyncConfig::default()).base,
            "https://gmail.googleapis.com/gmail/v1/users/me"
        );
    }
}
