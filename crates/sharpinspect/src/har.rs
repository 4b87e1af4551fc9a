//! Pure transform from captured [`NetworkEntry`] values to the HAR 1.2
//! object graph (spec §4.7).

use serde::Serialize;
use sharpinspect_core::NetworkEntry;

const HAR_VERSION: &str = "1.2";
const CREATOR_NAME: &str = "SharpInspect";
const CREATOR_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize)]
pub struct HarRoot {
    pub log: HarLog,
}

#[derive(Debug, Serialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarCreator,
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Serialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct HarEntry {
    #[serde(rename = "startedDateTime")]
    pub started_date_time: String,
    pub time: i64,
    pub request: HarRequest,
    pub response: HarResponse,
    pub cache: serde_json::Value,
    pub timings: HarTimings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HarNameValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct HarPostData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    #[serde(rename = "httpVersion")]
    pub http_version: String,
    pub cookies: Vec<HarNameValue>,
    pub headers: Vec<HarNameValue>,
    #[serde(rename = "queryString")]
    pub query_string: Vec<HarNameValue>,
    #[serde(rename = "postData", skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
    #[serde(rename = "headersSize")]
    pub headers_size: i64,
    #[serde(rename = "bodySize")]
    pub body_size: i64,
}

#[derive(Debug, Serialize)]
pub struct HarContent {
    pub size: i64,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HarResponse {
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    #[serde(rename = "httpVersion")]
    pub http_version: String,
    pub cookies: Vec<HarNameValue>,
    pub headers: Vec<HarNameValue>,
    pub content: HarContent,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(rename = "headersSize")]
    pub headers_size: i64,
    #[serde(rename = "bodySize")]
    pub body_size: i64,
}

#[derive(Debug, Serialize)]
pub struct HarTimings {
    pub blocked: i64,
    pub dns: i64,
    pub connect: i64,
    pub ssl: i64,
    pub send: i64,
    pub wait: i64,
    pub receive: i64,
}

pub fn export(entries: &[NetworkEntry]) -> HarRoot {
    HarRoot {
        log: HarLog {
            version: HAR_VERSION.to_string(),
            creator: HarCreator {
                name: CREATOR_NAME.to_string(),
                version: CREATOR_VERSION.to_string(),
            },
            entries: entries.iter().map(export_entry).collect(),
        },
    }
}

fn export_entry(entry: &NetworkEntry) -> HarEntry {
    let headers: Vec<HarNameValue> = entry
        .request_headers
        .iter()
        .map(|(name, value)| HarNameValue {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect();
    let response_headers: Vec<HarNameValue> = entry
        .response_headers
        .iter()
        .map(|(name, value)| HarNameValue {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect();

    let request_cookies = entry
        .request_headers
        .get("Cookie")
        .map(parse_request_cookies)
        .unwrap_or_default();
    let response_cookies: Vec<HarNameValue> = entry
        .response_headers
        .get_all("Set-Cookie")
        .filter_map(parse_response_cookie)
        .collect();

    let post_data = entry.request_body.as_ref().filter(|b| !b.is_empty()).map(|body| {
        HarPostData {
            mime_type: entry
                .request_content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            text: body.clone(),
        }
    });

    HarEntry {
        started_date_time: entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        time: entry.total_ms as i64,
        request: HarRequest {
            method: entry.method.clone(),
            url: entry.url.clone(),
            http_version: entry.protocol.clone(),
            cookies: request_cookies,
            headers,
            query_string: parse_query_string(&entry.query_string),
            post_data,
            headers_size: -1,
            body_size: size_or_unknown(entry.request_content_length),
        },
        response: HarResponse {
            status: entry.status_code,
            status_text: entry.status_text.clone(),
            http_version: entry.protocol.clone(),
            cookies: response_cookies,
            headers: response_headers,
            content: HarContent {
                size: size_or_unknown(entry.response_content_length),
                mime_type: entry
                    .response_content_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                text: entry.response_body.clone(),
            },
            redirect_url: String::new(),
            headers_size: -1,
            body_size: size_or_unknown(entry.response_content_length),
        },
        cache: serde_json::json!({}),
        timings: HarTimings {
            blocked: -1,
            dns: ms_or_unknown(entry.dns_lookup_ms),
            connect: ms_or_unknown(entry.tcp_connect_ms),
            ssl: ms_or_unknown(entry.tls_handshake_ms),
            send: ms_or_unknown(entry.request_sent_ms),
            wait: ms_or_unknown(entry.waiting_ms),
            receive: ms_or_unknown(entry.content_download_ms),
        },
        comment: entry.error_message.clone(),
    }
}

fn size_or_unknown(len: Option<u64>) -> i64 {
    match len {
        Some(n) if n > 0 => n as i64,
        _ => -1,
    }
}

/// A phase timing of exactly 0 means "unknown" per spec §4.7 (`NetworkEntry`
/// timing fields default to 0 when the transport never exposed the phase).
fn ms_or_unknown(ms: f64) -> i64 {
    if ms <= 0.0 {
        -1
    } else {
        ms as i64
    }
}

/// Split on `&`, each item on the first `=`, URL-decode both sides
/// (`+` as space) — exactly `application/x-www-form-urlencoded` syntax,
/// which is what `form_urlencoded::parse` implements.
fn parse_query_string(raw: &str) -> Vec<HarNameValue> {
    let raw = raw.trim_start_matches('?');
    if raw.is_empty() {
        return Vec::new();
    }
    form_urlencoded::parse(raw.as_bytes())
        .map(|(name, value)| HarNameValue {
            name: name.into_owned(),
            value: value.into_owned(),
        })
        .collect()
}

/// `Cookie` header: `name=value` pairs separated by `;`.
fn parse_request_cookies(header: &str) -> Vec<HarNameValue> {
    header
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            HarNameValue {
                name: parts.next().unwrap_or("").to_string(),
                value: parts.next().unwrap_or("").to_string(),
            }
        })
        .collect()
}

/// `Set-Cookie` header: only the leading `name=value` pair, attributes
/// (`Path`, `Expires`, ...) are intentionally dropped — a documented known
/// limitation (spec §4.7, §9 Open Questions).
fn parse_response_cookie(header: &str) -> Option<HarNameValue> {
    let first = header.split(';').next()?.trim();
    if first.is_empty() {
        return None;
    }
    let mut parts = first.splitn(2, '=');
    Some(HarNameValue {
        name: parts.next().unwrap_or("").to_string(),
        value: parts.next().unwrap_or("").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sharpinspect_core::HeaderBag;
    use uuid::Uuid;

    fn base_entry() -> NetworkEntry {
        NetworkEntry::opening(
            Uuid::nil(),
            "GET".into(),
            "https://x.test/a?x=1&y=%20".into(),
            "x=1&y=%20".into(),
            "HTTP/1.1".into(),
            HeaderBag::new(),
            None,
            None,
            None,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn har_export_of_empty_store_has_version_and_no_entries() {
        let har = export(&[]);
        assert_eq!(har.log.version, "1.2");
        assert!(har.log.entries.is_empty());
    }

    #[test]
    fn s3_har_fidelity() {
        let mut entry = base_entry();
        entry.status_code = 200;
        entry.total_ms = 37.0;
        entry.dns_lookup_ms = 5.0;
        entry.is_complete = true;

        let har = export(std::slice::from_ref(&entry));
        let har_entry = &har.log.entries[0];

        assert_eq!(har_entry.time, 37);
        assert_eq!(har_entry.timings.dns, 5);
        assert_eq!(har_entry.timings.blocked, -1);
        assert_eq!(
            har_entry.request.query_string,
            vec![
                HarNameValue { name: "x".into(), value: "1".into() },
                HarNameValue { name: "y".into(), value: " ".into() },
            ]
        );
    }

    #[test]
    fn error_message_becomes_comment() {
        let mut entry = base_entry();
        entry.is_error = true;
        entry.error_message = Some("connection refused".into());
        let har = export(std::slice::from_ref(&entry));
        assert_eq!(har.log.entries[0].comment.as_deref(), Some("connection refused"));
    }

    #[test]
    fn set_cookie_attributes_are_dropped_by_design() {
        let mut entry = base_entry();
        entry.response_headers.append("Set-Cookie", "sid=abc123; Path=/; HttpOnly");
        let har = export(std::slice::from_ref(&entry));
        let cookies = &har.log.entries[0].response.cookies;
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
        assert_eq!(cookies[0].value, "abc123");
    }

    #[test]
    fn multiple_set_cookie_headers_become_distinct_cookies() {
        let mut entry = base_entry();
        entry.response_headers.append("Set-Cookie", "a=1");
        entry.response_headers.append("Set-Cookie", "b=2");
        let har = export(std::slice::from_ref(&entry));
        let cookies = &har.log.entries[0].response.cookies;
        assert_eq!(
            cookies,
            &vec![
                HarNameValue { name: "a".into(), value: "1".into() },
                HarNameValue { name: "b".into(), value: "2".into() },
            ]
        );
    }
}
