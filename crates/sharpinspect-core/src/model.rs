use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::headers::HeaderBag;

/// Sentinel appended to a captured body when it was truncated at
/// `maxBodyBytes` (spec §3 invariants).
pub const TRUNCATION_MARKER: &str = "\u{2026}[truncated]";

/// Cap `bytes` at `max_bytes`, returning the captured text (lossily decoded
/// as UTF-8) and whether truncation occurred. `max_bytes == 0` captures
/// nothing but still reports the body's presence via the caller's
/// content-length field.
pub fn cap_body(bytes: &[u8], max_bytes: usize) -> (Option<String>, bool) {
    if bytes.is_empty() {
        return (None, false);
    }
    if bytes.len() <= max_bytes {
        return (Some(String::from_utf8_lossy(bytes).into_owned()), false);
    }
    let mut text = String::from_utf8_lossy(&bytes[..max_bytes]).into_owned();
    text.push_str(TRUNCATION_MARKER);
    (Some(text), true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Trace" => Ok(LogLevel::Trace),
            "Debug" => Ok(LogLevel::Debug),
            "Information" => Ok(LogLevel::Information),
            "Warning" => Ok(LogLevel::Warning),
            "Error" => Ok(LogLevel::Error),
            "Critical" => Ok(LogLevel::Critical),
            other => Err(format!("unrecognized log level: {other}")),
        }
    }
}

/// One HTTP transaction, mutated in place while phases complete and sealed
/// (`is_complete = true`) on response-finished or terminal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub id: u64,
    pub request_id: Uuid,

    pub method: String,
    pub url: String,
    pub query_string: String,
    pub protocol: String,
    pub request_headers: HeaderBag,
    pub request_content_type: Option<String>,
    pub request_content_length: Option<u64>,
    pub request_body: Option<String>,

    pub status_code: u16,
    pub status_text: String,
    pub response_headers: HeaderBag,
    pub response_content_type: Option<String>,
    pub response_content_length: Option<u64>,
    pub response_body: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub dns_lookup_ms: f64,
    pub tcp_connect_ms: f64,
    pub tls_handshake_ms: f64,
    pub request_sent_ms: f64,
    pub waiting_ms: f64,
    pub content_download_ms: f64,
    pub total_ms: f64,

    pub is_error: bool,
    pub error_message: Option<String>,
    pub is_complete: bool,
}

impl NetworkEntry {
    /// A fresh, unsealed entry recording only what's known when the request
    /// is first observed (spec §4.5 step 1).
    pub fn opening(
        request_id: Uuid,
        method: String,
        url: String,
        query_string: String,
        protocol: String,
        request_headers: HeaderBag,
        request_content_type: Option<String>,
        request_content_length: Option<u64>,
        request_body: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            request_id,
            method,
            url,
            query_string,
            protocol,
            request_headers,
            request_content_type,
            request_content_length,
            request_body,
            status_code: 0,
            status_text: String::new(),
            response_headers: HeaderBag::new(),
            response_content_type: None,
            response_content_length: None,
            response_body: None,
            timestamp,
            dns_lookup_ms: 0.0,
            tcp_connect_ms: 0.0,
            tls_handshake_ms: 0.0,
            request_sent_ms: 0.0,
            waiting_ms: 0.0,
            content_download_ms: 0.0,
            total_ms: 0.0,
            is_error: false,
            error_message: None,
            is_complete: false,
        }
    }

    pub fn status_class(&self) -> StatusClass {
        if self.is_error {
            return StatusClass::Error;
        }
        match self.status_code {
            200..=299 => StatusClass::Success2xx,
            400..=499 => StatusClass::ClientError4xx,
            500..=599 => StatusClass::ServerError5xx,
            _ => StatusClass::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success2xx,
    ClientError4xx,
    ServerError5xx,
    Error,
    Other,
}

impl std::str::FromStr for StatusClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "2xx" => Ok(StatusClass::Success2xx),
            "4xx" => Ok(StatusClass::ClientError4xx),
            "5xx" => Ok(StatusClass::ServerError5xx),
            "error" => Ok(StatusClass::Error),
            other => Err(format!("unrecognized status filter: {other}")),
        }
    }
}

/// One captured output line from stdout/stderr or the tracing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    pub category: String,
    pub source: Option<String>,
}

/// One process-resource sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub total_memory_bytes: u64,
    pub working_set_bytes: u64,
    pub gen0_collections: u64,
    pub gen1_collections: u64,
    pub gen2_collections: u64,
    pub thread_count: u64,
    pub handle_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyInfo {
    pub name: String,
    pub version: String,
}

/// Singleton process metadata, produced once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    pub assembly_name: String,
    pub runtime_version: String,
    pub process_id: u32,
    pub processor_count: usize,
    pub environment_variables: std::collections::BTreeMap<String, String>,
    pub loaded_assemblies: Vec<AssemblyInfo>,
}

/// Capture events published on the [`crate::event_bus::EventBus`].
#[derive(Debug, Clone)]
pub struct NetworkEntryEvent(pub NetworkEntry);

#[derive(Debug, Clone)]
pub struct ConsoleEntryEvent(pub ConsoleEntry);

#[derive(Debug, Clone)]
pub struct PerformanceEntryEvent(pub PerformanceEntry);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_under_cap_is_untouched() {
        let (text, truncated) = cap_body(b"hello", 1024);
        assert_eq!(text.as_deref(), Some("hello"));
        assert!(!truncated);
    }

    #[test]
    fn body_over_cap_is_truncated_with_marker() {
        let (text, truncated) = cap_body(b"hello world", 5);
        assert!(truncated);
        assert_eq!(text.unwrap(), format!("hello{TRUNCATION_MARKER}"));
    }

    #[test]
    fn empty_body_is_none() {
        let (text, truncated) = cap_body(b"", 1024);
        assert!(text.is_none());
        assert!(!truncated);
    }

    #[test]
    fn status_class_error_wins_over_code() {
        let mut entry = NetworkEntry::opening(
            Uuid::nil(),
            "GET".into(),
            "http://x".into(),
            String::new(),
            "HTTP/1.1".into(),
            HeaderBag::new(),
            None,
            None,
            None,
            Utc::now(),
        );
        entry.is_error = true;
        entry.status_code = 200;
        assert_eq!(entry.status_class(), StatusClass::Error);
    }

    /// spec §8 property 3: decode(encode(v)) yields a value byte-equal when
    /// re-encoded, exercised against the real wire types rather than a bare
    /// `serde_json::Value` — including a header bag with a repeated key, the
    /// one shape a naive `HashMap`-backed round trip would corrupt.
    #[test]
    fn network_entry_json_round_trips() {
        let mut headers = HeaderBag::new();
        headers.append("Content-Type", "application/json");
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");

        let mut entry = NetworkEntry::opening(
            Uuid::new_v4(),
            "POST".into(),
            "https://x.test/y".into(),
            String::new(),
            "HTTP/1.1".into(),
            HeaderBag::new(),
            Some("application/json".into()),
            Some(13),
            Some("{\"a\":1}".into()),
            Utc::now(),
        );
        entry.response_headers = headers;
        entry.status_code = 204;
        entry.is_complete = true;

        let encoded_once = serde_json::to_string(&entry).unwrap();
        let decoded: NetworkEntry = serde_json::from_str(&encoded_once).unwrap();
        let encoded_twice = serde_json::to_string(&decoded).unwrap();
        assert_eq!(encoded_once, encoded_twice);
    }

    /// spec §8 property 4: control characters escape as `\uXXXX`, `"` and
    /// `\` are escaped, non-ASCII passes through verbatim.
    #[test]
    fn json_escapes_control_chars_and_passes_non_ascii_through() {
        let message = "tab:\t null:\x00 quote:\" backslash:\\ unicode:héllo";
        let entry = ConsoleEntry {
            id: 1,
            timestamp: Utc::now(),
            message: message.to_string(),
            level: LogLevel::Information,
            category: "test".into(),
            source: None,
        };

        let encoded = serde_json::to_string(&entry).unwrap();
        assert!(encoded.contains(r"\t"));
        assert!(encoded.contains(r"\u0000"));
        assert!(encoded.contains(r#"\""#));
        assert!(encoded.contains(r"\\"));
        assert!(encoded.contains("héllo"));

        let decoded: ConsoleEntry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.message, message);
    }
}
