//! Content-Security-Policy violation report receiver.
//!
//! Browsers post reports in several shapes (`{"csp-report": {...}}`, the
//! newer `{"report": {...}}`, or a bare object with camelCase keys). All of
//! them are reduced to one structured log line; the response is always 204.

use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::http::response::ProxyResponse;

/// The fields kept from a violation report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspReport {
    pub violated_directive: String,
    pub blocked_uri: String,
    pub document_uri: String,
}

impl CspReport {
    /// Normalize a raw request body. Never fails.
    pub fn from_body(body: &[u8]) -> Self {
        let parsed = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body).unwrap_or_else(|_| {
                let mut raw = Map::new();
                raw.insert(
                    "raw".to_string(),
                    Value::String(String::from_utf8_lossy(body).into_owned()),
                );
                Value::Object(raw)
            })
        };

        let report = parsed
            .get("csp-report")
            .or_else(|| parsed.get("report"))
            .unwrap_or(&parsed);

        Self {
            violated_directive: first_str(report, &["violated-directive", "effective-directive"]),
            blocked_uri: first_str(report, &["blocked-uri", "blockedURL", "blocked-url"]),
            document_uri: first_str(report, &["document-uri", "documentURL", "document-url"]),
        }
    }
}

fn first_str(report: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| report.get(*k))
        .filter_map(Value::as_str)
        .find(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Log the report and acknowledge it.
pub fn receive(body: &[u8]) -> ProxyResponse {
    let report = CspReport::from_body(body);
    tracing::info!(
        violated_directive = %report.violated_directive,
        blocked_uri = %report.blocked_uri,
        document_uri = %report.document_uri,
        "CSP violation reported"
    );
    ProxyResponse::empty(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_csp_report() {
        let body = br#"{"csp-report":{"document-uri":"https://app.example/","violated-directive":"script-src-elem","blocked-uri":"https://cdn.evil/x.js"}}"#;
        assert_eq!(
            CspReport::from_body(body),
            CspReport {
                violated_directive: "script-src-elem".into(),
                blocked_uri: "https://cdn.evil/x.js".into(),
                document_uri: "https://app.example/".into(),
            }
        );
    }

    #[test]
    fn test_reporting_api_shape() {
        let body = br#"{"report":{"effective-directive":"img-src","blockedURL":"data","documentURL":"https://app.example/picks"}}"#;
        let report = CspReport::from_body(body);
        assert_eq!(report.violated_directive, "img-src");
        assert_eq!(report.blocked_uri, "data");
        assert_eq!(report.document_uri, "https://app.example/picks");
    }

    #[test]
    fn test_bare_object() {
        let body = br#"{"violated-directive":"style-src","blocked-url":"inline"}"#;
        let report = CspReport::from_body(body);
        assert_eq!(report.violated_directive, "style-src");
        assert_eq!(report.blocked_uri, "inline");
        assert_eq!(report.document_uri, "unknown");
    }

    #[test]
    fn test_empty_and_non_json_bodies() {
        let unknown = CspReport {
            violated_directive: "unknown".into(),
            blocked_uri: "unknown".into(),
            document_uri: "unknown".into(),
        };
        assert_eq!(CspReport::from_body(b""), unknown);
        assert_eq!(CspReport::from_body(b"not json at all"), unknown);
        assert_eq!(CspReport::from_body(b"[1,2,3]"), unknown);
    }

    #[test]
    fn test_receive_is_always_no_content() {
        let response = receive(b"{broken");
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
    }
}
