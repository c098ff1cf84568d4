//! Response summary recorded for a dispatched task.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response headers: one key may carry several values, kept in arrival order.
pub type HeaderMultiMap = BTreeMap<String, Vec<String>>;

/// `content_length` value meaning "the server did not say".
pub const UNKNOWN_CONTENT_LENGTH: i64 = -1;

/// What came back from the third-party endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSummary {
    /// Status line text, e.g. `"200 OK"`.
    #[serde(rename = "status")]
    pub status_text: String,
    pub status_code: u16,
    pub headers: HeaderMultiMap,
    /// `-1` when the length is unknown (chunked, streamed, ...).
    pub content_length: i64,
    pub body: String,
}

impl ResponseSummary {
    /// Build the status line text the way HTTP prints it (`"404 Not Found"`).
    /// Codes without a canonical reason render as the bare number.
    pub fn status_line(code: u16, reason: Option<&str>) -> String {
        match reason {
            Some(reason) if !reason.is_empty() => format!("{code} {reason}"),
            _ => code.to_string(),
        }
    }

    pub fn content_length_from(len: Option<u64>) -> i64 {
        len.and_then(|n| i64::try_from(n).ok())
            .unwrap_or(UNKNOWN_CONTENT_LENGTH)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_includes_reason_when_known() {
        assert_eq!(ResponseSummary::status_line(200, Some("OK")), "200 OK");
        assert_eq!(ResponseSummary::status_line(599, None), "599");
        assert_eq!(ResponseSummary::status_line(599, Some("")), "599");
    }

    #[test]
    fn unknown_length_maps_to_minus_one() {
        assert_eq!(ResponseSummary::content_length_from(None), -1);
        assert_eq!(ResponseSummary::content_length_from(Some(16)), 16);
        assert_eq!(ResponseSummary::content_length_from(Some(u64::MAX)), -1);
    }

    #[test]
    fn only_2xx_counts_as_success() {
        let summary = |status_code| ResponseSummary {
            status_text: ResponseSummary::status_line(status_code, None),
            status_code,
            headers: HeaderMultiMap::new(),
            content_length: 0,
            body: String::new(),
        };
        assert!(summary(204).is_success());
        assert!(!summary(302).is_success());
        assert!(!summary(500).is_success());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let mut headers = HeaderMultiMap::new();
        headers.insert(
            "set-cookie".to_string(),
            vec!["a=1".to_string(), "b=2".to_string()],
        );
        let summary = ResponseSummary {
            status_text: "200 OK".to_string(),
            status_code: 200,
            headers,
            content_length: 2,
            body: "{}".to_string(),
        };

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["status"], "200 OK");
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["headers"]["set-cookie"][1], "b=2");
        assert_eq!(value["content_length"], 2);

        let back: ResponseSummary = serde_json::from_value(value).unwrap();
        assert_eq!(back, summary);
    }
}
