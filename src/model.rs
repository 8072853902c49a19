use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SOURCE_TYPE: &str = "book";
pub const CATEGORY: &str = "books";

/// A single highlight extracted from a device export.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    /// Stable content-derived identifier, see [`highlight_id`].
    pub id: String,
    pub text: String,
    /// Page number, when the export carried one.
    pub location: Option<u32>,
    /// Reader note, possibly carrying an appended color tag.
    pub note: Option<String>,
    /// ISO-8601 timestamp from the export heading, when present.
    pub highlighted_at: Option<String>,
}

/// Identity invariant: two highlights with identical text under the same
/// title are the same highlight.
pub fn highlight_id(title: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of a file's raw bytes, used to skip unchanged exports.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One highlight as submitted to the remote service. Optional fields are
/// omitted from the JSON body entirely when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightPayload {
    pub text: String,
    pub title: String,
    pub author: String,
    pub source_type: String,
    pub category: String,
    pub highlighted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HighlightPayload {
    pub fn new(title: &str, author: &str, highlight: &Highlight) -> Self {
        // The service requires a timestamp; fall back to the upload time.
        let highlighted_at = highlight
            .highlighted_at
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string());

        Self {
            text: highlight.text.clone(),
            title: title.to_string(),
            author: author.to_string(),
            source_type: SOURCE_TYPE.to_string(),
            category: CATEGORY.to_string(),
            highlighted_at,
            location: highlight.location,
            location_type: highlight.location.map(|_| "page".to_string()),
            note: highlight.note.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_highlight() -> Highlight {
        Highlight {
            id: highlight_id("A Book", "some text worth keeping"),
            text: "some text worth keeping".to_string(),
            location: None,
            note: None,
            highlighted_at: None,
        }
    }

    #[test]
    fn test_highlight_id_is_stable() {
        assert_eq!(
            highlight_id("A Book", "some text"),
            highlight_id("A Book", "some text")
        );
    }

    #[test]
    fn test_highlight_id_depends_on_title_and_text() {
        assert_ne!(
            highlight_id("A Book", "some text"),
            highlight_id("Another Book", "some text")
        );
        assert_ne!(
            highlight_id("A Book", "some text"),
            highlight_id("A Book", "other text")
        );
    }

    #[test]
    fn test_content_hash_detects_changes() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }

    #[test]
    fn test_payload_omits_absent_optionals() {
        let payload = HighlightPayload::new("A Book", "An Author", &sample_highlight());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["source_type"], "book");
        assert_eq!(json["category"], "books");
        assert!(json.get("location").is_none());
        assert!(json.get("location_type").is_none());
        assert!(json.get("note").is_none());
        // Missing export timestamp falls back to "now", which is never empty.
        assert!(!json["highlighted_at"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_payload_location_carries_location_type() {
        let mut highlight = sample_highlight();
        highlight.location = Some(42);
        highlight.highlighted_at = Some("2025-06-28T16:57:41+00:00".to_string());

        let payload = HighlightPayload::new("A Book", "An Author", &highlight);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["location"], 42);
        assert_eq!(json["location_type"], "page");
        assert_eq!(json["highlighted_at"], "2025-06-28T16:57:41+00:00");
    }
}
