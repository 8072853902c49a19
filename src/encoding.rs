//! Encoding-tolerant decoding of device export files.
//!
//! The device writes exports in whatever encoding its firmware felt like that
//! day, so decoding tries an ordered list of candidates and takes the first
//! one that produces no malformed sequences.

use encoding_rs::Encoding;
use thiserror::Error;

/// Candidate order used when the config does not override it.
pub const DEFAULT_ENCODINGS: [&str; 4] = ["utf-8", "windows-1252", "iso-8859-1", "utf-16"];

#[derive(Debug, Error)]
#[error("no candidate encoding ({candidates}) decoded the content cleanly")]
pub struct DecodeError {
    candidates: String,
}

/// Decode raw export bytes, trying each candidate encoding in order.
///
/// Unknown labels are skipped. A BOM in the content overrides the candidate
/// (encoding_rs sniffs it), which is how BOM-carrying UTF-16 exports decode
/// on the first attempt.
pub fn decode_export(bytes: &[u8], candidates: &[String]) -> Result<String, DecodeError> {
    for label in candidates {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            continue;
        };
        let (text, _, malformed) = encoding.decode(bytes);
        if !malformed {
            return Ok(text.into_owned());
        }
    }

    Err(DecodeError {
        candidates: candidates.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_utf8() {
        let all = candidates(&DEFAULT_ENCODINGS);
        assert_eq!(decode_export("héllo wörld".as_bytes(), &all).unwrap(), "héllo wörld");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        // 0xE9 is not valid UTF-8 on its own but is 'é' in windows-1252.
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        let all = candidates(&DEFAULT_ENCODINGS);
        assert_eq!(decode_export(&bytes, &all).unwrap(), "café");
    }

    #[test]
    fn test_decode_utf16_with_bom() {
        // UTF-16LE BOM followed by "hi"; the BOM wins over the utf-8 candidate.
        let bytes = [0xFF, 0xFE, 0x68, 0x00, 0x69, 0x00];
        let all = candidates(&DEFAULT_ENCODINGS);
        assert_eq!(decode_export(&bytes, &all).unwrap(), "hi");
    }

    #[test]
    fn test_decode_failure_when_no_candidate_fits() {
        // Truncated multi-byte sequence, and the only candidate is strict utf-8.
        let bytes = [0x68, 0xC3];
        assert!(decode_export(&bytes, &candidates(&["utf-8"])).is_err());
    }

    #[test]
    fn test_unknown_labels_are_skipped() {
        let bytes = [0x68, 0x69];
        let result = decode_export(&bytes, &candidates(&["not-an-encoding", "utf-8"]));
        assert_eq!(result.unwrap(), "hi");
    }
}
