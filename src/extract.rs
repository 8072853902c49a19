//! Highlight extraction semantics for one export file.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::warn;

use crate::encoding;
use crate::markup::{self, BookmarkBlock};
use crate::model::{Highlight, highlight_id};

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Trimmed highlight text must be strictly longer than this. Anything at or
/// below the threshold is an accidental tap, not a real highlight.
const MIN_TEXT_CHARS: usize = 10;

/// Export headings read `"<date> - <title>"` on devices that stamp the
/// export time; the same delimiter separates the parts everywhere.
pub const DATE_TITLE_DELIMITER: &str = " - ";
const HEADING_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

const COLOR_CLASS_PREFIX: &str = "bm-color-";
const COLOR_NONE_CLASS: &str = "bm-color-none";

#[derive(Debug)]
pub struct BookExtract {
    pub title: String,
    pub author: String,
    pub highlights: Vec<Highlight>,
}

/// Parse one export file into title, author and ordered highlights.
///
/// Never fails: an undecodable file yields the filename stem as title,
/// the unknown-author sentinel, and no highlights.
pub fn parse_export(path: &Path, bytes: &[u8], encodings: &[String]) -> BookExtract {
    let html = match encoding::decode_export(bytes, encodings) {
        Ok(html) => html,
        Err(e) => {
            warn!("could not decode {}: {}", path.display(), e);
            return BookExtract {
                title: file_stem(path),
                author: UNKNOWN_AUTHOR.to_string(),
                highlights: Vec::new(),
            };
        }
    };

    let doc = markup::scan_export(&html);

    let (title, default_highlighted_at) = match &doc.heading {
        Some(heading) => split_heading(heading),
        None => (file_stem(path), None),
    };

    // The first two bookmark containers hold title and author metadata; the
    // second one carries the author in a nested span. This is a structural
    // property of the export format, not something detected dynamically.
    let author = doc
        .blocks
        .get(1)
        .and_then(|b| b.span.as_deref())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let highlights = doc
        .blocks
        .iter()
        .filter(|b| b.element_id.is_some())
        .filter_map(|b| highlight_from_block(&title, b, default_highlighted_at.as_deref()))
        .collect();

    BookExtract {
        title,
        author,
        highlights,
    }
}

/// Split `"<date> - <title>"` into the bare title and a normalized
/// highlighted-at timestamp. Headings whose date portion does not parse are
/// returned whole, with no timestamp.
pub fn split_heading(heading: &str) -> (String, Option<String>) {
    let heading = heading.trim();
    if let Some((date_part, rest)) = heading.split_once(DATE_TITLE_DELIMITER)
        && let Ok(dt) = NaiveDateTime::parse_from_str(date_part, HEADING_DATE_FORMAT)
    {
        let utc = DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
        return (
            rest.to_string(),
            Some(utc.format(TIMESTAMP_FORMAT).to_string()),
        );
    }

    (heading.to_string(), None)
}

fn highlight_from_block(
    title: &str,
    block: &BookmarkBlock,
    default_highlighted_at: Option<&str>,
) -> Option<Highlight> {
    let text = block.text.as_deref()?.trim().to_string();
    if text.chars().count() <= MIN_TEXT_CHARS {
        return None;
    }

    let color_tag = color_tag(&block.classes);
    let note = block
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    // A color marker becomes a short tag appended to the note, creating one
    // when the highlight had none.
    let note = match (note, color_tag.as_deref()) {
        (Some(note), Some(tag)) => Some(format!("{} {}", note, tag)),
        (Some(note), None) => Some(note.to_string()),
        (None, Some(tag)) => Some(tag.to_string()),
        (None, None) => None,
    };

    Some(Highlight {
        id: highlight_id(title, &text),
        location: block.page.as_deref().and_then(page_number),
        note,
        highlighted_at: default_highlighted_at.map(str::to_string),
        text,
    })
}

fn color_tag(classes: &[String]) -> Option<String> {
    classes.iter().find_map(|css| {
        if css == COLOR_NONE_CLASS {
            return None;
        }
        css.strip_prefix(COLOR_CLASS_PREFIX)
            .map(|name| format!(".{}", name))
    })
}

/// Pull the page number out of labels like `"42"` or `"page # 107"`.
fn page_number(page_text: &str) -> Option<u32> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid literal regex"));
    re.find(page_text).and_then(|m| m.as_str().parse().ok())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        crate::encoding::DEFAULT_ENCODINGS
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    const SAMPLE: &str = r#"<html>
<head><title>Export</title></head>
<body>
<h1>2025-06-28 16:57:41 - The Left Hand of Darkness</h1>
<div class="bookmark"><span>The Left Hand of Darkness</span></div>
<div class="bookmark"><span>Ursula K. Le Guin</span></div>
<div class="bookmark bm-color-yellow" id="bm-1">
  <p class="bm-page">42</p>
  <div class="bm-text">Light is the left hand of darkness, and darkness the right hand of light.</div>
</div>
<div class="bookmark bm-color-none" id="bm-2">
  <p class="bm-page">page # 107</p>
  <div class="bm-text">To learn which questions are unanswerable, and not to answer them.</div>
  <div class="bm-note">so good</div>
</div>
<div class="bookmark" id="bm-3">
  <div class="bm-text">Short one</div>
</div>
</body>
</html>
"#;

    #[test]
    fn test_parse_export_full() {
        let extract = parse_export(Path::new("book.html"), SAMPLE.as_bytes(), &defaults());

        assert_eq!(extract.title, "The Left Hand of Darkness");
        assert_eq!(extract.author, "Ursula K. Le Guin");
        assert_eq!(extract.highlights.len(), 2);

        let first = &extract.highlights[0];
        assert_eq!(
            first.text,
            "Light is the left hand of darkness, and darkness the right hand of light."
        );
        assert_eq!(first.location, Some(42));
        assert_eq!(first.note.as_deref(), Some(".yellow"));
        assert_eq!(
            first.highlighted_at.as_deref(),
            Some("2025-06-28T16:57:41+00:00")
        );

        let second = &extract.highlights[1];
        assert_eq!(second.location, Some(107));
        // bm-color-none is explicitly not a color, so the note stays as written.
        assert_eq!(second.note.as_deref(), Some("so good"));
    }

    #[test]
    fn test_length_boundary() {
        let html = r#"<html><body>
<h1>Boundaries</h1>
<div class="bookmark" id="a"><div class="bm-text">exactly10!</div></div>
<div class="bookmark" id="b"><div class="bm-text">elevenchars</div></div>
</body></html>"#;
        let extract = parse_export(Path::new("b.html"), html.as_bytes(), &defaults());
        assert_eq!(extract.highlights.len(), 1);
        assert_eq!(extract.highlights[0].text, "elevenchars");
    }

    #[test]
    fn test_color_tag_without_note_becomes_note() {
        let html = r#"<html><body>
<h1>Colors</h1>
<div class="bookmark bm-color-blue" id="a"><div class="bm-text">a highlight long enough to keep</div></div>
</body></html>"#;
        let extract = parse_export(Path::new("c.html"), html.as_bytes(), &defaults());
        assert_eq!(extract.highlights[0].note.as_deref(), Some(".blue"));
    }

    #[test]
    fn test_color_tag_appends_to_existing_note() {
        let html = r#"<html><body>
<h1>Colors</h1>
<div class="bookmark bm-color-green" id="a">
  <div class="bm-text">a highlight long enough to keep</div>
  <div class="bm-note">check later</div>
</div>
</body></html>"#;
        let extract = parse_export(Path::new("c.html"), html.as_bytes(), &defaults());
        assert_eq!(extract.highlights[0].note.as_deref(), Some("check later .green"));
    }

    #[test]
    fn test_blocks_without_id_are_skipped() {
        let html = r#"<html><body>
<h1>Meta Only</h1>
<div class="bookmark"><div class="bm-text">this text is plenty long but has no id</div></div>
</body></html>"#;
        let extract = parse_export(Path::new("m.html"), html.as_bytes(), &defaults());
        assert!(extract.highlights.is_empty());
    }

    #[test]
    fn test_split_heading_with_date() {
        let (title, ts) = split_heading("2025-06-28 16:57:41 - My Book");
        assert_eq!(title, "My Book");
        assert_eq!(ts.as_deref(), Some("2025-06-28T16:57:41+00:00"));
    }

    #[test]
    fn test_split_heading_without_delimiter() {
        let (title, ts) = split_heading("My Book");
        assert_eq!(title, "My Book");
        assert_eq!(ts, None);
    }

    #[test]
    fn test_split_heading_with_unparseable_date() {
        let (title, ts) = split_heading("yesterday - My Book");
        assert_eq!(title, "yesterday - My Book");
        assert_eq!(ts, None);
    }

    #[test]
    fn test_title_with_delimiter_in_name_survives() {
        // Only a valid date prefix is stripped.
        let (title, ts) = split_heading("Crime - and - Punishment");
        assert_eq!(title, "Crime - and - Punishment");
        assert_eq!(ts, None);
    }

    #[test]
    fn test_undecodable_file_yields_placeholder() {
        let bytes = [0x68, 0xC3];
        let only_utf8 = vec!["utf-8".to_string()];
        let extract = parse_export(Path::new("/notes/Dune.html"), &bytes, &only_utf8);
        assert_eq!(extract.title, "Dune");
        assert_eq!(extract.author, UNKNOWN_AUTHOR);
        assert!(extract.highlights.is_empty());
    }

    #[test]
    fn test_missing_heading_falls_back_to_stem() {
        let html = r#"<html><body>
<div class="bookmark" id="a"><div class="bm-text">a highlight long enough to keep</div></div>
</body></html>"#;
        let extract = parse_export(Path::new("/notes/Solaris.html"), html.as_bytes(), &defaults());
        assert_eq!(extract.title, "Solaris");
        assert!(extract.highlights[0].highlighted_at.is_none());
    }

    #[test]
    fn test_page_number_variants() {
        assert_eq!(page_number("42"), Some(42));
        assert_eq!(page_number("page # 107"), Some(107));
        assert_eq!(page_number("Seite 12 von 300"), Some(12));
        assert_eq!(page_number("no digits here"), None);
        assert_eq!(page_number(""), None);
    }
}
