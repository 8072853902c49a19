//! Streaming traversal of one export document.
//!
//! This module is pure syntax: it walks the markup once and surfaces the
//! pieces the extractor cares about as typed values. Highlight semantics
//! (noise filtering, color tags, identity) live in `extract`, so the
//! traversal library can be swapped without touching them.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

/// One `div.bookmark` container as it appears in the document, metadata
/// containers included.
#[derive(Debug, Default, Clone)]
pub struct BookmarkBlock {
    /// Value of the container's `id` attribute, when present. Containers
    /// without one are metadata, not highlights.
    pub element_id: Option<String>,
    /// Class list of the container element.
    pub classes: Vec<String>,
    /// Text of the first nested `<span>`.
    pub span: Option<String>,
    /// Text of the nested `p.bm-page`.
    pub page: Option<String>,
    /// Text of the nested `div.bm-text`.
    pub text: Option<String>,
    /// Text of the nested `div.bm-note`.
    pub note: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExportDocument {
    /// Text of the first `<h1>`.
    pub heading: Option<String>,
    /// Text of the `<title>` element.
    pub title_tag: Option<String>,
    /// All `div.bookmark` containers in document order.
    pub blocks: Vec<BookmarkBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    None,
    Heading,
    TitleTag,
    Span,
    Page,
    Text,
    Note,
}

/// Walk the document and collect heading, title and bookmark containers.
///
/// The reader is configured leniently because exports are HTML, not XML:
/// mismatched or stray end tags must not abort the scan. A hard parse error
/// ends the scan early and returns whatever was collected up to that point.
pub fn scan_export(html: &str) -> ExportDocument {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;

    let mut doc = ExportDocument::default();
    let mut block: Option<BookmarkBlock> = None;
    // Depth of nested <div>s inside the current block; 0 means outside.
    let mut div_depth = 0usize;
    let mut field = Field::None;
    // Div depth at which the currently captured div field was opened.
    let mut field_div_depth = 0usize;
    let mut buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"h1" if block.is_none() && field == Field::None && doc.heading.is_none() => {
                    field = Field::Heading;
                    buf.clear();
                }
                b"title" if block.is_none() && field == Field::None && doc.title_tag.is_none() => {
                    field = Field::TitleTag;
                    buf.clear();
                }
                b"div" => {
                    let classes = class_list(&e);
                    if let Some(b) = block.as_mut() {
                        div_depth += 1;
                        if field == Field::None {
                            if b.text.is_none() && classes.iter().any(|c| c == "bm-text") {
                                field = Field::Text;
                                field_div_depth = div_depth;
                                buf.clear();
                            } else if b.note.is_none() && classes.iter().any(|c| c == "bm-note") {
                                field = Field::Note;
                                field_div_depth = div_depth;
                                buf.clear();
                            }
                        }
                    } else if classes.iter().any(|c| c == "bookmark") {
                        block = Some(BookmarkBlock {
                            element_id: attr_value(&e, b"id"),
                            classes,
                            ..BookmarkBlock::default()
                        });
                        div_depth = 1;
                        field = Field::None;
                    }
                }
                b"span" => {
                    if let Some(b) = &block
                        && field == Field::None
                        && b.span.is_none()
                    {
                        field = Field::Span;
                        buf.clear();
                    }
                }
                b"p" => {
                    if let Some(b) = &block
                        && field == Field::None
                        && b.page.is_none()
                        && class_list(&e).iter().any(|c| c == "bm-page")
                    {
                        field = Field::Page;
                        buf.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"h1" => {
                    if field == Field::Heading {
                        doc.heading = Some(commit(&mut buf));
                        field = Field::None;
                    }
                }
                b"title" => {
                    if field == Field::TitleTag {
                        doc.title_tag = Some(commit(&mut buf));
                        field = Field::None;
                    }
                }
                b"span" => {
                    if field == Field::Span {
                        if let Some(b) = block.as_mut() {
                            b.span = Some(commit(&mut buf));
                        }
                        field = Field::None;
                    }
                }
                b"p" => {
                    if field == Field::Page {
                        if let Some(b) = block.as_mut() {
                            b.page = Some(commit(&mut buf));
                        }
                        field = Field::None;
                    }
                }
                b"div" => {
                    if block.is_some() {
                        if div_depth == field_div_depth
                            && matches!(field, Field::Text | Field::Note)
                        {
                            let value = commit(&mut buf);
                            if let Some(b) = block.as_mut() {
                                match field {
                                    Field::Text => b.text = Some(value),
                                    Field::Note => b.note = Some(value),
                                    _ => {}
                                }
                            }
                            field = Field::None;
                        }
                        div_depth -= 1;
                        if div_depth == 0
                            && let Some(done) = block.take()
                        {
                            doc.blocks.push(done);
                            field = Field::None;
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if field != Field::None {
                    buf.push_str(String::from_utf8_lossy(e.as_ref()).as_ref());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if field != Field::None {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        buf.push_str(&resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("stopping markup scan on parse error: {}", e);
                break;
            }
            _ => {}
        }
    }

    doc
}

/// Take the accumulated text, trimmed at both ends. Interior whitespace is
/// kept as written.
fn commit(buf: &mut String) -> String {
    let value = buf.trim().to_string();
    buf.clear();
    value
}

fn class_list(e: &BytesStart) -> Vec<String> {
    attr_value(e, b"class")
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Resolve entity references the device actually emits: the XML five, nbsp,
/// and numeric character references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "amp" => return Some("&".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "quot" => return Some("\"".to_string()),
        "apos" => return Some("'".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x")
        && let Ok(code) = u32::from_str_radix(hex, 16)
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }
    if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}
