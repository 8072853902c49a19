//! Discovery and grouping of export files by book.
//!
//! The device writes a fresh export snapshot per book every time notes are
//! exported, so a directory accumulates several files for the same title.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use tracing::warn;

use crate::encoding;
use crate::error::SyncError;
use crate::extract::DATE_TITLE_DELIMITER;
use crate::markup;

/// macOS writes AppleDouble siblings next to every file on FAT mounts.
const JUNK_PREFIX: &str = "._";
const EXPORT_EXTENSION: &str = "html";

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Scan the notes directory and group export files by inferred book title.
///
/// A missing directory is fatal (device not mounted). Unreadable or
/// undecodable files are logged and left out of every group. Titles are
/// matched exactly; near-duplicate titles from export naming quirks stay
/// separate books.
pub fn group_books(
    notes_dir: &Path,
    encodings: &[String],
) -> Result<HashMap<String, Vec<ExportFile>>> {
    if !notes_dir.is_dir() {
        return Err(SyncError::DeviceNotMounted(notes_dir.to_path_buf()).into());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(notes_dir)?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    let mut groups: HashMap<String, Vec<ExportFile>> = HashMap::new();

    for path in entries {
        if !is_export_candidate(&path) {
            continue;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("could not read {}: {}", path.display(), e);
                continue;
            }
        };

        let html = match encoding::decode_export(&bytes, encodings) {
            Ok(html) => html,
            Err(e) => {
                warn!("could not decode {}: {}, skipping", path.display(), e);
                continue;
            }
        };

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("could not stat {}: {}", path.display(), e);
                continue;
            }
        };

        let title = book_title(&html, &path);
        groups.entry(title).or_default().push(ExportFile { path, modified });
    }

    Ok(groups)
}

/// The most-recently-modified file in a group is the authoritative snapshot;
/// older ones are superseded, never merged.
pub fn latest_file(files: &[ExportFile]) -> Option<&ExportFile> {
    files.iter().max_by_key(|f| f.modified)
}

fn is_export_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(JUNK_PREFIX) {
        return false;
    }

    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXPORT_EXTENSION))
        && path.is_file()
}

/// Title used for grouping: first heading, else the document title element,
/// else the filename stem. A date prefix on the heading is stripped so
/// snapshots exported on different days land in the same group.
fn book_title(html: &str, path: &Path) -> String {
    let doc = markup::scan_export(html);
    let raw = doc
        .heading
        .or(doc.title_tag)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    match raw {
        Some(text) => match text.split_once(DATE_TITLE_DELIMITER) {
            Some((_, title)) => title.to_string(),
            None => text,
        },
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    }
}
