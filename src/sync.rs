//! The sync pass: group, gate on content hashes, extract, diff, upload.

use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::extract;
use crate::library;
use crate::model::{self, HighlightPayload};
use crate::readwise::HighlightSink;
use crate::state::SyncStateStore;
use crate::unpack_error;

/// Counters for one sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub books_total: usize,
    pub books_skipped: usize,
    /// Highlights uploaded this run (or, in a dry run, that would have been).
    pub uploaded: usize,
    pub failed_batches: usize,
}

pub struct Syncer<'a> {
    config: &'a Config,
    store: SyncStateStore,
    sink: &'a dyn HighlightSink,
    dry_run: bool,
}

impl<'a> Syncer<'a> {
    pub fn new(config: &'a Config, store: SyncStateStore, sink: &'a dyn HighlightSink) -> Self {
        Self {
            config,
            store,
            sink,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one full pass over the notes directory. Sequential throughout:
    /// one file, one book, one request at a time.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let book_groups = library::group_books(&self.config.notes_dir, &self.config.encodings)?;
        info!("found {} unique books", book_groups.len());

        let mut report = SyncReport {
            books_total: book_groups.len(),
            ..SyncReport::default()
        };

        let mut titles: Vec<&String> = book_groups.keys().collect();
        titles.sort();

        for group_title in titles {
            let Some(latest) = library::latest_file(&book_groups[group_title]) else {
                continue;
            };
            self.sync_book(group_title, &latest.path, &mut report).await?;
        }

        info!("sync complete, {} new highlights uploaded", report.uploaded);
        Ok(report)
    }

    async fn sync_book(
        &mut self,
        group_title: &str,
        path: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("could not read {}: {}", path.display(), e);
                return Ok(());
            }
        };

        let hash = model::content_hash(&bytes);
        if self.store.file_hash(path) == Some(hash.as_str()) {
            info!("skipping '{}' - no changes", group_title);
            report.books_skipped += 1;
            return Ok(());
        }

        info!("processing '{}'", group_title);
        let book = extract::parse_export(path, &bytes, &self.config.encodings);

        let pending: Vec<(String, HighlightPayload)> = book
            .highlights
            .iter()
            .filter(|h| !self.store.has_synced(&h.id))
            .map(|h| (h.id.clone(), HighlightPayload::new(&book.title, &book.author, h)))
            .collect();

        if pending.is_empty() {
            info!("no new highlights for '{}'", book.title);
        } else {
            info!("found {} new highlights for '{}'", pending.len(), book.title);
        }

        if self.dry_run {
            // Leave all state untouched so a later real run uploads the
            // exact same set.
            report.uploaded += pending.len();
            return Ok(());
        }

        let mut all_batches_ok = true;

        for batch in pending.chunks(self.config.batch_size) {
            let payloads: Vec<HighlightPayload> = batch.iter().map(|(_, p)| p.clone()).collect();
            match self.sink.send(&payloads).await {
                Ok(()) => {
                    let synced_at = Utc::now().to_rfc3339();
                    for (id, _) in batch {
                        self.store.mark_synced(id, &book.title, &synced_at);
                    }
                    report.uploaded += batch.len();
                    info!("synced batch of {} highlights", batch.len());
                }
                Err(e) => {
                    warn!(
                        "failed to sync batch of {}: {}",
                        batch.len(),
                        unpack_error(e.as_ref())
                    );
                    report.failed_batches += 1;
                    all_batches_ok = false;
                }
            }
        }

        // A book counts as seen only once fully uploaded; otherwise the next
        // run re-parses this file and retries whatever is still unsynced.
        if all_batches_ok {
            self.store.set_file_hash(path, &hash);
        }

        self.store.save()?;
        Ok(())
    }
}
