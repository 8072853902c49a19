use std::path::PathBuf;

use thiserror::Error;

/// Fatal, run-aborting failures. Everything else (unreadable files, failed
/// upload batches) is logged and skipped.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("pocketbook not mounted: notes directory {} does not exist", .0.display())]
    DeviceNotMounted(PathBuf),
    #[error("readwise token not found")]
    MissingToken,
}
