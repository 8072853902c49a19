use std::error::Error;

pub mod config;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod library;
pub mod markup;
pub mod model;
pub mod readwise;
pub mod state;
pub mod sync;

/// Flatten an error chain into a single log-friendly line.
pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
