//! Finds and removes ghost references in `.docx` documents: hyperlinks and
//! fields whose target bookmark no longer exists, plus bookmarks nothing
//! points at any more. Displayed text is never changed.

pub mod access;
pub mod anchors;
pub mod classify;
pub mod config;
pub mod docx;
pub mod error;
pub mod field;
pub mod findings;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod reconcile;
pub mod runlog;

pub use error::{Error, Result};
