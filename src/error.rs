//! Error types for ghost-reference processing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while cleaning a document.
///
/// Everything except [`Error::Classification`] is fatal to a run. A
/// classification failure is recovered by the classifier itself.
#[derive(Error, Debug)]
pub enum Error {
    /// The operator closed a selection prompt without choosing anything.
    #[error("selection cancelled: {0}")]
    SelectionCancelled(String),

    /// The document is missing, locked, or not a valid package.
    #[error("cannot open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The document body could not be parsed.
    #[error("cannot parse {part}: {reason}")]
    Parse { part: String, reason: String },

    /// The modified document or one of the output artifacts could not be written.
    #[error("cannot save {path}: {reason}")]
    Save { path: PathBuf, reason: String },

    /// Recoverable, per-reference failure (for example a live field refresh).
    #[error("classification failed for {code:?}: {reason}")]
    Classification { code: String, reason: String },

    /// Bad operator input, such as an out-of-range start page.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Reconciliation changed displayed text; the run is aborted.
    #[error("displayed text changed in {part} (before={before} after={after})")]
    TextAltered {
        part: String,
        before: String,
        after: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn parse(part: &str, reason: impl ToString) -> Self {
        Error::Parse {
            part: part.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn save(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Save {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the one error kind the run recovers from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Classification { .. })
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::parse("xml", err)
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::parse("xml attribute", err)
    }
}
