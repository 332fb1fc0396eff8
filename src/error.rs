use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineState;
use crate::sections::Section;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Element not found: {key}")]
    ElementNotFound { key: String },

    #[error("Ambiguous element: {key} matched {count} elements")]
    AmbiguousElement { key: String, count: usize },

    #[error("Menu for {key} did not appear within {timeout:?}")]
    MenuTimeout { key: String, timeout: Duration },

    #[error("Section '{section}' failed: {source}")]
    FillFailed {
        section: Section,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "Receipt number not found after submit; the form may have accepted the data, verify manually"
    )]
    ReceiptNotFound,

    #[error("Browser session error: {0}")]
    SessionError(String),

    #[error("Cannot {op} while engine is {state}")]
    InvalidState { op: &'static str, state: EngineState },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Submission sink error: {0}")]
    Sink(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Section name carried by a `FillFailed`, if any.
    pub fn failed_section(&self) -> Option<Section> {
        match self {
            Error::FillFailed { section, .. } => Some(*section),
            _ => None,
        }
    }

    /// The innermost cause, unwrapping `FillFailed`.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::FillFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
