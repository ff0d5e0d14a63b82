use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::browser::BrowserError;

use super::pagination::CollectionResult;

pub type CollectResult<T> = Result<T, CollectError>;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no captured response matched {pattern} within {waited_ms}ms")]
    CaptureNotFound { pattern: String, waited_ms: u64 },
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("{entity} does not match the expected shape: {reason}")]
    SchemaMismatch { entity: &'static str, reason: String },
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),
    #[error("session is not authenticated: {0}")]
    Authentication(String),
    #[error("upstream returned status {status} for {url}")]
    Upstream { status: u16, url: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<CollectError>,
    },
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl CollectError {
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        CollectError::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(entity: &'static str, reason: impl Into<String>) -> Self {
        CollectError::SchemaMismatch {
            entity,
            reason: reason.into(),
        }
    }

    /// The error that ended a retry sequence, unwrapping exhaustion.
    pub fn root_cause(&self) -> &CollectError {
        match self {
            CollectError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transient,
    RateLimited,
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureClass::Transient => "transient",
            FailureClass::RateLimited => "rate_limited",
            FailureClass::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

pub struct ErrorCategorizer;

impl ErrorCategorizer {
    pub fn categorize(error: &CollectError) -> FailureClass {
        match error {
            CollectError::CaptureNotFound { .. } => FailureClass::Transient,
            CollectError::Upstream { status, .. } if *status >= 500 => FailureClass::Transient,
            CollectError::Upstream { .. } => FailureClass::Fatal,
            CollectError::RateLimited(_) => FailureClass::RateLimited,
            CollectError::MalformedResponse { .. }
            | CollectError::SchemaMismatch { .. }
            | CollectError::Authentication(_)
            | CollectError::NotFound(_)
            | CollectError::RetriesExhausted { .. } => FailureClass::Fatal,
            CollectError::Browser(err) => Self::categorize_browser(err),
        }
    }

    fn categorize_browser(error: &BrowserError) -> FailureClass {
        match error {
            BrowserError::Timeout(_)
            | BrowserError::Network(_)
            | BrowserError::ElementNotFound(_) => FailureClass::Transient,
            BrowserError::Cdp(err) => {
                let text = err.to_string().to_lowercase();
                if text.contains("timeout") || text.contains("timed out") {
                    FailureClass::Transient
                } else {
                    FailureClass::Fatal
                }
            }
            BrowserError::Launch(_)
            | BrowserError::Io(_)
            | BrowserError::Configuration(_)
            | BrowserError::Unexpected(_) => FailureClass::Fatal,
        }
    }
}

/// A collection that stopped on an error, carrying every item gathered before it.
#[derive(Debug)]
pub struct CollectFailure<T> {
    pub error: CollectError,
    pub partial: CollectionResult<T>,
}

impl<T> CollectFailure<T> {
    pub fn new(error: CollectError, items: Vec<T>) -> Self {
        Self {
            error,
            partial: CollectionResult::new(items),
        }
    }

    pub fn empty(error: CollectError) -> Self {
        Self::new(error, Vec::new())
    }

    pub fn map<U, F>(self, f: F) -> CollectFailure<U>
    where
        F: FnMut(T) -> U,
    {
        CollectFailure::new(self.error, self.partial.items.into_iter().map(f).collect())
    }
}

impl<T> fmt::Display for CollectFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} items collected before failure)",
            self.error, self.partial.count
        )
    }
}

impl<T: fmt::Debug> std::error::Error for CollectFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<CollectError> for CollectFailure<T> {
    fn from(error: CollectError) -> Self {
        CollectFailure::empty(error)
    }
}
