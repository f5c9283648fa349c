//! Error types for the flowstep library.
//!
//! Two error types reflect two failure modes:
//!
//! * [`StepError`]: **Fatal**. The step cannot produce its outputs (missing
//!   input, unusable configuration, remote call rejected, PDF unreadable).
//!   The workflow engine surfaces its message as the step failure.
//!
//! * [`PageError`]: **Non-fatal**. One page of a batch failed while the
//!   batch runs under [`crate::config::FailurePolicy::Continue`]. It is stored
//!   in [`crate::pipeline::batch::PageOutcome`] and the page's slot in the
//!   output text is replaced with an error marker.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by flowstep steps.
#[derive(Debug, Error)]
pub enum StepError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A variable the step consumes is absent from the context or null.
    #[error("Required variable '{name}' not found in workflow context")]
    MissingInput { name: String },

    /// A variable is present but its shape cannot be used.
    #[error("Invalid value for '{name}': {detail}")]
    InvalidInput { name: String, detail: String },

    /// A step tried to write the same output name twice.
    #[error("Output '{name}' was already written by this step")]
    OutputConflict { name: String },

    /// The name does not match any known step.
    #[error("Unknown step '{name}'. Run `flowstep list` to see available steps.")]
    UnknownStep { name: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Remote errors ─────────────────────────────────────────────────────
    /// The remote service answered with a non-success status.
    #[error("HTTP {status} from '{url}'{}", body_suffix(.body))]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response.
    #[error("Could not reach '{url}': {reason}\nCheck the API host and your network connection.")]
    Connectivity { url: String, reason: String },

    /// The request exceeded its configured timeout.
    #[error("Request to '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// The response arrived but does not have the expected shape.
    #[error("Unexpected response from '{url}': {detail}")]
    BadResponse { url: String, detail: String },

    /// The remote tool reported `success: false`.
    #[error("Remote tool reported failure: {message}")]
    RemoteFailure { message: String },

    /// A page failed while the batch runs under the abort policy.
    #[error("Page {page} failed, batch aborted: {source}")]
    PageAborted {
        page: usize,
        #[source]
        source: Box<StepError>,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The bytes do not start with the `%PDF` magic.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading a local source file failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepError {
    /// Convert a `reqwest` transport error into the matching variant.
    pub fn from_transport(url: &str, err: reqwest::Error, timeout_secs: Option<u64>) -> Self {
        if err.is_timeout() {
            StepError::Timeout {
                url: url.to_string(),
                secs: timeout_secs.unwrap_or_default(),
            }
        } else {
            StepError::Connectivity {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub(crate) fn missing(name: &str) -> Self {
        StepError::MissingInput {
            name: name.to_string(),
        }
    }

    pub(crate) fn invalid(name: &str, detail: impl Into<String>) -> Self {
        StepError::InvalidInput {
            name: name.to_string(),
            detail: detail.into(),
        }
    }
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The inference call for this page failed.
    #[error("Page {page}: inference failed: {detail}")]
    InferenceFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::InferenceFailed { page, .. } => *page,
        }
    }

    /// The underlying message without the page prefix.
    pub fn detail(&self) -> &str {
        match self {
            PageError::InferenceFailed { detail, .. } => detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_display_includes_code() {
        let e = StepError::HttpStatus {
            url: "http://localhost:4000/api/uploads/download/a".into(),
            status: 404,
            body: String::new(),
        };
        let msg = e.to_string();
        assert!(msg.contains("404"), "got: {msg}");
        assert!(!msg.ends_with(": "), "empty body must not leave a dangling colon");
    }

    #[test]
    fn http_status_display_with_body() {
        let e = StepError::HttpStatus {
            url: "http://h/x".into(),
            status: 500,
            body: "boom".into(),
        };
        assert!(e.to_string().ends_with(": boom"));
    }

    #[test]
    fn missing_input_display() {
        let e = StepError::missing("media_data");
        assert_eq!(
            e.to_string(),
            "Required variable 'media_data' not found in workflow context"
        );
    }

    #[test]
    fn page_aborted_keeps_source() {
        let inner = StepError::HttpStatus {
            url: "http://h/run".into(),
            status: 502,
            body: String::new(),
        };
        let e = StepError::PageAborted {
            page: 2,
            source: Box::new(inner),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"));
        assert!(msg.contains("502"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn page_error_accessors() {
        let e = PageError::InferenceFailed {
            page: 3,
            detail: "timeout".into(),
        };
        assert_eq!(e.page(), 3);
        assert_eq!(e.detail(), "timeout");
        assert!(e.to_string().contains("Page 3"));
    }
}
