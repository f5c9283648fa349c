//! Sequential per-page inference under an explicit failure policy.
//!
//! Pages are sent one after another, in page order. Under
//! [`FailurePolicy::Continue`] a failed page keeps its slot and its text is
//! replaced by [`error_marker`]; under [`FailurePolicy::Abort`] the first
//! failure ends the batch with [`StepError::PageAborted`].

use crate::config::FailurePolicy;
use crate::error::{PageError, StepError};
use crate::pipeline::inference::{InferenceProvider, PageSource};
use crate::pipeline::postprocess::clean_page_text;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Separator between page texts in the assembled output.
pub const PAGE_JOINER: &str = "\n\n";

/// Result of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Cleaned text, or the error marker when `error` is set.
    pub text: String,
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Inline placeholder for a page whose call failed.
///
/// An HTML comment, so it stays invisible when the Markdown is rendered.
pub fn error_marker(page_num: usize, detail: &str) -> String {
    format!("<!-- Error processing page {page_num}: {} -->", detail.replace("-->", "- ->"))
}

/// Analyse `pages` in order with `provider`.
///
/// Returns one outcome per input page, in input order.
pub async fn analyze_pages(
    provider: &Arc<dyn InferenceProvider>,
    pages: &[PageSource],
    prompt: &str,
    policy: FailurePolicy,
    progress: Option<&ProgressCallback>,
) -> Result<(Vec<PageOutcome>, BatchSummary), StepError> {
    let batch_start = Instant::now();
    let total = pages.len();
    info!(
        "Analysing {} pages with '{}' (policy: {:?})",
        total,
        provider.name(),
        policy
    );
    if let Some(cb) = progress {
        cb.on_batch_start(total);
    }

    let mut outcomes = Vec::with_capacity(total);
    for page in pages {
        let start = Instant::now();
        if let Some(cb) = progress {
            cb.on_page_start(page.page_num, total);
        }

        match provider.analyze(page, prompt).await {
            Ok(raw) => {
                let text = clean_page_text(&raw);
                debug!("Page {}: {} chars", page.page_num, text.len());
                if let Some(cb) = progress {
                    cb.on_page_complete(page.page_num, total, text.len());
                }
                outcomes.push(PageOutcome {
                    page_num: page.page_num,
                    text,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: None,
                });
            }
            Err(e) => {
                let detail = e.to_string();
                warn!("Page {} ({}) failed: {}", page.page_num, page.label(), detail);
                if let Some(cb) = progress {
                    cb.on_page_error(page.page_num, total, &detail);
                }
                match policy {
                    FailurePolicy::Abort => {
                        return Err(StepError::PageAborted {
                            page: page.page_num,
                            source: Box::new(e),
                        });
                    }
                    FailurePolicy::Continue => outcomes.push(PageOutcome {
                        page_num: page.page_num,
                        text: error_marker(page.page_num, &detail),
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: Some(PageError::InferenceFailed {
                            page: page.page_num,
                            detail,
                        }),
                    }),
                }
            }
        }
    }

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    let summary = BatchSummary {
        total_pages: total,
        succeeded,
        failed: total - succeeded,
        duration_ms: batch_start.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} pages, {}ms",
        summary.succeeded, summary.total_pages, summary.duration_ms
    );
    if let Some(cb) = progress {
        cb.on_batch_complete(total, succeeded);
    }

    Ok((outcomes, summary))
}

/// Join page texts in page order.
pub fn assemble(outcomes: &[PageOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| o.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_JOINER)
}
