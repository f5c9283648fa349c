//! Progress-callback trait for per-page batch events.
//!
//! Inject an [`Arc<dyn PageProgress>`] via
//! [`crate::config::StepConfigBuilder::progress_callback`] to receive events
//! while a page batch is rendered, uploaded and analysed. The CLI forwards
//! them to a terminal progress bar.
//!
//! ```rust
//! use flowstep::{PageProgress, StepConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl PageProgress for Counter {
//!     fn on_page_complete(&self, _page_num: usize, _total: usize, _text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = StepConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it processes each page.
///
/// Pages are processed one after another, but the trait is `Send + Sync`
/// so implementations can be shared with other tasks. Every method has a
/// no-op default.
pub trait PageProgress: Send + Sync {
    /// Called once before the first page.
    fn on_batch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the remote call for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced text.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when a page's remote call failed.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the batch, unless it was aborted.
    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Progress sink that ignores every event.
pub struct NoopProgress;

impl PageProgress for NoopProgress {}

/// The type stored in [`crate::config::StepConfig`].
pub type ProgressCallback = Arc<dyn PageProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PageProgress for Tracking {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgress);
        cb.on_batch_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_error(1, 2, "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking::default();
        t.on_page_start(1, 2);
        t.on_page_complete(1, 2, 10);
        t.on_page_start(2, 2);
        t.on_page_error(2, 2, "HTTP 500");
        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }
}
