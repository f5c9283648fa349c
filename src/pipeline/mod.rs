//! Pipeline stages for file ingest and remote processing.
//!
//! Each submodule implements one stage. The OCR steps chain them:
//!
//! ```text
//! transfer ──▶ render ──▶ encode ──▶ transfer ──▶ inference ──▶ postprocess
//! (download)   (pdfium)   (PNG)      (upload)     (per page)    (cleanup)
//!                                                      │
//!                                               batch (policy)
//! ```
//!
//! 1. [`transfer`]: download source bytes and upload page images
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: lossless PNG encoding and page file naming
//! 4. [`inference`]: one remote agent or tool call per page
//! 5. [`batch`]: drive pages in order under a [`crate::FailurePolicy`]
//! 6. [`postprocess`]: tidy the text each page returns
//! 7. [`knowledge`]: push assembled text into a knowledge collection

pub mod batch;
pub mod encode;
pub mod inference;
pub mod knowledge;
pub mod postprocess;
pub mod render;
pub mod transfer;
