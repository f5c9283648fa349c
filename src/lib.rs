//! # flowstep
//!
//! Typed workflow steps for document OCR, prompt building and remote agent
//! calls.
//!
//! A workflow engine runs steps one after another over a shared bag of named
//! values. Each step here reads its inputs from a [`WorkflowContext`], does one
//! narrow job, and hands back a [`StepOutputs`] that the caller merges into
//! the context for the next step.
//!
//! ## Pipeline Overview
//!
//! The OCR steps share one ingest shape:
//!
//! ```text
//! context
//!  │
//!  ├─ 1. Read      normalise the file reference (FileRef)
//!  ├─ 2. Fetch     local file, or download from storage (per-segment encoded path)
//!  ├─ 3. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 4. Encode    lossless PNG, {stem}_page_{n}.png
//!  ├─ 5. Upload    page images into {dir}/extracted_files
//!  ├─ 6. Infer     one agent or tool call per page, in order, under a FailurePolicy
//!  └─ 7. Write     assembled text back to the context
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowstep::{run_step, FailurePolicy, StepConfig, StepKind, WorkflowContext};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API_URL / API_TOKEN from the environment
//!     let config = StepConfig::from_env()
//!         .failure_policy(FailurePolicy::Continue)
//!         .build()?;
//!
//!     let mut ctx = WorkflowContext::from_value(json!({
//!         "dpr_file": {"file_path": "tenders/dpr/plan.pdf"}
//!     }))?;
//!     for step in [StepKind::PdfOcr, StepKind::CreateKnowledgeConfig] {
//!         let outputs = run_step(step, &ctx, &config).await?;
//!         ctx.apply(outputs);
//!     }
//!     println!("{}", ctx.to_value()["ocr_results"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `flowstep` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! flowstep = { version = "0.1", default-features = false }
//! ```
//!
//! ## Failure policy
//!
//! A page whose inference call fails either aborts the batch
//! ([`FailurePolicy::Abort`]) or is replaced by an inline
//! `<!-- Error processing page N: ... -->` marker ([`FailurePolicy::Continue`]).
//! The policy is always explicit configuration.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod file_ref;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recording;
pub mod scrape;
pub mod steps;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::ApiClient;
pub use config::{FailurePolicy, InferenceBackend, KnowledgeSettings, StepConfig, StepConfigBuilder};
pub use context::{Diagnostic, StepOutputs, WorkflowContext};
pub use error::{PageError, StepError};
pub use file_ref::{FileDescriptor, FileRef};
pub use pipeline::batch::{analyze_pages, BatchSummary, PageOutcome};
pub use pipeline::inference::{InferenceProvider, PageSource};
pub use progress::{NoopProgress, PageProgress, ProgressCallback};
pub use steps::{resolve_token, run_step, StepKind};
