//! The step catalog: one named step per workflow script.
//!
//! Each step reads its declared inputs from a [`WorkflowContext`], does its
//! work, and returns a [`StepOutputs`] holding exactly its declared outputs.
//! Steps never modify the context themselves.
//!
//! ```rust,no_run
//! use flowstep::{run_step, StepConfig, StepKind, WorkflowContext};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), flowstep::StepError> {
//! let config = StepConfig::from_env().build()?;
//! let mut ctx = WorkflowContext::from_value(json!({
//!     "media_data": {"file_path": "uploads/memo.m4a", "name": "memo.m4a"}
//! }))?;
//! let outputs = run_step(StepKind::ExtractFilePath, &ctx, &config).await?;
//! ctx.apply(outputs);
//! # Ok(())
//! # }
//! ```

use crate::client::ApiClient;
use crate::config::{FailurePolicy, StepConfig};
use crate::context::{Diagnostic, StepOutputs, WorkflowContext};
use crate::error::StepError;
use crate::extract::find_known_specialist;
use crate::file_ref::{shape_name, FileRef};
use crate::pipeline::batch::{analyze_pages, assemble};
use crate::pipeline::encode::encode_pages;
use crate::pipeline::inference::{provider_from_config, PageSource};
use crate::pipeline::knowledge::upload_knowledge;
use crate::pipeline::render::render_pdf;
use crate::pipeline::transfer::{extracted_folder, source_name, RemoteStorage};
use crate::prompts::{analysis_prompt, intent_prompt, Persona};
use crate::recording::summarize_recording;
use crate::scrape::scrape;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Folder assumed for uploads that only carry a file name.
pub const UPLOAD_DIR: &str = "/uploads";

/// Every step this crate can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    ExtractFilePath,
    ConvertPdfToImages,
    ProcessImagesWithAgent,
    PdfOcr,
    CreateKnowledgeConfig,
    CreateAnalysisPrompt,
    CreateTriagePrompt,
    ExtractSpecialist,
    CreateIntentPrompt,
    ProcessRecording,
    ScrapeWebsite,
}

impl StepKind {
    pub fn all() -> &'static [StepKind] {
        &[
            StepKind::ExtractFilePath,
            StepKind::ConvertPdfToImages,
            StepKind::ProcessImagesWithAgent,
            StepKind::PdfOcr,
            StepKind::CreateKnowledgeConfig,
            StepKind::CreateAnalysisPrompt,
            StepKind::CreateTriagePrompt,
            StepKind::ExtractSpecialist,
            StepKind::CreateIntentPrompt,
            StepKind::ProcessRecording,
            StepKind::ScrapeWebsite,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::ExtractFilePath => "extract_file_path",
            StepKind::ConvertPdfToImages => "convert_pdf_to_images",
            StepKind::ProcessImagesWithAgent => "process_images_with_agent",
            StepKind::PdfOcr => "pdf_ocr",
            StepKind::CreateKnowledgeConfig => "create_knowledge_config",
            StepKind::CreateAnalysisPrompt => "create_analysis_prompt",
            StepKind::CreateTriagePrompt => "create_triage_prompt",
            StepKind::ExtractSpecialist => "extract_specialist",
            StepKind::CreateIntentPrompt => "create_intent_prompt",
            StepKind::ProcessRecording => "process_recording",
            StepKind::ScrapeWebsite => "scrape_website",
        }
    }

    /// Context names the step reads. The bearer token is not listed; see
    /// [`StepKind::needs_token`].
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            StepKind::ExtractFilePath => &["media_data"],
            StepKind::ConvertPdfToImages => &["pdf_file"],
            StepKind::ProcessImagesWithAgent => &["images_data"],
            StepKind::PdfOcr => &["dpr_file"],
            StepKind::CreateKnowledgeConfig => &["ocr_results", "pdf_name"],
            StepKind::CreateAnalysisPrompt | StepKind::CreateTriagePrompt => {
                &["transcription_result"]
            }
            StepKind::ExtractSpecialist => &["analysis_result"],
            StepKind::CreateIntentPrompt => &["transcription_result", "mobile_number"],
            StepKind::ProcessRecording => &["file_path", "transcription_result", "agent_result"],
            StepKind::ScrapeWebsite => &["website_url"],
        }
    }

    /// Context names the step writes.
    pub fn outputs(&self) -> &'static [&'static str] {
        match self {
            StepKind::ExtractFilePath => &["file_path", "_info_extraction", "_debug_input"],
            StepKind::ConvertPdfToImages => &["images_data", "pdf_name"],
            StepKind::ProcessImagesWithAgent => &["ocr_results"],
            StepKind::PdfOcr => &["ocr_results", "pdf_name"],
            StepKind::CreateKnowledgeConfig => &["upload_response"],
            StepKind::CreateAnalysisPrompt => &["analysis_prompt"],
            StepKind::CreateTriagePrompt => &["analysis_prompt", "_debug_input", "_info_result"],
            StepKind::ExtractSpecialist => &["specialist_name"],
            StepKind::CreateIntentPrompt => &["prompt"],
            StepKind::ProcessRecording => &[
                "status",
                "message",
                "transcription",
                "agent_analysis",
                "file_path",
                "timestamp",
                "_info_process",
                "_info_transcription",
                "_warning_empty",
                "_error_process",
            ],
            StepKind::ScrapeWebsite => &["page_title", "page_content"],
        }
    }

    /// Whether the step calls the platform API and so needs a bearer token.
    pub fn needs_token(&self) -> bool {
        matches!(
            self,
            StepKind::ConvertPdfToImages
                | StepKind::ProcessImagesWithAgent
                | StepKind::PdfOcr
                | StepKind::CreateKnowledgeConfig
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StepKind {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::all()
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| StepError::UnknownStep {
                name: s.to_string(),
            })
    }
}

/// The bearer token: configured, else context `token`, else `user.token`.
pub fn resolve_token(ctx: &WorkflowContext, config: &StepConfig) -> Result<String, StepError> {
    if let Some(token) = config.token.as_deref() {
        return Ok(token.to_string());
    }
    let usable: fn(Option<&Value>) -> Option<&str> = |v| v.and_then(Value::as_str).filter(|t| !t.trim().is_empty());
    let from_ctx = usable(ctx.get("token"))
        .or_else(|| usable(ctx.get("user").and_then(|u| u.get("token"))));
    match from_ctx {
        Some(token) => Ok(token.to_string()),
        None => Err(StepError::missing("token")),
    }
}

/// Run one step against `ctx`.
pub async fn run_step(
    kind: StepKind,
    ctx: &WorkflowContext,
    config: &StepConfig,
) -> Result<StepOutputs, StepError> {
    let start = Instant::now();
    info!("Running step '{}'", kind);

    let outputs = match kind {
        StepKind::ExtractFilePath => extract_file_path(ctx),
        StepKind::ConvertPdfToImages => convert_pdf_to_images(ctx, config).await,
        StepKind::ProcessImagesWithAgent => process_images_with_agent(ctx, config).await,
        StepKind::PdfOcr => pdf_ocr(ctx, config).await,
        StepKind::CreateKnowledgeConfig => create_knowledge_config(ctx, config).await,
        StepKind::CreateAnalysisPrompt => create_analysis_prompt(ctx, Persona::GeneralPhysician),
        StepKind::CreateTriagePrompt => create_analysis_prompt(ctx, Persona::TriageAssistant),
        StepKind::ExtractSpecialist => extract_specialist(ctx),
        StepKind::CreateIntentPrompt => create_intent_prompt(ctx),
        StepKind::ProcessRecording => process_recording(ctx),
        StepKind::ScrapeWebsite => scrape_website(ctx, config).await,
    }?;

    info!(
        "Step '{}' finished in {}ms ({} outputs)",
        kind,
        start.elapsed().as_millis(),
        outputs.len()
    );
    Ok(outputs)
}

// ── File steps ───────────────────────────────────────────────────────────

fn extract_file_path(ctx: &WorkflowContext) -> Result<StepOutputs, StepError> {
    let raw = ctx.require("media_data")?;
    let file = ctx.file_ref("media_data")?;
    let path = file.path_or_named(UPLOAD_DIR).ok_or_else(|| {
        StepError::invalid("media_data", "no file path or file name in the upload")
    })?;

    let info = match file {
        FileRef::Path(_) => format!("Using direct file path: {path}"),
        FileRef::Descriptor(_) => format!("Extracted file path: {path}"),
    };

    let mut out = StepOutputs::new();
    out.set("file_path", path)?;
    out.diagnostic(Diagnostic::Info, "extraction", Some(info))?;
    out.diagnostic(
        Diagnostic::Debug,
        "input",
        Some(format!("media_data type: {}", shape_name(raw))),
    )?;
    Ok(out)
}

fn require_path(ctx: &WorkflowContext, name: &str) -> Result<String, StepError> {
    ctx.file_ref(name)?
        .path()
        .map(str::to_string)
        .ok_or_else(|| StepError::invalid(name, "file reference has no storage path"))
}

/// Read the source from disk when `path` names a local file, else download it.
async fn read_source(storage: &RemoteStorage, path: &str) -> Result<Vec<u8>, StepError> {
    let local = Path::new(path);
    if local.is_file() {
        debug!("Reading local file {}", local.display());
        return tokio::fs::read(local).await.map_err(|e| StepError::Io {
            path: local.to_path_buf(),
            source: e,
        });
    }
    storage.download(path).await
}

struct RenderedPdf {
    name: String,
    pages: Vec<PageSource>,
}

/// Fetch, rasterise, encode and upload every page of the PDF at `path`.
///
/// Each returned page carries its stored path and, when `keep_bytes`, its
/// encoded bytes.
async fn render_and_upload(
    storage: &RemoteStorage,
    path: &str,
    config: &StepConfig,
    keep_bytes: bool,
) -> Result<RenderedPdf, StepError> {
    let name = source_name(path);
    let bytes = read_source(storage, path).await?;
    let images = render_pdf(&name, bytes, config.render_scale).await?;
    let encoded = encode_pages(&images, &name)?;
    drop(images);

    let folder = extracted_folder(path, &config.extracted_folder_name);
    let stored = storage.upload_pages(&folder, &encoded).await?;

    let pages = encoded
        .into_iter()
        .zip(stored)
        .map(|(image, stored_path)| {
            let mut page = PageSource::from_image(image).with_stored_path(stored_path);
            if !keep_bytes {
                page.bytes = None;
            }
            page
        })
        .collect();
    Ok(RenderedPdf { name, pages })
}

async fn convert_pdf_to_images(
    ctx: &WorkflowContext,
    config: &StepConfig,
) -> Result<StepOutputs, StepError> {
    let path = require_path(ctx, "pdf_file")?;
    let api = ApiClient::new(&config.api_base_url, resolve_token(ctx, config)?)?;
    let storage = RemoteStorage::new(api, config.transfer_timeout_secs);

    let rendered = render_and_upload(&storage, &path, config, false).await?;
    let stored: Vec<String> = rendered
        .pages
        .into_iter()
        .filter_map(|p| p.stored_path)
        .collect();
    info!("Converted {} into {} page images", rendered.name, stored.len());

    let mut out = StepOutputs::new();
    out.set("images_data", json!(stored))?;
    out.set("pdf_name", rendered.name)?;
    Ok(out)
}

async fn process_images_with_agent(
    ctx: &WorkflowContext,
    config: &StepConfig,
) -> Result<StepOutputs, StepError> {
    let images = ctx.require_str_list("images_data")?;
    let api = ApiClient::new(&config.api_base_url, resolve_token(ctx, config)?)?;
    let provider = provider_from_config(config, &api);

    let pages: Vec<PageSource> = images
        .into_iter()
        .enumerate()
        .map(|(idx, path)| PageSource::stored(idx + 1, path))
        .collect();
    let (outcomes, _) = analyze_pages(
        &provider,
        &pages,
        config.effective_ocr_prompt(),
        config.failure_policy,
        config.progress.as_ref(),
    )
    .await?;

    let mut out = StepOutputs::new();
    out.set("ocr_results", assemble(&outcomes))?;
    Ok(out)
}

async fn pdf_ocr(ctx: &WorkflowContext, config: &StepConfig) -> Result<StepOutputs, StepError> {
    let path = require_path(ctx, "dpr_file")?;
    let api = ApiClient::new(&config.api_base_url, resolve_token(ctx, config)?)?;
    let storage = RemoteStorage::new(api.clone(), config.transfer_timeout_secs);
    let provider = provider_from_config(config, &api);

    let rendered = render_and_upload(&storage, &path, config, provider.needs_bytes()).await?;
    let (outcomes, summary) = analyze_pages(
        &provider,
        &rendered.pages,
        config.effective_ocr_prompt(),
        config.failure_policy,
        config.progress.as_ref(),
    )
    .await?;
    info!(
        "OCR of {}: {}/{} pages succeeded",
        rendered.name, summary.succeeded, summary.total_pages
    );

    let mut out = StepOutputs::new();
    out.set("ocr_results", assemble(&outcomes))?;
    out.set("pdf_name", rendered.name)?;
    Ok(out)
}

async fn create_knowledge_config(
    ctx: &WorkflowContext,
    config: &StepConfig,
) -> Result<StepOutputs, StepError> {
    let results = ctx.require_str("ocr_results")?;
    let name = ctx.require_str("pdf_name")?;
    let api = ApiClient::new(&config.api_base_url, resolve_token(ctx, config)?)?;

    let response = match upload_knowledge(
        &api,
        name,
        results,
        &config.knowledge,
        config.transfer_timeout_secs,
    )
    .await
    {
        Ok(body) => body,
        Err(e) => match config.failure_policy {
            FailurePolicy::Abort => return Err(e),
            FailurePolicy::Continue => {
                warn!("Knowledge upload for '{}' failed: {}", name, e);
                Value::String(format!("Error: {e}"))
            }
        },
    };

    let mut out = StepOutputs::new();
    out.set("upload_response", response)?;
    Ok(out)
}

// ── Text steps ───────────────────────────────────────────────────────────

fn create_analysis_prompt(
    ctx: &WorkflowContext,
    persona: Persona,
) -> Result<StepOutputs, StepError> {
    let transcription = ctx.require_str("transcription_result")?;
    let prompt = analysis_prompt(persona, transcription);

    let mut out = StepOutputs::new();
    if persona == Persona::TriageAssistant {
        out.diagnostic(
            Diagnostic::Debug,
            "input",
            Some(format!("transcription_result={transcription}")),
        )?;
        out.diagnostic(
            Diagnostic::Info,
            "result",
            Some(format!("analysis_prompt={prompt}")),
        )?;
    }
    out.set("analysis_prompt", prompt)?;
    Ok(out)
}

fn extract_specialist(ctx: &WorkflowContext) -> Result<StepOutputs, StepError> {
    if !ctx.contains("analysis_result") {
        return Err(StepError::missing("analysis_result"));
    }
    let found = ctx
        .optional_str("analysis_result")?
        .and_then(find_known_specialist);
    debug!("Specialist found: {:?}", found);

    let mut out = StepOutputs::new();
    out.set("specialist_name", found.map_or(Value::Null, Value::String))?;
    Ok(out)
}

fn create_intent_prompt(ctx: &WorkflowContext) -> Result<StepOutputs, StepError> {
    let transcription = ctx.require_str("transcription_result")?;
    let mobile = match ctx.require("mobile_number")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(StepError::invalid(
                "mobile_number",
                format!("expected text or a number, got {}", shape_name(other)),
            ))
        }
    };

    let mut out = StepOutputs::new();
    out.set("prompt", intent_prompt(&mobile, transcription))?;
    Ok(out)
}

fn process_recording(ctx: &WorkflowContext) -> Result<StepOutputs, StepError> {
    let file_path = ctx.require_str("file_path")?;
    let transcription = ctx.require("transcription_result")?;
    let agent = ctx.require("agent_result")?;

    let report = summarize_recording(file_path, transcription, agent, Utc::now());
    info!("Recording {}: {}", file_path, report.message);
    report.into_outputs()
}

async fn scrape_website(
    ctx: &WorkflowContext,
    config: &StepConfig,
) -> Result<StepOutputs, StepError> {
    let url = ctx.require_str("website_url")?;
    if url.trim().is_empty() {
        return Err(StepError::missing("website_url"));
    }
    let page = scrape(url, config.scrape_max_chars, config.transfer_timeout_secs).await?;

    let mut out = StepOutputs::new();
    out.set("page_title", page.title)?;
    out.set("page_content", page.content)?;
    Ok(out)
}
