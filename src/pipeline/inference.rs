//! Remote inference: one agent or tool call per page image.
//!
//! Two endpoints exist for the same job and both are supported behind
//! [`InferenceProvider`]:
//!
//! | Provider | Route | Page input | Text field |
//! |----------|-------|------------|------------|
//! | [`AgentRuntimeProvider`] | `/api/agent-runtime/run` | image bytes (multipart) | `content` |
//! | [`ToolMethodProvider`] | `/api/tools/execute-method` | stored path (JSON) | `result` |
//!
//! Providers make exactly one request per call and never retry; the
//! per-page failure policy lives in [`crate::pipeline::batch`].

use crate::client::ApiClient;
use crate::config::{InferenceBackend, StepConfig};
use crate::error::StepError;
use crate::file_ref::basename;
use crate::pipeline::encode::{PageImage, PAGE_IMAGE_MIME};
use crate::pipeline::transfer::RemoteStorage;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const AGENT_ROUTE: &str = "/api/agent-runtime/run";
const TOOL_ROUTE: &str = "/api/tools/execute-method";

/// A page handed to an inference provider.
///
/// Carries the encoded bytes, the stored path, or both; each provider uses
/// whichever its endpoint needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    /// 1-indexed page number.
    pub page_num: usize,
    pub file_name: String,
    pub bytes: Option<Vec<u8>>,
    pub stored_path: Option<String>,
}

impl PageSource {
    pub fn from_image(image: PageImage) -> Self {
        Self {
            page_num: image.page_num,
            file_name: image.file_name,
            bytes: Some(image.bytes),
            stored_path: None,
        }
    }

    pub fn stored(page_num: usize, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            page_num,
            file_name: format!("page_{page_num}.png"),
            bytes: None,
            stored_path: Some(path),
        }
    }

    pub fn with_stored_path(mut self, path: impl Into<String>) -> Self {
        self.stored_path = Some(path.into());
        self
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match &self.stored_path {
            Some(p) => basename(p).unwrap_or_else(|| p.clone()),
            None => self.file_name.clone(),
        }
    }
}

/// A remote endpoint that turns one page image into text.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Whether the provider reads the page bytes (as opposed to the stored path).
    fn needs_bytes(&self) -> bool;

    /// Analyse one page with `prompt` and return the designated text field.
    async fn analyze(&self, page: &PageSource, prompt: &str) -> Result<String, StepError>;
}

/// Build the provider selected by `config.inference_backend`.
pub fn provider_from_config(config: &StepConfig, api: &ApiClient) -> Arc<dyn InferenceProvider> {
    match config.inference_backend {
        InferenceBackend::Agent => Arc::new(AgentRuntimeProvider::new(
            api.clone(),
            RemoteStorage::new(api.clone(), config.transfer_timeout_secs),
            config.agent_name.clone(),
            config.inference_timeout_secs,
        )),
        InferenceBackend::Tool => Arc::new(ToolMethodProvider::new(
            api.clone(),
            config.tool_config_name.clone(),
            config.tool_method_name.clone(),
            config.inference_timeout_secs,
        )),
    }
}

// ── Agent runtime ────────────────────────────────────────────────────────

/// Sends page bytes to a named agent as a multipart form.
#[derive(Debug, Clone)]
pub struct AgentRuntimeProvider {
    api: ApiClient,
    storage: RemoteStorage,
    agent_name: String,
    timeout_secs: Option<u64>,
}

impl AgentRuntimeProvider {
    pub fn new(
        api: ApiClient,
        storage: RemoteStorage,
        agent_name: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            api,
            storage,
            agent_name: agent_name.into(),
            timeout_secs,
        }
    }

    async fn page_bytes(&self, page: &PageSource) -> Result<Vec<u8>, StepError> {
        if let Some(bytes) = &page.bytes {
            return Ok(bytes.clone());
        }
        match &page.stored_path {
            Some(path) => self.storage.download(path).await,
            None => Err(StepError::invalid(
                "page",
                format!("page {} has neither bytes nor a stored path", page.page_num),
            )),
        }
    }
}

#[async_trait]
impl InferenceProvider for AgentRuntimeProvider {
    fn name(&self) -> &str {
        &self.agent_name
    }

    fn needs_bytes(&self) -> bool {
        true
    }

    async fn analyze(&self, page: &PageSource, prompt: &str) -> Result<String, StepError> {
        let bytes = self.page_bytes(page).await?;
        let url = self.api.endpoint(AGENT_ROUTE);
        info!(
            "Page {}: running agent '{}' on {}",
            page.page_num,
            self.agent_name,
            page.label()
        );

        let part = Part::bytes(bytes)
            .file_name(page.file_name.clone())
            .mime_str(PAGE_IMAGE_MIME)
            .map_err(|e| StepError::Internal(format!("multipart part: {e}")))?;
        let form = Form::new()
            .text("agent_name", self.agent_name.clone())
            .text("prompt", prompt.to_string())
            .part("files", part);

        let response = self
            .api
            .send(&url, self.api.post(&url).multipart(form), self.timeout_secs)
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| StepError::from_transport(&url, e, self.timeout_secs))?;

        Ok(agent_content(&body))
    }
}

/// Pull the `content` field out of an agent response.
///
/// A JSON object without `content` yields an empty string, a JSON string is
/// returned as-is, and a body that is not JSON is treated as plain text.
pub fn agent_content(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                warn!("Agent response has no 'content' field");
                String::new()
            }
            Some(other) => other.to_string(),
        },
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => {
            debug!("Agent response is not JSON; using raw body");
            body.to_string()
        }
    }
}

// ── Tool method ──────────────────────────────────────────────────────────

/// Asks a configured tool to analyse a page that is already in storage.
#[derive(Debug, Clone)]
pub struct ToolMethodProvider {
    api: ApiClient,
    config_name: String,
    method_name: String,
    timeout_secs: Option<u64>,
}

impl ToolMethodProvider {
    pub fn new(
        api: ApiClient,
        config_name: impl Into<String>,
        method_name: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            api,
            config_name: config_name.into(),
            method_name: method_name.into(),
            timeout_secs,
        }
    }

    /// The JSON body sent for one page.
    pub fn request_body(&self, stored_path: &str, prompt: &str) -> Value {
        json!({
            "config_name": self.config_name,
            "method_name": self.method_name,
            "parameters": {
                "file_path": stored_path,
                "prompt": prompt,
            }
        })
    }
}

#[async_trait]
impl InferenceProvider for ToolMethodProvider {
    fn name(&self) -> &str {
        &self.config_name
    }

    fn needs_bytes(&self) -> bool {
        false
    }

    async fn analyze(&self, page: &PageSource, prompt: &str) -> Result<String, StepError> {
        let stored_path = page.stored_path.as_deref().ok_or_else(|| {
            StepError::invalid(
                "page",
                format!(
                    "page {} must be uploaded before '{}' can read it",
                    page.page_num, self.method_name
                ),
            )
        })?;
        let url = self.api.endpoint(TOOL_ROUTE);
        info!(
            "Page {}: calling {}.{} on {}",
            page.page_num,
            self.config_name,
            self.method_name,
            page.label()
        );

        let request = self.api.post(&url).json(&self.request_body(stored_path, prompt));
        let response = self.api.send(&url, request, self.timeout_secs).await?;
        let body: Value = response.json().await.map_err(|e| StepError::BadResponse {
            url: url.clone(),
            detail: format!("tool response is not JSON: {e}"),
        })?;

        tool_result(&body)
    }
}

/// Interpret a tool response: `success` → `result`, otherwise `error`.
pub fn tool_result(body: &Value) -> Result<String, StepError> {
    if body.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(match body.get("result") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        });
    }
    let message = match body.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "tool reported failure without a message".to_string(),
        Some(other) => other.to_string(),
    };
    Err(StepError::RemoteFailure { message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_content_shapes() {
        assert_eq!(agent_content(r##"{"content": "# Title"}"##), "# Title");
        assert_eq!(agent_content(r#"{"other": 1}"#), "");
        assert_eq!(agent_content(r#""quoted""#), "quoted");
        assert_eq!(agent_content("plain text body"), "plain text body");
    }

    #[test]
    fn tool_result_success_and_failure() {
        assert_eq!(
            tool_result(&json!({"success": true, "result": "text"})).unwrap(),
            "text"
        );
        let err = tool_result(&json!({"success": false, "error": "quota"})).unwrap_err();
        assert!(matches!(err, StepError::RemoteFailure { ref message } if message == "quota"));
        assert!(tool_result(&json!({})).is_err());
    }

    #[test]
    fn tool_request_body_shape() {
        let api = ApiClient::new("http://h", "t").unwrap();
        let p = ToolMethodProvider::new(api, "OpenAI Vision", "analyze_image_standalone", None);
        let body = p.request_body("docs/extracted_files/a_page_1.png", "Read");
        assert_eq!(body["config_name"], "OpenAI Vision");
        assert_eq!(body["method_name"], "analyze_image_standalone");
        assert_eq!(body["parameters"]["file_path"], "docs/extracted_files/a_page_1.png");
        assert_eq!(body["parameters"]["prompt"], "Read");
    }

    #[test]
    fn stored_source_names_page() {
        let s = PageSource::stored(4, "x/extracted_files/doc_page_4.png");
        assert_eq!(s.file_name, "page_4.png");
        assert_eq!(s.label(), "doc_page_4.png");
        assert!(s.bytes.is_none());
    }

    #[tokio::test]
    async fn tool_provider_refuses_unuploaded_page() {
        let api = ApiClient::new("http://127.0.0.1:9", "t").unwrap();
        let p = ToolMethodProvider::new(api, "c", "m", None);
        let page = PageSource::from_image(PageImage {
            page_num: 1,
            file_name: "a_page_1.png".into(),
            bytes: vec![1, 2, 3],
        });
        let err = p.analyze(&page, "x").await.unwrap_err();
        assert!(matches!(err, StepError::InvalidInput { .. }));
    }

    #[test]
    fn backend_selects_provider() {
        let api = ApiClient::new("http://h", "t").unwrap();
        let agent = provider_from_config(&StepConfig::default(), &api);
        assert!(agent.needs_bytes());
        assert_eq!(agent.name(), "Image to Markdown");

        let cfg = StepConfig::builder()
            .inference_backend(InferenceBackend::Tool)
            .build()
            .unwrap();
        let tool = provider_from_config(&cfg, &api);
        assert!(!tool.needs_bytes());
        assert_eq!(tool.name(), "OpenAI Vision");
    }
}
