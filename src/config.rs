//! Configuration for flowstep steps.
//!
//! Every knob a step needs beyond its context inputs lives in
//! [`StepConfig`], built via [`StepConfigBuilder`]. Values the original
//! scripts read from ambient globals (API host, bearer token) are injected
//! here once and validated at build time.

use crate::error::StepError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default API host when neither `API_URL` nor `CLIENT_URL` is set.
pub const DEFAULT_API_URL: &str = "http://localhost:4000";

/// Configuration shared by every step.
///
/// # Example
/// ```rust
/// use flowstep::{FailurePolicy, StepConfig};
///
/// let config = StepConfig::builder()
///     .api_base_url("http://localhost:4000")
///     .token("secret")
///     .failure_policy(FailurePolicy::Abort)
///     .build()
///     .unwrap();
/// assert_eq!(config.render_scale, 2.0);
/// ```
#[derive(Clone)]
pub struct StepConfig {
    /// Base URL of the platform API, without trailing slash.
    pub api_base_url: String,

    /// Bearer token. When `None` the token is taken from the context
    /// (`token`, then `user.token`).
    pub token: Option<String>,

    /// Page rasterisation scale factor. Default: 2.0 (≈144 DPI).
    pub render_scale: f32,

    /// Per-request timeout for inference calls. Default: 120 s.
    pub inference_timeout_secs: Option<u64>,

    /// Per-request timeout for storage downloads and uploads. Default: none.
    pub transfer_timeout_secs: Option<u64>,

    /// What a batch does when one page's inference call fails.
    pub failure_policy: FailurePolicy,

    /// Which inference endpoint pages are sent to.
    pub inference_backend: InferenceBackend,

    /// Agent name sent to the agent runtime.
    pub agent_name: String,

    /// Tool configuration name sent to the tool-method endpoint.
    pub tool_config_name: String,

    /// Tool method name sent to the tool-method endpoint.
    pub tool_method_name: String,

    /// Instruction prompt override. If None, the backend's built-in OCR prompt is used.
    pub ocr_prompt: Option<String>,

    /// Sub-folder (next to the source PDF) that receives page images.
    pub extracted_folder_name: String,

    /// Indexing configuration for knowledge uploads.
    pub knowledge: KnowledgeSettings,

    /// Maximum characters of page HTML kept by the scraper. Default: 5000.
    pub scrape_max_chars: usize,

    /// Optional per-page progress events.
    pub progress: Option<ProgressCallback>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            token: None,
            render_scale: 2.0,
            inference_timeout_secs: Some(120),
            transfer_timeout_secs: None,
            failure_policy: FailurePolicy::default(),
            inference_backend: InferenceBackend::default(),
            agent_name: "Image to Markdown".to_string(),
            tool_config_name: "OpenAI Vision".to_string(),
            tool_method_name: "analyze_image_standalone".to_string(),
            ocr_prompt: None,
            extracted_folder_name: "extracted_files".to_string(),
            knowledge: KnowledgeSettings::default(),
            scrape_max_chars: 5000,
            progress: None,
        }
    }
}

impl fmt::Debug for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepConfig")
            .field("api_base_url", &self.api_base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("render_scale", &self.render_scale)
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .field("transfer_timeout_secs", &self.transfer_timeout_secs)
            .field("failure_policy", &self.failure_policy)
            .field("inference_backend", &self.inference_backend)
            .field("agent_name", &self.agent_name)
            .field("tool_config_name", &self.tool_config_name)
            .field("tool_method_name", &self.tool_method_name)
            .field("extracted_folder_name", &self.extracted_folder_name)
            .field("knowledge", &self.knowledge)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn PageProgress>"))
            .finish()
    }
}

impl StepConfig {
    /// Create a new builder for `StepConfig`.
    pub fn builder() -> StepConfigBuilder {
        StepConfigBuilder {
            config: Self::default(),
        }
    }

    /// Builder pre-filled from the process environment.
    ///
    /// Reads `API_URL` (falling back to `CLIENT_URL`) and `API_TOKEN`
    /// (falling back to `GIA_API_TOKEN`). Empty values are ignored.
    pub fn from_env() -> StepConfigBuilder {
        let mut builder = Self::builder();
        if let Some(url) = first_env(&["API_URL", "CLIENT_URL"]) {
            builder = builder.api_base_url(url);
        }
        if let Some(token) = first_env(&["API_TOKEN", "GIA_API_TOKEN"]) {
            builder = builder.token(token);
        }
        builder
    }

    /// The prompt sent with every page for the configured backend.
    pub fn effective_ocr_prompt(&self) -> &str {
        self.ocr_prompt
            .as_deref()
            .unwrap_or_else(|| self.inference_backend.default_prompt())
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .find(|v| !v.trim().is_empty())
}

/// Builder for [`StepConfig`].
#[derive(Debug)]
pub struct StepConfigBuilder {
    config: StepConfig,
}

impl StepConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn inference_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.inference_timeout_secs = secs;
        self
    }

    pub fn transfer_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.transfer_timeout_secs = secs;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn inference_backend(mut self, backend: InferenceBackend) -> Self {
        self.config.inference_backend = backend;
        self
    }

    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.config.agent_name = name.into();
        self
    }

    pub fn tool(mut self, config_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        self.config.tool_config_name = config_name.into();
        self.config.tool_method_name = method_name.into();
        self
    }

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn extracted_folder_name(mut self, name: impl Into<String>) -> Self {
        self.config.extracted_folder_name = name.into();
        self
    }

    pub fn knowledge(mut self, settings: KnowledgeSettings) -> Self {
        self.config.knowledge = settings;
        self
    }

    pub fn scrape_max_chars(mut self, n: usize) -> Self {
        self.config.scrape_max_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StepConfig, StepError> {
        let c = &self.config;
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(StepError::InvalidConfig(format!(
                "API base URL must start with http:// or https://, got '{}'",
                c.api_base_url
            )));
        }
        if !(0.5..=8.0).contains(&c.render_scale) {
            return Err(StepError::InvalidConfig(format!(
                "Render scale must be 0.5–8.0, got {}",
                c.render_scale
            )));
        }
        if c.agent_name.trim().is_empty() {
            return Err(StepError::InvalidConfig("Agent name must not be empty".into()));
        }
        if c.extracted_folder_name.trim().is_empty() || c.extracted_folder_name.contains('/') {
            return Err(StepError::InvalidConfig(format!(
                "Extracted folder name must be a single non-empty segment, got '{}'",
                c.extracted_folder_name
            )));
        }
        if c.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StepError::InvalidConfig("Token must not be blank".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What a page batch does when one page's remote call fails.
///
/// | Policy | Failed page | Batch result |
/// |--------|-------------|--------------|
/// | `Continue` | replaced by an inline error marker | succeeds |
/// | `Abort` | n/a | fails with [`StepError::PageAborted`] |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the whole batch on the first failed page.
    Abort,
    /// Record an error marker for the failed page and keep going. (default)
    #[default]
    Continue,
}

/// Remote endpoint used for page inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    /// `POST /api/agent-runtime/run`, page bytes sent as multipart. (default)
    #[default]
    Agent,
    /// `POST /api/tools/execute-method`, stored page path sent as JSON.
    Tool,
}

impl InferenceBackend {
    /// Built-in OCR instruction for this backend.
    pub fn default_prompt(&self) -> &'static str {
        match self {
            InferenceBackend::Agent => crate::prompts::AGENT_OCR_PROMPT,
            InferenceBackend::Tool => crate::prompts::TOOL_OCR_PROMPT,
        }
    }
}

/// Indexing configuration sent with a knowledge upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    pub category: String,
    pub model_name: String,
    pub overwrite: bool,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            category: "ocr-results".to_string(),
            model_name: "MiniLML6".to_string(),
            overwrite: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = StepConfig::default();
        assert_eq!(c.api_base_url, DEFAULT_API_URL);
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.inference_timeout_secs, Some(120));
        assert_eq!(c.transfer_timeout_secs, None);
        assert_eq!(c.failure_policy, FailurePolicy::Continue);
        assert_eq!(c.inference_backend, InferenceBackend::Agent);
        assert_eq!(c.scrape_max_chars, 5000);
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let c = StepConfig::builder()
            .api_base_url("http://api.local:4000///")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://api.local:4000");
    }

    #[test]
    fn builder_rejects_bad_scale() {
        let err = StepConfig::builder().render_scale(0.1).build().unwrap_err();
        assert!(err.to_string().contains("Render scale"));
    }

    #[test]
    fn builder_rejects_non_http_base() {
        assert!(StepConfig::builder().api_base_url("ftp://x").build().is_err());
    }

    #[test]
    fn builder_rejects_nested_extracted_folder() {
        assert!(StepConfig::builder()
            .extracted_folder_name("a/b")
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let c = StepConfig::builder().token("super-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn prompt_follows_backend_unless_overridden() {
        let agent = StepConfig::default();
        assert_eq!(agent.effective_ocr_prompt(), crate::prompts::AGENT_OCR_PROMPT);

        let tool = StepConfig::builder()
            .inference_backend(InferenceBackend::Tool)
            .build()
            .unwrap();
        assert_eq!(tool.effective_ocr_prompt(), crate::prompts::TOOL_OCR_PROMPT);

        let custom = StepConfig::builder().ocr_prompt("Read it").build().unwrap();
        assert_eq!(custom.effective_ocr_prompt(), "Read it");
    }

    #[test]
    fn policy_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&FailurePolicy::Abort).unwrap(),
            "\"abort\""
        );
    }
}
