//! Knowledge upload: index assembled OCR text into a searchable collection.

use crate::client::ApiClient;
use crate::config::KnowledgeSettings;
use crate::error::StepError;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::info;

const KNOWLEDGE_ROUTE: &str = "/api/knowledge/upload";

/// File name of the uploaded knowledge document.
pub const KNOWLEDGE_FILE_NAME: &str = "memory_doc.md";

/// Collection name derived from a document name: spaces and dots become `_`.
pub fn collection_name(name: &str) -> String {
    name.replace([' ', '.'], "_")
}

/// Markdown document for the collection: a title line, then the text.
pub fn knowledge_document(name: &str, results: &str) -> String {
    format!("# {name}\n\n{results}")
}

/// Indexing configuration sent as the `payload` field.
pub fn knowledge_payload(name: &str, settings: &KnowledgeSettings) -> Value {
    json!({
        "name": format!("_{name}"),
        "category": settings.category,
        "model_name": settings.model_name,
        "type": "knowledgeConfig",
        "overwrite": settings.overwrite,
    })
}

/// Upload `results` as a Markdown document into the collection for `name`.
///
/// Returns the service's JSON response.
pub async fn upload_knowledge(
    api: &ApiClient,
    name: &str,
    results: &str,
    settings: &KnowledgeSettings,
    timeout_secs: Option<u64>,
) -> Result<Value, StepError> {
    let url = api.endpoint(KNOWLEDGE_ROUTE);
    let collection = collection_name(name);
    info!("Uploading knowledge document '{}' to collection '{}'", name, collection);

    let document = Part::text(knowledge_document(name, results))
        .file_name(KNOWLEDGE_FILE_NAME)
        .mime_str("text/markdown")
        .map_err(|e| StepError::Internal(format!("multipart part: {e}")))?;
    let form = Form::new()
        .part("files", document)
        .text("payload", knowledge_payload(name, settings).to_string());

    let request = api
        .post(&url)
        .query(&[("collection", collection.as_str())])
        .multipart(form);
    let response = api.send(&url, request, timeout_secs).await?;

    response.json().await.map_err(|e| StepError::BadResponse {
        url,
        detail: format!("knowledge response is not JSON: {e}"),
    })
}
