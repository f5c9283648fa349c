//! Remote storage transfer: download source files, upload page images.
//!
//! ## Path encoding
//!
//! The download route addresses a stored object by its path, with each
//! `/`-separated segment percent-encoded on its own and the slashes kept.
//! Encoding the whole path at once turns `/` into `%2F` and the route no
//! longer resolves. The upload route is the opposite: the destination
//! folder is a single route parameter, so it is encoded as one segment.

use crate::client::ApiClient;
use crate::error::StepError;
use crate::file_ref::basename;
use crate::pipeline::encode::{PageImage, PAGE_IMAGE_MIME};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

/// Everything except the RFC 3986 unreserved characters is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const DOWNLOAD_ROUTE: &str = "/api/uploads/download/";
const UPLOAD_ROUTE: &str = "/api/uploads/upload/";

/// Percent-encode one path segment; `/` is escaped too.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Percent-encode each `/`-separated segment independently.
///
/// `"a b/c#d"` → `"a%20b/c%23d"`.
pub fn encode_path_segments(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Folder next to `origin_path` that receives derived files.
///
/// `reports/q1.pdf` → `reports/extracted_files`; a bare file name maps to
/// `extracted_files`.
pub fn extracted_folder(origin_path: &str, folder_name: &str) -> String {
    match origin_path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => format!("{dir}/{folder_name}"),
        Some(_) => format!("/{folder_name}"),
        None => folder_name.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    files: Vec<UploadedFile>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(default)]
    path: Option<String>,
}

/// Client for the platform's object storage routes.
#[derive(Debug, Clone)]
pub struct RemoteStorage {
    api: ApiClient,
    timeout_secs: Option<u64>,
}

impl RemoteStorage {
    pub fn new(api: ApiClient, timeout_secs: Option<u64>) -> Self {
        Self { api, timeout_secs }
    }

    /// Leading slashes are dropped; stored paths are relative to the storage root.
    pub fn download_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        self.api
            .endpoint(&format!("{DOWNLOAD_ROUTE}{}", encode_path_segments(path)))
    }

    pub fn upload_url(&self, folder: &str) -> String {
        self.api
            .endpoint(&format!("{UPLOAD_ROUTE}{}", encode_segment(folder)))
    }

    /// Fetch a stored object's bytes.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, StepError> {
        let url = self.download_url(path);
        info!("Downloading {} from storage", path);

        let response = self
            .api
            .send(&url, self.api.get(&url), self.timeout_secs)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StepError::from_transport(&url, e, self.timeout_secs))?;

        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Upload one file into `folder` and return its stored path.
    pub async fn upload(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<String, StepError> {
        let url = self.upload_url(folder);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| StepError::Internal(format!("invalid MIME type '{mime}': {e}")))?;
        let form = Form::new().part("files", part);

        let response = self
            .api
            .send(&url, self.api.post(&url).multipart(form), self.timeout_secs)
            .await?;
        let body: UploadResponse = response.json().await.map_err(|e| StepError::BadResponse {
            url: url.clone(),
            detail: format!("upload response is not the expected JSON: {e}"),
        })?;

        let stored = body
            .files
            .into_iter()
            .next()
            .and_then(|f| f.path)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StepError::BadResponse {
                url: url.clone(),
                detail: format!("no stored path returned for '{file_name}'"),
            })?;

        debug!("Uploaded {} → {}", file_name, stored);
        Ok(stored)
    }

    /// Upload page images in order, returning their stored paths in the same order.
    pub async fn upload_pages(
        &self,
        folder: &str,
        pages: &[PageImage],
    ) -> Result<Vec<String>, StepError> {
        info!("Uploading {} page images to {}", pages.len(), folder);
        let mut stored = Vec::with_capacity(pages.len());
        for page in pages {
            let path = self
                .upload(folder, &page.file_name, page.bytes.clone(), PAGE_IMAGE_MIME)
                .await?;
            stored.push(path);
        }
        Ok(stored)
    }
}

/// Source-file name for display and page naming, `document.pdf` when none.
pub fn source_name(path: &str) -> String {
    basename(path).unwrap_or_else(|| "document.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(base: &str) -> RemoteStorage {
        RemoteStorage::new(ApiClient::new(base, "tok").unwrap(), None)
    }

    #[test]
    fn segments_encoded_independently() {
        assert_eq!(encode_path_segments("a b/c#d"), "a%20b/c%23d");
        assert_ne!(encode_path_segments("a b/c#d"), "a%20b%2Fc%23d");
    }

    #[test]
    fn unreserved_characters_pass_through() {
        assert_eq!(encode_segment("Scan_01-v2.final~.pdf"), "Scan_01-v2.final~.pdf");
        assert_eq!(encode_segment("50%+tax?"), "50%25%2Btax%3F");
        assert_eq!(encode_segment("résumé"), "r%C3%A9sum%C3%A9");
    }

    #[test]
    fn segment_encoding_escapes_slash() {
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn empty_segments_are_kept() {
        assert_eq!(encode_path_segments("a//b"), "a//b");
    }

    #[test]
    fn download_url_uses_per_segment_encoding() {
        let s = storage("http://localhost:4000/");
        assert_eq!(
            s.download_url("/tenders/DPR 2024/plan#1.pdf"),
            "http://localhost:4000/api/uploads/download/tenders/DPR%202024/plan%231.pdf"
        );
    }

    #[test]
    fn upload_url_encodes_folder_as_one_segment() {
        let s = storage("http://h");
        assert_eq!(
            s.upload_url("tenders/DPR 2024/extracted_files"),
            "http://h/api/uploads/upload/tenders%2FDPR%202024%2Fextracted_files"
        );
    }

    #[test]
    fn extracted_folder_sits_next_to_source() {
        assert_eq!(
            extracted_folder("tenders/dpr/plan.pdf", "extracted_files"),
            "tenders/dpr/extracted_files"
        );
        assert_eq!(extracted_folder("plan.pdf", "extracted_files"), "extracted_files");
        assert_eq!(extracted_folder("/plan.pdf", "pages"), "/pages");
    }

    #[test]
    fn source_name_defaults() {
        assert_eq!(source_name("a/b/report.pdf"), "report.pdf");
        assert_eq!(source_name(""), "document.pdf");
    }
}
