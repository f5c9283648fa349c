//! Fetch a web page and keep its title and the start of its HTML.

use crate::client::ensure_success;
use crate::error::StepError;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Title and truncated markup of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedPage {
    /// Text of the first `<title>` element, trimmed; empty when absent.
    pub title: String,
    /// The first `max_chars` characters of the HTML.
    pub content: String,
}

/// Parse fetched HTML.
pub fn parse_page(html: &str, max_chars: usize) -> ScrapedPage {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    ScrapedPage {
        title,
        content: html.chars().take(max_chars).collect(),
    }
}

/// GET `url` and parse it. Only `http` and `https` URLs are accepted.
pub async fn scrape(
    url: &str,
    max_chars: usize,
    timeout_secs: Option<u64>,
) -> Result<ScrapedPage, StepError> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(StepError::invalid(
            "website_url",
            format!("'{url}' is not an http(s) URL"),
        ));
    }
    info!("Navigating to {}", url);

    let http = Client::builder()
        .build()
        .map_err(|e| StepError::Internal(format!("HTTP client: {e}")))?;
    let mut request = http.get(url);
    if let Some(secs) = timeout_secs {
        request = request.timeout(Duration::from_secs(secs));
    }
    let response = request
        .send()
        .await
        .map_err(|e| StepError::from_transport(url, e, timeout_secs))?;
    let html = ensure_success(url, response)
        .await?
        .text()
        .await
        .map_err(|e| StepError::from_transport(url, e, timeout_secs))?;

    let page = parse_page(&html, max_chars);
    info!("Scraped '{}' ({} chars kept)", page.title, page.content.chars().count());
    Ok(page)
}
