use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE};
use scraper::{Html, Node};
use tracing::{debug, info};

use mailtrace_common::config::HttpConfig;
use mailtrace_common::PageContent;

use crate::traits::PageFetcher;

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

// --- Plain HTTP fetcher ---

/// GET + redirect following + visible-text extraction. No JavaScript.
pub struct HttpFetcher {
    client: reqwest::Client,
    accept_language: String,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, accept_language: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            accept_language: accept_language.to_string(),
        })
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Self::new(
            &config.user_agent,
            config.request_timeout(),
            &config.accept_language,
        )
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        info!(url, "Fetching page");

        let resp = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.contains("application/pdf") {
            bail!("Unsupported content type {content_type} at {url}");
        }

        let final_url = resp.url().to_string();
        let raw_markup = resp
            .text()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;
        let text = visible_text(&raw_markup);

        debug!(
            url,
            final_url = final_url.as_str(),
            markup_bytes = raw_markup.len(),
            text_bytes = text.len(),
            "Page fetched"
        );
        Ok(PageContent {
            url: url.to_string(),
            text,
            raw_markup,
        })
    }
}

/// Text a reader would see: every text node outside script/style/noscript,
/// whitespace collapsed to single spaces.
pub fn visible_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut chunks: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            chunks.extend(text.split_whitespace());
        }
    }
    chunks.join(" ")
}
