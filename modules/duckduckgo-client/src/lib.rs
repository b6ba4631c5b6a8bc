pub mod error;

pub use error::{DdgError, Result};

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com/html/";

pub struct DdgClient {
    client: reqwest::Client,
    base_url: String,
}

impl DdgClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Run a query against the HTML endpoint and return up to `max_results`
    /// result URLs in ranking order.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DdgError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let html = resp.text().await?;
        let urls = parse_results(&html, max_results);
        debug!(query, count = urls.len(), "DuckDuckGo results parsed");
        Ok(urls)
    }
}

/// Pull result links out of a DuckDuckGo HTML results page.
///
/// Result anchors point at a `/l/?uddg=<target>` redirect; the real target is
/// decoded from that parameter. Anchors that already carry an absolute
/// http(s) URL are taken as-is.
pub fn parse_results(html: &str, max_results: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result__a") else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for anchor in document.select(&selector) {
        if urls.len() >= max_results {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if let Some(target) = resolve_result_href(href) {
            if !urls.contains(&target) {
                urls.push(target);
            }
        }
    }
    urls
}

fn resolve_result_href(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let parsed = base.join(href.trim()).ok()?;

    let is_redirect = parsed
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"));

    if is_redirect {
        let target = parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?;
        return target.starts_with("http").then_some(target);
    }

    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}
