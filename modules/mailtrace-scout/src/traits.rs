// Capability boundaries of the resolution pipeline.
//
// PageFetcher: URL → visible text + raw markup.
// WebSearcher: query → ranked result URLs.
// DecisionOracle: prompt → best-effort reply text (planning, judging, reflecting).
//
// All three are slow and fallible. The pipeline treats every error as local to
// the URL / query / opinion it belongs to. Tests swap in the mocks from
// `testing.rs`: no network, no API keys.

use anyhow::Result;
use async_trait::async_trait;

use mailtrace_common::PageContent;

use crate::oracle::OraclePrompt;

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page, following redirects. Unreachable hosts and non-2xx
    /// responses are errors.
    async fn fetch(&self, url: &str) -> Result<PageContent>;
}

// ---------------------------------------------------------------------------
// WebSearcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
}

#[async_trait]
impl WebSearcher for duckduckgo_client::DdgClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        Ok(duckduckgo_client::DdgClient::search(self, query, max_results).await?)
    }
}

// ---------------------------------------------------------------------------
// DecisionOracle
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Raw reply text. Callers parse defensively; a well-formed reply is
    /// never assumed.
    async fn ask(&self, prompt: &OraclePrompt) -> Result<String>;
}
