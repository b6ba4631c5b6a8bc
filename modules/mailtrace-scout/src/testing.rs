// Test doubles for the resolution pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockFetcher (PageFetcher): HashMap-based URL→page, records every fetch
// - MockSearcher (WebSearcher): HashMap-based query→URLs, records every query
// - ScriptedOracle (DecisionOracle): per-task reply queues, records prompts
//
// Plus a settings helper that turns off politeness delays.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use mailtrace_common::{PageContent, ScoutSettings};

use crate::fetcher::visible_text;
use crate::oracle::{OraclePrompt, OracleTask};
use crate::traits::{DecisionOracle, PageFetcher, WebSearcher};

/// Default settings with politeness delays disabled.
pub fn fast_settings() -> ScoutSettings {
    let mut settings = ScoutSettings::default();
    settings.politeness.min_delay_secs = 0.0;
    settings.politeness.max_delay_secs = 0.0;
    settings
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Returns `Err` for unregistered URLs.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, PageContent>,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page by its markup; the visible text is derived the same
    /// way the HTTP fetcher does it.
    pub fn on_html(mut self, url: &str, markup: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            PageContent {
                url: url.to_string(),
                text: visible_text(markup),
                raw_markup: markup.to_string(),
            },
        );
        self
    }

    /// Every URL fetch was attempted for, including failures, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("MockFetcher: no page registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Unregistered queries return no results. Queries marked with
/// `failing_query` return `Err`.
#[derive(Default)]
pub struct MockSearcher {
    results: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(mut self, query: &str, urls: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn failing_query(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing.contains(query) {
            bail!("MockSearcher: search failed for {query}");
        }
        Ok(self
            .results
            .get(query)
            .map(|urls| urls.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

/// Replies are queued per task and handed out in order; the last reply for a
/// task repeats forever. A task with no script, or marked `failing`, errors.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<HashMap<OracleTask, VecDeque<String>>>,
    failing: HashSet<OracleTask>,
    prompts: Mutex<Vec<OraclePrompt>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, task: OracleTask, reply: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(reply.to_string());
        self
    }

    pub fn failing(mut self, task: OracleTask) -> Self {
        self.failing.insert(task);
        self
    }

    pub fn prompts(&self) -> Vec<OraclePrompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompts_for(&self, task: OracleTask) -> Vec<OraclePrompt> {
        self.prompts()
            .into_iter()
            .filter(|p| p.task == task)
            .collect()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn ask(&self, prompt: &OraclePrompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.failing.contains(&prompt.task) {
            bail!("ScriptedOracle: {} is scripted to fail", prompt.task);
        }

        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&prompt.task)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow!("ScriptedOracle: no reply scripted for {}", prompt.task))?;
        let reply = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(reply)
    }
}
