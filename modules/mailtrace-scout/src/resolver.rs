//! Person pipeline: plan, then seed URLs, then planned queries, then baseline
//! queries, until a verdict survives both the threshold and the reflector or
//! the page budget runs out.
//!
//! URLs are tried strictly one at a time. The page budget is global per
//! person: once it is spent no further search or fetch happens.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use mailtrace_common::config::ThresholdsConfig;
use mailtrace_common::{Classification, Person, ScoutSettings, SearchPlan, Verdict};

use crate::extractor::extract_emails;
use crate::features::{build_features, page_domain};
use crate::infra::{EventKind, PolitenessDelay, RunLog};
use crate::judge::{judge_consensus, JudgeInput};
use crate::memory::MemoryStore;
use crate::planner::{baseline_queries, propose_plan};
use crate::reflector::reflect;
use crate::traits::{DecisionOracle, PageFetcher, WebSearcher};

/// Source-query label for URLs the planner proposed directly.
pub const SEED_QUERY_LABEL: &str = "plan:seed";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundEmail {
    pub email: String,
    pub source_url: String,
    /// The query (or plan label) whose results contained the page.
    pub source_query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub found: Option<FoundEmail>,
    pub pages_scanned: usize,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct Resolver {
    fetcher: Arc<dyn PageFetcher>,
    searcher: Arc<dyn WebSearcher>,
    oracle: Arc<dyn DecisionOracle>,
    settings: ScoutSettings,
    politeness: PolitenessDelay,
}

/// Mutable state of one person's search.
struct PersonSearch<'a> {
    person: &'a Person,
    memory: &'a mut MemoryStore,
    log: &'a mut RunLog,
    visited: HashSet<String>,
    pages_scanned: &'a AtomicUsize,
    page_budget: usize,
}

impl PersonSearch<'_> {
    fn pages_scanned(&self) -> usize {
        self.pages_scanned.load(Ordering::Relaxed)
    }

    fn budget_exhausted(&self) -> bool {
        self.pages_scanned() >= self.page_budget
    }
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        searcher: Arc<dyn WebSearcher>,
        oracle: Arc<dyn DecisionOracle>,
        settings: ScoutSettings,
    ) -> Self {
        let politeness = PolitenessDelay::from_config(&settings.politeness);
        Self {
            fetcher,
            searcher,
            oracle,
            settings,
            politeness,
        }
    }

    pub fn with_politeness(mut self, politeness: PolitenessDelay) -> Self {
        self.politeness = politeness;
        self
    }

    pub fn settings(&self) -> &ScoutSettings {
        &self.settings
    }

    /// Resolve one person. Exhaustion is a normal outcome (`found == None`).
    /// Memory is written only when a verdict is accepted.
    pub async fn resolve(
        &self,
        person: &Person,
        memory: &mut MemoryStore,
        log: &mut RunLog,
    ) -> Resolution {
        let pages_scanned = AtomicUsize::new(0);
        self.resolve_counted(person, memory, log, &pages_scanned).await
    }

    /// Like [`Resolver::resolve`], but counts attempted fetches into a counter
    /// owned by the caller, so the count survives if this future is dropped.
    pub async fn resolve_counted(
        &self,
        person: &Person,
        memory: &mut MemoryStore,
        log: &mut RunLog,
        pages_scanned: &AtomicUsize,
    ) -> Resolution {
        let started = Instant::now();
        let limits = &self.settings.limits;

        let plan = propose_plan(
            self.oracle.as_ref(),
            person,
            memory.domain_entry(&person.affiliation),
        )
        .await;
        log.log(
            Some(person),
            EventKind::Plan {
                seed_urls: plan.seed_urls.clone(),
                phases: plan.phases.clone(),
            },
        );

        let mut search = PersonSearch {
            person,
            memory,
            log,
            visited: HashSet::new(),
            pages_scanned,
            page_budget: limits.max_pages_per_person,
        };

        let found = self.run_stages(&mut search, &plan).await;

        Resolution {
            found,
            pages_scanned: search.pages_scanned(),
            elapsed: started.elapsed(),
        }
    }

    async fn run_stages(
        &self,
        search: &mut PersonSearch<'_>,
        plan: &SearchPlan,
    ) -> Option<FoundEmail> {
        let limits = &self.settings.limits;

        // 1. Seed URLs straight from the plan.
        let seeds: Vec<String> = plan.seed_urls.iter().take(limits.max_seed_urls).cloned().collect();
        if let Some(found) = self.try_links(search, &seeds, SEED_QUERY_LABEL).await {
            return Some(found);
        }

        // 2. Planned queries, a few per phase.
        for phase in &plan.phases {
            let label = format!("plan:{}", phase.name);
            for query in phase.queries.iter().take(limits.max_queries_per_phase) {
                if search.budget_exhausted() {
                    return None;
                }
                let links = self.search(search, query).await;
                if let Some(found) = self.try_links(search, &links, &label).await {
                    return Some(found);
                }
            }
        }

        // 3. Deterministic baseline.
        for query in baseline_queries(search.person) {
            if search.budget_exhausted() {
                return None;
            }
            let links = self.search(search, &query).await;
            if let Some(found) = self.try_links(search, &links, &query).await {
                return Some(found);
            }
        }

        None
    }

    /// Search failures degrade to zero links.
    async fn search(&self, search: &mut PersonSearch<'_>, query: &str) -> Vec<String> {
        match self
            .searcher
            .search(query, self.settings.limits.max_search_results)
            .await
        {
            Ok(links) => {
                search.log.log(
                    Some(search.person),
                    EventKind::Search {
                        query: query.to_string(),
                        result_count: links.len(),
                    },
                );
                links
            }
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                search.log.log(
                    Some(search.person),
                    EventKind::SearchError {
                        query: query.to_string(),
                        error: format!("{e:#}"),
                    },
                );
                Vec::new()
            }
        }
    }

    /// Link trial: each URL in order until one yields an accepted verdict.
    async fn try_links(
        &self,
        search: &mut PersonSearch<'_>,
        links: &[String],
        source_query: &str,
    ) -> Option<FoundEmail> {
        let limits = &self.settings.limits;
        let person = search.person;

        for url in links {
            if search.budget_exhausted() {
                break;
            }
            if !search.visited.insert(url.clone()) {
                continue;
            }

            self.politeness.wait().await;
            search.pages_scanned.fetch_add(1, Ordering::Relaxed);

            let page = match self.fetcher.fetch(url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = url.as_str(), error = %e, "Fetch failed");
                    search.log.log(
                        Some(person),
                        EventKind::FetchError {
                            url: url.clone(),
                            error: format!("{e:#}"),
                        },
                    );
                    continue;
                }
            };

            let candidates = extract_emails(&page.text, &page.raw_markup);
            search.log.log(Some(person), EventKind::extract(url, &candidates));
            if candidates.is_empty() {
                continue;
            }

            let features = build_features(person, url, &page.text, &candidates, search.memory);
            let input = JudgeInput {
                person,
                page_url: url,
                page_text: &page.text,
                features: &features,
                context_chars: limits.judge_context_chars,
            };
            let verdict = judge_consensus(self.oracle.as_ref(), &input, limits.judge_votes).await;
            info!(
                url = url.as_str(),
                classification = %verdict.classification,
                confidence = verdict.confidence,
                reason = verdict.reason.as_str(),
                "Judge verdict"
            );
            search.log.log(
                Some(person),
                EventKind::Judge {
                    url: url.clone(),
                    verdict: verdict.clone(),
                },
            );

            if !passes_threshold(&verdict, &self.settings.thresholds) {
                continue;
            }

            let decision = reflect(
                self.oracle.as_ref(),
                person,
                url,
                &features,
                limits.reflect_feature_count,
                &verdict,
            )
            .await;
            info!(
                url = url.as_str(),
                action = %decision.action,
                reason = decision.reason.as_str(),
                "Reflection"
            );
            search.log.log(
                Some(person),
                EventKind::Reflect {
                    url: url.clone(),
                    reflection: decision.clone(),
                },
            );
            if !decision.accepts() {
                continue;
            }

            search
                .memory
                .record_domain_hint(&person.affiliation, &page_domain(url));
            search.memory.record_pattern(&verdict.chosen_email, &person.name);

            return Some(FoundEmail {
                email: verdict.chosen_email,
                source_url: url.clone(),
                source_query: source_query.to_string(),
            });
        }
        None
    }
}

/// Classification-specific confidence gate applied before reflection.
pub fn passes_threshold(verdict: &Verdict, thresholds: &ThresholdsConfig) -> bool {
    if !verdict.has_email() {
        return false;
    }
    let required = match verdict.classification {
        Classification::Personal => thresholds.personal,
        Classification::Role => thresholds.role,
        Classification::Uncertain => thresholds.uncertain,
    };
    verdict.confidence >= required
}
