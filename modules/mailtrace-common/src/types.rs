use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Input ---

/// One input record. Identity is the exact input strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub affiliation: String,
}

impl Person {
    pub fn new(name: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: affiliation.into(),
        }
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.affiliation.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} | {}", self.name, self.affiliation)
        }
    }
}

// --- Planning ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPhase {
    /// Short label, e.g. "directory", "profile", "pdf", "fallback"
    pub name: String,
    /// Web search queries to run for this phase, most promising first
    pub queries: Vec<String>,
}

/// Where to look for one person, in the order it should be tried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPlan {
    pub phases: Vec<SearchPhase>,
    /// Concrete URLs likely to list the person's email (profile or directory pages)
    pub seed_urls: Vec<String>,
}

impl SearchPlan {
    pub fn is_empty(&self) -> bool {
        self.seed_urls.is_empty() && self.phases.iter().all(|p| p.queries.is_empty())
    }
}

// --- Pages & candidates ---

/// A fetched page. Lives only for the duration of one link trial.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub url: String,
    pub text: String,
    pub raw_markup: String,
}

/// Per-candidate signals handed to the judge. Serialized into the prompt,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    pub email: String,
    pub local_contains_lastname: bool,
    pub local_contains_initials: bool,
    pub page_domain: String,
    pub email_domain: String,
    pub domain_matches_page: bool,
    pub domain_matches_institution_memory: bool,
    pub approx_distance_to_name: usize,
    #[serde(rename = "memory_known_patterns_for_page_domain")]
    pub known_patterns_for_page_domain: Vec<String>,
    pub local_raw: String,
    pub local_looks_like_role: bool,
}

// --- Verdicts ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Personal,
    Role,
    #[default]
    Uncertain,
}

impl Classification {
    /// Anything unrecognised is treated as uncertain.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "personal" => Classification::Personal,
            "role" => Classification::Role,
            _ => Classification::Uncertain,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Personal => write!(f, "personal"),
            Classification::Role => write!(f, "role"),
            Classification::Uncertain => write!(f, "uncertain"),
        }
    }
}

/// One judge opinion, or the consensus reduction of several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    /// The selected candidate email, or "" when none plausibly belongs to the person
    pub chosen_email: String,
    /// "personal", "role" or "uncertain"
    pub classification: Classification,
    /// Confidence between 0 and 1
    pub confidence: f64,
    /// Short justification
    pub reason: String,
}

impl Verdict {
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            chosen_email: String::new(),
            classification: Classification::Uncertain,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    pub fn has_email(&self) -> bool {
        !self.chosen_email.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionAction {
    Accept,
    #[default]
    Continue,
}

impl std::fmt::Display for ReflectionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReflectionAction::Accept => write!(f, "accept"),
            ReflectionAction::Continue => write!(f, "continue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReflectionDecision {
    /// "accept" to finalize the verdict, "continue" to keep searching
    pub action: ReflectionAction,
    /// Short justification
    pub reason: String,
}

impl ReflectionDecision {
    pub fn keep_searching(reason: impl Into<String>) -> Self {
        Self {
            action: ReflectionAction::Continue,
            reason: reason.into(),
        }
    }

    pub fn accepts(&self) -> bool {
        self.action == ReflectionAction::Accept
    }
}

// --- Memory ---

/// Known official domains and directory hints for one affiliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMemoryEntry {
    #[serde(default)]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub directory_hints: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternExample {
    pub name: String,
    pub email: String,
}

/// Observed local-part shapes and examples for one mail domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMemoryEntry {
    #[serde(default)]
    pub patterns: BTreeSet<String>,
    #[serde(default)]
    pub examples: BTreeSet<PatternExample>,
}
