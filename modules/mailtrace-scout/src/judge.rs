//! Consensus judge: several independent oracle opinions per page, reduced to
//! one verdict by majority vote on the chosen email.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, warn};

use mailtrace_common::{CandidateFeatures, Classification, Person, Verdict};

use crate::extractor::{sanitize_email, scan_plain_emails};
use crate::oracle::{f64_field, parse_reply, schema_hint, str_field, OraclePrompt, OracleTask};
use crate::traits::DecisionOracle;

const SALVAGE_CONFIDENCE: f64 = 0.4;
const MAX_CONSENSUS_REASONS: usize = 3;

const JUDGE_SYSTEM: &str = "You are a meticulous email judge. Decide whether an address is \
a PERSONAL (individual) address or a ROLE address. Choose exactly ONE email, and only if it \
plausibly belongs to the person being searched for. If the page evidently offers only role \
addresses for this person, you may choose a role address. Answer with a single JSON object.";

/// One page as seen by the judge.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub person: &'a Person,
    pub page_url: &'a str,
    pub page_text: &'a str,
    pub features: &'a [CandidateFeatures],
    /// Page text is cut to this many characters before prompting.
    pub context_chars: usize,
}

pub fn judge_prompt(input: &JudgeInput<'_>) -> OraclePrompt {
    let context: String = input.page_text.chars().take(input.context_chars).collect();
    let features_json =
        serde_json::to_string_pretty(input.features).unwrap_or_else(|_| "[]".to_string());

    let user = format!(
        "Person: {name}\n\
         Affiliation: {affiliation}\n\
         Page: {url}\n\n\
         Candidates with features:\n{features_json}\n\n\
         Page text (truncated):\n---\n{context}\n---\n\n\
         Criteria:\n\
         1) Prefer personal addresses: name or initials match, profile context, proximity to the name.\n\
         2) Domain plausibility: official institute/university domain over third-party providers.\n\
         3) Context: closeness to the person's name in the text.\n\
         4) Choose a role address only if it is clearly the sole official contact for this person.\n\
         5) If unclear: no email (empty chosen_email).\n\n\
         Reply with JSON matching this schema:\n{schema}",
        name = input.person.name,
        affiliation = input.person.affiliation,
        url = input.page_url,
        schema = schema_hint::<Verdict>(),
    );
    OraclePrompt::new(OracleTask::Judge, JUDGE_SYSTEM, user)
}

/// A single opinion. Never fails: oracle errors and unusable replies become
/// an empty verdict, and a reply that is not JSON is salvaged for the first
/// candidate address it mentions.
pub async fn judge_once(oracle: &dyn DecisionOracle, input: &JudgeInput<'_>) -> Verdict {
    if input.features.is_empty() {
        return Verdict::empty("No candidates");
    }

    let reply = match oracle.ask(&judge_prompt(input)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(url = input.page_url, error = %e, "Judge oracle call failed");
            return Verdict::empty(format!("oracle error: {e}"));
        }
    };

    let candidates: BTreeSet<&str> = input.features.iter().map(|f| f.email.as_str()).collect();
    match parse_reply(&reply) {
        Some(value) => verdict_from_value(&value, &candidates),
        None => salvage(&reply, &candidates),
    }
}

fn verdict_from_value(value: &Value, candidates: &BTreeSet<&str>) -> Verdict {
    let chosen = sanitize_email(&str_field(value, "chosen_email"))
        .and_then(|email| match_candidate(&email, candidates))
        .unwrap_or_default();

    Verdict {
        chosen_email: chosen,
        classification: Classification::parse_lenient(&str_field(value, "classification")),
        confidence: f64_field(value, "confidence")
            .filter(|c| c.is_finite())
            .map_or(0.0, |c| c.clamp(0.0, 1.0)),
        reason: str_field(value, "reason"),
    }
}

fn salvage(reply: &str, candidates: &BTreeSet<&str>) -> Verdict {
    let salvaged = scan_plain_emails(reply)
        .into_iter()
        .find_map(|email| match_candidate(&email, candidates));

    match salvaged {
        Some(email) => Verdict {
            chosen_email: email,
            classification: Classification::Uncertain,
            confidence: SALVAGE_CONFIDENCE,
            reason: "Non-JSON reply; salvaged first candidate address".to_string(),
        },
        None => Verdict::empty("Non-JSON reply"),
    }
}

/// The candidate spelling of `email`, compared case-insensitively. Emails the
/// page never contained are dropped.
fn match_candidate(email: &str, candidates: &BTreeSet<&str>) -> Option<String> {
    candidates
        .iter()
        .find(|c| c.eq_ignore_ascii_case(email))
        .map(|c| c.to_string())
}

/// Run `votes` opinions (at least one) and reduce them.
pub async fn judge_consensus(
    oracle: &dyn DecisionOracle,
    input: &JudgeInput<'_>,
    votes: usize,
) -> Verdict {
    let mut opinions = Vec::with_capacity(votes.max(1));
    for _ in 0..votes.max(1) {
        opinions.push(judge_once(oracle, input).await);
    }
    let verdict = reduce_opinions(opinions);
    debug!(
        url = input.page_url,
        email = verdict.chosen_email.as_str(),
        classification = %verdict.classification,
        confidence = verdict.confidence,
        "Consensus verdict"
    );
    verdict
}

/// Majority vote over non-empty opinions.
///
/// The largest group by email wins; ties go to the higher mean confidence,
/// then to the group seen first. The winner carries its modal classification,
/// mean confidence and up to three distinct reasons.
pub fn reduce_opinions(opinions: Vec<Verdict>) -> Verdict {
    let mut groups: Vec<(String, Vec<Verdict>)> = Vec::new();
    for opinion in opinions.into_iter().filter(Verdict::has_email) {
        match groups.iter_mut().find(|(email, _)| *email == opinion.chosen_email) {
            Some((_, group)) => group.push(opinion),
            None => groups.push((opinion.chosen_email.clone(), vec![opinion])),
        }
    }

    let mut winner: Option<(String, Vec<Verdict>, f64)> = None;
    for (email, group) in groups {
        let mean = mean_confidence(&group);
        let better = match &winner {
            None => true,
            Some((_, best, best_mean)) => {
                group.len() > best.len() || (group.len() == best.len() && mean > *best_mean)
            }
        };
        if better {
            winner = Some((email, group, mean));
        }
    }

    let Some((email, group, mean)) = winner else {
        return Verdict::empty("no consensus");
    };

    let mut reasons: Vec<&str> = Vec::new();
    for reason in group.iter().map(|v| v.reason.as_str()) {
        if !reason.is_empty() && !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }
    let reason = if reasons.is_empty() {
        "Consensus of multiple votes.".to_string()
    } else {
        reasons.truncate(MAX_CONSENSUS_REASONS);
        format!("Consensus: {}", reasons.join(" | "))
    };

    Verdict {
        classification: modal_classification(&group),
        confidence: mean,
        reason,
        chosen_email: email,
    }
}

fn mean_confidence(group: &[Verdict]) -> f64 {
    group.iter().map(|v| v.confidence).sum::<f64>() / group.len() as f64
}

/// Most frequent classification; ties go to the one seen first.
fn modal_classification(group: &[Verdict]) -> Classification {
    let mut counts: Vec<(Classification, usize)> = Vec::new();
    for verdict in group {
        match counts.iter_mut().find(|(c, _)| *c == verdict.classification) {
            Some((_, n)) => *n += 1,
            None => counts.push((verdict.classification, 1)),
        }
    }
    let mut best: Option<(Classification, usize)> = None;
    for (classification, n) in counts {
        let better = match best {
            None => true,
            Some((_, best_n)) => n > best_n,
        };
        if better {
            best = Some((classification, n));
        }
    }
    best.map(|(c, _)| c).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedOracle;

    fn opinion(email: &str, classification: Classification, confidence: f64, reason: &str) -> Verdict {
        Verdict {
            chosen_email: email.to_string(),
            classification,
            confidence,
            reason: reason.to_string(),
        }
    }

    fn feature(email: &str) -> CandidateFeatures {
        CandidateFeatures {
            email: email.to_string(),
            local_contains_lastname: false,
            local_contains_initials: false,
            page_domain: "acme.edu".into(),
            email_domain: "acme.edu".into(),
            domain_matches_page: true,
            domain_matches_institution_memory: false,
            approx_distance_to_name: 10,
            known_patterns_for_page_domain: vec![],
            local_raw: email.split('@').next().unwrap_or_default().to_string(),
            local_looks_like_role: false,
        }
    }

    fn input<'a>(person: &'a Person, features: &'a [CandidateFeatures]) -> JudgeInput<'a> {
        JudgeInput {
            person,
            page_url: "https://acme.edu/people/jdoe",
            page_text: "Jane Doe, Professor. jane.doe@acme.edu",
            features,
            context_chars: 3500,
        }
    }

    #[test]
    fn majority_beats_single_high_confidence() {
        use Classification::*;
        let verdict = reduce_opinions(vec![
            opinion("a@acme.edu", Personal, 0.9, "name match"),
            opinion("a@acme.edu", Personal, 0.7, "profile page"),
            opinion("b@acme.edu", Personal, 0.95, "near name"),
        ]);
        assert_eq!(verdict.chosen_email, "a@acme.edu");
        assert!((verdict.confidence - 0.8).abs() < 1e-9);
        assert_eq!(verdict.reason, "Consensus: name match | profile page");
    }

    #[test]
    fn tie_goes_to_higher_mean_then_first_seen() {
        use Classification::*;
        let verdict = reduce_opinions(vec![
            opinion("a@acme.edu", Personal, 0.6, ""),
            opinion("b@acme.edu", Role, 0.9, ""),
        ]);
        assert_eq!(verdict.chosen_email, "b@acme.edu");
        assert_eq!(verdict.classification, Role);
        assert_eq!(verdict.reason, "Consensus of multiple votes.");

        let verdict = reduce_opinions(vec![
            opinion("a@acme.edu", Personal, 0.7, ""),
            opinion("b@acme.edu", Personal, 0.7, ""),
        ]);
        assert_eq!(verdict.chosen_email, "a@acme.edu");
    }

    #[test]
    fn modal_classification_and_reason_cap() {
        use Classification::*;
        let verdict = reduce_opinions(vec![
            opinion("a@acme.edu", Uncertain, 0.5, "r1"),
            opinion("a@acme.edu", Personal, 0.5, "r2"),
            opinion("a@acme.edu", Personal, 0.5, "r3"),
            opinion("a@acme.edu", Personal, 0.5, "r4"),
            opinion("a@acme.edu", Personal, 0.5, "r1"),
        ]);
        assert_eq!(verdict.classification, Personal);
        assert_eq!(verdict.reason, "Consensus: r1 | r2 | r3");
    }

    #[test]
    fn empty_opinions_mean_no_consensus() {
        let verdict = reduce_opinions(vec![Verdict::empty("x"), Verdict::empty("y")]);
        assert!(!verdict.has_email());
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.classification, Classification::Uncertain);
        assert_eq!(verdict.reason, "no consensus");
        assert_eq!(reduce_opinions(vec![]).reason, "no consensus");
    }

    #[tokio::test]
    async fn no_features_skips_oracle() {
        let oracle = ScriptedOracle::new();
        let person = Person::new("Jane Doe", "Acme University");
        let verdict = judge_once(&oracle, &input(&person, &[])).await;
        assert!(!verdict.has_email());
        assert!(oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn parses_and_normalizes_opinion() {
        let oracle = ScriptedOracle::new().on(
            OracleTask::Judge,
            r#"{"chosen_email":"<Jane.Doe@acme.edu>","classification":"Personal","confidence":"1.7","reason":"name match"}"#,
        );
        let person = Person::new("Jane Doe", "Acme University");
        let features = [feature("jane.doe@acme.edu")];
        let verdict = judge_once(&oracle, &input(&person, &features)).await;

        assert_eq!(verdict.chosen_email, "jane.doe@acme.edu");
        assert_eq!(verdict.classification, Classification::Personal);
        assert_eq!(verdict.confidence, 1.0);
    }

    #[tokio::test]
    async fn email_outside_candidates_is_dropped() {
        let oracle = ScriptedOracle::new().on(
            OracleTask::Judge,
            r#"{"chosen_email":"guess@acme.edu","classification":"personal","confidence":0.9,"reason":"guess"}"#,
        );
        let person = Person::new("Jane Doe", "Acme University");
        let features = [feature("jane.doe@acme.edu")];
        let verdict = judge_once(&oracle, &input(&person, &features)).await;
        assert!(!verdict.has_email());
    }

    #[tokio::test]
    async fn non_json_reply_is_salvaged() {
        let oracle = ScriptedOracle::new().on(
            OracleTask::Judge,
            "I think the answer is jane.doe@acme.edu because of the name.",
        );
        let person = Person::new("Jane Doe", "Acme University");
        let features = [feature("jane.doe@acme.edu")];
        let verdict = judge_once(&oracle, &input(&person, &features)).await;

        assert_eq!(verdict.chosen_email, "jane.doe@acme.edu");
        assert_eq!(verdict.classification, Classification::Uncertain);
        assert_eq!(verdict.confidence, SALVAGE_CONFIDENCE);
    }

    #[tokio::test]
    async fn consensus_runs_requested_votes() {
        let oracle = ScriptedOracle::new().on(
            OracleTask::Judge,
            r#"{"chosen_email":"jane.doe@acme.edu","classification":"personal","confidence":0.9,"reason":"match"}"#,
        );
        let person = Person::new("Jane Doe", "Acme University");
        let features = [feature("jane.doe@acme.edu")];
        let verdict = judge_consensus(&oracle, &input(&person, &features), 3).await;

        assert_eq!(oracle.prompts().len(), 3);
        assert_eq!(verdict.chosen_email, "jane.doe@acme.edu");
        assert!((verdict.confidence - 0.9).abs() < 1e-9);

        judge_consensus(&oracle, &input(&person, &features), 0).await;
        assert_eq!(oracle.prompts().len(), 4);
    }

    #[test]
    fn prompt_truncates_page_text() {
        let person = Person::new("Jane Doe", "Acme University");
        let features = [feature("jane.doe@acme.edu")];
        let long_text = "x".repeat(5000);
        let prompt = judge_prompt(&JudgeInput {
            page_text: &long_text,
            context_chars: 100,
            ..input(&person, &features)
        });
        assert!(prompt.user.contains(&"x".repeat(100)));
        assert!(!prompt.user.contains(&"x".repeat(101)));
    }
}
