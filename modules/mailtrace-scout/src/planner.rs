//! Search planning: an oracle-proposed plan plus a deterministic baseline.

use serde_json::Value;
use tracing::{debug, warn};

use mailtrace_common::{DomainMemoryEntry, Person, SearchPhase, SearchPlan};

use crate::oracle::{parse_reply, schema_hint, str_field, OraclePrompt, OracleTask};
use crate::traits::DecisionOracle;

const PLAN_SYSTEM: &str = "You are a web research agent. Produce a concrete search plan, \
including the 3-6 most likely URLs, for finding one person's personal email address. \
Answer with a single JSON object.";

pub fn plan_prompt(person: &Person, hints: Option<&DomainMemoryEntry>) -> OraclePrompt {
    let hints_json = hints
        .and_then(|h| serde_json::to_string_pretty(h).ok())
        .unwrap_or_else(|| "{}".to_string());

    let user = format!(
        "Goal: find the personal email address of\n\
         Person: {name}\n\
         Affiliation: {affiliation}\n\n\
         Known hints for this affiliation:\n{hints_json}\n\n\
         Use phases such as \"directory\", \"profile\", \"pdf\" and \"fallback\". \
         Prefer institutional domains.\n\n\
         Reply with JSON matching this schema:\n{schema}",
        name = person.name,
        affiliation = person.affiliation,
        schema = schema_hint::<SearchPlan>(),
    );
    OraclePrompt::new(OracleTask::Plan, PLAN_SYSTEM, user)
}

/// Ask the oracle for a plan. Oracle failures and malformed replies yield an
/// empty plan; the baseline queries still run afterwards.
pub async fn propose_plan(
    oracle: &dyn DecisionOracle,
    person: &Person,
    hints: Option<&DomainMemoryEntry>,
) -> SearchPlan {
    let prompt = plan_prompt(person, hints);
    let reply = match oracle.ask(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(person = %person, error = %e, "Planner oracle call failed");
            return SearchPlan::default();
        }
    };

    let plan = parse_reply(&reply)
        .map(|value| plan_from_value(&value))
        .unwrap_or_default();
    debug!(
        person = %person,
        phases = plan.phases.len(),
        seeds = plan.seed_urls.len(),
        "Search plan"
    );
    plan
}

/// Field-by-field extraction so one bad phase does not discard the rest.
fn plan_from_value(value: &Value) -> SearchPlan {
    let phases = value
        .get("phases")
        .and_then(Value::as_array)
        .map(|phases| phases.iter().filter_map(phase_from_value).collect())
        .unwrap_or_default();

    let seed_urls = string_list(value.get("seed_urls"))
        .into_iter()
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .collect();

    SearchPlan { phases, seed_urls }
}

fn phase_from_value(value: &Value) -> Option<SearchPhase> {
    value.as_object()?;
    let name = match str_field(value, "name") {
        name if name.is_empty() => "phase".to_string(),
        name => name,
    };
    Some(SearchPhase {
        name,
        queries: string_list(value.get("queries")),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic fallback queries, trimmed and de-duplicated in first-seen
/// order. Never empty.
pub fn baseline_queries(person: &Person) -> Vec<String> {
    let name = person.name.trim();
    let aff = person.affiliation.trim();
    let base = format!("{name} {aff}");
    let base = base.trim();

    let candidates = [
        format!("{base} contact"),
        format!("{base} email"),
        format!("{name} {aff} site:.edu"),
        format!("{name} {aff} site:.ac"),
        format!("{name} {aff} site:.org"),
        format!("{name} {aff} profile"),
        format!("\"{name}\" \"{aff}\" email"),
        format!("\"{name}\" \"{aff}\" filetype:pdf"),
    ];

    let mut queries: Vec<String> = Vec::with_capacity(candidates.len());
    for query in candidates {
        let query = query.trim().to_string();
        if !query.is_empty() && !queries.contains(&query) {
            queries.push(query);
        }
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedOracle;

    fn jane() -> Person {
        Person::new("Jane Doe", "Acme University")
    }

    #[test]
    fn baseline_has_eight_distinct_queries() {
        let queries = baseline_queries(&jane());
        assert_eq!(queries.len(), 8);
        assert_eq!(queries[0], "Jane Doe Acme University contact");
        assert_eq!(queries[2], "Jane Doe Acme University site:.edu");
        assert_eq!(queries[7], "\"Jane Doe\" \"Acme University\" filetype:pdf");
    }

    #[test]
    fn baseline_without_affiliation_is_trimmed() {
        let queries = baseline_queries(&Person::new("Jane Doe", ""));
        assert_eq!(queries[0], "Jane Doe contact");
        assert_eq!(queries[2], "Jane Doe  site:.edu");
        assert!(queries.iter().all(|q| q == q.trim()));
        assert!(!queries.is_empty());
    }

    #[tokio::test]
    async fn parses_plan_and_drops_bad_seeds() {
        let oracle = ScriptedOracle::new().on(
            OracleTask::Plan,
            r#"```json
            {"phases":[{"name":"directory","queries":["acme people jane doe", ""]},
                       {"queries":["jane doe cv"]}, 42],
             "seed_urls":["https://acme.edu/people/jdoe", "ftp://old.acme.edu", "acme.edu/x"]}
            ```"#,
        );
        let plan = propose_plan(&oracle, &jane(), None).await;

        assert_eq!(plan.seed_urls, vec!["https://acme.edu/people/jdoe"]);
        assert_eq!(plan.phases.len(), 2);
        assert_eq!(plan.phases[0].queries, vec!["acme people jane doe"]);
        assert_eq!(plan.phases[1].name, "phase");
    }

    #[tokio::test]
    async fn malformed_reply_gives_empty_plan() {
        let oracle = ScriptedOracle::new().on(OracleTask::Plan, "I would search the web.");
        assert!(propose_plan(&oracle, &jane(), None).await.is_empty());
    }

    #[tokio::test]
    async fn oracle_error_gives_empty_plan() {
        let oracle = ScriptedOracle::new().failing(OracleTask::Plan);
        assert!(propose_plan(&oracle, &jane(), None).await.is_empty());
    }

    #[test]
    fn prompt_carries_memory_hints() {
        let mut hints = DomainMemoryEntry::default();
        hints.domains.insert("acme.edu".into());
        let prompt = plan_prompt(&jane(), Some(&hints));
        assert_eq!(prompt.task, OracleTask::Plan);
        assert!(prompt.user.contains("acme.edu"));
        assert!(prompt.user.contains("seed_urls"));
    }
}
