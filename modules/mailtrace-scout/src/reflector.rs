//! Second-opinion review of a verdict that already passed its threshold.
//! Fail-closed: anything but an explicit "accept" keeps the search going.

use tracing::warn;

use mailtrace_common::{CandidateFeatures, Person, ReflectionAction, ReflectionDecision, Verdict};

use crate::oracle::{parse_reply, schema_hint, str_field, OraclePrompt, OracleTask};
use crate::traits::DecisionOracle;

const REFLECT_SYSTEM: &str = "You are a critical reviewer. Check the verdict of an email judge \
for plausibility and decide: 'accept' or 'continue'. Answer with a single JSON object.";

pub fn reflect_prompt(
    person: &Person,
    page_url: &str,
    features: &[CandidateFeatures],
    verdict: &Verdict,
) -> OraclePrompt {
    let features_json = serde_json::to_string_pretty(features).unwrap_or_else(|_| "[]".into());
    let verdict_json = serde_json::to_string_pretty(verdict).unwrap_or_else(|_| "{}".into());

    let user = format!(
        "Person: {name}\n\
         Affiliation: {affiliation}\n\
         Page: {page_url}\n\n\
         Features (truncated):\n{features_json}\n\n\
         Verdict:\n{verdict_json}\n\n\
         Decide:\n\
         - action: \"accept\" or \"continue\"\n\
         - reason: short justification\n\n\
         Reply with JSON matching this schema:\n{schema}",
        name = person.name,
        affiliation = person.affiliation,
        schema = schema_hint::<ReflectionDecision>(),
    );
    OraclePrompt::new(OracleTask::Reflect, REFLECT_SYSTEM, user)
}

/// Only the first `feature_limit` features are shown to the reviewer.
pub async fn reflect(
    oracle: &dyn DecisionOracle,
    person: &Person,
    page_url: &str,
    features: &[CandidateFeatures],
    feature_limit: usize,
    verdict: &Verdict,
) -> ReflectionDecision {
    let shown = &features[..features.len().min(feature_limit)];
    let reply = match oracle.ask(&reflect_prompt(person, page_url, shown, verdict)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(url = page_url, error = %e, "Reflector oracle call failed");
            return ReflectionDecision::keep_searching("fallback: reflector unavailable");
        }
    };

    let Some(value) = parse_reply(&reply) else {
        return ReflectionDecision::keep_searching("fallback: could not parse reflection");
    };

    let action = match str_field(&value, "action").to_ascii_lowercase().as_str() {
        "accept" => ReflectionAction::Accept,
        _ => ReflectionAction::Continue,
    };
    ReflectionDecision {
        action,
        reason: str_field(&value, "reason"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedOracle;
    use mailtrace_common::Classification;

    fn verdict() -> Verdict {
        Verdict {
            chosen_email: "jane.doe@acme.edu".into(),
            classification: Classification::Personal,
            confidence: 0.9,
            reason: "name match".into(),
        }
    }

    async fn decide(reply: &str) -> ReflectionDecision {
        let oracle = ScriptedOracle::new().on(OracleTask::Reflect, reply);
        let person = Person::new("Jane Doe", "Acme University");
        reflect(&oracle, &person, "https://acme.edu", &[], 6, &verdict()).await
    }

    #[tokio::test]
    async fn accept_is_normalized() {
        let decision = decide(r#"{"action":" Accept ","reason":"solid"}"#).await;
        assert!(decision.accepts());
        assert_eq!(decision.reason, "solid");
    }

    #[tokio::test]
    async fn invalid_action_continues() {
        assert!(!decide(r#"{"action":"maybe","reason":"hmm"}"#).await.accepts());
        assert!(!decide(r#"{"reason":"no action"}"#).await.accepts());
    }

    #[tokio::test]
    async fn unparsable_reply_continues() {
        let decision = decide("accept").await;
        assert_eq!(decision.action, ReflectionAction::Continue);
        assert!(decision.reason.starts_with("fallback"));
    }

    #[tokio::test]
    async fn oracle_error_continues() {
        let oracle = ScriptedOracle::new().failing(OracleTask::Reflect);
        let person = Person::new("Jane Doe", "Acme University");
        let decision = reflect(&oracle, &person, "https://acme.edu", &[], 6, &verdict()).await;
        assert!(!decision.accepts());
    }

    #[test]
    fn prompt_includes_verdict() {
        let person = Person::new("Jane Doe", "Acme University");
        let prompt = reflect_prompt(&person, "https://acme.edu", &[], &verdict());
        assert_eq!(prompt.task, OracleTask::Reflect);
        assert!(prompt.user.contains("jane.doe@acme.edu"));
    }
}
