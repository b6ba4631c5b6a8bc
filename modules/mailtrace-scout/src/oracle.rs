// Decision oracle plumbing: prompt type, the OpenAI adapter, and lenient
// reply parsing shared by the planner, judge and reflector.
//
// Replies are untrusted text. Nothing here errors on a malformed reply; callers
// get `None` / defaults and apply their own safe fallback.

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;
use tracing::debug;

use ai_client::{extract_json_object, strip_code_blocks, ChatOptions, OpenAi};

use crate::traits::DecisionOracle;

// =============================================================================
// Prompt
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleTask {
    Plan,
    Judge,
    Reflect,
}

impl OracleTask {
    /// Sampling temperature per task. Judging and reflecting stay close to
    /// deterministic; planning gets a little room to vary queries.
    pub fn temperature(self) -> f32 {
        match self {
            OracleTask::Plan => 0.3,
            OracleTask::Judge => 0.2,
            OracleTask::Reflect => 0.1,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            OracleTask::Plan => 350,
            OracleTask::Judge => 220,
            OracleTask::Reflect => 120,
        }
    }
}

impl std::fmt::Display for OracleTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleTask::Plan => write!(f, "plan"),
            OracleTask::Judge => write!(f, "judge"),
            OracleTask::Reflect => write!(f, "reflect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OraclePrompt {
    pub task: OracleTask,
    pub system: String,
    pub user: String,
}

impl OraclePrompt {
    pub fn new(task: OracleTask, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            task,
            system: system.into(),
            user: user.into(),
        }
    }
}

// =============================================================================
// OpenAI adapter
// =============================================================================

pub struct OpenAiOracle {
    ai: OpenAi,
    json_mode: bool,
}

impl OpenAiOracle {
    pub fn new(ai: OpenAi, json_mode: bool) -> Self {
        Self { ai, json_mode }
    }
}

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn ask(&self, prompt: &OraclePrompt) -> Result<String> {
        let options = ChatOptions {
            temperature: Some(prompt.task.temperature()),
            max_tokens: Some(prompt.task.max_tokens()),
            json_mode: self.json_mode,
        };
        debug!(task = %prompt.task, model = self.ai.model(), "Oracle request");
        self.ai
            .chat(prompt.system.as_str(), prompt.user.as_str(), &options)
            .await
    }
}

// =============================================================================
// Reply parsing
// =============================================================================

/// JSON Schema of the expected reply, pretty-printed for embedding in a prompt.
pub fn schema_hint<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// Best-effort JSON object out of a reply: fenced or bare, with or without
/// chatter around it. Anything that is not an object is rejected.
pub fn parse_reply(raw: &str) -> Option<Value> {
    let stripped = strip_code_blocks(raw.trim());
    let value = serde_json::from_str::<Value>(stripped).ok().or_else(|| {
        extract_json_object(stripped).and_then(|obj| serde_json::from_str::<Value>(obj).ok())
    })?;
    value.is_object().then_some(value)
}

/// String field, trimmed. Missing or non-string values read as "".
pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Numeric field. Accepts JSON numbers and numeric strings ("0.8").
pub fn f64_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailtrace_common::Verdict;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        let v = parse_reply(r#"{"action":"accept"}"#).unwrap();
        assert_eq!(v["action"], "accept");
    }

    #[test]
    fn parses_fenced_json() {
        let v = parse_reply("```json\n{\"action\": \"continue\"}\n```").unwrap();
        assert_eq!(v["action"], "continue");
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let v = parse_reply("Sure! Here you go: {\"confidence\": 0.7} Hope it helps.").unwrap();
        assert_eq!(f64_field(&v, "confidence"), Some(0.7));
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        assert!(parse_reply("[1, 2, 3]").is_none());
        assert!(parse_reply("I could not decide.").is_none());
        assert!(parse_reply("").is_none());
    }

    #[test]
    fn field_helpers_are_lenient() {
        let v = json!({"a": "  x ", "b": 3, "c": "0.25", "d": "high"});
        assert_eq!(str_field(&v, "a"), "x");
        assert_eq!(str_field(&v, "b"), "");
        assert_eq!(str_field(&v, "missing"), "");
        assert_eq!(f64_field(&v, "b"), Some(3.0));
        assert_eq!(f64_field(&v, "c"), Some(0.25));
        assert_eq!(f64_field(&v, "d"), None);
    }

    #[test]
    fn schema_hint_names_fields() {
        let hint = schema_hint::<Verdict>();
        assert!(hint.contains("chosen_email"));
        assert!(hint.contains("confidence"));
    }

    #[test]
    fn task_sampling_parameters() {
        assert_eq!(OracleTask::Plan.max_tokens(), 350);
        assert_eq!(OracleTask::Judge.temperature(), 0.2);
        assert_eq!(OracleTask::Reflect.to_string(), "reflect");
    }
}
