use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Group-level request policy layered on top of a [`super::ProviderConfig`]'s
/// channel settings: param overrides, model mapping, the parallel-tool-calls
/// stance, and the prompt-based force-function-call rewrite.
///
/// Stored as sibling top-level keys in the same `config_json` document a
/// [`super::ProviderConfig`] is parsed from; absent keys default harmlessly; a
/// provider with no policy configured behaves exactly as it did before this
/// existed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPolicy {
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub model_mapping: ModelMappingRule,
    #[serde(default)]
    pub parallel_tool_calls: ParallelToolCallsPolicy,
    #[serde(default)]
    pub force_function_call: bool,
    /// When set alongside `force_function_call`, the injected system prompt
    /// also instructs the model to emit reasoning inside `<thinking>` tags
    /// before its call.
    #[serde(default)]
    pub thinking_mode: bool,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// When false, override values are redacted entirely in request logs;
    /// when true they are masked/truncated instead of dropped. See
    /// `meridian_core::rewrite::sanitize_for_log`.
    #[serde(default)]
    pub log_request_body: bool,
}

fn default_retry_budget() -> u32 {
    3
}

impl GroupPolicy {
    /// Best-effort parse from a provider's raw config document. A missing or
    /// malformed policy section never blocks the provider from working —
    /// absence just means every step below is a no-op.
    pub fn from_config_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn is_default(&self) -> bool {
        self.overrides.is_empty()
            && self.model_mapping.is_empty()
            && matches!(self.parallel_tool_calls, ParallelToolCallsPolicy::Unset)
            && !self.force_function_call
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelToolCallsPolicy {
    #[default]
    Unset,
    True,
    False,
}

impl ParallelToolCallsPolicy {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParallelToolCallsPolicy::Unset => None,
            ParallelToolCallsPolicy::True => Some(true),
            ParallelToolCallsPolicy::False => Some(false),
        }
    }
}

/// An ordered list of exact-match model renames. `compile` derives the
/// lookup map used at request time; the map is always rebuilt from `rules`
/// rather than persisted, so it can never drift from its source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMappingRule {
    #[serde(default)]
    pub rules: Vec<ModelMappingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMappingEntry {
    pub from: String,
    pub to: String,
}

impl ModelMappingRule {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Compiles the source rules into a lookup map. Cheap enough to call per
    /// request; callers that want to avoid repeating the work across retries
    /// of the same request may compile once and reuse the map.
    pub fn compile(&self) -> HashMap<String, String> {
        self.rules
            .iter()
            .map(|entry| (entry.from.clone(), entry.to.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_policy_defaults_to_noop() {
        let policy = GroupPolicy::from_config_value(&serde_json::json!({
            "kind": "openai",
            "channel_settings": {}
        }));
        assert!(policy.is_default());
        assert_eq!(policy.retry_budget, 3);
    }

    #[test]
    fn parses_sibling_policy_keys() {
        let policy = GroupPolicy::from_config_value(&serde_json::json!({
            "kind": "openai",
            "channel_settings": {},
            "overrides": {"temperature": 0.2},
            "model_mapping": {"rules": [{"from": "gpt-4o", "to": "gpt-4o-mini"}]},
            "parallel_tool_calls": "false",
            "force_function_call": true,
        }));
        assert!(!policy.is_default());
        assert_eq!(policy.overrides["temperature"], 0.2);
        assert_eq!(policy.model_mapping.compile()["gpt-4o"], "gpt-4o-mini");
        assert_eq!(policy.parallel_tool_calls, ParallelToolCallsPolicy::False);
        assert!(policy.force_function_call);
    }
}
