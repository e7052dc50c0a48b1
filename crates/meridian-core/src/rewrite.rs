//! Component D: applies a provider's [`GroupPolicy`] to an outbound request
//! before it reaches the dispatcher — parameter overrides, model mapping, the
//! parallel-tool-calls stance, and (when enabled) the force-function-call
//! rewrite that strips native tools in favor of a prompt-injected contract.
//!
//! All four steps operate on the request body as a JSON document rather than
//! on each protocol's typed shape individually: the body types round-trip
//! through `serde_json::Value` exactly, and a shallow JSON merge is what the
//! override semantics call for anyway.

use std::collections::BTreeMap;

use meridian_provider_core::config::{GroupPolicy, ParallelToolCallsPolicy};
use meridian_provider_core::{GenerateContentRequest, Request};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Applies `policy` to `req`. `trigger` is the force-function-call signal for
/// this request — the caller derives it deterministically from the request's
/// trace id (see `proxy_engine::ffc_trigger_for`) so the response path can
/// recompute the identical value without this function threading any state
/// back out.
pub fn apply_group_policy(policy: &GroupPolicy, trigger: &str, req: Request) -> Request {
    let Request::GenerateContent(gen) = req else {
        return req;
    };
    Request::GenerateContent(apply_generate(policy, trigger, gen))
}

fn apply_generate(policy: &GroupPolicy, trigger: &str, req: GenerateContentRequest) -> GenerateContentRequest {
    match req {
        GenerateContentRequest::Claude(mut r) => {
            if let Some(body) = rewrite_body(policy, trigger, serde_json::to_value(&r.body), "system") {
                r.body = body;
            }
            GenerateContentRequest::Claude(r)
        }
        GenerateContentRequest::OpenAIChat(mut r) => {
            if let Some(body) = rewrite_body(policy, trigger, serde_json::to_value(&r.body), "messages") {
                r.body = body;
            }
            GenerateContentRequest::OpenAIChat(r)
        }
        GenerateContentRequest::OpenAIResponse(mut r) => {
            if let Some(body) = rewrite_body(policy, trigger, serde_json::to_value(&r.body), "instructions") {
                r.body = body;
            }
            GenerateContentRequest::OpenAIResponse(r)
        }
        GenerateContentRequest::Gemini(mut r) => {
            remap_model(&policy.model_mapping.compile(), &mut r.path.model);
            if let Some(body) = rewrite_body(policy, trigger, serde_json::to_value(&r.body), "system_instruction") {
                r.body = body;
            }
            GenerateContentRequest::Gemini(r)
        }
        GenerateContentRequest::GeminiStream(mut r) => {
            remap_model(&policy.model_mapping.compile(), &mut r.path.model);
            if let Some(body) = rewrite_body(policy, trigger, serde_json::to_value(&r.body), "system_instruction") {
                r.body = body;
            }
            GenerateContentRequest::GeminiStream(r)
        }
    }
}

fn remap_model(mapping: &std::collections::HashMap<String, String>, path_model: &mut String) {
    if mapping.is_empty() {
        return;
    }
    let bare = path_model.strip_prefix("models/").unwrap_or(path_model.as_str());
    if let Some(mapped) = mapping.get(bare) {
        *path_model = format!("models/{mapped}");
    }
}

/// Runs the four policy steps over a body already decoded to `Value`, then
/// decodes it back into the typed body `T`. `system_key` names the field this
/// protocol uses to carry a system/instructions message: `"system"` for
/// Claude, `"system_instruction"` for Gemini, `"instructions"` for the OpenAI
/// Responses API, and `"messages"` for OpenAI chat (where there is no
/// separate field — a system message is prepended instead).
fn rewrite_body<T>(
    policy: &GroupPolicy,
    trigger: &str,
    body: Result<Value, serde_json::Error>,
    system_key: &str,
) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    let Ok(Value::Object(mut obj)) = body else {
        return None;
    };

    apply_overrides(&mut obj, policy);
    apply_model_mapping(&mut obj, policy);
    let has_tools = matches!(obj.get("tools"), Some(Value::Array(v)) if !v.is_empty());
    apply_parallel_tool_calls(&mut obj, policy, has_tools);

    if policy.force_function_call && has_tools {
        let tools = obj.remove("tools");
        let tool_choice = obj.remove("tool_choice");
        let specs = extract_tool_specs(tools.as_ref());
        let constraint = extract_tool_choice_constraint(tool_choice.as_ref());
        let text = render_ffc_system_text(&specs, trigger, &constraint, policy.thinking_mode);
        inject_system_text(&mut obj, system_key, &text);
    }

    serde_json::from_value(Value::Object(obj)).ok()
}

/// Shallow-merges `overrides` into the request map, per step 1 of the
/// rewriter. Logging of what changed happens at the call site via
/// [`sanitize_for_log`], not here — this function only mutates the body.
fn apply_overrides(obj: &mut Map<String, Value>, policy: &GroupPolicy) {
    for (key, value) in policy.overrides.iter() {
        obj.insert(key.clone(), value.clone());
    }
}

fn apply_model_mapping(obj: &mut Map<String, Value>, policy: &GroupPolicy) {
    if policy.model_mapping.is_empty() {
        return;
    }
    let mapping = policy.model_mapping.compile();
    if let Some(Value::String(model)) = obj.get("model")
        && let Some(mapped) = mapping.get(model.as_str())
    {
        obj.insert("model".to_string(), Value::String(mapped.clone()));
    }
}

fn apply_parallel_tool_calls(obj: &mut Map<String, Value>, policy: &GroupPolicy, has_tools: bool) {
    if policy.force_function_call || !has_tools {
        return;
    }
    if let Some(value) = policy.parallel_tool_calls.as_bool() {
        obj.insert("parallel_tool_calls".to_string(), Value::Bool(value));
    }
}

/// A tool's name, human-readable description, and JSON-Schema parameters,
/// flattened out of whichever protocol-specific tool array shape it came
/// from.
struct ToolSpec {
    name: String,
    description: Option<String>,
    parameters: Option<Value>,
}

fn extract_tool_specs(tools: Option<&Value>) -> Vec<ToolSpec> {
    let Some(Value::Array(tools)) = tools else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for tool in tools {
        // Gemini bundles multiple declarations per `Tool` entry under
        // `functionDeclarations`; every other protocol puts one tool per entry.
        if let Some(Value::Array(decls)) = tool.get("functionDeclarations") {
            for decl in decls {
                if let Some(spec) = tool_spec_from_flat(decl) {
                    out.push(spec);
                }
            }
            continue;
        }
        // OpenAI chat-completions nests the definition under "function" or "custom".
        if let Some(nested) = tool.get("function").or_else(|| tool.get("custom")) {
            if let Some(spec) = tool_spec_from_flat(nested) {
                out.push(spec);
            }
            continue;
        }
        // Claude custom tools and the OpenAI Responses API both carry a flat
        // {name, description, input_schema|parameters} shape.
        if let Some(spec) = tool_spec_from_flat(tool) {
            out.push(spec);
        }
    }
    out
}

fn tool_spec_from_flat(value: &Value) -> Option<ToolSpec> {
    let name = value.get("name")?.as_str()?.to_string();
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let parameters = value
        .get("input_schema")
        .or_else(|| value.get("parameters"))
        .or_else(|| value.get("parametersJsonSchema"))
        .cloned();
    Some(ToolSpec { name, description, parameters })
}

/// What the original `tool_choice` implies for the injected instructions.
enum ToolChoiceConstraint {
    /// No `tool_choice` was present, or it was `auto`: no extra line needed.
    Auto,
    /// `none`/`{type:"none"}`: the model must never emit the trigger.
    Prohibited,
    /// `required`/`any`/`{type:"any"}`: at least one call is mandatory.
    Required,
    /// A named-tool choice: only that tool may be called.
    OnlyTool(String),
}

fn extract_tool_choice_constraint(tool_choice: Option<&Value>) -> ToolChoiceConstraint {
    let Some(value) = tool_choice else {
        return ToolChoiceConstraint::Auto;
    };
    match value {
        Value::String(s) => match s.as_str() {
            "none" => ToolChoiceConstraint::Prohibited,
            "required" | "any" => ToolChoiceConstraint::Required,
            _ => ToolChoiceConstraint::Auto,
        },
        Value::Object(map) => {
            if let Some(name) = map
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| map.get("function").and_then(|f| f.get("name")).and_then(Value::as_str))
                .or_else(|| map.get("custom").and_then(|f| f.get("name")).and_then(Value::as_str))
            {
                return ToolChoiceConstraint::OnlyTool(name.to_string());
            }
            match map.get("type").and_then(Value::as_str) {
                Some("none") => ToolChoiceConstraint::Prohibited,
                Some("any") | Some("required") => ToolChoiceConstraint::Required,
                Some("tool") => map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|n| ToolChoiceConstraint::OnlyTool(n.to_string()))
                    .unwrap_or(ToolChoiceConstraint::Auto),
                _ => ToolChoiceConstraint::Auto,
            }
        }
        _ => ToolChoiceConstraint::Auto,
    }
}

fn render_ffc_system_text(
    tools: &[ToolSpec],
    trigger: &str,
    constraint: &ToolChoiceConstraint,
    thinking_mode: bool,
) -> String {
    let mut out = String::new();
    out.push_str("You have access to the following tools. To call one, first write the exact signal ");
    out.push_str(trigger);
    out.push_str(", then a single invoke block:\n\n<invoke name=\"<ToolName>\">\n  <parameter name=\"<Key>\"><Value></parameter>\n  ...\n</invoke>\n\n");
    out.push_str("Parameter values may be raw JSON. Emit at most one call per turn; any further calls in the same turn are ignored. Available tools:\n\n");
    for tool in tools {
        out.push_str("- ");
        out.push_str(&tool.name);
        if let Some(description) = &tool.description {
            out.push_str(": ");
            out.push_str(description);
        }
        if let Some(parameters) = &tool.parameters {
            out.push_str("\n  parameters: ");
            out.push_str(&parameters.to_string());
        }
        out.push('\n');
    }
    match constraint {
        ToolChoiceConstraint::Auto => {}
        ToolChoiceConstraint::Prohibited => {
            out.push_str("\nDo not emit the call signal or an invoke block in this turn.\n");
        }
        ToolChoiceConstraint::Required => {
            out.push_str("\nYou MUST emit exactly one call in this turn.\n");
        }
        ToolChoiceConstraint::OnlyTool(name) => {
            out.push_str(&format!("\nIf you call a tool this turn, it MUST be \"{name}\".\n"));
        }
    }
    if thinking_mode {
        out.push_str("\nBefore the call, write your reasoning inside <thinking>...</thinking>.\n");
    }
    out
}

fn inject_system_text(obj: &mut Map<String, Value>, system_key: &str, text: &str) {
    match system_key {
        "messages" => inject_into_messages(obj, text),
        "system_instruction" => inject_gemini_system_instruction(obj, text),
        _ => inject_flat_system_field(obj, system_key, text),
    }
}

fn inject_flat_system_field(obj: &mut Map<String, Value>, key: &str, text: &str) {
    match obj.get_mut(key) {
        Some(Value::String(existing)) => {
            existing.push_str("\n\n");
            existing.push_str(text);
        }
        Some(Value::Array(blocks)) => {
            blocks.push(serde_json::json!({"type": "text", "text": text}));
        }
        _ => {
            obj.insert(key.to_string(), Value::String(text.to_string()));
        }
    }
}

fn inject_gemini_system_instruction(obj: &mut Map<String, Value>, text: &str) {
    match obj.get_mut("system_instruction") {
        Some(Value::Object(existing)) => {
            let parts = existing
                .entry("parts")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(parts) = parts {
                parts.push(serde_json::json!({"text": text}));
            }
        }
        _ => {
            obj.insert(
                "system_instruction".to_string(),
                serde_json::json!({"parts": [{"text": text}]}),
            );
        }
    }
}

fn inject_into_messages(obj: &mut Map<String, Value>, text: &str) {
    let system_message = serde_json::json!({"role": "system", "content": text});
    match obj.get_mut("messages") {
        Some(Value::Array(messages)) => messages.insert(0, system_message),
        _ => {
            obj.insert("messages".to_string(), Value::Array(vec![system_message]));
        }
    }
}

/// Renders override values for request-body logging: when `log_request_body`
/// is off, every overridden key is redacted entirely; when on, values are
/// truncated to 500 chars and common secret-shaped substrings are masked.
pub fn sanitize_for_log(overrides: &Map<String, Value>, log_request_body: bool) -> BTreeMap<String, String> {
    static SECRET_LIKE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)(key|token|secret|password)").unwrap());

    overrides
        .iter()
        .map(|(key, value)| {
            if !log_request_body {
                return (key.clone(), "<redacted>".to_string());
            }
            let rendered = value.to_string();
            let masked = if SECRET_LIKE.is_match(key) {
                "<masked>".to_string()
            } else {
                rendered
            };
            let truncated = if masked.len() > 500 {
                format!("{}...", &masked[..masked.char_indices().nth(500).map(|(i, _)| i).unwrap_or(masked.len())])
            } else {
                masked
            };
            (key.clone(), truncated)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_provider_core::config::{ModelMappingEntry, ModelMappingRule};
    use serde_json::json;

    fn policy() -> GroupPolicy {
        GroupPolicy {
            overrides: Map::new(),
            model_mapping: ModelMappingRule::default(),
            parallel_tool_calls: ParallelToolCallsPolicy::Unset,
            force_function_call: false,
            thinking_mode: false,
            retry_budget: 3,
            log_request_body: false,
        }
    }

    #[test]
    fn overrides_merge_shallow() {
        let mut obj = Map::new();
        obj.insert("temperature".to_string(), json!(1.0));
        let mut p = policy();
        p.overrides.insert("temperature".to_string(), json!(0.2));
        p.overrides.insert("top_p".to_string(), json!(0.9));
        apply_overrides(&mut obj, &p);
        assert_eq!(obj["temperature"], json!(0.2));
        assert_eq!(obj["top_p"], json!(0.9));
    }

    #[test]
    fn model_mapping_renames_exact_match() {
        let mut obj = Map::new();
        obj.insert("model".to_string(), json!("gpt-4o"));
        let mut p = policy();
        p.model_mapping = ModelMappingRule {
            rules: vec![ModelMappingEntry { from: "gpt-4o".to_string(), to: "gpt-4o-mini".to_string() }],
        };
        apply_model_mapping(&mut obj, &p);
        assert_eq!(obj["model"], json!("gpt-4o-mini"));
    }

    #[test]
    fn parallel_tool_calls_set_only_when_tools_present_and_ffc_off() {
        let mut obj = Map::new();
        let mut p = policy();
        p.parallel_tool_calls = ParallelToolCallsPolicy::False;
        apply_parallel_tool_calls(&mut obj, &p, false);
        assert!(!obj.contains_key("parallel_tool_calls"));
        apply_parallel_tool_calls(&mut obj, &p, true);
        assert_eq!(obj["parallel_tool_calls"], json!(false));
    }

    #[test]
    fn parallel_tool_calls_absent_when_ffc_on() {
        let mut obj = Map::new();
        let mut p = policy();
        p.force_function_call = true;
        p.parallel_tool_calls = ParallelToolCallsPolicy::True;
        apply_parallel_tool_calls(&mut obj, &p, true);
        assert!(!obj.contains_key("parallel_tool_calls"));
    }

    #[test]
    fn force_function_call_strips_tools_and_injects_system_text() {
        let mut obj = Map::new();
        obj.insert(
            "tools".to_string(),
            json!([{"name": "get_weather", "description": "looks up weather", "input_schema": {"type": "object"}}]),
        );
        obj.insert("tool_choice".to_string(), json!({"type": "tool", "name": "get_weather"}));
        obj.insert("system".to_string(), json!("You are helpful."));
        let mut p = policy();
        p.force_function_call = true;

        let has_tools = matches!(obj.get("tools"), Some(Value::Array(v)) if !v.is_empty());
        assert!(has_tools);
        let tools = obj.remove("tools");
        let tool_choice = obj.remove("tool_choice");
        let specs = extract_tool_specs(tools.as_ref());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "get_weather");
        let constraint = extract_tool_choice_constraint(tool_choice.as_ref());
        assert!(matches!(constraint, ToolChoiceConstraint::OnlyTool(ref n) if n == "get_weather"));

        let trigger = "<<CALL_abcd>>".to_string();
        let text = render_ffc_system_text(&specs, &trigger, &constraint, false);
        assert!(text.contains("get_weather"));
        assert!(text.contains(&trigger));
        assert!(text.contains("MUST be \"get_weather\""));
        inject_system_text(&mut obj, "system", &text);
        assert!(obj["system"].as_str().unwrap().contains("You are helpful."));
        assert!(obj["system"].as_str().unwrap().contains(&trigger));
        assert!(!obj.contains_key("tools"));
        assert!(!obj.contains_key("tool_choice"));
    }

    #[test]
    fn gemini_function_declarations_are_flattened() {
        let tools = json!([{"functionDeclarations": [{"name": "a", "description": "d"}, {"name": "b"}]}]);
        let specs = extract_tool_specs(Some(&tools));
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "a");
        assert_eq!(specs[1].name, "b");
    }

    #[test]
    fn openai_chat_function_wrapper_is_unwrapped() {
        let tools = json!([{"type": "function", "function": {"name": "f", "parameters": {"type": "object"}}}]);
        let specs = extract_tool_specs(Some(&tools));
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "f");
        assert!(specs[0].parameters.is_some());
    }

    #[test]
    fn log_sanitization_redacts_when_logging_off() {
        let mut overrides = Map::new();
        overrides.insert("api_key".to_string(), json!("sk-live-xyz"));
        let rendered = sanitize_for_log(&overrides, false);
        assert_eq!(rendered["api_key"], "<redacted>");
    }

    #[test]
    fn log_sanitization_masks_secret_shaped_keys_when_logging_on() {
        let mut overrides = Map::new();
        overrides.insert("auth_token".to_string(), json!("abc123"));
        overrides.insert("temperature".to_string(), json!(0.5));
        let rendered = sanitize_for_log(&overrides, true);
        assert_eq!(rendered["auth_token"], "<masked>");
        assert_eq!(rendered["temperature"], "0.5");
    }
}
