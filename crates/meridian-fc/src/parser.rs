//! The function-call parser (component F): recognizes six tool-invocation
//! grammars of decreasing strictness inside otherwise free-form model prose,
//! decodes their parameters, and filters out echoed tool results.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::decode::decode_value;
use crate::idgen;
use crate::json_repair::JsonRepairer;
use crate::result_detect::is_tool_result;
use crate::trigger::{contains_trigger, find_trigger_end};
use crate::types::{FCParseError, FCParseErrorCode, ParseOutcome, ToolCall};

static FUNCTION_CALLS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<function_calls>(.*?)</function_calls>").unwrap());
static FUNCTION_CALLS_OPEN_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<function_calls>").unwrap());

static INVOKE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<invoke\s+name="([^"]*)"[^>]*>(.*?)</invoke>"#).unwrap());
static INVOKE_OPEN_ANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<invoke\b").unwrap());
static INVOKE_OPEN_NO_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<invoke(?:\s+(?!name=)[a-zA-Z_-]+="[^"]*")*\s*>"#).unwrap());

static FUNCTION_CALL_LEGACY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<function_call>.*?<invocation>(.*?)</invocation>.*?</function_call>").unwrap()
});
static LEGACY_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<name>(.*?)</name>").unwrap());
static LEGACY_PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<parameters>(.*?)</parameters>").unwrap());

static TOOL_CALL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<tool_call\s+name="([^"]*)"[^>]*>(.*?)</tool_call>"#).unwrap()
});
static TOOL_CALL_CHILD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<([A-Za-z_][\w-]*)>(.*?)</\1>").unwrap());

static MALFORMED_INVOKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:<>)?<invokename="([^"]*)">"#).unwrap());
static MALFORMED_PARAM_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<parametername="([^"]*)">"#).unwrap());

static PARAMETER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<parameter\s+name="([^"]*)"[^>]*>(.*?)</parameter>"#).unwrap());
static PROPERTY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<property\s+name="([^"]*)"\s+value="([^"]*)"\s*/?>"#).unwrap());

static THINKING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<thinking>(.*?)</thinking>").unwrap());

pub struct FunctionCallParser {
    repairer: JsonRepairer,
}

impl Default for FunctionCallParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionCallParser {
    pub fn new() -> Self {
        Self {
            repairer: JsonRepairer::new(),
        }
    }

    /// Parses `text` for the request's `trigger` signal (may be empty if the
    /// caller isn't running a force-function-call rewrite). Returns the single
    /// call recognized, or a diagnostic explaining why none was emitted.
    pub fn parse(&self, text: &str, trigger: &str) -> ParseOutcome {
        if text.trim().is_empty() {
            return ParseOutcome::error(FCParseError::new(
                FCParseErrorCode::EmptyContent,
                "model produced no content",
            ));
        }

        for candidate in self.scan_candidates(text) {
            if is_tool_result(&candidate.as_result_shape()) {
                continue;
            }
            return ParseOutcome::calls(vec![candidate.into_tool_call()]);
        }

        ParseOutcome::error(self.diagnose(text, trigger))
    }

    /// Finds every grammar match in decreasing-strictness order, each lazily
    /// decoded. The caller takes the first one that isn't a tool-result echo.
    fn scan_candidates(&self, text: &str) -> Vec<Candidate> {
        let mut out = Vec::new();

        if let Some(block) = FUNCTION_CALLS_BLOCK.captures(text) {
            out.extend(self.invokes_in(&block[1]));
        }

        out.extend(self.invokes_in(text));

        if let Some(legacy) = FUNCTION_CALL_LEGACY.captures(text) {
            let invocation_body = &legacy[1];
            if let (Some(name), Some(params)) = (
                LEGACY_NAME.captures(invocation_body),
                LEGACY_PARAMS.captures(invocation_body),
            ) {
                let name = name[1].trim().to_string();
                let args = self.extract_generic_children(&params[1]);
                out.push(Candidate::new(name, args));
            }
        }

        for caps in TOOL_CALL_TAG.captures_iter(text) {
            let name = caps[1].trim().to_string();
            let args = self.extract_generic_children(&caps[2]);
            out.push(Candidate::new(name, args));
        }

        out.extend(self.malformed_invokes_in(text));

        out
    }

    fn invokes_in(&self, text: &str) -> Vec<Candidate> {
        INVOKE_TAG
            .captures_iter(text)
            .map(|caps| {
                let name = caps[1].trim().to_string();
                let args = self.extract_parameters(&caps[2]);
                Candidate::new(name, args)
            })
            .collect()
    }

    fn malformed_invokes_in(&self, text: &str) -> Vec<Candidate> {
        let mut out = Vec::new();
        for caps in MALFORMED_INVOKE.captures_iter(text) {
            let name = caps[1].trim().to_string();
            let tail_start = caps.get(0).unwrap().end();
            let tail = &text[tail_start..];
            // A malformed invoke never closes properly; its body runs until the
            // next invoke/function_calls boundary or end of text.
            let body_end = tail
                .find("</invoke>")
                .or_else(|| tail.find("<invokename="))
                .or_else(|| tail.find("</function_calls>"))
                .unwrap_or(tail.len());
            let body = &tail[..body_end];
            let args = self.extract_malformed_parameters(body);
            out.push(Candidate::new(name, args));
        }
        out
    }

    /// Parameters in well-formed bodies may mix `<parameter name=K>V</parameter>`
    /// and `<property name="K" value="V">` forms; first occurrence of a key wins.
    fn extract_parameters(&self, body: &str) -> BTreeMap<String, Value> {
        let mut args = BTreeMap::new();
        let mut positions: Vec<(usize, &str, Captures)> = Vec::new();
        for caps in PARAMETER_TAG.captures_iter(body) {
            let pos = caps.get(0).unwrap().start();
            positions.push((pos, "parameter", caps));
        }
        for caps in PROPERTY_TAG.captures_iter(body) {
            let pos = caps.get(0).unwrap().start();
            positions.push((pos, "property", caps));
        }
        positions.sort_by_key(|(pos, _, _)| *pos);
        for (_, _kind, caps) in positions {
            let key = caps[1].trim().to_string();
            let raw_value = caps[2].to_string();
            args.entry(key)
                .or_insert_with(|| decode_value(&raw_value, &self.repairer));
        }
        args
    }

    /// Legacy `<invocation>` bodies and generic `<tool_call>` children: every
    /// immediate child tag is a parameter named after the tag.
    fn extract_generic_children(&self, body: &str) -> BTreeMap<String, Value> {
        let mut args = BTreeMap::new();
        for caps in TOOL_CALL_CHILD.captures_iter(body) {
            let key = caps[1].trim().to_string();
            let raw_value = caps[2].to_string();
            args.entry(key)
                .or_insert_with(|| decode_value(&raw_value, &self.repairer));
        }
        args
    }

    /// Merged-tag parameters (`<parametername="K">V`) have no closing tag; each
    /// value runs until the next `<parametername=` or end of the invoke body.
    fn extract_malformed_parameters(&self, body: &str) -> BTreeMap<String, Value> {
        let starts: Vec<(usize, usize, String)> = MALFORMED_PARAM_START
            .captures_iter(body)
            .map(|caps| {
                let whole = caps.get(0).unwrap();
                (whole.start(), whole.end(), caps[1].trim().to_string())
            })
            .collect();

        let mut args = BTreeMap::new();
        for (i, (_, value_start, key)) in starts.iter().enumerate() {
            let value_end = starts.get(i + 1).map(|(s, _, _)| *s).unwrap_or(body.len());
            let raw_value = body[*value_start..value_end].trim();
            args.entry(key.clone())
                .or_insert_with(|| decode_value(raw_value, &self.repairer));
        }

        // Also honour any well-formed `<property>` tags interleaved in the same body.
        for caps in PROPERTY_TAG.captures_iter(body) {
            let key = caps[1].trim().to_string();
            args.entry(key)
                .or_insert_with(|| decode_value(&caps[2], &self.repairer));
        }

        args
    }

    fn diagnose(&self, text: &str, trigger: &str) -> FCParseError {
        if !trigger.is_empty() && !contains_trigger(text, trigger) {
            return FCParseError::new(FCParseErrorCode::NoTrigger, "trigger signal not found in output");
        }

        if !INVOKE_OPEN_ANY.is_match(text) && !MALFORMED_INVOKE.is_match(text) {
            if let Some(end) = find_trigger_end(text, trigger)
                && let Some(thinking) = THINKING_BLOCK.captures(text)
            {
                let block = thinking.get(0).unwrap();
                if block.start() <= end && end <= block.end() {
                    return FCParseError::new(
                        FCParseErrorCode::TriggerInThinking,
                        "trigger appears only inside a thinking block",
                    );
                }
            }
            return FCParseError::new(FCParseErrorCode::NoInvoke, "no invoke tag found after trigger");
        }

        if FUNCTION_CALLS_OPEN_ONLY.is_match(text) && !FUNCTION_CALLS_BLOCK.is_match(text) {
            return FCParseError::new(
                FCParseErrorCode::UnclosedFunctionCalls,
                "function_calls block never closed",
            );
        }

        if INVOKE_OPEN_NO_NAME.is_match(text) {
            return FCParseError::new(FCParseErrorCode::MissingInvokeName, "invoke tag missing name attribute");
        }

        if INVOKE_OPEN_ANY.is_match(text) && !INVOKE_TAG.is_match(text) {
            return FCParseError::new(FCParseErrorCode::UnclosedInvoke, "invoke tag never closed");
        }

        FCParseError::new(FCParseErrorCode::ParseFailed, "unable to extract a tool call")
    }
}

struct Candidate {
    name: String,
    args: BTreeMap<String, Value>,
}

impl Candidate {
    fn new(name: String, args: BTreeMap<String, Value>) -> Self {
        Self { name, args }
    }

    fn as_result_shape(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        for (k, v) in &self.args {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    fn into_tool_call(self) -> ToolCall {
        let id = self
            .args
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(idgen::generate);
        ToolCall::new(self.name, self.args, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_grammar_single_call() {
        let parser = FunctionCallParser::new();
        let text = r#"sure, let me check.
<<CALL_ab12cd>>
<function_calls>
<invoke name="Read">
<parameter name="path">/tmp/a.txt</parameter>
</invoke>
</function_calls>"#;
        let outcome = parser.parse(text, "<<CALL_ab12cd>>");
        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].name, "Read");
        assert_eq!(outcome.calls[0].args["path"], "/tmp/a.txt");
    }

    #[test]
    fn flat_invoke_without_wrapper() {
        let parser = FunctionCallParser::new();
        let text = r#"<invoke name="Bash"><parameter name="command">ls</parameter></invoke>"#;
        let outcome = parser.parse(text, "");
        assert_eq!(outcome.calls[0].name, "Bash");
    }

    #[test]
    fn single_call_policy_ignores_second_call() {
        let parser = FunctionCallParser::new();
        let text = r#"<function_calls>
<invoke name="A"><parameter name="x">1</parameter></invoke>
<invoke name="B"><parameter name="y">2</parameter></invoke>
</function_calls>"#;
        let outcome = parser.parse(text, "");
        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].name, "A");
    }

    #[test]
    fn s1_malformed_todowrite() {
        let parser = FunctionCallParser::new();
        let text = r#"● 让我查看：<><invokename="TodoWrite"><parametername="todos">[{"id":"1",": "搜索","Form":"正在搜索","state":"pending"}]"#;
        let outcome = parser.parse(text, "");
        assert_eq!(outcome.calls.len(), 1);
        let call = &outcome.calls[0];
        assert_eq!(call.name, "TodoWrite");
        let todos = &call.args["todos"];
        assert_eq!(todos[0]["id"], "1");
        assert_eq!(todos[0]["content"], "搜索");
        assert_eq!(todos[0]["activeForm"], "正在搜索");
        assert_eq!(todos[0]["status"], "pending");
    }

    #[test]
    fn s2_truncated_thinking_yields_no_invoke() {
        let parser = FunctionCallParser::new();
        let text = "● <thinking\n● Hello";
        let outcome = parser.parse(text, "");
        assert!(outcome.calls.is_empty());
        assert_eq!(outcome.error.unwrap().code, FCParseErrorCode::NoInvoke);
    }

    #[test]
    fn s3_tool_result_echo_yields_no_call() {
        let parser = FunctionCallParser::new();
        let text = r#"<tool_call name="Read"><is_error>false</is_error><result>file content</result><status>completed</status><duration>0s</duration><mcp_server>x</mcp_server></tool_call>"#;
        let outcome = parser.parse(text, "");
        assert!(outcome.calls.is_empty());
    }

    #[test]
    fn legacy_nested_grammar() {
        let parser = FunctionCallParser::new();
        let text = r#"<function_call><invocation><name>Grep</name><parameters><pattern>foo</pattern></parameters></invocation></function_call>"#;
        let outcome = parser.parse(text, "");
        assert_eq!(outcome.calls[0].name, "Grep");
        assert_eq!(outcome.calls[0].args["pattern"], "foo");
    }

    #[test]
    fn empty_content_diagnostic() {
        let parser = FunctionCallParser::new();
        let outcome = parser.parse("   ", "");
        assert_eq!(outcome.error.unwrap().code, FCParseErrorCode::EmptyContent);
    }

    #[test]
    fn missing_trigger_diagnostic() {
        let parser = FunctionCallParser::new();
        let outcome = parser.parse("just some prose, no tags", "<<CALL_zzzz>>");
        assert_eq!(outcome.error.unwrap().code, FCParseErrorCode::NoTrigger);
    }
}
