//! Distinguishes an echoed tool *result* from a new tool *call*. Thinking models
//! frequently quote a prior tool's output while reasoning; such echoes are
//! shaped like a call (they carry a `name`) but must never be emitted as one.

use serde_json::Value;

const RESULT_HINT_FIELDS: &[&str] = &["display_result", "duration", "mcp_server"];

/// `obj` is the flattened candidate: the invoke/tool_call name merged with its
/// decoded parameters under the well-known result field names listed in the
/// external interface (`name, is_error, status, result, display_result,
/// duration, mcp_server, id`).
pub fn is_tool_result(obj: &Value) -> bool {
    let Some(map) = obj.as_object() else {
        return false;
    };

    let has_name = map.get("name").map(|v| !v.is_null()).unwrap_or(false);
    if !has_name {
        return true;
    }

    if map.get("is_error").and_then(Value::as_bool) == Some(true) {
        return true;
    }

    if let Some(status) = map.get("status").and_then(Value::as_str)
        && (status == "error" || status == "completed")
        && (map.contains_key("name") || map.contains_key("result"))
    {
        return true;
    }

    let hint_count = RESULT_HINT_FIELDS
        .iter()
        .filter(|k| map.contains_key(**k))
        .count()
        + usize::from(non_empty_result(map));
    if hint_count >= 2 {
        return true;
    }

    false
}

fn non_empty_result(map: &serde_json::Map<String, Value>) -> bool {
    match map.get("result") {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_name_is_result() {
        assert!(is_tool_result(&json!({"status": "completed"})));
    }

    #[test]
    fn is_error_true_is_result() {
        assert!(is_tool_result(&json!({"name": "Read", "is_error": true})));
    }

    #[test]
    fn completed_status_with_name_is_result() {
        assert!(is_tool_result(&json!({
            "name": "Read",
            "is_error": false,
            "result": "file content",
            "status": "completed",
            "duration": "0s",
            "mcp_server": {"name": "x"}
        })));
    }

    #[test]
    fn two_hint_fields_is_result() {
        assert!(is_tool_result(&json!({
            "name": "Read",
            "duration": "0s",
            "mcp_server": {"name": "x"}
        })));
    }

    #[test]
    fn plain_call_is_not_result() {
        assert!(!is_tool_result(&json!({"name": "TodoWrite", "todos": []})));
    }
}
