//! Decodes a single parameter value string into a [`serde_json::Value`], trying
//! progressively more tolerant strategies until one produces something usable.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::json_repair::JsonRepairer;

static XML_SIBLING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<([A-Za-z_][\w-]*)>(.*?)</\1>").unwrap());

/// Decodes one parameter's raw text per the four-step order: valid JSON, then
/// XML-fallback sibling extraction, then balanced-bracket extraction, then
/// JSON repair followed by a final parse attempt. Falls back to the raw string
/// (trimmed) if nothing else applies.
pub fn decode_value(raw: &str, repairer: &JsonRepairer) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v;
    }

    if let Some(v) = xml_fallback(trimmed) {
        return v;
    }

    if let Some(candidate) = extract_balanced(trimmed)
        && let Ok(v) = serde_json::from_str::<Value>(&candidate)
    {
        return v;
    }

    let repaired = repairer.repair(trimmed);
    if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
        return v;
    }
    if let Some(candidate) = extract_balanced(trimmed) {
        let repaired_candidate = repairer.repair(&candidate);
        if let Ok(v) = serde_json::from_str::<Value>(&repaired_candidate) {
            return v;
        }
    }

    Value::String(trimmed.to_string())
}

/// Greedily pulls out `<k>v</k>` sibling pairs and returns them as a JSON object,
/// used when a parameter value looks like hand-rolled XML rather than JSON.
fn xml_fallback(text: &str) -> Option<Value> {
    if !text.starts_with('<') {
        return None;
    }
    let mut map = serde_json::Map::new();
    let mut found = false;
    for caps in XML_SIBLING_RE.captures_iter(text) {
        found = true;
        let key = caps[1].to_string();
        let value = caps[2].trim().to_string();
        map.insert(key, Value::String(value));
    }
    if found { Some(Value::Object(map)) } else { None }
}

/// Scans for the first balanced `{...}` or `[...]` span, honouring quotes and
/// backslash escapes, and returns its text verbatim (not yet parsed).
fn extract_balanced(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|b| *b == b'{' || *b == b'[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return std::str::from_utf8(&bytes[start..end]).ok().map(String::from);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_json() {
        let repairer = JsonRepairer::new();
        let v = decode_value(r#"{"a":1}"#, &repairer);
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn decodes_xml_fallback() {
        let repairer = JsonRepairer::new();
        let v = decode_value("<city>Paris</city><unit>celsius</unit>", &repairer);
        assert_eq!(v["city"], "Paris");
        assert_eq!(v["unit"], "celsius");
    }

    #[test]
    fn extracts_balanced_json_amid_prose() {
        let repairer = JsonRepairer::new();
        let v = decode_value(r#"here you go: {"a": [1,2,{"b":3}]} trailing text"#, &repairer);
        assert_eq!(v["a"][2]["b"], 3);
    }

    #[test]
    fn falls_back_to_repair_pass() {
        let repairer = JsonRepairer::new();
        let v = decode_value(r#"[{"id":"1",": "search","Form":"searching","state":"pending"}]"#, &repairer);
        assert_eq!(v[0]["content"], "search");
    }

    #[test]
    fn plain_scalar_passes_through() {
        let repairer = JsonRepairer::new();
        let v = decode_value("just text", &repairer);
        assert_eq!(v, Value::String("just text".to_string()));
    }
}
