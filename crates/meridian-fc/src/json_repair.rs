//! Best-effort repair of near-miss JSON emitted by models mid-stream or truncated
//! by an upstream. Operates as a single textual pass before re-parsing; never
//! guarantees valid JSON, only a strictly-better-or-equal chance of parsing.

use regex::Regex;

use crate::idgen;

pub struct JsonRepairer {
    adjacent_objects: Regex,
    trailing_comma: Regex,
    state_key: Regex,
    form_key: Regex,
    unquoted_scalar: Regex,
    missing_open_quote: Regex,
    empty_status: Regex,
    empty_id: Regex,
    truncated_progress: Regex,
    malformed_key_value: Regex,
    severely_malformed_array: Regex,
}

impl Default for JsonRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRepairer {
    pub fn new() -> Self {
        Self {
            adjacent_objects: Regex::new(r"\}(\s*)\{").unwrap(),
            trailing_comma: Regex::new(r",(\s*)([}\]])").unwrap(),
            state_key: Regex::new(r#""state"\s*:"#).unwrap(),
            form_key: Regex::new(r#""Form"\s*:"#).unwrap(),
            unquoted_scalar: Regex::new(
                r#""(status|priority)"\s*:\s*([A-Za-z_][A-Za-z0-9_]*)\s*([,}])"#,
            )
            .unwrap(),
            missing_open_quote: Regex::new(r#":(\s*)([A-Za-z_][A-Za-z0-9_ ]*)""#).unwrap(),
            empty_status: Regex::new(r#""status"\s*:\s*""\s*"#).unwrap(),
            empty_id: Regex::new(r#""id"\s*:\s*""\s*"#).unwrap(),
            truncated_progress: Regex::new(r#""_progress""#).unwrap(),
            malformed_key_value: Regex::new(r#",":\s*""#).unwrap(),
            severely_malformed_array: Regex::new(r#"^\s*\[\s*":""#).unwrap(),
        }
    }

    /// Applies every tolerance rule in one pass and returns the rewritten text.
    /// Does not itself attempt to parse the result.
    pub fn repair(&self, input: &str) -> String {
        if self.severely_malformed_array.is_match(input) {
            return "[]".to_string();
        }

        let mut out = input.to_string();

        // Field-name reconstruction: `,": "value"` -> `,"content":"value"`. Must run
        // before the generic missing-opening-quote pass so the synthesized key isn't
        // mistaken for a bareword value.
        out = self
            .malformed_key_value
            .replace_all(&out, ",\"content\":\"")
            .into_owned();

        out = self.truncated_progress.replace_all(&out, "\"in_progress\"").into_owned();

        out = self.state_key.replace_all(&out, "\"status\":").into_owned();
        out = self.form_key.replace_all(&out, "\"activeForm\":").into_owned();

        out = self
            .unquoted_scalar
            .replace_all(&out, |caps: &regex::Captures| {
                format!("\"{}\":\"{}\"{}", &caps[1], &caps[2], &caps[3])
            })
            .into_owned();

        out = self
            .missing_open_quote
            .replace_all(&out, "$1\"$2\"")
            .into_owned();

        out = self
            .empty_status
            .replace_all(&out, "\"status\":\"pending\"")
            .into_owned();

        // Empty ids get a fresh generated value; each match gets a distinct id.
        while let Some(m) = self.empty_id.find(&out) {
            let replacement = format!("\"id\":\"{}\"", idgen::generate());
            out.replace_range(m.range(), &replacement);
        }

        out = self.trailing_comma.replace_all(&out, "$2").into_owned();
        out = self.adjacent_objects.replace_all(&out, "},{").into_owned();

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_dropped_content_key() {
        let repairer = JsonRepairer::new();
        let input = r#"[{"id":"1",": "search","Form":"searching","state":"pending"}]"#;
        let repaired = repairer.repair(input);
        let value: serde_json::Value = serde_json::from_str(&repaired).expect("should parse");
        let obj = &value[0];
        assert_eq!(obj["content"], "search");
        assert_eq!(obj["activeForm"], "searching");
        assert_eq!(obj["status"], "pending");
    }

    #[test]
    fn fixes_trailing_commas_and_missing_commas() {
        let repairer = JsonRepairer::new();
        let input = r#"[{"a":1,}{"b":2,}]"#;
        let repaired = repairer.repair(input);
        let value: serde_json::Value = serde_json::from_str(&repaired).expect("should parse");
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn severely_malformed_array_yields_empty() {
        let repairer = JsonRepairer::new();
        let input = r#"[":", "junk"]"#;
        assert_eq!(repairer.repair(input), "[]");
    }

    #[test]
    fn empty_status_defaults_to_pending() {
        let repairer = JsonRepairer::new();
        let input = r#"{"status":""}"#;
        let repaired = repairer.repair(input);
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn truncated_progress_restored() {
        let repairer = JsonRepairer::new();
        let input = r#"{"status":"_progress"}"#;
        let repaired = repairer.repair(input);
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["status"], "in_progress");
    }
}
