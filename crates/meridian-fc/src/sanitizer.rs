//! The streaming output sanitizer (component G): an incremental filter that
//! removes partial, malformed, and leaked tool-call syntax from the prose a
//! client sees, without ever touching natural language, markdown, or code.
//!
//! The contract is asymmetric with the parser (component F): F must find a
//! call wherever one hides, including inside a `<thinking>` block; G must
//! never delete a complete `<thinking>…</thinking>` block, leaving that to a
//! separate thinking-block renderer downstream.
//!
//! Lines that have already been terminated by a newline are final: once a
//! line-local rule (malformed tag, leaked JSON, truncated thinking-open,
//! nested escaped result) fires on a complete line, that line's suppressed
//! tail is discarded for good. A line still being written (no trailing
//! newline yet) is never discarded outright — it is held back as carry-over
//! instead, so a rule that would otherwise fire mid-tag doesn't eat bytes
//! that later turn out to belong to ordinary prose.

use std::sync::LazyLock;

use regex::Regex;

use crate::trigger::trigger_regex;

/// Upper bound on how much trailing text the sanitizer will withhold waiting
/// for a structural token to complete. Past this, the held text is emitted
/// anyway rather than buffered indefinitely.
const MAX_CARRY: usize = 512;

/// Per-response accumulator: the carry-over tail from the previous chunk, plus
/// flags recording which structural regions this response has ever entered.
#[derive(Debug, Clone, Default)]
pub struct SanitizerState {
    carry: String,
    pub entered_thinking: bool,
    pub entered_function_calls: bool,
    pub entered_tool_result: bool,
}

impl SanitizerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one more chunk of upstream text through the sanitizer, returning
    /// the portion now safe to forward to the client. The remainder is kept
    /// internally and prefixed to the next call.
    pub fn push(&mut self, chunk: &str, trigger: &str) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(chunk);
        self.update_flags(&buf);

        let blocked = strip_blocks(&buf, trigger);
        let (complete_lines, tail) = split_complete_and_tail(&blocked);

        let mut processed = String::new();
        for line in &complete_lines {
            processed.push_str(&clean_line(line));
        }
        let tail_start = processed.len();
        let cleaned = processed + &tail;

        let cut = carry_start(&cleaned, tail_start, trigger);
        self.carry = cleaned[cut..].to_string();
        cleaned[..cut].to_string()
    }

    /// Called once the upstream body has ended. Runs one last cleanup pass
    /// over any residual carry-over — now definitively final — and emits it.
    pub fn finish(&mut self, trigger: &str) -> String {
        let remaining = std::mem::take(&mut self.carry);
        if remaining.is_empty() {
            return remaining;
        }
        self.update_flags(&remaining);
        let blocked = strip_blocks(&remaining, trigger);
        split_keep_newlines(&blocked)
            .iter()
            .map(|line| clean_line(line))
            .collect()
    }

    fn update_flags(&mut self, text: &str) {
        if text.contains("<thinking") {
            self.entered_thinking = true;
        }
        if text.contains("<function_calls") || text.contains("<invoke") {
            self.entered_function_calls = true;
        }
        if text.contains("is_error") || text.contains("display_result") || text.contains("mcp_server") {
            self.entered_tool_result = true;
        }
    }
}

/// One-shot sanitization of a complete, non-streamed text. Equivalent to
/// pushing the whole text through a fresh [`SanitizerState`] and finishing.
pub fn sanitize(text: &str, trigger: &str) -> String {
    let mut state = SanitizerState::new();
    let mut out = state.push(text, trigger);
    out.push_str(&state.finish(trigger));
    out
}

static FUNCTION_CALLS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<function_calls>.*?</function_calls>").unwrap());
static FLAT_INVOKE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<invoke(?:\s+[^>]*)?>.*?</invoke>"#).unwrap());
static TOOL_CALL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<tool_call(?:\s+[^>]*)?>.*?</tool_call>"#).unwrap());
static INVOCATION_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<invocation>.*?</invocation>").unwrap());

static ANTML_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:format|tools|thinking|role)\b[^>]*>.*?(?:(?=<)|$)").unwrap()
});

static CITATION_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[citation:\d+\]").unwrap());

static MALFORMED_TAG_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:<>)?<invokename="[^"]*">|<parametername="[^"]*">|<property\s+name="[^"]*"\s+value="[^"]*"\s*/?>"#,
    )
    .unwrap()
});

static TRUNCATED_THINK_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<think(?:ing)?\b(?![^<\n]*>)").unwrap());

static ORPHAN_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</(?:invoke|function_calls|tool_call|invocation)>").unwrap());

static NESTED_ESCAPED_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\"\}"?,\s*\\?"(?:display_result|duration|is_error|mcp_server)\\?"\s*:"#).unwrap()
});

static LEAKED_JSON_LINE_FIELDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:id|content|status|activeForm)"\s*:"#).unwrap());
static LEAKED_JSON_LINE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:\[|\{|,"[^"]*"\s*:|"\s*:\s*"|id"\s*:)"#).unwrap());

/// Rule 1 (structural blocks + trigger), rule 2 (ANTML), rule 6 (citations).
/// All three are whole-match regexes that only fire on complete spans, so
/// they are safe to run unconditionally on any buffer, complete or partial.
fn strip_blocks(input: &str, trigger: &str) -> String {
    let mut out = input.to_string();
    out = FUNCTION_CALLS_BLOCK.replace_all(&out, "").into_owned();
    out = FLAT_INVOKE_BLOCK.replace_all(&out, "").into_owned();
    out = TOOL_CALL_BLOCK.replace_all(&out, "").into_owned();
    out = INVOCATION_BLOCK.replace_all(&out, "").into_owned();
    out = trigger_regex(trigger).replace_all(&out, "").into_owned();
    out = ANTML_BLOCK.replace_all(&out, "").into_owned();
    out = CITATION_MARKER.replace_all(&out, "").into_owned();
    out
}

/// Rules 3, 4, 5, 7: line-local, only safe to apply once a line is final
/// (terminated by `\n`, or — via [`SanitizerState::finish`] — the stream end).
fn clean_line(line: &str) -> String {
    let (body, terminator) = match line.strip_suffix('\n') {
        Some(b) => (b, "\n"),
        None => (line, ""),
    };

    if is_leaked_json_line(body) {
        return terminator.to_string();
    }

    let body = ORPHAN_CLOSE.replace_all(body, "");

    let mut cut = body.len();
    for re in [&*MALFORMED_TAG_START, &*TRUNCATED_THINK_OPEN, &*NESTED_ESCAPED_RESULT] {
        if let Some(m) = re.find(&body) {
            cut = cut.min(m.start());
        }
    }

    // A truncated-thinking open (rule 5) whose preamble is nothing but a bare
    // bullet marker carries no content worth keeping. Unlike a malformed
    // merged tag (rule 3), which truncates-at-tag and preserves whatever
    // preamble precedes it, this drops the whole line.
    if let Some(m) = TRUNCATED_THINK_OPEN.find(&body)
        && m.start() == cut
        && is_negligible_preamble(&body[..cut])
    {
        return String::new();
    }

    format!("{}{}", &body[..cut], terminator)
}

fn is_negligible_preamble(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || trimmed.chars().all(|c| matches!(c, '●' | '•'))
}

fn is_leaked_json_line(body: &str) -> bool {
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    LEAKED_JSON_LINE_PREFIX.is_match(trimmed) && LEAKED_JSON_LINE_FIELDS.is_match(trimmed)
}

fn split_keep_newlines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for ch in text.chars() {
        cur.push(ch);
        if ch == '\n' {
            out.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Splits into every newline-terminated line, plus a possibly-empty tail
/// holding the final, not-yet-terminated line.
fn split_complete_and_tail(s: &str) -> (Vec<String>, String) {
    match s.rfind('\n') {
        Some(pos) => {
            let complete_part = &s[..=pos];
            let tail = s[pos + 1..].to_string();
            (split_keep_newlines(complete_part), tail)
        }
        None => (Vec::new(), s.to_string()),
    }
}

/// Index into `cleaned` past which nothing is emitted yet. `tail_start` marks
/// where the not-yet-terminated final line begins (`cleaned.len()` if there
/// is none) — the line-local rules only apply there, since everything before
/// it was already finalized by [`clean_line`].
fn carry_start(cleaned: &str, tail_start: usize, trigger: &str) -> usize {
    let len = cleaned.len();
    let mut cut = len;

    // A trailing, still-unclosed `<...`.
    if let Some(last_open) = cleaned.rfind('<') {
        let closed_after = cleaned.rfind('>').map(|c| c > last_open).unwrap_or(false);
        if !closed_after {
            cut = cut.min(last_open);
        }
    }

    // Unbalanced structural opens (close tag not yet seen for the latest open).
    for (open_pat, close_pat) in [
        ("<function_calls>", "</function_calls>"),
        ("<invoke", "</invoke>"),
        ("<tool_call", "</tool_call>"),
        ("<invocation>", "</invocation>"),
    ] {
        let opens = cleaned.matches(open_pat).count();
        let closes = cleaned.matches(close_pat).count();
        if opens > closes
            && let Some(pos) = nth_occurrence_from_end(cleaned, open_pat, opens - closes)
        {
            cut = cut.min(pos);
        }
    }

    // A tail that could still grow into this request's trigger or the
    // canonical `<<CALL_` prefix.
    if let Some(pos) = trailing_trigger_prefix_start(cleaned, trigger) {
        cut = cut.min(pos);
    }

    // Line-local rules, deferred while the final line is still open.
    if tail_start < len {
        let tail = &cleaned[tail_start..];
        for re in [&*MALFORMED_TAG_START, &*TRUNCATED_THINK_OPEN, &*NESTED_ESCAPED_RESULT] {
            if let Some(m) = re.find(tail) {
                cut = cut.min(tail_start + m.start());
            }
        }
        let trimmed = tail.trim_start();
        if LEAKED_JSON_LINE_PREFIX.is_match(trimmed) {
            let offset = tail.len() - trimmed.len();
            cut = cut.min(tail_start + offset);
        }
    }

    if len - cut > MAX_CARRY {
        cut = len - MAX_CARRY;
    }
    while cut > 0 && !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

fn nth_occurrence_from_end(haystack: &str, needle: &str, n: usize) -> Option<usize> {
    haystack.match_indices(needle).rev().nth(n - 1).map(|(i, _)| i)
}

fn trailing_trigger_prefix_start(s: &str, trigger: &str) -> Option<usize> {
    const CANONICAL: &str = "<<CALL_";
    let candidates: [&str; 2] = [trigger, CANONICAL];
    let mut best: Option<usize> = None;
    for full in candidates {
        if full.is_empty() {
            continue;
        }
        let max = full.len().min(s.len());
        for l in (1..=max).rev() {
            if !s.is_char_boundary(s.len() - l) {
                continue;
            }
            let tail = &s[s.len() - l..];
            if full.starts_with(tail) {
                let pos = s.len() - l;
                best = Some(best.map_or(pos, |b| b.min(pos)));
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_on_plain_prose() {
        let text = "Sure, here's the answer: the sky is blue.\n\n```rust\nlet x = 1;\n```\n";
        let once = sanitize(text, "");
        let twice = sanitize(&once, "");
        assert_eq!(once, twice);
        assert_eq!(once, text);
    }

    #[test]
    fn strips_complete_function_calls_block() {
        let text = "before\n<function_calls><invoke name=\"Read\"><parameter name=\"path\">/a</parameter></invoke></function_calls>\nafter";
        let out = sanitize(text, "");
        assert_eq!(out, "before\n\nafter");
    }

    #[test]
    fn preserves_complete_thinking_block() {
        let text = "<thinking>I should call Read</thinking>\nHello";
        let out = sanitize(text, "");
        assert!(out.contains("<thinking>I should call Read</thinking>"));
        assert!(out.contains("Hello"));
    }

    #[test]
    fn preserves_tool_result_bullet() {
        let text = "● Read(/tmp/a.txt)\n⎿ contents of the file\nDone.";
        let out = sanitize(text, "");
        assert_eq!(out, text);
    }

    #[test]
    fn s1_malformed_todowrite_truncates_at_tag_preserving_preamble() {
        let text = r#"● 让我查看：<><invokename="TodoWrite"><parametername="todos">[{"id":"1",": "搜索","Form":"正在搜索","state":"pending"}]"#;
        let out = sanitize(text, "");
        assert_eq!(out, "● 让我查看：");
    }

    #[test]
    fn s2_truncated_thinking_drops_bare_bullet_line() {
        let text = "● <thinking\n● Hello";
        let out = sanitize(text, "");
        assert_eq!(out, "● Hello");
    }

    #[test]
    fn s4_nested_escaped_json_preserves_preceding_prose() {
        let text = "Done reading the file\\\"}\",\\\"display_result\\\":\\\"\\\",\\\"duration\\\":\\\"0s\\\",\\\"is_error\\\":false,\\\"mcp_server\\\":{\\\"name\\\":\\\"x\\\"}";
        let out = sanitize(text, "");
        assert_eq!(out, "Done reading the file");
    }

    #[test]
    fn removes_citation_markers() {
        let text = "As shown earlier[citation:3], the result holds.";
        let out = sanitize(text, "");
        assert_eq!(out, "As shown earlier, the result holds.");
    }

    #[test]
    fn strips_leaked_todo_json_line() {
        let text = "Let's plan.\n[{\"id\":\"1\",\"content\":\"a\",\"status\":\"pending\",\"activeForm\":\"doing a\"}]\nOk.";
        let out = sanitize(text, "");
        assert_eq!(out, "Let's plan.\n\nOk.");
    }

    #[test]
    fn strips_trigger_signal() {
        let text = "<<CALL_ab12cd>>\n<invoke name=\"Read\"><parameter name=\"path\">/a</parameter></invoke>\ndone";
        let out = sanitize(text, "<<CALL_ab12cd>>");
        assert_eq!(out, "\n\ndone");
    }

    #[test]
    fn stream_equivalence_across_arbitrary_split() {
        let text = "before <function_calls><invoke name=\"Read\"><parameter name=\"path\">/a</parameter></invoke></function_calls> after [citation:1] tail";
        let whole = sanitize(text, "");

        for split in 0..=text.len() {
            if !text.is_char_boundary(split) {
                continue;
            }
            let (a, b) = text.split_at(split);
            let mut state = SanitizerState::new();
            let mut streamed = state.push(a, "");
            streamed.push_str(&state.push(b, ""));
            streamed.push_str(&state.finish(""));
            assert_eq!(streamed, whole, "mismatch splitting at {split}");
        }
    }

    #[test]
    fn carry_over_never_exceeds_bound() {
        let mut state = SanitizerState::new();
        let chunk = "<function_calls>".to_string() + &"x".repeat(4096);
        let out = state.push(&chunk, "");
        assert!(out.len() < chunk.len());
        assert!(state.carry.len() <= MAX_CARRY);
    }

    #[test]
    fn partial_invoke_tag_is_carried_then_flushed() {
        let mut state = SanitizerState::new();
        let first = state.push("hello <invo", "");
        assert_eq!(first, "hello ");
        let second = state.push("ke name=\"X\"><parameter name=\"a\">1</parameter></invoke> world", "");
        assert_eq!(second, " world");
    }

    #[test]
    fn malformed_tag_split_across_chunks_does_not_leak_body() {
        let mut state = SanitizerState::new();
        let first = state.push("foo <invokename=\"X\">bar", "");
        assert_eq!(first, "foo ");
        let second = state.push("baz\nqux", "");
        assert_eq!(second, "\nqux");
        assert!(state.finish("").is_empty());
    }
}
