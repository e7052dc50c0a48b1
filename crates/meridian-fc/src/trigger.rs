use std::sync::LazyLock;

use regex::Regex;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MIN_LEN: usize = 4;
const MAX_LEN: usize = 14;

/// Generates a fresh `<<CALL_xxxx>>` trigger signal for one request.
///
/// The body is 4-14 lower-case alphanumerics, regenerated per request so a client
/// can never pre-empt the parser by guessing the token in advance.
pub fn generate() -> String {
    let len = MIN_LEN + (rand::random::<u64>() as usize) % (MAX_LEN - MIN_LEN + 1);
    let mut body = String::with_capacity(len);
    for _ in 0..len {
        let idx = (rand::random::<u64>() as usize) % ALPHABET.len();
        body.push(ALPHABET[idx] as char);
    }
    format!("<<CALL_{body}>>")
}

/// Derives a trigger deterministically from `seed` instead of `rand`.
///
/// Used when the same request's trigger must be recomputed independently at
/// more than one point in the pipeline (request rewrite, response parsing)
/// without threading fresh state between them: hashing a stable per-request
/// seed such as a trace id yields the same signal both times.
pub fn derive(seed: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let mut bits = hasher.finish();

    let len = MIN_LEN + (bits as usize) % (MAX_LEN - MIN_LEN + 1);
    let mut body = String::with_capacity(len);
    for _ in 0..len {
        bits = bits.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let idx = ((bits >> 33) as usize) % ALPHABET.len();
        body.push(ALPHABET[idx] as char);
    }
    format!("<<CALL_{body}>>")
}

static LEGACY_TRIGGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Function_[A-Za-z0-9]+_Start/>").unwrap());

/// Builds a regex matching exactly the trigger signal issued for one request, plus the
/// legacy `<Function_..._Start/>` form some upstreams still emit unprompted.
pub fn trigger_regex(trigger: &str) -> Regex {
    let escaped = regex::escape(trigger);
    Regex::new(&format!(r"(?:{escaped}|<Function_[A-Za-z0-9]+_Start/>)")).unwrap()
}

/// True if `text` contains either the request's own trigger or the legacy pattern.
pub fn contains_trigger(text: &str, trigger: &str) -> bool {
    if !trigger.is_empty() && text.contains(trigger) {
        return true;
    }
    LEGACY_TRIGGER_RE.is_match(text)
}

/// Byte offset just past the first recognized trigger occurrence, if any.
pub fn find_trigger_end(text: &str, trigger: &str) -> Option<usize> {
    if !trigger.is_empty()
        && let Some(pos) = text.find(trigger)
    {
        return Some(pos + trigger.len());
    }
    LEGACY_TRIGGER_RE.find(text).map(|m| m.end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_trigger_matches_shape() {
        let re = Regex::new(r"^<<CALL_[a-z0-9]{4,14}>>$").unwrap();
        for _ in 0..64 {
            let t = generate();
            assert!(re.is_match(&t), "bad trigger: {t}");
        }
    }

    #[test]
    fn recognizes_legacy_pattern() {
        assert!(contains_trigger("foo <Function_Read_Start/> bar", "<<CALL_abcd>>"));
    }

    #[test]
    fn recognizes_request_trigger() {
        assert!(contains_trigger("lead in <<CALL_ab12>> more", "<<CALL_ab12>>"));
        assert!(!contains_trigger("no trigger here", "<<CALL_ab12>>"));
    }

    #[test]
    fn derived_trigger_matches_shape() {
        let re = Regex::new(r"^<<CALL_[a-z0-9]{4,14}>>$").unwrap();
        for seed in ["trace-1", "trace-2", "", "a much longer trace id value"] {
            let t = derive(seed);
            assert!(re.is_match(&t), "bad derived trigger for {seed:?}: {t}");
        }
    }

    #[test]
    fn derived_trigger_is_stable_for_same_seed() {
        assert_eq!(derive("same-trace-id"), derive("same-trace-id"));
    }

    #[test]
    fn derived_trigger_differs_across_seeds() {
        assert_ne!(derive("trace-a"), derive("trace-b"));
    }
}
