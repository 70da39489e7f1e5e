//! Response normalization: isolate the JSON payload in the model's text.
//!
//! Models are told to return bare JSON but usually wrap it in a
//! ```` ```json ```` fence anyway. [`normalize`] removes exactly that
//! wrapping. When the result still does not parse, [`extract_json_payload`]
//! is the tolerant fallback: it looks for a fenced block anywhere in the
//! text, then for the outermost `[…]` / `{…}` span.

use once_cell::sync::Lazy;
use regex::Regex;

const JSON_FENCE_OPEN: &str = "```json";
const FENCE: &str = "```";

/// Strip a leading ```` ```json ```` and a trailing ```` ``` ````, trimming
/// whitespace around each step.
///
/// Stripping repeats until nothing changes, so the output never starts with
/// ```` ```json ```` nor ends with ```` ``` ```` and the function is
/// idempotent. Fences elsewhere in the text are left alone.
pub fn normalize(text: &str) -> String {
    let mut s = text.trim();
    loop {
        let before = s.len();
        if let Some(rest) = s.strip_prefix(JSON_FENCE_OPEN) {
            s = rest.trim();
        }
        if let Some(rest) = s.strip_suffix(FENCE) {
            s = rest.trim();
        }
        if s.len() == before {
            return s.to_string();
        }
    }
}

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").unwrap());

/// Locate a JSON payload inside free-form text.
///
/// Tries, in order:
/// 1. the body of the first fenced code block that looks like JSON,
/// 2. the span from the first `[` or `{` to the last matching `]` or `}`.
///
/// Returns `None` when neither is found. The returned slice is not
/// guaranteed to parse.
pub fn extract_json_payload(text: &str) -> Option<&str> {
    for caps in RE_FENCED_BLOCK.captures_iter(text) {
        if let Some(body) = caps.get(1) {
            let body = body.as_str().trim();
            if body.starts_with('[') || body.starts_with('{') {
                return Some(body);
            }
        }
    }
    bracket_span(text)
}

fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let close = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        assert_eq!(normalize("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(normalize("  \n```json\n{\"a\": 1}\n```  \n"), "{\"a\": 1}");
    }

    #[test]
    fn leaves_bare_json_alone() {
        assert_eq!(normalize("[]"), "[]");
        assert_eq!(normalize("  [ ]  "), "[ ]");
    }

    #[test]
    fn only_trailing_fence() {
        assert_eq!(normalize("[1]\n```"), "[1]");
    }

    #[test]
    fn plain_fence_prefix_is_not_stripped() {
        // Only the ```json marker is recognised at the start.
        assert_eq!(normalize("```\n[1]\n```"), "```\n[1]");
    }

    #[test]
    fn never_leaves_markers_and_is_idempotent() {
        let inputs = [
            "",
            "```",
            "```json",
            "``````",
            "```json```json[]``````",
            "```json\n```json\n[1]\n```\n```",
            "not json at all",
            "{not json",
            "  ```json  ",
            "text ```json [1] ```",
            "```JSON\n[]\n```",
        ];
        for input in inputs {
            let once = normalize(input);
            assert!(!once.starts_with("```json"), "{input:?} → {once:?}");
            assert!(!once.ends_with("```"), "{input:?} → {once:?}");
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn payload_from_fence_with_other_language_tag() {
        let text = "Here is the timetable:\n```JSON\n[{\"day\": \"Monday\"}]\n```\nLet me know!";
        assert_eq!(extract_json_payload(text), Some("[{\"day\": \"Monday\"}]"));
    }

    #[test]
    fn payload_from_brackets_in_prose() {
        let text = "Sure! [{\"day\": \"Friday\"}] Hope this helps.";
        assert_eq!(extract_json_payload(text), Some("[{\"day\": \"Friday\"}]"));

        let text = "Result: {\"sessions\": [1]} done";
        assert_eq!(extract_json_payload(text), Some("{\"sessions\": [1]}"));
    }

    #[test]
    fn no_payload() {
        assert_eq!(extract_json_payload("not json at all"), None);
        assert_eq!(extract_json_payload("{not json"), None);
        assert_eq!(extract_json_payload("] backwards ["), None);
    }
}
