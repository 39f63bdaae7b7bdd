//! Intent extraction from free-form assistant text.
//!
//! Providers are told to answer with a JSON object when they want an action
//! performed, but they wrap it in prose or markdown fences at will. This is
//! a bounded heuristic, not a JSON parser:
//!
//! - scan for top-level `{ ... }` spans, honouring string literals and escapes
//! - try each span in order of appearance with `serde_json`
//! - the first span that parses into an [`ActionIntent`] wins
//!
//! Failure mode: anything unparseable yields `None`. This function never
//! errors and never panics on arbitrary input.

use crate::intent::ActionIntent;

/// Upper bound on candidate spans examined per reply
const MAX_CANDIDATES: usize = 16;

/// Upper bound on the size of one candidate span
const MAX_SPAN_BYTES: usize = 8 * 1024;

/// Find the first embedded intent in `text`.
pub fn extract_intent(text: &str) -> Option<ActionIntent> {
    object_spans(text)
        .into_iter()
        .take(MAX_CANDIDATES)
        .filter(|span| span.len() <= MAX_SPAN_BYTES)
        .find_map(|span| {
            serde_json::from_str::<serde_json::Value>(span)
                .ok()
                .and_then(|value| ActionIntent::from_value(&value))
        })
}

/// Byte spans of balanced top-level `{...}` groups.
///
/// An unbalanced trailing group is ignored.
pub fn object_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if depth > 0 && in_string {
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
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    // braces are ASCII so both ends are char boundaries
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let intent = extract_intent(r#"{"action": "brightness", "level": 80}"#).unwrap();
        assert_eq!(intent.name, "brightness");
        assert_eq!(intent.params["level"], 80);
    }

    #[test]
    fn test_object_inside_prose_and_fences() {
        let reply = "Sure, dimming it now.\n```json\n{\"action\": \"brightness\", \"level\": 30}\n```\nAnything else?";
        let intent = extract_intent(reply).unwrap();
        assert_eq!(intent.params["level"], 30);
    }

    #[test]
    fn test_no_object_means_no_intent() {
        assert!(extract_intent("The time is 10:42.").is_none());
        assert!(extract_intent("").is_none());
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let reply = r#"{"action": "launch", "app": "weird}{name"}"#;
        let intent = extract_intent(reply).unwrap();
        assert_eq!(intent.params["app"], "weird}{name");
    }

    #[test]
    fn test_skips_unparseable_span_then_finds_intent() {
        let reply = r#"Set {it} like this: {"action": "mute", "muted": true}"#;
        let intent = extract_intent(reply).unwrap();
        assert_eq!(intent.name, "mute");
    }

    #[test]
    fn test_object_without_action_name_is_ignored() {
        assert!(extract_intent(r#"Result: {"level": 40}"#).is_none());
    }

    #[test]
    fn test_unbalanced_input_never_panics() {
        assert!(extract_intent("{{{{ \"action\": ").is_none());
        assert!(extract_intent("}}}} {").is_none());
        assert!(extract_intent("{\"action\": \"é\\\"").is_none());
    }

    #[test]
    fn test_nested_object_is_one_span() {
        let spans = object_spans(r#"a {"name": "volume", "params": {"level": 5}} b"#);
        assert_eq!(spans.len(), 1);
        let intent = extract_intent(spans[0]).unwrap();
        assert_eq!(intent.params["level"], 5);
    }
}
