//! Text normalization applied wherever text crosses a trust boundary.
//!
//! - CR-LF becomes LF
//! - ASCII control characters are dropped, except `\n` and `\t`
//! - runs of two or more spaces/tabs collapse to one space
//! - leading and trailing whitespace is trimmed
//!
//! `sanitize_value` applies the same rules to every string inside a JSON value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static HORIZONTAL_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("static regex"));

/// Normalize arbitrary text. Total over any input.
pub fn sanitize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let stripped: String = unified
        .chars()
        .filter(|c| !is_stripped_control(*c))
        .collect();
    HORIZONTAL_RUNS
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// Sanitize every string nested inside maps and sequences.
/// Map keys are left untouched; numbers, booleans and null pass through.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_stripped_control(c: char) -> bool {
    c.is_ascii_control() && c != '\n' && c != '\t'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crlf_becomes_lf() {
        assert_eq!(sanitize_text("uno\r\ndue"), "uno\ndue");
    }

    #[test]
    fn test_control_chars_removed() {
        assert_eq!(sanitize_text("ac\u{0007}qua\u{0000}"), "acqua");
        // lone CR is a control character too
        assert_eq!(sanitize_text("a\rb"), "ab");
        assert_eq!(sanitize_text("del\u{007f}"), "del");
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(sanitize_text("troppa    luce\t\tqui"), "troppa luce qui");
        // single tab survives
        assert_eq!(sanitize_text("a\tb"), "a\tb");
    }

    #[test]
    fn test_newlines_preserved() {
        assert_eq!(sanitize_text("  riga 1\n\nriga 2  "), "riga 1\n\nriga 2");
    }

    #[test]
    fn test_idempotent() {
        let once = sanitize_text(" x \r\n  y\u{0001}\t\t z ");
        assert_eq!(sanitize_text(&once), once);
    }

    #[test]
    fn test_sanitize_value_recurses() {
        let v = json!({
            "reply": "  ciao   mondo ",
            "items": ["a\u{0002}b", 3, null],
            "nested": { "ok": true, "text": "x\r\ny" }
        });
        let clean = sanitize_value(&v);
        assert_eq!(clean["reply"], "ciao mondo");
        assert_eq!(clean["items"][0], "ab");
        assert_eq!(clean["items"][1], 3);
        assert!(clean["items"][2].is_null());
        assert_eq!(clean["nested"]["text"], "x\ny");
        assert_eq!(clean["nested"]["ok"], true);
    }
}
