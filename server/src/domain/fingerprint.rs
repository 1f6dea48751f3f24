//! Fingerprint engine
//!
//! Turns a raw occurrence into a stable grouping key. Tenant-defined rules
//! are checked first: the highest-priority enabled rule whose pattern matches
//! the raw message short-circuits the default algorithm. Otherwise the
//! fingerprint is derived from the error type, the normalized source
//! location, and the shape of the stack trace.
//!
//! Rule patterns are case-sensitive regexes; an invalid pattern is skipped so
//! one bad rule cannot block grouping.

use regex::Regex;
use std::sync::OnceLock;

use crate::core::constants::{FINGERPRINT_MAX_FRAMES, FINGERPRINT_TOP_FRAMES};
use crate::data::types::FingerprintRule;
use crate::utils::crypto::sha256_hex;

/// Inputs to fingerprint computation
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub project_id: &'a str,
    pub message: &'a str,
    pub file: &'a str,
    pub line: i64,
    pub column: Option<i64>,
    pub stack: &'a str,
}

/// Compute the effective fingerprint: rule override first, default otherwise
pub fn fingerprint(input: &FingerprintInput<'_>, rules: &[FingerprintRule]) -> String {
    if let Some(rule) = matching_rule(input.message, rules) {
        tracing::debug!(
            project_id = input.project_id,
            pattern = %rule.pattern,
            group_key = %rule.group_key,
            "Custom fingerprint rule matched"
        );
        return custom_fingerprint(input.project_id, &rule.group_key);
    }

    default_fingerprint(input)
}

/// First rule (in priority order) whose pattern matches the message
fn matching_rule<'r>(message: &str, rules: &'r [FingerprintRule]) -> Option<&'r FingerprintRule> {
    rules.iter().find(|rule| match Regex::new(&rule.pattern) {
        Ok(re) => re.is_match(message),
        Err(e) => {
            tracing::debug!(pattern = %rule.pattern, error = %e, "Skipping invalid rule pattern");
            false
        }
    })
}

/// Fingerprint for a rule-grouped occurrence
fn custom_fingerprint(project_id: &str, group_key: &str) -> String {
    sha256_hex(&format!("{}|custom|{}", project_id, group_key))
}

/// Default structural fingerprint
///
/// Components: project id, error type, normalized file path, line, column,
/// stack depth, and the top frame signatures.
fn default_fingerprint(input: &FingerprintInput<'_>) -> String {
    let error_type = extract_error_type(input.message);
    let frames = parse_stack_frames(input.stack, FINGERPRINT_MAX_FRAMES);
    let top_frames = frames
        .iter()
        .take(FINGERPRINT_TOP_FRAMES)
        .cloned()
        .collect::<Vec<_>>()
        .join("|");

    let normalized_file = normalize_file(input.file);

    let components = [
        input.project_id,
        error_type,
        &normalized_file,
        &input.line.to_string(),
        &input.column.map(|c| c.to_string()).unwrap_or_default(),
        &frames.len().to_string(),
        &top_frames,
    ];

    sha256_hex(&components.join("|"))
}

/// Extract the error-type token from a message.
///
/// "TypeError: Cannot read property 'x'" -> "TypeError"; defaults to "Error".
pub fn extract_error_type(message: &str) -> &str {
    static ERROR_TYPE_RE: OnceLock<Regex> = OnceLock::new();
    let re = ERROR_TYPE_RE
        .get_or_init(|| Regex::new(r"^([A-Z][a-zA-Z]*Error):").expect("static pattern compiles"));

    re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("Error")
}

/// Parse a stack trace into frame signatures ("func:line:col").
///
/// Recognizes two dialects:
/// - Chrome/V8/Node: `    at functionName (file:line:col)`
/// - Firefox: `functionName@file:line:col`
pub fn parse_stack_frames(stack: &str, max_frames: usize) -> Vec<String> {
    static CHROME_RE: OnceLock<Regex> = OnceLock::new();
    static FIREFOX_RE: OnceLock<Regex> = OnceLock::new();

    let chrome = CHROME_RE.get_or_init(|| {
        Regex::new(r"at\s+(?:(.+?)\s+\()?\s*(.+?):(\d+):(\d+)\)?").expect("static pattern compiles")
    });
    let firefox = FIREFOX_RE.get_or_init(|| {
        Regex::new(r"^(.+?)@(.+?):(\d+):(\d+)").expect("static pattern compiles")
    });

    let mut frames = Vec::new();
    for line in stack.lines() {
        if frames.len() >= max_frames {
            break;
        }

        if let Some(caps) = chrome.captures(line) {
            let func = caps.get(1).map(|m| m.as_str()).unwrap_or("anonymous");
            let line_num = caps.get(3).map(|m| m.as_str()).unwrap_or("0");
            let col_num = caps.get(4).map(|m| m.as_str()).unwrap_or("0");
            frames.push(format!("{}:{}:{}", func, line_num, col_num));
        } else if let Some(caps) = firefox.captures(line) {
            let func = caps.get(1).map(|m| m.as_str()).unwrap_or("anonymous");
            let line_num = caps.get(3).map(|m| m.as_str()).unwrap_or("0");
            let col_num = caps.get(4).map(|m| m.as_str()).unwrap_or("0");
            frames.push(format!("{}:{}:{}", func, line_num, col_num));
        }
    }

    frames
}

/// Strip query strings and fragments from a file path
fn normalize_file(file: &str) -> String {
    file.split('?')
        .next()
        .and_then(|s| s.split('#').next())
        .unwrap_or(file)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(message: &'a str, file: &'a str, stack: &'a str) -> FingerprintInput<'a> {
        FingerprintInput {
            project_id: "p1",
            message,
            file,
            line: 42,
            column: Some(7),
            stack,
        }
    }

    fn rule(pattern: &str, group_key: &str, priority: i64) -> FingerprintRule {
        FingerprintRule {
            pattern: pattern.to_string(),
            group_key: group_key.to_string(),
            priority,
        }
    }

    #[test]
    fn test_extract_error_type() {
        assert_eq!(
            extract_error_type("TypeError: Cannot read property 'x'"),
            "TypeError"
        );
        assert_eq!(extract_error_type("DatabaseError: timeout"), "DatabaseError");
        assert_eq!(extract_error_type("something went wrong"), "Error");
        // Lowercase prefix is not an error type token
        assert_eq!(extract_error_type("typeError: nope"), "Error");
    }

    #[test]
    fn test_parse_chrome_frames() {
        let stack = "TypeError: Cannot read property 'x'\n    at handleClick (https://app.example.com/main.js:42:7)\n    at HTMLButtonElement.dispatch (vendor.js:120:33)";
        let frames = parse_stack_frames(stack, 5);
        assert_eq!(frames, vec!["handleClick:42:7", "HTMLButtonElement.dispatch:120:33"]);
    }

    #[test]
    fn test_parse_firefox_frames() {
        let stack = "handleClick@https://app.example.com/main.js:42:7\ndispatch@vendor.js:120:33";
        let frames = parse_stack_frames(stack, 5);
        assert_eq!(frames, vec!["handleClick:42:7", "dispatch:120:33"]);
    }

    #[test]
    fn test_parse_frames_respects_limit() {
        let stack = (0..10)
            .map(|i| format!("    at f{} (app.js:{}:1)", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_stack_frames(&stack, 5).len(), 5);
    }

    #[test]
    fn test_same_shape_same_fingerprint() {
        let stack = "    at handleClick (main.js:42:7)";
        let a = fingerprint(&input("TypeError: x is undefined", "main.js", stack), &[]);
        let b = fingerprint(&input("TypeError: x is undefined", "main.js", stack), &[]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_query_string_does_not_split_groups() {
        let stack = "    at handleClick (main.js:42:7)";
        let a = fingerprint(&input("TypeError: x", "main.js?v=1", stack), &[]);
        let b = fingerprint(&input("TypeError: x", "main.js?v=2#frag", stack), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_error_type_splits_groups() {
        let stack = "    at handleClick (main.js:42:7)";
        let a = fingerprint(&input("TypeError: x", "main.js", stack), &[]);
        let b = fingerprint(&input("RangeError: x", "main.js", stack), &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rule_override_short_circuits() {
        let stack = "    at query (db.js:10:2)";
        let rules = vec![rule("timeout", "db-timeouts", 5)];

        let with_rule = fingerprint(
            &input("DatabaseError: connection timeout", "db.js", stack),
            &rules,
        );
        let expected = custom_fingerprint("p1", "db-timeouts");
        assert_eq!(with_rule, expected);

        // Non-matching message falls back to the default algorithm
        let without = fingerprint(&input("DatabaseError: bad syntax", "db.js", stack), &rules);
        assert_ne!(without, expected);
    }

    #[test]
    fn test_rule_priority_order_wins() {
        let stack = "    at query (db.js:10:2)";
        // Rules arrive pre-sorted by priority descending
        let rules = vec![
            rule("timeout", "specific", 10),
            rule("Database", "broad", 1),
        ];
        let result = fingerprint(
            &input("DatabaseError: connection timeout", "db.js", stack),
            &rules,
        );
        assert_eq!(result, custom_fingerprint("p1", "specific"));
    }

    #[test]
    fn test_rule_matching_is_case_sensitive() {
        let rules = vec![rule("Timeout", "g", 0)];
        assert!(matching_rule("connection timeout", &rules).is_none());
        assert!(matching_rule("connection Timeout", &rules).is_some());
    }

    #[test]
    fn test_invalid_rule_pattern_is_skipped() {
        let stack = "    at query (db.js:10:2)";
        let rules = vec![rule("([unclosed", "broken", 10), rule("timeout", "ok", 1)];
        let result = fingerprint(&input("timeout happened", "db.js", stack), &rules);
        assert_eq!(result, custom_fingerprint("p1", "ok"));
    }
}
