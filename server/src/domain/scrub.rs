//! PII scrubbing
//!
//! Strips personally identifiable information from messages and stack traces
//! before anything is persisted. Patterns are compiled once.

use regex::Regex;
use std::sync::OnceLock;

struct ScrubPattern {
    pattern: &'static str,
    replacement: &'static str,
}

const PATTERNS: &[ScrubPattern] = &[
    ScrubPattern {
        pattern: r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
        replacement: "[email]",
    },
    ScrubPattern {
        pattern: r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b",
        replacement: "[ip]",
    },
    ScrubPattern {
        pattern: r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b",
        replacement: "[card]",
    },
    ScrubPattern {
        pattern: r#"(?i)["']?password["']?\s*[:=]\s*["'][^"']*["']"#,
        replacement: r#""password":"[filtered]""#,
    },
    ScrubPattern {
        pattern: r#"(?i)["']?(?:token|secret|api_?key|authorization)["']?\s*[:=]\s*["'][^"']*["']"#,
        replacement: r#""[filtered_key]":"[filtered]""#,
    },
    ScrubPattern {
        pattern: r"(?i)Bearer\s+[A-Za-z0-9._~+/=-]+",
        replacement: "Bearer [filtered]",
    },
];

fn compiled() -> &'static Vec<(Regex, &'static str)> {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|p| {
                (
                    Regex::new(p.pattern).expect("static pattern compiles"),
                    p.replacement,
                )
            })
            .collect()
    })
}

/// Replace PII in free-form text with fixed placeholders
pub fn scrub_pii(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in compiled() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}
