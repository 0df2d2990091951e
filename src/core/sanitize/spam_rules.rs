// Spam / injection heuristics.
//
// A fixed, versioned table of patterns. This is a blocklist, not a classifier:
// false negatives are expected, false positives should stay rare because every
// pattern is narrow. Bump RULESET_VERSION when the table changes.

use regex::Regex;
use std::sync::LazyLock;

pub const RULESET_VERSION: u32 = 2;

/// Inline event handler attributes: `on<word>=`, with optional spaces before `=`.
pub(crate) const EVENT_HANDLER_PATTERN: &str = r"(?i)\bon[a-z]+\s*=";

/// (rule name, pattern)
const RULE_PATTERNS: &[(&str, &str)] = &[
    ("script_tag", r"(?i)<\s*script"),
    ("javascript_url", r"(?i)javascript\s*:"),
    ("event_handler", EVENT_HANDLER_PATTERN),
    ("data_html_url", r"(?i)data\s*:\s*text/html"),
    ("bbcode_link", r"(?i)\[\s*(url|link)\b"),
    (
        "spam_vocabulary",
        r"(?i)\b(viagra|cialis|levitra|pharmacy|casino|jackpot|lottery|gambling)\b",
    ),
    (
        "url_shortener",
        r"(?i)\b(bit\.ly|tinyurl\.com|goo\.gl|t\.co|ow\.ly|is\.gd|buff\.ly|adf\.ly)/",
    ),
    ("sql_or_quote", r"(?i)'\s*or\s"),
    ("sql_union_select", r"(?i)\bunion\s+(all\s+)?select\b"),
    ("sql_drop_table", r"(?i);\s*drop\s+table\b"),
];

static SPAM_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    RULE_PATTERNS
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(pattern).unwrap()))
        .collect()
});

/// Name of the first rule `text` trips, if any.
pub fn matched_rule(text: &str) -> Option<&'static str> {
    SPAM_RULES
        .iter()
        .find(|(_, rule)| rule.is_match(text))
        .map(|(name, _)| *name)
}

#[allow(dead_code)]
pub fn looks_suspicious(text: &str) -> bool {
    matched_rule(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(SPAM_RULES.len(), RULE_PATTERNS.len());
    }

    #[test]
    fn test_known_spam_samples() {
        let samples = [
            ("Cheap viagra here", "spam_vocabulary"),
            ("check bit.ly/xyz now", "url_shortener"),
            ("admin' or 1=1 --", "sql_or_quote"),
            ("1 UNION SELECT password FROM users", "sql_union_select"),
            ("x'; DROP TABLE comments", "sql_drop_table"),
            ("[url=http://spam.example]win[/url]", "bbcode_link"),
            ("<script>alert(1)</script>", "script_tag"),
            ("JavaScript:alert(1)", "javascript_url"),
            ("<img onerror=alert(1)>", "event_handler"),
            ("data:text/html;base64,AAAA", "data_html_url"),
            ("Win the LOTTERY today", "spam_vocabulary"),
            ("x onpageshow=alert(1)", "event_handler"),
            ("<svg onbegin=alert(1)>", "event_handler"),
            ("ONSTART = go()", "event_handler"),
        ];

        for (text, rule) in samples {
            assert_eq!(matched_rule(text), Some(rule), "sample: {text}");
        }
    }

    #[test]
    fn test_plain_sentences_pass() {
        let clean = [
            "Great article, thanks!",
            "I wonder whether or not this works on Windows.",
            "Someone = me, apparently.",
            "Turn it on = off is the other state.",
            "Once upon a time",
            "The union of two sets is a set.",
            "See https://example.com/docs for details.",
        ];

        for text in clean {
            assert!(!looks_suspicious(text), "false positive: {text}");
        }
    }
}
