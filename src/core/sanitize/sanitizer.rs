// Sanitizer - turns untrusted author names and comment bodies into plain text.
//
// Each pass: decode entities -> drop script/style blocks -> drop tags ->
// drop dangerous URL schemes and inline handlers -> collapse whitespace.
// Passes repeat until the text stops changing, so the output is a fixed point
// (sanitizing twice gives the same result as sanitizing once).

use super::spam_rules::{matched_rule, EVENT_HANDLER_PATTERN, RULESET_VERSION};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_AUTHOR_CHARS: usize = 100;
pub const MAX_BODY_CHARS: usize = 5000;

// Deeper nesting than this is treated as deliberate obfuscation
const MAX_PASSES: usize = 8;

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(script|style)\b[^>]*>.*?<\s*/\s*(script|style)\s*>").unwrap()
});

// Tags, closing tags, comments and doctypes. An unterminated opener loses
// only its tag name, the text after it stays.
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*[a-zA-Z/!?](?:[^<>]*>|[a-zA-Z0-9:-]*)").unwrap()
});

static DANGEROUS_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(javascript|vbscript)\s*:|data\s*:\s*text/html").unwrap()
});

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| Regex::new(EVENT_HANDLER_PATTERN).unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("{field} must not be empty")]
    InvalidInput { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// Deliberately vague so the filter rules are not spelled out to spammers.
    #[error("content was rejected")]
    SuspiciousContent,
}

/// A sanitized author/body pair that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanComment {
    pub author: String,
    pub body: String,
}

// ============================================================================
// SANITIZER TRAIT
// ============================================================================

/// Content-safety capability used by the comment service.
pub trait Sanitizer: Send + Sync {
    fn sanitize_author(&self, raw: &str) -> String;

    fn sanitize_body(&self, raw: &str) -> String;

    /// Name of the spam rule `text` trips, if any.
    fn suspicious_rule(&self, text: &str) -> Option<&'static str>;

    #[allow(dead_code)]
    fn looks_suspicious(&self, text: &str) -> bool {
        self.suspicious_rule(text).is_some()
    }

    /// Full admission check for a new comment.
    fn validate_and_sanitize(&self, author: &str, body: &str) -> Result<CleanComment, SanitizeError> {
        if author.trim().is_empty() {
            return Err(SanitizeError::InvalidInput { field: "author" });
        }
        if body.trim().is_empty() {
            return Err(SanitizeError::InvalidInput { field: "content" });
        }

        let author = self.sanitize_author(author);
        let body = self.sanitize_body(body);

        if author.is_empty() {
            return Err(SanitizeError::InvalidInput { field: "author" });
        }
        if body.is_empty() {
            return Err(SanitizeError::InvalidInput { field: "content" });
        }

        if author.chars().count() > MAX_AUTHOR_CHARS {
            return Err(SanitizeError::TooLong {
                field: "author",
                max: MAX_AUTHOR_CHARS,
            });
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(SanitizeError::TooLong {
                field: "content",
                max: MAX_BODY_CHARS,
            });
        }

        if let Some(rule) = self
            .suspicious_rule(&author)
            .or_else(|| self.suspicious_rule(&body))
        {
            tracing::info!(
                rule,
                ruleset = RULESET_VERSION,
                "Comment rejected by spam heuristics"
            );
            return Err(SanitizeError::SuspiciousContent);
        }

        Ok(CleanComment { author, body })
    }
}

/// Default sanitizer backed by the regex rule set in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSanitizer;

impl Sanitizer for HtmlSanitizer {
    fn sanitize_author(&self, raw: &str) -> String {
        to_plain_text(raw)
    }

    fn sanitize_body(&self, raw: &str) -> String {
        to_plain_text(raw)
    }

    fn suspicious_rule(&self, text: &str) -> Option<&'static str> {
        matched_rule(text)
    }
}

// Free-function forms for callers that don't hold a `Sanitizer`.

#[allow(dead_code)]
pub fn sanitize_author(raw: &str) -> String {
    HtmlSanitizer.sanitize_author(raw)
}

#[allow(dead_code)]
pub fn sanitize_body(raw: &str) -> String {
    HtmlSanitizer.sanitize_body(raw)
}

#[allow(dead_code)]
pub fn validate_and_sanitize(author: &str, body: &str) -> Result<CleanComment, SanitizeError> {
    HtmlSanitizer.validate_and_sanitize(author, body)
}

// ============================================================================
// PIPELINE
// ============================================================================

fn to_plain_text(raw: &str) -> String {
    let mut current = single_pass(raw);

    for _ in 1..MAX_PASSES {
        let next = single_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }

    // Still changing: drop every character that could rebuild markup,
    // an entity, a URL scheme or a handler attribute.
    let flattened: String = current
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '&' | '=' | ':'))
        .collect();
    collapse_whitespace(&flattened)
}

fn single_pass(input: &str) -> String {
    let decoded = html_escape::decode_html_entities(input);
    let without_scripts = SCRIPT_BLOCK.replace_all(&decoded, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    let without_schemes = DANGEROUS_SCHEME.replace_all(&without_tags, "");
    let without_handlers = EVENT_HANDLER.replace_all(&without_schemes, "");
    collapse_whitespace(&without_handlers)
}

fn collapse_whitespace(input: &str) -> String {
    WHITESPACE.replace_all(input, " ").trim().to_string()
}

// ============================================================================
// TESTS
// ============================================================================
