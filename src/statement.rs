//! SQL text handling between generation and execution
//!
//! Two explicit steps: cleaning the raw text the text-generation service
//! returns, and deciding whether a statement is a read (rows come back,
//! nothing is committed) or a write (executed and committed).

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Opening fence with an optional language tag on its own line.
    static ref OPENING_FENCE: Regex = Regex::new(r"^```([A-Za-z0-9_+\-]*)[ \t]*\r?\n").unwrap();
    /// Opening fence followed by a known SQL tag on the same line.
    static ref INLINE_TAGGED_FENCE: Regex =
        Regex::new(r"(?i)^```(sql|mysql|postgresql|postgres|psql|sqlite)[ \t]+").unwrap();
}

/// Words that start a statement and must never be mistaken for a fence tag.
const STATEMENT_KEYWORDS: &[&str] = &[
    "select", "with", "insert", "update", "delete", "show", "desc", "describe",
    "explain", "create", "drop", "alter",
];

const READ_PREFIXES: &[&str] = &["select", "show", "desc", "describe", "explain"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// Case-insensitive prefix test against the read vocabulary.
    pub fn classify(sql: &str) -> Self {
        let lowered = sql.trim_start().to_lowercase();
        if READ_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            StatementKind::Read
        } else {
            StatementKind::Write
        }
    }
}

/// Strips a leading and trailing code fence and surrounding whitespace.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_generated_sql(raw: &str) -> String {
    let mut text = raw.trim();
    // Each pass removes at most one fence layer; repeat until nothing changes.
    loop {
        let stripped = strip_fence_layer(text);
        if stripped == text {
            return text.to_string();
        }
        text = stripped;
    }
}

fn strip_fence_layer(text: &str) -> &str {
    let mut text = text;

    if text.starts_with("```") {
        let tagged_line = OPENING_FENCE.captures(text).filter(|caps| {
            let tag = caps[1].to_lowercase();
            !STATEMENT_KEYWORDS.contains(&tag.as_str())
        });
        if let Some(caps) = tagged_line {
            text = &text[caps[0].len()..];
        } else if let Some(m) = INLINE_TAGGED_FENCE.find(text) {
            text = &text[m.end()..];
        } else {
            text = &text[3..];
        }
    }

    text = text.trim();
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }

    text.trim()
}
