//! Extraction of inline `<think>` spans from a complete answer text

use crate::reasoning::ReasoningBuffer;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::debug;

pub const REASONING_OPEN: &str = "<think>";
pub const REASONING_CLOSE: &str = "</think>";

fn reasoning_span() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            "{}(.*?){}",
            regex::escape(REASONING_OPEN),
            regex::escape(REASONING_CLOSE)
        );
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("reasoning span pattern is valid")
    })
}

/// Move every reasoning span of `text` into `buffer` and return what is left.
///
/// Spans are matched non-overlapping and case-insensitively and may contain
/// newlines. Each non-blank inner line is appended in order. An open tag
/// without a matching close tag is left in place. Without any span the text
/// is returned unchanged; otherwise the remainder is trimmed.
pub fn extract_reasoning(text: &str, buffer: &mut ReasoningBuffer) -> String {
    let mut remainder = String::with_capacity(text.len());
    let mut last = 0;
    let mut spans = 0;

    for captures in reasoning_span().captures_iter(text) {
        let (Some(span), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };

        remainder.push_str(&text[last..span.start()]);
        last = span.end();
        spans += 1;

        for line in inner.as_str().lines() {
            buffer.append(line);
        }
    }

    if spans == 0 {
        return text.to_string();
    }

    remainder.push_str(&text[last..]);
    debug!("Extracted {} reasoning span(s) from answer", spans);
    remainder.trim().to_string()
}
