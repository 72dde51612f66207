//! Content Sanitizer
//!
//! Cleans model-generated text before display:
//!
//! - reasoning wrappers (`<think>…</think>` and friends) are removed with
//!   their content
//! - answer wrappers (`<answer>…</answer>` and friends) are replaced by
//!   their content
//! - reserved-token artifacts are removed
//! - runs of 3+ newlines collapse to one blank line and the result is trimmed
//!
//! [`sanitize_status`] additionally strips every remaining angle-bracket tag
//! and collapses all whitespace, for one-line status text.
//!
//! Both functions apply their rules until the text stops changing. Every
//! rule only removes characters, so this always terminates, and the output
//! is a fixpoint: sanitizing it again returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

/// Tags whose content is internal reasoning and never shown
pub const INTERNAL_TAGS: &[&str] = &[
    "think",
    "thinking",
    "thought",
    "reasoning",
    "internal",
    "internal_monologue",
    "planning",
    "analysis",
    "scratchpad",
    "reflection",
];

/// Tags whose content is the answer and is kept without the tags
pub const ANSWER_TAGS: &[&str] = &["answer", "final_answer", "response", "output"];

/// Opening and closing forms of one internal tag
struct TagPair {
    open: Regex,
    close: Regex,
}

/// One pair per internal tag (the regex crate has no backreferences)
static INTERNAL_PAIRS: Lazy<Vec<TagPair>> = Lazy::new(|| {
    INTERNAL_TAGS
        .iter()
        .map(|tag| TagPair {
            open: Regex::new(&format!(r"(?i)<{tag}(?:\s[^>]*)?>")).unwrap(),
            close: Regex::new(&format!(r"(?i)</{tag}\s*>")).unwrap(),
        })
        .collect()
});

/// Any leftover open, close or self-closing tag from either list
static KNOWN_TAG: Lazy<Regex> = Lazy::new(|| {
    let names = INTERNAL_TAGS
        .iter()
        .chain(ANSWER_TAGS)
        .copied()
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)</?\s*(?:{names})(?:\s[^>]*)?/?>")).unwrap()
});

/// Reserved special tokens and bracketed citation markers
static RESERVED_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\|(?:reserved_special_token_\d+|[A-Za-z_]+(?:_id)?)\|>|【\d+(?::\d+)*(?:†[^】]*)?】")
        .unwrap()
});

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]+>").unwrap());

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Clean free text for display
#[must_use]
pub fn sanitize(text: &str) -> String {
    fixpoint(text, sanitize_pass)
}

/// Clean text for a single status line
#[must_use]
pub fn sanitize_status(text: &str) -> String {
    fixpoint(text, |input| {
        let out = sanitize_pass(input);
        let out = ANY_TAG.replace_all(&out, "");
        let out = WHITESPACE_RUN.replace_all(&out, " ");
        out.trim().to_string()
    })
}

fn fixpoint(text: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = pass(text);
    loop {
        let next = pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n");

    for pair in INTERNAL_PAIRS.iter() {
        out = remove_balanced(&out, pair);
    }
    out = KNOWN_TAG.replace_all(&out, "").into_owned();
    out = RESERVED_TOKEN.replace_all(&out, "").into_owned();
    out = EXCESS_NEWLINES.replace_all(&out, "\n\n").into_owned();

    out.trim().to_string()
}

/// Remove every matched open/close span of one tag, outermost pair first
///
/// Tags are paired by nesting depth, so an inner close never ends the outer
/// span early. Unmatched tags are left for the lone-tag sweep.
fn remove_balanced(text: &str, pair: &TagPair) -> String {
    let mut marks: Vec<(usize, usize, bool)> = pair
        .open
        .find_iter(text)
        .map(|m| (m.start(), m.end(), true))
        .chain(pair.close.find_iter(text).map(|m| (m.start(), m.end(), false)))
        .collect();
    if marks.is_empty() {
        return text.to_string();
    }
    marks.sort_unstable_by_key(|&(start, _, _)| start);

    let mut opens: Vec<usize> = Vec::new();
    // Disjoint, ordered by start; a later pair swallows the spans it encloses
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for (start, end, is_open) in marks {
        if is_open {
            opens.push(start);
        } else if let Some(open_start) = opens.pop() {
            while spans.last().is_some_and(|&(s, _)| s >= open_start) {
                spans.pop();
            }
            spans.push((open_start, end));
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        if start >= cursor {
            out.push_str(&text[cursor..start]);
        }
        cursor = cursor.max(end);
    }
    out.push_str(&text[cursor..]);
    out
}
