use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_]+)").unwrap());

pub const PIPE: char = '|';

/// Strips a leading `@` and surrounding whitespace.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_string()
}

/// Mentioned logins in first-seen order, without duplicates.
pub fn parse_mentions(body: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    MENTION_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

pub fn mentions_field(body: Option<&str>) -> String {
    body.map(|b| join_pipe(parse_mentions(b)))
        .unwrap_or_default()
}

pub fn join_pipe<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() || !seen.insert(value.to_string()) {
            continue;
        }
        out.push(value.to_string());
    }
    out.join("|")
}

pub fn split_pipe(field: &str) -> Vec<String> {
    field
        .split(PIPE)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncates on a char boundary, used for debug previews of response bodies.
pub fn preview(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &input[..idx]),
        None => input.to_string(),
    }
}
