//! Candidate email extraction from fetched pages.
//!
//! Four forms are recognised:
//! - plain `local@domain.tld` in the visible text
//! - fragmented addresses in markup where `@` is surrounded by whitespace or
//!   line breaks (`jane\n@\nacme.edu`)
//! - `mailto:` link targets, with any `?subject=...` suffix cut off
//! - symbolic obfuscation (`jane [at] acme [dot] edu`, `jane(at)acme.edu`)
//!
//! Every hit goes through [`sanitize_email`]. Rejected strings are dropped
//! silently.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

const MAX_EMAIL_LEN: usize = 100;

/// Characters peeled off both ends of a raw match.
const WRAPPING: &[char] = &[
    '<', '>', '"', '\'', ' ', '.', ',', ';', ':', '(', ')', '[', ']',
];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").expect("valid regex")
});

static EMAIL_FULL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("valid regex")
});

static FRAGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([a-z0-9._%+\-]+)\s*@\s*([a-z0-9.\-]+\.[a-z]{2,})").expect("valid regex")
});

static MAILTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)mailto:([^"'<>\s?]+)"#).expect("valid regex"));

static SYMBOLIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)([a-z0-9._%+\-]+)\s*(?:\[at\]|\(at\)|\{at\}|\sat\s)\s*((?:[a-z0-9\-]+(?:\s*(?:\[dot\]|\(dot\)|\{dot\}|\sdot\s)\s*|\.))+)([a-z]{2,})\b",
    )
    .expect("valid regex")
});

static DOT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:\[dot\]|\(dot\)|\{dot\}|\sdot\s)\s*").expect("valid regex")
});

/// Clean a raw match into a conservative email address, or reject it.
///
/// Strips surrounding whitespace, wrapping punctuation/quotes and a leading
/// `mailto:`; rejects interior whitespace, anything but exactly one `@`, and
/// strings over 100 characters.
pub fn sanitize_email(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.chars().any(char::is_whitespace) {
        return None;
    }

    let mut email = raw.trim_matches(WRAPPING);
    if email
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("mailto:"))
    {
        email = email[7..].trim_matches(WRAPPING);
    }

    if email.matches('@').count() != 1 || email.len() > MAX_EMAIL_LEN {
        return None;
    }

    EMAIL_FULL_RE.is_match(email).then(|| email.to_string())
}

/// Plain `local@domain.tld` addresses in order of appearance, sanitized.
pub fn scan_plain_emails(text: &str) -> Vec<String> {
    EMAIL_RE
        .find_iter(text)
        .filter_map(|m| sanitize_email(m.as_str()))
        .collect()
}

/// Extract the set of plausible email addresses from one page.
pub fn extract_emails(text: &str, markup: &str) -> BTreeSet<String> {
    let mut found: BTreeSet<String> = scan_plain_emails(text).into_iter().collect();

    for caps in FRAGMENT_RE.captures_iter(markup) {
        found.extend(sanitize_email(&format!("{}@{}", &caps[1], &caps[2])));
    }

    for caps in MAILTO_RE.captures_iter(markup) {
        found.extend(sanitize_email(&caps[1]));
    }

    let combined = format!("{text} {markup}");
    for caps in SYMBOLIC_RE.captures_iter(&combined) {
        found.extend(rebuild_symbolic(&caps[1], &caps[2], &caps[3]));
    }

    found
}

/// Reassemble `user [at] part [dot] part [dot] tld`. Domains with a one-letter
/// label are rejected: they come from prose like "Ph.D. thesis" far more often
/// than from real addresses.
fn rebuild_symbolic(user: &str, domain_body: &str, tld: &str) -> Option<String> {
    let body = DOT_TOKEN_RE.replace_all(domain_body, ".");
    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let domain = format!("{body}{tld}");

    if domain.split('.').any(|label| label.chars().count() < 2) {
        return None;
    }

    sanitize_email(&format!("{user}@{domain}"))
}
