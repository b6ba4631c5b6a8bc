//! Per-candidate signals for the judge.
//!
//! Everything here is advisory: the judge weighs the features, nothing in the
//! pipeline accepts or rejects a candidate on them directly.

use std::collections::BTreeSet;

use url::Url;

use mailtrace_common::{CandidateFeatures, Person};

use crate::memory::MemoryStore;

/// Distance reported when either the name or the email does not occur in the
/// page text.
pub const UNMEASURABLE_DISTANCE: usize = 10_000_000;

const ROLE_MAILBOXES: &[&str] = &[
    "webmaster",
    "info",
    "contact",
    "support",
    "noreply",
    "no-reply",
    "maintainer",
    "office",
    "admin",
    "secretariat",
    "sekretariat",
];

/// Lowercased name tokens, split on whitespace and hyphens.
pub fn tokenize_name(name: &str) -> Vec<String> {
    name.split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Lowercased local part (everything before the first `@`).
pub fn email_local(email: &str) -> String {
    email
        .split_once('@')
        .map_or(email, |(local, _)| local)
        .to_lowercase()
}

/// Lowercased mail domain (everything after the first `@`).
pub fn email_domain(email: &str) -> String {
    email
        .split_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .unwrap_or_default()
}

/// Lowercased host of a URL without a leading `www.`; "" if unparsable.
pub fn page_domain(url: &str) -> String {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return String::new();
    };
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

pub fn local_looks_like_role(local: &str) -> bool {
    ROLE_MAILBOXES.contains(&local)
}

/// Character distance between the first occurrence of the full name and the
/// first occurrence of the email, both case-insensitive.
pub fn distance_to_name(text: &str, name: &str, email: &str) -> usize {
    let haystack = text.to_lowercase();
    let needle_name = name.trim().to_lowercase();
    if needle_name.is_empty() {
        return UNMEASURABLE_DISTANCE;
    }
    let char_offset = |byte_idx: usize| haystack[..byte_idx].chars().count();

    match (haystack.find(&needle_name), haystack.find(&email.to_lowercase())) {
        (Some(name_at), Some(mail_at)) => char_offset(name_at).abs_diff(char_offset(mail_at)),
        _ => UNMEASURABLE_DISTANCE,
    }
}

/// Build one feature record per candidate, in candidate order.
pub fn build_features(
    person: &Person,
    page_url: &str,
    text: &str,
    candidates: &BTreeSet<String>,
    memory: &MemoryStore,
) -> Vec<CandidateFeatures> {
    let tokens = tokenize_name(&person.name);
    let last = tokens.last().cloned().unwrap_or_default();
    let initials: String = tokens.iter().filter_map(|t| t.chars().next()).collect();

    let page_dom = page_domain(page_url);
    let institution_domains = memory
        .domain_entry(&person.affiliation)
        .map(|entry| &entry.domains);
    let known_patterns: Vec<String> = memory
        .pattern_entry(&page_dom)
        .map(|entry| entry.patterns.iter().cloned().collect())
        .unwrap_or_default();

    candidates
        .iter()
        .map(|email| {
            let local = email_local(email);
            let mail_dom = email_domain(email);
            let domain_matches_page = !page_dom.is_empty()
                && !mail_dom.is_empty()
                && (mail_dom.ends_with(&page_dom) || page_dom.ends_with(&mail_dom));

            CandidateFeatures {
                email: email.clone(),
                local_contains_lastname: !last.is_empty() && local.contains(&last),
                local_contains_initials: !initials.is_empty() && local.contains(&initials),
                page_domain: page_dom.clone(),
                email_domain: mail_dom.clone(),
                domain_matches_page,
                domain_matches_institution_memory: institution_domains
                    .is_some_and(|domains| domains.contains(&mail_dom)),
                approx_distance_to_name: distance_to_name(text, &person.name, email),
                known_patterns_for_page_domain: known_patterns.clone(),
                local_looks_like_role: local_looks_like_role(&local),
                local_raw: local,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenizes_on_whitespace_and_hyphen() {
        assert_eq!(tokenize_name("Anna-Lena  Müller"), vec!["anna", "lena", "müller"]);
        assert!(tokenize_name("   ").is_empty());
    }

    #[test]
    fn page_domain_strips_www() {
        assert_eq!(page_domain("https://www.Acme.edu/people/jane"), "acme.edu");
        assert_eq!(page_domain("https://cs.acme.edu"), "cs.acme.edu");
        assert_eq!(page_domain("not a url"), "");
    }

    #[test]
    fn distance_uses_char_offsets() {
        let text = "Jane Doe · jane.doe@acme.edu";
        assert_eq!(distance_to_name(text, "Jane Doe", "jane.doe@acme.edu"), 11);
        assert_eq!(
            distance_to_name(text, "John Roe", "jane.doe@acme.edu"),
            UNMEASURABLE_DISTANCE
        );
    }

    #[test]
    fn builds_name_and_domain_signals() {
        let mut memory = MemoryStore::in_memory();
        memory.record_domain_hint("Acme University", "acme.edu");
        memory.record_pattern("john.roe@acme.edu", "John Roe");

        let person = Person::new("Jane Doe", "Acme University");
        let text = "Prof. Jane Doe. Email: jane.doe@acme.edu. Office: info@acme.edu";
        let feats = build_features(
            &person,
            "https://www.acme.edu/~jdoe",
            text,
            &candidates(&["info@acme.edu", "jane.doe@acme.edu", "jd@gmail.com"]),
            &memory,
        );

        assert_eq!(feats.len(), 3);
        let info = &feats[0];
        assert_eq!(info.email, "info@acme.edu");
        assert!(info.local_looks_like_role);
        assert!(!info.local_contains_lastname);

        let jane = &feats[1];
        assert_eq!(jane.email, "jane.doe@acme.edu");
        assert!(jane.local_contains_lastname);
        assert!(jane.domain_matches_page);
        assert!(jane.domain_matches_institution_memory);
        assert_eq!(jane.known_patterns_for_page_domain, vec!["first.last"]);
        assert!(jane.approx_distance_to_name < 50);

        let gmail = &feats[2];
        assert!(!gmail.domain_matches_page);
        assert!(!gmail.domain_matches_institution_memory);
        assert!(gmail.local_contains_initials);
        assert_eq!(gmail.approx_distance_to_name, UNMEASURABLE_DISTANCE);
    }

    #[test]
    fn subdomain_counts_as_page_match() {
        let memory = MemoryStore::in_memory();
        let person = Person::new("Jane Doe", "");
        let feats = build_features(
            &person,
            "https://cs.acme.edu/people",
            "",
            &candidates(&["jane@acme.edu"]),
            &memory,
        );
        assert!(feats[0].domain_matches_page);
        assert!(!feats[0].domain_matches_institution_memory);
    }
}
