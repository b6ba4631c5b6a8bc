//! Persistent learning between people and between runs.
//!
//! Two independently keyed JSON files:
//! - domains: affiliation → `{domains, directory_hints}`
//! - patterns: mail domain → `{patterns, examples:[{name, email}]}`
//!
//! The store is owned by the runner and lent out as `&mut` to one resolution
//! at a time. It is only written after an accepted verdict.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use mailtrace_common::{DomainMemoryEntry, PatternExample, PatternMemoryEntry};

use crate::features::tokenize_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPaths {
    pub domains: PathBuf,
    pub patterns: PathBuf,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: BTreeMap<String, DomainMemoryEntry>,
    patterns: BTreeMap<String, PatternMemoryEntry>,
    paths: Option<MemoryPaths>,
    dirty: bool,
}

impl MemoryStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load both files. A missing file is an empty store; a corrupt one is
    /// logged and treated as empty so a bad checkpoint never blocks a run.
    pub fn load(paths: MemoryPaths) -> Result<Self> {
        let domains = read_json_or_default(&paths.domains)?;
        let patterns = read_json_or_default(&paths.patterns)?;
        Ok(Self {
            domains,
            patterns,
            paths: Some(paths),
            dirty: false,
        })
    }

    pub fn domain_entry(&self, affiliation: &str) -> Option<&DomainMemoryEntry> {
        self.domains.get(affiliation)
    }

    pub fn pattern_entry(&self, mail_domain: &str) -> Option<&PatternMemoryEntry> {
        self.patterns.get(&mail_domain.to_lowercase())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Remember where an affiliation's people were found. Dotted hints are
    /// domains; anything else is kept as a directory hint. Returns whether
    /// the store changed.
    pub fn record_domain_hint(&mut self, affiliation: &str, hint: &str) -> bool {
        let hint = hint.trim();
        if affiliation.is_empty() || hint.is_empty() {
            return false;
        }
        let entry = self.domains.entry(affiliation.to_string()).or_default();
        let inserted = if hint.contains('.') {
            entry.domains.insert(hint.to_string())
        } else {
            entry.directory_hints.insert(hint.to_string())
        };
        self.dirty |= inserted;
        inserted
    }

    /// Record the local-part shape of an accepted email and the example
    /// itself under its (lowercased) mail domain. Returns whether the store
    /// changed.
    pub fn record_pattern(&mut self, email: &str, name: &str) -> bool {
        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };
        let entry = self.patterns.entry(domain.to_lowercase()).or_default();

        let mut changed = false;
        if let Some(pattern) = infer_pattern(local, &tokenize_name(name)) {
            changed |= entry.patterns.insert(pattern.to_string());
        }
        changed |= entry.examples.insert(PatternExample {
            name: name.to_string(),
            email: email.to_string(),
        });
        self.dirty |= changed;
        changed
    }

    /// Write both files if anything changed since the last flush. A no-op for
    /// in-memory stores.
    pub fn flush(&mut self) -> Result<()> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(&paths.domains, &self.domains)?;
        write_json_atomic(&paths.patterns, &self.patterns)?;
        debug!(
            affiliations = self.domains.len(),
            mail_domains = self.patterns.len(),
            "Memory flushed"
        );
        self.dirty = false;
        Ok(())
    }
}

/// Classify a local part against the known shapes, most specific first.
/// `tokens` are lowercased name tokens (first … last).
pub fn infer_pattern(local: &str, tokens: &[String]) -> Option<&'static str> {
    let local = local.to_lowercase();
    let first = tokens.first()?;
    let last = tokens.last()?;
    let fi = first.chars().next()?;
    let initials: String = tokens.iter().filter_map(|t| t.chars().next()).collect();

    let shapes: [(&'static str, String); 7] = [
        ("first.last", format!("{first}.{last}")),
        ("firstlast", format!("{first}{last}")),
        ("f.last", format!("{fi}.{last}")),
        ("flast", format!("{fi}{last}")),
        ("last.first", format!("{last}.{first}")),
        ("lastfirst", format!("{last}{first}")),
        ("initials_last", format!("{initials}{last}")),
    ];
    if let Some((name, _)) = shapes.iter().find(|(_, shape)| *shape == local) {
        return Some(*name);
    }

    if local.contains(last.as_str()) {
        if local.contains(fi) {
            return Some("contains_last_and_fi");
        }
        return Some("contains_last");
    }
    None
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read memory file {}", path.display()))
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt memory file, starting empty");
            Ok(T::default())
        }
    }
}

/// Temp file in the target directory, then rename over the target.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let json = serde_json::to_string_pretty(value).context("Failed to serialize memory")?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
