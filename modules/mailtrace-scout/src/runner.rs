//! Batch loop: people in input order, one at a time, with memory
//! checkpoints and a run summary.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use mailtrace_common::Person;

use crate::infra::{EventKind, RunLog};
use crate::io::ResultRow;
use crate::memory::MemoryStore;
use crate::resolver::{Resolution, Resolver};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub total: usize,
    pub found: usize,
    pub timed_out: usize,
    pub pages_scanned: usize,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn failures(&self) -> usize {
        self.total - self.found
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Complete ===")?;
        writeln!(f, "People processed:  {}", self.total)?;
        writeln!(f, "Emails found:      {}", self.found)?;
        writeln!(f, "Not found:         {}", self.failures())?;
        writeln!(f, "Timed out:         {}", self.timed_out)?;
        writeln!(f, "Pages scanned:     {}", self.pages_scanned)?;
        write!(f, "Elapsed:           {:.1}s", self.elapsed.as_secs_f64())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Runner {
    resolver: Resolver,
}

impl Runner {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Resolve every person and return one row per person, in input order.
    ///
    /// A person's failure degrades to an empty email. Memory flush failures,
    /// including the final one, are logged and never discard the rows.
    pub async fn run(
        &self,
        people: &[Person],
        memory: &mut MemoryStore,
        log: &mut RunLog,
    ) -> (Vec<ResultRow>, RunStats) {
        let limits = &self.resolver.settings().limits;
        let started = Instant::now();
        let mut stats = RunStats {
            total: people.len(),
            ..Default::default()
        };
        let mut rows = Vec::with_capacity(people.len());

        info!(people = people.len(), run_id = log.run_id.as_str(), "Run started");

        for (idx, person) in people.iter().enumerate() {
            let index = idx + 1;
            info!(index, total = people.len(), person = %person, "Resolving");

            let person_started = Instant::now();
            let pages = AtomicUsize::new(0);
            let resolving = self.resolver.resolve_counted(person, memory, log, &pages);
            let (resolution, timed_out) = match limits.person_timeout() {
                Some(deadline) => match tokio::time::timeout(deadline, resolving).await {
                    Ok(resolution) => (resolution, false),
                    Err(_) => {
                        warn!(person = %person, timeout_secs = deadline.as_secs(), "Person timed out");
                        let resolution = Resolution {
                            found: None,
                            pages_scanned: pages.load(Ordering::Relaxed),
                            elapsed: person_started.elapsed(),
                        };
                        (resolution, true)
                    }
                },
                None => (resolving.await, false),
            };

            stats.pages_scanned += resolution.pages_scanned;
            stats.timed_out += usize::from(timed_out);

            let (email, source, query) = match &resolution.found {
                Some(found) => {
                    stats.found += 1;
                    info!(
                        email = found.email.as_str(),
                        source = found.source_url.as_str(),
                        query = found.source_query.as_str(),
                        elapsed_s = resolution.elapsed.as_secs_f64(),
                        "Email found"
                    );
                    (
                        found.email.clone(),
                        found.source_url.clone(),
                        found.source_query.clone(),
                    )
                }
                None => {
                    info!(
                        person = %person,
                        pages = resolution.pages_scanned,
                        elapsed_s = resolution.elapsed.as_secs_f64(),
                        "No email found"
                    );
                    Default::default()
                }
            };

            log.log(
                Some(person),
                EventKind::PersonDone {
                    index,
                    email: email.clone(),
                    source,
                    query,
                    pages_scanned: resolution.pages_scanned,
                    duration_s: resolution.elapsed.as_secs_f64(),
                    timed_out,
                },
            );
            rows.push(ResultRow {
                name: person.name.clone(),
                institution: person.affiliation.clone(),
                email,
            });

            if limits.checkpoint_every > 0 && index % limits.checkpoint_every == 0 {
                if let Err(e) = memory.flush() {
                    warn!(error = %e, "Memory checkpoint failed");
                }
            }
        }

        if let Err(e) = memory.flush() {
            warn!(error = %e, "Final memory flush failed; results are kept");
        }

        stats.elapsed = started.elapsed();
        log.log(
            None,
            EventKind::RunDone {
                total: stats.total,
                found: stats.found,
                failures: stats.failures(),
                timed_out: stats.timed_out,
                pages_scanned: stats.pages_scanned,
                elapsed_s: stats.elapsed.as_secs_f64(),
            },
        );
        (rows, stats)
    }
}
