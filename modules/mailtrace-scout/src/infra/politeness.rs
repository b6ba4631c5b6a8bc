use std::time::Duration;

use rand::Rng;

use mailtrace_common::config::PolitenessConfig;

/// Randomised pause before every page fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolitenessDelay {
    min_secs: f64,
    max_secs: f64,
}

impl PolitenessDelay {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let min_secs = min_secs.max(0.0);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
        }
    }

    pub fn from_config(config: &PolitenessConfig) -> Self {
        Self::new(config.min_delay_secs, config.max_delay_secs)
    }

    /// No pause at all. Used by tests and local fixtures.
    pub fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn next_delay(&self) -> Duration {
        let secs = if self.max_secs > self.min_secs {
            rand::rng().random_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::from_secs_f64(secs)
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
