// src/issue/engine.rs

//! Optimistic update engine
//!
//! Many machines mutate the same issue body with no lock service available,
//! so every row transition is a compare-and-retry cycle: fetch the document,
//! apply the change to this machine's row, and write back only if the
//! document is unchanged since the fetch. Each machine owns a disjoint row,
//! so conflicts are transient; the loop's job is to replay this machine's
//! own transition against the latest document, never to merge row edits.

use crate::error::{Error, Result};
use crate::issue::client::{IssueStore, WriteOutcome};
use crate::issue::table::{RowChange, StatusTable};
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded exponential backoff with jitter
///
/// The delay doubles per attempt up to a cap and is randomized upward by the
/// jitter factor so a fleet hitting one issue at once does not retry in
/// lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next cycle after `attempt` failed ones
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let jitter = rand::random::<f32>() * self.jitter_factor.clamp(0.0, 1.0);
        backoff.mul_f64(1.0 + f64::from(jitter))
    }
}

/// Applies row transitions to a shared issue with optimistic concurrency
pub struct UpdateEngine<'a, S: IssueStore> {
    store: &'a S,
    policy: RetryPolicy,
}

impl<'a, S: IssueStore> UpdateEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(store: &'a S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Transition this machine's row and commit it to the issue
    ///
    /// Conflicts and transient remote errors replay the whole cycle (fresh
    /// fetch, fresh row location, fresh render) under the backoff budget.
    /// Permanent errors such as a missing row propagate immediately.
    /// Exhausting the budget on conflicts yields
    /// `ConcurrencyExhausted`; exhausting it on a transient error yields
    /// that error.
    pub fn update_row(&self, hostname: &str, manager: &str, change: &RowChange) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_commit(hostname, manager, change) {
                Ok(WriteOutcome::Committed) => {
                    debug!(
                        "Committed {} for {hostname}#{manager} on attempt {attempts}",
                        change.status
                    );
                    return Ok(());
                }
                Ok(WriteOutcome::Conflict) => {
                    if attempts >= self.policy.max_attempts {
                        return Err(Error::ConcurrencyExhausted { attempts });
                    }
                    warn!(
                        "Issue changed concurrently, replaying {hostname}#{manager} \
                         (attempt {attempts}/{})",
                        self.policy.max_attempts
                    );
                }
                Err(e) if e.is_transient() => {
                    if attempts >= self.policy.max_attempts {
                        return Err(e);
                    }
                    warn!(
                        "Transient error updating {hostname}#{manager}: {e}, retrying \
                         (attempt {attempts}/{})",
                        self.policy.max_attempts
                    );
                }
                Err(e) => return Err(e),
            }
            std::thread::sleep(self.policy.delay_for(attempts));
        }
    }

    /// One fetch → mutate → conditional-write cycle
    fn try_commit(&self, hostname: &str, manager: &str, change: &RowChange) -> Result<WriteOutcome> {
        let snapshot = self.store.fetch()?;
        let mut table = StatusTable::parse(&snapshot.body);
        table.find_row_mut(hostname, manager)?.apply(change);
        let body = table.render();
        self.store.write_if_unchanged(&snapshot, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            jitter_factor: 0.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        // Capped from here on
        assert_eq!(policy.delay_for(4), Duration::from_millis(400));
        assert_eq!(policy.delay_for(20), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.5,
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
