//! FIFO work queue of date tokens with bounded requeueing
//!
//! Tokens are taken from the head and a token whose page could not be used
//! goes back on the tail, so it is seen again later in the same drain.
//! Appending while draining is the normal mode of operation. Each token gets
//! at most `max_attempts` tries with an exponential cool-down between them;
//! a token that runs out is reported, never dropped silently.

use super::{Requeue, RunReport, TokenOutcome};
use crate::{DateToken, RetryConfig};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Limits on how often and how fast a token is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 10,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Retry immediately, up to `max_attempts` tries per token
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
    }

    /// Cool-down before the next try after `attempts` failed ones
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(2u32.pow(exponent))
            .min(self.backoff_max)
    }
}

/// A token waiting in the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub token: DateToken,
    /// Tries already made
    pub attempts: u32,
    /// Earliest moment the next try may start
    pub not_before: Option<Instant>,
}

impl QueueEntry {
    fn fresh(token: DateToken) -> Self {
        QueueEntry {
            token,
            attempts: 0,
            not_before: None,
        }
    }
}

/// Ordered queue of pending date tokens
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: VecDeque<QueueEntry>,
}

impl RetryQueue {
    pub fn new<I: IntoIterator<Item = DateToken>>(tokens: I) -> Self {
        RetryQueue {
            entries: tokens.into_iter().map(QueueEntry::fresh).collect(),
        }
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, token: &DateToken) -> bool {
        self.entries.iter().any(|e| &e.token == token)
    }

    /// Pending tokens from head to tail
    pub fn tokens(&self) -> impl Iterator<Item = &DateToken> {
        self.entries.iter().map(|e| &e.token)
    }
}

/// Drains a [`RetryQueue`], feeding every token through a processing step
#[derive(Debug, Clone, Default)]
pub struct RetryQueueManager {
    policy: RetryPolicy,
}

impl RetryQueueManager {
    pub fn new(policy: RetryPolicy) -> Self {
        RetryQueueManager { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process every token until the queue is empty
    pub fn run<I, F>(&self, initial: I, mut process_one: F) -> RunReport
    where
        I: IntoIterator<Item = DateToken>,
        F: FnMut(&DateToken) -> TokenOutcome,
    {
        let mut queue = RetryQueue::new(initial);
        let mut report = RunReport::default();

        log::info!("Processing {} dates", queue.len());
        while self.step(&mut queue, &mut report, &mut process_one) {}

        report
    }

    /// Process the token at the head of the queue. Returns false once the
    /// queue is empty.
    pub fn step<F>(
        &self,
        queue: &mut RetryQueue,
        report: &mut RunReport,
        process_one: &mut F,
    ) -> bool
    where
        F: FnMut(&DateToken) -> TokenOutcome,
    {
        let Some(mut entry) = queue.pop() else {
            return false;
        };

        if let Some(not_before) = entry.not_before {
            let now = Instant::now();
            if not_before > now {
                let wait = not_before - now;
                log::debug!("Cooling down {:?} before retrying {}", wait, entry.token);
                std::thread::sleep(wait);
            }
        }

        entry.attempts += 1;
        report.stats.attempts += 1;

        match process_one(&entry.token) {
            TokenOutcome::Done {
                accepted,
                rejections,
            } => {
                log::debug!(
                    "{}: {} accepted, {} rejected",
                    entry.token,
                    accepted.len(),
                    rejections.len()
                );
                report.stats.dates_completed += 1;
                for rejection in &rejections {
                    report.stats.record_rejection(rejection);
                }
                for record in accepted {
                    report.records.insert(record);
                }
            }
            TokenOutcome::Requeue(cause) => self.requeue(queue, report, entry, cause),
        }

        true
    }

    fn requeue(
        &self,
        queue: &mut RetryQueue,
        report: &mut RunReport,
        mut entry: QueueEntry,
        cause: Requeue,
    ) {
        if entry.attempts >= self.policy.max_attempts {
            log::error!(
                "Giving up on {} after {} attempts; last {} failure: {}",
                entry.token,
                entry.attempts,
                cause.kind(),
                cause
            );
            report.abandoned.push(entry.token);
            return;
        }

        let delay = self.policy.backoff(entry.attempts);
        log::info!(
            "Will try {} again later (attempt {} of {}, cool-down {:?}) after {} failure: {}",
            entry.token,
            entry.attempts + 1,
            self.policy.max_attempts,
            delay,
            cause.kind(),
            cause
        );
        entry.not_before = if delay.is_zero() {
            None
        } else {
            Some(Instant::now() + delay)
        };
        report.stats.requeues += 1;
        report.stats.record_requeue(&cause);
        queue.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::Rejection;
    use crate::pipeline::tests::sample_record;
    use std::collections::HashMap;

    fn tokens(names: &[&str]) -> Vec<DateToken> {
        names.iter().map(|n| DateToken::new(*n)).collect()
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            backoff_base_ms: 250,
            backoff_max_ms: 1000,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
    }

    #[test]
    fn test_fifo_order_with_requeue_during_drain() {
        let manager = RetryQueueManager::new(RetryPolicy::immediate(5));
        let mut seen = Vec::new();
        let mut failures_left: HashMap<&str, u32> = HashMap::from([("b", 2)]);

        let report = manager.run(tokens(&["a", "b", "c"]), |token| {
            seen.push(token.to_string());
            match failures_left.get_mut(token.as_str()) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    TokenOutcome::Requeue(Requeue::Transport("timed out".to_string()))
                }
                _ => TokenOutcome::Done {
                    accepted: vec![],
                    rejections: vec![],
                },
            }
        });

        // "b" goes behind "c" the first time and is still visited in this run
        assert_eq!(seen, vec!["a", "b", "c", "b", "b"]);
        assert_eq!(report.stats.dates_completed, 3);
        assert_eq!(report.stats.attempts, 5);
        assert_eq!(report.stats.transport_failures, 2);
        assert!(report.abandoned.is_empty());
    }

    #[test]
    fn test_failing_token_stays_queued_until_cap() {
        let manager = RetryQueueManager::new(RetryPolicy::immediate(3));
        let mut queue = RetryQueue::new(tokens(&["down", "ok"]));
        let mut report = RunReport::default();
        let down = DateToken::new("down");

        let mut process = |token: &DateToken| {
            if token.as_str() == "down" {
                TokenOutcome::Requeue(Requeue::Transport("connection refused".to_string()))
            } else {
                TokenOutcome::Done {
                    accepted: vec![],
                    rejections: vec![],
                }
            }
        };

        // Pass 1: down, ok
        assert!(manager.step(&mut queue, &mut report, &mut process));
        assert!(queue.contains(&down));
        assert!(manager.step(&mut queue, &mut report, &mut process));
        assert_eq!(queue.tokens().collect::<Vec<_>>(), vec![&down]);

        // Pass 2
        assert!(manager.step(&mut queue, &mut report, &mut process));
        assert!(queue.contains(&down));
        assert!(report.abandoned.is_empty());

        // Pass 3 exhausts the attempts
        assert!(manager.step(&mut queue, &mut report, &mut process));
        assert!(queue.is_empty());
        assert_eq!(report.abandoned, vec![down]);
        assert!(!manager.step(&mut queue, &mut report, &mut process));
        assert_eq!(report.stats.requeues, 2);
        // The failure that abandons the token is not a requeue
        assert_eq!(report.stats.transport_failures, 2);
    }

    #[test]
    fn test_outcomes_accumulate() {
        let manager = RetryQueueManager::default();
        let report = manager.run(tokens(&["20141008", "20141009"]), |token| {
            let mut record = sample_record();
            record.date = token.clone();
            TokenOutcome::Done {
                accepted: vec![record.clone(), record],
                rejections: vec![Rejection::Postponed],
            }
        });

        // Same game twice on one page counts once
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.stats.rejected.get("postponed"), Some(&2));
        assert_eq!(report.stats.total_rejected(), 2);
    }

    #[test]
    fn test_cool_down_is_respected() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_base: Duration::from_millis(20),
            backoff_max: Duration::from_millis(20),
        };
        let manager = RetryQueueManager::new(policy);
        let mut tries: Vec<Instant> = Vec::new();

        let report = manager.run(tokens(&["slow"]), |_| {
            tries.push(Instant::now());
            if tries.len() == 1 {
                TokenOutcome::Requeue(Requeue::ParseShape("no odds table".to_string()))
            } else {
                TokenOutcome::Done {
                    accepted: vec![],
                    rejections: vec![],
                }
            }
        });

        assert_eq!(tries.len(), 2);
        assert!(tries[1] - tries[0] >= Duration::from_millis(20));
        assert_eq!(report.stats.parse_shape_failures, 1);
    }
}
