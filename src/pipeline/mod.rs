//! Fetch, extract, classify and retry
//!
//! [`Pipeline::process_one`] turns one date into accepted games or a request
//! to try the date again; [`queue::RetryQueueManager`] drives it over the
//! whole calendar.

pub mod classify;
pub mod queue;

pub use classify::{Classifier, Outcome, Rejection};
pub use queue::{RetryPolicy, RetryQueue, RetryQueueManager};

use crate::data::extractor::extract;
use crate::data::fetcher::PageFetcher;
use crate::{DateToken, GameKey, GameRecord};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The four ways a date or row can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection failure, non-2xx response
    Transport,
    /// Missing odds table or a page of the wrong type
    ParseShape,
    /// A value that should be numeric is not
    MalformedData,
    /// The game is outside what the output covers
    PolicyRejection,
}

impl FailureKind {
    /// Transient failures are retried by requeueing the date
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Transport | FailureKind::ParseShape)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::ParseShape => write!(f, "parse-shape"),
            FailureKind::MalformedData => write!(f, "malformed-data"),
            FailureKind::PolicyRejection => write!(f, "policy-rejection"),
        }
    }
}

/// Why a date goes back on the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    Transport(String),
    ParseShape(String),
    /// A row showed a non-puck-line value where the reference line belongs
    WrongPage { observed: String },
}

impl Requeue {
    pub fn kind(&self) -> FailureKind {
        match self {
            Requeue::Transport(_) => FailureKind::Transport,
            Requeue::ParseShape(_) | Requeue::WrongPage { .. } => FailureKind::ParseShape,
        }
    }
}

impl fmt::Display for Requeue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requeue::Transport(message) => write!(f, "transport failure: {}", message),
            Requeue::ParseShape(message) => write!(f, "unexpected page: {}", message),
            Requeue::WrongPage { observed } => {
                write!(f, "not a puck line page (reference line {:?})", observed)
            }
        }
    }
}

/// What processing one date produced
#[derive(Debug, Clone, PartialEq)]
pub enum TokenOutcome {
    Done {
        accepted: Vec<GameRecord>,
        rejections: Vec<Rejection>,
    },
    Requeue(Requeue),
}

/// Accepted games, at most one per listed game
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: HashMap<GameKey, GameRecord>,
}

impl RecordSet {
    /// Returns false when the game was already present; the newer copy wins
    pub fn insert(&mut self, record: GameRecord) -> bool {
        self.records.insert(record.key(), record).is_none()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &GameKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameRecord> {
        self.records.values()
    }

    /// Records ordered by date then rotation number, for stable output
    pub fn into_sorted_vec(self) -> Vec<GameRecord> {
        let mut records: Vec<_> = self.records.into_values().collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Processing attempts, retries included
    pub attempts: usize,
    pub dates_completed: usize,
    pub requeues: usize,
    /// Requeues by cause; a failure that abandons its date is not counted
    pub transport_failures: usize,
    pub parse_shape_failures: usize,
    pub wrong_page_retries: usize,
    pub rejected: BTreeMap<&'static str, usize>,
}

impl RunStats {
    pub fn record_rejection(&mut self, rejection: &Rejection) {
        *self.rejected.entry(rejection.label()).or_default() += 1;
    }

    pub fn record_requeue(&mut self, cause: &Requeue) {
        match cause {
            Requeue::Transport(_) => self.transport_failures += 1,
            Requeue::ParseShape(_) => self.parse_shape_failures += 1,
            Requeue::WrongPage { .. } => self.wrong_page_retries += 1,
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub records: RecordSet,
    pub stats: RunStats,
    /// Dates that kept failing until the retry policy gave up on them
    pub abandoned: Vec<DateToken>,
}

/// Fetch → extract → classify for single dates
pub struct Pipeline<F: PageFetcher> {
    fetcher: F,
    classifier: Classifier,
    manager: RetryQueueManager,
}

impl<F: PageFetcher> Pipeline<F> {
    pub fn new(fetcher: F, classifier: Classifier, policy: RetryPolicy) -> Self {
        Pipeline {
            fetcher,
            classifier,
            manager: RetryQueueManager::new(policy),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run every date through the pipeline, retrying as the policy allows
    pub fn run<I>(&self, tokens: I) -> RunReport
    where
        I: IntoIterator<Item = DateToken>,
    {
        self.manager.run(tokens, |token| self.process_one(token))
    }

    /// Process one date. A page judged wrong discards everything taken from
    /// it, including rows accepted before the bad one.
    pub fn process_one(&self, token: &DateToken) -> TokenOutcome {
        let document = match self.fetcher.fetch(token) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("{}: fetch failed, will retry: {}", token, e);
                return TokenOutcome::Requeue(Requeue::Transport(e.to_string()));
            }
        };

        let rows = match extract(&document) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!(
                    "{}: {}; source likely served a malformed page, will retry",
                    token,
                    e
                );
                self.fetcher.invalidate(token);
                return TokenOutcome::Requeue(Requeue::ParseShape(e.to_string()));
            }
        };

        let mut accepted = Vec::new();
        let mut rejections = Vec::new();

        for raw in &rows {
            match self.classifier.classify(raw, token) {
                Outcome::Accepted(record) => accepted.push(record),
                Outcome::Rejected(rejection) => {
                    let level = match (rejection.kind(), &rejection) {
                        (FailureKind::MalformedData, _) => log::Level::Warn,
                        (_, Rejection::NotYetFinal(_)) => log::Level::Debug,
                        _ => log::Level::Info,
                    };
                    log::log!(
                        level,
                        "{}: discarding game, {}; data scraped was: {}",
                        token,
                        rejection,
                        raw.snapshot()
                    );
                    rejections.push(rejection);
                }
                Outcome::RetryRequested { observed } => {
                    log::warn!(
                        "{}: data scraped appears not to be puck lines, will retry; data scraped was: {}",
                        token,
                        raw.snapshot()
                    );
                    self.fetcher.invalidate(token);
                    return TokenOutcome::Requeue(Requeue::WrongPage { observed });
                }
            }
        }

        TokenOutcome::Done {
            accepted,
            rejections,
        }
    }
}
