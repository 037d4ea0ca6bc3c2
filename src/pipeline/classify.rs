//! Game validation and favorite/underdog classification
//!
//! Decides, row by row, whether a scraped game becomes a [`GameRecord`],
//! is rejected for good, or shows that the whole page must be fetched again.
//! Checks run in a fixed order and the first one that fires decides.

use super::FailureKind;
use crate::data::extractor::{BookColumn, Field, RawFieldMap, SCHEMA_LEN};
use crate::{Bookmaker, DateToken, GameRecord, LineQuote, RawQuote, Side};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Spread the favorite gives on a standard puck line
pub const FAVORITE_LINE: f64 = -1.5;
/// Spread the underdog receives on a standard puck line
pub const UNDERDOG_LINE: f64 = 1.5;
/// Value shown in a quote cell when the book has no market
pub const PLACEHOLDER: &str = "-";

/// Sign followed by a half-goal spread between 1.5 and 6.5
fn spread_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-][1-6]\.5").expect("spread pattern is valid"))
}

/// Result of classifying one row
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(GameRecord),
    Rejected(Rejection),
    /// The page is not a puck line page; `observed` is the offending value
    RetryRequested { observed: String },
}

/// Why a game was left out; never retried
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Postponed,
    MarketUnavailable,
    MalformedData(String),
    NonStandardLine(f64),
    UnresolvablePush,
    NotYetFinal(String),
}

impl Rejection {
    pub fn kind(&self) -> FailureKind {
        match self {
            Rejection::MalformedData(_) => FailureKind::MalformedData,
            _ => FailureKind::PolicyRejection,
        }
    }

    /// Short stable name used in run statistics
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::Postponed => "postponed",
            Rejection::MarketUnavailable => "market-unavailable",
            Rejection::MalformedData(_) => "malformed-data",
            Rejection::NonStandardLine(_) => "non-standard-line",
            Rejection::UnresolvablePush => "unresolvable-push",
            Rejection::NotYetFinal(_) => "not-yet-final",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Postponed => write!(f, "game postponed"),
            Rejection::MarketUnavailable => write!(f, "puck line not offered"),
            Rejection::MalformedData(detail) => write!(f, "malformed data: {}", detail),
            Rejection::NonStandardLine(line) => write!(f, "non-standard puck line {}", line),
            Rejection::UnresolvablePush => write!(f, "push at the line, no spread winner"),
            Rejection::NotYetFinal(status) => write!(f, "game not final (status {:?})", status),
        }
    }
}

/// Numeric fields pulled out of a row before classification
struct Coerced {
    quote: LineQuote,
    away_score: u32,
    home_score: u32,
}

/// Classifies rows against one reference bookmaker's puck line
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    reference_book: Bookmaker,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Bookmaker::Westgate)
    }
}

impl Classifier {
    pub fn new(reference_book: Bookmaker) -> Self {
        Classifier { reference_book }
    }

    pub fn reference_book(&self) -> Bookmaker {
        self.reference_book
    }

    fn book_field(&self, column: BookColumn) -> Field {
        Field::Book(self.reference_book, column)
    }

    /// Classify one row scraped from the page for `date`
    pub fn classify(&self, raw: &RawFieldMap, date: &DateToken) -> Outcome {
        if is_postponed(raw) {
            return Outcome::Rejected(Rejection::Postponed);
        }

        // The reference book's home line tells a puck line page apart from
        // the moneyline/total page the source sometimes serves instead
        let home_line_field = self.book_field(BookColumn::HomeLine);
        let Some(home_line) = raw.get(home_line_field) else {
            return Outcome::Rejected(Rejection::MalformedData(format!(
                "row has {} of {} fields, no {}",
                raw.len(),
                SCHEMA_LEN,
                home_line_field.name()
            )));
        };
        if !spread_pattern().is_match(home_line) {
            if home_line == PLACEHOLDER {
                return Outcome::Rejected(Rejection::MarketUnavailable);
            }
            return Outcome::RetryRequested {
                observed: home_line.to_string(),
            };
        }

        let coerced = match self.coerce(raw) {
            Ok(c) => c,
            Err(detail) => return Outcome::Rejected(Rejection::MalformedData(detail)),
        };

        let favorite = if coerced.quote.home_line == FAVORITE_LINE {
            Side::Home
        } else if coerced.quote.home_line == UNDERDOG_LINE {
            Side::Away
        } else {
            return Outcome::Rejected(Rejection::NonStandardLine(coerced.quote.home_line));
        };
        let underdog = favorite.opposite();

        let (favorite_score, underdog_score) = match favorite {
            Side::Home => (coerced.home_score, coerced.away_score),
            Side::Away => (coerced.away_score, coerced.home_score),
        };
        let margin = (f64::from(favorite_score) + FAVORITE_LINE) - f64::from(underdog_score);
        let Some(spread_winner) = settle(favorite, margin) else {
            return Outcome::Rejected(Rejection::UnresolvablePush);
        };

        let status = text(raw, Field::Status);
        if !status.eq_ignore_ascii_case("final") {
            return Outcome::Rejected(Rejection::NotYetFinal(status));
        }

        Outcome::Accepted(GameRecord {
            date: date.clone(),
            rot_away: text(raw, Field::RotAway),
            rot_home: text(raw, Field::RotHome),
            away_team: text(raw, Field::AwayTeam),
            home_team: text(raw, Field::HomeTeam),
            time: text(raw, Field::Time),
            away_score: coerced.away_score,
            home_score: coerced.home_score,
            status,
            reference_book: self.reference_book,
            reference: coerced.quote,
            total_score: coerced.away_score + coerced.home_score,
            favorite,
            underdog,
            spread_winner,
            favorite_covered: spread_winner == favorite,
            underdog_covered: spread_winner == underdog,
            pinnacle: raw_quote(raw, Bookmaker::Pinnacle),
            sia: raw_quote(raw, Bookmaker::Sia),
        })
    }

    fn coerce(&self, raw: &RawFieldMap) -> Result<Coerced, String> {
        if !raw.is_complete() {
            return Err(format!(
                "expected {} fields, found {}",
                SCHEMA_LEN,
                raw.len()
            ));
        }

        Ok(Coerced {
            quote: LineQuote {
                away_line: parse_field(raw, self.book_field(BookColumn::AwayLine))?,
                away_price: parse_field(raw, self.book_field(BookColumn::AwayPrice))?,
                home_line: parse_field(raw, self.book_field(BookColumn::HomeLine))?,
                home_price: parse_field(raw, self.book_field(BookColumn::HomePrice))?,
            },
            away_score: parse_field(raw, Field::AwayScore)?,
            home_score: parse_field(raw, Field::HomeScore)?,
        })
    }
}

/// Side that wins against the spread given the favorite's adjusted margin;
/// `None` on a push
pub fn settle(favorite: Side, margin: f64) -> Option<Side> {
    if margin > 0.0 {
        Some(favorite)
    } else if margin < 0.0 {
        Some(favorite.opposite())
    } else {
        None
    }
}

/// The source marks postponed games in the time column; the status column
/// may carry it too
fn is_postponed(raw: &RawFieldMap) -> bool {
    [Field::Time, Field::Status].into_iter().any(|field| {
        raw.get(field)
            .map(|v| v.eq_ignore_ascii_case("pp") || v.eq_ignore_ascii_case("postponed"))
            .unwrap_or(false)
    })
}

fn text(raw: &RawFieldMap, field: Field) -> String {
    raw.get(field).unwrap_or_default().to_string()
}

fn parse_field<T: std::str::FromStr>(raw: &RawFieldMap, field: Field) -> Result<T, String> {
    let value = raw.get(field).unwrap_or_default();
    value
        .parse()
        .map_err(|_| format!("{} is not numeric: {:?}", field.name(), value))
}

fn raw_quote(raw: &RawFieldMap, book: Bookmaker) -> RawQuote {
    RawQuote {
        away_line: text(raw, Field::Book(book, BookColumn::AwayLine)),
        away_price: text(raw, Field::Book(book, BookColumn::AwayPrice)),
        home_line: text(raw, Field::Book(book, BookColumn::HomeLine)),
        home_price: text(raw, Field::Book(book, BookColumn::HomePrice)),
    }
}
