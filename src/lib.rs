//! NHL puck line scraper
//!
//! Fetches archived puck line pages one date at a time, extracts the odds
//! table, validates each game against the two-outcome ±1.5 market and
//! retries dates whose page came back malformed or of the wrong type.

pub mod data;
pub mod pipeline;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Calendar-day key used to address one upstream page (`YYYYMMDD`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateToken(String);

impl DateToken {
    pub fn new(token: impl Into<String>) -> Self {
        DateToken(token.into())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        DateToken(date.format("%Y%m%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the token as a calendar date, if it is one
    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y%m%d").ok()
    }
}

impl fmt::Display for DateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Home or away side of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bookmakers listed in the odds table, in column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bookmaker {
    Westgate,
    Mirage,
    Station,
    Pinnacle,
    Sia,
}

impl Bookmaker {
    pub const ALL: [Bookmaker; 5] = [
        Bookmaker::Westgate,
        Bookmaker::Mirage,
        Bookmaker::Station,
        Bookmaker::Pinnacle,
        Bookmaker::Sia,
    ];

    /// Column prefix used in the field schema and output header
    pub fn name(&self) -> &'static str {
        match self {
            Bookmaker::Westgate => "Westgate",
            Bookmaker::Mirage => "Mirage",
            Bookmaker::Station => "Station",
            Bookmaker::Pinnacle => "Pinnacle",
            Bookmaker::Sia => "SIA",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Bookmaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference bookmaker's coerced puck line quote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineQuote {
    pub away_line: f64,
    pub away_price: i32,
    pub home_line: f64,
    pub home_price: i32,
}

/// A secondary bookmaker's quote, kept exactly as scraped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuote {
    pub away_line: String,
    pub away_price: String,
    pub home_line: String,
    pub home_price: String,
}

/// A validated final game on a standard ±1.5 puck line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub date: DateToken,
    pub rot_away: String,
    pub rot_home: String,
    pub away_team: String,
    pub home_team: String,
    pub time: String,
    pub away_score: u32,
    pub home_score: u32,
    pub status: String,
    pub reference_book: Bookmaker,
    pub reference: LineQuote,
    pub total_score: u32,
    pub favorite: Side,
    pub underdog: Side,
    pub spread_winner: Side,
    pub favorite_covered: bool,
    pub underdog_covered: bool,
    pub pinnacle: RawQuote,
    pub sia: RawQuote,
}

impl GameRecord {
    /// Identity of a game within the accepted set
    pub fn key(&self) -> GameKey {
        GameKey {
            date: self.date.clone(),
            rot_away: self.rot_away.clone(),
            rot_home: self.rot_home.clone(),
        }
    }

    pub fn score_for(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }

    /// Verbatim quote of a secondary bookmaker carried in the output
    pub fn secondary_quote(&self, book: Bookmaker) -> Option<&RawQuote> {
        match book {
            Bookmaker::Pinnacle => Some(&self.pinnacle),
            Bookmaker::Sia => Some(&self.sia),
            _ => None,
        }
    }

    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }
}

/// (date, away rotation, home rotation) uniquely names a listed game
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameKey {
    pub date: DateToken,
    pub rot_away: String,
    pub rot_home: String,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum PucklineError {
    #[error("Transport failure for {token}: {message}")]
    Transport { token: DateToken, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PucklineError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub retry: RetryConfig,
    pub classify: ClassifyConfig,
    pub output: OutputConfig,
    pub seasons: Vec<SeasonRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    pub reference_book: Bookmaker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub database_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use csv or json.", s)),
        }
    }
}

/// Inclusive range of dates covering one season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source: SourceConfig {
                base_url: "http://www.donbest.com/nhl/odds/puck-lines/".to_string(),
                user_agent: "puckline/0.1".to_string(),
                timeout_secs: 30,
                cache_dir: None,
                offline: false,
            },
            retry: RetryConfig {
                max_attempts: 10,
                backoff_base_ms: 500,
                backoff_max_ms: 30_000,
            },
            classify: ClassifyConfig {
                reference_book: Bookmaker::Westgate,
            },
            output: OutputConfig {
                path: "pucklines.csv".to_string(),
                format: OutputFormat::Csv,
                database_path: None,
            },
            // No puck line data is archived before the 2013-2014 season
            seasons: vec![
                SeasonRange {
                    start: NaiveDate::from_ymd_opt(2013, 10, 1).expect("valid date"),
                    end: NaiveDate::from_ymd_opt(2014, 4, 13).expect("valid date"),
                },
                SeasonRange {
                    start: NaiveDate::from_ymd_opt(2014, 10, 8).expect("valid date"),
                    end: NaiveDate::from_ymd_opt(2015, 4, 11).expect("valid date"),
                },
            ],
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PucklineError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PucklineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PucklineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(PucklineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        for season in &self.seasons {
            if season.end < season.start {
                return Err(PucklineError::Config(format!(
                    "season ends ({}) before it starts ({})",
                    season.end, season.start
                )));
            }
        }
        Ok(())
    }
}
