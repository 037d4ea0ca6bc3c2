//! SQLite storage for accepted puck line games

use crate::{Bookmaker, DateToken, GameRecord, LineQuote, RawQuote, Result, Side};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

const GAME_COLUMNS: &str = "date, rot_away, rot_home, away_team, home_team, time,
    away_score, home_score, status, reference_book,
    away_line, away_price, home_line, home_price,
    total_score, favorite, underdog, spread_winner, favorite_covered, underdog_covered,
    pinnacle_away_line, pinnacle_away_price, pinnacle_home_line, pinnacle_home_price,
    sia_away_line, sia_away_price, sia_home_line, sia_home_price";

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                rot_away TEXT NOT NULL,
                rot_home TEXT NOT NULL,
                away_team TEXT NOT NULL,
                home_team TEXT NOT NULL,
                time TEXT NOT NULL,
                away_score INTEGER NOT NULL,
                home_score INTEGER NOT NULL,
                status TEXT NOT NULL,
                reference_book TEXT NOT NULL,
                away_line REAL NOT NULL,
                away_price INTEGER NOT NULL,
                home_line REAL NOT NULL,
                home_price INTEGER NOT NULL,
                total_score INTEGER NOT NULL,
                favorite TEXT NOT NULL,
                underdog TEXT NOT NULL,
                spread_winner TEXT NOT NULL,
                favorite_covered INTEGER NOT NULL,
                underdog_covered INTEGER NOT NULL,
                pinnacle_away_line TEXT NOT NULL DEFAULT '',
                pinnacle_away_price TEXT NOT NULL DEFAULT '',
                pinnacle_home_line TEXT NOT NULL DEFAULT '',
                pinnacle_home_price TEXT NOT NULL DEFAULT '',
                sia_away_line TEXT NOT NULL DEFAULT '',
                sia_away_price TEXT NOT NULL DEFAULT '',
                sia_home_line TEXT NOT NULL DEFAULT '',
                sia_home_price TEXT NOT NULL DEFAULT '',
                UNIQUE(date, rot_away, rot_home)
            );

            CREATE INDEX IF NOT EXISTS idx_games_date ON games(date);
            "#,
        )?;
        Ok(())
    }

    /// Insert or update one game, keyed by date and rotation numbers
    pub fn upsert_game(&self, record: &GameRecord) -> Result<()> {
        upsert(&self.conn, record)
    }

    /// Insert or update many games in one transaction
    pub fn upsert_games(&mut self, records: &[GameRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for record in records {
            upsert(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// All stored games, ordered by date then rotation number
    pub fn get_all_games(&self) -> Result<Vec<GameRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM games ORDER BY date, rot_away, rot_home",
            GAME_COLUMNS
        ))?;
        let games = stmt
            .query_map([], Self::row_to_game)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(games)
    }

    /// Games played on one date
    pub fn get_games_on(&self, date: &DateToken) -> Result<Vec<GameRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM games WHERE date = ?1 ORDER BY rot_away, rot_home",
            GAME_COLUMNS
        ))?;
        let games = stmt
            .query_map(params![date.as_str()], Self::row_to_game)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(games)
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<GameRecord> {
        let date: String = row.get(0)?;
        let book: String = row.get(9)?;
        let reference_book = Bookmaker::from_name(&book).ok_or_else(|| bad_text(9, &book))?;

        Ok(GameRecord {
            date: DateToken::new(date),
            rot_away: row.get(1)?,
            rot_home: row.get(2)?,
            away_team: row.get(3)?,
            home_team: row.get(4)?,
            time: row.get(5)?,
            away_score: row.get(6)?,
            home_score: row.get(7)?,
            status: row.get(8)?,
            reference_book,
            reference: LineQuote {
                away_line: row.get(10)?,
                away_price: row.get(11)?,
                home_line: row.get(12)?,
                home_price: row.get(13)?,
            },
            total_score: row.get(14)?,
            favorite: side_at(row, 15)?,
            underdog: side_at(row, 16)?,
            spread_winner: side_at(row, 17)?,
            favorite_covered: row.get(18)?,
            underdog_covered: row.get(19)?,
            pinnacle: quote_at(row, 20)?,
            sia: quote_at(row, 24)?,
        })
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let game_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;

        let favorites_covered: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM games WHERE favorite_covered = 1",
            [],
            |row| row.get(0),
        )?;

        let min_date: Option<String> = self
            .conn
            .query_row("SELECT MIN(date) FROM games", [], |row| row.get(0))
            .optional()?
            .flatten();

        let max_date: Option<String> = self
            .conn
            .query_row("SELECT MAX(date) FROM games", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            game_count: game_count as usize,
            favorites_covered: favorites_covered as usize,
            earliest_game: min_date.and_then(|s| DateToken::new(s).to_date()),
            latest_game: max_date.and_then(|s| DateToken::new(s).to_date()),
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub game_count: usize,
    pub favorites_covered: usize,
    pub earliest_game: Option<NaiveDate>,
    pub latest_game: Option<NaiveDate>,
}

fn upsert(conn: &Connection, record: &GameRecord) -> Result<()> {
    conn.execute(
        &format!(
            r#"
            INSERT INTO games ({})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)
            ON CONFLICT(date, rot_away, rot_home) DO UPDATE SET
                away_team = excluded.away_team,
                home_team = excluded.home_team,
                time = excluded.time,
                away_score = excluded.away_score,
                home_score = excluded.home_score,
                status = excluded.status,
                reference_book = excluded.reference_book,
                away_line = excluded.away_line,
                away_price = excluded.away_price,
                home_line = excluded.home_line,
                home_price = excluded.home_price,
                total_score = excluded.total_score,
                favorite = excluded.favorite,
                underdog = excluded.underdog,
                spread_winner = excluded.spread_winner,
                favorite_covered = excluded.favorite_covered,
                underdog_covered = excluded.underdog_covered,
                pinnacle_away_line = excluded.pinnacle_away_line,
                pinnacle_away_price = excluded.pinnacle_away_price,
                pinnacle_home_line = excluded.pinnacle_home_line,
                pinnacle_home_price = excluded.pinnacle_home_price,
                sia_away_line = excluded.sia_away_line,
                sia_away_price = excluded.sia_away_price,
                sia_home_line = excluded.sia_home_line,
                sia_home_price = excluded.sia_home_price
            "#,
            GAME_COLUMNS
        ),
        params![
            record.date.as_str(),
            record.rot_away,
            record.rot_home,
            record.away_team,
            record.home_team,
            record.time,
            record.away_score,
            record.home_score,
            record.status,
            record.reference_book.name(),
            record.reference.away_line,
            record.reference.away_price,
            record.reference.home_line,
            record.reference.home_price,
            record.total_score,
            record.favorite.label(),
            record.underdog.label(),
            record.spread_winner.label(),
            record.favorite_covered,
            record.underdog_covered,
            record.pinnacle.away_line,
            record.pinnacle.away_price,
            record.pinnacle.home_line,
            record.pinnacle.home_price,
            record.sia.away_line,
            record.sia.away_price,
            record.sia.home_line,
            record.sia.home_price,
        ],
    )?;
    Ok(())
}

fn bad_text(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value {:?}", value).into(),
    )
}

fn side_at(row: &rusqlite::Row, column: usize) -> rusqlite::Result<Side> {
    let value: String = row.get(column)?;
    match value.as_str() {
        "home" => Ok(Side::Home),
        "away" => Ok(Side::Away),
        _ => Err(bad_text(column, &value)),
    }
}

fn quote_at(row: &rusqlite::Row, first: usize) -> rusqlite::Result<RawQuote> {
    Ok(RawQuote {
        away_line: row.get(first)?,
        away_price: row.get(first + 1)?,
        home_line: row.get(first + 2)?,
        home_price: row.get(first + 3)?,
    })
}
