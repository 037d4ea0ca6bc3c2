//! Odds table extraction
//!
//! Turns a puck line page into one positional field map per listed game.
//! The page carries no per-cell field attributes, so values are matched to
//! the schema by position; the classifier asserts the count.

use crate::Bookmaker;
use scraper::{Html, Selector};
use std::borrow::Cow;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Container holding the odds table
const ODDS_CONTAINER: &str = "div#oddsHolder";
/// Marker class shared by every game row
const ROW_SELECTOR: &str = "tr[class*='statistics_table_']";

/// One of the four quote columns each bookmaker fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookColumn {
    AwayLine,
    AwayPrice,
    HomeLine,
    HomePrice,
}

impl BookColumn {
    pub const ALL: [BookColumn; 4] = [
        BookColumn::AwayLine,
        BookColumn::AwayPrice,
        BookColumn::HomeLine,
        BookColumn::HomePrice,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            BookColumn::AwayLine => "away_line",
            BookColumn::AwayPrice => "away_price",
            BookColumn::HomeLine => "home_line",
            BookColumn::HomePrice => "home_price",
        }
    }
}

/// A named position in an odds table row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RotAway,
    RotHome,
    OpeningAwayLine,
    OpeningAwayPrice,
    OpeningHomeLine,
    OpeningHomePrice,
    AwayTeam,
    HomeTeam,
    Time,
    AwayScore,
    HomeScore,
    LiveStatus,
    Status,
    Book(Bookmaker, BookColumn),
}

const LEADING_FIELDS: [Field; 13] = [
    Field::RotAway,
    Field::RotHome,
    Field::OpeningAwayLine,
    Field::OpeningAwayPrice,
    Field::OpeningHomeLine,
    Field::OpeningHomePrice,
    Field::AwayTeam,
    Field::HomeTeam,
    Field::Time,
    Field::AwayScore,
    Field::HomeScore,
    Field::LiveStatus,
    Field::Status,
];

/// Number of values a complete row carries
pub const SCHEMA_LEN: usize = LEADING_FIELDS.len() + Bookmaker::ALL.len() * BookColumn::ALL.len();

impl Field {
    /// All fields in column order
    pub fn schema() -> impl Iterator<Item = Field> {
        LEADING_FIELDS.into_iter().chain(
            Bookmaker::ALL
                .into_iter()
                .flat_map(|b| BookColumn::ALL.into_iter().map(move |c| Field::Book(b, c))),
        )
    }

    /// Position of this field within a row
    pub fn index(self) -> usize {
        match self {
            Field::Book(book, column) => {
                let book_pos = Bookmaker::ALL
                    .iter()
                    .position(|b| *b == book)
                    .unwrap_or_default();
                let column_pos = BookColumn::ALL
                    .iter()
                    .position(|c| *c == column)
                    .unwrap_or_default();
                LEADING_FIELDS.len() + book_pos * BookColumn::ALL.len() + column_pos
            }
            leading => LEADING_FIELDS
                .iter()
                .position(|f| *f == leading)
                .unwrap_or_default(),
        }
    }

    pub fn name(self) -> Cow<'static, str> {
        match self {
            Field::RotAway => "rot_away".into(),
            Field::RotHome => "rot_home".into(),
            Field::OpeningAwayLine => "opening_away_line".into(),
            Field::OpeningAwayPrice => "opening_away_price".into(),
            Field::OpeningHomeLine => "opening_home_line".into(),
            Field::OpeningHomePrice => "opening_home_price".into(),
            Field::AwayTeam => "away_team".into(),
            Field::HomeTeam => "home_team".into(),
            Field::Time => "time".into(),
            Field::AwayScore => "away_score".into(),
            Field::HomeScore => "home_score".into(),
            Field::LiveStatus => "live_status".into(),
            Field::Status => "status".into(),
            Field::Book(book, column) => format!("{}_{}", book.name(), column.suffix()).into(),
        }
    }
}

/// Values scraped from one table row, addressed by schema field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFieldMap {
    values: Vec<String>,
}

impl RawFieldMap {
    pub fn new(values: Vec<String>) -> Self {
        RawFieldMap { values }
    }

    /// Value at a field's position, if the row reached that far
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(field.index()).map(String::as_str)
    }

    /// Replace one field's value, padding a short row with empty values
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        let index = field.index();
        if self.values.len() <= index {
            self.values.resize(index + 1, String::new());
        }
        self.values[index] = value.into();
        self
    }

    /// Number of values scraped, which may differ from the schema length
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.values.len() == SCHEMA_LEN
    }

    /// `name=value` listing for diagnostics; surplus values are listed by position
    pub fn snapshot(&self) -> String {
        let mut parts: Vec<String> = Field::schema()
            .zip(&self.values)
            .map(|(field, value)| format!("{}={:?}", field.name(), value))
            .collect();
        parts.extend(
            self.values
                .iter()
                .enumerate()
                .skip(SCHEMA_LEN)
                .map(|(i, value)| format!("#{}={:?}", i, value)),
        );
        format!("{{{}}}", parts.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("odds container `{0}` not found")]
    MissingContainer(&'static str),

    #[error("odds table not found inside `{0}`")]
    MissingTable(&'static str),

    #[error("invalid selector `{selector}`: {message}")]
    Selector {
        selector: &'static str,
        message: String,
    },
}

fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css,
        message: e.to_string(),
    })
}

/// Extract one field map per game row of the odds table
pub fn extract(document: &Html) -> Result<Vec<RawFieldMap>, ExtractError> {
    let container_sel = selector(ODDS_CONTAINER)?;
    let table_sel = selector("table")?;
    let row_sel = selector(ROW_SELECTOR)?;
    let cell_sel = selector("td")?;

    let container = document
        .select(&container_sel)
        .next()
        .ok_or(ExtractError::MissingContainer(ODDS_CONTAINER))?;
    let table = container
        .select(&table_sel)
        .next()
        .ok_or(ExtractError::MissingTable(ODDS_CONTAINER))?;

    let mut rows = Vec::new();
    for row in table.select(&row_sel) {
        let mut values = Vec::new();
        for cell in row.select(&cell_sel) {
            for node in cell.text() {
                push_cell_text(&mut values, node);
            }
        }
        rows.push(RawFieldMap::new(values));
    }

    log::debug!("Extracted {} rows from odds table", rows.len());
    Ok(rows)
}

/// A line break inside one text node separates the spread from its price
fn push_cell_text(values: &mut Vec<String>, node: &str) {
    let normalized: String = node.nfkc().collect();
    let text = normalized.trim();
    if text.is_empty() {
        return;
    }

    match text.split_once('\n') {
        Some((spread, price)) => {
            values.push(spread.trim().to_string());
            values.push(price.trim().to_string());
        }
        None => values.push(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><body><div id="oddsHolder"><table>
            <tr class="header"><td>Rot</td><td>Team</td></tr>
            {}
            </table></div></body></html>"#,
            rows
        ))
    }

    #[test]
    fn test_schema_layout() {
        assert_eq!(SCHEMA_LEN, 33);
        assert_eq!(Field::schema().count(), SCHEMA_LEN);
        for (i, field) in Field::schema().enumerate() {
            assert_eq!(field.index(), i, "{}", field.name());
        }
        assert_eq!(Field::Status.index(), 12);
        assert_eq!(
            Field::Book(Bookmaker::Westgate, BookColumn::HomeLine).name(),
            "Westgate_home_line"
        );
        assert_eq!(
            Field::Book(Bookmaker::Sia, BookColumn::HomePrice).index(),
            32
        );
    }

    #[test]
    fn test_spread_and_price_split() {
        let document = page(
            "<tr class=\"statistics_table_odd\">\
             <td>51</td><td>52</td><td>+1.5\n-210</td><td>Boston</td>\
             </tr>",
        );
        let rows = extract(&document).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.len(), 5);
        assert_eq!(row.get(Field::RotAway), Some("51"));
        assert_eq!(row.get(Field::RotHome), Some("52"));
        assert_eq!(row.get(Field::OpeningAwayLine), Some("+1.5"));
        assert_eq!(row.get(Field::OpeningAwayPrice), Some("-210"));
        assert_eq!(row.get(Field::OpeningHomeLine), Some("Boston"));
        assert_eq!(row.get(Field::Status), None);
    }

    #[test]
    fn test_only_statistics_rows_are_read() {
        let document = page(
            "<tr class=\"statistics_table_odd\"><td>1</td></tr>\
             <tr class=\"spacer\"><td>ignored</td></tr>\
             <tr class=\"statistics_table_even\"><td>2</td></tr>",
        );
        let rows = extract(&document).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(Field::RotAway), Some("2"));
    }

    #[test]
    fn test_text_is_normalized() {
        // No-break space and full-width digits fold to their plain forms
        let document = page(
            "<tr class=\"statistics_table_odd\">\
             <td>\u{ff15}\u{ff11}</td><td>N.Y.\u{a0}Rangers</td><td>  </td><td><b>FINAL</b></td>\
             </tr>",
        );
        let rows = extract(&document).unwrap();
        assert_eq!(rows[0].get(Field::RotAway), Some("51"));
        assert_eq!(rows[0].get(Field::RotHome), Some("N.Y. Rangers"));
        assert_eq!(rows[0].get(Field::OpeningAwayLine), Some("FINAL"));
    }

    #[test]
    fn test_missing_container() {
        let document = Html::parse_document("<html><body><p>Service busy</p></body></html>");
        assert!(matches!(
            extract(&document),
            Err(ExtractError::MissingContainer(_))
        ));

        let document =
            Html::parse_document(r#"<html><body><div id="oddsHolder"></div></body></html>"#);
        assert!(matches!(
            extract(&document),
            Err(ExtractError::MissingTable(_))
        ));
    }

    #[test]
    fn test_snapshot_lists_surplus_values() {
        let mut values: Vec<String> = (0..SCHEMA_LEN + 1).map(|i| i.to_string()).collect();
        values[0] = "51".to_string();
        let snapshot = RawFieldMap::new(values).snapshot();
        assert!(snapshot.starts_with("{rot_away=\"51\""));
        assert!(snapshot.contains("SIA_home_price=\"32\""));
        assert!(snapshot.contains("#33=\"33\""));
    }
}
