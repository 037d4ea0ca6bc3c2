//! Output sinks for accepted games

use crate::{Bookmaker, GameRecord, OutputFormat, RawQuote, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One output column; reference-book columns take the book's name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Date,
    RotAway,
    RotHome,
    AwayTeam,
    HomeTeam,
    Time,
    AwayScore,
    HomeScore,
    Status,
    ReferenceAwayLine,
    ReferenceAwayPrice,
    ReferenceHomeLine,
    ReferenceHomePrice,
    TotalScore,
    Favorite,
    Underdog,
    SpreadWinner,
    FavoriteCovered,
    UnderdogCovered,
    Secondary(Bookmaker, QuotePart),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotePart {
    AwayLine,
    AwayPrice,
    HomeLine,
    HomePrice,
}

impl QuotePart {
    fn suffix(&self) -> &'static str {
        match self {
            QuotePart::AwayLine => "away_line",
            QuotePart::AwayPrice => "away_price",
            QuotePart::HomeLine => "home_line",
            QuotePart::HomePrice => "home_price",
        }
    }

    fn pick<'a>(&self, quote: &'a RawQuote) -> &'a str {
        match self {
            QuotePart::AwayLine => &quote.away_line,
            QuotePart::AwayPrice => &quote.away_price,
            QuotePart::HomeLine => &quote.home_line,
            QuotePart::HomePrice => &quote.home_price,
        }
    }
}

/// Columns every output file starts with, reference quote included
const LEADING_COLUMNS: [Column; 19] = [
    Column::Date,
    Column::RotAway,
    Column::RotHome,
    Column::AwayTeam,
    Column::HomeTeam,
    Column::Time,
    Column::AwayScore,
    Column::HomeScore,
    Column::Status,
    Column::ReferenceAwayLine,
    Column::ReferenceAwayPrice,
    Column::ReferenceHomeLine,
    Column::ReferenceHomePrice,
    Column::TotalScore,
    Column::Favorite,
    Column::Underdog,
    Column::SpreadWinner,
    Column::FavoriteCovered,
    Column::UnderdogCovered,
];

/// Books whose quotes follow the reference quote verbatim
const SECONDARY_BOOKS: [Bookmaker; 2] = [Bookmaker::Pinnacle, Bookmaker::Sia];

const QUOTE_PARTS: [QuotePart; 4] = [
    QuotePart::AwayLine,
    QuotePart::AwayPrice,
    QuotePart::HomeLine,
    QuotePart::HomePrice,
];

/// Column order of the puck line output file. A secondary book that is also
/// the reference book is already covered by the reference columns.
pub fn output_schema(reference_book: Bookmaker) -> Vec<Column> {
    LEADING_COLUMNS
        .into_iter()
        .chain(
            SECONDARY_BOOKS
                .into_iter()
                .filter(move |book| *book != reference_book)
                .flat_map(|book| {
                    QUOTE_PARTS
                        .into_iter()
                        .map(move |part| Column::Secondary(book, part))
                }),
        )
        .collect()
}

impl Column {
    pub fn header(&self, reference_book: Bookmaker) -> String {
        let fixed = match self {
            Column::Date => "date",
            Column::RotAway => "rot_away",
            Column::RotHome => "rot_home",
            Column::AwayTeam => "away_team",
            Column::HomeTeam => "home_team",
            Column::Time => "time",
            Column::AwayScore => "away_score",
            Column::HomeScore => "home_score",
            Column::Status => "status",
            Column::TotalScore => "total_score",
            Column::Favorite => "fav",
            Column::Underdog => "dog",
            Column::SpreadWinner => "spread_winner",
            Column::FavoriteCovered => "fav_winner",
            Column::UnderdogCovered => "dog_winner",
            Column::ReferenceAwayLine => return format!("{}_away_line", reference_book.name()),
            Column::ReferenceAwayPrice => return format!("{}_away_price", reference_book.name()),
            Column::ReferenceHomeLine => return format!("{}_home_line", reference_book.name()),
            Column::ReferenceHomePrice => return format!("{}_home_price", reference_book.name()),
            Column::Secondary(book, part) => return format!("{}_{}", book.name(), part.suffix()),
        };
        fixed.to_string()
    }

    pub fn value(&self, record: &GameRecord) -> String {
        match self {
            Column::Date => record.date.to_string(),
            Column::RotAway => record.rot_away.clone(),
            Column::RotHome => record.rot_home.clone(),
            Column::AwayTeam => record.away_team.clone(),
            Column::HomeTeam => record.home_team.clone(),
            Column::Time => record.time.clone(),
            Column::AwayScore => record.away_score.to_string(),
            Column::HomeScore => record.home_score.to_string(),
            Column::Status => record.status.clone(),
            Column::ReferenceAwayLine => record.reference.away_line.to_string(),
            Column::ReferenceAwayPrice => record.reference.away_price.to_string(),
            Column::ReferenceHomeLine => record.reference.home_line.to_string(),
            Column::ReferenceHomePrice => record.reference.home_price.to_string(),
            Column::TotalScore => record.total_score.to_string(),
            Column::Favorite => record.favorite.to_string(),
            Column::Underdog => record.underdog.to_string(),
            Column::SpreadWinner => record.spread_winner.to_string(),
            Column::FavoriteCovered => u8::from(record.favorite_covered).to_string(),
            Column::UnderdogCovered => u8::from(record.underdog_covered).to_string(),
            Column::Secondary(book, part) => record
                .secondary_quote(*book)
                .map(|quote| part.pick(quote).to_string())
                .unwrap_or_default(),
        }
    }
}

/// Destination for the accepted games of a run
pub trait RecordSink {
    fn write(&mut self, schema: &[Column], records: &[GameRecord]) -> Result<()>;
}

/// CSV output with a header row
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    reference_book: Bookmaker,
}

impl CsvSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, reference_book: Bookmaker) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file), reference_book))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W, reference_book: Bookmaker) -> Self {
        CsvSink {
            writer: csv::Writer::from_writer(writer),
            reference_book,
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::PucklineError::Io(e.into_error()))
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write(&mut self, schema: &[Column], records: &[GameRecord]) -> Result<()> {
        self.writer
            .write_record(schema.iter().map(|c| c.header(self.reference_book)))?;
        for record in records {
            self.writer
                .write_record(schema.iter().map(|c| c.value(record)))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array output, one object per game keyed by column header
pub struct JsonSink<W: Write> {
    writer: W,
    reference_book: Bookmaker,
}

impl JsonSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, reference_book: Bookmaker) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file), reference_book))
    }
}

impl<W: Write> JsonSink<W> {
    pub fn from_writer(writer: W, reference_book: Bookmaker) -> Self {
        JsonSink {
            writer,
            reference_book,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonSink<W> {
    fn write(&mut self, schema: &[Column], records: &[GameRecord]) -> Result<()> {
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = records
            .iter()
            .map(|record| {
                schema
                    .iter()
                    .map(|c| {
                        (
                            c.header(self.reference_book),
                            serde_json::Value::String(c.value(record)),
                        )
                    })
                    .collect()
            })
            .collect();
        serde_json::to_writer_pretty(&mut self.writer, &rows)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Write the accepted games to `path` in the chosen format
pub fn write_records<P: AsRef<Path>>(
    path: P,
    format: OutputFormat,
    reference_book: Bookmaker,
    records: &[GameRecord],
) -> Result<()> {
    let mut sink: Box<dyn RecordSink> = match format {
        OutputFormat::Csv => Box::new(CsvSink::create(path, reference_book)?),
        OutputFormat::Json => Box::new(JsonSink::create(path, reference_book)?),
    };
    sink.write(&output_schema(reference_book), records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DateToken, LineQuote, Side};

    fn sample_record() -> GameRecord {
        GameRecord {
            date: DateToken::new("20141008"),
            rot_away: "51".to_string(),
            rot_home: "52".to_string(),
            away_team: "Philadelphia".to_string(),
            home_team: "Boston".to_string(),
            time: "7:00 PM".to_string(),
            away_score: 1,
            home_score: 2,
            status: "FINAL".to_string(),
            reference_book: Bookmaker::Westgate,
            reference: LineQuote {
                away_line: 1.5,
                away_price: -210,
                home_line: -1.5,
                home_price: 175,
            },
            total_score: 3,
            favorite: Side::Home,
            underdog: Side::Away,
            spread_winner: Side::Away,
            favorite_covered: false,
            underdog_covered: true,
            pinnacle: RawQuote {
                away_line: "+1.5".to_string(),
                away_price: "-205".to_string(),
                home_line: "-1.5".to_string(),
                home_price: "+180".to_string(),
            },
            sia: RawQuote::default(),
        }
    }

    #[test]
    fn test_csv_output() {
        let mut sink = CsvSink::from_writer(Vec::new(), Bookmaker::Westgate);
        sink.write(&output_schema(Bookmaker::Westgate), &[sample_record()]).unwrap();
        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();

        let mut lines = output.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,rot_away,rot_home,away_team,home_team,time,away_score,home_score,status,\
             Westgate_away_line,Westgate_away_price,Westgate_home_line,Westgate_home_price,\
             total_score,fav,dog,spread_winner,fav_winner,dog_winner,\
             Pinnacle_away_line,Pinnacle_away_price,Pinnacle_home_line,Pinnacle_home_price,\
             SIA_away_line,SIA_away_price,SIA_home_line,SIA_home_price"
        );
        assert_eq!(
            lines.next().unwrap(),
            "20141008,51,52,Philadelphia,Boston,7:00 PM,1,2,FINAL,\
             1.5,-210,-1.5,175,3,home,away,away,0,1,+1.5,-205,-1.5,+180,,,,"
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_header_follows_reference_book() {
        assert_eq!(
            Column::ReferenceHomeLine.header(Bookmaker::Pinnacle),
            "Pinnacle_home_line"
        );
    }

    #[test]
    fn test_secondary_reference_book_is_not_repeated() {
        assert_eq!(output_schema(Bookmaker::Westgate).len(), 27);

        for book in [Bookmaker::Pinnacle, Bookmaker::Sia] {
            let schema = output_schema(book);
            assert_eq!(schema.len(), 23);

            let headers: Vec<String> = schema.iter().map(|c| c.header(book)).collect();
            let unique: std::collections::HashSet<&String> = headers.iter().collect();
            assert_eq!(unique.len(), headers.len(), "{:?}", headers);
        }
    }

    #[test]
    fn test_json_keeps_coerced_reference_quote() {
        let mut record = sample_record();
        record.reference_book = Bookmaker::Pinnacle;

        let mut sink = JsonSink::from_writer(Vec::new(), Bookmaker::Pinnacle);
        sink.write(&output_schema(Bookmaker::Pinnacle), &[record])
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        let row = value[0].as_object().unwrap();
        assert_eq!(row.len(), 23);
        // Coerced reference price, not the raw "-205" scraped for Pinnacle
        assert_eq!(row["Pinnacle_away_price"], "-210");
        assert_eq!(row["SIA_home_line"], "");
    }

    #[test]
    fn test_json_output() {
        let mut sink = JsonSink::from_writer(Vec::new(), Bookmaker::Westgate);
        sink.write(&output_schema(Bookmaker::Westgate), &[sample_record()]).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        let row = &value[0];
        assert_eq!(row["fav"], "home");
        assert_eq!(row["dog_winner"], "1");
        assert_eq!(row["Westgate_home_line"], "-1.5");
    }

    #[test]
    fn test_write_records_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("pucklines.csv");

        write_records(&path, OutputFormat::Csv, Bookmaker::Westgate, &[sample_record()])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
