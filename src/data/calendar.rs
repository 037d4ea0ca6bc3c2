//! Expansion of configured season ranges into date tokens

use crate::{DateToken, SeasonRange};

/// Every day of every season, in order, as upstream date tokens
pub fn date_tokens(seasons: &[SeasonRange]) -> Vec<DateToken> {
    let mut tokens = Vec::new();

    for season in seasons {
        let mut day = season.start;
        while day <= season.end {
            tokens.push(DateToken::from_date(day));
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_season_expansion() {
        let seasons = [
            SeasonRange {
                start: NaiveDate::from_ymd_opt(2014, 2, 27).unwrap(),
                end: NaiveDate::from_ymd_opt(2014, 3, 2).unwrap(),
            },
            SeasonRange {
                start: NaiveDate::from_ymd_opt(2014, 10, 8).unwrap(),
                end: NaiveDate::from_ymd_opt(2014, 10, 8).unwrap(),
            },
        ];

        let tokens: Vec<String> = date_tokens(&seasons)
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(
            tokens,
            vec!["20140227", "20140228", "20140301", "20140302", "20141008"]
        );
    }

    #[test]
    fn test_default_seasons() {
        let tokens = date_tokens(&crate::Config::default().seasons);
        assert_eq!(tokens.first().map(|t| t.as_str()), Some("20131001"));
        assert_eq!(tokens.last().map(|t| t.as_str()), Some("20150411"));
        // 195 days in 2013-14, 186 days in 2014-15
        assert_eq!(tokens.len(), 195 + 186);
    }
}
