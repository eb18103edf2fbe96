use chrono::NaiveDate;

pub mod archive;
pub mod cli;
pub mod commands;
pub mod config;
pub mod csv_fix;
pub mod directory;
mod error;
pub mod history;
pub mod output;
pub mod selection;
pub mod slack;

pub use cli::{Cli, Commands, FetchArgs};
pub use error::{AppError, Result};

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Parses an optional date flag; empty values count as unset.
pub fn parse_optional_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    match s.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_date(value).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_valid() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(matches!(parse_date("2023-02-29"), Err(AppError::InvalidDate(_))));
        assert!(matches!(parse_date("01/02/2024"), Err(AppError::InvalidDate(_))));
        assert!(matches!(parse_date(""), Err(AppError::InvalidDate(_))));
    }

    #[test]
    fn test_parse_optional_date() {
        assert_eq!(parse_optional_date(None).unwrap(), None);
        assert_eq!(parse_optional_date(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_optional_date(Some("2024-01-05")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert!(parse_optional_date(Some("tomorrow")).is_err());
    }
}
