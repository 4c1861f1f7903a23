//! Date-range report queries over entradas and salidas.

use std::fmt;

use thiserror::Error;
use time::Date;

use crate::models::{format_fecha, parse_fecha};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Entradas,
    Salidas,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Entradas => f.write_str("entradas"),
            ReportKind::Salidas => f.write_str("salidas"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("fecha invalida '{value}', se espera el formato YYYY-MM-DD")]
    InvalidDate { value: String },
    /// The storage-side cause is logged where this is produced and never
    /// carried to the caller.
    #[error("Error al obtener los datos de {0}")]
    Unavailable(ReportKind),
}

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ReportError> {
        let parse = |value: &str| {
            parse_fecha(value).ok_or_else(|| ReportError::InvalidDate {
                value: value.to_string(),
            })
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }

    pub fn contains(&self, fecha: Date) -> bool {
        self.start <= fecha && fecha <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Bounds in the text form stored by the SQL backends. `YYYY-MM-DD`
    /// sorts lexicographically in date order.
    pub fn sql_bounds(&self) -> (String, String) {
        (format_fecha(self.start), format_fecha(self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn d(y: i32, m: Month, day: u8) -> Date {
        Date::from_calendar_date(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_inclusive_range() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        assert!(range.contains(d(2024, Month::January, 1)));
        assert!(range.contains(d(2024, Month::January, 31)));
        assert!(!range.contains(d(2024, Month::February, 1)));
        assert!(!range.contains(d(2023, Month::December, 31)));
    }

    #[test]
    fn test_parse_rejects_malformed_dates() {
        match DateRange::parse("2024-01-01", "31/01/2024") {
            Err(ReportError::InvalidDate { value }) => assert_eq!(value, "31/01/2024"),
            other => panic!("Expected InvalidDate, got {:?}", other),
        }
        assert!(DateRange::parse("yesterday", "2024-01-31").is_err());
    }

    #[test]
    fn test_reversed_range_is_empty() {
        let range = DateRange::parse("2024-02-01", "2024-01-01").unwrap();
        assert!(range.is_empty());
        assert!(!range.contains(d(2024, Month::January, 15)));
    }

    #[test]
    fn test_sql_bounds() {
        let range = DateRange::parse("2024-01-01", "2024-12-31").unwrap();
        assert_eq!(
            range.sql_bounds(),
            ("2024-01-01".to_string(), "2024-12-31".to_string())
        );
    }
}
