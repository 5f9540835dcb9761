//! Weekly bucketing of snapshot dates

use chrono::{Datelike, Duration, Local, NaiveDate};

/// Monday of the week containing `date`
pub fn week_bucket(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Bucket for today's local date
pub fn current_week() -> NaiveDate {
    week_bucket(Local::now().date_naive())
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_week(s: &str) -> crate::error::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_week(s).unwrap()
    }

    #[test]
    fn test_week_bucket_moves_to_monday() {
        assert_eq!(week_bucket(d("2024-05-15")), d("2024-05-13"));
        assert_eq!(week_bucket(d("2024-05-19")), d("2024-05-13"));
        assert_eq!(week_bucket(d("2024-05-13")), d("2024-05-13"));
    }

    #[test]
    fn test_week_bucket_crosses_year() {
        assert_eq!(week_bucket(d("2025-01-01")), d("2024-12-30"));
    }

    #[test]
    fn test_parse_week_rejects_garbage() {
        assert!(parse_week("13/05/2024").is_err());
    }
}
