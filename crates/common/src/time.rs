use chrono::{DateTime, Datelike, Months, NaiveDate, SecondsFormat, TimeZone, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MONTH_FORMAT: &str = "%Y-%m";

/// `YYYY-MM-DDTHH:MM:SSZ`, the layout stored for event timestamps.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn format_date(ts: &DateTime<Utc>) -> String {
    ts.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Start of the rolling window: `now - months`.
pub fn window_start(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months)).unwrap_or(now)
}

pub fn window_start_date(now: DateTime<Utc>, months: u32) -> String {
    format_date(&window_start(now, months))
}

pub fn date_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Activity date clamped to `today`, so a skewed remote clock never yields a future date.
pub fn activity_date(ts: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    if ts > now {
        format_date(now)
    } else {
        format_date(ts)
    }
}

pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_use_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 10, 8, 30, 0).unwrap();
        assert_eq!(format_ts(&ts), "2025-01-10T08:30:00Z");
        assert_eq!(parse_ts("2025-01-10T08:30:00Z"), Some(ts));
    }

    #[test]
    fn window_start_subtracts_calendar_months() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(window_start_date(now, 1), "2025-02-28");
        assert_eq!(window_start_date(now, 12), "2024-03-31");
    }

    #[test]
    fn future_dates_are_clamped() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(activity_date(&later, &now), "2025-01-01");
    }

    #[test]
    fn month_key_is_zero_padded() {
        assert_eq!(month_key(parse_date("2025-02-15").unwrap()), "2025-02");
    }
}
