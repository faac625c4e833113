//! UTC timestamp rendering shared by tasks, snapshots, and API payloads.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Current timestamp in RFC 3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

/// `at` in RFC 3339.
pub(crate) fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// `YYYY-mm-dd HH:MM:SS`.
pub(crate) fn datetime_seconds(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// `dd/mm/YYYY HH:MM`.
pub(crate) fn day_first_minutes(at: OffsetDateTime) -> String {
    at.format(format_description!("[day]/[month]/[year] [hour]:[minute]"))
        .unwrap_or_default()
}

/// `YYYYmmddHHMMSS`, used in derived table names.
pub(crate) fn compact_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day][hour][minute][second]"))
        .unwrap_or_default()
}

/// `YYYYmmdd_HHMMSS`, used in export file names.
pub(crate) fn file_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn renders_every_layout() {
        let at = datetime!(2024-03-05 07:08:09 UTC);
        assert_eq!(rfc3339(at), "2024-03-05T07:08:09Z");
        assert_eq!(datetime_seconds(at), "2024-03-05 07:08:09");
        assert_eq!(day_first_minutes(at), "05/03/2024 07:08");
        assert_eq!(compact_stamp(at), "20240305070809");
        assert_eq!(file_stamp(at), "20240305_070809");
    }
}
