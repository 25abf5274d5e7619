use time::OffsetDateTime;
use time_tz::{timezones::db::america::NEW_YORK, OffsetDateTimeExt};

/// Current instant expressed in US Eastern civil time.
pub fn eastern_now() -> OffsetDateTime {
    to_eastern(OffsetDateTime::now_utc())
}

/// Same instant, offset taken from the `America/New_York` tz database entry.
pub fn to_eastern(instant: OffsetDateTime) -> OffsetDateTime {
    instant.to_timezone(NEW_YORK)
}
