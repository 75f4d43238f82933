//! Wall-clock to instant conversions in a restaurant's time zone.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::services::ServiceError;

pub fn parse_timezone(name: &str) -> Result<Tz, ServiceError> {
    name.parse::<Tz>()
        .map_err(|_| ServiceError::validation(format!("unknown time zone '{}'", name)))
}

/// `date` at `time` in `tz`, as UTC. Ambiguous wall times (DST fall-back)
/// resolve to the earlier instant; times inside a DST gap are rejected.
pub fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<DateTime<Utc>, ServiceError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            ServiceError::validation(format!("{} {} does not exist in {}", date, time, tz.name()))
        })
}

/// Drop instant for a reservation: `days_in_advance` days before
/// `reservation_date`, at `drop_time`, in the restaurant's zone.
pub fn scheduled_at(
    reservation_date: NaiveDate,
    days_in_advance: u32,
    drop_time: NaiveTime,
    tz: Tz,
) -> Result<DateTime<Utc>, ServiceError> {
    let drop_date = reservation_date
        .checked_sub_days(Days::new(days_in_advance as u64))
        .ok_or_else(|| ServiceError::validation("reservation date out of range"))?;
    local_instant(drop_date, drop_time, tz)
}

/// Today's calendar date in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}
