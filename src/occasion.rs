//! Decides whether a user's delivery window is open at a given instant.
//!
//! Everything here is pure: the only clock consulted is the `now` argument.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::preferences::PreferenceRecord;

/// Minutes on either side of the delivery time (exclusive) that still count
/// as on time.
pub const DUE_WINDOW_MINUTES: u32 = 5;

/// One delivery opportunity: a user on one calendar day in their own zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Occasion {
    pub user_id: String,
    pub date: NaiveDate,
}

pub fn parse_timezone(raw: &str) -> Option<Tz> {
    raw.trim().parse::<Tz>().ok()
}

/// Parses a 24-hour `HH:MM` wall-clock time.
pub fn parse_delivery_time(raw: &str) -> Option<NaiveTime> {
    let (hour, minute) = raw.trim().split_once(':')?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return None;
    }
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn is_due(record: &PreferenceRecord, now: DateTime<Utc>) -> bool {
    if !record.auto_generate {
        return false;
    }

    let (Some(delivery_time), Some(timezone)) = (
        record.delivery_time.as_deref().and_then(parse_delivery_time),
        record.timezone.as_deref().and_then(parse_timezone),
    ) else {
        return false;
    };

    let local = now.with_timezone(&timezone);
    local.hour() == delivery_time.hour()
        && local.minute().abs_diff(delivery_time.minute()) < DUE_WINDOW_MINUTES
}

/// Calendar date of `now` in the record's zone, or `None` when the zone is
/// missing or unknown.
pub fn local_date(record: &PreferenceRecord, now: DateTime<Utc>) -> Option<NaiveDate> {
    let timezone = record.timezone.as_deref().and_then(parse_timezone)?;
    Some(now.with_timezone(&timezone).date_naive())
}

impl Occasion {
    pub fn for_record(record: &PreferenceRecord, now: DateTime<Utc>) -> Option<Self> {
        local_date(record, now).map(|date| Self {
            user_id: record.user_id.clone(),
            date,
        })
    }

    /// Occasion used when dispatch is forced: the zone's date if known,
    /// otherwise the UTC date.
    pub fn for_forced(record: &PreferenceRecord, now: DateTime<Utc>) -> Self {
        Self::for_record(record, now).unwrap_or_else(|| Self {
            user_id: record.user_id.clone(),
            date: now.date_naive(),
        })
    }
}
