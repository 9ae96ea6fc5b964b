use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use mongodb::bson::DateTime as BsonDateTime;
use std::sync::{Arc, RwLock};

pub const DEFAULT_TIMEZONE: Tz = Tz::UTC;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Source of "now" for session limits, TTL bookkeeping and streak dates.
///
/// `Manual` clones share one instant, so advancing any handle moves every
/// component that was built from it.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    Manual(Arc<RwLock<DateTime<Utc>>>),
}

impl Clock {
    pub fn system() -> Self {
        Self::System
    }

    pub fn manual(at: DateTime<Utc>) -> Self {
        Self::Manual(Arc::new(RwLock::new(at)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(at) => match at.read() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            },
        }
    }

    /// Moves a manual clock forward. No effect on the system clock.
    pub fn advance(&self, delta: Duration) {
        if let Clock::Manual(at) = self {
            match at.write() {
                Ok(mut guard) => *guard += delta,
                Err(poisoned) => *poisoned.into_inner() += delta,
            }
        }
    }
}

/// Parses an IANA timezone name, falling back to UTC for empty or unknown names.
pub fn resolve_timezone(name: &str) -> Tz {
    if name.trim().is_empty() {
        return DEFAULT_TIMEZONE;
    }
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("Unknown timezone '{}', falling back to UTC", name);
            DEFAULT_TIMEZONE
        }
    }
}

/// Calendar date of `instant` as seen in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Whole local days between `earlier` and `later` (negative if `earlier` is in the future).
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>, tz: Tz) -> i64 {
    (local_date(later, tz) - local_date(earlier, tz)).num_days()
}
