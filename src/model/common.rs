use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

pub type Id = String;

pub type Timestamp = DateTime<Utc>;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Current time truncated to the microsecond precision Postgres stores, so a
/// timestamp handed to a caller compares equal when it is sent back.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// A modification timestamp strictly after `previous`, even when the clock has
/// not advanced since it was taken.
pub fn next_modification_time(previous: Option<Timestamp>) -> Timestamp {
    let current = now();
    match previous {
        Some(previous) if current <= previous => previous + Duration::microseconds(1),
        _ => current,
    }
}
