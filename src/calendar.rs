//! Local-calendar helpers.
//!
//! Prayer times are published per calendar day, so cache lifetimes and wire
//! dates are computed from the local wall clock rather than UTC.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// The first instant of the calendar day after `now`, in `now`'s zone.
///
/// If midnight does not exist on that day (a DST gap starting at 00:00) the
/// first valid instant after the gap is returned; if it is ambiguous the
/// earlier instant wins.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .unwrap_or_else(|| now.date_naive());
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    // Gaps are at most a couple of hours; probe forward in 15 minute steps.
    for step in 0..=12 {
        let candidate = midnight + Duration::minutes(15 * step);
        if let Some(instant) = tz.from_local_datetime(&candidate).earliest() {
            return instant;
        }
    }

    now.clone() + Duration::days(1)
}

/// The first instant after the calendar day `date` in `tz`.
pub fn end_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    // Noon always exists, even on DST transition days.
    let noon = tz.from_local_datetime(&date.and_hms_opt(12, 0, 0)?).earliest()?;
    Some(next_local_midnight(&noon))
}

/// `YYYY-MM-DD` for the local date of `now`.
pub fn date_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A clock tests can move by hand.
    pub struct ManualClock(Mutex<DateTime<Local>>);

    impl ManualClock {
        pub fn at(now: DateTime<Local>) -> Self {
            Self(Mutex::new(now))
        }

        /// Noon today, far from any midnight edge.
        pub fn noon() -> Self {
            let today = Local::now().date_naive();
            let noon = today.and_hms_opt(12, 0, 0).unwrap();
            Self::at(Local.from_local_datetime(&noon).earliest().unwrap())
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }

        pub fn set(&self, to: DateTime<Local>) {
            *self.0.lock().unwrap() = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.0.lock().unwrap()
        }
    }
}
