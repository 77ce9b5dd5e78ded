use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Fixed operating timezone for the whole system; every local-day computation
/// (representative dates, consolidation, "is expired") goes through this.
pub const JERUSALEM: Tz = chrono_tz::Asia::Jerusalem;

/// Injectable notion of "now", replacing the module-level `JERUSALEM_TZ`
/// singleton the pipeline used to read wall-clock time from directly. Tests
/// substitute a fixed clock; the ingester's `-f <feedfile>` flag substitutes
/// a fixed clock derived from the filename.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn today_jerusalem(&self) -> NaiveDate {
        self.now_utc().with_timezone(&JERUSALEM).date_naive()
    }

    fn now_jerusalem_naive(&self) -> NaiveDateTime {
        self.now_utc().with_timezone(&JERUSALEM).naive_local()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, used by tests and by the ingester's
/// filename-derived "fake today" override.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_jerusalem_converts_from_utc() {
        // 2024-06-01 21:30 UTC is 2024-06-02 00:30 in Jerusalem (UTC+3 summer time).
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 21, 30, 0).unwrap());
        assert_eq!(clock.today_jerusalem(), NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }
}
