//! Exchange session calendar and opening-range window definitions.
//!
//! Bars arrive with UTC timestamps. All window arithmetic happens in the
//! exchange's local time (DST-aware via chrono-tz), and a bar belongs to the
//! trading day of its local date.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PriceBar, WindowId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("session end {end} must be after session start {start}")]
    EmptySession { start: NaiveTime, end: NaiveTime },
    #[error("window `{id}`: end {end} must be after start {start}")]
    EmptyWindow {
        id: String,
        start: NaiveTime,
        end: NaiveTime,
    },
    #[error("window `{id}`: bar_minutes must be positive")]
    ZeroBarMinutes { id: String },
    #[error("window `{id}`: length is not a whole number of {bar_minutes}-minute bars")]
    RaggedWindow { id: String, bar_minutes: u32 },
    #[error("window `{id}` [{start}, {end}) is outside session [{session_start}, {session_end})")]
    OutsideSession {
        id: String,
        start: NaiveTime,
        end: NaiveTime,
        session_start: NaiveTime,
        session_end: NaiveTime,
    },
    #[error("window `{id}`: allowed_missing_bars {allowed} leaves no bars out of {expected}")]
    TooPermissive {
        id: String,
        allowed: usize,
        expected: usize,
    },
    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),
}

/// Exchange session: timezone plus the local-time span of a trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCalendar {
    pub timezone: Tz,
    pub session_start: NaiveTime,
    pub session_end: NaiveTime,
}

impl SessionCalendar {
    pub fn new(
        timezone: Tz,
        session_start: NaiveTime,
        session_end: NaiveTime,
    ) -> Result<Self, SessionError> {
        if session_end <= session_start {
            return Err(SessionError::EmptySession {
                start: session_start,
                end: session_end,
            });
        }
        Ok(Self {
            timezone,
            session_start,
            session_end,
        })
    }

    /// Parse an IANA timezone name (e.g. `America/New_York`).
    pub fn parse_timezone(name: &str) -> Result<Tz, SessionError> {
        name.parse::<Tz>()
            .map_err(|_| SessionError::UnknownTimezone(name.to_string()))
    }

    /// Exchange-local (date, time) of a UTC timestamp.
    pub fn local(&self, ts: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
        let local = ts.with_timezone(&self.timezone);
        (local.date_naive(), local.time())
    }

    pub fn local_time(&self, ts: DateTime<Utc>) -> NaiveTime {
        self.local(ts).1
    }

    pub fn in_session(&self, time: NaiveTime) -> bool {
        time >= self.session_start && time < self.session_end
    }

    /// UTC instant of a local wall-clock time; `None` inside a DST gap.
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }

    /// UTC load bounds that cover local trading days `first..=last` for any
    /// timezone. Callers filter the resulting days by date.
    pub fn utc_bounds(&self, first: NaiveDate, last: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = first - Duration::days(1);
        let end = last + Duration::days(2);
        (
            Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)),
            Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN)),
        )
    }
}

/// A fixed daily window in exchange-local time, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDefinition {
    pub id: WindowId,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub bar_minutes: u32,
    /// Bars that may be absent before the window counts as incomplete.
    pub allowed_missing_bars: usize,
}

impl WindowDefinition {
    pub fn validate(&self, calendar: &SessionCalendar) -> Result<(), SessionError> {
        let id = self.id.0.clone();
        if self.end <= self.start {
            return Err(SessionError::EmptyWindow {
                id,
                start: self.start,
                end: self.end,
            });
        }
        if self.bar_minutes == 0 {
            return Err(SessionError::ZeroBarMinutes { id });
        }
        let minutes = (self.end - self.start).num_minutes();
        if minutes % i64::from(self.bar_minutes) != 0 {
            return Err(SessionError::RaggedWindow {
                id,
                bar_minutes: self.bar_minutes,
            });
        }
        if self.start < calendar.session_start || self.end >= calendar.session_end {
            return Err(SessionError::OutsideSession {
                id,
                start: self.start,
                end: self.end,
                session_start: calendar.session_start,
                session_end: calendar.session_end,
            });
        }
        let expected = self.expected_bars();
        if self.allowed_missing_bars >= expected {
            return Err(SessionError::TooPermissive {
                id,
                allowed: self.allowed_missing_bars,
                expected,
            });
        }
        Ok(())
    }

    /// Number of bars a complete window contains.
    pub fn expected_bars(&self) -> usize {
        let minutes = (self.end - self.start).num_minutes().max(0) as usize;
        minutes / self.bar_minutes.max(1) as usize
    }

    pub fn min_bars(&self) -> usize {
        self.expected_bars().saturating_sub(self.allowed_missing_bars)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time < self.end
    }

    pub fn is_after(&self, time: NaiveTime) -> bool {
        time >= self.end
    }
}

/// All in-session bars of one exchange-local trading day, in timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub bars: Vec<PriceBar>,
}

/// Group canonical (sorted, de-duplicated) bars into trading days.
///
/// Bars outside `[session_start, session_end)` local time are dropped. Days
/// are returned in ascending date order.
pub fn split_by_trading_day(bars: &[PriceBar], calendar: &SessionCalendar) -> Vec<TradingDay> {
    let mut by_day: BTreeMap<NaiveDate, Vec<PriceBar>> = BTreeMap::new();
    for bar in bars {
        let (date, time) = calendar.local(bar.timestamp);
        if calendar.in_session(time) {
            by_day.entry(date).or_default().push(*bar);
        }
    }
    by_day
        .into_iter()
        .map(|(date, bars)| TradingDay { date, bars })
        .collect()
}
