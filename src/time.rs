// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The session time base.
//!
//! All scheduling times are unsigned seconds since the session start;
//! conversions to calendar time, MJD and sidereal time happen here.

use chrono::{DateTime, Duration, Utc};
use hifitime::Epoch;
use thiserror::Error;

use crate::astro;

/// MJD of the unix epoch (1970-01-01).
const MJD_UNIX_EPOCH: f64 = 40587.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("session end {end} is not after session start {start}")]
    EmptySession {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("time {0} is outside the precomputed session range")]
    InvalidTime(i64),
}

/// The time base of one observing session.
///
/// A session has a UTC start and end; everything else in the scheduler deals
/// in seconds since the start. The MJD of the session start is precomputed
/// because the astronomy routines want it for every pointing.
#[derive(Clone, Debug)]
pub struct TimeSystem {
    start: DateTime<Utc>,
    /// Session duration \[s\].
    pub duration: u32,
    /// MJD (UTC) of the session start.
    pub mjd_start: f64,
}

impl TimeSystem {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeSystem, TimeError> {
        if end <= start {
            return Err(TimeError::EmptySession { start, end });
        }
        let duration = (end - start).num_seconds() as u32;

        // Go through hifitime so the MJD is consistent with what the ERFA
        // routines expect.
        let epoch = Epoch::from_utc_seconds(
            start.timestamp() as f64 + MJD_UNIX_EPOCH * hifitime::SECONDS_PER_DAY
                - hifitime::J1900_OFFSET * hifitime::SECONDS_PER_DAY,
        );
        let mjd_start = epoch.as_mjd_utc_days();

        Ok(TimeSystem {
            start,
            duration,
            mjd_start,
        })
    }

    /// The session start in calendar time.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Convert an internal time to unix seconds.
    pub fn internal_to_posix(&self, t: u32) -> i64 {
        self.start.timestamp() + i64::from(t)
    }

    /// Convert unix seconds to an internal time. Fails for instants outside
    /// the session.
    pub fn posix_to_internal(&self, posix: i64) -> Result<u32, TimeError> {
        let offset = posix - self.start.timestamp();
        if offset < 0 || offset > i64::from(self.duration) {
            return Err(TimeError::InvalidTime(posix));
        }
        Ok(offset as u32)
    }

    /// MJD (UTC) at an internal time.
    pub fn mjd_at(&self, t: u32) -> f64 {
        self.mjd_start + f64::from(t) / crate::constants::DAYSEC
    }

    /// Greenwich mean sidereal time \[radians\] at an internal time.
    pub fn gmst_at(&self, t: u32) -> f64 {
        astro::gmst(self.mjd_at(t))
    }

    /// Calendar representation of an internal time, for log messages.
    pub fn time_string(&self, t: u32) -> String {
        (self.start + Duration::seconds(i64::from(t)))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn session() -> TimeSystem {
        let start = Utc.ymd(2018, 11, 14).and_hms(17, 0, 0);
        let end = Utc.ymd(2018, 11, 15).and_hms(17, 0, 0);
        TimeSystem::new(start, end).unwrap()
    }

    #[test]
    fn duration_and_posix_round_trip() {
        let ts = session();
        assert_eq!(ts.duration, 86400);
        let p = ts.internal_to_posix(3600);
        assert_eq!(ts.posix_to_internal(p).unwrap(), 3600);
        assert!(ts.posix_to_internal(p - 7200).is_err());
    }

    #[test]
    fn empty_session_is_rejected() {
        let start = Utc.ymd(2018, 11, 14).and_hms(17, 0, 0);
        assert!(matches!(
            TimeSystem::new(start, start),
            Err(TimeError::EmptySession { .. })
        ));
    }

    #[test]
    fn mjd_of_known_date() {
        // 2018-11-14 17:00 UT is MJD 58436.708333...
        let ts = session();
        assert_abs_diff_eq!(ts.mjd_start, 58436.0 + 17.0 / 24.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ts.mjd_at(43200), ts.mjd_start + 0.5, epsilon = 1e-9);
    }

    #[test]
    fn gmst_advances_at_sidereal_rate() {
        let ts = session();
        let g0 = ts.gmst_at(0);
        let g1 = ts.gmst_at(3600);
        // One hour of UT advances GMST by a little more than 15 degrees.
        let mut delta = g1 - g0;
        if delta < 0.0 {
            delta += crate::constants::TAU;
        }
        assert_abs_diff_eq!(delta.to_degrees(), 15.041, epsilon = 1e-2);
    }
}
