// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Precomputed astronomy for one session.

The IAU primitives come from ERFA. Nutation (the CIP coordinates X, Y and
the CIO locator s) is expensive, so it is sampled once per hour over the
session and linearly interpolated afterwards; the Earth velocity and the Sun
position are single values at the session mid-time. This module is the only
place that calls into `erfa_sys`.
 */

use erfa_sys::{eraC2ixys, eraEpv00, eraEra00, eraGmst82, eraSeps, eraXys06a};

use crate::constants::{DAU, DAYSEC, DJM0};
use crate::time::{TimeError, TimeSystem};

/// Spacing of the nutation samples \[s\].
const NUT_STEP: u32 = 3600;

/// Greenwich mean sidereal time \[radians\] for an MJD (UT1 ~ UTC).
pub(crate) fn gmst(mjd: f64) -> f64 {
    let g = unsafe { eraGmst82(DJM0, mjd) };
    crate::math::wrap_to_two_pi(g)
}

/// Earth rotation angle \[radians\] for an MJD.
pub(crate) fn earth_rotation_angle(mjd: f64) -> f64 {
    unsafe { eraEra00(DJM0, mjd) }
}

/// Celestial-to-intermediate rotation matrix from CIP coordinates and the
/// CIO locator.
pub(crate) fn celestial_to_intermediate(x: f64, y: f64, s: f64) -> [[f64; 3]; 3] {
    let mut rc2i = [[0.0; 3]; 3];
    unsafe { eraC2ixys(x, y, s, rc2i.as_mut_ptr()) };
    rc2i
}

/// Angular separation between two spherical directions \[radians\].
pub fn separation(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    unsafe { eraSeps(lon1, lat1, lon2, lat2) }
}

/// Astronomy values precomputed for one session.
#[derive(Clone, Debug)]
pub struct AstroData {
    /// Sample times \[s since session start\]; the table covers the session
    /// plus one hour of slack.
    nut_time: Vec<u32>,
    nut_x: Vec<f64>,
    nut_y: Vec<f64>,
    nut_s: Vec<f64>,

    /// Barycentric Earth velocity at the session mid-time \[m/s\].
    pub earth_velocity: [f64; 3],

    /// Apparent Sun right ascension at the session mid-time \[radians\].
    pub sun_ra: f64,
    /// Apparent Sun declination at the session mid-time \[radians\].
    pub sun_dec: f64,
}

impl AstroData {
    pub fn precompute(time: &TimeSystem) -> AstroData {
        let n = ((time.duration + NUT_STEP - 1) / NUT_STEP + 2) as usize;
        let mut nut_time = Vec::with_capacity(n);
        let mut nut_x = Vec::with_capacity(n);
        let mut nut_y = Vec::with_capacity(n);
        let mut nut_s = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as u32 * NUT_STEP;
            let mjd = time.mjd_at(t);
            let (mut x, mut y, mut s) = (0.0, 0.0, 0.0);
            unsafe { eraXys06a(DJM0, mjd, &mut x, &mut y, &mut s) };
            nut_time.push(t);
            nut_x.push(x);
            nut_y.push(y);
            nut_s.push(s);
        }

        let mjd_mid = time.mjd_at(time.duration / 2);
        let mut pvh = [[0.0; 3]; 2];
        let mut pvb = [[0.0; 3]; 2];
        unsafe { eraEpv00(DJM0, mjd_mid, pvh.as_mut_ptr(), pvb.as_mut_ptr()) };

        // AU/day -> m/s.
        let earth_velocity = [
            pvb[1][0] * DAU / DAYSEC,
            pvb[1][1] * DAU / DAYSEC,
            pvb[1][2] * DAU / DAYSEC,
        ];

        // The geocentric Sun direction is the negated heliocentric Earth
        // position.
        let (sx, sy, sz) = (-pvh[0][0], -pvh[0][1], -pvh[0][2]);
        let sun_ra = crate::math::wrap_to_two_pi(sy.atan2(sx));
        let sun_dec = sz.atan2(sx.hypot(sy));

        AstroData {
            nut_time,
            nut_x,
            nut_y,
            nut_s,
            earth_velocity,
            sun_ra,
            sun_dec,
        }
    }

    /// Interpolated CIP X, Y and CIO locator s at an internal time.
    pub fn nutation_at(&self, t: u32) -> Result<(f64, f64, f64), TimeError> {
        let last = *self.nut_time.last().expect("table is never empty");
        if t > last {
            return Err(TimeError::InvalidTime(i64::from(t)));
        }
        let idx = (t / NUT_STEP) as usize;
        if self.nut_time[idx] == t {
            return Ok((self.nut_x[idx], self.nut_y[idx], self.nut_s[idx]));
        }
        let frac = f64::from(t - self.nut_time[idx]) / f64::from(NUT_STEP);
        let lerp = |v: &[f64]| v[idx] + (v[idx + 1] - v[idx]) * frac;
        Ok((lerp(&self.nut_x), lerp(&self.nut_y), lerp(&self.nut_s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn session() -> TimeSystem {
        let start = chrono::Utc.ymd(2018, 11, 14).and_hms(17, 0, 0);
        let end = chrono::Utc.ymd(2018, 11, 15).and_hms(17, 0, 0);
        TimeSystem::new(start, end).unwrap()
    }

    #[test]
    fn nutation_interpolates_and_bounds() {
        let ts = session();
        let astro = AstroData::precompute(&ts);
        let (x0, ..) = astro.nutation_at(0).unwrap();
        let (x1, ..) = astro.nutation_at(3600).unwrap();
        let (xm, ..) = astro.nutation_at(1800).unwrap();
        assert_abs_diff_eq!(xm, (x0 + x1) / 2.0, epsilon = 1e-12);
        // The table covers one hour past the session end and nothing more.
        assert!(astro.nutation_at(ts.duration + 3600).is_ok());
        assert!(astro.nutation_at(ts.duration + 2 * 3600).is_err());
    }

    #[test]
    fn earth_velocity_is_orbital() {
        let ts = session();
        let astro = AstroData::precompute(&ts);
        let v = astro.earth_velocity;
        let speed = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        // Earth's orbital speed is very close to 30 km/s all year.
        assert!((29_000.0..31_000.0).contains(&speed), "speed {speed}");
    }

    #[test]
    fn sun_in_scorpius_in_november() {
        let ts = session();
        let astro = AstroData::precompute(&ts);
        // Mid-November: RA ~ 15.3 h, Dec ~ -18.5 deg.
        assert_abs_diff_eq!(astro.sun_ra.to_degrees(), 231.3, epsilon = 2.0);
        assert_abs_diff_eq!(astro.sun_dec.to_degrees(), -18.4, epsilon = 1.0);
    }

    #[test]
    fn separation_basics() {
        assert_abs_diff_eq!(
            separation(0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }
}
