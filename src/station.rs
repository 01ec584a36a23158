// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The station model.

A station bundles its geometry (position, antenna kinematics, cable wrap,
horizon mask), its equipment, its wait times, its active parameter block with
the event timeline that rewrites it, and its current pointing. The scheduler
only ever moves the current pointing forward in time.
 */

use std::collections::HashMap;

use serde::Deserialize;

use crate::antenna::Antenna;
use crate::astro::AstroData;
use crate::cable_wrap::{CableWrap, CableWrapKind};
use crate::constants::FRAC_PI_2;
use crate::equip::Equipment;
use crate::event::EventList;
use crate::horizon_mask::HorizonMask;
use crate::math::{angular_distance, wrap_to_pi};
use crate::pointing::{PointingVector, NO_SOURCE};
use crate::source::Source;
use crate::time::TimeSystem;

/// Geocentric station position with derived geodetic-ish angles.
#[derive(Clone, Copy, Debug)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Geocentric latitude \[radians\].
    pub lat: f64,
    /// East longitude \[radians\].
    pub lon: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Position {
        Position {
            x,
            y,
            z,
            lat: z.atan2(x.hypot(y)),
            lon: y.atan2(x),
        }
    }

    /// Distance to another station \[m\].
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

/// Constant per-activity wait times \[s\].
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct WaitTimes {
    pub field_system: u32,
    pub preob: u32,
    pub midob: u32,
    pub postob: u32,
    pub setup: u32,
    pub source: u32,
    pub tape: u32,
    pub calibration: u32,
}

impl Default for WaitTimes {
    fn default() -> WaitTimes {
        WaitTimes {
            field_system: 6,
            preob: 10,
            midob: 3,
            postob: 0,
            setup: 0,
            source: 5,
            tape: 1,
            calibration: 10,
        }
    }
}

/// The active policy of one station.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StationParameters {
    pub available: bool,
    /// The station joins committed scans instead of driving the selection.
    pub tagalong: bool,
    /// No field system, slew or preob is charged before the first scan.
    pub first_scan: bool,
    /// Explicit scoring weight.
    pub weight: f64,
    /// Minimum observing time \[s\].
    pub min_scan: u32,
    /// Maximum observing time \[s\].
    pub max_scan: u32,
    /// Required SNR per band.
    pub min_snr: HashMap<String, f64>,
    /// Longest acceptable slew \[s\].
    pub max_slew_time: u32,
    /// Longest acceptable slew \[radians\].
    pub max_slew_distance: f64,
    /// Shortest acceptable slew \[radians\].
    pub min_slew_distance: f64,
    /// Longest acceptable idle wait before a scan \[s\].
    pub max_wait: u32,
    /// Minimum observing elevation \[radians\].
    pub min_elevation: f64,
    /// Sources this station never observes.
    pub ignore_sources: Vec<usize>,
}

impl Default for StationParameters {
    fn default() -> StationParameters {
        StationParameters {
            available: true,
            tagalong: false,
            first_scan: false,
            weight: 1.0,
            min_scan: 20,
            max_scan: 600,
            min_snr: HashMap::new(),
            max_slew_time: 9999,
            max_slew_distance: 175_f64.to_radians(),
            min_slew_distance: 0.0,
            max_wait: 9999,
            min_elevation: 5_f64.to_radians(),
            ignore_sources: vec![],
        }
    }
}

/// Which azimuth/elevation model to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AzElModel {
    /// Topocentric spherical trigonometry from GMST; plenty for candidate
    /// filtering.
    Simple,
    /// CIP-based rotation with annual aberration; used for committed
    /// pointings.
    Rigorous,
}

/// Per-station statistics, rebuilt by the check routine.
#[derive(Clone, Debug, Default)]
pub struct StationStatistics {
    pub scan_start_times: Vec<u32>,
    pub total_observing_time: u32,
    pub total_field_system_time: u32,
    pub total_slew_time: u32,
    pub total_idle_time: u32,
    pub total_preob_time: u32,
}

#[derive(Clone, Debug)]
pub struct Station {
    pub name: String,
    /// Two-letter station code, unique per network.
    pub code: String,
    /// One-letter code for schedule files.
    pub code_1: char,
    pub position: Position,
    pub antenna: Antenna,
    pub cable_wrap: CableWrap,
    pub mask: Option<HorizonMask>,
    pub equip: Equipment,
    pub wait_times: WaitTimes,

    pub parameters: StationParameters,
    events: EventList<StationParameters>,

    current_pointing: PointingVector,
    pub n_total_scans: u32,
    pub n_obs: u32,
    pub statistics: StationStatistics,
}

impl Station {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        staid: usize,
        name: String,
        code: String,
        code_1: char,
        position: Position,
        antenna: Antenna,
        cable_wrap: CableWrap,
        mask: Option<HorizonMask>,
        equip: Equipment,
    ) -> Station {
        let parameters = StationParameters::default();
        let mut park = PointingVector::new(staid, NO_SOURCE, 0);
        park.el = FRAC_PI_2;
        Station {
            name,
            code,
            code_1,
            position,
            antenna,
            cable_wrap,
            mask,
            equip,
            wait_times: WaitTimes::default(),
            events: EventList::single(parameters.clone()),
            parameters,
            current_pointing: park,
            n_total_scans: 0,
            n_obs: 0,
            statistics: StationStatistics::default(),
        }
    }

    pub fn set_events(&mut self, events: EventList<StationParameters>) {
        self.events = events;
    }

    pub fn current_pointing(&self) -> &PointingVector {
        &self.current_pointing
    }

    pub fn set_current_pointing(&mut self, pv: PointingVector) {
        self.current_pointing = pv;
    }

    /// The time the station becomes free \[s since session start\].
    pub fn current_time(&self) -> u32 {
        self.current_pointing.time
    }

    /// Compute azimuth, elevation, hour angle and declination of `source` at
    /// `pv.time`, writing them into `pv`. Best effort: this never fails, the
    /// rigorous model degrades to the simple one outside the precomputed
    /// nutation range.
    pub fn calc_az_el(
        &self,
        model: AzElModel,
        time: &TimeSystem,
        astro: &AstroData,
        source: &Source,
        pv: &mut PointingVector,
    ) {
        let (ha, dec) = match model {
            AzElModel::Rigorous => match astro.nutation_at(pv.time) {
                Ok((x, y, s)) => self.apparent_ha_dec(time, astro, source, pv.time, (x, y, s)),
                Err(_) => self.mean_ha_dec(time, source, pv.time),
            },
            AzElModel::Simple => self.mean_ha_dec(time, source, pv.time),
        };

        let (sh, ch) = ha.sin_cos();
        let (sd, cd) = dec.sin_cos();
        let (sl, cl) = self.position.lat.sin_cos();

        pv.ha = ha;
        pv.dc = dec;
        pv.el = (sl * sd + cl * cd * ch).asin();
        // Azimuth from north through east, raw in (-pi, pi].
        pv.az = (-cd * sh).atan2(cl * sd - sl * cd * ch);
    }

    fn mean_ha_dec(&self, time: &TimeSystem, source: &Source, t: u32) -> (f64, f64) {
        let lst = time.gmst_at(t) + self.position.lon;
        (wrap_to_pi(lst - source.ra), source.dec)
    }

    /// Apparent topocentric hour angle and declination: annual aberration,
    /// then the CIP rotation, then the Earth rotation angle. Polar motion is
    /// carried as zero; the scheduler has no a-priori EOP series.
    fn apparent_ha_dec(
        &self,
        time: &TimeSystem,
        astro: &AstroData,
        source: &Source,
        t: u32,
        (x, y, s): (f64, f64, f64),
    ) -> (f64, f64) {
        let (sr, cr) = source.ra.sin_cos();
        let (sd, cd) = source.dec.sin_cos();
        let mut p = [cd * cr, cd * sr, sd];

        // First-order annual aberration.
        for (pi, vi) in p.iter_mut().zip(astro.earth_velocity.iter()) {
            *pi += vi / crate::constants::VEL_C;
        }
        let norm = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        let p = [p[0] / norm, p[1] / norm, p[2] / norm];

        let rc2i = crate::astro::celestial_to_intermediate(x, y, s);
        let cirs = [
            rc2i[0][0] * p[0] + rc2i[0][1] * p[1] + rc2i[0][2] * p[2],
            rc2i[1][0] * p[0] + rc2i[1][1] * p[1] + rc2i[1][2] * p[2],
            rc2i[2][0] * p[0] + rc2i[2][1] * p[1] + rc2i[2][2] * p[2],
        ];

        let era = crate::astro::earth_rotation_angle(time.mjd_at(t));
        let (se, ce) = era.sin_cos();
        let tirs = [
            ce * cirs[0] + se * cirs[1],
            -se * cirs[0] + ce * cirs[1],
            cirs[2],
        ];

        let alpha = tirs[1].atan2(tirs[0]);
        let dec = tirs[2].atan2(tirs[0].hypot(tirs[1]));
        (wrap_to_pi(self.position.lon - alpha), dec)
    }

    /// Whether a pointing is observable: above both the parameter and the
    /// source elevation limit, clear of the horizon mask, and inside the
    /// cable-wrap limits.
    pub fn is_visible(&self, pv: &PointingVector, source_min_el: f64) -> bool {
        if pv.el < self.parameters.min_elevation.max(source_min_el) {
            return false;
        }
        if let Some(mask) = &self.mask {
            if !mask.visible(pv) {
                return false;
            }
        }
        self.cable_wrap.angles_inside(pv)
    }

    /// Unwrap `pv` near the current pointing and return the slew time to it,
    /// or `None` when the pointing is not reachable under the current
    /// parameters.
    pub fn slew_time(&self, pv: &mut PointingVector) -> Option<u32> {
        self.cable_wrap.calc_unwrapped_az(&self.current_pointing, pv);

        let inside = match self.cable_wrap.kind {
            CableWrapKind::AzEl => self.cable_wrap.axis_inside(pv.az, pv.el),
            _ => self.cable_wrap.angles_inside(pv),
        };
        if !inside {
            return None;
        }

        if self.parameters.first_scan {
            return Some(0);
        }

        let distance = angular_distance(
            self.current_pointing.az,
            self.current_pointing.el,
            pv.az,
            pv.el,
        );
        if distance > self.parameters.max_slew_distance
            || distance < self.parameters.min_slew_distance
        {
            return None;
        }

        let t = self.antenna.slew_time(&self.current_pointing, pv);
        if t > self.parameters.max_slew_time {
            return None;
        }
        Some(t)
    }

    /// See [`EventList::check_for_new_event`].
    pub fn check_for_new_event(&mut self, time: u32) -> (bool, bool) {
        self.events.check_for_new_event(time, &mut self.parameters)
    }

    /// Whether the next pending event (at or before `time`) switches this
    /// station into tagalong mode.
    pub fn check_for_tagalong(&self, time: u32) -> bool {
        match self.events.peek_next() {
            Some(event) => event.time <= time && event.parameters.tagalong,
            None => false,
        }
    }

    pub fn reset_events(&mut self) {
        self.events.reset();
    }

    /// The time of the next pending event, if any.
    pub fn events_peek_time(&self) -> Option<u32> {
        self.events.peek_next().map(|e| e.time)
    }

    /// Rewrite the active parameter block and every block on the event
    /// timeline. Multi-schedule sweeps use this for member-scoped overrides.
    pub fn override_parameters(&mut self, f: impl Fn(&mut StationParameters)) {
        f(&mut self.parameters);
        for block in self.events.blocks_mut() {
            f(block);
        }
    }

    /// Bookkeeping after a committed scan: the station now stands where the
    /// scan left it. Counters only move when the scan influences the
    /// schedule (fill-in scans may be configured not to).
    pub fn update(&mut self, n_obs: u32, pv_end: PointingVector, influence: bool) {
        if influence {
            self.n_total_scans += 1;
            self.n_obs += n_obs;
        }
        self.current_pointing = pv_end;
        self.parameters.first_scan = false;
    }

    pub fn clear_observations(&mut self) {
        self.n_total_scans = 0;
        self.n_obs = 0;
        self.statistics = StationStatistics::default();
        let mut park = PointingVector::new(self.current_pointing.staid, NO_SOURCE, 0);
        park.el = FRAC_PI_2;
        self.current_pointing = park;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::AxisType;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn session() -> (TimeSystem, AstroData) {
        let start = chrono::Utc.ymd(2018, 11, 14).and_hms(17, 0, 0);
        let end = chrono::Utc.ymd(2018, 11, 15).and_hms(17, 0, 0);
        let ts = TimeSystem::new(start, end).unwrap();
        let astro = AstroData::precompute(&ts);
        (ts, astro)
    }

    fn equatorial_station() -> Station {
        // On the equator at the Greenwich meridian.
        Station::new(
            0,
            "TEST".to_string(),
            "Ts".to_string(),
            'T',
            Position::new(6_378_137.0, 0.0, 0.0),
            Antenna::new(AxisType::AzEl, 0.0, 20.0, 120.0, 6, 60.0, 6),
            CableWrap::new(CableWrapKind::AzEl, -90.0, 450.0, 5.0, 88.0),
            None,
            Equipment::default(),
        )
    }

    #[test]
    fn source_at_lst_transits_overhead() {
        let (ts, astro) = session();
        let sta = equatorial_station();
        // A source on the celestial equator at RA = LST culminates at the
        // zenith of an equatorial station.
        let ra = ts.gmst_at(3600) + sta.position.lon;
        let source = Source::new("zenith".to_string(), ra, 0.0, Default::default());

        let mut pv = PointingVector::new(0, 0, 3600);
        sta.calc_az_el(AzElModel::Simple, &ts, &astro, &source, &mut pv);
        assert_abs_diff_eq!(pv.el, FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(pv.ha, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rigorous_model_agrees_with_simple_to_arcminutes() {
        let (ts, astro) = session();
        let sta = equatorial_station();
        let source = Source::new("src".to_string(), 2.0, 0.5, Default::default());

        let mut simple = PointingVector::new(0, 0, 7200);
        sta.calc_az_el(AzElModel::Simple, &ts, &astro, &source, &mut simple);
        let mut rigorous = PointingVector::new(0, 0, 7200);
        sta.calc_az_el(AzElModel::Rigorous, &ts, &astro, &source, &mut rigorous);

        // Precession-nutation and aberration amount to well under a degree.
        let dist = angular_distance(simple.az, simple.el, rigorous.az, rigorous.el);
        assert!(dist.to_degrees() < 0.5, "models differ by {dist} rad");
    }

    #[test]
    fn visibility_respects_elevation_and_mask() {
        let mut sta = equatorial_station();
        let mut pv = PointingVector::new(0, 0, 0);
        pv.az = 1.0;
        pv.el = 3_f64.to_radians();
        // Below the default 5 degree limit.
        assert!(!sta.is_visible(&pv, 0.0));
        pv.el = 12_f64.to_radians();
        assert!(sta.is_visible(&pv, 0.0));
        // A stricter source limit wins.
        assert!(!sta.is_visible(&pv, 15_f64.to_radians()));

        sta.mask = HorizonMask::from_interleaved(&[0.0, 20.0, 180.0, 5.0, 360.0]);
        assert!(!sta.is_visible(&pv, 0.0));
        pv.az = 200_f64.to_radians();
        assert!(sta.is_visible(&pv, 0.0));
    }

    #[test]
    fn slew_time_and_reachability() {
        let mut sta = equatorial_station();
        sta.parameters.first_scan = false;
        let mut at = PointingVector::new(0, 0, 0);
        at.az = 0.0;
        at.el = FRAC_PI_2 / 2.0;
        sta.set_current_pointing(at);

        let mut to = PointingVector::new(0, 1, 100);
        to.az = 90_f64.to_radians();
        to.el = FRAC_PI_2 / 2.0;
        let t = sta.slew_time(&mut to).unwrap();
        assert!(t > 0);

        // An elevation outside the axis range is not reachable.
        let mut bad = to;
        bad.el = 89.5_f64.to_radians();
        assert!(sta.slew_time(&mut bad).is_none());

        // A tiny slew violates a minimum slew distance.
        sta.parameters.min_slew_distance = 10_f64.to_radians();
        let mut near = at;
        near.srcid = 1;
        near.az += 0.01;
        assert!(sta.slew_time(&mut near).is_none());
    }

    #[test]
    fn first_scan_costs_nothing() {
        let mut sta = equatorial_station();
        sta.parameters.first_scan = true;
        let mut to = PointingVector::new(0, 1, 100);
        to.az = 170_f64.to_radians();
        to.el = 0.7;
        assert_eq!(sta.slew_time(&mut to), Some(0));
    }
}
