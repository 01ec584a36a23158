// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Cable-wrap geometry.

An azimuth axis with more than a full turn of travel can reach some sky
azimuths two ways. The travel range splits into three sections: a neutral
range reachable only one way, a clockwise overlap at the top and a
counter-clockwise overlap at the bottom. Unwrapped azimuths carry the chosen
turn; the section edges are precomputed at construction so flagging a
pointing is a constant-time range check.
 */

use serde::Deserialize;
use strum_macros::Display;

use crate::constants::TAU;
use crate::pointing::PointingVector;

/// Which cable-wrap section an unwrapped azimuth falls into. The display
/// forms are the single letters used by schedule files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CableWrapFlag {
    /// Counter-clockwise overlap.
    #[strum(serialize = "W")]
    Ccw,
    /// Neutral range.
    #[strum(serialize = "-")]
    Neutral,
    /// Clockwise overlap.
    #[strum(serialize = "C")]
    Cw,
}

/// Which angle pair the axis limits constrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum CableWrapKind {
    AzEl,
    HaDc,
    XYew,
}

#[derive(Clone, Debug)]
pub struct CableWrap {
    pub kind: CableWrapKind,
    axis1_low: f64,
    axis1_up: f64,
    axis2_low: f64,
    axis2_up: f64,

    axis1_low_offset: f64,
    axis1_up_offset: f64,
    axis2_low_offset: f64,
    axis2_up_offset: f64,

    n_low: f64,
    n_up: f64,
    c_low: f64,
    c_up: f64,
    w_low: f64,
    w_up: f64,
}

impl CableWrap {
    /// Limits are given in degrees, the unit of the antenna catalogs.
    pub fn new(
        kind: CableWrapKind,
        axis1_low_deg: f64,
        axis1_up_deg: f64,
        axis2_low_deg: f64,
        axis2_up_deg: f64,
    ) -> CableWrap {
        let axis1_low = axis1_low_deg.to_radians();
        let axis1_up = axis1_up_deg.to_radians();
        let axis2_low = axis2_low_deg.to_radians();
        let axis2_up = axis2_up_deg.to_radians();

        let overlap = match kind {
            CableWrapKind::AzEl => (axis1_up - axis1_low - TAU).max(0.0),
            // Equatorial and x/y mounts have no wrap.
            CableWrapKind::HaDc | CableWrapKind::XYew => 0.0,
        };

        CableWrap {
            kind,
            axis1_low,
            axis1_up,
            axis2_low,
            axis2_up,
            axis1_low_offset: 0.0,
            axis1_up_offset: 0.0,
            axis2_low_offset: 0.0,
            axis2_up_offset: 0.0,
            w_low: axis1_low,
            w_up: axis1_low + overlap,
            n_low: axis1_low + overlap,
            n_up: axis1_up - overlap,
            c_low: axis1_up - overlap,
            c_up: axis1_up,
        }
    }

    /// Safety margins inside the absolute limits, in degrees.
    pub fn set_minimum_offsets(
        &mut self,
        axis1_low_offset: f64,
        axis1_up_offset: f64,
        axis2_low_offset: f64,
        axis2_up_offset: f64,
    ) {
        self.axis1_low_offset = axis1_low_offset.to_radians();
        self.axis1_up_offset = axis1_up_offset.to_radians();
        self.axis2_low_offset = axis2_low_offset.to_radians();
        self.axis2_up_offset = axis2_up_offset.to_radians();
    }

    pub fn n_low(&self) -> f64 {
        self.n_low
    }

    pub fn n_up(&self) -> f64 {
        self.n_up
    }

    /// Unwrap the azimuth of `pv` so that it lies inside the axis-1 limits
    /// and, where the travel range leaves a choice, is closest to `az_old`.
    pub fn unwrap_az_near_az(&self, pv: &mut PointingVector, az_old: f64) {
        if !matches!(self.kind, CableWrapKind::AzEl) {
            return;
        }

        let mut az = pv.az;
        while az > self.axis1_low {
            az -= TAU;
        }
        while az < self.axis1_low {
            az += TAU;
        }

        // Each further full turn that stays below the upper limit is a
        // candidate; walk upwards while it gets us closer to the reference.
        let ambiguities = ((self.axis1_up - az) / TAU).floor() as i64;
        let mut best = az;
        for i in 1..=ambiguities {
            let candidate = az + i as f64 * TAU;
            if (best - az_old).abs() < (candidate - az_old).abs() {
                break;
            }
            best = candidate;
        }
        pv.az = best;
    }

    /// Unwrap the azimuth of `new` closest to the azimuth of `old`.
    pub fn calc_unwrapped_az(&self, old: &PointingVector, new: &mut PointingVector) {
        self.unwrap_az_near_az(new, old.az);
    }

    /// The section of an unwrapped azimuth.
    pub fn flag(&self, unaz: f64) -> CableWrapFlag {
        if unaz < self.n_low {
            CableWrapFlag::Ccw
        } else if unaz <= self.n_up {
            CableWrapFlag::Neutral
        } else {
            CableWrapFlag::Cw
        }
    }

    pub fn flag_of(&self, pv: &PointingVector) -> CableWrapFlag {
        self.flag(pv.az)
    }

    /// Whether a pointing is inside both axis limits including the safety
    /// margins. The azimuth of `pv` may be raw; any turn that fits counts.
    pub fn angles_inside(&self, pv: &PointingVector) -> bool {
        let (ax1, ax2) = match self.kind {
            CableWrapKind::AzEl => (pv.az, pv.el),
            CableWrapKind::HaDc => (pv.ha, pv.dc),
            CableWrapKind::XYew => (pv.az, pv.el),
        };

        match self.kind {
            CableWrapKind::AzEl => {
                let low = self.axis1_low + self.axis1_low_offset;
                let up = self.axis1_up - self.axis1_up_offset;
                // Shift onto the lowest admissible turn and test against the
                // upper limit.
                let mut a = ax1;
                while a > low {
                    a -= TAU;
                }
                while a < low {
                    a += TAU;
                }
                a <= up && self.axis2_contains(ax2)
            }
            CableWrapKind::HaDc | CableWrapKind::XYew => {
                self.axis1_contains(ax1) && self.axis2_contains(ax2)
            }
        }
    }

    /// Whether an already-unwrapped axis-1 angle and an axis-2 angle are
    /// inside the limits including the safety margins.
    pub fn axis_inside(&self, unax1: f64, ax2: f64) -> bool {
        self.axis1_contains(unax1) && self.axis2_contains(ax2)
    }

    fn axis1_contains(&self, ax1: f64) -> bool {
        ax1 >= self.axis1_low + self.axis1_low_offset && ax1 <= self.axis1_up - self.axis1_up_offset
    }

    fn axis2_contains(&self, ax2: f64) -> bool {
        ax2 >= self.axis2_low + self.axis2_low_offset && ax2 <= self.axis2_up - self.axis2_up_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn typical_azel() -> CableWrap {
        CableWrap::new(CableWrapKind::AzEl, -90.0, 450.0, 5.0, 88.0)
    }

    #[test]
    fn sections_of_a_540_degree_wrap() {
        let cw = typical_azel();
        assert_abs_diff_eq!(cw.n_low().to_degrees(), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cw.n_up().to_degrees(), 270.0, epsilon = 1e-9);
        assert_eq!(cw.flag(0_f64.to_radians()), CableWrapFlag::Ccw);
        assert_eq!(cw.flag(180_f64.to_radians()), CableWrapFlag::Neutral);
        assert_eq!(cw.flag(300_f64.to_radians()), CableWrapFlag::Cw);
        assert_eq!(cw.flag(300_f64.to_radians()).to_string(), "C");
    }

    #[test]
    fn unwrap_picks_the_nearest_turn() {
        let cw = typical_azel();
        let mut pv = PointingVector::new(0, 0, 0);
        pv.az = (-20_f64).to_radians();
        cw.unwrap_az_near_az(&mut pv, 300_f64.to_radians());
        assert_abs_diff_eq!(pv.az.to_degrees(), 340.0, epsilon = 1e-9);

        // The same raw azimuth near a reference on the other turn.
        pv.az = (-20_f64).to_radians();
        cw.unwrap_az_near_az(&mut pv, 0.0);
        assert_abs_diff_eq!(pv.az.to_degrees(), -20.0, epsilon = 1e-9);
    }

    #[test]
    fn unwrap_stays_inside_limits() {
        let cw = typical_azel();
        for raw_deg in (-180..180).step_by(7) {
            for old_deg in (-90..450).step_by(13) {
                let mut pv = PointingVector::new(0, 0, 0);
                pv.az = f64::from(raw_deg).to_radians();
                let old = f64::from(old_deg).to_radians();
                cw.unwrap_az_near_az(&mut pv, old);
                assert!(pv.az >= cw.axis1_low - 1e-9 && pv.az <= cw.axis1_up + 1e-9);
                // No other admissible turn is closer to the reference.
                let alt_lo = pv.az - TAU;
                let alt_hi = pv.az + TAU;
                if alt_lo >= cw.axis1_low {
                    assert!((pv.az - old).abs() <= (alt_lo - old).abs());
                }
                if alt_hi <= cw.axis1_up {
                    assert!((pv.az - old).abs() <= (alt_hi - old).abs());
                }
            }
        }
    }

    #[test]
    fn angles_inside_considers_both_turns() {
        let mut cw = typical_azel();
        cw.set_minimum_offsets(5.0, 5.0, 1.0, 1.0);
        let mut pv = PointingVector::new(0, 0, 0);
        pv.el = 45_f64.to_radians();
        pv.az = (-100_f64).to_radians();
        // -100 deg is outside [-85, 445] but 260 deg is inside.
        assert!(cw.angles_inside(&pv));
        pv.el = 89.5_f64.to_radians();
        assert!(!cw.angles_inside(&pv));
    }

    #[test]
    fn hadc_mount_checks_the_equatorial_pair() {
        let cw = CableWrap::new(CableWrapKind::HaDc, -90.0, 90.0, -40.0, 90.0);
        let mut pv = PointingVector::new(0, 0, 0);
        pv.ha = 30_f64.to_radians();
        pv.dc = (-20_f64).to_radians();
        assert!(cw.angles_inside(&pv));
        pv.dc = (-60_f64).to_radians();
        assert!(!cw.angles_inside(&pv));
    }
}
