// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Antenna slewing kinematics.

Each axis follows a trapezoidal velocity profile with a constant overhead:
accelerate, coast at the rate, decelerate, settle. The full antenna slew is
the maximum over the two axes. The mount type decides which angle pair feeds
the axes.
 */

use serde::Deserialize;

use crate::pointing::PointingVector;

/// The mount of an antenna, deciding which angle pair the axes move in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum AxisType {
    /// Azimuth / elevation.
    AzEl,
    /// Hour angle / declination (equatorial).
    HaDc,
    /// x/y with the fixed axis east-west.
    XYew,
}

/// Antenna kinematic parameters.
#[derive(Clone, Debug)]
pub struct Antenna {
    pub axis_type: AxisType,
    /// Axis intersection offset \[m\].
    pub offset: f64,
    /// Dish diameter \[m\].
    pub diam: f64,
    /// Slew rate of the first axis \[rad/s\].
    rate1: f64,
    /// Constant overhead of the first axis \[s\].
    con1: u32,
    /// Slew rate of the second axis \[rad/s\].
    rate2: f64,
    /// Constant overhead of the second axis \[s\].
    con2: u32,
}

impl Antenna {
    /// Rates are given in degrees per minute, the unit of the antenna
    /// catalogs.
    pub fn new(
        axis_type: AxisType,
        offset: f64,
        diam: f64,
        rate1_deg_per_min: f64,
        con1: u32,
        rate2_deg_per_min: f64,
        con2: u32,
    ) -> Antenna {
        Antenna {
            axis_type,
            offset,
            diam,
            rate1: rate1_deg_per_min.to_radians() / 60.0,
            con1,
            rate2: rate2_deg_per_min.to_radians() / 60.0,
            con2,
        }
    }

    /// Slew time between two pointings \[s\].
    ///
    /// Azimuths must already be unwrapped onto the same cable-wrap turn.
    pub fn slew_time(&self, old: &PointingVector, new: &PointingVector) -> u32 {
        let (delta1, delta2) = match self.axis_type {
            AxisType::AzEl => ((old.az - new.az).abs(), (old.el - new.el).abs()),
            AxisType::HaDc => ((old.ha - new.ha).abs(), (old.dc - new.dc).abs()),
            AxisType::XYew => {
                let (x_old, y_old) = xy_ew(old.az, old.el);
                let (x_new, y_new) = xy_ew(new.az, new.el);
                ((x_old - x_new).abs(), (y_old - y_new).abs())
            }
        };

        let t1 = slew_time_per_axis(delta1, self.rate1, self.con1);
        let t2 = slew_time_per_axis(delta2, self.rate2, self.con2);
        t1.max(t2)
    }
}

/// (x, y) angles of an east-west mount for an (az, el) direction.
fn xy_ew(az: f64, el: f64) -> (f64, f64) {
    let cel = el.cos();
    let x = (cel * az.cos()).atan2(el.sin());
    let y = (cel * az.sin()).asin();
    (x, y)
}

/// Trapezoidal single-axis slew time.
///
/// The acceleration is taken equal to the rate (in rad/s^2); the original
/// scheduling software does the same and antenna catalogs carry no
/// acceleration column, so the value is a stand-in.
fn slew_time_per_axis(delta: f64, rate: f64, overhead: u32) -> u32 {
    let acc = rate;
    let t_acc = rate / acc;
    let s_acc = acc * t_acc * t_acc;

    let t = if delta < s_acc {
        2.0 * (delta / acc).sqrt()
    } else {
        2.0 * t_acc + (delta - s_acc) / rate
    };

    t.ceil() as u32 + overhead
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PI;

    fn rate(deg_per_min: f64) -> f64 {
        deg_per_min.to_radians() / 60.0
    }

    #[test]
    fn zero_delta_costs_only_the_overhead() {
        assert_eq!(slew_time_per_axis(0.0, rate(120.0), 6), 6);
    }

    #[test]
    fn slew_time_is_monotonic_in_delta() {
        let r = rate(120.0);
        let mut last = 0;
        for i in 0..=180 {
            let delta = f64::from(i).to_radians();
            let t = slew_time_per_axis(delta, r, 6);
            assert!(t >= last, "slew time decreased at delta = {i} deg");
            last = t;
        }
    }

    #[test]
    fn branch_switch_at_the_acceleration_distance() {
        // With acc = rate the bang-bang branch ends at delta = rate
        // (numerically, rate * (rate/acc)^2).
        let r = rate(120.0);
        let below = slew_time_per_axis(r * 0.99, r, 0);
        let at = slew_time_per_axis(r, r, 0);
        // Both formulas agree at the switch point: t = 2 s.
        assert_eq!(below, 2);
        assert_eq!(at, 2);
    }

    #[test]
    fn ninety_degree_slew() {
        // 120 deg/min, overhead 6 s, 90 deg: 2 s of acceleration phases plus
        // 88 deg of coasting at 2 deg/s.
        let t = slew_time_per_axis(90_f64.to_radians(), rate(120.0), 6);
        assert_eq!(t, 52);
    }

    #[test]
    fn equatorial_mount_slews_in_hour_angle_and_declination() {
        let ant = Antenna::new(AxisType::HaDc, 0.0, 26.0, 120.0, 6, 60.0, 6);
        let mut old = PointingVector::new(0, 0, 0);
        old.ha = 0.0;
        old.dc = 0.3;
        // A large azimuth difference is irrelevant for this mount.
        old.az = 0.0;
        let mut new = PointingVector::new(0, 1, 0);
        new.ha = 30_f64.to_radians();
        new.dc = 0.3;
        new.az = PI;
        // 30 deg of hour angle at 120 deg/min: 2 s of acceleration phases
        // plus 28 deg of coasting.
        assert_eq!(ant.slew_time(&old, &new), 22);
    }

    #[test]
    fn east_west_mount_converts_to_xy() {
        // x = atan2(cos el cos az, sin el): moving from el 45 to el 60 on
        // the meridian is a pure 15 degree x motion.
        let ant = Antenna::new(AxisType::XYew, 0.0, 20.0, 120.0, 6, 60.0, 6);
        let mut old = PointingVector::new(0, 0, 0);
        old.az = 0.0;
        old.el = 45_f64.to_radians();
        let mut new = PointingVector::new(0, 1, 0);
        new.az = 0.0;
        new.el = 60_f64.to_radians();
        assert_eq!(ant.slew_time(&old, &new), 15);
    }

    #[test]
    fn full_antenna_slew_is_the_slower_axis() {
        let ant = Antenna::new(AxisType::AzEl, 0.0, 20.0, 120.0, 6, 60.0, 6);
        let mut old = PointingVector::new(0, 0, 0);
        old.az = 0.0;
        old.el = PI / 4.0;
        let mut new = PointingVector::new(0, 1, 0);
        new.az = PI / 2.0;
        new.el = PI / 4.0 + 30_f64.to_radians();
        // Azimuth: 90 deg at 120 deg/min -> 52 s. Elevation: 30 deg at
        // 60 deg/min -> 2 + 29/1 = 31 -> 37 s.
        assert_eq!(ant.slew_time(&old, &new), 52);
    }
}
