// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky coverage: a rolling record of recently observed directions.

Each station (or group of twin telescopes sharing a site) keeps the
directions it observed within the influence window. A proposed pointing is
penalized by its *influence*: the maximum, over the recorded directions, of a
distance falloff times a time falloff. Scoring rewards pointings with low
influence, spreading observations over the local sky.
 */

use serde::Deserialize;

use crate::math::angular_distance;
use crate::pointing::PointingVector;

/// Falloff shape for the influence terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Interpolation {
    Constant,
    Linear,
    Cosine,
}

impl Interpolation {
    /// Falloff factor for `x` of `max`; 0 outside the influence range.
    fn factor(self, x: f64, max: f64) -> f64 {
        if x > max {
            return 0.0;
        }
        match self {
            Interpolation::Constant => 1.0,
            Interpolation::Linear => 1.0 - x / max,
            Interpolation::Cosine => 0.5 + 0.5 * (std::f64::consts::PI * x / max).cos(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SkyCoverageConfig {
    /// Angular distance beyond which a recorded pointing has no influence
    /// \[radians\].
    pub max_influence_distance: f64,
    /// Age beyond which a recorded pointing has no influence \[s\].
    pub max_influence_time: u32,
    pub interpolation_distance: Interpolation,
    pub interpolation_time: Interpolation,
    /// Stations closer than this share one sky-coverage record \[m\].
    pub max_twin_distance: f64,
}

impl Default for SkyCoverageConfig {
    fn default() -> SkyCoverageConfig {
        SkyCoverageConfig {
            max_influence_distance: 30_f64.to_radians(),
            max_influence_time: 3600,
            interpolation_distance: Interpolation::Linear,
            interpolation_time: Interpolation::Linear,
            max_twin_distance: 0.0,
        }
    }
}

/// The rolling direction record of one station or twin group.
#[derive(Clone, Debug)]
pub struct SkyCoverage {
    config: SkyCoverageConfig,
    /// (time, az, el) of committed observation starts.
    pointings: Vec<(u32, f64, f64)>,
}

impl SkyCoverage {
    pub fn new(config: SkyCoverageConfig) -> SkyCoverage {
        SkyCoverage {
            config,
            pointings: vec![],
        }
    }

    /// The influence of the recorded history on a proposed pointing, in
    /// [0, 1]. 0 means untouched sky.
    pub fn influence(&self, pv: &PointingVector) -> f64 {
        let mut max = 0.0_f64;
        for &(time, az, el) in self.pointings.iter().rev() {
            // The record is time-ordered, so everything before the window is
            // out of reach too.
            if pv.time.saturating_sub(time) > self.config.max_influence_time {
                break;
            }
            let dt = f64::from(pv.time.saturating_sub(time));
            let dist = angular_distance(pv.az, pv.el, az, el);
            let f = self
                .config
                .interpolation_distance
                .factor(dist, self.config.max_influence_distance)
                * self
                    .config
                    .interpolation_time
                    .factor(dt, f64::from(self.config.max_influence_time));
            max = max.max(f);
        }
        max
    }

    /// Record a committed pointing.
    pub fn update(&mut self, pv: &PointingVector) {
        self.pointings.push((pv.time, pv.az, pv.el));
        // Keep the record time-ordered even when fill-in scans commit out of
        // order.
        let mut i = self.pointings.len() - 1;
        while i > 0 && self.pointings[i - 1].0 > self.pointings[i].0 {
            self.pointings.swap(i - 1, i);
            i -= 1;
        }
    }

    pub fn clear(&mut self) {
        self.pointings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pv(time: u32, az_deg: f64, el_deg: f64) -> PointingVector {
        let mut pv = PointingVector::new(0, 0, time);
        pv.az = az_deg.to_radians();
        pv.el = el_deg.to_radians();
        pv
    }

    #[test]
    fn fresh_sky_has_no_influence() {
        let sky = SkyCoverage::new(SkyCoverageConfig::default());
        assert_abs_diff_eq!(sky.influence(&pv(100, 180.0, 45.0)), 0.0);
    }

    #[test]
    fn identical_direction_right_away_saturates() {
        let mut sky = SkyCoverage::new(SkyCoverageConfig::default());
        sky.update(&pv(0, 180.0, 45.0));
        assert_abs_diff_eq!(sky.influence(&pv(0, 180.0, 45.0)), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn influence_decays_with_distance_and_time() {
        let mut sky = SkyCoverage::new(SkyCoverageConfig::default());
        sky.update(&pv(0, 180.0, 45.0));

        let near = sky.influence(&pv(0, 185.0, 45.0));
        let far = sky.influence(&pv(0, 205.0, 45.0));
        assert!(near > far);
        assert!(far > 0.0);

        let soon = sky.influence(&pv(600, 180.0, 45.0));
        let late = sky.influence(&pv(3000, 180.0, 45.0));
        assert!(soon > late);

        // Outside both windows nothing remains.
        assert_abs_diff_eq!(sky.influence(&pv(7200, 180.0, 45.0)), 0.0);
        assert_abs_diff_eq!(sky.influence(&pv(0, 180.0, 85.0)), 0.0);
    }

    #[test]
    fn constant_interpolation_is_a_plateau() {
        let config = SkyCoverageConfig {
            interpolation_distance: Interpolation::Constant,
            interpolation_time: Interpolation::Constant,
            ..Default::default()
        };
        let mut sky = SkyCoverage::new(config);
        sky.update(&pv(0, 180.0, 45.0));
        assert_abs_diff_eq!(sky.influence(&pv(1800, 190.0, 40.0)), 1.0, epsilon = 1e-9);
    }
}
