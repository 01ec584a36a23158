// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Horizon masks: a per-azimuth minimum elevation.

use crate::constants::TAU;
use crate::math::wrap_to_two_pi;
use crate::pointing::PointingVector;

/// A horizon mask. Both forms keep a knot at azimuth 2 pi so lookups never
/// run off the end; stations without obstructions simply carry no mask.
#[derive(Clone, Debug, PartialEq)]
pub enum HorizonMask {
    /// Piecewise-constant: `elevation[i]` applies between `azimuth[i]` and
    /// `azimuth[i + 1]`.
    Step {
        azimuth: Vec<f64>,
        elevation: Vec<f64>,
    },
    /// Piecewise-linear between (azimuth, elevation) knots.
    Line {
        azimuth: Vec<f64>,
        elevation: Vec<f64>,
    },
}

impl HorizonMask {
    /// Build a mask from the interleaved az/el sequence of a mask catalog
    /// entry (degrees). An odd number of entries is a step mask, an even
    /// number a line mask, an empty slice no mask at all.
    pub fn from_interleaved(mask_deg: &[f64]) -> Option<HorizonMask> {
        if mask_deg.is_empty() {
            return None;
        }

        let mut azimuth = vec![];
        let mut elevation = vec![];
        for (i, &v) in mask_deg.iter().enumerate() {
            if i % 2 == 0 {
                azimuth.push(v.to_radians());
            } else {
                elevation.push(v.to_radians());
            }
        }
        if *azimuth.last().unwrap() != TAU {
            azimuth.push(TAU);
            elevation.push(*elevation.last().unwrap());
        }

        Some(if mask_deg.len() % 2 == 0 {
            HorizonMask::Line { azimuth, elevation }
        } else {
            HorizonMask::Step { azimuth, elevation }
        })
    }

    /// The mask elevation at an azimuth \[radians\].
    pub fn elevation_at(&self, az: f64) -> f64 {
        let az = wrap_to_two_pi(az);
        match self {
            HorizonMask::Step { azimuth, elevation } => {
                let mut i = 1;
                while i + 1 < azimuth.len() && az > azimuth[i] {
                    i += 1;
                }
                elevation[i - 1]
            }
            HorizonMask::Line { azimuth, elevation } => {
                let mut i = 1;
                while i + 1 < azimuth.len() && az > azimuth[i] {
                    i += 1;
                }
                let delta = az - azimuth[i - 1];
                elevation[i - 1]
                    + (elevation[i] - elevation[i - 1]) / (azimuth[i] - azimuth[i - 1]) * delta
            }
        }
    }

    /// Whether a pointing clears the mask.
    pub fn visible(&self, pv: &PointingVector) -> bool {
        pv.el >= self.elevation_at(pv.az)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn no_mask_from_empty_entry() {
        assert_eq!(HorizonMask::from_interleaved(&[]), None);
    }

    #[test]
    fn step_mask_sectors() {
        // 10 deg up to azimuth 180, then 5 deg.
        let mask = HorizonMask::from_interleaved(&[0.0, 10.0, 180.0, 5.0, 360.0]).unwrap();
        assert!(matches!(mask, HorizonMask::Step { .. }));

        let mut pv = PointingVector::new(0, 0, 0);
        pv.az = 90_f64.to_radians();
        pv.el = 7_f64.to_radians();
        assert!(!mask.visible(&pv));

        pv.az = 200_f64.to_radians();
        assert!(mask.visible(&pv));
    }

    #[test]
    fn line_mask_interpolates() {
        let mask = HorizonMask::from_interleaved(&[0.0, 0.0, 180.0, 20.0]).unwrap();
        assert!(matches!(mask, HorizonMask::Line { .. }));
        assert_abs_diff_eq!(
            mask.elevation_at(90_f64.to_radians()).to_degrees(),
            10.0,
            epsilon = 1e-9
        );
        // Beyond the last catalog knot the mask holds its value.
        assert_abs_diff_eq!(
            mask.elevation_at(270_f64.to_radians()).to_degrees(),
            20.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn azimuth_is_wrapped_before_lookup() {
        let mask = HorizonMask::from_interleaved(&[0.0, 10.0, 180.0, 5.0, 360.0]).unwrap();
        assert_abs_diff_eq!(
            mask.elevation_at((90.0 - 360.0_f64).to_radians()).to_degrees(),
            10.0,
            epsilon = 1e-9
        );
    }
}
