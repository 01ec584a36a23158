// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Station receiving equipment: the per-band system equivalent flux density.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A station's SEFD in one band \[Jy\].
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub enum Sefd {
    Constant(f64),
    /// Elevation-dependent SEFD following the catalog convention
    /// `sefd * max(1, c0 + c1 / sin^y(el))`.
    ElevationDependent { sefd: f64, y: f64, c0: f64, c1: f64 },
}

impl Sefd {
    /// The SEFD at an elevation \[radians\].
    pub fn value(&self, el: f64) -> f64 {
        match *self {
            Sefd::Constant(sefd) => sefd,
            Sefd::ElevationDependent { sefd, y, c0, c1 } => {
                let factor = c0 + c1 / el.sin().powf(y);
                if factor < 1.0 {
                    sefd
                } else {
                    sefd * factor
                }
            }
        }
    }

    /// The nominal (best-case) SEFD, ignoring elevation.
    pub fn nominal(&self) -> f64 {
        match *self {
            Sefd::Constant(sefd) | Sefd::ElevationDependent { sefd, .. } => sefd,
        }
    }
}

/// All bands of one station.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Equipment {
    sefd: HashMap<String, Sefd>,
}

impl Equipment {
    pub fn new(sefd: HashMap<String, Sefd>) -> Equipment {
        Equipment { sefd }
    }

    /// The SEFD in a band at an elevation, or `None` when the station has no
    /// receiver for the band.
    pub fn sefd(&self, band: &str, el: f64) -> Option<f64> {
        self.sefd.get(band).map(|s| s.value(el))
    }

    pub fn has_band(&self, band: &str) -> bool {
        self.sefd.contains_key(band)
    }

    pub fn insert(&mut self, band: String, sefd: Sefd) {
        self.sefd.insert(band, sefd);
    }

    /// The smallest nominal SEFD over all bands, used by backup rules.
    pub fn min_nominal(&self) -> Option<f64> {
        self.sefd
            .values()
            .map(Sefd::nominal)
            .min_by(|a, b| a.partial_cmp(b).unwrap())
    }

    /// The largest nominal SEFD over all bands, used by backup rules.
    pub fn max_nominal(&self) -> Option<f64> {
        self.sefd
            .values()
            .map(Sefd::nominal)
            .max_by(|a, b| a.partial_cmp(b).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_sefd_ignores_elevation() {
        let s = Sefd::Constant(1115.0);
        assert_abs_diff_eq!(s.value(0.1), 1115.0);
        assert_abs_diff_eq!(s.value(1.5), 1115.0);
    }

    #[test]
    fn elevation_dependent_sefd_grows_towards_the_horizon() {
        let s = Sefd::ElevationDependent {
            sefd: 1000.0,
            y: 0.5,
            c0: 0.9,
            c1: 0.2,
        };
        let high = s.value(80_f64.to_radians());
        let low = s.value(10_f64.to_radians());
        assert!(low > high);
        assert_abs_diff_eq!(high, 1000.0 * (0.9 + 0.2 / 80_f64.to_radians().sin().sqrt()));

        // A correction below one is clamped to the nominal value.
        let s = Sefd::ElevationDependent {
            sefd: 1000.0,
            y: 0.5,
            c0: 0.5,
            c1: 0.2,
        };
        assert_abs_diff_eq!(s.value(80_f64.to_radians()), 1000.0);
    }

    #[test]
    fn equipment_lookup() {
        let mut equip = Equipment::default();
        equip.insert("X".to_string(), Sefd::Constant(750.0));
        equip.insert("S".to_string(), Sefd::Constant(1100.0));
        assert_abs_diff_eq!(equip.sefd("X", 1.0).unwrap(), 750.0);
        assert!(equip.sefd("K", 1.0).is_none());
        assert_abs_diff_eq!(equip.min_nominal().unwrap(), 750.0);
        assert_abs_diff_eq!(equip.max_nominal().unwrap(), 1100.0);
    }
}
