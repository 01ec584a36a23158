// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weight factors of the scan scoring function.
//!
//! One record per schedule worker; the multi-schedule sweep hands each worker
//! its own copy.

use serde::Deserialize;

use crate::constants::FRAC_PI_2;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WeightFactors {
    /// Weight of sky-coverage improvement.
    pub sky_coverage: f64,
    /// Weight of the number of observations.
    pub number_of_observations: f64,
    /// Weight of (short) scan duration.
    pub duration: f64,
    /// Weight of evenly observing all sources.
    pub average_sources: f64,
    /// Weight of evenly using all stations.
    pub average_stations: f64,
    /// Weight of evenly using all baselines.
    pub average_baselines: f64,
    /// Weight of putting long-idle stations back to work.
    pub idle_time: f64,
    /// Idle time treated as "long" for the idle term \[s\].
    pub idle_time_interval: u32,

    /// Weight of low-declination scans.
    pub declination: f64,
    /// Declination above which the declination term is zero \[radians\].
    pub declination_start: f64,
    /// Declination below which the declination term is one \[radians\].
    pub declination_full: f64,

    /// Weight of low-elevation scans.
    pub low_elevation: f64,
    /// Elevation above which the low-elevation term is zero \[radians\].
    pub low_elevation_start: f64,
    /// Elevation below which the low-elevation term is one \[radians\].
    pub low_elevation_full: f64,
}

impl Default for WeightFactors {
    fn default() -> WeightFactors {
        WeightFactors {
            sky_coverage: 0.02,
            number_of_observations: 0.02,
            duration: 0.02,
            average_sources: 0.05,
            average_stations: 0.05,
            average_baselines: 0.0,
            idle_time: 0.0,
            idle_time_interval: 300,
            declination: 0.0,
            declination_start: 0.0,
            declination_full: -FRAC_PI_2,
            low_elevation: 0.0,
            low_elevation_start: 30_f64.to_radians(),
            low_elevation_full: 20_f64.to_radians(),
        }
    }
}

impl WeightFactors {
    /// A ramp that is 0 above `start`, 1 below `full` and linear in between;
    /// used for both the declination and the low-elevation terms.
    pub fn ramp(value: f64, start: f64, full: f64) -> f64 {
        if value > start {
            0.0
        } else if value < full {
            1.0
        } else {
            (start - value) / (start - full)
        }
    }
}
