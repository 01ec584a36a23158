// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Radio sources and their flux models.

A source carries one flux model per band. Model B tabulates flux against
projected baseline length; model M is a sum of elliptical Gaussian
components, stored columnar so evaluating a scan is a flat reduction with no
allocation.
 */

use std::collections::HashMap;

use serde::Deserialize;

use crate::astro::{separation, AstroData};
use crate::constants::{GAUSSIAN_VIS_FACTOR, MAS2RAD};
use crate::event::EventList;

/// A per-band flux model.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub enum Flux {
    /// Flux tabulated against projected baseline length; linear in between,
    /// clamped at the ends.
    B {
        /// Projected baseline lengths \[m\], ascending.
        knots: Vec<f64>,
        /// Flux at each knot \[Jy\].
        values: Vec<f64>,
    },
    /// A sum of elliptical Gaussian components.
    M {
        /// Component fluxes \[Jy\].
        flux: Vec<f64>,
        /// Major axes (FWHM) \[mas\].
        major_axis: Vec<f64>,
        /// Minor-to-major axial ratios.
        axial_ratio: Vec<f64>,
        /// Position angles \[radians\].
        position_angle: Vec<f64>,
    },
}

impl Flux {
    /// The flux observed on a baseline with uv coordinates (u, v) \[m\] at a
    /// wavelength \[m\].
    pub fn observed_flux(&self, u: f64, v: f64, wavelength: f64) -> f64 {
        match self {
            Flux::B { knots, values } => {
                let length = u.hypot(v);
                if length <= knots[0] {
                    return values[0];
                }
                if length >= *knots.last().unwrap() {
                    return *values.last().unwrap();
                }
                let i = knots.partition_point(|&k| k < length);
                let frac = (length - knots[i - 1]) / (knots[i] - knots[i - 1]);
                values[i - 1] + (values[i] - values[i - 1]) * frac
            }
            Flux::M {
                flux,
                major_axis,
                axial_ratio,
                position_angle,
            } => {
                let u_l = u / wavelength;
                let v_l = v / wavelength;
                let mut total = 0.0;
                for i in 0..flux.len() {
                    let pa = position_angle[i];
                    let major = major_axis[i] * MAS2RAD;
                    let minor = major * axial_ratio[i];
                    let up = u_l * pa.sin() + v_l * pa.cos();
                    let vp = u_l * pa.cos() - v_l * pa.sin();
                    let arg = -GAUSSIAN_VIS_FACTOR
                        * ((major * up).powi(2) + (minor * vp).powi(2));
                    total += flux[i] * arg.exp();
                }
                total
            }
        }
    }

    /// An upper bound on the observable flux, for cheap minimum-flux gating.
    pub fn max_flux(&self) -> f64 {
        match self {
            Flux::B { values, .. } => values.iter().cloned().fold(0.0, f64::max),
            Flux::M { flux, .. } => flux.iter().sum(),
        }
    }
}

/// The active policy of one source.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SourceParameters {
    pub available: bool,
    /// Cleared by the optimization loop when the source failed its
    /// conditions; never set by ordinary events.
    pub global_available: bool,
    /// Explicit scoring weight.
    pub weight: f64,
    /// Minimum observing time \[s\].
    pub min_scan: u32,
    /// Maximum observing time \[s\].
    pub max_scan: u32,
    /// Minimum time between two scans of this source \[s\].
    pub min_repeat: u32,
    /// Hard cap on scans of this source.
    pub max_number_of_scans: u32,
    /// Minimum number of participating stations.
    pub min_number_of_stations: usize,
    /// Sources weaker than this are not scheduled \[Jy\].
    pub min_flux: f64,
    /// Minimum elevation at every participating station \[radians\].
    pub min_elevation: f64,
    /// Minimum angular distance to the Sun \[radians\].
    pub min_sun_distance: f64,
    /// Boost the weight once the source has been observed, to focus repeats.
    pub try_to_focus_if_observed_once: bool,
    /// Weight multiplier applied when focusing.
    pub try_to_focus_factor: f64,
    /// Overrides the SNR-derived observing time.
    pub fixed_scan_duration: Option<u32>,
    /// Stations that must not observe this source.
    pub ignore_stations: Vec<usize>,
    /// Baselines that must not observe this source.
    pub ignore_baselines: Vec<usize>,
    /// Stations that must all participate, or the scan is dropped.
    pub required_stations: Vec<usize>,
    /// Required SNR per band.
    pub min_snr: HashMap<String, f64>,
}

impl Default for SourceParameters {
    fn default() -> SourceParameters {
        SourceParameters {
            available: true,
            global_available: true,
            weight: 1.0,
            min_scan: 20,
            max_scan: 600,
            min_repeat: 1800,
            max_number_of_scans: 9999,
            min_number_of_stations: 2,
            min_flux: 0.0,
            min_elevation: 0.0,
            min_sun_distance: 4_f64.to_radians(),
            try_to_focus_if_observed_once: false,
            try_to_focus_factor: 1.0,
            fixed_scan_duration: None,
            ignore_stations: vec![],
            ignore_baselines: vec![],
            required_stations: vec![],
            min_snr: HashMap::new(),
        }
    }
}

/// Per-source conditions checked by the optimization loop.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceOptimization {
    pub min_num_scans: u32,
    pub min_num_obs: u32,
}

/// Per-source statistics, rebuilt by the check routine.
#[derive(Clone, Debug, Default)]
pub struct SourceStatistics {
    pub scan_start_times: Vec<u32>,
    pub total_observing_time: u32,
}

#[derive(Clone, Debug)]
pub struct Source {
    pub name: String,
    /// Common (IAU designation) alternative name, if any.
    pub alt_name: Option<String>,
    /// Right ascension \[radians\].
    pub ra: f64,
    /// Declination \[radians\].
    pub dec: f64,
    /// Flux model per band.
    pub flux: HashMap<String, Flux>,

    pub parameters: SourceParameters,
    events: EventList<SourceParameters>,
    pub optimization: SourceOptimization,

    /// Observing start of the last committed scan of this source.
    pub last_scan_time: u32,
    pub n_total_scans: u32,
    pub n_obs: u32,
    pub statistics: SourceStatistics,
}

impl Source {
    pub fn new(name: String, ra: f64, dec: f64, flux: HashMap<String, Flux>) -> Source {
        let parameters = SourceParameters::default();
        Source {
            name,
            alt_name: None,
            ra,
            dec,
            flux,
            events: EventList::single(parameters.clone()),
            parameters,
            optimization: SourceOptimization::default(),
            last_scan_time: 0,
            n_total_scans: 0,
            n_obs: 0,
            statistics: SourceStatistics::default(),
        }
    }

    pub fn set_events(&mut self, events: EventList<SourceParameters>) {
        self.events = events;
    }

    /// The flux observed in a band on the baseline `dxyz` \[m\] at a given
    /// GMST. Returns `None` when the source has no model for the band.
    pub fn observed_flux(
        &self,
        band: &str,
        wavelength: f64,
        gmst: f64,
        dxyz: [f64; 3],
    ) -> Option<f64> {
        let model = self.flux.get(band)?;
        let ha = gmst - self.ra;
        let (sh, ch) = ha.sin_cos();
        let (sd, cd) = self.dec.sin_cos();
        let [dx, dy, dz] = dxyz;
        let u = sh * dx + ch * dy;
        let v = -sd * ch * dx + sd * sh * dy + cd * dz;
        Some(model.observed_flux(u, v, wavelength))
    }

    /// An upper bound on the observable flux over all bands.
    pub fn max_flux(&self) -> f64 {
        self.flux.values().map(Flux::max_flux).fold(0.0, f64::max)
    }

    /// Angular distance to the Sun at the session mid-time.
    pub fn sun_distance(&self, astro: &AstroData) -> f64 {
        separation(self.ra, self.dec, astro.sun_ra, astro.sun_dec)
    }

    /// Angular distance to another source.
    pub fn angle_to(&self, other: &Source) -> f64 {
        separation(self.ra, self.dec, other.ra, other.dec)
    }

    /// Bookkeeping after a scan of this source is committed. Counters only
    /// move when the scan influences the schedule.
    pub fn update(&mut self, n_obs: u32, scan_start: u32, influence: bool) {
        if influence {
            self.n_total_scans += 1;
            self.n_obs += n_obs;
            self.last_scan_time = scan_start;
        }
    }

    /// See [`EventList::check_for_new_event`].
    pub fn check_for_new_event(&mut self, time: u32) -> (bool, bool) {
        let global = self.parameters.global_available;
        let (changed, hard) = self.events.check_for_new_event(time, &mut self.parameters);
        // The optimization verdict survives every ordinary event.
        self.parameters.global_available = global;
        (changed, hard)
    }

    pub fn reset_events(&mut self) {
        self.events.reset();
    }

    /// Rewrite the active parameter block and every block on the event
    /// timeline. Multi-schedule sweeps use this for member-scoped overrides.
    pub fn override_parameters(&mut self, f: impl Fn(&mut SourceParameters)) {
        f(&mut self.parameters);
        for block in self.events.blocks_mut() {
            f(block);
        }
    }

    pub fn clear_observations(&mut self) {
        self.last_scan_time = 0;
        self.n_total_scans = 0;
        self.n_obs = 0;
        self.statistics = SourceStatistics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn flux_b_interpolates_and_clamps() {
        let model = Flux::B {
            knots: vec![0.0, 3000e3, 6000e3],
            values: vec![2.0, 1.0, 0.4],
        };
        assert_abs_diff_eq!(model.observed_flux(0.0, 0.0, 0.035), 2.0);
        assert_abs_diff_eq!(model.observed_flux(1500e3, 0.0, 0.035), 1.5, epsilon = 1e-9);
        // Beyond the last knot the last value holds.
        assert_abs_diff_eq!(model.observed_flux(9000e3, 0.0, 0.035), 0.4);
        assert_abs_diff_eq!(model.max_flux(), 2.0);
    }

    #[test]
    fn flux_m_point_source_is_flat() {
        // A vanishingly small component resolves nowhere.
        let model = Flux::M {
            flux: vec![1.4],
            major_axis: vec![1e-6],
            axial_ratio: vec![1.0],
            position_angle: vec![0.0],
        };
        assert_abs_diff_eq!(
            model.observed_flux(8000e3, 2000e3, 0.035),
            1.4,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(model.max_flux(), 1.4);
    }

    #[test]
    fn flux_m_resolves_with_baseline_length() {
        let model = Flux::M {
            flux: vec![1.0],
            major_axis: vec![0.5],
            axial_ratio: vec![1.0],
            position_angle: vec![0.0],
        };
        let short = model.observed_flux(500e3, 0.0, 0.035);
        let long = model.observed_flux(8000e3, 0.0, 0.035);
        assert!(short > long, "short {short} long {long}");
        assert!(long > 0.0);
    }

    #[test]
    fn observed_flux_depends_on_hour_angle() {
        let mut flux = HashMap::new();
        flux.insert(
            "X".to_string(),
            Flux::B {
                knots: vec![0.0, 6000e3],
                values: vec![2.0, 0.5],
            },
        );
        let source = Source::new("test".to_string(), 0.0, 0.3, flux);
        // An east-west baseline projects fully at hour angle 0 and shrinks
        // towards the horizon.
        let dxyz = [0.0, 6000e3, 0.0];
        let transit = source.observed_flux("X", 0.035, 0.0, dxyz).unwrap();
        let rising = source
            .observed_flux("X", 0.035, -1.4 + source.ra, dxyz)
            .unwrap();
        assert!(transit < rising, "transit {transit} rising {rising}");
        assert!(source.observed_flux("K", 0.035, 0.0, dxyz).is_none());
    }
}
