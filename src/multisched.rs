// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Multi-schedule sweeps.

A sweep declares a list of values per parameter; the expander builds the
cartesian product into concrete parameter sets. When the product exceeds the
configured cap, a seeded shuffle picks the subset, so the same seed always
yields the same schedules. Each parameter set is applied to a copy of the
base `SessionConfig` plus the worker's own network and source copies, and
scheduled by an independent worker.

Two kinds of parameters can be swept:

* session-global scalars (weight factors, sky-coverage influence,
  subnetting thresholds), applied to the `SessionConfig`;
* member-scoped entity parameters such as `station_max_slew_time.Wz` or
  `source_min_flux`, applied to the per-entity parameter blocks (event
  timelines included). The optional `.member` suffix names one station (by
  two-letter code or name), source or baseline; without it the override
  applies to every entity of its kind. Angles are radians, times seconds.
 */

use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use rand::prelude::*;
use rayon::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use crate::baseline::BaselineParameters;
use crate::config::{SessionConfig, SubnettingConfig};
use crate::network::Network;
use crate::source::{Source, SourceParameters};
use crate::station::StationParameters;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultiSchedError {
    #[error("multi-scheduling parameter {0} has no values")]
    EmptyDimension(String),

    #[error("multi-scheduling declares no parameters")]
    NoDimensions,
}

/// One concrete parameter assignment.
pub type ParameterSet = Vec<(String, f64)>;

#[derive(Clone, Debug, Deserialize)]
pub struct MultiScheduling {
    /// Parameter name (with optional `.member` suffix) -> values to sweep,
    /// in declaration order.
    pub dimensions: IndexMap<String, Vec<f64>>,
    /// Cap on the number of generated schedules.
    #[serde(default = "default_max_number")]
    pub max_number: usize,
    /// Seed for the subset selection when the product exceeds the cap.
    #[serde(default)]
    pub seed: u64,
}

fn default_max_number() -> usize {
    999
}

impl MultiScheduling {
    /// Expand the sweep into concrete parameter sets.
    pub fn create_parameter_sets(&self) -> Result<Vec<ParameterSet>, MultiSchedError> {
        if self.dimensions.is_empty() {
            return Err(MultiSchedError::NoDimensions);
        }
        for (name, values) in &self.dimensions {
            if values.is_empty() {
                return Err(MultiSchedError::EmptyDimension(name.clone()));
            }
        }

        let names: Vec<&String> = self.dimensions.keys().collect();
        let mut sets: Vec<ParameterSet> = self
            .dimensions
            .values()
            .map(|v| v.iter().copied())
            .multi_cartesian_product()
            .map(|values| {
                names
                    .iter()
                    .zip(values)
                    .map(|(name, value)| ((*name).clone(), value))
                    .collect()
            })
            .collect();

        if sets.len() > self.max_number {
            let mut rng = StdRng::seed_from_u64(self.seed);
            sets.shuffle(&mut rng);
            sets.truncate(self.max_number);
        }
        Ok(sets)
    }

    /// Whether a parameter name addresses per-entity parameter blocks (it
    /// is then handled by [`MultiScheduling::apply_to_entities`]).
    fn is_member_scoped(name: &str) -> bool {
        let key = name.split_once('.').map_or(name, |(k, _)| k);
        key.starts_with("station_") || key.starts_with("source_") || key.starts_with("baseline_")
    }

    /// Apply the session-global entries of one parameter set to a copy of
    /// the base configuration.
    pub fn apply(base: &SessionConfig, set: &ParameterSet) -> SessionConfig {
        let mut config = base.clone();
        for (name, value) in set {
            match name.as_str() {
                "weight_sky_coverage" => config.weights.sky_coverage = *value,
                "weight_number_of_observations" => {
                    config.weights.number_of_observations = *value
                }
                "weight_duration" => config.weights.duration = *value,
                "weight_average_sources" => config.weights.average_sources = *value,
                "weight_average_stations" => config.weights.average_stations = *value,
                "weight_average_baselines" => config.weights.average_baselines = *value,
                "weight_idle_time" => config.weights.idle_time = *value,
                "weight_idle_time_interval" => {
                    config.weights.idle_time_interval = *value as u32
                }
                "weight_declination" => config.weights.declination = *value,
                "weight_declination_start" => config.weights.declination_start = *value,
                "weight_declination_full" => config.weights.declination_full = *value,
                "weight_low_elevation" => config.weights.low_elevation = *value,
                "weight_low_elevation_start" => {
                    config.weights.low_elevation_start = *value
                }
                "weight_low_elevation_full" => config.weights.low_elevation_full = *value,
                // Flags sweep as 0/1.
                "subnetting" => {
                    if *value != 0.0 {
                        config.subnetting.get_or_insert_with(SubnettingConfig::default);
                    } else {
                        config.subnetting = None;
                    }
                }
                "fillin_mode_during_scan_selection" => {
                    config.fillin_mode_during_scan_selection = *value != 0.0
                }
                "fillin_mode_influence_on_schedule" => {
                    config.fillin_mode_influence_on_schedule = *value != 0.0
                }
                "fillin_mode_a_posteriori" => {
                    config.fillin_mode_a_posteriori = *value != 0.0
                }
                "sky_coverage_influence_distance" => {
                    config.sky_coverage.max_influence_distance = *value
                }
                "sky_coverage_influence_time" => {
                    config.sky_coverage.max_influence_time = *value as u32
                }
                "subnetting_min_angle" => {
                    if let Some(sub) = &mut config.subnetting {
                        sub.min_angle = *value;
                    }
                }
                "subnetting_min_station_count" => {
                    if let Some(sub) = &mut config.subnetting {
                        sub.min_station_count = *value as usize;
                    }
                }
                _ if Self::is_member_scoped(name) => {}
                _ => warn!("multi-scheduling parameter {name} is not known; ignored"),
            }
        }
        config
    }

    /// Apply the member-scoped entries of one parameter set to the worker's
    /// network and source copies.
    pub fn apply_to_entities(set: &ParameterSet, network: &mut Network, sources: &mut [Source]) {
        for (name, value) in set {
            let (key, member) = match name.split_once('.') {
                Some((key, member)) => (key, Some(member)),
                None => (name.as_str(), None),
            };
            let v = *value;
            match key {
                "station_weight" => Self::stations(network, member, |p| p.weight = v),
                "station_min_scan" => Self::stations(network, member, |p| p.min_scan = v as u32),
                "station_max_scan" => Self::stations(network, member, |p| p.max_scan = v as u32),
                "station_max_slew_time" => {
                    Self::stations(network, member, |p| p.max_slew_time = v as u32)
                }
                "station_max_slew_distance" => {
                    Self::stations(network, member, |p| p.max_slew_distance = v)
                }
                "station_min_slew_distance" => {
                    Self::stations(network, member, |p| p.min_slew_distance = v)
                }
                "station_max_wait" => Self::stations(network, member, |p| p.max_wait = v as u32),
                "station_min_elevation" => {
                    Self::stations(network, member, |p| p.min_elevation = v)
                }
                "source_weight" => Self::sources(sources, member, |p| p.weight = v),
                "source_min_scan" => Self::sources(sources, member, |p| p.min_scan = v as u32),
                "source_max_scan" => Self::sources(sources, member, |p| p.max_scan = v as u32),
                "source_min_repeat" => {
                    Self::sources(sources, member, |p| p.min_repeat = v as u32)
                }
                "source_max_number_of_scans" => {
                    Self::sources(sources, member, |p| p.max_number_of_scans = v as u32)
                }
                "source_min_number_of_stations" => {
                    Self::sources(sources, member, |p| p.min_number_of_stations = v as usize)
                }
                "source_min_flux" => Self::sources(sources, member, |p| p.min_flux = v),
                "source_min_elevation" => {
                    Self::sources(sources, member, |p| p.min_elevation = v)
                }
                "source_min_sun_distance" => {
                    Self::sources(sources, member, |p| p.min_sun_distance = v)
                }
                "baseline_weight" => Self::baselines(network, member, |p| p.weight = v),
                "baseline_min_scan" => {
                    Self::baselines(network, member, |p| p.min_scan = v as u32)
                }
                "baseline_max_scan" => {
                    Self::baselines(network, member, |p| p.max_scan = v as u32)
                }
                _ if Self::is_member_scoped(name) => {
                    warn!("multi-scheduling parameter {name} is not known; ignored")
                }
                // Session-global keys were handled by `apply`.
                _ => {}
            }
        }
    }

    fn stations(
        network: &mut Network,
        member: Option<&str>,
        f: impl Fn(&mut StationParameters),
    ) {
        let mut matched = false;
        for station in &mut network.stations {
            if member.map_or(true, |m| station.code == m || station.name == m) {
                station.override_parameters(&f);
                matched = true;
            }
        }
        if !matched {
            warn!("multi-scheduling: no station matches {member:?}");
        }
    }

    fn sources(sources: &mut [Source], member: Option<&str>, f: impl Fn(&mut SourceParameters)) {
        let mut matched = false;
        for source in sources.iter_mut() {
            if member.map_or(true, |m| {
                source.name == m || source.alt_name.as_deref() == Some(m)
            }) {
                source.override_parameters(&f);
                matched = true;
            }
        }
        if !matched {
            warn!("multi-scheduling: no source matches {member:?}");
        }
    }

    fn baselines(
        network: &mut Network,
        member: Option<&str>,
        f: impl Fn(&mut BaselineParameters),
    ) {
        let mut matched = false;
        for baseline in &mut network.baselines {
            if member.map_or(true, |m| baseline.name == m) {
                baseline.override_parameters(&f);
                matched = true;
            }
        }
        if !matched {
            warn!("multi-scheduling: no baseline matches {member:?}");
        }
    }

    /// Run one closure per parameter set on the rayon pool. The closure gets
    /// the variant index, its global configuration and the parameter set so
    /// it can apply the member-scoped entries to its own entity copies.
    pub fn run_parallel<R, F>(base: &SessionConfig, sets: &[ParameterSet], run: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, SessionConfig, &ParameterSet) -> R + Sync,
    {
        sets.par_iter()
            .enumerate()
            .map(|(version, set)| run(version, Self::apply(base, set), set))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> MultiScheduling {
        let mut dimensions = IndexMap::new();
        dimensions.insert("weight_sky_coverage".to_string(), vec![0.0, 0.5, 1.0]);
        dimensions.insert("weight_duration".to_string(), vec![0.1, 0.2]);
        MultiScheduling {
            dimensions,
            max_number: 999,
            seed: 42,
        }
    }

    #[test]
    fn cartesian_product_expansion() {
        let sets = sweep().create_parameter_sets().unwrap();
        assert_eq!(sets.len(), 6);
        // Declaration order is preserved inside each set.
        assert_eq!(sets[0][0].0, "weight_sky_coverage");
        assert_eq!(sets[0][1].0, "weight_duration");
        // All combinations are distinct.
        let unique: std::collections::HashSet<String> =
            sets.iter().map(|s| format!("{s:?}")).collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn seeded_truncation_is_deterministic() {
        let mut sweep_a = sweep();
        sweep_a.max_number = 3;
        let sets_a = sweep_a.create_parameter_sets().unwrap();
        let sets_b = sweep_a.create_parameter_sets().unwrap();
        assert_eq!(sets_a.len(), 3);
        assert_eq!(format!("{sets_a:?}"), format!("{sets_b:?}"));

        // A different seed picks a different subset (with overwhelming
        // probability for this sweep).
        let mut sweep_c = sweep();
        sweep_c.max_number = 3;
        sweep_c.seed = 43;
        let sets_c = sweep_c.create_parameter_sets().unwrap();
        assert_eq!(sets_c.len(), 3);
    }

    #[test]
    fn empty_dimension_is_an_error() {
        let mut bad = sweep();
        bad.dimensions.insert("weight_idle_time".to_string(), vec![]);
        assert!(matches!(
            bad.create_parameter_sets(),
            Err(MultiSchedError::EmptyDimension(_))
        ));
        let none = MultiScheduling {
            dimensions: IndexMap::new(),
            max_number: 10,
            seed: 0,
        };
        assert_eq!(none.create_parameter_sets(), Err(MultiSchedError::NoDimensions));
    }

    #[test]
    fn apply_overrides_the_base_config() {
        use crate::obsmode::ObservingMode;
        use chrono::TimeZone;

        let start = chrono::Utc.ymd(2018, 11, 14).and_hms(17, 0, 0);
        let end = chrono::Utc.ymd(2018, 11, 15).and_hms(17, 0, 0);
        let base = SessionConfig::new(
            start,
            end,
            ObservingMode::single_band("X", 0.0349, 16, 32.0, 2),
        );

        let set = vec![
            ("weight_sky_coverage".to_string(), 0.7),
            ("sky_coverage_influence_time".to_string(), 1800.0),
            // Member-scoped entries pass through untouched here.
            ("station_max_wait".to_string(), 600.0),
        ];
        let config = MultiScheduling::apply(&base, &set);
        assert_eq!(config.weights.sky_coverage, 0.7);
        assert_eq!(config.sky_coverage.max_influence_time, 1800);
        // The base is untouched.
        assert_eq!(base.weights.sky_coverage, 0.02);
    }

    #[test]
    fn member_scoped_overrides_reach_entities() {
        use crate::tests::{source_at, two_station_network};

        let mut network = two_station_network();
        let mut sources = vec![source_at(0.0, 0.0)];

        let set = vec![
            // One member by its two-letter code.
            ("station_weight.Bb".to_string(), 3.0),
            // Every station.
            ("station_max_wait".to_string(), 600.0),
            ("source_min_flux".to_string(), 0.25),
            ("baseline_min_scan.Aa-Bb".to_string(), 40.0),
            // A global key is simply not an entity override.
            ("weight_duration".to_string(), 0.5),
        ];
        MultiScheduling::apply_to_entities(&set, &mut network, &mut sources);

        assert_eq!(network.stations[0].parameters.weight, 1.0);
        assert_eq!(network.stations[1].parameters.weight, 3.0);
        assert_eq!(network.stations[0].parameters.max_wait, 600);
        assert_eq!(network.stations[1].parameters.max_wait, 600);
        assert_eq!(sources[0].parameters.min_flux, 0.25);
        assert_eq!(network.baselines[0].parameters.min_scan, 40);

        // The override survives the event at the session start: the event
        // blocks were rewritten too.
        network.stations[1].check_for_new_event(0);
        assert_eq!(network.stations[1].parameters.weight, 3.0);
        sources[0].check_for_new_event(0);
        assert_eq!(sources[0].parameters.min_flux, 0.25);
    }
}
