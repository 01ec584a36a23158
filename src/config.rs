// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The per-schedule parameter record.

One `SessionConfig` holds everything a single schedule run needs beyond the
catalogs: the observing window, the scan alignment anchor, subnetting and
fill-in policy, weight factors, the observing mode, and the optional scan
sequence / calibrator / high-impact rules. A multi-schedule sweep clones and
tweaks this record per worker; nothing in it is shared mutable state.

The external configuration layer deserializes this record from its document
format and installs per-entity parameter events directly on the stations,
sources and baselines.
 */

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::calibrator::CalibratorBlock;
use crate::himp::HighImpactConfig;
use crate::obsmode::ObservingMode;
use crate::scan::times::AlignmentAnchor;
use crate::skycov::SkyCoverageConfig;
use crate::weights::WeightFactors;

/// Subnetting policy.
#[derive(Clone, Debug, Deserialize)]
pub struct SubnettingConfig {
    /// Minimum angular separation of the two sources \[radians\].
    pub min_angle: f64,
    /// Minimum combined number of stations of the two scans.
    pub min_station_count: usize,
}

impl Default for SubnettingConfig {
    fn default() -> SubnettingConfig {
        SubnettingConfig {
            min_angle: 120_f64.to_radians(),
            min_station_count: 4,
        }
    }
}

/// Optional rule forcing certain scan selections onto preferred sources.
#[derive(Clone, Debug, Deserialize)]
pub struct ScanSequence {
    /// The rule repeats with this period of scan selections.
    pub modulus: u32,
    /// Selection residue -> allowed source ids. Residues without an entry
    /// are unrestricted.
    pub targets: HashMap<u32, Vec<usize>>,
}

/// Conditions driving the outer optimization iteration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OptimizationConditions {
    /// Combine the per-source scan and observation conditions with logical
    /// "and" (otherwise "or").
    pub and_combination: bool,
    pub max_number_of_iterations: u32,
    /// During this many leading iterations only every second failing source
    /// is dropped.
    pub number_of_gentle_source_reductions: u32,
    /// Restart only when at least this many sources failed.
    pub min_number_of_sources_to_reduce: u32,
}

impl Default for OptimizationConditions {
    fn default() -> OptimizationConditions {
        OptimizationConditions {
            and_combination: true,
            max_number_of_iterations: 999,
            number_of_gentle_source_reductions: 0,
            min_number_of_sources_to_reduce: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// Session start (UTC).
    pub start: DateTime<Utc>,
    /// Session end (UTC).
    pub end: DateTime<Utc>,
    pub mode: ObservingMode,

    #[serde(default = "default_anchor")]
    pub anchor: AlignmentAnchor,
    #[serde(default)]
    pub subnetting: Option<SubnettingConfig>,

    /// Try fill-in scans while selecting (recursive fill-in).
    #[serde(default = "default_true")]
    pub fillin_mode_during_scan_selection: bool,
    /// Fill-in scans update statistics and sky coverage.
    #[serde(default = "default_true")]
    pub fillin_mode_influence_on_schedule: bool,
    /// Run a fill-in pass over the finished schedule.
    #[serde(default)]
    pub fillin_mode_a_posteriori: bool,
    /// Extend observing times into idle gaps at the end.
    #[serde(default)]
    pub idle_to_observing_time: bool,

    #[serde(default)]
    pub weights: WeightFactors,
    #[serde(default)]
    pub sky_coverage: SkyCoverageConfig,
    #[serde(default)]
    pub scan_sequence: Option<ScanSequence>,
    #[serde(default)]
    pub calibrator: Option<CalibratorBlock>,
    #[serde(default)]
    pub high_impact: Option<HighImpactConfig>,
    #[serde(default)]
    pub optimization: OptimizationConditions,
}

fn default_true() -> bool {
    true
}

fn default_anchor() -> AlignmentAnchor {
    AlignmentAnchor::Start
}

impl SessionConfig {
    /// A minimal configuration: everything at its defaults, no optional
    /// rules.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, mode: ObservingMode) -> SessionConfig {
        SessionConfig {
            start,
            end,
            mode,
            anchor: default_anchor(),
            subnetting: None,
            fillin_mode_during_scan_selection: true,
            fillin_mode_influence_on_schedule: true,
            fillin_mode_a_posteriori: false,
            idle_to_observing_time: false,
            weights: WeightFactors::default(),
            sky_coverage: SkyCoverageConfig::default(),
            scan_sequence: None,
            calibrator: None,
            high_impact: None,
            optimization: OptimizationConditions::default(),
        }
    }
}
