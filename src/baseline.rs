// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A station pair and its observing policy.

use std::collections::HashMap;

use serde::Deserialize;

use crate::event::EventList;

/// The active policy of one baseline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BaselineParameters {
    /// Never schedule observations on this baseline.
    pub ignore: bool,
    /// Explicit scoring weight.
    pub weight: f64,
    /// Minimum observing time \[s\].
    pub min_scan: u32,
    /// Maximum observing time \[s\].
    pub max_scan: u32,
    /// Required SNR per band.
    pub min_snr: HashMap<String, f64>,
}

impl Default for BaselineParameters {
    fn default() -> BaselineParameters {
        BaselineParameters {
            ignore: false,
            weight: 1.0,
            min_scan: 0,
            max_scan: 9999,
            min_snr: HashMap::new(),
        }
    }
}

/// Per-baseline statistics, rebuilt by the check routine.
#[derive(Clone, Debug, Default)]
pub struct BaselineStatistics {
    pub scan_start_times: Vec<u32>,
    pub total_observing_time: u32,
}

#[derive(Clone, Debug)]
pub struct Baseline {
    /// "Ke-Yg"-style name built from the two-letter station codes.
    pub name: String,
    pub staid1: usize,
    pub staid2: usize,
    pub parameters: BaselineParameters,
    events: EventList<BaselineParameters>,
    /// Committed observations on this baseline.
    pub n_obs: u32,
    pub statistics: BaselineStatistics,
}

impl Baseline {
    pub fn new(name: String, staid1: usize, staid2: usize) -> Baseline {
        let parameters = BaselineParameters::default();
        Baseline {
            name,
            staid1,
            staid2,
            events: EventList::single(parameters.clone()),
            parameters,
            n_obs: 0,
            statistics: BaselineStatistics::default(),
        }
    }

    pub fn set_events(&mut self, events: EventList<BaselineParameters>) {
        self.events = events;
    }

    /// See [`EventList::check_for_new_event`].
    pub fn check_for_new_event(&mut self, time: u32) -> (bool, bool) {
        self.events.check_for_new_event(time, &mut self.parameters)
    }

    pub fn reset_events(&mut self) {
        self.events.reset();
    }

    /// Rewrite the active parameter block and every block on the event
    /// timeline. Multi-schedule sweeps use this for member-scoped overrides.
    pub fn override_parameters(&mut self, f: impl Fn(&mut BaselineParameters)) {
        f(&mut self.parameters);
        for block in self.events.blocks_mut() {
            f(block);
        }
    }

    pub fn contains_station(&self, staid: usize) -> bool {
        self.staid1 == staid || self.staid2 == staid
    }

    pub fn clear_observations(&mut self) {
        self.n_obs = 0;
        self.statistics = BaselineStatistics::default();
    }
}
