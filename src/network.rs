// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The network: all stations, all baselines and the sky-coverage records.

The network owns the mutable per-schedule state of its members and does the
bookkeeping when a scan is committed. Twin telescopes (stations closer than
the configured twin distance) share one sky-coverage record.
 */

use std::collections::HashMap;

use crate::baseline::Baseline;
use crate::pointing::PointingVector;
use crate::skycov::{SkyCoverage, SkyCoverageConfig};
use crate::station::Station;

#[derive(Clone, Debug)]
pub struct Network {
    pub stations: Vec<Station>,
    pub baselines: Vec<Baseline>,
    pub sky_coverages: Vec<SkyCoverage>,
    /// Station index -> sky-coverage index (twins share an entry).
    sta_to_sky: Vec<usize>,
    /// (low station id, high station id) -> baseline id.
    bl_index: HashMap<(usize, usize), usize>,
}

impl Network {
    /// Build a network over all station pairs. Baseline parameters start at
    /// their defaults; the configuration layer installs event timelines
    /// afterwards.
    pub fn new(stations: Vec<Station>, sky_config: SkyCoverageConfig) -> Network {
        let mut baselines = vec![];
        let mut bl_index = HashMap::new();
        for i in 0..stations.len() {
            for j in (i + 1)..stations.len() {
                let name = format!("{}-{}", stations[i].code, stations[j].code);
                bl_index.insert((i, j), baselines.len());
                baselines.push(Baseline::new(name, i, j));
            }
        }

        // Group stations into sky coverages; twins join an existing record.
        let mut sta_to_sky = vec![0; stations.len()];
        let mut sky_owners: Vec<usize> = vec![];
        for (i, sta) in stations.iter().enumerate() {
            let twin = sky_owners.iter().position(|&owner| {
                stations[owner].position.distance_to(&sta.position) <= sky_config.max_twin_distance
            });
            match twin {
                Some(sky_id) => sta_to_sky[i] = sky_id,
                None => {
                    sta_to_sky[i] = sky_owners.len();
                    sky_owners.push(i);
                }
            }
        }
        let sky_coverages = sky_owners
            .iter()
            .map(|_| SkyCoverage::new(sky_config.clone()))
            .collect();

        Network {
            stations,
            baselines,
            sky_coverages,
            sta_to_sky,
            bl_index,
        }
    }

    pub fn nsta(&self) -> usize {
        self.stations.len()
    }

    pub fn nbls(&self) -> usize {
        self.baselines.len()
    }

    /// The baseline between two stations, in either order.
    pub fn baseline_index(&self, staid1: usize, staid2: usize) -> Option<usize> {
        let key = (staid1.min(staid2), staid1.max(staid2));
        self.bl_index.get(&key).copied()
    }

    /// Baseline vector from station 1 to station 2 \[m\].
    pub fn dxyz(&self, staid1: usize, staid2: usize) -> [f64; 3] {
        let p1 = &self.stations[staid1].position;
        let p2 = &self.stations[staid2].position;
        [p2.x - p1.x, p2.y - p1.y, p2.z - p1.z]
    }

    pub fn sky_coverage_of(&self, staid: usize) -> &SkyCoverage {
        &self.sky_coverages[self.sta_to_sky[staid]]
    }

    /// Commit one station's part of a scan: advance its pointing and, when
    /// the scan influences the schedule, record statistics and sky coverage.
    pub fn update_station(
        &mut self,
        staid: usize,
        n_obs: u32,
        pv_start: &PointingVector,
        pv_end: PointingVector,
        influence: bool,
    ) {
        if influence {
            self.sky_coverages[self.sta_to_sky[staid]].update(pv_start);
        }
        self.stations[staid].update(n_obs, pv_end, influence);
    }

    /// Commit one observation on a baseline.
    pub fn update_baseline(&mut self, blid: usize, influence: bool) {
        if influence {
            self.baselines[blid].n_obs += 1;
        }
    }

    /// Drop all committed observation state, for an iteration restart.
    pub fn clear_observations(&mut self) {
        for sta in &mut self.stations {
            sta.clear_observations();
        }
        for bl in &mut self.baselines {
            bl.clear_observations();
        }
        for sky in &mut self.sky_coverages {
            sky.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::{Antenna, AxisType};
    use crate::cable_wrap::{CableWrap, CableWrapKind};
    use crate::equip::Equipment;
    use crate::station::Position;

    fn station(staid: usize, code: &str, x: f64) -> Station {
        Station::new(
            staid,
            format!("STA{staid}"),
            code.to_string(),
            code.chars().next().unwrap(),
            Position::new(x, 0.0, 6_000_000.0),
            Antenna::new(AxisType::AzEl, 0.0, 20.0, 120.0, 6, 60.0, 6),
            CableWrap::new(CableWrapKind::AzEl, -90.0, 450.0, 5.0, 88.0),
            None,
            Equipment::default(),
        )
    }

    #[test]
    fn all_pairs_get_a_baseline() {
        let net = Network::new(
            vec![
                station(0, "Aa", 1_000_000.0),
                station(1, "Bb", 2_000_000.0),
                station(2, "Cc", 3_000_000.0),
            ],
            SkyCoverageConfig::default(),
        );
        assert_eq!(net.nbls(), 3);
        assert_eq!(net.baseline_index(0, 1), net.baseline_index(1, 0));
        assert_eq!(net.baselines[net.baseline_index(1, 2).unwrap()].name, "Bb-Cc");
        let d = net.dxyz(0, 2);
        assert_eq!(d[0], 2_000_000.0);
    }

    #[test]
    fn twins_share_a_sky_coverage() {
        let config = SkyCoverageConfig {
            max_twin_distance: 5000.0,
            ..Default::default()
        };
        let net = Network::new(
            vec![
                station(0, "Aa", 1_000_000.0),
                station(1, "Ab", 1_000_100.0),
                station(2, "Cc", 3_000_000.0),
            ],
            config,
        );
        assert_eq!(net.sky_coverages.len(), 2);
        assert!(std::ptr::eq(net.sky_coverage_of(0), net.sky_coverage_of(1)));
    }
}
