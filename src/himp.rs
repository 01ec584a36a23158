// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
High-impact scan pre-fixing.

Some directions are worth extra observations (for example low elevations
over a particular station subset, for tropospheric ties). A descriptor lists
(azimuth, elevation, margin, station subset) targets; before ordinary
selection begins, the scheduler rates every source against every target on a
fixed time grid, builds candidate scans for the promising ones and commits a
non-conflicting subset. Ordinary selection then fills the remaining time.
 */

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::math::{abs_diff, angular_distance, wrap_to_pi};
use crate::network::Network;
use crate::pointing::PointingVector;
use crate::scan::{Scan, ScanContext, ScanType};
use crate::source::Source;
use crate::station::AzElModel;
use crate::subcon::Subcon;

/// One high-impact direction over a station subset.
#[derive(Clone, Debug, Deserialize)]
pub struct AzElTarget {
    /// Azimuth \[radians\].
    pub az: f64,
    /// Elevation \[radians\].
    pub el: f64,
    /// Angular margin within which a pointing still counts \[radians\].
    pub margin: f64,
    /// Stations the target applies to.
    pub station_ids: Vec<usize>,
}

impl AzElTarget {
    /// Impact of one pointing: 1 on target, falling linearly to 0 at the
    /// margin; 0 for stations outside the subset.
    pub fn impact_score(&self, pv: &PointingVector) -> f64 {
        if !self.station_ids.contains(&pv.staid) {
            return 0.0;
        }
        let dist = angular_distance(wrap_to_pi(pv.az), pv.el, self.az, self.el);
        if dist < self.margin {
            (self.margin - dist) / self.margin
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HighImpactConfig {
    /// Evaluation grid spacing \[s\].
    pub interval: u32,
    /// Minimum gap between two committed high-impact scans \[s\].
    pub min_time_between_scans: u32,
    pub targets: Vec<AzElTarget>,
}

/// Scratch state of one pre-fixing pass.
pub struct HighImpactScans {
    config: HighImpactConfig,
    /// Per evaluation tick: source id -> accumulated impact.
    scores: Vec<HashMap<usize, f64>>,
    subcon: Subcon,
}

impl HighImpactScans {
    pub fn new(config: HighImpactConfig) -> HighImpactScans {
        HighImpactScans {
            config,
            scores: vec![],
            subcon: Subcon::new(),
        }
    }

    pub fn interval(&self) -> u32 {
        self.config.interval
    }

    /// Every station any target mentions.
    pub fn station_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .config
            .targets
            .iter()
            .flat_map(|t| t.station_ids.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Rate all sources at one grid tick and build candidate scans for
    /// those with any impact.
    pub fn possible_high_impact_scans(
        &mut self,
        tick: usize,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
    ) {
        let time = tick as u32 * self.config.interval;
        let mut tick_scores: HashMap<usize, f64> = HashMap::new();

        for target in &self.config.targets {
            for &staid in &target.station_ids {
                let station = &network.stations[staid];
                for (srcid, source) in sources.iter().enumerate() {
                    let mut pv = PointingVector::new(staid, srcid, time);
                    station.calc_az_el(AzElModel::Simple, ctx.time, ctx.astro, source, &mut pv);
                    if !station.is_visible(&pv, source.parameters.min_elevation) {
                        continue;
                    }
                    let score = target.impact_score(&pv);
                    if score > 0.0 {
                        *tick_scores.entry(srcid).or_insert(0.0) += score;
                    }
                }
            }
        }

        for &srcid in tick_scores.keys() {
            self.subcon.visible_scan(
                ctx,
                time,
                ScanType::HighImpact,
                network,
                &sources[srcid],
                srcid,
                &HashSet::new(),
            );
        }
        self.scores.push(tick_scores);
    }

    /// Turn the accumulated candidates into fully timed, scored scans.
    pub fn update_high_impact_scans(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
    ) {
        self.subcon.calc_start_times(ctx, network, sources, None);
        self.subcon.update_az_el(ctx, network, sources);
        self.subcon.construct_all_baselines(network, sources);
        self.subcon.calc_all_baseline_durations(ctx, network, sources);
        self.subcon.calc_all_scan_durations(ctx, network, sources);
        self.subcon
            .generate_high_impact_score(&self.scores, self.config.interval);
    }

    pub fn n_candidates(&self) -> usize {
        self.subcon.n_single_scans()
    }

    /// The next best verified scan(s), removed from the candidate pool.
    pub fn highest_impact_scans(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
    ) -> Vec<Scan> {
        self.subcon.take_best(ctx, network, sources)
    }

    pub fn has_more_scans(&self) -> bool {
        !self.subcon.is_empty()
    }

    /// Whether a verified high-impact scan coexists with everything already
    /// committed: gaps respected, no overlap, the source not repeated too
    /// soon.
    pub fn is_correct_high_impact_scan(
        &self,
        target: &Scan,
        scans: &[Scan],
        source: &Source,
    ) -> bool {
        let min_gap = self.config.min_time_between_scans;
        let min_repeat = source.parameters.min_repeat;

        scans.iter().all(|scan| {
            let target_start = target.times.scan_observing_start();
            let target_end = target.times.scan_observing_end();
            let scan_start = scan.times.scan_observing_start();
            let scan_end = scan.times.scan_observing_end();

            if abs_diff(target_end, scan_start) < min_gap
                || abs_diff(scan_end, target_start) < min_gap
            {
                return false;
            }

            // No boundary may fall inside the other scan, and neither scan
            // may contain the other.
            if target_start > scan_start && target_start < scan_end {
                return false;
            }
            if target_end > scan_start && target_end < scan_end {
                return false;
            }
            if target_start >= scan_start && target_end <= scan_end {
                return false;
            }
            if scan_start >= target_start && scan_end <= target_end {
                return false;
            }

            if scan.srcid == target.srcid && abs_diff(target_start, scan_start) < min_repeat {
                return false;
            }
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_score_geometry() {
        let target = AzElTarget {
            az: 180_f64.to_radians(),
            el: 30_f64.to_radians(),
            margin: 10_f64.to_radians(),
            station_ids: vec![0, 1],
        };

        let mut pv = PointingVector::new(0, 0, 0);
        pv.az = 180_f64.to_radians();
        pv.el = 30_f64.to_radians();
        assert!((target.impact_score(&pv) - 1.0).abs() < 1e-9);

        // 5 degrees off: half the margin left.
        pv.el = 25_f64.to_radians();
        assert!((target.impact_score(&pv) - 0.5).abs() < 1e-6);

        // Outside the margin, or the wrong station: nothing.
        pv.el = 10_f64.to_radians();
        assert_eq!(target.impact_score(&pv), 0.0);
        pv.el = 30_f64.to_radians();
        pv.staid = 7;
        assert_eq!(target.impact_score(&pv), 0.0);
    }

    #[test]
    fn conflict_rules() {
        use crate::tests::{overhead_source, scan_context, two_station_network, TestSession};

        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let ctx = scan_context(&time, &astro);
        let source = overhead_source(&time, &network, 1800);

        // Two synthetic committed scans via the ordinary pipeline.
        let build_at = |t: u32| -> Scan {
            let mut scan = Scan::visible_scan(
                &ctx,
                t,
                ScanType::HighImpact,
                &network,
                &source,
                0,
                &HashSet::new(),
            )
            .unwrap();
            assert!(scan.calc_start_times(&ctx, &network, &source, None));
            assert!(scan.update_az_el(&ctx, &network, &source));
            assert!(scan.construct_all_baselines(&network, &source));
            assert!(scan.calc_all_baseline_durations(&ctx, &network, &source));
            assert!(scan.calc_all_scan_durations(&ctx, &network, &source));
            scan
        };

        let himp = HighImpactScans::new(HighImpactConfig {
            interval: 600,
            min_time_between_scans: 300,
            targets: vec![],
        });

        let committed = build_at(0);
        let far = build_at(3000);
        let near = build_at(100);

        assert!(himp.is_correct_high_impact_scan(&far, &[committed.clone()], &source));
        // Too close to the committed scan.
        assert!(!himp.is_correct_high_impact_scan(&near, &[committed.clone()], &source));
        // Same source too soon.
        let mut slow_repeat = source.clone();
        slow_repeat.parameters.min_repeat = 4000;
        assert!(!himp.is_correct_high_impact_scan(&far, &[committed], &slow_repeat));
    }
}
