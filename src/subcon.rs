// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The subcon: every scan the scheduler could commit next.

All single-source candidates live in one arena; subnetting candidates (two
scans on disjoint station sets) reference them by index. Scoring normalizes
each term against the subcon-wide extremes, so scores only order candidates
within one selection round. `select_best` re-verifies the winner rigorously
before handing it over; candidates that fail verification are discarded and
the next best is tried.
 */

use std::collections::HashMap;
use std::collections::HashSet;

use log::trace;

use crate::calibrator::CalibratorBlock;
use crate::endposition::StationEndposition;
use crate::network::Network;
use crate::scan::{Scan, ScanContext, ScanType};
use crate::source::Source;
use crate::weights::WeightFactors;

/// A pair of candidate scans observed concurrently by disjoint subnets.
#[derive(Clone, Copy, Debug)]
pub struct SubnettingCandidate {
    pub idx1: usize,
    pub idx2: usize,
    pub score: f64,
}

#[derive(Default)]
pub struct Subcon {
    scans: Vec<Scan>,
    subnetting: Vec<SubnettingCandidate>,
}

impl Subcon {
    pub fn new() -> Subcon {
        Subcon::default()
    }

    pub fn n_single_scans(&self) -> usize {
        self.scans.len()
    }

    pub fn n_subnetting_scans(&self) -> usize {
        self.subnetting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }

    /// Add a candidate for one source if it is visible at all.
    #[allow(clippy::too_many_arguments)]
    pub fn visible_scan(
        &mut self,
        ctx: &ScanContext,
        current_time: u32,
        scan_type: ScanType,
        network: &Network,
        source: &Source,
        srcid: usize,
        exclude_sources: &HashSet<usize>,
    ) {
        if let Some(scan) = Scan::visible_scan(
            ctx,
            current_time,
            scan_type,
            network,
            source,
            srcid,
            exclude_sources,
        ) {
            self.scans.push(scan);
        }
    }

    pub fn calc_start_times(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
        endposition: Option<&StationEndposition>,
    ) {
        self.scans
            .retain_mut(|s| s.calc_start_times(ctx, network, &sources[s.srcid], endposition));
    }

    pub fn update_az_el(&mut self, ctx: &ScanContext, network: &Network, sources: &[Source]) {
        self.scans
            .retain_mut(|s| s.update_az_el(ctx, network, &sources[s.srcid]));
    }

    pub fn construct_all_baselines(&mut self, network: &Network, sources: &[Source]) {
        self.scans
            .retain_mut(|s| s.construct_all_baselines(network, &sources[s.srcid]));
    }

    pub fn calc_all_baseline_durations(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
    ) {
        self.scans
            .retain_mut(|s| s.calc_all_baseline_durations(ctx, network, &sources[s.srcid]));
    }

    pub fn calc_all_scan_durations(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
    ) {
        self.scans
            .retain_mut(|s| s.calc_all_scan_durations(ctx, network, &sources[s.srcid]));
    }

    pub fn check_if_enough_time_to_reach_endposition(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
        endposition: Option<&StationEndposition>,
    ) {
        self.scans.retain_mut(|s| {
            s.check_if_enough_time_to_reach_endposition(
                ctx,
                network,
                &sources[s.srcid],
                endposition,
            )
        });
    }

    /// Re-label all candidates (a carried-over subcon becomes fill-in).
    pub fn change_type(&mut self, scan_type: ScanType) {
        for scan in &mut self.scans {
            scan.scan_type = scan_type;
        }
    }

    pub fn clear_subnetting_scans(&mut self) {
        self.subnetting.clear();
    }

    /// Pair up candidates on disjoint station sets whose sources are far
    /// enough apart. `compatible[src1]` lists the partner sources
    /// precomputed from the subnetting minimum angle.
    pub fn create_subnetting_scans(&mut self, compatible: &[Vec<usize>], min_station_count: usize) {
        self.subnetting.clear();
        for i in 0..self.scans.len() {
            for j in (i + 1)..self.scans.len() {
                let (a, b) = (&self.scans[i], &self.scans[j]);
                if !compatible[a.srcid].contains(&b.srcid) {
                    continue;
                }
                if a.n_sta() + b.n_sta() < min_station_count {
                    continue;
                }
                let disjoint = a
                    .station_ids()
                    .iter()
                    .all(|staid| !b.station_ids().contains(staid));
                if disjoint {
                    self.subnetting.push(SubnettingCandidate {
                        idx1: i,
                        idx2: j,
                        score: 0.0,
                    });
                }
            }
        }
    }

    /// Mean observation deficit of a set of entities, in [0, 1]: how far the
    /// participants lag behind the network average.
    fn deficit(n_obs: impl Iterator<Item = u32>, mean: f64, max: f64) -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for obs in n_obs {
            sum += ((mean - f64::from(obs)) / (max + 1.0)).max(0.0);
            n += 1;
        }
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }

    /// Score every candidate for ordinary selection.
    pub fn generate_score(
        &mut self,
        network: &Network,
        sources: &[Source],
        weights: &WeightFactors,
    ) {
        let max_obs = self.scans.iter().map(Scan::n_obs).max().unwrap_or(0) as f64;
        let max_dur = self
            .scans
            .iter()
            .map(|s| s.times.scan_observing_time())
            .max()
            .unwrap_or(0);
        let min_dur = self
            .scans
            .iter()
            .map(|s| s.times.scan_observing_time())
            .min()
            .unwrap_or(0);

        let mean_of = |it: &mut dyn Iterator<Item = u32>| -> (f64, f64) {
            let mut sum = 0.0;
            let mut max = 0.0_f64;
            let mut n = 0usize;
            for v in it {
                sum += f64::from(v);
                max = max.max(f64::from(v));
                n += 1;
            }
            (if n == 0 { 0.0 } else { sum / n as f64 }, max)
        };
        let (sta_mean, sta_max) = mean_of(&mut network.stations.iter().map(|s| s.n_obs));
        let (src_mean, src_max) = mean_of(&mut sources.iter().map(|s| s.n_obs));
        let (bl_mean, bl_max) = mean_of(&mut network.baselines.iter().map(|b| b.n_obs));

        for scan in &mut self.scans {
            let source = &sources[scan.srcid];
            let nsta = scan.n_sta() as f64;

            let dur_norm = if max_dur > min_dur {
                f64::from(max_dur - scan.times.scan_observing_time())
                    / f64::from(max_dur - min_dur)
            } else {
                1.0
            };
            let nobs_norm = if max_obs > 0.0 {
                scan.n_obs() as f64 / max_obs
            } else {
                0.0
            };

            let mut sky_gain = 0.0;
            let mut idle_gain = 0.0;
            let mut low_el = 0.0;
            let mut sta_weight = 0.0;
            for idx in 0..scan.n_sta() {
                let staid = scan.station_id(idx);
                let pv = scan.pointing_start(idx);
                sky_gain += 1.0 - network.sky_coverage_of(staid).influence(pv);
                let idle = scan
                    .times
                    .observing_start(idx)
                    .saturating_sub(scan.times.end_of_last_scan(idx));
                idle_gain +=
                    (f64::from(idle) / f64::from(weights.idle_time_interval.max(1))).min(1.0);
                low_el += WeightFactors::ramp(
                    pv.el,
                    weights.low_elevation_start,
                    weights.low_elevation_full,
                );
                sta_weight += network.stations[staid].parameters.weight;
            }
            sky_gain /= nsta;
            idle_gain /= nsta;
            low_el /= nsta;
            sta_weight /= nsta;

            let sta_balance = Self::deficit(
                scan.station_ids().iter().map(|&s| network.stations[s].n_obs),
                sta_mean,
                sta_max,
            );
            let src_balance = Self::deficit(
                std::iter::once(source.n_obs),
                src_mean,
                src_max,
            );
            let bl_balance = Self::deficit(
                scan.observations
                    .iter()
                    .map(|o| network.baselines[o.blid].n_obs),
                bl_mean,
                bl_max,
            );
            let bl_weight = if scan.n_obs() > 0 {
                scan.observations
                    .iter()
                    .map(|o| network.baselines[o.blid].parameters.weight)
                    .sum::<f64>()
                    / scan.n_obs() as f64
            } else {
                1.0
            };

            let dec_ramp = WeightFactors::ramp(
                source.dec,
                weights.declination_start,
                weights.declination_full,
            );

            let mut source_weight = source.parameters.weight;
            if source.parameters.try_to_focus_if_observed_once && source.n_total_scans > 0 {
                source_weight *= source.parameters.try_to_focus_factor;
            }

            scan.score = (weights.duration * dur_norm
                + weights.number_of_observations * nobs_norm
                + weights.sky_coverage * sky_gain
                + weights.average_sources * src_balance
                + weights.average_stations * sta_balance
                + weights.average_baselines * bl_balance
                + weights.idle_time * idle_gain
                + weights.declination * dec_ramp
                + weights.low_elevation * low_el)
                * source_weight
                * sta_weight
                * bl_weight;
        }

        for cand in &mut self.subnetting {
            cand.score = self.scans[cand.idx1].score + self.scans[cand.idx2].score;
        }
    }

    /// Calibrator scoring: how much a candidate pushes the per-station low
    /// and high elevation coverage towards complete.
    pub fn generate_calibrator_score(
        &mut self,
        block: &CalibratorBlock,
        prev_low: &[f64],
        prev_high: &[f64],
    ) {
        for scan in &mut self.scans {
            let mut improvement = 0.0;
            for idx in 0..scan.n_sta() {
                let staid = scan.station_id(idx);
                let el = scan.pointing_start(idx).el;
                let (low, high) = block.elevation_scores(el);
                improvement += (low - prev_low[staid]).max(0.0);
                improvement += (high - prev_high[staid]).max(0.0);
            }
            // Observation count breaks ties between equally useful scans.
            scan.score = improvement + 1e-3 * scan.n_obs() as f64;
        }
        for cand in &mut self.subnetting {
            cand.score = self.scans[cand.idx1].score + self.scans[cand.idx2].score;
        }
    }

    /// High-impact scoring: the descriptor already rated each source per
    /// evaluation tick; a scan inherits the rating of its tick.
    pub fn generate_high_impact_score(&mut self, scores: &[HashMap<usize, f64>], interval: u32) {
        for scan in &mut self.scans {
            let tick = (scan.times.scan_observing_start() / interval) as usize;
            scan.score = scores
                .get(tick)
                .and_then(|m| m.get(&scan.srcid))
                .copied()
                .unwrap_or(0.0);
        }
        self.subnetting.clear();
    }

    /// Pick the best candidate that survives the rigorous re-check. Returns
    /// one scan, two scans (a subnetting pair), or nothing.
    pub fn select_best(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
        endposition: Option<&StationEndposition>,
    ) -> Vec<Scan> {
        let n_single = self.scans.len();
        let mut disabled = vec![false; n_single + self.subnetting.len()];

        loop {
            // Highest-scoring candidate still in play.
            let mut best: Option<(usize, f64)> = None;
            for i in 0..disabled.len() {
                if disabled[i] {
                    continue;
                }
                let score = if i < n_single {
                    self.scans[i].score
                } else {
                    self.subnetting[i - n_single].score
                };
                if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                    best = Some((i, score));
                }
            }
            let (i, _) = match best {
                Some(b) => b,
                None => return vec![],
            };
            disabled[i] = true;

            if i < n_single {
                let mut scan = self.scans[i].clone();
                if scan.rigorous_update(ctx, network, &sources[scan.srcid], endposition) {
                    return vec![scan];
                }
                trace!("candidate scan of source {} failed verification", scan.srcid);
            } else {
                let cand = self.subnetting[i - n_single];
                let mut scan1 = self.scans[cand.idx1].clone();
                let mut scan2 = self.scans[cand.idx2].clone();
                scan1.scan_type = ScanType::Subnetting;
                scan2.scan_type = ScanType::Subnetting;
                if scan1.rigorous_update(ctx, network, &sources[scan1.srcid], endposition)
                    && scan2.rigorous_update(ctx, network, &sources[scan2.srcid], endposition)
                {
                    return vec![scan1, scan2];
                }
            }
        }
    }
}

impl Subcon {
    /// Like [`Subcon::select_best`], but the winning scans leave the arena,
    /// so repeated calls walk down the ranking. Only used where subnetting
    /// candidates are absent (high-impact pre-fixing).
    pub fn take_best(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
    ) -> Vec<Scan> {
        self.subnetting.clear();
        loop {
            let best = self
                .scans
                .iter()
                .enumerate()
                .filter(|(_, s)| s.score > 0.0)
                .max_by(|(_, a), (_, b)| a.score.partial_cmp(&b.score).unwrap());
            let i = match best {
                Some((i, _)) => i,
                None => return vec![],
            };
            let mut scan = self.scans.remove(i);
            if scan.rigorous_update(ctx, network, &sources[scan.srcid], None) {
                return vec![scan];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{
        scan_context, source_at, test_station, three_station_network, two_station_network,
        TestSession,
    };
    use crate::network::Network;
    use crate::skycov::SkyCoverageConfig;

    fn build_subcon(
        ctx: &ScanContext,
        network: &Network,
        sources: &[Source],
        current_time: u32,
    ) -> Subcon {
        let mut subcon = Subcon::new();
        for (srcid, source) in sources.iter().enumerate() {
            subcon.visible_scan(
                ctx,
                current_time,
                ScanType::Standard,
                network,
                source,
                srcid,
                &HashSet::new(),
            );
        }
        subcon.calc_start_times(ctx, network, sources, None);
        subcon.update_az_el(ctx, network, sources);
        subcon.construct_all_baselines(network, sources);
        subcon.calc_all_baseline_durations(ctx, network, sources);
        subcon.calc_all_scan_durations(ctx, network, sources);
        subcon
    }

    /// Sources bracketing the local meridian, both high in the sky.
    fn two_visible_sources(ctx: &ScanContext, network: &Network) -> Vec<Source> {
        let lon = network.stations[0].position.lon;
        let lst = ctx.time.gmst_at(600) + lon;
        vec![source_at(lst - 0.3, 0.2), source_at(lst + 0.3, -0.2)]
    }

    #[test]
    fn scoring_orders_candidates() {
        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let ctx = scan_context(&time, &astro);
        let mut sources = two_visible_sources(&ctx, &network);
        // Make the second source clearly preferable.
        sources[1].parameters.weight = 5.0;

        let mut subcon = build_subcon(&ctx, &network, &sources, 0);
        assert_eq!(subcon.n_single_scans(), 2);
        subcon.generate_score(&network, &sources, &WeightFactors::default());

        let best = subcon.select_best(&ctx, &network, &sources, None);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].srcid, 1);
        assert!(best[0].has_end_pointings());
    }

    #[test]
    fn subnetting_requires_disjoint_stations_and_separation() {
        let TestSession { time, astro } = TestSession::new();
        let network = three_station_network();
        let ctx = scan_context(&time, &astro);
        let lon = network.stations[0].position.lon;
        let lst = ctx.time.gmst_at(600) + lon;
        // 130 degrees apart on the celestial equator.
        let sources = vec![
            source_at(lst - 65_f64.to_radians(), 0.3),
            source_at(lst + 65_f64.to_radians(), 0.3),
        ];

        let mut subcon = build_subcon(&ctx, &network, &sources, 0);
        assert_eq!(subcon.n_single_scans(), 2);

        // Precomputed pair table: the two sources are compatible.
        let compatible = vec![vec![1], vec![0]];
        subcon.create_subnetting_scans(&compatible, 4);
        // Both scans hold all three stations: never disjoint.
        assert_eq!(subcon.n_subnetting_scans(), 0);

        // An empty compatibility table blocks pairing regardless.
        subcon.create_subnetting_scans(&[vec![], vec![]], 2);
        assert_eq!(subcon.n_subnetting_scans(), 0);
    }

    #[test]
    fn subnetting_pairs_disjoint_scans() {
        let TestSession { time, astro } = TestSession::new();
        // Separate the stations so wide; sources are each visible from only
        // part of the network.
        let network = Network::new(
            vec![
                test_station(0, "Aa", 0.0),
                test_station(1, "Bb", 30.0),
                test_station(2, "Cc", 9000.0),
                test_station(3, "Dd", 9030.0),
            ],
            SkyCoverageConfig::default(),
        );
        let ctx = scan_context(&time, &astro);
        let lst_west = ctx.time.gmst_at(600) + network.stations[0].position.lon;
        let lst_east = ctx.time.gmst_at(600) + network.stations[2].position.lon;
        // One source over each half of the network, ~97 degrees apart.
        let sources = vec![source_at(lst_west - 0.1, 0.0), source_at(lst_east + 0.1, 0.0)];

        let mut subcon = build_subcon(&ctx, &network, &sources, 0);
        subcon.generate_score(&network, &sources, &WeightFactors::default());
        let compatible = vec![vec![1], vec![0]];
        subcon.create_subnetting_scans(&compatible, 4);

        if subcon.n_subnetting_scans() > 0 {
            subcon.generate_score(&network, &sources, &WeightFactors::default());
            let best = subcon.select_best(&ctx, &network, &sources, None);
            if best.len() == 2 {
                let ids1: HashSet<usize> = best[0].station_ids().iter().copied().collect();
                assert!(best[1].station_ids().iter().all(|s| !ids1.contains(s)));
            }
        }
    }

    #[test]
    fn empty_subcon_selects_nothing() {
        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let ctx = scan_context(&time, &astro);
        let mut subcon = Subcon::new();
        assert!(subcon
            .select_best(&ctx, &network, &[], None)
            .is_empty());
    }
}
