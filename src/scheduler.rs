// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The scheduler: repeated scan selection over one session.

One scheduler owns one network, one source catalog copy and one parameter
record, and fills the session with scans. The flow per outer iteration is:
fix high-impact scans, reset every event cursor, run the scan selection
(with recursive fill-in), optionally fill in a posteriori and convert
trailing idle time to observing time, then verify the schedule and check the
optimization conditions. Failing sources are removed and the whole iteration
restarts, bounded by the configured iteration budget.

Everything here is single-threaded and deterministic; multi-schedule sweeps
run several independent schedulers instead.
 */

use std::collections::{HashMap, HashSet};

use log::{debug, error, info, trace, warn};

use crate::astro::AstroData;
use crate::baseline::BaselineStatistics;
use crate::calibrator::{CadenceUnit, TargetScanLength};
use crate::config::SessionConfig;
use crate::constants::{
    DEADLOCK_ADVANCE, FRAC_PI_2, MIN_SOURCES_AFTER_REDUCTION, SNR_EQUATION_CONST,
};
use crate::endposition::StationEndposition;
use crate::error::SkedError;
use crate::himp::HighImpactScans;
use crate::network::Network;
use crate::pointing::{PointingVector, NO_SOURCE};
use crate::scan::observation::Observation;
use crate::scan::times::AlignmentAnchor;
use crate::scan::{Scan, ScanContext, ScanType};
use crate::source::{Source, SourceStatistics};
use crate::station::{AzElModel, StationStatistics};
use crate::subcon::Subcon;
use crate::time::TimeSystem;

/// Upper bound on the fill-in recursion depth. The recursion normally ends
/// after one or two levels because the endposition window collapses.
const MAX_FILLIN_DEPTH: usize = 16;

/// Idle gaps longer than this draw a warning from the check routine \[s\].
const LONG_IDLE_WARNING: u32 = 1200;

pub struct Scheduler {
    pub name: String,
    time: TimeSystem,
    astro: AstroData,
    config: SessionConfig,
    pub network: Network,
    pub sources: Vec<Source>,
    /// Committed scans, sorted by observing start.
    pub scans: Vec<Scan>,

    /// Per source: partner sources far enough apart for subnetting.
    subnetting_compatible: Vec<Vec<usize>>,

    current_iteration: u32,
    scan_selections: u32,
    calibrator_next: u32,
    n_single_considered: u64,
    n_subnetting_considered: u64,
}

impl Scheduler {
    pub fn new(
        name: String,
        config: SessionConfig,
        network: Network,
        sources: Vec<Source>,
    ) -> Result<Scheduler, SkedError> {
        let time = TimeSystem::new(config.start, config.end)?;
        let astro = AstroData::precompute(&time);

        let mut subnetting_compatible = vec![vec![]; sources.len()];
        if let Some(sub) = &config.subnetting {
            for i in 0..sources.len() {
                for j in (i + 1)..sources.len() {
                    if sources[i].angle_to(&sources[j]) >= sub.min_angle {
                        subnetting_compatible[i].push(j);
                        subnetting_compatible[j].push(i);
                    }
                }
            }
        }

        let calibrator_next = config.calibrator.as_ref().map_or(0, |c| c.cadence);

        Ok(Scheduler {
            name,
            time,
            astro,
            config,
            network,
            sources,
            scans: vec![],
            subnetting_compatible,
            current_iteration: 0,
            scan_selections: 0,
            calibrator_next,
            n_single_considered: 0,
            n_subnetting_considered: 0,
        })
    }

    pub fn time(&self) -> &TimeSystem {
        &self.time
    }

    /// Create the whole schedule. Repeats with a reduced source list while
    /// the optimization conditions demand it.
    pub fn run(&mut self) {
        loop {
            if self.network.nsta() == 0 || self.sources.is_empty() || self.network.nbls() == 0 {
                error!(
                    "{}: cannot schedule: {} stations, {} baselines, {} sources",
                    self.name,
                    self.network.nsta(),
                    self.network.nbls(),
                    self.sources.len()
                );
                return;
            }
            if self.current_iteration > 0 {
                info!("{}: iteration {}", self.name, self.current_iteration);
            }
            self.list_source_overview();

            if self.config.high_impact.is_some() {
                self.high_impact_scans();
            }
            self.reset_all_events();

            if self.scans.is_empty() {
                // Before their first scan, stations may point anywhere for
                // free.
                for station in &mut self.network.stations {
                    station.parameters.first_scan = true;
                }
                self.start_scan_selection(self.time.duration, ScanType::Standard, None, None, 0);
                self.sort_scans();
            } else {
                self.start_scan_selection_between_scans(ScanType::Standard, true, false);
            }

            if self.config.fillin_mode_a_posteriori {
                info!("{}: starting fill-in mode a posteriori", self.name);
                self.start_scan_selection_between_scans(ScanType::Fillin, false, true);
            }

            // Stations that went into tagalong mode mid-session have only
            // joined the scans that existed at the transition; sweep the
            // finished schedule once more for each of them.
            for staid in 0..self.network.nsta() {
                if self.network.stations[staid].parameters.tagalong {
                    self.start_tagalong_mode(staid);
                }
            }

            if self.config.idle_to_observing_time {
                self.idle_to_observing_time();
            }

            if !self.check_and_statistics() {
                error!(
                    "{}: iteration {}: the schedule check found errors",
                    self.name, self.current_iteration
                );
            }
            self.log_statistics();

            if !self.check_optimization_conditions() {
                break;
            }
            self.current_iteration += 1;
        }
    }

    fn sort_scans(&mut self) {
        self.scans
            .sort_by_key(|scan| scan.times.scan_observing_start());
    }

    /// Reset every event cursor and station pointing to the session start
    /// and apply the parameters anchored at t = 0.
    fn reset_all_events(&mut self) {
        for (staid, station) in self.network.stations.iter_mut().enumerate() {
            let mut park = PointingVector::new(staid, NO_SOURCE, 0);
            park.el = FRAC_PI_2;
            station.set_current_pointing(park);
            station.reset_events();
        }
        for source in &mut self.sources {
            source.reset_events();
        }
        for baseline in &mut self.network.baselines {
            baseline.reset_events();
        }
        self.check_for_new_events(0, false);
    }

    /// Advance all event cursors to `time`. Returns whether any hard event
    /// fired. Stations switching into tagalong mode are tagged along first.
    fn check_for_new_events(&mut self, time: u32, log_it: bool) -> bool {
        for staid in 0..self.network.nsta() {
            let station = &self.network.stations[staid];
            if station.check_for_tagalong(time) {
                info!(
                    "{}: tagalong for station {} required",
                    self.name, station.name
                );
                // The station was not usable before the transition; scans
                // committed before it are off limits.
                let event_time = station.events_peek_time().unwrap_or(time);
                if station.current_time() < event_time {
                    let mut pv = *station.current_pointing();
                    pv.time = event_time;
                    self.network.stations[staid].set_current_pointing(pv);
                }
                self.start_tagalong_mode(staid);
            }
        }

        let mut hard = false;
        let mut changed_stations = vec![];
        for station in &mut self.network.stations {
            let (changed, h) = station.check_for_new_event(time);
            hard |= h;
            if changed {
                changed_stations.push(station.name.clone());
            }
        }
        let mut changed_sources = vec![];
        for source in &mut self.sources {
            let (changed, h) = source.check_for_new_event(time);
            hard |= h;
            if changed {
                changed_sources.push(source.name.clone());
            }
        }
        let mut changed_baselines = vec![];
        for baseline in &mut self.network.baselines {
            let (changed, h) = baseline.check_for_new_event(time);
            hard |= h;
            if changed {
                changed_baselines.push(baseline.name.clone());
            }
        }

        if log_it && time < self.time.duration {
            if !changed_stations.is_empty() {
                debug!(
                    "{}: station parameters changed: {}",
                    self.name,
                    changed_stations.join(", ")
                );
            }
            if !changed_sources.is_empty() {
                debug!(
                    "{}: source parameters changed: {}",
                    self.name,
                    changed_sources.join(", ")
                );
            }
            if !changed_baselines.is_empty() {
                debug!(
                    "{}: baseline parameters changed: {}",
                    self.name,
                    changed_baselines.join(", ")
                );
            }
        }
        hard
    }

    /// Build a subcon of all possible next scans at the current time
    /// frontier, fully timed and scored.
    fn build_subcon(
        &self,
        ctx: &ScanContext,
        scan_type: ScanType,
        endposition: Option<&StationEndposition>,
    ) -> Subcon {
        let current_time = self
            .network
            .stations
            .iter()
            .map(|s| s.current_time())
            .max()
            .unwrap_or(0);
        let exclude = endposition
            .map(StationEndposition::observed_sources)
            .unwrap_or_default();

        // An active scan sequence rule restricts this selection to its
        // preferred sources.
        let allowed = self
            .config
            .scan_sequence
            .as_ref()
            .and_then(|seq| seq.targets.get(&(self.scan_selections % seq.modulus)));

        let mut subcon = Subcon::new();
        for (srcid, source) in self.sources.iter().enumerate() {
            if let Some(list) = allowed {
                if !list.contains(&srcid) {
                    continue;
                }
            }
            subcon.visible_scan(
                ctx,
                current_time,
                scan_type,
                &self.network,
                source,
                srcid,
                &exclude,
            );
        }

        subcon.calc_start_times(ctx, &self.network, &self.sources, endposition);
        subcon.update_az_el(ctx, &self.network, &self.sources);
        subcon.construct_all_baselines(&self.network, &self.sources);
        subcon.calc_all_baseline_durations(ctx, &self.network, &self.sources);
        subcon.calc_all_scan_durations(ctx, &self.network, &self.sources);
        subcon.check_if_enough_time_to_reach_endposition(
            ctx,
            &self.network,
            &self.sources,
            endposition,
        );
        if let Some(sub) = &self.config.subnetting {
            subcon.create_subnetting_scans(&self.subnetting_compatible, sub.min_station_count);
        }
        subcon.generate_score(&self.network, &self.sources, &self.config.weights);
        subcon
    }

    /// The scan selection recursion: pick the best scans until `end_time`,
    /// nesting fill-in selections in front of each pick.
    fn start_scan_selection(
        &mut self,
        end_time: u32,
        scan_type: ScanType,
        mut endposition: Option<StationEndposition>,
        mut carry: Option<Subcon>,
        depth: usize,
    ) {
        // Inside a fill-in block only stations that can still make their
        // deadline participate.
        if let Some(ep) = &endposition {
            for staid in 0..self.network.nsta() {
                self.network.stations[staid].parameters.available = ep.station_possible(staid);
            }
        }

        loop {
            if let Some(ep) = &mut endposition {
                if !ep.check_station_possibility(&self.network.stations) {
                    break;
                }
            }

            let (best_scans, n_single, n_subnetting, subcon) = {
                let ctx = ScanContext {
                    time: &self.time,
                    astro: &self.astro,
                    mode: &self.config.mode,
                    anchor: self.config.anchor,
                };
                let mut subcon = match carry.take() {
                    // A carried-over subcon from the parent selection: its
                    // scans become fill-in candidates against the new
                    // endposition.
                    Some(mut sc) => {
                        sc.change_type(ScanType::Fillin);
                        sc.check_if_enough_time_to_reach_endposition(
                            &ctx,
                            &self.network,
                            &self.sources,
                            endposition.as_ref(),
                        );
                        sc.clear_subnetting_scans();
                        if let Some(sub) = &self.config.subnetting {
                            sc.create_subnetting_scans(
                                &self.subnetting_compatible,
                                sub.min_station_count,
                            );
                        }
                        sc.generate_score(&self.network, &self.sources, &self.config.weights);
                        sc
                    }
                    None => self.build_subcon(&ctx, scan_type, endposition.as_ref()),
                };
                let n_single = subcon.n_single_scans();
                let n_subnetting = subcon.n_subnetting_scans();
                let best =
                    subcon.select_best(&ctx, &self.network, &self.sources, endposition.as_ref());
                (best, n_single, n_subnetting, subcon)
            };

            if best_scans.is_empty() {
                if depth == 0 {
                    // Nothing visible anywhere: push every station clock
                    // forward and try again.
                    let mut max_time = 0;
                    for station in &mut self.network.stations {
                        let mut pv = *station.current_pointing();
                        pv.time += DEADLOCK_ADVANCE;
                        station.set_current_pointing(pv);
                        max_time = max_time.max(pv.time);
                    }
                    warn!(
                        "{}: no valid scan found, checking again at {}",
                        self.name,
                        self.time.time_string(max_time.min(self.time.duration))
                    );
                    self.check_for_new_events(max_time, true);
                    if max_time > end_time {
                        break;
                    }
                    continue;
                } else {
                    break;
                }
            }

            let max_scan_end = best_scans
                .iter()
                .map(|s| s.times.scan_end())
                .max()
                .unwrap();

            // A hard event between here and the scan end invalidates the
            // pick; parameters changed, select again.
            if self.check_for_new_events(max_scan_end, true) {
                continue;
            }
            if max_scan_end > end_time {
                break;
            }

            if self.config.fillin_mode_during_scan_selection
                && !self.scans.is_empty()
                && depth < MAX_FILLIN_DEPTH
            {
                let mut fillin_ep = StationEndposition::new(self.network.nsta());
                if let Some(ep) = &endposition {
                    for staid in 0..self.network.nsta() {
                        if let Some(pv) = ep.final_position(staid) {
                            fillin_ep.add_pointing_vector_as_endposition(pv);
                        }
                    }
                }
                for scan in &best_scans {
                    for idx in 0..scan.n_sta() {
                        fillin_ep.add_pointing_vector_as_endposition(scan.pointing_start(idx));
                    }
                }
                fillin_ep.set_station_available(&self.network.stations);
                fillin_ep.check_station_possibility(&self.network.stations);
                let fillin_end = fillin_ep.earliest_scan_start();
                self.start_scan_selection(
                    fillin_end,
                    ScanType::Fillin,
                    Some(fillin_ep),
                    Some(subcon),
                    depth + 1,
                );
            }

            self.considered_update(n_single, n_subnetting, depth);
            for scan in best_scans {
                self.commit_scan(scan);
            }

            if scan_type == ScanType::Standard {
                self.scan_selections += 1;
            }

            if let Some(cal) = self.config.calibrator.clone() {
                let due = match cal.cadence_unit {
                    CadenceUnit::Scans => self.scan_selections >= self.calibrator_next,
                    CadenceUnit::Seconds => max_scan_end >= self.calibrator_next,
                };
                if due {
                    self.start_calibrator_block();
                    self.calibrator_next += cal.cadence;
                }
            }
        }

        // Selection block over: availability back to what it was.
        if let Some(ep) = &endposition {
            for staid in 0..self.network.nsta() {
                self.network.stations[staid].parameters.available = ep.station_available(staid);
            }
        }
    }

    /// Commit a verified scan: network statistics, source statistics, the
    /// scan list, and every station's pointing.
    fn commit_scan(&mut self, scan: Scan) {
        let influence = !(scan.scan_type == ScanType::Fillin
            && !self.config.fillin_mode_influence_on_schedule);

        for idx in 0..scan.n_sta() {
            let staid = scan.station_id(idx);
            let n_obs = scan.n_obs_of_station(staid);
            let pv_start = *scan.pointing_start(idx);
            let pv_end = *scan.pointing_end(idx);
            self.network
                .update_station(staid, n_obs, &pv_start, pv_end, influence);
        }
        for obs in &scan.observations {
            self.network.update_baseline(obs.blid, influence);
        }
        self.sources[scan.srcid].update(
            scan.n_obs() as u32,
            scan.times.scan_observing_start(),
            influence,
        );

        info!(
            "{}: scan {:3} | {:<8} | {} - {} | {} | {} stations, {} obs",
            self.name,
            self.scans.len(),
            self.sources[scan.srcid].name,
            self.time.time_string(scan.times.scan_observing_start()),
            self.time.time_string(scan.times.scan_observing_end()),
            scan.scan_type,
            scan.n_sta(),
            scan.n_obs(),
        );
        self.scans.push(scan);
    }

    fn considered_update(&mut self, n_single: usize, n_subnetting: usize, depth: usize) {
        if n_single + n_subnetting > 0 {
            debug!(
                "{}: depth {depth} considered: {n_single} single, {n_subnetting} subnetting scans",
                self.name
            );
            self.n_single_considered += n_single as u64;
            self.n_subnetting_considered += n_subnetting as u64;
        }
    }

    /// Fix high-impact scans over the whole session before ordinary
    /// selection begins.
    fn high_impact_scans(&mut self) {
        let cfg = match self.config.high_impact.clone() {
            Some(cfg) => cfg,
            None => return,
        };
        info!("{}: fixing high impact scans", self.name);
        let mut himp = HighImpactScans::new(cfg);
        let interval = himp.interval();

        let ticks = (self.time.duration / interval) as usize;
        for tick in 0..ticks {
            let t = tick as u32 * interval;
            self.check_for_new_events(t, true);
            for (staid, station) in self.network.stations.iter_mut().enumerate() {
                let mut park = PointingVector::new(staid, NO_SOURCE, t);
                park.el = FRAC_PI_2;
                station.set_current_pointing(park);
                station.parameters.first_scan = true;
            }
            let ctx = ScanContext {
                time: &self.time,
                astro: &self.astro,
                mode: &self.config.mode,
                anchor: self.config.anchor,
            };
            himp.possible_high_impact_scans(tick, &ctx, &self.network, &self.sources);
        }

        {
            let ctx = ScanContext {
                time: &self.time,
                astro: &self.astro,
                mode: &self.config.mode,
                anchor: self.config.anchor,
            };
            himp.update_high_impact_scans(&ctx, &self.network, &self.sources);
        }
        debug!(
            "{}: high impact candidates: {}",
            self.name,
            himp.n_candidates()
        );

        loop {
            let best = {
                let ctx = ScanContext {
                    time: &self.time,
                    astro: &self.astro,
                    mode: &self.config.mode,
                    anchor: self.config.anchor,
                };
                himp.highest_impact_scans(&ctx, &self.network, &self.sources)
            };
            if best.is_empty() {
                break;
            }
            for scan in best {
                if himp.is_correct_high_impact_scan(&scan, &self.scans, &self.sources[scan.srcid])
                {
                    self.commit_scan(scan);
                    for station in &mut self.network.stations {
                        station.parameters.first_scan = true;
                    }
                }
            }
            if !himp.has_more_scans() {
                break;
            }
        }

        self.sort_scans();
        info!(
            "{}: high impact fixing done, {} scans fixed",
            self.name,
            self.scans.len()
        );
    }

    /// A calibrator block: repeatedly pick scans from the calibrator list
    /// until every station covered a low and a high elevation calibrator or
    /// the block budget is spent.
    fn start_calibrator_block(&mut self) {
        let block = match &self.config.calibrator {
            Some(b) if !b.source_ids.is_empty() => b.clone(),
            _ => return,
        };
        info!("{}: starting calibrator block", self.name);

        let nsta = self.network.nsta();
        let mut prev_low = vec![0.0_f64; nsta];
        let mut prev_high = vec![0.0_f64; nsta];
        let mut lowest = vec![f64::INFINITY; nsta];
        let mut highest = vec![f64::NEG_INFINITY; nsta];

        // The target scan length overrides the sources' own policy for the
        // duration of the block.
        let mut saved: Vec<(usize, Option<u32>, HashMap<String, f64>)> = vec![];
        for &srcid in &block.source_ids {
            if srcid >= self.sources.len() {
                continue;
            }
            let para = &mut self.sources[srcid].parameters;
            saved.push((srcid, para.fixed_scan_duration, para.min_snr.clone()));
            match &block.target_scan_length {
                TargetScanLength::Parameters => {}
                TargetScanLength::Seconds(s) => para.fixed_scan_duration = Some(*s),
                TargetScanLength::MinSnr(map) => para.min_snr = map.clone(),
            }
        }

        let mut selections = 0;
        while selections < block.nmax_scans {
            let best_scans = {
                let ctx = ScanContext {
                    time: &self.time,
                    astro: &self.astro,
                    mode: &self.config.mode,
                    anchor: self.config.anchor,
                };
                let current_time = self
                    .network
                    .stations
                    .iter()
                    .map(|s| s.current_time())
                    .max()
                    .unwrap_or(0);
                let mut subcon = Subcon::new();
                for &srcid in &block.source_ids {
                    if srcid >= self.sources.len() {
                        continue;
                    }
                    subcon.visible_scan(
                        &ctx,
                        current_time,
                        ScanType::Calibrator,
                        &self.network,
                        &self.sources[srcid],
                        srcid,
                        &HashSet::new(),
                    );
                }
                subcon.calc_start_times(&ctx, &self.network, &self.sources, None);
                subcon.update_az_el(&ctx, &self.network, &self.sources);
                subcon.construct_all_baselines(&self.network, &self.sources);
                subcon.calc_all_baseline_durations(&ctx, &self.network, &self.sources);
                subcon.calc_all_scan_durations(&ctx, &self.network, &self.sources);
                if let Some(sub) = &self.config.subnetting {
                    subcon
                        .create_subnetting_scans(&self.subnetting_compatible, sub.min_station_count);
                }
                subcon.generate_calibrator_score(&block, &prev_low, &prev_high);
                subcon.select_best(&ctx, &self.network, &self.sources, None)
            };

            if best_scans.is_empty() {
                warn!("{}: no valid calibrator scan found, ending block", self.name);
                break;
            }

            for scan in &best_scans {
                for idx in 0..scan.n_sta() {
                    let staid = scan.station_id(idx);
                    let el = scan.pointing_start(idx).el;
                    let (low, high) = block.elevation_scores(el);
                    prev_low[staid] = prev_low[staid].max(low);
                    prev_high[staid] = prev_high[staid].max(high);
                    lowest[staid] = lowest[staid].min(el);
                    highest[staid] = highest[staid].max(el);
                }
            }

            let max_time = best_scans
                .iter()
                .map(|s| s.times.scan_end())
                .max()
                .unwrap();
            if self.check_for_new_events(max_time, true) {
                // Hard event: parameters changed, this pick does not count.
                continue;
            }
            if max_time > self.time.duration {
                break;
            }

            for scan in best_scans {
                self.commit_scan(scan);
            }
            selections += 1;

            let covered = prev_low.iter().all(|&v| v >= 0.5)
                && prev_high.iter().all(|&v| v >= 0.5);
            if covered {
                break;
            }
        }

        for (srcid, fixed, snr) in saved {
            let para = &mut self.sources[srcid].parameters;
            para.fixed_scan_duration = fixed;
            para.min_snr = snr;
        }

        for staid in 0..nsta {
            if lowest[staid].is_finite() {
                debug!(
                    "{}: calibrator block: station {} elevations {:.1} - {:.1} deg, \
                     scores low {:.2} high {:.2}",
                    self.name,
                    self.network.stations[staid].name,
                    lowest[staid].to_degrees(),
                    highest[staid].to_degrees(),
                    prev_low[staid],
                    prev_high[staid],
                );
            }
        }
    }

    /// The SNR-driven duration of one tagalong observation, bounded by the
    /// partner station's committed observing window.
    #[allow(clippy::too_many_arguments)]
    fn tagalong_duration(
        &self,
        srcid: usize,
        staid: usize,
        other_staid: usize,
        blid: usize,
        el1: f64,
        el2: f64,
        start_time: u32,
        window: u32,
    ) -> Option<u32> {
        let source = &self.sources[srcid];
        if let Some(fixed) = source.parameters.fixed_scan_duration {
            return Some(fixed.min(window));
        }

        let sta1 = &self.network.stations[staid];
        let sta2 = &self.network.stations[other_staid];
        let bl = &self.network.baselines[blid];
        let gmst = self.time.gmst_at(start_time);
        let dxyz = self.network.dxyz(staid, other_staid);

        let mut duration = 0_u32;
        for (band_name, band) in &self.config.mode.bands {
            let (sefd1, sefd2) = match (
                sta1.equip.sefd(band_name, el1),
                sta2.equip.sefd(band_name, el2),
            ) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            };
            let snr = |m: &HashMap<String, f64>| m.get(band_name).copied().unwrap_or(0.0);
            let min_snr = snr(&source.parameters.min_snr)
                .max(snr(&sta1.parameters.min_snr))
                .max(snr(&sta2.parameters.min_snr))
                .max(snr(&bl.parameters.min_snr));
            if min_snr <= 0.0 {
                continue;
            }
            let observed_flux = source.observed_flux(band_name, band.wavelength, gmst, dxyz)?;
            if observed_flux <= 0.0 {
                return None;
            }
            let max_cor_synch = sta1.wait_times.midob.max(sta2.wait_times.midob);
            let anum = SNR_EQUATION_CONST * min_snr / observed_flux;
            let anu1 = sefd1 * sefd2;
            let anu2 = self.config.mode.sample_rate * 1.0e6 * f64::from(band.channels)
                * f64::from(self.config.mode.bits);
            let band_duration = (anum * anum * anu1 / anu2).ceil() as u32 + max_cor_synch;
            duration = duration.max(band_duration);
        }

        let min_scan = bl
            .parameters
            .min_scan
            .max(sta1.parameters.min_scan)
            .max(sta2.parameters.min_scan)
            .max(source.parameters.min_scan);
        let max_scan = bl
            .parameters
            .max_scan
            .min(sta1.parameters.max_scan)
            .min(sta2.parameters.max_scan)
            .min(source.parameters.max_scan);

        let duration = duration.max(min_scan);
        if duration > max_scan {
            return None;
        }
        Some(duration.min(window))
    }

    /// Walk all committed scans ahead of a newly tagalong station and join
    /// every one it can reach without disturbing it.
    fn start_tagalong_mode(&mut self, staid: usize) {
        info!(
            "{}: start tagalong mode for station {}",
            self.name, self.network.stations[staid].name
        );
        let wt = self.network.stations[staid].wait_times;
        let const_times = wt.field_system + wt.preob;

        for i in 0..self.scans.len() {
            if self.scans[i].scan_type == ScanType::Fillin {
                continue;
            }
            // Never add a station twice.
            if self.scans[i].find_idx_of_station(staid).is_some() {
                continue;
            }
            let scan_start = self.scans[i].times.scan_observing_start();
            let current_time = self.network.stations[staid].current_time();
            if scan_start <= current_time {
                continue;
            }
            let srcid = self.scans[i].srcid;

            let ctx = ScanContext {
                time: &self.time,
                astro: &self.astro,
                mode: &self.config.mode,
                anchor: self.config.anchor,
            };
            let station = &self.network.stations[staid];
            let source = &self.sources[srcid];

            let mut pv_start = PointingVector::new(staid, srcid, scan_start);
            station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut pv_start);
            if !station.is_visible(&pv_start, source.parameters.min_elevation) {
                continue;
            }
            let slewtime = match station.slew_time(&mut pv_start) {
                Some(t) => t,
                None => continue,
            };
            if scan_start < current_time + slewtime + const_times {
                continue;
            }

            let mut new_obs = vec![];
            for idx in 0..self.scans[i].n_sta() {
                let scan = &self.scans[i];
                let other_staid = scan.station_id(idx);
                let other_el = scan.pointing_start(idx).el;
                let window = scan
                    .pointing_end(idx)
                    .time
                    .saturating_sub(scan.pointing_start(idx).time);
                let blid = match self.network.baseline_index(staid, other_staid) {
                    Some(blid) => blid,
                    None => continue,
                };
                if self.network.baselines[blid].parameters.ignore {
                    continue;
                }
                if source.parameters.ignore_baselines.contains(&blid) {
                    continue;
                }
                let duration = match self.tagalong_duration(
                    srcid,
                    staid,
                    other_staid,
                    blid,
                    pv_start.el,
                    other_el,
                    scan_start,
                    window,
                ) {
                    Some(d) => d,
                    None => continue,
                };
                let mut obs = Observation::new(blid, staid, other_staid, srcid, scan_start);
                obs.observing_time = duration;
                new_obs.push(obs);
            }
            if new_obs.is_empty() {
                continue;
            }
            let max_duration = new_obs.iter().map(|o| o.observing_time).max().unwrap();

            // The source must stay observable over the whole tagalong
            // window, on the same cable-wrap turn.
            let station = &self.network.stations[staid];
            let mut pv_end = PointingVector::new(staid, srcid, scan_start + max_duration);
            station.calc_az_el(AzElModel::Rigorous, &self.time, &self.astro, source, &mut pv_end);
            if !station.is_visible(&pv_end, source.parameters.min_elevation) {
                continue;
            }
            station.cable_wrap.calc_unwrapped_az(&pv_start, &mut pv_end);
            if (pv_end.az - pv_start.az).abs() > FRAC_PI_2 {
                continue;
            }

            info!(
                "{}:     tagalong {} joins scan {} of {} ({} - {})",
                self.name,
                self.network.stations[staid].name,
                i,
                self.sources[srcid].name,
                self.time.time_string(pv_start.time),
                self.time.time_string(pv_end.time),
            );

            let fs = wt.field_system;
            let preob = wt.preob;
            self.scans[i].add_tagalong_station(
                pv_start,
                pv_end,
                new_obs,
                slewtime,
                current_time,
                fs,
                preob,
            );
            let station = &mut self.network.stations[staid];
            station.parameters.first_scan = false;
            station.set_current_pointing(pv_end);
        }
    }

    /// Run scan selections inside the gaps of an existing schedule (after
    /// high-impact fixing, or as the a-posteriori fill-in pass).
    fn start_scan_selection_between_scans(
        &mut self,
        scan_type: ScanType,
        output: bool,
        ignore_tagalong: bool,
    ) {
        let n_main = self.scans.len();
        if n_main == 0 {
            return;
        }
        self.reset_all_events();

        for i in 0..n_main {
            if output {
                debug!("{}: scan selection in gap after scan {}", self.name, i);
            }
            // Every station of the earlier scan stands where that scan left
            // it.
            for k in 0..self.scans[i].n_sta() {
                let pv = *self.scans[i].pointing_end(k);
                if pv.time >= self.network.stations[pv.staid].current_time() {
                    self.network.stations[pv.staid].set_current_pointing(pv);
                }
            }

            let start_time = self.scans[i].times.scan_end();
            let last_gap = i + 1 == n_main;

            let endposition = if last_gap {
                None
            } else {
                let mut ep = StationEndposition::new(self.network.nsta());
                'outer: for scan in &self.scans[i + 1..n_main] {
                    for k in 0..scan.n_sta() {
                        ep.add_pointing_vector_as_endposition(scan.pointing_start(k));
                        if ep.every_station_initialized() {
                            break 'outer;
                        }
                    }
                }
                ep.set_station_available(&self.network.stations);
                ep.check_station_possibility(&self.network.stations);
                Some(ep)
            };

            self.check_for_new_events(start_time, true);
            if ignore_tagalong {
                for station in &mut self.network.stations {
                    station.parameters.tagalong = false;
                }
            }

            let end_time = if last_gap {
                self.time.duration
            } else {
                self.scans[i + 1].times.scan_end()
            };
            self.start_scan_selection(end_time, scan_type, endposition, None, 1);
        }

        self.sort_scans();
    }

    /// Turn trailing idle time into observing time: every station keeps
    /// observing until its slew to its next commitment has to begin.
    fn idle_to_observing_time(&mut self) {
        match self.config.anchor {
            AlignmentAnchor::Start => {}
            AlignmentAnchor::End | AlignmentAnchor::Individual => {
                warn!(
                    "{}: idle to observing time is only supported for the start anchor",
                    self.name
                );
                return;
            }
        }
        info!("{}: extending observing times into idle gaps", self.name);
        self.reset_all_events();

        for iscan in 0..self.scans.len() {
            let scan_start = self.scans[iscan].times.scan_start();
            self.check_for_new_events(scan_start, true);

            let staids: Vec<usize> = self.scans[iscan].station_ids().to_vec();
            let nthis = staids.len();
            let srcid = self.scans[iscan].srcid;

            // When is each station needed next?
            let mut found = vec![false; nthis];
            let mut const_time = vec![0_u32; nthis];
            let mut next_slew = vec![0_u32; nthis];
            let mut next_pv: Vec<Option<PointingVector>> = vec![None; nthis];
            for j in (iscan + 1)..self.scans.len() {
                for (k, &staid) in staids.iter().enumerate() {
                    if found[k] {
                        continue;
                    }
                    if let Some(nidx) = self.scans[j].find_idx_of_station(staid) {
                        next_pv[k] = Some(*self.scans[j].pointing_start(nidx));
                        let wt = &self.network.stations[staid].wait_times;
                        const_time[k] = wt.field_system + wt.preob;
                        next_slew[k] = self.scans[j].times.slew_time(nidx);
                        found[k] = true;
                    }
                }
                if found.iter().all(|&f| f) {
                    break;
                }
            }

            let old_times: Vec<u32> = (0..nthis)
                .map(|k| self.scans[iscan].times.observing_time(k))
                .collect();

            for k in 0..nthis {
                let staid = staids[k];
                let ctx = ScanContext {
                    time: &self.time,
                    astro: &self.astro,
                    mode: &self.config.mode,
                    anchor: self.config.anchor,
                };
                let start_pv = *self.scans[iscan].pointing_end(k);
                let station = &self.network.stations[staid];
                let source = &self.sources[srcid];

                if found[k] {
                    let end_pv = next_pv[k].unwrap();
                    let available = end_pv.time.saturating_sub(start_pv.time);
                    let idle = available.saturating_sub(const_time[k] + next_slew[k]);
                    if idle == 0 {
                        continue;
                    }

                    let mut variable = start_pv;
                    variable.time = start_pv.time + idle;
                    station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut variable);
                    station.cable_wrap.calc_unwrapped_az(&start_pv, &mut variable);
                    if (start_pv.az - variable.az).abs() > FRAC_PI_2 {
                        continue;
                    }
                    if !station.is_visible(&variable, source.parameters.min_elevation) {
                        continue;
                    }

                    // The slew to the next commitment changes as the start
                    // moves; walk the offset until it settles.
                    let mut target = end_pv;
                    station.cable_wrap.calc_unwrapped_az(&variable, &mut target);
                    let mut slew = station.antenna.slew_time(&variable, &target);
                    let mut offset: i64 = 0;
                    let mut visible = true;
                    let mut rounds = 0;
                    while i64::from(slew) + offset != i64::from(next_slew[k]) && rounds < 10 {
                        rounds += 1;
                        offset = i64::from(next_slew[k]) - i64::from(slew);
                        let t = i64::from(start_pv.time) + i64::from(idle) + offset;
                        if t <= i64::from(start_pv.time) {
                            visible = false;
                            break;
                        }
                        variable.time = t as u32;
                        station.calc_az_el(
                            AzElModel::Rigorous,
                            ctx.time,
                            ctx.astro,
                            source,
                            &mut variable,
                        );
                        station.cable_wrap.calc_unwrapped_az(&start_pv, &mut variable);
                        if !station.is_visible(&variable, source.parameters.min_elevation) {
                            visible = false;
                            break;
                        }
                        let mut target = end_pv;
                        station.cable_wrap.calc_unwrapped_az(&variable, &mut target);
                        slew = station.antenna.slew_time(&variable, &target);
                        // Within one second is good enough.
                        if i64::from(slew) + offset == i64::from(next_slew[k]) - 1 {
                            break;
                        }
                    }
                    if !visible || variable.time <= start_pv.time {
                        continue;
                    }
                    // The walk may stop one round short; never commit an
                    // extension the following slew cannot absorb.
                    let mut target = end_pv;
                    station.cable_wrap.calc_unwrapped_az(&variable, &mut target);
                    let final_slew = station.antenna.slew_time(&variable, &target);
                    if variable.time + final_slew + const_time[k] > end_pv.time + 1 {
                        continue;
                    }
                    self.scans[iscan].set_pointing_end(k, variable);
                } else {
                    // Not needed again: observe until the session ends.
                    let mut variable = start_pv;
                    variable.time = self.time.duration;
                    station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut variable);
                    station.cable_wrap.calc_unwrapped_az(&start_pv, &mut variable);
                    if (start_pv.az - variable.az).abs() > FRAC_PI_2 {
                        continue;
                    }
                    if station.is_visible(&variable, source.parameters.min_elevation) {
                        self.scans[iscan].set_pointing_end(k, variable);
                    }
                }
            }

            {
                let ctx = ScanContext {
                    time: &self.time,
                    astro: &self.astro,
                    mode: &self.config.mode,
                    anchor: self.config.anchor,
                };
                let source = &self.sources[srcid];
                self.scans[iscan].remove_unnecessary_observing_time(&ctx, &self.network, source);
            }

            for k in 0..nthis {
                let new_time = self.scans[iscan].times.observing_time(k);
                if new_time != old_times[k] {
                    debug!(
                        "{}: scan {}: station {} observing time {:+} s",
                        self.name,
                        iscan,
                        self.network.stations[staids[k]].name,
                        i64::from(new_time) - i64::from(old_times[k]),
                    );
                }
            }
        }
    }

    /// Independent re-check of the committed schedule, plus the final
    /// per-entity statistics.
    fn check_and_statistics(&mut self) -> bool {
        info!("{}: starting schedule check", self.name);
        let mut ok = true;
        let mut errors = 0;
        let mut warnings = 0;

        for staid in 0..self.network.nsta() {
            // This station's scans in station-local observing order (the
            // orders can differ for the end or individual anchors).
            let mut entries: Vec<(usize, usize)> = self
                .scans
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.find_idx_of_station(staid).map(|idx| (i, idx)))
                .collect();
            entries.sort_by_key(|&(i, idx)| self.scans[i].times.observing_start(idx));

            let mut stats = StationStatistics::default();
            for &(i, idx) in &entries {
                stats
                    .scan_start_times
                    .push(self.scans[i].times.observing_start(idx));
                stats.total_observing_time += self.scans[i].times.observing_time(idx);
                stats.total_field_system_time += self.scans[i].times.field_system_time(idx);
                stats.total_preob_time += self.scans[i].times.preob_time(idx);
            }

            for pair in entries.windows(2) {
                let (i1, idx1) = pair[0];
                let (i2, idx2) = pair[1];
                let this_end = *self.scans[i1].pointing_end(idx1);
                let next_start = *self.scans[i2].pointing_start(idx2);

                if next_start.time < this_end.time {
                    errors += 1;
                    ok = false;
                    error!(
                        "{}: station {}: scan {} starts before scan {} ends ({} < {})",
                        self.name,
                        self.network.stations[staid].name,
                        i2,
                        i1,
                        self.time.time_string(next_start.time),
                        self.time.time_string(this_end.time),
                    );
                    continue;
                }

                let (slew, const_times) = {
                    let station = &self.network.stations[staid];
                    let mut target = next_start;
                    station.cable_wrap.calc_unwrapped_az(&this_end, &mut target);
                    (
                        station.antenna.slew_time(&this_end, &target),
                        station.wait_times.field_system + station.wait_times.preob,
                    )
                };
                let needed = slew + const_times;
                let available = next_start.time - this_end.time;
                let idle = available.saturating_sub(needed);
                stats.total_slew_time += slew;
                stats.total_idle_time += idle;

                if available + 1 < needed {
                    errors += 1;
                    ok = false;
                    error!(
                        "{}: station {}: not enough time to slew between scans {} and {} \
                         (available {available} s, needed {needed} s)",
                        self.name, self.network.stations[staid].name, i1, i2,
                    );
                } else if idle > LONG_IDLE_WARNING {
                    warnings += 1;
                    warn!(
                        "{}: station {}: long idle time before scan {} ({idle} s)",
                        self.name, self.network.stations[staid].name, i2,
                    );
                }
            }
            self.network.stations[staid].statistics = stats;
        }
        info!(
            "{}: schedule check done: {errors} errors, {warnings} warnings",
            self.name
        );

        self.sort_scans();

        let mut src_stats = vec![SourceStatistics::default(); self.sources.len()];
        let mut bl_stats = vec![BaselineStatistics::default(); self.network.nbls()];
        for scan in &self.scans {
            let start = scan.times.scan_observing_start();
            let duration = scan.times.scan_observing_time();
            src_stats[scan.srcid].scan_start_times.push(start);
            src_stats[scan.srcid].total_observing_time += duration;
            for obs in &scan.observations {
                bl_stats[obs.blid].scan_start_times.push(start);
                bl_stats[obs.blid].total_observing_time += duration;
            }
        }
        for (source, stats) in self.sources.iter_mut().zip(src_stats) {
            source.statistics = stats;
        }
        for (baseline, stats) in self.network.baselines.iter_mut().zip(bl_stats) {
            baseline.statistics = stats;
        }

        ok
    }

    /// Check the per-source optimization conditions. Returns whether a new
    /// iteration with a reduced source list is necessary (the reduction and
    /// the cleanup happen here).
    fn check_optimization_conditions(&mut self) -> bool {
        let opt = self.config.optimization.clone();
        let mut excluded = vec![];
        let mut excluded_scans = 0_u32;
        let mut considered = 0_usize;
        let mut last_excluded = false;

        for source in &mut self.sources {
            if !source.parameters.global_available {
                continue;
            }
            considered += 1;

            let scans_valid = source.n_total_scans >= source.optimization.min_num_scans;
            let obs_valid = source.n_obs >= source.optimization.min_num_obs;
            let exclude = if opt.and_combination {
                !(scans_valid && obs_valid)
            } else {
                !(scans_valid || obs_valid)
            };
            if !exclude {
                continue;
            }

            // Gentle reduction: during the first iterations only every
            // second failing source is dropped.
            if self.current_iteration < opt.number_of_gentle_source_reductions {
                if last_excluded {
                    last_excluded = false;
                    continue;
                }
                last_excluded = true;
            }
            excluded_scans += source.n_total_scans;
            excluded.push(source.name.clone());
            source.parameters.global_available = false;
        }

        let mut restart = !excluded.is_empty();
        if self.current_iteration >= opt.max_number_of_iterations {
            info!("{}: maximum number of iterations reached", self.name);
            restart = false;
        }
        if (excluded.len() as u32) < opt.min_number_of_sources_to_reduce {
            info!(
                "{}: only {} sources would be excluded (minimum {})",
                self.name,
                excluded.len(),
                opt.min_number_of_sources_to_reduce
            );
            restart = false;
        }

        if restart && excluded_scans > 0 {
            let sources_left = considered - excluded.len();
            if sources_left < MIN_SOURCES_AFTER_REDUCTION {
                error!(
                    "{}: abort: only {sources_left} sources left after reduction",
                    self.name
                );
                return false;
            }
            info!(
                "{}: creating new schedule with {sources_left} sources (removed: {})",
                self.name,
                excluded.join(", ")
            );

            self.scans.clear();
            self.network.clear_observations();
            for source in &mut self.sources {
                source.clear_observations();
            }
            self.scan_selections = 0;
            self.calibrator_next = self.config.calibrator.as_ref().map_or(0, |c| c.cadence);
            true
        } else {
            info!("{}: no new iteration needed", self.name);
            false
        }
    }

    /// Log which sources are usable and why the others are not.
    fn list_source_overview(&self) {
        let mut available = 0;
        let mut excluded_optimization = vec![];
        let mut too_weak = vec![];
        let mut too_close_to_sun = vec![];
        let mut unavailable = vec![];

        for source in &self.sources {
            let para = &source.parameters;
            if para.available && para.global_available {
                available += 1;
            } else if !para.global_available {
                excluded_optimization.push(source.name.clone());
            } else if source.max_flux() < para.min_flux {
                too_weak.push(source.name.clone());
            } else if source.sun_distance(&self.astro) < para.min_sun_distance {
                too_close_to_sun.push(source.name.clone());
            } else {
                unavailable.push(source.name.clone());
            }
        }

        info!(
            "{}: {available} of {} sources available",
            self.name,
            self.sources.len()
        );
        if !excluded_optimization.is_empty() {
            debug!(
                "{}: excluded by optimization: {}",
                self.name,
                excluded_optimization.join(", ")
            );
        }
        if !too_weak.is_empty() {
            debug!("{}: too weak: {}", self.name, too_weak.join(", "));
        }
        if !too_close_to_sun.is_empty() {
            debug!(
                "{}: too close to the sun: {}",
                self.name,
                too_close_to_sun.join(", ")
            );
        }
        if !unavailable.is_empty() {
            trace!("{}: not available: {}", self.name, unavailable.join(", "));
        }
    }

    fn log_statistics(&self) {
        let n_obs: usize = self.scans.iter().map(Scan::n_obs).sum();
        info!(
            "{}: summary: {} scans, {} observations; considered {} single and {} subnetting \
             scans ({} total)",
            self.name,
            self.scans.len(),
            n_obs,
            self.n_single_considered,
            self.n_subnetting_considered,
            self.n_single_considered + 2 * self.n_subnetting_considered,
        );
    }

    pub fn n_considered(&self) -> (u64, u64) {
        (self.n_single_considered, self.n_subnetting_considered)
    }

    /// The outer iteration the scheduler finished on.
    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }
}
