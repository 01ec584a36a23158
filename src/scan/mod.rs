// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
A scan: one source, a set of stations, aligned times, observations.

A scan is built in stages. `visible_scan` starts with every station that can
see the source; the following stages compute slews and start times, recheck
the geometry at the actual observing start, enumerate baselines, derive
SNR-driven durations and align everything to the session anchor. Stations
drop out along the way; a scan stays alive while it keeps enough stations.
 */

pub mod observation;
pub mod times;

use std::collections::HashSet;

use log::trace;
use strum_macros::Display;

use crate::astro::AstroData;
use crate::constants::{FRAC_PI_2, SNR_EQUATION_CONST};
use crate::endposition::StationEndposition;
use crate::network::Network;
use crate::obsmode::ObservingMode;
use crate::pointing::PointingVector;
use crate::source::Source;
use crate::station::AzElModel;
use crate::time::TimeSystem;
use observation::Observation;
use times::{AlignmentAnchor, ScanTimes};

/// Read-only bundle the scan pipeline needs at every stage.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub time: &'a TimeSystem,
    pub astro: &'a AstroData,
    pub mode: &'a ObservingMode,
    pub anchor: AlignmentAnchor,
}

/// Why a scan exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ScanType {
    #[strum(serialize = "standard")]
    Standard,
    #[strum(serialize = "subnetting")]
    Subnetting,
    #[strum(serialize = "fillin")]
    Fillin,
    #[strum(serialize = "calibrator")]
    Calibrator,
    #[strum(serialize = "highImpact")]
    HighImpact,
}

#[derive(Clone, Debug)]
pub struct Scan {
    pub srcid: usize,
    pub scan_type: ScanType,
    /// Participating stations; ascending from construction, tagalong
    /// stations append.
    station_ids: Vec<usize>,
    pub times: ScanTimes,
    pointings_start: Vec<PointingVector>,
    pointings_end: Vec<PointingVector>,
    pub observations: Vec<Observation>,
    pub score: f64,
}

impl Scan {
    /// Start a candidate scan with every station that can observe the
    /// source right now. Returns `None` when the source is barred or too few
    /// stations see it.
    pub fn visible_scan(
        ctx: &ScanContext,
        current_time: u32,
        scan_type: ScanType,
        network: &Network,
        source: &Source,
        srcid: usize,
        exclude_sources: &HashSet<usize>,
    ) -> Option<Scan> {
        let para = &source.parameters;
        if !para.available || !para.global_available {
            return None;
        }
        if source.max_flux() < para.min_flux {
            return None;
        }
        if source.sun_distance(ctx.astro) < para.min_sun_distance {
            return None;
        }
        if exclude_sources.contains(&srcid) {
            return None;
        }
        if source.n_total_scans >= para.max_number_of_scans {
            return None;
        }
        if source.n_total_scans > 0 && current_time < source.last_scan_time + para.min_repeat {
            return None;
        }

        let mut station_ids = vec![];
        let mut pointings_start = vec![];
        let mut end_of_last_scan = vec![];
        for (staid, station) in network.stations.iter().enumerate() {
            if !station.parameters.available || station.parameters.tagalong {
                continue;
            }
            if station.parameters.ignore_sources.contains(&srcid)
                || para.ignore_stations.contains(&staid)
            {
                continue;
            }

            let mut pv = PointingVector::new(staid, srcid, current_time.max(station.current_time()));
            station.calc_az_el(AzElModel::Simple, ctx.time, ctx.astro, source, &mut pv);
            if !station.is_visible(&pv, para.min_elevation) {
                continue;
            }

            station_ids.push(staid);
            pointings_start.push(pv);
            end_of_last_scan.push(station.current_time());
        }

        let scan = Scan {
            srcid,
            scan_type,
            station_ids,
            times: ScanTimes::new(end_of_last_scan),
            pointings_start,
            pointings_end: vec![],
            observations: vec![],
            score: 0.0,
        };
        if scan.enough_stations(source) {
            Some(scan)
        } else {
            None
        }
    }

    /// Compute field-system, slew and preob durations per station and align
    /// the provisional start. Stations whose slew is not reachable drop out.
    pub fn calc_start_times(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        endposition: Option<&StationEndposition>,
    ) -> bool {
        let mut idx = 0;
        while idx < self.station_ids.len() {
            let staid = self.station_ids[idx];
            let station = &network.stations[staid];
            let (fs, preob) = if station.parameters.first_scan {
                (0, 0)
            } else {
                (station.wait_times.field_system, station.wait_times.preob)
            };

            let mut pv = self.pointings_start[idx];
            match station.slew_time(&mut pv) {
                Some(slew) => {
                    self.times.add_times(idx, fs, slew, preob);
                    self.pointings_start[idx] = pv;

                    // Stations that could never make their deadline are
                    // hopeless regardless of what the scan ends up being.
                    if let Some(ep) = endposition {
                        let deadline = ep.required_endposition_time(staid);
                        let min_scan = station.parameters.min_scan.max(source.parameters.min_scan);
                        if self.times.observing_start(idx) + min_scan > deadline {
                            self.remove_station(ctx, idx);
                            continue;
                        }
                    }
                    idx += 1;
                }
                None => {
                    trace!(
                        "scan of {}: station {} dropped, not reachable",
                        source.name,
                        station.name
                    );
                    self.remove_station(ctx, idx);
                }
            }
        }

        self.times.align_start_times(ctx.anchor);
        self.enough_stations(source)
    }

    /// Recompute each station's pointing at its aligned observing start with
    /// the rigorous model; stations that lost the source drop out.
    pub fn update_az_el(&mut self, ctx: &ScanContext, network: &Network, source: &Source) -> bool {
        let mut idx = 0;
        while idx < self.station_ids.len() {
            let staid = self.station_ids[idx];
            let station = &network.stations[staid];

            let old_az = self.pointings_start[idx].az;
            let mut pv = self.pointings_start[idx];
            pv.time = self.times.observing_start(idx);
            station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut pv);
            station.cable_wrap.unwrap_az_near_az(&mut pv, old_az);

            // An unwrap that jumps turns relative to the slew target is a
            // cable-wrap conflict.
            if (pv.az - old_az).abs() > FRAC_PI_2
                || !station.is_visible(&pv, source.parameters.min_elevation)
            {
                self.remove_station(ctx, idx);
                continue;
            }
            self.pointings_start[idx] = pv;
            idx += 1;
        }
        self.enough_stations(source)
    }

    /// Enumerate the observations of all station pairs that are allowed on
    /// this source.
    pub fn construct_all_baselines(&mut self, network: &Network, source: &Source) -> bool {
        self.observations.clear();
        for i in 0..self.station_ids.len() {
            for j in (i + 1)..self.station_ids.len() {
                let (s1, s2) = (self.station_ids[i], self.station_ids[j]);
                let blid = match network.baseline_index(s1, s2) {
                    Some(blid) => blid,
                    None => continue,
                };
                if network.baselines[blid].parameters.ignore {
                    continue;
                }
                if source.parameters.ignore_baselines.contains(&blid) {
                    continue;
                }
                let start = self
                    .times
                    .observing_start(i)
                    .max(self.times.observing_start(j));
                self.observations
                    .push(Observation::new(blid, s1, s2, self.srcid, start));
            }
        }
        !self.observations.is_empty()
    }

    /// The on-source time a baseline needs so the weakest band reaches its
    /// required SNR, clamped into the joint scan-length window. `None` when
    /// no duration satisfies every constraint.
    fn baseline_duration(
        &self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        obs: &Observation,
    ) -> Option<u32> {
        if let Some(fixed) = source.parameters.fixed_scan_duration {
            return Some(fixed);
        }

        let sta1 = &network.stations[obs.staid1];
        let sta2 = &network.stations[obs.staid2];
        let bl = &network.baselines[obs.blid];
        let idx1 = self.find_idx_of_station(obs.staid1)?;
        let idx2 = self.find_idx_of_station(obs.staid2)?;
        let el1 = self.pointings_start[idx1].el;
        let el2 = self.pointings_start[idx2].el;
        let gmst = ctx.time.gmst_at(obs.start_time);
        let dxyz = network.dxyz(obs.staid1, obs.staid2);

        let mut duration = 0_u32;
        for (band_name, band) in &ctx.mode.bands {
            let (sefd1, sefd2) = match (
                sta1.equip.sefd(band_name, el1),
                sta2.equip.sefd(band_name, el2),
            ) {
                (Some(a), Some(b)) => (a, b),
                // A missing non-required band does not constrain the pair.
                _ => continue,
            };

            let snr = |m: &std::collections::HashMap<String, f64>| {
                m.get(band_name).copied().unwrap_or(0.0)
            };
            let min_snr = snr(&source.parameters.min_snr)
                .max(snr(&sta1.parameters.min_snr))
                .max(snr(&sta2.parameters.min_snr))
                .max(snr(&bl.parameters.min_snr));
            if min_snr <= 0.0 {
                continue;
            }

            let observed_flux =
                source.observed_flux(band_name, band.wavelength, gmst, dxyz)?;
            if observed_flux <= 0.0 {
                return None;
            }

            let max_cor_synch = sta1.wait_times.midob.max(sta2.wait_times.midob);
            let anum = SNR_EQUATION_CONST * min_snr / observed_flux;
            let anu1 = sefd1 * sefd2;
            let anu2 = ctx.mode.sample_rate * 1.0e6 * f64::from(band.channels)
                * f64::from(ctx.mode.bits);
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
        Some(duration)
    }

    /// Derive every observation's required duration; baselines that cannot
    /// reach their SNR inside the scan-length window drop out.
    pub fn calc_all_baseline_durations(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) -> bool {
        let mut kept = Vec::with_capacity(self.observations.len());
        for mut obs in std::mem::take(&mut self.observations) {
            match self.baseline_duration(ctx, network, source, &obs) {
                Some(duration) => {
                    obs.observing_time = duration;
                    kept.push(obs);
                }
                None => trace!(
                    "scan of {}: baseline {} dropped, SNR not reachable",
                    source.name,
                    network.baselines[obs.blid].name
                ),
            }
        }
        self.observations = kept;
        !self.observations.is_empty()
    }

    /// Aggregate per-station durations, align the scan and settle the
    /// observation windows.
    pub fn calc_all_scan_durations(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) -> bool {
        loop {
            // A station whose every baseline dropped no longer observes.
            if let Some(idx) = (0..self.station_ids.len()).find(|&idx| {
                let staid = self.station_ids[idx];
                !self.observations.iter().any(|o| o.contains_station(staid))
            }) {
                self.remove_station(ctx, idx);
                if self.station_ids.is_empty() {
                    return false;
                }
                continue;
            }

            let durations: Vec<u32> = self
                .station_ids
                .iter()
                .map(|&staid| {
                    self.observations
                        .iter()
                        .filter(|o| o.contains_station(staid))
                        .map(|o| o.observing_time)
                        .max()
                        .unwrap_or(0)
                })
                .collect();
            self.times.add_scan_times(&durations, ctx.anchor);

            // Alignment may have bought some station more idle time than its
            // policy tolerates.
            if let Some(idx) = (0..self.station_ids.len()).find(|&idx| {
                let staid = self.station_ids[idx];
                self.times.idle_time(idx) > network.stations[staid].parameters.max_wait
            }) {
                self.remove_station(ctx, idx);
                if self.station_ids.is_empty() {
                    return false;
                }
                continue;
            }
            break;
        }

        self.refresh_observation_windows();
        self.enough_stations(source) && !self.observations.is_empty()
    }

    /// Verify each station can observe this scan and still make its
    /// deadline; stations that cannot drop out.
    pub fn check_if_enough_time_to_reach_endposition(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        endposition: Option<&StationEndposition>,
    ) -> bool {
        let ep = match endposition {
            Some(ep) => ep,
            None => return self.enough_stations(source),
        };

        let mut idx = 0;
        let mut removed = false;
        while idx < self.station_ids.len() {
            let staid = self.station_ids[idx];
            let station = &network.stations[staid];

            let mut pv_end = self.pointings_start[idx];
            pv_end.time = self.times.observing_end(idx);
            station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut pv_end);
            station
                .cable_wrap
                .unwrap_az_near_az(&mut pv_end, self.pointings_start[idx].az);

            let slew = match ep.final_position(staid) {
                Some(final_pv) => {
                    let mut target = *final_pv;
                    station.cable_wrap.calc_unwrapped_az(&pv_end, &mut target);
                    station.antenna.slew_time(&pv_end, &target)
                }
                None => 0,
            };
            let wt = &station.wait_times;
            let needed = self.times.observing_end(idx) + wt.field_system + slew + wt.preob;
            if needed > ep.required_endposition_time(staid) {
                self.remove_station(ctx, idx);
                removed = true;
                continue;
            }
            idx += 1;
        }

        if removed {
            self.refresh_observation_windows();
        }
        self.enough_stations(source) && !self.observations.is_empty()
    }

    /// Final geometry pass: recompute slews against the stations' current
    /// pointings, re-align, recheck visibility at the final times and fill
    /// in the end pointings. This is the "rigorous" check run on a candidate
    /// before it is allowed to win.
    pub fn rigorous_update(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        endposition: Option<&StationEndposition>,
    ) -> bool {
        // Slew times depend on start times and vice versa; a few passes
        // settle the fixpoint.
        for _ in 0..3 {
            let mut stable = true;
            let mut idx = 0;
            while idx < self.station_ids.len() {
                let staid = self.station_ids[idx];
                let station = &network.stations[staid];

                let mut pv = self.pointings_start[idx];
                pv.time = self.times.observing_start(idx);
                station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut pv);
                match station.slew_time(&mut pv) {
                    Some(slew) => {
                        if !station.is_visible(&pv, source.parameters.min_elevation) {
                            self.remove_station(ctx, idx);
                            stable = false;
                            continue;
                        }
                        if slew != self.times.slew_time(idx) {
                            self.times.update_slewtime(idx, slew);
                            stable = false;
                        }
                        self.pointings_start[idx] = pv;
                        idx += 1;
                    }
                    None => {
                        self.remove_station(ctx, idx);
                        stable = false;
                    }
                }
            }
            if self.station_ids.is_empty() {
                return false;
            }
            self.times.align_start_times(ctx.anchor);
            if stable {
                break;
            }
        }

        if !self.enough_stations(source) {
            return false;
        }

        // SNR durations move with the start times; re-derive and re-settle.
        if !self.calc_all_baseline_durations(ctx, network, source) {
            return false;
        }
        if !self.calc_all_scan_durations(ctx, network, source) {
            return false;
        }
        if !self.check_if_enough_time_to_reach_endposition(ctx, network, source, endposition) {
            return false;
        }

        self.finalize_end_pointings(ctx, network, source)
    }

    /// Compute the end pointing of every station, dropping stations that
    /// lose the source (or their cable-wrap turn) before their observing
    /// end.
    fn finalize_end_pointings(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) -> bool {
        self.pointings_end.clear();
        let mut idx = 0;
        while idx < self.station_ids.len() {
            let staid = self.station_ids[idx];
            let station = &network.stations[staid];

            let mut pv = self.pointings_start[idx];
            pv.time = self.times.observing_end(idx);
            station.calc_az_el(AzElModel::Rigorous, ctx.time, ctx.astro, source, &mut pv);
            station
                .cable_wrap
                .unwrap_az_near_az(&mut pv, self.pointings_start[idx].az);

            if (pv.az - self.pointings_start[idx].az).abs() > FRAC_PI_2
                || !station.is_visible(&pv, source.parameters.min_elevation)
            {
                self.remove_station(ctx, idx);
                self.refresh_observation_windows();
                continue;
            }
            self.pointings_end.push(pv);
            idx += 1;
        }
        self.enough_stations(source) && !self.observations.is_empty()
    }

    /// Trim each station's observing window to what its baselines need,
    /// given (possibly extended) end pointings. Used by the idle-time
    /// extension pass.
    pub fn remove_unnecessary_observing_time(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) {
        // Window available per station: up to its (extended) end pointing.
        let window_end: Vec<u32> = self.pointings_end.iter().map(|pv| pv.time).collect();

        for obs in &mut self.observations {
            let idx1 = self.station_ids.iter().position(|&s| s == obs.staid1);
            let idx2 = self.station_ids.iter().position(|&s| s == obs.staid2);
            if let (Some(i1), Some(i2)) = (idx1, idx2) {
                let end = window_end[i1].min(window_end[i2]);
                obs.observing_time = end.saturating_sub(obs.start_time);
            }
        }

        for idx in 0..self.station_ids.len() {
            let staid = self.station_ids[idx];
            let end = self
                .observations
                .iter()
                .filter(|o| o.contains_station(staid))
                .map(|o| o.start_time + o.observing_time)
                .max()
                .unwrap_or_else(|| self.times.observing_end(idx));
            self.times.set_observing_end(idx, end);
            if self.pointings_end[idx].time != end {
                self.pointings_end[idx].time = end;
                let station = &network.stations[staid];
                let old_az = self.pointings_end[idx].az;
                station.calc_az_el(
                    AzElModel::Rigorous,
                    ctx.time,
                    ctx.astro,
                    source,
                    &mut self.pointings_end[idx],
                );
                station
                    .cable_wrap
                    .unwrap_az_near_az(&mut self.pointings_end[idx], old_az);
            }
        }
    }

    /// Try to add a tagalong station without moving the scan. The caller has
    /// already validated visibility, slew and durations.
    #[allow(clippy::too_many_arguments)]
    pub fn add_tagalong_station(
        &mut self,
        pv_start: PointingVector,
        pv_end: PointingVector,
        observations: Vec<Observation>,
        slewtime: u32,
        current_time: u32,
        field_system: u32,
        preob: u32,
    ) {
        self.station_ids.push(pv_start.staid);
        self.times.add_tagalong_station(
            pv_start.time,
            pv_end.time,
            slewtime,
            current_time,
            field_system,
            preob,
        );
        self.pointings_start.push(pv_start);
        self.pointings_end.push(pv_end);
        self.observations.extend(observations);
    }

    /// Recompute every observation's common window from the aligned times.
    fn refresh_observation_windows(&mut self) {
        let ids = &self.station_ids;
        let times = &self.times;
        self.observations.retain_mut(|obs| {
            let idx1 = ids.iter().position(|&s| s == obs.staid1);
            let idx2 = ids.iter().position(|&s| s == obs.staid2);
            match (idx1, idx2) {
                (Some(i1), Some(i2)) => {
                    let start = times.observing_start(i1).max(times.observing_start(i2));
                    let end = times.observing_end(i1).min(times.observing_end(i2));
                    if end <= start {
                        return false;
                    }
                    obs.start_time = start;
                    obs.observing_time = end - start;
                    true
                }
                // A participant of this pair has left the scan.
                _ => false,
            }
        });
    }

    fn remove_station(&mut self, ctx: &ScanContext, idx: usize) {
        let staid = self.station_ids.remove(idx);
        self.pointings_start.remove(idx);
        if idx < self.pointings_end.len() {
            self.pointings_end.remove(idx);
        }
        self.observations.retain(|o| !o.contains_station(staid));
        self.times.remove_element(idx, ctx.anchor);
    }

    fn enough_stations(&self, source: &Source) -> bool {
        let required = &source.parameters.required_stations;
        if !required.is_empty() && !required.iter().all(|r| self.station_ids.contains(r)) {
            return false;
        }
        self.station_ids.len() >= source.parameters.min_number_of_stations.max(2)
    }

    // Accessors.

    pub fn n_sta(&self) -> usize {
        self.station_ids.len()
    }

    pub fn n_obs(&self) -> usize {
        self.observations.len()
    }

    /// Observations a given station takes part in.
    pub fn n_obs_of_station(&self, staid: usize) -> u32 {
        self.observations
            .iter()
            .filter(|o| o.contains_station(staid))
            .count() as u32
    }

    pub fn station_ids(&self) -> &[usize] {
        &self.station_ids
    }

    pub fn station_id(&self, idx: usize) -> usize {
        self.station_ids[idx]
    }

    pub fn find_idx_of_station(&self, staid: usize) -> Option<usize> {
        self.station_ids.iter().position(|&s| s == staid)
    }

    pub fn pointing_start(&self, idx: usize) -> &PointingVector {
        &self.pointings_start[idx]
    }

    /// The end pointing; only available once the scan passed its rigorous
    /// update.
    pub fn pointing_end(&self, idx: usize) -> &PointingVector {
        &self.pointings_end[idx]
    }

    pub fn set_pointing_end(&mut self, idx: usize, pv: PointingVector) {
        self.pointings_end[idx] = pv;
    }

    pub fn has_end_pointings(&self) -> bool {
        self.pointings_end.len() == self.station_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{overhead_source, scan_context, two_station_network, TestSession};

    /// Run the full candidate pipeline the way the subcon does.
    fn build(
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        current_time: u32,
    ) -> Option<Scan> {
        let mut scan = Scan::visible_scan(
            ctx,
            current_time,
            ScanType::Standard,
            network,
            source,
            0,
            &HashSet::new(),
        )?;
        if !scan.calc_start_times(ctx, network, source, None) {
            return None;
        }
        if !scan.update_az_el(ctx, network, source) {
            return None;
        }
        if !scan.construct_all_baselines(network, source) {
            return None;
        }
        if !scan.calc_all_baseline_durations(ctx, network, source) {
            return None;
        }
        if !scan.calc_all_scan_durations(ctx, network, source) {
            return None;
        }
        Some(scan)
    }

    #[test]
    fn pipeline_produces_an_aligned_scan() {
        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let source = overhead_source(&time, &network, 1800);
        let ctx = scan_context(&time, &astro);

        let scan = build(&ctx, &network, &source, 0).expect("scan should be feasible");
        assert_eq!(scan.n_sta(), 2);
        assert_eq!(scan.n_obs(), 1);

        // Start-aligned: common observing start, per-station durations.
        assert_eq!(
            scan.times.observing_start(0),
            scan.times.observing_start(1)
        );
        let obs = &scan.observations[0];
        assert!(obs.observing_time >= 20);
        assert_eq!(obs.start_time, scan.times.observing_start(0));

        // The derived duration respects the per-baseline window.
        for idx in 0..scan.n_sta() {
            assert_eq!(scan.times.observing_time(idx), obs.observing_time);
        }
    }

    #[test]
    fn rigorous_update_confirms_a_good_scan() {
        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let source = overhead_source(&time, &network, 1800);
        let ctx = scan_context(&time, &astro);

        let mut scan = build(&ctx, &network, &source, 0).unwrap();
        assert!(scan.rigorous_update(&ctx, &network, &source, None));
        assert!(scan.has_end_pointings());
        for idx in 0..scan.n_sta() {
            assert_eq!(scan.pointing_end(idx).time, scan.times.observing_end(idx));
            // End pointing stays on the same cable-wrap turn.
            assert!((scan.pointing_end(idx).az - scan.pointing_start(idx).az).abs() < FRAC_PI_2);
        }
    }

    #[test]
    fn unavailable_source_yields_no_scan() {
        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let mut source = overhead_source(&time, &network, 1800);
        let ctx = scan_context(&time, &astro);

        source.parameters.available = false;
        assert!(Scan::visible_scan(
            &ctx,
            0,
            ScanType::Standard,
            &network,
            &source,
            0,
            &HashSet::new()
        )
        .is_none());
    }

    #[test]
    fn min_repeat_blocks_immediate_rescheduling() {
        let TestSession { time, astro } = TestSession::new();
        let network = two_station_network();
        let mut source = overhead_source(&time, &network, 1800);
        let ctx = scan_context(&time, &astro);

        source.update(1, 1000, true);
        assert!(Scan::visible_scan(
            &ctx,
            1500,
            ScanType::Standard,
            &network,
            &source,
            0,
            &HashSet::new()
        )
        .is_none());
        // After the repeat interval the source is fair game again.
        assert!(Scan::visible_scan(
            &ctx,
            1000 + source.parameters.min_repeat,
            ScanType::Standard,
            &network,
            &source,
            0,
            &HashSet::new()
        )
        .is_some());
    }

    #[test]
    fn snr_scales_quadratically() {
        let TestSession { time, astro } = TestSession::new();
        let mut network = two_station_network();
        // Unclamp so the raw SNR time is visible.
        for station in &mut network.stations {
            station.parameters.min_scan = 0;
        }
        let network = network;
        let ctx = scan_context(&time, &astro);

        // Durations for two required SNRs differing by 2x; subtract the
        // constant midob margin before comparing.
        let midob = network.stations[0].wait_times.midob;
        let duration_for = |snr: f64| -> u32 {
            let mut source = overhead_source(&time, &network, 1800);
            source.parameters.min_snr.insert("X".to_string(), snr);
            source.parameters.min_scan = 0;
            source.parameters.max_scan = 99999;
            let scan = build(&ctx, &network, &source, 0).unwrap();
            scan.observations[0].observing_time - midob
        };

        let d1 = duration_for(50.0);
        let d2 = duration_for(100.0);
        // Quadrupling up to the ceil() rounding of each branch.
        assert!(d2 >= 4 * d1 - 4 && d2 <= 4 * d1 + 4, "d1 {d1} d2 {d2}");
    }
}
