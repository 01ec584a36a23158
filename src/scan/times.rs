// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The per-station time anatomy of a scan.

For every participating station six timestamps are kept, all in seconds
since the session start and pairwise nondecreasing:

```text
endOfLastScan <= endOfFieldSystem <= endOfSlew <= endOfIdle
              <= endOfPreob <= endOfObserving
```

Differences between neighbours give the field-system, slew, idle, preob and
observing durations. Aligning a scan moves the idle/preob/observing anchors
so all stations agree with the session's alignment anchor.
 */

use serde::Deserialize;

/// How the per-station observing windows are aligned within a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum AlignmentAnchor {
    /// All stations start observing together.
    Start,
    /// All stations stop observing together.
    End,
    /// Each station gets its individually best window.
    Individual,
}

#[derive(Clone, Debug)]
pub struct ScanTimes {
    end_of_last_scan: Vec<u32>,
    end_of_field_system: Vec<u32>,
    end_of_slew: Vec<u32>,
    end_of_idle: Vec<u32>,
    end_of_preob: Vec<u32>,
    end_of_observing: Vec<u32>,
}

impl ScanTimes {
    pub fn new(end_of_last_scan: Vec<u32>) -> ScanTimes {
        let n = end_of_last_scan.len();
        ScanTimes {
            end_of_last_scan,
            end_of_field_system: vec![0; n],
            end_of_slew: vec![0; n],
            end_of_idle: vec![0; n],
            end_of_preob: vec![0; n],
            end_of_observing: vec![0; n],
        }
    }

    pub fn nsta(&self) -> usize {
        self.end_of_last_scan.len()
    }

    /// Fill in the pre-observation chain of one station. The observing
    /// duration starts at zero.
    pub fn add_times(&mut self, idx: usize, field_system: u32, slew: u32, preob: u32) {
        self.end_of_field_system[idx] = self.end_of_last_scan[idx] + field_system;
        self.end_of_slew[idx] = self.end_of_field_system[idx] + slew;
        self.end_of_idle[idx] = self.end_of_slew[idx];
        self.end_of_preob[idx] = self.end_of_idle[idx] + preob;
        self.end_of_observing[idx] = self.end_of_idle[idx] + preob;
    }

    /// Remove a station and realign the remainder.
    pub fn remove_element(&mut self, idx: usize, anchor: AlignmentAnchor) {
        self.end_of_last_scan.remove(idx);
        self.end_of_field_system.remove(idx);
        self.end_of_slew.remove(idx);
        self.end_of_idle.remove(idx);
        self.end_of_preob.remove(idx);
        self.end_of_observing.remove(idx);
        self.align_start_times(anchor);
    }

    /// Rewrite one station's slew time, shifting its idle/preob/observing
    /// chain accordingly.
    pub fn update_slewtime(&mut self, idx: usize, new_slewtime: u32) {
        if self.slew_time(idx) != new_slewtime {
            let preob = self.preob_time(idx);
            let observing = self.observing_time(idx);

            self.end_of_slew[idx] = self.end_of_field_system[idx] + new_slewtime;
            self.end_of_idle[idx] = self.end_of_slew[idx];
            self.end_of_preob[idx] = self.end_of_idle[idx] + preob;
            self.end_of_observing[idx] = self.end_of_preob[idx] + observing;
        }
    }

    fn remove_idle_time(&mut self) {
        for idx in 0..self.nsta() {
            let preob = self.preob_time(idx);
            let observing = self.observing_time(idx);
            self.end_of_idle[idx] = self.end_of_slew[idx];
            self.end_of_preob[idx] = self.end_of_idle[idx] + preob;
            self.end_of_observing[idx] = self.end_of_preob[idx] + observing;
        }
    }

    /// Align the per-station windows to the anchor, introducing idle time
    /// where stations have to wait for each other.
    pub fn align_start_times(&mut self, anchor: AlignmentAnchor) {
        let nsta = self.nsta();
        if nsta == 0 {
            return;
        }
        self.remove_idle_time();

        match anchor {
            AlignmentAnchor::Start => {
                let latest_start = *self.end_of_preob.iter().max().unwrap();
                for idx in 0..nsta {
                    let preob = self.preob_time(idx);
                    let observing = self.observing_time(idx);
                    self.end_of_idle[idx] = latest_start - preob;
                    self.end_of_preob[idx] = latest_start;
                    self.end_of_observing[idx] = latest_start + observing;
                }
            }
            AlignmentAnchor::End => {
                let latest_end = *self.end_of_observing.iter().max().unwrap();
                for idx in 0..nsta {
                    let preob = self.preob_time(idx);
                    let observing = self.observing_time(idx);
                    self.end_of_observing[idx] = latest_end;
                    self.end_of_preob[idx] = latest_end - observing;
                    self.end_of_idle[idx] = self.end_of_preob[idx] - preob;
                }
            }
            AlignmentAnchor::Individual => {
                let mut idxs: Vec<usize> = (0..nsta).collect();
                idxs.sort_by_key(|&i| self.end_of_slew[i]);

                let max_slew_end = *self.end_of_slew.iter().max().unwrap();
                let (max_obs_idx, &max_obs_end) = self
                    .end_of_observing
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, &end)| end)
                    .unwrap();
                let mut min_obs_start = self.observing_start(max_obs_idx);

                for idx in idxs {
                    let observing = self.observing_time(idx);
                    let preob = self.preob_time(idx);

                    if max_obs_end - min_obs_start <= observing {
                        // Anchor at the end of the longest observation.
                        min_obs_start = max_obs_end - observing;
                        self.end_of_idle[idx] = min_obs_start - preob;
                        self.end_of_preob[idx] = min_obs_start;
                        self.end_of_observing[idx] = max_obs_end;
                    } else {
                        let this_start = self.end_of_slew[idx];
                        if this_start < max_slew_end {
                            if max_slew_end + observing > max_obs_end {
                                // Anchor at the common end. The original
                                // notes this arm may be unreachable; keep it.
                                self.end_of_idle[idx] = max_obs_end - observing - preob;
                                self.end_of_preob[idx] = max_obs_end - observing;
                                self.end_of_observing[idx] = max_obs_end;
                            } else {
                                // Anchor at the latest slew end.
                                self.end_of_idle[idx] = max_slew_end;
                                self.end_of_preob[idx] = max_slew_end + preob;
                                self.end_of_observing[idx] = max_slew_end + preob + observing;
                            }
                        } else {
                            // Already consistent; rebuild without idle time.
                            self.end_of_idle[idx] = self.end_of_slew[idx];
                            self.end_of_preob[idx] = self.end_of_slew[idx] + preob;
                            self.end_of_observing[idx] = self.end_of_preob[idx] + observing;
                        }
                    }
                }
            }
        }
    }

    /// Set the observing durations of all stations and realign.
    pub fn add_scan_times(&mut self, durations: &[u32], anchor: AlignmentAnchor) {
        for idx in 0..self.nsta() {
            self.end_of_observing[idx] = self.end_of_preob[idx] + durations[idx];
        }
        self.align_start_times(anchor);
    }

    /// Append a tagalong station with a pre-fitted chain; the scan's anchors
    /// do not move.
    pub fn add_tagalong_station(
        &mut self,
        observing_start: u32,
        observing_end: u32,
        slewtime: u32,
        current_time: u32,
        field_system: u32,
        preob: u32,
    ) {
        self.end_of_last_scan.push(current_time);
        self.end_of_field_system.push(current_time + field_system);
        self.end_of_slew.push(current_time + field_system + slewtime);
        self.end_of_idle.push(observing_start - preob);
        self.end_of_preob.push(observing_start);
        self.end_of_observing.push(observing_end);
    }

    /// Pull every station's preob in front of the common start, keeping the
    /// observing window. Returns false when some station's idle would fall
    /// before its slew end.
    pub fn subtract_preob_from_start_time(&mut self, preob: u32) -> bool {
        let mut valid = true;
        for idx in 0..self.nsta() {
            self.end_of_idle[idx] = self.end_of_preob[idx].saturating_sub(preob);
            if self.end_of_idle[idx] < self.end_of_slew[idx] {
                valid = false;
            }
        }
        valid
    }

    pub fn set_observing_end(&mut self, idx: usize, time: u32) {
        self.end_of_observing[idx] = time;
    }

    // Per-station accessors.

    pub fn end_of_last_scan(&self, idx: usize) -> u32 {
        self.end_of_last_scan[idx]
    }

    pub fn field_system_time(&self, idx: usize) -> u32 {
        self.end_of_field_system[idx] - self.end_of_last_scan[idx]
    }

    pub fn slew_end(&self, idx: usize) -> u32 {
        self.end_of_slew[idx]
    }

    pub fn slew_time(&self, idx: usize) -> u32 {
        self.end_of_slew[idx] - self.end_of_field_system[idx]
    }

    pub fn idle_time(&self, idx: usize) -> u32 {
        self.end_of_idle[idx] - self.end_of_slew[idx]
    }

    pub fn preob_time(&self, idx: usize) -> u32 {
        self.end_of_preob[idx] - self.end_of_idle[idx]
    }

    pub fn observing_start(&self, idx: usize) -> u32 {
        self.end_of_preob[idx]
    }

    pub fn observing_end(&self, idx: usize) -> u32 {
        self.end_of_observing[idx]
    }

    pub fn observing_time(&self, idx: usize) -> u32 {
        self.end_of_observing[idx] - self.end_of_preob[idx]
    }

    // Scan-wide accessors.

    /// Earliest observing start over all stations.
    pub fn scan_observing_start(&self) -> u32 {
        self.end_of_preob.iter().copied().min().unwrap_or(u32::MAX)
    }

    /// Latest observing end over all stations.
    pub fn scan_observing_end(&self) -> u32 {
        self.end_of_observing.iter().copied().max().unwrap_or(0)
    }

    pub fn scan_observing_time(&self) -> u32 {
        self.scan_observing_end() - self.scan_observing_start()
    }

    /// Earliest start of any activity of this scan.
    pub fn scan_start(&self) -> u32 {
        self.end_of_last_scan.iter().copied().min().unwrap_or(0)
    }

    /// End of the scan; postob is charged to the following gap.
    pub fn scan_end(&self) -> u32 {
        self.scan_observing_end()
    }
}
