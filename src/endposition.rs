// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Required end positions for fill-in blocks.

A fill-in scan must not delay anything already committed. This structure
records, per station, the earliest upcoming pointing the station is already
committed to, and answers whether squeezing another scan in front of it is
even conceivable.
 */

use std::collections::HashSet;

use crate::pointing::PointingVector;
use crate::station::Station;

/// Minimal slew allowance when estimating whether a station can still fit a
/// fill-in scan \[s\].
const MIN_SLEW_ALLOWANCE: u32 = 5;

#[derive(Clone, Debug)]
pub struct StationEndposition {
    /// Whether the station was available when the block started (restored
    /// afterwards).
    station_available: Vec<bool>,
    /// Whether the station can still fit a scan before its deadline.
    station_possible: Vec<bool>,
    /// The next committed pointing per station, if any.
    final_position: Vec<Option<PointingVector>>,
    /// Earliest observing start over all recorded end positions.
    earliest_scan_start: u32,
}

impl StationEndposition {
    pub fn new(nsta: usize) -> StationEndposition {
        StationEndposition {
            station_available: vec![false; nsta],
            station_possible: vec![false; nsta],
            final_position: vec![None; nsta],
            earliest_scan_start: u32::MAX,
        }
    }

    /// Record a committed pointing as a station's deadline. An earlier
    /// pointing for the same station wins.
    pub fn add_pointing_vector_as_endposition(&mut self, pv: &PointingVector) {
        let staid = pv.staid;
        match &self.final_position[staid] {
            Some(existing) if pv.time >= existing.time => {}
            _ => self.final_position[staid] = Some(*pv),
        }
        if pv.time < self.earliest_scan_start {
            self.earliest_scan_start = pv.time;
        }
    }

    /// Estimate per station whether another scan fits before its deadline:
    /// field system, preob, postob, a token slew and the minimum scan length
    /// must fit into the remaining time. Returns whether at least two
    /// stations remain possible.
    pub fn check_station_possibility(&mut self, stations: &[Station]) -> bool {
        for (staid, station) in stations.iter().enumerate() {
            if !station.parameters.available {
                self.station_possible[staid] = false;
                continue;
            }

            let start = station.current_time();
            let end = match &self.final_position[staid] {
                Some(pv) => pv.time,
                None => self.earliest_scan_start,
            };
            if end <= start {
                self.station_possible[staid] = false;
                continue;
            }

            let wt = &station.wait_times;
            let required = wt.field_system
                + wt.preob
                + MIN_SLEW_ALLOWANCE
                + wt.postob
                + station.parameters.min_scan;
            self.station_possible[staid] = (end - start) > required;
        }
        self.station_possible.iter().filter(|&&p| p).count() >= 2
    }

    /// The deadline for a station: its recorded end position, or the
    /// earliest scan start when it has none.
    pub fn required_endposition_time(&self, staid: usize) -> u32 {
        match &self.final_position[staid] {
            Some(pv) => pv.time,
            None => self.earliest_scan_start,
        }
    }

    pub fn has_endposition(&self, staid: usize) -> bool {
        self.final_position[staid].is_some()
    }

    pub fn final_position(&self, staid: usize) -> Option<&PointingVector> {
        self.final_position[staid].as_ref()
    }

    pub fn every_station_initialized(&self) -> bool {
        self.final_position.iter().all(Option::is_some)
    }

    /// The sources already committed right after this block; fill-in
    /// selection excludes them.
    pub fn observed_sources(&self) -> HashSet<usize> {
        self.final_position
            .iter()
            .flatten()
            .map(|pv| pv.srcid)
            .collect()
    }

    pub fn earliest_scan_start(&self) -> u32 {
        self.earliest_scan_start
    }

    /// Remember each station's availability so it can be restored when the
    /// block ends.
    pub fn set_station_available(&mut self, stations: &[Station]) {
        for (avail, station) in self.station_available.iter_mut().zip(stations) {
            *avail = station.parameters.available;
        }
    }

    pub fn station_possible(&self, staid: usize) -> bool {
        self.station_possible[staid]
    }

    pub fn station_available(&self, staid: usize) -> bool {
        self.station_available[staid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_endposition_wins() {
        let mut endp = StationEndposition::new(2);
        let mut late = PointingVector::new(0, 3, 5000);
        late.az = 1.0;
        let mut early = PointingVector::new(0, 4, 3000);
        early.az = 2.0;

        endp.add_pointing_vector_as_endposition(&late);
        endp.add_pointing_vector_as_endposition(&early);
        // A later one for the same station does not displace it.
        endp.add_pointing_vector_as_endposition(&late);

        assert_eq!(endp.required_endposition_time(0), 3000);
        assert_eq!(endp.earliest_scan_start(), 3000);
        // Station 1 has no endposition and falls back to the earliest start.
        assert_eq!(endp.required_endposition_time(1), 3000);
        assert!(!endp.every_station_initialized());
        assert_eq!(endp.observed_sources(), HashSet::from([3, 4]));
    }
}
