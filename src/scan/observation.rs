// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One station pair observing one source within a scan.

#[derive(Clone, Copy, Debug)]
pub struct Observation {
    /// Baseline index within the network.
    pub blid: usize,
    pub staid1: usize,
    pub staid2: usize,
    /// Source index within the catalog.
    pub srcid: usize,
    /// Start of the common on-source window \[s since session start\].
    pub start_time: u32,
    /// Length of the common on-source window \[s\].
    pub observing_time: u32,
}

impl Observation {
    pub fn new(blid: usize, staid1: usize, staid2: usize, srcid: usize, start_time: u32) -> Observation {
        Observation {
            blid,
            staid1,
            staid2,
            srcid,
            start_time,
            observing_time: 0,
        }
    }

    pub fn contains_station(&self, staid: usize) -> bool {
        self.staid1 == staid || self.staid2 == staid
    }
}
