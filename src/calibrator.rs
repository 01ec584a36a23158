// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Calibrator block policy.

At a fixed cadence the scheduler interrupts ordinary selection and picks
scans from a calibrator source list until every station has observed both a
low-elevation and a high-elevation calibrator (or the block's scan budget is
spent). The elevation "coverage" per station is tracked as two scores in
[0, 1] that the block drives towards one.
 */

use serde::Deserialize;

/// What the block cadence counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum CadenceUnit {
    /// Every n-th scan selection.
    Scans,
    /// Every n seconds of session time.
    Seconds,
}

/// How long a calibrator scan should be.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub enum TargetScanLength {
    /// Use the ordinary SNR-derived durations.
    Parameters,
    /// Override the per-band minimum SNR.
    MinSnr(std::collections::HashMap<String, f64>),
    /// A fixed number of seconds.
    Seconds(u32),
}

#[derive(Clone, Debug, Deserialize)]
pub struct CalibratorBlock {
    pub cadence: u32,
    pub cadence_unit: CadenceUnit,
    /// Sources allowed as calibrators.
    pub source_ids: Vec<usize>,
    /// Hard cap on scans per block.
    pub nmax_scans: u32,
    pub target_scan_length: TargetScanLength,

    /// Elevation above which a scan contributes nothing to the low score
    /// \[radians\].
    pub low_elevation_start: f64,
    /// Elevation below which a scan fully covers the low score \[radians\].
    pub low_elevation_full: f64,
    /// Elevation below which a scan contributes nothing to the high score
    /// \[radians\].
    pub high_elevation_start: f64,
    /// Elevation above which a scan fully covers the high score \[radians\].
    pub high_elevation_full: f64,
}

impl CalibratorBlock {
    /// The (low, high) elevation coverage scores of one pointing.
    pub fn elevation_scores(&self, el: f64) -> (f64, f64) {
        let low = if el > self.low_elevation_start {
            0.0
        } else if el < self.low_elevation_full {
            1.0
        } else {
            (self.low_elevation_start - el) / (self.low_elevation_start - self.low_elevation_full)
        };

        let high = if el < self.high_elevation_start {
            0.0
        } else if el > self.high_elevation_full {
            1.0
        } else {
            (el - self.high_elevation_start)
                / (self.high_elevation_full - self.high_elevation_start)
        };

        (low, high)
    }
}
