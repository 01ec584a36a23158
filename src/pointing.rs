// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Where a station looks at an instant.

/// The direction one station points at one instant.
///
/// The azimuth is *unwrapped*: it may lie outside [0, 2 pi) to encode which
/// cable-wrap turn the antenna is on. Hour angle and declination ride along
/// for mounts that slew in the equatorial frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointingVector {
    /// Station index within the network.
    pub staid: usize,
    /// Source index within the catalog; `usize::MAX` marks "no source"
    /// (a parked antenna at the session start).
    pub srcid: usize,
    /// Time of this pointing \[s since session start\].
    pub time: u32,
    /// Azimuth \[radians\], possibly unwrapped.
    pub az: f64,
    /// Elevation \[radians\].
    pub el: f64,
    /// Local hour angle \[radians\].
    pub ha: f64,
    /// Declination \[radians\].
    pub dc: f64,
}

/// Marker for "points at no source".
pub const NO_SOURCE: usize = usize::MAX;

impl PointingVector {
    pub fn new(staid: usize, srcid: usize, time: u32) -> PointingVector {
        PointingVector {
            staid,
            srcid,
            time,
            az: 0.0,
            el: 0.0,
            ha: 0.0,
            dc: 0.0,
        }
    }
}
