// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared fixtures for the unit tests: a small session, a two/three station
//! network on the equator and sources placed relative to it.

use std::collections::HashMap;

use chrono::TimeZone;

use crate::antenna::{Antenna, AxisType};
use crate::astro::AstroData;
use crate::cable_wrap::{CableWrap, CableWrapKind};
use crate::equip::{Equipment, Sefd};
use crate::network::Network;
use crate::obsmode::ObservingMode;
use crate::scan::times::AlignmentAnchor;
use crate::scan::ScanContext;
use crate::skycov::SkyCoverageConfig;
use crate::source::{Flux, Source};
use crate::station::{Position, Station};
use crate::time::TimeSystem;

pub struct TestSession {
    pub time: TimeSystem,
    pub astro: AstroData,
}

impl TestSession {
    /// One day starting 2018-11-14 17:00 UT.
    pub fn new() -> TestSession {
        let start = chrono::Utc.ymd(2018, 11, 14).and_hms(17, 0, 0);
        let end = chrono::Utc.ymd(2018, 11, 15).and_hms(17, 0, 0);
        let time = TimeSystem::new(start, end).unwrap();
        let astro = AstroData::precompute(&time);
        TestSession { time, astro }
    }

}

/// A single-band X mode: 32 MHz, 2 bit, 16 channels.
pub fn test_mode() -> ObservingMode {
    ObservingMode::single_band("X", 0.0349, 16, 32.0, 2)
}

pub fn scan_context<'a>(time: &'a TimeSystem, astro: &'a AstroData) -> ScanContext<'a> {
    // The mode is small; tests leak one copy each rather than thread an
    // owner through every helper.
    let mode = Box::leak(Box::new(test_mode()));
    ScanContext {
        time,
        astro,
        mode,
        anchor: AlignmentAnchor::Start,
    }
}

/// An all-sky AzEl station near the equator, displaced east by `east_km`.
pub fn test_station(staid: usize, code: &str, east_km: f64) -> Station {
    let lon = east_km * 1000.0 / 6_378_137.0;
    Station::new(
        staid,
        format!("TEST{staid}"),
        code.to_string(),
        code.chars().next().unwrap(),
        Position::new(
            6_378_137.0 * lon.cos(),
            6_378_137.0 * lon.sin(),
            0.0,
        ),
        Antenna::new(AxisType::AzEl, 0.0, 20.0, 120.0, 6, 60.0, 6),
        // Elevation all the way to the zenith, no mask.
        CableWrap::new(CableWrapKind::AzEl, -90.0, 450.0, 0.0, 90.0),
        None,
        Equipment::new(HashMap::from([("X".to_string(), Sefd::Constant(1000.0))])),
    )
}

pub fn two_station_network() -> Network {
    Network::new(
        vec![test_station(0, "Aa", 0.0), test_station(1, "Bb", 100.0)],
        SkyCoverageConfig::default(),
    )
}

pub fn three_station_network() -> Network {
    Network::new(
        vec![
            test_station(0, "Aa", 0.0),
            test_station(1, "Bb", 100.0),
            test_station(2, "Cc", 250.0),
        ],
        SkyCoverageConfig::default(),
    )
}

/// A 1 Jy flat-spectrum source that culminates over the first station at
/// internal time `transit`.
pub fn overhead_source(time: &TimeSystem, network: &Network, transit: u32) -> Source {
    let lon = network.stations[0].position.lon;
    let ra = time.gmst_at(transit) + lon;
    source_at(ra, 0.0)
}

/// A 1 Jy flat-spectrum source at the given coordinates.
pub fn source_at(ra: f64, dec: f64) -> Source {
    let flux = HashMap::from([(
        "X".to_string(),
        Flux::B {
            knots: vec![0.0],
            values: vec![1.0],
        },
    )]);
    Source::new("testsrc".to_string(), ra, dec, flux)
}
