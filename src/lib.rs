// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scan scheduling for geodetic VLBI sessions.
//!
//! Given a network of antennas, a source catalog, an observing window and
//! per-entity policy, the scheduler builds a time-ordered list of scans:
//! each scan commits a set of stations to one source, with slew-aware start
//! times and SNR-derived durations. Catalog parsing, configuration parsing
//! and output formatting live outside this crate; it consumes deserialized
//! parameter records and hands back scans plus statistics.

pub mod antenna;
pub mod astro;
pub mod baseline;
pub mod cable_wrap;
pub mod calibrator;
pub mod config;
pub(crate) mod constants;
pub mod endposition;
pub mod equip;
pub mod event;
pub mod himp;
pub mod horizon_mask;
pub(crate) mod math;
pub mod multisched;
pub mod network;
pub mod obsmode;
pub mod pointing;
pub mod scan;
pub mod scheduler;
pub mod skycov;
pub mod source;
pub mod station;
pub mod subcon;
pub mod time;
pub mod weights;

mod error;

#[cfg(test)]
pub(crate) mod tests;

// Re-exports.
pub use config::SessionConfig;
pub use error::SkedError;
pub use network::Network;
pub use scan::{Scan, ScanType};
pub use scheduler::Scheduler;
pub use source::Source;
pub use station::Station;
pub use time::TimeSystem;
