// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The observing mode: recording parameters and the band registry.

The mode fixes the sample rate, the bit depth and the set of frequency bands
with their channel counts. Per band it also carries the policy for stations
and sources whose catalog entry lacks the band: either the entity is dropped
(a required band without backup) or a backup rule synthesizes a value.
 */

use indexmap::IndexMap;
use log::warn;
use serde::Deserialize;

use crate::equip::{Equipment, Sefd};

/// What to do when a station or source has no entry for a band.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub enum BandBackup {
    /// No backup; combined with `required` this drops the entity.
    None,
    /// Use the smallest value the entity has in any band, times this factor.
    MinValueTimes(f64),
    /// Use the largest value the entity has in any band, times this factor.
    MaxValueTimes(f64),
    /// Use this fixed value.
    Value(f64),
}

/// One frequency band of the observing mode.
#[derive(Clone, Debug, Deserialize)]
pub struct Band {
    /// Observing wavelength \[m\].
    pub wavelength: f64,
    /// Number of channels recorded in this band.
    pub channels: u32,
    /// Whether every participating station must observe this band.
    pub required: bool,
    /// Backup rule for stations without an SEFD entry for this band.
    pub station_backup: BandBackup,
}

/// Recording parameters plus the band registry, shared read-only by one
/// schedule.
#[derive(Clone, Debug, Deserialize)]
pub struct ObservingMode {
    /// Sample rate \[MHz\].
    pub sample_rate: f64,
    /// Bits per sample.
    pub bits: u32,
    /// Bands by name, in catalog order.
    pub bands: IndexMap<String, Band>,
}

impl ObservingMode {
    /// A single-band mode, the common case in tests and simple sessions.
    pub fn single_band(
        name: &str,
        wavelength: f64,
        channels: u32,
        sample_rate: f64,
        bits: u32,
    ) -> ObservingMode {
        let mut bands = IndexMap::new();
        bands.insert(
            name.to_string(),
            Band {
                wavelength,
                channels,
                required: true,
                station_backup: BandBackup::None,
            },
        );
        ObservingMode {
            sample_rate,
            bits,
            bands,
        }
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.get(name)
    }

    /// Check a station's equipment against the mode, applying backup rules
    /// for missing bands. Returns false when a required band stays missing;
    /// the caller then drops the station.
    pub fn validate_equipment(&self, station_name: &str, equip: &mut Equipment) -> bool {
        for (band_name, band) in &self.bands {
            if equip.has_band(band_name) {
                continue;
            }
            let backup = match band.station_backup {
                BandBackup::None => {
                    if band.required {
                        warn!(
                            "station {station_name} has no SEFD for required band {band_name} \
                             and no backup applies"
                        );
                        return false;
                    }
                    continue;
                }
                BandBackup::MinValueTimes(f) => equip.min_nominal().map(|v| v * f),
                BandBackup::MaxValueTimes(f) => equip.max_nominal().map(|v| v * f),
                BandBackup::Value(v) => Some(v),
            };
            match backup {
                Some(v) => {
                    warn!("station {station_name}: band {band_name} SEFD backed up to {v:.0} Jy");
                    equip.insert(band_name.clone(), Sefd::Constant(v));
                }
                None if band.required => return false,
                None => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::HashMap;

    fn two_band_mode(backup: BandBackup) -> ObservingMode {
        let mut bands = IndexMap::new();
        bands.insert(
            "X".to_string(),
            Band {
                wavelength: 0.0349,
                channels: 10,
                required: true,
                station_backup: BandBackup::None,
            },
        );
        bands.insert(
            "S".to_string(),
            Band {
                wavelength: 0.131,
                channels: 6,
                required: true,
                station_backup: backup,
            },
        );
        ObservingMode {
            sample_rate: 32.0,
            bits: 2,
            bands,
        }
    }

    #[test]
    fn missing_required_band_without_backup_drops_the_station() {
        let mode = two_band_mode(BandBackup::None);
        let mut equip = Equipment::new(HashMap::from([("X".to_string(), Sefd::Constant(800.0))]));
        assert!(!mode.validate_equipment("Xx", &mut equip));
    }

    #[test]
    fn backup_rules_fill_in_missing_bands() {
        let mode = two_band_mode(BandBackup::MaxValueTimes(1.5));
        let mut equip = Equipment::new(HashMap::from([("X".to_string(), Sefd::Constant(800.0))]));
        assert!(mode.validate_equipment("Xx", &mut equip));
        assert_abs_diff_eq!(equip.sefd("S", 1.0).unwrap(), 1200.0);

        let mode = two_band_mode(BandBackup::Value(999.0));
        let mut equip = Equipment::new(HashMap::from([("X".to_string(), Sefd::Constant(800.0))]));
        assert!(mode.validate_equipment("Xx", &mut equip));
        assert_abs_diff_eq!(equip.sefd("S", 1.0).unwrap(), 999.0);
    }

    #[test]
    fn complete_equipment_passes_untouched() {
        let mode = two_band_mode(BandBackup::None);
        let mut equip = Equipment::new(HashMap::from([
            ("X".to_string(), Sefd::Constant(800.0)),
            ("S".to_string(), Sefd::Constant(1100.0)),
        ]));
        assert!(mode.validate_equipment("Xx", &mut equip));
        assert_abs_diff_eq!(equip.sefd("S", 1.0).unwrap(), 1100.0);
    }
}
