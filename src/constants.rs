// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision; scheduling maths is done in double
precision throughout and only the final second counts are integral.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Speed of light \[m/s\].
pub const VEL_C: f64 = 299_792_458.0;

/// MJD zero point as a Julian date.
pub const DJM0: f64 = 2_400_000.5;

/// Astronomical unit \[m\].
pub const DAU: f64 = 149_597_870_700.0;

/// Seconds per day.
pub const DAYSEC: f64 = 86400.0;

/// Gaussian-component flux model: \[mas\] to \[radians\].
pub const MAS2RAD: f64 = PI / (3600.0 * 180.0 * 1000.0);

/// Gaussian-component flux model: pi^2 / (4 ln 2), the FWHM factor of the
/// visibility of an elliptical Gaussian.
pub const GAUSSIAN_VIS_FACTOR: f64 = PI * PI / (4.0 * std::f64::consts::LN_2);

/// Constant of the VLBI SNR equation (accounts for 2-bit sampling and
/// correlator losses).
pub const SNR_EQUATION_CONST: f64 = 1.75;

/// When a scan selection finds no valid candidate at the outermost depth,
/// every station clock is advanced by this many seconds before retrying.
pub const DEADLOCK_ADVANCE: u32 = 60;

/// A new schedule iteration is aborted when fewer than this many sources
/// survive source reduction.
pub const MIN_SOURCES_AFTER_REDUCTION: usize = 50;
