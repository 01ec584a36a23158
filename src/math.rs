// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Small angle and integer helpers used throughout the scheduler.

use crate::constants::{PI, TAU};

/// Wrap an angle into (-pi, pi].
pub fn wrap_to_pi(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Wrap an angle into [0, 2 pi).
pub fn wrap_to_two_pi(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a < 0.0 {
        a += TAU;
    }
    a
}

/// Great-circle distance between two (azimuth, elevation) directions.
pub fn angular_distance(az1: f64, el1: f64, az2: f64, el2: f64) -> f64 {
    let cos_dist = el1.sin() * el2.sin() + el1.cos() * el2.cos() * (az1 - az2).cos();
    // Guard against rounding pushing the argument outside acos' domain.
    cos_dist.clamp(-1.0, 1.0).acos()
}

/// Absolute difference of two unsigned second counts.
pub fn abs_diff(a: u32, b: u32) -> u32 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn wrap_pi() {
        assert_abs_diff_eq!(wrap_to_pi(3.0 * PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_to_pi(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_to_pi(0.1), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn wrap_two_pi() {
        assert_abs_diff_eq!(wrap_to_two_pi(-0.1), TAU - 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_to_two_pi(TAU + 0.1), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn angular_distance_poles() {
        // Zenith to horizon is a quarter turn regardless of azimuth.
        assert_abs_diff_eq!(
            angular_distance(0.0, PI / 2.0, 1.0, 0.0),
            PI / 2.0,
            epsilon = 1e-12
        );
        // Identical directions.
        assert_abs_diff_eq!(angular_distance(1.0, 0.5, 1.0, 0.5), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn abs_diff_unsigned() {
        assert_eq!(abs_diff(10, 3), 7);
        assert_eq!(abs_diff(3, 10), 7);
        assert_eq!(abs_diff(5, 5), 0);
    }
}
