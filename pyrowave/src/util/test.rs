// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

/// Asserts that a reconstructed sample landed within `tolerance` of the
/// expected value. NaN on either side always fails.
#[track_caller]
pub(crate) fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    let difference = (actual - expected).abs();
    assert!(
        difference <= tolerance,
        "expected {expected}, got {actual} (off by {difference}, tolerance {tolerance})"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_samples_pass() {
        assert_close(1.0000001, 1.0000002, 0.000001);
        assert_close(0.5, 0.52, 0.05);
        assert_close(-0.25, -0.26, 0.02);
    }

    #[test]
    #[should_panic]
    fn distant_samples_panic() {
        assert_close(1.0, 1.2, 0.1);
    }

    #[test]
    #[should_panic]
    fn nan_panics() {
        assert_close(f32::NAN, f32::NAN, 0.1);
    }
}
