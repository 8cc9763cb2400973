// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Scale factor codecs.
//!
//! Three tiny fixed-point formats travel in the bitstream:
//! - an 8-bit logarithmic code for the per-band quantiser step (carried in
//!   every block header),
//! - a 6-bit affine code for the per-8×8 scale refinement,
//! - a 6-bit linear code for the dead-zone strength.

use crate::util::tracing_wrappers::*;

const MAX_SCALE_EXP: i32 = 4;

/// Decodes the 8-bit band scale code into the quantiser step size.
///
/// Custom floating-point formulation: 3 mantissa bits, exponent biased so
/// code 0 maps to 16.0 and each group of 8 codes halves the step.
pub fn decode_quant_scale(code: u8) -> f32 {
    let e = MAX_SCALE_EXP - (code >> 3) as i32;
    let m = (code & 0x7) as i32;
    (1.0 / (8.0 * 1024.0 * 1024.0)) * ((8 + m) as f32 * ((20 + e) as f32).exp2())
}

/// Encodes a step size by truncating the float to 3 mantissa bits, so
/// `decode_quant_scale(encode_quant_scale(x)) <= x` and the effective
/// quantiser never undershoots the requested resolution.
pub fn encode_quant_scale(step: f32) -> u8 {
    debug_assert!(step > 0.0);
    let bits = step.to_bits();
    let e = ((bits >> 23) & 0xff) as i32 - 127 - MAX_SCALE_EXP;
    let m = ((bits >> 20) & 0x7) as u8;
    let e = -e;
    if !(0..=31).contains(&e) {
        warn!("band step {} is out of the codable range", step);
    }
    let e = e.clamp(0, 31) as u8;
    (e << 3) | m
}

/// The 6-bit refinement code whose scale is exactly 1.0.
pub const QUANT_FINE_IDENTITY: u8 = 24;

/// Decodes the 6-bit per-8×8 scale refinement, in [0.25, ~2.22].
pub fn decode_quant_fine(code: u8) -> f32 {
    debug_assert!(code < 64);
    code as f32 / 32.0 + 0.25
}

/// Rounds the decoder-side scale up so that the quantiser scale (its
/// reciprocal) effectively rounds down: `decode(encode(x)) >= x`.
pub fn encode_quant_fine(scale: f32) -> u8 {
    (((scale - 0.25) * 32.0).ceil().max(0.0) as u32).min(63) as u8
}

/// Decodes the 6-bit dead-zone strength, in [0, 63/128].
pub fn decode_deadzone(code: u8) -> f32 {
    debug_assert!(code < 64);
    code as f32 / 128.0
}

/// Round-half-up in units of 1/128, saturating to the 6-bit range.
pub fn encode_deadzone(strength: f32) -> u8 {
    ((strength.max(0.0) * 128.0 + 0.5).floor() as u32).min(63) as u8
}
