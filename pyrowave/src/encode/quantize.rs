// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Bit-plane quantisation of 8×8 blocks (the encoder's first pass).
//!
//! Coefficients are scaled by the band resolution and a per-32×32 fine scale
//! that pushes the block peak just below a power-of-two boundary, truncated to
//! integers, and emitted as byte-wide bit-planes per 4×2 sub-block. Alongside
//! the payload, every 8×8 records a table of what each additional right-shift
//! would cost and ruin, which drives rate control later.

use crate::{
    headers::{
        DEADZONE_STRENGTH_BITS, DEADZONE_STRENGTH_OFFSET, Q_PLANES_BITS, Q_PLANES_OFFSET,
        QUANT_SCALE_BITS, QUANT_SCALE_OFFSET,
    },
    image::Image,
    layout::{subblock_origin, subblock_pixel, BandInfo, BlockInfo, BlockLayout},
    quant::{decode_quant_fine, encode_deadzone, encode_quant_fine, QUANT_FINE_IDENTITY},
    util::FloorLog2,
};

/// Candidate re-quantisation depths tracked per 8×8.
pub(crate) const MAX_QUANT_STEPS: usize = 16;

/// Quantiser output for one 8×8 block. `code_word == 0` means the block is
/// empty and owns no payload.
#[derive(Copy, Clone, Default)]
pub(crate) struct BlockCode {
    pub code_word: u32,
    pub payload_offset: u32,
    pub payload_len: u16,
    /// Dead-zone bookkeeping: in-range zero coefficients under sub-blocks
    /// that emitted planes, and the sum of their |residual|.
    pub zero_count: u16,
    pub zero_residual: f32,
}

/// Cost/distortion of re-quantising one 8×8 by `q` extra right-shifts,
/// for `q` in 0..MAX_QUANT_STEPS.
#[derive(Copy, Clone)]
pub(crate) struct BlockStats {
    pub msb: u8,
    pub plane_bytes: [u16; MAX_QUANT_STEPS],
    pub nonzero: [u16; MAX_QUANT_STEPS],
    pub distortion: [f32; MAX_QUANT_STEPS],
}

impl Default for BlockStats {
    fn default() -> Self {
        BlockStats {
            msb: 0,
            plane_bytes: [0; MAX_QUANT_STEPS],
            nonzero: [0; MAX_QUANT_STEPS],
            distortion: [0.0; MAX_QUANT_STEPS],
        }
    }
}

/// Frame-lifetime quantiser state, allocated once per encoder.
pub(crate) struct QuantScratch {
    pub codes: Vec<BlockCode>,
    pub stats: Vec<BlockStats>,
    /// Intermediate payload: per 8×8, per sub-block, magnitude planes
    /// MSB-first followed by one sign byte when any plane was emitted.
    pub payload: Vec<u8>,
    /// Decoder-side fine scale per 32×32 block (for distortion weighting).
    pub fine_scale: Vec<f32>,
}

impl QuantScratch {
    pub fn new(layout: &BlockLayout) -> QuantScratch {
        QuantScratch {
            codes: vec![BlockCode::default(); layout.block_count_8x8()],
            stats: vec![BlockStats::default(); layout.block_count_8x8()],
            payload: Vec::with_capacity(64 * 1024),
            fine_scale: vec![1.0; layout.block_count_32x32()],
        }
    }

    pub fn clear(&mut self) {
        self.codes.iter_mut().for_each(|c| *c = BlockCode::default());
        self.stats.iter_mut().for_each(|s| *s = BlockStats::default());
        self.payload.clear();
        self.fine_scale.iter_mut().for_each(|f| *f = 1.0);
    }
}

/// Quantises every 32×32 block of one band.
pub(crate) fn quantize_band(
    plane: &Image,
    band: &BandInfo,
    layout: &BlockLayout,
    eff_resolution: f32,
    scratch: &mut QuantScratch,
) {
    for by in 0..band.blocks_y_32x32 {
        for bx in 0..band.blocks_x_32x32 {
            let index = band.block_index(bx, by);
            let info = *layout.block(index);
            quantize_block32(plane, band, &info, index, eff_resolution, scratch);
        }
    }
}

fn quantize_block32(
    plane: &Image,
    band: &BandInfo,
    info: &BlockInfo,
    index: u32,
    eff_resolution: f32,
    scratch: &mut QuantScratch,
) {
    let x0 = info.block_x as usize * 32;
    let y0 = info.block_y as usize * 32;

    let mut coeffs = [0.0f32; 32 * 32];
    let mut max_abs = 0.0f32;
    for y in 0..32 {
        for x in 0..32 {
            let v = plane.get_or_zero(x0 + x, y0 + y).clamp(-4.0, 4.0) * eff_resolution;
            coeffs[y * 32 + x] = v;
            max_abs = max_abs.max(v.abs());
        }
    }

    // Push the block peak just below 2^n - 0.25 so truncation wastes as
    // little of the top plane as possible. Blocks that cannot reach the first
    // boundary stay at identity scale and quantise to nothing.
    let fine_code = if max_abs >= 1.0 {
        let target = (max_abs - 0.25).log2().ceil().exp2() - 0.25;
        encode_quant_fine(max_abs / target)
    } else {
        QUANT_FINE_IDENTITY
    };
    let fine_dec = decode_quant_fine(fine_code);
    scratch.fine_scale[index as usize] = fine_dec;
    let enc_scale = 1.0 / fine_dec;
    for v in coeffs.iter_mut() {
        *v *= enc_scale;
    }

    for ty in 0..info.height_8x8 as usize {
        for tx in 0..info.width_8x8 as usize {
            let idx8 = info.offset_8x8 as usize + ty * info.stride_8x8 as usize + tx;
            quantize_block8(
                &coeffs,
                tx,
                ty,
                x0 + tx * 8,
                y0 + ty * 8,
                band,
                fine_code,
                idx8,
                scratch,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn quantize_block8(
    coeffs: &[f32; 32 * 32],
    tile_x: usize,
    tile_y: usize,
    abs_x: usize,
    abs_y: usize,
    band: &BandInfo,
    fine_code: u8,
    idx8: usize,
    scratch: &mut QuantScratch,
) {
    let sample = |x: usize, y: usize| coeffs[(tile_y * 8 + y) * 32 + tile_x * 8 + x];

    let mut values = [0.0f32; 64];
    let mut magnitudes = [0u32; 64];
    let mut negative = [false; 64];
    let mut peak = 0u32;
    for s in 0..8 {
        let (sx, sy) = subblock_origin(s);
        for k in 0..8 {
            let (px, py) = subblock_pixel(k);
            let v = sample(sx + px, sy + py);
            let i = s * 8 + k;
            values[i] = v;
            magnitudes[i] = v.abs() as u32;
            negative[i] = v < 0.0;
            peak = peak.max(magnitudes[i]);
        }
    }

    let code = &mut scratch.codes[idx8];
    let stats = &mut scratch.stats[idx8];
    *code = BlockCode::default();
    *stats = BlockStats::default();

    if peak == 0 {
        return;
    }

    let in_range =
        |s: usize| -> bool {
            let (sx, sy) = subblock_origin(s);
            abs_x + sx < band.width && abs_y + sy < band.height
        };

    let msb = peak.floor_log2();
    let q_bits = msb.saturating_sub(2);
    debug_assert!(q_bits < (1 << Q_PLANES_BITS));

    let payload_offset = scratch.payload.len();
    let mut plane_codes = 0u16;
    let mut planes_per_sub = [0u32; 8];
    for s in 0..8 {
        if !in_range(s) {
            continue;
        }
        let sub = &magnitudes[s * 8..(s + 1) * 8];
        let sub_peak = sub.iter().copied().max().unwrap_or(0);
        let shifted = sub_peak >> q_bits;
        let plane_code = if shifted == 0 { 0 } else { shifted.floor_log2() + 1 };
        debug_assert!(plane_code <= 3);
        plane_codes |= (plane_code as u16) << (2 * s);
        let planes = q_bits + plane_code;
        planes_per_sub[s] = planes;

        for j in (0..planes).rev() {
            let mut byte = 0u8;
            for (k, m) in sub.iter().enumerate() {
                byte |= (((m >> j) & 1) as u8) << k;
            }
            scratch.payload.push(byte);
        }
        if planes > 0 {
            let mut byte = 0u8;
            for k in 0..8 {
                byte |= (negative[s * 8 + k] as u8) << k;
            }
            scratch.payload.push(byte);
        }
    }

    // Average |residual| of the coefficients that truncated to zero, in
    // quantiser step units; this becomes the dead-zone reconstruction level.
    let mut zero_count = 0u32;
    let mut zero_residual = 0.0f32;
    for s in 0..8 {
        if planes_per_sub[s] == 0 || !in_range(s) {
            continue;
        }
        let (sx, sy) = subblock_origin(s);
        for k in 0..8 {
            let (px, py) = subblock_pixel(k);
            if abs_x + sx + px < band.width && abs_y + sy + py < band.height {
                let i = s * 8 + k;
                if magnitudes[i] == 0 {
                    zero_count += 1;
                    zero_residual += values[i].abs();
                }
            }
        }
    }
    let deadzone = if zero_count > 0 {
        (zero_residual / zero_count as f32).min(0.5)
    } else {
        0.0
    };
    let dz_code = encode_deadzone(deadzone);
    debug_assert!(dz_code < (1 << DEADZONE_STRENGTH_BITS));
    debug_assert!(fine_code < (1 << QUANT_SCALE_BITS));

    code.code_word = plane_codes as u32
        | (q_bits << Q_PLANES_OFFSET)
        | ((fine_code as u32) << QUANT_SCALE_OFFSET)
        | ((dz_code as u32) << DEADZONE_STRENGTH_OFFSET);
    code.payload_offset = payload_offset as u32;
    code.payload_len = (scratch.payload.len() - payload_offset) as u16;
    code.zero_count = zero_count as u16;
    code.zero_residual = zero_residual;

    stats.msb = msb as u8;
    for shift in 0..MAX_QUANT_STEPS {
        let shift_u = shift as u32;
        let mut bytes = 0u32;
        for (s, planes) in planes_per_sub.iter().enumerate() {
            if in_range(s) {
                bytes += planes.saturating_sub(shift_u);
            }
        }
        stats.plane_bytes[shift] = bytes as u16;
        let mut nonzero = 0u16;
        let mut distortion = 0.0f32;
        for i in 0..64 {
            let m = magnitudes[i] >> shift_u;
            let recon = if m != 0 {
                nonzero += 1;
                let r = (m as f32 + 0.5) * (shift_u as f32).exp2();
                if negative[i] {
                    -r
                } else {
                    r
                }
            } else {
                0.0
            };
            let err = values[i] - recon;
            distortion += err * err;
        }
        stats.nonzero[shift] = nonzero;
        stats.distortion[shift] = distortion;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChromaSubsampling;
    use crate::layout::Band;

    fn test_band_layout() -> BlockLayout {
        // 128x128 4:4:4 -> every band present, level-1 bands are 32x32.
        BlockLayout::new(128, 128, ChromaSubsampling::Chroma444).unwrap()
    }

    fn level1_hh_band(layout: &BlockLayout) -> BandInfo {
        layout
            .bands()
            .iter()
            .find(|b| b.component == 0 && b.level == 1 && b.band == Band::Hh)
            .unwrap()
            .clone()
    }

    #[test]
    fn zero_block_emits_nothing() {
        let layout = test_band_layout();
        let band = level1_hh_band(&layout);
        let plane = Image::new((band.width, band.height)).unwrap();
        let mut scratch = QuantScratch::new(&layout);
        quantize_band(&plane, &band, &layout, 32.0, &mut scratch);
        let idx8 = layout.block(band.block_index(0, 0)).offset_8x8 as usize;
        assert_eq!(scratch.codes[idx8].code_word, 0);
        assert_eq!(scratch.codes[idx8].payload_len, 0);
        assert!(scratch.payload.is_empty());
    }

    #[test]
    fn single_coefficient_uses_one_plane() {
        // A coefficient of 1.5 (in scaled units) at (0, 0) of a band with
        // inverse scale 32: one magnitude plane plus a sign byte.
        let layout = test_band_layout();
        let band = level1_hh_band(&layout);
        let mut plane = Image::new((band.width, band.height)).unwrap();
        plane.row_mut(0)[0] = 1.5 / 32.0;
        let mut scratch = QuantScratch::new(&layout);
        quantize_band(&plane, &band, &layout, 32.0, &mut scratch);

        let block = band.block_index(0, 0);
        let idx8 = layout.block(block).offset_8x8 as usize;
        let code = scratch.codes[idx8];
        assert_ne!(code.code_word, 0);
        let q_bits = (code.code_word >> Q_PLANES_OFFSET) & 0xf;
        assert_eq!(q_bits, 0);
        assert_eq!(code.code_word & 0xffff, 0b01, "sub-block 0 has plane code 1");
        assert_eq!(code.payload_len, 2);
        // Fine scale boosts 1.5 toward the 1.75 boundary.
        assert_eq!((code.code_word >> QUANT_SCALE_OFFSET) & 0x3f, 20);
        assert_eq!(scratch.payload[0], 0x01);
        assert_eq!(scratch.payload[1], 0x00);
        let stats = &scratch.stats[idx8];
        assert_eq!(stats.nonzero[0], 1);
        assert_eq!(stats.plane_bytes[0], 1);
        assert_eq!(stats.nonzero[1], 0);
        assert_eq!(stats.plane_bytes[1], 0);
    }

    #[test]
    fn negative_coefficients_set_sign_bits() {
        let layout = test_band_layout();
        let band = level1_hh_band(&layout);
        let mut plane = Image::new((band.width, band.height)).unwrap();
        // Pixel (1, 0) is linear index 1 of sub-block 0.
        plane.row_mut(0)[1] = -3.0;
        let mut scratch = QuantScratch::new(&layout);
        quantize_band(&plane, &band, &layout, 1.0, &mut scratch);

        let idx8 = layout.block(band.block_index(0, 0)).offset_8x8 as usize;
        let code = scratch.codes[idx8];
        assert_ne!(code.code_word, 0);
        let planes = code.payload_len - 1;
        let sign_byte = scratch.payload[code.payload_offset as usize + planes as usize];
        assert_eq!(sign_byte, 1 << 2, "pixel (1,0) is sub-block index 2");
    }

    #[test]
    fn deep_blocks_get_a_plane_floor() {
        let layout = test_band_layout();
        let band = level1_hh_band(&layout);
        let mut plane = Image::new((band.width, band.height)).unwrap();
        // Peak lands around 2^8 after band and fine scaling, deep enough to
        // need a q_bits floor so the 2-bit plane codes still fit.
        plane.row_mut(0)[0] = 2.0;
        plane.row_mut(2)[4] = 0.125;
        let mut scratch = QuantScratch::new(&layout);
        quantize_band(&plane, &band, &layout, 100.0, &mut scratch);

        let idx8 = layout.block(band.block_index(0, 0)).offset_8x8 as usize;
        let code = scratch.codes[idx8];
        let q_bits = (code.code_word >> Q_PLANES_OFFSET) & 0xf;
        let fine = decode_quant_fine(((code.code_word >> QUANT_SCALE_OFFSET) & 0x3f) as u8);
        let peak = (200.0 / fine) as u32;
        assert_eq!(q_bits, peak.floor_log2().saturating_sub(2));
        // Every sub-block with content emits at least the q_bits floor.
        for s in 0..8 {
            let pc = (code.code_word >> (2 * s)) & 3;
            assert!(pc <= 3);
        }
    }
}
