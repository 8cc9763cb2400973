// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Final on-wire layout of one 32×32 block (the encoder's second pass).
//!
//! The quantiser stored magnitude planes MSB-first, so applying the rate
//! controller's chosen shift is a truncation: keep the leading planes, drop
//! the rest, drop the signs of coefficients that just became zero, and fold
//! their residual energy into the dead-zone estimate. Wire order within one
//! block packet: header, code-word low halves, code-word high halves,
//! magnitude planes per 8×8 in ballot order, then all surviving sign bits
//! tightly packed at the end.

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    headers::{
        BlockHeader, DEADZONE_STRENGTH_OFFSET, HEADER_SIZE, Q_PLANES_OFFSET, QUANT_SCALE_OFFSET,
    },
    layout::{subblock_origin, BlockLayout},
    quant::encode_deadzone,
};

use super::quantize::QuantScratch;
use super::rdo::block_cost;

/// Where each block's packet landed in the frame bitstream; `num_words == 0`
/// marks a block with no payload (not transmitted).
#[derive(Copy, Clone, Default, Debug)]
pub(crate) struct PacketMeta {
    pub offset: u32,
    pub num_words: u32,
}

struct TilePack {
    idx8: usize,
    code_word: u32,
    /// Surviving planes per sub-block (0 for out-of-range sub-blocks).
    new_planes: [u8; 8],
    /// Planes the quantiser originally emitted per sub-block.
    old_planes: [u8; 8],
}

/// Packs every 32×32 block and records its placement. Empty blocks cost
/// nothing in the stream.
pub(crate) fn pack_frame(
    layout: &BlockLayout,
    scratch: &QuantScratch,
    quant_table: &[u8],
    band_quant_codes: &[u8],
    sequence: u8,
    bitstream: &mut Vec<u8>,
    meta: &mut Vec<PacketMeta>,
) {
    bitstream.clear();
    meta.clear();
    for index in 0..layout.block_count_32x32() as u32 {
        let offset = bitstream.len();
        let quant_code = band_quant_codes[layout.block(index).band as usize];
        let words = pack_block(
            layout,
            scratch,
            index,
            quant_table[index as usize],
            quant_code,
            sequence,
            bitstream,
        );
        if words > 2 {
            meta.push(PacketMeta {
                offset: offset as u32,
                num_words: words as u32,
            });
        } else {
            // Header-only packet: nothing survived, do not transmit.
            bitstream.truncate(offset);
            meta.push(PacketMeta::default());
        }
    }
}

/// Packs one block, returning its size in words (2 when only the header
/// remains). Always appends at least the header; the caller decides whether
/// an empty block stays in the stream.
pub(crate) fn pack_block(
    layout: &BlockLayout,
    scratch: &QuantScratch,
    index: u32,
    shift: u8,
    quant_code: u8,
    sequence: u8,
    out: &mut Vec<u8>,
) -> usize {
    let info = layout.block(index);
    let band = layout.band_of(info);
    let shift = shift as u32;
    // Shifting magnitudes down by `shift` doubles the effective step that
    // many times; one octave is 8 codes in the logarithmic scale.
    let quant_code = quant_code.saturating_sub(8 * shift as u8);
    let start = out.len();
    out.resize(start + HEADER_SIZE, 0);

    let mut ballot = 0u16;
    let mut tiles: Vec<TilePack> = Vec::with_capacity(16);

    for bit in 0..16usize {
        let (tx, ty) = (bit & 3, bit >> 2);
        if tx >= info.width_8x8 as usize || ty >= info.height_8x8 as usize {
            continue;
        }
        let idx8 = info.offset_8x8 as usize + ty * info.stride_8x8 as usize + tx;
        let code = &scratch.codes[idx8];
        if code.code_word == 0 {
            continue;
        }

        let abs_x = info.block_x as usize * 32 + tx * 8;
        let abs_y = info.block_y as usize * 32 + ty * 8;
        let q_bits = (code.code_word >> Q_PLANES_OFFSET) & 0xf;

        let mut old_planes = [0u8; 8];
        let mut new_planes = [0u8; 8];
        let mut survives = false;
        for s in 0..8 {
            let (sx, sy) = subblock_origin(s);
            if abs_x + sx >= band.width || abs_y + sy >= band.height {
                continue;
            }
            let planes = q_bits + ((code.code_word >> (2 * s)) & 3);
            old_planes[s] = planes as u8;
            new_planes[s] = planes.saturating_sub(shift) as u8;
            survives |= new_planes[s] > 0;
        }
        if !survives {
            continue;
        }

        ballot |= 1 << bit;
        let new_q_bits = q_bits.saturating_sub(shift);
        let mut plane_codes = 0u32;
        for s in 0..8 {
            let pc = (new_planes[s] as u32).saturating_sub(new_q_bits);
            debug_assert!(pc <= 3);
            plane_codes |= pc << (2 * s);
        }
        let deadzone = if shift > 0 {
            recompute_deadzone(scratch, idx8, &old_planes, &new_planes, shift) as u32
        } else {
            (code.code_word >> DEADZONE_STRENGTH_OFFSET) & 0x3f
        };
        let code_word = plane_codes
            | (new_q_bits << Q_PLANES_OFFSET)
            | (code.code_word & (0x3f << QUANT_SCALE_OFFSET))
            | (deadzone << DEADZONE_STRENGTH_OFFSET);

        tiles.push(TilePack {
            idx8,
            code_word,
            new_planes,
            old_planes,
        });
    }

    // Code words travel as split arrays: all low halves, then all highs.
    let n = tiles.len();
    out.resize(start + HEADER_SIZE + 4 * n, 0);
    for (i, tile) in tiles.iter().enumerate() {
        let lo = start + HEADER_SIZE + 2 * i;
        let hi = start + HEADER_SIZE + 2 * n + 2 * i;
        LittleEndian::write_u16(&mut out[lo..lo + 2], tile.code_word as u16);
        LittleEndian::write_u16(&mut out[hi..hi + 2], (tile.code_word >> 16) as u16);
    }

    // Magnitude planes, collecting sign bits on the side.
    let mut signs = [0u8; 128];
    let mut sign_bits = 0usize;
    for tile in &tiles {
        let code = &scratch.codes[tile.idx8];
        let mut cursor = code.payload_offset as usize;
        for s in 0..8 {
            let old = tile.old_planes[s] as usize;
            if old == 0 {
                continue;
            }
            let planes = &scratch.payload[cursor..cursor + old];
            let kept = tile.new_planes[s] as usize;
            out.extend_from_slice(&planes[..kept]);
            let sign_byte = scratch.payload[cursor + old];
            let nz_mask = planes[..kept].iter().fold(0u8, |acc, b| acc | b);
            for k in 0..8 {
                if nz_mask & (1 << k) != 0 {
                    if sign_byte & (1 << k) != 0 {
                        signs[sign_bits / 8] |= 1 << (sign_bits % 8);
                    }
                    sign_bits += 1;
                }
            }
            cursor += old + 1;
        }
        debug_assert_eq!(cursor, (code.payload_offset + code.payload_len as u32) as usize);
    }
    out.extend_from_slice(&signs[..sign_bits.div_ceil(8)]);
    while (out.len() - start) % 4 != 0 {
        out.push(0);
    }

    let words = (out.len() - start) / 4;
    debug_assert!(words < (1 << 12));
    if ballot != 0 {
        debug_assert_eq!(words as u64, block_cost(scratch, info, shift as usize).0);
    }
    BlockHeader {
        ballot,
        payload_words: words as u16,
        sequence,
        quant_code,
        block_index: index,
    }
    .write(&mut out[start..start + HEADER_SIZE]);
    words
}

/// Combined dead-zone of the previously-zero residuals and the coefficients
/// the shift just zeroed, expressed in units of the new (coarser) step.
fn recompute_deadzone(
    scratch: &QuantScratch,
    idx8: usize,
    old_planes: &[u8; 8],
    new_planes: &[u8; 8],
    shift: u32,
) -> u8 {
    let code = &scratch.codes[idx8];
    let mut count = code.zero_count as u32;
    let mut sum = code.zero_residual;
    let mut cursor = code.payload_offset as usize;
    for s in 0..8 {
        let old = old_planes[s] as usize;
        if old == 0 {
            continue;
        }
        let planes = &scratch.payload[cursor..cursor + old];
        let kept = new_planes[s] as usize;
        let surviving = planes[..kept].iter().fold(0u8, |acc, b| acc | b);
        for k in 0..8 {
            if surviving & (1 << k) != 0 {
                continue;
            }
            // Magnitude from the dropped planes alone; zero coefficients are
            // already accounted in the stored residual sum.
            let mut magnitude = 0u32;
            for (j, byte) in planes.iter().enumerate() {
                magnitude |= (((byte >> k) & 1) as u32) << (old - 1 - j);
            }
            if magnitude != 0 {
                count += 1;
                sum += magnitude as f32 + 0.5;
            }
        }
        cursor += old + 1;
    }
    if count == 0 {
        return 0;
    }
    let strength = (sum / count as f32) / (shift as f32).exp2();
    encode_deadzone(strength.min(0.5))
}
