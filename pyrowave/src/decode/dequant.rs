// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Inverse bit-plane decoding of one 32×32 block packet.
//!
//! Validation and reconstruction are split: [`validate_block_packet`] runs at
//! ingest time and proves the declared `payload_words` exactly covers the
//! code words, magnitude planes, sign bits and padding, so the reconstruction
//! pass can trust its cursors. The encoder reuses the validator as a
//! self-check on freshly packed frames.

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    error::{Error, Result},
    headers::{
        BlockHeader, DEADZONE_STRENGTH_OFFSET, HEADER_SIZE, Q_PLANES_OFFSET, QUANT_SCALE_OFFSET,
    },
    layout::{subblock_origin, subblock_pixel, BlockLayout},
    pyramid::Pyramid,
    quant::{decode_deadzone, decode_quant_fine, decode_quant_scale},
    util::set_bits,
};

/// One decoded 4×2 sub-block, pending sign application.
#[derive(Copy, Clone, Default)]
pub(crate) struct DecodedSub {
    base_x: usize,
    base_y: usize,
    magnitudes: [u32; 8],
    scale: f32,
    deadzone: f32,
}

/// Proves a full block packet (header included) is self-consistent.
pub(crate) fn validate_block_packet(layout: &BlockLayout, data: &[u8]) -> Result<()> {
    if data.len() < HEADER_SIZE {
        return Err(Error::TruncatedPacket {
            needed: HEADER_SIZE,
            available: data.len(),
        });
    }
    let header = BlockHeader::parse(data);
    if header.block_index >= layout.block_count_32x32() as u32 {
        return Err(Error::OutOfRangeBlockIndex(
            header.block_index,
            layout.block_count_32x32() as u32,
        ));
    }
    let stated = header.payload_words as usize;
    if stated * 4 != data.len() {
        return Err(Error::TruncatedPacket {
            needed: stated * 4,
            available: data.len(),
        });
    }

    let info = layout.block(header.block_index);
    let band = layout.band_of(info);
    let n = header.ballot.count_ones() as usize;
    if HEADER_SIZE + 4 * n > stated * 4 {
        return Err(Error::MalformedBlockPayload {
            stated,
            actual: (HEADER_SIZE + 4 * n) / 4,
        });
    }

    let mut cursor = HEADER_SIZE + 4 * n;
    let mut nonzero = 0usize;
    for (i, bit) in set_bits(header.ballot as u32).enumerate() {
        let (tx, ty) = ((bit & 3) as usize, (bit >> 2) as usize);
        if tx >= info.width_8x8 as usize || ty >= info.height_8x8 as usize {
            return Err(Error::MalformedBlockPayload {
                stated,
                actual: usize::MAX,
            });
        }
        let code_word = read_code_word(data, n, i);
        let q_bits = (code_word >> Q_PLANES_OFFSET) & 0xf;
        let abs_x = info.block_x as usize * 32 + tx * 8;
        let abs_y = info.block_y as usize * 32 + ty * 8;
        for s in 0..8 {
            let (sx, sy) = subblock_origin(s);
            if abs_x + sx >= band.width || abs_y + sy >= band.height {
                continue;
            }
            let planes = (q_bits + ((code_word >> (2 * s)) & 3)) as usize;
            if cursor + planes > data.len() {
                return Err(Error::TruncatedPacket {
                    needed: cursor + planes,
                    available: data.len(),
                });
            }
            let significant = data[cursor..cursor + planes]
                .iter()
                .fold(0u8, |acc, b| acc | b);
            nonzero += significant.count_ones() as usize;
            cursor += planes;
        }
    }
    let total = cursor + nonzero.div_ceil(8);
    let padded = total.div_ceil(4) * 4;
    if padded != stated * 4 {
        return Err(Error::MalformedBlockPayload {
            stated,
            actual: padded / 4,
        });
    }
    Ok(())
}

#[inline]
fn read_code_word(data: &[u8], n: usize, i: usize) -> u32 {
    let lo = LittleEndian::read_u16(&data[HEADER_SIZE + 2 * i..]) as u32;
    let hi = LittleEndian::read_u16(&data[HEADER_SIZE + 2 * n + 2 * i..]) as u32;
    lo | (hi << 16)
}

/// Reconstructs one validated block packet into its subband plane.
///
/// The plane must be zeroed beforehand; sub-blocks without planes and pixels
/// past the subband edge stay untouched.
pub(crate) fn dequantize_block(
    layout: &BlockLayout,
    data: &[u8],
    pyramid: &mut Pyramid,
    subs: &mut Vec<DecodedSub>,
) {
    let header = BlockHeader::parse(data);
    if header.ballot == 0 {
        return;
    }
    let info = layout.block(header.block_index);
    let band = layout.band_of(info);
    let step = decode_quant_scale(header.quant_code);
    let n = header.ballot.count_ones() as usize;

    subs.clear();
    let mut cursor = HEADER_SIZE + 4 * n;
    for (i, bit) in set_bits(header.ballot as u32).enumerate() {
        let (tx, ty) = ((bit & 3) as usize, (bit >> 2) as usize);
        debug_assert!(tx < info.width_8x8 as usize && ty < info.height_8x8 as usize);
        let code_word = read_code_word(data, n, i);
        let q_bits = (code_word >> Q_PLANES_OFFSET) & 0xf;
        let scale = step * decode_quant_fine(((code_word >> QUANT_SCALE_OFFSET) & 0x3f) as u8);
        let deadzone = decode_deadzone(((code_word >> DEADZONE_STRENGTH_OFFSET) & 0x3f) as u8);
        let abs_x = info.block_x as usize * 32 + tx * 8;
        let abs_y = info.block_y as usize * 32 + ty * 8;
        for s in 0..8 {
            let (sx, sy) = subblock_origin(s);
            if abs_x + sx >= band.width || abs_y + sy >= band.height {
                continue;
            }
            let planes = (q_bits + ((code_word >> (2 * s)) & 3)) as usize;
            if planes == 0 {
                continue;
            }
            let mut sub = DecodedSub {
                base_x: abs_x + sx,
                base_y: abs_y + sy,
                magnitudes: [0; 8],
                scale,
                deadzone,
            };
            for (j, byte) in data[cursor..cursor + planes].iter().enumerate() {
                for k in 0..8 {
                    sub.magnitudes[k] |= (((byte >> k) & 1) as u32) << (planes - 1 - j);
                }
            }
            subs.push(sub);
            cursor += planes;
        }
    }

    // All magnitude planes are known; the consolidated sign area follows.
    // One bit per non-zero magnitude, LSB-first, in the same order the
    // magnitudes were decoded. Zeros under a coded sub-block reconstruct at
    // the (positive) dead-zone level.
    let sign_area = &data[cursor..];
    let mut sign_cursor = 0usize;
    let plane = pyramid.band_mut(band.component, band.level, band.band);
    for sub in subs.iter() {
        for k in 0..8 {
            let (px, py) = subblock_pixel(k);
            let m = sub.magnitudes[k];
            let value = if m != 0 {
                let negative = (sign_area[sign_cursor / 8] >> (sign_cursor % 8)) & 1 != 0;
                sign_cursor += 1;
                let v = (m as f32 + 0.5) * sub.scale;
                if negative {
                    -v
                } else {
                    v
                }
            } else {
                sub.deadzone * sub.scale
            };
            let (x, y) = (sub.base_x + px, sub.base_y + py);
            if x < band.width && y < band.height {
                plane.row_mut(y)[x] = value.clamp(-4.0, 4.0);
            }
        }
    }
}
