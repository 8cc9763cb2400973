// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Single-pass exact rate control.
//!
//! The analyser turns the per-8×8 statistics tables into per-32×32 candidate
//! operations ("shift this block q more places"), bucketed by how much
//! distortion each saved byte costs. Buckets are logarithmic, ≈1.5 dB apart,
//! and spatially sub-divided so that adopting part of a bucket spreads the
//! damage across the frame instead of concentrating it in one corner. The
//! resolver then walks buckets from cheapest to most damaging until the
//! deficit against the target budget is covered.

use crate::{
    headers::HEADER_SIZE,
    layout::{BlockInfo, BlockLayout},
    util::CeilLog2,
};

use super::quantize::{QuantScratch, MAX_QUANT_STEPS};

pub(crate) const NUM_RDO_BUCKETS: usize = 128;
pub(crate) const BLOCK_SPACE_SUBDIVISION: usize = 16;
const BUCKET_MIDPOINT: i32 = 64;

#[derive(Copy, Clone, Debug)]
pub(crate) struct RdOperation {
    pub block: u32,
    pub quant: u8,
    /// Words saved over the previous (shallower) operation of the same block.
    pub saving: u32,
}

pub(crate) struct RdoBuckets {
    ops: Vec<Vec<RdOperation>>,
    savings: Vec<u64>,
    shamt: u32,
}

impl RdoBuckets {
    pub fn new(block_count: usize) -> RdoBuckets {
        let per_subdivision = block_count
            .div_ceil(BLOCK_SPACE_SUBDIVISION)
            .next_power_of_two();
        RdoBuckets {
            ops: vec![Vec::new(); NUM_RDO_BUCKETS * BLOCK_SPACE_SUBDIVISION],
            savings: vec![0; NUM_RDO_BUCKETS * BLOCK_SPACE_SUBDIVISION],
            shamt: per_subdivision.ceil_log2() as u32,
        }
    }

    pub fn clear(&mut self) {
        self.ops.iter_mut().for_each(|c| c.clear());
        self.savings.iter_mut().for_each(|s| *s = 0);
    }

    fn cell(&self, bucket: usize, block: u32) -> usize {
        let sub = (block >> self.shamt) as usize;
        debug_assert!(sub < BLOCK_SPACE_SUBDIVISION);
        bucket * BLOCK_SPACE_SUBDIVISION + sub
    }

    fn push(&mut self, bucket: usize, op: RdOperation) {
        let cell = self.cell(bucket, op.block);
        self.savings[cell] += op.saving as u64;
        self.ops[cell].push(op);
    }
}

/// Exact packed size, in words, of one 32×32 block re-quantised by `shift`,
/// together with its (weighted) distortion. Zero words means the block would
/// not be transmitted at all.
pub(crate) fn block_cost(
    scratch: &QuantScratch,
    info: &BlockInfo,
    shift: usize,
) -> (u64, f32) {
    let mut surviving = 0u64;
    let mut plane_bytes = 0u64;
    let mut nonzero = 0u64;
    let mut distortion = 0.0f32;
    for ty in 0..info.height_8x8 as usize {
        for tx in 0..info.width_8x8 as usize {
            let idx8 = info.offset_8x8 as usize + ty * info.stride_8x8 as usize + tx;
            let stats = &scratch.stats[idx8];
            if stats.plane_bytes[shift] > 0 {
                surviving += 1;
            }
            plane_bytes += stats.plane_bytes[shift] as u64;
            nonzero += stats.nonzero[shift] as u64;
            distortion += stats.distortion[shift];
        }
    }
    if surviving == 0 {
        return (0, distortion);
    }
    let sign_bytes = nonzero.div_ceil(8);
    let words = 2 + surviving + (plane_bytes + sign_bytes).div_ceil(4);
    (words, distortion)
}

/// Maximum useful shift for one 32×32 block: one past the deepest 8×8.
fn block_max_shift(scratch: &QuantScratch, info: &BlockInfo) -> usize {
    let mut max = 0usize;
    for ty in 0..info.height_8x8 as usize {
        for tx in 0..info.width_8x8 as usize {
            let idx8 = info.offset_8x8 as usize + ty * info.stride_8x8 as usize + tx;
            let stats = &scratch.stats[idx8];
            if scratch.codes[idx8].code_word != 0 {
                max = max.max(stats.msb as usize + 1);
            }
        }
    }
    max.min(MAX_QUANT_STEPS - 1)
}

/// Buckets every admissible quantisation operation. Returns the frame's
/// baseline payload size in words.
pub(crate) fn analyze(
    layout: &BlockLayout,
    scratch: &QuantScratch,
    band_distortion_weights: &[f32],
    buckets: &mut RdoBuckets,
) -> u64 {
    buckets.clear();
    let mut total_base = 0u64;

    for index in 0..layout.block_count_32x32() as u32 {
        let info = layout.block(index);
        let (base_words, base_distortion) = block_cost(scratch, info, 0);
        total_base += base_words;
        if base_words == 0 {
            continue;
        }

        // The statistics live in scaled-coefficient units; undo the block's
        // fine scale and apply the band's noise-power/CSF weight.
        let fine = scratch.fine_scale[index as usize];
        let weight = band_distortion_weights[info.band as usize] * fine * fine;

        let max_shift = block_max_shift(scratch, info);
        let mut prev_words = base_words;
        let mut prev_bucket: i32 = -1;
        for shift in 1..=max_shift {
            let (words, distortion) = block_cost(scratch, info, shift);
            if words >= prev_words {
                continue;
            }
            let saved_bytes = ((base_words - words) * 4) as f32;
            let added = ((distortion - base_distortion) * weight).max(f32::MIN_POSITIVE);
            let slope = added / saved_bytes;
            // Two buckets per power of two = 1.5 dB steps in power.
            let raw = BUCKET_MIDPOINT + (2.0 * slope.log2()).floor() as i32;
            let bucket = raw
                .clamp(0, NUM_RDO_BUCKETS as i32 - 1)
                .max(prev_bucket + 1)
                .min(NUM_RDO_BUCKETS as i32 - 1);
            buckets.push(
                bucket as usize,
                RdOperation {
                    block: index,
                    quant: shift as u8,
                    saving: (prev_words - words) as u32,
                },
            );
            prev_words = words;
            prev_bucket = bucket;
        }
    }

    total_base
}

/// Walks buckets cheapest-first until the byte deficit is covered, writing
/// the chosen shifts into `quant_table`. Returns true when even maximum
/// quantisation cannot reach the target (the frame is emitted oversized).
pub(crate) fn resolve(
    buckets: &RdoBuckets,
    total_base_words: u64,
    target_bytes: usize,
    quant_table: &mut [u8],
) -> bool {
    quant_table.iter_mut().for_each(|q| *q = 0);

    let target_words = (target_bytes.saturating_sub(HEADER_SIZE) / 4) as u64;
    let deficit = total_base_words.saturating_sub(target_words);
    if deficit == 0 {
        return false;
    }

    let mut adopted = 0u64;
    let adopt = |cell: usize, quant_table: &mut [u8]| {
        for op in &buckets.ops[cell] {
            let q = &mut quant_table[op.block as usize];
            *q = (*q).max(op.quant);
        }
    };

    'buckets: for bucket in 0..NUM_RDO_BUCKETS {
        let cells = bucket * BLOCK_SPACE_SUBDIVISION..(bucket + 1) * BLOCK_SPACE_SUBDIVISION;
        let bucket_total: u64 = buckets.savings[cells.clone()].iter().sum();
        if adopted + bucket_total < deficit {
            for cell in cells {
                adopt(cell, quant_table);
            }
            adopted += bucket_total;
        } else {
            // The straddling bucket: take sub-buckets until the deficit is
            // met, preserving spatial spread.
            for cell in cells {
                if adopted >= deficit {
                    break 'buckets;
                }
                adopt(cell, quant_table);
                adopted += buckets.savings[cell];
            }
            break 'buckets;
        }
    }

    adopted < deficit
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::encode::quantize::quantize_band;
    use crate::frame::ChromaSubsampling;
    use crate::image::Image;
    use crate::layout::Band;

    fn noisy_setup() -> (BlockLayout, QuantScratch) {
        let layout = BlockLayout::new(256, 256, ChromaSubsampling::Chroma444).unwrap();
        let mut scratch = QuantScratch::new(&layout);
        let mut rng = XorShiftRng::seed_from_u64(7);
        for band in layout.bands() {
            let mut plane = Image::new((band.width, band.height)).unwrap();
            for y in 0..band.height {
                for x in 0..band.width {
                    plane.row_mut(y)[x] = rng.gen_range(-0.2..0.2);
                }
            }
            quantize_band(&plane, band, &layout, 64.0, &mut scratch);
        }
        (layout, scratch)
    }

    #[test]
    fn buckets_are_monotonic_per_block() {
        let (layout, scratch) = noisy_setup();
        let weights = vec![1.0f32; layout.bands().len()];
        let mut buckets = RdoBuckets::new(layout.block_count_32x32());
        analyze(&layout, &scratch, &weights, &mut buckets);

        // Reconstruct, per block, the bucket of each quant depth; deeper
        // shifts must sit in strictly higher buckets.
        let mut last_bucket = vec![-1i64; layout.block_count_32x32()];
        let mut last_quant = vec![0u8; layout.block_count_32x32()];
        for bucket in 0..NUM_RDO_BUCKETS {
            for sub in 0..BLOCK_SPACE_SUBDIVISION {
                for op in &buckets.ops[bucket * BLOCK_SPACE_SUBDIVISION + sub] {
                    let b = op.block as usize;
                    assert!(
                        (bucket as i64) > last_bucket[b],
                        "bucket order violated for block {b}"
                    );
                    assert!(op.quant > last_quant[b]);
                    last_bucket[b] = bucket as i64;
                    last_quant[b] = op.quant;
                }
            }
        }
    }

    #[test]
    fn resolver_meets_any_budget() {
        let (layout, scratch) = noisy_setup();
        let weights = vec![1.0f32; layout.bands().len()];
        let mut buckets = RdoBuckets::new(layout.block_count_32x32());
        let total = analyze(&layout, &scratch, &weights, &mut buckets);
        assert!(total > 0);

        let mut quant_table = vec![0u8; layout.block_count_32x32()];
        for target in [usize::MAX, total as usize * 4, total as usize, 4096, 64] {
            let overflow = resolve(&buckets, total, target, &mut quant_table);
            assert!(!overflow, "budget {target} should always be reachable");
            let packed: u64 = (0..layout.block_count_32x32() as u32)
                .map(|i| {
                    block_cost(&scratch, layout.block(i), quant_table[i as usize] as usize).0
                })
                .sum();
            let budget_words = (target.saturating_sub(HEADER_SIZE) / 4) as u64;
            assert!(
                packed <= budget_words,
                "packed {packed} words exceeds budget {budget_words}"
            );
            if target as u64 >= total * 4 + HEADER_SIZE as u64 {
                assert!(quant_table.iter().all(|q| *q == 0));
            }
        }
    }

    #[test]
    fn resolver_prefers_cheap_distortion() {
        let (layout, scratch) = noisy_setup();
        let weights = vec![1.0f32; layout.bands().len()];
        let mut buckets = RdoBuckets::new(layout.block_count_32x32());
        let total = analyze(&layout, &scratch, &weights, &mut buckets);

        // A slightly tighter budget must quantise no block deeper than a
        // much tighter budget does.
        let mut mild = vec![0u8; layout.block_count_32x32()];
        let mut harsh = vec![0u8; layout.block_count_32x32()];
        resolve(&buckets, total, total as usize * 3, &mut mild);
        resolve(&buckets, total, total as usize, &mut harsh);
        for (m, h) in mild.iter().zip(harsh.iter()) {
            assert!(m <= h);
        }
    }
}
