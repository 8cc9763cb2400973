// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! CDF 9/7 wavelet analysis and synthesis.
//!
//! Separable lifting over split even/odd lattices with mirrored edge
//! extension (edge sample repeated, applied on the half-rate lattices).
//! Perfect reconstruction holds for any consistent extension because the
//! inverse undoes each lifting pass exactly; the bitstream therefore does not
//! require decoders to be bit-exact here.

use half::f16;

use crate::{
    frame::{ChromaSubsampling, Frame},
    image::Image,
    layout::{Band, BlockLayout, DECOMPOSITION_LEVELS, NUM_COMPONENTS},
    pyramid::{component_has_level, Pyramid},
};

const ALPHA: f32 = -1.586_134_342_059_924;
const BETA: f32 = -0.052_980_118_572_961;
const GAMMA: f32 = 0.882_911_075_530_934;
const DELTA: f32 = 0.443_506_852_043_971;
const K: f32 = 1.230_174_104_914_001;

/// Storage precision of the wavelet planes.
///
/// The original deployment keeps the two finest (bandwidth-heavy) levels in
/// 16-bit floats and the rest in 32-bit; that split is `Mixed`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Precision {
    /// All levels stored with f16 rounding.
    Fp16,
    /// Levels 0 and 1 stored with f16 rounding, coarser levels at full
    /// precision.
    #[default]
    Mixed,
    /// Full precision everywhere.
    Fp32,
}

const REDUCED_PRECISION_LEVELS: usize = 2;

impl Precision {
    fn reduced(self, level: usize) -> bool {
        match self {
            Precision::Fp16 => true,
            Precision::Mixed => level < REDUCED_PRECISION_LEVELS,
            Precision::Fp32 => false,
        }
    }
}

fn start_level(component: usize, chroma: ChromaSubsampling) -> usize {
    if component_has_level(component, 0, chroma) {
        0
    } else {
        1
    }
}

/// Maps a padded-plane index back inside [0, len) by symmetric reflection
/// with the edge sample repeated, the same extension a mirrored-repeat
/// sampler applies. Padding only grows rightward and downward but can be
/// much wider than the plane, so fold into one 2·len period first.
fn reflect_index(index: usize, len: usize) -> usize {
    let period = 2 * len;
    let folded = index % period;
    if folded < len {
        folded
    } else {
        period - 1 - folded
    }
}

/// One lifting pass pair over split arrays. `e`/`o` hold the even and odd
/// samples of one line; neighbors off the ends are clamped (mirror with edge
/// repeat lands on the adjacent sample of the other lattice).
fn lift_forward(e: &mut [f32], o: &mut [f32]) {
    let n = e.len();
    debug_assert_eq!(o.len(), n);
    debug_assert!(n > 0);
    for k in 0..n {
        o[k] += ALPHA * (e[k] + e[(k + 1).min(n - 1)]);
    }
    for k in 0..n {
        e[k] += BETA * (o[k.saturating_sub(1)] + o[k]);
    }
    for k in 0..n {
        o[k] += GAMMA * (e[k] + e[(k + 1).min(n - 1)]);
    }
    for k in 0..n {
        e[k] += DELTA * (o[k.saturating_sub(1)] + o[k]);
    }
    for k in 0..n {
        e[k] *= 1.0 / K;
        o[k] *= K;
    }
}

fn lift_inverse(e: &mut [f32], o: &mut [f32]) {
    let n = e.len();
    debug_assert_eq!(o.len(), n);
    debug_assert!(n > 0);
    for k in 0..n {
        e[k] *= K;
        o[k] *= 1.0 / K;
    }
    for k in 0..n {
        e[k] -= DELTA * (o[k.saturating_sub(1)] + o[k]);
    }
    for k in 0..n {
        o[k] -= GAMMA * (e[k] + e[(k + 1).min(n - 1)]);
    }
    for k in 0..n {
        e[k] -= BETA * (o[k.saturating_sub(1)] + o[k]);
    }
    for k in 0..n {
        o[k] -= ALPHA * (e[k] + e[(k + 1).min(n - 1)]);
    }
}

fn round_store(value: f32, reduced: bool) -> f32 {
    let value = value.clamp(-4.0, 4.0);
    if reduced {
        f16::from_f32(value).to_f32()
    } else {
        value
    }
}

/// Scratch planes for the separable passes, sized once at construction and
/// reused for every frame.
pub(crate) struct DwtScratch {
    /// Current level input (forward) or reconstruction (inverse).
    cur: Vec<f32>,
    next: Vec<f32>,
    tmp_lo: Vec<f32>,
    tmp_hi: Vec<f32>,
    out_lo: Vec<f32>,
    out_hi: Vec<f32>,
    even: Vec<f32>,
    odd: Vec<f32>,
}

impl DwtScratch {
    pub fn new(aligned_width: usize, aligned_height: usize) -> DwtScratch {
        let full = aligned_width * aligned_height;
        let lane = aligned_width.max(aligned_height) / 2;
        DwtScratch {
            cur: vec![0.0; full],
            next: vec![0.0; full],
            tmp_lo: vec![0.0; full / 2],
            tmp_hi: vec![0.0; full / 2],
            out_lo: vec![0.0; full / 4],
            out_hi: vec![0.0; full / 4],
            even: vec![0.0; lane],
            odd: vec![0.0; lane],
        }
    }

    /// Mirror-pads `plane` out to (w, h) into `cur`, applying the −0.5 DC
    /// shift.
    fn pad_input(&mut self, plane: &Image, w: usize, h: usize) {
        let (pw, ph) = plane.size();
        for y in 0..h {
            let src = plane.row(reflect_index(y, ph));
            let dst = &mut self.cur[y * w..(y + 1) * w];
            for (x, dst) in dst.iter_mut().enumerate() {
                *dst = src[reflect_index(x, pw)] - 0.5;
            }
        }
    }

    /// One forward level: `cur` (w × h) → four bands (w/2 × h/2); the LL
    /// result also replaces `cur` for the next level.
    fn forward_level(
        &mut self,
        pyramid: &mut Pyramid,
        component: usize,
        level: usize,
        w: usize,
        h: usize,
        reduced: bool,
    ) {
        let (w2, h2) = (w / 2, h / 2);
        let DwtScratch {
            cur,
            tmp_lo,
            tmp_hi,
            out_lo,
            out_hi,
            even,
            odd,
            ..
        } = self;
        let (even, odd) = (&mut even[..w2.max(h2)], &mut odd[..w2.max(h2)]);

        for y in 0..h {
            let row = &cur[y * w..(y + 1) * w];
            for k in 0..w2 {
                even[k] = row[2 * k];
                odd[k] = row[2 * k + 1];
            }
            lift_forward(&mut even[..w2], &mut odd[..w2]);
            tmp_lo[y * w2..(y + 1) * w2].copy_from_slice(&even[..w2]);
            tmp_hi[y * w2..(y + 1) * w2].copy_from_slice(&odd[..w2]);
        }

        for (tmp, low_band, high_band) in [
            (&*tmp_lo, Band::Ll, Band::Lh),
            (&*tmp_hi, Band::Hl, Band::Hh),
        ] {
            for x in 0..w2 {
                for j in 0..h2 {
                    even[j] = tmp[(2 * j) * w2 + x];
                    odd[j] = tmp[(2 * j + 1) * w2 + x];
                }
                lift_forward(&mut even[..h2], &mut odd[..h2]);
                for j in 0..h2 {
                    out_lo[j * w2 + x] = even[j];
                    out_hi[j * w2 + x] = odd[j];
                }
            }
            for (out, band) in [(&*out_lo, low_band), (&*out_hi, high_band)] {
                let plane = pyramid.band_mut(component, level, band);
                for y in 0..h2 {
                    let dst = plane.row_mut(y);
                    for x in 0..w2 {
                        dst[x] = round_store(out[y * w2 + x], reduced);
                    }
                }
            }
        }

        let ll = pyramid.band(component, level, Band::Ll);
        for y in 0..h2 {
            cur[y * w2..(y + 1) * w2].copy_from_slice(ll.row(y));
        }
    }

    /// One inverse level: four bands (w2 × h2) → `cur` (2·w2 × 2·h2). The LL
    /// input comes from `next` (the previous, coarser reconstruction) except
    /// at the coarsest level, where it is read from the pyramid.
    fn inverse_level(
        &mut self,
        pyramid: &Pyramid,
        component: usize,
        level: usize,
        w2: usize,
        h2: usize,
        ll_from_pyramid: bool,
    ) {
        let DwtScratch {
            cur,
            next,
            tmp_lo,
            tmp_hi,
            even,
            odd,
            ..
        } = self;
        let (even, odd) = (&mut even[..w2.max(h2)], &mut odd[..w2.max(h2)]);
        let (w, h) = (w2 * 2, h2 * 2);

        for (dst, low_band, high_band) in [
            (&mut *tmp_lo, Band::Ll, Band::Lh),
            (&mut *tmp_hi, Band::Hl, Band::Hh),
        ] {
            let high = pyramid.band(component, level, high_band);
            let low = pyramid.band(component, level, low_band);
            for x in 0..w2 {
                for j in 0..h2 {
                    even[j] = if low_band == Band::Ll && !ll_from_pyramid {
                        next[j * w2 + x]
                    } else {
                        low.row(j)[x]
                    };
                    odd[j] = high.row(j)[x];
                }
                lift_inverse(&mut even[..h2], &mut odd[..h2]);
                for j in 0..h2 {
                    dst[(2 * j) * w2 + x] = even[j];
                    dst[(2 * j + 1) * w2 + x] = odd[j];
                }
            }
        }

        for y in 0..h {
            for k in 0..w2 {
                even[k] = tmp_lo[y * w2 + k];
                odd[k] = tmp_hi[y * w2 + k];
            }
            lift_inverse(&mut even[..w2], &mut odd[..w2]);
            let row = &mut cur[y * w..(y + 1) * w];
            for k in 0..w2 {
                row[2 * k] = even[k];
                row[2 * k + 1] = odd[k];
            }
        }
    }
}

/// Full analysis of one frame into the pyramid.
pub(crate) fn forward(
    frame: &Frame,
    layout: &BlockLayout,
    pyramid: &mut Pyramid,
    precision: Precision,
    scratch: &mut DwtScratch,
) {
    for component in 0..NUM_COMPONENTS {
        let start = start_level(component, layout.chroma());
        let mut w = layout.aligned_width() >> start;
        let mut h = layout.aligned_height() >> start;
        scratch.pad_input(frame.plane(component), w, h);
        for level in start..DECOMPOSITION_LEVELS {
            scratch.forward_level(pyramid, component, level, w, h, precision.reduced(level));
            w /= 2;
            h /= 2;
        }
    }
}

/// Full synthesis of the pyramid into `frame`, cropping the padding and
/// clamping the output to [0, 1].
pub(crate) fn inverse(
    pyramid: &Pyramid,
    layout: &BlockLayout,
    frame: &mut Frame,
    precision: Precision,
    scratch: &mut DwtScratch,
) {
    for component in 0..NUM_COMPONENTS {
        let start = start_level(component, layout.chroma());
        for level in (start..DECOMPOSITION_LEVELS).rev() {
            let w2 = layout.aligned_width() >> (level + 1);
            let h2 = layout.aligned_height() >> (level + 1);
            scratch.inverse_level(
                pyramid,
                component,
                level,
                w2,
                h2,
                level == DECOMPOSITION_LEVELS - 1,
            );
            if level != start {
                // The reconstruction becomes the LL input one level down,
                // stored at that level's plane precision.
                let reduced = precision.reduced(level - 1);
                for v in &mut scratch.cur[..w2 * h2 * 4] {
                    *v = round_store(*v, reduced);
                }
            }
            std::mem::swap(&mut scratch.cur, &mut scratch.next);
        }

        let plane = frame.plane_mut(component);
        let (pw, ph) = plane.size();
        let w = layout.aligned_width() >> start;
        for y in 0..ph {
            let src = &scratch.next[y * w..y * w + pw];
            let dst = plane.row_mut(y);
            for (dst, src) in dst.iter_mut().zip(src) {
                *dst = (src + 0.5).clamp(0.0, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::util::assert_close;

    #[test]
    fn reflection_repeats_the_edge_sample() {
        for i in 0..13 {
            assert_eq!(reflect_index(i, 13), i);
        }
        assert_eq!(reflect_index(8, 8), 7);
        assert_eq!(reflect_index(9, 8), 6);
        assert_eq!(reflect_index(15, 8), 0);
        // A tiny plane padded out to the 128-sample minimum keeps cycling.
        assert_eq!(reflect_index(16, 8), 0);
        assert_eq!(reflect_index(17, 8), 1);
        assert_eq!(reflect_index(100, 1), 0);
        assert_eq!(reflect_index(4, 2), 0);
        assert_eq!(reflect_index(5, 2), 1);
    }

    #[test]
    fn lifting_round_trips() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        for n in [1usize, 2, 3, 8, 17, 64] {
            let img = Image::new_random((2 * n, 1), &mut rng).unwrap();
            let src = img.row(0);
            let mut e: Vec<f32> = (0..n).map(|k| src[2 * k]).collect();
            let mut o: Vec<f32> = (0..n).map(|k| src[2 * k + 1]).collect();
            lift_forward(&mut e, &mut o);
            lift_inverse(&mut e, &mut o);
            for k in 0..n {
                assert_close(e[k], src[2 * k], 1e-5);
                assert_close(o[k], src[2 * k + 1], 1e-5);
            }
        }
    }

    fn round_trip(width: usize, height: usize, chroma: ChromaSubsampling, precision: Precision, tolerance: f32) {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let layout = BlockLayout::new(width, height, chroma).unwrap();
        let mut frame = Frame::new(width, height, chroma).unwrap();
        for c in 0..NUM_COMPONENTS {
            let size = frame.plane(c).size();
            *frame.plane_mut(c) = Image::new_random(size, &mut rng).unwrap();
        }
        let mut pyramid =
            Pyramid::new(layout.aligned_width(), layout.aligned_height(), chroma).unwrap();
        let mut scratch = DwtScratch::new(layout.aligned_width(), layout.aligned_height());
        forward(&frame, &layout, &mut pyramid, precision, &mut scratch);

        let mut out = Frame::new(width, height, chroma).unwrap();
        inverse(&pyramid, &layout, &mut out, precision, &mut scratch);
        for c in 0..NUM_COMPONENTS {
            let (pw, ph) = frame.plane(c).size();
            for y in 0..ph {
                for x in 0..pw {
                    assert_close(
                        out.plane(c).row(y)[x],
                        frame.plane(c).row(y)[x],
                        tolerance
                    );
                }
            }
        }
    }

    #[test]
    fn full_precision_round_trip() {
        round_trip(256, 128, ChromaSubsampling::Chroma420, Precision::Fp32, 2e-4);
        round_trip(200, 120, ChromaSubsampling::Chroma444, Precision::Fp32, 2e-4);
    }

    #[test]
    fn reduced_precision_round_trip() {
        round_trip(256, 128, ChromaSubsampling::Chroma420, Precision::Mixed, 3e-2);
        round_trip(256, 128, ChromaSubsampling::Chroma420, Precision::Fp16, 5e-2);
    }

    #[test]
    fn tiny_images_pad_to_minimum() {
        round_trip(16, 16, ChromaSubsampling::Chroma420, Precision::Fp32, 2e-4);
    }

    #[test]
    fn constant_frame_has_no_detail() {
        let chroma = ChromaSubsampling::Chroma420;
        let layout = BlockLayout::new(128, 128, chroma).unwrap();
        let mut frame = Frame::new(128, 128, chroma).unwrap();
        for c in 0..NUM_COMPONENTS {
            frame.plane_mut(c).fill(0.5);
        }
        let mut pyramid =
            Pyramid::new(layout.aligned_width(), layout.aligned_height(), chroma).unwrap();
        let mut scratch = DwtScratch::new(layout.aligned_width(), layout.aligned_height());
        forward(&frame, &layout, &mut pyramid, Precision::Fp32, &mut scratch);
        for c in 0..NUM_COMPONENTS {
            for level in start_level(c, chroma)..DECOMPOSITION_LEVELS {
                for band in Band::ALL {
                    let plane = pyramid.band(c, level, band);
                    for y in 0..plane.height() {
                        for value in plane.row(y) {
                            assert_close(*value, 0.0, 1e-5);
                        }
                    }
                }
            }
        }
    }
}
