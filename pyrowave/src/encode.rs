// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The encoder pipeline: analysis transform, quantisation, rate control,
//! block packing, packetisation. One `encode` call is one frame; every
//! buffer involved is owned by the [`Encoder`] and reused across frames.

pub(crate) mod pack;
mod packetize;
pub(crate) mod quantize;
mod rdo;

pub use self::packetize::PacketList;

use crate::{
    decode::dequant::validate_block_packet,
    dwt::{self, DwtScratch, Precision},
    error::{Error, Result},
    frame::{ChromaSubsampling, Colorimetry, Frame},
    headers::{BlockHeader, StartOfFrame, HEADER_SIZE, SEQUENCE_MASK},
    layout::{Band, BandInfo, BlockLayout, DECOMPOSITION_LEVELS},
    pyramid::Pyramid,
    quant::{decode_quant_scale, encode_quant_scale},
    util::tracing_wrappers::*,
};

use self::pack::PacketMeta;
use self::quantize::QuantScratch;
use self::rdo::RdoBuckets;

/// Outcome of one encoded frame.
#[derive(Copy, Clone, Debug)]
pub struct EncodeStats {
    /// Total frame payload including the start-of-frame record.
    pub payload_bytes: usize,
    /// Rate control could not reach the target even at maximum quantisation.
    /// The (oversized) frame is still well-formed; dropping it is the
    /// caller's call.
    pub rate_overflow: bool,
    /// The 3-bit sequence number this frame carries.
    pub sequence: u8,
}

/// Initial quantisation aims for a flat spectrum under noise-power
/// normalization: the CDF 9/7 low-pass gains ~6 dB per decomposition level.
fn noise_power_normalized_resolution(band: &BandInfo) -> f32 {
    let mut bits = 6i32;
    bits += match band.band {
        Band::Ll => 2,
        Band::Hl | Band::Lh => 1,
        Band::Hh => 0,
    };
    bits += band.level as i32;
    // Chroma starts one level up.
    if band.component != 0 {
        bits -= 1;
    }
    (bits as f32).exp2()
}

/// FP16 payload range is limited; cap the working resolution.
fn quant_resolution(band: &BandInfo) -> f32 {
    noise_power_normalized_resolution(band).min(512.0)
}

/// Contrast-sensitivity weighting of distortion, per band midpoint
/// frequency, assuming a desktop-distance 96 DPI viewer.
fn rdo_distortion_scale(band: &BandInfo) -> f32 {
    let horiz_midpoint: f32 = if matches!(band.band, Band::Hl | Band::Hh) {
        0.75
    } else {
        0.25
    };
    let vert_midpoint: f32 = if matches!(band.band, Band::Lh | Band::Hh) {
        0.75
    } else {
        0.25
    };

    const DPI: f32 = 96.0;
    const VIEWING_DISTANCE: f32 = 1.0;
    const CPD_NYQUIST: f32 = 0.34 * VIEWING_DISTANCE * DPI;

    let cpd = (horiz_midpoint * horiz_midpoint + vert_midpoint * vert_midpoint).sqrt()
        * CPD_NYQUIST
        * (-(band.level as f32)).exp2();

    // Never treat the low bands as expendable.
    let cpd = cpd.max(8.0);

    let mut csf = 2.6 * (0.0192 + 0.114 * cpd) * (-(0.114 * cpd).powf(1.1)).exp();

    // Heavily discount chroma quality.
    if band.component != 0 && band.level != DECOMPOSITION_LEVELS - 1 {
        csf *= 0.4;
    }

    // Distortion in lower bands spreads into more noise power after
    // synthesis; scale (in power, hence squared) to keep results uniform.
    let weighted = csf * noise_power_normalized_resolution(band);
    weighted * weighted
}

struct BandCoding {
    quant_code: u8,
    /// `1 / decode_quant_scale(quant_code)`: the exact inverse of the step
    /// the decoder will apply.
    eff_resolution: f32,
    /// Converts scaled-unit squared error into CSF-weighted distortion
    /// (modulo the per-block fine scale, applied during analysis).
    distortion_weight: f32,
}

pub struct Encoder {
    layout: BlockLayout,
    precision: Precision,
    colorimetry: Colorimetry,
    pyramid: Pyramid,
    dwt: DwtScratch,
    quant: QuantScratch,
    buckets: RdoBuckets,
    quant_table: Vec<u8>,
    band_coding: Vec<BandCoding>,
    band_weights: Vec<f32>,
    band_quant_codes: Vec<u8>,
    bitstream: Vec<u8>,
    meta: Vec<PacketMeta>,
    sequence: u8,
}

impl Encoder {
    pub fn new(
        width: usize,
        height: usize,
        chroma: ChromaSubsampling,
        precision: Precision,
    ) -> Result<Encoder> {
        let layout = BlockLayout::new(width, height, chroma)?;
        let pyramid = Pyramid::new(layout.aligned_width(), layout.aligned_height(), chroma)?;
        let dwt = DwtScratch::new(layout.aligned_width(), layout.aligned_height());
        let quant = QuantScratch::new(&layout);
        let buckets = RdoBuckets::new(layout.block_count_32x32());
        let quant_table = vec![0u8; layout.block_count_32x32()];

        let band_coding: Vec<BandCoding> = layout
            .bands()
            .iter()
            .map(|band| {
                let quant_code = encode_quant_scale(1.0 / quant_resolution(band));
                let eff_resolution = 1.0 / decode_quant_scale(quant_code);
                BandCoding {
                    quant_code,
                    eff_resolution,
                    distortion_weight: rdo_distortion_scale(band)
                        / (eff_resolution * eff_resolution),
                }
            })
            .collect();
        let band_weights = band_coding.iter().map(|b| b.distortion_weight).collect();
        let band_quant_codes = band_coding.iter().map(|b| b.quant_code).collect();

        Ok(Encoder {
            layout,
            precision,
            colorimetry: Colorimetry::default(),
            pyramid,
            dwt,
            quant,
            buckets,
            quant_table,
            band_coding,
            band_weights,
            band_quant_codes,
            bitstream: Vec::new(),
            meta: Vec::new(),
            sequence: 0,
        })
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Colorimetry tags to signal in start-of-frame records.
    pub fn set_colorimetry(&mut self, colorimetry: Colorimetry) {
        self.colorimetry = colorimetry;
    }

    /// Encodes one frame against a byte budget. The packed frame stays
    /// buffered inside the encoder until the next call; split it for
    /// transport with [`Encoder::packetize`].
    pub fn encode(&mut self, frame: &Frame, target_bytes: usize) -> Result<EncodeStats> {
        frame.check_compatible(self.layout.width(), self.layout.height(), self.layout.chroma())?;
        if target_bytes < HEADER_SIZE {
            return Err(Error::TargetTooSmall(target_bytes));
        }

        self.sequence = (self.sequence + 1) & SEQUENCE_MASK;

        dwt::forward(
            frame,
            &self.layout,
            &mut self.pyramid,
            self.precision,
            &mut self.dwt,
        );

        self.quant.clear();
        for (band, coding) in self.layout.bands().iter().zip(self.band_coding.iter()) {
            quantize::quantize_band(
                self.pyramid.band(band.component, band.level, band.band),
                band,
                &self.layout,
                coding.eff_resolution,
                &mut self.quant,
            );
        }

        let total_words = rdo::analyze(&self.layout, &self.quant, &self.band_weights, &mut self.buckets);
        let rate_overflow = rdo::resolve(
            &self.buckets,
            total_words,
            target_bytes,
            &mut self.quant_table,
        );
        if rate_overflow {
            warn!(
                "rate control overflow: {} words cannot fit {} bytes",
                total_words, target_bytes
            );
        }

        pack::pack_frame(
            &self.layout,
            &self.quant,
            &self.quant_table,
            &self.band_quant_codes,
            self.sequence,
            &mut self.bitstream,
            &mut self.meta,
        );
        debug_assert!(self.validate_bitstream());

        Ok(EncodeStats {
            payload_bytes: self.payload_bytes(),
            rate_overflow,
            sequence: self.sequence,
        })
    }

    fn payload_bytes(&self) -> usize {
        HEADER_SIZE
            + self
                .meta
                .iter()
                .map(|m| m.num_words as usize * 4)
                .sum::<usize>()
    }

    fn start_of_frame(&self) -> StartOfFrame {
        StartOfFrame {
            width: self.layout.width(),
            height: self.layout.height(),
            sequence: self.sequence,
            total_blocks: self.meta.iter().filter(|m| m.num_words != 0).count() as u32,
            chroma: self.layout.chroma(),
            colorimetry: self.colorimetry,
        }
    }

    /// Number of transport packets [`Encoder::packetize`] would emit for the
    /// buffered frame at this MTU.
    pub fn num_packets(&self, mtu: usize) -> usize {
        packetize::num_packets(&self.meta, mtu)
    }

    /// Splits the buffered frame into transport packets of at most `mtu`
    /// bytes (single blocks larger than the MTU excepted). Ownership of the
    /// returned packets passes to the caller; the encoder's own buffers are
    /// free for the next frame.
    pub fn packetize(&self, mtu: usize) -> PacketList {
        packetize::packetize(&self.meta, &self.bitstream, self.start_of_frame(), mtu)
    }

    /// Re-parses the freshly packed frame and checks every block packet for
    /// self-consistency, as a debug guard against packer regressions.
    fn validate_bitstream(&self) -> bool {
        for (index, m) in self.meta.iter().enumerate() {
            if m.num_words == 0 {
                continue;
            }
            let data = &self.bitstream
                [m.offset as usize..m.offset as usize + m.num_words as usize * 4];
            if let Err(e) = validate_block_packet(&self.layout, data) {
                error!("packed block {} fails validation: {}", index, e);
                return false;
            }
            let header = BlockHeader::parse(data);
            if header.block_index as usize != index
                || header.payload_words as u32 != m.num_words
            {
                error!("packed block {} disagrees with its meta record", index);
                return false;
            }
        }
        true
    }

    /// Logs the byte share of every band in the buffered frame.
    pub fn report_stats(&self) {
        if self.meta.is_empty() {
            return;
        }
        let mut total_words = 0u64;
        let mut luma_pixels = 0u64;
        for band in self.layout.bands() {
            let mut words = 0u64;
            for y in 0..band.blocks_y_32x32 {
                for x in 0..band.blocks_x_32x32 {
                    words += self.meta[band.block_index(x, y) as usize].num_words as u64;
                }
            }
            let bpp = (words as f64 * 32.0) / (band.width * band.height) as f64;
            info!(
                "component {}, level {}, band {:?}: {} bytes ({:.3} bpp)",
                band.component,
                band.level,
                band.band,
                words * 4,
                bpp
            );
            total_words += words;
            if band.component == 0 {
                luma_pixels += (band.width * band.height) as u64;
            }
        }
        info!(
            "frame: {} bytes, {:.3} bpp",
            total_words * 4,
            (total_words as f64 * 32.0) / luma_pixels.max(1) as f64
        );
    }
}
