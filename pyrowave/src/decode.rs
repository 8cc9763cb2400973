// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The decoder front-end: transport packet ingestion, sequence tracking and
//! block accumulation.
//!
//! Packet loss is the normal case, not the exception. Malformed packets are
//! dropped without disturbing the accumulated frame; stale and duplicate
//! packets are discarded silently; blocks that never arrive decode as zero
//! coefficients, which blurs the affected band instead of corrupting the
//! stream.

pub(crate) mod dequant;

use crate::{
    dwt::{self, DwtScratch, Precision},
    error::{Error, Result},
    frame::{ChromaSubsampling, Colorimetry, Frame},
    headers::{is_extended, sequence_of, BlockHeader, StartOfFrame, HEADER_SIZE, SEQUENCE_MASK},
    layout::BlockLayout,
    pyramid::Pyramid,
    util::tracing_wrappers::*,
};

use self::dequant::{dequantize_block, validate_block_packet, DecodedSub};

const OFFSET_UNSET: u32 = u32::MAX;

pub struct Decoder {
    layout: BlockLayout,
    precision: Precision,
    pyramid: Pyramid,
    dwt: DwtScratch,
    /// Append-only copy of every accepted block packet for the current
    /// frame; blocks are located through `offsets`.
    payload: Vec<u8>,
    offsets: Vec<u32>,
    decoded_blocks: usize,
    total_blocks: usize,
    last_seq: Option<u8>,
    decoded_frame_for_current_sequence: bool,
    colorimetry: Colorimetry,
    subs_scratch: Vec<DecodedSub>,
}

impl Decoder {
    pub fn new(
        width: usize,
        height: usize,
        chroma: ChromaSubsampling,
        precision: Precision,
    ) -> Result<Decoder> {
        let layout = BlockLayout::new(width, height, chroma)?;
        let pyramid = Pyramid::new(layout.aligned_width(), layout.aligned_height(), chroma)?;
        let dwt = DwtScratch::new(layout.aligned_width(), layout.aligned_height());
        let total_blocks = layout.block_count_32x32();
        Ok(Decoder {
            offsets: vec![OFFSET_UNSET; total_blocks],
            payload: Vec::with_capacity(1024 * 1024),
            decoded_blocks: 0,
            total_blocks,
            last_seq: None,
            decoded_frame_for_current_sequence: false,
            colorimetry: Colorimetry::default(),
            subs_scratch: Vec::with_capacity(128),
            layout,
            precision,
            pyramid,
            dwt,
        })
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Colorimetry signalled by the most recent start-of-frame record.
    pub fn colorimetry(&self) -> Colorimetry {
        self.colorimetry
    }

    /// Drops all state accumulated for the current frame.
    pub fn clear(&mut self) {
        self.offsets.iter_mut().for_each(|o| *o = OFFSET_UNSET);
        self.payload.clear();
        self.decoded_blocks = 0;
        self.total_blocks = self.layout.block_count_32x32();
        self.decoded_frame_for_current_sequence = false;
    }

    /// Accepts the header's sequence number, clearing frame state when it
    /// advances. Returns false when the packet is stale and the caller must
    /// discard the rest of the datagram (all headers within one datagram
    /// share a sequence).
    fn track_sequence(&mut self, seq: u8) -> bool {
        if let Some(last) = self.last_seq {
            let diff = seq.wrapping_sub(last) & SEQUENCE_MASK;
            if diff > SEQUENCE_MASK / 2 {
                warn!("backwards sequence {} after {}, discarding", seq, last);
                return false;
            }
            if diff != 0 {
                self.clear();
                self.last_seq = Some(seq);
            }
        } else {
            self.clear();
            self.last_seq = Some(seq);
        }
        true
    }

    /// Ingests one transport datagram, which carries one or more 8-byte
    /// headers each followed by its declared payload.
    ///
    /// Errors leave previously accepted blocks intact; the caller may keep
    /// feeding packets for the same frame.
    pub fn push_packet(&mut self, data: &[u8]) -> Result<()> {
        let mut data = data;
        while data.len() >= HEADER_SIZE {
            if !self.track_sequence(sequence_of(data)) {
                return Ok(());
            }

            if is_extended(data) {
                let sof = StartOfFrame::parse(data)?;
                if sof.width != self.layout.width() || sof.height != self.layout.height() {
                    return Err(Error::DimensionMismatch(
                        sof.width,
                        sof.height,
                        self.layout.width(),
                        self.layout.height(),
                    ));
                }
                if sof.chroma != self.layout.chroma() {
                    return Err(Error::ChromaMismatch(sof.chroma, self.layout.chroma()));
                }
                self.total_blocks = sof.total_blocks as usize;
                self.colorimetry = sof.colorimetry;
                data = &data[HEADER_SIZE..];
                continue;
            }

            let header = BlockHeader::parse(data);
            let packet_size = header.payload_words as usize * 4;
            if packet_size < HEADER_SIZE {
                return Err(Error::TruncatedPacket {
                    needed: HEADER_SIZE,
                    available: packet_size,
                });
            }
            if packet_size > data.len() {
                return Err(Error::TruncatedPacket {
                    needed: packet_size,
                    available: data.len(),
                });
            }
            if header.block_index >= self.layout.block_count_32x32() as u32 {
                return Err(Error::OutOfRangeBlockIndex(
                    header.block_index,
                    self.layout.block_count_32x32() as u32,
                ));
            }

            if self.offsets[header.block_index as usize] != OFFSET_UNSET {
                // Duplicates are legitimate: senders may resend critical
                // low-frequency blocks as primitive FEC.
                debug!("block {} already decoded, skipping", header.block_index);
            } else {
                validate_block_packet(&self.layout, &data[..packet_size])?;
                self.offsets[header.block_index as usize] = self.payload.len() as u32;
                self.payload.extend_from_slice(&data[..packet_size]);
                self.decoded_blocks += 1;
            }

            data = &data[packet_size..];
        }

        if !data.is_empty() {
            return Err(Error::TruncatedPacket {
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }
        Ok(())
    }

    /// True when a frame can be reconstructed: every signalled block arrived,
    /// or, with `allow_partial_frame`, strictly more than half of them (less
    /// than that and the frame is assumed to be garbage).
    pub fn decode_is_ready(&self, allow_partial_frame: bool) -> bool {
        if self.decoded_frame_for_current_sequence {
            return false;
        }
        if self.decoded_blocks < self.total_blocks {
            if !allow_partial_frame || self.decoded_blocks <= self.total_blocks / 2 {
                return false;
            }
        }
        true
    }

    /// Reconstructs the current frame. Returns false (leaving `frame`
    /// untouched) when not enough blocks arrived. Missing blocks contribute
    /// zero coefficients.
    pub fn decode(&mut self, frame: &mut Frame, allow_partial_frame: bool) -> Result<bool> {
        frame.check_compatible(self.layout.width(), self.layout.height(), self.layout.chroma())?;
        if !self.decode_is_ready(allow_partial_frame) {
            return Ok(false);
        }

        self.pyramid.clear();
        for index in 0..self.layout.block_count_32x32() {
            let offset = self.offsets[index];
            if offset == OFFSET_UNSET {
                continue;
            }
            let offset = offset as usize;
            let words = BlockHeader::parse(&self.payload[offset..offset + HEADER_SIZE])
                .payload_words as usize;
            dequantize_block(
                &self.layout,
                &self.payload[offset..offset + words * 4],
                &mut self.pyramid,
                &mut self.subs_scratch,
            );
        }

        dwt::inverse(
            &self.pyramid,
            &self.layout,
            frame,
            self.precision,
            &mut self.dwt,
        );
        self.decoded_frame_for_current_sequence = true;
        Ok(true)
    }
}
