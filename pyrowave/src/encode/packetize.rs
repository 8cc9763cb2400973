// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Grouping packed blocks into MTU-sized transport packets.
//!
//! A frame opens with one start-of-frame record, then non-empty 32×32 block
//! packets follow in catalogue order. A transport packet closes as soon as
//! the next block would push it past the caller's MTU; a block bigger than
//! the MTU still travels, alone and oversized. Framing beyond this (RTP,
//! QUIC, FEC) is the transport's business.

use crate::headers::{StartOfFrame, HEADER_SIZE};

use super::pack::PacketMeta;

/// One frame's worth of transport packets, backed by a single buffer.
#[derive(Debug, Default)]
pub struct PacketList {
    buffer: Vec<u8>,
    ranges: Vec<(usize, usize)>,
}

impl PacketList {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn packet(&self, index: usize) -> &[u8] {
        let (offset, size) = self.ranges[index];
        &self.buffer[offset..offset + size]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.ranges
            .iter()
            .map(|&(offset, size)| &self.buffer[offset..offset + size])
    }

    pub fn total_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Predicts how many transport packets [`packetize`] will emit.
pub(crate) fn num_packets(meta: &[PacketMeta], mtu: usize) -> usize {
    let mut count = 0;
    let mut size_in_packet = HEADER_SIZE;
    for m in meta {
        let packet_size = m.num_words as usize * 4;
        if packet_size == 0 {
            continue;
        }
        if size_in_packet > 0 && size_in_packet + packet_size > mtu {
            count += 1;
            size_in_packet = 0;
        }
        size_in_packet += packet_size;
    }
    if size_in_packet > 0 {
        count += 1;
    }
    count
}

pub(crate) fn packetize(
    meta: &[PacketMeta],
    bitstream: &[u8],
    start_of_frame: StartOfFrame,
    mtu: usize,
) -> PacketList {
    let mut out = PacketList {
        buffer: Vec::with_capacity(bitstream.len() + HEADER_SIZE),
        ranges: Vec::new(),
    };
    out.buffer.resize(HEADER_SIZE, 0);
    start_of_frame.write(&mut out.buffer[..HEADER_SIZE]);

    let mut packet_offset = 0;
    let mut size_in_packet = HEADER_SIZE;
    for m in meta {
        let packet_size = m.num_words as usize * 4;
        if packet_size == 0 {
            continue;
        }
        if size_in_packet > 0 && size_in_packet + packet_size > mtu {
            out.ranges.push((packet_offset, size_in_packet));
            packet_offset += size_in_packet;
            size_in_packet = 0;
        }
        out.buffer
            .extend_from_slice(&bitstream[m.offset as usize..m.offset as usize + packet_size]);
        size_in_packet += packet_size;
    }
    if size_in_packet > 0 {
        out.ranges.push((packet_offset, size_in_packet));
    }
    out
}
