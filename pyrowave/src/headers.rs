// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The two 8-byte wire headers.
//!
//! Every 32×32 block packet starts with a [`BlockHeader`]; a frame is
//! announced by a [`StartOfFrame`] record that reuses the same 8-byte
//! envelope with the `extended` bit set. Both share the position of the
//! `sequence` and `extended` fields so a parser can dispatch on the first
//! four bytes alone. All fields are packed LSB-first, little-endian.

use byteorder::{ByteOrder, LittleEndian};
use num_traits::FromPrimitive;

use crate::{
    error::{Error, Result},
    frame::{
        ChromaSiting, ChromaSubsampling, ColorPrimaries, Colorimetry, TransferFunction,
        YcbcrRange, YcbcrTransform,
    },
};

pub const HEADER_SIZE: usize = 8;

/// Field offsets within the 32-bit per-8×8 code word. The low 16 bits hold
/// two plane-code bits per 4×2 sub-block; on the wire the low and high
/// halves travel as separate arrays.
pub(crate) const Q_PLANES_OFFSET: u32 = 16;
pub(crate) const Q_PLANES_BITS: u32 = 4;
pub(crate) const QUANT_SCALE_OFFSET: u32 = 20;
pub(crate) const QUANT_SCALE_BITS: u32 = 6;
pub(crate) const DEADZONE_STRENGTH_OFFSET: u32 = 26;
pub(crate) const DEADZONE_STRENGTH_BITS: u32 = 6;

/// The 3-bit frame counter wraps at this mask.
pub const SEQUENCE_MASK: u8 = 0x7;

/// `extended` header code announcing a frame. Other codes are reserved.
pub const EXTENDED_CODE_START_OF_FRAME: u8 = 0;

/// Per-32×32-block header.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct BlockHeader {
    /// One bit per contained 8×8 block (bit = y * 4 + x), set iff that 8×8
    /// carries payload.
    pub ballot: u16,
    /// Size of the whole block packet in 32-bit words, header included.
    /// 12 bits on the wire.
    pub payload_words: u16,
    /// Frame counter mod 8.
    pub sequence: u8,
    /// Logarithmic band scale code, see [`crate::quant::decode_quant_scale`].
    pub quant_code: u8,
    /// Catalogue index of this block. 24 bits on the wire.
    pub block_index: u32,
}

impl BlockHeader {
    pub fn write(&self, out: &mut [u8]) {
        debug_assert!(self.payload_words < (1 << 12));
        debug_assert!(self.block_index < (1 << 24));
        let word0 = self.ballot as u32
            | ((self.payload_words as u32 & 0xfff) << 16)
            | ((self.sequence as u32 & SEQUENCE_MASK as u32) << 28);
        let word1 = self.quant_code as u32 | (self.block_index << 8);
        LittleEndian::write_u32(&mut out[0..4], word0);
        LittleEndian::write_u32(&mut out[4..8], word1);
    }

    pub fn parse(data: &[u8]) -> BlockHeader {
        let word0 = LittleEndian::read_u32(&data[0..4]);
        let word1 = LittleEndian::read_u32(&data[4..8]);
        debug_assert_eq!(word0 >> 31, 0, "extended header parsed as block header");
        BlockHeader {
            ballot: (word0 & 0xffff) as u16,
            payload_words: ((word0 >> 16) & 0xfff) as u16,
            sequence: ((word0 >> 28) & SEQUENCE_MASK as u32) as u8,
            quant_code: (word1 & 0xff) as u8,
            block_index: word1 >> 8,
        }
    }
}

/// Returns true when the 8 bytes at `data` carry an extended header.
pub fn is_extended(data: &[u8]) -> bool {
    data[3] & 0x80 != 0
}

/// The `sequence` field occupies the same bits in both header forms.
pub fn sequence_of(data: &[u8]) -> u8 {
    (data[3] >> 4) & SEQUENCE_MASK
}

/// Start-of-frame record (`extended = 1`, `code = 0`).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StartOfFrame {
    pub width: usize,
    pub height: usize,
    pub sequence: u8,
    /// Count of 32×32 blocks with non-empty payload in this frame.
    pub total_blocks: u32,
    pub chroma: ChromaSubsampling,
    pub colorimetry: Colorimetry,
}

impl StartOfFrame {
    pub fn write(&self, out: &mut [u8]) {
        debug_assert!(self.width >= 1 && self.width <= (1 << 14));
        debug_assert!(self.height >= 1 && self.height <= (1 << 14));
        debug_assert!(self.total_blocks < (1 << 24));
        let word0 = (self.width as u32 - 1)
            | ((self.height as u32 - 1) << 14)
            | ((self.sequence as u32 & SEQUENCE_MASK as u32) << 28)
            | (1 << 31);
        let c = &self.colorimetry;
        let word1 = (self.total_blocks & 0xff_ffff)
            | ((EXTENDED_CODE_START_OF_FRAME as u32) << 24)
            | ((self.chroma as u32) << 26)
            | ((c.primaries as u32) << 27)
            | ((c.transfer as u32) << 28)
            | ((c.ycbcr_transform as u32) << 29)
            | ((c.ycbcr_range as u32) << 30)
            | ((c.chroma_siting as u32) << 31);
        LittleEndian::write_u32(&mut out[0..4], word0);
        LittleEndian::write_u32(&mut out[4..8], word1);
    }

    pub fn parse(data: &[u8]) -> Result<StartOfFrame> {
        let word0 = LittleEndian::read_u32(&data[0..4]);
        let word1 = LittleEndian::read_u32(&data[4..8]);
        debug_assert_ne!(word0 >> 31, 0, "block header parsed as extended header");
        let code = ((word1 >> 24) & 0x3) as u8;
        if code != EXTENDED_CODE_START_OF_FRAME {
            return Err(Error::UnsupportedExtendedCode(code));
        }
        let chroma = ChromaSubsampling::from_u32((word1 >> 26) & 1)
            .ok_or(Error::InvalidEnum((word1 >> 26) & 1, "chroma".to_string()))?;
        let colorimetry = Colorimetry {
            primaries: ColorPrimaries::from_u32((word1 >> 27) & 1)
                .ok_or(Error::InvalidEnum((word1 >> 27) & 1, "primaries".to_string()))?,
            transfer: TransferFunction::from_u32((word1 >> 28) & 1)
                .ok_or(Error::InvalidEnum((word1 >> 28) & 1, "transfer".to_string()))?,
            ycbcr_transform: YcbcrTransform::from_u32((word1 >> 29) & 1).ok_or(
                Error::InvalidEnum((word1 >> 29) & 1, "ycbcr_transform".to_string()),
            )?,
            ycbcr_range: YcbcrRange::from_u32((word1 >> 30) & 1)
                .ok_or(Error::InvalidEnum((word1 >> 30) & 1, "ycbcr_range".to_string()))?,
            chroma_siting: ChromaSiting::from_u32(word1 >> 31).ok_or(Error::InvalidEnum(
                word1 >> 31,
                "chroma_siting".to_string(),
            ))?,
        };
        Ok(StartOfFrame {
            width: ((word0 & 0x3fff) + 1) as usize,
            height: (((word0 >> 14) & 0x3fff) + 1) as usize,
            sequence: ((word0 >> 28) & SEQUENCE_MASK as u32) as u8,
            total_blocks: word1 & 0xff_ffff,
            chroma,
            colorimetry,
        })
    }
}
