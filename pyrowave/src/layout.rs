// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The block index catalogue.
//!
//! Every 32×32 subband block in a frame gets a unique 24-bit index. The
//! enumeration order is part of the wire format: levels from coarsest to
//! finest, components Y/Cb/Cr within a level, bands [LL,] HL, LH, HH within a
//! component (LL exists only at the coarsest level), blocks row-major within
//! a band. The catalogue is built once per (width, height, chroma) triple and
//! never mutated.

use crate::{
    error::{Error, Result},
    frame::ChromaSubsampling,
    util::align_to,
};

pub const DECOMPOSITION_LEVELS: usize = 5;
pub const NUM_COMPONENTS: usize = 3;

/// Subband blocks tile at this granularity, so the padded image must be a
/// multiple of it.
pub const BLOCK_ALIGNMENT: usize = 1 << DECOMPOSITION_LEVELS;

/// Below this size the coarsest bands get so small that the edge mirroring
/// starts reflecting twice; pad up instead.
pub const MIN_IMAGE_SIZE: usize = 4 << DECOMPOSITION_LEVELS;

/// Dimensions must fit the 14-bit start-of-frame fields.
pub const MAX_DIMENSION: usize = 16384;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Band {
    Ll = 0,
    Hl = 1,
    Lh = 2,
    Hh = 3,
}

impl Band {
    pub(crate) const ALL: [Band; 4] = [Band::Ll, Band::Hl, Band::Lh, Band::Hh];
}

/// Pixel coordinates of linear index `k` within a 4×2 sub-block
/// (y is bit 0, x is bits 1..3).
#[inline]
pub(crate) fn subblock_pixel(k: usize) -> (usize, usize) {
    ((k >> 1) & 3, k & 1)
}

/// Origin of sub-block `s` within its 8×8 block; sub-blocks tile the 8×8
/// column-major as 4 rows by 2 columns.
#[inline]
pub(crate) fn subblock_origin(s: usize) -> (usize, usize) {
    ((s >> 2) * 4, (s & 3) * 2)
}

/// One coded subband: geometry plus the base offsets of its block grids.
#[derive(Clone, Debug)]
pub struct BandInfo {
    pub component: usize,
    pub level: usize,
    pub band: Band,
    /// Subband dimensions, `aligned >> (level + 1)` per axis.
    pub width: usize,
    pub height: usize,
    pub blocks_x_8x8: usize,
    pub blocks_y_8x8: usize,
    pub blocks_x_32x32: usize,
    pub blocks_y_32x32: usize,
    /// First 8×8 / 32×32 index of this band in the frame-wide grids.
    pub block_offset_8x8: usize,
    pub block_offset_32x32: usize,
}

impl BandInfo {
    /// Frame-wide 32×32 index of the block at band coordinates (x, y).
    pub fn block_index(&self, x: usize, y: usize) -> u32 {
        debug_assert!(x < self.blocks_x_32x32 && y < self.blocks_y_32x32);
        (self.block_offset_32x32 + y * self.blocks_x_32x32 + x) as u32
    }
}

/// Reverse mapping for one 32×32 block.
#[derive(Copy, Clone, Debug)]
pub struct BlockInfo {
    /// Index into [`BlockLayout::bands`].
    pub band: u16,
    /// Position in the band's 32×32 grid.
    pub block_x: u16,
    pub block_y: u16,
    /// Frame-wide index of this block's top-left 8×8 tile.
    pub offset_8x8: u32,
    pub stride_8x8: u32,
    /// In-range 8×8 tiles; fewer than 4×4 when the band edge clips the block.
    pub width_8x8: u8,
    pub height_8x8: u8,
}

/// The immutable catalogue for one codec configuration.
#[derive(Debug)]
pub struct BlockLayout {
    width: usize,
    height: usize,
    aligned_width: usize,
    aligned_height: usize,
    chroma: ChromaSubsampling,
    bands: Vec<BandInfo>,
    blocks: Vec<BlockInfo>,
    block_count_8x8: usize,
}

impl BlockLayout {
    pub fn new(width: usize, height: usize, chroma: ChromaSubsampling) -> Result<BlockLayout> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(Error::InvalidImageSize(width, height));
        }
        if chroma == ChromaSubsampling::Chroma420 && (width % 2 != 0 || height % 2 != 0) {
            return Err(Error::OddDimensionsForChroma420(width, height));
        }

        let aligned_width = align_to(width, BLOCK_ALIGNMENT).max(MIN_IMAGE_SIZE);
        let aligned_height = align_to(height, BLOCK_ALIGNMENT).max(MIN_IMAGE_SIZE);

        let mut layout = BlockLayout {
            width,
            height,
            aligned_width,
            aligned_height,
            chroma,
            bands: Vec::new(),
            blocks: Vec::new(),
            block_count_8x8: 0,
        };

        for level in (0..DECOMPOSITION_LEVELS).rev() {
            for component in 0..NUM_COMPONENTS {
                if level == 0 && component != 0 && chroma == ChromaSubsampling::Chroma420 {
                    continue;
                }
                let first_band = if level == DECOMPOSITION_LEVELS - 1 { 0 } else { 1 };
                for band in &Band::ALL[first_band..] {
                    layout.push_band(component, level, *band);
                }
            }
        }

        debug_assert!(layout.blocks.len() < (1 << 24));
        Ok(layout)
    }

    fn push_band(&mut self, component: usize, level: usize, band: Band) {
        let width = self.aligned_width >> (level + 1);
        let height = self.aligned_height >> (level + 1);
        let blocks_x_8x8 = width.div_ceil(8);
        let blocks_y_8x8 = height.div_ceil(8);
        let blocks_x_32x32 = width.div_ceil(32);
        let blocks_y_32x32 = height.div_ceil(32);

        let info = BandInfo {
            component,
            level,
            band,
            width,
            height,
            blocks_x_8x8,
            blocks_y_8x8,
            blocks_x_32x32,
            blocks_y_32x32,
            block_offset_8x8: self.block_count_8x8,
            block_offset_32x32: self.blocks.len(),
        };

        for y in 0..blocks_y_32x32 {
            for x in 0..blocks_x_32x32 {
                self.blocks.push(BlockInfo {
                    band: self.bands.len() as u16,
                    block_x: x as u16,
                    block_y: y as u16,
                    offset_8x8: (self.block_count_8x8 + 4 * y * blocks_x_8x8 + 4 * x) as u32,
                    stride_8x8: blocks_x_8x8 as u32,
                    width_8x8: blocks_x_8x8.saturating_sub(4 * x).min(4) as u8,
                    height_8x8: blocks_y_8x8.saturating_sub(4 * y).min(4) as u8,
                });
            }
        }

        self.block_count_8x8 += blocks_x_8x8 * blocks_y_8x8;
        self.bands.push(info);
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn aligned_width(&self) -> usize {
        self.aligned_width
    }

    pub fn aligned_height(&self) -> usize {
        self.aligned_height
    }

    pub fn chroma(&self) -> ChromaSubsampling {
        self.chroma
    }

    pub fn block_count_32x32(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_count_8x8(&self) -> usize {
        self.block_count_8x8
    }

    /// Bands in catalogue (wire) order.
    pub fn bands(&self) -> &[BandInfo] {
        &self.bands
    }

    pub fn block(&self, index: u32) -> &BlockInfo {
        &self.blocks[index as usize]
    }

    pub fn band_of(&self, block: &BlockInfo) -> &BandInfo {
        &self.bands[block.band as usize]
    }
}
