// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_derive::FromPrimitive;

use crate::{
    error::{Error, Result},
    image::Image,
    layout::NUM_COMPONENTS,
};

/// Chroma layouts understood by the bitstream. In 4:2:0 mode the level-0
/// chroma bands are never coded and the chroma planes are half-size.
#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ChromaSubsampling {
    #[default]
    Chroma420 = 0,
    Chroma444 = 1,
}

#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ColorPrimaries {
    #[default]
    Bt709 = 0,
    Bt2020 = 1,
}

#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum TransferFunction {
    #[default]
    Bt709 = 0,
    Pq = 1,
}

#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum YcbcrTransform {
    #[default]
    Bt709 = 0,
    Bt2020Ncl = 1,
}

#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum YcbcrRange {
    #[default]
    Full = 0,
    Limited = 1,
}

#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ChromaSiting {
    #[default]
    Center = 0,
    Left = 1,
}

/// Colorimetry tags carried in the start-of-frame record. These are advisory
/// for the renderer and do not alter the decoding algorithm.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Colorimetry {
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
    pub ycbcr_transform: YcbcrTransform,
    pub ycbcr_range: YcbcrRange,
    pub chroma_siting: ChromaSiting,
}

/// Returns the chroma plane dimensions for the given luma dimensions.
pub fn chroma_dimensions(
    width: usize,
    height: usize,
    chroma: ChromaSubsampling,
) -> (usize, usize) {
    match chroma {
        ChromaSubsampling::Chroma420 => (width / 2, height / 2),
        ChromaSubsampling::Chroma444 => (width, height),
    }
}

/// A YCbCr frame: three planes of normalized [0, 1] samples.
#[derive(Debug)]
pub struct Frame {
    width: usize,
    height: usize,
    chroma: ChromaSubsampling,
    planes: Vec<Image>,
}

impl Frame {
    /// Allocates a zeroed frame. 4:2:0 frames must have even dimensions.
    pub fn new(width: usize, height: usize, chroma: ChromaSubsampling) -> Result<Frame> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize(width, height));
        }
        if chroma == ChromaSubsampling::Chroma420 && (width % 2 != 0 || height % 2 != 0) {
            return Err(Error::OddDimensionsForChroma420(width, height));
        }
        let (cw, ch) = chroma_dimensions(width, height, chroma);
        let planes = vec![
            Image::new((width, height))?,
            Image::new((cw, ch))?,
            Image::new((cw, ch))?,
        ];
        Ok(Frame {
            width,
            height,
            chroma,
            planes,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn chroma(&self) -> ChromaSubsampling {
        self.chroma
    }

    pub fn plane(&self, component: usize) -> &Image {
        &self.planes[component]
    }

    pub fn plane_mut(&mut self, component: usize) -> &mut Image {
        &mut self.planes[component]
    }

    /// Checks that this frame matches the codec configuration.
    pub(crate) fn check_compatible(
        &self,
        width: usize,
        height: usize,
        chroma: ChromaSubsampling,
    ) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(Error::DimensionMismatch(
                self.width,
                self.height,
                width,
                height,
            ));
        }
        if self.chroma != chroma {
            return Err(Error::ChromaMismatch(self.chroma, chroma));
        }
        for (c, plane) in self.planes.iter().enumerate() {
            let expected = if c == 0 {
                (width, height)
            } else {
                chroma_dimensions(width, height, chroma)
            };
            if plane.size() != expected {
                return Err(Error::PlaneSizeMismatch(
                    c,
                    plane.width(),
                    plane.height(),
                    expected.0,
                    expected.1,
                ));
            }
        }
        debug_assert_eq!(self.planes.len(), NUM_COMPONENTS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_plane_sizes() {
        let f = Frame::new(64, 48, ChromaSubsampling::Chroma420).unwrap();
        assert_eq!(f.plane(0).size(), (64, 48));
        assert_eq!(f.plane(1).size(), (32, 24));

        let f = Frame::new(64, 48, ChromaSubsampling::Chroma444).unwrap();
        assert_eq!(f.plane(2).size(), (64, 48));
    }

    #[test]
    fn rejects_odd_420() {
        assert!(Frame::new(63, 48, ChromaSubsampling::Chroma420).is_err());
        assert!(Frame::new(64, 47, ChromaSubsampling::Chroma420).is_err());
        assert!(Frame::new(63, 47, ChromaSubsampling::Chroma444).is_ok());
    }
}
