// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Storage for the wavelet decomposition of one frame.
//!
//! Four planes per (component, level): LL, HL, LH, HH, each a quarter of the
//! level's input area. LL planes below the coarsest level are transform
//! intermediates and never hit the bitstream. In 4:2:0 mode the chroma
//! components have no level-0 planes at all.

use crate::{
    error::Result,
    frame::ChromaSubsampling,
    image::Image,
    layout::{Band, DECOMPOSITION_LEVELS, NUM_COMPONENTS},
};

pub(crate) struct Pyramid {
    planes: Vec<Option<Image>>,
}

pub(crate) fn component_has_level(
    component: usize,
    level: usize,
    chroma: ChromaSubsampling,
) -> bool {
    level != 0 || component == 0 || chroma == ChromaSubsampling::Chroma444
}

impl Pyramid {
    pub fn new(
        aligned_width: usize,
        aligned_height: usize,
        chroma: ChromaSubsampling,
    ) -> Result<Pyramid> {
        let mut planes = Vec::with_capacity(NUM_COMPONENTS * DECOMPOSITION_LEVELS * 4);
        for component in 0..NUM_COMPONENTS {
            for level in 0..DECOMPOSITION_LEVELS {
                let size = (aligned_width >> (level + 1), aligned_height >> (level + 1));
                for _band in 0..4 {
                    planes.push(if component_has_level(component, level, chroma) {
                        Some(Image::new(size)?)
                    } else {
                        None
                    });
                }
            }
        }
        Ok(Pyramid { planes })
    }

    fn index(component: usize, level: usize, band: Band) -> usize {
        (component * DECOMPOSITION_LEVELS + level) * 4 + band as usize
    }

    pub fn band(&self, component: usize, level: usize, band: Band) -> &Image {
        self.planes[Self::index(component, level, band)]
            .as_ref()
            .expect("band not present at this level")
    }

    pub fn band_mut(&mut self, component: usize, level: usize, band: Band) -> &mut Image {
        self.planes[Self::index(component, level, band)]
            .as_mut()
            .expect("band not present at this level")
    }

    /// Zeroes every stored coefficient; missing blocks then decode as blur.
    pub fn clear(&mut self) {
        for plane in self.planes.iter_mut().flatten() {
            plane.fill(0.0);
        }
    }
}
