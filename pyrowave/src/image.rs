// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::layout::MAX_DIMENSION;

/// A single-channel floating-point plane.
///
/// Rows are stored contiguously without padding; all sizes are in samples.
pub struct Image {
    size: (usize, usize),
    data: Vec<f32>,
}

impl Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image {}x{}", self.size.0, self.size.1)
    }
}

impl Image {
    pub fn new(size: (usize, usize)) -> Result<Image> {
        let (xsize, ysize) = size;
        if xsize == 0 || ysize == 0 {
            return Err(Error::InvalidImageSize(xsize, ysize));
        }
        // Frame planes are bounded by the 14-bit header fields and subband
        // planes only get smaller, so the sample count stays far below any
        // usize overflow.
        if xsize > MAX_DIMENSION || ysize > MAX_DIMENSION {
            return Err(Error::ImageSizeTooLarge(xsize, ysize));
        }
        let samples = xsize * ysize;
        let mut data = Vec::new();
        data.try_reserve_exact(samples)?;
        data.resize(samples, 0.0);
        Ok(Image {
            size: (xsize, ysize),
            data,
        })
    }

    #[cfg(test)]
    pub fn new_random<R: rand::Rng>(size: (usize, usize), rng: &mut R) -> Result<Image> {
        use rand::distributions::{Distribution, Uniform};
        let mut img = Self::new(size)?;
        let dist = Uniform::new(0.0f32, 1.0f32);
        img.data.iter_mut().for_each(|x| *x = dist.sample(rng));
        Ok(img)
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn width(&self) -> usize {
        self.size.0
    }

    pub fn height(&self) -> usize {
        self.size.1
    }

    pub fn row(&self, y: usize) -> &[f32] {
        debug_assert!(y < self.size.1);
        &self.data[y * self.size.0..(y + 1) * self.size.0]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        debug_assert!(y < self.size.1);
        &mut self.data[y * self.size.0..(y + 1) * self.size.0]
    }

    /// Sample with bounds checking; out-of-plane reads return 0.
    pub fn get_or_zero(&self, x: usize, y: usize) -> f32 {
        if x < self.size.0 && y < self.size.1 {
            self.data[y * self.size.0 + x]
        } else {
            0.0
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized_images() {
        assert!(Image::new((0, 8)).is_err());
        assert!(Image::new((8, 0)).is_err());
        assert!(Image::new((1, 1)).is_ok());
        assert!(Image::new((MAX_DIMENSION, 1)).is_ok());
        assert!(Image::new((MAX_DIMENSION + 1, 1)).is_err());
        assert!(Image::new((1, MAX_DIMENSION + 1)).is_err());
    }

    #[test]
    fn rows_are_distinct() {
        let mut img = Image::new((4, 3)).unwrap();
        img.row_mut(1)[2] = 0.5;
        assert_eq!(img.row(0)[2], 0.0);
        assert_eq!(img.row(1)[2], 0.5);
        assert_eq!(img.get_or_zero(2, 1), 0.5);
        assert_eq!(img.get_or_zero(4, 1), 0.0);
        assert_eq!(img.get_or_zero(2, 3), 0.0);
    }
}
