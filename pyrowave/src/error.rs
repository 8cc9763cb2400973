// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(usize, usize),
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),
    #[error("4:2:0 subsampling requires even dimensions, got {0}x{1}")]
    OddDimensionsForChroma420(usize, usize),
    #[error("Plane {0} has size {1}x{2}, expected {3}x{4}")]
    PlaneSizeMismatch(usize, usize, usize, usize, usize),
    #[error("Frame is {0}x{1}, codec is configured for {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("Start-of-frame signals {0:?}, codec is configured for {1:?}")]
    ChromaMismatch(crate::frame::ChromaSubsampling, crate::frame::ChromaSubsampling),
    #[error("Unrecognized extended header code {0}")]
    UnsupportedExtendedCode(u8),
    #[error("Invalid enum value {0} for {1}")]
    InvalidEnum(u32, String),
    #[error("Packet truncated: needs {needed} bytes, {available} available")]
    TruncatedPacket { needed: usize, available: usize },
    #[error("Block payload is inconsistent: header states {stated} words, layout needs {actual}")]
    MalformedBlockPayload { stated: usize, actual: usize },
    #[error("Block index {0} is out of bounds (>= {1})")]
    OutOfRangeBlockIndex(u32, u32),
    #[error("Target size {0} cannot hold a start-of-frame header")]
    TargetTooSmall(usize),
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

pub type Result<T> = std::result::Result<T, Error>;
