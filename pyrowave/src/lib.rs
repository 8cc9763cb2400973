// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! PyroWave: an intra-only wavelet codec for ultra-low-latency streaming.
//!
//! Frames go through a 5-level CDF 9/7 transform, dead-zone quantisation,
//! bit-plane coding without an entropy stage, and packetisation into
//! independently decodable 32×32 subband blocks, so that packet loss blurs a
//! band instead of corrupting the stream. See [`encode::Encoder`] and
//! [`decode::Decoder`] for the two ends of the wire.

pub mod decode;
pub mod dwt;
pub mod encode;
pub mod error;
pub mod frame;
pub mod headers;
pub mod image;
pub mod layout;
pub mod quant;
mod pyramid;
mod util;

pub use decode::Decoder;
pub use dwt::Precision;
pub use encode::{EncodeStats, Encoder, PacketList};
pub use error::{Error, Result};
pub use frame::{ChromaSubsampling, Colorimetry, Frame};
