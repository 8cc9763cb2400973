// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

mod bits;
mod log2;
#[cfg(test)]
mod test;
pub mod tracing_wrappers;

pub use self::bits::*;
pub use self::log2::*;
#[cfg(test)]
pub(crate) use self::test::assert_close;
