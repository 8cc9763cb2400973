// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Forwards to the `tracing` macros when the `tracing` feature is enabled,
//! and compiles them out otherwise.

#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
mod noop {
    // The expansions still name their arguments so that values only used for
    // logging do not trip unused-variable lints.
    macro_rules! trace {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! debug {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! info {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! warn_noop {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! error {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    #[allow(unused_imports)]
    pub(crate) use {debug, error, info, trace, warn_noop as warn};
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub(crate) use noop::*;
