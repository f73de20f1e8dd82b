//! Result codes carried by simulated failures.

pub const INVALID_ARGUMENT: u32 = 0x8000_0400;
pub const FORBIDDEN: u32 = 0x8000_0403;
pub const NOT_FOUND: u32 = 0x8000_0404;
pub const FULL: u32 = 0x8000_0409;
pub const TIMED_OUT: u32 = 0x8000_0408;
