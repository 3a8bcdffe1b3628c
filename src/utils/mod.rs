//! Small standalone utilities shared by more than one module.

/// MPEG-2 CRC32 implementation, used by tests to build valid section fixtures.
pub mod crc;

pub use crc::Crc32Mpeg2;
