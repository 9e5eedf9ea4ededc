//! Checksums de reducción.

pub mod accumulator;

pub use accumulator::{reduction_checksum, Checksum, ChecksumAccumulator};
