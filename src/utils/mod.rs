//! Shared hashing and binary-decoding utilities.

pub mod ioutils;
pub mod jenkins;
