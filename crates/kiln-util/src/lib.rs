#![forbid(unsafe_code)]
//! Hashing and filesystem helpers for kiln.

pub mod error;
pub mod fs;
pub mod hash;
