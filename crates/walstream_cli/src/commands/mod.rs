//! CLI command implementations.

pub mod bench;
pub mod replay;
