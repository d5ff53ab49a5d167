//! CLI command implementations.

pub mod backup;
pub mod conflicts;
pub mod entity;
pub mod sync;
