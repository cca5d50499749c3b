//! CLI command implementations

pub mod actions;
pub mod ops;
pub mod report;
pub mod status;
