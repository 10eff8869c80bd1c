//! CLI command implementations.

pub mod cache;
pub mod fetch;
pub mod package;
pub mod upload;
