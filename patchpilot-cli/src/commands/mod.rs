//! CLI command implementations.

pub mod apply;
pub mod check;
pub mod common;
pub mod config;
pub mod download;
pub mod restore;
