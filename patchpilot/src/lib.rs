//! PatchPilot - patch lifecycle orchestration for server products
//!
//! This library provides the core functionality for resolving patches from a
//! published catalog, downloading and integrity-checking their payloads, and
//! applying them to a local installation in a safe, ordered way.
//!
//! # Pipeline
//!
//! ```text
//! catalog ──► download ──► staging dir ──► staging::scan ──► apply ──► report
//!                                                   ▲
//!                                   install (backup + service bracket)
//! ```
//!
//! - [`catalog`]: load the catalog document and filter matching patches
//! - [`download`]: fetch payloads into per-patch directories with checksums
//! - [`staging`]: scan the staging directory for applicable patches
//! - [`install`]: backup, restore and service control around the apply phase
//! - [`apply`]: order and apply staged patches, recording every outcome
//! - [`report`]: render run ledgers into human-readable reports

pub mod apply;
pub mod catalog;
pub mod config;
pub mod download;
pub mod install;
pub mod logging;
pub mod process;
pub mod report;
pub mod staging;
