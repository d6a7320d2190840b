//! Common utilities and types shared across the office-hours queue crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes and caller roles
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
