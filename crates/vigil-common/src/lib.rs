//! # vigil-common
//!
//! Shared primitives for the Vigil workspace: domain types, the error
//! taxonomy, the configuration model, and system-wide constants.
//!
//! This crate sits at the leaf of the dependency graph; every other
//! workspace crate builds on it and it depends on no internal crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
