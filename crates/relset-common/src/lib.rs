//! Common utilities for relset
//!
//! This crate provides the error taxonomy shared by the relset crates.

pub mod error;

pub use error::{RelsetError, Result};
