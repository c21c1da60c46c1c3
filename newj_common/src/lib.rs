//! Shared utilities and error types for the NewJ compiler
//!
//! This crate provides common functionality used across all compiler stages:
//! - Source location tracking
//! - Diagnostic collection (the compiler never aborts; every stage reports
//!   into a [`Diagnostics`] sink and keeps going)
//! - The shared error type for driver-level failures

pub mod diagnostics;
pub mod error;
pub mod span;

pub use diagnostics::*;
pub use error::*;
pub use span::*;
