//! Vismatch Core: shared error types.
//!
//! This crate has no internal vismatch dependencies (dependency level 0).
//! Every other vismatch crate reports failures through [`Error`].
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias

pub mod error;

pub use error::{Error, Result};
