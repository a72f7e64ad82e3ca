//! Error utilities for `keycore`.
//!
//! This crate provides two complementary error-handling tools, following the
//! same split used across the rest of the workspace:
//!
//! - [`BoxError`] plus the [`ErrorExt`] / [`ErrorContext`] extension traits,
//!   for attaching ad hoc context at arbitrary boundaries (logging, backend
//!   adapters) without committing to a type.
//! - [`Error`], a closed enum for the small, enumerable set of outcomes the
//!   abstract key layer, PKCS#11 backend, URL dispatch and TLS extension
//!   registry can produce. Callers are expected to match on its variants.
//!
//! Use `Error` at the public API surface of `keycore`; use `BoxError` and its
//! extension traits when wrapping a lower-level backend error on its way
//! into an `Error::Backend`.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::error::Error as StdError;

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn StdError + Send + Sync>;

mod error;
mod ext;

pub use error::Error;
pub use ext::{ErrorContext, ErrorExt};
