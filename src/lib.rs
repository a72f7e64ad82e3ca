//! Abstract key layer, PKCS#11 backend and TLS hello-extension registry for
//! a TLS library.
//!
//! This crate is the trust-and-key *plumbing* between a certificate/ASN.1
//! layer and a handshake state machine, neither of which it implements
//! itself. It provides:
//!
//! - an abstract [`PrivateKey`](key::PrivateKey) and [`PublicKey`](key::PublicKey)
//!   that unify software-resident, PKCS#11 token-resident, and
//!   callback-driven ("external") asymmetric keys behind one type,
//! - a [`pkcs11`] session layer that drives a Cryptoki-style token,
//! - a [`urldispatch`] layer that turns a scheme-prefixed URI into a
//!   concrete key or certificate,
//! - an [`ext`] registry/codec/resumption engine for TLS hello extensions.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

pub use keycore_error::Error;

/// Crate-wide `Result` alias, matching [`keycore_error::Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
pub mod ext;
pub mod key;
#[cfg(feature = "pkcs11")]
pub mod pkcs11;
pub mod primitive;
pub mod spki;
pub mod urldispatch;

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared `tracing` setup for unit tests, so `#[instrument]`ed spans are
    //! visible under `cargo test -- --nocapture` instead of only under a
    //! caller-installed subscriber.

    /// Installs a fmt subscriber scoped to the current test thread; the
    /// returned guard restores the previous default when dropped.
    pub(crate) fn init() -> tracing::subscriber::DefaultGuard {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .set_default()
    }
}

pub mod dep {
    //! Re-exports of the crates this crate is built on, for caller convenience.

    pub mod aws_lc_rs {
        //! Re-export of the [`aws-lc-rs`] crate.
        //!
        //! [`aws-lc-rs`]: https://docs.rs/aws-lc-rs
        #[cfg(feature = "aws-lc")]
        #[doc(inline)]
        pub use aws_lc_rs::*;
    }

    pub mod url {
        //! Re-export of the [`url`] crate.
        #[doc(inline)]
        pub use url::*;
    }
}
