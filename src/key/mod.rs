//! Abstract public and private key objects (components D and E).

mod private;
mod public;

pub use private::{ExternalKeyCallbacks, PrivateKey, SignAlgorithm};
pub use public::PublicKey;

/// Key-usage bitmask carried on a [`PublicKey`], mirroring X.509
/// `KeyUsage` bit positions relevant to signing/verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsage(u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: Self = Self(1 << 0);
    pub const KEY_ENCIPHERMENT: Self = Self(1 << 1);
    pub const DATA_ENCIPHERMENT: Self = Self(1 << 2);
    pub const KEY_CERT_SIGN: Self = Self(1 << 5);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Flags accepted by [`PublicKey::verify_data2`] / `verify_hash2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyFlags(u8);

impl VerifyFlags {
    pub const NONE: Self = Self(0);
    /// Accept a signature produced by an algorithm flagged "broken" (e.g.
    /// SHA-1-based) instead of returning `InsufficientSecurity`.
    pub const ALLOW_BROKEN: Self = Self(1 << 0);

    #[must_use]
    pub fn allows_broken(self) -> bool {
        self.0 & Self::ALLOW_BROKEN.0 != 0
    }
}

/// Flags selecting the hash used by [`PublicKey::key_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyIdFlags(u8);

impl KeyIdFlags {
    pub const SHA1: Self = Self(0);
    pub const USE_SHA256: Self = Self(1 << 0);
    pub const USE_SHA512: Self = Self(1 << 1);
    /// Selects the strongest of SHA-256/SHA-512 supported by the build;
    /// this crate always has both available, so it behaves like
    /// `USE_SHA512`.
    pub const USE_BEST_KNOWN: Self = Self(1 << 2);

    #[must_use]
    pub fn mac_algorithm(self) -> crate::primitive::MacAlgorithm {
        use crate::primitive::MacAlgorithm;
        if self.0 & Self::USE_BEST_KNOWN.0 != 0 {
            MacAlgorithm::Sha512
        } else if self.0 & Self::USE_SHA512.0 != 0 {
            MacAlgorithm::Sha512
        } else if self.0 & Self::USE_SHA256.0 != 0 {
            MacAlgorithm::Sha256
        } else {
            MacAlgorithm::Sha1
        }
    }
}
