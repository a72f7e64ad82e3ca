use std::fmt;

use crate::BoxError;

/// The closed set of outcomes every abstract key, PKCS#11, URL-dispatch and
/// TLS extension operation in `keycore` can return.
///
/// Unlike [`BoxError`], which this crate also provides for open-ended
/// boundaries, this enum is exhaustive by design: the domain it covers has a
/// known, small set of failure modes, and callers routinely need to match on
/// *which* one happened (e.g. to decide whether a PIN retry makes sense).
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The call was made against an object in the wrong state (e.g.
    /// re-importing an already-initialized key, registering a scheme that
    /// already exists without the override flag).
    InvalidRequest,
    /// Allocation failed.
    MemoryError,
    /// A caller-provided output buffer was too small; the required size is
    /// carried so the caller can retry.
    ShortMemoryBuffer {
        /// Number of bytes the caller must provide.
        required: usize,
    },
    /// The requested item (session data, resumed extension state, PKCS#11
    /// object) does not exist.
    RequestedDataNotAvailable,
    /// A registration call found the id already present.
    AlreadyRegistered,
    /// A lock could not be acquired (e.g. poisoned mutex).
    LockingError,
    /// The feature is recognized but not implemented by this build (e.g. no
    /// PKCS#11 backend compiled in, GOST primitive operations).
    UnimplementedFeature,
    /// An algorithm identifier did not match any known entry.
    UnknownAlgorithm,
    /// A value violated a constraint of the object it was applied to (e.g. a
    /// hash that contradicts a PSS hash already pinned to the key).
    ConstraintError,
    /// The signature algorithm is not compatible with the key (wrong PK
    /// family, wrong curve, wrong PSS hash).
    IncompatibleSigWithKey,
    /// Signature verification did not validate.
    SigVerifyFailed,
    /// Signing failed at the primitive layer.
    SignFailed,
    /// Decryption failed at the primitive layer.
    DecryptionFailed,
    /// The extensions block declared a length that does not fit the
    /// remaining input.
    UnexpectedExtensionsLength,
    /// An extension type was received that the peer never offered.
    IllegalExtension,
    /// The generated extensions block would exceed the 16-bit length field.
    HandshakeTooLarge,
    /// A pack/unpack routine did not consume the number of bytes it declared.
    ParsingError,
    /// The signature algorithm is flagged insecure and `AllowBroken` was not
    /// set.
    InsufficientSecurity,
    /// Transport to an underlying backend (PKCS#11 token, primitive crate)
    /// failed in a way not covered by a more specific variant above.
    Backend(BoxError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "invalid request"),
            Self::MemoryError => write!(f, "memory allocation error"),
            Self::ShortMemoryBuffer { required } => {
                write!(f, "buffer too short, need {required} bytes")
            }
            Self::RequestedDataNotAvailable => write!(f, "requested data not available"),
            Self::AlreadyRegistered => write!(f, "already registered"),
            Self::LockingError => write!(f, "locking error"),
            Self::UnimplementedFeature => write!(f, "unimplemented feature"),
            Self::UnknownAlgorithm => write!(f, "unknown algorithm"),
            Self::ConstraintError => write!(f, "constraint error"),
            Self::IncompatibleSigWithKey => write!(f, "signature incompatible with key"),
            Self::SigVerifyFailed => write!(f, "signature verification failed"),
            Self::SignFailed => write!(f, "signing failed"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::UnexpectedExtensionsLength => write!(f, "unexpected extensions length"),
            Self::IllegalExtension => write!(f, "received illegal extension"),
            Self::HandshakeTooLarge => write!(f, "handshake message too large"),
            Self::ParsingError => write!(f, "parsing error"),
            Self::InsufficientSecurity => write!(f, "insufficient security"),
            Self::Backend(err) => write!(f, "backend error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl Error {
    /// Wraps an arbitrary backend error (PKCS#11, primitive crate) as
    /// [`Error::Backend`].
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    /// Shorthand for the short-buffer variant.
    #[must_use]
    pub fn short_buffer(required: usize) -> Self {
        Self::ShortMemoryBuffer { required }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_and_non_empty() {
        for err in [
            Error::InvalidRequest,
            Error::ShortMemoryBuffer { required: 32 },
            Error::RequestedDataNotAvailable,
        ] {
            assert!(!format!("{err}").is_empty());
        }
    }

    #[test]
    fn backend_error_exposes_source() {
        let io_err = std::io::Error::other("boom");
        let err = Error::backend(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
