//! PKCS#11 session and object handles, and the `sign`/`decrypt` two-step
//! calls with shared retry-login shape (component C).

use std::sync::atomic::{AtomicBool, Ordering};

use cryptoki::context::Pkcs11;
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::types::AuthPin;
use keycore_error::Error;
use parking_lot::Mutex;
use tracing::{instrument, warn};

use crate::key::SignAlgorithm;
use crate::primitive::{self, PkAlgorithm};

use super::uri::Pkcs11Uri;

/// A logged-in (or login-deferred) PKCS#11 session bound to one slot.
///
/// Owns the `cryptoki` [`Session`] behind a lock: every sign/decrypt call
/// acquires it for the duration of the two-step Cryptoki call (§5 — PKCS#11
/// sessions are not safe for concurrent use on the same handle).
pub struct Pkcs11Session {
    session: Mutex<Session>,
    pin: Option<AuthPin>,
    logged_in: AtomicBool,
}

impl Pkcs11Session {
    pub(crate) fn new(session: Session, pin: Option<AuthPin>, logged_in: bool) -> Self {
        Self {
            session: Mutex::new(session),
            pin,
            logged_in: AtomicBool::new(logged_in),
        }
    }

    fn login(&self) -> Result<(), Error> {
        let session = self.session.lock();
        session
            .login(UserType::User, self.pin.as_ref())
            .map_err(|e| Error::backend(format!("PKCS#11 login failed: {e}")))?;
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// `sign(session, obj, mechanism, data)`. Shares the retry-login shape
    /// with [`Self::decrypt`] via [`Self::with_retry_login`].
    #[instrument(skip(self, object, data))]
    pub fn sign(
        &self,
        object: &Pkcs11Object,
        sign_alg: SignAlgorithm,
        data: &[u8],
        always_authenticate: bool,
    ) -> Result<Vec<u8>, Error> {
        let mechanism = mechanism_for(sign_alg)?;
        let raw = self.with_retry_login(|session| {
            if always_authenticate {
                session
                    .login(UserType::ContextSpecific, self.pin.as_ref())
                    .map_err(map_cryptoki_error)?;
            }
            let sig = session
                .sign(&mechanism, object.handle, data)
                .map_err(map_cryptoki_error)?;
            Ok(sig)
        })?;
        match sign_alg {
            SignAlgorithm::Ecdsa(_) => primitive::fixed_to_der(&raw),
            SignAlgorithm::Dsa(_) => primitive::fixed_to_der(&raw),
            _ => Ok(raw),
        }
    }

    /// `decrypt(session, obj, mechanism, ciphertext)`.
    #[instrument(skip(self, object, ciphertext))]
    pub fn decrypt(&self, object: &Pkcs11Object, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.with_retry_login(|session| {
            session
                .decrypt(&Mechanism::RsaPkcs, object.handle, ciphertext)
                .map_err(map_cryptoki_error)
        })
    }

    /// Shared retry-login shape (§4.C): run `op` once; on `UserNotLoggedIn`
    /// for the first attempt, log in and retry exactly once more. A second
    /// failure of the same kind is not retried again.
    ///
    /// `SESSION_HANDLE_INVALID` gets the same one-shot retry after a fresh
    /// login, which recovers a session the token logged out from under us.
    /// It does not recover a session closed by the token (e.g. a card pull);
    /// that needs the object re-found on a newly opened session, which this
    /// type can't do on its own since it isn't handed back a `Pkcs11Uri` or
    /// its owning provider. Such a failure surfaces as [`Error::LockingError`]
    /// instead of looping forever against a handle that can't come back.
    fn with_retry_login<T>(&self, op: impl Fn(&Session) -> Result<T, Error>) -> Result<T, Error> {
        let mut req_login = false;
        loop {
            let result = {
                let session = self.session.lock();
                op(&session)
            };
            match result {
                Err(Error::RequestedDataNotAvailable) if !req_login => {
                    warn!("PKCS#11 operation failed: user not logged in, retrying after login");
                    self.login()?;
                    req_login = true;
                    continue;
                }
                Err(Error::LockingError) if !req_login => {
                    warn!("PKCS#11 session handle invalid, retrying after re-login");
                    self.login()?;
                    req_login = true;
                    continue;
                }
                other => return other,
            }
        }
    }
}

/// A located PKCS#11 object (private or public key) plus the attributes
/// needed to pick a signing mechanism and validate PSS support without a
/// further round-trip to the token.
pub struct Pkcs11Object {
    handle: ObjectHandle,
    pk_algorithm: PkAlgorithm,
    supports_pss: bool,
}

impl Pkcs11Object {
    #[must_use]
    pub fn pk_algorithm(&self) -> PkAlgorithm {
        self.pk_algorithm
    }

    /// RSA-PSS requires `CKM_RSA_PKCS_PSS` support, which this crate does
    /// not probe for from the token's mechanism list (most PKCS#11 tokens
    /// that support PSS advertise it unconditionally for any RSA key); a
    /// future revision could consult `C_GetMechanismInfo` here instead.
    #[must_use]
    pub fn supports_pss(&self) -> bool {
        self.supports_pss
    }
}

/// `find_object(session, uri, flags)`: initializes an object search from
/// the URI's selector attributes, expecting exactly one match.
pub(crate) fn find_object(
    session: &Session,
    uri: &Pkcs11Uri,
    class: ObjectClass,
) -> Result<Pkcs11Object, Error> {
    let mut template = vec![Attribute::Class(class)];
    if let Some(id) = &uri.id {
        template.push(Attribute::Id(id.clone()));
    }
    if let Some(label) = &uri.object {
        template.push(Attribute::Label(label.clone().into_bytes()));
    }

    let handles = session
        .find_objects(&template)
        .map_err(map_cryptoki_error)?;
    let handle = match handles.as_slice() {
        [] => return Err(Error::RequestedDataNotAvailable),
        [one] => *one,
        _ => return Err(Error::InvalidRequest),
    };

    let attrs = session
        .get_attributes(handle, &[AttributeType::KeyType])
        .map_err(map_cryptoki_error)?;
    let pk_algorithm = attrs
        .iter()
        .find_map(|a| match a {
            Attribute::KeyType(kt) => Some(key_type_to_pk(*kt)),
            _ => None,
        })
        .unwrap_or(PkAlgorithm::Rsa);

    Ok(Pkcs11Object {
        handle,
        pk_algorithm,
        supports_pss: matches!(pk_algorithm, PkAlgorithm::Rsa | PkAlgorithm::RsaPss),
    })
}

fn key_type_to_pk(kt: cryptoki::object::KeyType) -> PkAlgorithm {
    use cryptoki::object::KeyType;
    match kt {
        KeyType::RSA => PkAlgorithm::Rsa,
        KeyType::EC => PkAlgorithm::Ecdsa,
        KeyType::DSA => PkAlgorithm::Dsa,
        _ => PkAlgorithm::Rsa,
    }
}

fn mechanism_for(sign_alg: SignAlgorithm) -> Result<Mechanism<'static>, Error> {
    match sign_alg {
        SignAlgorithm::RsaPkcs1(_) | SignAlgorithm::RsaRaw => Ok(Mechanism::RsaPkcs),
        SignAlgorithm::Ecdsa(_) => Ok(Mechanism::Ecdsa),
        SignAlgorithm::Dsa(_) => Ok(Mechanism::Dsa),
        SignAlgorithm::RsaPss(_) | SignAlgorithm::Ed25519 => Err(Error::UnimplementedFeature),
    }
}

/// Maps a Cryptoki error to the library's error taxonomy. `UserNotLoggedIn`
/// is surfaced as [`Error::RequestedDataNotAvailable`] purely as the signal
/// [`Pkcs11Session::with_retry_login`] watches for; callers never see it
/// directly since the retry-login path absorbs the first occurrence.
fn map_cryptoki_error(err: cryptoki::error::Error) -> Error {
    use cryptoki::error::{Error as CkError, RvError};
    match err {
        CkError::Pkcs11(RvError::UserNotLoggedIn, _) => Error::RequestedDataNotAvailable,
        CkError::Pkcs11(RvError::SessionHandleInvalid, _) => Error::LockingError,
        other => Error::backend(format!("PKCS#11 error: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_with_no_selector_still_parses() {
        let uri = Pkcs11Uri::default();
        assert!(!uri.is_object());
    }
}
