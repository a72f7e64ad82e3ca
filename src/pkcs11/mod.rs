//! PKCS#11 session layer (component C): provider init with fork detection,
//! session/object lookup by URI, and the two-step sign/decrypt calls.

mod session;
mod uri;

pub use session::{Pkcs11Object, Pkcs11Session};
pub use uri::Pkcs11Uri;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::object::ObjectClass;
use cryptoki::session::SessionFlags;
use cryptoki::types::AuthPin;
use keycore_error::Error;
use tracing::{error, instrument, warn};

/// Flags accepted by [`Pkcs11Provider::open_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOpenFlags(u8);

impl SessionOpenFlags {
    pub const NONE: Self = Self(0);
    /// Log in as `CKU_USER` once the session is open.
    pub const SESSION_LOGIN: Self = Self(1 << 0);
    pub const SESSION_RW: Self = Self(1 << 1);

    #[must_use]
    pub fn login(self) -> bool {
        self.0 & Self::SESSION_LOGIN.0 != 0
    }

    #[must_use]
    pub fn rw(self) -> bool {
        self.0 & Self::SESSION_RW.0 != 0
    }
}

/// The initialization level requested of / reached by [`Pkcs11Provider::check_init`],
/// ordered from least to most trusting of the loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum InitLevel {
    Uninit,
    Manual,
    ManualTrusted,
    Trusted,
    All,
}

/// A reinit callback invoked after a detected fork, once per live
/// token-resident key, so each can reopen its object on the freshly
/// reinitialized provider.
pub trait ReinitCallback: Send + Sync {
    fn reinit(&self);
}

struct ProviderState {
    context: Option<Pkcs11>,
    level: InitLevel,
    pid: u32,
    reinit_callbacks: Vec<Arc<dyn ReinitCallback>>,
}

/// Process-wide PKCS#11 provider state: one loaded module, fork-detected
/// and re-initialized transparently across `check_init` calls.
///
/// Guarded by a single `init_lock` (§5); registration and init are not
/// expected on the hot path.
pub struct Pkcs11Provider {
    module_path: PathBuf,
    state: Mutex<ProviderState>,
}

impl Pkcs11Provider {
    #[must_use]
    pub fn new(module_path: impl Into<PathBuf>) -> Self {
        Self {
            module_path: module_path.into(),
            state: Mutex::new(ProviderState {
                context: None,
                level: InitLevel::Uninit,
                pid: current_pid(),
                reinit_callbacks: Vec::new(),
            }),
        }
    }

    /// `check_init(required_level, userdata, reinit_cb)`: ensures the
    /// provider is initialized to at least `required_level`. On detecting a
    /// fork (observed pid differs from the one cached at last init), tears
    /// down existing sessions/handles, re-initializes, then runs every
    /// registered reinit callback before returning (§5 Fork discipline).
    #[instrument(skip(self, reinit_cb))]
    pub fn check_init(
        &self,
        required_level: InitLevel,
        reinit_cb: Option<Arc<dyn ReinitCallback>>,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().map_err(|_| Error::LockingError)?;
        let pid = current_pid();
        if pid != state.pid {
            warn!(old_pid = state.pid, new_pid = pid, "fork detected, reinitializing PKCS#11 provider");
            state.context = None;
            state.level = InitLevel::Uninit;
            state.pid = pid;
            let callbacks = state.reinit_callbacks.clone();
            drop(state);
            for cb in &callbacks {
                cb.reinit();
            }
            state = self.state.lock().map_err(|_| Error::LockingError)?;
        }

        if let Some(cb) = reinit_cb {
            state.reinit_callbacks.push(cb);
        }

        if state.context.is_some() && state.level >= required_level {
            return Ok(());
        }

        let context = Pkcs11::new(&self.module_path).map_err(|e| {
            error!(error = %e, path = ?self.module_path, "failed to load PKCS#11 module");
            Error::backend(format!("failed to load PKCS#11 module: {e}"))
        })?;
        context
            .initialize(CInitializeArgs::OsThreads)
            .map_err(|e| Error::backend(format!("C_Initialize failed: {e}")))?;
        state.context = Some(context);
        state.level = required_level;
        Ok(())
    }

    /// `open_session(info, flags)`: translates a `pkcs11:` URI into a slot,
    /// opens a session, and logs in when [`SessionOpenFlags::SESSION_LOGIN`]
    /// is set.
    #[instrument(skip(self, pin))]
    pub fn open_session(
        &self,
        uri: &Pkcs11Uri,
        flags: SessionOpenFlags,
        pin: Option<&str>,
    ) -> Result<Arc<Pkcs11Session>, Error> {
        let state = self.state.lock().map_err(|_| Error::LockingError)?;
        let context = state.context.as_ref().ok_or(Error::InvalidRequest)?;

        let slot = find_slot(context, uri)?;

        let mut session_flags = SessionFlags::new();
        session_flags.set_serial_session(true);
        if flags.rw() {
            session_flags.set_rw_session(true);
        }
        let session = context
            .open_session_no_callback(slot, session_flags)
            .map_err(|e| Error::backend(format!("failed to open PKCS#11 session: {e}")))?;

        let auth_pin = pin.or(uri.pin_value.as_deref()).map(AuthPin::from);
        let logged_in = if flags.login() {
            session
                .login(cryptoki::session::UserType::User, auth_pin.as_ref())
                .map_err(|e| Error::backend(format!("PKCS#11 login failed: {e}")))?;
            true
        } else {
            false
        };

        Ok(Arc::new(Pkcs11Session::new(session, auth_pin, logged_in)))
    }

    /// Finds exactly one private-key object matching `uri` on an open
    /// session. Zero matches is [`Error::RequestedDataNotAvailable`], more
    /// than one is [`Error::InvalidRequest`] (§4.C).
    pub fn find_private_key(&self, session: &cryptoki::session::Session, uri: &Pkcs11Uri) -> Result<Pkcs11Object, Error> {
        session::find_object(session, uri, ObjectClass::PRIVATE_KEY)
    }

    pub fn find_public_key(&self, session: &cryptoki::session::Session, uri: &Pkcs11Uri) -> Result<Pkcs11Object, Error> {
        session::find_object(session, uri, ObjectClass::PUBLIC_KEY)
    }
}

fn find_slot(context: &Pkcs11, uri: &Pkcs11Uri) -> Result<cryptoki::slot::Slot, Error> {
    let slots = context
        .get_slots_with_token()
        .map_err(|e| Error::backend(format!("failed to list PKCS#11 slots: {e}")))?;
    for slot in slots {
        let info = match context.get_token_info(slot) {
            Ok(info) => info,
            Err(_) => continue,
        };
        if let Some(token) = &uri.token {
            if info.label() != token {
                continue;
            }
        }
        if let Some(serial) = &uri.serial {
            if info.serial_number() != serial {
                continue;
            }
        }
        return Ok(slot);
    }
    Err(Error::RequestedDataNotAvailable)
}

fn current_pid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingReinit(std::sync::atomic::AtomicUsize);
    impl ReinitCallback for CountingReinit {
        fn reinit(&self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn session_open_flags_decode_bits() {
        let flags = SessionOpenFlags::SESSION_LOGIN;
        assert!(flags.login());
        assert!(!flags.rw());
    }

    #[test]
    fn init_level_ordering_matches_trust_ladder() {
        assert!(InitLevel::Uninit < InitLevel::Manual);
        assert!(InitLevel::Manual < InitLevel::Trusted);
        assert!(InitLevel::Trusted < InitLevel::All);
    }
}
