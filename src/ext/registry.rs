//! TLS hello-extension registry (component G): a fixed-order global table of
//! built-in descriptors, plus a per-session table that can add to or shadow
//! it. Grounded on the donor's `rama_core::extensions::Extensions` type map
//! for the texture of insert/replace (§9 Design Notes) — not its shape: that
//! type is an open-ended `HashMap`, this table is the fixed-capacity array
//! [`MAX_EXT_TYPES`] demands.

use std::sync::OnceLock;

use keycore_error::Error;
use parking_lot::RwLock;

use super::store::{ExtensionState, ExtensionStore, MAX_EXT_TYPES};

/// A TLS extension type id, as carried on the wire (e.g. `server_name` is
/// `0`, `signature_algorithms` is `13`).
pub type ExtensionType = u16;

/// Which handshake phase(s) a descriptor's `recv`/`send` apply to (§3
/// Extension Descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseClass {
    /// Neither parsed nor generated (a placeholder entry).
    None,
    /// Only the initial `ClientHello`/`ServerHello` exchange.
    ClientHello,
    /// Any extension-bearing handshake message (`EncryptedExtensions`,
    /// `CertificateRequest`, ...).
    TlsExt,
    /// Always touched during the `ClientHello` phase and exempt from the
    /// session store's clear-on-resumption rule (§3).
    Mandatory,
    /// Touched in every phase.
    Any,
}

impl ParseClass {
    #[must_use]
    pub fn matches(self, phase: Phase) -> bool {
        match self {
            Self::Any => true,
            Self::ClientHello | Self::Mandatory => phase == Phase::ClientHello,
            Self::TlsExt => phase == Phase::TlsExt,
            Self::None => false,
        }
    }

    #[must_use]
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::Mandatory)
    }
}

/// The handshake phase a `parse_extensions`/`gen_extensions` call is
/// operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ClientHello,
    TlsExt,
}

/// Which side of the handshake is parsing or generating (the sent-list
/// consistency rule in §4.I only applies to the client's parse of the
/// server's reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// What a descriptor's `send` function decided (§4.I: suppress vs. a
/// zero-or-more-byte payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Emit nothing at all for this extension, not even a header.
    Suppress,
    /// Emit a type/length/payload entry; payload may be empty.
    Emit,
}

pub type RecvFn = fn(&mut ExtensionStore, Role, &[u8]) -> Result<(), Error>;
pub type SendFn = fn(&ExtensionStore, Role, &mut Vec<u8>) -> Result<SendOutcome, Error>;
pub type PackFn = fn(&dyn ExtensionState) -> Vec<u8>;
pub type UnpackFn = fn(&[u8]) -> Result<Box<dyn ExtensionState>, Error>;

/// A registered extension's behavior, as a fixed table of function
/// pointers (§9 Design Notes: static dispatch on the hot codec path, no
/// `dyn` trait object per extension). `pack`/`unpack` are `None` for
/// extensions with no state worth persisting across resumption.
#[derive(Clone, Copy)]
pub struct ExtensionDescriptor {
    pub name: &'static str,
    pub id: ExtensionType,
    pub parse_class: ParseClass,
    pub recv: Option<RecvFn>,
    pub send: Option<SendFn>,
    pub pack: Option<PackFn>,
    pub unpack: Option<UnpackFn>,
}

impl ExtensionDescriptor {
    #[must_use]
    pub fn func_recv(&self, phase: Phase) -> Option<RecvFn> {
        self.parse_class.matches(phase).then_some(self.recv).flatten()
    }

    #[must_use]
    pub fn func_send(&self, phase: Phase) -> Option<SendFn> {
        self.parse_class.matches(phase).then_some(self.send).flatten()
    }
}

/// Flags accepted by [`SessionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterFlags(u8);

impl RegisterFlags {
    pub const NONE: Self = Self(0);
    /// Allow shadowing a built-in (global-table) id instead of failing with
    /// [`Error::AlreadyRegistered`].
    pub const OVERRIDE_INTERNAL: Self = Self(1 << 0);

    #[must_use]
    pub fn overrides_internal(self) -> bool {
        self.0 & Self::OVERRIDE_INTERNAL.0 != 0
    }
}

static GLOBAL_TABLE: OnceLock<RwLock<Vec<ExtensionDescriptor>>> = OnceLock::new();

fn global() -> &'static RwLock<Vec<ExtensionDescriptor>> {
    GLOBAL_TABLE.get_or_init(|| RwLock::new(super::builtins::BUILTINS.to_vec()))
}

/// `register(descr)` (§4.G): appends a process-wide built-in. Guarded by a
/// single lock (§5); registration is not expected on the hot path.
pub fn register(descr: ExtensionDescriptor) -> Result<(), Error> {
    let mut table = global().write();
    if table.iter().any(|d| d.id == descr.id) {
        return Err(Error::AlreadyRegistered);
    }
    if table.len() >= MAX_EXT_TYPES {
        return Err(Error::MemoryError);
    }
    table.push(descr);
    Ok(())
}

#[must_use]
pub fn lookup_global(id: ExtensionType) -> Option<ExtensionDescriptor> {
    global().read().iter().find(|d| d.id == id).copied()
}

#[must_use]
pub fn global_table() -> Vec<ExtensionDescriptor> {
    global().read().clone()
}

/// A session's local registry (§3 Extension Descriptor: "...or in a
/// per-session dynamic array"). Consulted before the global table so a
/// session can shadow a built-in.
#[derive(Default, Clone)]
pub struct SessionRegistry(Vec<ExtensionDescriptor>);

impl SessionRegistry {
    /// `session_register(descr, flags)`.
    pub fn register(&mut self, descr: ExtensionDescriptor, flags: RegisterFlags) -> Result<(), Error> {
        let clashes = self.0.iter().any(|d| d.id == descr.id) || lookup_global(descr.id).is_some();
        if clashes && !flags.overrides_internal() {
            return Err(Error::AlreadyRegistered);
        }
        if self.0.len() >= MAX_EXT_TYPES && !self.0.iter().any(|d| d.id == descr.id) {
            return Err(Error::MemoryError);
        }
        self.0.retain(|d| d.id != descr.id);
        self.0.push(descr);
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, id: ExtensionType) -> Option<ExtensionDescriptor> {
        self.0.iter().find(|d| d.id == id).copied()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ExtensionDescriptor> {
        self.0.iter()
    }
}

/// Looks up the effective descriptor for `id`: the session table first,
/// falling back to the global table (§4.G).
#[must_use]
pub fn lookup(session: &SessionRegistry, id: ExtensionType) -> Option<ExtensionDescriptor> {
    session.lookup(id).or_else(|| lookup_global(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_recv(_: &mut ExtensionStore, _: Role, _: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn builtin_lookup_finds_server_name() {
        assert!(lookup_global(0).is_some());
    }

    #[test]
    fn session_register_shadows_without_touching_global() {
        let mut session = SessionRegistry::default();
        let descr = ExtensionDescriptor {
            name: "custom",
            id: 0,
            parse_class: ParseClass::ClientHello,
            recv: Some(noop_recv),
            send: None,
            pack: None,
            unpack: None,
        };
        assert!(matches!(session.register(descr, RegisterFlags::NONE), Err(Error::AlreadyRegistered)));
        session.register(descr, RegisterFlags::OVERRIDE_INTERNAL).expect("override");
        assert_eq!(lookup(&session, 0).expect("shadowed").name, "custom");
        assert_eq!(lookup_global(0).expect("global unaffected").name, "server_name");
    }

    #[test]
    fn session_register_rejects_duplicate_custom_id() {
        let mut session = SessionRegistry::default();
        let descr = ExtensionDescriptor {
            name: "custom",
            id: 0xff10,
            parse_class: ParseClass::ClientHello,
            recv: Some(noop_recv),
            send: None,
            pack: None,
            unpack: None,
        };
        session.register(descr, RegisterFlags::NONE).expect("first register");
        assert!(matches!(session.register(descr, RegisterFlags::NONE), Err(Error::AlreadyRegistered)));
    }

    #[test]
    fn parse_class_matches_expected_phases() {
        assert!(ParseClass::Mandatory.matches(Phase::ClientHello));
        assert!(!ParseClass::Mandatory.matches(Phase::TlsExt));
        assert!(ParseClass::Any.matches(Phase::TlsExt));
        assert!(!ParseClass::None.matches(Phase::ClientHello));
    }
}
