//! TLS hello-extension registry/store/codec/resumption engine (components
//! G-K): a table of extension descriptors multiplexed behind a common
//! receive/send/pack/unpack/deinit interface, driven from the handshake
//! parser and from session-resumption packing (§2 Data flow).

pub mod builtins;
mod codec;
mod registry;
mod resume;
mod store;
pub mod tlsfeatures;

pub use codec::{gen_extensions, parse_extensions, SentList};
pub use registry::{
    lookup, lookup_global, register, ExtensionDescriptor, ExtensionType, ParseClass, Phase, RecvFn,
    RegisterFlags, Role, SendFn, SendOutcome, SessionRegistry,
};
pub use resume::{pack_session, unpack_session};
pub use store::{downcast, ExtensionState, ExtensionStore, MAX_EXT_TYPES};

/// Everything one TLS session needs to drive the extension machinery: the
/// live/resumed state store, any session-local descriptor overrides, and
/// the sent-extension list (§3 Session Extension State, Sent-Extension
/// List). A handshake implementation embeds one of these per connection.
#[derive(Default)]
pub struct Session {
    pub store: ExtensionStore,
    pub registry: SessionRegistry,
    pub sent: SentList,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `free_session_data(session)` (§4.H): tears down both sides of the
    /// store. Called on session deinit.
    pub fn free_session_data(&mut self) {
        self.store.free_session_data();
    }

    /// `restore_resumed(session)` (§4.H): promotes non-`MANDATORY` resumed
    /// state into the live store, preserving `MANDATORY` entries on both
    /// sides, then clears the sent-extension list for the fresh handshake.
    pub fn restore_resumed(&mut self) {
        self.store.restore_resumed(|ty| {
            registry::lookup(&self.registry, ty)
                .map(|d| d.parse_class.is_mandatory())
                .unwrap_or(false)
        });
        self.sent.clear();
    }

    /// `parse_extensions(session, phase, bytes)` (§4.I).
    pub fn parse(&mut self, role: Role, phase: Phase, bytes: &[u8]) -> Result<(), keycore_error::Error> {
        codec::parse_extensions(&mut self.store, &self.registry, &mut self.sent, role, phase, bytes)
    }

    /// `gen_extensions(session, buf, phase)` (§4.I).
    pub fn generate(&mut self, role: Role, phase: Phase, out: &mut Vec<u8>) -> Result<(), keycore_error::Error> {
        codec::gen_extensions(&self.store, &self.registry, &mut self.sent, role, phase, out)
    }

    /// `resumption pack` (§4.J): snapshot every `pack`-capable live
    /// extension's state into a resumption blob.
    #[must_use]
    pub fn pack_resumption(&self) -> Vec<u8> {
        resume::pack_session(&self.store, &self.registry)
    }

    /// `resumption unpack` (§4.J): materializes a resumption blob into the
    /// *resumed* side of the store; [`Self::restore_resumed`] must be
    /// called afterward to promote it into the live handshake.
    pub fn unpack_resumption(&mut self, bytes: &[u8]) -> Result<(), keycore_error::Error> {
        resume::unpack_session(&mut self.store, &self.registry, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_resumption_roundtrip_survives_restore() {
        let mut session = Session::new();
        session.store.set(23, Box::new(true)).expect("set");
        let blob = session.pack_resumption();

        let mut restored = Session::new();
        restored.unpack_resumption(&blob).expect("unpack");
        assert!(!restored.store.is_set(23)); // still on the resumed side
        restored.restore_resumed();
        assert!(restored.store.is_set(23));
    }

    #[test]
    fn free_session_data_clears_everything() {
        let mut session = Session::new();
        session.store.set(23, Box::new(true)).expect("set");
        session.free_session_data();
        assert!(!session.store.is_set(23));
    }
}
