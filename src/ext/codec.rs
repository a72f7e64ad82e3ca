//! TLS hello-extension wire codec (component I): the 16-bit length-prefixed
//! extensions block shared by `ClientHello`/`ServerHello` and later
//! extension-bearing messages.

use keycore_error::Error;
use tracing::{debug, trace};

use super::registry::{self, Phase, Role, SendOutcome, SessionRegistry};
use super::store::ExtensionStore;

/// Bound on the sent-extension list a single handshake can track, well
/// above any real `ClientHello` (§3 Sent-Extension List).
const MAX_SENT: usize = 64;

/// Bounded ordered list of type ids a client has offered, or a server has
/// replied with, in the current handshake (§3 Sent-Extension List).
#[derive(Debug, Clone, Default)]
pub struct SentList(Vec<u16>);

impl SentList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, ty: u16) -> bool {
        self.0.contains(&ty)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    fn push(&mut self, ty: u16) {
        if self.0.len() < MAX_SENT {
            self.0.push(ty);
        }
    }
}

fn read_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

/// `parse_extensions(session, phase, bytes)` (§4.I). An empty input is a
/// no-op (an elided extensions block, not malformed input, §4.I edge
/// case). Unrecognized or phase-mismatched type ids are skipped, not an
/// error — the reference library's rollback-on-error behavior had no
/// observable effect beyond that, so this crate just never errors on them.
/// A client encountering a type id the peer never offered is
/// [`Error::IllegalExtension`]; a server just records every type id it
/// sees into `sent` for its own reply to echo against.
#[allow(clippy::too_many_arguments)]
pub fn parse_extensions(
    store: &mut ExtensionStore,
    session_ext: &SessionRegistry,
    sent: &mut SentList,
    role: Role,
    phase: Phase,
    bytes: &[u8],
) -> Result<(), Error> {
    if bytes.is_empty() {
        return Ok(());
    }
    if bytes.len() < 2 {
        return Err(Error::UnexpectedExtensionsLength);
    }
    let total = read_u16(bytes) as usize;
    let body = bytes.get(2..).ok_or(Error::UnexpectedExtensionsLength)?;
    let body = body.get(..total).ok_or(Error::UnexpectedExtensionsLength)?;

    let mut rest = body;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(Error::UnexpectedExtensionsLength);
        }
        let ty = read_u16(rest);
        let len = read_u16(&rest[2..4]) as usize;
        rest = &rest[4..];
        let payload = rest.get(..len).ok_or(Error::UnexpectedExtensionsLength)?;
        rest = &rest[len..];

        let descr = registry::lookup(session_ext, ty);
        let recv = descr.as_ref().and_then(|d| d.func_recv(phase));
        let Some(recv) = recv else {
            trace!(ty, "skipping unrecognized or phase-mismatched extension");
            continue;
        };

        match role {
            Role::Client if !sent.contains(ty) => return Err(Error::IllegalExtension),
            Role::Client => {}
            Role::Server => sent.push(ty),
        }

        debug!(ty, len, "dispatching extension recv");
        recv(store, role, payload)?;
    }
    Ok(())
}

/// `gen_extensions(session, buf, phase)` (§4.I). Session-registered
/// descriptors are consulted before built-ins, so a session can shadow or
/// add extensions without touching the global table. A server only emits
/// ids the client actually sent; a total size beyond the 16-bit length
/// field is [`Error::HandshakeTooLarge`]; an entirely empty block is
/// elided rather than written as a zero-length header.
pub fn gen_extensions(
    store: &ExtensionStore,
    session_ext: &SessionRegistry,
    sent: &mut SentList,
    role: Role,
    phase: Phase,
    out: &mut Vec<u8>,
) -> Result<(), Error> {
    let placeholder_at = out.len();
    out.extend_from_slice(&[0, 0]);
    let body_start = out.len();

    let mut seen = std::collections::HashSet::new();
    let descriptors = session_ext.iter().copied().chain(registry::global_table());

    for descr in descriptors {
        if !seen.insert(descr.id) {
            continue; // session table shadows the global entry of the same id
        }
        let Some(send) = descr.func_send(phase) else {
            continue;
        };
        if role == Role::Server && !sent.contains(descr.id) {
            continue;
        }

        let mut payload = Vec::new();
        if send(store, role, &mut payload)? == SendOutcome::Suppress {
            continue;
        }
        out.extend_from_slice(&descr.id.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        if role == Role::Client {
            sent.push(descr.id);
        }
    }

    let total = out.len() - body_start;
    if total > usize::from(u16::MAX) {
        return Err(Error::HandshakeTooLarge);
    }
    if total == 0 {
        out.truncate(placeholder_at);
    } else {
        out[placeholder_at..placeholder_at + 2].copy_from_slice(&(total as u16).to_be_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::registry::RegisterFlags;

    fn roundtrip(role_gen: Role, role_parse: Role) -> (ExtensionStore, SentList) {
        let mut store = ExtensionStore::new();
        store.set(23, Box::new(true)).expect("set ext master secret");
        let session = SessionRegistry::default();
        let mut sent = SentList::new();
        let mut buf = Vec::new();
        gen_extensions(&store, &session, &mut sent, role_gen, Phase::ClientHello, &mut buf).expect("gen");

        let mut store2 = ExtensionStore::new();
        let mut sent2 = if role_parse == Role::Server { SentList::new() } else { sent.clone() };
        parse_extensions(&mut store2, &session, &mut sent2, role_parse, Phase::ClientHello, &buf).expect("parse");
        (store2, sent2)
    }

    #[test]
    fn empty_block_round_trips_to_nothing() {
        let store = ExtensionStore::new();
        let session = SessionRegistry::default();
        let mut sent = SentList::new();
        let mut buf = Vec::new();
        gen_extensions(&store, &session, &mut sent, Role::Client, Phase::ClientHello, &mut buf).expect("gen");
        assert!(buf.is_empty());

        let mut store2 = ExtensionStore::new();
        let mut sent2 = SentList::new();
        parse_extensions(&mut store2, &session, &mut sent2, Role::Client, Phase::ClientHello, &buf).expect("parse");
    }

    #[test]
    fn generated_block_parses_back_with_same_byte_count() {
        let (store, _) = roundtrip(Role::Client, Role::Server);
        assert!(store.is_set(23));
    }

    #[test]
    fn server_rejects_extension_client_never_sent() {
        let store = ExtensionStore::new();
        let session = SessionRegistry::default();
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u16.to_be_bytes());
        buf.extend_from_slice(&23u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0xffffu16.to_be_bytes()); // unknown, skipped not erroring
        buf.extend_from_slice(&0u16.to_be_bytes());

        let mut store2 = ExtensionStore::new();
        let mut sent = SentList::new(); // client never offered 23
        let result = parse_extensions(&mut store2, &session, &mut sent, Role::Client, Phase::ClientHello, &buf);
        assert!(matches!(result, Err(Error::IllegalExtension)));
        let _ = store;
    }

    #[test]
    fn unknown_extension_type_is_skipped_not_an_error() {
        let store = ExtensionStore::new();
        let session = SessionRegistry::default();
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u16.to_be_bytes());
        buf.extend_from_slice(&0xfffeu16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());

        let mut store2 = ExtensionStore::new();
        let mut sent = SentList::new();
        parse_extensions(&mut store2, &session, &mut sent, Role::Server, Phase::ClientHello, &buf).expect("parse");
        let _ = store;
    }

    #[test]
    fn session_registered_descriptor_shadows_builtin() {
        fn custom_recv(store: &mut ExtensionStore, _role: Role, _payload: &[u8]) -> Result<(), Error> {
            store.set(23, Box::new(false))
        }

        let mut session = SessionRegistry::default();
        session
            .register(
                super::super::registry::ExtensionDescriptor {
                    name: "custom_ems",
                    id: 23,
                    parse_class: super::super::registry::ParseClass::ClientHello,
                    recv: Some(custom_recv),
                    send: None,
                    pack: None,
                    unpack: None,
                },
                RegisterFlags::OVERRIDE_INTERNAL,
            )
            .expect("register");

        let mut store = ExtensionStore::new();
        let mut sent = SentList::new();
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u16.to_be_bytes());
        buf.extend_from_slice(&23u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        parse_extensions(&mut store, &session, &mut sent, Role::Server, Phase::ClientHello, &buf).expect("parse");
        assert!(!*crate::ext::store::downcast::<bool>(store.get(23).expect("get")).expect("bool"));
    }
}
