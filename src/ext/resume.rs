//! Resumption pack/unpack (component J): serializes every `pack`-capable
//! live extension's state into a resumption blob, and the reverse, per the
//! wire format in §6:
//!
//! ```text
//! resume_blob ::= uint32 count
//!                 { uint32 type ; uint32 ext_size ; ext_size bytes per_ext }*
//! ```
//!
//! `per_ext` is opaque to this layer; each extension defines its own
//! pack/unpack (§4.J).

use keycore_error::Error;

use super::registry::{self, SessionRegistry};
use super::store::ExtensionStore;

/// Packs every live extension that both has a registered descriptor and a
/// `pack_func` into a resumption blob. A 32-bit count leads the blob.
#[must_use]
pub fn pack_session(store: &ExtensionStore, session: &SessionRegistry) -> Vec<u8> {
    let mut records = Vec::new();
    for (ty, state) in store.live_entries() {
        let Some(descr) = registry::lookup(session, ty) else {
            continue;
        };
        let Some(pack) = descr.pack else {
            continue;
        };
        records.push((ty, pack(state)));
    }

    let mut out = Vec::with_capacity(4 + records.iter().map(|(_, p)| 8 + p.len()).sum::<usize>());
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for (ty, payload) in &records {
        out.extend_from_slice(&u32::from(*ty).to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
    }
    out
}

/// Reads a resumption blob, materializing each record's state via the
/// matching descriptor's `unpack` and storing it in the *resumed* side of
/// `store` — the live side is untouched until [`ExtensionStore::restore_resumed`]
/// runs (§4.J). A record whose type has no registered descriptor or no
/// `unpack_func` is skipped rather than erroring: resumption blobs may
/// outlive a server restart that dropped a now-unregistered extension.
pub fn unpack_session(store: &mut ExtensionStore, session: &SessionRegistry, bytes: &[u8]) -> Result<(), Error> {
    let count = read_u32(bytes)?;
    let mut rest = bytes.get(4..).ok_or(Error::ParsingError)?;

    for _ in 0..count {
        let ty = read_u32(rest)?;
        let size = read_u32(rest.get(4..).ok_or(Error::ParsingError)?)? as usize;
        rest = rest.get(8..).ok_or(Error::ParsingError)?;
        let payload = rest.get(..size).ok_or(Error::ParsingError)?;
        rest = &rest[size..];

        let ty = u16::try_from(ty).map_err(|_| Error::ParsingError)?;
        let Some(descr) = registry::lookup(session, ty) else {
            continue;
        };
        let Some(unpack) = descr.unpack else {
            continue;
        };
        let state = unpack(payload)?;
        store.set_resumed(ty, state)?;
    }
    Ok(())
}

fn read_u32(b: &[u8]) -> Result<u32, Error> {
    let bytes: [u8; 4] = b.get(..4).ok_or(Error::ParsingError)?.try_into().map_err(|_| Error::ParsingError)?;
    Ok(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::registry::{ExtensionDescriptor, ParseClass, RegisterFlags, Role};
    use crate::ext::store::{downcast, ExtensionState};

    fn pack_bytes(state: &dyn ExtensionState) -> Vec<u8> {
        downcast::<Vec<u8>>(state).cloned().unwrap_or_default()
    }

    fn unpack_bytes(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
        Ok(Box::new(bytes.to_vec()))
    }

    fn noop_recv(_: &mut ExtensionStore, _: Role, _: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn session_with_one_extension() -> SessionRegistry {
        let mut session = SessionRegistry::default();
        session
            .register(
                ExtensionDescriptor {
                    name: "opaque",
                    id: 0x002A,
                    parse_class: ParseClass::TlsExt,
                    recv: Some(noop_recv),
                    send: None,
                    pack: Some(pack_bytes),
                    unpack: Some(unpack_bytes),
                },
                RegisterFlags::NONE,
            )
            .expect("register");
        session
    }

    /// Scenario S4: pack one extension of type 0x002A with opaque bytes
    /// `0x99 0x88`, unpack, then restore.
    #[test]
    fn s4_resumption_roundtrip() {
        let session = session_with_one_extension();
        let mut store = ExtensionStore::new();
        store.set(0x002A, Box::new(vec![0x99u8, 0x88])).expect("set");

        let blob = pack_session(&store, &session);
        assert_eq!(&blob[0..4], &1u32.to_be_bytes());
        assert_eq!(&blob[4..8], &0x0000002Au32.to_be_bytes());
        assert_eq!(&blob[8..12], &2u32.to_be_bytes());
        assert_eq!(&blob[12..14], &[0x99, 0x88]);

        let mut store2 = ExtensionStore::new();
        unpack_session(&mut store2, &session, &blob).expect("unpack");
        assert!(!store2.is_set(0x002A)); // resumed side only, pre-restore

        store2.restore_resumed(|ty| {
            registry::lookup(&session, ty)
                .map(|d| d.parse_class.is_mandatory())
                .unwrap_or(false)
        });
        let state = store2.get(0x002A).expect("promoted");
        assert_eq!(downcast::<Vec<u8>>(state).expect("bytes"), &vec![0x99u8, 0x88]);
    }

    #[test]
    fn unknown_type_in_blob_is_skipped_not_an_error() {
        let session = SessionRegistry::default();
        let mut blob = Vec::new();
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.extend_from_slice(&0xffffu32.to_be_bytes());
        blob.extend_from_slice(&2u32.to_be_bytes());
        blob.extend_from_slice(&[1, 2]);

        let mut store = ExtensionStore::new();
        unpack_session(&mut store, &session, &blob).expect("unpack");
        assert_eq!(store.live_entries().count(), 0);
    }

    #[test]
    fn truncated_blob_is_a_parsing_error() {
        let session = session_with_one_extension();
        let mut store = ExtensionStore::new();
        let blob = vec![0, 0, 0, 1]; // count=1, but no record follows
        assert!(matches!(
            unpack_session(&mut store, &session, &blob),
            Err(Error::ParsingError)
        ));
    }

    #[test]
    fn empty_store_packs_to_zero_count() {
        let session = SessionRegistry::default();
        let store = ExtensionStore::new();
        assert_eq!(pack_session(&store, &session), 0u32.to_be_bytes().to_vec());
    }
}
