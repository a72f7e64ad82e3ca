//! TLS Feature extension (component K, RFC 7633 §5): a certificate
//! extension carrying the list of TLS extension types a CA promises its
//! subject will support, and the one built-in entry with full wire
//! semantics rather than the thin pack/unpack most of [`super::builtins`]
//! settles for.
//!
//! The extension's own payload (as sent in a handshake, not the
//! certificate extension DER this module also knows how to read) is just
//! the same `uint16` list, length-prefixed the way [`super::codec`]
//! expects every extension's body to be shaped.

use keycore_error::Error;

use super::registry::{ExtensionDescriptor, ParseClass, Role, SendOutcome};
use super::store::{downcast, ExtensionState, ExtensionStore};
use crate::primitive::{encode_der_length, encode_der_unsigned_integer};

/// IANA extension type id for `status_request_v2`... no: this is
/// `TLS Feature` (RFC 7633), assigned 24.
pub const TLS_FEATURE_TYPE: u16 = 24;

/// `[super::builtins]`'s fixed-order table wires this descriptor in
/// directly, matching the style every other built-in uses there.
pub const DESCRIPTOR: ExtensionDescriptor = ExtensionDescriptor {
    name: "tls_features",
    id: TLS_FEATURE_TYPE,
    parse_class: ParseClass::TlsExt,
    recv: Some(recv),
    send: Some(send),
    pack: Some(pack),
    unpack: Some(unpack),
};

/// `check(parent, child)` (§4.K, testable property 4 / scenario S7): every
/// feature the parent promises must also appear in the child's list, and
/// the child's list may be no shorter — a child certificate is allowed to
/// promise strictly more than its issuer, never less.
#[must_use]
pub fn check(parent: &[u16], child: &[u16]) -> bool {
    parent.len() <= child.len() && parent.iter().all(|f| child.contains(f))
}

fn recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    let features = parse_wire_list(payload)?;
    store.set(TLS_FEATURE_TYPE, Box::new(features))
}

fn send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let Ok(state) = store.get(TLS_FEATURE_TYPE) else {
        return Ok(SendOutcome::Suppress);
    };
    let features: &Vec<u16> = downcast(state).ok_or(Error::RequestedDataNotAvailable)?;
    for f in features {
        out.extend_from_slice(&f.to_be_bytes());
    }
    Ok(SendOutcome::Emit)
}

fn pack(state: &dyn ExtensionState) -> Vec<u8> {
    let features: &Vec<u16> = downcast(state).unwrap_or(&EMPTY);
    let mut out = Vec::with_capacity(2 + features.len() * 2);
    for f in features {
        out.extend_from_slice(&f.to_be_bytes());
    }
    out
}

const EMPTY: Vec<u16> = Vec::new();

fn unpack(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    Ok(Box::new(parse_wire_list(bytes)?))
}

fn parse_wire_list(bytes: &[u8]) -> Result<Vec<u16>, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::UnexpectedExtensionsLength);
    }
    Ok(bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

/// Reads the `TLSFeature ::= SEQUENCE OF INTEGER` DER encoding a CA embeds
/// in a certificate extension (distinct from the handshake wire format
/// above, which this crate never needs to emit inside a certificate —
/// that half of RFC 7633 belongs to the certificate-issuing side, out of
/// scope here; only reading a peer's promised feature list is).
pub fn import_der(der: &[u8]) -> Result<Vec<u16>, Error> {
    let mut cursor = Cursor(der);
    let content = cursor.take_tlv(0x30)?;
    let mut inner = Cursor(content);
    let mut out = Vec::new();
    while !inner.0.is_empty() {
        let value = inner.take_tlv(0x02)?;
        out.push(decode_unsigned_u16(value)?);
    }
    Ok(out)
}

/// Writes the same `SEQUENCE OF INTEGER` DER form `import_der` reads back.
#[must_use]
pub fn export_der(features: &[u16]) -> Vec<u8> {
    let mut content = Vec::new();
    for f in features {
        content.extend(encode_der_unsigned_integer(&f.to_be_bytes()));
    }
    let mut out = Vec::with_capacity(2 + content.len());
    out.push(0x30);
    out.extend(encode_der_length(content.len()));
    out.extend(content);
    out
}

fn decode_unsigned_u16(value: &[u8]) -> Result<u16, Error> {
    let mut trimmed = value;
    while trimmed.len() > 1 && trimmed[0] == 0 {
        trimmed = &trimmed[1..];
    }
    match trimmed.len() {
        0 => Ok(0),
        1 => Ok(u16::from(trimmed[0])),
        2 => Ok(u16::from_be_bytes([trimmed[0], trimmed[1]])),
        _ => Err(Error::ParsingError),
    }
}

struct Cursor<'a>(&'a [u8]);

impl<'a> Cursor<'a> {
    fn take_tlv(&mut self, expected_tag: u8) -> Result<&'a [u8], Error> {
        let tag = *self.0.first().ok_or(Error::ParsingError)?;
        if tag != expected_tag {
            return Err(Error::ParsingError);
        }
        let len_byte = *self.0.get(1).ok_or(Error::ParsingError)?;
        let (len, header_len) = if len_byte & 0x80 == 0 {
            (usize::from(len_byte), 2)
        } else {
            let n = usize::from(len_byte & 0x7f);
            let bytes = self.0.get(2..2 + n).ok_or(Error::ParsingError)?;
            let mut len = 0usize;
            for b in bytes {
                len = len.checked_shl(8).ok_or(Error::ParsingError)?;
                len |= usize::from(*b);
            }
            (len, 2 + n)
        };
        let value = self.0.get(header_len..header_len + len).ok_or(Error::ParsingError)?;
        self.0 = &self.0[header_len + len..];
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_lists_are_a_superset() {
        assert!(check(&[22, 24], &[22, 24]));
    }

    /// Scenario S7: parent `[22]`, child `[22, 24]` passes; parent
    /// `[22, 24]`, child `[22]` fails.
    #[test]
    fn child_may_promise_more_not_less() {
        assert!(check(&[22], &[22, 24]));
        assert!(!check(&[22, 24], &[22]));
    }

    #[test]
    fn empty_parent_is_always_satisfied() {
        assert!(check(&[], &[22]));
        assert!(check(&[], &[]));
    }

    #[test]
    fn der_roundtrip() {
        let der = export_der(&[22, 24, 65281]);
        assert_eq!(import_der(&der).expect("import"), vec![22, 24, 65281]);
    }

    #[test]
    fn empty_list_roundtrips_to_empty_sequence() {
        let der = export_der(&[]);
        assert_eq!(der, vec![0x30, 0x00]);
        assert_eq!(import_der(&der).expect("import"), Vec::<u16>::new());
    }

    #[test]
    fn wire_recv_send_roundtrip_through_store() {
        let mut store = ExtensionStore::new();
        recv(&mut store, Role::Server, &[0, 22, 0, 24]).expect("recv");
        let mut out = Vec::new();
        let outcome = send(&store, Role::Client, &mut out).expect("send");
        assert_eq!(outcome, SendOutcome::Emit);
        assert_eq!(out, vec![0, 22, 0, 24]);
    }

    #[test]
    fn send_with_no_state_suppresses() {
        let store = ExtensionStore::new();
        let mut out = Vec::new();
        assert_eq!(send(&store, Role::Client, &mut out).expect("send"), SendOutcome::Suppress);
        assert!(out.is_empty());
    }

    #[test]
    fn odd_length_payload_is_rejected() {
        assert!(matches!(parse_wire_list(&[0, 22, 0]), Err(Error::UnexpectedExtensionsLength)));
    }

    #[test]
    fn truncated_der_is_a_parsing_error() {
        assert!(matches!(import_der(&[0x30, 0x05, 0x02, 0x01]), Err(Error::ParsingError)));
    }
}
