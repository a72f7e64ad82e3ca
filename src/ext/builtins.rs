//! Built-in TLS hello-extension descriptors, in the fixed order the global
//! table is seeded with (§3: "a defined order ... `dumbfw` padding last").
//! Type ids are the real IANA TLS ExtensionType assignments.
//!
//! This crate implements a representative subset rather than every
//! extension the reference library ships; [`super::tlsfeatures`] (component
//! K) is the one built with full wire semantics, since the spec calls it
//! out as the end-to-end demonstration of the registry contract. The rest
//! here exist to exercise the registry/store/codec machinery against real
//! extension shapes (empty-body flags, length-prefixed lists, opaque
//! blobs).

use keycore_error::Error;

use super::registry::{ExtensionDescriptor, ParseClass, Role, SendOutcome};
use super::store::{downcast, ExtensionState, ExtensionStore};

const MAX_RECORD_SIZE: u16 = 1;
const SERVER_NAME: u16 = 0;
const SUPPORTED_GROUPS: u16 = 10;
const SUPPORTED_POINT_FORMATS: u16 = 11;
const SIGNATURE_ALGORITHMS: u16 = 13;
const ENCRYPT_THEN_MAC: u16 = 22;
const EXTENDED_MASTER_SECRET: u16 = 23;
const SAFE_RENEGOTIATION: u16 = 0xff01;
const DUMBFW: u16 = 21;

pub(super) static BUILTINS: &[ExtensionDescriptor] = &[
    ExtensionDescriptor {
        name: "max_record_size",
        id: MAX_RECORD_SIZE,
        parse_class: ParseClass::ClientHello,
        recv: Some(max_record_size_recv),
        send: Some(max_record_size_send),
        pack: Some(pack_u8),
        unpack: Some(unpack_u8),
    },
    ExtensionDescriptor {
        name: "extended_master_secret",
        id: EXTENDED_MASTER_SECRET,
        parse_class: ParseClass::ClientHello,
        recv: Some(extended_master_secret_recv),
        send: Some(extended_master_secret_send),
        pack: Some(pack_bool),
        unpack: Some(unpack_bool),
    },
    ExtensionDescriptor {
        name: "encrypt_then_mac",
        id: ENCRYPT_THEN_MAC,
        parse_class: ParseClass::ClientHello,
        recv: Some(encrypt_then_mac_recv),
        send: Some(encrypt_then_mac_send),
        pack: Some(pack_bool),
        unpack: Some(unpack_bool),
    },
    ExtensionDescriptor {
        name: "server_name",
        id: SERVER_NAME,
        parse_class: ParseClass::ClientHello,
        recv: Some(server_name_recv),
        send: Some(server_name_send),
        pack: Some(pack_string),
        unpack: Some(unpack_string),
    },
    ExtensionDescriptor {
        name: "safe_renegotiation",
        id: SAFE_RENEGOTIATION,
        parse_class: ParseClass::ClientHello,
        recv: Some(safe_renegotiation_recv),
        send: Some(safe_renegotiation_send),
        pack: Some(pack_bytes),
        unpack: Some(unpack_bytes),
    },
    ExtensionDescriptor {
        name: "supported_groups",
        id: SUPPORTED_GROUPS,
        parse_class: ParseClass::ClientHello,
        recv: Some(supported_groups_recv),
        send: Some(supported_groups_send),
        pack: Some(pack_u16_list),
        unpack: Some(unpack_u16_list),
    },
    ExtensionDescriptor {
        name: "supported_point_formats",
        id: SUPPORTED_POINT_FORMATS,
        parse_class: ParseClass::ClientHello,
        recv: Some(supported_point_formats_recv),
        send: Some(supported_point_formats_send),
        pack: Some(pack_u8_list),
        unpack: Some(unpack_u8_list),
    },
    ExtensionDescriptor {
        name: "signature_algorithms",
        id: SIGNATURE_ALGORITHMS,
        parse_class: ParseClass::Mandatory,
        recv: Some(signature_algorithms_recv),
        send: Some(signature_algorithms_send),
        pack: Some(pack_u16_list),
        unpack: Some(unpack_u16_list),
    },
    super::tlsfeatures::DESCRIPTOR,
    ExtensionDescriptor {
        name: "dumbfw",
        id: DUMBFW,
        parse_class: ParseClass::ClientHello,
        recv: None,
        send: Some(dumbfw_send),
        pack: None,
        unpack: None,
    },
];

fn read_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

// -- max_record_size (RFC 6066 max_fragment_length): a single code byte. --

fn max_record_size_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    match payload {
        [code @ 1..=4] => {
            store.set(MAX_RECORD_SIZE, Box::new(*code))?;
            Ok(())
        }
        _ => Err(Error::ParsingError),
    }
}

fn max_record_size_send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let Ok(state) = store.get(MAX_RECORD_SIZE) else {
        return Ok(SendOutcome::Suppress);
    };
    let code = *downcast::<u8>(state).ok_or(Error::ParsingError)?;
    out.push(code);
    Ok(SendOutcome::Emit)
}

fn pack_u8(state: &dyn ExtensionState) -> Vec<u8> {
    vec![*downcast::<u8>(state).unwrap_or(&0)]
}

fn unpack_u8(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    match bytes {
        [b] => Ok(Box::new(*b)),
        _ => Err(Error::ParsingError),
    }
}

// -- zero-length boolean flags (extended_master_secret, encrypt_then_mac). --
//
// Plain `fn` pointers can't close over which type id they were registered
// under, so each flag gets its own thin recv/send pair around a shared
// empty-body check rather than one function parameterized by id.

fn flag_recv_body(payload: &[u8]) -> Result<(), Error> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(Error::ParsingError)
    }
}

fn extended_master_secret_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    flag_recv_body(payload)?;
    store.set(EXTENDED_MASTER_SECRET, Box::new(true))?;
    Ok(())
}

fn extended_master_secret_send(store: &ExtensionStore, _role: Role, _out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    Ok(flag_send_outcome(store, EXTENDED_MASTER_SECRET))
}

fn encrypt_then_mac_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    flag_recv_body(payload)?;
    store.set(ENCRYPT_THEN_MAC, Box::new(true))?;
    Ok(())
}

fn encrypt_then_mac_send(store: &ExtensionStore, _role: Role, _out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    Ok(flag_send_outcome(store, ENCRYPT_THEN_MAC))
}

fn flag_send_outcome(store: &ExtensionStore, ty: u16) -> SendOutcome {
    match store.get(ty).ok().and_then(downcast::<bool>) {
        Some(true) => SendOutcome::Emit,
        _ => SendOutcome::Suppress,
    }
}

fn pack_bool(state: &dyn ExtensionState) -> Vec<u8> {
    vec![u8::from(*downcast::<bool>(state).unwrap_or(&false))]
}

fn unpack_bool(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    match bytes {
        [0] => Ok(Box::new(false)),
        [1] => Ok(Box::new(true)),
        _ => Err(Error::ParsingError),
    }
}

// -- server_name (RFC 6066 SNI): first DNS-hostname entry only. --

fn server_name_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    if payload.len() < 2 {
        return Err(Error::ParsingError);
    }
    let list_len = read_u16(payload) as usize;
    let list = payload.get(2..2 + list_len).ok_or(Error::ParsingError)?;
    if list.len() < 3 {
        return Err(Error::ParsingError);
    }
    let name_type = list[0];
    let name_len = read_u16(&list[1..3]) as usize;
    let name = list.get(3..3 + name_len).ok_or(Error::ParsingError)?;
    if name_type != 0 {
        return Ok(()); // unknown name type, nothing to record
    }
    let hostname = std::str::from_utf8(name).map_err(|_| Error::ParsingError)?;
    store.set(SERVER_NAME, Box::new(hostname.to_owned()))?;
    Ok(())
}

fn server_name_send(store: &ExtensionStore, role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    match role {
        Role::Server => Ok(SendOutcome::Emit), // empty-payload ack, per RFC 6066
        Role::Client => {
            let Ok(state) = store.get(SERVER_NAME) else {
                return Ok(SendOutcome::Suppress);
            };
            let hostname = downcast::<String>(state).ok_or(Error::ParsingError)?;
            let name_bytes = hostname.as_bytes();
            let entry_len = 3 + name_bytes.len();
            out.extend_from_slice(&(entry_len as u16).to_be_bytes());
            out.push(0); // host_name
            out.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(name_bytes);
            Ok(SendOutcome::Emit)
        }
    }
}

fn pack_string(state: &dyn ExtensionState) -> Vec<u8> {
    downcast::<String>(state).cloned().unwrap_or_default().into_bytes()
}

fn unpack_string(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    let s = std::str::from_utf8(bytes).map_err(|_| Error::ParsingError)?;
    Ok(Box::new(s.to_owned()))
}

// -- safe_renegotiation (RFC 5746 renegotiation_info): length-prefixed blob. --

fn safe_renegotiation_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    let [len, rest @ ..] = payload else {
        return Err(Error::ParsingError);
    };
    let info = rest.get(..*len as usize).ok_or(Error::ParsingError)?;
    if info.len() != rest.len() {
        return Err(Error::ParsingError);
    }
    store.set(SAFE_RENEGOTIATION, Box::new(info.to_vec()))?;
    Ok(())
}

fn safe_renegotiation_send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let info = store
        .get(SAFE_RENEGOTIATION)
        .ok()
        .and_then(downcast::<Vec<u8>>)
        .cloned()
        .unwrap_or_default();
    out.push(info.len() as u8);
    out.extend_from_slice(&info);
    Ok(SendOutcome::Emit)
}

fn pack_bytes(state: &dyn ExtensionState) -> Vec<u8> {
    downcast::<Vec<u8>>(state).cloned().unwrap_or_default()
}

fn unpack_bytes(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    Ok(Box::new(bytes.to_vec()))
}

// -- supported_groups / signature_algorithms: length-prefixed u16 lists. --

fn parse_u16_list(payload: &[u8]) -> Result<Vec<u16>, Error> {
    if payload.len() < 2 {
        return Err(Error::ParsingError);
    }
    let list_len = read_u16(payload) as usize;
    let body = payload.get(2..2 + list_len).ok_or(Error::ParsingError)?;
    if body.len() % 2 != 0 {
        return Err(Error::ParsingError);
    }
    Ok(body.chunks_exact(2).map(read_u16).collect())
}

fn encode_u16_list(list: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + list.len() * 2);
    out.extend_from_slice(&((list.len() * 2) as u16).to_be_bytes());
    for v in list {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

fn supported_groups_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    let list = parse_u16_list(payload)?;
    store.set(SUPPORTED_GROUPS, Box::new(list))?;
    Ok(())
}

fn supported_groups_send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let Ok(state) = store.get(SUPPORTED_GROUPS) else {
        return Ok(SendOutcome::Suppress);
    };
    let list = downcast::<Vec<u16>>(state).ok_or(Error::ParsingError)?;
    out.extend_from_slice(&encode_u16_list(list));
    Ok(SendOutcome::Emit)
}

fn signature_algorithms_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    let list = parse_u16_list(payload)?;
    store.set(SIGNATURE_ALGORITHMS, Box::new(list))?;
    Ok(())
}

fn signature_algorithms_send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let Ok(state) = store.get(SIGNATURE_ALGORITHMS) else {
        return Ok(SendOutcome::Suppress);
    };
    let list = downcast::<Vec<u16>>(state).ok_or(Error::ParsingError)?;
    out.extend_from_slice(&encode_u16_list(list));
    Ok(SendOutcome::Emit)
}

fn pack_u16_list(state: &dyn ExtensionState) -> Vec<u8> {
    let list = downcast::<Vec<u16>>(state).cloned().unwrap_or_default();
    list.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn unpack_u16_list(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::ParsingError);
    }
    Ok(Box::new(bytes.chunks_exact(2).map(read_u16).collect::<Vec<u16>>()))
}

// -- supported_point_formats: length-prefixed u8 list. --

fn supported_point_formats_recv(store: &mut ExtensionStore, _role: Role, payload: &[u8]) -> Result<(), Error> {
    let [list_len, rest @ ..] = payload else {
        return Err(Error::ParsingError);
    };
    if rest.len() != *list_len as usize {
        return Err(Error::ParsingError);
    }
    store.set(SUPPORTED_POINT_FORMATS, Box::new(rest.to_vec()))?;
    Ok(())
}

fn supported_point_formats_send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let Ok(state) = store.get(SUPPORTED_POINT_FORMATS) else {
        return Ok(SendOutcome::Suppress);
    };
    let list = downcast::<Vec<u8>>(state).ok_or(Error::ParsingError)?;
    out.push(list.len() as u8);
    out.extend_from_slice(list);
    Ok(SendOutcome::Emit)
}

fn pack_u8_list(state: &dyn ExtensionState) -> Vec<u8> {
    downcast::<Vec<u8>>(state).cloned().unwrap_or_default()
}

fn unpack_u8_list(bytes: &[u8]) -> Result<Box<dyn ExtensionState>, Error> {
    Ok(Box::new(bytes.to_vec()))
}

// -- dumbfw (RFC 7685 padding): must stay last in the table. --

/// Pads to a caller-set target length. The real padding extension needs the
/// total `ClientHello` length to decide how much filler to add; that total
/// isn't visible at this layer, so a caller that wants RFC 7685 padding
/// records the byte count it still needs under [`DUMBFW`] before calling
/// `gen_extensions`, and this `send` emits exactly that many zero bytes.
fn dumbfw_send(store: &ExtensionStore, _role: Role, out: &mut Vec<u8>) -> Result<SendOutcome, Error> {
    let Ok(state) = store.get(DUMBFW) else {
        return Ok(SendOutcome::Suppress);
    };
    let target = *downcast::<usize>(state).ok_or(Error::ParsingError)?;
    out.resize(out.len() + target, 0);
    Ok(SendOutcome::Emit)
}
