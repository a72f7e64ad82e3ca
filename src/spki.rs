//! SubjectPublicKeyInfo construction/parsing and the per-key SPKI parameter
//! record both [`crate::key::PublicKey`] and [`crate::key::PrivateKey`] carry
//! (component D/E support).

use keycore_error::Error;

use crate::primitive::{EccCurve, MacAlgorithm, PkAlgorithm};

/// The PK-algorithm-and-parameter record attached to a key's SPKI, carrying
/// the PSS hash/salt pinned to a key that only ever signs RSA-PSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpkiParams {
    pub pk: PkAlgorithm,
    /// Set only when `pk == PkAlgorithm::RsaPss`.
    pub pss_hash: Option<MacAlgorithm>,
    pub pss_salt_len: Option<usize>,
}

impl SpkiParams {
    #[must_use]
    pub fn plain(pk: PkAlgorithm) -> Self {
        Self {
            pk,
            pss_hash: None,
            pss_salt_len: None,
        }
    }

    #[must_use]
    pub fn rsa_pss(hash: MacAlgorithm, salt_len: usize) -> Self {
        Self {
            pk: PkAlgorithm::RsaPss,
            pss_hash: Some(hash),
            pss_salt_len: Some(salt_len),
        }
    }
}

/// Output format for [`crate::key::PublicKey::export`] / `export2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Der,
    /// PEM with header `PUBLIC KEY` per RFC 7468.
    ///
    /// The reference implementation's `export2` uses the string literal
    /// `BEGIN CERTIFICATE` here, which §9 Open Question 1 of the spec this
    /// crate implements calls out as a latent bug; this crate emits the
    /// RFC-correct header instead.
    Pem,
}

const PEM_LABEL: &str = "PUBLIC KEY";

/// Wraps a raw SPKI DER encoding with the RFC 7468 `-----BEGIN PUBLIC
/// KEY-----` armor.
#[must_use]
pub fn der_to_pem(der: &[u8]) -> String {
    use base64::Engine as _;
    let body = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = format!("-----BEGIN {PEM_LABEL}-----\n");
    for chunk in body.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {PEM_LABEL}-----\n"));
    out
}

/// Reverses [`der_to_pem`].
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>, Error> {
    use base64::Engine as _;
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|_| Error::ParsingError)
}

/// Raw, native-endian curve point material for [`crate::key::PublicKey::import_ecc_raw`].
#[derive(Debug, Clone)]
pub struct EccRaw {
    pub curve: EccCurve,
    /// Native curve encoding: the SEC1 uncompressed point for ECDSA, the
    /// raw 32-byte public value for Ed25519.
    pub x: Vec<u8>,
    /// `None` for EdDSA; `Some` for ECDSA raw-point import.
    pub y: Option<Vec<u8>>,
}

/// Builds a SEC1 uncompressed EC point (`0x04 || X || Y`) from raw
/// coordinates, the shape `aws-lc-rs`'s `UnparsedPublicKey` expects for
/// ECDSA verification.
#[must_use]
pub fn sec1_uncompressed_point(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + x.len() + y.len());
    out.push(0x04);
    out.extend_from_slice(x);
    out.extend_from_slice(y);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_roundtrips_and_uses_rfc7468_header() {
        let der = vec![1, 2, 3, 4, 5];
        let pem = der_to_pem(&der);
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.contains("-----END PUBLIC KEY-----"));
        assert_eq!(pem_to_der(&pem).expect("decode"), der);
    }
}
