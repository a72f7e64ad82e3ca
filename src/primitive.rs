//! Crypto primitive interface (component B).
//!
//! The abstract key layer does not implement RSA/EC math or hashing itself;
//! it consumes a small, fixed contract from a lower crypto layer. Here that
//! layer is `aws-lc-rs` for RSA, ECDSA, Ed25519 and hashing, and the
//! RustCrypto `dsa`/`num-bigint-dsa` pair for DSA, which `aws-lc-rs` does not
//! expose. GOST has no maintained pure-Rust primitive crate in the pack, so
//! [`pk_sign`], [`pk_verify`] and [`pk_decrypt`] return
//! [`Error::UnimplementedFeature`] for it; GOST key import/export/key-id
//! still work against key material alone (see [`crate::key`]).

use keycore_error::Error;

/// The PK (public key) algorithm family a key or signature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PkAlgorithm {
    /// RSA, usable for PKCS#1.5 signatures, RSA-PSS, and PKCS#1.5 encryption.
    Rsa,
    /// RSA restricted to the PSS signature scheme.
    RsaPss,
    /// DSA (FIPS 186-3, up to (3072, 256)).
    Dsa,
    /// ECDSA over a named curve.
    Ecdsa,
    /// EdDSA over Curve25519 (Ed25519 only; Ed448 is out of scope).
    Ed25519,
    /// GOST R 34.10 family. Key material only: sign/verify/decrypt are
    /// [`Error::UnimplementedFeature`].
    Gost,
}

/// Named elliptic curves recognized by [`PkAlgorithm::Ecdsa`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EccCurve {
    Secp256r1,
    Secp384r1,
    Secp521r1,
}

impl EccCurve {
    /// Bit size used by [`crate::key::PublicKey::get_preferred_hash_algorithm`]'s
    /// curve-to-hash ladder.
    #[must_use]
    pub fn bits(self) -> usize {
        match self {
            Self::Secp256r1 => 256,
            Self::Secp384r1 => 384,
            Self::Secp521r1 => 521,
        }
    }
}

/// A digest ("MAC" in the source's vocabulary) algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MacAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl MacAlgorithm {
    /// Digest length in bytes.
    #[must_use]
    pub fn len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// True for algorithms [`crate::key::PublicKey::verify_data2`] rejects
    /// unless the caller passes `AllowBroken` (see §7 of the spec this crate
    /// implements).
    #[must_use]
    pub fn is_broken(self) -> bool {
        matches!(self, Self::Sha1)
    }

    #[cfg(feature = "aws-lc")]
    fn aws_lc(self) -> &'static aws_lc_rs::digest::Algorithm {
        use aws_lc_rs::digest;
        match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
            Self::Sha512 => &digest::SHA512,
        }
    }
}

/// RSA-PSS parameters pinned to a key's SPKI parameters (see
/// [`crate::spki::SpkiParams`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PssParams {
    pub hash: MacAlgorithm,
    pub salt_len: usize,
}

/// `hash_fast(alg, data) -> digest`.
#[cfg(feature = "aws-lc")]
pub fn hash_fast(alg: MacAlgorithm, data: &[u8]) -> Vec<u8> {
    aws_lc_rs::digest::digest(alg.aws_lc(), data).as_ref().to_vec()
}

#[cfg(not(feature = "aws-lc"))]
pub fn hash_fast(_alg: MacAlgorithm, _data: &[u8]) -> Vec<u8> {
    Vec::new()
}

/// `hash_get_len(alg) -> bytes`.
#[must_use]
pub fn hash_get_len(alg: MacAlgorithm) -> usize {
    alg.len()
}

/// `find_rsa_pss_salt_size(bits, mac, minimum) -> salt_size`.
///
/// Mirrors the reference implementation's rule: the salt size is the digest
/// length unless the key is too small to fit digest + salt + 2 bytes of
/// overhead, in which case it shrinks to whatever remains, floored at
/// `minimum`.
#[must_use]
pub fn find_rsa_pss_salt_size(key_bits: usize, mac: MacAlgorithm, minimum: usize) -> usize {
    let key_bytes = key_bits.div_ceil(8);
    let digest_len = mac.len();
    let max_salt = key_bytes.saturating_sub(digest_len).saturating_sub(2);
    digest_len.min(max_salt).max(minimum)
}

/// In-memory key material for a software-resident key, as imported by
/// [`crate::key::PrivateKey::import_x509`] and exported for verification by
/// [`crate::key::PublicKey`]. Holds exactly the bytes `aws-lc-rs` /
/// `dsa` need, not a parsed ASN.1 structure.
#[derive(Clone)]
#[non_exhaustive]
pub enum SoftwareKeyMaterial {
    /// PKCS#8 DER, usable for RSA-PKCS1 and RSA-PSS.
    Rsa { pkcs8: Vec<u8> },
    /// PKCS#8 DER over the given curve.
    Ecdsa { curve: EccCurve, pkcs8: Vec<u8> },
    /// Raw 32-byte seed (PKCS#8-wrapped for `aws-lc-rs`'s constructor).
    Ed25519 { pkcs8: Vec<u8> },
    /// RustCrypto `dsa` signing key, DSA has no `aws-lc-rs` support.
    Dsa { signing_key: dsa::SigningKey },
}

fn zeroize_material(material: &mut SoftwareKeyMaterial) {
    use zeroize::Zeroize;
    match material {
        SoftwareKeyMaterial::Rsa { pkcs8 }
        | SoftwareKeyMaterial::Ecdsa { pkcs8, .. }
        | SoftwareKeyMaterial::Ed25519 { pkcs8 } => pkcs8.zeroize(),
        SoftwareKeyMaterial::Dsa { .. } => {}
    }
}

/// Zeroes the PKCS#8 bytes on drop (§3 Lifecycle: "zeroing sensitive
/// material"). `dsa::SigningKey` zeroizes its own scalar on drop already.
impl Drop for SoftwareKeyMaterial {
    fn drop(&mut self) {
        zeroize_material(self);
    }
}

/// Matching public key material for [`pk_verify`].
#[derive(Clone)]
#[non_exhaustive]
pub enum PublicKeyMaterial {
    Rsa { spki_der: Vec<u8> },
    Ecdsa { curve: EccCurve, point: Vec<u8> },
    Ed25519 { point: Vec<u8> },
    Dsa { verifying_key: dsa::VerifyingKey },
}

/// `pk_sign(alg, data_or_digest, key, params) -> signature`.
///
/// `data_or_digest` is the pre-image: for RSA-PKCS1/PSS and ECDSA it is the
/// digest (the caller already ran [`hash_fast`]); Ed25519 signs the raw
/// message, per [`crate::key::PrivateKey::sign_data`]'s dispatch rule.
///
/// `pkcs1_hash` selects the DigestInfo prefix for plain (non-PSS) RSA-PKCS1
/// signing: `Some(mac)` signs the already-computed `mac` digest in
/// `data_or_digest`, `None` is RSA-raw (the caller supplies the padded block
/// directly, no digest prefix). It is ignored by every other key variant.
#[cfg(feature = "aws-lc")]
pub fn pk_sign(
    data_or_digest: &[u8],
    key: &SoftwareKeyMaterial,
    pkcs1_hash: Option<MacAlgorithm>,
    params: Option<PssParams>,
) -> Result<Vec<u8>, Error> {
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature as lc_sig;

    let rng = SystemRandom::new();
    match key {
        SoftwareKeyMaterial::Rsa { pkcs8 } => match params {
            Some(pss) => {
                let keypair = lc_sig::RsaKeyPair::from_pkcs8(pkcs8)
                    .map_err(|e| Error::backend(format!("invalid RSA PKCS#8: {e}")))?;
                let mut sig = vec![0u8; keypair.public_modulus_len()];
                let alg: &dyn lc_sig::RsaEncoding = match pss.hash {
                    MacAlgorithm::Sha256 => &lc_sig::RSA_PSS_SHA256,
                    MacAlgorithm::Sha384 => &lc_sig::RSA_PSS_SHA384,
                    MacAlgorithm::Sha512 => &lc_sig::RSA_PSS_SHA512,
                    MacAlgorithm::Sha1 => return Err(Error::UnknownAlgorithm),
                };
                keypair
                    .sign(alg, &rng, data_or_digest, &mut sig)
                    .map_err(|_| Error::SignFailed)?;
                Ok(sig)
            }
            // `aws-lc-rs`'s `RsaKeyPair::sign` hashes its `msg` argument
            // itself, which would double-hash `data_or_digest`. PKCS#1 v1.5
            // signing over an already-computed digest needs the RustCrypto
            // `rsa` crate's precomputed-digest path instead (§4.C/§4.E: the
            // same "caller already hashed" contract `sign_hash`/`sign_hash2`
            // expose).
            None => rsa_pkcs1_sign(pkcs8, data_or_digest, pkcs1_hash),
        },
        SoftwareKeyMaterial::Ecdsa { curve, pkcs8 } => {
            let alg = match curve {
                EccCurve::Secp256r1 => &lc_sig::ECDSA_P256_SHA256_FIXED_SIGNING,
                EccCurve::Secp384r1 => &lc_sig::ECDSA_P384_SHA384_FIXED_SIGNING,
                EccCurve::Secp521r1 => return Err(Error::UnimplementedFeature),
            };
            let keypair = lc_sig::EcdsaKeyPair::from_pkcs8(alg, pkcs8, &rng)
                .map_err(|e| Error::backend(format!("invalid EC PKCS#8: {e}")))?;
            let sig = keypair
                .sign(&rng, data_or_digest)
                .map_err(|_| Error::SignFailed)?;
            fixed_to_der(sig.as_ref())
        }
        SoftwareKeyMaterial::Ed25519 { pkcs8 } => {
            let keypair = lc_sig::Ed25519KeyPair::from_pkcs8(pkcs8)
                .map_err(|e| Error::backend(format!("invalid Ed25519 PKCS#8: {e}")))?;
            Ok(keypair.sign(data_or_digest).as_ref().to_vec())
        }
        SoftwareKeyMaterial::Dsa { signing_key } => {
            use signature::RandomizedSigner;
            let sig: dsa::Signature = signing_key
                .try_sign_with_rng(&mut rand::rngs::OsRng, data_or_digest)
                .map_err(|_| Error::SignFailed)?;
            dsa_signature_to_der(&sig)
        }
    }
}

/// PKCS#1 v1.5 RSA signing over an already-computed digest: the
/// `rsa::pkcs1v15` padding scheme pads `data_or_digest` with the
/// DigestInfo prefix for `hash` (or no prefix at all for RSA-raw, `hash ==
/// None`) and performs the private-key operation directly, without
/// `aws-lc-rs`'s message-hashing `RsaKeyPair::sign`.
#[cfg(feature = "aws-lc")]
fn rsa_pkcs1_sign(
    pkcs8: &[u8],
    data_or_digest: &[u8],
    hash: Option<MacAlgorithm>,
) -> Result<Vec<u8>, Error> {
    use rsa::pkcs8::DecodePrivateKey;

    let key = rsa::RsaPrivateKey::from_pkcs8_der(pkcs8)
        .map_err(|e| Error::backend(format!("invalid RSA PKCS#8: {e}")))?;
    let padding = match hash {
        Some(mac) => pkcs1v15_padding(mac),
        None => rsa::pkcs1v15::Pkcs1v15Sign::new_unprefixed(),
    };
    key.sign(padding, data_or_digest).map_err(|_| Error::SignFailed)
}

/// Builds the `Pkcs1v15Sign` padding for `mac`: the DigestInfo
/// `AlgorithmIdentifier` + OCTET STRING header, without the digest bytes
/// themselves (`rsa::pkcs1v15` appends those from the value passed to
/// `sign`/`verify`). Derived from [`encode_ber_digest_info`] so the prefix
/// can never drift from the DigestInfo this crate actually encodes.
#[cfg(feature = "aws-lc")]
fn pkcs1v15_padding(mac: MacAlgorithm) -> rsa::pkcs1v15::Pkcs1v15Sign {
    let digest_len = mac.len();
    let full = encode_ber_digest_info(mac, &vec![0u8; digest_len]);
    let prefix = full[..full.len() - digest_len].to_vec().into_boxed_slice();
    rsa::pkcs1v15::Pkcs1v15Sign {
        hash_len: Some(digest_len),
        prefix,
    }
}

/// Converts a fixed-width ECDSA `r || s` reply into the DER
/// `SEQUENCE { INTEGER r, INTEGER s }` the TLS signature wire requires (§4.C).
/// An odd-length reply is [`Error::SignFailed`].
pub fn fixed_to_der(raw: &[u8]) -> Result<Vec<u8>, Error> {
    if raw.len() % 2 != 0 || raw.is_empty() {
        return Err(Error::SignFailed);
    }
    let half = raw.len() / 2;
    let (r, s) = raw.split_at(half);
    Ok(encode_der_sequence_of_integers(r, s))
}

fn encode_der_sequence_of_integers(r: &[u8], s: &[u8]) -> Vec<u8> {
    let r_der = encode_der_unsigned_integer(r);
    let s_der = encode_der_unsigned_integer(s);
    let content_len = r_der.len() + s_der.len();
    let mut out = Vec::with_capacity(2 + content_len + 4);
    out.push(0x30); // SEQUENCE
    out.extend(encode_der_length(content_len));
    out.extend(r_der);
    out.extend(s_der);
    out
}

pub(crate) fn encode_der_unsigned_integer(value: &[u8]) -> Vec<u8> {
    let mut trimmed = value;
    while trimmed.len() > 1 && trimmed[0] == 0 {
        trimmed = &trimmed[1..];
    }
    let needs_leading_zero = !trimmed.is_empty() && trimmed[0] & 0x80 != 0;
    let len = trimmed.len() + usize::from(needs_leading_zero);
    let mut out = Vec::with_capacity(2 + len);
    out.push(0x02); // INTEGER
    out.extend(encode_der_length(len));
    if needs_leading_zero {
        out.push(0);
    }
    out.extend_from_slice(trimmed);
    out
}

pub(crate) fn encode_der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let mut bytes = len.to_be_bytes().to_vec();
        while bytes.first() == Some(&0) {
            bytes.remove(0);
        }
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }
}

fn dsa_signature_to_der(sig: &dsa::Signature) -> Result<Vec<u8>, Error> {
    Ok(encode_der_sequence_of_integers(
        &sig.r().to_bytes_be(),
        &sig.s().to_bytes_be(),
    ))
}

/// `pk_verify(alg, data_or_digest, signature, key, mac, params) -> ok/fail`.
///
/// `mac` is the digest algorithm [`crate::key::PublicKey::verify_hash2`]
/// picked its MAC entry by; it selects the RSA-PKCS1 variant (and, for
/// PSS, is overridden by `params.hash` when that differs) so verification
/// always matches what [`pk_sign`] actually signed.
#[cfg(feature = "aws-lc")]
pub fn pk_verify(
    data_or_digest: &[u8],
    signature: &[u8],
    key: &PublicKeyMaterial,
    mac: MacAlgorithm,
    params: Option<PssParams>,
) -> Result<(), Error> {
    use aws_lc_rs::signature as lc_sig;

    match key {
        PublicKeyMaterial::Rsa { spki_der } => match params {
            Some(pss) => {
                let alg: &dyn lc_sig::VerificationAlgorithm = match pss.hash {
                    MacAlgorithm::Sha256 => &lc_sig::RSA_PSS_2048_8192_SHA256,
                    MacAlgorithm::Sha384 => &lc_sig::RSA_PSS_2048_8192_SHA384,
                    MacAlgorithm::Sha512 => &lc_sig::RSA_PSS_2048_8192_SHA512,
                    MacAlgorithm::Sha1 => return Err(Error::UnknownAlgorithm),
                };
                lc_sig::UnparsedPublicKey::new(alg, spki_pubkey_bitstring(spki_der)?)
                    .verify(data_or_digest, signature)
                    .map_err(|_| Error::SigVerifyFailed)
            }
            // Same double-hash hazard as `pk_sign`'s `RsaKeyPair::sign`:
            // `aws-lc-rs`'s `RSA_PKCS1_*` verifiers hash their message
            // argument, so they cannot check a signature over an
            // already-computed digest. Use the RustCrypto `rsa` crate's
            // precomputed-digest verifier instead.
            None => rsa_pkcs1_verify(spki_der, data_or_digest, signature, mac),
        },
        PublicKeyMaterial::Ecdsa { curve, point } => {
            // Every ECDSA signature this crate produces is DER (`pk_sign`
            // converts its FIXED output with `fixed_to_der`, and the PKCS#11
            // path does the same), so verification must use the ASN.1
            // variants, not the raw `r || s` FIXED ones.
            let alg: &dyn lc_sig::VerificationAlgorithm = match curve {
                EccCurve::Secp256r1 => &lc_sig::ECDSA_P256_SHA256_ASN1,
                EccCurve::Secp384r1 => &lc_sig::ECDSA_P384_SHA384_ASN1,
                EccCurve::Secp521r1 => return Err(Error::UnimplementedFeature),
            };
            lc_sig::UnparsedPublicKey::new(alg, point)
                .verify(data_or_digest, signature)
                .map_err(|_| Error::SigVerifyFailed)
        }
        PublicKeyMaterial::Ed25519 { point } => {
            lc_sig::UnparsedPublicKey::new(&lc_sig::ED25519, point)
                .verify(data_or_digest, signature)
                .map_err(|_| Error::SigVerifyFailed)
        }
        PublicKeyMaterial::Dsa { verifying_key } => {
            use signature::Verifier;
            let sig = der_sequence_to_dsa_signature(signature)?;
            verifying_key
                .verify(data_or_digest, &sig)
                .map_err(|_| Error::SigVerifyFailed)
        }
    }
}

/// Extracts the raw key bytes `aws-lc-rs`'s `UnparsedPublicKey` wants out of
/// a full SubjectPublicKeyInfo DER blob (it expects the bit-string payload,
/// not the enclosing SPKI SEQUENCE).
fn spki_pubkey_bitstring(spki_der: &[u8]) -> Result<Vec<u8>, Error> {
    use spki::SubjectPublicKeyInfoRef;
    let spki = SubjectPublicKeyInfoRef::try_from(spki_der).map_err(|_| Error::ParsingError)?;
    Ok(spki.subject_public_key.raw_bytes().to_vec())
}

/// PKCS#1 v1.5 RSA verification against an already-computed digest, the
/// counterpart to [`rsa_pkcs1_sign`]. Takes the full SubjectPublicKeyInfo
/// DER directly, unlike the `aws-lc-rs` arms above (`rsa::RsaPublicKey`
/// parses SPKI itself rather than wanting just the bit-string payload).
#[cfg(feature = "aws-lc")]
fn rsa_pkcs1_verify(
    spki_der: &[u8],
    data_or_digest: &[u8],
    signature: &[u8],
    mac: MacAlgorithm,
) -> Result<(), Error> {
    use rsa::pkcs8::DecodePublicKey;

    let key = rsa::RsaPublicKey::from_public_key_der(spki_der).map_err(|_| Error::ParsingError)?;
    key.verify(pkcs1v15_padding(mac), data_or_digest, signature)
        .map_err(|_| Error::SigVerifyFailed)
}

fn der_sequence_to_dsa_signature(der_bytes: &[u8]) -> Result<dsa::Signature, Error> {
    use der::{Decode, Sequence};

    #[derive(Sequence)]
    struct RsSeq {
        r: der::asn1::Uint,
        s: der::asn1::Uint,
    }
    let seq = RsSeq::from_der(der_bytes).map_err(|_| Error::ParsingError)?;
    dsa::Signature::from_components(
        num_bigint_dsa::BigUint::from_bytes_be(seq.r.as_bytes()),
        num_bigint_dsa::BigUint::from_bytes_be(seq.s.as_bytes()),
    )
    .map_err(|_| Error::SigVerifyFailed)
}

/// `pk_decrypt(alg, ciphertext) -> plaintext`. Constant-time behavior (no
/// branch on padding validity) is the caller's ([`crate::key::PrivateKey::decrypt_data2`])
/// responsibility to preserve once this returns: the primitive itself never
/// branches on whether the PKCS#1 padding it unwrapped was well-formed, it
/// always returns a plaintext-or-error of the same shape.
#[cfg(feature = "aws-lc")]
pub fn pk_decrypt(pkcs8: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    use aws_lc_rs::rsa::{PrivateDecryptingKey, Pkcs1EncryptionAlgorithm};

    let key = PrivateDecryptingKey::from_pkcs8(pkcs8).map_err(|_| Error::DecryptionFailed)?;
    let decryptor = key
        .pkcs1_decryptor(Pkcs1EncryptionAlgorithm::Pkcs1_5)
        .map_err(|_| Error::DecryptionFailed)?;
    let mut out = vec![0u8; ciphertext.len()];
    let written = decryptor
        .decrypt(ciphertext, &mut out)
        .map_err(|_| Error::DecryptionFailed)?;
    out.truncate(written.len());
    Ok(out)
}

/// DigestInfo, the `SEQUENCE { AlgorithmIdentifier, OCTET STRING digest }`
/// structure PKCS#1.5 RSA signatures wrap the digest in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestInfo {
    pub mac: MacAlgorithm,
    pub digest: Vec<u8>,
}

/// `encode_ber_digest_info(mac, digest) -> DER`.
#[must_use]
pub fn encode_ber_digest_info(mac: MacAlgorithm, digest: &[u8]) -> Vec<u8> {
    use der::asn1::{ObjectIdentifier, OctetStringRef};
    use der::{Encode, Sequence};

    #[derive(Sequence)]
    struct AlgorithmIdentifier {
        algorithm: ObjectIdentifier,
        #[asn1(optional = "true")]
        parameters: Option<der::Any>,
    }

    #[derive(Sequence)]
    struct DigestInfoDer<'a> {
        algorithm: AlgorithmIdentifier,
        digest: OctetStringRef<'a>,
    }

    let oid = match mac {
        MacAlgorithm::Sha1 => "1.3.14.3.2.26",
        MacAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
        MacAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
        MacAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
    };
    let info = DigestInfoDer {
        algorithm: AlgorithmIdentifier {
            algorithm: ObjectIdentifier::new_unwrap(oid),
            parameters: Some(der::Any::from(der::asn1::Null)),
        },
        digest: OctetStringRef::new(digest).unwrap_or(OctetStringRef::new(&[]).unwrap_or_default()),
    };
    info.to_der().unwrap_or_default()
}

/// `decode_ber_digest_info(DER) -> (mac, digest)`.
pub fn decode_ber_digest_info(der_bytes: &[u8]) -> Result<DigestInfo, Error> {
    use der::asn1::ObjectIdentifier;
    use der::{Decode, Sequence};

    #[derive(Sequence)]
    struct AlgorithmIdentifier {
        algorithm: ObjectIdentifier,
        #[asn1(optional = "true")]
        parameters: Option<der::Any>,
    }

    #[derive(Sequence)]
    struct DigestInfoDer {
        algorithm: AlgorithmIdentifier,
        digest: der::asn1::OctetString,
    }

    let info = DigestInfoDer::from_der(der_bytes).map_err(|_| Error::ParsingError)?;
    let mac = match info.algorithm.algorithm.to_string().as_str() {
        "1.3.14.3.2.26" => MacAlgorithm::Sha1,
        "2.16.840.1.101.3.4.2.1" => MacAlgorithm::Sha256,
        "2.16.840.1.101.3.4.2.2" => MacAlgorithm::Sha384,
        "2.16.840.1.101.3.4.2.3" => MacAlgorithm::Sha512,
        _ => return Err(Error::UnknownAlgorithm),
    };
    Ok(DigestInfo {
        mac,
        digest: info.digest.as_bytes().to_vec(),
    })
}

/// Validates that `material`'s PKCS#8 DER (where applicable) actually
/// carries the `AlgorithmIdentifier` its [`SoftwareKeyMaterial`] variant
/// claims, before the bytes ever reach `aws-lc-rs`. Catches a
/// mismatched/corrupt import at the import boundary (§4.E) with a
/// [`Error::ParsingError`]/[`Error::UnknownAlgorithm`] rather than a later,
/// harder-to-attribute sign failure.
pub fn validate_pkcs8(material: &SoftwareKeyMaterial) -> Result<(), Error> {
    use pkcs8::PrivateKeyInfoRef;

    const RSA_OID: &str = "1.2.840.113549.1.1.1";
    const EC_OID: &str = "1.2.840.10045.2.1";
    const ED25519_OID: &str = "1.3.101.112";

    fn parse(der_bytes: &[u8]) -> Result<PrivateKeyInfoRef<'_>, Error> {
        PrivateKeyInfoRef::try_from(der_bytes).map_err(|_| Error::ParsingError)
    }

    match material {
        SoftwareKeyMaterial::Rsa { pkcs8 } => {
            let info = parse(pkcs8)?;
            if info.algorithm.oid.to_string() != RSA_OID {
                return Err(Error::UnknownAlgorithm);
            }
        }
        SoftwareKeyMaterial::Ecdsa { curve, pkcs8 } => {
            let info = parse(pkcs8)?;
            if info.algorithm.oid.to_string() != EC_OID {
                return Err(Error::UnknownAlgorithm);
            }
            let curve_oid = info
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.decode_as::<der::asn1::ObjectIdentifier>().ok())
                .map(|oid| oid.to_string());
            let expected = match curve {
                EccCurve::Secp256r1 => "1.2.840.10045.3.1.7",
                EccCurve::Secp384r1 => "1.3.132.0.34",
                EccCurve::Secp521r1 => "1.3.132.0.35",
            };
            if curve_oid.as_deref() != Some(expected) {
                return Err(Error::UnknownAlgorithm);
            }
        }
        SoftwareKeyMaterial::Ed25519 { pkcs8 } => {
            let info = parse(pkcs8)?;
            if info.algorithm.oid.to_string() != ED25519_OID {
                return Err(Error::UnknownAlgorithm);
            }
        }
        // Constructed directly as a `dsa::SigningKey`, never as raw PKCS#8.
        SoftwareKeyMaterial::Dsa { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pss_salt_size_is_digest_len_for_large_keys() {
        assert_eq!(find_rsa_pss_salt_size(2048, MacAlgorithm::Sha256, 0), 32);
    }

    #[test]
    fn pss_salt_size_shrinks_for_small_keys() {
        // 512-bit key = 64 bytes; 64 - 32 (sha256) - 2 = 30 < 32, so it shrinks.
        assert_eq!(find_rsa_pss_salt_size(512, MacAlgorithm::Sha256, 0), 30);
    }

    #[test]
    fn digest_info_roundtrips() {
        let digest = vec![0xAAu8; 32];
        let der = encode_ber_digest_info(MacAlgorithm::Sha256, &digest);
        let decoded = decode_ber_digest_info(&der).expect("decode");
        assert_eq!(decoded.mac, MacAlgorithm::Sha256);
        assert_eq!(decoded.digest, digest);
    }

    #[test]
    fn sha1_is_flagged_broken() {
        assert!(MacAlgorithm::Sha1.is_broken());
        assert!(!MacAlgorithm::Sha256.is_broken());
    }

    fn rsa_pkcs8_der() -> Vec<u8> {
        let mut der = vec![
            0x30, 0x34, // SEQUENCE, 52 bytes
            0x02, 0x01, 0x00, // INTEGER version = 0
            0x30, 0x0d, // SEQUENCE AlgorithmIdentifier, 13 bytes
            0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, // OID rsaEncryption
            0x05, 0x00, // NULL parameters
            0x04, 0x20, // OCTET STRING, 32 bytes
        ];
        der.extend_from_slice(&[0u8; 32]);
        der
    }

    #[test]
    fn validate_pkcs8_accepts_matching_rsa_oid() {
        let material = SoftwareKeyMaterial::Rsa { pkcs8: rsa_pkcs8_der() };
        assert!(validate_pkcs8(&material).is_ok());
    }

    #[test]
    fn validate_pkcs8_rejects_rsa_oid_claimed_as_ed25519() {
        // Same bytes, wrong variant: the AlgorithmIdentifier carries
        // rsaEncryption, not id-Ed25519.
        let material = SoftwareKeyMaterial::Ed25519 { pkcs8: rsa_pkcs8_der() };
        assert!(matches!(validate_pkcs8(&material), Err(Error::UnknownAlgorithm)));
    }

    #[test]
    fn validate_pkcs8_rejects_garbage_der() {
        let material = SoftwareKeyMaterial::Rsa { pkcs8: vec![0xff; 4] };
        assert!(matches!(validate_pkcs8(&material), Err(Error::ParsingError)));
    }

    #[test]
    fn zeroize_material_clears_pkcs8_bytes() {
        let mut material = SoftwareKeyMaterial::Rsa { pkcs8: vec![0xAAu8; 8] };
        zeroize_material(&mut material);
        match &material {
            SoftwareKeyMaterial::Rsa { pkcs8 } => assert!(pkcs8.iter().all(|&b| b == 0)),
            _ => unreachable!("constructed as Rsa above"),
        }
    }
}
