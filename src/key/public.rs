use keycore_error::Error;
use tracing::instrument;

use super::{KeyIdFlags, KeyUsage, VerifyFlags};
use crate::primitive::{self, EccCurve, MacAlgorithm, PkAlgorithm, PublicKeyMaterial};
use crate::spki::{self, EccRaw, ExportFormat, SpkiParams};

/// The concrete parameter bundle behind a [`PublicKey`] (§3 Public Key).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PkParams {
    Rsa {
        modulus: Vec<u8>,
        exponent: Vec<u8>,
    },
    Dsa {
        p: Vec<u8>,
        q: Vec<u8>,
        g: Vec<u8>,
        y: Vec<u8>,
    },
    Ecdsa {
        curve: EccCurve,
        point: Vec<u8>,
    },
    Ed25519 {
        point: Vec<u8>,
    },
    Gost {
        curve: EccCurve,
        digest: MacAlgorithm,
        paramset: u32,
        x: Vec<u8>,
        y: Vec<u8>,
    },
}

impl PkParams {
    #[must_use]
    fn pk_algorithm(&self) -> PkAlgorithm {
        match self {
            Self::Rsa { .. } => PkAlgorithm::Rsa,
            Self::Dsa { .. } => PkAlgorithm::Dsa,
            Self::Ecdsa { .. } => PkAlgorithm::Ecdsa,
            Self::Ed25519 { .. } => PkAlgorithm::Ed25519,
            Self::Gost { .. } => PkAlgorithm::Gost,
        }
    }
}

/// A public key: always software-resident, even when extracted from a
/// PKCS#11 token object (§3).
///
/// Invariants enforced at construction: the parameter count matches the
/// advertised PK family, and the SPKI PK tag is unknown or compatible with
/// the parameter PK.
#[derive(Debug, Clone)]
pub struct PublicKey {
    params: PkParams,
    usage: KeyUsage,
    spki: SpkiParams,
}

impl PublicKey {
    fn new(params: PkParams, usage: KeyUsage) -> Self {
        let pk = params.pk_algorithm();
        Self {
            params,
            usage,
            spki: SpkiParams::plain(pk),
        }
    }

    /// `import_x509(cert)`: extracts public params from a SubjectPublicKeyInfo
    /// DER blob. X.509 parsing proper is out of this crate's scope; the
    /// caller supplies the already-extracted SPKI bytes from whatever
    /// certificate-parsing layer it uses.
    #[instrument(skip_all)]
    pub fn import_x509(spki_der: &[u8]) -> Result<Self, Error> {
        use der::Decode;
        use spki::SubjectPublicKeyInfoRef;

        let info = SubjectPublicKeyInfoRef::from_der(spki_der).map_err(|_| Error::ParsingError)?;
        let oid = info.algorithm.oid.to_string();
        let bits = info.subject_public_key.raw_bytes();

        match oid.as_str() {
            "1.2.840.113549.1.1.1" => Self::import_rsa_spki_bits(bits),
            "1.2.840.10040.4.1" => Self::import_dsa_spki(&info),
            "1.2.840.10045.2.1" => Self::import_ecdsa_spki(&info, bits),
            "1.3.101.112" => Self::import_ecc_raw(spki::EccRaw {
                curve: EccCurve::Secp256r1, // unused for EdDSA
                x: bits.to_vec(),
                y: None,
            }),
            _ => Err(Error::UnknownAlgorithm),
        }
    }

    fn import_rsa_spki_bits(bits: &[u8]) -> Result<Self, Error> {
        use der::asn1::Uint;
        use der::{Decode, Sequence};

        #[derive(Sequence)]
        struct RsaPublicKey {
            modulus: Uint,
            exponent: Uint,
        }
        let key = RsaPublicKey::from_der(bits).map_err(|_| Error::ParsingError)?;
        Self::import_rsa_raw(key.modulus.as_bytes(), key.exponent.as_bytes())
    }

    fn import_dsa_spki(info: &spki::SubjectPublicKeyInfoRef<'_>) -> Result<Self, Error> {
        use der::asn1::Uint;
        use der::{Decode, Sequence};

        #[derive(Sequence)]
        struct DsaParams {
            p: Uint,
            q: Uint,
            g: Uint,
        }
        let params_der = info
            .algorithm
            .parameters
            .as_ref()
            .ok_or(Error::ParsingError)?
            .to_der()
            .map_err(|_| Error::ParsingError)?;
        let params = DsaParams::from_der(&params_der).map_err(|_| Error::ParsingError)?;
        let y = Uint::from_der(info.subject_public_key.raw_bytes()).map_err(|_| Error::ParsingError)?;
        Self::import_dsa_raw(
            params.p.as_bytes(),
            params.q.as_bytes(),
            params.g.as_bytes(),
            y.as_bytes(),
        )
    }

    fn import_ecdsa_spki(info: &spki::SubjectPublicKeyInfoRef<'_>, bits: &[u8]) -> Result<Self, Error> {
        let curve_oid = info
            .algorithm
            .parameters
            .as_ref()
            .and_then(|p| p.decode_as::<der::asn1::ObjectIdentifier>().ok())
            .ok_or(Error::ParsingError)?
            .to_string();
        let curve = match curve_oid.as_str() {
            "1.2.840.10045.3.1.7" => EccCurve::Secp256r1,
            "1.3.132.0.34" => EccCurve::Secp384r1,
            "1.3.132.0.35" => EccCurve::Secp521r1,
            _ => return Err(Error::UnknownAlgorithm),
        };
        Self::import_ecc_raw(EccRaw {
            curve,
            x: bits.to_vec(),
            y: None,
        })
    }

    /// `import_privkey(priv, usage)`: derives public params from a private
    /// key (§4.E dispatch). Takes the PK params directly since deriving a
    /// public point from a private scalar is a math-layer concern this
    /// crate does not reimplement; [`crate::key::PrivateKey`] is expected to
    /// hold both when software-resident.
    #[must_use]
    pub fn import_privkey(params: PkParams, usage: KeyUsage) -> Self {
        Self::new(params, usage)
    }

    /// `import_rsa_raw(m, e)`.
    pub fn import_rsa_raw(m: &[u8], e: &[u8]) -> Result<Self, Error> {
        if m.is_empty() || e.is_empty() {
            return Err(Error::ConstraintError);
        }
        Ok(Self::new(
            PkParams::Rsa {
                modulus: m.to_vec(),
                exponent: e.to_vec(),
            },
            KeyUsage::default(),
        ))
    }

    /// `import_dsa_raw(p, q, g, y)`.
    pub fn import_dsa_raw(p: &[u8], q: &[u8], g: &[u8], y: &[u8]) -> Result<Self, Error> {
        if [p, q, g, y].iter().any(|v| v.is_empty()) {
            return Err(Error::ConstraintError);
        }
        Ok(Self::new(
            PkParams::Dsa {
                p: p.to_vec(),
                q: q.to_vec(),
                g: g.to_vec(),
                y: y.to_vec(),
            },
            KeyUsage::default(),
        ))
    }

    /// `import_ecc_raw(curve, x, [y])`. `y` is omitted for EdDSA, in which
    /// case `x` is the native curve encoding (the raw Ed25519 public point).
    pub fn import_ecc_raw(raw: EccRaw) -> Result<Self, Error> {
        match raw.y {
            Some(y) => Ok(Self::new(
                PkParams::Ecdsa {
                    curve: raw.curve,
                    point: spki::sec1_uncompressed_point(&raw.x, &y),
                },
                KeyUsage::default(),
            )),
            None if raw.x.len() == 32 => Ok(Self::new(
                PkParams::Ed25519 { point: raw.x },
                KeyUsage::default(),
            )),
            None => Ok(Self::new(
                PkParams::Ecdsa {
                    curve: raw.curve,
                    point: raw.x,
                },
                KeyUsage::default(),
            )),
        }
    }

    /// `import_gost_raw(curve, digest, paramset, x, y)`. `x`, `y` are
    /// little-endian, per the reference GOST raw-import contract.
    pub fn import_gost_raw(
        curve: EccCurve,
        digest: MacAlgorithm,
        paramset: u32,
        x: &[u8],
        y: &[u8],
    ) -> Result<Self, Error> {
        if x.is_empty() || y.is_empty() {
            return Err(Error::ConstraintError);
        }
        Ok(Self::new(
            PkParams::Gost {
                curve,
                digest,
                paramset,
                x: x.to_vec(),
                y: y.to_vec(),
            },
            KeyUsage::default(),
        ))
    }

    /// `import_ecc_x962(params_der, ecpoint_der)`: ANSI X9.62 encoded curve
    /// parameters plus an `OCTET STRING`-wrapped `ECPoint`.
    pub fn import_ecc_x962(params_der: &[u8], ecpoint_der: &[u8]) -> Result<Self, Error> {
        use der::asn1::{ObjectIdentifier, OctetString};
        use der::Decode;

        let oid = ObjectIdentifier::from_der(params_der).map_err(|_| Error::ParsingError)?;
        let curve = match oid.to_string().as_str() {
            "1.2.840.10045.3.1.7" => EccCurve::Secp256r1,
            "1.3.132.0.34" => EccCurve::Secp384r1,
            "1.3.132.0.35" => EccCurve::Secp521r1,
            _ => return Err(Error::UnknownAlgorithm),
        };
        let point = OctetString::from_der(ecpoint_der).map_err(|_| Error::ParsingError)?;
        Self::import_ecc_raw(EccRaw {
            curve,
            x: point.as_bytes().to_vec(),
            y: None,
        })
    }

    #[must_use]
    pub fn pk_algorithm(&self) -> PkAlgorithm {
        self.params.pk_algorithm()
    }

    #[must_use]
    pub fn params(&self) -> &PkParams {
        &self.params
    }

    #[must_use]
    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    /// Canonical SPKI DER encoding, used by both [`Self::export`] and
    /// [`Self::key_id`].
    fn to_spki_der(&self) -> Result<Vec<u8>, Error> {
        use der::asn1::{BitStringRef, ObjectIdentifier};
        use der::Encode;
        use spki::{AlgorithmIdentifier, SubjectPublicKeyInfo};

        match &self.params {
            PkParams::Rsa { modulus, exponent } => {
                let rsa_pub = encode_rsa_public_key(modulus, exponent);
                let alg = AlgorithmIdentifier::<der::Any> {
                    oid: ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1"),
                    parameters: Some(der::Any::from(der::asn1::Null)),
                };
                let info = SubjectPublicKeyInfo {
                    algorithm: alg,
                    subject_public_key: BitStringRef::from_bytes(&rsa_pub)
                        .map_err(|_| Error::MemoryError)?,
                };
                info.to_der().map_err(|_| Error::MemoryError)
            }
            PkParams::Ecdsa { curve, point } => {
                let curve_oid = match curve {
                    EccCurve::Secp256r1 => "1.2.840.10045.3.1.7",
                    EccCurve::Secp384r1 => "1.3.132.0.34",
                    EccCurve::Secp521r1 => "1.3.132.0.35",
                };
                let alg = AlgorithmIdentifier::<der::AnyRef<'_>> {
                    oid: ObjectIdentifier::new_unwrap("1.2.840.10045.2.1"),
                    parameters: Some(
                        der::AnyRef::try_from(
                            ObjectIdentifier::new_unwrap(curve_oid)
                                .to_der()
                                .map_err(|_| Error::MemoryError)?
                                .as_slice(),
                        )
                        .map_err(|_| Error::MemoryError)?,
                    ),
                };
                let info = SubjectPublicKeyInfo {
                    algorithm: alg,
                    subject_public_key: BitStringRef::from_bytes(point)
                        .map_err(|_| Error::MemoryError)?,
                };
                info.to_der().map_err(|_| Error::MemoryError)
            }
            PkParams::Ed25519 { point } => {
                let alg = AlgorithmIdentifier::<der::Any> {
                    oid: ObjectIdentifier::new_unwrap("1.3.101.112"),
                    parameters: None,
                };
                let info = SubjectPublicKeyInfo {
                    algorithm: alg,
                    subject_public_key: BitStringRef::from_bytes(point)
                        .map_err(|_| Error::MemoryError)?,
                };
                info.to_der().map_err(|_| Error::MemoryError)
            }
            PkParams::Dsa { .. } | PkParams::Gost { .. } => {
                // DSA/GOST SPKI export needs a parameters SEQUENCE this
                // crate does not yet construct; key-id still works off the
                // raw params hash below rather than the SPKI encoding.
                Err(Error::UnimplementedFeature)
            }
        }
    }

    /// `export(format, buf)` / `export2(format, &out)`: SubjectPublicKeyInfo
    /// as DER or PEM. PEM uses the RFC 7468 `PUBLIC KEY` header (see
    /// [`crate::spki::ExportFormat::Pem`] doc for why this differs from the
    /// reference implementation).
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, Error> {
        let der = self.to_spki_der()?;
        match format {
            ExportFormat::Der => Ok(der),
            ExportFormat::Pem => Ok(spki::der_to_pem(&der).into_bytes()),
        }
    }

    /// `key_id(flags, buf)`: hash over the canonical SPKI DER. Short-buffer
    /// behavior matches §4.A: a too-small `buf` leaves it untouched and
    /// returns `ShortMemoryBuffer { required }`.
    pub fn key_id(&self, flags: KeyIdFlags, buf: &mut [u8]) -> Result<usize, Error> {
        let mac = flags.mac_algorithm();
        let required = mac.len();
        if buf.len() < required {
            return Err(Error::short_buffer(required));
        }
        let der = match self.to_spki_der() {
            Ok(der) => der,
            Err(_) => raw_params_fallback(&self.params),
        };
        let digest = primitive::hash_fast(mac, &der);
        buf[..required].copy_from_slice(&digest);
        Ok(required)
    }

    /// `get_preferred_hash_algorithm`: per-PK-family canonical hash, plus
    /// whether the hash is `mandatory` (DSA, GOST, and PSS with a
    /// restricted hash always report `mandatory = true`).
    #[must_use]
    pub fn get_preferred_hash_algorithm(&self) -> (MacAlgorithm, bool) {
        match &self.params {
            PkParams::Rsa { modulus, .. } => (hash_for_bits(modulus.len() * 8), false),
            PkParams::Dsa { q, .. } => (dsa_hash_for_q_bits(q.len() * 8), true),
            PkParams::Ecdsa { curve, .. } => (hash_for_bits(curve.bits()), false),
            PkParams::Ed25519 { .. } => (MacAlgorithm::Sha512, false),
            PkParams::Gost { digest, .. } => (*digest, true),
        }
    }

    /// `verify_data2(algo, flags, data, sig)`.
    #[instrument(skip(self, data, sig))]
    pub fn verify_data2(
        &self,
        algo: MacAlgorithm,
        flags: VerifyFlags,
        data: &[u8],
        sig: &[u8],
    ) -> Result<(), Error> {
        let digest = primitive::hash_fast(algo, data);
        self.verify_hash2(algo, flags, &digest, sig)
    }

    /// `verify_hash2(algo, flags, hash, sig)`.
    #[instrument(skip(self, hash, sig))]
    pub fn verify_hash2(
        &self,
        algo: MacAlgorithm,
        flags: VerifyFlags,
        hash: &[u8],
        sig: &[u8],
    ) -> Result<(), Error> {
        if algo.is_broken() && !flags.allows_broken() {
            return Err(Error::InsufficientSecurity);
        }
        let (material, params) = self.verification_material(algo)?;
        primitive::pk_verify(hash, sig, &material, algo, params)
    }

    #[cfg(feature = "aws-lc")]
    fn verification_material(
        &self,
        algo: MacAlgorithm,
    ) -> Result<(PublicKeyMaterial, Option<primitive::PssParams>), Error> {
        match &self.params {
            PkParams::Rsa { .. } => {
                let spki_der = self.to_spki_der()?;
                let params = if self.spki.pk == PkAlgorithm::RsaPss {
                    Some(primitive::PssParams {
                        hash: self.spki.pss_hash.unwrap_or(algo),
                        salt_len: self.spki.pss_salt_len.unwrap_or(algo.len()),
                    })
                } else {
                    None
                };
                Ok((PublicKeyMaterial::Rsa { spki_der }, params))
            }
            PkParams::Ecdsa { curve, point } => Ok((
                PublicKeyMaterial::Ecdsa {
                    curve: *curve,
                    point: point.clone(),
                },
                None,
            )),
            PkParams::Ed25519 { point } => {
                Ok((PublicKeyMaterial::Ed25519 { point: point.clone() }, None))
            }
            PkParams::Dsa { .. } | PkParams::Gost { .. } => Err(Error::UnimplementedFeature),
        }
    }

    #[cfg(not(feature = "aws-lc"))]
    fn verification_material(
        &self,
        _algo: MacAlgorithm,
    ) -> Result<(PublicKeyMaterial, Option<primitive::PssParams>), Error> {
        Err(Error::UnimplementedFeature)
    }

    /// `compatible_with_sig`'s public-key half: PK-family and curve
    /// compatibility (the private-key half additionally consults external
    /// callback `info` and token PSS advertisement — see
    /// [`crate::key::PrivateKey::compatible_with_sig`]).
    #[must_use]
    pub fn pk_family_compatible(&self, sig_pk: PkAlgorithm, sig_curve: Option<EccCurve>) -> bool {
        match (self.pk_algorithm(), sig_pk) {
            (PkAlgorithm::Rsa, PkAlgorithm::Rsa | PkAlgorithm::RsaPss) => true,
            (PkAlgorithm::RsaPss, PkAlgorithm::RsaPss) => true,
            (PkAlgorithm::Ecdsa, PkAlgorithm::Ecdsa) => match (self.params(), sig_curve) {
                (PkParams::Ecdsa { curve, .. }, Some(c)) => *curve == c,
                (PkParams::Ecdsa { .. }, None) => true,
                _ => false,
            },
            (a, b) => a == b,
        }
    }
}

/// RFC 3279 §2.3.1 `RSAPublicKey ::= SEQUENCE { modulus INTEGER, exponent INTEGER }`.
fn encode_rsa_public_key(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    use der::asn1::Uint;
    use der::{Encode, Sequence};

    #[derive(Sequence)]
    struct RsaPublicKey {
        modulus: Uint,
        exponent: Uint,
    }
    let key = RsaPublicKey {
        modulus: Uint::new(modulus).unwrap_or_else(|_| Uint::new(&[0]).unwrap_or_default()),
        exponent: Uint::new(exponent).unwrap_or_else(|_| Uint::new(&[0]).unwrap_or_default()),
    };
    key.to_der().unwrap_or_default()
}

fn raw_params_fallback(params: &PkParams) -> Vec<u8> {
    match params {
        PkParams::Rsa { modulus, exponent } => {
            let mut out = modulus.clone();
            out.extend_from_slice(exponent);
            out
        }
        PkParams::Dsa { p, q, g, y } => {
            let mut out = p.clone();
            out.extend_from_slice(q);
            out.extend_from_slice(g);
            out.extend_from_slice(y);
            out
        }
        PkParams::Ecdsa { point, .. } => point.clone(),
        PkParams::Ed25519 { point } => point.clone(),
        PkParams::Gost { x, y, .. } => {
            let mut out = x.clone();
            out.extend_from_slice(y);
            out
        }
    }
}

/// RSA/ECDSA bit-size-to-hash ladder shared by [`PublicKey::get_preferred_hash_algorithm`].
fn hash_for_bits(bits: usize) -> MacAlgorithm {
    if bits <= 160 {
        MacAlgorithm::Sha1
    } else if bits <= 256 {
        MacAlgorithm::Sha256
    } else if bits <= 384 {
        MacAlgorithm::Sha384
    } else {
        MacAlgorithm::Sha512
    }
}

/// DSA q-size-to-hash table (§4.D): q ≤ 160 ⇒ SHA-1, q ≤ 192 ⇒ SHA-256
/// truncated (modeled here as full SHA-256; truncation is a wire-format
/// concern of the DSA signature encoder, out of this crate's scope), q ≤
/// 224/256 ⇒ SHA-256.
fn dsa_hash_for_q_bits(q_bits: usize) -> MacAlgorithm {
    if q_bits <= 160 {
        MacAlgorithm::Sha1
    } else {
        MacAlgorithm::Sha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_raw_import_rejects_empty_components() {
        assert!(matches!(
            PublicKey::import_rsa_raw(&[], &[1]),
            Err(Error::ConstraintError)
        ));
    }

    #[test]
    fn ed25519_raw_import_has_no_y() {
        let key = PublicKey::import_ecc_raw(EccRaw {
            curve: EccCurve::Secp256r1,
            x: vec![7u8; 32],
            y: None,
        })
        .expect("import");
        assert_eq!(key.pk_algorithm(), PkAlgorithm::Ed25519);
    }

    #[test]
    fn ecdsa_raw_import_builds_sec1_point() {
        let key = PublicKey::import_ecc_raw(EccRaw {
            curve: EccCurve::Secp256r1,
            x: vec![1u8; 32],
            y: Some(vec![2u8; 32]),
        })
        .expect("import");
        match key.params() {
            PkParams::Ecdsa { point, .. } => assert_eq!(point[0], 0x04),
            _ => panic!("expected ecdsa params"),
        }
    }

    #[test]
    fn preferred_hash_for_dsa_is_mandatory() {
        let key = PublicKey::import_dsa_raw(&[1; 128], &[1; 20], &[1; 128], &[1; 128])
            .expect("import");
        let (hash, mandatory) = key.get_preferred_hash_algorithm();
        assert_eq!(hash, MacAlgorithm::Sha1);
        assert!(mandatory);
    }

    #[test]
    fn key_id_short_buffer_leaves_buf_untouched_and_reports_required() {
        let key = PublicKey::import_ecc_raw(EccRaw {
            curve: EccCurve::Secp256r1,
            x: vec![9u8; 32],
            y: Some(vec![9u8; 32]),
        })
        .expect("import");
        let mut buf = [0xFFu8; 4];
        let err = key.key_id(KeyIdFlags::USE_SHA256, &mut buf).unwrap_err();
        assert!(matches!(err, Error::ShortMemoryBuffer { required: 32 }));
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn broken_mac_rejected_without_allow_broken() {
        let key = PublicKey::import_ecc_raw(EccRaw {
            curve: EccCurve::Secp256r1,
            x: vec![9u8; 32],
            y: Some(vec![9u8; 32]),
        })
        .expect("import");
        let err = key
            .verify_data2(MacAlgorithm::Sha1, VerifyFlags::NONE, b"hi", &[])
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientSecurity));
    }

    #[test]
    fn pk_family_compatible_allows_rsa_to_serve_pss() {
        let key = PublicKey::import_rsa_raw(&[1; 256], &[1, 0, 1]).expect("import");
        assert!(key.pk_family_compatible(PkAlgorithm::RsaPss, None));
        assert!(key.pk_family_compatible(PkAlgorithm::Rsa, None));
    }

    #[test]
    fn pk_family_compatible_enforces_curve_match() {
        let key = PublicKey::import_ecc_raw(EccRaw {
            curve: EccCurve::Secp256r1,
            x: vec![1u8; 32],
            y: Some(vec![1u8; 32]),
        })
        .expect("import");
        assert!(key.pk_family_compatible(PkAlgorithm::Ecdsa, Some(EccCurve::Secp256r1)));
        assert!(!key.pk_family_compatible(PkAlgorithm::Ecdsa, Some(EccCurve::Secp384r1)));
    }
}
