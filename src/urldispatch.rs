//! URL Dispatch (component F): turns a scheme-prefixed URI into a concrete
//! key or certificate by routing it to whichever backend claims the
//! scheme, custom registrations first.
//!
//! Parsing the bytes a backend returns (X.509, TPM key blobs) is out of
//! this crate's scope; a backend here is just the thing that knows how to
//! fetch *raw* key/certificate material for its scheme; import of the
//! abstract [`PrivateKey`](crate::key::PrivateKey) this crate owns is a
//! further step the caller drives with [`crate::key::PrivateKey::import_x509`]
//! or [`crate::key::PrivateKey::import_external`] et al.

use std::sync::{Arc, OnceLock, RwLock};

use keycore_error::Error;
use url::Url;

/// Bound on custom scheme registrations (§4.F).
pub const MAX_CUSTOM_URLS: usize = 8;

/// Raw material a backend resolved a URL to.
#[derive(Debug, Clone)]
pub enum ImportedObject {
    /// DER-encoded private key material, in whatever form the backend's
    /// scheme natively returns it (PKCS#8, a raw token-resident reference
    /// blob, ...).
    PrivateKey(Vec<u8>),
    /// A DER-encoded certificate.
    Certificate(Vec<u8>),
}

/// A pluggable handler for one URL scheme. Registered either by prefix
/// (custom schemes) or supplied per call for the three built-ins (§4.F).
pub trait UrlLoader: Send + Sync {
    fn import(&self, url: &Url) -> Result<ImportedObject, Error>;

    /// Whether this backend can actually resolve `url` right now — may
    /// probe live state (a loaded PKCS#11 module, a reachable system
    /// keystore), unlike the cheap scheme-registered check `is_known`
    /// performs.
    fn is_supported(&self, url: &Url) -> bool {
        let _ = url;
        true
    }

    /// Fetches the issuer certificate for `cert` from the same token or
    /// store the backend resolved it from.
    fn get_raw_issuer(&self, _cert: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::UnimplementedFeature)
    }
}

struct Registration {
    scheme: String,
    loader: Arc<dyn UrlLoader>,
}

static CUSTOM: OnceLock<RwLock<Vec<Registration>>> = OnceLock::new();

fn custom() -> &'static RwLock<Vec<Registration>> {
    CUSTOM.get_or_init(|| RwLock::new(Vec::new()))
}

/// Registers a loader for `scheme` (the part of a URL before `:`, without
/// the colon). Fails with [`Error::InvalidRequest`] if the scheme is
/// already taken and `override_existing` is false, or [`Error::MemoryError`]
/// past [`MAX_CUSTOM_URLS`] (§4.F: "not thread-safe and bounded" — the lock
/// here is purely to satisfy `Sync`, not a concurrency guarantee callers
/// should rely on for registration ordering).
pub fn register_scheme(scheme: impl Into<String>, loader: Arc<dyn UrlLoader>, override_existing: bool) -> Result<(), Error> {
    let scheme = scheme.into();
    let mut table = custom().write().map_err(|_| Error::LockingError)?;
    if let Some(existing) = table.iter_mut().find(|r| r.scheme == scheme) {
        if !override_existing {
            return Err(Error::InvalidRequest);
        }
        existing.loader = loader;
        return Ok(());
    }
    if table.len() >= MAX_CUSTOM_URLS {
        return Err(Error::MemoryError);
    }
    table.push(Registration { scheme, loader });
    Ok(())
}

/// Built-in scheme backends, supplied per call since none of `pkcs11:`,
/// `tpmkey:`, or `system:` is something this crate can resolve on its own
/// (PKCS#11 session plumbing lives one layer up, at the caller who also
/// owns the provider; TPM and system-keystore access are platform-specific
/// and out of scope here, §4.F).
#[derive(Default)]
pub struct Backends {
    pub pkcs11: Option<Arc<dyn UrlLoader>>,
    pub tpmkey: Option<Arc<dyn UrlLoader>>,
    pub system: Option<Arc<dyn UrlLoader>>,
}

impl Backends {
    fn builtin_for(&self, scheme: &str) -> Option<&Arc<dyn UrlLoader>> {
        match scheme {
            "pkcs11" => self.pkcs11.as_ref(),
            "tpmkey" => self.tpmkey.as_ref(),
            "system" => self.system.as_ref(),
            _ => None,
        }
    }
}

fn is_builtin_scheme(scheme: &str) -> bool {
    matches!(scheme, "pkcs11" | "tpmkey" | "system")
}

fn parse(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|_| Error::ParsingError)
}

fn lookup_custom(scheme: &str) -> Option<Arc<dyn UrlLoader>> {
    custom().read().ok()?.iter().find(|r| r.scheme == scheme).map(|r| r.loader.clone())
}

/// `import_url(url, backends)` (§4.F): custom registry first, then the
/// three built-in schemes, each routed to whatever backend the caller
/// supplied for it.
pub fn import_url(url: &str, backends: &Backends) -> Result<ImportedObject, Error> {
    let parsed = parse(url)?;
    let scheme = parsed.scheme();

    if let Some(loader) = lookup_custom(scheme) {
        return loader.import(&parsed);
    }
    if is_builtin_scheme(scheme) {
        return backends.builtin_for(scheme).ok_or(Error::UnimplementedFeature)?.import(&parsed);
    }
    Err(Error::InvalidRequest)
}

/// `is_known(url)`: cheap, total check of whether `url`'s scheme is
/// registered at all (custom or built-in), without asking any backend to
/// actually resolve it. Used by credential-loading helpers to decide
/// whether a string is a URL versus a bare file path.
#[must_use]
pub fn is_known(url: &str) -> bool {
    let Ok(parsed) = parse(url) else {
        return false;
    };
    let scheme = parsed.scheme();
    is_builtin_scheme(scheme) || lookup_custom(scheme).is_some()
}

/// `is_supported(url, backends)`: `is_known` plus, for a built-in scheme
/// with a backend supplied, asking that backend whether it can actually
/// resolve this specific URL right now.
#[must_use]
pub fn is_supported(url: &str, backends: &Backends) -> bool {
    let Ok(parsed) = parse(url) else {
        return false;
    };
    let scheme = parsed.scheme();

    if let Some(loader) = lookup_custom(scheme) {
        return loader.is_supported(&parsed);
    }
    if is_builtin_scheme(scheme) {
        return backends.builtin_for(scheme).is_some_and(|loader| loader.is_supported(&parsed));
    }
    false
}

/// `get_raw_issuer(url, cert, backends)`: delegates to whichever backend
/// resolved `url`.
pub fn get_raw_issuer(url: &str, cert: &[u8], backends: &Backends) -> Result<Vec<u8>, Error> {
    let parsed = parse(url)?;
    let scheme = parsed.scheme();

    if let Some(loader) = lookup_custom(scheme) {
        return loader.get_raw_issuer(cert);
    }
    if is_builtin_scheme(scheme) {
        return backends.builtin_for(scheme).ok_or(Error::UnimplementedFeature)?.get_raw_issuer(cert);
    }
    Err(Error::InvalidRequest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLoader(Vec<u8>);
    impl UrlLoader for FixedLoader {
        fn import(&self, _url: &Url) -> Result<ImportedObject, Error> {
            Ok(ImportedObject::Certificate(self.0.clone()))
        }
    }

    struct CountingLoader(AtomicUsize);
    impl UrlLoader for CountingLoader {
        fn import(&self, _url: &Url) -> Result<ImportedObject, Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ImportedObject::Certificate(vec![]))
        }
    }

    #[test]
    fn unrecognized_scheme_is_invalid_request() {
        let backends = Backends::default();
        assert!(matches!(import_url("ldap://host/path", &backends), Err(Error::InvalidRequest)));
    }

    #[test]
    fn builtin_scheme_without_backend_is_unimplemented() {
        let backends = Backends::default();
        assert!(matches!(import_url("pkcs11:token=foo", &backends), Err(Error::UnimplementedFeature)));
    }

    #[test]
    fn builtin_scheme_with_backend_delegates() {
        let mut backends = Backends::default();
        backends.system = Some(Arc::new(FixedLoader(vec![1, 2, 3])));
        let result = import_url("system:my-cert", &backends).expect("import");
        assert!(matches!(result, ImportedObject::Certificate(bytes) if bytes == vec![1, 2, 3]));
    }

    #[test]
    fn custom_scheme_is_scanned_before_builtins() {
        let loader: Arc<dyn UrlLoader> = Arc::new(CountingLoader(AtomicUsize::new(0)));
        register_scheme("myscheme-a", loader.clone(), true).expect("register");
        let backends = Backends::default();
        import_url("myscheme-a:thing", &backends).expect("import");
        assert!(matches!(
            register_scheme("myscheme-a", loader, false),
            Err(Error::InvalidRequest)
        ));
    }

    #[test]
    fn is_known_is_cheap_and_total() {
        assert!(is_known("pkcs11:token=foo"));
        assert!(!is_known("ldap://host/path"));
    }

    #[test]
    fn is_supported_checks_backend_probe() {
        struct Unsupported;
        impl UrlLoader for Unsupported {
            fn import(&self, _url: &Url) -> Result<ImportedObject, Error> {
                Ok(ImportedObject::Certificate(vec![]))
            }
            fn is_supported(&self, _url: &Url) -> bool {
                false
            }
        }
        let mut backends = Backends::default();
        backends.system = Some(Arc::new(Unsupported));
        assert!(!is_supported("system:my-cert", &backends));
        assert!(is_known("system:my-cert"));
    }
}
