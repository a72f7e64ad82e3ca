//! Configuration (§10.4): PKCS#11 module path, default login/trust
//! policy, and the set of built-in extensions a session enables, loaded
//! either by hand via [`ConfigBuilder`] or from a JSON document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use keycore_error::Error;

/// PKCS#11 provider configuration. `pin` is never printed by `Debug` —
/// see the manual impl below.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct Pkcs11Config {
    pub module_path: Option<PathBuf>,
    /// Log in with [`Self::pin`] as soon as a session is opened, rather
    /// than lazily on the first `UserNotLoggedIn` retry.
    pub default_login: bool,
    /// Treat the loaded module as trusted (`InitLevel::Trusted` or above)
    /// rather than requiring a manual trust decision per session.
    pub trusted: bool,
    pin: Option<String>,
}

impl Pkcs11Config {
    #[must_use]
    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref()
    }
}

impl std::fmt::Debug for Pkcs11Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkcs11Config")
            .field("module_path", &self.module_path)
            .field("default_login", &self.default_login)
            .field("trusted", &self.trusted)
            .field("pin", &self.pin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Top-level configuration for one key/extension-registry instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub pkcs11: Pkcs11Config,
    /// Built-in extension type ids enabled for this session's built-in
    /// subset (§10.4: "a fixed subset"); absent here means "all of
    /// [`crate::ext::builtins`]".
    pub enabled_extensions: Vec<u16>,
}

impl Config {
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Parses a `Config` from a JSON document, e.g. loaded from a file.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::backend(format!("invalid config JSON: {e}")))
    }

    /// Serializes this `Config` to its JSON form.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::backend(format!("failed to serialize config: {e}")))
    }
}

/// Builder for [`Config`], matching the consuming, chainable style used
/// elsewhere for structured value construction.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pkcs11_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pkcs11.module_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn pkcs11_pin(mut self, pin: impl Into<String>) -> Self {
        self.config.pkcs11.pin = Some(pin.into());
        self
    }

    #[must_use]
    pub fn pkcs11_default_login(mut self, login: bool) -> Self {
        self.config.pkcs11.default_login = login;
        self
    }

    #[must_use]
    pub fn pkcs11_trusted(mut self, trusted: bool) -> Self {
        self.config.pkcs11.trusted = trusted;
        self
    }

    #[must_use]
    pub fn enabled_extension(mut self, ty: u16) -> Self {
        if !self.config.enabled_extensions.contains(&ty) {
            self.config.enabled_extensions.push(ty);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = Config::builder()
            .pkcs11_module_path("/usr/lib/softhsm/libsofthsm2.so")
            .pkcs11_pin("1234")
            .pkcs11_default_login(true)
            .enabled_extension(23)
            .enabled_extension(23) // duplicate, should not double up
            .build();
        assert_eq!(config.pkcs11.pin(), Some("1234"));
        assert!(config.pkcs11.default_login);
        assert_eq!(config.enabled_extensions, vec![23]);
    }

    #[test]
    fn debug_redacts_pin() {
        let config = Pkcs11Config {
            pin: Some("secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn json_roundtrip() {
        let config = Config::builder().pkcs11_module_path("/opt/lib.so").pkcs11_pin("000000").build();
        let json = config.to_json().expect("to_json");
        let parsed = Config::from_json(&json).expect("from_json");
        assert_eq!(parsed.pkcs11.pin(), Some("000000"));
        assert_eq!(parsed.pkcs11.module_path, config.pkcs11.module_path);
    }

    #[test]
    fn invalid_json_is_a_backend_error() {
        assert!(matches!(Config::from_json("not json"), Err(Error::Backend(_))));
    }
}
