//! RFC 7512 `pkcs11:` URI parsing, the form [`super::Pkcs11Provider::open_session`]
//! takes its slot and object selectors from.

use keycore_error::Error;

/// The path- and query-component attributes a `pkcs11:` URI may carry.
/// Fields absent from the URI are `None`, letting [`super::Pkcs11Provider::open_session`]
/// fall back to "any slot"/"prompt for PIN" behavior.
#[derive(Debug, Clone, Default)]
pub struct Pkcs11Uri {
    pub token: Option<String>,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub object: Option<String>,
    pub id: Option<Vec<u8>>,
    pub pin_value: Option<String>,
    pub module_path: Option<String>,
}

impl Pkcs11Uri {
    /// `is_object`: true when either an `id=` or `object=` selector is
    /// present, per §6's external-interfaces definition.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.id.is_some() || self.object.is_some()
    }
}

/// Parses a `pkcs11:path-attrs[?query-attrs]` URI. RFC 7512's attribute
/// syntax isn't a generic URI, so this splits the semicolon-delimited path
/// attributes and `&`-delimited query attributes itself and percent-decodes
/// each value with [`percent_decode`].
pub fn parse(uri: &str) -> Result<Pkcs11Uri, Error> {
    let rest = uri.strip_prefix("pkcs11:").ok_or(Error::ParsingError)?;
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    let mut out = Pkcs11Uri::default();
    for attr in path_part.split(';').filter(|s| !s.is_empty()) {
        let (key, value) = attr.split_once('=').ok_or(Error::ParsingError)?;
        let value = percent_decode(value)?;
        match key {
            "token" => out.token = Some(value),
            "serial" => out.serial = Some(value),
            "manufacturer" => out.manufacturer = Some(value),
            "model" => out.model = Some(value),
            "object" => out.object = Some(value),
            "id" => out.id = Some(value.into_bytes()),
            _ => {}
        }
    }
    if let Some(query) = query_part {
        for attr in query.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = attr.split_once('=').ok_or(Error::ParsingError)?;
            let value = percent_decode(value)?;
            match key {
                "pin-value" => out.pin_value = Some(value),
                "module-path" => out.module_path = Some(value),
                _ => {}
            }
        }
    }
    Ok(out)
}

fn percent_decode(s: &str) -> Result<String, Error> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(Error::ParsingError)?;
            let hex = std::str::from_utf8(hex).map_err(|_| Error::ParsingError)?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| Error::ParsingError)?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::ParsingError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_and_id_attributes() {
        let uri = "pkcs11:token=My%20Token;id=%01%02?pin-value=1234";
        let parsed = parse(uri).expect("parse");
        assert_eq!(parsed.token.as_deref(), Some("My Token"));
        assert_eq!(parsed.id, Some(vec![0x01, 0x02]));
        assert_eq!(parsed.pin_value.as_deref(), Some("1234"));
        assert!(parsed.is_object());
    }

    #[test]
    fn rejects_non_pkcs11_scheme() {
        assert!(matches!(parse("tpmkey:object=x"), Err(Error::ParsingError)));
    }

    #[test]
    fn object_without_selectors_is_not_an_object_uri() {
        let parsed = parse("pkcs11:token=Foo").expect("parse");
        assert!(!parsed.is_object());
    }
}
