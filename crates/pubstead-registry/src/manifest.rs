//! Manifest parsing.
//!
//! Only presence and type of `name` and `version` are checked here;
//! everything else in the document is carried through as raw text.

use serde_yaml::Value;

use crate::error::{RegistryError, RegistryResult};

/// Fields extracted from a package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub raw_text: String,
}

fn invalid(reason: impl Into<String>) -> RegistryError {
    RegistryError::ManifestInvalid {
        reason: reason.into(),
    }
}

fn required_string(document: &Value, field: &str) -> RegistryResult<String> {
    match document.get(field) {
        None | Some(Value::Null) => Err(invalid(format!("missing '{}' field", field))),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(invalid(format!("'{}' must not be empty", field)))
        }
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid(format!("'{}' must be a string", field))),
    }
}

/// Parse manifest bytes into name, version, and raw text.
pub fn parse_manifest(bytes: &[u8]) -> RegistryResult<Manifest> {
    let raw_text = std::str::from_utf8(bytes)
        .map_err(|e| invalid(format!("manifest is not UTF-8: {}", e)))?
        .to_string();

    let document: Value = serde_yaml::from_str(&raw_text)
        .map_err(|e| invalid(format!("manifest is not valid YAML: {}", e)))?;

    if !document.is_mapping() {
        return Err(invalid("manifest must be a mapping"));
    }

    let name = required_string(&document, "name")?;
    let version = required_string(&document, "version")?;

    Ok(Manifest {
        name,
        version,
        raw_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_manifest() {
        let text = "name: foo\nversion: 1.0.0\ndependencies:\n  http: ^0.13.0\n";
        let manifest = parse_manifest(text.as_bytes()).unwrap();
        assert_eq!(manifest.name, "foo");
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.raw_text, text);
    }

    #[test]
    fn test_quoted_version_is_a_string() {
        let manifest = parse_manifest(b"name: foo\nversion: \"2.0.0-dev.1\"\n").unwrap();
        assert_eq!(manifest.version, "2.0.0-dev.1");
    }

    #[test]
    fn test_numeric_version_is_rejected() {
        // YAML reads `1.0` as a float.
        let err = parse_manifest(b"name: foo\nversion: 1.0\n").unwrap_err();
        match err {
            RegistryError::ManifestInvalid { reason } => {
                assert!(reason.contains("'version' must be a string"))
            }
            other => panic!("expected ManifestInvalid, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_name() {
        let err = parse_manifest(b"version: 1.0.0\n").unwrap_err();
        assert!(matches!(err, RegistryError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_not_a_mapping() {
        let err = parse_manifest(b"- name\n- version\n").unwrap_err();
        assert!(matches!(err, RegistryError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_unparseable_yaml() {
        let err = parse_manifest(b"name: [unterminated\n").unwrap_err();
        assert!(matches!(err, RegistryError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_non_utf8() {
        let err = parse_manifest(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, RegistryError::ManifestInvalid { .. }));
    }
}
