//! Placeholder references between bundle steps
//!
//! A later step can refer to the address of an earlier deploy step with a
//! string argument of the form `{stepName}.field`. Parsing is a small
//! hand-rolled grammar rather than a regex so malformed references fail
//! with a typed error instead of silently passing through.

use crate::error::BuildError;
use crate::registry::ContractRegistry;
use serde_json::Value;

/// A parsed `{stepName}.field` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub field: String,
}

impl Placeholder {
    /// Parse a placeholder literal.
    ///
    /// Grammar: `"{" name "}" "." field` where `name` and `field` are
    /// non-empty and contain no braces. Anything else is malformed.
    pub fn parse(literal: &str) -> Result<Self, BuildError> {
        let malformed = || BuildError::MalformedPlaceholder(literal.to_string());

        let rest = literal.strip_prefix('{').ok_or_else(malformed)?;
        let (name, rest) = rest.split_once('}').ok_or_else(malformed)?;
        let field = rest.strip_prefix('.').ok_or_else(malformed)?;

        if name.is_empty() || field.is_empty() {
            return Err(malformed());
        }
        if name.contains('{') || field.contains(['{', '}']) {
            return Err(malformed());
        }

        Ok(Self {
            name: name.to_string(),
            field: field.to_string(),
        })
    }
}

/// Resolve one argument against the registry.
///
/// Strings beginning with `{` are treated as placeholders and substituted;
/// every other value passes through untouched. Resolution is not recursive:
/// placeholders inside arrays or objects are left as-is.
pub fn resolve_argument(value: &Value, registry: &ContractRegistry) -> Result<Value, BuildError> {
    match value {
        Value::String(literal) if literal.starts_with('{') => {
            let placeholder = Placeholder::parse(literal)?;
            let resolved = registry.field(&placeholder)?;
            Ok(Value::String(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve a full argument list in order.
pub fn resolve_arguments(
    values: &[Value],
    registry: &ContractRegistry,
) -> Result<Vec<Value>, BuildError> {
    values
        .iter()
        .map(|value| resolve_argument(value, registry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use ethers::utils::to_checksum;
    use serde_json::json;

    fn registry_with(name: &str, address: Address) -> ContractRegistry {
        let mut registry = ContractRegistry::new();
        registry
            .register(name, address, serde_json::from_str("[]").unwrap())
            .unwrap();
        registry
    }

    #[test]
    fn test_parse_valid_placeholder() {
        let placeholder = Placeholder::parse("{MyToken}.address").unwrap();
        assert_eq!(placeholder.name, "MyToken");
        assert_eq!(placeholder.field, "address");
    }

    #[test]
    fn test_parse_rejects_malformed_literals() {
        for literal in [
            "{MyToken}",
            "{MyToken}address",
            "{MyToken.address",
            "{}.address",
            "{MyToken}.",
            "{My{Token}.address",
            "{MyToken}.add}ress",
            "MyToken.address",
        ] {
            let err = Placeholder::parse(literal).unwrap_err();
            assert!(
                matches!(err, BuildError::MalformedPlaceholder(ref l) if l == literal),
                "literal {:?} produced {:?}",
                literal,
                err
            );
        }
    }

    #[test]
    fn test_resolve_substitutes_address() {
        let address = Address::random();
        let registry = registry_with("Token", address);

        let resolved = resolve_argument(&json!("{Token}.address"), &registry).unwrap();
        assert_eq!(resolved, json!(to_checksum(&address, None)));
    }

    #[test]
    fn test_non_placeholders_pass_through() {
        let registry = ContractRegistry::new();
        for value in [json!("plain string"), json!(42), json!(true), json!(["{A}.address"])] {
            assert_eq!(resolve_argument(&value, &registry).unwrap(), value);
        }
    }

    #[test]
    fn test_unknown_reference_fails() {
        let registry = ContractRegistry::new();
        let err = resolve_argument(&json!("{Missing}.address"), &registry).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedReference(name) if name == "Missing"));
    }

    #[test]
    fn test_resolution_order_is_preserved() {
        let address = Address::random();
        let registry = registry_with("A", address);

        let resolved =
            resolve_arguments(&[json!(1), json!("{A}.address"), json!("x")], &registry).unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0], json!(1));
        assert_eq!(resolved[1], json!(to_checksum(&address, None)));
        assert_eq!(resolved[2], json!("x"));
    }
}
