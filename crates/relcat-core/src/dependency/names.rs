//! Canonical identity keys for dependency graph nodes.
//!
//! Key format: `type-tag \0 schema \0 name`. The same string is the registry
//! key of a node's dependency set and the stable node identifier stored in
//! edge records. Edge records themselves are keyed by `from \0 to`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogType;
use crate::error::Error;

const SEPARATOR: char = '\0';

/// Logical identity of a schema object: (type, schema, name).
///
/// For a schema the schema component is the schema's own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub kind: CatalogType,
    pub schema: String,
    pub name: String,
}

impl ObjectIdentity {
    /// Create an identity for a schema-scoped object.
    pub fn new(kind: CatalogType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Identity of a schema.
    pub fn schema(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: CatalogType::Schema,
            schema: name.clone(),
            name,
        }
    }

    /// Encode into the canonical key.
    pub fn mangle(&self) -> MangledName {
        MangledName::new(self.kind, &self.schema, &self.name)
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == CatalogType::Schema {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}.{}", self.kind, self.schema, self.name)
        }
    }
}

/// Canonical string key of an object identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MangledName(String);

impl MangledName {
    /// Mangle (type, schema, name) into a key.
    pub fn new(kind: CatalogType, schema: &str, name: &str) -> Self {
        Self(format!("{}{SEPARATOR}{schema}{SEPARATOR}{name}", kind.as_str()))
    }

    /// Wrap an already mangled key, e.g. one read back from the registry.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Registry key of the edge record from `from` to `to`.
    pub fn edge_key(from: &MangledName, to: &MangledName) -> String {
        format!("{}{SEPARATOR}{}", from.0, to.0)
    }

    /// Decode back into (type, schema, name).
    ///
    /// Fails unless the key has exactly three NUL-separated parts and a
    /// known type tag.
    pub fn unmangle(&self) -> Result<ObjectIdentity, Error> {
        let parts: Vec<&str> = self.0.split(SEPARATOR).collect();
        let [kind, schema, name] = parts.as_slice() else {
            return Err(Error::consistency(format!(
                "mangled name {:?} has {} parts, expected 3",
                self.0,
                parts.len()
            )));
        };
        Ok(ObjectIdentity {
            kind: kind.parse()?,
            schema: (*schema).to_string(),
            name: (*name).to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MangledName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // NULs are unreadable in logs
        f.write_str(&self.0.replace(SEPARATOR, "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_layout() {
        let mangled = ObjectIdentity::new(CatalogType::Table, "main", "users").mangle();
        assert_eq!(mangled.as_str(), "Table\0main\0users");
        assert_eq!(mangled.to_string(), "Table/main/users");
    }

    #[test]
    fn test_unmangle_recovers_identity() {
        let identities = [
            ObjectIdentity::new(CatalogType::Macro, "analytics", "add_one"),
            ObjectIdentity::new(CatalogType::Index, "main", "idx users.email"),
            ObjectIdentity::new(CatalogType::View, "", "v"),
            ObjectIdentity::schema("reporting"),
        ];
        for identity in identities {
            assert_eq!(identity.mangle().unmangle().unwrap(), identity);
        }
    }

    #[test]
    fn test_unmangle_rejects_malformed() {
        let too_few = MangledName::from_raw("Table\0users");
        assert!(matches!(too_few.unmangle(), Err(Error::Consistency(_))));

        let from = ObjectIdentity::new(CatalogType::Table, "main", "t").mangle();
        let to = ObjectIdentity::new(CatalogType::View, "main", "v").mangle();
        let edge = MangledName::from_raw(MangledName::edge_key(&from, &to));
        assert!(matches!(edge.unmangle(), Err(Error::Consistency(_))));

        let bad_tag = MangledName::from_raw("Widget\0main\0w");
        assert!(matches!(bad_tag.unmangle(), Err(Error::Consistency(_))));
    }

    #[test]
    fn test_prefix_is_not_identity() {
        let short = ObjectIdentity::new(CatalogType::Table, "main", "t").mangle();
        let long = ObjectIdentity::new(CatalogType::Table, "main", "t2").mangle();
        assert!(long.as_str().starts_with(short.as_str()));
        assert_ne!(short, long);
    }
}
