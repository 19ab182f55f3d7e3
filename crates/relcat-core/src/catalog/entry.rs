//! Catalog entries and the statement-level descriptions that create, drop
//! and alter them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CatalogType;
use crate::dependency::{DependencyEdge, DependencyNode, ObjectIdentity};

/// Identity of the catalog that owns an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogId(u64);

impl CatalogId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A schema-visible object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub kind: CatalogType,
    /// Owning schema; for a schema entry its own name.
    pub schema: String,
    /// Internal/system objects never take part in the dependency graph.
    pub internal: bool,
    pub comment: Option<String>,
}

/// Closed set of things stored in a catalog set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    Object(ObjectEntry),
    DependencyEdge(DependencyEdge),
    DependencyNode(DependencyNode),
}

/// One immutable version of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    name: String,
    catalog: CatalogId,
    payload: EntryPayload,
}

impl CatalogEntry {
    /// Create a schema-scoped object entry.
    pub fn object(
        catalog: CatalogId,
        kind: CatalogType,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            catalog,
            payload: EntryPayload::Object(ObjectEntry {
                kind,
                schema: schema.into(),
                internal: false,
                comment: None,
            }),
        }
    }

    /// Create a schema entry.
    pub fn schema(catalog: CatalogId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::object(catalog, CatalogType::Schema, name.clone(), name)
    }

    pub(crate) fn edge(catalog: CatalogId, key: String, edge: DependencyEdge) -> Self {
        Self {
            name: key,
            catalog,
            payload: EntryPayload::DependencyEdge(edge),
        }
    }

    pub(crate) fn node(catalog: CatalogId, node: DependencyNode) -> Self {
        Self {
            name: node.mangled.as_str().to_string(),
            catalog,
            payload: EntryPayload::DependencyNode(node),
        }
    }

    /// Mark the entry as internal.
    pub fn with_internal(mut self, internal: bool) -> Self {
        if let EntryPayload::Object(object) = &mut self.payload {
            object.internal = internal;
        }
        self
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        if let EntryPayload::Object(object) = &mut self.payload {
            object.comment = comment;
        }
        self
    }

    /// The same entry under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut entry = self.clone();
        if let EntryPayload::Object(object) = &mut entry.payload {
            if object.kind == CatalogType::Schema {
                object.schema = name.clone();
            }
        }
        entry.name = name;
        entry
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog_id(&self) -> CatalogId {
        self.catalog
    }

    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }

    /// Type tag of the entry.
    pub fn kind(&self) -> CatalogType {
        match &self.payload {
            EntryPayload::Object(object) => object.kind,
            EntryPayload::DependencyEdge(_) => CatalogType::DependencyEntry,
            EntryPayload::DependencyNode(_) => CatalogType::DependencySet,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectEntry> {
        match &self.payload {
            EntryPayload::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&DependencyEdge> {
        match &self.payload {
            EntryPayload::DependencyEdge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&DependencyNode> {
        match &self.payload {
            EntryPayload::DependencyNode(node) => Some(node),
            _ => None,
        }
    }

    /// Whether the entry is flagged internal. Only objects can be.
    pub fn is_internal(&self) -> bool {
        self.as_object().is_some_and(|object| object.internal)
    }

    pub fn comment(&self) -> Option<&str> {
        self.as_object().and_then(|object| object.comment.as_deref())
    }

    /// Logical identity of an object entry; `None` for graph records.
    pub fn identity(&self) -> Option<ObjectIdentity> {
        self.as_object()
            .map(|object| ObjectIdentity::new(object.kind, object.schema.clone(), self.name.clone()))
    }
}

/// What to do when `create_entry` finds a live entry with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnCreateConflict {
    #[default]
    Error,
    /// Keep the existing entry and return it.
    Ignore,
    /// Drop the existing entry (without cascade) and create the new one.
    Replace,
}

/// Description of an entry to create.
#[derive(Debug, Clone)]
pub struct CreateInfo {
    pub kind: CatalogType,
    pub schema: String,
    pub name: String,
    pub internal: bool,
    pub comment: Option<String>,
    pub on_conflict: OnCreateConflict,
}

impl CreateInfo {
    pub fn new(kind: CatalogType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            schema: schema.into(),
            name: name.into(),
            internal: false,
            comment: None,
            on_conflict: OnCreateConflict::Error,
        }
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_on_conflict(mut self, on_conflict: OnCreateConflict) -> Self {
        self.on_conflict = on_conflict;
        self
    }

    pub fn identity(&self) -> ObjectIdentity {
        ObjectIdentity::new(self.kind, self.schema.clone(), self.name.clone())
    }
}

/// Description of an entry to drop.
#[derive(Debug, Clone)]
pub struct DropInfo {
    pub kind: CatalogType,
    pub schema: String,
    pub name: String,
    pub cascade: bool,
    pub if_exists: bool,
}

impl DropInfo {
    pub fn new(kind: CatalogType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            schema: schema.into(),
            name: name.into(),
            cascade: false,
            if_exists: false,
        }
    }

    /// Drop a schema.
    pub fn schema(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(CatalogType::Schema, name.clone(), name)
    }

    pub fn cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn if_exists(mut self, if_exists: bool) -> Self {
        self.if_exists = if_exists;
        self
    }
}

/// Alteration applied to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterAction {
    Rename(String),
    SetComment(Option<String>),
}

/// Description of an entry to alter.
#[derive(Debug, Clone)]
pub struct AlterInfo {
    pub kind: CatalogType,
    pub schema: String,
    pub name: String,
    pub action: AlterAction,
}

impl AlterInfo {
    pub fn new(
        kind: CatalogType,
        schema: impl Into<String>,
        name: impl Into<String>,
        action: AlterAction,
    ) -> Self {
        Self {
            kind,
            schema: schema.into(),
            name: name.into(),
            action,
        }
    }

    pub fn rename(
        kind: CatalogType,
        schema: impl Into<String>,
        name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::new(kind, schema, name, AlterAction::Rename(new_name.into()))
    }

    /// Apply the action to an entry version, producing the next version.
    pub fn apply(&self, entry: &CatalogEntry) -> CatalogEntry {
        match &self.action {
            AlterAction::Rename(new_name) => entry.renamed(new_name.clone()),
            AlterAction::SetComment(comment) => entry.clone().with_comment(comment.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_identity() {
        let entry = CatalogEntry::object(CatalogId::new(1), CatalogType::View, "main", "v");
        assert_eq!(
            entry.identity(),
            Some(ObjectIdentity::new(CatalogType::View, "main", "v"))
        );
        assert_eq!(entry.kind(), CatalogType::View);
        assert!(!entry.is_internal());
    }

    #[test]
    fn test_schema_rename_keeps_identity_shape() {
        let schema = CatalogEntry::schema(CatalogId::new(1), "old");
        let renamed = schema.renamed("new");
        assert_eq!(renamed.identity(), Some(ObjectIdentity::schema("new")));
    }

    #[test]
    fn test_alter_apply() {
        let entry = CatalogEntry::object(CatalogId::new(1), CatalogType::Table, "main", "t");
        let info = AlterInfo::new(
            CatalogType::Table,
            "main",
            "t",
            AlterAction::SetComment(Some("orders".to_string())),
        );
        let altered = info.apply(&entry);
        assert_eq!(altered.comment(), Some("orders"));
        assert_eq!(altered.name(), "t");
    }
}
