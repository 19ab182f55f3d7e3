//! Dependency edge types and records.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::names::{MangledName, ObjectIdentity};
use crate::catalog::CatalogEntry;
use crate::error::Error;

/// Kind of relationship carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    /// Ordinary reference; dropping the referent needs CASCADE.
    Regular,
    /// Implicit dependency, e.g. an index on its table; dropped silently.
    Automatic,
    /// Forward half of an ownership pair: the owner's view of what it owns.
    Owns,
    /// Reverse half of an ownership pair: the owned object's view of its owner.
    OwnedBy,
}

/// What a drop does with one dependent edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropAction {
    /// Fail the drop.
    Block,
    /// Drop the dependent as well.
    Drop,
    /// Keep the dependent, only remove the edge.
    Detach,
}

impl DependencyType {
    /// Decide how a dependent linked through this edge type reacts to a drop.
    pub fn on_drop(self, cascade: bool) -> DropAction {
        match self {
            DependencyType::Automatic | DependencyType::Owns => DropAction::Drop,
            DependencyType::Regular if cascade => DropAction::Drop,
            // an owner is never dropped on behalf of what it owns
            DependencyType::OwnedBy if cascade => DropAction::Detach,
            DependencyType::Regular | DependencyType::OwnedBy => DropAction::Block,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Regular => "regular",
            DependencyType::Automatic => "automatic",
            DependencyType::Owns => "owns",
            DependencyType::OwnedBy => "owned_by",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge record, stored under the owning node's mangled name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Mangled name of the node whose collection holds this record.
    pub from: MangledName,
    /// The other endpoint.
    pub target: ObjectIdentity,
    pub dependency_type: DependencyType,
}

/// Marker entry of a node's dependency set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub mangled: MangledName,
}

impl DependencyNode {
    /// Identity of the object this node stands for.
    pub fn identity(&self) -> Result<ObjectIdentity, Error> {
        self.mangled.unmangle()
    }
}

/// A resolved target together with the edge type it should be linked with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub identity: ObjectIdentity,
    pub dependency_type: DependencyType,
}

impl Dependency {
    pub fn new(identity: ObjectIdentity, dependency_type: DependencyType) -> Self {
        Self {
            identity,
            dependency_type,
        }
    }
}

/// Objects a new entry depends on, as selected by the binder.
///
/// Insertion ordered and de-duplicated by identity.
#[derive(Debug, Clone, Default)]
pub struct DependencyList {
    entries: Vec<Arc<CatalogEntry>>,
}

impl DependencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency; returns false if an entry with the same identity is
    /// already present.
    pub fn add(&mut self, entry: Arc<CatalogEntry>) -> bool {
        let identity = entry.identity();
        if identity.is_some() && self.entries.iter().any(|e| e.identity() == identity) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Builder form of [`DependencyList::add`].
    pub fn with(mut self, entry: Arc<CatalogEntry>) -> Self {
        self.add(entry);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CatalogEntry>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this identity is listed.
    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        self.entries
            .iter()
            .any(|e| e.identity().as_ref() == Some(identity))
    }
}

impl FromIterator<Arc<CatalogEntry>> for DependencyList {
    fn from_iter<I: IntoIterator<Item = Arc<CatalogEntry>>>(iter: I) -> Self {
        let mut list = DependencyList::new();
        for entry in iter {
            list.add(entry);
        }
        list
    }
}

/// One row of the relationships view: `dependent` depends on `object`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub object: ObjectIdentity,
    pub dependent: ObjectIdentity,
    pub dependency_type: DependencyType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogId, CatalogType};

    #[test]
    fn test_drop_decision_table() {
        use DependencyType::*;
        use DropAction::*;

        assert_eq!(Regular.on_drop(false), Block);
        assert_eq!(Regular.on_drop(true), Drop);
        assert_eq!(Automatic.on_drop(false), Drop);
        assert_eq!(Owns.on_drop(false), Drop);
        assert_eq!(OwnedBy.on_drop(false), Block);
        assert_eq!(OwnedBy.on_drop(true), Detach);
    }

    #[test]
    fn test_dependency_list_dedup() {
        let catalog = CatalogId::new(1);
        let table = Arc::new(CatalogEntry::object(catalog, CatalogType::Table, "main", "t"));
        let same = Arc::new(CatalogEntry::object(catalog, CatalogType::Table, "main", "t"));
        let view = Arc::new(CatalogEntry::object(catalog, CatalogType::View, "main", "t"));

        let mut list = DependencyList::new();
        assert!(list.add(table));
        assert!(!list.add(same));
        assert!(list.add(view));
        assert_eq!(list.len(), 2);
        assert!(list.contains(&ObjectIdentity::new(CatalogType::View, "main", "t")));
    }
}
