//! Per-node dependency sets and the registries backing them.

use super::edge_store::DependencyEdgeStore;
use super::names::ObjectIdentity;
use super::types::{DependencyEdge, DependencyNode, DependencyType};
use crate::catalog::{CatalogEntry, CatalogId, CatalogSet};
use crate::error::Error;
use crate::transaction::{Transaction, TransactionManager};

/// Storage of the dependency graph of one catalog.
///
/// `nodes` holds one marker per node that has a set. Edge records of both
/// roles live in `dependents` and `dependencies`, keyed by
/// `node \0 other`.
#[derive(Debug)]
pub struct DependencyRegistry {
    catalog: CatalogId,
    nodes: CatalogSet,
    dependents: CatalogSet,
    dependencies: CatalogSet,
}

impl DependencyRegistry {
    pub fn new(catalog: CatalogId) -> Self {
        Self {
            catalog,
            nodes: CatalogSet::new("dependency_nodes"),
            dependents: CatalogSet::new("dependents"),
            dependencies: CatalogSet::new("dependencies"),
        }
    }

    /// Set of `identity`, whether or not its node exists.
    pub fn set_for(&self, identity: &ObjectIdentity) -> DependencySet<'_> {
        let node = identity.mangle();
        DependencySet {
            dependents: DependencyEdgeStore::new(&self.dependents, node.clone(), self.catalog),
            dependencies: DependencyEdgeStore::new(&self.dependencies, node, self.catalog),
        }
    }

    /// Set of `identity` if its node is visible to `tx`.
    pub fn get_set(&self, tx: &Transaction, identity: &ObjectIdentity) -> Option<DependencySet<'_>> {
        self.nodes
            .get_entry(tx, identity.mangle().as_str())
            .map(|_| self.set_for(identity))
    }

    /// Set of `identity`, creating its node first if needed.
    pub fn get_or_create_set(&self, tx: &Transaction, identity: &ObjectIdentity) -> Result<DependencySet<'_>, Error> {
        let node = identity.mangle();
        if self.nodes.get_entry(tx, node.as_str()).is_none() {
            let entry = CatalogEntry::node(self.catalog, DependencyNode { mangled: node.clone() });
            self.nodes.create_entry(tx, node.as_str(), entry)?;
        }
        Ok(self.set_for(identity))
    }

    /// Drop the node marker of `identity`.
    pub fn drop_set(&self, tx: &Transaction, identity: &ObjectIdentity) -> Result<bool, Error> {
        self.nodes
            .drop_entry(tx, identity.mangle().as_str(), true, |_| Ok(()))
    }

    /// Identities of every node visible to `tx`.
    pub fn nodes(&self, tx: &Transaction) -> Result<Vec<ObjectIdentity>, Error> {
        self.nodes
            .scan(tx)
            .iter()
            .filter_map(|entry| entry.as_node())
            .map(DependencyNode::identity)
            .collect()
    }

    pub fn vacuum(&self, manager: &TransactionManager) -> usize {
        self.nodes.vacuum(manager) + self.dependents.vacuum(manager) + self.dependencies.vacuum(manager)
    }
}

/// The two edge collections of one node.
///
/// `dependents` lists what depends on the node, `dependencies` what the
/// node depends on.
pub struct DependencySet<'a> {
    dependents: DependencyEdgeStore<'a>,
    dependencies: DependencyEdgeStore<'a>,
}

impl<'a> DependencySet<'a> {
    pub fn dependents(&self) -> &DependencyEdgeStore<'a> {
        &self.dependents
    }

    pub fn dependencies(&self) -> &DependencyEdgeStore<'a> {
        &self.dependencies
    }

    pub fn add_dependent(
        &self,
        tx: &Transaction,
        dependent: &ObjectIdentity,
        dependency_type: DependencyType,
    ) -> Result<bool, Error> {
        self.dependents.create(tx, dependent, dependency_type)
    }

    pub fn add_dependency(
        &self,
        tx: &Transaction,
        dependency: &ObjectIdentity,
        dependency_type: DependencyType,
    ) -> Result<bool, Error> {
        self.dependencies.create(tx, dependency, dependency_type)
    }

    pub fn dependent(&self, tx: &Transaction, dependent: &ObjectIdentity) -> Option<DependencyEdge> {
        self.dependents.get(tx, dependent)
    }

    pub fn dependent_edges(&self, tx: &Transaction) -> Vec<DependencyEdge> {
        self.dependents.edges(tx).collect()
    }

    pub fn dependency_edges(&self, tx: &Transaction) -> Vec<DependencyEdge> {
        self.dependencies.edges(tx).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::CatalogType;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let manager = Arc::new(TransactionManager::new());
        let registry = DependencyRegistry::new(CatalogId::new(1));
        let table = ObjectIdentity::new(CatalogType::Table, "main", "t");
        let tx = manager.begin();

        assert!(registry.get_set(&tx, &table).is_none());
        registry.get_or_create_set(&tx, &table).unwrap();
        registry.get_or_create_set(&tx, &table).unwrap();
        assert!(registry.get_set(&tx, &table).is_some());
        assert_eq!(registry.nodes(&tx).unwrap(), vec![table.clone()]);

        assert!(registry.drop_set(&tx, &table).unwrap());
        assert!(registry.get_set(&tx, &table).is_none());
    }

    #[test]
    fn test_roles_are_separate() {
        let manager = Arc::new(TransactionManager::new());
        let registry = DependencyRegistry::new(CatalogId::new(1));
        let table = ObjectIdentity::new(CatalogType::Table, "main", "t");
        let view = ObjectIdentity::new(CatalogType::View, "main", "v");
        let tx = manager.begin();

        let set = registry.get_or_create_set(&tx, &table).unwrap();
        set.add_dependent(&tx, &view, DependencyType::Regular).unwrap();
        assert_eq!(set.dependent_edges(&tx).len(), 1);
        assert!(set.dependency_edges(&tx).is_empty());
    }

    #[test]
    fn test_add_dependent_keeps_existing_type() {
        let manager = Arc::new(TransactionManager::new());
        let registry = DependencyRegistry::new(CatalogId::new(1));
        let sequence = ObjectIdentity::new(CatalogType::Sequence, "main", "s");
        let table = ObjectIdentity::new(CatalogType::Table, "main", "t");
        let tx = manager.begin();

        let set = registry.get_or_create_set(&tx, &sequence).unwrap();
        assert!(set.add_dependent(&tx, &table, DependencyType::Regular).unwrap());
        assert!(!set.add_dependent(&tx, &table, DependencyType::OwnedBy).unwrap());
        assert_eq!(
            set.dependent(&tx, &table).unwrap().dependency_type,
            DependencyType::Regular
        );
        assert_eq!(set.dependent_edges(&tx).len(), 1);
    }
}
