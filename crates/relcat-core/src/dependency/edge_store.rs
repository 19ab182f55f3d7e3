//! Edge records of one node inside a shared registry.

use super::names::{MangledName, ObjectIdentity};
use super::types::{DependencyEdge, DependencyType};
use crate::catalog::{CatalogEntry, CatalogId, CatalogSet};
use crate::error::Error;
use crate::transaction::Transaction;

/// View over the records of `node` in `registry`.
///
/// Records are keyed by `node \0 target`, so a prefix scan by the node's
/// key also matches nodes whose key merely starts with it (`t` and `t2`).
/// Scans re-check the stored `from` field to drop those.
pub struct DependencyEdgeStore<'a> {
    registry: &'a CatalogSet,
    node: MangledName,
    catalog: CatalogId,
}

impl<'a> DependencyEdgeStore<'a> {
    pub fn new(registry: &'a CatalogSet, node: MangledName, catalog: CatalogId) -> Self {
        Self {
            registry,
            node,
            catalog,
        }
    }

    fn key(&self, target: &ObjectIdentity) -> String {
        MangledName::edge_key(&self.node, &target.mangle())
    }

    /// Record an edge to `target`. Returns `false` if one already exists.
    pub fn create(
        &self,
        tx: &Transaction,
        target: &ObjectIdentity,
        dependency_type: DependencyType,
    ) -> Result<bool, Error> {
        let key = self.key(target);
        let edge = DependencyEdge {
            from: self.node.clone(),
            target: target.clone(),
            dependency_type,
        };
        self.registry
            .create_entry(tx, &key, CatalogEntry::edge(self.catalog, key.clone(), edge))
    }

    /// The edge to `target` visible to `tx`.
    pub fn get(&self, tx: &Transaction, target: &ObjectIdentity) -> Option<DependencyEdge> {
        self.registry
            .get_entry(tx, &self.key(target))
            .and_then(|entry| entry.as_edge().cloned())
    }

    /// Remove the edge to `target`. Returns `false` if there was none.
    pub fn drop(&self, tx: &Transaction, target: &ObjectIdentity) -> Result<bool, Error> {
        self.registry
            .drop_entry(tx, &self.key(target), true, |_| Ok(()))
    }

    /// Edges of this node visible to `tx`.
    ///
    /// The iterator works on a snapshot taken at call time; call again to
    /// restart.
    pub fn edges(&self, tx: &Transaction) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.registry
            .scan_with_prefix(tx, self.node.as_str())
            .into_iter()
            .filter_map(|entry| entry.as_edge().cloned())
            .filter(move |edge| edge.from == self.node)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::CatalogType;
    use crate::transaction::TransactionManager;

    fn identity(name: &str) -> ObjectIdentity {
        ObjectIdentity::new(CatalogType::Table, "main", name)
    }

    #[test]
    fn test_create_get_drop() {
        let manager = Arc::new(TransactionManager::new());
        let registry = CatalogSet::new("dependents");
        let store = DependencyEdgeStore::new(&registry, identity("t").mangle(), CatalogId::new(1));
        let tx = manager.begin();

        let view = ObjectIdentity::new(CatalogType::View, "main", "v");
        assert!(store.create(&tx, &view, DependencyType::Regular).unwrap());
        assert!(!store.create(&tx, &view, DependencyType::Regular).unwrap());

        let edge = store.get(&tx, &view).unwrap();
        assert_eq!(edge.from, identity("t").mangle());
        assert_eq!(edge.dependency_type, DependencyType::Regular);

        assert!(store.drop(&tx, &view).unwrap());
        assert!(store.get(&tx, &view).is_none());
        assert!(!store.drop(&tx, &view).unwrap());
    }

    #[test]
    fn test_scan_ignores_prefix_neighbours() {
        let manager = Arc::new(TransactionManager::new());
        let registry = CatalogSet::new("dependents");
        let t = DependencyEdgeStore::new(&registry, identity("t").mangle(), CatalogId::new(1));
        let t2 = DependencyEdgeStore::new(&registry, identity("t2").mangle(), CatalogId::new(1));
        let tx = manager.begin();

        t.create(&tx, &identity("a"), DependencyType::Regular).unwrap();
        t2.create(&tx, &identity("b"), DependencyType::Automatic).unwrap();

        let targets: Vec<String> = t.edges(&tx).map(|edge| edge.target.name).collect();
        assert_eq!(targets, vec!["a"]);
        // restartable
        assert_eq!(t.edges(&tx).count(), 1);
        assert_eq!(t2.edges(&tx).count(), 1);
    }
}
