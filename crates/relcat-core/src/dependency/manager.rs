//! Dependency rules for create, drop, alter and ownership.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use super::names::ObjectIdentity;
use super::resolver::{IdentityResolver, LookupResult};
use super::set::DependencyRegistry;
use super::types::{Dependency, DependencyEdge, DependencyList, DependencyType, DropAction, Relationship};
use crate::catalog::{Catalog, CatalogEntry, CatalogType};
use crate::error::{DependencyError, Error, OwnershipError};
use crate::transaction::Transaction;

/// Entries that never take part in the dependency graph.
pub fn is_system_entry(entry: &CatalogEntry) -> bool {
    entry.is_internal()
        || matches!(
            entry.kind(),
            CatalogType::DependencyEntry | CatalogType::DependencySet | CatalogType::Database
        )
}

/// Maintains the dependency graph of a catalog.
///
/// Every mutating operation runs under the catalog write lock. Endpoints
/// are stored as identities and resolved again on each use.
pub struct DependencyManager<'a> {
    catalog: &'a Catalog,
}

impl<'a> DependencyManager<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    fn registry(&self) -> &'a DependencyRegistry {
        self.catalog.registry()
    }

    fn resolver(&self) -> IdentityResolver<'a> {
        IdentityResolver::new(self.catalog)
    }

    /// Register `object` as depending on every entry of `dependencies`.
    ///
    /// Indexes depend on their table automatically, everything else
    /// regularly.
    pub fn add_object(
        &self,
        tx: &Transaction,
        object: &CatalogEntry,
        dependencies: &DependencyList,
    ) -> Result<(), Error> {
        if is_system_entry(object) {
            return Ok(());
        }
        let _guard = self.catalog.write_lock().acquire();
        let object_id = identity_of(object)?;
        let dependency_type = if object.kind() == CatalogType::Index {
            DependencyType::Automatic
        } else {
            DependencyType::Regular
        };

        let mut resolved = Vec::with_capacity(dependencies.len());
        for dependency in dependencies.iter() {
            if dependency.catalog_id() != object.catalog_id() {
                return Err(DependencyError::CrossCatalog {
                    object: object.name().to_string(),
                    dependency: dependency.name().to_string(),
                    object_catalog: object.catalog_id().to_string(),
                    dependency_catalog: dependency.catalog_id().to_string(),
                }
                .into());
            }
            if is_system_entry(dependency) {
                continue;
            }
            let dependency_id = identity_of(dependency)?;
            if self.resolver().resolve(tx, &dependency_id)?.entry.is_none() {
                return Err(Error::consistency(format!(
                    "dependency {dependency_id} of {object_id} has already been deleted"
                )));
            }
            resolved.push(Dependency::new(dependency_id, dependency_type));
        }

        for dependency in &resolved {
            self.registry()
                .get_or_create_set(tx, &dependency.identity)?
                .add_dependent(tx, &object_id, dependency.dependency_type)?;
        }
        let object_set = self.registry().get_or_create_set(tx, &object_id)?;
        for dependency in &resolved {
            object_set.add_dependency(tx, &dependency.identity, dependency.dependency_type)?;
        }

        debug!(object = %object_id, dependencies = resolved.len(), "object registered");
        Ok(())
    }

    /// Apply drop rules to the dependents of `object`, which the caller has
    /// already marked deleted in `tx`, then remove its node.
    pub fn drop_object(&self, tx: &Transaction, object: &CatalogEntry, cascade: bool) -> Result<(), Error> {
        self.drop_object_at(tx, object, cascade, 0)
    }

    #[instrument(skip(self, tx, object), fields(txid = tx.id(), object = %object.name()))]
    pub(crate) fn drop_object_at(
        &self,
        tx: &Transaction,
        object: &CatalogEntry,
        cascade: bool,
        depth: usize,
    ) -> Result<(), Error> {
        if is_system_entry(object) {
            return Ok(());
        }
        let _guard = self.catalog.write_lock().acquire();
        let object_id = identity_of(object)?;
        let Some(set) = self.registry().get_set(tx, &object_id) else {
            return Ok(());
        };

        let mut to_drop: Vec<(LookupResult, Arc<CatalogEntry>)> = Vec::new();
        for edge in set.dependents().edges(tx) {
            if self.registry().get_set(tx, &edge.target).is_none() {
                trace!(dependent = %edge.target, "dependent has no node, skipping");
                continue;
            }
            let lookup = self.resolver().resolve(tx, &edge.target)?;
            let Some(dependent) = lookup.entry.clone() else {
                continue;
            };
            match edge.dependency_type.on_drop(cascade) {
                DropAction::Block => {
                    return Err(DependencyError::DropBlocked {
                        object: object.name().to_string(),
                        dependent: dependent.name().to_string(),
                    }
                    .into());
                }
                DropAction::Drop => to_drop.push((lookup, dependent)),
                DropAction::Detach => {
                    trace!(dependent = %edge.target, "owner detached");
                }
            }
        }

        for (lookup, dependent) in &to_drop {
            debug!(dependent = %dependent.name(), depth = depth + 1, "dropping dependent");
            self.catalog
                .drop_from(tx, &lookup.collection, dependent.name(), cascade, depth + 1)?;
        }

        self.cleanup_dependencies(tx, &object_id)?;
        debug!(object = %object_id, dropped_dependents = to_drop.len(), "object dropped");
        Ok(())
    }

    /// Remove every edge touching `identity` in either role, on its own
    /// node and on every other endpoint, then drop its node.
    pub fn cleanup_dependencies(&self, tx: &Transaction, identity: &ObjectIdentity) -> Result<(), Error> {
        let registry = self.registry();
        let set = registry
            .get_set(tx, identity)
            .ok_or_else(|| Error::consistency(format!("no dependency set for {identity}")))?;

        for edge in set.dependents().edges(tx).chain(set.dependencies().edges(tx)) {
            set.dependents().drop(tx, &edge.target)?;
            set.dependencies().drop(tx, &edge.target)?;
            let other = registry.set_for(&edge.target);
            other.dependents().drop(tx, identity)?;
            other.dependencies().drop(tx, identity)?;
        }
        registry.drop_set(tx, identity)?;
        trace!(node = %identity, "dependencies cleaned up");
        Ok(())
    }

    /// Carry the dependencies of `old` over to `new`.
    ///
    /// Both halves of an ownership pair survive; any other live dependent
    /// blocks the alter. Dependency kinds are never changed by an alter:
    /// edges are re-created with their recorded type.
    #[instrument(skip(self, tx, old, new), fields(txid = tx.id(), old = %old.name(), new = %new.name()))]
    pub fn alter_object(&self, tx: &Transaction, old: &CatalogEntry, new: &CatalogEntry) -> Result<(), Error> {
        if is_system_entry(new) {
            return Ok(());
        }
        let _guard = self.catalog.write_lock().acquire();
        let registry = self.registry();
        let old_id = identity_of(old)?;
        let new_id = identity_of(new)?;

        let mut owned = Vec::new();
        let mut owners = Vec::new();
        let mut dependencies = Vec::new();
        let old_set = registry.get_set(tx, &old_id);
        if let Some(set) = &old_set {
            for edge in set.dependents().edges(tx) {
                match edge.dependency_type {
                    DependencyType::Owns => owned.push(edge.target),
                    DependencyType::OwnedBy => owners.push(edge.target),
                    DependencyType::Regular | DependencyType::Automatic => {
                        if registry.get_set(tx, &edge.target).is_none() {
                            continue;
                        }
                        if let Some(dependent) = self.resolver().resolve(tx, &edge.target)?.entry {
                            return Err(DependencyError::AlterBlocked {
                                object: old.name().to_string(),
                                dependent: dependent.name().to_string(),
                            }
                            .into());
                        }
                    }
                }
            }
            for edge in set.dependencies().edges(tx) {
                if owned.contains(&edge.target) {
                    continue;
                }
                if self.resolver().resolve_live(tx, &edge.target).is_none() {
                    trace!(dependency = %edge.target, "dependency no longer resolves, not carried over");
                    continue;
                }
                dependencies.push(Dependency::new(edge.target, edge.dependency_type));
            }
        }

        if old_set.is_some() && old_id != new_id {
            self.cleanup_dependencies(tx, &old_id)?;
        }

        for dependency in &dependencies {
            registry
                .get_or_create_set(tx, &dependency.identity)?
                .add_dependent(tx, &new_id, dependency.dependency_type)?;
        }
        let new_set = registry.get_or_create_set(tx, &new_id)?;
        for dependency in &dependencies {
            new_set.add_dependency(tx, &dependency.identity, dependency.dependency_type)?;
        }

        for entry in &owned {
            new_set.add_dependent(tx, entry, DependencyType::Owns)?;
            new_set.add_dependency(tx, entry, DependencyType::Regular)?;
            registry
                .get_or_create_set(tx, entry)?
                .add_dependent(tx, &new_id, DependencyType::OwnedBy)?;
        }
        for owner in &owners {
            new_set.add_dependent(tx, owner, DependencyType::OwnedBy)?;
            let owner_set = registry.get_or_create_set(tx, owner)?;
            owner_set.add_dependent(tx, &new_id, DependencyType::Owns)?;
            owner_set.add_dependency(tx, &new_id, DependencyType::Automatic)?;
        }

        debug!(
            old = %old_id,
            new = %new_id,
            dependencies = dependencies.len(),
            owned = owned.len(),
            owners = owners.len(),
            "object altered"
        );
        Ok(())
    }

    /// Make `entry` exclusively owned by `owner`.
    ///
    /// Dropping the owner then drops the entry; the entry never depends on
    /// its owner.
    pub fn add_ownership(&self, tx: &Transaction, owner: &CatalogEntry, entry: &CatalogEntry) -> Result<(), Error> {
        for candidate in [owner, entry] {
            if is_system_entry(candidate) {
                return Err(OwnershipError::SystemEntry {
                    name: candidate.name().to_string(),
                }
                .into());
            }
        }
        let _guard = self.catalog.write_lock().acquire();
        let registry = self.registry();
        let owner_id = identity_of(owner)?;
        let entry_id = identity_of(entry)?;

        if let Some(entry_set) = registry.get_set(tx, &entry_id) {
            for edge in entry_set.dependents().edges(tx) {
                if edge.target == owner_id {
                    if edge.dependency_type == DependencyType::Owns {
                        return Err(OwnershipError::Circular {
                            entry: entry.name().to_string(),
                            owner: owner.name().to_string(),
                        }
                        .into());
                    }
                    continue;
                }
                let Some(dependent) = self.resolver().resolve_live(tx, &edge.target) else {
                    continue;
                };
                let err = if edge.dependency_type == DependencyType::OwnedBy {
                    OwnershipError::AlreadyOwned {
                        owner: entry.name().to_string(),
                        by: dependent.name().to_string(),
                    }
                } else {
                    OwnershipError::AlreadyDepends {
                        entry: entry.name().to_string(),
                        other: dependent.name().to_string(),
                    }
                };
                return Err(err.into());
            }
        }

        if let Some(owner_set) = registry.get_set(tx, &owner_id) {
            if let Some(edge) = owner_set
                .dependents()
                .edges(tx)
                .find(|edge| edge.dependency_type == DependencyType::OwnedBy)
            {
                return Err(OwnershipError::AlreadyOwned {
                    owner: owner.name().to_string(),
                    by: edge.target.name,
                }
                .into());
            }
        }

        // an edge already recorded between the two keeps its type
        registry
            .get_or_create_set(tx, &entry_id)?
            .add_dependent(tx, &owner_id, DependencyType::OwnedBy)?;
        let owner_set = registry.get_or_create_set(tx, &owner_id)?;
        owner_set.add_dependency(tx, &entry_id, DependencyType::Automatic)?;
        owner_set.add_dependent(tx, &entry_id, DependencyType::Owns)?;

        debug!(owner = %owner_id, owned = %entry_id, "ownership added");
        Ok(())
    }

    /// Visit every live `(object, dependent, type)` triple visible to `tx`.
    ///
    /// Nodes and edges that no longer resolve are skipped.
    pub fn scan<F>(&self, tx: &Transaction, mut callback: F) -> Result<(), Error>
    where
        F: FnMut(&CatalogEntry, &CatalogEntry, DependencyType),
    {
        let _guard = self.catalog.write_lock().acquire();
        let registry = self.registry();
        let resolver = self.resolver();
        for identity in registry.nodes(tx)? {
            let Some(object) = resolver.resolve_live(tx, &identity) else {
                continue;
            };
            for edge in registry.set_for(&identity).dependents().edges(tx) {
                if let Some(dependent) = resolver.resolve_live(tx, &edge.target) {
                    callback(&object, &dependent, edge.dependency_type);
                }
            }
        }
        Ok(())
    }

    /// The scan materialized as rows.
    pub fn relationships(&self, tx: &Transaction) -> Result<Vec<Relationship>, Error> {
        let mut rows = Vec::new();
        self.scan(tx, |object, dependent, dependency_type| {
            if let (Some(object), Some(dependent)) = (object.identity(), dependent.identity()) {
                rows.push(Relationship {
                    object,
                    dependent,
                    dependency_type,
                });
            }
        })?;
        Ok(rows)
    }

    /// Dependent edges recorded on `identity`.
    pub fn dependents_of(&self, tx: &Transaction, identity: &ObjectIdentity) -> Vec<DependencyEdge> {
        self.registry()
            .get_set(tx, identity)
            .map(|set| set.dependent_edges(tx))
            .unwrap_or_default()
    }

    /// Dependency edges recorded on `identity`.
    pub fn dependencies_of(&self, tx: &Transaction, identity: &ObjectIdentity) -> Vec<DependencyEdge> {
        self.registry()
            .get_set(tx, identity)
            .map(|set| set.dependency_edges(tx))
            .unwrap_or_default()
    }
}

fn identity_of(entry: &CatalogEntry) -> Result<ObjectIdentity, Error> {
    entry
        .identity()
        .ok_or_else(|| Error::consistency(format!("entry \"{}\" has no object identity", entry.name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AlterInfo, CatalogId, CreateInfo, DropInfo};

    fn create(catalog: &Catalog, tx: &Transaction, kind: CatalogType, name: &str, deps: &[&Arc<CatalogEntry>]) -> Arc<CatalogEntry> {
        let list = deps.iter().map(|dep| Arc::clone(dep)).collect();
        catalog
            .create_entry(tx, CreateInfo::new(kind, "main", name), &list)
            .unwrap()
    }

    #[test]
    fn test_system_entries_ignored() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let internal = CatalogEntry::object(catalog.id(), CatalogType::Table, "main", "sys").with_internal(true);
        let manager = catalog.dependency_manager();

        manager.add_object(&tx, &internal, &DependencyList::new()).unwrap();
        manager.drop_object(&tx, &internal, false).unwrap();
        assert!(manager.relationships(&tx).unwrap().is_empty());
        assert!(is_system_entry(&internal));
    }

    #[test]
    fn test_index_edges_are_automatic() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let table = create(&catalog, &tx, CatalogType::Table, "t", &[]);
        create(&catalog, &tx, CatalogType::Index, "t_idx", &[&table]);

        let rows = catalog.relationships(&tx).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dependency_type, DependencyType::Automatic);
        assert_eq!(rows[0].object.name, "t");
        assert_eq!(rows[0].dependent.name, "t_idx");
    }

    #[test]
    fn test_cross_catalog_rejected() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let foreign = Arc::new(CatalogEntry::object(CatalogId::new(u64::MAX), CatalogType::Table, "main", "f"));
        let view = CatalogEntry::object(catalog.id(), CatalogType::View, "main", "v");

        let err = catalog
            .dependency_manager()
            .add_object(&tx, &view, &DependencyList::new().with(foreign))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DependencyViolation(DependencyError::CrossCatalog { .. })
        ));
    }

    #[test]
    fn test_vanished_dependency_is_consistency_error() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let ghost = Arc::new(CatalogEntry::object(catalog.id(), CatalogType::Table, "main", "ghost"));
        let view = CatalogEntry::object(catalog.id(), CatalogType::View, "main", "v");

        let err = catalog
            .dependency_manager()
            .add_object(&tx, &view, &DependencyList::new().with(ghost))
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_cleanup_without_set_is_consistency_error() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let err = catalog
            .dependency_manager()
            .cleanup_dependencies(&tx, &ObjectIdentity::new(CatalogType::Table, "main", "nothing"))
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_ownership_guards() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let table = create(&catalog, &tx, CatalogType::Table, "t", &[]);
        let other = create(&catalog, &tx, CatalogType::Table, "u", &[]);
        let sequence = create(&catalog, &tx, CatalogType::Sequence, "s", &[]);
        let manager = catalog.dependency_manager();

        manager.add_ownership(&tx, &table, &sequence).unwrap();

        // the sequence already has an owner
        let err = manager.add_ownership(&tx, &other, &sequence).unwrap_err();
        assert!(matches!(
            err,
            Error::InputValidation(OwnershipError::AlreadyOwned { .. })
        ));

        // the sequence owns nothing, but t owns it, so t cannot be owned by it
        let err = manager.add_ownership(&tx, &sequence, &table).unwrap_err();
        assert!(matches!(err, Error::InputValidation(OwnershipError::Circular { .. })));

        let internal = CatalogEntry::object(catalog.id(), CatalogType::Table, "main", "sys").with_internal(true);
        let err = manager.add_ownership(&tx, &internal, &sequence).unwrap_err();
        assert!(matches!(
            err,
            Error::InputValidation(OwnershipError::SystemEntry { .. })
        ));
    }

    #[test]
    fn test_owned_entry_with_dependents_rejected() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let table = create(&catalog, &tx, CatalogType::Table, "t", &[]);
        let sequence = create(&catalog, &tx, CatalogType::Sequence, "s", &[]);
        create(&catalog, &tx, CatalogType::View, "v", &[&sequence]);

        let err = catalog
            .dependency_manager()
            .add_ownership(&tx, &table, &sequence)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InputValidation(OwnershipError::AlreadyDepends { .. })
        ));
    }

    fn rows(catalog: &Catalog, tx: &Transaction) -> Vec<(String, String, DependencyType)> {
        let mut rows: Vec<_> = catalog
            .relationships(tx)
            .unwrap()
            .into_iter()
            .map(|row| (row.object.name, row.dependent.name, row.dependency_type))
            .collect();
        rows.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        rows
    }

    #[test]
    fn test_ownership_keeps_existing_regular_edge() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let sequence = create(&catalog, &tx, CatalogType::Sequence, "s", &[]);
        let table = create(&catalog, &tx, CatalogType::Table, "t", &[&sequence]);
        catalog
            .dependency_manager()
            .add_ownership(&tx, &table, &sequence)
            .unwrap();

        assert_eq!(
            rows(&catalog, &tx),
            vec![
                ("s".to_string(), "t".to_string(), DependencyType::Regular),
                ("t".to_string(), "s".to_string(), DependencyType::Owns),
            ]
        );
        // both halves of the table's use of the sequence still agree
        let sequence_id = sequence.identity().unwrap();
        let table_dependency = catalog
            .dependency_manager()
            .dependencies_of(&tx, &table.identity().unwrap())
            .into_iter()
            .find(|edge| edge.target == sequence_id)
            .unwrap();
        assert_eq!(table_dependency.dependency_type, DependencyType::Regular);
        catalog.commit(&tx).unwrap();

        let tx = catalog.begin();
        let err = catalog
            .drop_entry(&tx, &DropInfo::new(CatalogType::Sequence, "main", "s"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DependencyViolation(DependencyError::DropBlocked { .. })
        ));
        catalog.rollback(&tx).unwrap();

        let tx = catalog.begin();
        catalog
            .drop_entry(&tx, &DropInfo::new(CatalogType::Sequence, "main", "s").cascade(true))
            .unwrap();
        assert!(catalog.get_entry(&tx, CatalogType::Table, "main", "t").is_none());
        assert!(rows(&catalog, &tx).is_empty());
    }

    #[test]
    fn test_owned_entry_cannot_become_owner() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let table = create(&catalog, &tx, CatalogType::Table, "t", &[]);
        let sequence = create(&catalog, &tx, CatalogType::Sequence, "s", &[]);
        let other = create(&catalog, &tx, CatalogType::Sequence, "x", &[]);
        let manager = catalog.dependency_manager();

        manager.add_ownership(&tx, &table, &sequence).unwrap();
        let err = manager.add_ownership(&tx, &sequence, &other).unwrap_err();
        assert!(matches!(
            err,
            Error::InputValidation(OwnershipError::AlreadyOwned { ref owner, ref by })
                if owner == "s" && by == "t"
        ));
    }

    #[test]
    fn test_alter_skips_dependencies_that_no_longer_resolve() {
        let catalog = Catalog::standalone("memory");
        let tx = catalog.begin();
        let table = create(&catalog, &tx, CatalogType::Table, "t", &[]);
        create(&catalog, &tx, CatalogType::View, "v", &[&table]);

        // remove the table behind the dependency manager's back
        let collections = catalog.schema_collections("main").unwrap();
        assert!(collections
            .for_kind(CatalogType::Table)
            .unwrap()
            .drop_entry(&tx, "t", false, |_| Ok(()))
            .unwrap());

        catalog
            .alter_entry(&tx, &AlterInfo::rename(CatalogType::View, "main", "v", "v2"))
            .unwrap();

        let manager = catalog.dependency_manager();
        let renamed = ObjectIdentity::new(CatalogType::View, "main", "v2");
        assert!(manager.dependencies_of(&tx, &renamed).is_empty());
        assert!(manager.dependents_of(&tx, &table.identity().unwrap()).is_empty());
    }
}
