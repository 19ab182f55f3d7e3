//! Versioned name → entry registry.
//!
//! A set keeps two version chains. The mapping chain binds a name to an
//! entry index and records renames as deleted mappings. The entry chain at
//! an index holds successive versions of the entry, with `None` marking a
//! drop. Every version carries the id of the writing transaction and is
//! filtered through [`Transaction::sees`] on read.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::entry::CatalogEntry;
use crate::error::Error;
use crate::transaction::{Transaction, TransactionManager, TxId, SYSTEM_TXID};

/// Stable position of an entry's version chain.
pub type EntryIndex = u64;

/// One binding of a name to an entry index.
#[derive(Debug, Clone, Copy)]
struct MappingVersion {
    index: EntryIndex,
    xmin: TxId,
    deleted: bool,
}

/// One version of an entry; `None` is a tombstone.
#[derive(Debug, Clone)]
struct EntryVersion {
    entry: Option<Arc<CatalogEntry>>,
    xmin: TxId,
}

#[derive(Debug, Default)]
struct SetState {
    mappings: BTreeMap<String, Vec<MappingVersion>>,
    entries: HashMap<EntryIndex, Vec<EntryVersion>>,
    next_index: EntryIndex,
}

/// A resolved name binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingValue {
    pub name: String,
    pub index: EntryIndex,
    /// Transaction that wrote the binding.
    pub timestamp: TxId,
}

/// Result of a detailed lookup: the binding and the version visible under it.
#[derive(Debug, Clone, Default)]
pub struct EntryLookup {
    pub mapping: Option<MappingValue>,
    pub entry: Option<Arc<CatalogEntry>>,
}

impl EntryLookup {
    /// The name is bound but the visible version is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.mapping.is_some() && self.entry.is_none()
    }
}

/// Transactional collection of named catalog entries.
#[derive(Debug)]
pub struct CatalogSet {
    label: String,
    state: RwLock<SetState>,
}

impl CatalogSet {
    /// Create an empty set. The label only appears in logs.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: RwLock::new(SetState::default()),
        }
    }

    /// Create `entry` under `name`.
    ///
    /// Returns `false` if a live entry with this name is visible to `tx`.
    pub fn create_entry(&self, tx: &Transaction, name: &str, entry: CatalogEntry) -> Result<bool, Error> {
        let mut state = self.state.write();
        if let Some(chain) = state.mappings.get(name) {
            check_conflict(tx, name, chain.iter().map(|m| m.xmin))?;
            if let Some(mapping) = visible(tx, chain, |m| m.xmin).filter(|m| !m.deleted) {
                let index = mapping.index;
                if let Some(versions) = state.entries.get(&index) {
                    check_conflict(tx, name, versions.iter().map(|v| v.xmin))?;
                    if visible(tx, versions, |v| v.xmin).is_some_and(|v| v.entry.is_some()) {
                        return Ok(false);
                    }
                }
            }
        }
        state.insert(name, entry, tx.id());
        trace!(set = %self.label, name = %printable(name), txid = tx.id(), "entry created");
        Ok(true)
    }

    /// Insert an entry that is committed from the start. Used for bootstrap.
    pub fn create_committed(&self, name: &str, entry: CatalogEntry) {
        self.state.write().insert(name, entry, SYSTEM_TXID);
    }

    /// Entry visible to `tx` under `name`, if live.
    pub fn get_entry(&self, tx: &Transaction, name: &str) -> Option<Arc<CatalogEntry>> {
        self.get_entry_detailed(tx, name).entry
    }

    /// Binding and visible version of `name`, telling "never existed" apart
    /// from "dropped".
    pub fn get_entry_detailed(&self, tx: &Transaction, name: &str) -> EntryLookup {
        let state = self.state.read();
        let Some(mapping) = state.visible_mapping(tx, name) else {
            return EntryLookup::default();
        };
        let entry = state.visible_entry(tx, mapping.index);
        EntryLookup {
            mapping: Some(MappingValue {
                name: name.to_string(),
                index: mapping.index,
                timestamp: mapping.xmin,
            }),
            entry,
        }
    }

    /// Like [`CatalogSet::get_entry`], but an entry dropped by `tx` itself
    /// is still returned.
    pub fn get_entry_weak(&self, tx: &Transaction, name: &str) -> Option<Arc<CatalogEntry>> {
        let state = self.state.read();
        let mapping = state.visible_mapping(tx, name)?;
        let versions = state.entries.get(&mapping.index)?;
        for version in versions.iter().rev().filter(|v| tx.sees(v.xmin)) {
            match &version.entry {
                Some(entry) => return Some(Arc::clone(entry)),
                None if version.xmin == tx.id() => continue,
                None => return None,
            }
        }
        None
    }

    /// Binding of `name`.
    ///
    /// With `get_latest` the newest binding written by any non-aborted
    /// transaction is returned, otherwise the one visible to `tx`. A binding
    /// removed by a rename yields `None`.
    pub fn get_mapping(&self, tx: &Transaction, name: &str, get_latest: bool) -> Option<MappingValue> {
        let state = self.state.read();
        let chain = state.mappings.get(name)?;
        let mapping = if get_latest {
            let manager = tx.manager();
            chain.iter().rev().find(|m| !manager.is_aborted(m.xmin)).copied()
        } else {
            visible(tx, chain, |m| m.xmin).copied()
        }?;
        (!mapping.deleted).then(|| MappingValue {
            name: name.to_string(),
            index: mapping.index,
            timestamp: mapping.xmin,
        })
    }

    /// Version at `index` visible to `tx`, if live.
    pub fn get_entry_by_index(&self, tx: &Transaction, index: EntryIndex) -> Option<Arc<CatalogEntry>> {
        self.state.read().visible_entry(tx, index)
    }

    /// All live entries visible to `tx`, in name order.
    pub fn scan(&self, tx: &Transaction) -> Vec<Arc<CatalogEntry>> {
        let state = self.state.read();
        state.collect(tx, state.mappings.iter())
    }

    /// Live entries whose name starts with `prefix`, in name order.
    pub fn scan_with_prefix(&self, tx: &Transaction, prefix: &str) -> Vec<Arc<CatalogEntry>> {
        let state = self.state.read();
        let range = state
            .mappings
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix));
        state.collect(tx, range)
    }

    /// Drop the entry bound to `name`.
    ///
    /// The tombstone is written before `on_drop` runs, so the hook and
    /// everything it calls see the entry as deleted. If the hook fails the
    /// tombstone is removed again. Returns `false` when there is nothing
    /// live to drop.
    pub fn drop_entry<F>(
        &self,
        tx: &Transaction,
        name: &str,
        allow_drop_internal: bool,
        on_drop: F,
    ) -> Result<bool, Error>
    where
        F: FnOnce(&Arc<CatalogEntry>) -> Result<(), Error>,
    {
        let (index, entry) = {
            let mut state = self.state.write();
            let Some((index, entry)) = state.live_for_write(tx, name)? else {
                return Ok(false);
            };
            if entry.is_internal() && !allow_drop_internal {
                return Err(Error::InvalidInput(format!(
                    "cannot drop internal entry \"{}\"",
                    printable(name)
                )));
            }
            state.push_version(index, None, tx.id());
            (index, entry)
        };

        if let Err(err) = on_drop(&entry) {
            self.state.write().pop_version(index, tx.id());
            return Err(err);
        }
        trace!(set = %self.label, name = %printable(name), txid = tx.id(), "entry dropped");
        Ok(true)
    }

    /// Replace the entry bound to `name` with `alter_fn(old)`.
    ///
    /// A changed name rebinds the entry: the old name gets a deleted
    /// binding and the new name a fresh one at the same index. `on_alter`
    /// runs after the new version is written and reverts it on failure.
    pub fn alter_entry<A, H>(
        &self,
        tx: &Transaction,
        name: &str,
        alter_fn: A,
        on_alter: H,
    ) -> Result<bool, Error>
    where
        A: FnOnce(&CatalogEntry) -> Result<CatalogEntry, Error>,
        H: FnOnce(&Arc<CatalogEntry>, &Arc<CatalogEntry>) -> Result<(), Error>,
    {
        let (index, old, new, renamed) = {
            let mut state = self.state.write();
            let Some((index, old)) = state.live_for_write(tx, name)? else {
                return Ok(false);
            };
            let new = Arc::new(alter_fn(&old)?);
            let renamed = new.name() != name;
            if renamed {
                let new_name = new.name();
                if let Some(chain) = state.mappings.get(new_name) {
                    check_conflict(tx, new_name, chain.iter().map(|m| m.xmin))?;
                }
                if let Some(mapping) = state.visible_mapping(tx, new_name) {
                    if state.visible_entry(tx, mapping.index).is_some() {
                        return Err(Error::AlreadyExists {
                            kind: new.kind(),
                            name: new_name.to_string(),
                        });
                    }
                }
                state.push_mapping(name, index, tx.id(), true);
                state.push_mapping(new_name, index, tx.id(), false);
            }
            state.push_version(index, Some(Arc::clone(&new)), tx.id());
            (index, old, new, renamed)
        };

        if let Err(err) = on_alter(&old, &new) {
            let mut state = self.state.write();
            state.pop_version(index, tx.id());
            if renamed {
                state.pop_mapping(new.name(), index, tx.id());
                state.pop_mapping(name, index, tx.id());
            }
            return Err(err);
        }
        trace!(
            set = %self.label,
            name = %printable(name),
            new_name = %printable(new.name()),
            txid = tx.id(),
            "entry altered"
        );
        Ok(true)
    }

    /// Discard every version written by a rolled-back transaction.
    ///
    /// Returns the number of versions removed.
    pub fn vacuum(&self, manager: &TransactionManager) -> usize {
        let mut state = self.state.write();
        let mut removed = 0;

        state.mappings.retain(|_, chain| {
            let before = chain.len();
            chain.retain(|m| !manager.is_aborted(m.xmin));
            removed += before - chain.len();
            !chain.is_empty()
        });
        state.entries.retain(|_, versions| {
            let before = versions.len();
            versions.retain(|v| !manager.is_aborted(v.xmin));
            removed += before - versions.len();
            !versions.is_empty()
        });

        if removed > 0 {
            debug!(set = %self.label, removed, "vacuumed aborted versions");
        }
        removed
    }
}

impl SetState {
    fn insert(&mut self, name: &str, entry: CatalogEntry, xmin: TxId) {
        let index = self.next_index;
        self.next_index += 1;
        self.push_version(index, Some(Arc::new(entry)), xmin);
        self.push_mapping(name, index, xmin, false);
    }

    fn push_version(&mut self, index: EntryIndex, entry: Option<Arc<CatalogEntry>>, xmin: TxId) {
        self.entries
            .entry(index)
            .or_default()
            .push(EntryVersion { entry, xmin });
    }

    fn pop_version(&mut self, index: EntryIndex, xmin: TxId) {
        if let Some(versions) = self.entries.get_mut(&index) {
            if let Some(pos) = versions.iter().rposition(|v| v.xmin == xmin) {
                versions.remove(pos);
            }
        }
    }

    fn push_mapping(&mut self, name: &str, index: EntryIndex, xmin: TxId, deleted: bool) {
        self.mappings
            .entry(name.to_string())
            .or_default()
            .push(MappingVersion { index, xmin, deleted });
    }

    fn pop_mapping(&mut self, name: &str, index: EntryIndex, xmin: TxId) {
        let Some(chain) = self.mappings.get_mut(name) else {
            return;
        };
        if let Some(pos) = chain.iter().rposition(|m| m.xmin == xmin && m.index == index) {
            chain.remove(pos);
        }
        if chain.is_empty() {
            self.mappings.remove(name);
        }
    }

    fn visible_mapping(&self, tx: &Transaction, name: &str) -> Option<MappingVersion> {
        let chain = self.mappings.get(name)?;
        visible(tx, chain, |m| m.xmin)
            .filter(|m| !m.deleted)
            .copied()
    }

    fn visible_entry(&self, tx: &Transaction, index: EntryIndex) -> Option<Arc<CatalogEntry>> {
        let versions = self.entries.get(&index)?;
        visible(tx, versions, |v| v.xmin).and_then(|v| v.entry.clone())
    }

    /// Locate the live entry bound to `name` and make sure `tx` may write it.
    fn live_for_write(
        &self,
        tx: &Transaction,
        name: &str,
    ) -> Result<Option<(EntryIndex, Arc<CatalogEntry>)>, Error> {
        let Some(chain) = self.mappings.get(name) else {
            return Ok(None);
        };
        check_conflict(tx, name, chain.iter().map(|m| m.xmin))?;
        let Some(mapping) = visible(tx, chain, |m| m.xmin).filter(|m| !m.deleted) else {
            return Ok(None);
        };
        let index = mapping.index;
        let Some(versions) = self.entries.get(&index) else {
            return Ok(None);
        };
        check_conflict(tx, name, versions.iter().map(|v| v.xmin))?;
        Ok(self.visible_entry(tx, index).map(|entry| (index, entry)))
    }

    fn collect<'a>(
        &self,
        tx: &Transaction,
        mappings: impl Iterator<Item = (&'a String, &'a Vec<MappingVersion>)>,
    ) -> Vec<Arc<CatalogEntry>> {
        mappings
            .filter_map(|(_, chain)| visible(tx, chain, |m| m.xmin).filter(|m| !m.deleted))
            .filter_map(|mapping| self.visible_entry(tx, mapping.index))
            .collect()
    }
}

/// Newest version of a chain visible to `tx`.
fn visible<'a, T>(tx: &Transaction, chain: &'a [T], xmin: impl Fn(&T) -> TxId) -> Option<&'a T> {
    chain.iter().rev().find(|version| tx.sees(xmin(version)))
}

/// Fail if the newest non-aborted writer of a chain is a concurrent transaction.
fn check_conflict(tx: &Transaction, name: &str, writers: impl DoubleEndedIterator<Item = TxId>) -> Result<(), Error> {
    let manager = tx.manager();
    match writers.rev().find(|writer| !manager.is_aborted(*writer)) {
        Some(writer) if tx.conflicts_with(writer) => Err(Error::WriteConflict {
            name: printable(name),
        }),
        _ => Ok(()),
    }
}

/// Registry keys may contain NUL separators.
fn printable(name: &str) -> String {
    name.replace('\0', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogId, CatalogType};

    fn table(name: &str) -> CatalogEntry {
        CatalogEntry::object(CatalogId::new(1), CatalogType::Table, "main", name)
    }

    fn setup() -> (Arc<TransactionManager>, CatalogSet) {
        (Arc::new(TransactionManager::new()), CatalogSet::new("main.tables"))
    }

    #[test]
    fn test_create_and_get() {
        let (manager, set) = setup();
        let tx = manager.begin();
        assert!(set.create_entry(&tx, "users", table("users")).unwrap());
        assert!(!set.create_entry(&tx, "users", table("users")).unwrap());
        assert_eq!(set.get_entry(&tx, "users").unwrap().name(), "users");
        assert!(set.get_entry(&tx, "orders").is_none());
    }

    #[test]
    fn test_uncommitted_invisible_to_others() {
        let (manager, set) = setup();
        let writer = manager.begin();
        let reader = manager.begin();
        set.create_entry(&writer, "users", table("users")).unwrap();

        assert!(set.get_entry(&reader, "users").is_none());
        assert!(matches!(
            set.create_entry(&reader, "users", table("users")),
            Err(Error::WriteConflict { .. })
        ));

        manager.commit(&writer).unwrap();
        let late = manager.begin();
        assert!(set.get_entry(&late, "users").is_some());
        assert!(set.get_entry(&reader, "users").is_none());
    }

    #[test]
    fn test_drop_hook_sees_tombstone() {
        let (manager, set) = setup();
        let tx = manager.begin();
        set.create_entry(&tx, "users", table("users")).unwrap();

        let dropped = set
            .drop_entry(&tx, "users", false, |entry| {
                assert_eq!(entry.name(), "users");
                assert!(set.get_entry(&tx, "users").is_none());
                assert!(set.get_entry_weak(&tx, "users").is_some());
                assert!(set.get_entry_detailed(&tx, "users").is_deleted());
                Ok(())
            })
            .unwrap();
        assert!(dropped);
        assert!(!set.drop_entry(&tx, "users", false, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_drop_hook_failure_reverts() {
        let (manager, set) = setup();
        let tx = manager.begin();
        set.create_entry(&tx, "users", table("users")).unwrap();

        let result = set.drop_entry(&tx, "users", false, |_| {
            Err(Error::InvalidInput("refused".to_string()))
        });
        assert!(result.is_err());
        assert!(set.get_entry(&tx, "users").is_some());
    }

    #[test]
    fn test_internal_entry_protected() {
        let (manager, set) = setup();
        set.create_committed("main", table("main").with_internal(true));
        let tx = manager.begin();
        assert!(matches!(
            set.drop_entry(&tx, "main", false, |_| Ok(())),
            Err(Error::InvalidInput(_))
        ));
        assert!(set.drop_entry(&tx, "main", true, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_rename_rebinds() {
        let (manager, set) = setup();
        let setup_tx = manager.begin();
        set.create_entry(&setup_tx, "users", table("users")).unwrap();
        manager.commit(&setup_tx).unwrap();

        let tx = manager.begin();
        let other = manager.begin();
        let altered = set
            .alter_entry(&tx, "users", |old| Ok(old.renamed("customers")), |_, _| Ok(()))
            .unwrap();
        assert!(altered);
        assert!(set.get_entry(&tx, "users").is_none());
        assert!(set.get_mapping(&tx, "users", true).is_none());
        assert_eq!(set.get_entry(&tx, "customers").unwrap().name(), "customers");

        // the concurrent snapshot still sees the old binding
        assert_eq!(set.get_entry(&other, "users").unwrap().name(), "users");
        assert!(set.get_entry(&other, "customers").is_none());
    }

    #[test]
    fn test_rename_onto_existing_fails() {
        let (manager, set) = setup();
        let tx = manager.begin();
        set.create_entry(&tx, "a", table("a")).unwrap();
        set.create_entry(&tx, "b", table("b")).unwrap();
        let result = set.alter_entry(&tx, "a", |old| Ok(old.renamed("b")), |_, _| Ok(()));
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));
        assert!(set.get_entry(&tx, "a").is_some());
    }

    #[test]
    fn test_alter_hook_failure_reverts_rename() {
        let (manager, set) = setup();
        let tx = manager.begin();
        set.create_entry(&tx, "a", table("a")).unwrap();
        let result = set.alter_entry(
            &tx,
            "a",
            |old| Ok(old.renamed("b")),
            |_, _| Err(Error::InvalidInput("refused".to_string())),
        );
        assert!(result.is_err());
        assert!(set.get_entry(&tx, "a").is_some());
        assert!(set.get_entry(&tx, "b").is_none());
    }

    #[test]
    fn test_prefix_scan() {
        let (manager, set) = setup();
        let tx = manager.begin();
        for name in ["t\0a", "t\0b", "t2\0a", "u"] {
            set.create_entry(&tx, name, table(name)).unwrap();
        }
        let names: Vec<String> = set
            .scan_with_prefix(&tx, "t")
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["t\0a", "t\0b", "t2\0a"]);
        assert_eq!(set.scan(&tx).len(), 4);
    }

    #[test]
    fn test_vacuum_removes_aborted() {
        let (manager, set) = setup();
        let tx = manager.begin();
        set.create_entry(&tx, "users", table("users")).unwrap();
        manager.rollback(&tx).unwrap();

        assert_eq!(set.vacuum(&manager), 2);
        let next = manager.begin();
        assert!(set.get_mapping(&next, "users", true).is_none());
        assert!(set.create_entry(&next, "users", table("users")).unwrap());
    }
}
