//! Catalog facade: schemas, per-schema collections and the dependency graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, instrument};

use super::entry::{AlterAction, AlterInfo, CatalogEntry, CatalogId, CreateInfo, DropInfo, OnCreateConflict};
use super::set::CatalogSet;
use super::CatalogType;
use crate::config::CatalogConfig;
use crate::dependency::{DependencyList, DependencyManager, DependencyRegistry, ObjectIdentity, Relationship};
use crate::error::Error;
use crate::transaction::{Timestamp, Transaction, TransactionManager};

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Catalog-wide lock serializing changes to the dependency topology.
///
/// Re-entrant so a cascading drop can re-enter the drop path on the same
/// thread.
#[derive(Debug, Default)]
pub struct CatalogWriteLock(ReentrantMutex<()>);

impl CatalogWriteLock {
    pub fn acquire(&self) -> ReentrantMutexGuard<'_, ()> {
        self.0.lock()
    }
}

/// Entry collections of one schema.
#[derive(Debug)]
pub struct SchemaCollections {
    tables: Arc<CatalogSet>,
    indexes: Arc<CatalogSet>,
    sequences: Arc<CatalogSet>,
    functions: Arc<CatalogSet>,
    types: Arc<CatalogSet>,
}

impl SchemaCollections {
    fn new(schema: &str) -> Self {
        let set = |kind: &str| Arc::new(CatalogSet::new(format!("{schema}.{kind}")));
        Self {
            tables: set("tables"),
            indexes: set("indexes"),
            sequences: set("sequences"),
            functions: set("functions"),
            types: set("types"),
        }
    }

    /// Collection holding entries of `kind`. Tables share with views and
    /// macros with table macros.
    pub fn for_kind(&self, kind: CatalogType) -> Option<&Arc<CatalogSet>> {
        match kind {
            CatalogType::Table | CatalogType::View => Some(&self.tables),
            CatalogType::Index => Some(&self.indexes),
            CatalogType::Sequence => Some(&self.sequences),
            CatalogType::Macro | CatalogType::TableMacro => Some(&self.functions),
            CatalogType::Type => Some(&self.types),
            _ => None,
        }
    }

    fn all(&self) -> [&Arc<CatalogSet>; 5] {
        [&self.tables, &self.indexes, &self.sequences, &self.functions, &self.types]
    }
}

/// A transactional catalog.
pub struct Catalog {
    id: CatalogId,
    name: String,
    config: CatalogConfig,
    transactions: Arc<TransactionManager>,
    write_lock: CatalogWriteLock,
    schemas: Arc<CatalogSet>,
    collections: DashMap<String, Arc<SchemaCollections>>,
    dependencies: DependencyRegistry,
}

impl Catalog {
    /// Create a catalog sharing `transactions` with other catalogs.
    pub fn new(name: impl Into<String>, transactions: Arc<TransactionManager>, config: CatalogConfig) -> Self {
        let name = name.into();
        let id = CatalogId::new(NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed));
        let schemas = Arc::new(CatalogSet::new(format!("{name}.schemas")));
        let collections = DashMap::new();

        let default_schema = config.default_schema.clone();
        schemas.create_committed(
            &default_schema,
            CatalogEntry::schema(id, default_schema.clone()).with_internal(true),
        );
        collections.insert(
            default_schema.clone(),
            Arc::new(SchemaCollections::new(&default_schema)),
        );
        debug!(catalog = %name, id = %id, schema = %default_schema, "catalog created");

        Self {
            id,
            name,
            config,
            transactions,
            write_lock: CatalogWriteLock::default(),
            schemas,
            collections,
            dependencies: DependencyRegistry::new(id),
        }
    }

    /// Create a catalog with its own transaction manager and default settings.
    pub fn standalone(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(TransactionManager::new()), CatalogConfig::default())
    }

    pub fn id(&self) -> CatalogId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn write_lock(&self) -> &CatalogWriteLock {
        &self.write_lock
    }

    /// Start a transaction.
    pub fn begin(&self) -> Transaction {
        self.transactions.begin()
    }

    pub fn commit(&self, tx: &Transaction) -> Result<Timestamp, Error> {
        self.transactions.commit(tx)
    }

    pub fn rollback(&self, tx: &Transaction) -> Result<(), Error> {
        self.transactions.rollback(tx)
    }

    /// The dependency manager of this catalog.
    pub fn dependency_manager(&self) -> DependencyManager<'_> {
        DependencyManager::new(self)
    }

    pub(crate) fn schemas(&self) -> &Arc<CatalogSet> {
        &self.schemas
    }

    pub(crate) fn registry(&self) -> &DependencyRegistry {
        &self.dependencies
    }

    pub(crate) fn schema_collections(&self, schema: &str) -> Option<Arc<SchemaCollections>> {
        self.collections.get(schema).map(|c| Arc::clone(c.value()))
    }

    /// Create a schema.
    pub fn create_schema(&self, tx: &Transaction, name: &str) -> Result<Arc<CatalogEntry>, Error> {
        self.create_entry(
            tx,
            CreateInfo::new(CatalogType::Schema, name, name),
            &DependencyList::new(),
        )
    }

    /// Schema visible to `tx`.
    pub fn get_schema(&self, tx: &Transaction, name: &str) -> Option<Arc<CatalogEntry>> {
        self.schemas.get_entry(tx, name)
    }

    /// Schemas visible to `tx`, ordered by name.
    pub fn list_schemas(&self, tx: &Transaction) -> Vec<Arc<CatalogEntry>> {
        self.schemas.scan(tx)
    }

    /// Entries of every kind in `schema` visible to `tx`, ordered by name.
    pub fn list_entries(&self, tx: &Transaction, schema: &str) -> Result<Vec<Arc<CatalogEntry>>, Error> {
        let schema_missing = || Error::NotFound {
            kind: CatalogType::Schema,
            name: schema.to_string(),
        };
        self.schemas.get_entry(tx, schema).ok_or_else(schema_missing)?;
        let collections = self.schema_collections(schema).ok_or_else(schema_missing)?;
        let mut entries: Vec<_> = collections
            .all()
            .iter()
            .flat_map(|set| set.scan(tx))
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }

    /// Create an entry and register its dependencies.
    ///
    /// The owning schema is added as a dependency unless it is internal, so
    /// a schema cannot be dropped without CASCADE while it has contents.
    pub fn create_entry(
        &self,
        tx: &Transaction,
        info: CreateInfo,
        dependencies: &DependencyList,
    ) -> Result<Arc<CatalogEntry>, Error> {
        self.ensure_usable(tx)?;
        let _guard = self.write_lock.acquire();
        let result = self.create_entry_inner(tx, info, dependencies);
        self.track(tx, result)
    }

    fn create_entry_inner(
        &self,
        tx: &Transaction,
        info: CreateInfo,
        dependencies: &DependencyList,
    ) -> Result<Arc<CatalogEntry>, Error> {
        validate_name(&info.name)?;
        let (set, entry) = if info.kind == CatalogType::Schema {
            let entry = CatalogEntry::schema(self.id, info.name.clone());
            (Arc::clone(&self.schemas), entry)
        } else {
            validate_name(&info.schema)?;
            let set = self.collection(tx, &info.schema, info.kind)?;
            let entry = CatalogEntry::object(self.id, info.kind, info.schema.clone(), info.name.clone());
            (set, entry)
        };
        let entry = entry
            .with_internal(info.internal)
            .with_comment(info.comment.clone());

        if let Some(existing) = set.get_entry(tx, &info.name) {
            match info.on_conflict {
                OnCreateConflict::Error => {
                    return Err(Error::AlreadyExists {
                        kind: existing.kind(),
                        name: info.name,
                    })
                }
                OnCreateConflict::Ignore => return Ok(existing),
                OnCreateConflict::Replace => {
                    ensure_kind(&existing, info.kind)?;
                    self.drop_from(tx, &set, &info.name, false, 0)?;
                }
            }
        }

        if !set.create_entry(tx, &info.name, entry)? {
            return Err(Error::AlreadyExists {
                kind: info.kind,
                name: info.name,
            });
        }
        let created = set
            .get_entry(tx, &info.name)
            .ok_or_else(|| Error::consistency(format!("entry \"{}\" vanished after create", info.name)))?;

        let mut dependencies = dependencies.clone();
        if info.kind.is_schema_scoped() {
            if let Some(schema) = self.schemas.get_entry(tx, &info.schema) {
                if !schema.is_internal() {
                    dependencies.add(schema);
                }
            }
        }
        self.dependency_manager().add_object(tx, &created, &dependencies)?;

        if info.kind == CatalogType::Schema {
            self.collections
                .entry(info.name.clone())
                .or_insert_with(|| Arc::new(SchemaCollections::new(&info.name)));
        }
        debug!(catalog = %self.name, kind = %info.kind, schema = %info.schema, name = %info.name, "entry created");
        Ok(created)
    }

    /// Live entry of `kind` visible to `tx`.
    pub fn get_entry(
        &self,
        tx: &Transaction,
        kind: CatalogType,
        schema: &str,
        name: &str,
    ) -> Option<Arc<CatalogEntry>> {
        let set = if kind == CatalogType::Schema {
            Arc::clone(&self.schemas)
        } else {
            let collections = self.schema_collections(schema)?;
            Arc::clone(collections.for_kind(kind)?)
        };
        set.get_entry(tx, name).filter(|entry| entry.kind() == kind)
    }

    /// Live entry with the given identity.
    pub fn get_object(&self, tx: &Transaction, identity: &ObjectIdentity) -> Option<Arc<CatalogEntry>> {
        self.get_entry(tx, identity.kind, &identity.schema, &identity.name)
    }

    /// Drop an entry, applying dependency rules to everything that depends
    /// on it.
    ///
    /// Returns `false` only when the entry does not exist and `if_exists`
    /// is set.
    #[instrument(skip(self, tx, info), fields(txid = tx.id(), kind = %info.kind, name = %info.name, cascade = info.cascade))]
    pub fn drop_entry(&self, tx: &Transaction, info: &DropInfo) -> Result<bool, Error> {
        self.ensure_usable(tx)?;
        let _guard = self.write_lock.acquire();
        let result = self.drop_entry_inner(tx, info);
        self.track(tx, result)
    }

    fn drop_entry_inner(&self, tx: &Transaction, info: &DropInfo) -> Result<bool, Error> {
        let set = if info.kind == CatalogType::Schema {
            Arc::clone(&self.schemas)
        } else {
            match self.collection(tx, &info.schema, info.kind) {
                Ok(set) => set,
                Err(Error::NotFound { .. }) if info.if_exists => return Ok(false),
                Err(err) => return Err(err),
            }
        };

        let Some(existing) = set.get_entry(tx, &info.name) else {
            if info.if_exists {
                return Ok(false);
            }
            return Err(Error::NotFound {
                kind: info.kind,
                name: info.name.clone(),
            });
        };
        ensure_kind(&existing, info.kind)?;

        self.drop_from(tx, &set, &info.name, info.cascade, 0)
    }

    /// Drop `name` from `set`, running the dependency hook while the entry
    /// is tombstoned. `depth` counts nested cascades.
    pub(crate) fn drop_from(
        &self,
        tx: &Transaction,
        set: &CatalogSet,
        name: &str,
        cascade: bool,
        depth: usize,
    ) -> Result<bool, Error> {
        if depth > self.config.max_cascade_depth {
            return Err(Error::CascadeDepthExceeded { depth });
        }
        set.drop_entry(tx, name, false, |entry| {
            self.dependency_manager().drop_object_at(tx, entry, cascade, depth)
        })
    }

    /// Alter an entry and carry its dependencies over to the new version.
    #[instrument(skip(self, tx, info), fields(txid = tx.id(), kind = %info.kind, name = %info.name))]
    pub fn alter_entry(&self, tx: &Transaction, info: &AlterInfo) -> Result<Arc<CatalogEntry>, Error> {
        self.ensure_usable(tx)?;
        let _guard = self.write_lock.acquire();
        let result = self.alter_entry_inner(tx, info);
        self.track(tx, result)
    }

    fn alter_entry_inner(&self, tx: &Transaction, info: &AlterInfo) -> Result<Arc<CatalogEntry>, Error> {
        let set = if info.kind == CatalogType::Schema {
            if matches!(info.action, AlterAction::Rename(_)) {
                return Err(Error::InvalidInput("schemas cannot be renamed".to_string()));
            }
            Arc::clone(&self.schemas)
        } else {
            self.collection(tx, &info.schema, info.kind)?
        };

        let not_found = || Error::NotFound {
            kind: info.kind,
            name: info.name.clone(),
        };
        let existing = set.get_entry(tx, &info.name).ok_or_else(not_found)?;
        ensure_kind(&existing, info.kind)?;
        if let AlterAction::Rename(new_name) = &info.action {
            validate_name(new_name)?;
        }

        let altered = set.alter_entry(
            tx,
            &info.name,
            |old| Ok(info.apply(old)),
            |old, new| self.dependency_manager().alter_object(tx, old, new),
        )?;
        if !altered {
            return Err(not_found());
        }

        let new_name = match &info.action {
            AlterAction::Rename(new_name) => new_name.as_str(),
            AlterAction::SetComment(_) => info.name.as_str(),
        };
        set.get_entry(tx, new_name)
            .ok_or_else(|| Error::consistency(format!("entry \"{new_name}\" vanished after alter")))
    }

    /// Make `owned` exclusively owned by `owner`.
    pub fn add_ownership(
        &self,
        tx: &Transaction,
        owner: &ObjectIdentity,
        owned: &ObjectIdentity,
    ) -> Result<(), Error> {
        self.ensure_usable(tx)?;
        let _guard = self.write_lock.acquire();
        let result = self.lookup(tx, owner).and_then(|owner_entry| {
            let owned_entry = self.lookup(tx, owned)?;
            self.dependency_manager()
                .add_ownership(tx, &owner_entry, &owned_entry)
        });
        self.track(tx, result)
    }

    /// Every live (object, dependent, type) triple visible to `tx`.
    pub fn relationships(&self, tx: &Transaction) -> Result<Vec<Relationship>, Error> {
        self.ensure_usable(tx)?;
        self.dependency_manager().relationships(tx)
    }

    /// Discard versions written by rolled-back transactions.
    pub fn vacuum(&self) -> usize {
        let _guard = self.write_lock.acquire();
        let manager = self.transactions.as_ref();
        let mut removed = self.schemas.vacuum(manager) + self.dependencies.vacuum(manager);
        for collections in self.collections.iter() {
            removed += collections.all().iter().map(|set| set.vacuum(manager)).sum::<usize>();
        }
        debug!(catalog = %self.name, removed, "catalog vacuumed");
        removed
    }

    fn lookup(&self, tx: &Transaction, identity: &ObjectIdentity) -> Result<Arc<CatalogEntry>, Error> {
        self.get_object(tx, identity).ok_or_else(|| Error::NotFound {
            kind: identity.kind,
            name: identity.name.clone(),
        })
    }

    /// Collection for `kind` inside a schema visible to `tx`.
    fn collection(&self, tx: &Transaction, schema: &str, kind: CatalogType) -> Result<Arc<CatalogSet>, Error> {
        if !kind.is_schema_scoped() {
            return Err(Error::InvalidInput(format!("{kind} entries do not live in a schema")));
        }
        let schema_missing = || Error::NotFound {
            kind: CatalogType::Schema,
            name: schema.to_string(),
        };
        self.schemas.get_entry(tx, schema).ok_or_else(schema_missing)?;
        let collections = self.schema_collections(schema).ok_or_else(schema_missing)?;
        collections
            .for_kind(kind)
            .map(Arc::clone)
            .ok_or_else(|| Error::InvalidInput(format!("no collection for {kind}")))
    }

    fn ensure_usable(&self, tx: &Transaction) -> Result<(), Error> {
        if tx.is_invalidated() {
            return Err(Error::Transaction(
                "current transaction is aborted, roll back before issuing new statements".to_string(),
            ));
        }
        if !tx.is_active() {
            return Err(Error::Transaction(format!("transaction {} is not active", tx.id())));
        }
        Ok(())
    }

    /// A failed statement invalidates its transaction.
    fn track<T>(&self, tx: &Transaction, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result {
            debug!(txid = tx.id(), error = %err, "statement failed, transaction invalidated");
            tx.invalidate();
        }
        result
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn ensure_kind(entry: &CatalogEntry, expected: CatalogType) -> Result<(), Error> {
    if entry.kind() != expected {
        return Err(Error::InvalidInput(format!(
            "existing entry \"{}\" is of type {}, not {}",
            entry.name(),
            entry.kind(),
            expected
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::InvalidInput("name must not be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(Error::InvalidInput(format!("name {name:?} contains a NUL character")));
    }
    Ok(())
}
