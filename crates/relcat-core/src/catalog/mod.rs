//! Transactional catalog: entries, versioned sets and the catalog facade.

#[allow(clippy::module_inception)]
mod catalog;
mod entry;
mod set;
mod types;

pub use catalog::{Catalog, CatalogWriteLock, SchemaCollections};
pub use entry::{
    AlterAction, AlterInfo, CatalogEntry, CatalogId, CreateInfo, DropInfo, EntryPayload, ObjectEntry,
    OnCreateConflict,
};
pub use set::{CatalogSet, EntryIndex, EntryLookup, MappingValue};
pub use types::CatalogType;
