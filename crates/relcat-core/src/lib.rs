//! relcat core: a transactional catalog with dependency tracking.
//!
//! Schema objects are stored as versioned entries. The dependency graph
//! between them decides what a drop, alter or ownership change may do and
//! what else it affects.

pub mod catalog;
pub mod config;
pub mod dependency;
pub mod error;
pub mod transaction;

pub use catalog::{
    AlterAction, AlterInfo, Catalog, CatalogEntry, CatalogId, CatalogSet, CatalogType, CreateInfo, DropInfo,
    OnCreateConflict,
};
pub use config::CatalogConfig;
pub use dependency::{
    DependencyList, DependencyManager, DependencyType, MangledName, ObjectIdentity, Relationship,
};
pub use error::{DependencyError, Error, OwnershipError};
pub use transaction::{Transaction, TransactionManager, TxnStatus};
