//! Dependency graph between catalog entries.
//!
//! Every node is an object identity. Its set holds two kinds of edge
//! records: the objects that depend on it (dependents) and the objects it
//! depends on (dependencies). Edges and node markers are ordinary versioned
//! catalog entries, so they follow the snapshot of the transaction that
//! reads them and vanish on rollback.

mod edge_store;
mod manager;
mod names;
mod resolver;
mod set;
mod types;

pub use edge_store::DependencyEdgeStore;
pub use manager::{is_system_entry, DependencyManager};
pub use names::{MangledName, ObjectIdentity};
pub use resolver::{IdentityResolver, LookupResult};
pub use set::{DependencyRegistry, DependencySet};
pub use types::{
    Dependency, DependencyEdge, DependencyList, DependencyNode, DependencyType, DropAction, Relationship,
};
