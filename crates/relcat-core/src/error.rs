//! Core error types.

use thiserror::Error;

use crate::catalog::CatalogType;

/// Core catalog errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A drop or alter is blocked by a live dependent, or a dependency crosses catalogs.
    #[error("dependency violation: {0}")]
    DependencyViolation(#[from] DependencyError),

    /// Ownership declaration rejected.
    #[error("invalid ownership: {0}")]
    InputValidation(#[from] OwnershipError),

    /// Internal inconsistency in the dependency graph or registry.
    #[error("internal consistency violation: {0}")]
    Consistency(String),

    /// An entry with this name already exists.
    #[error("{kind} with name \"{name}\" already exists")]
    AlreadyExists {
        /// Type of the conflicting entry.
        kind: CatalogType,
        /// Name of the conflicting entry.
        name: String,
    },

    /// Entry does not exist.
    #[error("{kind} with name \"{name}\" does not exist")]
    NotFound {
        /// Type of the missing entry.
        kind: CatalogType,
        /// Name of the missing entry.
        name: String,
    },

    /// Another transaction modified the same entry.
    #[error("catalog write-write conflict on entry \"{name}\"")]
    WriteConflict {
        /// Registry key of the contended entry.
        name: String,
    },

    /// Transaction state error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Request rejected before touching the catalog.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cascading drop recursed deeper than the configured limit.
    #[error("cascade depth exceeded: {depth}")]
    CascadeDepthExceeded {
        /// Depth at which the drop was aborted.
        depth: usize,
    },
}

impl Error {
    /// Whether the error signals a bug or registry corruption rather than a
    /// user-recoverable condition.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        Error::Consistency(message.into())
    }
}

/// Dependency rule violations.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// DROP blocked by a dependent that needs CASCADE.
    #[error(
        "cannot drop entry \"{object}\" because there are entries that depend on it \
         (\"{dependent}\"); use DROP ... CASCADE to drop all dependents"
    )]
    DropBlocked {
        /// Name of the entry being dropped.
        object: String,
        /// Name of the blocking dependent.
        dependent: String,
    },

    /// ALTER blocked by a live dependent.
    #[error("cannot alter entry \"{object}\" because there are entries that depend on it (\"{dependent}\")")]
    AlterBlocked {
        /// Name of the entry being altered.
        object: String,
        /// Name of the blocking dependent.
        dependent: String,
    },

    /// Dependency registered across catalogs.
    #[error(
        "error adding dependency for object \"{object}\": dependency \"{dependency}\" is in \
         catalog {dependency_catalog}, which does not match catalog {object_catalog}; \
         cross catalog dependencies are not supported"
    )]
    CrossCatalog {
        /// Name of the object being registered.
        object: String,
        /// Name of the offending dependency.
        dependency: String,
        /// Catalog of the object.
        object_catalog: String,
        /// Catalog of the dependency.
        dependency_catalog: String,
    },
}

/// Ownership conflicts rejected by `add_ownership`.
#[derive(Debug, Error)]
pub enum OwnershipError {
    /// System entries cannot own or be owned.
    #[error("\"{name}\" is a system entry and cannot take part in ownership")]
    SystemEntry {
        /// Name of the system entry.
        name: String,
    },

    /// The prospective owner already has an owner.
    #[error("{owner} already owned by {by}")]
    AlreadyOwned {
        /// Prospective owner.
        owner: String,
        /// Its current owner.
        by: String,
    },

    /// The entry already has a dependent other than the owner.
    #[error("{entry} already depends on {other}")]
    AlreadyDepends {
        /// Entry to be owned.
        entry: String,
        /// Existing dependent.
        other: String,
    },

    /// The entry already owns the prospective owner.
    #[error("{entry} already owns {owner}; cannot have circular dependencies")]
    Circular {
        /// Entry to be owned.
        entry: String,
        /// Prospective owner.
        owner: String,
    },
}
