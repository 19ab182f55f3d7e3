//! Re-resolution of stored identities under a transaction snapshot.

use std::sync::Arc;

use tracing::trace;

use super::names::ObjectIdentity;
use crate::catalog::{Catalog, CatalogEntry, CatalogSet, CatalogType, MappingValue};
use crate::error::Error;
use crate::transaction::Transaction;

/// Where an identity currently lives and what `tx` sees there.
#[derive(Debug, Clone)]
pub struct LookupResult {
    /// Collection the identity belongs to.
    pub collection: Arc<CatalogSet>,
    /// Latest binding of the name, if any.
    pub mapping: Option<MappingValue>,
    /// Live version visible to the snapshot, if any.
    pub entry: Option<Arc<CatalogEntry>>,
}

/// Resolves identities to entries. Nothing is cached between calls.
pub struct IdentityResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve `identity` under `tx`.
    ///
    /// The schema is looked up weakly so objects of a schema that `tx` is
    /// in the middle of dropping still resolve. An absent entry is reported
    /// through [`LookupResult::entry`]; only a missing schema is an error.
    pub fn resolve(&self, tx: &Transaction, identity: &ObjectIdentity) -> Result<LookupResult, Error> {
        let schema_missing = || {
            Error::consistency(format!(
                "schema \"{}\" of {identity} could not be resolved",
                identity.schema
            ))
        };
        self.catalog
            .schemas()
            .get_entry_weak(tx, &identity.schema)
            .ok_or_else(schema_missing)?;

        let collection = if identity.kind == CatalogType::Schema {
            Arc::clone(self.catalog.schemas())
        } else {
            let collections = self
                .catalog
                .schema_collections(&identity.schema)
                .ok_or_else(schema_missing)?;
            collections.for_kind(identity.kind).map(Arc::clone).ok_or_else(|| {
                Error::consistency(format!("{identity} does not belong to any collection"))
            })?
        };

        let mapping = collection.get_mapping(tx, &identity.name, true);
        let entry = mapping
            .as_ref()
            .and_then(|mapping| collection.get_entry_by_index(tx, mapping.index))
            // a concurrent rename can leave the index pointing at another name
            .filter(|entry| entry.name() == identity.name && entry.kind() == identity.kind);
        trace!(identity = %identity, found = entry.is_some(), "resolved identity");

        Ok(LookupResult {
            collection,
            mapping,
            entry,
        })
    }

    /// Live entry of `identity`, or `None` if it is absent or unresolvable.
    pub fn resolve_live(&self, tx: &Transaction, identity: &ObjectIdentity) -> Option<Arc<CatalogEntry>> {
        match self.resolve(tx, identity) {
            Ok(lookup) => lookup.entry,
            Err(err) => {
                trace!(identity = %identity, error = %err, "identity not resolvable");
                None
            }
        }
    }
}
