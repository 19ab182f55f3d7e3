//! Catalog entry type tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Type tag of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CatalogType {
    Table,
    View,
    Index,
    Sequence,
    Macro,
    TableMacro,
    Type,
    Schema,
    Database,
    /// A dependency edge record.
    DependencyEntry,
    /// The node marker of a dependency set.
    DependencySet,
}

impl CatalogType {
    /// Every type tag, in declaration order.
    pub const ALL: [CatalogType; 11] = [
        CatalogType::Table,
        CatalogType::View,
        CatalogType::Index,
        CatalogType::Sequence,
        CatalogType::Macro,
        CatalogType::TableMacro,
        CatalogType::Type,
        CatalogType::Schema,
        CatalogType::Database,
        CatalogType::DependencyEntry,
        CatalogType::DependencySet,
    ];

    /// Stable textual tag, used as the first component of mangled names.
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogType::Table => "Table",
            CatalogType::View => "View",
            CatalogType::Index => "Index",
            CatalogType::Sequence => "Sequence",
            CatalogType::Macro => "Macro Function",
            CatalogType::TableMacro => "Table Macro Function",
            CatalogType::Type => "Type",
            CatalogType::Schema => "Schema",
            CatalogType::Database => "Database",
            CatalogType::DependencyEntry => "Dependency",
            CatalogType::DependencySet => "Dependency Set",
        }
    }

    /// Whether entries of this type live inside a schema.
    pub fn is_schema_scoped(&self) -> bool {
        matches!(
            self,
            CatalogType::Table
                | CatalogType::View
                | CatalogType::Index
                | CatalogType::Sequence
                | CatalogType::Macro
                | CatalogType::TableMacro
                | CatalogType::Type
        )
    }
}

impl fmt::Display for CatalogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CatalogType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::consistency(format!("unrecognized catalog type tag \"{s}\"")))
    }
}
