//! Catalog configuration.

/// Default schema created with every catalog.
pub const DEFAULT_SCHEMA: &str = "main";

/// Default limit on nested cascading drops.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 100;

/// Configuration for a catalog.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Name of the internal schema bootstrapped on creation.
    pub default_schema: String,

    /// Maximum nesting of cascading drops before the drop is aborted.
    pub max_cascade_depth: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_schema: DEFAULT_SCHEMA.to_string(),
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

impl CatalogConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default schema name.
    pub fn with_default_schema(mut self, name: impl Into<String>) -> Self {
        self.default_schema = name.into();
        self
    }

    /// Set the cascade depth limit.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }
}
