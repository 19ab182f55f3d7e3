//! Output formatters for statement results.

use std::sync::Arc;

use clap::ValueEnum;
use comfy_table::Table;
use relcat_core::{CatalogEntry, Relationship};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the relationships view.
    fn format_relationships(&self, relationships: &[Relationship]) -> String;

    /// Format a listing of catalog entries.
    fn format_objects(&self, entries: &[Arc<CatalogEntry>]) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn entry_schema(entry: &CatalogEntry) -> &str {
    entry
        .as_object()
        .map(|object| object.schema.as_str())
        .unwrap_or_default()
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_relationships(&self, relationships: &[Relationship]) -> String {
        if relationships.is_empty() {
            return "No relationships".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Object", "Dependent", "Type"]);
        for relationship in relationships {
            table.add_row(vec![
                relationship.object.to_string(),
                relationship.dependent.to_string(),
                relationship.dependency_type.to_string(),
            ]);
        }
        table.to_string()
    }

    fn format_objects(&self, entries: &[Arc<CatalogEntry>]) -> String {
        if entries.is_empty() {
            return "No objects".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Schema", "Name", "Type", "Comment"]);
        for entry in entries {
            table.add_row(vec![
                entry_schema(entry).to_string(),
                entry.name().to_string(),
                entry.kind().to_string(),
                entry.comment().unwrap_or_default().to_string(),
            ]);
        }
        table.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_relationships(&self, relationships: &[Relationship]) -> String {
        serde_json::to_string_pretty(relationships).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_objects(&self, entries: &[Arc<CatalogEntry>]) -> String {
        let rows: Vec<serde_json::Value> = entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "schema": entry_schema(entry),
                    "name": entry.name(),
                    "type": entry.kind(),
                    "comment": entry.comment(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({
            "error": error
        })
        .to_string()
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({
            "message": message
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcat_core::{CatalogId, CatalogType, DependencyType, ObjectIdentity};

    fn relationship() -> Relationship {
        Relationship {
            object: ObjectIdentity::new(CatalogType::Table, "main", "t"),
            dependent: ObjectIdentity::new(CatalogType::View, "main", "v"),
            dependency_type: DependencyType::Regular,
        }
    }

    #[test]
    fn test_table_relationships() {
        let output = TableFormatter.format_relationships(&[relationship()]);
        assert!(output.contains("Table main.t"));
        assert!(output.contains("View main.v"));
        assert!(output.contains("regular"));
        assert_eq!(TableFormatter.format_relationships(&[]), "No relationships");
    }

    #[test]
    fn test_json_relationships() {
        let output = JsonFormatter.format_relationships(&[relationship()]);
        let parsed: Vec<Relationship> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, vec![relationship()]);
    }

    #[test]
    fn test_json_objects() {
        let entry = CatalogEntry::object(CatalogId::new(1), CatalogType::Sequence, "main", "s")
            .with_comment(Some("ids".to_string()));
        let output = JsonFormatter.format_objects(&[Arc::new(entry)]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["name"], "s");
        assert_eq!(parsed[0]["schema"], "main");
        assert_eq!(parsed[0]["comment"], "ids");
    }

    #[test]
    fn test_error_formats() {
        assert_eq!(TableFormatter.format_error("boom"), "Error: boom");
        assert_eq!(JsonFormatter.format_error("boom"), r#"{"error":"boom"}"#);
    }
}
