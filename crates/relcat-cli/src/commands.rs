//! REPL dot-command handling.

use crate::executor::Session;
use crate::formatter::OutputFormat;

/// Result of executing a command.
pub enum CommandResult {
    /// Exit the REPL.
    Exit,
    /// Output to display.
    Output(String),
    /// Change the output format.
    SetFormat(OutputFormat),
    /// Show history.
    ShowHistory,
    /// Clear screen.
    Clear,
}

/// Parse and execute a dot-command.
pub fn handle_command(line: &str, session: &Session, format: OutputFormat) -> CommandResult {
    let line = line.trim();
    let parts: Vec<&str> = line.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let arg = parts.get(1).map(|s| s.trim());

    match command.as_str() {
        ".exit" | ".quit" | ".q" => CommandResult::Exit,

        ".help" | ".h" | ".?" => CommandResult::Output(get_help()),

        ".clear" | ".cls" => CommandResult::Clear,

        ".status" => {
            let catalog = session.catalog();
            let transaction = if session.is_aborted() {
                "aborted, ROLLBACK required"
            } else if session.in_transaction() {
                "open"
            } else {
                "autocommit"
            };
            CommandResult::Output(format!(
                "Catalog {} ({}), default schema {}, transaction: {}",
                catalog.name(),
                catalog.id(),
                catalog.config().default_schema,
                transaction
            ))
        }

        ".format" => {
            if let Some(fmt) = arg {
                match fmt.to_lowercase().as_str() {
                    "table" => CommandResult::SetFormat(OutputFormat::Table),
                    "json" => CommandResult::SetFormat(OutputFormat::Json),
                    _ => CommandResult::Output(format!("Unknown format '{}'. Use: table, json", fmt)),
                }
            } else {
                CommandResult::Output(format!("Current format: {}", format))
            }
        }

        ".history" => CommandResult::ShowHistory,

        _ => CommandResult::Output(format!("Unknown command: {}", command)),
    }
}

/// Check if a line is a dot-command.
pub fn is_command(line: &str) -> bool {
    line.trim().starts_with('.')
}

/// Get help text for REPL commands.
fn get_help() -> String {
    r#"REPL Commands
=============

.status               Show catalog and transaction state
.format [type]        Get or set output format (table, json)
.history              Show statement history
.clear                Clear the screen
.help                 Show this help message
.exit / .quit         Exit the REPL

Statements
==========
BEGIN | COMMIT | ROLLBACK | VACUUM
CREATE [OR REPLACE] <kind> [IF NOT EXISTS] <name> [ON <name>, ...]
DROP <kind> [IF EXISTS] <name> [CASCADE]
ALTER <kind> <name> RENAME TO <new name>
ALTER <kind> <name> OWNED BY <kind> <name>
COMMENT ON <kind> <name> IS '<text>' | NULL
SHOW RELATIONSHIPS
SHOW OBJECTS [<schema>]   (lists schemas when omitted)

Kinds: SCHEMA, TABLE, VIEW, INDEX, SEQUENCE, MACRO, TABLE MACRO, TYPE
Names: schema.name, or a bare name in the default schema

Examples:
  CREATE TABLE orders
  CREATE INDEX orders_idx ON orders
  CREATE SEQUENCE order_ids
  ALTER SEQUENCE order_ids OWNED BY TABLE orders
  DROP TABLE orders
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcat_core::CatalogConfig;

    #[test]
    fn test_is_command() {
        assert!(is_command(".exit"));
        assert!(is_command(".help"));
        assert!(is_command("  .status"));
        assert!(!is_command("CREATE TABLE t"));
        assert!(!is_command("hello"));
    }

    #[test]
    fn test_format_command() {
        let session = Session::new(CatalogConfig::default());
        assert!(matches!(
            handle_command(".format json", &session, OutputFormat::Table),
            CommandResult::SetFormat(OutputFormat::Json)
        ));
        match handle_command(".format", &session, OutputFormat::Table) {
            CommandResult::Output(message) => assert_eq!(message, "Current format: table"),
            _ => panic!("expected output"),
        }
    }

    #[test]
    fn test_status_reports_transaction() {
        let mut session = Session::new(CatalogConfig::default());
        session
            .execute("BEGIN", &crate::formatter::TableFormatter)
            .unwrap();
        match handle_command(".status", &session, OutputFormat::Table) {
            CommandResult::Output(message) => assert!(message.ends_with("transaction: open")),
            _ => panic!("expected output"),
        }
    }
}
