//! Statement execution against an in-memory catalog.

use std::sync::Arc;

use relcat_core::{
    AlterAction, AlterInfo, Catalog, CatalogConfig, CatalogEntry, CatalogType, CreateInfo, DependencyList,
    DropInfo, ObjectIdentity, Transaction, TransactionManager,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::formatter::Formatter;
use crate::statement::{self, ParseError, QualifiedName, Statement};

/// Kinds tried, in order, when resolving an `ON` reference.
const REFERENCE_KINDS: [CatalogType; 7] = [
    CatalogType::Table,
    CatalogType::View,
    CatalogType::Sequence,
    CatalogType::Macro,
    CatalogType::TableMacro,
    CatalogType::Type,
    CatalogType::Index,
];

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Statement could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The catalog rejected the statement.
    #[error("{0}")]
    Catalog(#[from] relcat_core::Error),

    /// An `ON` reference matched no object.
    #[error("no object named \"{0}\"")]
    UnknownReference(String),

    /// Transaction control used out of order.
    #[error("{0}")]
    Session(&'static str),
}

/// A catalog plus the explicit transaction opened by `BEGIN`, if any.
///
/// Outside an explicit transaction every statement runs in its own
/// transaction, committed on success and rolled back on failure.
pub struct Session {
    catalog: Catalog,
    tx: Option<Transaction>,
}

impl Session {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            catalog: Catalog::new("memory", Arc::new(TransactionManager::new()), config),
            tx: None,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Whether the explicit transaction failed and awaits `ROLLBACK`.
    pub fn is_aborted(&self) -> bool {
        self.tx.as_ref().is_some_and(Transaction::is_invalidated)
    }

    /// Names of objects in the default schema, for completion.
    pub fn object_names(&self) -> Vec<String> {
        let schema = self.catalog.config().default_schema.as_str();
        let read = |tx: &Transaction| {
            self.catalog
                .list_entries(tx, schema)
                .map(|entries| entries.iter().map(|entry| entry.name().to_string()).collect())
                .unwrap_or_default()
        };
        match &self.tx {
            Some(tx) if tx.is_active() && !tx.is_invalidated() => read(tx),
            _ => {
                let tx = self.catalog.begin();
                let names = read(&tx);
                let _ = self.catalog.rollback(&tx);
                names
            }
        }
    }

    /// Parse and execute one statement, returning formatted output.
    pub fn execute(&mut self, input: &str, formatter: &dyn Formatter) -> Result<String, ExecuteError> {
        let statement = statement::parse(input)?;
        debug!(?statement, "executing statement");

        match statement {
            Statement::Begin => {
                if self.tx.is_some() {
                    return Err(ExecuteError::Session("a transaction is already in progress"));
                }
                self.tx = Some(self.catalog.begin());
                Ok(formatter.format_message("BEGIN"))
            }
            Statement::Commit => {
                let tx = self
                    .tx
                    .take()
                    .ok_or(ExecuteError::Session("no transaction in progress"))?;
                if tx.is_invalidated() {
                    self.catalog.rollback(&tx)?;
                    return Ok(formatter.format_message("ROLLBACK"));
                }
                self.catalog.commit(&tx)?;
                Ok(formatter.format_message("COMMIT"))
            }
            Statement::Rollback => {
                let tx = self
                    .tx
                    .take()
                    .ok_or(ExecuteError::Session("no transaction in progress"))?;
                self.catalog.rollback(&tx)?;
                Ok(formatter.format_message("ROLLBACK"))
            }
            Statement::Vacuum => {
                let removed = self.catalog.vacuum();
                Ok(formatter.format_message(&format!("VACUUM {removed}")))
            }
            Statement::ShowRelationships => {
                let relationships = self.run(|catalog, tx| catalog.relationships(tx))?;
                Ok(formatter.format_relationships(&relationships))
            }
            Statement::ShowObjects { schema } => {
                let entries = self.run(|catalog, tx| match &schema {
                    Some(schema) => catalog.list_entries(tx, schema),
                    None => Ok(catalog.list_schemas(tx)),
                })?;
                Ok(formatter.format_objects(&entries))
            }
            Statement::Create {
                kind,
                name,
                on_conflict,
                dependencies,
            } => {
                self.run(|catalog, tx| {
                    let schema = schema_of(catalog, kind, &name);
                    let mut list = DependencyList::new();
                    for reference in &dependencies {
                        list.add(resolve_reference(catalog, tx, reference)?);
                    }
                    let info = CreateInfo::new(kind, schema, name.name.as_str()).with_on_conflict(on_conflict);
                    catalog.create_entry(tx, info, &list)?;
                    Ok::<_, ExecuteError>(())
                })?;
                Ok(formatter.format_message(&format!("CREATE {}", kind_keyword(kind))))
            }
            Statement::Drop {
                kind,
                name,
                if_exists,
                cascade,
            } => {
                let dropped = self.run(|catalog, tx| {
                    let info = DropInfo::new(kind, schema_of(catalog, kind, &name), name.name.as_str())
                        .cascade(cascade)
                        .if_exists(if_exists);
                    catalog.drop_entry(tx, &info)
                })?;
                if dropped {
                    Ok(formatter.format_message(&format!("DROP {}", kind_keyword(kind))))
                } else {
                    Ok(formatter.format_message(&format!("{} \"{}\" does not exist, skipping", kind, name.name)))
                }
            }
            Statement::Rename { kind, name, new_name } => {
                self.alter(kind, &name, AlterAction::Rename(new_name))?;
                Ok(formatter.format_message(&format!("ALTER {}", kind_keyword(kind))))
            }
            Statement::Comment { kind, name, comment } => {
                self.alter(kind, &name, AlterAction::SetComment(comment))?;
                Ok(formatter.format_message("COMMENT"))
            }
            Statement::OwnedBy {
                kind,
                name,
                owner_kind,
                owner,
            } => {
                self.run(|catalog, tx| {
                    let owned = ObjectIdentity::new(kind, schema_of(catalog, kind, &name), name.name.as_str());
                    let owner = ObjectIdentity::new(
                        owner_kind,
                        schema_of(catalog, owner_kind, &owner),
                        owner.name.as_str(),
                    );
                    catalog.add_ownership(tx, &owner, &owned)
                })?;
                Ok(formatter.format_message(&format!("ALTER {}", kind_keyword(kind))))
            }
        }
    }

    fn alter(&mut self, kind: CatalogType, name: &QualifiedName, action: AlterAction) -> Result<(), ExecuteError> {
        self.run(|catalog, tx| {
            let info = AlterInfo::new(kind, schema_of(catalog, kind, name), name.name.as_str(), action);
            catalog.alter_entry(tx, &info).map(|_| ())
        })
    }

    /// Run `f` in the explicit transaction, or in a fresh one that is
    /// committed on success and rolled back on failure.
    fn run<T, E>(&mut self, f: impl FnOnce(&Catalog, &Transaction) -> Result<T, E>) -> Result<T, ExecuteError>
    where
        E: Into<ExecuteError>,
    {
        if let Some(tx) = &self.tx {
            return f(&self.catalog, tx).map_err(Into::into);
        }

        let tx = self.catalog.begin();
        match f(&self.catalog, &tx) {
            Ok(value) => {
                self.catalog.commit(&tx)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.catalog.rollback(&tx) {
                    warn!(txid = tx.id(), error = %rollback, "rollback after failed statement failed");
                }
                Err(err.into())
            }
        }
    }
}

fn schema_of<'a>(catalog: &'a Catalog, kind: CatalogType, name: &'a QualifiedName) -> &'a str {
    if kind == CatalogType::Schema {
        return name.name.as_str();
    }
    name.schema_or(&catalog.config().default_schema)
}

fn resolve_reference(
    catalog: &Catalog,
    tx: &Transaction,
    reference: &QualifiedName,
) -> Result<Arc<CatalogEntry>, ExecuteError> {
    let schema = reference.schema_or(&catalog.config().default_schema);
    REFERENCE_KINDS
        .iter()
        .find_map(|&kind| catalog.get_entry(tx, kind, schema, &reference.name))
        .ok_or_else(|| ExecuteError::UnknownReference(format!("{schema}.{}", reference.name)))
}

fn kind_keyword(kind: CatalogType) -> String {
    kind.as_str().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{JsonFormatter, TableFormatter};
    use relcat_core::{DependencyError, Error};

    fn session() -> Session {
        Session::new(CatalogConfig::default())
    }

    fn run(session: &mut Session, statements: &[&str]) {
        for statement in statements {
            session.execute(statement, &TableFormatter).unwrap();
        }
    }

    #[test]
    fn test_autocommit_create_and_show() {
        let mut session = session();
        run(&mut session, &["CREATE TABLE t", "CREATE VIEW v ON t"]);

        let output = session.execute("SHOW RELATIONSHIPS", &JsonFormatter).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["object"]["name"], "t");
        assert_eq!(parsed[0]["dependent"]["name"], "v");
        assert_eq!(parsed[0]["dependency_type"], "Regular");
    }

    #[test]
    fn test_drop_blocked_then_cascade() {
        let mut session = session();
        run(&mut session, &["CREATE TABLE t", "CREATE VIEW v ON t"]);

        let err = session.execute("DROP TABLE t", &TableFormatter).unwrap_err();
        assert!(matches!(
            err,
            ExecuteError::Catalog(Error::DependencyViolation(DependencyError::DropBlocked { .. }))
        ));
        // the failed autocommit statement left nothing behind
        assert_eq!(session.object_names(), vec!["t", "v"]);

        session.execute("DROP TABLE t CASCADE", &TableFormatter).unwrap();
        assert!(session.object_names().is_empty());
    }

    #[test]
    fn test_explicit_transaction_rollback() {
        let mut session = session();
        run(&mut session, &["BEGIN", "CREATE TABLE t"]);
        assert!(session.in_transaction());
        assert_eq!(session.object_names(), vec!["t"]);

        run(&mut session, &["ROLLBACK"]);
        assert!(!session.in_transaction());
        assert!(session.object_names().is_empty());
    }

    #[test]
    fn test_failed_statement_aborts_transaction() {
        let mut session = session();
        run(&mut session, &["BEGIN", "CREATE TABLE t"]);
        assert!(session.execute("CREATE TABLE t", &TableFormatter).is_err());
        assert!(session.is_aborted());

        let err = session.execute("CREATE TABLE u", &TableFormatter).unwrap_err();
        assert!(matches!(err, ExecuteError::Catalog(Error::Transaction(_))));

        let output = session.execute("COMMIT", &TableFormatter).unwrap();
        assert_eq!(output, "ROLLBACK");
        assert!(session.object_names().is_empty());
    }

    #[test]
    fn test_transaction_control_errors() {
        let mut session = session();
        assert!(matches!(
            session.execute("COMMIT", &TableFormatter),
            Err(ExecuteError::Session(_))
        ));
        run(&mut session, &["BEGIN"]);
        assert!(matches!(
            session.execute("BEGIN", &TableFormatter),
            Err(ExecuteError::Session(_))
        ));
    }

    #[test]
    fn test_ownership_and_rename() {
        let mut session = session();
        run(
            &mut session,
            &[
                "CREATE TABLE t",
                "CREATE SEQUENCE s",
                "ALTER SEQUENCE s OWNED BY TABLE t",
                "ALTER TABLE t RENAME TO t2",
            ],
        );
        let relationships = session.run(|catalog, tx| catalog.relationships(tx)).unwrap();
        assert!(relationships
            .iter()
            .all(|relationship| relationship.object.name != "t" && relationship.dependent.name != "t"));
        assert!(relationships.iter().any(|relationship| relationship.object.name == "t2"));

        run(&mut session, &["DROP TABLE t2"]);
        assert!(session.object_names().is_empty());
    }

    #[test]
    fn test_schema_scoped_statements() {
        let mut session = session();
        run(
            &mut session,
            &["CREATE SCHEMA s", "CREATE TABLE s.t", "COMMENT ON TABLE s.t IS 'facts'"],
        );
        let output = session.execute("SHOW OBJECTS s", &JsonFormatter).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["comment"], "facts");

        assert!(session.execute("DROP SCHEMA s", &TableFormatter).is_err());
        run(&mut session, &["DROP SCHEMA s CASCADE"]);
        assert!(session.execute("SHOW OBJECTS s", &TableFormatter).is_err());
    }

    #[test]
    fn test_unknown_reference() {
        let mut session = session();
        let err = session.execute("CREATE VIEW v ON missing", &TableFormatter).unwrap_err();
        assert!(matches!(err, ExecuteError::UnknownReference(name) if name == "main.missing"));
    }

    #[test]
    fn test_drop_if_exists_message() {
        let mut session = session();
        let output = session.execute("DROP TABLE IF EXISTS t", &TableFormatter).unwrap();
        assert!(output.contains("does not exist"));
    }
}
