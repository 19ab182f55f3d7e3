//! Statement parsing for the shell.
//!
//! The grammar is a small DDL subset:
//!
//! ```text
//! BEGIN | COMMIT | ROLLBACK | VACUUM
//! CREATE [OR REPLACE] <kind> [IF NOT EXISTS] <name> [ON <name>, ...]
//! DROP <kind> [IF EXISTS] <name> [CASCADE]
//! ALTER <kind> <name> RENAME TO <ident>
//! ALTER <kind> <name> OWNED BY <kind> <name>
//! COMMENT ON <kind> <name> IS '<text>' | NULL
//! SHOW RELATIONSHIPS | SHOW OBJECTS [<schema>]
//! ```
//!
//! `<name>` is `schema.name` or a bare name in the default schema.

use relcat_core::catalog::OnCreateConflict;
use relcat_core::CatalogType;
use thiserror::Error;

/// Parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty statement")]
    Empty,

    #[error("unexpected end of statement, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("unexpected \"{found}\", expected {expected}")]
    Unexpected { found: String, expected: &'static str },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unknown object kind \"{0}\"")]
    UnknownKind(String),

    #[error("invalid name \"{0}\"")]
    InvalidName(String),
}

/// A possibly schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    fn parse(raw: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidName(raw.to_string());
        match raw.split_once('.') {
            Some((schema, name)) => {
                if schema.is_empty() || name.is_empty() || name.contains('.') {
                    return Err(invalid());
                }
                Ok(Self {
                    schema: Some(schema.to_string()),
                    name: name.to_string(),
                })
            }
            None if raw.is_empty() => Err(invalid()),
            None => Ok(Self {
                schema: None,
                name: raw.to_string(),
            }),
        }
    }

    /// Schema component, falling back to `default`.
    pub fn schema_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(default)
    }
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Begin,
    Commit,
    Rollback,
    Vacuum,
    Create {
        kind: CatalogType,
        name: QualifiedName,
        on_conflict: OnCreateConflict,
        dependencies: Vec<QualifiedName>,
    },
    Drop {
        kind: CatalogType,
        name: QualifiedName,
        if_exists: bool,
        cascade: bool,
    },
    Rename {
        kind: CatalogType,
        name: QualifiedName,
        new_name: String,
    },
    OwnedBy {
        kind: CatalogType,
        name: QualifiedName,
        owner_kind: CatalogType,
        owner: QualifiedName,
    },
    Comment {
        kind: CatalogType,
        name: QualifiedName,
        comment: Option<String>,
    },
    ShowRelationships,
    ShowObjects {
        schema: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(word) => word.clone(),
            Token::Str(text) => format!("'{text}'"),
            Token::Comma => ",".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ';' => {
                chars.next();
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        // '' escapes a quote
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            text.push('\'');
                        }
                        Some('\'') => break,
                        Some(c) => text.push(c),
                        None => return Err(ParseError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == ',' || c == ';' || c == '\'' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

/// Split a script into statements on `;`, ignoring semicolons inside
/// string literals.
pub fn split_statements(input: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in input.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                current.push(c);
            }
            ';' if !in_string => {
                statements.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    statements.push(current);
    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self, expected: &'static str) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(token)
    }

    fn word(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.next(expected)? {
            Token::Word(word) => Ok(word),
            other => Err(ParseError::Unexpected {
                found: other.describe(),
                expected,
            }),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn accept(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, keyword: &'static str) -> Result<(), ParseError> {
        let word = self.word(keyword)?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(ParseError::Unexpected {
                found: word,
                expected: keyword,
            })
        }
    }

    fn kind(&mut self) -> Result<CatalogType, ParseError> {
        let word = self.word("object kind")?;
        let kind = match word.to_ascii_uppercase().as_str() {
            "TABLE" if self.accept("MACRO") => CatalogType::TableMacro,
            "TABLE" => CatalogType::Table,
            "VIEW" => CatalogType::View,
            "INDEX" => CatalogType::Index,
            "SEQUENCE" => CatalogType::Sequence,
            "MACRO" | "FUNCTION" => CatalogType::Macro,
            "TYPE" => CatalogType::Type,
            "SCHEMA" => CatalogType::Schema,
            _ => return Err(ParseError::UnknownKind(word)),
        };
        Ok(kind)
    }

    fn name(&mut self) -> Result<QualifiedName, ParseError> {
        QualifiedName::parse(&self.word("name")?)
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(token) => Err(ParseError::Unexpected {
                found: token.describe(),
                expected: "end of statement",
            }),
        }
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.word("statement")?;
        let statement = match keyword.to_ascii_uppercase().as_str() {
            "BEGIN" => {
                self.accept("TRANSACTION");
                Statement::Begin
            }
            "COMMIT" | "END" => Statement::Commit,
            "ROLLBACK" | "ABORT" => Statement::Rollback,
            "VACUUM" => Statement::Vacuum,
            "CREATE" => self.create_statement()?,
            "DROP" => self.drop_statement()?,
            "ALTER" => self.alter_statement()?,
            "COMMENT" => self.comment_statement()?,
            "SHOW" => self.show_statement()?,
            _ => {
                return Err(ParseError::Unexpected {
                    found: keyword,
                    expected: "statement",
                })
            }
        };
        self.finish()?;
        Ok(statement)
    }

    fn create_statement(&mut self) -> Result<Statement, ParseError> {
        let mut on_conflict = OnCreateConflict::Error;
        if self.accept("OR") {
            self.expect("REPLACE")?;
            on_conflict = OnCreateConflict::Replace;
        }
        let kind = self.kind()?;
        if self.accept("IF") {
            self.expect("NOT")?;
            self.expect("EXISTS")?;
            on_conflict = OnCreateConflict::Ignore;
        }
        let name = self.name()?;

        let mut dependencies = Vec::new();
        if self.accept("ON") {
            dependencies.push(self.name()?);
            while matches!(self.tokens.get(self.pos), Some(Token::Comma)) {
                self.pos += 1;
                dependencies.push(self.name()?);
            }
        }
        Ok(Statement::Create {
            kind,
            name,
            on_conflict,
            dependencies,
        })
    }

    fn drop_statement(&mut self) -> Result<Statement, ParseError> {
        let kind = self.kind()?;
        let if_exists = if self.accept("IF") {
            self.expect("EXISTS")?;
            true
        } else {
            false
        };
        let name = self.name()?;
        let cascade = if self.accept("CASCADE") {
            true
        } else {
            self.accept("RESTRICT");
            false
        };
        Ok(Statement::Drop {
            kind,
            name,
            if_exists,
            cascade,
        })
    }

    fn alter_statement(&mut self) -> Result<Statement, ParseError> {
        let kind = self.kind()?;
        let name = self.name()?;
        if self.accept("RENAME") {
            self.expect("TO")?;
            let new_name = self.word("new name")?;
            if new_name.contains('.') {
                return Err(ParseError::InvalidName(new_name));
            }
            return Ok(Statement::Rename {
                kind,
                name,
                new_name,
            });
        }
        self.expect("OWNED")?;
        self.expect("BY")?;
        let owner_kind = self.kind()?;
        let owner = self.name()?;
        Ok(Statement::OwnedBy {
            kind,
            name,
            owner_kind,
            owner,
        })
    }

    fn comment_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect("ON")?;
        let kind = self.kind()?;
        let name = self.name()?;
        self.expect("IS")?;
        let comment = match self.next("comment text or NULL")? {
            Token::Str(text) => Some(text),
            Token::Word(word) if word.eq_ignore_ascii_case("NULL") => None,
            other => {
                return Err(ParseError::Unexpected {
                    found: other.describe(),
                    expected: "comment text or NULL",
                })
            }
        };
        Ok(Statement::Comment {
            kind,
            name,
            comment,
        })
    }

    fn show_statement(&mut self) -> Result<Statement, ParseError> {
        let what = self.word("RELATIONSHIPS or OBJECTS")?;
        match what.to_ascii_uppercase().as_str() {
            "RELATIONSHIPS" | "DEPENDENCIES" => Ok(Statement::ShowRelationships),
            "OBJECTS" => {
                let schema = match self.tokens.get(self.pos) {
                    Some(Token::Word(_)) => Some(self.word("schema")?),
                    _ => None,
                };
                Ok(Statement::ShowObjects { schema })
            }
            _ => Err(ParseError::Unexpected {
                found: what,
                expected: "RELATIONSHIPS or OBJECTS",
            }),
        }
    }
}

/// Parse a single statement.
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    Parser { tokens, pos: 0 }.statement()
}
