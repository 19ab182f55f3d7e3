//! Tab completion for the REPL.

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;

/// REPL helper with completion support.
pub struct RelcatHelper {
    /// Cached object names from the default schema.
    pub objects: Vec<String>,
}

impl RelcatHelper {
    /// Create a new helper with an empty object list.
    pub fn new() -> Self {
        Self { objects: Vec::new() }
    }

    /// Update the object list.
    pub fn set_objects(&mut self, objects: Vec<String>) {
        self.objects = objects;
    }
}

impl Default for RelcatHelper {
    fn default() -> Self {
        Self::new()
    }
}

/// Dot-commands for completion.
const DOT_COMMANDS: &[&str] = &[".status", ".format", ".history", ".clear", ".help", ".exit", ".quit"];

/// Statement keywords.
const KEYWORDS: &[&str] = &[
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "VACUUM",
    "CREATE",
    "DROP",
    "ALTER",
    "COMMENT",
    "SHOW",
    "OR",
    "REPLACE",
    "IF",
    "NOT",
    "EXISTS",
    "ON",
    "CASCADE",
    "RENAME",
    "TO",
    "OWNED",
    "BY",
    "IS",
    "NULL",
    "RELATIONSHIPS",
    "OBJECTS",
    "SCHEMA",
    "TABLE",
    "VIEW",
    "INDEX",
    "SEQUENCE",
    "MACRO",
    "TYPE",
];

fn candidate(text: &str) -> Pair {
    Pair {
        display: text.to_string(),
        replacement: text.to_string(),
    }
}

impl Completer for RelcatHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = &line[..pos];

        // Dot commands at start of line
        if line_to_cursor.trim_start().starts_with('.') && !line_to_cursor.trim().contains(' ') {
            let typed = line_to_cursor.trim();
            let start = line_to_cursor.len() - line_to_cursor.trim_start().len();
            let completions = DOT_COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(typed))
                .map(|cmd| candidate(cmd))
                .collect();
            return Ok((start, completions));
        }

        let word_start = line_to_cursor
            .rfind(|c: char| c.is_whitespace() || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line_to_cursor[word_start..];
        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }

        let upper = word.to_uppercase();
        let mut completions: Vec<Pair> = KEYWORDS
            .iter()
            .filter(|kw| kw.starts_with(&upper))
            .map(|kw| candidate(kw))
            .collect();
        completions.extend(
            self.objects
                .iter()
                .filter(|name| name.starts_with(word))
                .map(|name| candidate(name)),
        );

        Ok((word_start, completions))
    }
}

impl Hinter for RelcatHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for RelcatHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: rustyline::highlight::CmdKind) -> bool {
        false
    }
}

impl Validator for RelcatHelper {}

impl Helper for RelcatHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::DefaultHistory;

    fn complete(helper: &RelcatHelper, line: &str) -> (usize, Vec<String>) {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let (start, pairs) = helper.complete(line, line.len(), &ctx).unwrap();
        (start, pairs.into_iter().map(|pair| pair.replacement).collect())
    }

    #[test]
    fn test_helper_creation() {
        let helper = RelcatHelper::new();
        assert!(helper.objects.is_empty());
    }

    #[test]
    fn test_complete_dot_command() {
        let helper = RelcatHelper::new();
        let (start, completions) = complete(&helper, ".st");
        assert_eq!(start, 0);
        assert_eq!(completions, vec![".status"]);
    }

    #[test]
    fn test_complete_keywords_and_objects() {
        let mut helper = RelcatHelper::new();
        helper.set_objects(vec!["orders".to_string(), "order_ids".to_string()]);

        let (start, completions) = complete(&helper, "DROP TABLE or");
        assert_eq!(start, 11);
        assert_eq!(completions, vec!["OR", "orders", "order_ids"]);

        let (_, completions) = complete(&helper, "cre");
        assert_eq!(completions, vec!["CREATE"]);
    }
}
