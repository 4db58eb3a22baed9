//! SQL script parsing.
//!
//! Splits a script into statements, tracks quoting and block structure so
//! delimiters inside strings, parentheses and `BEGIN ATOMIC` bodies do not
//! terminate statements, and classifies each statement's transactionality
//! through a set of dialect hooks. Structural concerns (strings, comments,
//! blocks) are handled by the tokenizer; classification operates on a
//! simplified statement only.

mod dialect;
mod postgres;
mod scanner;

pub use dialect::{BlockContext, Dialect, GenericDialect, Keyword, StatementType, Transactional};
pub use postgres::PostgresDialect;
pub use scanner::Scanner;

use std::sync::Arc;

/// Position, text and classification of one statement in a script.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    /// Character offset of the first significant character.
    pub offset: usize,
    pub line: u32,
    pub col: u32,
    /// Statement text without the trailing delimiter.
    pub sql: String,
    pub kind: StatementType,
    /// Inline payload for `COPY ... FROM STDIN` statements.
    pub copy_data: Option<String>,
    pub transactional: Transactional,
    pub delimiter: String,
    /// Whether the statement is eligible for client-side batching.
    pub batchable: bool,
}

impl ParsedStatement {
    /// Transactionality with the engine default applied.
    pub fn can_execute_in_transaction(&self) -> bool {
        self.transactional.as_bool()
    }
}

/// Input state shared across the statements of one script.
#[derive(Debug, Clone)]
pub struct ParsingContext {
    /// Statement delimiter; `;` unless the script overrides it.
    pub delimiter: String,
    /// Major server version, when the engine could query it.
    pub database_version: Option<u32>,
}

impl Default for ParsingContext {
    fn default() -> Self {
        Self {
            delimiter: ";".to_owned(),
            database_version: None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at line {line}, column {col}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl ParseError {
    fn new(line: u32, col: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            col,
            message: message.into(),
        }
    }
}

/// Splits scripts into classified statements for one dialect.
pub struct Parser {
    dialect: Arc<dyn Dialect>,
    context: ParsingContext,
}

impl Parser {
    pub fn new(dialect: Arc<dyn Dialect>, context: ParsingContext) -> Self {
        Self { dialect, context }
    }

    pub fn parse(&self, src: &str) -> Result<Vec<ParsedStatement>, ParseError> {
        let mut scanner = Scanner::new(src);
        let mut statements = Vec::new();

        loop {
            self.skip_insignificant(&mut scanner)?;
            scanner.discard_recorded();
            if scanner.eof() {
                break;
            }
            if let Some(statement) = self.parse_statement(&mut scanner)? {
                statements.push(statement);
            }
        }

        Ok(statements)
    }

    /// Consume whitespace and comments between statements.
    fn skip_insignificant(&self, scanner: &mut Scanner) -> Result<(), ParseError> {
        loop {
            match scanner.peek() {
                Some(c) if c.is_whitespace() => {
                    scanner.next();
                }
                Some('-') if scanner.looking_at("--") => self.read_line_comment(scanner),
                Some('/') if scanner.looking_at("/*") => self.read_block_comment(scanner)?,
                _ => return Ok(()),
            }
        }
    }

    fn parse_statement(&self, scanner: &mut Scanner) -> Result<Option<ParsedStatement>, ParseError> {
        let offset = scanner.offset();
        let start_line = scanner.line();
        let start_col = scanner.col();

        let delimiter = self.context.delimiter.clone();
        let mut context = BlockContext::default();
        let mut keywords: Vec<Keyword> = Vec::new();
        // Where the last keyword ended, to spot `E'...'` escape strings.
        let mut last_word_end: Option<(String, usize)> = None;
        let mut terminated = false;

        while !scanner.eof() {
            let top_level = context.parens_depth() == 0 && context.block_depth() == 0;
            if top_level && scanner.looking_at(&delimiter) {
                for _ in 0..delimiter.chars().count() {
                    scanner.skip();
                }
                terminated = true;
                break;
            }

            let c = match scanner.peek() {
                Some(c) => c,
                None => break,
            };

            if c == '\'' {
                let escaped = last_word_end
                    .as_ref()
                    .is_some_and(|(word, end)| word == "E" && *end == scanner.offset());
                self.read_string(scanner, escaped)?;
            } else if c == '"' {
                self.read_quoted_identifier(scanner)?;
            } else if Some(c) == self.dialect.alternative_string_literal_quote()
                && self.dialect.is_alternative_string_literal(scanner)
            {
                self.dialect.read_alternative_string_literal(scanner)?;
            } else if scanner.looking_at("--") {
                self.read_line_comment(scanner);
            } else if scanner.looking_at("/*") {
                self.read_block_comment(scanner)?;
            } else if c == '(' {
                context.open_parens();
                scanner.next();
            } else if c == ')' {
                context.close_parens();
                scanner.next();
            } else if c.is_alphanumeric() || c == '_' {
                let word = self.read_word(scanner);
                self.dialect.adjust_block_depth(&mut context, &word, &keywords);
                last_word_end = Some((word.clone(), scanner.offset()));
                keywords.push(Keyword {
                    text: word,
                    parens_depth: context.parens_depth(),
                });
            } else {
                scanner.next();
            }
        }

        if context.block_depth() > 0 {
            return Err(ParseError::new(
                scanner.line(),
                scanner.col(),
                "unexpected end of script: unterminated block",
            ));
        }

        let (raw, significant) = scanner.take_statement();
        let sql = raw.trim_end().to_owned();
        if sql.is_empty() {
            return Ok(None);
        }

        let simplified = simplify(&significant);
        let kind = self.dialect.detect_statement_type(&simplified);
        let transactional = self
            .dialect
            .detect_can_execute_in_transaction(&simplified, &self.context);

        let copy_data = if kind == StatementType::CopyFromStdin {
            if !terminated && scanner.eof() {
                return Err(ParseError::new(
                    scanner.line(),
                    scanner.col(),
                    "unexpected end of script inside COPY statement",
                ));
            }
            Some(self.dialect.read_inline_payload(scanner)?)
        } else {
            None
        };

        Ok(Some(ParsedStatement {
            offset,
            line: start_line,
            col: start_col,
            sql,
            kind,
            copy_data,
            transactional,
            delimiter,
            batchable: is_batchable(&simplified),
        }))
    }

    fn read_word(&self, scanner: &mut Scanner) -> String {
        let mut word = String::new();
        while let Some(c) = scanner.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c.to_ascii_uppercase());
                scanner.next();
            } else {
                break;
            }
        }
        word
    }

    fn read_string(&self, scanner: &mut Scanner, backslash_escapes: bool) -> Result<(), ParseError> {
        let line = scanner.line();
        let col = scanner.col();
        scanner.next(); // opening quote

        loop {
            match scanner.peek() {
                None => {
                    return Err(ParseError::new(line, col, "unterminated string literal"));
                }
                Some('\\') if backslash_escapes => {
                    scanner.next();
                    scanner.next();
                }
                Some('\'') => {
                    scanner.next();
                    // '' is an escaped quote, not a terminator
                    if scanner.peek() == Some('\'') {
                        scanner.next();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {
                    scanner.next();
                }
            }
        }
    }

    fn read_quoted_identifier(&self, scanner: &mut Scanner) -> Result<(), ParseError> {
        let line = scanner.line();
        let col = scanner.col();
        scanner.next();

        loop {
            match scanner.next() {
                None => {
                    return Err(ParseError::new(line, col, "unterminated quoted identifier"));
                }
                Some('"') => {
                    if scanner.peek() == Some('"') {
                        scanner.next();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn read_line_comment(&self, scanner: &mut Scanner) {
        scanner.set_comment(true);
        while let Some(c) = scanner.peek() {
            if c == '\n' {
                break;
            }
            scanner.next();
        }
        scanner.set_comment(false);
    }

    /// Block comments nest, per PostgreSQL and the SQL standard.
    fn read_block_comment(&self, scanner: &mut Scanner) -> Result<(), ParseError> {
        let line = scanner.line();
        let col = scanner.col();

        scanner.set_comment(true);
        scanner.next();
        scanner.next();
        let mut depth = 1u32;

        while depth > 0 {
            if scanner.looking_at("*/") {
                scanner.next();
                scanner.next();
                depth -= 1;
            } else if scanner.looking_at("/*") {
                scanner.next();
                scanner.next();
                depth += 1;
            } else if scanner.next().is_none() {
                scanner.set_comment(false);
                return Err(ParseError::new(line, col, "unterminated block comment"));
            }
        }

        scanner.set_comment(false);
        Ok(())
    }
}

/// Collapse whitespace runs to single spaces and upper-case, producing the
/// text that classification regexes are anchored against.
fn simplify(significant: &str) -> String {
    let mut out = String::with_capacity(significant.len());
    let mut in_whitespace = false;

    for c in significant.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push(' ');
        }
        in_whitespace = false;
        for upper in c.to_uppercase() {
            out.push(upper);
        }
    }

    out
}

fn is_batchable(simplified: &str) -> bool {
    ["INSERT", "UPDATE", "DELETE", "MERGE"]
        .iter()
        .any(|kw| simplified.starts_with(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Vec<ParsedStatement> {
        Parser::new(Arc::new(GenericDialect), ParsingContext::default())
            .parse(sql)
            .unwrap()
    }

    #[test]
    fn splits_on_delimiter() {
        let statements = parse("CREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);");

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "CREATE TABLE t (id INT)");
        assert_eq!(statements[1].sql, "INSERT INTO t VALUES (1)");
    }

    #[test]
    fn last_statement_needs_no_delimiter() {
        let statements = parse("SELECT 1");

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "SELECT 1");
    }

    #[test]
    fn delimiter_inside_string_is_masked() {
        let statements = parse("INSERT INTO t VALUES ('a;b');");

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn doubled_quote_does_not_terminate_string() {
        let statements = parse("INSERT INTO t VALUES ('it''s;fine');");

        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn escape_string_honors_backslash_quotes() {
        let statements = parse("SELECT E'it\\'s;fine';\nSELECT 2;");

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "SELECT E'it\\'s;fine'");
    }

    #[test]
    fn delimiter_inside_parens_is_masked() {
        let statements = parse("SELECT (1;2);");
        // Not valid SQL, but the parser only cares about structure.
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn comments_are_stripped_between_statements() {
        let statements = parse("-- lead-in\nSELECT 1;\n/* between */\nSELECT 2;");

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "SELECT 1");
        assert_eq!(statements[1].sql, "SELECT 2");
    }

    #[test]
    fn nested_block_comments() {
        let statements = parse("SELECT /* outer /* inner */ still outer */ 1;");

        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn line_and_column_are_tracked() {
        let statements = parse("SELECT 1;\n\n  SELECT 2;");

        assert_eq!(statements[0].line, 1);
        assert_eq!(statements[0].col, 1);
        assert_eq!(statements[1].line, 3);
        assert_eq!(statements[1].col, 3);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Parser::new(Arc::new(GenericDialect), ParsingContext::default())
            .parse("SELECT 'oops;")
            .unwrap_err();

        assert!(err.message.contains("unterminated string"));
        assert_eq!(err.line, 1);
        assert_eq!(err.col, 8);
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let err = Parser::new(Arc::new(GenericDialect), ParsingContext::default())
            .parse("SELECT 1 /* no end")
            .unwrap_err();

        assert!(err.message.contains("unterminated block comment"));
    }

    #[test]
    fn default_classification_inherits() {
        let statements = parse("SELECT 1; INSERT INTO t VALUES(1);");

        for statement in &statements {
            assert_eq!(statement.transactional, Transactional::Inherit);
            assert!(statement.can_execute_in_transaction());
        }
    }

    #[test]
    fn dml_is_batchable() {
        let statements = parse("INSERT INTO t VALUES (1); CREATE TABLE u (id INT);");

        assert!(statements[0].batchable);
        assert!(!statements[1].batchable);
    }

    #[test]
    fn joined_statements_reconstruct_the_script() {
        let src = "CREATE TABLE t (id INT);\nINSERT INTO t VALUES ('a;b');\nSELECT 1;";
        let statements = parse(src);

        let joined = statements
            .iter()
            .map(|s| s.sql.as_str())
            .collect::<Vec<_>>()
            .join(";\n")
            + ";";
        assert_eq!(joined, src);
    }

    #[test]
    fn simplify_collapses_whitespace_and_comments() {
        let statements = parse("create /* hint */ table\n  t (id int);");

        assert_eq!(statements[0].sql, "create /* hint */ table\n  t (id int)");
    }
}
