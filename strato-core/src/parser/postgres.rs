//! PostgreSQL dialect hooks: dollar-quoted strings, `BEGIN ATOMIC` blocks,
//! `COPY ... FROM STDIN` payloads and non-transactional statement detection.

use std::sync::LazyLock;

use regex::Regex;

use super::dialect::{BlockContext, Dialect, Keyword, StatementType, Transactional};
use super::scanner::Scanner;
use super::{ParseError, ParsingContext};

static COPY_FROM_STDIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^COPY( .*)? FROM STDIN").unwrap());

static CREATE_DATABASE_TABLESPACE_SUBSCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(CREATE|DROP) (DATABASE|TABLESPACE|SUBSCRIPTION)").unwrap());
static ALTER_SYSTEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ALTER SYSTEM").unwrap());
static INDEX_CONCURRENTLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(CREATE|DROP)( UNIQUE)? INDEX CONCURRENTLY").unwrap());
static REINDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^REINDEX( VERBOSE)? (SCHEMA|DATABASE|SYSTEM)").unwrap());
static VACUUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^VACUUM").unwrap());
static DISCARD_ALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^DISCARD ALL").unwrap());
static ALTER_TYPE_ADD_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ALTER TYPE( .*)? ADD VALUE").unwrap());

/// `ALTER TYPE ... ADD VALUE` became transactional in server version 12.
const ALTER_TYPE_TRANSACTIONAL_SINCE: u32 = 12;

/// PostgreSQL parsing rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn alternative_string_literal_quote(&self) -> Option<char> {
        Some('$')
    }

    /// A dollar quote is `$`, an optional tag (identifier-like, not starting
    /// with a digit), then `$`. Anything else, e.g. a `$1` parameter, is
    /// left to the ordinary tokenizer.
    fn is_alternative_string_literal(&self, scanner: &Scanner) -> bool {
        let mut n = 1;
        while let Some(c) = scanner.peek_at(n) {
            if c == '$' {
                return true;
            }
            let tag_start = n == 1;
            if !(c.is_alphanumeric() || c == '_') || (tag_start && c.is_ascii_digit()) {
                return false;
            }
            n += 1;
        }
        false
    }

    /// Consume `$tag$ ... $tag$`. The tag may be empty or labeled
    /// (`$body$`); the literal ends at the first occurrence of the exact
    /// opening tag, so dollar quotes do not nest.
    fn read_alternative_string_literal(&self, scanner: &mut Scanner) -> Result<(), ParseError> {
        let line = scanner.line();
        let col = scanner.col();

        let mut tag = String::new();
        tag.push(scanner.next().expect("caller checked for '$'"));
        loop {
            match scanner.next() {
                Some('$') => {
                    tag.push('$');
                    break;
                }
                Some(c) => tag.push(c),
                None => {
                    return Err(ParseError {
                        line,
                        col,
                        message: "unterminated dollar-quote tag".to_owned(),
                    });
                }
            }
        }

        while !scanner.looking_at(&tag) {
            if scanner.next().is_none() {
                return Err(ParseError {
                    line,
                    col,
                    message: format!("unterminated dollar-quoted string (expected {tag})"),
                });
            }
        }
        scanner.advance(tag.chars().count());

        Ok(())
    }

    fn detect_statement_type(&self, simplified: &str) -> StatementType {
        if COPY_FROM_STDIN.is_match(simplified) {
            StatementType::CopyFromStdin
        } else {
            StatementType::Generic
        }
    }

    fn detect_can_execute_in_transaction(
        &self,
        simplified: &str,
        ctx: &ParsingContext,
    ) -> Transactional {
        if CREATE_DATABASE_TABLESPACE_SUBSCRIPTION.is_match(simplified)
            || ALTER_SYSTEM.is_match(simplified)
            || INDEX_CONCURRENTLY.is_match(simplified)
            || REINDEX.is_match(simplified)
            || VACUUM.is_match(simplified)
            || DISCARD_ALL.is_match(simplified)
        {
            return Transactional::No;
        }

        // Unknown server version is treated as pre-12; wrongly assuming a
        // transactional ALTER TYPE would abort the whole group on execution.
        let under_12 = match ctx.database_version {
            Some(major) => major < ALTER_TYPE_TRANSACTIONAL_SINCE,
            None => true,
        };
        if under_12 && ALTER_TYPE_ADD_VALUE.is_match(simplified) {
            return Transactional::No;
        }

        Transactional::Inherit
    }

    fn adjust_block_depth(&self, context: &mut BlockContext, keyword: &str, tokens: &[Keyword]) {
        let last_is_begin = tokens
            .last()
            .is_some_and(|t| t.text == "BEGIN" && t.parens_depth == context.parens_depth());

        if keyword.eq_ignore_ascii_case("ATOMIC") && last_is_begin {
            context.increase_block_depth("ATOMIC");
        }
        if keyword.eq_ignore_ascii_case("CASE") && context.block_initiator() == Some("ATOMIC") {
            context.increase_block_depth("CASE");
        }

        if context.block_depth() > 0
            && keyword.eq_ignore_ascii_case("END")
            && matches!(context.block_initiator(), Some("ATOMIC") | Some("CASE"))
        {
            context.decrease_block_depth();
        }
    }

    /// Consume lines verbatim until a line whose trimmed content is `\.`;
    /// the sentinel line is discarded, everything before it is the payload.
    fn read_inline_payload(&self, scanner: &mut Scanner) -> Result<String, ParseError> {
        // Skip the rest of the line holding the statement delimiter.
        scanner.skip_line();

        let mut data = String::new();
        loop {
            if scanner.eof() {
                return Err(ParseError {
                    line: scanner.line(),
                    col: scanner.col(),
                    message: "unexpected end of script inside COPY payload (missing \\.)"
                        .to_owned(),
                });
            }
            let line = scanner.skip_line();
            if line.trim() == "\\." {
                return Ok(data);
            }
            data.push_str(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::sync::Arc;

    fn parser() -> Parser {
        Parser::new(Arc::new(PostgresDialect), ParsingContext::default())
    }

    fn parser_for_version(major: u32) -> Parser {
        Parser::new(
            Arc::new(PostgresDialect),
            ParsingContext {
                database_version: Some(major),
                ..ParsingContext::default()
            },
        )
    }

    #[test]
    fn dollar_quoted_string_masks_delimiters() {
        let statements = parser()
            .parse("CREATE FUNCTION f() RETURNS void AS $$ SELECT 1; SELECT 2; $$ LANGUAGE sql;")
            .unwrap();

        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn labeled_dollar_quote_round_trips() {
        let statements = parser()
            .parse("SELECT $a$hello $world$ still in$a$;")
            .unwrap();

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "SELECT $a$hello $world$ still in$a$");
    }

    #[test]
    fn inner_tag_terminates_the_string() {
        // Dollar quotes do not nest: the second $x$ ends the literal.
        let statements = parser().parse("SELECT $x$a$x$, $x$b$x$;").unwrap();

        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn parameter_markers_are_not_dollar_quotes() {
        let statements = parser().parse("SELECT $1; SELECT $2;").unwrap();

        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn unterminated_dollar_quote_is_an_error() {
        let err = parser().parse("SELECT $tag$never closed;").unwrap_err();

        assert!(err.message.contains("unterminated dollar-quoted string"));
    }

    #[test]
    fn begin_atomic_masks_delimiters() {
        let statements = parser()
            .parse(
                "CREATE FUNCTION add(a INT, b INT) RETURNS INT LANGUAGE SQL \
                 BEGIN ATOMIC SELECT a + b; END;",
            )
            .unwrap();

        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn case_inside_atomic_block_tracks_depth() {
        let statements = parser()
            .parse(
                "CREATE FUNCTION sign(x INT) RETURNS INT LANGUAGE SQL BEGIN ATOMIC \
                 SELECT CASE WHEN x > 0 THEN 1 ELSE 0 END; END;\nSELECT 1;",
            )
            .unwrap();

        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn unterminated_atomic_block_is_an_error() {
        let err = parser()
            .parse("CREATE FUNCTION f() RETURNS INT LANGUAGE SQL BEGIN ATOMIC SELECT 1;")
            .unwrap_err();

        assert!(err.message.contains("unterminated block"));
    }

    #[test]
    fn case_outside_atomic_is_expression_level() {
        let statements = parser()
            .parse("SELECT CASE WHEN a > 0 THEN 1 ELSE 0 END FROM t;")
            .unwrap();

        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn copy_from_stdin_captures_payload() {
        let statements = parser()
            .parse("COPY t(a) FROM STDIN;\n1\n2\n\\.\n")
            .unwrap();

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].kind, StatementType::CopyFromStdin);
        assert_eq!(statements[0].sql, "COPY t(a) FROM STDIN");
        assert_eq!(statements[0].copy_data.as_deref(), Some("1\n2\n"));
    }

    #[test]
    fn copy_payload_preserves_inner_whitespace() {
        let statements = parser()
            .parse("COPY t(a, b) FROM STDIN;\n1\tx\n2\ty\n  \\.  \nSELECT 1;")
            .unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].copy_data.as_deref(), Some("1\tx\n2\ty\n"));
        assert_eq!(statements[1].sql, "SELECT 1");
    }

    #[test]
    fn copy_without_sentinel_is_an_error() {
        let err = parser().parse("COPY t(a) FROM STDIN;\n1\n2\n").unwrap_err();

        assert!(err.message.contains("COPY payload"));
    }

    #[test]
    fn non_transactional_statements_are_detected() {
        let cases = [
            "CREATE DATABASE other",
            "DROP TABLESPACE big",
            "CREATE SUBSCRIPTION sub CONNECTION 'x' PUBLICATION p",
            "ALTER SYSTEM SET work_mem = '64MB'",
            "CREATE INDEX CONCURRENTLY idx ON t (a)",
            "CREATE UNIQUE INDEX CONCURRENTLY idx ON t (a)",
            "DROP INDEX CONCURRENTLY idx",
            "REINDEX SCHEMA public",
            "REINDEX VERBOSE DATABASE app",
            "VACUUM t",
            "DISCARD ALL",
        ];

        for sql in cases {
            let statements = parser().parse(sql).unwrap();
            assert_eq!(
                statements[0].transactional,
                Transactional::No,
                "expected non-transactional: {sql}"
            );
            assert!(!statements[0].can_execute_in_transaction());
        }
    }

    #[test]
    fn plain_statements_inherit() {
        for sql in ["SELECT 1", "INSERT INTO t VALUES(1)", "CREATE INDEX i ON t (a)"] {
            let statements = parser().parse(sql).unwrap();
            assert_eq!(statements[0].transactional, Transactional::Inherit);
            assert!(statements[0].can_execute_in_transaction());
        }
    }

    #[test]
    fn alter_type_add_value_depends_on_server_version() {
        let sql = "ALTER TYPE mood ADD VALUE 'meh'";

        // Old server: non-transactional.
        let statements = parser_for_version(11).parse(sql).unwrap();
        assert_eq!(statements[0].transactional, Transactional::No);

        // Modern server: fine inside a transaction.
        let statements = parser_for_version(14).parse(sql).unwrap();
        assert_eq!(statements[0].transactional, Transactional::Inherit);

        // Unknown version: stay conservative.
        let statements = parser().parse(sql).unwrap();
        assert_eq!(statements[0].transactional, Transactional::No);
    }

    #[test]
    fn classification_ignores_leading_comments_and_case() {
        let statements = parser()
            .parse("-- rebuild\n/* all of it */ reindex schema public;")
            .unwrap();

        assert_eq!(statements[0].transactional, Transactional::No);
    }
}
