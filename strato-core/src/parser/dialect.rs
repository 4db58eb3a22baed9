//! Dialect capability hooks consumed by the parser.

use super::scanner::Scanner;
use super::{ParseError, ParsingContext};

/// Three-valued transactionality verdict for a statement.
///
/// `Inherit` defers to the engine default (transactional).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transactional {
    Yes,
    No,
    Inherit,
}

impl Transactional {
    /// Resolve against the engine default.
    pub fn as_bool(self) -> bool {
        !matches!(self, Transactional::No)
    }
}

/// Statement classification produced by [`Dialect::detect_statement_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Generic,
    /// `COPY ... FROM STDIN`; an inline payload follows the statement.
    CopyFromStdin,
}

/// A keyword token with the parenthesis depth it was read at.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub text: String,
    pub parens_depth: u32,
}

/// Block and parenthesis nesting state while reading one statement.
///
/// While any depth is positive the statement delimiter is masked.
#[derive(Debug, Default)]
pub struct BlockContext {
    parens_depth: u32,
    initiators: Vec<String>,
}

impl BlockContext {
    pub fn parens_depth(&self) -> u32 {
        self.parens_depth
    }

    pub(super) fn open_parens(&mut self) {
        self.parens_depth += 1;
    }

    pub(super) fn close_parens(&mut self) {
        self.parens_depth = self.parens_depth.saturating_sub(1);
    }

    pub fn block_depth(&self) -> u32 {
        self.initiators.len() as u32
    }

    /// The keyword that opened the innermost block, e.g. `ATOMIC`.
    pub fn block_initiator(&self) -> Option<&str> {
        self.initiators.last().map(String::as_str)
    }

    pub fn increase_block_depth(&mut self, initiator: &str) {
        self.initiators.push(initiator.to_owned());
    }

    pub fn decrease_block_depth(&mut self) {
        self.initiators.pop();
    }
}

/// Dialect-specific parsing behavior.
///
/// The default implementation parses plain standard SQL; databases override
/// individual hooks.
pub trait Dialect: Send + Sync {
    /// A sentinel character opening a dialect-specific string literal,
    /// e.g. `$` for PostgreSQL dollar-quoting.
    fn alternative_string_literal_quote(&self) -> Option<char> {
        None
    }

    /// Whether the cursor, positioned on the sentinel character, really
    /// starts an alternative literal (and not, say, a parameter marker).
    fn is_alternative_string_literal(&self, _scanner: &Scanner) -> bool {
        false
    }

    /// Consume an alternative string literal up to and including its
    /// terminator. Only called when
    /// [`is_alternative_string_literal`](Dialect::is_alternative_string_literal)
    /// returned true.
    fn read_alternative_string_literal(&self, _scanner: &mut Scanner) -> Result<(), ParseError> {
        Ok(())
    }

    /// Classify the simplified statement (comments stripped, whitespace
    /// collapsed, upper-cased).
    fn detect_statement_type(&self, _simplified: &str) -> StatementType {
        StatementType::Generic
    }

    /// Transactionality of the simplified statement.
    fn detect_can_execute_in_transaction(
        &self,
        _simplified: &str,
        _ctx: &ParsingContext,
    ) -> Transactional {
        Transactional::Inherit
    }

    /// Track dialect-specific block constructs. Called for each keyword
    /// before it is appended to `tokens`.
    fn adjust_block_depth(&self, _context: &mut BlockContext, _keyword: &str, _tokens: &[Keyword]) {}

    /// Consume the inline payload following a
    /// [`StatementType::CopyFromStdin`] statement.
    fn read_inline_payload(&self, _scanner: &mut Scanner) -> Result<String, ParseError> {
        Ok(String::new())
    }
}

/// Standard SQL with no dialect extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl Dialect for GenericDialect {}
