//! Shared parsing infrastructure: the token cursor and located errors.

use std::fmt;

use crate::lexer::{Token, TokenKind, lex};

/// A syntax error with its source location and a rendered context window
/// (five preceding lines, the caret line, two following lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub context: String,
}

impl ParseError {
    /// Lines of context shown before the error.
    pub const PRE_LINES: usize = 5;
    /// Lines of context shown after the error.
    pub const POST_LINES: usize = 2;

    pub fn new(
        file: impl Into<String>,
        source: &str,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let lines: Vec<&str> = source.split('\n').collect();
        let mut context = String::new();
        let first = line.saturating_sub(Self::PRE_LINES + 1);
        for text in lines.iter().take(line).skip(first) {
            context.push_str(text);
            context.push('\n');
        }
        context.push_str(&"~".repeat(column));
        context.push_str("^ ");
        context.push_str(&message);
        context.push('\n');
        for text in lines.iter().take(line + Self::POST_LINES).skip(line) {
            context.push_str(text);
            context.push('\n');
        }
        Self {
            file: file.into(),
            line,
            column,
            message,
            context,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "syntax error in {} at {},{}: {}",
            self.file, self.line, self.column, self.message
        )?;
        f.write_str(&self.context)
    }
}

impl std::error::Error for ParseError {}

/// Forward-only cursor over the visible channel of a token vector.
pub struct TokenCursor<'a> {
    pub source: &'a str,
    pub file: &'a str,
    pub tokens: &'a [Token],
    /// Index of the next *visible* token (hidden tokens are skipped).
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(source: &'a str, file: &'a str, tokens: &'a [Token]) -> Self {
        let mut cursor = Self {
            source,
            file,
            tokens,
            pos: 0,
        };
        cursor.skip_hidden();
        cursor
    }

    fn skip_hidden(&mut self) {
        while self.tokens.get(self.pos).is_some_and(Token::is_hidden) {
            self.pos += 1;
        }
    }

    pub fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// The visible token after the next one.
    pub fn peek_second(&self) -> Token {
        let mut pos = self.pos + 1;
        while self.tokens.get(pos).is_some_and(Token::is_hidden) {
            pos += 1;
        }
        self.tokens[pos.min(self.tokens.len() - 1)]
    }

    pub fn at_eof(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
            self.skip_hidden();
        }
        token
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Consume the next token when it matches.
    pub fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected {what}")))
        }
    }

    pub fn text(&self, token: Token) -> &'a str {
        token.text(self.source)
    }

    pub fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.peek(), message)
    }

    pub fn error_at(&self, token: Token, message: impl Into<String>) -> ParseError {
        ParseError::new(self.file, self.source, token.line, token.column, message)
    }
}

/// Lex and wrap a source in one step.
pub fn tokenize<'a>(
    source: &'a str,
    file: &'a str,
    storage: &'a mut Vec<Token>,
) -> Result<TokenCursor<'a>, ParseError> {
    *storage = lex(source, file)?;
    Ok(TokenCursor::new(source, file, storage))
}

/// Strip one layer of matching quotes from a string-literal token's text.
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// The text of an `%{ … %}` token without the delimiters.
pub fn unparsed_contents(text: &str) -> &str {
    text.strip_prefix("%{")
        .and_then(|t| t.strip_suffix("%}"))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_window_shape() {
        let source = "l1\nl2\nl3\nl4\nl5\nl6\nbad line\nl8\nl9\nl10";
        let error = ParseError::new("t.instr", source, 7, 4, "nope");
        // five lines before, caret line, two after
        assert!(error.context.contains("l2\n"));
        assert!(error.context.contains("bad line\n"));
        assert!(error.context.contains("~~~~^ nope"));
        assert!(error.context.contains("l8\n"));
        assert!(error.context.contains("l9\n"));
        assert!(!error.context.contains("l10"));
        assert!(!error.context.contains("l1\nl2"));
    }

    #[test]
    fn unquote_strips_single_and_double() {
        assert_eq!(unquote("\"/some/dir\""), "/some/dir");
        assert_eq!(unquote("'/other'"), "/other");
        assert_eq!(unquote("bare"), "bare");
    }
}
