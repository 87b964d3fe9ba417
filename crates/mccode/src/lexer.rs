//! Tokenization shared by the `.instr` and `.comp` dialects.
//!
//! Every token is retained, including comments: the formatter replays the
//! hidden channel around the visible structure, so `//…` and `/*…*/` tokens
//! carry their exact byte spans. McCode keywords are case-insensitive;
//! identifiers are not. A `%{ … %}` block is a single token holding the
//! embedded C verbatim.

use crate::parse::ParseError;

/// Which stream a token belongs to. Hidden tokens (comments) never reach the
/// parser but are replayed by the formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Default,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // keywords
    Define,
    Instrument,
    Component,
    Definition,
    Setting,
    Output,
    Parameters,
    Declare,
    UserVars,
    Initialize,
    Trace,
    Save,
    Finally,
    End,
    At,
    Rotated,
    Relative,
    Absolute,
    Previous,
    Myself,
    Next,
    Group,
    Extend,
    When,
    Split,
    Removable,
    Cpu,
    Jump,
    Iterate,
    Copy,
    Share,
    McDisplay,
    MetaData,
    Category,
    Dependency,
    NoAcc,
    Shell,
    Search,
    Inherit,
    Int,
    Double,
    StringType,
    VectorType,
    Null,
    /// `%include`
    Include,
    // literals
    Identifier,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    /// `%{ … %}` with delimiters
    UnparsedBlock,
    // hidden channel
    LineComment,
    BlockComment,
    // punctuation and operators
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Neq,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Not,
    Question,
    Colon,
    Semicolon,
    Dot,
    Arrow,
    Eof,
}

fn keyword(word: &str) -> Option<TokenKind> {
    let upper = word.to_ascii_uppercase();
    Some(match upper.as_str() {
        "DEFINE" => TokenKind::Define,
        "INSTRUMENT" => TokenKind::Instrument,
        "COMPONENT" => TokenKind::Component,
        "DEFINITION" => TokenKind::Definition,
        "SETTING" => TokenKind::Setting,
        "OUTPUT" => TokenKind::Output,
        "PARAMETERS" => TokenKind::Parameters,
        "DECLARE" => TokenKind::Declare,
        "USERVARS" => TokenKind::UserVars,
        "INITIALIZE" | "INITIALISE" => TokenKind::Initialize,
        "TRACE" => TokenKind::Trace,
        "SAVE" => TokenKind::Save,
        "FINALLY" => TokenKind::Finally,
        "END" => TokenKind::End,
        "AT" => TokenKind::At,
        "ROTATED" => TokenKind::Rotated,
        "RELATIVE" => TokenKind::Relative,
        "ABSOLUTE" => TokenKind::Absolute,
        "PREVIOUS" => TokenKind::Previous,
        "MYSELF" => TokenKind::Myself,
        "NEXT" => TokenKind::Next,
        "GROUP" => TokenKind::Group,
        "EXTEND" => TokenKind::Extend,
        "WHEN" => TokenKind::When,
        "SPLIT" => TokenKind::Split,
        "REMOVABLE" => TokenKind::Removable,
        "CPU" => TokenKind::Cpu,
        "JUMP" => TokenKind::Jump,
        "ITERATE" => TokenKind::Iterate,
        "COPY" => TokenKind::Copy,
        "SHARE" => TokenKind::Share,
        "MCDISPLAY" => TokenKind::McDisplay,
        "METADATA" => TokenKind::MetaData,
        "CATEGORY" => TokenKind::Category,
        "DEPENDENCY" => TokenKind::Dependency,
        "NOACC" => TokenKind::NoAcc,
        "SHELL" => TokenKind::Shell,
        "SEARCH" => TokenKind::Search,
        "INHERIT" => TokenKind::Inherit,
        "INT" => TokenKind::Int,
        "DOUBLE" => TokenKind::Double,
        "STRING" => TokenKind::StringType,
        "VECTOR" => TokenKind::VectorType,
        "NULL" => TokenKind::Null,
        _ => return None,
    })
}

/// One lexed token; text is recovered from the source by byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// 1-based line of the first byte.
    pub line: usize,
    /// 0-based column of the first byte.
    pub column: usize,
    pub channel: Channel,
    /// Index into the full token vector (both channels).
    pub index: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_hidden(&self) -> bool {
        self.channel == Channel::Hidden
    }
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    file: &'a str,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ParseError {
        ParseError::new(self.file, self.source, line, column, message)
    }

    fn starts_with(&self, text: &str) -> bool {
        self.source[self.pos..].starts_with(text)
    }
}

/// Tokenize `source`, retaining comments on the hidden channel. The final
/// token is always `Eof`.
pub fn lex(source: &str, file: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        column: 0,
        file,
    };
    let mut tokens = Vec::new();
    let mut push = |kind, start, end, line, column, channel, tokens: &mut Vec<Token>| {
        let index = tokens.len();
        tokens.push(Token {
            kind,
            start,
            end,
            line,
            column,
            channel,
            index,
        });
    };

    while let Some(byte) = lexer.peek() {
        let (start, line, column) = (lexer.pos, lexer.line, lexer.column);
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => {
                lexer.bump();
            }
            b'/' if lexer.peek_at(1) == Some(b'/') => {
                while let Some(next) = lexer.peek() {
                    if next == b'\n' {
                        break;
                    }
                    lexer.bump();
                }
                push(TokenKind::LineComment, start, lexer.pos, line, column, Channel::Hidden, &mut tokens);
            }
            b'/' if lexer.peek_at(1) == Some(b'*') => {
                lexer.bump();
                lexer.bump();
                loop {
                    if lexer.starts_with("*/") {
                        lexer.bump();
                        lexer.bump();
                        break;
                    }
                    if lexer.bump().is_none() {
                        return Err(lexer.error("unterminated block comment", line, column));
                    }
                }
                push(TokenKind::BlockComment, start, lexer.pos, line, column, Channel::Hidden, &mut tokens);
            }
            b'%' if lexer.peek_at(1) == Some(b'{') => {
                lexer.bump();
                lexer.bump();
                loop {
                    if lexer.starts_with("%}") {
                        lexer.bump();
                        lexer.bump();
                        break;
                    }
                    if lexer.bump().is_none() {
                        return Err(lexer.error("unterminated %{ block", line, column));
                    }
                }
                push(TokenKind::UnparsedBlock, start, lexer.pos, line, column, Channel::Default, &mut tokens);
            }
            b'%' if lexer.source[lexer.pos + 1..]
                .to_ascii_lowercase()
                .starts_with("include") =>
            {
                for _ in 0.."%include".len() {
                    lexer.bump();
                }
                push(TokenKind::Include, start, lexer.pos, line, column, Channel::Default, &mut tokens);
            }
            b'"' | b'\'' => {
                let quote = byte;
                lexer.bump();
                loop {
                    match lexer.peek() {
                        Some(b'\\') => {
                            lexer.bump();
                            lexer.bump();
                        }
                        Some(next) if next == quote => {
                            lexer.bump();
                            break;
                        }
                        Some(_) => {
                            lexer.bump();
                        }
                        None => {
                            return Err(lexer.error("unterminated string literal", line, column));
                        }
                    }
                }
                push(TokenKind::StringLiteral, start, lexer.pos, line, column, Channel::Default, &mut tokens);
            }
            b'0'..=b'9' => {
                let mut is_float = false;
                while lexer.peek().is_some_and(|b| b.is_ascii_digit()) {
                    lexer.bump();
                }
                if lexer.peek() == Some(b'.')
                    && lexer.peek_at(1).is_none_or(|b| b.is_ascii_digit() || !is_ident_start(b))
                {
                    is_float = true;
                    lexer.bump();
                    while lexer.peek().is_some_and(|b| b.is_ascii_digit()) {
                        lexer.bump();
                    }
                }
                if matches!(lexer.peek(), Some(b'e' | b'E'))
                    && (lexer.peek_at(1).is_some_and(|b| b.is_ascii_digit())
                        || (matches!(lexer.peek_at(1), Some(b'+' | b'-'))
                            && lexer.peek_at(2).is_some_and(|b| b.is_ascii_digit())))
                {
                    is_float = true;
                    lexer.bump();
                    if matches!(lexer.peek(), Some(b'+' | b'-')) {
                        lexer.bump();
                    }
                    while lexer.peek().is_some_and(|b| b.is_ascii_digit()) {
                        lexer.bump();
                    }
                }
                let kind = if is_float {
                    TokenKind::FloatLiteral
                } else {
                    TokenKind::IntegerLiteral
                };
                push(kind, start, lexer.pos, line, column, Channel::Default, &mut tokens);
            }
            byte if is_ident_start(byte) => {
                while lexer.peek().is_some_and(is_ident_byte) {
                    lexer.bump();
                }
                let word = &lexer.source[start..lexer.pos];
                let kind = keyword(word).unwrap_or(TokenKind::Identifier);
                push(kind, start, lexer.pos, line, column, Channel::Default, &mut tokens);
            }
            byte if !byte.is_ascii() => {
                return Err(lexer.error(
                    "unexpected non-ascii character outside a comment or string",
                    line,
                    column,
                ));
            }
            _ => {
                let two = &lexer.source[lexer.pos..(lexer.pos + 2).min(lexer.source.len())];
                let (kind, length) = match two {
                    "<=" => (TokenKind::Le, 2),
                    ">=" => (TokenKind::Ge, 2),
                    "==" => (TokenKind::EqEq, 2),
                    "!=" => (TokenKind::Neq, 2),
                    "&&" => (TokenKind::AndAnd, 2),
                    "||" => (TokenKind::OrOr, 2),
                    "<<" => (TokenKind::Shl, 2),
                    ">>" => (TokenKind::Shr, 2),
                    "->" => (TokenKind::Arrow, 2),
                    _ => {
                        let kind = match byte {
                            b'(' => TokenKind::LParen,
                            b')' => TokenKind::RParen,
                            b'[' => TokenKind::LBrack,
                            b']' => TokenKind::RBrack,
                            b'{' => TokenKind::LBrace,
                            b'}' => TokenKind::RBrace,
                            b',' => TokenKind::Comma,
                            b'=' => TokenKind::Assign,
                            b'+' => TokenKind::Plus,
                            b'-' => TokenKind::Minus,
                            b'*' => TokenKind::Star,
                            b'/' => TokenKind::Slash,
                            b'%' => TokenKind::Percent,
                            b'^' => TokenKind::Caret,
                            b'<' => TokenKind::Lt,
                            b'>' => TokenKind::Gt,
                            b'!' => TokenKind::Not,
                            b'?' => TokenKind::Question,
                            b':' => TokenKind::Colon,
                            b';' => TokenKind::Semicolon,
                            b'.' => TokenKind::Dot,
                            _ => {
                                return Err(lexer.error(
                                    format!("unexpected character {:?}", byte as char),
                                    line,
                                    column,
                                ));
                            }
                        };
                        (kind, 1)
                    }
                };
                for _ in 0..length {
                    lexer.bump();
                }
                push(kind, start, lexer.pos, line, column, Channel::Default, &mut tokens);
            }
        }
    }
    let index = tokens.len();
    tokens.push(Token {
        kind: TokenKind::Eof,
        start: source.len(),
        end: source.len(),
        line: lexer.line,
        column: lexer.column,
        channel: Channel::Default,
        index,
    });
    Ok(tokens)
}

fn is_ident_start(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphabetic()
}

fn is_ident_byte(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source, "<test>")
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_hidden() && t.kind != TokenKind::Eof)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("define Instrument TRACE"),
            vec![TokenKind::Define, TokenKind::Instrument, TokenKind::Trace]
        );
    }

    #[test]
    fn identifiers_keep_case() {
        let source = "Slit PREVIOUS_3";
        let tokens = lex(source, "<test>").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text(source), "Slit");
        // PREVIOUS_3 is an identifier, bare PREVIOUS is a keyword
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].text(source), "PREVIOUS_3");
    }

    #[test]
    fn comments_land_on_hidden_channel() {
        let source = "TRACE // tail\n/* block */ END";
        let tokens = lex(source, "<test>").unwrap();
        let hidden: Vec<&Token> = tokens.iter().filter(|t| t.is_hidden()).collect();
        assert_eq!(hidden.len(), 2);
        assert_eq!(hidden[0].kind, TokenKind::LineComment);
        assert_eq!(hidden[0].text(source), "// tail");
        assert_eq!(hidden[1].kind, TokenKind::BlockComment);
        assert_eq!(hidden[1].text(source), "/* block */");
    }

    #[test]
    fn unparsed_block_is_one_token() {
        let source = "DECLARE %{ int x; /* not a comment token */ %} TRACE";
        let tokens = lex(source, "<test>").unwrap();
        let block = tokens
            .iter()
            .find(|t| t.kind == TokenKind::UnparsedBlock)
            .unwrap();
        assert!(block.text(source).starts_with("%{"));
        assert!(block.text(source).ends_with("%}"));
        assert!(block.text(source).contains("not a comment token"));
    }

    #[test]
    fn numbers_and_floats() {
        assert_eq!(
            kinds("1 2.5 1e5 2.0e-3"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral
            ]
        );
    }

    #[test]
    fn include_token() {
        let source = "%include \"other.instr\"";
        let tokens = lex(source, "<test>").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Include);
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
    }

    #[test]
    fn unterminated_block_errors() {
        assert!(lex("DECLARE %{ int x;", "<test>").is_err());
    }
}
