//! Canonical source formatter for `.instr` and `.comp` files.
//!
//! The lexer keeps every token; the formatter walks the visible tokens and
//! re-emits a normalized rendition, draining the hidden channel (comments)
//! immediately before each structural token so every comment keeps its
//! source position. Expression text is reproduced verbatim from the token
//! spans, so no semantic information is touched. The single allowed semantic
//! change is the regeneration of a component's McDoc header from the
//! parameter-set ground truth.
//!
//! What is normalized: DSL keywords uppercase, one blank line between
//! top-level sections, `AT …`/`ROTATED …` each on their own line, parameter
//! lists joined by `, `, per-line trailing whitespace stripped, exactly one
//! terminal newline. `%{ … %}` blocks pass through verbatim unless a
//! C-formatter callable is supplied.

use std::path::{Path, PathBuf};

use crate::{
    errors::McCodeError,
    lexer::{Token, TokenKind, lex},
    mcdoc::{McDocData, parse_mcdoc_full},
    parse::{ParseError, unparsed_contents},
    registry::{Fetcher, cache_base, registry_url},
};

/// C-block formatter callable: receives the block content without the
/// `%{`/`%}` delimiters, returns the replacement content.
pub type CFormatter<'a> = dyn Fn(&str) -> String + 'a;

/// Format source text by extension (`.instr` or `.comp`).
pub fn format_source(
    source: &str,
    ext: &str,
    clang_format: Option<&CFormatter<'_>>,
) -> Result<String, McCodeError> {
    match ext.to_ascii_lowercase().as_str() {
        ".instr" => format_instr_source(source, "<stdin>", clang_format),
        ".comp" => format_comp_source(source, "<stdin>", clang_format),
        other => Err(McCodeError::Parse(ParseError::new(
            "<stdin>",
            source,
            1,
            0,
            format!("unsupported file extension '{other}'; expected '.instr' or '.comp'"),
        ))),
    }
}

/// Read, format, and return the text of a file.
pub fn format_file(path: &Path, clang_format: Option<&CFormatter<'_>>) -> Result<String, McCodeError> {
    let source = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        ".instr" => format_instr_source(&source, &path.to_string_lossy(), clang_format),
        ".comp" => format_comp_source(&source, &path.to_string_lossy(), clang_format),
        other => Err(McCodeError::Parse(ParseError::new(
            path.to_string_lossy(),
            &source,
            1,
            0,
            format!("unsupported file extension '{other}'; expected '.instr' or '.comp'"),
        ))),
    }
}

/// Format instrument source text.
pub fn format_instr_source(
    source: &str,
    filename: &str,
    clang_format: Option<&CFormatter<'_>>,
) -> Result<String, McCodeError> {
    let tokens = lex(source, filename)?;
    let mut formatter = Formatter::new(source, filename, &tokens, clang_format);
    formatter.format_instrument()?;
    Ok(formatter.result())
}

/// Format component source text, regenerating the McDoc header.
pub fn format_comp_source(
    source: &str,
    filename: &str,
    clang_format: Option<&CFormatter<'_>>,
) -> Result<String, McCodeError> {
    let tokens = lex(source, filename)?;
    let mut formatter = Formatter::new(source, filename, &tokens, clang_format);
    formatter.format_component()?;
    Ok(formatter.result())
}

struct Formatter<'a> {
    source: &'a str,
    filename: &'a str,
    tokens: &'a [Token],
    /// Raw index of the next token (either channel).
    pos: usize,
    out: String,
    /// Highest hidden-token index already written.
    last_comment_idx: isize,
    clang: Option<&'a CFormatter<'a>>,
}

impl<'a> Formatter<'a> {
    fn new(
        source: &'a str,
        filename: &'a str,
        tokens: &'a [Token],
        clang: Option<&'a CFormatter<'a>>,
    ) -> Self {
        Self {
            source,
            filename,
            tokens,
            pos: 0,
            out: String::new(),
            last_comment_idx: -1,
            clang,
        }
    }

    // -- token access -------------------------------------------------------

    fn peek(&self) -> Token {
        let mut pos = self.pos;
        while self.tokens[pos.min(self.tokens.len() - 1)].is_hidden() {
            pos += 1;
        }
        self.tokens[pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        self.pos = (token.index + 1).min(self.tokens.len() - 1);
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        self.check(kind).then(|| self.advance())
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(ParseError::new(
                self.filename,
                self.source,
                token.line,
                token.column,
                format!("expected {what}"),
            ))
        }
    }

    fn text(&self, token: Token) -> &'a str {
        token.text(self.source)
    }

    fn w(&mut self, text: &str) {
        self.out.push_str(text);
    }

    // -- hidden channel -----------------------------------------------------

    /// Write hidden tokens that precede `token` and have not been written.
    ///
    /// A `//` comment always gets its consumed newline restored. A `/*…*/`
    /// comment gets one restored when the next token (hidden or visible)
    /// starts on a later line; an inline note between expression tokens is
    /// emitted verbatim.
    fn flush_comments_before(&mut self, token: Token) {
        let eligible: Vec<Token> = self.tokens[..token.index]
            .iter()
            .filter(|t| t.is_hidden() && t.index as isize > self.last_comment_idx)
            .copied()
            .collect();
        for (i, hidden) in eligible.iter().enumerate() {
            let text = self.text(*hidden);
            let next_line = eligible.get(i + 1).map_or(token.line, |t| t.line);
            let comment_end_line = hidden.line + text.matches('\n').count();
            self.out.push_str(text);
            if text.starts_with("//") {
                self.out.push('\n');
            } else if text.starts_with("/*") && next_line > comment_end_line {
                self.out.push('\n');
            }
            self.last_comment_idx = hidden.index as isize;
        }
    }

    fn flush_trailing_comments(&mut self) {
        let trailing: Vec<Token> = self
            .tokens
            .iter()
            .filter(|t| t.is_hidden() && t.index as isize > self.last_comment_idx)
            .copied()
            .collect();
        for hidden in trailing {
            let text = self.text(hidden);
            self.out.push_str(text);
            if text.starts_with("//") || text.contains('\n') {
                self.out.push('\n');
            }
            self.last_comment_idx = hidden.index as isize;
        }
    }

    fn result(&self) -> String {
        let lines: Vec<&str> = self.out.split('\n').map(str::trim_end).collect();
        let mut text = lines.join("\n");
        while text.ends_with('\n') {
            text.pop();
        }
        text.push('\n');
        text
    }

    // -- expression spans ---------------------------------------------------

    /// Consume one expression syntactically and return its verbatim text.
    /// Balanced over `()[]{}`; stops at a separator or keyword at depth 0.
    fn expr_verbatim(&mut self) -> Result<String, ParseError> {
        let start = self.peek();
        let mut depth = 0usize;
        let mut last: Option<Token> = None;
        loop {
            let token = self.peek();
            let stop = match token.kind {
                TokenKind::Eof => true,
                TokenKind::LParen | TokenKind::LBrack | TokenKind::LBrace => {
                    depth += 1;
                    false
                }
                TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace => {
                    if depth == 0 {
                        true
                    } else {
                        depth -= 1;
                        false
                    }
                }
                TokenKind::Comma => depth == 0,
                TokenKind::Identifier
                | TokenKind::IntegerLiteral
                | TokenKind::FloatLiteral
                | TokenKind::StringLiteral
                | TokenKind::Null
                | TokenKind::Previous
                | TokenKind::Myself
                | TokenKind::Next
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Caret
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::Le
                | TokenKind::Ge
                | TokenKind::EqEq
                | TokenKind::Neq
                | TokenKind::Shl
                | TokenKind::Shr
                | TokenKind::AndAnd
                | TokenKind::OrOr
                | TokenKind::Not
                | TokenKind::Question
                | TokenKind::Colon
                | TokenKind::Dot
                | TokenKind::Arrow
                | TokenKind::Assign => false,
                // any keyword terminates the expression at depth zero
                _ => depth == 0,
            };
            if stop {
                break;
            }
            last = Some(self.advance());
        }
        let last = last.ok_or_else(|| {
            ParseError::new(
                self.filename,
                self.source,
                start.line,
                start.column,
                "expected an expression",
            )
        })?;
        // hidden tokens inside the span ride along verbatim
        self.last_comment_idx = self.last_comment_idx.max(last.index as isize);
        Ok(self.source[start.start..last.end].to_string())
    }

    fn coords(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::LParen, "`(` of coordinates")?;
        let x = self.expr_verbatim()?;
        self.expect(TokenKind::Comma, "`,`")?;
        let y = self.expr_verbatim()?;
        self.expect(TokenKind::Comma, "`,`")?;
        let z = self.expr_verbatim()?;
        self.expect(TokenKind::RParen, "closing `)` of coordinates")?;
        Ok(format!("({x}, {y}, {z})"))
    }

    fn reference(&mut self) -> Result<String, ParseError> {
        if self.eat(TokenKind::Absolute).is_some() {
            return Ok("ABSOLUTE".to_string());
        }
        self.expect(TokenKind::Relative, "ABSOLUTE or RELATIVE")?;
        if self.eat(TokenKind::Absolute).is_some() {
            return Ok("RELATIVE ABSOLUTE".to_string());
        }
        let reference = self.component_ref_verbatim()?;
        Ok(format!("RELATIVE {reference}"))
    }

    fn component_ref_verbatim(&mut self) -> Result<String, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Previous => {
                if self.eat(TokenKind::LParen).is_some() {
                    let count = self.expect(TokenKind::IntegerLiteral, "PREVIOUS count")?;
                    let count_text = self.text(count).to_string();
                    self.expect(TokenKind::RParen, "closing `)` of PREVIOUS")?;
                    Ok(format!("PREVIOUS({count_text})"))
                } else {
                    Ok("PREVIOUS".to_string())
                }
            }
            TokenKind::Myself => Ok("MYSELF".to_string()),
            TokenKind::Identifier => Ok(self.text(token).to_string()),
            _ => Err(ParseError::new(
                self.filename,
                self.source,
                token.line,
                token.column,
                "expected a component reference",
            )),
        }
    }

    // -- C blocks and multi blocks ------------------------------------------

    fn format_unparsed_block(&self, text: &str) -> String {
        match self.clang {
            Some(formatter) if text.starts_with("%{") && text.ends_with("%}") => {
                let content = unparsed_contents(text);
                format!("%{{{}%}}", formatter(content))
            }
            _ => text.to_string(),
        }
    }

    /// A named block section: blank line, uppercase keyword, multi-block.
    fn section(&mut self, keyword: &str, keyword_token: Token) -> Result<(), ParseError> {
        self.flush_comments_before(keyword_token);
        self.w(&format!("\n{keyword}\n"));
        self.multi_block()
    }

    fn multi_block(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek().kind {
                TokenKind::UnparsedBlock => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    let text = self.format_unparsed_block(self.text(token));
                    self.w(&text);
                    self.w("\n");
                }
                TokenKind::Inherit => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("INHERIT ");
                    let name = self.expect(TokenKind::Identifier, "component to inherit")?;
                    let name_text = self.text(name).to_string();
                    self.w(&name_text);
                    self.w("\n");
                }
                TokenKind::Extend => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("\nEXTEND\n");
                    let block = self.expect(TokenKind::UnparsedBlock, "%{ … %} after EXTEND")?;
                    let text = self.format_unparsed_block(self.text(block));
                    self.w(&text);
                    self.w("\n");
                }
                _ => return Ok(()),
            }
        }
    }

    // -- shared directives --------------------------------------------------

    fn format_search(&mut self) -> Result<(), ParseError> {
        let token = self.expect(TokenKind::Search, "SEARCH")?;
        self.flush_comments_before(token);
        if self.eat(TokenKind::Shell).is_some() {
            let literal = self.expect(TokenKind::StringLiteral, "quoted SEARCH SHELL command")?;
            let text = self.text(literal).to_string();
            self.w(&format!("SEARCH SHELL {text}\n"));
        } else {
            let literal = self.expect(TokenKind::StringLiteral, "quoted SEARCH path")?;
            let text = self.text(literal).to_string();
            self.w(&format!("SEARCH {text}\n"));
        }
        Ok(())
    }

    fn format_dependency(&mut self) -> Result<(), ParseError> {
        let token = self.expect(TokenKind::Dependency, "DEPENDENCY")?;
        self.flush_comments_before(token);
        let literal = self.expect(TokenKind::StringLiteral, "quoted DEPENDENCY string")?;
        let text = self.text(literal).to_string();
        self.w(&format!("DEPENDENCY {text}\n"));
        Ok(())
    }

    fn format_shell(&mut self) -> Result<(), ParseError> {
        let token = self.expect(TokenKind::Shell, "SHELL")?;
        self.flush_comments_before(token);
        let literal = self.expect(TokenKind::StringLiteral, "quoted SHELL command")?;
        let text = self.text(literal).to_string();
        self.w(&format!("SHELL {text}\n"));
        Ok(())
    }

    fn format_metadata(&mut self) -> Result<(), ParseError> {
        let token = self.expect(TokenKind::MetaData, "METADATA")?;
        self.flush_comments_before(token);
        let mime = self.advance();
        let mime_text = self.text(mime).to_string();
        let name = self.advance();
        let name_text = self.text(name).to_string();
        let block = self.expect(TokenKind::UnparsedBlock, "%{ … %} metadata value")?;
        let block_text = self.text(block).to_string();
        self.w(&format!("METADATA {mime_text} {name_text}\n{block_text}\n"));
        Ok(())
    }

    // -- instrument ---------------------------------------------------------

    fn format_instrument(&mut self) -> Result<(), McCodeError> {
        let define = self.expect(TokenKind::Define, "DEFINE")?;
        self.flush_comments_before(define);
        self.expect(TokenKind::Instrument, "INSTRUMENT")?;
        let name = self.expect(TokenKind::Identifier, "instrument name")?;
        let name_text = self.text(name).to_string();
        let parameters = self.instrument_parameters()?;
        self.w(&format!("DEFINE INSTRUMENT {name_text}({parameters})\n"));

        loop {
            match self.peek().kind {
                TokenKind::Trace => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("\nTRACE\n");
                    break;
                }
                TokenKind::Declare => {
                    let token = self.advance();
                    self.section("DECLARE", token)?;
                }
                TokenKind::UserVars => {
                    let token = self.advance();
                    self.section("USERVARS", token)?;
                }
                TokenKind::Initialize => {
                    let token = self.advance();
                    self.section("INITIALIZE", token)?;
                }
                TokenKind::Dependency => self.format_dependency()?,
                TokenKind::MetaData => self.format_metadata()?,
                TokenKind::Search => self.format_search()?,
                TokenKind::Shell => self.format_shell()?,
                _ => {
                    let token = self.peek();
                    return Err(ParseError::new(
                        self.filename,
                        self.source,
                        token.line,
                        token.column,
                        "expected an instrument section or TRACE",
                    )
                    .into());
                }
            }
        }

        loop {
            match self.peek().kind {
                TokenKind::End => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("\nEND\n");
                    break;
                }
                TokenKind::Removable
                | TokenKind::Cpu
                | TokenKind::Split
                | TokenKind::Component => self.format_component_instance()?,
                TokenKind::Search => self.format_search()?,
                TokenKind::Include => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    let literal =
                        self.expect(TokenKind::StringLiteral, "quoted instrument filename")?;
                    let text = self.text(literal).to_string();
                    self.w(&format!("%include {text}\n"));
                }
                TokenKind::Save => {
                    let token = self.advance();
                    self.section("SAVE", token)?;
                }
                TokenKind::Finally => {
                    let token = self.advance();
                    self.section("FINALLY", token)?;
                }
                _ => {
                    let token = self.peek();
                    return Err(ParseError::new(
                        self.filename,
                        self.source,
                        token.line,
                        token.column,
                        "expected COMPONENT, SAVE, FINALLY, or END",
                    )
                    .into());
                }
            }
        }
        self.flush_trailing_comments();
        Ok(())
    }

    fn instrument_parameters(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::LParen, "`(` of instrument parameters")?;
        let mut parameters = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                parameters.push(self.instrument_parameter()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "closing `)` of instrument parameters")?;
        Ok(parameters.join(", "))
    }

    fn instrument_parameter(&mut self) -> Result<String, ParseError> {
        let type_prefix = match self.peek().kind {
            TokenKind::Double => {
                self.advance();
                ""
            }
            TokenKind::Int => {
                self.advance();
                "int "
            }
            TokenKind::StringType => {
                self.advance();
                "string "
            }
            _ => "",
        };
        let name = self.expect(TokenKind::Identifier, "parameter name")?;
        let mut rendered = format!("{type_prefix}{}", self.text(name));
        if self.eat(TokenKind::Slash).is_some() {
            let unit = self.expect(TokenKind::StringLiteral, "quoted parameter unit")?;
            rendered.push('/');
            rendered.push_str(self.text(unit));
        }
        if self.eat(TokenKind::Assign).is_some() {
            rendered.push('=');
            match self.peek().kind {
                TokenKind::Null => {
                    self.advance();
                    rendered.push_str("NULL");
                }
                TokenKind::StringLiteral => {
                    let literal = self.advance();
                    let text = self.text(literal).to_string();
                    rendered.push_str(&text);
                }
                _ => {
                    let expr = self.expr_verbatim()?;
                    rendered.push_str(&expr);
                }
            }
        }
        Ok(rendered)
    }

    fn format_component_instance(&mut self) -> Result<(), ParseError> {
        self.flush_comments_before(self.peek());
        self.w("\n");

        let mut prefix = String::new();
        loop {
            match self.peek().kind {
                TokenKind::Removable => {
                    self.advance();
                    prefix.push_str("REMOVABLE ");
                }
                TokenKind::Cpu => {
                    self.advance();
                    prefix.push_str("CPU ");
                }
                TokenKind::Split => {
                    self.advance();
                    if self.check(TokenKind::Component) {
                        prefix.push_str("SPLIT ");
                    } else {
                        let expr = self.expr_verbatim()?;
                        prefix.push_str(&format!("SPLIT {expr} "));
                    }
                }
                _ => break,
            }
        }
        self.expect(TokenKind::Component, "COMPONENT")?;
        let instance_name = self.instance_name_verbatim()?;
        self.expect(TokenKind::Assign, "`=` after instance name")?;
        let comp_type = self.component_type_verbatim()?;

        let mut parameters = String::new();
        if self.eat(TokenKind::LParen).is_some() {
            let mut parts = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    let name = self.expect(TokenKind::Identifier, "parameter name")?;
                    let name_text = self.text(name).to_string();
                    self.expect(TokenKind::Assign, "`=` in parameter assignment")?;
                    let value = if self.check(TokenKind::Null) {
                        self.advance();
                        "NULL".to_string()
                    } else {
                        self.expr_verbatim()?
                    };
                    parts.push(format!("{name_text}={value}"));
                    if self.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "closing `)` of instance parameters")?;
            parameters = parts.join(", ");
        }

        let mut when = String::new();
        if self.eat(TokenKind::When).is_some() {
            let expr = self.expr_verbatim()?;
            when = format!(" WHEN {expr}");
        }
        self.w(&format!(
            "{prefix}COMPONENT {instance_name} = {comp_type}({parameters}){when}\n"
        ));

        self.expect(TokenKind::At, "AT placement")?;
        let coords = self.coords()?;
        let reference = self.reference()?;
        self.w(&format!("AT {coords} {reference}\n"));

        if self.eat(TokenKind::Rotated).is_some() {
            let coords = self.coords()?;
            let reference = self.reference()?;
            self.w(&format!("ROTATED {coords} {reference}\n"));
        }

        loop {
            match self.peek().kind {
                TokenKind::Group => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    let name = self.expect(TokenKind::Identifier, "group name")?;
                    let name_text = self.text(name).to_string();
                    self.w(&format!("GROUP {name_text}\n"));
                }
                TokenKind::Extend => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("EXTEND\n");
                    let block = self.expect(TokenKind::UnparsedBlock, "%{ … %} after EXTEND")?;
                    self.flush_comments_before(block);
                    let text = self.format_unparsed_block(self.text(block));
                    self.w(&text);
                    self.w("\n");
                }
                TokenKind::Jump => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    let target = self.jump_name_verbatim()?;
                    let keyword = if self.eat(TokenKind::Iterate).is_some() {
                        "ITERATE"
                    } else {
                        self.expect(TokenKind::When, "WHEN or ITERATE")?;
                        "WHEN"
                    };
                    let condition = self.expr_verbatim()?;
                    self.w(&format!("JUMP {target} {keyword} {condition}\n"));
                }
                TokenKind::MetaData => self.format_metadata()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn instance_name_verbatim(&mut self) -> Result<String, ParseError> {
        if self.eat(TokenKind::Copy).is_some() {
            if self.eat(TokenKind::LParen).is_some() {
                let name = self.expect(TokenKind::Identifier, "instance name to copy")?;
                let name_text = self.text(name).to_string();
                self.expect(TokenKind::RParen, "closing `)` of COPY")?;
                return Ok(format!("COPY({name_text})"));
            }
            return Ok("COPY".to_string());
        }
        let name = self.expect(TokenKind::Identifier, "instance name")?;
        Ok(self.text(name).to_string())
    }

    fn component_type_verbatim(&mut self) -> Result<String, ParseError> {
        if self.eat(TokenKind::Copy).is_some() {
            let parenthesised = self.eat(TokenKind::LParen).is_some();
            let reference = self.component_ref_verbatim()?;
            if parenthesised {
                self.expect(TokenKind::RParen, "closing `)` of COPY")?;
            }
            return Ok(format!("COPY({reference})"));
        }
        let name = self.expect(TokenKind::Identifier, "component type name")?;
        Ok(self.text(name).to_string())
    }

    fn jump_name_verbatim(&mut self) -> Result<String, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Previous | TokenKind::Next => {
                let keyword = if token.kind == TokenKind::Previous {
                    "PREVIOUS"
                } else {
                    "NEXT"
                };
                if self.eat(TokenKind::LParen).is_some() {
                    let count = self.expect(TokenKind::IntegerLiteral, "jump count")?;
                    let count_text = self.text(count).to_string();
                    self.expect(TokenKind::RParen, "closing `)`")?;
                    Ok(format!("{keyword}({count_text})"))
                } else {
                    Ok(keyword.to_string())
                }
            }
            TokenKind::Myself => Ok("MYSELF".to_string()),
            TokenKind::Identifier => Ok(self.text(token).to_string()),
            _ => Err(ParseError::new(
                self.filename,
                self.source,
                token.line,
                token.column,
                "expected a JUMP target",
            )),
        }
    }

    // -- component ----------------------------------------------------------

    fn format_component(&mut self) -> Result<(), McCodeError> {
        // parameter names feed the canonical McDoc header
        let (input_params, output_params) = scan_parameter_names(self.tokens, self.source);

        let define = self.expect(TokenKind::Define, "DEFINE")?;
        self.format_mcdoc_header(define, &input_params, &output_params);
        self.flush_comments_before(define);

        self.expect(TokenKind::Component, "COMPONENT")?;
        let name = self.expect(TokenKind::Identifier, "component name")?;
        let name_text = self.text(name).to_string();
        if self.eat(TokenKind::Copy).is_some() {
            let parenthesised = self.eat(TokenKind::LParen).is_some();
            let base = self.expect(TokenKind::Identifier, "component to copy")?;
            let base_text = self.text(base).to_string();
            if parenthesised {
                self.expect(TokenKind::RParen, "closing `)` of COPY")?;
            }
            self.w(&format!("DEFINE COMPONENT {name_text} COPY {base_text}\n"));
        } else {
            self.w(&format!("DEFINE COMPONENT {name_text}\n"));
        }

        loop {
            match self.peek().kind {
                TokenKind::End => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("\nEND\n");
                    break;
                }
                TokenKind::Definition => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.expect(TokenKind::Parameters, "PARAMETERS")?;
                    let parameters = self.component_parameters()?;
                    self.w(&format!("DEFINITION PARAMETERS ({parameters})\n"));
                }
                TokenKind::Setting => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.expect(TokenKind::Parameters, "PARAMETERS")?;
                    let parameters = self.component_parameters()?;
                    self.w(&format!("SETTING PARAMETERS ({parameters})\n"));
                }
                TokenKind::Output => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.expect(TokenKind::Parameters, "PARAMETERS")?;
                    let parameters = self.component_parameters()?;
                    self.w(&format!("OUTPUT PARAMETERS ({parameters})\n"));
                }
                TokenKind::Category => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    let value = self.advance();
                    let value_text = crate::parse::unquote(self.text(value)).to_string();
                    self.w(&format!("CATEGORY {value_text}\n"));
                }
                TokenKind::Dependency => self.format_dependency()?,
                TokenKind::MetaData => self.format_metadata()?,
                TokenKind::NoAcc => {
                    let token = self.advance();
                    self.flush_comments_before(token);
                    self.w("NOACC\n");
                }
                TokenKind::Shell => self.format_shell()?,
                TokenKind::Share => {
                    let token = self.advance();
                    self.section("SHARE", token)?;
                }
                TokenKind::UserVars => {
                    let token = self.advance();
                    self.section("USERVARS", token)?;
                }
                TokenKind::Declare => {
                    let token = self.advance();
                    self.section("DECLARE", token)?;
                }
                TokenKind::Initialize => {
                    let token = self.advance();
                    self.section("INITIALIZE", token)?;
                }
                TokenKind::Trace => {
                    let token = self.advance();
                    self.section("TRACE", token)?;
                }
                TokenKind::Save => {
                    let token = self.advance();
                    self.section("SAVE", token)?;
                }
                TokenKind::Finally => {
                    let token = self.advance();
                    self.section("FINALLY", token)?;
                }
                TokenKind::McDisplay => {
                    let token = self.advance();
                    self.section("MCDISPLAY", token)?;
                }
                _ => {
                    let token = self.peek();
                    return Err(ParseError::new(
                        self.filename,
                        self.source,
                        token.line,
                        token.column,
                        "expected a component section or END",
                    )
                    .into());
                }
            }
        }
        self.flush_trailing_comments();
        Ok(())
    }

    fn component_parameters(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut parameters = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                parameters.push(self.component_parameter()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "closing `)` of parameter list")?;
        Ok(parameters.join(", "))
    }

    fn component_parameter(&mut self) -> Result<String, ParseError> {
        let type_prefix = match self.peek().kind {
            TokenKind::Int => {
                self.advance();
                if self.eat(TokenKind::Star).is_some() {
                    "int* "
                } else {
                    "int "
                }
            }
            TokenKind::Double => {
                self.advance();
                if self.eat(TokenKind::Star).is_some() {
                    "double* "
                } else {
                    ""
                }
            }
            TokenKind::StringType => {
                self.advance();
                "string "
            }
            TokenKind::VectorType => {
                self.advance();
                "vector "
            }
            _ => "",
        };
        let name = self.expect(TokenKind::Identifier, "parameter name")?;
        let mut rendered = format!("{type_prefix}{}", self.text(name));
        if self.eat(TokenKind::Assign).is_some() {
            rendered.push('=');
            match self.peek().kind {
                TokenKind::Null => {
                    self.advance();
                    rendered.push_str("NULL");
                }
                TokenKind::StringLiteral => {
                    let literal = self.advance();
                    let text = self.text(literal).to_string();
                    rendered.push_str(&text);
                }
                _ => {
                    let expr = self.expr_verbatim()?;
                    rendered.push_str(&expr);
                }
            }
        }
        Ok(rendered)
    }

    /// Find, consume, and rewrite the McDoc block comment before `define`.
    ///
    /// The first hidden `/*…*/` containing a McDoc tag is replaced with a
    /// canonical header; hidden tokens before it flush normally first, so
    /// every non-header comment survives at its source position.
    fn format_mcdoc_header(&mut self, define: Token, input_params: &[String], output_params: &[String]) {
        const TAGS: [&str; 4] = ["%I", "%D", "%P", "%E"];
        let mcdoc = self.tokens[..define.index].iter().find(|t| {
            t.is_hidden()
                && t.index as isize > self.last_comment_idx
                && t.kind == TokenKind::BlockComment
                && TAGS.iter().any(|tag| t.text(self.source).contains(tag))
        });
        let Some(mcdoc) = mcdoc.copied() else {
            return;
        };
        // emit preceding comments (e.g. a copyright block) untouched
        self.flush_comments_before(mcdoc);
        let existing = parse_mcdoc_full(self.text(mcdoc));
        self.last_comment_idx = self.last_comment_idx.max(mcdoc.index as isize);

        let comp_name = self.component_name_after(define);
        let canonical =
            build_canonical_mcdoc(&comp_name, Some(&existing), input_params, output_params);
        self.w(&canonical);
    }

    fn component_name_after(&self, define: Token) -> String {
        let mut pos = define.index + 1;
        while let Some(token) = self.tokens.get(pos) {
            if !token.is_hidden() && token.kind == TokenKind::Identifier {
                return token.text(self.source).to_string();
            }
            pos += 1;
        }
        String::new()
    }
}

/// Collect DEFINITION+SETTING and OUTPUT parameter names from the token
/// stream (a pre-pass: the names are needed before the header is emitted).
fn scan_parameter_names(tokens: &[Token], source: &str) -> (Vec<String>, Vec<String>) {
    let mut input = Vec::new();
    let mut output = Vec::new();
    let visible: Vec<&Token> = tokens.iter().filter(|t| !t.is_hidden()).collect();
    let mut i = 0;
    while i < visible.len() {
        let set = match visible[i].kind {
            TokenKind::Definition | TokenKind::Setting => Some(false),
            TokenKind::Output => Some(true),
            _ => None,
        };
        let Some(is_output) = set else {
            i += 1;
            continue;
        };
        // expect PARAMETERS ( … )
        if visible.get(i + 1).map(|t| t.kind) != Some(TokenKind::Parameters) {
            i += 1;
            continue;
        }
        i += 2;
        if visible.get(i).map(|t| t.kind) != Some(TokenKind::LParen) {
            continue;
        }
        i += 1;
        let mut expect_name = true;
        let mut depth = 1usize;
        while i < visible.len() && depth > 0 {
            match visible[i].kind {
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBrack => depth += 1,
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBrack => depth -= 1,
                TokenKind::Comma if depth == 1 => expect_name = true,
                TokenKind::Int
                | TokenKind::Double
                | TokenKind::StringType
                | TokenKind::VectorType
                | TokenKind::Star => {}
                TokenKind::Identifier if expect_name => {
                    let name = visible[i].text(source).to_string();
                    if is_output {
                        output.push(name);
                    } else {
                        input.push(name);
                    }
                    expect_name = false;
                }
                _ => expect_name = false,
            }
            i += 1;
        }
    }
    (input, output)
}

// ---------------------------------------------------------------------------
// Canonical McDoc header generation
// ---------------------------------------------------------------------------

const SEP_OPEN: &str = "/*******************************************************************************";
const SEP_CLOSE: &str = "*******************************************************************************/";
const TODO_TEXT: &str = "TODO";

/// Build the canonical replacement header from the existing McDoc data and
/// the component's actual parameter lists. Parameters missing from the old
/// header appear with empty unit and description; documented parameters that
/// no longer exist are dropped.
pub fn build_canonical_mcdoc(
    comp_name: &str,
    existing: Option<&McDocData>,
    input_params: &[String],
    output_params: &[String],
) -> String {
    let empty = McDocData::default();
    let data = existing.unwrap_or(&empty);
    let mut lines: Vec<String> = vec![SEP_OPEN.to_string()];
    lines.push("*".to_string());
    lines.push(format!("* Component: {comp_name}"));
    lines.push("*".to_string());

    lines.push("* %I".to_string());
    let field = |key: &str| {
        data.info_fields
            .get(key)
            .map_or(TODO_TEXT, String::as_str)
            .to_string()
    };
    lines.push(format!("* Written by: {}", field("Written by")));
    lines.push(format!("* Date: {}", field("Date")));
    lines.push(format!("* Origin: {}", field("Origin")));
    for (key, value) in &data.info_fields {
        if !matches!(key.as_str(), "Written by" | "Date" | "Origin") {
            lines.push(format!("* {key}: {value}"));
        }
    }
    lines.push("*".to_string());
    let short = data.short_desc.iter().find(|s| !s.trim().is_empty());
    lines.push(match short {
        Some(text) => format!("* {text}"),
        None => format!("* ({TODO_TEXT} - add a one-line description)"),
    });
    lines.push("*".to_string());

    lines.push("* %D".to_string());
    let description: Vec<&String> = data.desc_lines.iter().filter(|l| !l.trim().is_empty()).collect();
    if description.is_empty() {
        lines.push(format!("* {TODO_TEXT}: Add a detailed description."));
    } else {
        for line in description {
            lines.push(format!("* {line}"));
        }
    }
    lines.push("*".to_string());

    lines.push("* %P".to_string());
    if !input_params.is_empty() {
        lines.push("* INPUT PARAMETERS:".to_string());
        lines.push("*".to_string());
        append_param_lines(&mut lines, input_params, data);
        lines.push("*".to_string());
    }
    if !output_params.is_empty() {
        lines.push("* OUTPUT PARAMETERS:".to_string());
        lines.push("*".to_string());
        append_param_lines(&mut lines, output_params, data);
        lines.push("*".to_string());
    }

    if !data.link_lines.is_empty() {
        lines.push("* %L".to_string());
        for line in &data.link_lines {
            lines.push(format!("* {line}"));
        }
        lines.push("*".to_string());
    }

    lines.push("* %E".to_string());
    lines.push(SEP_CLOSE.to_string());
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Column-align parameter lines on name and `[unit]`.
fn append_param_lines(lines: &mut Vec<String>, names: &[String], data: &McDocData) {
    let entries: Vec<(&str, String, String)> = names
        .iter()
        .map(|name| {
            let (unit, description) = data
                .parameters
                .get(name)
                .cloned()
                .unwrap_or((None, None));
            let unit = match unit {
                Some(u) => format!("[{u}]"),
                None => "[]".to_string(),
            };
            (name.as_str(), unit, description.unwrap_or_default())
        })
        .collect();
    if entries.is_empty() {
        return;
    }
    let name_width = entries.iter().map(|e| e.0.len()).max().unwrap_or(0);
    let unit_width = entries.iter().map(|e| e.1.len()).max().unwrap_or(0);
    for (name, unit, description) in entries {
        let columns = format!("{name:<name_width$}: {unit:<unit_width$}");
        let line = if description.is_empty() {
            format!("* {columns}")
        } else {
            format!("* {columns}  {description}")
        };
        lines.push(line.trim_end().to_string());
    }
}

/// Informational warnings about header/parameter mismatches.
pub fn check_mcdoc_params(
    existing: Option<&McDocData>,
    input_params: &[String],
    output_params: &[String],
) -> Vec<String> {
    let Some(data) = existing else {
        return vec!["McDoc header is missing".to_string()];
    };
    let mut warnings = Vec::new();
    let mut known: Vec<&str> = input_params
        .iter()
        .chain(output_params.iter())
        .map(String::as_str)
        .collect();
    known.sort_unstable();
    for name in &known {
        if !data.parameters.contains_key(*name) {
            warnings.push(format!("parameter '{name}' is not documented in the McDoc header"));
        }
    }
    let mut documented: Vec<&String> = data.parameters.keys().collect();
    documented.sort();
    for name in documented {
        if !known.contains(&name.as_str()) {
            warnings.push(format!("McDoc documents '{name}' which is not a known parameter"));
        }
    }
    warnings
}

// ---------------------------------------------------------------------------
// clang-format integration
// ---------------------------------------------------------------------------

fn which(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Fetch (and locally cache) the official `.clang-format` file from the
/// upstream repository at the pinned library version. Returns `None` when
/// the fetcher cannot supply it — the caller skips C-block formatting.
pub fn fetch_clang_format_config(
    flavor: crate::params::Flavor,
    fetcher: &dyn Fetcher,
) -> Option<PathBuf> {
    let (name, url) = registry_url(flavor);
    let tag = crate::registry::resolve_version_tag(name, url, fetcher)?;
    let cache_dir = cache_base().join("clang-format").join(&tag);
    let cached = cache_dir.join(".clang-format");
    if cached.exists() {
        return Some(cached);
    }
    let text = fetcher.fetch_text(&format!("{url}/raw/{tag}/.clang-format"))?;
    std::fs::create_dir_all(&cache_dir).ok()?;
    std::fs::write(&cached, text).ok()?;
    Some(cached)
}

/// Build a C-block formatter backed by the external `clang-format` binary.
///
/// `style` takes precedence over `config`. Returns `None` when clang-format
/// is not installed or no configuration resolves; on any runtime error the
/// returned callable hands the content back unchanged so a broken config
/// never corrupts a file.
pub fn make_clang_formatter(
    config: Option<PathBuf>,
    style: Option<String>,
) -> Option<Box<CFormatter<'static>>> {
    if which("clang-format").is_none() {
        tracing::warn!("clang-format not found on PATH; C blocks will not be formatted");
        return None;
    }
    Some(Box::new(move |content: &str| {
        let mut command = std::process::Command::new("clang-format");
        command.arg("--assume-filename=block.c");
        if let Some(style) = &style {
            command.arg(format!("--style={style}"));
        } else if let Some(config) = &config {
            command.arg(format!("--style=file:{}", config.display()));
        }
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        let Ok(mut child) = command.spawn() else {
            return content.to_string();
        };
        use std::io::Write as _;
        if let Some(mut stdin) = child.stdin.take()
            && stdin.write_all(content.as_bytes()).is_err()
        {
            return content.to_string();
        }
        match child.wait_with_output() {
            Ok(output) if output.status.success() => {
                String::from_utf8(output.stdout).unwrap_or_else(|_| content.to_string())
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "clang-format exited non-zero; C block left unchanged");
                content.to_string()
            }
            Err(_) => content.to_string(),
        }
    }))
}
