//! Parser for `.instr` instrument definition files.
//!
//! Lowering happens in one pass: each `COMPONENT` production resolves its
//! type through the [`McResolver`], applies modifiers, and lands in the
//! growing [`Instr`]. Included instruments parse recursively with the outer
//! instrument as `destination` so `PREVIOUS`/component references can reach
//! past the inner file's own component list.

use std::sync::Arc;

use crate::{
    comp::Comp,
    errors::{McCodeError, SemanticError},
    expr::{DataType, Expr},
    instance::{Instance, Jump},
    instr::Instr,
    lexer::TokenKind,
    orientation::{Angles, Vector},
    params::{InstrumentParameter, MetaData, Mode, RawC},
    parse::{ParseError, TokenCursor, tokenize, unparsed_contents, unquote},
    parse_expr::{EmptyContext, ExprContext, parse_expression},
};

/// Component and instrument lookup used by the parsers. Implemented by the
/// reader; tests may substitute in-memory registries behind one.
pub trait McResolver {
    fn get_component(&mut self, name: &str) -> Result<Arc<Comp>, McCodeError>;

    /// Load an included instrument, with `destination` being the outer
    /// instrument under construction.
    fn get_instrument_included(
        &mut self,
        name: &str,
        destination: &Instr,
        mode: Mode,
    ) -> Result<Instr, McCodeError>;

    /// Register a SEARCH path specification.
    fn handle_search_keyword(&mut self, spec: &str) -> Result<(), McCodeError>;
}

/// Parse an instrument definition from source text.
pub fn parse_instr_source(
    source: &str,
    filename: &str,
    resolver: &mut dyn McResolver,
    destination: Option<&Instr>,
    mode: Mode,
) -> Result<Instr, McCodeError> {
    let mut storage = Vec::new();
    let mut cursor = tokenize(source, filename, &mut storage)?;
    let mut parser = InstrParser {
        cursor: &mut cursor,
        resolver,
        state: Instr::new(String::new()),
        destination,
        current_comp: None,
        current_instance_name: None,
        mode,
        filename,
    };
    parser.parse()
}

/// Expression lookups backed by the instrument under construction.
struct InstrExprContext<'s> {
    state: &'s Instr,
    destination: Option<&'s Instr>,
    current_instance_name: Option<&'s str>,
}

impl ExprContext for InstrExprContext<'_> {
    fn instrument_parameter(&self, name: &str) -> Option<&InstrumentParameter> {
        self.state.get_parameter(name)
    }

    fn previous_name(&self) -> Option<String> {
        self.state
            .components
            .last()
            .map(|c| c.name.clone())
            .or_else(|| {
                self.destination
                    .and_then(|d| d.components.last().map(|c| c.name.clone()))
            })
    }

    fn myself_name(&self) -> Option<String> {
        self.current_instance_name.map(str::to_string)
    }
}

struct InstrParser<'a, 'c, 'r> {
    cursor: &'c mut TokenCursor<'a>,
    resolver: &'r mut dyn McResolver,
    state: Instr,
    destination: Option<&'r Instr>,
    current_comp: Option<Arc<Comp>>,
    current_instance_name: Option<String>,
    mode: Mode,
    filename: &'a str,
}

impl InstrParser<'_, '_, '_> {
    fn expr(&mut self) -> Result<Expr, ParseError> {
        let ctx = InstrExprContext {
            state: &self.state,
            destination: self.destination,
            current_instance_name: self.current_instance_name.as_deref(),
        };
        parse_expression(self.cursor, &ctx)
    }

    fn parse(&mut self) -> Result<Instr, McCodeError> {
        self.cursor.expect(TokenKind::Define, "DEFINE")?;
        self.cursor.expect(TokenKind::Instrument, "INSTRUMENT")?;
        let name_token = self.cursor.expect(TokenKind::Identifier, "instrument name")?;
        self.state.name = self.cursor.text(name_token).to_string();
        self.state.source = self.filename.to_string();

        self.cursor.expect(TokenKind::LParen, "`(` of instrument parameters")?;
        if !self.cursor.check(TokenKind::RParen) {
            loop {
                let parameter = self.instrument_parameter()?;
                self.state.add_parameter(parameter, false)?;
                if self.cursor.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.cursor.expect(TokenKind::RParen, "closing `)` of instrument parameters")?;

        // pre-TRACE sections, in any order
        loop {
            match self.cursor.peek_kind() {
                TokenKind::Trace => {
                    self.cursor.advance();
                    break;
                }
                TokenKind::Declare => {
                    self.cursor.advance();
                    let blocks = self.multi_block("declare")?;
                    self.state.append_declare(blocks);
                }
                TokenKind::UserVars => {
                    self.cursor.advance();
                    let blocks = self.multi_block("user")?;
                    self.state.append_user(blocks);
                }
                TokenKind::Initialize => {
                    self.cursor.advance();
                    let blocks = self.multi_block("initialize")?;
                    self.state.append_initialize(blocks);
                }
                TokenKind::Dependency => {
                    self.cursor.advance();
                    let token = self
                        .cursor
                        .expect(TokenKind::StringLiteral, "quoted DEPENDENCY string")?;
                    let flag = unquote(self.cursor.text(token)).to_string();
                    self.state.add_dependency(flag);
                }
                TokenKind::MetaData => {
                    let source = self.state.name.clone();
                    let metadata = self.metadata(&source)?;
                    self.state.add_metadata(metadata);
                }
                TokenKind::Search => self.search()?,
                TokenKind::Shell => {
                    self.cursor.advance();
                    let token = self
                        .cursor
                        .expect(TokenKind::StringLiteral, "quoted SHELL command")?;
                    crate::parse_comp::run_shell_command(unquote(self.cursor.text(token)));
                }
                _ => return Err(self.cursor.error_here("expected an instrument section or TRACE").into()),
            }
        }

        // TRACE body plus trailing SAVE/FINALLY
        loop {
            match self.cursor.peek_kind() {
                TokenKind::End => {
                    self.cursor.advance();
                    break;
                }
                TokenKind::Removable
                | TokenKind::Cpu
                | TokenKind::Split
                | TokenKind::Component => self.component_instance()?,
                TokenKind::Search => self.search()?,
                TokenKind::Include => self.trace_include()?,
                TokenKind::Save => {
                    self.cursor.advance();
                    let blocks = self.multi_block("save")?;
                    self.state.append_save(blocks);
                }
                TokenKind::Finally => {
                    self.cursor.advance();
                    let blocks = self.multi_block("final")?;
                    self.state.append_final(blocks);
                }
                _ => return Err(self.cursor.error_here("expected COMPONENT, SAVE, FINALLY, or END").into()),
            }
        }

        self.state.determine_groups();
        self.state.verify_instance_parameters();
        self.state.build_flow_graph();
        Ok(std::mem::take(&mut self.state))
    }

    /// `[double|int|string] name [/ "unit"] [= default]`
    fn instrument_parameter(&mut self) -> Result<InstrumentParameter, McCodeError> {
        let declared = match self.cursor.peek_kind() {
            TokenKind::Double => {
                self.cursor.advance();
                DataType::Float
            }
            TokenKind::Int => {
                self.cursor.advance();
                DataType::Int
            }
            TokenKind::StringType => {
                self.cursor.advance();
                DataType::Str
            }
            _ => DataType::Float,
        };
        let name_token = self.cursor.expect(TokenKind::Identifier, "parameter name")?;
        let name = self.cursor.text(name_token).to_string();
        let unit = if self.cursor.eat(TokenKind::Slash).is_some() {
            let token = self
                .cursor
                .expect(TokenKind::StringLiteral, "quoted parameter unit")?;
            Some(self.cursor.text(token).to_string())
        } else {
            None
        };
        let value = if self.cursor.eat(TokenKind::Assign).is_some() {
            if declared == DataType::Str {
                match self.cursor.peek_kind() {
                    TokenKind::Null => {
                        self.cursor.advance();
                        Expr::str("NULL")
                    }
                    TokenKind::StringLiteral => {
                        let token = self.cursor.advance();
                        Expr::str(self.cursor.text(token))
                    }
                    _ => {
                        let mut value = self.expr()?;
                        value.set_data_type(DataType::Str);
                        value
                    }
                }
            } else {
                let mut value = self.expr()?;
                value.set_data_type(declared);
                value
            }
        } else {
            Expr::empty(declared)
        };
        Ok(InstrumentParameter::new(name, unit, value))
    }

    fn multi_block(&mut self, part: &str) -> Result<Vec<RawC>, McCodeError> {
        let mut blocks = Vec::new();
        loop {
            match self.cursor.peek_kind() {
                TokenKind::UnparsedBlock => {
                    let token = self.cursor.advance();
                    blocks.push(RawC::new(
                        self.filename,
                        token.line,
                        unparsed_contents(self.cursor.text(token)),
                    ));
                }
                TokenKind::Inherit => {
                    self.cursor.advance();
                    let token = self.cursor.expect(TokenKind::Identifier, "component to inherit")?;
                    let comp = self.resolver.get_component(self.cursor.text(token))?;
                    blocks.extend(crate::parse_comp::section_of(&comp, part).iter().cloned());
                }
                TokenKind::Extend => {
                    self.cursor.advance();
                    let token = self
                        .cursor
                        .expect(TokenKind::UnparsedBlock, "%{ … %} after EXTEND")?;
                    blocks.push(RawC::new(
                        self.filename,
                        token.line,
                        unparsed_contents(self.cursor.text(token)),
                    ));
                }
                _ => break,
            }
        }
        Ok(blocks)
    }

    fn metadata(&mut self, source: &str) -> Result<MetaData, McCodeError> {
        self.cursor.expect(TokenKind::MetaData, "METADATA")?;
        let mime_token = self.cursor.advance();
        let mime = unquote(self.cursor.text(mime_token)).to_string();
        let name_token = self.cursor.advance();
        let name = unquote(self.cursor.text(name_token)).to_string();
        let block = self
            .cursor
            .expect(TokenKind::UnparsedBlock, "%{ … %} metadata value")?;
        Ok(MetaData::new(
            source,
            mime,
            name,
            unparsed_contents(self.cursor.text(block)),
        ))
    }

    /// `SEARCH "path"` or `SEARCH SHELL "command"`.
    fn search(&mut self) -> Result<(), McCodeError> {
        self.cursor.expect(TokenKind::Search, "SEARCH")?;
        if self.cursor.eat(TokenKind::Shell).is_some() {
            let token = self
                .cursor
                .expect(TokenKind::StringLiteral, "quoted SEARCH SHELL command")?;
            let command = unquote(self.cursor.text(token)).to_string();
            // split without shell interpretation, one path spec per line
            let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            let Some((program, args)) = parts.split_first() else {
                return Ok(());
            };
            let output = std::process::Command::new(program)
                .args(args)
                .output()
                .map_err(crate::errors::ResolveError::Io)?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            for spec in stdout.lines() {
                let spec = spec.trim();
                if !spec.is_empty() {
                    self.resolver.handle_search_keyword(spec)?;
                }
            }
        } else {
            let token = self
                .cursor
                .expect(TokenKind::StringLiteral, "quoted SEARCH path")?;
            let spec = unquote(self.cursor.text(token)).to_string();
            self.resolver.handle_search_keyword(&spec)?;
        }
        Ok(())
    }

    /// `%include "other.instr"` inside TRACE.
    fn trace_include(&mut self) -> Result<(), McCodeError> {
        self.cursor.expect(TokenKind::Include, "%include")?;
        let token = self
            .cursor
            .expect(TokenKind::StringLiteral, "quoted instrument filename")?;
        let name = unquote(self.cursor.text(token)).to_string();
        if self.destination.is_some() {
            tracing::error!(
                included = %name,
                from = %self.filename,
                "nested %include of an already-included instrument is not covered; expect component referencing errors"
            );
        }
        let included = self
            .resolver
            .get_instrument_included(&name, &self.state, self.mode)?;
        self.state.add_included(included.name.clone());
        for parameter in included.parameters {
            self.state.add_parameter(parameter, true)?;
        }
        for metadata in included.metadata {
            self.state.add_metadata(metadata);
        }
        self.state.declare.extend(included.declare);
        self.state.user.extend(included.user);
        self.state.initialize.extend(included.initialize);
        self.state.save.extend(included.save);
        self.state.final_.extend(included.final_);
        for instance in included.components {
            if !instance.removable {
                if self.state.has_component_named(&instance.name) {
                    return Err(SemanticError::DuplicateName(format!(
                        "included instrument redefines component instance {}",
                        instance.name
                    ))
                    .into());
                }
                // orientation was computed when the included file parsed
                self.state.components.push(instance);
            }
        }
        Ok(())
    }

    fn component_instance(&mut self) -> Result<(), McCodeError> {
        let mut removable = false;
        let mut cpu = false;
        let mut split: Option<Expr> = None;
        loop {
            match self.cursor.peek_kind() {
                TokenKind::Removable => {
                    self.cursor.advance();
                    removable = true;
                }
                TokenKind::Cpu => {
                    self.cursor.advance();
                    cpu = true;
                }
                TokenKind::Split => {
                    self.cursor.advance();
                    split = Some(if self.cursor.check(TokenKind::Component) {
                        Expr::int(10)
                    } else {
                        self.expr()?
                    });
                }
                _ => break,
            }
        }
        self.cursor.expect(TokenKind::Component, "COMPONENT")?;
        let name = self.instance_name()?;
        self.current_instance_name = Some(name.clone());
        self.cursor.expect(TokenKind::Assign, "`=` after instance name")?;

        // COPY(ref) reuses an existing instance; otherwise resolve the type
        let copied = if self.cursor.check(TokenKind::Copy) {
            self.cursor.advance();
            let parenthesised = self.cursor.eat(TokenKind::LParen).is_some();
            let reference = self.component_ref()?;
            if parenthesised {
                self.cursor.expect(TokenKind::RParen, "closing `)` of COPY")?;
            }
            Some(reference)
        } else {
            None
        };
        let comp = match &copied {
            Some(reference) => Arc::clone(&self.instance_by_name(reference)?.type_),
            None => {
                let token = self.cursor.expect(TokenKind::Identifier, "component type name")?;
                let type_name = self.cursor.text(token).to_string();
                self.resolver.get_component(&type_name)?
            }
        };
        self.current_comp = Some(Arc::clone(&comp));

        // instance parameters
        let mut assignments: Vec<(String, Expr)> = Vec::new();
        if self.cursor.eat(TokenKind::LParen).is_some() {
            if !self.cursor.check(TokenKind::RParen) {
                loop {
                    let assignment = self.instance_parameter()?;
                    assignments.push(assignment);
                    if self.cursor.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.cursor.expect(TokenKind::RParen, "closing `)` of instance parameters")?;
        }

        let when = if self.cursor.eat(TokenKind::When).is_some() {
            Some(self.expr()?)
        } else {
            None
        };

        self.cursor.expect(TokenKind::At, "AT placement")?;
        let at_vector = self.coords()?;
        let at_reference = self.reference()?;
        let (rotate_vector, rotate_reference) = if self.cursor.eat(TokenKind::Rotated).is_some() {
            let angles = self.coords()?;
            let reference = self.reference()?;
            (
                Angles::new(angles.x, angles.y, angles.z),
                reference,
            )
        } else {
            // rotation follows the AT reference when unspecified
            (Angles::zero(), at_reference.clone())
        };

        let mut instance = match &copied {
            Some(reference) => {
                let base = self.instance_by_name(reference)?.clone();
                Instance::from_instance(
                    &name,
                    &base,
                    (at_vector, at_reference),
                    (rotate_vector, rotate_reference),
                )
            }
            None => Instance::new(
                &name,
                comp,
                (at_vector, at_reference),
                (rotate_vector, rotate_reference),
                self.mode,
            ),
        };
        for (parameter_name, value) in assignments {
            instance.set_parameter(&parameter_name, value, copied.is_some())?;
        }
        if removable {
            instance.set_removable();
        }
        if cpu {
            instance.set_cpu();
        }
        if let Some(split) = split {
            instance.set_split(split);
        }
        if let Some(when) = when {
            instance.set_when(when)?;
        }

        // trailing clauses
        loop {
            match self.cursor.peek_kind() {
                TokenKind::Group => {
                    self.cursor.advance();
                    let token = self.cursor.expect(TokenKind::Identifier, "group name")?;
                    instance.set_group(self.cursor.text(token));
                }
                TokenKind::Extend => {
                    self.cursor.advance();
                    let token = self
                        .cursor
                        .expect(TokenKind::UnparsedBlock, "%{ … %} after EXTEND")?;
                    instance.set_extend(vec![RawC::new(
                        self.filename,
                        token.line,
                        unparsed_contents(self.cursor.text(token)),
                    )]);
                }
                TokenKind::Jump => {
                    let mut jumps = Vec::new();
                    while self.cursor.check(TokenKind::Jump) {
                        jumps.push(self.jump()?);
                    }
                    instance.set_jumps(jumps);
                }
                TokenKind::MetaData => {
                    let metadata = self.metadata(&name)?;
                    instance.add_metadata(metadata);
                }
                _ => break,
            }
        }

        // REMOVABLE instances of an included instrument are dropped
        if self.destination.is_none() || !instance.removable {
            self.state.add_component(instance)?;
        }
        self.current_comp = None;
        self.current_instance_name = None;
        Ok(())
    }

    fn instance_name(&mut self) -> Result<String, McCodeError> {
        if self.cursor.eat(TokenKind::Copy).is_some() {
            // COPY or COPY(identifier) generate sequential instance names
            let count = self.state.components.len() + 1;
            if self.cursor.eat(TokenKind::LParen).is_some() {
                let token = self.cursor.expect(TokenKind::Identifier, "instance name to copy")?;
                let base = self.cursor.text(token).to_string();
                self.cursor.expect(TokenKind::RParen, "closing `)` of COPY")?;
                return Ok(format!("{base}_{count}"));
            }
            return Ok(format!("Comp_{count}"));
        }
        let token = self.cursor.expect(TokenKind::Identifier, "instance name")?;
        Ok(self.cursor.text(token).to_string())
    }

    /// `PREVIOUS[(n)]`, `PREVIOUS_n`, or an instance name; resolved against
    /// the current list and the including instrument.
    fn component_ref(&mut self) -> Result<String, McCodeError> {
        let token = self.cursor.advance();
        let text = self.cursor.text(token).to_string();
        let previous_count = if token.kind == TokenKind::Previous {
            if self.cursor.eat(TokenKind::LParen).is_some() {
                let count = self.cursor.expect(TokenKind::IntegerLiteral, "PREVIOUS count")?;
                let count = self
                    .cursor
                    .text(count)
                    .parse::<usize>()
                    .map_err(|_| self.cursor.error_at(token, "invalid PREVIOUS count"))?;
                self.cursor.expect(TokenKind::RParen, "closing `)` of PREVIOUS")?;
                Some(count)
            } else {
                Some(1)
            }
        } else if let Some(suffix) = text.strip_prefix("PREVIOUS_") {
            Some(suffix.parse::<usize>().map_err(|_| {
                self.cursor.error_at(token, format!("invalid PREVIOUS count in {text}"))
            })?)
        } else {
            None
        };

        if let Some(count) = previous_count {
            let local = self.state.components.len();
            if count <= local {
                return Ok(self.state.last_component(count, true)?.name.clone());
            }
            if let Some(destination) = self.destination {
                return Ok(destination.last_component(count - local, true)?.name.clone());
            }
            return Err(SemanticError::UnknownReference(format!(
                "PREVIOUS count {count} exceeds the {local} defined component instances"
            ))
            .into());
        }
        if token.kind != TokenKind::Identifier {
            return Err(self.cursor.error_at(token, "expected a component reference").into());
        }
        // verify the instance exists here or in the including instrument
        self.instance_by_name(&text)?;
        Ok(text)
    }

    fn instance_by_name(&self, name: &str) -> Result<&Instance, McCodeError> {
        if let Ok(instance) = self.state.get_component(name) {
            return Ok(instance);
        }
        if let Some(destination) = self.destination {
            return Ok(destination.get_component(name)?);
        }
        Err(SemanticError::UnknownReference(format!(
            "unknown component reference {name}"
        ))
        .into())
    }

    /// `name = expr`, `name = NULL`, or `name = {…}` assignments.
    fn instance_parameter(&mut self) -> Result<(String, Expr), McCodeError> {
        let name_token = self.cursor.expect(TokenKind::Identifier, "parameter name")?;
        let name = self.cursor.text(name_token).to_string();
        self.cursor.expect(TokenKind::Assign, "`=` in parameter assignment")?;
        let comp = self.current_comp.as_ref().ok_or_else(|| {
            SemanticError::UnknownParameter(format!("assignment of {name} outside a component"))
        })?;
        if comp.get_parameter(&name).is_none() {
            return Err(SemanticError::UnknownParameter(format!(
                "{name} is not a known DEFINITION or SETTING parameter for {}",
                comp.name
            ))
            .into());
        }
        let value = match self.cursor.peek_kind() {
            TokenKind::Null => {
                self.cursor.advance();
                Expr::str("NULL")
            }
            TokenKind::LBrace => {
                let mut value = self.expr()?;
                value.set_data_type(DataType::Float);
                value
            }
            _ => self.expr()?,
        };
        Ok((name, value))
    }

    /// `( expr , expr , expr )` — types stay symbolic so instrument
    /// parameters may appear in placements.
    fn coords(&mut self) -> Result<Vector, McCodeError> {
        self.cursor.expect(TokenKind::LParen, "`(` of coordinates")?;
        let x = self.expr()?;
        self.cursor.expect(TokenKind::Comma, "`,`")?;
        let y = self.expr()?;
        self.cursor.expect(TokenKind::Comma, "`,`")?;
        let z = self.expr()?;
        self.cursor.expect(TokenKind::RParen, "closing `)` of coordinates")?;
        Ok(Vector::new(x, y, z))
    }

    /// `ABSOLUTE`, `RELATIVE ABSOLUTE`, or `RELATIVE ref` → reference name.
    fn reference(&mut self) -> Result<Option<String>, McCodeError> {
        if self.cursor.eat(TokenKind::Absolute).is_some() {
            return Ok(None);
        }
        self.cursor.expect(TokenKind::Relative, "ABSOLUTE or RELATIVE")?;
        if self.cursor.eat(TokenKind::Absolute).is_some() {
            return Ok(None);
        }
        self.component_ref().map(Some)
    }

    /// `JUMP target (WHEN|ITERATE) expr`
    fn jump(&mut self) -> Result<Jump, McCodeError> {
        self.cursor.expect(TokenKind::Jump, "JUMP")?;
        let (target, relative) = self.jump_name()?;
        let iterate = if self.cursor.eat(TokenKind::Iterate).is_some() {
            true
        } else {
            self.cursor.expect(TokenKind::When, "WHEN or ITERATE")?;
            false
        };
        let condition = self.expr()?;
        Ok(Jump::new(target, relative, iterate, condition))
    }

    fn jump_name(&mut self) -> Result<(String, i64), McCodeError> {
        let token = self.cursor.advance();
        let text = self.cursor.text(token).to_string();
        match token.kind {
            TokenKind::Previous => {
                if self.cursor.eat(TokenKind::LParen).is_some() {
                    let count_token =
                        self.cursor.expect(TokenKind::IntegerLiteral, "PREVIOUS count")?;
                    let count: i64 = self.cursor.text(count_token).parse().map_err(|_| {
                        self.cursor.error_at(token, "invalid PREVIOUS count")
                    })?;
                    self.cursor.expect(TokenKind::RParen, "closing `)`")?;
                    Ok((format!("PREVIOUS_{count}"), -count))
                } else {
                    Ok(("PREVIOUS".to_string(), -1))
                }
            }
            TokenKind::Myself => Ok(("MYSELF".to_string(), 0)),
            TokenKind::Next => {
                if self.cursor.eat(TokenKind::LParen).is_some() {
                    let count_token =
                        self.cursor.expect(TokenKind::IntegerLiteral, "NEXT count")?;
                    let count: i64 = self.cursor.text(count_token).parse().map_err(|_| {
                        self.cursor.error_at(token, "invalid NEXT count")
                    })?;
                    self.cursor.expect(TokenKind::RParen, "closing `)`")?;
                    Ok((format!("NEXT_{count}"), count))
                } else {
                    Ok(("NEXT".to_string(), 1))
                }
            }
            TokenKind::Identifier => {
                if let Some(suffix) = text.strip_prefix("PREVIOUS_") {
                    let count: i64 = suffix.parse().map_err(|_| {
                        self.cursor.error_at(token, format!("invalid PREVIOUS count in {text}"))
                    })?;
                    Ok((text, -count))
                } else if let Some(suffix) = text.strip_prefix("NEXT_") {
                    let count: i64 = suffix.parse().map_err(|_| {
                        self.cursor.error_at(token, format!("invalid NEXT count in {text}"))
                    })?;
                    Ok((text, count))
                } else {
                    Ok((text, 0))
                }
            }
            _ => Err(self.cursor.error_at(token, "expected a JUMP target").into()),
        }
    }
}

/// Parse a single instrument-parameter declaration, e.g. `int n/"1"=10`.
pub fn parse_instrument_parameter(text: &str) -> Result<InstrumentParameter, ParseError> {
    let mut storage = Vec::new();
    let mut cursor = tokenize(text, "<parameter>", &mut storage)?;
    let mut parser = InstrParser {
        cursor: &mut cursor,
        resolver: &mut crate::parse_comp::NoResolver,
        state: Instr::new(String::new()),
        destination: None,
        current_comp: None,
        current_instance_name: None,
        mode: Mode::Normal,
        filename: "<parameter>",
    };
    parser
        .instrument_parameter()
        .map_err(|error| match error {
            McCodeError::Parse(parse) => parse,
            other => ParseError::new("<parameter>", text, 1, 0, other.to_string()),
        })
}

/// Fast path: extract only the instrument parameter list, resolving no
/// components.
pub fn parse_instr_parameters(source: &str) -> Result<Vec<InstrumentParameter>, McCodeError> {
    let mut storage = Vec::new();
    let mut cursor = tokenize(source, "<string>", &mut storage)?;
    cursor.expect(TokenKind::Define, "DEFINE")?;
    cursor.expect(TokenKind::Instrument, "INSTRUMENT")?;
    cursor.expect(TokenKind::Identifier, "instrument name")?;
    cursor.expect(TokenKind::LParen, "`(` of instrument parameters")?;
    let mut parameters = Vec::new();
    if !cursor.check(TokenKind::RParen) {
        let mut parser = InstrParser {
            cursor: &mut cursor,
            resolver: &mut crate::parse_comp::NoResolver,
            state: Instr::new(String::new()),
            destination: None,
            current_comp: None,
            current_instance_name: None,
            mode: Mode::Minimal,
            filename: "<string>",
        };
        loop {
            parameters.push(parser.instrument_parameter()?);
            if parser.cursor.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    Ok(parameters)
}

/// Expression parsing entry point kept close to the instrument grammar: a
/// bare expression with no instrument context.
pub fn parse_expr(text: &str) -> Result<Expr, ParseError> {
    let mut storage = Vec::new();
    let mut cursor = tokenize(text, "<expr>", &mut storage)?;
    parse_expression(&mut cursor, &EmptyContext)
}
