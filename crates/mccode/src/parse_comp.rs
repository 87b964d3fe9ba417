//! Parser for `.comp` component definition files.

use std::sync::Arc;

use crate::{
    comp::Comp,
    errors::McCodeError,
    expr::{DataType, Expr, ShapeType},
    lexer::TokenKind,
    params::{ComponentParameter, MetaData, RawC},
    parse::{TokenCursor, tokenize, unparsed_contents, unquote},
    parse_expr::{EmptyContext, parse_expression},
    parse_instr::McResolver,
};

/// Parse a component definition from source text.
///
/// `resolver` supplies other component definitions for the `COPY` header
/// form and `INHERIT` section entries.
pub fn parse_comp_source(
    source: &str,
    filename: &str,
    resolver: &mut dyn McResolver,
) -> Result<Comp, McCodeError> {
    let mut storage = Vec::new();
    let mut cursor = tokenize(source, filename, &mut storage)?;
    let mut parser = CompParser {
        cursor: &mut cursor,
        resolver,
        filename,
    };
    parser.parse()
}

struct CompParser<'a, 'c, 'r> {
    cursor: &'c mut TokenCursor<'a>,
    resolver: &'r mut dyn McResolver,
    filename: &'a str,
}

impl CompParser<'_, '_, '_> {
    fn parse(&mut self) -> Result<Comp, McCodeError> {
        self.cursor.expect(TokenKind::Define, "DEFINE")?;
        self.cursor.expect(TokenKind::Component, "COMPONENT")?;
        let name_token = self.cursor.expect(TokenKind::Identifier, "component name")?;
        let name = self.cursor.text(name_token).to_string();

        let mut comp = if self.cursor.eat(TokenKind::Copy).is_some() {
            // DEFINE COMPONENT New COPY Old — start from the old definition
            let parenthesised = self.cursor.eat(TokenKind::LParen).is_some();
            let base_token = self.cursor.expect(TokenKind::Identifier, "component to copy")?;
            let base_name = self.cursor.text(base_token).to_string();
            if parenthesised {
                self.cursor.expect(TokenKind::RParen, "closing `)` of COPY")?;
            }
            let mut base = (*self.resolver.get_component(&base_name)?).clone();
            base.name = name;
            base
        } else {
            Comp::new(name)
        };

        loop {
            match self.cursor.peek_kind() {
                TokenKind::End => {
                    self.cursor.advance();
                    break;
                }
                TokenKind::Definition => {
                    self.cursor.advance();
                    self.cursor.expect(TokenKind::Parameters, "PARAMETERS")?;
                    for parameter in self.parameter_list()? {
                        comp.add_define(parameter)?;
                    }
                }
                TokenKind::Setting => {
                    self.cursor.advance();
                    self.cursor.expect(TokenKind::Parameters, "PARAMETERS")?;
                    for parameter in self.parameter_list()? {
                        comp.add_setting(parameter)?;
                    }
                }
                TokenKind::Output => {
                    self.cursor.advance();
                    self.cursor.expect(TokenKind::Parameters, "PARAMETERS")?;
                    for parameter in self.parameter_list()? {
                        comp.add_output(parameter)?;
                    }
                }
                TokenKind::Category => {
                    self.cursor.advance();
                    let token = self.cursor.advance();
                    let text = self.cursor.text(token);
                    comp.category = Some(unquote(text).to_string());
                }
                TokenKind::Dependency => {
                    self.cursor.advance();
                    let token = self
                        .cursor
                        .expect(TokenKind::StringLiteral, "quoted DEPENDENCY string")?;
                    comp.dependency = Some(unquote(self.cursor.text(token)).to_string());
                }
                TokenKind::NoAcc => {
                    self.cursor.advance();
                    comp.no_acc();
                }
                TokenKind::MetaData => {
                    let metadata = self.metadata(&comp.name.clone())?;
                    comp.add_metadata(metadata);
                }
                TokenKind::Shell => {
                    self.cursor.advance();
                    let token = self
                        .cursor
                        .expect(TokenKind::StringLiteral, "quoted SHELL command")?;
                    run_shell_command(unquote(self.cursor.text(token)));
                }
                TokenKind::Share => {
                    self.cursor.advance();
                    let blocks = self.multi_block("share")?;
                    comp.share.extend(blocks);
                }
                TokenKind::UserVars => {
                    self.cursor.advance();
                    let blocks = self.multi_block("user")?;
                    comp.user.extend(blocks);
                }
                TokenKind::Declare => {
                    self.cursor.advance();
                    let blocks = self.multi_block("declare")?;
                    comp.declare.extend(blocks);
                }
                TokenKind::Initialize => {
                    self.cursor.advance();
                    let blocks = self.multi_block("initialize")?;
                    comp.initialize.extend(blocks);
                }
                TokenKind::Trace => {
                    self.cursor.advance();
                    let blocks = self.multi_block("trace")?;
                    comp.trace.extend(blocks);
                }
                TokenKind::Save => {
                    self.cursor.advance();
                    let blocks = self.multi_block("save")?;
                    comp.save.extend(blocks);
                }
                TokenKind::Finally => {
                    self.cursor.advance();
                    let blocks = self.multi_block("final")?;
                    comp.final_.extend(blocks);
                }
                TokenKind::McDisplay => {
                    self.cursor.advance();
                    let blocks = self.multi_block("display")?;
                    comp.display.extend(blocks);
                }
                _ => {
                    return Err(self
                        .cursor
                        .error_here("expected a component section or END")
                        .into());
                }
            }
        }
        Ok(comp)
    }

    /// `( component_parameter, … )`
    fn parameter_list(&mut self) -> Result<Vec<ComponentParameter>, McCodeError> {
        self.cursor.expect(TokenKind::LParen, "`(`")?;
        let mut parameters = Vec::new();
        if !self.cursor.check(TokenKind::RParen) {
            loop {
                parameters.push(self.parameter()?);
                if self.cursor.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.cursor.expect(TokenKind::RParen, "closing `)` of parameter list")?;
        Ok(parameters)
    }

    fn parameter(&mut self) -> Result<ComponentParameter, McCodeError> {
        let (data_type, shape_type) = match self.cursor.peek_kind() {
            TokenKind::Int => {
                self.cursor.advance();
                if self.cursor.eat(TokenKind::Star).is_some() {
                    (DataType::Int, ShapeType::Vector)
                } else {
                    (DataType::Int, ShapeType::Scalar)
                }
            }
            TokenKind::Double => {
                self.cursor.advance();
                if self.cursor.eat(TokenKind::Star).is_some() {
                    (DataType::Float, ShapeType::Vector)
                } else {
                    (DataType::Float, ShapeType::Scalar)
                }
            }
            TokenKind::StringType => {
                self.cursor.advance();
                (DataType::Str, ShapeType::Scalar)
            }
            TokenKind::VectorType => {
                self.cursor.advance();
                (DataType::Float, ShapeType::Vector)
            }
            _ => (DataType::Float, ShapeType::Scalar),
        };
        let name_token = self.cursor.expect(TokenKind::Identifier, "parameter name")?;
        let name = self.cursor.text(name_token).to_string();

        let mut value = if self.cursor.eat(TokenKind::Assign).is_some() {
            match self.cursor.peek_kind() {
                TokenKind::Null => {
                    self.cursor.advance();
                    Expr::str("NULL")
                }
                TokenKind::StringLiteral if data_type == DataType::Str => {
                    let token = self.cursor.advance();
                    Expr::str(self.cursor.text(token))
                }
                TokenKind::LBrace => {
                    let mut expr =
                        parse_expression(self.cursor, &EmptyContext).map_err(McCodeError::from)?;
                    expr.set_data_type(DataType::Float);
                    expr
                }
                _ => parse_expression(self.cursor, &EmptyContext).map_err(McCodeError::from)?,
            }
        } else {
            Expr::empty(data_type)
        };
        if !value.is_op() && value.data_type() == DataType::Undefined {
            value.set_data_type(data_type);
        }
        if !value.is_op() && data_type != DataType::Str {
            // typed literal defaults adopt the declared type and shape
            if value.is_constant() && !value.is_str() {
                value.set_data_type(data_type);
            }
            if shape_type == ShapeType::Vector && !value.is_vector() {
                value.set_shape_type(shape_type);
            }
        }
        Ok(ComponentParameter::new(name, value))
    }

    /// `unparsed_block? ((INHERIT Identifier) | (EXTEND unparsed_block))*`,
    /// preserving source order.
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
                    let other = self.resolver.get_component(self.cursor.text(token))?;
                    blocks.extend(section_of(&other, part).iter().cloned());
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
}

/// The named verbatim section of a component.
pub fn section_of<'c>(comp: &'c Comp, part: &str) -> &'c [RawC] {
    match part {
        "share" => &comp.share,
        "user" => &comp.user,
        "declare" => &comp.declare,
        "initialize" => &comp.initialize,
        "trace" => &comp.trace,
        "save" => &comp.save,
        "final" => &comp.final_,
        "display" => &comp.display,
        _ => &[],
    }
}

/// Run a SHELL directive's command (no shell interpretation). Failures are
/// logged, not fatal: the directive exists for build-environment setup.
pub fn run_shell_command(command: &str) {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return;
    };
    match std::process::Command::new(program).args(parts).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!(command, %status, "SHELL command exited non-zero");
        }
        Err(error) => {
            tracing::warn!(command, %error, "SHELL command failed to run");
        }
    }
}

/// A resolver that knows nothing, for sources without COPY or INHERIT.
pub struct NoResolver;

impl McResolver for NoResolver {
    fn get_component(&mut self, name: &str) -> Result<Arc<Comp>, McCodeError> {
        Err(crate::errors::ResolveError::NotFound {
            name: name.to_string(),
            registries: Vec::new(),
        }
        .into())
    }

    fn get_instrument_included(
        &mut self,
        name: &str,
        _destination: &crate::instr::Instr,
        _mode: crate::params::Mode,
    ) -> Result<crate::instr::Instr, McCodeError> {
        Err(crate::errors::ResolveError::NotFound {
            name: name.to_string(),
            registries: Vec::new(),
        }
        .into())
    }

    fn handle_search_keyword(&mut self, _spec: &str) -> Result<(), McCodeError> {
        Ok(())
    }
}

/// Convenience wrapper for tests and injected sources without a reader.
pub fn parse_comp_text(source: &str) -> Result<Comp, McCodeError> {
    parse_comp_source(source, "<string>", &mut NoResolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Payload;

    const SLIT: &str = r#"
DEFINE COMPONENT Slit
SETTING PARAMETERS (double xmin=-0.01, xmax=0.01, int first=0, string profile=NULL)
DECLARE
%{
  double width;
%}
INITIALIZE
%{
  width = xmax - xmin;
%}
TRACE
%{
  PROP_Z0;
%}
END
"#;

    #[test]
    fn parses_slit() {
        let comp = parse_comp_text(SLIT).unwrap();
        assert_eq!(comp.name, "Slit");
        assert_eq!(comp.setting.len(), 4);
        assert_eq!(comp.setting[0].name, "xmin");
        assert_eq!(
            comp.setting[0].value.constant().unwrap().payload,
            Payload::Float(-0.01)
        );
        assert_eq!(comp.setting[2].value.data_type(), DataType::Int);
        assert!(comp.setting[3].value.is_str());
        assert_eq!(comp.declare.len(), 1);
        assert!(comp.declare[0].text.contains("double width;"));
        assert!(comp.trace[0].text.contains("PROP_Z0;"));
        assert!(comp.acc);
    }

    #[test]
    fn duplicate_parameter_name_rejected() {
        let source = "DEFINE COMPONENT Bad\nSETTING PARAMETERS (x, int x)\nEND\n";
        assert!(parse_comp_text(source).is_err());
    }

    #[test]
    fn noacc_and_category() {
        let source =
            "DEFINE COMPONENT C\nCATEGORY optics\nNOACC\nSETTING PARAMETERS (x=1)\nTRACE %{ %}\nEND\n";
        let comp = parse_comp_text(source).unwrap();
        assert!(!comp.acc);
        assert_eq!(comp.category.as_deref(), Some("optics"));
    }

    #[test]
    fn dependency_macro_is_not_evaluated() {
        let source = "DEFINE COMPONENT M\nDEPENDENCY \"@MCPLFLAGS@\"\nTRACE %{ %}\nEND\n";
        let comp = parse_comp_text(source).unwrap();
        assert_eq!(comp.dependency.as_deref(), Some("@MCPLFLAGS@"));
    }

    #[test]
    fn metadata_block() {
        let source = "DEFINE COMPONENT M\nMETADATA \"application/json\" spec %{ {\"a\": 1} %}\nTRACE %{ %}\nEND\n";
        let comp = parse_comp_text(source).unwrap();
        assert_eq!(comp.metadata.len(), 1);
        assert_eq!(comp.metadata[0].mimetype, "application/json");
        assert!(comp.metadata[0].value.contains("\"a\": 1"));
    }
}
