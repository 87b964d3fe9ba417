//! Expression parsing: lowers the thirty expression productions shared by
//! both dialects straight into folded [`Expr`] trees.

use crate::{
    expr::{DataType, Expr, ObjectType, Payload, ShapeType, Value},
    lexer::TokenKind,
    params::InstrumentParameter,
    parse::{ParseError, TokenCursor, unquote},
};

/// Lookups an expression may need from the surrounding visitor state.
pub trait ExprContext {
    /// Instrument parameter of this name, for identifier classification.
    fn instrument_parameter(&self, _name: &str) -> Option<&InstrumentParameter> {
        None
    }

    /// Name of the most recently added component, for `PREVIOUS` used in an
    /// expression position.
    fn previous_name(&self) -> Option<String> {
        None
    }

    /// Name of the component instance currently being constructed, for
    /// `MYSELF` used in an expression position.
    fn myself_name(&self) -> Option<String> {
        None
    }
}

/// A context with no instrument state (component files, bare expressions).
pub struct EmptyContext;

impl ExprContext for EmptyContext {}

/// Parse one expression starting at the cursor.
pub fn parse_expression(
    cursor: &mut TokenCursor<'_>,
    ctx: &dyn ExprContext,
) -> Result<Expr, ParseError> {
    parse_ternary(cursor, ctx)
}

fn parse_ternary(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let test = parse_or(cursor, ctx)?;
    if cursor.eat(TokenKind::Question).is_some() {
        let then = parse_ternary(cursor, ctx)?;
        cursor.expect(TokenKind::Colon, "`:` in conditional expression")?;
        let otherwise = parse_ternary(cursor, ctx)?;
        return Ok(Expr::trinary(test, then, otherwise));
    }
    Ok(test)
}

fn parse_or(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let mut left = parse_and(cursor, ctx)?;
    while cursor.eat(TokenKind::OrOr).is_some() {
        let right = parse_and(cursor, ctx)?;
        left = Expr::binary_op("__or__", left, right);
    }
    Ok(left)
}

fn parse_and(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let mut left = parse_equality(cursor, ctx)?;
    while cursor.eat(TokenKind::AndAnd).is_some() {
        let right = parse_equality(cursor, ctx)?;
        left = Expr::binary_op("__and__", left, right);
    }
    Ok(left)
}

fn parse_equality(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let mut left = parse_relational(cursor, ctx)?;
    loop {
        let op = match cursor.peek_kind() {
            TokenKind::EqEq => "__eq__",
            TokenKind::Neq => "__neq__",
            _ => break,
        };
        cursor.advance();
        let right = parse_relational(cursor, ctx)?;
        left = Expr::binary_op(op, left, right);
    }
    Ok(left)
}

fn parse_relational(
    cursor: &mut TokenCursor<'_>,
    ctx: &dyn ExprContext,
) -> Result<Expr, ParseError> {
    let mut left = parse_shift(cursor, ctx)?;
    loop {
        let op = match cursor.peek_kind() {
            TokenKind::Lt => "__lt__",
            TokenKind::Gt => "__gt__",
            TokenKind::Le => "__le__",
            TokenKind::Ge => "__ge__",
            _ => break,
        };
        cursor.advance();
        let right = parse_shift(cursor, ctx)?;
        left = Expr::binary_op(op, left, right);
    }
    Ok(left)
}

fn parse_shift(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let mut left = parse_additive(cursor, ctx)?;
    loop {
        let op = match cursor.peek_kind() {
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            _ => break,
        };
        cursor.advance();
        let right = parse_additive(cursor, ctx)?;
        left = Expr::binary_op(op, left, right);
    }
    Ok(left)
}

fn parse_additive(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let mut left = parse_multiplicative(cursor, ctx)?;
    loop {
        let kind = cursor.peek_kind();
        if kind != TokenKind::Plus && kind != TokenKind::Minus {
            break;
        }
        cursor.advance();
        let right = parse_multiplicative(cursor, ctx)?;
        left = if kind == TokenKind::Plus {
            left.add(right)
        } else {
            left.sub(right)
        };
    }
    Ok(left)
}

fn parse_multiplicative(
    cursor: &mut TokenCursor<'_>,
    ctx: &dyn ExprContext,
) -> Result<Expr, ParseError> {
    let mut left = parse_unary(cursor, ctx)?;
    loop {
        let kind = cursor.peek_kind();
        if !matches!(kind, TokenKind::Star | TokenKind::Slash | TokenKind::Percent) {
            break;
        }
        let token = cursor.advance();
        let right = parse_unary(cursor, ctx)?;
        left = match kind {
            TokenKind::Star => left.mul(right),
            TokenKind::Slash => left
                .div(right)
                .map_err(|error| cursor.error_at(token, error.to_string()))?,
            _ => Expr::binary_op("%", left, right),
        };
    }
    Ok(left)
}

fn parse_unary(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    match cursor.peek_kind() {
        TokenKind::Minus => {
            cursor.advance();
            Ok(parse_unary(cursor, ctx)?.neg())
        }
        TokenKind::Plus => {
            cursor.advance();
            parse_unary(cursor, ctx)
        }
        TokenKind::Not => {
            cursor.advance();
            Ok(Expr::unary_op("__not__", parse_unary(cursor, ctx)?))
        }
        _ => parse_exponent(cursor, ctx),
    }
}

fn parse_exponent(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let base = parse_primary(cursor, ctx)?;
    if cursor.eat(TokenKind::Caret).is_some() {
        // right associative
        let exponent = parse_unary(cursor, ctx)?;
        return Ok(base.pow(exponent));
    }
    Ok(base)
}

fn parse_primary(cursor: &mut TokenCursor<'_>, ctx: &dyn ExprContext) -> Result<Expr, ParseError> {
    let token = cursor.peek();
    match token.kind {
        TokenKind::LParen => {
            cursor.advance();
            let inner = parse_expression(cursor, ctx)?;
            cursor.expect(TokenKind::RParen, "closing `)`")?;
            Ok(Expr::group(inner))
        }
        TokenKind::LBrace => parse_initializer_list(cursor, ctx),
        TokenKind::IntegerLiteral => {
            cursor.advance();
            Ok(Expr::value(Value::int_text(cursor.text(token))))
        }
        TokenKind::FloatLiteral => {
            cursor.advance();
            Ok(Expr::value(Value::float_text(cursor.text(token))))
        }
        TokenKind::StringLiteral => {
            // adjacent string literals concatenate
            let mut joined = String::new();
            while cursor.check(TokenKind::StringLiteral) {
                let piece = cursor.advance();
                joined.push_str(unquote(cursor.text(piece)));
            }
            Ok(Expr::str(format!("\"{joined}\"")))
        }
        TokenKind::Null => {
            cursor.advance();
            Ok(Expr::str("NULL"))
        }
        TokenKind::Previous => {
            cursor.advance();
            ctx.previous_name().map(Expr::str).ok_or_else(|| {
                cursor.error_at(token, "PREVIOUS used in expression before any components defined")
            })
        }
        TokenKind::Myself => {
            cursor.advance();
            ctx.myself_name().map(Expr::str).ok_or_else(|| {
                cursor.error_at(token, "MYSELF used in expression outside a component instance")
            })
        }
        TokenKind::Identifier => parse_identifier(cursor, ctx),
        _ => Err(cursor.error_here("expected an expression")),
    }
}

fn parse_initializer_list(
    cursor: &mut TokenCursor<'_>,
    ctx: &dyn ExprContext,
) -> Result<Expr, ParseError> {
    cursor.expect(TokenKind::LBrace, "`{`")?;
    let mut values = Vec::new();
    if !cursor.check(TokenKind::RBrace) {
        loop {
            values.push(parse_expression(cursor, ctx)?);
            if cursor.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    cursor.expect(TokenKind::RBrace, "closing `}` of initializer list")?;
    Ok(Expr::array(values))
}

fn parse_identifier(
    cursor: &mut TokenCursor<'_>,
    ctx: &dyn ExprContext,
) -> Result<Expr, ParseError> {
    let token = cursor.expect(TokenKind::Identifier, "identifier")?;
    let name = cursor.text(token).to_string();
    match cursor.peek_kind() {
        TokenKind::LParen => {
            cursor.advance();
            let mut args = Vec::new();
            if !cursor.check(TokenKind::RParen) {
                loop {
                    args.push(parse_expression(cursor, ctx)?);
                    if cursor.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            cursor.expect(TokenKind::RParen, "closing `)` of call")?;
            Ok(Expr::call(&name, args))
        }
        TokenKind::LBrack => {
            cursor.advance();
            let index = parse_expression(cursor, ctx)?;
            cursor.expect(TokenKind::RBrack, "closing `]` of array access")?;
            let array = Expr::value(Value::new(
                Payload::Str(name),
                DataType::Undefined,
                ObjectType::Identifier,
                ShapeType::Vector,
            ));
            Ok(Expr::index(array, index))
        }
        TokenKind::Arrow => {
            cursor.advance();
            let field = parse_primary(cursor, ctx)?;
            Ok(Expr::pointer_access(Expr::id(name), field))
        }
        TokenKind::Dot => {
            cursor.advance();
            let field = parse_primary(cursor, ctx)?;
            Ok(Expr::struct_access(Expr::id(name), field))
        }
        TokenKind::Assign => Err(cursor.error_at(
            token,
            format!(
                "{}: {} -- assignment statements are not supported",
                cursor.file, token.line
            ),
        )),
        _ => match ctx.instrument_parameter(&name) {
            Some(parameter) => Ok(Expr::value(Value::new(
                Payload::Str(name),
                parameter.value.data_type(),
                ObjectType::Parameter,
                ShapeType::Scalar,
            ))),
            None => Ok(Expr::id(name)),
        },
    }
}

/// Parse a standalone expression from text (no instrument context).
pub fn parse_expr_text(text: &str) -> Result<Expr, ParseError> {
    let mut storage = Vec::new();
    let mut cursor = crate::parse::tokenize(text, "<expr>", &mut storage)?;
    let expr = parse_expression(&mut cursor, &EmptyContext)?;
    if !cursor.at_eof() {
        return Err(cursor.error_here("unexpected trailing input after expression"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Payload;

    #[test]
    fn arithmetic_folds() {
        let e = parse_expr_text("2 + 3 * 4").unwrap();
        assert_eq!(e.constant().unwrap().payload, Payload::Int(14));
    }

    #[test]
    fn identifiers_stay_symbolic() {
        let e = parse_expr_text("2 * width").unwrap();
        assert!(e.is_op());
        assert_eq!(e.ids(), vec!["width"]);
    }

    #[test]
    fn division_by_literal_zero_is_an_error() {
        assert!(parse_expr_text("1 / 0").is_err());
        assert!(parse_expr_text("x / 0").is_err());
    }

    #[test]
    fn trinary_renders() {
        let e = parse_expr_text("a > 1 ? 2 : 3").unwrap();
        assert_eq!(e.to_string(), "a>1 ? 2 : 3");
    }

    #[test]
    fn string_concatenation() {
        let e = parse_expr_text("\"ab\" \"cd\"").unwrap();
        assert!(e.is_str());
        assert_eq!(e.to_string(), "\"abcd\"");
    }

    #[test]
    fn call_and_index() {
        let call = parse_expr_text("sin(x)").unwrap();
        assert_eq!(call.to_string(), "sin(x)");
        let idx = parse_expr_text("values[3]").unwrap();
        assert_eq!(idx.to_string(), "values[3]");
    }

    #[test]
    fn grouping_prints_parentheses() {
        let e = parse_expr_text("(a + b) * c").unwrap();
        assert_eq!(e.to_string(), "((a + b)) * c");
    }

    #[test]
    fn assignment_is_rejected() {
        assert!(parse_expr_text("(x = 1)").is_err());
    }

    #[test]
    fn initializer_list() {
        let e = parse_expr_text("{1, 2, 3}").unwrap();
        assert!(e.is_vector());
        assert_eq!(e.to_string(), "{1, 2, 3}");
    }
}
