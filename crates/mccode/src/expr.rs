//! Symbolic arithmetic expressions for instrument and component parameters.
//!
//! McCode parameter values, placements, and WHEN/SPLIT/JUMP conditions are all
//! expressions over literals and identifiers. The tree is kept symbolic: an
//! identifier is never replaced by a literal, but arithmetic between literal
//! operands folds eagerly so that `2 * 0.5` reaches the code generator as `1`.
//!
//! Construction happens through the builder API (`Expr::add`, `Expr::mul`, …)
//! which applies the folding rules, or through the expression parser which
//! calls the same builders while lowering the parse tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared or inferred scalar type of an expression.
///
/// Promotion follows the legacy McCode rules: `undefined` is absorbed by any
/// other type, mixing `float` and `int` yields `int`, and anything mixed with
/// `str` becomes `str` (which marks the operation as non-foldable).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Undefined,
    Float,
    Int,
    Str,
}

impl DataType {
    pub fn compatible(self, other: Self) -> bool {
        if self == Self::Undefined || other == Self::Undefined || self == other {
            return true;
        }
        matches!(
            (self, other),
            (Self::Float, Self::Int) | (Self::Int, Self::Float)
        )
    }

    /// The legacy promotion rule shared by all four arithmetic operators.
    pub fn promote(self, other: Self) -> Self {
        match (self, other) {
            (Self::Undefined, x) => x,
            (x, Self::Undefined) => x,
            (x, y) if x == y => x,
            (Self::Float, Self::Int) | (Self::Int, Self::Float) => Self::Int,
            _ => Self::Str,
        }
    }

    pub fn is_str(self) -> bool {
        self == Self::Str
    }

    /// The C type spelling used by the code generator.
    pub fn mccode_c_type(self) -> Option<&'static str> {
        match self {
            Self::Float => Some("double"),
            Self::Int => Some("int"),
            Self::Str => Some("char *"),
            Self::Undefined => None,
        }
    }
}

/// What kind of object a [`Value`] payload names.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    #[default]
    Value,
    InitializerList,
    Identifier,
    Function,
    Parameter,
}

/// Scalar or vector shape of a value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    #[default]
    Scalar,
    Vector,
}

impl ShapeType {
    pub fn compatible(self, other: Self) -> bool {
        self == other
    }

    pub fn mccode_c_type(self) -> &'static str {
        match self {
            Self::Scalar => "",
            Self::Vector => "*",
        }
    }
}

/// Errors raised by expression construction or evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Division by a literal zero. Symbolic zeros are not detected.
    DivisionByZero,
    /// A string literal was used where a numeric value is required.
    TypeMismatch(String),
    /// `.value()` was requested on a non-constant tree.
    NotConstant(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::TypeMismatch(what) => write!(f, "type mismatch: {what}"),
            Self::NotConstant(what) => write!(f, "expression is not constant: {what}"),
        }
    }
}

impl std::error::Error for ExprError {}

/// Output dialect for pretty-printing.
///
/// `C` is the translation target; `Python` is used for reporting only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrintStyle {
    #[default]
    C,
    Python,
}

/// The concrete content of a [`Value`] leaf.
///
/// String payloads serve double duty: a quoted string literal is stored with
/// its quotes and `data_type = str`, while a bare identifier is stored
/// unquoted with a non-`str` (usually `undefined`) data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// A declared-but-unset value, e.g. a parameter with no default.
    Empty,
    Int(i64),
    Float(f64),
    Str(String),
    /// Initializer-list contents, e.g. `{1, 2, 3}`.
    Array(Vec<Expr>),
}

impl Payload {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// A leaf of the expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub payload: Payload,
    pub data_type: DataType,
    pub object_type: ObjectType,
    pub shape_type: ShapeType,
}

impl Value {
    pub fn new(
        payload: Payload,
        data_type: DataType,
        object_type: ObjectType,
        shape_type: ShapeType,
    ) -> Self {
        Self {
            payload,
            data_type,
            object_type,
            shape_type,
        }
    }

    pub fn int(v: i64) -> Self {
        Self::new(Payload::Int(v), DataType::Int, ObjectType::Value, ShapeType::Scalar)
    }

    pub fn float(v: f64) -> Self {
        Self::new(Payload::Float(v), DataType::Float, ObjectType::Value, ShapeType::Scalar)
    }

    /// A string literal (the payload keeps its surrounding quotes, when any).
    pub fn str(v: impl Into<String>) -> Self {
        Self::new(Payload::Str(v.into()), DataType::Str, ObjectType::Value, ShapeType::Scalar)
    }

    /// A bare identifier of not-yet-known type.
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(
            Payload::Str(name.into()),
            DataType::Undefined,
            ObjectType::Identifier,
            ShapeType::Scalar,
        )
    }

    /// A function name used as a call target.
    pub fn function(name: impl Into<String>) -> Self {
        Self::new(
            Payload::Str(name.into()),
            DataType::Undefined,
            ObjectType::Function,
            ShapeType::Scalar,
        )
    }

    pub fn array(values: Vec<Expr>) -> Self {
        Self::new(
            Payload::Array(values),
            DataType::Undefined,
            ObjectType::InitializerList,
            ShapeType::Vector,
        )
    }

    /// An unset value carrying only a declared type.
    pub fn empty(data_type: DataType) -> Self {
        Self::new(Payload::Empty, data_type, ObjectType::Value, ShapeType::Scalar)
    }

    /// Classify a literal by its text: integer when it parses exactly, float
    /// when fractional, identifier otherwise.
    pub fn best(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            return Self::int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
                return Self::int(f as i64);
            }
            return Self::float(f);
        }
        Self::identifier(text)
    }

    /// Classify a numeric result: integral floats collapse to `int`.
    fn best_number(v: f64) -> Self {
        if v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64 {
            Self::int(v as i64)
        } else {
            Self::float(v)
        }
    }

    /// Parse `text` as a float, falling back to a float-typed identifier so
    /// that typed parameter defaults like `double d = dist` stay symbolic.
    pub fn float_text(text: &str) -> Self {
        match text.parse::<f64>() {
            Ok(f) => Self::new(Payload::Float(f), DataType::Float, ObjectType::Value, ShapeType::Scalar),
            Err(_) => Self::new(
                Payload::Str(text.to_string()),
                DataType::Float,
                ObjectType::Identifier,
                ShapeType::Scalar,
            ),
        }
    }

    /// Parse `text` as an integer, falling back to an int-typed identifier.
    pub fn int_text(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(i) => Self::new(Payload::Int(i), DataType::Int, ObjectType::Value, ShapeType::Scalar),
            Err(_) => Self::new(
                Payload::Str(text.to_string()),
                DataType::Int,
                ObjectType::Identifier,
                ShapeType::Scalar,
            ),
        }
    }

    /// True when the payload is an unquoted name rather than data: a string
    /// payload whose declared type is not `str`.
    pub fn is_id(&self) -> bool {
        self.data_type != DataType::Str && matches!(self.payload, Payload::Str(_))
    }

    pub fn is_str(&self) -> bool {
        self.data_type.is_str()
    }

    pub fn is_parameter(&self) -> bool {
        self.object_type == ObjectType::Parameter
    }

    pub fn has_value(&self) -> bool {
        !matches!(self.payload, Payload::Empty)
    }

    pub fn is_zero(&self) -> bool {
        if self.is_id() {
            return false;
        }
        match self.payload {
            Payload::Int(i) => i == 0,
            Payload::Float(f) => f == 0.0,
            _ => false,
        }
    }

    /// Numeric equality probe. String-typed and identifier values never
    /// compare equal to a number, even when their text looks numeric.
    pub fn is_value(&self, v: f64) -> bool {
        if self.is_id() || self.is_str() {
            return false;
        }
        self.payload.as_f64() == Some(v)
    }

    pub fn is_scalar(&self) -> bool {
        self.shape_type == ShapeType::Scalar
    }

    pub fn is_vector(&self) -> bool {
        self.shape_type == ShapeType::Vector
    }

    /// The C type of this value, e.g. `double` or `char **`.
    pub fn mccode_c_type(&self) -> Option<String> {
        self.data_type
            .mccode_c_type()
            .map(|t| format!("{t}{}", self.shape_type.mccode_c_type()))
    }

    /// The runtime type tag used by generated instrument tables.
    pub fn mccode_c_type_name(&self) -> Option<&'static str> {
        match (self.data_type, self.shape_type) {
            (DataType::Float, ShapeType::Scalar) => Some("instr_type_double"),
            (DataType::Int, ShapeType::Scalar) => Some("instr_type_int"),
            (DataType::Str, ShapeType::Scalar) => Some("instr_type_string"),
            (DataType::Float | DataType::Int, ShapeType::Vector) => Some("instr_type_vector"),
            _ => None,
        }
    }

    fn render(&self, style: PrintStyle) -> String {
        let body = match &self.payload {
            Payload::Empty => String::new(),
            Payload::Int(i) => i.to_string(),
            Payload::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Payload::Str(s) => s.clone(),
            Payload::Array(values) => {
                let inner: Vec<String> = values.iter().map(|v| v.render(style)).collect();
                format!("{{{}}}", inner.join(", "))
            }
        };
        if self.is_parameter() && style == PrintStyle::C {
            format!("_instrument_var._parameters.{body}")
        } else {
            body
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(PrintStyle::C))
    }
}

/// A unary operator node. `op` is one of `-`, `+`, `abs`, `__not__`,
/// `__group__`, or a function name like `cos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryOp {
    pub op: String,
    pub value: Box<ExprNode>,
    pub data_type: DataType,
}

/// A binary operator node. Arithmetic uses the literal operator text, while
/// special forms use dunder-style tags (`__call__`, `__getitem__`,
/// `__pow__`, comparisons, `__and__`/`__or__`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOp {
    pub op: String,
    pub left: Box<ExprNode>,
    pub right: Box<ExprNode>,
    pub data_type: DataType,
}

/// The C conditional operator `test ? then : otherwise`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrinaryOp {
    pub op: String,
    pub test: Box<ExprNode>,
    pub then: Box<ExprNode>,
    pub otherwise: Box<ExprNode>,
    pub data_type: DataType,
}

/// One node of the symbolic tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprNode {
    Value(Value),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Trinary(TrinaryOp),
}

impl ExprNode {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Value(v) => v.data_type,
            Self::Unary(u) => u.data_type,
            Self::Binary(b) => b.data_type,
            Self::Trinary(t) => t.data_type,
        }
    }

    fn set_data_type(&mut self, data_type: DataType) {
        match self {
            Self::Value(v) => v.data_type = data_type,
            Self::Unary(u) => u.data_type = data_type,
            Self::Binary(b) => b.data_type = data_type,
            Self::Trinary(t) => t.data_type = data_type,
        }
    }

    fn is_zero(&self) -> bool {
        matches!(self, Self::Value(v) if v.is_zero())
    }

    fn is_value(&self, v: f64) -> bool {
        matches!(self, Self::Value(value) if value.is_value(v))
    }

    fn is_id(&self) -> bool {
        matches!(self, Self::Value(v) if v.is_id())
    }

    fn constant_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) if !v.is_id() => Some(v),
            _ => None,
        }
    }

    fn collect_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Value(v) => {
                if v.is_id()
                    && let Payload::Str(name) = &v.payload
                    && !out.contains(&name.as_str())
                {
                    out.push(name.as_str());
                }
                if let Payload::Array(values) = &v.payload {
                    for e in values {
                        e.node.collect_ids(out);
                    }
                }
            }
            Self::Unary(u) => u.value.collect_ids(out),
            Self::Binary(b) => {
                b.left.collect_ids(out);
                b.right.collect_ids(out);
            }
            Self::Trinary(t) => {
                t.test.collect_ids(out);
                t.then.collect_ids(out);
                t.otherwise.collect_ids(out);
            }
        }
    }

    fn promote_parameters(&mut self, names: &[&str]) {
        match self {
            Self::Value(v) => {
                if v.is_id()
                    && v.object_type != ObjectType::Function
                    && let Payload::Str(name) = &v.payload
                    && names.contains(&name.as_str())
                {
                    v.object_type = ObjectType::Parameter;
                }
                if let Payload::Array(values) = &mut v.payload {
                    for e in values {
                        e.node.promote_parameters(names);
                    }
                }
            }
            Self::Unary(u) => u.value.promote_parameters(names),
            Self::Binary(b) => {
                b.left.promote_parameters(names);
                b.right.promote_parameters(names);
            }
            Self::Trinary(t) => {
                t.test.promote_parameters(names);
                t.then.promote_parameters(names);
                t.otherwise.promote_parameters(names);
            }
        }
    }

    fn render(&self, style: PrintStyle) -> String {
        match self {
            Self::Value(v) => v.render(style),
            Self::Unary(u) => {
                let inner = u.value.render(style);
                match u.op.as_str() {
                    "__group__" => format!("({inner})"),
                    "__not__" => {
                        if style == PrintStyle::C {
                            format!("!{inner}")
                        } else {
                            format!("not {inner}")
                        }
                    }
                    "-" | "+" => format!("{}{inner}", u.op),
                    name => format!("{name}({inner})"),
                }
            }
            Self::Binary(b) => {
                let l = b.left.render(style);
                let r = b.right.render(style);
                match b.op.as_str() {
                    "__call__" => format!("{l}({r})"),
                    "__getitem__" => format!("{l}[{r}]"),
                    "__pointer_access__" => format!("{l}->{r}"),
                    "__struct_access__" => format!("{l}.{r}"),
                    "__pow__" => {
                        if style == PrintStyle::C {
                            format!("{l}^{r}")
                        } else {
                            format!("{l}**{r}")
                        }
                    }
                    "__lt__" => format!("{l}<{r}"),
                    "__gt__" => format!("{l}>{r}"),
                    "__le__" => format!("{l}<={r}"),
                    "__ge__" => format!("{l}>={r}"),
                    "__eq__" => format!("{l}=={r}"),
                    "__neq__" => format!("{l}!={r}"),
                    "__or__" => {
                        if style == PrintStyle::C {
                            format!("{l} || {r}")
                        } else {
                            format!("{l} or {r}")
                        }
                    }
                    "__and__" => {
                        if style == PrintStyle::C {
                            format!("{l} && {r}")
                        } else {
                            format!("{l} and {r}")
                        }
                    }
                    "__comma__" => format!("{l}, {r}"),
                    "+" | "-" => format!("({l} {} {r})", b.op),
                    "*" | "/" | "%" | "<<" | ">>" => format!("{l} {} {r}", b.op),
                    op => format!("{op}({l}, {r})"),
                }
            }
            Self::Trinary(t) => {
                let c = t.test.render(style);
                let a = t.then.render(style);
                let b = t.otherwise.render(style);
                if style == PrintStyle::C {
                    format!("{c} ? {a} : {b}")
                } else {
                    format!("{a} if {c} else {b}")
                }
            }
        }
    }

    /// Non-empty argument list joined with `, ` for `__call__` right sides.
    fn comma_list(args: Vec<Expr>) -> Self {
        let mut iter = args.into_iter();
        let first = iter
            .next()
            .map_or_else(|| Self::Value(Value::empty(DataType::Undefined)), |e| e.node);
        iter.fold(first, |acc, e| {
            let data_type = acc.data_type().promote(e.node.data_type());
            Self::Binary(BinaryOp {
                op: "__comma__".to_string(),
                left: Box::new(acc),
                right: Box::new(e.node),
                data_type,
            })
        })
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(PrintStyle::C))
    }
}

/// A complete symbolic expression.
///
/// Wraps a single [`ExprNode`] and carries the folding builder API. Folding
/// never converts an identifier into a literal; `is_constant` is therefore
/// equivalent to "no free identifiers anywhere in the tree".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expr {
    pub node: ExprNode,
}

impl Expr {
    pub fn new(node: ExprNode) -> Self {
        Self { node }
    }

    pub fn value(value: Value) -> Self {
        Self::new(ExprNode::Value(value))
    }

    pub fn int(v: i64) -> Self {
        Self::value(Value::int(v))
    }

    pub fn float(v: f64) -> Self {
        Self::value(Value::float(v))
    }

    pub fn str(v: impl Into<String>) -> Self {
        Self::value(Value::str(v))
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self::value(Value::identifier(name))
    }

    pub fn array(values: Vec<Self>) -> Self {
        Self::value(Value::array(values))
    }

    pub fn empty(data_type: DataType) -> Self {
        Self::value(Value::empty(data_type))
    }

    pub fn best(text: &str) -> Self {
        Self::value(Value::best(text))
    }

    // -- predicates ---------------------------------------------------------

    pub fn is_op(&self) -> bool {
        !matches!(self.node, ExprNode::Value(_))
    }

    pub fn is_zero(&self) -> bool {
        self.node.is_zero()
    }

    pub fn is_id(&self) -> bool {
        self.node.is_id()
    }

    pub fn is_str(&self) -> bool {
        matches!(&self.node, ExprNode::Value(v) if v.is_str())
    }

    pub fn is_parameter(&self) -> bool {
        matches!(&self.node, ExprNode::Value(v) if v.is_parameter())
    }

    pub fn is_constant(&self) -> bool {
        matches!(&self.node, ExprNode::Value(v) if !v.is_id())
    }

    pub fn has_value(&self) -> bool {
        matches!(&self.node, ExprNode::Value(v) if !v.is_id() && v.has_value())
    }

    pub fn is_value(&self, v: f64) -> bool {
        self.node.is_value(v)
    }

    pub fn is_scalar(&self) -> bool {
        match &self.node {
            ExprNode::Value(v) => v.is_scalar(),
            _ => true,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(&self.node, ExprNode::Value(v) if v.is_vector())
    }

    pub fn data_type(&self) -> DataType {
        self.node.data_type()
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.node.set_data_type(data_type);
    }

    pub fn shape_type(&self) -> ShapeType {
        match &self.node {
            ExprNode::Value(v) => v.shape_type,
            _ => ShapeType::Scalar,
        }
    }

    pub fn set_shape_type(&mut self, shape_type: ShapeType) {
        if let ExprNode::Value(v) = &mut self.node {
            v.shape_type = shape_type;
        }
    }

    /// All distinct free identifier names in the tree, in encounter order.
    pub fn ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.node.collect_ids(&mut out);
        out
    }

    /// The literal payload of a constant tree.
    pub fn constant(&self) -> Result<&Value, ExprError> {
        match &self.node {
            ExprNode::Value(v) if !v.is_id() => Ok(v),
            other => Err(ExprError::NotConstant(other.to_string())),
        }
    }

    /// Reclassify identifiers matching known instrument-parameter names.
    /// Literal strings and function names are never promoted.
    pub fn promote_parameters(&mut self, names: &[&str]) {
        self.node.promote_parameters(names);
    }

    /// Type/shape compatibility for instance-parameter assignment. With
    /// `id_ok`, symbolic operands and string identifiers are acceptable.
    pub fn compatible(&self, other: &Self, id_ok: bool) -> bool {
        let ExprNode::Value(own) = &self.node else {
            return id_ok;
        };
        let ExprNode::Value(theirs) = &other.node else {
            return id_ok;
        };
        (id_ok && theirs.is_str())
            || (own.data_type.compatible(theirs.data_type)
                && own.shape_type.compatible(theirs.shape_type))
    }

    pub fn to_style(&self, style: PrintStyle) -> String {
        self.render(style)
    }

    fn render(&self, style: PrintStyle) -> String {
        self.node.render(style)
    }

    // -- folding builders ---------------------------------------------------

    pub fn add(self, other: Self) -> Self {
        if other.is_zero() {
            return self;
        }
        if self.is_zero() {
            return other;
        }
        // a + (-b) rewrites to a - b
        if let ExprNode::Unary(u) = &other.node
            && u.op == "-"
        {
            let inner = Self::new((*u.value).clone());
            return self.sub(inner);
        }
        if self.is_id()
            && let Some(v) = other.node.constant_value()
            && let Some(n) = v.payload.as_f64()
            && n < 0.0
        {
            return self.sub(other.neg());
        }
        match (self.node.constant_value(), other.node.constant_value()) {
            (Some(l), Some(r)) if !l.is_str() && !r.is_str() => {
                Self::fold_arith("+", l, r, |a, b| a + b)
            }
            _ => Self::binary_node("+", self, other),
        }
    }

    pub fn sub(self, other: Self) -> Self {
        if other.is_zero() {
            return self;
        }
        if self.is_zero() {
            return other.neg();
        }
        if let ExprNode::Unary(u) = &other.node
            && u.op == "-"
        {
            let inner = Self::new((*u.value).clone());
            return self.add(inner);
        }
        if self.is_id()
            && let Some(v) = other.node.constant_value()
            && let Some(n) = v.payload.as_f64()
            && n < 0.0
        {
            return self.add(other.neg());
        }
        match (self.node.constant_value(), other.node.constant_value()) {
            (Some(l), Some(r)) if !l.is_str() && !r.is_str() => {
                Self::fold_arith("-", l, r, |a, b| a - b)
            }
            _ => Self::binary_node("-", self, other),
        }
    }

    pub fn mul(self, other: Self) -> Self {
        let promoted = self.data_type().promote(other.data_type());
        if self.is_zero() || other.is_zero() {
            let data_type = if promoted.is_str() { DataType::Int } else { promoted };
            return Self::value(Value::new(
                Payload::Int(0),
                data_type,
                ObjectType::Value,
                ShapeType::Scalar,
            ));
        }
        if self.is_value(1.0) {
            return other;
        }
        if other.is_value(1.0) {
            return self;
        }
        if self.is_value(-1.0) {
            return other.neg();
        }
        if other.is_value(-1.0) {
            return self.neg();
        }
        match (self.node.constant_value(), other.node.constant_value()) {
            (Some(l), Some(r)) if !l.is_str() && !r.is_str() => {
                Self::fold_arith("*", l, r, |a, b| a * b)
            }
            _ => Self::binary_node("*", self, other),
        }
    }

    pub fn div(self, other: Self) -> Result<Self, ExprError> {
        let promoted = self.data_type().promote(other.data_type());
        if self.is_zero() {
            let data_type = if promoted.is_str() { DataType::Int } else { promoted };
            return Ok(Self::value(Value::new(
                Payload::Int(0),
                data_type,
                ObjectType::Value,
                ShapeType::Scalar,
            )));
        }
        if other.is_value(1.0) {
            return Ok(self);
        }
        if other.is_value(-1.0) {
            return Ok(self.neg());
        }
        if other.is_zero() {
            return Err(ExprError::DivisionByZero);
        }
        Ok(match (self.node.constant_value(), other.node.constant_value()) {
            (Some(l), Some(r)) if !l.is_str() && !r.is_str() => {
                Self::fold_arith("/", l, r, |a, b| a / b)
            }
            _ => Self::binary_node("/", self, other),
        })
    }

    pub fn neg(self) -> Self {
        match self.node {
            ExprNode::Unary(u) if u.op == "-" => Self::new(*u.value),
            ExprNode::Value(v) if !v.is_id() && !v.is_str() => {
                let payload = match v.payload {
                    Payload::Int(i) => Payload::Int(-i),
                    Payload::Float(f) => Payload::Float(-f),
                    other => other,
                };
                Self::value(Value::new(payload, v.data_type, v.object_type, v.shape_type))
            }
            node => {
                let data_type = node.data_type();
                Self::new(ExprNode::Unary(UnaryOp {
                    op: "-".to_string(),
                    value: Box::new(node),
                    data_type,
                }))
            }
        }
    }

    pub fn abs_(self) -> Self {
        match self.node {
            ExprNode::Unary(u) if u.op == "abs" => Self::new(ExprNode::Unary(u)),
            ExprNode::Value(v) if !v.is_id() && !v.is_str() => {
                let payload = match v.payload {
                    Payload::Int(i) => Payload::Int(i.abs()),
                    Payload::Float(f) => Payload::Float(f.abs()),
                    other => other,
                };
                Self::value(Value::new(payload, v.data_type, v.object_type, v.shape_type))
            }
            node => {
                let data_type = node.data_type();
                Self::new(ExprNode::Unary(UnaryOp {
                    op: "abs".to_string(),
                    value: Box::new(node),
                    data_type,
                }))
            }
        }
    }

    pub fn pow(self, power: Self) -> Self {
        if self.is_zero() || self.is_value(1.0) {
            return self;
        }
        if power.is_zero() {
            let data_type = self.data_type();
            return Self::value(Value::new(
                Payload::Int(1),
                data_type,
                ObjectType::Value,
                ShapeType::Scalar,
            ));
        }
        if power.is_value(1.0) {
            return self;
        }
        Self::binary_node("__pow__", self, power)
    }

    /// A parenthesised sub-expression.
    pub fn group(inner: Self) -> Self {
        let data_type = inner.data_type();
        Self::new(ExprNode::Unary(UnaryOp {
            op: "__group__".to_string(),
            value: Box::new(inner.node),
            data_type,
        }))
    }

    /// Generic symbolic unary node without folding (e.g. `__not__`).
    pub fn unary_op(op: &str, value: Self) -> Self {
        let data_type = value.data_type();
        Self::new(ExprNode::Unary(UnaryOp {
            op: op.to_string(),
            value: Box::new(value.node),
            data_type,
        }))
    }

    /// Generic symbolic binary node without folding (comparisons, logic,
    /// shifts, modulo, string concatenation).
    pub fn binary_op(op: &str, left: Self, right: Self) -> Self {
        Self::binary_node(op, left, right)
    }

    pub fn trinary(test: Self, then: Self, otherwise: Self) -> Self {
        let data_type = then.data_type().promote(otherwise.data_type());
        Self::new(ExprNode::Trinary(TrinaryOp {
            op: "__trinary__".to_string(),
            test: Box::new(test.node),
            then: Box::new(then.node),
            otherwise: Box::new(otherwise.node),
            data_type,
        }))
    }

    /// A function call `name(args…)`.
    pub fn call(name: &str, args: Vec<Self>) -> Self {
        Self::new(ExprNode::Binary(BinaryOp {
            op: "__call__".to_string(),
            left: Box::new(ExprNode::Value(Value::function(name))),
            right: Box::new(ExprNode::comma_list(args)),
            data_type: DataType::Undefined,
        }))
    }

    /// Array subscript `array[index]`.
    pub fn index(array: Self, idx: Self) -> Self {
        Self::binary_node("__getitem__", array, idx)
    }

    pub fn pointer_access(pointer: Self, field: Self) -> Self {
        Self::binary_node("__pointer_access__", pointer, field)
    }

    pub fn struct_access(value: Self, field: Self) -> Self {
        Self::binary_node("__struct_access__", value, field)
    }

    /// Known unary math functions with inverse-pair cancellation:
    /// `cos(acos(x))` (and each symmetric pairing) reduces to `x`, and a
    /// constant argument is evaluated.
    pub fn unary_func(name: &str, value: Self) -> Result<Self, ExprError> {
        const INVERSES: [(&str, &str); 3] = [("cos", "acos"), ("sin", "asin"), ("tan", "atan")];
        if let ExprNode::Unary(u) = &value.node {
            let cancels = INVERSES
                .iter()
                .any(|(a, b)| (name == *a && u.op == *b) || (name == *b && u.op == *a));
            if cancels {
                return Ok(Self::new((*u.value).clone()));
            }
        }
        if let Some(v) = value.node.constant_value() {
            if v.is_str() {
                return Err(ExprError::TypeMismatch(format!(
                    "{name} applied to string value {v}"
                )));
            }
            if let Some(x) = v.payload.as_f64() {
                let folded = match name {
                    "cos" => x.cos(),
                    "sin" => x.sin(),
                    "tan" => x.tan(),
                    "acos" => x.acos(),
                    "asin" => x.asin(),
                    "atan" => x.atan(),
                    "sqrt" => x.sqrt(),
                    "exp" => x.exp(),
                    "log" => x.ln(),
                    "abs" | "fabs" => x.abs(),
                    _ => return Ok(Self::unary_op(name, value)),
                };
                return Ok(Self::value(Value::best_number(folded)));
            }
        }
        Ok(Self::unary_op(name, value))
    }

    /// Known binary math functions: `atan2(sin(u), cos(u))` reduces to `u`,
    /// constant arguments evaluate.
    pub fn binary_func(name: &str, left: Self, right: Self) -> Result<Self, ExprError> {
        if name == "atan2"
            && let (ExprNode::Unary(l), ExprNode::Unary(r)) = (&left.node, &right.node)
            && l.op == "sin"
            && r.op == "cos"
            && l.value == r.value
        {
            return Ok(Self::new((*l.value).clone()));
        }
        if let (Some(l), Some(r)) = (left.node.constant_value(), right.node.constant_value()) {
            if l.is_str() || r.is_str() {
                return Err(ExprError::TypeMismatch(format!(
                    "{name} applied to string value"
                )));
            }
            if let (Some(a), Some(b)) = (l.payload.as_f64(), r.payload.as_f64()) {
                let folded = match name {
                    "atan2" => a.atan2(b),
                    "pow" => a.powf(b),
                    "fmod" => a % b,
                    "fmin" => a.min(b),
                    "fmax" => a.max(b),
                    _ => return Ok(Self::binary_node(name, left, right)),
                };
                return Ok(Self::value(Value::best_number(folded)));
            }
        }
        Ok(Self::binary_node(name, left, right))
    }

    // -- internals ----------------------------------------------------------

    fn binary_node(op: &str, left: Self, right: Self) -> Self {
        let data_type = left.data_type().promote(right.data_type());
        Self::new(ExprNode::Binary(BinaryOp {
            op: op.to_string(),
            left: Box::new(left.node),
            right: Box::new(right.node),
            data_type,
        }))
    }

    fn fold_arith(op: &str, l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Self {
        let promoted = l.data_type.promote(r.data_type);
        if promoted.is_str() {
            return Self::binary_node(
                op,
                Self::value(l.clone()),
                Self::value(r.clone()),
            );
        }
        match (&l.payload, &r.payload) {
            (Payload::Int(a), Payload::Int(b)) => {
                let exact = match op {
                    "+" => a.checked_add(*b),
                    "-" => a.checked_sub(*b),
                    "*" => a.checked_mul(*b),
                    _ => None,
                };
                let payload = match exact {
                    Some(i) => Payload::Int(i),
                    None => {
                        let v = f(*a as f64, *b as f64);
                        if v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64 {
                            Payload::Int(v as i64)
                        } else {
                            Payload::Float(v)
                        }
                    }
                };
                Self::value(Value::new(payload, promoted, ObjectType::Value, ShapeType::Scalar))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => {
                    let v = f(x, y);
                    let payload = if v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64
                    {
                        Payload::Int(v as i64)
                    } else {
                        Payload::Float(v)
                    };
                    Self::value(Value::new(payload, promoted, ObjectType::Value, ShapeType::Scalar))
                }
                _ => Self::binary_node(op, Self::value(l.clone()), Self::value(r.clone())),
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(PrintStyle::C))
    }
}
