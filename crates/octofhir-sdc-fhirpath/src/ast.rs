//! FHIRPath expression AST

use rust_decimal::Decimal;

/// A parsed FHIRPath expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// `%name` — supplied through the evaluation context
    ExternalConstant(String),
    /// `$this` — the current focus item inside where/select/all
    This,
    /// A bare identifier: a navigation step from the focus, or the root
    /// resource type name
    Identifier(String),
    /// `base.name`
    Property {
        base: Box<Expression>,
        name: String,
    },
    /// `name(args)` or `base.name(args)`; lambda-style arguments
    /// (where/select/iif/…) stay unevaluated until dispatch
    Function {
        base: Option<Box<Expression>>,
        name: String,
        args: Vec<Expression>,
    },
    /// `base[index]`
    Indexer {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    TruncatedDivide,
    Modulo,
    Add,
    Subtract,
    Concatenate,
    Union,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    In,
    Contains,
    And,
    Or,
    Xor,
    Implies,
}

impl BinaryOp {
    /// Operator name for error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::TruncatedDivide => "div",
            Self::Modulo => "mod",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Concatenate => "&",
            Self::Union => "|",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Equivalent => "~",
            Self::NotEquivalent => "!~",
            Self::In => "in",
            Self::Contains => "contains",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Implies => "implies",
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `{}` — the empty collection
    Empty,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    /// `@2024-05-01` (possibly partial)
    Date(String),
    /// `@2024-05-01T10:30:00Z`
    DateTime(String),
    /// `@T10:30`
    Time(String),
    /// `2 'kg'`
    Quantity(Decimal, String),
}
