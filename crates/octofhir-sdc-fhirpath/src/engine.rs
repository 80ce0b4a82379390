//! FHIRPath engine - the main entry point for expression evaluation

use std::collections::HashMap;

use log::debug;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use smallvec::smallvec;

use crate::ast::{BinaryOp, Expression, Literal, UnaryOp};
use crate::error::{EvalResult, FhirPathError};
use crate::expression::parse_expression;
use crate::functions::singleton_string;
use crate::value::{
    collection_contains, to_boolean, values_compare, values_equal, Collection, Value,
};

/// Variable bindings and the context resource for one evaluation.
///
/// Evaluation never mutates the context; the same context can back any
/// number of expressions.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    resource: Json,
    variables: HashMap<String, Collection>,
}

impl EvaluationContext {
    /// Create a context over the given resource
    pub fn new(resource: Json) -> Self {
        Self {
            resource,
            variables: HashMap::new(),
        }
    }

    /// Bind `%name` to a JSON value (resource or fragment)
    pub fn set_variable_json(&mut self, name: impl Into<String>, json: &Json) {
        self.variables.insert(name.into(), Value::from_json(json));
    }

    /// Bind `%name` to an already-evaluated collection
    pub fn set_variable(&mut self, name: impl Into<String>, value: Collection) {
        self.variables.insert(name.into(), value);
    }

    /// Whether a variable is bound
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// The context resource
    pub fn resource(&self) -> &Json {
        &self.resource
    }
}

/// Main FHIRPath engine for parsing and evaluating expressions
#[derive(Debug, Clone, Default)]
pub struct FhirPathEngine {
    /// Cached compiled expressions
    expression_cache: HashMap<String, Expression>,
    max_cache_size: usize,
}

impl FhirPathEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self {
            expression_cache: HashMap::new(),
            max_cache_size: 1000,
        }
    }

    /// Evaluate an expression against the context.
    ///
    /// Synchronous and pure: the same inputs always produce the same output
    /// and neither argument is mutated (the `&mut self` is only the parse
    /// cache).
    pub fn evaluate(
        &mut self,
        expression: &str,
        context: &EvaluationContext,
    ) -> EvalResult<Collection> {
        let ast = self.get_or_compile(expression)?.clone();
        let root: Collection = Value::from_json(context.resource());
        Evaluator { context }.eval(&ast, &root)
    }

    /// Parse an expression without evaluating, to surface syntax problems
    /// at extraction time
    pub fn check(&mut self, expression: &str) -> EvalResult<()> {
        self.get_or_compile(expression).map(|_| ())
    }

    fn get_or_compile(&mut self, expression: &str) -> EvalResult<&Expression> {
        if !self.expression_cache.contains_key(expression) {
            let ast = parse_expression(expression)?;
            if self.expression_cache.len() >= self.max_cache_size {
                self.expression_cache.clear();
            }
            self.expression_cache.insert(expression.to_string(), ast);
        }
        Ok(self.expression_cache.get(expression).unwrap())
    }
}

pub(crate) struct Evaluator<'a> {
    pub(crate) context: &'a EvaluationContext,
}

impl Evaluator<'_> {
    pub(crate) fn eval(&self, expr: &Expression, focus: &Collection) -> EvalResult<Collection> {
        match expr {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::ExternalConstant(name) => Ok(self.external_constant(name)),
            Expression::This => Ok(focus.clone()),
            Expression::Identifier(name) => Ok(navigate_root(focus, name)),
            Expression::Property { base, name } => {
                let base = self.eval(base, focus)?;
                let mut out = Collection::new();
                for value in &base {
                    value.navigate(name, &mut out);
                }
                Ok(out)
            }
            Expression::Function { base, name, args } => {
                let base = match base {
                    Some(base) => self.eval(base, focus)?,
                    None => focus.clone(),
                };
                self.call_function(name, &base, args)
            }
            Expression::Indexer { base, index } => {
                let base = self.eval(base, focus)?;
                let index = self.eval(index, focus)?;
                let Some(Value::Integer(i)) = index.first() else {
                    return Ok(Collection::new());
                };
                Ok(usize::try_from(*i)
                    .ok()
                    .and_then(|i| base.get(i))
                    .cloned()
                    .into_iter()
                    .collect())
            }
            Expression::UnaryOp { op, operand } => {
                let operand = self.eval(operand, focus)?;
                self.eval_unary(*op, operand)
            }
            Expression::BinaryOp { left, op, right } => {
                let left = self.eval(left, focus)?;
                let right = self.eval(right, focus)?;
                self.eval_binary(*op, left, right)
            }
        }
    }

    fn external_constant(&self, name: &str) -> Collection {
        match name {
            "resource" | "context" => Value::from_json(self.context.resource()),
            _ => match self.context.variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    // Variables can legitimately be unresolved while their
                    // backing queries are in flight
                    debug!("unresolved variable %{name}, evaluating as empty");
                    Collection::new()
                }
            },
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: Collection) -> EvalResult<Collection> {
        if operand.is_empty() {
            return Ok(operand);
        }
        if operand.len() > 1 {
            return Err(FhirPathError::singleton_required("unary -", operand.len()));
        }
        let value = match (&operand[0], op) {
            (value, UnaryOp::Plus) => value.clone(),
            (Value::Integer(i), UnaryOp::Negate) => Value::Integer(-*i),
            (Value::Decimal(d), UnaryOp::Negate) => Value::Decimal(-*d),
            (Value::Quantity { value, unit }, UnaryOp::Negate) => Value::Quantity {
                value: -*value,
                unit: unit.clone(),
            },
            (other, UnaryOp::Negate) => {
                return Err(FhirPathError::type_mismatch(
                    "unary -",
                    format!("cannot negate {}", other.type_name()),
                ));
            }
        };
        Ok(smallvec![value])
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: Collection,
        right: Collection,
    ) -> EvalResult<Collection> {
        use BinaryOp::*;
        match op {
            Multiply | Divide | TruncatedDivide | Modulo | Add | Subtract => {
                self.eval_arithmetic(op, left, right)
            }
            Concatenate => {
                let left = singleton_string(&left, "&")?.unwrap_or_default();
                let right = singleton_string(&right, "&")?.unwrap_or_default();
                Ok(smallvec![Value::String(format!("{left}{right}"))])
            }
            Union => {
                let mut out = left;
                for value in right {
                    if !collection_contains(&out, &value) {
                        out.push(value);
                    }
                }
                Ok(out)
            }
            LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
                self.eval_comparison(op, left, right)
            }
            Equal => Ok(bool_collection(collections_equal(&left, &right))),
            NotEqual => Ok(bool_collection(
                collections_equal(&left, &right).map(|b| !b),
            )),
            Equivalent => Ok(bool_collection(Some(collections_equivalent(&left, &right)))),
            NotEquivalent => Ok(bool_collection(Some(!collections_equivalent(
                &left, &right,
            )))),
            In => {
                if left.is_empty() {
                    return Ok(Collection::new());
                }
                if left.len() > 1 {
                    return Err(FhirPathError::singleton_required("in", left.len()));
                }
                Ok(smallvec![Value::Boolean(collection_contains(
                    &right, &left[0]
                ))])
            }
            Contains => {
                if right.is_empty() {
                    return Ok(Collection::new());
                }
                if right.len() > 1 {
                    return Err(FhirPathError::singleton_required("contains", right.len()));
                }
                Ok(smallvec![Value::Boolean(collection_contains(
                    &left, &right[0]
                ))])
            }
            And => {
                let (l, r) = (to_boolean(&left), to_boolean(&right));
                Ok(bool_collection(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }))
            }
            Or => {
                let (l, r) = (to_boolean(&left), to_boolean(&right));
                Ok(bool_collection(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }))
            }
            Xor => {
                let (l, r) = (to_boolean(&left), to_boolean(&right));
                Ok(bool_collection(match (l, r) {
                    (Some(a), Some(b)) => Some(a != b),
                    _ => None,
                }))
            }
            Implies => {
                let (l, r) = (to_boolean(&left), to_boolean(&right));
                Ok(bool_collection(match (l, r) {
                    (Some(false), _) => Some(true),
                    (Some(true), other) => other,
                    (None, Some(true)) => Some(true),
                    (None, _) => None,
                }))
            }
        }
    }

    fn eval_arithmetic(
        &self,
        op: BinaryOp,
        left: Collection,
        right: Collection,
    ) -> EvalResult<Collection> {
        if left.is_empty() || right.is_empty() {
            return Ok(Collection::new());
        }
        if left.len() > 1 {
            return Err(FhirPathError::singleton_required(op.name(), left.len()));
        }
        if right.len() > 1 {
            return Err(FhirPathError::singleton_required(op.name(), right.len()));
        }
        let (lhs, rhs) = (&left[0], &right[0]);

        // String + is concatenation
        if op == BinaryOp::Add {
            if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
                return Ok(smallvec![Value::String(format!("{a}{b}"))]);
            }
        }

        let (Some(a), Some(b)) = (lhs.as_decimal(), rhs.as_decimal()) else {
            return Err(FhirPathError::type_mismatch(
                op.name(),
                format!("{} and {}", lhs.type_name(), rhs.type_name()),
            ));
        };
        let both_integers = matches!((lhs, rhs), (Value::Integer(_), Value::Integer(_)));

        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            // Division by zero yields empty per the FHIRPath spec
            BinaryOp::Divide => {
                if b.is_zero() {
                    return Ok(Collection::new());
                }
                return Ok(smallvec![Value::Decimal((a / b).normalize())]);
            }
            BinaryOp::TruncatedDivide => {
                if b.is_zero() {
                    return Ok(Collection::new());
                }
                let quotient = (a / b).trunc();
                return Ok(smallvec![decimal_result(quotient, true)]);
            }
            BinaryOp::Modulo => {
                if b.is_zero() {
                    return Ok(Collection::new());
                }
                a % b
            }
            _ => unreachable!("non-arithmetic operator"),
        };

        Ok(smallvec![decimal_result(result, both_integers)])
    }

    fn eval_comparison(
        &self,
        op: BinaryOp,
        left: Collection,
        right: Collection,
    ) -> EvalResult<Collection> {
        if left.is_empty() || right.is_empty() {
            return Ok(Collection::new());
        }
        if left.len() > 1 {
            return Err(FhirPathError::singleton_required(op.name(), left.len()));
        }
        if right.len() > 1 {
            return Err(FhirPathError::singleton_required(op.name(), right.len()));
        }
        let Some(ordering) = values_compare(&left[0], &right[0]) else {
            return Err(FhirPathError::type_mismatch(
                op.name(),
                format!("{} and {}", left[0].type_name(), right[0].type_name()),
            ));
        };
        let result = match op {
            BinaryOp::LessThan => ordering.is_lt(),
            BinaryOp::LessOrEqual => ordering.is_le(),
            BinaryOp::GreaterThan => ordering.is_gt(),
            BinaryOp::GreaterOrEqual => ordering.is_ge(),
            _ => unreachable!("non-comparison operator"),
        };
        Ok(smallvec![Value::Boolean(result)])
    }
}

/// Keep integer-ness through arithmetic when both operands were integers
/// and the result has no fraction
fn decimal_result(value: Decimal, prefer_integer: bool) -> Value {
    use rust_decimal::prelude::ToPrimitive;
    if prefer_integer && value.fract().is_zero() {
        if let Some(i) = value.to_i64() {
            return Value::Integer(i);
        }
    }
    Value::Decimal(value.normalize())
}

fn literal_value(literal: &Literal) -> Collection {
    match literal {
        Literal::Empty => Collection::new(),
        Literal::Boolean(b) => smallvec![Value::Boolean(*b)],
        Literal::Integer(i) => smallvec![Value::Integer(*i)],
        Literal::Decimal(d) => smallvec![Value::Decimal(*d)],
        Literal::String(s) => smallvec![Value::String(s.clone())],
        Literal::Date(d) => smallvec![Value::Date(d.clone())],
        Literal::DateTime(d) => smallvec![Value::DateTime(d.clone())],
        Literal::Time(t) => smallvec![Value::Time(t.clone())],
        Literal::Quantity(value, unit) => smallvec![Value::Quantity {
            value: *value,
            unit: Some(unit.clone()),
        }],
    }
}

/// Navigate a bare identifier from the focus. A leading uppercase
/// identifier matching a resource's `resourceType` selects the resource
/// itself (`QuestionnaireResponse.item...`).
fn navigate_root(focus: &Collection, name: &str) -> Collection {
    let mut out = Collection::new();
    for value in focus {
        if let Value::Object(json) = value {
            if json.get("resourceType").and_then(Json::as_str) == Some(name) {
                out.push(value.clone());
                continue;
            }
        }
        value.navigate(name, &mut out);
    }
    out
}

fn bool_collection(value: Option<bool>) -> Collection {
    match value {
        Some(b) => smallvec![Value::Boolean(b)],
        None => Collection::new(),
    }
}

/// Collection equality for `=`: pairwise, ordered; empty operands
/// propagate empty
fn collections_equal(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    for (l, r) in left.iter().zip(right.iter()) {
        match values_equal(l, r) {
            Some(true) => {}
            Some(false) => return Some(false),
            None => return Some(false),
        }
    }
    Some(true)
}

/// Collection equivalence for `~`: empty ~ empty is true, strings compare
/// case-insensitively
fn collections_equivalent(left: &Collection, right: &Collection) -> bool {
    if left.is_empty() && right.is_empty() {
        return true;
    }
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right.iter()).all(|(l, r)| {
        if let (Value::String(a), Value::String(b)) = (l, r) {
            return a.eq_ignore_ascii_case(b);
        }
        values_equal(l, r).unwrap_or(false)
    })
}
