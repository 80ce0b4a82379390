//! FHIRPath function library
//!
//! Dispatch lives in one match so the supported surface is obvious.
//! Lambda-style arguments (where/select/exists/all/iif) are received as
//! unevaluated AST and run per focus item, with `$this` bound to the item.

use chrono::{Local, SecondsFormat};
use log::debug;
use regex::Regex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use smallvec::smallvec;

use crate::ast::Expression;
use crate::engine::Evaluator;
use crate::error::{EvalResult, FhirPathError};
use crate::value::{to_boolean, values_equal, Collection, Value};

impl Evaluator<'_> {
    pub(crate) fn call_function(
        &self,
        name: &str,
        base: &Collection,
        args: &[Expression],
    ) -> EvalResult<Collection> {
        match name {
            // --- existence ---
            "empty" => Ok(smallvec![Value::Boolean(base.is_empty())]),
            "exists" => {
                if args.is_empty() {
                    return Ok(smallvec![Value::Boolean(!base.is_empty())]);
                }
                let filtered = self.filter(base, &args[0])?;
                Ok(smallvec![Value::Boolean(!filtered.is_empty())])
            }
            "count" => Ok(smallvec![Value::Integer(base.len() as i64)]),
            "not" => match to_boolean(base) {
                Some(b) => Ok(smallvec![Value::Boolean(!b)]),
                None => Ok(Collection::new()),
            },
            "allTrue" => Ok(smallvec![Value::Boolean(
                base.iter().all(|v| matches!(v, Value::Boolean(true)))
            )]),
            "anyTrue" => Ok(smallvec![Value::Boolean(
                base.iter().any(|v| matches!(v, Value::Boolean(true)))
            )]),

            // --- subsetting ---
            "first" => Ok(base.first().cloned().into_iter().collect()),
            "last" => Ok(base.last().cloned().into_iter().collect()),
            "tail" => Ok(base.iter().skip(1).cloned().collect()),
            "single" => match base.len() {
                0 => Ok(Collection::new()),
                1 => Ok(base.clone()),
                n => Err(FhirPathError::singleton_required("single()", n)),
            },
            "skip" => {
                let n = integer_argument(name, args, 0, self, base)?;
                Ok(base.iter().skip(n.max(0) as usize).cloned().collect())
            }
            "take" => {
                let n = integer_argument(name, args, 0, self, base)?;
                Ok(base.iter().take(n.max(0) as usize).cloned().collect())
            }
            "distinct" => {
                let mut out = Collection::new();
                for value in base {
                    if !out
                        .iter()
                        .any(|v| values_equal(v, value).unwrap_or(false))
                    {
                        out.push(value.clone());
                    }
                }
                Ok(out)
            }

            // --- filtering / projection ---
            "where" => self.filter(base, expect_arg(name, args, 0)?),
            "select" => {
                let projection = expect_arg(name, args, 0)?;
                let mut out = Collection::new();
                for item in base {
                    let item_focus: Collection = smallvec![item.clone()];
                    out.extend(self.eval(projection, &item_focus)?);
                }
                Ok(out)
            }
            "all" => {
                let criteria = expect_arg(name, args, 0)?;
                for item in base {
                    let item_focus: Collection = smallvec![item.clone()];
                    let result = self.eval(criteria, &item_focus)?;
                    if to_boolean(&result) != Some(true) {
                        return Ok(smallvec![Value::Boolean(false)]);
                    }
                }
                Ok(smallvec![Value::Boolean(true)])
            }
            "ofType" => {
                let type_name = type_argument(name, args)?;
                Ok(base
                    .iter()
                    .filter(|v| value_is_type(v, &type_name))
                    .cloned()
                    .collect())
            }
            "iif" => {
                let condition = self.eval(expect_arg(name, args, 0)?, base)?;
                if to_boolean(&condition) == Some(true) {
                    self.eval(expect_arg(name, args, 1)?, base)
                } else {
                    match args.get(2) {
                        Some(otherwise) => self.eval(otherwise, base),
                        None => Ok(Collection::new()),
                    }
                }
            }

            // --- combining ---
            "union" => {
                let other = eval_argument(self, name, args, 0, base)?;
                let mut out = base.clone();
                for value in other {
                    if !out
                        .iter()
                        .any(|v| values_equal(v, &value).unwrap_or(false))
                    {
                        out.push(value);
                    }
                }
                Ok(out)
            }
            "combine" => {
                let other = eval_argument(self, name, args, 0, base)?;
                let mut out = base.clone();
                out.extend(other);
                Ok(out)
            }

            // --- aggregates ---
            "sum" | "min" | "max" | "avg" => self.aggregate(name, base),

            // --- math (singleton numeric focus) ---
            "abs" => self.math_unary(name, base, |d| Some(d.abs())),
            "ceiling" => self.math_to_integer(name, base, |d| d.ceil()),
            "floor" => self.math_to_integer(name, base, |d| d.floor()),
            "truncate" => self.math_to_integer(name, base, |d| d.trunc()),
            "sqrt" => self.math_unary(name, base, |d| {
                let x = d.to_f64()?;
                if x < 0.0 {
                    return None;
                }
                Decimal::from_f64(x.sqrt()).map(strip_float_noise)
            }),
            "power" => {
                let exponent = decimal_argument(name, args, 0, self, base)?;
                let Some(operand) = singleton_decimal(base, name)? else {
                    return Ok(Collection::new());
                };
                let Some(result) = (|| {
                    Decimal::from_f64(operand.to_f64()?.powf(exponent.to_f64()?))
                        .map(strip_float_noise)
                })() else {
                    return Ok(Collection::new());
                };
                // Integer base with non-negative integer exponent stays integral
                if operand.fract().is_zero()
                    && exponent.fract().is_zero()
                    && !exponent.is_sign_negative()
                {
                    if let Some(i) = result.round().to_i64() {
                        return Ok(smallvec![Value::Integer(i)]);
                    }
                }
                Ok(smallvec![Value::Decimal(result.normalize())])
            }
            "round" => {
                let places = if args.is_empty() {
                    0
                } else {
                    integer_argument(name, args, 0, self, base)?
                };
                let Some(operand) = singleton_decimal(base, name)? else {
                    return Ok(Collection::new());
                };
                let places = u32::try_from(places.max(0)).unwrap_or(0);
                let rounded = operand
                    .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
                Ok(smallvec![Value::Decimal(rounded)])
            }

            // --- strings (singleton string focus) ---
            "length" => self.string_unary(name, base, |s| Value::Integer(s.chars().count() as i64)),
            "upper" => self.string_unary(name, base, |s| Value::String(s.to_uppercase())),
            "lower" => self.string_unary(name, base, |s| Value::String(s.to_lowercase())),
            "trim" => self.string_unary(name, base, |s| Value::String(s.trim().to_string())),
            "substring" => {
                let Some(s) = singleton_string(base, name)? else {
                    return Ok(Collection::new());
                };
                let start = integer_argument(name, args, 0, self, base)?;
                if start < 0 || start as usize >= s.chars().count() {
                    return Ok(Collection::new());
                }
                let rest = s.chars().skip(start as usize);
                let out: String = match args.get(1) {
                    Some(_) => {
                        let len = integer_argument(name, args, 1, self, base)?;
                        rest.take(len.max(0) as usize).collect()
                    }
                    None => rest.collect(),
                };
                Ok(smallvec![Value::String(out)])
            }
            "startsWith" => self.string_predicate(name, args, base, |s, arg| s.starts_with(arg)),
            "endsWith" => self.string_predicate(name, args, base, |s, arg| s.ends_with(arg)),
            "contains" => self.string_predicate(name, args, base, |s, arg| s.contains(arg)),
            "matches" => {
                let Some(s) = singleton_string(base, name)? else {
                    return Ok(Collection::new());
                };
                let pattern = string_argument(name, args, 0, self, base)?;
                let regex = Regex::new(&pattern)
                    .map_err(|e| FhirPathError::invalid_argument(name, e.to_string()))?;
                Ok(smallvec![Value::Boolean(regex.is_match(&s))])
            }
            "replace" => {
                let Some(s) = singleton_string(base, name)? else {
                    return Ok(Collection::new());
                };
                let find = string_argument(name, args, 0, self, base)?;
                let replacement = string_argument(name, args, 1, self, base)?;
                Ok(smallvec![Value::String(s.replace(&find, &replacement))])
            }
            "replaceMatches" => {
                let Some(s) = singleton_string(base, name)? else {
                    return Ok(Collection::new());
                };
                let pattern = string_argument(name, args, 0, self, base)?;
                let replacement = string_argument(name, args, 1, self, base)?;
                let regex = Regex::new(&pattern)
                    .map_err(|e| FhirPathError::invalid_argument(name, e.to_string()))?;
                Ok(smallvec![Value::String(
                    regex.replace_all(&s, replacement.as_str()).into_owned()
                )])
            }
            "split" => {
                let Some(s) = singleton_string(base, name)? else {
                    return Ok(Collection::new());
                };
                let separator = string_argument(name, args, 0, self, base)?;
                Ok(s.split(separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect())
            }
            "join" => {
                let separator = if args.is_empty() {
                    String::new()
                } else {
                    string_argument(name, args, 0, self, base)?
                };
                let parts: Vec<&str> = base.iter().filter_map(Value::as_str).collect();
                Ok(smallvec![Value::String(parts.join(&separator))])
            }

            // --- conversion ---
            "toString" => match base.len() {
                0 => Ok(Collection::new()),
                1 => Ok(smallvec![Value::String(value_to_string(&base[0]))]),
                n => Err(FhirPathError::singleton_required(name, n)),
            },
            "toInteger" => match base.first() {
                None => Ok(Collection::new()),
                Some(Value::Integer(i)) => Ok(smallvec![Value::Integer(*i)]),
                Some(Value::Boolean(b)) => Ok(smallvec![Value::Integer(i64::from(*b))]),
                Some(Value::String(s)) => Ok(s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .map(Value::Integer)
                    .into_iter()
                    .collect()),
                Some(Value::Decimal(d)) if d.fract().is_zero() => {
                    Ok(d.to_i64().map(Value::Integer).into_iter().collect())
                }
                Some(_) => Ok(Collection::new()),
            },
            "toDecimal" => match base.first() {
                None => Ok(Collection::new()),
                Some(value) => match value.as_decimal() {
                    Some(d) => Ok(smallvec![Value::Decimal(d)]),
                    None => Ok(value
                        .as_str()
                        .and_then(|s| s.trim().parse::<Decimal>().ok())
                        .map(Value::Decimal)
                        .into_iter()
                        .collect()),
                },
            },
            "toBoolean" => match base.first() {
                None => Ok(Collection::new()),
                Some(Value::Boolean(b)) => Ok(smallvec![Value::Boolean(*b)]),
                Some(Value::Integer(1)) => Ok(smallvec![Value::Boolean(true)]),
                Some(Value::Integer(0)) => Ok(smallvec![Value::Boolean(false)]),
                Some(Value::String(s)) => Ok(match s.to_lowercase().as_str() {
                    "true" => Some(Value::Boolean(true)),
                    "false" => Some(Value::Boolean(false)),
                    _ => None,
                }
                .into_iter()
                .collect()),
                Some(_) => Ok(Collection::new()),
            },

            // --- temporal ---
            "today" => Ok(smallvec![Value::Date(
                Local::now().date_naive().format("%Y-%m-%d").to_string()
            )]),
            "now" => Ok(smallvec![Value::DateTime(
                Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
            )]),
            "timeOfDay" => Ok(smallvec![Value::Time(
                Local::now().time().format("%H:%M:%S").to_string()
            )]),

            // --- diagnostics ---
            "trace" => {
                let label = if args.is_empty() {
                    String::new()
                } else {
                    string_argument(name, args, 0, self, base)?
                };
                debug!("trace({label}): {base:?}");
                Ok(base.clone())
            }

            other => Err(FhirPathError::unknown_function(other)),
        }
    }

    fn filter(&self, base: &Collection, criteria: &Expression) -> EvalResult<Collection> {
        let mut out = Collection::new();
        for item in base {
            let item_focus: Collection = smallvec![item.clone()];
            let result = self.eval(criteria, &item_focus)?;
            if to_boolean(&result) == Some(true) {
                out.push(item.clone());
            }
        }
        Ok(out)
    }

    fn aggregate(&self, name: &str, base: &Collection) -> EvalResult<Collection> {
        if base.is_empty() {
            return Ok(Collection::new());
        }
        let mut decimals = Vec::with_capacity(base.len());
        let mut all_integers = true;
        for value in base {
            match value.as_decimal() {
                Some(d) => {
                    all_integers &= matches!(value, Value::Integer(_));
                    decimals.push(d);
                }
                None => {
                    return Err(FhirPathError::type_mismatch(
                        name,
                        format!("non-numeric value {}", value.type_name()),
                    ));
                }
            }
        }
        let result = match name {
            "sum" => decimals.iter().copied().sum::<Decimal>(),
            "min" => decimals.iter().copied().min().unwrap_or_default(),
            "max" => decimals.iter().copied().max().unwrap_or_default(),
            "avg" => {
                decimals.iter().copied().sum::<Decimal>() / Decimal::from(decimals.len() as i64)
            }
            _ => unreachable!("non-aggregate function"),
        };
        let prefer_integer = all_integers && name != "avg";
        if prefer_integer && result.fract().is_zero() {
            if let Some(i) = result.to_i64() {
                return Ok(smallvec![Value::Integer(i)]);
            }
        }
        Ok(smallvec![Value::Decimal(result.normalize())])
    }

    fn math_unary(
        &self,
        name: &str,
        base: &Collection,
        op: impl Fn(Decimal) -> Option<Decimal>,
    ) -> EvalResult<Collection> {
        let Some(operand) = singleton_decimal(base, name)? else {
            return Ok(Collection::new());
        };
        let keep_integer = matches!(base.first(), Some(Value::Integer(_)));
        match op(operand) {
            Some(result) => {
                if keep_integer && result.fract().is_zero() {
                    if let Some(i) = result.to_i64() {
                        return Ok(smallvec![Value::Integer(i)]);
                    }
                }
                Ok(smallvec![Value::Decimal(result.normalize())])
            }
            None => Ok(Collection::new()),
        }
    }

    fn math_to_integer(
        &self,
        name: &str,
        base: &Collection,
        op: impl Fn(Decimal) -> Decimal,
    ) -> EvalResult<Collection> {
        let Some(operand) = singleton_decimal(base, name)? else {
            return Ok(Collection::new());
        };
        Ok(op(operand).to_i64().map(Value::Integer).into_iter().collect())
    }

    fn string_unary(
        &self,
        name: &str,
        base: &Collection,
        op: impl Fn(&str) -> Value,
    ) -> EvalResult<Collection> {
        match singleton_string(base, name)? {
            Some(s) => Ok(smallvec![op(&s)]),
            None => Ok(Collection::new()),
        }
    }

    fn string_predicate(
        &self,
        name: &str,
        args: &[Expression],
        base: &Collection,
        op: impl Fn(&str, &str) -> bool,
    ) -> EvalResult<Collection> {
        let Some(s) = singleton_string(base, name)? else {
            return Ok(Collection::new());
        };
        let arg = string_argument(name, args, 0, self, base)?;
        Ok(smallvec![Value::Boolean(op(&s, &arg))])
    }
}

fn expect_arg<'e>(name: &str, args: &'e [Expression], index: usize) -> EvalResult<&'e Expression> {
    args.get(index)
        .ok_or_else(|| FhirPathError::invalid_argument(name, format!("missing argument {index}")))
}

/// Evaluate an argument expression against the base focus
fn eval_argument(
    evaluator: &Evaluator<'_>,
    name: &str,
    args: &[Expression],
    index: usize,
    base: &Collection,
) -> EvalResult<Collection> {
    evaluator.eval(expect_arg(name, args, index)?, base)
}

fn integer_argument(
    name: &str,
    args: &[Expression],
    index: usize,
    evaluator: &Evaluator<'_>,
    base: &Collection,
) -> EvalResult<i64> {
    let value = eval_argument(evaluator, name, args, index, base)?;
    match value.first() {
        Some(Value::Integer(i)) => Ok(*i),
        other => Err(FhirPathError::invalid_argument(
            name,
            format!(
                "expected integer argument, found {}",
                other.map(Value::type_name).unwrap_or("empty")
            ),
        )),
    }
}

fn decimal_argument(
    name: &str,
    args: &[Expression],
    index: usize,
    evaluator: &Evaluator<'_>,
    base: &Collection,
) -> EvalResult<Decimal> {
    let value = eval_argument(evaluator, name, args, index, base)?;
    match value.first().and_then(Value::as_decimal) {
        Some(d) => Ok(d),
        None => Err(FhirPathError::invalid_argument(
            name,
            "expected numeric argument",
        )),
    }
}

fn string_argument(
    name: &str,
    args: &[Expression],
    index: usize,
    evaluator: &Evaluator<'_>,
    base: &Collection,
) -> EvalResult<String> {
    let value = eval_argument(evaluator, name, args, index, base)?;
    match value.first().and_then(Value::as_str) {
        Some(s) => Ok(s.to_string()),
        None => Err(FhirPathError::invalid_argument(
            name,
            "expected string argument",
        )),
    }
}

/// ofType's argument is a bare type identifier, not a value expression
fn type_argument(name: &str, args: &[Expression]) -> EvalResult<String> {
    match args.first() {
        Some(Expression::Identifier(type_name)) => Ok(type_name.clone()),
        _ => Err(FhirPathError::invalid_argument(
            name,
            "expected a type identifier",
        )),
    }
}

fn value_is_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "Boolean" | "boolean" => matches!(value, Value::Boolean(_)),
        "Integer" | "integer" => matches!(value, Value::Integer(_)),
        "Decimal" | "decimal" => matches!(value, Value::Decimal(_)),
        "String" | "string" => matches!(value, Value::String(_)),
        "Date" | "date" => matches!(value, Value::Date(_)),
        "DateTime" | "dateTime" => matches!(value, Value::DateTime(_)),
        "Time" | "time" => matches!(value, Value::Time(_)),
        "Quantity" => matches!(value, Value::Quantity { .. }),
        other => match value {
            Value::Object(json) => {
                json.get("resourceType").and_then(serde_json::Value::as_str) == Some(other)
            }
            _ => false,
        },
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::String(s) | Value::Date(s) | Value::DateTime(s) | Value::Time(s) => s.clone(),
        Value::Quantity { value, unit } => match unit {
            Some(unit) => format!("{value} '{unit}'"),
            None => value.to_string(),
        },
        Value::Object(json) => json.to_string(),
    }
}

/// Results that went through f64 carry binary representation noise in their
/// trailing digits; 12 decimal places is far beyond questionnaire precision
fn strip_float_noise(value: Decimal) -> Decimal {
    value.round_dp(12)
}

/// Extract a singleton numeric focus; empty stays empty, non-numeric errors
pub(crate) fn singleton_decimal(base: &Collection, operation: &str) -> EvalResult<Option<Decimal>> {
    match base.len() {
        0 => Ok(None),
        1 => match base[0].as_decimal() {
            Some(d) => Ok(Some(d)),
            None => Err(FhirPathError::type_mismatch(
                operation,
                format!("expected a number, found {}", base[0].type_name()),
            )),
        },
        n => Err(FhirPathError::singleton_required(operation, n)),
    }
}

/// Extract a singleton string focus; empty stays empty, non-string errors
pub(crate) fn singleton_string(base: &Collection, operation: &str) -> EvalResult<Option<String>> {
    match base.len() {
        0 => Ok(None),
        1 => match base[0].as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => Err(FhirPathError::type_mismatch(
                operation,
                format!("expected a string, found {}", base[0].type_name()),
            )),
        },
        n => Err(FhirPathError::singleton_required(operation, n)),
    }
}
