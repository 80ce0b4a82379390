//! Expression parser using recursive descent with precedence climbing

use winnow::combinator::alt;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::ast::{BinaryOp, Expression, Literal, UnaryOp};
use crate::combinators::{
    identifier, keyword, lit, number_literal, padded_keyword, string_literal, temporal_literal,
    ws, Input, PResult,
};
use crate::error::FhirPathError;

/// Parse a complete FHIRPath expression
pub fn parse_expression(source: &str) -> Result<Expression, FhirPathError> {
    let mut input: Input<'_> = source;
    let parsed = (|| -> PResult<Expression> {
        ws(&mut input)?;
        let expr = implies_expression(&mut input)?;
        ws(&mut input)?;
        Ok(expr)
    })();

    match parsed {
        Ok(expr) if input.is_empty() => Ok(expr),
        Ok(_) => Err(FhirPathError::parse(
            source,
            format!("unexpected trailing input '{input}'"),
        )),
        Err(_) => Err(FhirPathError::parse(source, "invalid expression")),
    }
}

/// Parse implies expression (lowest precedence, right-associative)
fn implies_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let left = or_expression(input)?;

    if padded_keyword("implies")(input).is_ok() {
        let right = implies_expression(input)?;
        return Ok(binary(left, BinaryOp::Implies, right));
    }

    Ok(left)
}

/// Parse or/xor expression
fn or_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = and_expression(input)?;

    loop {
        let op = if padded_keyword("or")(input).is_ok() {
            Some(BinaryOp::Or)
        } else if padded_keyword("xor")(input).is_ok() {
            Some(BinaryOp::Xor)
        } else {
            None
        };

        match op {
            Some(op) => {
                let right = and_expression(input)?;
                left = binary(left, op, right);
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse and expression
fn and_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = membership_expression(input)?;

    while padded_keyword("and")(input).is_ok() {
        let right = membership_expression(input)?;
        left = binary(left, BinaryOp::And, right);
    }

    Ok(left)
}

/// Parse membership expression (in, contains)
fn membership_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = equality_expression(input)?;

    loop {
        let op = if padded_keyword("in")(input).is_ok() {
            Some(BinaryOp::In)
        } else if padded_keyword("contains")(input).is_ok() {
            Some(BinaryOp::Contains)
        } else {
            None
        };

        match op {
            Some(op) => {
                let right = equality_expression(input)?;
                left = binary(left, op, right);
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse equality expression (=, !=, ~, !~)
fn equality_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = relational_expression(input)?;

    loop {
        ws(input)?;

        let op = if lit("!=")(input).is_ok() {
            Some(BinaryOp::NotEqual)
        } else if lit("!~")(input).is_ok() {
            Some(BinaryOp::NotEquivalent)
        } else if lit("=")(input).is_ok() {
            Some(BinaryOp::Equal)
        } else if lit("~")(input).is_ok() {
            Some(BinaryOp::Equivalent)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = relational_expression(input)?;
                left = binary(left, op, right);
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse relational expression (<, >, <=, >=)
fn relational_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = union_expression(input)?;

    loop {
        ws(input)?;

        let op = if lit("<=")(input).is_ok() {
            Some(BinaryOp::LessOrEqual)
        } else if lit(">=")(input).is_ok() {
            Some(BinaryOp::GreaterOrEqual)
        } else if lit("<")(input).is_ok() {
            Some(BinaryOp::LessThan)
        } else if lit(">")(input).is_ok() {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = union_expression(input)?;
                left = binary(left, op, right);
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse union expression (|)
fn union_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = additive_expression(input)?;

    loop {
        ws(input)?;
        if lit("|")(input).is_ok() {
            ws(input)?;
            let right = additive_expression(input)?;
            left = binary(left, BinaryOp::Union, right);
        } else {
            break;
        }
    }

    Ok(left)
}

/// Parse additive expression (+, -, &)
fn additive_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = multiplicative_expression(input)?;

    loop {
        ws(input)?;

        let op = if lit("+")(input).is_ok() {
            Some(BinaryOp::Add)
        } else if lit("-")(input).is_ok() {
            Some(BinaryOp::Subtract)
        } else if lit("&")(input).is_ok() {
            Some(BinaryOp::Concatenate)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = multiplicative_expression(input)?;
                left = binary(left, op, right);
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse multiplicative expression (*, /, div, mod)
fn multiplicative_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = unary_expression(input)?;

    loop {
        ws(input)?;

        let op = if lit("*")(input).is_ok() {
            Some(BinaryOp::Multiply)
        } else if lit("/")(input).is_ok() {
            Some(BinaryOp::Divide)
        } else if padded_keyword("div")(input).is_ok() {
            Some(BinaryOp::TruncatedDivide)
        } else if padded_keyword("mod")(input).is_ok() {
            Some(BinaryOp::Modulo)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = unary_expression(input)?;
                left = binary(left, op, right);
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse unary expression (-, +)
fn unary_expression(input: &mut Input<'_>) -> PResult<Expression> {
    ws(input)?;

    if lit("-")(input).is_ok() {
        ws(input)?;
        let operand = unary_expression(input)?;
        return Ok(Expression::UnaryOp {
            op: UnaryOp::Negate,
            operand: Box::new(operand),
        });
    }

    if lit("+")(input).is_ok() {
        ws(input)?;
        let operand = unary_expression(input)?;
        return Ok(Expression::UnaryOp {
            op: UnaryOp::Plus,
            operand: Box::new(operand),
        });
    }

    postfix_expression(input)
}

/// Parse postfix expression (member access, method calls, indexer)
fn postfix_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut base = atom(input)?;

    loop {
        ws(input)?;

        if lit(".")(input).is_ok() {
            ws(input)?;
            let name = identifier(input)?;
            ws(input)?;

            if lit("(")(input).is_ok() {
                let args = argument_list(input)?;
                base = Expression::Function {
                    base: Some(Box::new(base)),
                    name,
                    args,
                };
            } else {
                base = Expression::Property {
                    base: Box::new(base),
                    name,
                };
            }
            continue;
        }

        if lit("[")(input).is_ok() {
            ws(input)?;
            let index = implies_expression(input)?;
            ws(input)?;
            lit("]")(input)?;
            base = Expression::Indexer {
                base: Box::new(base),
                index: Box::new(index),
            };
            continue;
        }

        break;
    }

    Ok(base)
}

/// Parse a parenthesised argument list; the opening `(` is already consumed
fn argument_list(input: &mut Input<'_>) -> PResult<Vec<Expression>> {
    ws(input)?;
    if lit(")")(input).is_ok() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    loop {
        let arg = implies_expression(input)?;
        args.push(arg);
        ws(input)?;
        if lit(",")(input).is_ok() {
            ws(input)?;
        } else {
            break;
        }
    }
    lit(")")(input)?;
    Ok(args)
}

/// Parse atom (highest precedence: literals, constants, identifiers,
/// parenthesised expressions)
fn atom(input: &mut Input<'_>) -> PResult<Expression> {
    ws(input)?;

    alt((
        empty_collection,
        parenthesised,
        external_constant,
        this_expression,
        |input: &mut Input<'_>| {
            keyword("true")(input)?;
            Ok(Expression::Literal(Literal::Boolean(true)))
        },
        |input: &mut Input<'_>| {
            keyword("false")(input)?;
            Ok(Expression::Literal(Literal::Boolean(false)))
        },
        |input: &mut Input<'_>| {
            let literal = temporal_literal(input)?;
            Ok(Expression::Literal(literal))
        },
        quantity_or_number,
        |input: &mut Input<'_>| {
            let s = string_literal(input)?;
            Ok(Expression::Literal(Literal::String(s)))
        },
        identifier_or_function_call,
    ))
    .parse_next(input)
}

fn empty_collection(input: &mut Input<'_>) -> PResult<Expression> {
    let checkpoint = *input;
    if lit("{")(input).is_ok() {
        ws(input)?;
        if lit("}")(input).is_ok() {
            return Ok(Expression::Literal(Literal::Empty));
        }
        *input = checkpoint;
    }
    Err(ContextError::new())
}

fn parenthesised(input: &mut Input<'_>) -> PResult<Expression> {
    lit("(")(input)?;
    ws(input)?;
    let expr = implies_expression(input)?;
    ws(input)?;
    lit(")")(input)?;
    Ok(expr)
}

fn external_constant(input: &mut Input<'_>) -> PResult<Expression> {
    lit("%")(input)?;
    let name = identifier(input)?;
    Ok(Expression::ExternalConstant(name))
}

fn this_expression(input: &mut Input<'_>) -> PResult<Expression> {
    lit("$this")(input)?;
    Ok(Expression::This)
}

/// A number, or a quantity when the number is followed by a quoted unit
fn quantity_or_number(input: &mut Input<'_>) -> PResult<Expression> {
    let literal = number_literal(input)?;
    let checkpoint = *input;
    ws(input)?;
    if let Ok(unit) = string_literal(input) {
        let value = match &literal {
            Literal::Integer(i) => rust_decimal::Decimal::from(*i),
            Literal::Decimal(d) => *d,
            _ => return Err(ContextError::new()),
        };
        return Ok(Expression::Literal(Literal::Quantity(value, unit)));
    }
    *input = checkpoint;
    Ok(Expression::Literal(literal))
}

fn identifier_or_function_call(input: &mut Input<'_>) -> PResult<Expression> {
    let name = identifier(input)?;
    let checkpoint = *input;
    ws(input)?;
    if lit("(")(input).is_ok() {
        let args = argument_list(input)?;
        return Ok(Expression::Function {
            base: None,
            name,
            args,
        });
    }
    *input = checkpoint;
    Ok(Expression::Identifier(name))
}

fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}
