//! Common parser combinators for FHIRPath

use rust_decimal::Decimal;
use std::str::FromStr;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::ast::Literal;

/// Parser input: a plain string slice, advanced in place
pub type Input<'a> = &'a str;

/// Parser result with the default context error
pub type PResult<T> = winnow::Result<T, ContextError>;

/// Skip whitespace
pub fn ws(input: &mut Input<'_>) -> PResult<()> {
    take_while(0.., |c: char| c.is_whitespace())
        .void()
        .parse_next(input)
}

/// Match an exact token
pub fn lit<'a>(expected: &'static str) -> impl FnMut(&mut Input<'a>) -> PResult<()> {
    move |input: &mut Input<'a>| match input.strip_prefix(expected) {
        Some(rest) => {
            *input = rest;
            Ok(())
        }
        None => Err(ContextError::new()),
    }
}

/// Match a keyword: the exact word, not followed by an identifier character
pub fn keyword<'a>(expected: &'static str) -> impl FnMut(&mut Input<'a>) -> PResult<()> {
    move |input: &mut Input<'a>| {
        let rest = input.strip_prefix(expected).ok_or_else(ContextError::new)?;
        if rest
            .chars()
            .next()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false)
        {
            return Err(ContextError::new());
        }
        *input = rest;
        Ok(())
    }
}

/// Keyword with surrounding whitespace consumed
pub fn padded_keyword<'a>(expected: &'static str) -> impl FnMut(&mut Input<'a>) -> PResult<()> {
    move |input: &mut Input<'a>| {
        let checkpoint = *input;
        ws(input)?;
        match keyword(expected)(input) {
            Ok(()) => {
                ws(input)?;
                Ok(())
            }
            Err(e) => {
                *input = checkpoint;
                Err(e)
            }
        }
    }
}

/// Parse an identifier: plain or backtick-delimited
pub fn identifier(input: &mut Input<'_>) -> PResult<String> {
    if lit("`")(input).is_ok() {
        let name = take_while(1.., |c: char| c != '`')
            .parse_next(input)?
            .to_string();
        lit("`")(input)?;
        return Ok(name);
    }
    let first = input.chars().next().ok_or_else(ContextError::new)?;
    if !(first.is_alphabetic() || first == '_') {
        return Err(ContextError::new());
    }
    let name = take_while(1.., |c: char| c.is_alphanumeric() || c == '_')
        .parse_next(input)?
        .to_string();
    Ok(name)
}

/// Parse a single-quoted string literal with backslash escapes
pub fn string_literal(input: &mut Input<'_>) -> PResult<String> {
    lit("'")(input)?;
    let mut out = String::new();
    let mut chars = input.char_indices();
    loop {
        let Some((offset, c)) = chars.next() else {
            return Err(ContextError::new());
        };
        match c {
            '\'' => {
                *input = &input[offset + 1..];
                return Ok(out);
            }
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return Err(ContextError::new());
                };
                out.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
}

/// Parse a number literal (integer or decimal)
pub fn number_literal(input: &mut Input<'_>) -> PResult<Literal> {
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let checkpoint = *input;
    if lit(".")(input).is_ok() {
        let fraction_result: PResult<&str> =
            take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input);
        match fraction_result {
            Ok(fraction) => {
                let text = format!("{digits}.{fraction}");
                let value = Decimal::from_str(&text).map_err(|_| ContextError::new())?;
                return Ok(Literal::Decimal(value));
            }
            Err(_) => *input = checkpoint,
        }
    }
    let value: i64 = digits.parse().map_err(|_| ContextError::new())?;
    Ok(Literal::Integer(value))
}

fn digits_exact<'a>(count: usize) -> impl FnMut(&mut Input<'a>) -> PResult<&'a str> {
    move |input: &mut Input<'a>| {
        take_while(count..=count, |c: char| c.is_ascii_digit()).parse_next(input)
    }
}

/// Parse the time-of-day body `hh[:mm[:ss[.fff]]]` as text
fn time_body<'a>(input: &mut Input<'a>) -> PResult<String> {
    let mut out = String::new();
    out.push_str(digits_exact(2)(input)?);
    let checkpoint = *input;
    if lit(":")(input).is_ok() {
        match digits_exact(2)(input) {
            Ok(minutes) => {
                out.push(':');
                out.push_str(minutes);
                let checkpoint = *input;
                if lit(":")(input).is_ok() {
                    match digits_exact(2)(input) {
                        Ok(seconds) => {
                            out.push(':');
                            out.push_str(seconds);
                            let checkpoint = *input;
                            if lit(".")(input).is_ok() {
                                let millis_result: PResult<&str> =
                                    take_while(1..=3, |c: char| c.is_ascii_digit())
                                        .parse_next(input);
                                match millis_result {
                                    Ok(millis) => {
                                        out.push('.');
                                        out.push_str(millis);
                                    }
                                    Err(_) => *input = checkpoint,
                                }
                            }
                        }
                        Err(_) => *input = checkpoint,
                    }
                }
            }
            Err(_) => *input = checkpoint,
        }
    }
    Ok(out)
}

/// Parse a timezone suffix `Z` or `±hh:mm` as text
fn timezone_suffix<'a>(input: &mut Input<'a>) -> PResult<String> {
    if lit("Z")(input).is_ok() {
        return Ok("Z".to_string());
    }
    let checkpoint = *input;
    let sign = if lit("+")(input).is_ok() {
        '+'
    } else if lit("-")(input).is_ok() {
        '-'
    } else {
        return Err(ContextError::new());
    };
    match (digits_exact(2)(input), lit(":")(input), digits_exact(2)(input)) {
        (Ok(hours), Ok(()), Ok(minutes)) => Ok(format!("{sign}{hours}:{minutes}")),
        _ => {
            *input = checkpoint;
            Err(ContextError::new())
        }
    }
}

/// Parse a temporal literal: `@YYYY[-MM[-DD]][Thh…]` or `@Thh…`
pub fn temporal_literal(input: &mut Input<'_>) -> PResult<Literal> {
    lit("@")(input)?;

    // Time-only literal
    if lit("T")(input).is_ok() {
        let body = time_body(input)?;
        return Ok(Literal::Time(body));
    }

    let mut date = String::new();
    date.push_str(digits_exact(4)(input)?);
    let checkpoint = *input;
    if lit("-")(input).is_ok() {
        match digits_exact(2)(input) {
            Ok(month) => {
                date.push('-');
                date.push_str(month);
                let checkpoint = *input;
                if lit("-")(input).is_ok() {
                    match digits_exact(2)(input) {
                        Ok(day) => {
                            date.push('-');
                            date.push_str(day);
                        }
                        Err(_) => *input = checkpoint,
                    }
                }
            }
            Err(_) => *input = checkpoint,
        }
    }

    if lit("T")(input).is_ok() {
        let mut datetime = date;
        datetime.push('T');
        if let Ok(body) = time_body(input) {
            datetime.push_str(&body);
            if let Ok(tz) = timezone_suffix(input) {
                datetime.push_str(&tz);
            }
        }
        return Ok(Literal::DateTime(datetime));
    }

    Ok(Literal::Date(date))
}
