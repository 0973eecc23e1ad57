use crate::apply_parser::Binding;
use crate::clause::PropertyPath;
use crate::comparison::{compare_values, values_equal};
use crate::engine::MemberAccess;
use crate::errors::{ApplyError, Result};
use crate::parser::Parser;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare(CmpOp, Operand, Operand),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Truthy(Operand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    ToLower,
    ToUpper,
    Length,
    Contains,
    StartsWith,
    EndsWith,
}

impl ScalarFunction {
    fn lookup(name: &str) -> Option<(Self, usize)> {
        Some(match name {
            "tolower" => (ScalarFunction::ToLower, 1),
            "toupper" => (ScalarFunction::ToUpper, 1),
            "length" => (ScalarFunction::Length, 1),
            "contains" => (ScalarFunction::Contains, 2),
            "startswith" => (ScalarFunction::StartsWith, 2),
            "endswith" => (ScalarFunction::EndsWith, 2),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(PropertyPath),
    Literal(Value),
    Call(ScalarFunction, Vec<Operand>),
}

pub(crate) fn parse_filter_or(parser: &mut Parser, binding: Option<&Binding>) -> Result<FilterExpr> {
    let mut left = parse_filter_and(parser, binding)?;
    loop {
        parser.skip_ws();
        if parser.consume_keyword("or") {
            let right = parse_filter_and(parser, binding)?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_filter_and(parser: &mut Parser, binding: Option<&Binding>) -> Result<FilterExpr> {
    let mut left = parse_filter_not(parser, binding)?;
    loop {
        parser.skip_ws();
        if parser.consume_keyword("and") {
            let right = parse_filter_not(parser, binding)?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_filter_not(parser: &mut Parser, binding: Option<&Binding>) -> Result<FilterExpr> {
    parser.skip_ws();
    if parser.consume_keyword("not") {
        let inner = parse_filter_not(parser, binding)?;
        Ok(FilterExpr::Not(Box::new(inner)))
    } else {
        parse_filter_compare(parser, binding)
    }
}

fn parse_filter_compare(parser: &mut Parser, binding: Option<&Binding>) -> Result<FilterExpr> {
    parser.skip_ws();
    if parser.consume_char('(') {
        let inner = parse_filter_or(parser, binding)?;
        parser.skip_ws();
        parser.expect(')')?;
        return Ok(inner);
    }
    let left = parse_operand(parser, binding)?;
    parser.skip_ws();
    let op = [
        ("eq", CmpOp::Eq),
        ("ne", CmpOp::Ne),
        ("lt", CmpOp::Lt),
        ("le", CmpOp::Le),
        ("gt", CmpOp::Gt),
        ("ge", CmpOp::Ge),
    ]
    .into_iter()
    .find(|(kw, _)| parser.consume_keyword(kw))
    .map(|(_, op)| op);
    if let Some(op) = op {
        parser.skip_ws();
        let right = parse_operand(parser, binding)?;
        return Ok(FilterExpr::Compare(op, left, right));
    }
    Ok(FilterExpr::Truthy(left))
}

fn parse_operand(parser: &mut Parser, binding: Option<&Binding>) -> Result<Operand> {
    parser.skip_ws();
    if parser.peek_char() == Some('\'') {
        return Ok(Operand::Literal(Value::String(parser.parse_quoted_string()?)));
    }
    if parser
        .peek_char()
        .map(|c| c == '-' || c.is_ascii_digit())
        .unwrap_or(false)
    {
        return Ok(Operand::Literal(parser.parse_number_literal()?));
    }
    if parser.consume_keyword("true") {
        return Ok(Operand::Literal(Value::Bool(true)));
    }
    if parser.consume_keyword("false") {
        return Ok(Operand::Literal(Value::Bool(false)));
    }
    if parser.consume_keyword("null") {
        return Ok(Operand::Literal(Value::Null));
    }

    let start = parser.position();
    let name = parser.parse_identifier()?;
    parser.skip_ws();
    if parser.peek_char() == Some('(') {
        let (func, arity) = ScalarFunction::lookup(&name)
            .ok_or_else(|| ApplyError::syntax(start, format!("unknown function '{name}'")))?;
        parser.expect('(')?;
        let mut args = Vec::new();
        loop {
            args.push(parse_operand(parser, binding)?);
            parser.skip_ws();
            if !parser.consume_char(',') {
                break;
            }
        }
        parser.expect(')')?;
        if args.len() != arity {
            return Err(ApplyError::syntax(
                start,
                format!("'{name}' takes {arity} argument(s), got {}", args.len()),
            ));
        }
        return Ok(Operand::Call(func, args));
    }

    let mut segments = vec![name];
    while parser.consume_char('/') {
        segments.push(parser.parse_identifier()?);
    }
    let path = PropertyPath(segments);
    if let Some(b) = binding {
        b.check_path(&path, start)?;
    }
    Ok(Operand::Path(path))
}

pub(crate) fn eval_filter(expr: &FilterExpr, row: &Value, access: &MemberAccess) -> Result<bool> {
    Ok(match expr {
        FilterExpr::Compare(op, a, b) => {
            let a = eval_operand(a, row, access)?;
            let b = eval_operand(b, row, access)?;
            match op {
                CmpOp::Eq => values_equal(&a, &b),
                CmpOp::Ne => !values_equal(&a, &b),
                CmpOp::Lt => compare_values(&a, &b) == Some(Ordering::Less),
                CmpOp::Le => matches!(compare_values(&a, &b), Some(Ordering::Less | Ordering::Equal)),
                CmpOp::Gt => compare_values(&a, &b) == Some(Ordering::Greater),
                CmpOp::Ge => matches!(compare_values(&a, &b), Some(Ordering::Greater | Ordering::Equal)),
            }
        }
        FilterExpr::And(l, r) => eval_filter(l, row, access)? && eval_filter(r, row, access)?,
        FilterExpr::Or(l, r) => eval_filter(l, row, access)? || eval_filter(r, row, access)?,
        FilterExpr::Not(i) => !eval_filter(i, row, access)?,
        FilterExpr::Truthy(op) => truthy(&eval_operand(op, row, access)?),
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn eval_operand(op: &Operand, row: &Value, access: &MemberAccess) -> Result<Value> {
    match op {
        Operand::Literal(v) => Ok(v.clone()),
        Operand::Path(path) => access.read(row, path),
        Operand::Call(func, args) => {
            let args = args
                .iter()
                .map(|a| eval_operand(a, row, access))
                .collect::<Result<Vec<_>>>()?;
            Ok(call_scalar(*func, &args))
        }
    }
}

fn call_scalar(func: ScalarFunction, args: &[Value]) -> Value {
    let text = |i: usize| args.get(i).and_then(Value::as_str);
    match func {
        ScalarFunction::ToLower => text(0).map_or(Value::Null, |s| Value::String(s.to_lowercase())),
        ScalarFunction::ToUpper => text(0).map_or(Value::Null, |s| Value::String(s.to_uppercase())),
        ScalarFunction::Length => match args.first() {
            Some(Value::String(s)) => Value::from(s.chars().count() as i64),
            Some(Value::Array(a)) => Value::from(a.len() as i64),
            _ => Value::Null,
        },
        ScalarFunction::Contains | ScalarFunction::StartsWith | ScalarFunction::EndsWith => {
            match (text(0), text(1)) {
                (Some(s), Some(p)) => Value::Bool(match func {
                    ScalarFunction::Contains => s.contains(p),
                    ScalarFunction::StartsWith => s.starts_with(p),
                    _ => s.ends_with(p),
                }),
                _ => Value::Null,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::default_resolver;
    use serde_json::json;

    fn parse(text: &str) -> FilterExpr {
        let mut p = Parser::new(text);
        parse_filter_or(&mut p, None).unwrap()
    }

    fn keeps(text: &str, row: Value) -> bool {
        let access = MemberAccess::new(default_resolver(), true);
        eval_filter(&parse(text), &row, &access).unwrap()
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let row = json!({"A": 1, "B": 2});
        assert!(keeps("A eq 1 or A eq 5 and B eq 9", row.clone()));
        assert!(!keeps("(A eq 1 or A eq 5) and B eq 9", row));
    }

    #[test]
    fn nested_paths_and_functions() {
        let row = json!({"Product": {"Name": "Widget"}, "Qty": 3});
        assert!(keeps("startswith(tolower(Product/Name), 'wid') and Qty ge 3", row.clone()));
        assert!(keeps("not contains(Product/Name, 'x')", row.clone()));
        assert!(keeps("length(Product/Name) eq 6", row));
    }

    #[test]
    fn null_comparisons() {
        let row = json!({"A": null});
        assert!(keeps("A eq null", row.clone()));
        assert!(!keeps("A gt 1", row.clone()));
        assert!(keeps("Missing/Deep eq null", row));
    }

    #[test]
    fn unknown_function_is_a_syntax_error() {
        let mut p = Parser::new("frobnicate(A) eq 1");
        let err = parse_filter_or(&mut p, None).unwrap_err();
        assert!(matches!(err, ApplyError::ClauseSyntax { position: 0, .. }));
    }
}
