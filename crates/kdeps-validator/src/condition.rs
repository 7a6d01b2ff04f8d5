//! Boolean condition language used by custom validation rules.
//!
//! Grammar:
//! ```text
//! Expr        ::= Conjunction ( '||' Conjunction )*
//! Conjunction ::= Clause ( '&&' Clause )*
//! Clause      ::= Operand Operator Operand | '!'? Operand
//! Operator    ::= '==' | '!=' | '>=' | '<=' | '>' | '<'
//! Operand     ::= QuotedString | Number | 'true' | 'false' | 'null' | Path
//! Path        ::= identifier ( '.' identifier )*
//! ```
//!
//! Paths are looked up in the evaluation [`Environment`]; a missing key is `null`.

use std::cmp::Ordering;
use std::collections::HashMap;

use kdeps_types::{KdepsError, Result};
use serde_json::Value;

/// Flat variable bindings an expression is evaluated against.
pub type Environment = HashMap<String, Value>;

/// Evaluates a boolean expression against an environment.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate_condition(&self, expr: &str, env: &Environment) -> Result<bool>;
}

/// A parsed expression: true when any conjunction holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpr {
    pub any: Vec<Conjunction>,
}

/// Clauses joined by `&&`.
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunction {
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Compare {
        left: Operand,
        operator: Operator,
        right: Operand,
    },
    Truthy {
        operand: Operand,
        negated: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Parse a condition string into a [`ConditionExpr`].
///
/// An empty or whitespace-only input produces an expression with zero
/// conjunctions, which [`evaluate_condition`] treats as always true.
pub fn parse_condition(input: &str) -> Result<ConditionExpr> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(ConditionExpr { any: Vec::new() });
    }

    let mut any = Vec::new();
    for disjunct in split_top_level(trimmed, "||") {
        let mut clauses = Vec::new();
        for part in split_top_level(disjunct, "&&") {
            clauses.push(parse_clause(input, part)?);
        }
        any.push(Conjunction { clauses });
    }
    Ok(ConditionExpr { any })
}

/// Split on `sep`, ignoring separators inside quoted strings.
fn split_top_level<'a>(input: &'a str, sep: &str) -> Vec<&'a str> {
    let bytes = input.as_bytes();
    let sep = sep.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            _ if bytes[i..].starts_with(sep) => {
                parts.push(&input[start..i]);
                i += sep.len();
                start = i;
            }
            _ => i += 1,
        }
    }
    parts.push(&input[start.min(input.len())..]);
    parts
}

fn parse_clause(expr: &str, input: &str) -> Result<Clause> {
    let input = input.trim();
    if input.is_empty() {
        return Err(make_error(expr, "empty clause"));
    }

    if let Some((pos, operator, op_len)) = find_operator(expr, input)? {
        let left = parse_operand(expr, &input[..pos])?;
        let right = parse_operand(expr, &input[pos + op_len..])?;
        return Ok(Clause::Compare {
            left,
            operator,
            right,
        });
    }

    match input.strip_prefix('!') {
        Some(rest) => Ok(Clause::Truthy {
            operand: parse_operand(expr, rest)?,
            negated: true,
        }),
        None => Ok(Clause::Truthy {
            operand: parse_operand(expr, input)?,
            negated: false,
        }),
    }
}

fn find_operator(expr: &str, input: &str) -> Result<Option<(usize, Operator, usize)>> {
    // Scan for a comparison operator, skipping quoted regions.
    let bytes = input.as_bytes();
    let next_is_eq = |i: usize| i + 1 < bytes.len() && bytes[i + 1] == b'=';
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'=' if next_is_eq(i) => return Ok(Some((i, Operator::Eq, 2))),
            b'=' => return Err(make_error(expr, "use '==' for equality")),
            b'!' if next_is_eq(i) => return Ok(Some((i, Operator::NotEq, 2))),
            b'>' if next_is_eq(i) => return Ok(Some((i, Operator::Gte, 2))),
            b'>' => return Ok(Some((i, Operator::Gt, 1))),
            b'<' if next_is_eq(i) => return Ok(Some((i, Operator::Lte, 2))),
            b'<' => return Ok(Some((i, Operator::Lt, 1))),
            _ => i += 1,
        }
    }
    Ok(None)
}

fn parse_operand(expr: &str, raw: &str) -> Result<Operand> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(make_error(expr, "missing operand"));
    }

    let bytes = s.as_bytes();
    if s.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[s.len() - 1] == bytes[0]
    {
        return Ok(Operand::Literal(Value::String(s[1..s.len() - 1].to_string())));
    }

    match s {
        "true" => return Ok(Operand::Literal(Value::Bool(true))),
        "false" => return Ok(Operand::Literal(Value::Bool(false))),
        "null" | "nil" => return Ok(Operand::Literal(Value::Null)),
        _ => {}
    }

    if let Ok(n) = s.parse::<i64>() {
        return Ok(Operand::Literal(Value::from(n)));
    }
    if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Ok(Operand::Literal(Value::Number(n)));
    }

    // Array indices are allowed after the first segment (`items.0.name`).
    let valid_path = s.split('.').enumerate().all(|(i, seg)| {
        !seg.is_empty()
            && (i > 0 || !seg.starts_with(|c: char| c.is_ascii_digit()))
            && seg.chars().all(|c| c.is_alphanumeric() || c == '_')
    });
    if !valid_path {
        return Err(make_error(expr, &format!("invalid operand '{s}'")));
    }
    Ok(Operand::Path(s.to_string()))
}

fn make_error(expr: &str, msg: &str) -> KdepsError {
    KdepsError::Expression {
        expr: expr.to_string(),
        message: msg.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate a parsed expression against `env`.
///
/// Conjunctions short-circuit left to right, so an error in a clause that is
/// never reached is not reported.
pub fn evaluate_condition(expr: &ConditionExpr, env: &Environment) -> Result<bool> {
    if expr.any.is_empty() {
        return Ok(true);
    }

    for conjunction in &expr.any {
        let mut holds = true;
        for clause in &conjunction.clauses {
            if !evaluate_clause(clause, env)? {
                holds = false;
                break;
            }
        }
        if holds {
            return Ok(true);
        }
    }
    Ok(false)
}

fn evaluate_clause(clause: &Clause, env: &Environment) -> Result<bool> {
    match clause {
        Clause::Compare {
            left,
            operator,
            right,
        } => {
            let a = resolve(left, env);
            let b = resolve(right, env);
            match operator {
                Operator::Eq => Ok(loosely_equal(&a, &b)),
                Operator::NotEq => Ok(!loosely_equal(&a, &b)),
                ordering_op => {
                    let ord = order(&a, &b).ok_or_else(|| KdepsError::Expression {
                        expr: describe(clause),
                        message: format!(
                            "cannot compare {} with {}",
                            type_name(&a),
                            type_name(&b)
                        ),
                    })?;
                    Ok(match ordering_op {
                        Operator::Gt => ord == Ordering::Greater,
                        Operator::Gte => ord != Ordering::Less,
                        Operator::Lt => ord == Ordering::Less,
                        _ => ord != Ordering::Greater,
                    })
                }
            }
        }
        Clause::Truthy { operand, negated } => match resolve(operand, env) {
            Value::Bool(b) => Ok(b != *negated),
            other => Err(KdepsError::Expression {
                expr: describe(clause),
                message: format!("expected a boolean, got {}", type_name(&other)),
            }),
        },
    }
}

fn resolve(operand: &Operand, env: &Environment) -> Value {
    match operand {
        Operand::Literal(v) => v.clone(),
        Operand::Path(path) => {
            let mut segments = path.split('.');
            let Some(mut current) = segments.next().and_then(|first| env.get(first)) else {
                return Value::Null;
            };
            for seg in segments {
                let next = match current {
                    Value::Object(map) => map.get(seg),
                    Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                };
                match next {
                    Some(v) => current = v,
                    None => return Value::Null,
                }
            }
            current.clone()
        }
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(clause: &Clause) -> String {
    fn operand(o: &Operand) -> String {
        match o {
            Operand::Literal(v) => v.to_string(),
            Operand::Path(p) => p.clone(),
        }
    }
    match clause {
        Clause::Compare {
            left,
            operator,
            right,
        } => {
            let op = match operator {
                Operator::Eq => "==",
                Operator::NotEq => "!=",
                Operator::Gt => ">",
                Operator::Gte => ">=",
                Operator::Lt => "<",
                Operator::Lte => "<=",
            };
            format!("{} {op} {}", operand(left), operand(right))
        }
        Clause::Truthy { operand: o, negated } => {
            format!("{}{}", if *negated { "!" } else { "" }, operand(o))
        }
    }
}

/// Parses and evaluates expressions with the built-in condition language.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvaluator;

impl ConditionEvaluator for DefaultEvaluator {
    fn evaluate_condition(&self, expr: &str, env: &Environment) -> Result<bool> {
        let parsed = parse_condition(expr)?;
        evaluate_condition(&parsed, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, Value)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eval(expr: &str, env: &Environment) -> bool {
        DefaultEvaluator.evaluate_condition(expr, env).unwrap()
    }

    #[test]
    fn simple_equality() {
        let expr = parse_condition("outcome == 'success'").unwrap();
        assert_eq!(expr.any.len(), 1);
        assert_eq!(
            expr.any[0].clauses[0],
            Clause::Compare {
                left: Operand::Path("outcome".into()),
                operator: Operator::Eq,
                right: Operand::Literal(json!("success")),
            }
        );

        assert!(eval("outcome == 'success'", &env(&[("outcome", json!("success"))])));
        assert!(!eval("outcome == 'success'", &env(&[("outcome", json!("fail"))])));
    }

    #[test]
    fn not_equal_against_empty_string() {
        assert!(eval("password != ''", &env(&[("password", json!("hunter2"))])));
        assert!(!eval("password != ''", &env(&[("password", json!(""))])));
    }

    #[test]
    fn numeric_ordering() {
        let e = env(&[("age", json!(21))]);
        assert!(eval("age >= 18", &e));
        assert!(eval("age > 20", &e));
        assert!(!eval("age < 21", &e));
        assert!(eval("age <= 21.0", &e));
        assert!(!eval("age >= 30", &e));
    }

    #[test]
    fn variable_on_both_sides() {
        let e = env(&[("password", json!("abc")), ("confirmPassword", json!("abc"))]);
        assert!(eval("confirmPassword == password", &e));

        let e = env(&[("password", json!("abc")), ("confirmPassword", json!("abd"))]);
        assert!(!eval("confirmPassword == password", &e));
    }

    #[test]
    fn compound_and_or() {
        let e = env(&[("age", json!(16)), ("guardian", json!(true))]);
        assert!(eval("age >= 18 || guardian", &e));
        assert!(!eval("age >= 18 && guardian", &e));
        assert!(eval("age < 18 && guardian == true", &e));
        assert!(!eval("!guardian", &e));
    }

    #[test]
    fn empty_condition_always_true() {
        let expr = parse_condition("   ").unwrap();
        assert!(expr.any.is_empty());
        assert!(eval("", &Environment::new()));
    }

    #[test]
    fn missing_variable_is_null() {
        let e = Environment::new();
        assert!(eval("nickname == null", &e));
        assert!(eval("nickname != 'bob'", &e));
    }

    #[test]
    fn nested_path_lookup() {
        let e = env(&[("user", json!({ "roles": ["admin"], "profile": { "age": 40 } }))]);
        assert!(eval("user.profile.age > 30", &e));
        assert!(eval("user.roles.0 == 'admin'", &e));
        assert!(eval("user.missing.deep == null", &e));
    }

    #[test]
    fn separators_inside_quotes_are_literal() {
        let e = env(&[("motto", json!("a && b || c"))]);
        assert!(eval("motto == \"a && b || c\"", &e));
    }

    #[test]
    fn parse_errors() {
        assert!(parse_condition("age = 18").is_err());
        assert!(parse_condition("age >= ").is_err());
        assert!(parse_condition("== 3").is_err());
        assert!(parse_condition("age >= 18 && ").is_err());
        assert!(parse_condition("a-b == 1").is_err());
    }

    #[test]
    fn incomparable_types_error() {
        let e = env(&[("age", json!("old"))]);
        let err = DefaultEvaluator.evaluate_condition("age > 18", &e).unwrap_err();
        assert!(err.to_string().contains("cannot compare string with number"), "got: {err}");

        let err = DefaultEvaluator
            .evaluate_condition("age", &env(&[("age", json!(3))]))
            .unwrap_err();
        assert!(err.to_string().contains("expected a boolean"), "got: {err}");
    }
}
