// tally-core/src/domain/expression/interpreter.rs

// Evaluates an `Expr` against an explicit variable map. Nothing else is
// reachable from an expression: no functions, no attribute access, no globals.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::expression::ExpressionError;
use crate::domain::expression::ast::{CompareOp, Expr, Literal};
use crate::domain::scan::measurement::MetricValue;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Text(String),
    Null,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::Text(_) => "text",
            Value::Null => "null",
        }
    }
}

pub fn evaluate(
    expr: &Expr,
    variables: &BTreeMap<String, MetricValue>,
) -> Result<bool, ExpressionError> {
    match eval(expr, variables)? {
        Value::Boolean(b) => Ok(b),
        other => Err(ExpressionError::NotBoolean(other.type_name())),
    }
}

fn eval(expr: &Expr, variables: &BTreeMap<String, MetricValue>) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(Literal::Integer(i)) => Ok(Value::Integer(*i)),
        Expr::Literal(Literal::Decimal(d)) => Ok(Value::Decimal(*d)),
        Expr::Literal(Literal::Boolean(b)) => Ok(Value::Boolean(*b)),
        Expr::Variable(name) => lookup(name, variables),
        Expr::Not(inner) => Ok(Value::Boolean(!truth(eval(inner, variables)?, "not")?)),
        Expr::And(left, right) => {
            if !truth(eval(left, variables)?, "and")? {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(truth(eval(right, variables)?, "and")?))
        }
        Expr::Or(left, right) => {
            if truth(eval(left, variables)?, "or")? {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(truth(eval(right, variables)?, "or")?))
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, variables)?;
            for (op, operand) in rest {
                let right = eval(operand, variables)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Boolean(false));
                }
                left = right;
            }
            Ok(Value::Boolean(true))
        }
    }
}

fn lookup(name: &str, variables: &BTreeMap<String, MetricValue>) -> Result<Value, ExpressionError> {
    match variables.get(name) {
        None => Err(ExpressionError::UnknownVariable(name.to_string())),
        Some(MetricValue::Undefined) => Err(ExpressionError::UndefinedValue(name.to_string())),
        Some(MetricValue::Null) => Ok(Value::Null),
        Some(MetricValue::Boolean(b)) => Ok(Value::Boolean(*b)),
        Some(MetricValue::Integer(i)) => Ok(Value::Integer(*i)),
        Some(MetricValue::Decimal(d)) => Ok(Value::Decimal(*d)),
        Some(MetricValue::Text(s)) => Ok(Value::Text(s.clone())),
    }
}

fn truth(value: Value, operator: &str) -> Result<bool, ExpressionError> {
    match value {
        Value::Boolean(b) => Ok(b),
        other => Err(ExpressionError::TypeMismatch(format!(
            "'{}' expects booleans, got {}",
            operator,
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            let (a, b) = (as_f64(left), as_f64(right));
            Some(a.partial_cmp(&b).ok_or_else(|| {
                ExpressionError::TypeMismatch(format!("cannot order {} and {}", a, b))
            })?)
        }
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        // null only supports equality
        (Value::Null, _) | (_, Value::Null) => None,
        _ => {
            return Err(ExpressionError::TypeMismatch(format!(
                "cannot compare {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            )));
        }
    };

    match (ordering, op) {
        (Some(ord), CompareOp::Eq) => Ok(ord == Ordering::Equal),
        (Some(ord), CompareOp::NotEq) => Ok(ord != Ordering::Equal),
        (Some(ord), CompareOp::Lt) => Ok(ord == Ordering::Less),
        (Some(ord), CompareOp::LtEq) => Ok(ord != Ordering::Greater),
        (Some(ord), CompareOp::Gt) => Ok(ord == Ordering::Greater),
        (Some(ord), CompareOp::GtEq) => Ok(ord != Ordering::Less),
        (None, CompareOp::Eq) => Ok(left == right),
        (None, CompareOp::NotEq) => Ok(left != right),
        (None, _) => Err(ExpressionError::TypeMismatch(format!(
            "cannot order {} {} {}",
            left.type_name(),
            op,
            right.type_name()
        ))),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Decimal(d) => *d,
        _ => f64::NAN,
    }
}
