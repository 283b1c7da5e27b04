// ============================================================================
// Textual predicates
// ============================================================================
//
// Parses SQL-style boolean expressions (`name = 'Alice' AND score > 2`)
// into `Predicate`s. Only the subset `Predicate` can express is accepted:
// field-vs-literal comparisons, IN, BETWEEN, LIKE/ILIKE, IS [NOT] NULL,
// AND/OR/NOT and parentheses. String literals use single quotes.
//
// ============================================================================

use super::predicate::{CompareOp, Predicate};
use crate::core::{PersistenceError, Result, StoreError, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

fn invalid(message: impl Into<String>) -> PersistenceError {
    StoreError::InvalidPredicate(message.into()).into()
}

pub fn parse_predicate(input: &str) -> Result<Predicate> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(input)
        .map_err(|e| invalid(e.to_string()))?;
    let expr = parser.parse_expr().map_err(|e| invalid(e.to_string()))?;

    let trailing = parser.peek_token();
    if trailing.token != Token::EOF {
        return Err(invalid(format!("Unexpected trailing input: {}", trailing.token)));
    }

    convert_expr(expr)
}

fn convert_expr(expr: sql_ast::Expr) -> Result<Predicate> {
    match expr {
        sql_ast::Expr::Nested(inner) => convert_expr(*inner),

        sql_ast::Expr::BinaryOp { left, op, right } => match op {
            sql_ast::BinaryOperator::And => Ok(convert_expr(*left)?.and(convert_expr(*right)?)),
            sql_ast::BinaryOperator::Or => Ok(convert_expr(*left)?.or(convert_expr(*right)?)),
            other => convert_comparison(*left, &other, *right),
        },

        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Not,
            expr,
        } => Ok(convert_expr(*expr)?.not()),

        sql_ast::Expr::IsNull(inner) => Ok(Predicate::is_null(key_path(&inner)?)),
        sql_ast::Expr::IsNotNull(inner) => Ok(Predicate::is_not_null(key_path(&inner)?)),

        sql_ast::Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Predicate::In {
            key: key_path(&expr)?,
            values: list.iter().map(literal).collect::<Result<Vec<_>>>()?,
            negated,
        }),

        sql_ast::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Predicate::Between {
            key: key_path(&expr)?,
            low: literal(&low)?,
            high: literal(&high)?,
            negated,
        }),

        sql_ast::Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => like(&expr, &pattern, negated, false),

        sql_ast::Expr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => like(&expr, &pattern, negated, true),

        // A bare boolean field: `archived`
        sql_ast::Expr::Identifier(_) | sql_ast::Expr::CompoundIdentifier(_) => {
            Ok(Predicate::eq(key_path(&expr)?, true))
        }

        sql_ast::Expr::Value(ref value) => match &value.value {
            sql_ast::Value::Boolean(true) => Ok(Predicate::True),
            sql_ast::Value::Boolean(false) => Ok(Predicate::True.not()),
            _ => Err(invalid(format!("Literal is not a condition: {}", expr))),
        },

        other => Err(invalid(format!("Unsupported expression: {}", other))),
    }
}

fn convert_comparison(
    left: sql_ast::Expr,
    op: &sql_ast::BinaryOperator,
    right: sql_ast::Expr,
) -> Result<Predicate> {
    let op = match op {
        sql_ast::BinaryOperator::Eq => CompareOp::Eq,
        sql_ast::BinaryOperator::NotEq => CompareOp::NotEq,
        sql_ast::BinaryOperator::Lt => CompareOp::Lt,
        sql_ast::BinaryOperator::LtEq => CompareOp::LtEq,
        sql_ast::BinaryOperator::Gt => CompareOp::Gt,
        sql_ast::BinaryOperator::GtEq => CompareOp::GtEq,
        other => return Err(invalid(format!("Unsupported operator: {}", other))),
    };

    // `3 < score` is read as `score > 3`
    if let Ok(key) = key_path(&left) {
        return Ok(Predicate::compare(key, op, literal(&right)?));
    }
    let flipped = match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::LtEq => CompareOp::GtEq,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::GtEq => CompareOp::LtEq,
        same => same,
    };
    Ok(Predicate::compare(key_path(&right)?, flipped, literal(&left)?))
}

fn like(
    expr: &sql_ast::Expr,
    pattern: &sql_ast::Expr,
    negated: bool,
    case_insensitive: bool,
) -> Result<Predicate> {
    let Value::Text(pattern) = literal(pattern)? else {
        return Err(invalid("LIKE pattern must be a string literal"));
    };
    Ok(Predicate::Like {
        key: key_path(expr)?,
        pattern,
        case_insensitive,
        negated,
    })
}

fn key_path(expr: &sql_ast::Expr) -> Result<String> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(ident.value.clone()),
        sql_ast::Expr::CompoundIdentifier(idents) => Ok(idents
            .iter()
            .map(|ident| ident.value.as_str())
            .collect::<Vec<_>>()
            .join(".")),
        other => Err(invalid(format!("Expected a field name, found {}", other))),
    }
}

fn literal(expr: &sql_ast::Expr) -> Result<Value> {
    match expr {
        sql_ast::Expr::Value(value) => convert_value(&value.value),
        sql_ast::Expr::Nested(inner) => literal(inner),
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(invalid(format!("Cannot negate {}", other.type_name()))),
        },
        other => Err(invalid(format!("Expected a literal, found {}", other))),
    }
}

fn convert_value(value: &sql_ast::Value) -> Result<Value> {
    match value {
        sql_ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(invalid(format!("Invalid number: {}", n)))
            }
        }
        sql_ast::Value::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
        sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        sql_ast::Value::Null => Ok(Value::Null),
        other => Err(invalid(format!("Unsupported literal: {}", other))),
    }
}
