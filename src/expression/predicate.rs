use super::pattern::eval_like;
use crate::core::{Result, Value};
use crate::entity::Record;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Boolean filter evaluated against each stored record.
///
/// Evaluation follows SQL three-valued logic: anything compared with `NULL`
/// (or with a value of an incomparable type) is unknown, including `!=`.
/// `NOT` keeps an unknown unknown, so on a null `name` neither
/// `name = 'Alice'` nor `NOT (name = 'Alice')` matches. Use `IS NULL` to
/// select missing values.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every record.
    True,
    Compare {
        key: String,
        op: CompareOp,
        value: Value,
    },
    In {
        key: String,
        values: Vec<Value>,
        negated: bool,
    },
    Between {
        key: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    Like {
        key: String,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
    IsNull(String),
    IsNotNull(String),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn all() -> Self {
        Predicate::True
    }

    pub fn compare(key: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::Eq, value)
    }

    pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::NotEq, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::Lt, value)
    }

    pub fn le(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::LtEq, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::Gt, value)
    }

    pub fn ge(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::GtEq, value)
    }

    pub fn is_in<V: Into<Value>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn between(key: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Predicate::Between {
            key: key.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn like(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            key: key.into(),
            pattern: pattern.into(),
            case_insensitive: false,
            negated: false,
        }
    }

    pub fn ilike(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            key: key.into(),
            pattern: pattern.into(),
            case_insensitive: true,
            negated: false,
        }
    }

    pub fn is_null(key: impl Into<String>) -> Self {
        Predicate::IsNull(key.into())
    }

    pub fn is_not_null(key: impl Into<String>) -> Self {
        Predicate::IsNotNull(key.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluates the predicate against one record. Only a definite true
    /// matches; an unknown result does not.
    pub fn matches(&self, record: &Record) -> Result<bool> {
        Ok(self.evaluate(record)? == Some(true))
    }

    /// SQL three-valued evaluation, `None` standing for UNKNOWN.
    fn evaluate(&self, record: &Record) -> Result<Option<bool>> {
        match self {
            Predicate::True => Ok(Some(true)),
            Predicate::Compare { key, op, value } => Ok(record
                .value(key)
                .compare(value)
                .map(|ordering| op.accepts(ordering))),
            Predicate::In {
                key,
                values,
                negated,
            } => {
                let actual = record.value(key);
                let mut unknown = false;
                for candidate in values {
                    match actual.compare(candidate) {
                        Some(Ordering::Equal) => return Ok(Some(!*negated)),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                Ok((!unknown).then_some(*negated))
            }
            Predicate::Between {
                key,
                low,
                high,
                negated,
            } => {
                let actual = record.value(key);
                match (actual.compare(low), actual.compare(high)) {
                    (Some(lower), Some(upper)) => {
                        let inside = lower != Ordering::Less && upper != Ordering::Greater;
                        Ok(Some(inside != *negated))
                    }
                    _ => Ok(None),
                }
            }
            Predicate::Like {
                key,
                pattern,
                case_insensitive,
                negated,
            } => match record.value(key).as_str() {
                Some(text) => Ok(Some(eval_like(text, pattern, !case_insensitive)? != *negated)),
                None => Ok(None),
            },
            Predicate::IsNull(key) => Ok(Some(record.value(key).is_null())),
            Predicate::IsNotNull(key) => Ok(Some(!record.value(key).is_null())),
            Predicate::And(left, right) => match left.evaluate(record)? {
                Some(false) => Ok(Some(false)),
                known => Ok(match (known, right.evaluate(record)?) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }),
            },
            Predicate::Or(left, right) => match left.evaluate(record)? {
                Some(true) => Ok(Some(true)),
                known => Ok(match (known, right.evaluate(record)?) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }),
            },
            Predicate::Not(inner) => Ok(inner.evaluate(record)?.map(|b| !b)),
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::True
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = |negated: &bool| if *negated { "NOT " } else { "" };
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::Compare { key, op, value } => {
                write!(f, "{} {} {}", key, op.symbol(), literal(value))
            }
            Predicate::In {
                key,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(literal).collect();
                write!(f, "{} {}IN ({})", key, not(negated), list.join(", "))
            }
            Predicate::Between {
                key,
                low,
                high,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                key,
                not(negated),
                literal(low),
                literal(high)
            ),
            Predicate::Like {
                key,
                pattern,
                case_insensitive,
                negated,
            } => {
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{} {}{} {}", key, not(negated), op, literal(&Value::Text(pattern.clone())))
            }
            Predicate::IsNull(key) => write!(f, "{} IS NULL", key),
            Predicate::IsNotNull(key) => write!(f, "{} IS NOT NULL", key),
            Predicate::And(left, right) => write!(f, "({} AND {})", left, right),
            Predicate::Or(left, right) => write!(f, "({} OR {})", left, right),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}
