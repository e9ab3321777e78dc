use std::cmp::Ordering;

use crate::error::DataError;
use crate::record::Record;
use crate::value::Value;

/// Binary operators usable in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
    }

    pub(crate) fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
        }
    }
}

/// A scalar expression over the fields of one record.
///
/// Expressions evaluate in memory with SQL null semantics and render to
/// parameterized SQL, so the same predicate or projection runs against a
/// store or over already materialized rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Value(Value),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Value>,
    },
    Like {
        expr: Box<Expr>,
        pattern: String,
    },
    /// String concatenation; `NULL` if any operand is `NULL`.
    Concat(Vec<Expr>),
}

/// Reference a column by name.
pub fn col(name: &str) -> Expr {
    Expr::column(name)
}

/// A literal value.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::value(value)
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn column(name: &str) -> Expr {
        Expr::Column(name.to_string())
    }

    pub fn value(value: impl Into<Value>) -> Expr {
        Expr::Value(value.into())
    }

    /// The always-true predicate.
    pub fn always() -> Expr {
        Expr::Value(Value::Bool(true))
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        let mut operands = match self {
            Expr::And(operands) => operands,
            other => vec![other],
        };
        match rhs.into() {
            Expr::And(more) => operands.extend(more),
            other => operands.push(other),
        }
        Expr::And(operands)
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        let mut operands = match self {
            Expr::Or(operands) => operands,
            other => vec![other],
        };
        match rhs.into() {
            Expr::Or(more) => operands.extend(more),
            other => operands.push(other),
        }
        Expr::Or(operands)
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        self.is_null().not()
    }

    pub fn in_list(self, list: Vec<Value>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
        }
    }

    pub fn like(self, pattern: &str) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.to_string(),
        }
    }

    pub fn concat(self, rhs: impl Into<Expr>) -> Expr {
        let mut operands = match self {
            Expr::Concat(operands) => operands,
            other => vec![other],
        };
        operands.push(rhs.into());
        Expr::Concat(operands)
    }

    /// Evaluate against one record.
    ///
    /// Referencing a column the record does not carry is an error, as it
    /// would be in SQL.
    pub fn eval(&self, record: &Record) -> Result<Value, DataError> {
        match self {
            Expr::Column(name) => record.value(name).cloned().ok_or_else(|| {
                DataError::MissingField {
                    field: name.clone(),
                }
            }),
            Expr::Value(value) => Ok(value.clone()),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(record)?;
                let rhs = rhs.eval(record)?;
                Ok(eval_binary(*op, &lhs, &rhs))
            }
            Expr::And(operands) => {
                let mut unknown = false;
                for operand in operands {
                    match operand.eval(record)?.truthy() {
                        Some(false) => return Ok(Value::Bool(false)),
                        Some(true) => {}
                        None => unknown = true,
                    }
                }
                Ok(if unknown { Value::Null } else { Value::Bool(true) })
            }
            Expr::Or(operands) => {
                let mut unknown = false;
                for operand in operands {
                    match operand.eval(record)?.truthy() {
                        Some(true) => return Ok(Value::Bool(true)),
                        Some(false) => {}
                        None => unknown = true,
                    }
                }
                Ok(if unknown { Value::Null } else { Value::Bool(false) })
            }
            Expr::Not(inner) => Ok(match inner.eval(record)?.truthy() {
                Some(b) => Value::Bool(!b),
                None => Value::Null,
            }),
            Expr::IsNull(inner) => Ok(Value::Bool(inner.eval(record)?.is_null())),
            Expr::InList { expr, list } => {
                let value = expr.eval(record)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let found = list
                    .iter()
                    .any(|item| value.sql_cmp(item) == Some(Ordering::Equal));
                Ok(Value::Bool(found))
            }
            Expr::Like { expr, pattern } => match expr.eval(record)? {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::Bool(like_match(&s, pattern))),
                other => Ok(Value::Bool(like_match(&other.to_string(), pattern))),
            },
            Expr::Concat(operands) => {
                let mut out = String::new();
                for operand in operands {
                    match operand.eval(record)? {
                        Value::Null => return Ok(Value::Null),
                        Value::String(s) => out.push_str(&s),
                        other => out.push_str(&other.to_string()),
                    }
                }
                Ok(Value::String(out))
            }
        }
    }

    /// Evaluate as a predicate: `NULL` counts as not matching.
    pub fn matches(&self, record: &Record) -> Result<bool, DataError> {
        Ok(self.eval(record)?.truthy().unwrap_or(false))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

macro_rules! impl_expr_from_literal {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Value(Value::from(value))
                }
            }
        )+
    };
}

impl_expr_from_literal!(bool, i64, i32, f64, String, &str);

fn eval_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let compare = |accept: fn(Ordering) -> bool| {
        lhs.sql_cmp(rhs)
            .map_or(Value::Null, |ordering| Value::Bool(accept(ordering)))
    };
    match op {
        BinaryOp::Eq => compare(|o| o == Ordering::Equal),
        BinaryOp::Ne => compare(|o| o != Ordering::Equal),
        BinaryOp::Lt => compare(|o| o == Ordering::Less),
        BinaryOp::Le => compare(|o| o != Ordering::Greater),
        BinaryOp::Gt => compare(|o| o == Ordering::Greater),
        BinaryOp::Ge => compare(|o| o != Ordering::Less),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => arithmetic(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match (lhs, rhs) {
        (Value::I64(a), Value::I64(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            result.map_or_else(|| float_op(op, *a as f64, *b as f64), Value::I64)
        }
        (Value::I64(a), Value::F64(b)) => float_op(op, *a as f64, *b),
        (Value::F64(a), Value::I64(b)) => float_op(op, *a, *b as f64),
        (Value::F64(a), Value::F64(b)) => float_op(op, *a, *b),
        _ => Value::Null,
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Value {
    Value::F64(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        _ => a * b,
    })
}

/// `LIKE` matching: `%` is any run, `_` any single character, ASCII case folded.
fn like_match(input: &str, pattern: &str) -> bool {
    let text: Vec<char> = input.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pat: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pat.len() && (pat[p] == '_' || pat[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pat.len() && pat[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pat[p..].iter().all(|&c| c == '%')
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub descending: bool,
}

impl OrderKey {
    pub fn asc(expr: Expr) -> Self {
        OrderKey {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        OrderKey {
            expr,
            descending: true,
        }
    }

    /// The same key with the direction flipped.
    pub fn reversed(self) -> Self {
        OrderKey {
            expr: self.expr,
            descending: !self.descending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Record {
        Record::new()
            .with("id", 7_i64)
            .with("name", "Widget")
            .with("price", 2.5)
            .with("note", Value::Null)
    }

    #[test]
    fn test_comparison_with_null_is_unknown() {
        let expr = col("note").eq("x");
        assert_eq!(expr.eval(&row()).unwrap(), Value::Null);
        assert!(!expr.matches(&row()).unwrap());
        assert!(!expr.not().matches(&row()).unwrap());
    }

    #[test]
    fn test_and_or_three_valued() {
        let unknown = col("note").eq("x");
        assert!(!unknown.clone().and(lit(true)).matches(&row()).unwrap());
        assert!(unknown.clone().or(lit(true)).matches(&row()).unwrap());
        assert_eq!(
            unknown.and(lit(false)).eval(&row()).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_and_flattens() {
        let expr = col("a").eq(1).and(col("b").eq(2)).and(col("c").eq(3));
        assert!(matches!(expr, Expr::And(ref ops) if ops.len() == 3));
    }

    #[test]
    fn test_in_list_and_is_null() {
        assert!(col("id").in_list(vec![Value::I64(1), Value::I64(7)]).matches(&row()).unwrap());
        assert!(col("note").is_null().matches(&row()).unwrap());
        assert!(col("name").is_not_null().matches(&row()).unwrap());
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match("Widget", "wid%"));
        assert!(like_match("Widget", "%dge_"));
        assert!(like_match("Widget", "%"));
        assert!(!like_match("Widget", "gadget"));
        assert!(like_match("a%b", "a%b"));
        assert!(like_match("", "%"));
        assert!(!like_match("", "_"));
    }

    #[test]
    fn test_arithmetic_and_concat() {
        let total = col("price").mul(4).eval(&row()).unwrap();
        assert_eq!(total, Value::F64(10.0));
        let label = col("name").concat(" #").concat(col("id")).eval(&row()).unwrap();
        assert_eq!(label, Value::String("Widget #7".into()));
        assert_eq!(col("name").concat(col("note")).eval(&row()).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_column_is_error() {
        assert!(matches!(
            col("missing").eval(&row()),
            Err(DataError::MissingField { .. })
        ));
    }
}
