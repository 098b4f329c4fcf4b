//! Compiled where-clause predicates.
//!
//! The sqlparser AST is lowered once per search into [`Expr`], with every
//! column reference bound to a [`FieldId`] of the target table. Evaluation
//! follows SQL three-valued logic: comparisons with NULL yield NULL and a row
//! passes only when the predicate is TRUE.

use crate::error::{GdxError, GdxResult};
use crate::schema::{FieldId, TableDefinition, Value};
use crate::sql::parser::WhereClauseParser;
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, FunctionArg, FunctionArgExpr,
    FunctionArguments, UnaryOperator,
};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

/// SQL BinaryOperator → 내부 BinaryOperator 변환
pub fn convert_binary_op(op: &SqlBinaryOp) -> GdxResult<BinaryOperator> {
    match op {
        SqlBinaryOp::Plus => Ok(BinaryOperator::Plus),
        SqlBinaryOp::Minus => Ok(BinaryOperator::Minus),
        SqlBinaryOp::Multiply => Ok(BinaryOperator::Multiply),
        SqlBinaryOp::Divide => Ok(BinaryOperator::Divide),
        SqlBinaryOp::Modulo => Ok(BinaryOperator::Modulo),
        SqlBinaryOp::Eq => Ok(BinaryOperator::Eq),
        SqlBinaryOp::NotEq => Ok(BinaryOperator::NotEq),
        SqlBinaryOp::Lt => Ok(BinaryOperator::Lt),
        SqlBinaryOp::LtEq => Ok(BinaryOperator::LtEq),
        SqlBinaryOp::Gt => Ok(BinaryOperator::Gt),
        SqlBinaryOp::GtEq => Ok(BinaryOperator::GtEq),
        SqlBinaryOp::And => Ok(BinaryOperator::And),
        SqlBinaryOp::Or => Ok(BinaryOperator::Or),
        SqlBinaryOp::StringConcat => Ok(BinaryOperator::Concat),
        _ => Err(GdxError::unsupported(
            format!("operator {}", op),
            "where clause",
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(FieldId),
    Literal(Value),
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        case_insensitive: bool,
    },
    Upper(Box<Expr>),
    Lower(Box<Expr>),
}

/// A where clause bound to one table.
#[derive(Debug, Clone)]
pub struct Predicate {
    expr: Expr,
    clause: String,
}

impl Predicate {
    /// Parses and binds `clause`; unknown fields fail with `InvalidFieldReference`.
    pub fn compile(clause: &str, table: &TableDefinition) -> GdxResult<Self> {
        let ast = WhereClauseParser::new().parse(clause)?;
        let expr = plan_expr(&ast, table)?;
        Ok(Self {
            expr,
            clause: clause.to_string(),
        })
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// True only when the predicate evaluates to TRUE.
    pub fn matches(&self, lookup: &dyn Fn(FieldId) -> Value) -> bool {
        eval(&self.expr, lookup).truth() == Some(true)
    }
}

// ════════════════════════════════════════════
// AST lowering
// ════════════════════════════════════════════

fn plan_expr(expr: &SqlExpr, table: &TableDefinition) -> GdxResult<Expr> {
    let boxed = |e: &SqlExpr| plan_expr(e, table).map(Box::new);
    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Column(table.resolve_field(&ident.value)?.id)),
        SqlExpr::CompoundIdentifier(idents) => {
            // table.field → field
            let name = idents.last().map(|i| i.value.clone()).unwrap_or_default();
            Ok(Expr::Column(table.resolve_field(&name)?.id))
        }
        SqlExpr::Value(value) => plan_literal(value),
        SqlExpr::Nested(inner) => plan_expr(inner, table),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::Binary {
            left: boxed(left)?,
            op: convert_binary_op(op)?,
            right: boxed(right)?,
        }),
        SqlExpr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => Ok(Expr::Not(boxed(expr)?)),
            UnaryOperator::Minus => Ok(Expr::Negate(boxed(expr)?)),
            UnaryOperator::Plus => plan_expr(expr, table),
            other => Err(GdxError::unsupported(
                format!("unary operator {}", other),
                "where clause",
            )),
        },
        SqlExpr::IsNull(inner) => Ok(Expr::IsNull {
            expr: boxed(inner)?,
            negated: false,
        }),
        SqlExpr::IsNotNull(inner) => Ok(Expr::IsNull {
            expr: boxed(inner)?,
            negated: true,
        }),
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => Ok(Expr::InList {
            expr: boxed(expr)?,
            list: list
                .iter()
                .map(|e| plan_expr(e, table))
                .collect::<GdxResult<Vec<_>>>()?,
            negated: *negated,
        }),
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Expr::Between {
            expr: boxed(expr)?,
            low: boxed(low)?,
            high: boxed(high)?,
            negated: *negated,
        }),
        SqlExpr::Like {
            negated,
            expr,
            pattern,
            ..
        } => Ok(Expr::Like {
            expr: boxed(expr)?,
            pattern: boxed(pattern)?,
            negated: *negated,
            case_insensitive: false,
        }),
        SqlExpr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => Ok(Expr::Like {
            expr: boxed(expr)?,
            pattern: boxed(pattern)?,
            negated: *negated,
            case_insensitive: true,
        }),
        SqlExpr::Function(func) => {
            let name = func.name.to_string().to_uppercase();
            let mut args = Vec::new();
            if let FunctionArguments::List(arg_list) = &func.args {
                for arg in &arg_list.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) = arg {
                        args.push(plan_expr(e, table)?);
                    }
                }
            }
            let [arg] = <[Expr; 1]>::try_from(args).map_err(|_| {
                GdxError::Validation(format!("{} expects exactly one argument", name))
            })?;
            match name.as_str() {
                "UPPER" | "UCASE" => Ok(Expr::Upper(Box::new(arg))),
                "LOWER" | "LCASE" => Ok(Expr::Lower(Box::new(arg))),
                _ => Err(GdxError::unsupported(
                    format!("function {}", name),
                    "where clause",
                )),
            }
        }
        other => Err(GdxError::unsupported(
            format!("expression {}", other),
            "where clause",
        )),
    }
}

fn plan_literal(value: &sqlparser::ast::Value) -> GdxResult<Expr> {
    let literal = match value {
        sqlparser::ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::Integer(i)
            } else if let Ok(f) = n.parse::<f64>() {
                Value::Double(f)
            } else {
                return Err(GdxError::Validation(format!("invalid number: {}", n)));
            }
        }
        sqlparser::ast::Value::SingleQuotedString(s) => Value::Text(s.clone()),
        sqlparser::ast::Value::Boolean(b) => Value::from_bool(*b),
        sqlparser::ast::Value::Null => Value::Null,
        other => {
            return Err(GdxError::unsupported(
                format!("literal {}", other),
                "where clause",
            ));
        }
    };
    Ok(Expr::Literal(literal))
}

// ════════════════════════════════════════════
// Evaluation
// ════════════════════════════════════════════

fn eval(expr: &Expr, lookup: &dyn Fn(FieldId) -> Value) -> Value {
    match expr {
        Expr::Column(id) => lookup(*id),
        Expr::Literal(v) => v.clone(),
        Expr::Binary { left, op, right } => {
            let l = eval(left, lookup);
            match op {
                BinaryOperator::And => {
                    if l.truth() == Some(false) {
                        return Value::from_bool(false);
                    }
                    let r = eval(right, lookup);
                    match (l.truth(), r.truth()) {
                        (_, Some(false)) => Value::from_bool(false),
                        (Some(true), Some(true)) => Value::from_bool(true),
                        _ => Value::Null,
                    }
                }
                BinaryOperator::Or => {
                    if l.truth() == Some(true) {
                        return Value::from_bool(true);
                    }
                    let r = eval(right, lookup);
                    match (l.truth(), r.truth()) {
                        (_, Some(true)) => Value::from_bool(true),
                        (Some(false), Some(false)) => Value::from_bool(false),
                        _ => Value::Null,
                    }
                }
                _ => binary(&l, *op, &eval(right, lookup)),
            }
        }
        Expr::Not(inner) => match eval(inner, lookup).truth() {
            Some(b) => Value::from_bool(!b),
            None => Value::Null,
        },
        Expr::Negate(inner) => match eval(inner, lookup) {
            Value::Integer(i) => i.checked_neg().map_or(Value::Null, Value::Integer),
            Value::Double(f) => Value::Double(-f),
            _ => Value::Null,
        },
        Expr::IsNull { expr, negated } => Value::from_bool(eval(expr, lookup).is_null() != *negated),
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval(expr, lookup);
            if needle.is_null() {
                return Value::Null;
            }
            let mut saw_null = false;
            for item in list {
                match needle.compare(&eval(item, lookup), true) {
                    Some(Ordering::Equal) => return Value::from_bool(!*negated),
                    None => saw_null = true,
                    _ => {}
                }
            }
            if saw_null {
                Value::Null
            } else {
                Value::from_bool(*negated)
            }
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let v = eval(expr, lookup);
            let lo = v.compare(&eval(low, lookup), true);
            let hi = v.compare(&eval(high, lookup), true);
            match (lo, hi) {
                (Some(a), Some(b)) => Value::from_bool(a.is_ge() && b.is_le() && !*negated
                    || !(a.is_ge() && b.is_le()) && *negated),
                _ => Value::Null,
            }
        }
        Expr::Like {
            expr,
            pattern,
            negated,
            case_insensitive,
        } => {
            let v = eval(expr, lookup);
            let p = eval(pattern, lookup);
            match (v.as_str(), p.as_str()) {
                (Some(text), Some(pat)) => {
                    Value::from_bool(like_match(text, pat, *case_insensitive) != *negated)
                }
                _ => Value::Null,
            }
        }
        Expr::Upper(inner) => match eval(inner, lookup) {
            Value::Text(s) => Value::Text(s.to_uppercase()),
            other => other,
        },
        Expr::Lower(inner) => match eval(inner, lookup) {
            Value::Text(s) => Value::Text(s.to_lowercase()),
            other => other,
        },
    }
}

fn binary(l: &Value, op: BinaryOperator, r: &Value) -> Value {
    let cmp = |pred: fn(Ordering) -> bool| match l.compare(r, true) {
        Some(o) => Value::from_bool(pred(o)),
        None => Value::Null,
    };
    match op {
        BinaryOperator::Eq => cmp(|o| o == Ordering::Equal),
        BinaryOperator::NotEq => cmp(|o| o != Ordering::Equal),
        BinaryOperator::Lt => cmp(|o| o == Ordering::Less),
        BinaryOperator::LtEq => cmp(|o| o != Ordering::Greater),
        BinaryOperator::Gt => cmp(|o| o == Ordering::Greater),
        BinaryOperator::GtEq => cmp(|o| o != Ordering::Less),
        BinaryOperator::Concat => match (l, r) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            _ => Value::Text(format!("{}{}", l, r)),
        },
        BinaryOperator::And | BinaryOperator::Or => Value::Null,
        arith => arithmetic(l, arith, r),
    }
}

fn arithmetic(l: &Value, op: BinaryOperator, r: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (l, r) {
        let out = match op {
            BinaryOperator::Plus => a.checked_add(*b),
            BinaryOperator::Minus => a.checked_sub(*b),
            BinaryOperator::Multiply => a.checked_mul(*b),
            BinaryOperator::Divide => a.checked_div(*b),
            BinaryOperator::Modulo => a.checked_rem(*b),
            _ => None,
        };
        return out.map_or(Value::Null, Value::Integer);
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Value::Null;
    };
    let out = match op {
        BinaryOperator::Plus => a + b,
        BinaryOperator::Minus => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide if b != 0.0 => a / b,
        BinaryOperator::Modulo if b != 0.0 => a % b,
        _ => return Value::Null,
    };
    Value::Double(out)
}

/// SQL LIKE with `%` (any run) and `_` (one character).
pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern): (Vec<char>, Vec<char>) = if case_insensitive {
        (
            text.to_lowercase().chars().collect(),
            pattern.to_lowercase().chars().collect(),
        )
    } else {
        (text.chars().collect(), pattern.chars().collect())
    };
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
