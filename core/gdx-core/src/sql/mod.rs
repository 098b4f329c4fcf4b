// Where-clause 모듈 진입점
pub mod expr;
pub mod parser;

pub use expr::{BinaryOperator, Expr, Predicate, like_match};
pub use parser::{OrderItem, WhereClauseParser};
