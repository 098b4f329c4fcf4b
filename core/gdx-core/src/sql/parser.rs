use crate::error::{GdxError, GdxResult};
use sqlparser::ast::Expr as SqlExpr;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Where-clause 파서 — sqlparser-rs
pub struct WhereClauseParser {
    dialect: GenericDialect,
}

/// One `ORDER BY` item: (field, descending).
pub type OrderItem = (String, bool);

impl WhereClauseParser {
    /// 새 파서 생성
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Where-clause 문자열을 표현식 AST로 파싱
    pub fn parse(&self, clause: &str) -> GdxResult<SqlExpr> {
        let parse_err = |e: sqlparser::parser::ParserError| GdxError::WhereClauseParse {
            message: e.to_string(),
            clause: clause.to_string(),
        };
        let mut parser = Parser::new(&self.dialect)
            .try_with_sql(clause)
            .map_err(parse_err)?;
        let expr = parser.parse_expr().map_err(parse_err)?;
        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(GdxError::WhereClauseParse {
                message: format!("unexpected trailing input near '{}'", trailing.token),
                clause: clause.to_string(),
            });
        }
        Ok(expr)
    }

    /// Postfix clause (`ORDER BY NAME DESC, HEIGHT`) → sort items.
    pub fn parse_order_by(&self, postfix: &str) -> GdxResult<Vec<OrderItem>> {
        let trimmed = postfix.trim();
        let invalid = || GdxError::WhereClauseParse {
            message: "expected ORDER BY <field> [ASC|DESC], ...".to_string(),
            clause: postfix.to_string(),
        };
        let mut words = trimmed.splitn(3, char::is_whitespace);
        let (Some(order), Some(by), Some(rest)) = (words.next(), words.next(), words.next()) else {
            return Err(invalid());
        };
        if !order.eq_ignore_ascii_case("ORDER") || !by.eq_ignore_ascii_case("BY") {
            return Err(invalid());
        }
        let mut items = Vec::new();
        for part in rest.split(',') {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            let item = match tokens.as_slice() {
                [field] => (field.trim_matches('"').to_string(), false),
                [field, dir] if dir.eq_ignore_ascii_case("ASC") => {
                    (field.trim_matches('"').to_string(), false)
                }
                [field, dir] if dir.eq_ignore_ascii_case("DESC") => {
                    (field.trim_matches('"').to_string(), true)
                }
                _ => return Err(invalid()),
            };
            items.push(item);
        }
        Ok(items)
    }
}

impl Default for WhereClauseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_predicate() {
        let parser = WhereClauseParser::new();
        let expr = parser.parse("NAME = 'Pine' AND HEIGHT > 10").unwrap();
        assert!(matches!(expr, SqlExpr::BinaryOp { .. }));
    }

    #[test]
    fn rejects_trailing_garbage() {
        let parser = WhereClauseParser::new();
        assert!(matches!(
            parser.parse("NAME = 'Pine' ORDER"),
            Err(GdxError::WhereClauseParse { .. })
        ));
        assert!(parser.parse("NAME = ").is_err());
    }

    #[test]
    fn parses_order_by_postfix() {
        let parser = WhereClauseParser::new();
        assert_eq!(
            parser.parse_order_by("ORDER BY NAME DESC, HEIGHT").unwrap(),
            vec![("NAME".to_string(), true), ("HEIGHT".to_string(), false)]
        );
        assert_eq!(
            parser.parse_order_by("order by \"NAME\" asc").unwrap(),
            vec![("NAME".to_string(), false)]
        );
        assert!(parser.parse_order_by("GROUP BY NAME").is_err());
        assert!(parser.parse_order_by("ORDER BY NAME SIDEWAYS").is_err());
    }
}
