//! SQL Guard
//!
//! Decides whether generated SQL may run: read-only statements only, and the
//! query must carry a LIMIT. Checks run in a fixed order and the first failure
//! is reported:
//!
//! 1. empty input
//! 2. tokenization
//! 3. leading command of every statement (forbidden list, then allow list)
//! 4. presence of `LIMIT`
//!
//! The guard only tokenizes; it does not parse or plan the query.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use sqlparser::ast::visit_relations;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::ops::ControlFlow;

/// Commands that mutate data or schema
pub const FORBIDDEN_COMMANDS: [&str; 7] =
    ["INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE"];

/// Commands a statement may start with
pub const READ_ONLY_COMMANDS: [&str; 2] = ["SELECT", "WITH"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub reason: String,
}

impl ValidationVerdict {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: "SQL is valid".to_string(),
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }

    /// `Ok(())` when valid, otherwise a validation error carrying the reason
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(InsightError::Validation(self.reason))
        }
    }
}

/// First significant token of a statement, plus every unquoted word in it
struct StatementTokens {
    leading: Option<Token>,
    words: Vec<String>,
}

pub fn validate(sql: &str) -> ValidationVerdict {
    if sql.trim().is_empty() {
        return ValidationVerdict::invalid("SQL query is empty");
    }

    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => return ValidationVerdict::invalid(format!("could not tokenize SQL: {}", e)),
    };

    for statement in split_statements(tokens) {
        let command = match &statement.leading {
            None => continue,
            Some(Token::Word(word)) if word.quote_style.is_none() => word.value.to_uppercase(),
            Some(other) => other.to_string(),
        };

        if FORBIDDEN_COMMANDS.contains(&command.as_str()) {
            return ValidationVerdict::invalid(format!("Forbidden SQL command detected: {}", command));
        }
        if !READ_ONLY_COMMANDS.contains(&command.as_str()) {
            return ValidationVerdict::invalid(format!(
                "only read-only SQL allowed, found: {}",
                command
            ));
        }

        // Postgres allows data-modifying statements inside WITH.
        if command == "WITH" {
            if let Some(found) = statement
                .words
                .iter()
                .find(|w| FORBIDDEN_COMMANDS.contains(&w.as_str()))
            {
                return ValidationVerdict::invalid(format!("Forbidden SQL command detected: {}", found));
            }
        }
    }

    if !sql.to_uppercase().contains("LIMIT") {
        return ValidationVerdict::invalid("missing LIMIT clause");
    }

    ValidationVerdict::valid()
}

/// Whether `LIMIT` appears as an unquoted word, not inside an identifier
/// such as `credit_limit` or a string literal
pub fn has_limit_keyword(sql: &str) -> bool {
    let dialect = GenericDialect {};
    match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens.iter().any(|token| {
            matches!(token, Token::Word(word)
                if word.quote_style.is_none() && word.value.eq_ignore_ascii_case("LIMIT"))
        }),
        Err(_) => sql.to_uppercase().contains("LIMIT"),
    }
}

fn split_statements(tokens: Vec<Token>) -> Vec<StatementTokens> {
    let mut statements = Vec::new();
    let mut current = StatementTokens {
        leading: None,
        words: Vec::new(),
    };

    for token in tokens {
        match token {
            Token::SemiColon => {
                let done = std::mem::replace(
                    &mut current,
                    StatementTokens {
                        leading: None,
                        words: Vec::new(),
                    },
                );
                statements.push(done);
            }
            // comments are whitespace tokens
            Token::Whitespace(_) | Token::EOF => {}
            token => {
                if let Token::Word(word) = &token {
                    if word.quote_style.is_none() {
                        current.words.push(word.value.to_uppercase());
                    }
                }
                if current.leading.is_none() {
                    current.leading = Some(token);
                }
            }
        }
    }
    statements.push(current);

    statements
}

/// Relations the query reads from, best effort.
///
/// Returns an empty list when the SQL does not parse.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let statements = match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements,
        Err(_) => return Vec::new(),
    };

    let mut tables: Vec<String> = Vec::new();
    let _ = visit_relations(&statements, |relation| {
        let name = relation.to_string();
        if !tables.contains(&name) {
            tables.push(name);
        }
        ControlFlow::<()>::Continue(())
    });
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sql() {
        for sql in ["", "   ", "\n\t"] {
            let verdict = validate(sql);
            assert!(!verdict.valid);
            assert_eq!(verdict.reason, "SQL query is empty");
        }
    }

    #[test]
    fn test_forbidden_commands_named() {
        for command in FORBIDDEN_COMMANDS {
            let sql = format!("{} something", command.to_lowercase());
            let verdict = validate(&sql);
            assert!(!verdict.valid, "{}", sql);
            assert!(verdict.reason.contains(command), "{}", verdict.reason);
        }
        let verdict = validate("DROP TABLE x");
        assert_eq!(verdict.reason, "Forbidden SQL command detected: DROP");
    }

    #[test]
    fn test_forbidden_reported_before_missing_limit() {
        let verdict = validate("DELETE FROM orders");
        assert_eq!(verdict.reason, "Forbidden SQL command detected: DELETE");
    }

    #[test]
    fn test_disallowed_command() {
        let verdict = validate("SHOW TABLES LIMIT 1");
        assert!(!verdict.valid);
        assert_eq!(verdict.reason, "only read-only SQL allowed, found: SHOW");

        let verdict = validate("GRANT ALL ON t TO bob");
        assert_eq!(verdict.reason, "only read-only SQL allowed, found: GRANT");
    }

    #[test]
    fn test_missing_limit() {
        let verdict = validate("SELECT * FROM t");
        assert!(!verdict.valid);
        assert_eq!(verdict.reason, "missing LIMIT clause");
    }

    #[test]
    fn test_limit_keyword_detection() {
        assert!(has_limit_keyword("select * from t limit 3"));
        assert!(!has_limit_keyword("SELECT credit_limit FROM customers"));
        assert!(!has_limit_keyword("SELECT 'LIMIT' AS label FROM t"));
        // the guard itself still accepts any occurrence
        assert!(validate("SELECT credit_limit FROM customers").valid);
    }

    #[test]
    fn test_valid_select() {
        let verdict = validate("SELECT * FROM t LIMIT 10");
        assert!(verdict.valid);
        assert!(verdict.into_result().is_ok());
    }

    #[test]
    fn test_with_and_lowercase_limit() {
        let sql = "with recent as (select * from orders) select count(*) from recent limit 5;";
        assert!(validate(sql).valid);
    }

    #[test]
    fn test_leading_comments_skipped() {
        let sql = "-- top orders\n/* generated */ SELECT * FROM orders LIMIT 5";
        assert!(validate(sql).valid);

        let sql = "-- harmless\nDROP TABLE orders";
        assert!(validate(sql).reason.contains("DROP"));
    }

    #[test]
    fn test_every_statement_checked() {
        let verdict = validate("SELECT 1 LIMIT 1; DELETE FROM orders");
        assert_eq!(verdict.reason, "Forbidden SQL command detected: DELETE");
    }

    #[test]
    fn test_empty_statements_skipped() {
        assert!(validate("SELECT 1 LIMIT 1;;  ;").valid);
    }

    #[test]
    fn test_data_modifying_cte_rejected() {
        let sql = "WITH gone AS (DELETE FROM orders RETURNING *) SELECT * FROM gone LIMIT 5";
        assert_eq!(validate(sql).reason, "Forbidden SQL command detected: DELETE");
    }

    #[test]
    fn test_keywords_inside_strings_ignored() {
        let sql = "WITH t AS (SELECT 'DELETE' AS action) SELECT * FROM t LIMIT 1";
        assert!(validate(sql).valid);
    }

    #[test]
    fn test_untokenizable_sql() {
        let verdict = validate("SELECT 'unterminated LIMIT 1");
        assert!(!verdict.valid);
        assert!(verdict.reason.starts_with("could not tokenize SQL"));
    }

    #[test]
    fn test_into_result_error_kind() {
        let err = validate("SELECT 1").into_result().unwrap_err();
        assert!(matches!(err, InsightError::Validation(ref r) if r == "missing LIMIT clause"));
    }

    #[test]
    fn test_referenced_tables() {
        let tables = referenced_tables(
            "SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.customer_id LIMIT 5",
        );
        assert_eq!(tables, vec!["orders".to_string(), "customers".to_string()]);
        assert!(referenced_tables("not sql at all").is_empty());
    }
}
