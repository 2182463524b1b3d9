//! SQL Safety Classifier
//!
//! Classifies SQL text by the leading keyword of each statement. Anything the
//! classifier does not recognize, or cannot tokenize, is treated as destructive.
//! So is text whose comments MySQL would not ignore: `/*! ... */` and
//! `/*M! ... */` bodies are executed, and `--` only starts a comment when
//! whitespace follows it.

use serde::{Deserialize, Serialize};
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::fmt;

/// Classification of a SQL statement, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    ReadOnly,
    SimpleWrite,
    Destructive,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::ReadOnly => write!(f, "read-only"),
            QueryKind::SimpleWrite => write!(f, "write"),
            QueryKind::Destructive => write!(f, "destructive"),
        }
    }
}

const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC"];
const SIMPLE_WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE"];
const SCHEMA_CHANGE_KEYWORDS: &[&str] = &["CREATE", "DROP", "ALTER", "RENAME", "TRUNCATE"];

/// Classify SQL text. Multi-statement text takes the most severe class of its statements.
pub fn classify(sql: &str) -> QueryKind {
    let Some(statements) = leading_keywords(sql) else {
        return QueryKind::Destructive;
    };

    statements
        .iter()
        .map(|keyword| match keyword {
            Some(word) => classify_keyword(word),
            None => QueryKind::Destructive,
        })
        .max()
        .unwrap_or(QueryKind::Destructive)
}

fn classify_keyword(word: &str) -> QueryKind {
    if READ_ONLY_KEYWORDS.contains(&word) {
        QueryKind::ReadOnly
    } else if SIMPLE_WRITE_KEYWORDS.contains(&word) {
        QueryKind::SimpleWrite
    } else {
        // DELETE, DROP, ALTER, TRUNCATE and everything unrecognized
        QueryKind::Destructive
    }
}

/// Whether any statement in `sql` may change the schema (so cached schema text goes stale).
/// Text the classifier cannot read counts as a change.
pub fn is_schema_change(sql: &str) -> bool {
    match leading_keywords(sql) {
        Some(statements) => statements
            .iter()
            .flatten()
            .any(|word| SCHEMA_CHANGE_KEYWORDS.contains(&word.as_str())),
        None => true,
    }
}

/// Whether `sql` holds exactly one statement the classifier can read.
pub fn is_single_statement(sql: &str) -> bool {
    leading_keywords(sql).map_or(false, |statements| statements.len() == 1)
}

/// Upper-cased leading keyword of every non-empty statement.
///
/// `None` when the text cannot be tokenized or holds a comment MySQL would
/// read as SQL. A statement whose first token is not a bare word (quoted
/// identifier, punctuation) yields `None` in its slot.
fn leading_keywords(sql: &str) -> Option<Vec<Option<String>>> {
    let dialect = MySqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize().ok()?;

    let mut statements = Vec::new();
    let mut at_statement_start = true;
    for token in tokens {
        match token {
            Token::Whitespace(Whitespace::MultiLineComment(body))
                if body.starts_with('!') || body.starts_with("M!") =>
            {
                return None;
            }
            Token::Whitespace(Whitespace::SingleLineComment { prefix, comment })
                if prefix == "--" && !comment.chars().next().map_or(true, char::is_whitespace) =>
            {
                return None;
            }
            Token::Whitespace(_) | Token::EOF => {}
            Token::SemiColon => at_statement_start = true,
            Token::Word(word) if at_statement_start => {
                at_statement_start = false;
                if word.quote_style.is_none() {
                    statements.push(Some(word.value.to_ascii_uppercase()));
                } else {
                    statements.push(None);
                }
            }
            _ if at_statement_start => {
                at_statement_start = false;
                statements.push(None);
            }
            _ => {}
        }
    }
    Some(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_keywords() {
        assert_eq!(classify("SELECT * FROM users"), QueryKind::ReadOnly);
        assert_eq!(classify("show tables"), QueryKind::ReadOnly);
        assert_eq!(classify("Describe users"), QueryKind::ReadOnly);
        assert_eq!(classify("desc users"), QueryKind::ReadOnly);
    }

    #[test]
    fn test_simple_write_keywords() {
        assert_eq!(classify("INSERT INTO users (name) VALUES ('a')"), QueryKind::SimpleWrite);
        assert_eq!(classify("update users SET active=0 WHERE id=5"), QueryKind::SimpleWrite);
    }

    #[test]
    fn test_destructive_keywords() {
        for sql in [
            "DELETE FROM users",
            "drop table users",
            "ALTER TABLE users ADD COLUMN x INT",
            "TRUNCATE users",
        ] {
            assert_eq!(classify(sql), QueryKind::Destructive, "{}", sql);
        }
    }

    #[test]
    fn test_unrecognized_fails_closed() {
        for sql in ["", "   ", "GRANT ALL ON *.* TO bob", "WITH x AS (SELECT 1) SELECT * FROM x", "(SELECT 1)", "`select` 1", "'unterminated"] {
            assert_eq!(classify(sql), QueryKind::Destructive, "{:?}", sql);
        }
    }

    #[test]
    fn test_leading_whitespace_and_comments_are_skipped() {
        assert_eq!(classify("\n\t  SELECT 1"), QueryKind::ReadOnly);
        assert_eq!(classify("-- list users\nSELECT * FROM users"), QueryKind::ReadOnly);
        assert_eq!(classify("/* cleanup */ DELETE FROM users"), QueryKind::Destructive);
    }

    #[test]
    fn test_multiple_statements_take_most_severe() {
        assert_eq!(classify("SELECT 1; SELECT 2;"), QueryKind::ReadOnly);
        assert_eq!(classify("SELECT 1; UPDATE t SET a = 1"), QueryKind::SimpleWrite);
        assert_eq!(classify("SELECT 1; DROP TABLE t"), QueryKind::Destructive);
    }

    #[test]
    fn test_comments_mysql_executes_fail_closed() {
        for sql in [
            "SELECT 1; /*! DROP TABLE users */",
            "SELECT 1 /*!; DELETE FROM users */",
            "SELECT 1 /*!50000 ; DROP TABLE users */",
            "SELECT 1 /*M! ; DROP TABLE users */",
            "SELECT 1 --1;\nDROP TABLE users",
        ] {
            assert_eq!(classify(sql), QueryKind::Destructive, "{:?}", sql);
            assert!(is_schema_change(sql), "{:?}", sql);
        }
    }

    #[test]
    fn test_ordinary_comments_still_skipped() {
        assert_eq!(classify("SELECT 1 -- trailing note"), QueryKind::ReadOnly);
        assert_eq!(classify("SELECT 1 --\n"), QueryKind::ReadOnly);
        assert_eq!(classify("SELECT 1 /* plain ! note */"), QueryKind::ReadOnly);
    }

    #[test]
    fn test_semicolon_inside_literal_does_not_split() {
        assert_eq!(classify("SELECT 'a; DROP TABLE t' FROM dual"), QueryKind::ReadOnly);
    }

    #[test]
    fn test_schema_change_detection() {
        assert!(is_schema_change("CREATE TABLE t (id INT)"));
        assert!(is_schema_change("select 1; alter table t add column y int"));
        assert!(is_schema_change("RENAME TABLE a TO b"));
        assert!(!is_schema_change("UPDATE t SET a = 1"));
        assert!(!is_schema_change("SELECT 'drop table' FROM t"));
    }

    #[test]
    fn test_single_statement_detection() {
        assert!(is_single_statement("SHOW TABLES"));
        assert!(is_single_statement("SELECT 1;"));
        assert!(!is_single_statement("SELECT 1; SELECT 2"));
        assert!(!is_single_statement("SHOW TABLES /*!; DROP TABLE users */"));
        assert!(!is_single_statement(""));
    }

    #[test]
    fn test_severity_order() {
        assert!(QueryKind::ReadOnly < QueryKind::SimpleWrite);
        assert!(QueryKind::SimpleWrite < QueryKind::Destructive);
    }
}
