use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Category;
use crate::value::Value;

/// Closed operator vocabulary shared by every category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// Pattern match (regular expression for document stores).
    Match,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
        Operator::Match,
    ];

    /// SQL rendering of the comparison; `Match` has no portable form.
    pub fn sql_symbol(&self) -> Option<&'static str> {
        match self {
            Operator::Eq => Some("="),
            Operator::Ne => Some("!="),
            Operator::Gt => Some(">"),
            Operator::Lt => Some("<"),
            Operator::Ge => Some(">="),
            Operator::Le => Some("<="),
            Operator::Match => None,
        }
    }

    /// Parse an operator token; unknown tokens report the active category.
    pub fn parse_token(token: &str, category: Category) -> Result<Self> {
        token
            .parse::<Operator>()
            .map_err(|_| Error::UnsupportedOperator {
                operator: token.to_string(),
                category,
            })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Match => "match",
        };
        f.write_str(token)
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(token: &str) -> std::result::Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(Operator::Eq),
            "!=" | "<>" | "ne" => Ok(Operator::Ne),
            ">" | "gt" => Ok(Operator::Gt),
            "<" | "lt" => Ok(Operator::Lt),
            ">=" | "gte" | "ge" => Ok(Operator::Ge),
            "<=" | "lte" | "le" => Ok(Operator::Le),
            "match" => Ok(Operator::Match),
            other => Err(Error::Unsupported(format!("unknown operator '{other}'"))),
        }
    }
}

/// Single filter predicate; a WHERE-set is an AND of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, Operator::Eq, value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub size: u64,
}

impl Page {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn first(size: u64) -> Self {
        Self { offset: 0, size }
    }
}

/// Operators accepted for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSet {
    operators: BTreeSet<Operator>,
}

impl OperatorSet {
    pub fn new(operators: impl IntoIterator<Item = Operator>) -> Self {
        Self {
            operators: operators.into_iter().collect(),
        }
    }

    /// Default vocabulary per category.
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Sql => Self::new([
                Operator::Eq,
                Operator::Ne,
                Operator::Gt,
                Operator::Lt,
                Operator::Ge,
                Operator::Le,
            ]),
            Category::Document => Self::new(Operator::ALL),
            Category::KeyValue => Self::new([Operator::Eq]),
        }
    }

    pub fn contains(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    pub fn iter(&self) -> impl Iterator<Item = Operator> + '_ {
        self.operators.iter().copied()
    }

    /// Reject the first condition whose operator is outside this set.
    pub fn check(&self, category: Category, conditions: &[Condition]) -> Result<()> {
        for condition in conditions {
            if !self.contains(condition.operator) {
                return Err(Error::UnsupportedOperator {
                    operator: condition.operator.to_string(),
                    category,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_symbolic_and_word_tokens() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("eq".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("gte".parse::<Operator>().unwrap(), Operator::Ge);
        assert_eq!("MATCH".parse::<Operator>().unwrap(), Operator::Match);
    }

    #[test]
    fn unknown_token_is_unsupported_operator() {
        let err = Operator::parse_token("like", Category::Sql).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
        assert!(err.to_string().contains("like"));
    }

    #[test]
    fn category_sets_follow_vocabulary() {
        let sql = OperatorSet::for_category(Category::Sql);
        assert!(sql.contains(Operator::Le));
        assert!(!sql.contains(Operator::Match));

        let document = OperatorSet::for_category(Category::Document);
        assert!(document.contains(Operator::Match));
        assert!(document.contains(Operator::Gt));

        let keyvalue = OperatorSet::for_category(Category::KeyValue);
        assert_eq!(keyvalue.iter().collect::<Vec<_>>(), vec![Operator::Eq]);
    }

    #[test]
    fn check_rejects_first_foreign_operator() {
        let set = OperatorSet::for_category(Category::KeyValue);
        let conditions = vec![
            Condition::eq("key", "user:1"),
            Condition::new("key", Operator::Gt, "user:0"),
        ];
        let err = set.check(Category::KeyValue, &conditions).unwrap_err();
        match err {
            Error::UnsupportedOperator { operator, category } => {
                assert_eq!(operator, ">");
                assert_eq!(category, Category::KeyValue);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
