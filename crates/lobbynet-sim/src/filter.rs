//! Evaluation of lobby search filters: `<key> <op> <value>` clauses joined with `and`.

use std::collections::BTreeMap;

use lobbynet_proto::constants::{SEARCH_KEY_AM_MEMBER, SEARCH_KEY_MEMBER_COUNT};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("expected `<key> <op> <value>` at clause {0}")]
    IncompleteClause(usize),

    #[error("unknown comparison operator {0}")]
    UnknownOperator(String),

    #[error("expected `and`, found {0}")]
    ExpectedAnd(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn parse(token: &str) -> Result<Self, FilterError> {
        Ok(match token {
            "eq" => Op::Eq,
            "ne" => Op::Ne,
            "gt" => Op::Gt,
            "ge" => Op::Ge,
            "lt" => Op::Lt,
            "le" => Op::Le,
            other => return Err(FilterError::UnknownOperator(other.to_string())),
        })
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Op::Eq => ordering == Equal,
            Op::Ne => ordering != Equal,
            Op::Gt => ordering == Greater,
            Op::Ge => ordering != Less,
            Op::Lt => ordering == Less,
            Op::Le => ordering != Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    key: String,
    op: Op,
    value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
}

fn tokenize(filter: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = filter.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => text.push(c),
                    None => return Err(FilterError::UnterminatedString),
                }
            }
            tokens.push(Token::Quoted(text));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

/// A parsed filter. The empty filter matches every lobby.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

/// What a filter is evaluated against.
pub struct LobbyView<'a> {
    pub search_properties: &'a BTreeMap<String, String>,
    pub member_count: usize,
    pub searcher_is_member: bool,
}

impl Filter {
    pub fn parse(filter: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(filter)?;
        if tokens.is_empty() {
            return Ok(Self::default());
        }
        let mut clauses = Vec::new();
        let mut iter = tokens.into_iter();
        loop {
            let index = clauses.len();
            let (Some(Token::Word(key)), Some(Token::Word(op)), Some(value)) =
                (iter.next(), iter.next(), iter.next())
            else {
                return Err(FilterError::IncompleteClause(index));
            };
            let value = match value {
                Token::Quoted(text) => Literal::Text(text),
                Token::Word(word) => match word.parse::<f64>() {
                    Ok(n) => Literal::Number(n),
                    Err(_) => Literal::Text(word),
                },
            };
            clauses.push(Clause {
                key,
                op: Op::parse(&op)?,
                value,
            });
            match iter.next() {
                None => return Ok(Self { clauses }),
                Some(Token::Word(word)) if word == "and" => {}
                Some(Token::Word(other)) | Some(Token::Quoted(other)) => {
                    return Err(FilterError::ExpectedAnd(other));
                }
            }
        }
    }

    pub fn matches(&self, lobby: &LobbyView<'_>) -> bool {
        self.clauses.iter().all(|clause| clause.matches(lobby))
    }
}

impl Clause {
    fn matches(&self, lobby: &LobbyView<'_>) -> bool {
        let actual = match self.key.as_str() {
            SEARCH_KEY_MEMBER_COUNT => lobby.member_count.to_string(),
            SEARCH_KEY_AM_MEMBER => u8::from(lobby.searcher_is_member).to_string(),
            key => match lobby.search_properties.get(key) {
                Some(value) => value.clone(),
                None => return false,
            },
        };
        match &self.value {
            Literal::Text(expected) => self.op.holds(actual.as_str().cmp(expected.as_str())),
            Literal::Number(expected) => match actual.parse::<f64>() {
                Ok(n) => n
                    .partial_cmp(expected)
                    .is_some_and(|ordering| self.op.holds(ordering)),
                Err(_) => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn quoted_strings_and_numbers() {
        let search = props(&[("string_key30", "Harbor"), ("number_key30", "4")]);
        let view = LobbyView {
            search_properties: &search,
            member_count: 2,
            searcher_is_member: false,
        };

        let filter = Filter::parse("string_key30 eq 'Harbor' and number_key30 ge 2").unwrap();
        assert!(filter.matches(&view));
        let filter = Filter::parse("number_key30 lt 4").unwrap();
        assert!(!filter.matches(&view));
        let filter = Filter::parse("lobby/memberCount lt 3 and lobby/amMember eq 0").unwrap();
        assert!(filter.matches(&view));
    }

    #[test]
    fn missing_key_never_matches() {
        let search = props(&[]);
        let view = LobbyView {
            search_properties: &search,
            member_count: 1,
            searcher_is_member: false,
        };
        let filter = Filter::parse("string_key2 ne 'eu'").unwrap();
        assert!(!filter.matches(&view));
        assert!(Filter::parse("").unwrap().matches(&view));
    }

    #[test]
    fn quoted_values_may_contain_and() {
        let search = props(&[("string_key4", "salt and pepper")]);
        let view = LobbyView {
            search_properties: &search,
            member_count: 1,
            searcher_is_member: true,
        };
        let filter = Filter::parse("string_key4 eq 'salt and pepper'").unwrap();
        assert!(filter.matches(&view));
    }

    #[test]
    fn malformed_filters() {
        assert_eq!(
            Filter::parse("string_key4 eq 'open"),
            Err(FilterError::UnterminatedString)
        );
        assert_eq!(
            Filter::parse("number_key3 about 4"),
            Err(FilterError::UnknownOperator("about".into()))
        );
        assert_eq!(
            Filter::parse("number_key3 eq 4 or number_key4 eq 5"),
            Err(FilterError::ExpectedAnd("or".into()))
        );
        assert_eq!(
            Filter::parse("number_key3 eq 4 and number_key4"),
            Err(FilterError::IncompleteClause(1))
        );
        assert_eq!(
            Filter::parse("lobby/friends"),
            Err(FilterError::IncompleteClause(0))
        );
    }
}
