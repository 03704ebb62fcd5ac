//! Tag selector expressions.
//!
//! A selector is a boolean expression over tag key/value pairs:
//!
//! ```text
//! env == 'prod' and (team = core or not exists(legacy))
//! region in ('eu-west', "eu-north") && !deprecated
//! ```
//!
//! - `key == value` / `key = value` / `key != value` compare the tag value;
//!   `!=` is the negation of `==`, so it also holds when the tag is absent.
//! - `key in (v1, v2)` and `key not in (...)` test set membership.
//! - `exists(key)` or a bare `key` test presence.
//! - `and`/`&&`, `or`/`||`, `not`/`!`, parentheses, `true`, `false`.
//!
//! Keys are compared in normalized form (see
//! [`normalize_tag_key`](crate::models::normalize_tag_key)); values are
//! compared trimmed and lower-cased. Keywords are case-insensitive.
//!
//! The grammar lives in `selector.pest`.

use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use self::grammar::{Rule, SelectorGrammar};
use crate::error::CoreError;
use crate::models::{normalize_tag_key, TagSet};

// ============================================================================
// Expression Tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Const(bool),
    Exists(String),
    Equals(String, String),
    In(String, Vec<String>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    fn eval(&self, tags: &TagSet) -> bool {
        match self {
            Expr::Const(value) => *value,
            Expr::Exists(key) => tags.get_normalized(key).is_some(),
            Expr::Equals(key, value) => tags.get_normalized(key) == Some(value.as_str()),
            Expr::In(key, values) => tags
                .get_normalized(key)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
            Expr::Not(inner) => !inner.eval(tags),
            Expr::And(terms) => terms.iter().all(|t| t.eval(tags)),
            Expr::Or(terms) => terms.iter().any(|t| t.eval(tags)),
        }
    }
}

// ============================================================================
// Tag Selector
// ============================================================================

/// A parsed tag selector.
///
/// Two selectors are equal when their source texts are equal; the source
/// text is what groups declarations sharing a selector.
#[derive(Debug, Clone)]
pub struct TagSelector {
    source: String,
    expr: Expr,
}

impl TagSelector {
    /// Parses a selector expression.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedSelector`] if the text is empty or
    /// not a valid expression.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let source = text.trim().to_string();
        let expr = parse_expr(&source)?;
        Ok(Self { source, expr })
    }

    /// Parses an optional selector: blank text yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedSelector`] if the text is not blank and invalid.
    pub fn parse_optional(text: &str) -> Result<Option<Self>, CoreError> {
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Self::parse(text).map(Some)
        }
    }

    /// Builds a selector requiring every `(key, value)` pair to match exactly.
    ///
    /// Used for selectors synthesized from consumer tags.
    pub fn all_equal(pairs: &[(&str, &str)]) -> Self {
        if pairs.is_empty() {
            return Self {
                source: "true".to_string(),
                expr: Expr::Const(true),
            };
        }
        let source = pairs
            .iter()
            .map(|(key, value)| format!("{} == {}", key.trim().to_lowercase(), quote(value)))
            .collect::<Vec<_>>()
            .join(" and ");
        let terms = pairs
            .iter()
            .map(|(key, value)| Expr::Equals(normalize_tag_key(key), normalize_value(value)))
            .collect();
        Self {
            source,
            expr: Expr::And(terms),
        }
    }

    /// Evaluates the selector against a tag set.
    pub fn matches(&self, tags: &TagSet) -> bool {
        self.expr.eval(tags)
    }

    /// Returns the selector text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for TagSelector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TagSelector {}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for TagSelector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TagSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for TagSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

fn quote(value: &str) -> String {
    let value = normalize_value(value);
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

// ============================================================================
// Grammar
// ============================================================================

mod grammar {
    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "selector.pest"]
    pub(super) struct SelectorGrammar;
}

fn parse_expr(source: &str) -> Result<Expr, CoreError> {
    let mut pairs = SelectorGrammar::parse(Rule::selector, source).map_err(|e| {
        let position = match e.location {
            InputLocation::Pos(position) => position,
            InputLocation::Span((start, _)) => start,
        };
        CoreError::malformed_selector(source, position, e.variant.message())
    })?;

    let builder = ExprBuilder { source };
    let expr = pairs
        .next()
        .and_then(|selector| selector.into_inner().find(|p| p.as_rule() == Rule::expr))
        .ok_or_else(|| builder.incomplete(0))?;
    builder.build(expr)
}

/// Turns the pair tree of a parsed selector into an [`Expr`].
struct ExprBuilder<'s> {
    source: &'s str,
}

impl ExprBuilder<'_> {
    fn incomplete(&self, position: usize) -> CoreError {
        CoreError::malformed_selector(self.source, position, "incomplete expression")
    }

    fn build(&self, pair: Pair<'_, Rule>) -> Result<Expr, CoreError> {
        let position = pair.as_span().start();
        match pair.as_rule() {
            Rule::expr => self.fold(pair, Rule::and_expr, Expr::Or),
            Rule::and_expr => self.fold(pair, Rule::unary, Expr::And),
            Rule::unary => {
                let mut negations = 0;
                let mut operand = None;
                for inner in pair.into_inner() {
                    if inner.as_rule() == Rule::not_op {
                        negations += 1;
                    } else {
                        operand = Some(self.build(inner)?);
                    }
                }
                let operand = operand.ok_or_else(|| self.incomplete(position))?;
                Ok((0..negations).fold(operand, |expr, _| Expr::Not(Box::new(expr))))
            }
            Rule::exists => {
                let key = pair
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::key)
                    .ok_or_else(|| self.incomplete(position))?;
                Ok(Expr::Exists(normalize_tag_key(&self.text(key))))
            }
            Rule::boolean => Ok(Expr::Const(
                pair.into_inner().any(|p| p.as_rule() == Rule::kw_true),
            )),
            Rule::predicate => self.predicate(pair),
            _ => Err(self.incomplete(position)),
        }
    }

    /// Builds an n-ary node from the `operand` children of `pair`.
    fn fold(
        &self,
        pair: Pair<'_, Rule>,
        operand: Rule,
        node: fn(Vec<Expr>) -> Expr,
    ) -> Result<Expr, CoreError> {
        let position = pair.as_span().start();
        let mut terms = pair
            .into_inner()
            .filter(|p| p.as_rule() == operand)
            .map(|p| self.build(p))
            .collect::<Result<Vec<_>, _>>()?;
        match terms.len() {
            0 => Err(self.incomplete(position)),
            1 => Ok(terms.remove(0)),
            _ => Ok(node(terms)),
        }
    }

    fn predicate(&self, pair: Pair<'_, Rule>) -> Result<Expr, CoreError> {
        let position = pair.as_span().start();
        let mut inner = pair.into_inner();
        let key = inner
            .next()
            .filter(|p| p.as_rule() == Rule::key)
            .map(|p| normalize_tag_key(&self.text(p)))
            .ok_or_else(|| self.incomplete(position))?;

        let Some(test) = inner.next() else {
            return Ok(Expr::Exists(key));
        };
        match test.as_rule() {
            Rule::comparison => {
                let mut parts = test.into_inner();
                let negate = parts.next().is_some_and(|op| op.as_str() == "!=");
                let value = parts
                    .next()
                    .map(|p| normalize_value(&self.text(p)))
                    .ok_or_else(|| self.incomplete(position))?;
                let equals = Expr::Equals(key, value);
                Ok(if negate { Expr::Not(Box::new(equals)) } else { equals })
            }
            Rule::membership => {
                let mut negate = false;
                let mut values = Vec::new();
                for part in test.into_inner() {
                    match part.as_rule() {
                        Rule::negated => negate = true,
                        Rule::value => values.push(normalize_value(&self.text(part))),
                        _ => {}
                    }
                }
                let member = Expr::In(key, values);
                Ok(if negate { Expr::Not(Box::new(member)) } else { member })
            }
            _ => Err(self.incomplete(position)),
        }
    }

    /// Returns the text of a `key` or `value`, unescaping quoted strings.
    fn text(&self, pair: Pair<'_, Rule>) -> String {
        let raw = pair.as_str();
        match pair.into_inner().next() {
            Some(inner) if inner.as_rule() == Rule::quoted => inner
                .into_inner()
                .next()
                .map(|content| unescape(content.as_str()))
                .unwrap_or_default(),
            _ => raw.to_string(),
        }
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let selector = TagSelector::parse("Env == 'PROD'").unwrap();
        assert!(selector.matches(&tags(&[("env", "prod")])));
        assert!(selector.matches(&tags(&[("ENV", "Prod")])));
        assert!(!selector.matches(&tags(&[("env", "dev")])));
    }

    #[test]
    fn test_boolean_combinations() {
        let selector =
            TagSelector::parse("env == prod and (team = core or not exists(legacy))").unwrap();
        assert!(selector.matches(&tags(&[("env", "prod"), ("team", "core"), ("legacy", "y")])));
        assert!(selector.matches(&tags(&[("env", "prod"), ("team", "web")])));
        assert!(!selector.matches(&tags(&[("env", "prod"), ("team", "web"), ("legacy", "y")])));
        assert!(!selector.matches(&tags(&[("env", "dev"), ("team", "core")])));
    }

    #[test]
    fn test_symbolic_operators() {
        let selector = TagSelector::parse("a == '1' && !b || c").unwrap();
        assert!(selector.matches(&tags(&[("a", "1")])));
        assert!(!selector.matches(&tags(&[("a", "1"), ("b", "x")])));
        assert!(selector.matches(&tags(&[("c", "")])));
    }

    #[test]
    fn test_keywords_only_match_whole_words() {
        let selector = TagSelector::parse("android == yes OR order == 1 AND NOT notify").unwrap();
        assert!(selector.matches(&tags(&[("android", "yes")])));
        assert!(selector.matches(&tags(&[("order", "1")])));
        assert!(!selector.matches(&tags(&[("order", "1"), ("notify", "x")])));
        assert!(TagSelector::parse("and == x").is_err());
    }

    #[test]
    fn test_double_negation_and_constants() {
        let selector = TagSelector::parse("not not env or false").unwrap();
        assert!(selector.matches(&tags(&[("env", "prod")])));
        assert!(!selector.matches(&tags(&[])));
        assert!(TagSelector::parse("TRUE").unwrap().matches(&tags(&[])));
        assert!(TagSelector::parse("flag == true").unwrap().matches(&tags(&[("flag", "True")])));
    }

    #[test]
    fn test_not_equals_holds_for_missing_tag() {
        let selector = TagSelector::parse("env != prod").unwrap();
        assert!(selector.matches(&tags(&[])));
        assert!(selector.matches(&tags(&[("env", "dev")])));
        assert!(!selector.matches(&tags(&[("env", "prod")])));
    }

    #[test]
    fn test_in_and_not_in() {
        let selector = TagSelector::parse("region in ('eu-west', \"eu-north\")").unwrap();
        assert!(selector.matches(&tags(&[("region", "eu-north")])));
        assert!(!selector.matches(&tags(&[("region", "us-east")])));

        let selector = TagSelector::parse("region not in (eu-west)").unwrap();
        assert!(selector.matches(&tags(&[("region", "us-east")])));
        assert!(!selector.matches(&tags(&[("region", "eu-west")])));
    }

    #[test]
    fn test_keys_compare_normalized() {
        let selector = TagSelector::parse("cost_center == 42").unwrap();
        assert!(selector.matches(&tags(&[("cost-center", "42")])));

        let selector = TagSelector::parse("exists('k8s/namespace')").unwrap();
        assert!(selector.matches(&tags(&[("k8s_namespace", "default")])));
    }

    #[test]
    fn test_malformed_selectors() {
        for text in ["", "env ==", "(env == a", "env == a b", "a & b", "env == 'open", "#x"] {
            let err = TagSelector::parse(text).unwrap_err();
            assert!(
                matches!(err, CoreError::MalformedSelector { .. }),
                "expected malformed selector for {text:?}"
            );
        }
    }

    #[test]
    fn test_malformed_selector_reports_position() {
        match TagSelector::parse("env == a )") {
            Err(CoreError::MalformedSelector { position, .. }) => assert_eq!(position, 9),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_optional() {
        assert!(TagSelector::parse_optional("  ").unwrap().is_none());
        assert!(TagSelector::parse_optional("a").unwrap().is_some());
    }

    #[test]
    fn test_all_equal_round_trips_through_parser() {
        let selector = TagSelector::all_equal(&[("consumer_service", "web"), ("product", "o'neil")]);
        assert_eq!(
            selector.as_str(),
            r"consumer_service == 'web' and product == 'o\'neil'"
        );
        let reparsed = TagSelector::parse(selector.as_str()).unwrap();
        let set = tags(&[("consumer_service", "web"), ("product", "o'neil")]);
        assert!(selector.matches(&set));
        assert!(reparsed.matches(&set));
    }
}
