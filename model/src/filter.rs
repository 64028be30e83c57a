use std::{borrow::Cow, cmp::Ordering, fmt, str::FromStr};

use pest::{Parser as _, error::InputLocation, iterators::Pair};
use pest_derive::Parser;
use semver::Version;
use serde_json::Value;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{Capability, Error, parse_version};

/// LDAP-style filter over capability attributes, e.g. `(&(name=foo)(version>=1.2))`.
///
/// The attribute `version` refers to the capability version when the capability has one.
/// Ordering comparisons use version order when both sides parse as versions, numeric order
/// for number attributes, and plain string order otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
#[non_exhaustive]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Compare {
        attr: String,
        op: CompareOp,
        value: String,
    },
    /// `parts` are the literal pieces between `*` wildcards; it always has at least two entries.
    Substring { attr: String, parts: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::Approx => "~=",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::LessOrEqual => "<=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal | CompareOp::Approx => ordering == Ordering::Equal,
            CompareOp::GreaterOrEqual => ordering != Ordering::Less,
            CompareOp::LessOrEqual => ordering != Ordering::Greater,
        }
    }
}

impl Filter {
    /// The empty conjunction, which matches every capability.
    pub fn match_all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn equal(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Compare {
            attr: attr.into(),
            op: CompareOp::Equal,
            value: value.into(),
        }
    }

    pub fn matches(&self, capability: &Capability) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(capability)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(capability)),
            Filter::Not(filter) => !filter.matches(capability),
            Filter::Present(attr) => lookup(capability, attr).is_some(),
            Filter::Compare { attr, op, value } => {
                lookup(capability, attr).is_some_and(|found| found.compare(*op, value))
            }
            Filter::Substring { attr, parts } => {
                lookup(capability, attr).is_some_and(|found| found.glob(parts))
            }
        }
    }
}

enum AttrValue<'a> {
    Version(&'a Version),
    Json(&'a Value),
}

fn lookup<'a>(capability: &'a Capability, attr: &str) -> Option<AttrValue<'a>> {
    if attr == "version"
        && let Some(version) = &capability.version
    {
        return Some(AttrValue::Version(version));
    }
    capability.attributes.get(attr).map(AttrValue::Json)
}

impl AttrValue<'_> {
    fn compare(&self, op: CompareOp, operand: &str) -> bool {
        match self {
            AttrValue::Version(version) => compare_version(version, op, operand),
            AttrValue::Json(value) => compare_json(value, op, operand),
        }
    }

    fn glob(&self, parts: &[String]) -> bool {
        match self {
            AttrValue::Version(version) => glob(&version.to_string(), parts),
            AttrValue::Json(value) => glob_json(value, parts),
        }
    }
}

fn compare_version(version: &Version, op: CompareOp, operand: &str) -> bool {
    parse_version(operand).is_ok_and(|operand| op.accepts(version.cmp(&operand)))
}

fn compare_json(value: &Value, op: CompareOp, operand: &str) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| compare_json(item, op, operand)),
        Value::String(s) => compare_str(s, op, operand),
        Value::Number(n) => {
            let (Some(lhs), Ok(rhs)) = (n.as_f64(), operand.trim().parse::<f64>()) else {
                return false;
            };
            lhs.partial_cmp(&rhs).is_some_and(|ord| op.accepts(ord))
        }
        Value::Bool(b) => {
            matches!(op, CompareOp::Equal | CompareOp::Approx)
                && operand.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        Value::Null | Value::Object(_) => false,
    }
}

fn compare_str(s: &str, op: CompareOp, operand: &str) -> bool {
    if let (Ok(lhs), Ok(rhs)) = (parse_version(s), parse_version(operand)) {
        return op.accepts(lhs.cmp(&rhs));
    }
    if op == CompareOp::Approx {
        let normalize = |v: &str| {
            v.chars()
                .filter(|c| !c.is_whitespace())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        };
        return normalize(s) == normalize(operand);
    }
    op.accepts(s.cmp(operand))
}

fn glob_json(value: &Value, parts: &[String]) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| glob_json(item, parts)),
        Value::String(s) => glob(s, parts),
        _ => false,
    }
}

fn glob(s: &str, parts: &[String]) -> bool {
    let [first, middle @ .., last] = parts else {
        return false;
    };
    let Some(mut rest) = s.strip_prefix(first.as_str()) else {
        return false;
    };
    for piece in middle {
        match rest.find(piece.as_str()) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }
    rest.ends_with(last.as_str())
}

#[derive(Parser)]
#[grammar = "filter.pest"]
struct FilterParser;

impl FromStr for Filter {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Filter::match_all());
        }

        // Bare `attr=value` is accepted as shorthand for `(attr=value)`.
        let source = if trimmed.starts_with('(') {
            Cow::Borrowed(trimmed)
        } else {
            Cow::Owned(format!("({trimmed})"))
        };

        let mut pairs = FilterParser::parse(Rule::text, &source).map_err(|err| {
            let offset = match err.location {
                InputLocation::Pos(pos) => pos,
                InputLocation::Span((start, _)) => start,
            };
            invalid(input, format!("{} at offset {offset}", err.variant.message()))
        })?;
        let filter = pairs
            .next()
            .and_then(|text| text.into_inner().next())
            .ok_or_else(|| invalid(input, "empty filter".to_string()))?;
        build(input, filter)
    }
}

fn invalid(input: &str, message: String) -> Error {
    Error::InvalidFilter {
        input: input.to_string(),
        message,
    }
}

fn build(input: &str, filter: Pair<'_, Rule>) -> Result<Filter, Error> {
    debug_assert_eq!(filter.as_rule(), Rule::filter);

    let Some(body) = filter.into_inner().next() else {
        return Err(invalid(input, "empty filter".to_string()));
    };
    match body.as_rule() {
        Rule::and => Ok(Filter::And(build_all(input, body)?)),
        Rule::or => Ok(Filter::Or(build_all(input, body)?)),
        Rule::not => {
            let Some(inner) = body.into_inner().next() else {
                return Err(invalid(input, "`!` needs an operand".to_string()));
            };
            Ok(Filter::Not(Box::new(build(input, inner)?)))
        }
        Rule::item => item(input, body),
        rule => unreachable!("filter body cannot be {rule:?}"),
    }
}

fn build_all(input: &str, list: Pair<'_, Rule>) -> Result<Vec<Filter>, Error> {
    list.into_inner().map(|filter| build(input, filter)).collect()
}

fn item(input: &str, item: Pair<'_, Rule>) -> Result<Filter, Error> {
    let mut inner = item.into_inner();
    let (Some(attr), Some(op), Some(value)) = (inner.next(), inner.next(), inner.next()) else {
        return Err(invalid(input, "incomplete comparison".to_string()));
    };

    let attr = attr.as_str().trim().to_string();
    if attr.is_empty() {
        return Err(invalid(input, "missing attribute name".to_string()));
    }
    let op = match op.as_str() {
        "~=" => CompareOp::Approx,
        ">=" => CompareOp::GreaterOrEqual,
        "<=" => CompareOp::LessOrEqual,
        _ => CompareOp::Equal,
    };

    // Literal pieces between unescaped `*` wildcards.
    let mut parts = vec![String::new()];
    for piece in value.into_inner() {
        match piece.as_rule() {
            Rule::star => parts.push(String::new()),
            Rule::escape => push_str(&mut parts, &piece.as_str()[1..]),
            _ => push_str(&mut parts, piece.as_str()),
        }
    }

    if op == CompareOp::Equal && parts.len() > 1 {
        if parts.len() == 2 && parts.iter().all(String::is_empty) {
            return Ok(Filter::Present(attr));
        }
        return Ok(Filter::Substring { attr, parts });
    }

    Ok(Filter::Compare {
        attr,
        op,
        value: parts.join("*"),
    })
}

fn push_str(parts: &mut [String], piece: &str) {
    if let Some(last) = parts.last_mut() {
        last.push_str(piece);
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) | Filter::Or(filters) => {
                let op = if matches!(self, Filter::And(_)) { '&' } else { '|' };
                write!(f, "({op}")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{filter})"),
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Compare { attr, op, value } => {
                write!(f, "({attr}{}", op.as_str())?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Filter::Substring { attr, parts } => {
                write!(f, "({attr}=")?;
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        f.write_str("*")?;
                    }
                    write_escaped(f, part)?;
                }
                f.write_str(")")
            }
        }
    }
}
