use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{Document, Result, Value};

/// Compiled regular expression plus the information needed to round-trip it
/// through the canonical `/pattern/flags` string form.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    ignore_case: bool,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str, ignore_case: bool) -> Result<Self> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .build()?;
        Ok(Self {
            source: source.to_string(),
            ignore_case,
            regex,
        })
    }

    /// Parse the canonical `/pattern/flags` form. Returns `None` when the
    /// text is not delimiter-wrapped; pattern errors inside valid delimiters
    /// are reported.
    pub fn parse(text: &str) -> Option<Result<Self>> {
        let rest = text.strip_prefix('/')?;
        let end = rest.rfind('/')?;
        let (source, flags) = rest.split_at(end);
        let flags = &flags[1..];
        Some(Self::new(source, flags.contains('i')))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Canonical string form, e.g. `/abc/i`.
    pub fn to_canonical(&self) -> String {
        if self.ignore_case {
            format!("/{}/i", self.source)
        } else {
            format!("/{}/", self.source)
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({})", self.to_canonical())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.ignore_case == other.ignore_case
    }
}

/// One node of a declarative find query: a bare value (equality match), a
/// pattern, a list of candidates (membership), or a map of `$`-operators.
#[derive(Debug, Clone, PartialEq)]
pub enum FindValue {
    Value(Value),
    Regex(Pattern),
    List(Vec<Value>),
    Ops(BTreeMap<String, FindValue>),
}

impl FindValue {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Value(expected) => actual == expected,
            Self::Regex(pattern) => actual.as_str().is_some_and(|s| pattern.is_match(s)),
            Self::List(values) => values.contains(actual),
            Self::Ops(ops) => ops.iter().all(|(op, operand)| op_matches(op, operand, actual)),
        }
    }
}

fn op_matches(op: &str, operand: &FindValue, actual: &Value) -> bool {
    use std::cmp::Ordering::*;

    // $regex and $in take structured operands, everything else a plain value
    if op == "$regex" {
        return match operand {
            FindValue::Regex(pattern) => actual.as_str().is_some_and(|s| pattern.is_match(s)),
            _ => false,
        };
    }
    if op == "$in" {
        return match operand {
            FindValue::List(values) => values.contains(actual),
            _ => false,
        };
    }
    let expected = match operand {
        FindValue::Value(value) => value,
        _ => return false,
    };
    match op {
        "$eq" => actual == expected,
        "$ne" => actual != expected,
        "$gt" => actual.coerced_cmp(expected) == Some(Greater),
        "$gte" => matches!(actual.coerced_cmp(expected), Some(Greater | Equal)),
        "$lt" => actual.coerced_cmp(expected) == Some(Less),
        "$lte" => matches!(actual.coerced_cmp(expected), Some(Less | Equal)),
        "$contains" => str_op(actual, expected, |a, b| a.contains(b)),
        "$containsIgnoreCase" => {
            str_op(actual, expected, |a, b| a.to_lowercase().contains(&b.to_lowercase()))
        }
        "$startsWith" => str_op(actual, expected, |a, b| a.starts_with(b)),
        "$startsWithIgnoreCase" => {
            str_op(actual, expected, |a, b| a.to_lowercase().starts_with(&b.to_lowercase()))
        }
        "$endsWith" => str_op(actual, expected, |a, b| a.ends_with(b)),
        "$endsWithIgnoreCase" => {
            str_op(actual, expected, |a, b| a.to_lowercase().ends_with(&b.to_lowercase()))
        }
        other => {
            log::warn!("unknown find operator '{}', matching nothing", other);
            false
        }
    }
}

fn str_op(actual: &Value, expected: &Value, op: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Declarative match predicate over flat documents, one entry per field.
/// A document matches when every field entry matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Find(pub BTreeMap<String, FindValue>);

impl Find {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FindValue::Value(value.into()));
        self
    }

    pub fn op(mut self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        let entry = self
            .0
            .entry(field.to_string())
            .or_insert_with(|| FindValue::Ops(BTreeMap::new()));
        if !matches!(entry, FindValue::Ops(_)) {
            *entry = FindValue::Ops(BTreeMap::new());
        }
        if let FindValue::Ops(ops) = entry {
            ops.insert(op.to_string(), FindValue::Value(value.into()));
        }
        self
    }

    pub fn regex(mut self, field: &str, pattern: Pattern) -> Self {
        self.0.insert(field.to_string(), FindValue::Regex(pattern));
        self
    }

    /// Membership match, the `$in` operator.
    pub fn any_of(mut self, field: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.0.insert(
            field.to_string(),
            FindValue::Ops(BTreeMap::from([(
                "$in".to_string(),
                FindValue::List(values),
            )])),
        );
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(field, find_value)| {
            let actual = doc.get(field).unwrap_or(Value::Null);
            find_value.matches(&actual)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read the node at `path`. The first segment names a field, further
    /// segments walk operator maps, e.g. `["age", "$gt"]`.
    pub fn get_path(&self, path: &[&str]) -> Option<&FindValue> {
        let (first, rest) = path.split_first()?;
        let mut node = self.0.get(*first)?;
        for segment in rest {
            match node {
                FindValue::Ops(ops) => node = ops.get(*segment)?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Write `value` at `path`, creating intermediate operator maps as
    /// needed. A non-map node along the way is replaced.
    pub fn set_path(&mut self, path: &[&str], value: FindValue) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.0.insert(first.to_string(), value);
            return;
        }
        let Some((last, middle)) = rest.split_last() else {
            return;
        };
        let root = self
            .0
            .entry(first.to_string())
            .or_insert_with(|| FindValue::Ops(BTreeMap::new()));
        let mut ops = as_ops(root);
        for segment in middle {
            let node = ops
                .entry(segment.to_string())
                .or_insert_with(|| FindValue::Ops(BTreeMap::new()));
            ops = as_ops(node);
        }
        ops.insert(last.to_string(), value);
    }
}

fn as_ops(node: &mut FindValue) -> &mut BTreeMap<String, FindValue> {
    if !matches!(node, FindValue::Ops(_)) {
        *node = FindValue::Ops(BTreeMap::new());
    }
    match node {
        FindValue::Ops(ops) => ops,
        _ => unreachable!("node was just normalized to Ops"),
    }
}

/// Shared function predicate, the `applyWhere` counterpart of [`Find`].
pub type WhereFn = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Snapshot query over a collection's documents. Produced by
/// [`Collection::chain`](crate::store::Collection::chain); each step narrows
/// or orders the snapshot, `data()` yields the result.
pub struct Chain {
    docs: Vec<Document>,
}

impl Chain {
    pub(crate) fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn find(mut self, query: &Find) -> Self {
        self.docs.retain(|doc| query.matches(doc));
        self
    }

    pub fn where_fn(mut self, predicate: impl Fn(&Document) -> bool) -> Self {
        self.docs.retain(|doc| predicate(doc));
        self
    }

    pub fn simple_sort(mut self, field: &str, desc: bool) -> Self {
        self.docs.sort_by(|a, b| {
            let left = a.get(field).unwrap_or(Value::Null);
            let right = b.get(field).unwrap_or(Value::Null);
            let ord = left.cmp(&right);
            if desc { ord.reverse() } else { ord }
        });
        self
    }

    pub fn count(&self) -> usize {
        self.docs.len()
    }

    pub fn data(self) -> Vec<Document> {
        self.docs
    }
}

/// Convenience constructor for the common one-field pattern filter.
pub fn pattern_filter(field: &str, source: &str, ignore_case: bool) -> Result<Find> {
    Ok(Find::new().regex(field, Pattern::new(source, ignore_case)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    fn doc(id: u64, fields: crate::core::Fields) -> Document {
        Document::new(id, fields)
    }

    #[test]
    fn test_equality_and_operators() {
        let d = doc(1, fields! { "name" => "Alice", "age" => 30 });
        assert!(Find::new().eq("name", "Alice").matches(&d));
        assert!(!Find::new().eq("name", "Bob").matches(&d));
        assert!(Find::new().op("age", "$gt", 25).matches(&d));
        assert!(Find::new().op("age", "$lte", 30).matches(&d));
        assert!(!Find::new().op("age", "$ne", 30).matches(&d));
        // missing field compares as NULL
        assert!(!Find::new().op("height", "$gt", 0).matches(&d));
    }

    #[test]
    fn test_string_operators() {
        let d = doc(1, fields! { "name" => "Alice" });
        assert!(Find::new().op("name", "$contains", "lic").matches(&d));
        assert!(Find::new().op("name", "$containsIgnoreCase", "ALI").matches(&d));
        assert!(Find::new().op("name", "$startsWith", "Al").matches(&d));
        assert!(!Find::new().op("name", "$startsWith", "al").matches(&d));
        assert!(Find::new().op("name", "$startsWithIgnoreCase", "al").matches(&d));
        assert!(Find::new().op("name", "$endsWith", "ice").matches(&d));
        assert!(Find::new().op("name", "$endsWithIgnoreCase", "ICE").matches(&d));
    }

    #[test]
    fn test_in_operator() {
        let d = doc(1, fields! { "status" => "open" });
        assert!(Find::new().any_of("status", ["open", "blocked"]).matches(&d));
        assert!(!Find::new().any_of("status", ["closed", "blocked"]).matches(&d));
        assert!(!Find::new().any_of("missing", ["open"]).matches(&d));
    }

    #[test]
    fn test_regex_match() {
        let d = doc(1, fields! { "name" => "Alice" });
        let pattern = Pattern::new("^Ali", false).unwrap();
        assert!(Find::new().regex("name", pattern).matches(&d));
        let insensitive = Pattern::new("^ali", true).unwrap();
        assert!(Find::new().regex("name", insensitive).matches(&d));
    }

    #[test]
    fn test_pattern_canonical_round_trip() {
        let pattern = Pattern::new("abc", true).unwrap();
        assert_eq!(pattern.to_canonical(), "/abc/i");
        let parsed = Pattern::parse("/abc/i").unwrap().unwrap();
        assert_eq!(parsed, pattern);
        assert!(Pattern::parse("abc").is_none());
        assert!(Pattern::parse("/a(b/").unwrap().is_err());
    }

    #[test]
    fn test_path_get_set() {
        let mut find = Find::new();
        find.set_path(&["age", "$gt"], FindValue::Value(Value::Integer(10)));
        assert_eq!(
            find.get_path(&["age", "$gt"]),
            Some(&FindValue::Value(Value::Integer(10)))
        );
        find.set_path(&["age", "$gt"], FindValue::Value(Value::Integer(20)));
        assert!(find.matches(&doc(1, fields! { "age" => 30 })));
        assert!(!find.matches(&doc(1, fields! { "age" => 15 })));
        assert_eq!(find.get_path(&["age", "$lt"]), None);
    }

    #[test]
    fn test_chain_sort() {
        let docs = vec![
            doc(1, fields! { "age" => 30 }),
            doc(2, fields! { "age" => 25 }),
            doc(3, fields! { "age" => 35 }),
        ];
        let sorted = Chain::new(docs).simple_sort("age", false).data();
        let ages: Vec<_> = sorted.iter().map(|d| d.get("age").unwrap()).collect();
        assert_eq!(
            ages,
            vec![Value::Integer(25), Value::Integer(30), Value::Integer(35)]
        );
    }
}
