//! Property query engine: typed predicates evaluated against a decoded dict.
//!
//! A [`PropQuery`] compares one dict key's stored value against a query value using
//! lexicographic comparison of the encoded bytes (tag byte included), which is
//! equivalent to numeric comparison only when the tags match — callers MUST treat a
//! tag mismatch as a non-match per the comment on [`PropQuery::matches`].

use crate::codec::{marshal_to_vec, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Equal,
    Not,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Contain,
    NotContain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropQuery {
    pub key: String,
    pub op: OpType,
    /// Encoded value (tag byte + payload), compared against the stored value's own
    /// encoding so tag mismatches are detectable without decoding twice.
    pub val: Vec<u8>,
}

impl PropQuery {
    pub fn new(key: impl Into<String>, op: OpType, val: &Value) -> Self {
        Self {
            key: key.into(),
            op,
            val: marshal_to_vec(val),
        }
    }

    /// Evaluate this query against a dict. A missing key never matches (and `Not`
    /// still reports false: there's nothing to negate a match against).
    pub fn matches(&self, dict: &std::collections::BTreeMap<String, Value>) -> bool {
        let Some(stored) = dict.get(&self.key) else {
            return false;
        };
        let stored_bytes = marshal_to_vec(stored);

        match self.op {
            OpType::Equal | OpType::Not | OpType::LessThan | OpType::LessThanOrEqual
            | OpType::GreaterThan | OpType::GreaterThanOrEqual => {
                let tags_match = stored_bytes.first() == self.val.first();
                if !tags_match {
                    // Tag mismatch counts as a non-match; `Not` is the polarity flip of
                    // "non-match", so it holds.
                    return self.op == OpType::Not;
                }
                let ordering = stored_bytes.as_slice().cmp(self.val.as_slice());
                match self.op {
                    OpType::Equal => ordering.is_eq(),
                    OpType::Not => ordering.is_ne(),
                    OpType::LessThan => ordering.is_lt(),
                    OpType::LessThanOrEqual => ordering.is_le(),
                    OpType::GreaterThan => ordering.is_gt(),
                    OpType::GreaterThanOrEqual => ordering.is_ge(),
                    OpType::Contain | OpType::NotContain => unreachable!(),
                }
            }
            OpType::Contain | OpType::NotContain => {
                let contains = match stored.as_list_elements() {
                    None => false, // Null or any non-list stored value: never contains.
                    Some(elements) => elements.iter().any(|el| marshal_to_vec(el) == self.val),
                };
                if self.op == OpType::Contain {
                    contains
                } else {
                    !contains
                }
            }
        }
    }
}

/// A single AND-group: matches a dict iff every query in it matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropQueries(pub Vec<PropQuery>);

impl PropQueries {
    pub fn matches(&self, dict: &std::collections::BTreeMap<String, Value>) -> bool {
        self.0.iter().all(|q| q.matches(dict))
    }
}

/// Matches a dict iff at least one group matches (CNF reduced to disjunction of
/// conjunctions). An empty group list matches everything — callers that want "apply no
/// query filter" pass `&[]`.
pub fn matches_any_group(groups: &[PropQueries], dict: &std::collections::BTreeMap<String, Value>) -> bool {
    groups.is_empty() || groups.iter().any(|g| g.matches(dict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn dict(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn equal_matches_same_tag_same_value() {
        let d = dict(&[("score", Value::Int(5))]);
        let q = PropQuery::new("score", OpType::Equal, &Value::Int(5));
        assert!(q.matches(&d));
    }

    #[test]
    fn tag_mismatch_yields_documented_polarity() {
        let d = dict(&[("score", Value::Int(5))]);
        let eq = PropQuery::new("score", OpType::Equal, &Value::UInt(5));
        let not = PropQuery::new("score", OpType::Not, &Value::UInt(5));
        assert!(!eq.matches(&d));
        assert!(not.matches(&d));
    }

    #[test]
    fn contain_requires_list_and_matching_tag() {
        let d = dict(&[("tags", Value::Ints(vec![1, 2, 3]))]);
        let contain = PropQuery::new("tags", OpType::Contain, &Value::Int(2));
        let not_contain = PropQuery::new("tags", OpType::NotContain, &Value::Int(2));
        assert!(contain.matches(&d));
        assert!(!not_contain.matches(&d));

        // Tag mismatch against list element type -> negative polarity.
        let mismatched = PropQuery::new("tags", OpType::Contain, &Value::UInt(2));
        let mismatched_not = PropQuery::new("tags", OpType::NotContain, &Value::UInt(2));
        assert!(!mismatched.matches(&d));
        assert!(mismatched_not.matches(&d));
    }

    #[test]
    fn null_stored_value_is_never_contained() {
        let d = dict(&[("tags", Value::Null)]);
        let contain = PropQuery::new("tags", OpType::Contain, &Value::Int(1));
        let not_contain = PropQuery::new("tags", OpType::NotContain, &Value::Int(1));
        assert!(!contain.matches(&d));
        assert!(not_contain.matches(&d));
    }

    #[test]
    fn and_group_requires_every_query() {
        let d = dict(&[("tag", Value::Str("A".into())), ("level", Value::Int(2))]);
        let group = PropQueries(vec![
            PropQuery::new("tag", OpType::Equal, &Value::Str("A".into())),
            PropQuery::new("level", OpType::Equal, &Value::Int(2)),
        ]);
        assert!(group.matches(&d));

        let group2 = PropQueries(vec![
            PropQuery::new("tag", OpType::Equal, &Value::Str("A".into())),
            PropQuery::new("level", OpType::Equal, &Value::Int(1)),
        ]);
        assert!(!group2.matches(&d));
    }

    #[test]
    fn disjunction_of_conjunctions() {
        let rooms = [
            dict(&[("tag", Value::Str("A".into())), ("level", Value::Int(1))]),
            dict(&[("tag", Value::Str("A".into())), ("level", Value::Int(2))]),
            dict(&[("tag", Value::Str("B".into())), ("level", Value::Int(1))]),
        ];

        let groups = vec![
            PropQueries(vec![PropQuery::new("tag", OpType::Equal, &Value::Str("A".into()))]),
            PropQueries(vec![PropQuery::new("level", OpType::Equal, &Value::Int(2))]),
        ];
        let matched: Vec<_> = rooms.iter().filter(|d| matches_any_group(&groups, d)).collect();
        assert_eq!(matched.len(), 3);

        let single_group = vec![PropQueries(vec![
            PropQuery::new("tag", OpType::Equal, &Value::Str("A".into())),
            PropQuery::new("level", OpType::Equal, &Value::Int(2)),
        ])];
        let matched: Vec<_> = rooms.iter().filter(|d| matches_any_group(&single_group, d)).collect();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn empty_group_list_matches_everything() {
        let d = dict(&[("tag", Value::Str("A".into()))]);
        assert!(matches_any_group(&[], &d));
    }
}
