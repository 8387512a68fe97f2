use std::cmp::Ordering;

use tr_core::{Tag, TagRunError, TrValue};

use super::{attrn, tagn};
use crate::args::Args;
use crate::engine::TagEngine;
use crate::registry::{RunnerResult, TagOutcome};

/// Assertion rule shared by the `assert*` tags.
///
/// Without an expected value the actual value must not be null, zero, empty
/// or the text "false". With one, numbers compare by their text, booleans by
/// case-insensitive text, everything else structurally.
pub(crate) fn assert_matches_value(actual: &TrValue, expected: &TrValue) -> bool {
    if expected.is_null() {
        return match actual {
            TrValue::Null => false,
            TrValue::Int(value) => *value != 0,
            TrValue::Float(value) => *value != 0.0,
            TrValue::String(value) if value.is_empty() => false,
            other => !other.to_text().eq_ignore_ascii_case("false"),
        };
    }
    match actual {
        TrValue::Null => false,
        TrValue::Int(_) | TrValue::Float(_) => actual.to_text() == expected.to_text(),
        TrValue::Bool(_) => actual.to_text().eq_ignore_ascii_case(&expected.to_text()),
        _ => actual == expected,
    }
}

pub(super) fn run_assert(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let negate = tag.name == tagn::ASSERT_NOT;
    let key = engine.attr_key(tag, args, attrn::KEY);
    let expected = engine
        .attr_text(tag, args, attrn::VALUE)
        .map(TrValue::String)
        .unwrap_or_default();

    if !key.is_empty() {
        let actual = engine.get_var(args, &key).unwrap_or_default();
        let matched = assert_matches_value(&actual, &expected);
        tracing::debug!(key = %key, actual = %actual.to_text(), matched, "assert");
        return Ok(TagOutcome::from(matched != negate));
    }

    if tag.first_tag().is_none() {
        return Err(TagRunError::new(
            "ENGINE_ASSERT_ILLEGAL",
            format!("\"{}\" needs a \"key\" attribute or child tags.", tag.name),
        ));
    }

    // assert: all children must match. assert_not: any child failing to match is enough.
    for child in tag.tags() {
        let actual = engine.execute_tag(child, args, depth).into_value();
        let matched = assert_matches_value(&actual, &expected);
        if negate && !matched {
            return Ok(TagOutcome::ok());
        }
        if !negate && !matched {
            return Ok(TagOutcome::fail());
        }
    }
    Ok(TagOutcome::from(!negate))
}

pub(super) fn run_assert_in(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let negate = tag.name == tagn::ASSERT_NOT_IN;
    let key = engine.require_key(tag, args, attrn::KEY)?;
    if tag.first_tag().is_none() {
        return Err(TagRunError::new(
            "ENGINE_ASSERT_ILLEGAL",
            format!("\"{}\" needs candidate values as child tags.", tag.name),
        ));
    }

    let actual = engine.get_var(args, &key).unwrap_or_default();
    for child in tag.tags() {
        let candidate = engine.execute_tag(child, args, depth).into_value();
        if assert_matches_value(&actual, &candidate) {
            return Ok(TagOutcome::from(!negate));
        }
    }
    Ok(TagOutcome::from(negate))
}

pub(super) fn run_not(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let child = tag.first_tag().ok_or_else(|| {
        TagRunError::new("ENGINE_NOT_ILLEGAL", "\"not\" needs a child tag to negate.")
    })?;
    Ok(TagOutcome::from(!engine.execute_tag(child, args, depth).is_truthy()))
}

pub(super) fn run_and_or(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let is_and = tag.name == tagn::AND;
    // The running value decides the result once it is falsy under `and` or truthy under `or`.
    let decides = |value: &TrValue| value.is_truthy() != is_and;

    if let Some((key1, key2)) = key_pair(engine, tag, args) {
        let left = engine.get_var(args, &key1).unwrap_or_default();
        if decides(&left) {
            return Ok(left.into());
        }
        return Ok(engine.get_var(args, &key2).unwrap_or_default().into());
    }

    if tag.tags().count() < 2 {
        return Err(TagRunError::new(
            "ENGINE_CONDITION_ILLEGAL",
            format!("\"{}\" needs \"key1\" and \"key2\" or at least two child tags.", tag.name),
        ));
    }

    let mut value = TrValue::Null;
    for child in tag.tags() {
        value = engine.execute_tag(child, args, depth).into_value();
        if decides(&value) {
            break;
        }
    }
    Ok(value.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Comparator {
    fn from_tag(name: &str) -> Option<Self> {
        Some(match name {
            tagn::EQUAL => Self::Equal,
            tagn::NOT_EQUAL => Self::NotEqual,
            tagn::LESS => Self::Less,
            tagn::LESS_EQUAL => Self::LessEqual,
            tagn::GREATER => Self::Greater,
            tagn::GREATER_EQUAL => Self::GreaterEqual,
            _ => return None,
        })
    }

    fn holds(self, left: &TrValue, right: &TrValue) -> Result<bool, TagRunError> {
        Ok(match self {
            Self::Equal => left.loose_eq(right),
            Self::NotEqual => !left.loose_eq(right),
            Self::Less => left.compare(right)? == Ordering::Less,
            Self::LessEqual => left.compare(right)? != Ordering::Greater,
            Self::Greater => left.compare(right)? == Ordering::Greater,
            Self::GreaterEqual => left.compare(right)? != Ordering::Less,
        })
    }
}

pub(super) fn run_compare(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let comparator = Comparator::from_tag(&tag.name).ok_or_else(|| {
        TagRunError::new(
            "ENGINE_RUNNER_NOT_FOUND",
            format!("\"{}\" is not a comparison tag.", tag.name),
        )
    })?;

    if let Some((key1, key2)) = key_pair(engine, tag, args) {
        let left = engine.get_var(args, &key1).unwrap_or_default();
        let right = engine.get_var(args, &key2).unwrap_or_default();
        return Ok(comparator.holds(&left, &right)?.into());
    }

    if tag.tags().count() < 2 {
        return Err(TagRunError::new(
            "ENGINE_CONDITION_ILLEGAL",
            format!("\"{}\" needs \"key1\" and \"key2\" or at least two child tags.", tag.name),
        ));
    }

    let mut previous: Option<TrValue> = None;
    for child in tag.tags() {
        let current = engine.execute_tag(child, args, depth).into_value();
        if let Some(previous) = &previous {
            if !comparator.holds(previous, &current)? {
                return Ok(TagOutcome::fail());
            }
        }
        previous = Some(current);
    }
    Ok(TagOutcome::ok())
}

fn key_pair(engine: &TagEngine, tag: &Tag, args: &Args) -> Option<(String, String)> {
    let key1 = engine.attr_key(tag, args, attrn::KEY1);
    let key2 = engine.attr_key(tag, args, attrn::KEY2);
    (!key1.is_empty() && !key2.is_empty()).then_some((key1, key2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(key: &str) -> Tag {
        Tag::new(tagn::GET).with_attr("key", key)
    }

    fn engine_with(vars: &[(&str, TrValue)]) -> (TagEngine, Args) {
        let mut args = Args::new();
        for (key, value) in vars {
            args.set(*key, value.clone());
        }
        (TagEngine::default(), args)
    }

    #[test]
    fn default_assert_rejects_falsy_values() {
        let (engine, mut args) = engine_with(&[
            ("zero", TrValue::Int(0)),
            ("empty", TrValue::from("")),
            ("nil", TrValue::Null),
            ("no", TrValue::from("FaLsE")),
            ("no_bool", TrValue::Bool(false)),
            ("word", TrValue::from("0")),
            ("one", TrValue::Int(1)),
        ]);
        for key in ["zero", "empty", "nil", "no", "no_bool", "missing"] {
            let tag = Tag::new(tagn::ASSERT).with_attr("key", key);
            assert!(!engine.execute_tag(&tag, &mut args, 0).is_truthy(), "{}", key);
            let negated = Tag::new(tagn::ASSERT_NOT).with_attr("key", key);
            assert!(engine.execute_tag(&negated, &mut args, 0).is_truthy(), "{}", key);
        }
        for key in ["word", "one"] {
            let tag = Tag::new(tagn::ASSERT).with_attr("key", key);
            assert!(engine.execute_tag(&tag, &mut args, 0).is_truthy(), "{}", key);
        }
    }

    #[test]
    fn assert_with_value_compares_text_forms() {
        assert!(assert_matches_value(&TrValue::Int(5), &TrValue::from("5")));
        assert!(assert_matches_value(&TrValue::Bool(true), &TrValue::from("TRUE")));
        assert!(assert_matches_value(&TrValue::from("abc"), &TrValue::from("abc")));
        assert!(!assert_matches_value(&TrValue::from("abc"), &TrValue::from("ABC")));
        assert!(!assert_matches_value(&TrValue::Null, &TrValue::from("")));
    }

    #[test]
    fn assert_children_combine_with_and_while_assert_not_uses_or() {
        let (engine, mut args) = engine_with(&[("a", TrValue::from("x")), ("b", TrValue::from("y"))]);
        let all = Tag::new(tagn::ASSERT)
            .with_attr("value", "x")
            .with_child(get("a"))
            .with_child(get("b"));
        assert!(!engine.execute_tag(&all, &mut args, 0).is_truthy());

        let any_differs = Tag::new(tagn::ASSERT_NOT)
            .with_attr("value", "x")
            .with_child(get("a"))
            .with_child(get("b"));
        assert!(engine.execute_tag(&any_differs, &mut args, 0).is_truthy());

        let bare = Tag::new(tagn::ASSERT);
        assert!(!engine.execute_tag(&bare, &mut args, 0).is_truthy());
    }

    #[test]
    fn assert_in_checks_membership_among_children() {
        let (engine, mut args) = engine_with(&[
            ("color", TrValue::from("red")),
            ("a", TrValue::from("blue")),
            ("b", TrValue::from("red")),
        ]);
        let tag = |name: &str| {
            Tag::new(name)
                .with_attr("key", "color")
                .with_child(get("a"))
                .with_child(get("b"))
        };
        assert!(engine.execute_tag(&tag(tagn::ASSERT_IN), &mut args, 0).is_truthy());
        assert!(!engine.execute_tag(&tag(tagn::ASSERT_NOT_IN), &mut args, 0).is_truthy());
    }

    #[test]
    fn and_or_return_the_deciding_value() {
        let (engine, mut args) = engine_with(&[
            ("a", TrValue::from("x")),
            ("e", TrValue::from("")),
        ]);
        let or = Tag::new(tagn::OR).with_attr("key1", "e").with_attr("key2", "a");
        assert_eq!(
            engine.execute_tag(&or, &mut args, 0),
            TagOutcome::Value(TrValue::from("x"))
        );
        let and = Tag::new(tagn::AND).with_child(get("a")).with_child(get("e"));
        assert_eq!(
            engine.execute_tag(&and, &mut args, 0),
            TagOutcome::Value(TrValue::from(""))
        );
        let single = Tag::new(tagn::AND).with_child(get("a"));
        assert!(!engine.execute_tag(&single, &mut args, 0).is_truthy());
    }

    #[test]
    fn and_stops_before_later_children() {
        let (engine, mut args) = engine_with(&[("e", TrValue::from(""))]);
        let tag = Tag::new(tagn::AND)
            .with_child(get("e"))
            .with_child(Tag::new(tagn::SET).with_attr("key", "ran").with_attr("value", "1"));
        assert!(!engine.execute_tag(&tag, &mut args, 0).is_truthy());
        assert!(args.get_local("ran").is_none());
    }

    #[test]
    fn comparators_cover_keys_and_chains() {
        let (engine, mut args) = engine_with(&[
            ("one", TrValue::Int(1)),
            ("two", TrValue::Float(2.0)),
            ("three", TrValue::Int(3)),
            ("text", TrValue::from("3")),
        ]);
        let pair = |name: &str, left: &str, right: &str| {
            Tag::new(name).with_attr("key1", left).with_attr("key2", right)
        };
        assert!(engine.execute_tag(&pair(tagn::LESS, "one", "two"), &mut args, 0).is_truthy());
        assert!(engine.execute_tag(&pair(tagn::GREATER_EQUAL, "three", "three"), &mut args, 0).is_truthy());
        assert!(engine.execute_tag(&pair(tagn::NOT_EQUAL, "three", "text"), &mut args, 0).is_truthy());
        assert!(!engine.execute_tag(&pair(tagn::LESS, "three", "text"), &mut args, 0).is_truthy());

        let ascending = Tag::new(tagn::LESS)
            .with_child(get("one"))
            .with_child(get("two"))
            .with_child(get("three"));
        assert!(engine.execute_tag(&ascending, &mut args, 0).is_truthy());
        let broken = Tag::new(tagn::LESS_EQUAL)
            .with_child(get("three"))
            .with_child(get("one"))
            .with_child(get("two"));
        assert!(!engine.execute_tag(&broken, &mut args, 0).is_truthy());
    }

    #[test]
    fn not_negates_its_first_child() {
        let (engine, mut args) = engine_with(&[("a", TrValue::from("x"))]);
        let tag = Tag::new(tagn::NOT).with_child(get("a"));
        assert!(!engine.execute_tag(&tag, &mut args, 0).is_truthy());
        let tag = Tag::new(tagn::NOT).with_child(get("missing"));
        assert!(engine.execute_tag(&tag, &mut args, 0).is_truthy());
        assert!(!engine.execute_tag(&Tag::new(tagn::NOT), &mut args, 0).is_truthy());
    }
}
