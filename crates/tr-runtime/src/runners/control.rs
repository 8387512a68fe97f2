use tr_core::{mvars, Tag, TagRunError, TrValue};

use super::{attrn, is_assert_family, tagn};
use crate::args::Args;
use crate::engine::TagEngine;
use crate::registry::{RunnerResult, TagOutcome};

pub(super) fn run_root(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let mut scope = args.clone();
    for child in tag.tags() {
        if !engine.execute_tag(child, &mut scope, depth).is_truthy() {
            return Err(TagRunError::new(
                "ENGINE_SCRIPT_FAILED",
                format!("Script aborted at tag \"{}\".", child.name),
            ));
        }
    }
    Ok(TagOutcome::ok())
}

pub(super) fn run_sub(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let pass_through = engine.attr_pass_through(tag, args)?;
    let mut copied;
    let scope = if pass_through {
        args
    } else {
        copied = args.clone();
        &mut copied
    };

    if !run_block(engine, tag, scope, depth) {
        tracing::debug!(depth, "sub exited on break");
    }
    Ok(TagOutcome::ok())
}

pub(super) fn run_loop(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let pass_through = engine.attr_pass_through(tag, args)?;
    let mut copied;
    let scope = if pass_through {
        args
    } else {
        copied = args.clone();
        &mut copied
    };

    let mut rounds = 0u64;
    while run_block(engine, tag, scope, depth) {
        rounds += 1;
    }
    tracing::debug!(rounds, "loop break");
    Ok(TagOutcome::ok())
}

pub(super) fn run_for_in(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let pass_through = engine.attr_pass_through(tag, args)?;
    if tag.has_attr(attrn::KEY_EVAL) {
        return Err(TagRunError::new(
            "ENGINE_ATTR_UNSUPPORTED",
            "Attribute \"key_eval\" is not supported; bind the value with \"key\" instead.",
        ));
    }
    let key = engine.require_key(tag, args, attrn::KEY)?;
    let source = engine.get_var(args, &key).unwrap_or_default();
    let entries = iteration_entries(&key, source)?;

    let mut copied;
    let scope = if pass_through {
        args
    } else {
        copied = args.clone();
        &mut copied
    };

    for (entry_key, entry_value) in entries {
        scope.set(mvars::FOR_IN_KEY, entry_key);
        scope.set(mvars::FOR_IN_VALUE, entry_value);
        if !run_block(engine, tag, scope, depth) {
            tracing::debug!(key = %key, "for_in break");
            break;
        }
    }
    Ok(TagOutcome::ok())
}

fn iteration_entries(key: &str, source: TrValue) -> Result<Vec<(TrValue, TrValue)>, TagRunError> {
    let indexed = |values: Vec<TrValue>| {
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| (TrValue::Int(index as i64), value))
            .collect()
    };
    match source {
        TrValue::Map(entries) => Ok(entries
            .into_iter()
            .map(|(entry_key, value)| (TrValue::String(entry_key), value))
            .collect()),
        TrValue::Array(values) => Ok(indexed(values)),
        TrValue::String(text) => Ok(indexed(
            text.chars().map(|ch| TrValue::String(ch.to_string())).collect(),
        )),
        TrValue::Iter(cursor) => Ok(indexed(cursor.collect())),
        other => Err(TagRunError::new(
            "ENGINE_VALUE_NOT_ITERABLE",
            format!("Variable \"{}\" holds a {} which cannot be iterated.", key, other.type_name()),
        )),
    }
}

pub(super) fn run_if_elif(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let pass_through = engine.attr_pass_through(tag, args)?;
    let shorthand = condition_shorthand(tag);

    let mut condition = shorthand.as_ref();
    let mut then_branch = None;
    let mut elif_branch = None;
    let mut else_branch = None;
    for child in tag.tags() {
        match child.name.as_str() {
            tagn::THEN => then_branch = Some(child),
            tagn::ELIF => elif_branch = Some(child),
            tagn::ELSE => else_branch = Some(child),
            name if is_assert_family(name) && condition.is_none() => condition = Some(child),
            _ => {}
        }
    }

    let matched = {
        let mut copied;
        let scope = if pass_through {
            &mut *args
        } else {
            copied = args.clone();
            &mut copied
        };
        condition
            .map(|condition| engine.execute_tag(condition, scope, depth).is_truthy())
            .unwrap_or(false)
    };

    if then_branch.is_none() && elif_branch.is_none() && else_branch.is_none() {
        return Ok(TagOutcome::fail());
    }

    let branch = if matched {
        then_branch
    } else {
        elif_branch.or(else_branch)
    };
    let Some(branch) = branch else {
        return Ok(TagOutcome::ok());
    };

    let mut copied;
    let scope = if pass_through {
        args
    } else {
        copied = args.clone();
        &mut copied
    };
    Ok(engine.execute_tag(branch, scope, depth))
}

pub(super) fn run_then_else(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    for child in tag.tags() {
        if !engine.execute_tag(child, args, depth).is_truthy() {
            return Err(TagRunError::new(
                "ENGINE_BRANCH_FAILED",
                format!("Tag \"{}\" failed inside \"{}\".", child.name, tag.name),
            ));
        }
    }
    Ok(TagOutcome::ok())
}

pub(super) fn run_case(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let pass_through = engine.attr_pass_through(tag, args)?;
    let mut copied;
    let scope = if pass_through {
        args
    } else {
        copied = args.clone();
        &mut copied
    };

    for child in tag.tags() {
        if child.name != tagn::WHEN && child.name != tagn::WHEN_OTHERS {
            return Err(TagRunError::new(
                "ENGINE_CASE_CHILD_ILLEGAL",
                format!(
                    "Only \"when\" and \"when_others\" may appear in \"case\", found \"{}\".",
                    child.name
                ),
            ));
        }
        let (success, matched) = match engine.execute_tag(child, scope, depth) {
            TagOutcome::Branch { success, matched } => (success, matched),
            TagOutcome::Value(value) => (value.is_truthy(), false),
        };
        if !success {
            return Err(TagRunError::new(
                "ENGINE_BRANCH_FAILED",
                format!("Branch \"{}\" of \"case\" failed.", child.name),
            ));
        }
        if matched {
            break;
        }
    }
    Ok(TagOutcome::ok())
}

pub(super) fn run_when(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let (matched, body_start) = if tag.name == tagn::WHEN_OTHERS {
        (true, 0)
    } else if let Some(condition) = condition_shorthand(tag) {
        (engine.execute_tag(&condition, args, depth).is_truthy(), 0)
    } else {
        let condition = tag
            .first_tag()
            .filter(|child| is_assert_family(&child.name))
            .ok_or_else(|| {
                TagRunError::new(
                    "ENGINE_WHEN_CONDITION_MISSING",
                    "\"when\" needs an \"_assert\" attribute or a condition as its first tag.",
                )
            })?;
        (engine.execute_tag(condition, args, depth).is_truthy(), 1)
    };

    if matched {
        for child in tag.tags().skip(body_start) {
            if !engine.execute_tag(child, args, depth).is_truthy() {
                return Err(TagRunError::new(
                    "ENGINE_BRANCH_FAILED",
                    format!("Tag \"{}\" failed inside \"{}\".", child.name, tag.name),
                ));
            }
        }
    }
    Ok(TagOutcome::Branch {
        success: true,
        matched,
    })
}

/// Runs the tag's children in order and reports whether all of them succeeded.
pub(super) fn run_block(engine: &TagEngine, tag: &Tag, scope: &mut Args, depth: usize) -> bool {
    tag.tags()
        .all(|child| engine.execute_tag(child, scope, depth).is_truthy())
}

/// `_assert="assert"` builds a condition tag of that name carrying the owner's attributes.
fn condition_shorthand(tag: &Tag) -> Option<Tag> {
    let name = tag.attr(attrn::ASSERT)?.trim();
    if name.is_empty() {
        return None;
    }
    let mut condition = Tag::new(name).with_location(tag.location.clone());
    condition.attrs = tag.attrs.clone();
    Some(condition)
}
