use tr_core::{integral_i64, mvars, Tag, TagRunError, TrValue};

use super::{attrn, tagn};
use crate::args::Args;
use crate::engine::TagEngine;
use crate::registry::{RunnerResult, TagOutcome};

const SET_TYPE_VALUE: &str = "value";
const SET_TYPE_OBJECT: &str = "object";
const SET_TYPE_EVAL: &str = "eval";

pub(super) fn run_set(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let set_type = engine
        .attr_text(tag, args, attrn::TYPE)
        .unwrap_or_else(|| SET_TYPE_VALUE.to_string());
    let key = engine.require_key(tag, args, attrn::KEY)?;
    let global = engine.attr_bool(tag, args, attrn::GLOBAL, false)?;

    let value = match set_type.trim() {
        SET_TYPE_VALUE => engine
            .attr_text(tag, args, attrn::VALUE)
            .filter(|value| !value.is_empty())
            .map(TrValue::String)
            .unwrap_or_default(),
        SET_TYPE_OBJECT => {
            let child = tag.first_tag().ok_or_else(|| {
                TagRunError::new(
                    "ENGINE_SET_CONTENT_MISSING",
                    "\"set\" of type \"object\" needs a child tag producing the value.",
                )
            })?;
            engine.execute_tag(child, args, depth).into_value()
        }
        SET_TYPE_EVAL => {
            return Err(TagRunError::new(
                "ENGINE_SET_TYPE_UNSUPPORTED",
                "\"set\" of type \"eval\" is not supported.",
            ))
        }
        other => {
            return Err(TagRunError::new(
                "ENGINE_SET_TYPE_UNSUPPORTED",
                format!("Unknown \"set\" type \"{}\".", other),
            ))
        }
    };

    tracing::debug!(key = %key, kind = value.type_name(), global, "set");
    engine.store(args, &key, value, global)?;
    Ok(TagOutcome::ok())
}

/// `set_int`, `set_num` and `set_str`: every attribute becomes a typed local.
///
/// Nothing is written unless all attributes convert.
pub(super) fn run_set_typed(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    let mut pending = Vec::with_capacity(tag.attrs.len());
    for (key, raw) in &tag.attrs {
        if key == mvars::PROC_PRIVILEGE {
            return Err(TagRunError::new(
                "ENGINE_RESERVED_VAR",
                format!("Variable \"{}\" cannot be assigned by scripts.", key),
            ));
        }
        let text = raw.as_deref().map(|raw| engine.substitute(args, raw));
        let value = convert_typed(&tag.name, key, text)?;
        pending.push((key.clone(), value));
    }

    for (key, value) in pending {
        args.set(key, value);
    }
    Ok(TagOutcome::ok())
}

fn convert_typed(tag_name: &str, key: &str, text: Option<String>) -> Result<TrValue, TagRunError> {
    let invalid = |expected: &str, text: &str| {
        TagRunError::new(
            "ENGINE_VALUE_CONVERT",
            format!("\"{}\" of \"{}\" is not {}: \"{}\".", key, tag_name, expected, text),
        )
    };

    match tag_name {
        tagn::SET_STR => Ok(text.map(TrValue::String).unwrap_or_default()),
        tagn::SET_INT => {
            let text = text.ok_or_else(|| invalid("an integer", "None"))?;
            let trimmed = text.trim();
            if let Ok(value) = trimmed.parse::<i64>() {
                return Ok(TrValue::Int(value));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(|value| integral_i64(value.trunc()))
                .map(TrValue::Int)
                .ok_or_else(|| invalid("an integer", &text))
        }
        tagn::SET_NUM => {
            let text = text.ok_or_else(|| invalid("a number", "None"))?;
            text.trim()
                .parse::<f64>()
                .map(TrValue::Float)
                .map_err(|_| invalid("a number", &text))
        }
        other => Err(TagRunError::new(
            "ENGINE_RUNNER_NOT_FOUND",
            format!("\"{}\" is not a typed assignment tag.", other),
        )),
    }
}

/// `get` and `return`: read a variable, optionally indexing into it.
pub(super) fn run_get(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    let key = engine.attr_key(tag, args, attrn::KEY);
    let default = engine
        .attr_text(tag, args, attrn::DEFAULT_VALUE)
        .map(TrValue::String);

    if key.is_empty() {
        return default.map(TagOutcome::from).ok_or_else(|| {
            TagRunError::new(
                "ENGINE_ATTR_ILLEGAL",
                format!("\"{}\" requires a \"key\" or a \"defvalue\".", tag.name),
            )
        });
    }

    let default = default.unwrap_or_default();
    let value = engine
        .get_var(args, &key)
        .unwrap_or_else(|| default.clone());

    if let Some(dict_key) = engine.attr_text(tag, args, attrn::DICT_KEY).filter(|k| !k.is_empty()) {
        let TrValue::Map(entries) = value else {
            return Err(TagRunError::new(
                "ENGINE_VALUE_NOT_MAP",
                format!("Variable \"{}\" holds a {}, not a map.", key, value.type_name()),
            ));
        };
        return Ok(entries.get(&dict_key).cloned().unwrap_or(default).into());
    }

    if let Some(index) = engine.attr_text(tag, args, attrn::INDEX).filter(|i| !i.is_empty()) {
        let item = index_value(&key, &value, &index)?;
        return Ok(if item.is_truthy() { item } else { default }.into());
    }

    Ok(value.into())
}

fn index_value(key: &str, value: &TrValue, index: &str) -> Result<TrValue, TagRunError> {
    let position = index.trim().parse::<i64>().map_err(|_| {
        TagRunError::new(
            "ENGINE_ATTR_ILLEGAL",
            format!("Index \"{}\" is not an integer.", index),
        )
    })?;
    let items = match value {
        TrValue::Array(values) => values.clone(),
        TrValue::String(text) => text.chars().map(|ch| TrValue::String(ch.to_string())).collect(),
        other => {
            return Err(TagRunError::new(
                "ENGINE_VALUE_NOT_INDEXABLE",
                format!("Variable \"{}\" holds a {} which cannot be indexed.", key, other.type_name()),
            ))
        }
    };
    let resolved = if position < 0 {
        items.len() as i64 + position
    } else {
        position
    };
    usize::try_from(resolved)
        .ok()
        .and_then(|resolved| items.get(resolved).cloned())
        .ok_or_else(|| {
            TagRunError::new(
                "ENGINE_INDEX_OUT_OF_RANGE",
                format!("Index {} is out of range for \"{}\".", position, key),
            )
        })
}
