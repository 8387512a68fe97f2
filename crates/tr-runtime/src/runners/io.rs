use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tr_core::{IterCursor, Tag, TagRunError, TrValue};

use super::attrn;
use super::data::{check_encoding, read_text};
use crate::args::Args;
use crate::engine::TagEngine;
use crate::handles::MemoryHandle;
use crate::registry::{RunnerResult, TagOutcome};
use crate::value_path::{parse_ref_path, read_nested_path};

const HANDLE_PREFIX: char = '@';

pub(super) fn run_iter_make(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    let key = engine.require_key(tag, args, attrn::KEY)?;
    let src = engine.require_key(tag, args, attrn::SRC)?;
    let source = engine.get_var(args, &src).unwrap_or_default();

    let items = match source {
        TrValue::Array(values) => values,
        TrValue::Map(entries) => entries.into_keys().map(TrValue::String).collect(),
        TrValue::String(text) => text.chars().map(|ch| TrValue::String(ch.to_string())).collect(),
        TrValue::Iter(cursor) => cursor.remaining().to_vec(),
        other => {
            return Err(TagRunError::new(
                "ENGINE_VALUE_NOT_ITERABLE",
                format!("Variable \"{}\" holds a {} which cannot be iterated.", src, other.type_name()),
            ))
        }
    };
    tracing::debug!(key = %key, src = %src, items = items.len(), "iterator made");
    args.set(key, TrValue::Iter(IterCursor::new(items)));
    Ok(TagOutcome::ok())
}

/// Advances the cursor under `key`. Yields the item, or `true` once exhausted.
pub(super) fn run_iter_next(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    let key = engine.require_key(tag, args, attrn::KEY)?;
    let global = args.get_local(&key).is_none();
    let value = engine.get_var(args, &key).unwrap_or_default();
    let TrValue::Iter(mut cursor) = value else {
        return Err(TagRunError::new(
            "ENGINE_VALUE_NOT_ITERATOR",
            format!("Variable \"{}\" holds a {}, not an iterator.", key, value.type_name()),
        ));
    };

    let item = cursor.next();
    engine.set_var(args, &key, TrValue::Iter(cursor), global);
    Ok(item.unwrap_or(TrValue::Bool(true)).into())
}

pub(super) fn run_json_load(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    check_encoding(engine, tag, args)?;
    let text = read_source(engine, tag, args)?;
    let json = serde_json::from_str::<serde_json::Value>(&text).map_err(|error| {
        TagRunError::new(
            "JSON_PARSE",
            format!("\"{}\" could not parse JSON: {}", tag.name, error),
        )
    })?;
    let value = TrValue::from_json(json);

    let to_key = engine.attr_key(tag, args, attrn::TO_KEY);
    if !to_key.is_empty() {
        tracing::debug!(key = %to_key, kind = value.type_name(), "json loaded");
        engine.store(args, &to_key, value, false)?;
        return Ok(TagOutcome::ok());
    }
    Ok(value.into())
}

pub(super) fn run_json_dump(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    check_encoding(engine, tag, args)?;
    let key = engine.attr_key(tag, args, attrn::KEY);
    let value = if key.is_empty() {
        TrValue::Null
    } else {
        engine.get_var(args, &key).unwrap_or_default()
    };
    let text = value.to_json().to_string();
    write_sink(engine, tag, args, text)
}

/// Renders `{{ name }}` and `{{ a.b }}` placeholders from the local-over-global view.
pub(super) fn run_template(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    check_encoding(engine, tag, args)?;
    let source = read_source(engine, tag, args)?;
    let rendered = render_template(engine, args, &source);
    tracing::debug!(bytes = rendered.len(), "template rendered");
    write_sink(engine, tag, args, rendered)
}

fn render_template(engine: &TagEngine, args: &Args, source: &str) -> String {
    let vars = engine.combined_vars(args);
    placeholder_pattern()
        .replace_all(source, |captures: &Captures<'_>| {
            let path = parse_ref_path(&captures[1]);
            let Some((head, rest)) = path.split_first() else {
                return String::new();
            };
            vars.get(head)
                .and_then(|root| read_nested_path(root, rest))
                .filter(|value| !value.is_null())
                .map(TrValue::to_text)
                .unwrap_or_default()
        })
        .into_owned()
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][\w.]*)\s*\}\}")
            .unwrap_or_else(|error| panic!("placeholder pattern should compile: {}", error))
    })
}

/// Text from `key`, `content`, `_from_file` or the tag's own text, in that order.
fn read_source(engine: &TagEngine, tag: &Tag, args: &Args) -> Result<String, TagRunError> {
    let key = engine.attr_key(tag, args, attrn::KEY);
    if !key.is_empty() {
        let value = engine.get_var(args, &key).unwrap_or_default();
        return match value {
            TrValue::String(text) => Ok(text),
            other => Err(TagRunError::new(
                "ENGINE_VALUE_NOT_STRING",
                format!("Variable \"{}\" holds a {}, not text.", key, other.type_name()),
            )),
        };
    }
    if let Some(content) = engine.attr_text(tag, args, attrn::CONTENT) {
        return Ok(content);
    }
    let from_file = engine.attr_key(tag, args, attrn::FROM_FILE);
    if !from_file.is_empty() {
        return match file_ref(engine, &from_file)? {
            FileRef::Handle(handle) => Ok(handle.contents()),
            FileRef::Path(_) => read_text(&engine.resolve_file(&from_file)),
        };
    }
    let text = tag.text();
    if text.trim().is_empty() {
        return Err(TagRunError::new(
            "ENGINE_SOURCE_MISSING",
            format!("\"{}\" needs \"key\", \"content\", \"_from_file\" or inline text.", tag.name),
        ));
    }
    Ok(text)
}

/// Delivers `text` to `_to_key`, `_to_file` or the caller, in that order.
fn write_sink(engine: &TagEngine, tag: &Tag, args: &mut Args, text: String) -> RunnerResult {
    let to_key = engine.attr_key(tag, args, attrn::TO_KEY);
    if !to_key.is_empty() {
        engine.store(args, &to_key, TrValue::String(text), false)?;
        return Ok(TagOutcome::ok());
    }

    let to_file = engine.attr_key(tag, args, attrn::TO_FILE);
    if to_file.is_empty() {
        return Ok(TrValue::String(text).into());
    }
    match file_ref(engine, &to_file)? {
        FileRef::Handle(handle) => handle.write(&text),
        FileRef::Path(path) => {
            let path = engine.primary_dir().join(path);
            let lock = engine.output_locks().lock_for(&path);
            let _guard = lock.lock();
            fs::write(&path, text.as_bytes()).map_err(|error| {
                TagRunError::new(
                    "IO_WRITE",
                    format!("Cannot write \"{}\": {}", path.display(), error),
                )
            })?;
            tracing::debug!(path = %path.display(), bytes = text.len(), "text written");
        }
    }
    Ok(TagOutcome::ok())
}

enum FileRef {
    Handle(MemoryHandle),
    Path(PathBuf),
}

fn file_ref(engine: &TagEngine, reference: &str) -> Result<FileRef, TagRunError> {
    let Some(name) = reference.strip_prefix(HANDLE_PREFIX) else {
        return Ok(FileRef::Path(PathBuf::from(reference)));
    };
    engine.handle(name).map(FileRef::Handle).ok_or_else(|| {
        TagRunError::new(
            "ENGINE_HANDLE_NOT_FOUND",
            format!("No handle named \"{}\" is registered.", name),
        )
    })
}
