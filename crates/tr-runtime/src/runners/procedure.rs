use std::rc::Rc;

use tr_core::{mvars, Tag, TagRunError, TrValue};
use tr_parser::parse_tag_file;

use super::{attrn, tagn};
use crate::args::{split_names, Args};
use crate::engine::TagEngine;
use crate::registry::{RunnerResult, TagOutcome};

const SWITCH_PREFIX: &str = "!";
const SWITCH_ON: &str = "1";
const MODULE_EXTENSIONS: [&str; 2] = ["", ".xml"];

pub(super) fn run_procedure(engine: &TagEngine, tag: &Tag, _args: &mut Args, _depth: usize) -> RunnerResult {
    let raw_names = tag.attr(attrn::NAME).unwrap_or_default();
    let names = split_names(raw_names).collect::<Vec<_>>();
    if names.is_empty() {
        return Err(TagRunError::new(
            "ENGINE_ATTR_ILLEGAL",
            format!("Procedure name \"{}\" is illegal.", raw_names),
        ));
    }

    let body = Rc::new(tag.clone());
    for name in &names {
        engine.define_procedure(name, Rc::clone(&body));
    }
    tracing::debug!(names = ?names, "procedure defined");
    Ok(TagOutcome::ok())
}

pub(super) fn run_call(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let name = engine.require_key(tag, args, attrn::NAME)?;
    invoke_procedure(engine, tag, &name, args, depth)
}

/// Calls a procedure only when its `!name` switch is on and the name is privileged here.
pub(super) fn run_cond_call(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let name = engine.require_key(tag, args, attrn::NAME)?;
    let switch = args
        .get_local(&format!("{}{}", SWITCH_PREFIX, name))
        .map(TrValue::to_text);
    if switch.as_deref() != Some(SWITCH_ON) || !args.has_privilege(&name) {
        tracing::debug!(name = %name, "conditional call skipped");
        return Ok(TagOutcome::ok());
    }
    invoke_procedure(engine, tag, &name, args, depth)
}

pub(super) fn run_procedure_privilege(
    engine: &TagEngine,
    tag: &Tag,
    args: &mut Args,
    _depth: usize,
) -> RunnerResult {
    if !args.has_privilege(tagn::PROCEDURE_PRIVILEGE) {
        return Err(TagRunError::new(
            "ENGINE_PRIVILEGE_DENIED",
            "\"procedure_privilege\" is not granted in this scope.",
        ));
    }
    let names = engine.attr_key(tag, args, attrn::NAME);
    let names = split_names(&names).collect::<Vec<_>>();
    if names.is_empty() {
        return Err(TagRunError::new(
            "ENGINE_ATTR_ILLEGAL",
            "\"procedure_privilege\" requires at least one name.",
        ));
    }
    tracing::info!(names = ?names, "privileges granted");
    args.grant_privileges(names);
    Ok(TagOutcome::ok())
}

pub(super) fn run_module(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    let src = engine.require_key(tag, args, attrn::SRC)?;
    let path = MODULE_EXTENSIONS
        .iter()
        .map(|ext| engine.resolve_file(&format!("{}{}", src, ext)))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            TagRunError::new(
                "ENGINE_MODULE_NOT_FOUND",
                format!("Module \"{}\" was not found on the search path.", src),
            )
        })?;

    let module = parse_tag_file(&path)?;
    tracing::debug!(module = %path.display(), "module loaded");
    if !engine.execute_tag(&module, args, depth).is_truthy() {
        return Err(TagRunError::new(
            "ENGINE_MODULE_FAILED",
            format!("Module \"{}\" failed to run.", path.display()),
        ));
    }
    Ok(TagOutcome::ok())
}

fn invoke_procedure(
    engine: &TagEngine,
    tag: &Tag,
    name: &str,
    args: &mut Args,
    depth: usize,
) -> RunnerResult {
    let body = engine.procedure(name).ok_or_else(|| {
        TagRunError::new(
            "ENGINE_PROCEDURE_NOT_FOUND",
            format!("Procedure \"{}\" is not defined.", name),
        )
    })?;
    let pass_through = engine.attr_pass_through(tag, args)?;

    let parameters = tag
        .attrs
        .iter()
        .filter(|(key, _)| {
            key.as_str() != attrn::NAME
                && key.as_str() != attrn::PASS_THROUGH
                && !mvars::is_reserved(key)
        })
        .map(|(key, value)| {
            let value = match value {
                Some(text) => TrValue::String(engine.substitute(args, text)),
                None => TrValue::Null,
            };
            (key.clone(), value)
        })
        .collect::<Vec<_>>();

    let mut copied;
    let scope = if pass_through {
        args
    } else {
        copied = args.clone();
        &mut copied
    };
    for (key, value) in parameters {
        scope.set(key, value);
    }

    for child in body.tags() {
        let outcome = engine.execute_tag(child, scope, depth);
        if child.name == tagn::RETURN {
            return Ok(outcome);
        }
        if !outcome.is_truthy() {
            tracing::debug!(name = %name, "procedure exited on break");
            return Ok(TagOutcome::fail());
        }
    }
    Ok(TagOutcome::ok())
}
