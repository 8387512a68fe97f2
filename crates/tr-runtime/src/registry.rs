use std::collections::BTreeMap;
use std::rc::Rc;

use tr_core::{Tag, TagRunError, TrValue};

use crate::args::Args;
use crate::engine::TagEngine;

/// What a runner hands back to its parent block.
///
/// A falsy outcome tells the enclosing block to stop. `Branch` is produced by
/// `when`/`when_others` so that `case` can tell "ran fine but did not match"
/// apart from a match.
#[derive(Debug, Clone, PartialEq)]
pub enum TagOutcome {
    Value(TrValue),
    Branch { success: bool, matched: bool },
}

impl TagOutcome {
    pub fn ok() -> Self {
        Self::Value(TrValue::Bool(true))
    }

    pub fn fail() -> Self {
        Self::Value(TrValue::Bool(false))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Value(value) => value.is_truthy(),
            Self::Branch { success, .. } => *success,
        }
    }

    pub fn into_value(self) -> TrValue {
        match self {
            Self::Value(value) => value,
            Self::Branch { success, .. } => TrValue::Bool(success),
        }
    }
}

impl From<bool> for TagOutcome {
    fn from(value: bool) -> Self {
        Self::Value(TrValue::Bool(value))
    }
}

impl From<TrValue> for TagOutcome {
    fn from(value: TrValue) -> Self {
        Self::Value(value)
    }
}

pub type RunnerResult = Result<TagOutcome, TagRunError>;

pub trait TagRunner {
    fn run(&self, engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult;
}

impl<F> TagRunner for F
where
    F: Fn(&TagEngine, &Tag, &mut Args, usize) -> RunnerResult,
{
    fn run(&self, engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
        self(engine, tag, args, depth)
    }
}

/// Tag name to runner table. Registering a name again replaces the previous runner.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: BTreeMap<String, Rc<dyn TagRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        runner: impl TagRunner + 'static,
    ) -> Option<Rc<dyn TagRunner>> {
        self.runners.insert(name.into(), Rc::new(runner))
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn TagRunner>> {
        self.runners.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runners.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(_: &TagEngine, _: &Tag, _: &mut Args, _: usize) -> RunnerResult {
        Ok(TrValue::Int(42).into())
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = RunnerRegistry::new();
        assert!(registry.register("x", answer).is_none());
        assert!(registry
            .register("x", |_: &TagEngine, _: &Tag, _: &mut Args, _: usize| {
                Ok(TagOutcome::fail())
            })
            .is_some());
        assert_eq!(registry.len(), 1);

        let engine = TagEngine::default();
        let runner = registry.get("x").expect("runner registered");
        let outcome = runner
            .run(&engine, &Tag::new("x"), &mut Args::new(), 1)
            .expect("runner should succeed");
        assert_eq!(outcome, TagOutcome::fail());
    }

    #[test]
    fn branch_truthiness_is_its_success_flag() {
        let matched_but_failed = TagOutcome::Branch {
            success: false,
            matched: true,
        };
        assert!(!matched_but_failed.is_truthy());
        assert_eq!(matched_but_failed.into_value(), TrValue::Bool(false));
        assert!(TagOutcome::Branch {
            success: true,
            matched: false
        }
        .is_truthy());
        assert!(!TagOutcome::from(TrValue::string("")).is_truthy());
    }
}
