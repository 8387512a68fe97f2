use tr_core::{Tag, TagRunError};

use crate::args::Args;
use crate::engine::TagEngine;
use crate::runners::attrn;

impl TagEngine {
    /// Attribute value after `$%name%$` substitution against the caller's scope.
    pub(crate) fn attr_text(&self, tag: &Tag, args: &Args, name: &str) -> Option<String> {
        tag.attr(name).map(|value| self.substitute(args, value))
    }

    /// Substituted and trimmed; empty when absent.
    pub(crate) fn attr_key(&self, tag: &Tag, args: &Args, name: &str) -> String {
        self.attr_text(tag, args, name)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }

    pub(crate) fn require_key(
        &self,
        tag: &Tag,
        args: &Args,
        name: &str,
    ) -> Result<String, TagRunError> {
        let key = self.attr_key(tag, args, name);
        if key.is_empty() {
            return Err(TagRunError::new(
                "ENGINE_ATTR_ILLEGAL",
                format!("Tag \"{}\" requires a non-empty \"{}\" attribute.", tag.name, name),
            ));
        }
        Ok(key)
    }

    pub(crate) fn attr_bool(
        &self,
        tag: &Tag,
        args: &Args,
        name: &str,
        default: bool,
    ) -> Result<bool, TagRunError> {
        let Some(value) = self.attr_text(tag, args, name) else {
            return Ok(default);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(TagRunError::new(
                "ENGINE_ATTR_ILLEGAL",
                format!(
                    "Attribute \"{}\" of tag \"{}\" expects a boolean, got \"{}\".",
                    name, tag.name, other
                ),
            )),
        }
    }

    pub(crate) fn attr_pass_through(&self, tag: &Tag, args: &Args) -> Result<bool, TagRunError> {
        self.attr_bool(tag, args, attrn::PASS_THROUGH, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_core::TrValue;

    #[test]
    fn attr_key_substitutes_and_trims() {
        let engine = TagEngine::default();
        let mut args = Args::new();
        args.set("which", TrValue::from("x"));
        let tag = Tag::new("get")
            .with_attr("key", "  var_$%which%$ ")
            .with_null_attr("nil");

        assert_eq!(engine.attr_key(&tag, &args, "key"), "var_x");
        assert_eq!(engine.attr_key(&tag, &args, "nil"), "");
        assert_eq!(
            engine
                .require_key(&tag, &args, "missing")
                .expect_err("missing key")
                .code,
            "ENGINE_ATTR_ILLEGAL"
        );
    }

    #[test]
    fn attr_bool_accepts_common_spellings() {
        let engine = TagEngine::default();
        let args = Args::new();
        let tag = Tag::new("sub")
            .with_attr("a", "True")
            .with_attr("b", "0")
            .with_attr("c", "maybe");

        assert!(engine.attr_bool(&tag, &args, "a", false).expect("a"));
        assert!(!engine.attr_bool(&tag, &args, "b", true).expect("b"));
        assert!(engine.attr_bool(&tag, &args, "absent", true).expect("absent"));
        assert!(engine.attr_bool(&tag, &args, "c", false).is_err());
        assert!(!engine.attr_pass_through(&tag, &args).expect("default"));
    }
}
