use std::collections::BTreeSet;

use tr_core::{mvars, TrValue, VarMap};

/// Execution context handed to every runner: the local variable mapping.
///
/// Cloning produces a fully independent copy, which is how nested blocks get
/// their own scope. Blocks marked `pass_through` reuse the caller's `Args`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub vars: VarMap,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars(vars: VarMap) -> Self {
        Self { vars }
    }

    pub fn get_local(&self, key: &str) -> Option<&TrValue> {
        self.vars.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: TrValue) {
        self.vars.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<TrValue> {
        self.vars.remove(key)
    }

    /// Procedure names allowed to run privileged operations from this scope.
    ///
    /// Only the local mapping is consulted; the set may be stored as an array
    /// of names or as a comma-separated string.
    pub fn privileges(&self) -> BTreeSet<String> {
        match self.vars.get(mvars::PROC_PRIVILEGE) {
            Some(TrValue::Array(values)) => values
                .iter()
                .map(TrValue::to_text)
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            Some(TrValue::String(value)) => split_names(value).collect(),
            _ => BTreeSet::new(),
        }
    }

    pub fn has_privilege(&self, name: &str) -> bool {
        self.privileges().contains(name)
    }

    pub fn grant_privileges<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut privileges = self.privileges();
        privileges.extend(names.into_iter().map(Into::into));
        self.vars.insert(
            mvars::PROC_PRIVILEGE.to_string(),
            TrValue::Array(privileges.into_iter().map(TrValue::String).collect()),
        );
    }
}

pub(crate) fn split_names(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_isolates_later_mutations() {
        let mut parent = Args::new();
        parent.set("k", TrValue::from("before"));
        let mut child = parent.clone();
        child.set("k", TrValue::from("after"));
        assert_eq!(parent.get_local("k"), Some(&TrValue::from("before")));
        assert_eq!(child.get_local("k"), Some(&TrValue::from("after")));
    }

    #[test]
    fn privileges_accept_arrays_and_comma_lists() {
        let mut args = Args::new();
        assert!(args.privileges().is_empty());

        args.set(mvars::PROC_PRIVILEGE, TrValue::from(" a, b ,,c"));
        assert!(args.has_privilege("b"));
        assert_eq!(args.privileges().len(), 3);

        args.grant_privileges(["d"]);
        assert!(matches!(
            args.get_local(mvars::PROC_PRIVILEGE),
            Some(TrValue::Array(values)) if values.len() == 4
        ));
        assert!(args.has_privilege("a"));
        assert!(args.has_privilege("d"));
    }

    #[test]
    fn privileges_survive_copies_taken_after_the_grant() {
        let mut parent = Args::new();
        let before = parent.clone();
        parent.grant_privileges(["call_os_cmd"]);
        let after = parent.clone();
        assert!(!before.has_privilege("call_os_cmd"));
        assert!(after.has_privilege("call_os_cmd"));
    }
}
