use std::sync::OnceLock;

use regex::Regex;
use tr_core::{TrValue, VarMap};

/// Reads `key` from the local mapping, falling back to the global one.
pub fn lookup(local: &VarMap, global: &VarMap, key: &str) -> Option<TrValue> {
    local.get(key).or_else(|| global.get(key)).cloned()
}

pub fn assign(local: &mut VarMap, global: &mut VarMap, key: &str, value: TrValue, to_global: bool) {
    if to_global {
        global.insert(key.to_string(), value);
    } else {
        local.insert(key.to_string(), value);
    }
}

/// Replaces every `$%name%$` marker with the text of the named variable.
///
/// References that do not resolve, or resolve to null, stay in the output
/// verbatim. Substituted text is not scanned again.
pub fn substitute(local: &VarMap, global: &VarMap, text: &str) -> String {
    let regex = reference_regex();
    let mut output = String::with_capacity(text.len());
    let mut last_index = 0usize;
    for captures in regex.captures_iter(text) {
        let (Some(full), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.push_str(&text[last_index..full.start()]);
        match lookup(local, global, name.as_str()) {
            Some(value) if !value.is_null() => output.push_str(&value.to_text()),
            _ => output.push_str(full.as_str()),
        }
        last_index = full.end();
    }
    output.push_str(&text[last_index..]);
    output
}

fn reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\$%(.+?)%\$").unwrap_or_else(|error| panic!("reference regex: {error}"))
    })
}
