use std::fmt::Display;

use tr_core::TagRunError;

fn map_error(code: &'static str, error: impl Display) -> TagRunError {
    TagRunError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: TagRunError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub(crate) fn map_cli_set_invalid(raw: &str) -> TagRunError {
    map_error(
        "CLI_SET_INVALID",
        format!("Expected key=value, found \"{}\".", raw),
    )
}

pub(crate) fn map_cli_source_scan(error: walkdir::Error) -> TagRunError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_strip(error: std::path::StripPrefixError) -> TagRunError {
    map_error("CLI_SOURCE_SCAN", error)
}
