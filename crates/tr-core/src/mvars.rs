//! Interpreter-owned variable names.
//!
//! Records loaded from external files never overwrite these: any field whose
//! name is listed here is dropped before it is merged into a scope.

pub const LOADED_DATA_COUNT: &str = "__loaded_data_count__";
pub const LOADED_DATA_ITEM_INDEX: &str = "__loaded_data_item_index__";
pub const LOADED_DATA_COLS: &str = "__loaded_data_cols__";
pub const EXCEPTIONS_HANDLER: &str = "__exceptions_handler__";
pub const DEBUG: &str = "__debug__";
pub const DEPTH: &str = "__depth__";
pub const LOG_DATETIME: &str = "__log_datetime__";
pub const FOR_IN_KEY: &str = "__for_in_key__";
pub const FOR_IN_VALUE: &str = "__for_in_value__";
pub const PROC_PRIVILEGE: &str = "__proc_privilege__";
pub const SCRIPT_NAME: &str = "__script_name__";
pub const WORKING_DIR: &str = "__working_dir__";

pub const ALL: [&str; 12] = [
    LOADED_DATA_COUNT,
    LOADED_DATA_ITEM_INDEX,
    LOADED_DATA_COLS,
    EXCEPTIONS_HANDLER,
    DEBUG,
    DEPTH,
    LOG_DATETIME,
    FOR_IN_KEY,
    FOR_IN_VALUE,
    PROC_PRIVILEGE,
    SCRIPT_NAME,
    WORKING_DIR,
];

pub fn is_reserved(name: &str) -> bool {
    ALL.contains(&name)
}
