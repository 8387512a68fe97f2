mod control;
mod data;
mod io;
mod logic;
mod os;
mod procedure;
mod vars;

use crate::registry::RunnerRegistry;

/// Built-in tag names.
pub mod tagn {
    pub const ROOT: &str = "root";
    pub const SUB: &str = "sub";
    pub const LOOP: &str = "loop";
    pub const FOR_IN: &str = "for_in";
    pub const IF: &str = "if";
    pub const ELIF: &str = "elif";
    pub const THEN: &str = "then";
    pub const ELSE: &str = "else";
    pub const CASE: &str = "case";
    pub const WHEN: &str = "when";
    pub const WHEN_OTHERS: &str = "when_others";
    pub const ASSERT: &str = "assert";
    pub const ASSERT_NOT: &str = "assert_not";
    pub const ASSERT_IN: &str = "assert_in";
    pub const ASSERT_NOT_IN: &str = "assert_not_in";
    pub const NOT: &str = "not";
    pub const EQUAL: &str = "equal";
    pub const NOT_EQUAL: &str = "not_equal";
    pub const LESS: &str = "less";
    pub const LESS_EQUAL: &str = "less_equal";
    pub const GREATER: &str = "greater";
    pub const GREATER_EQUAL: &str = "greater_equal";
    pub const AND: &str = "and";
    pub const OR: &str = "or";
    pub const MODULE: &str = "module";
    pub const PROCEDURE: &str = "procedure";
    pub const PROCEDURE_PRIVILEGE: &str = "procedure_privilege";
    pub const CALL: &str = "call";
    pub const COND_CALL: &str = "cond_call";
    pub const RETURN: &str = "return";
    pub const SET: &str = "set";
    pub const SET_INT: &str = "set_int";
    pub const SET_NUM: &str = "set_num";
    pub const SET_STR: &str = "set_str";
    pub const GET: &str = "get";
    pub const LOAD_VARS: &str = "load_vars";
    pub const LOAD_DATA: &str = "load_data";
    pub const OUTPUT: &str = "output";
    pub const ITER_MAKE: &str = "iter_make";
    pub const ITER_NEXT: &str = "iter_next";
    pub const HANDLE_EXCEPTIONS: &str = "handle_exceptions";
    pub const JSON_LOAD: &str = "json_load";
    pub const JSON_DUMP: &str = "json_dump";
    pub const TEMPLATE: &str = "template";
    pub const CALL_OS_CMD: &str = "call_os_cmd";
}

/// Attribute names read by the built-in runners.
pub mod attrn {
    pub const NAME: &str = "name";
    pub const SRC: &str = "src";
    pub const KEY: &str = "key";
    pub const KEY_EVAL: &str = "key_eval";
    pub const KEY1: &str = "key1";
    pub const KEY2: &str = "key2";
    pub const VALUE: &str = "value";
    pub const DEFAULT_VALUE: &str = "defvalue";
    pub const INDEX: &str = "index";
    pub const DICT_KEY: &str = "dict_key";
    pub const TYPE: &str = "type";
    pub const COLS: &str = "cols";
    pub const GLOBAL: &str = "global";
    pub const PASS_THROUGH: &str = "pass_through";
    pub const DEBUG: &str = "debug";
    pub const AUTO_STRIP: &str = "auto_strip";
    pub const ALLOW_NONE: &str = "allow_none";
    pub const MODE: &str = "mode";
    pub const NEWLINE: &str = "newline";
    pub const ENCODING: &str = "encoding";
    pub const CONTENT: &str = "content";
    pub const FROM_FILE: &str = "_from_file";
    pub const TO_FILE: &str = "_to_file";
    pub const TO_KEY: &str = "_to_key";
    pub const ASSERT: &str = "_assert";
    pub const CMD: &str = "cmd";
    pub const ARGS: &str = "args";
}

pub fn register_builtin_runners(registry: &mut RunnerRegistry) {
    registry.register(tagn::ROOT, control::run_root);
    registry.register(tagn::SUB, control::run_sub);
    registry.register(tagn::LOOP, control::run_loop);
    registry.register(tagn::FOR_IN, control::run_for_in);
    registry.register(tagn::IF, control::run_if_elif);
    registry.register(tagn::ELIF, control::run_if_elif);
    registry.register(tagn::THEN, control::run_then_else);
    registry.register(tagn::ELSE, control::run_then_else);
    registry.register(tagn::CASE, control::run_case);
    registry.register(tagn::WHEN, control::run_when);
    registry.register(tagn::WHEN_OTHERS, control::run_when);

    registry.register(tagn::ASSERT, logic::run_assert);
    registry.register(tagn::ASSERT_NOT, logic::run_assert);
    registry.register(tagn::ASSERT_IN, logic::run_assert_in);
    registry.register(tagn::ASSERT_NOT_IN, logic::run_assert_in);
    registry.register(tagn::NOT, logic::run_not);
    registry.register(tagn::AND, logic::run_and_or);
    registry.register(tagn::OR, logic::run_and_or);
    for name in [
        tagn::EQUAL,
        tagn::NOT_EQUAL,
        tagn::LESS,
        tagn::LESS_EQUAL,
        tagn::GREATER,
        tagn::GREATER_EQUAL,
    ] {
        registry.register(name, logic::run_compare);
    }

    registry.register(tagn::MODULE, procedure::run_module);
    registry.register(tagn::PROCEDURE, procedure::run_procedure);
    registry.register(tagn::PROCEDURE_PRIVILEGE, procedure::run_procedure_privilege);
    registry.register(tagn::CALL, procedure::run_call);
    registry.register(tagn::COND_CALL, procedure::run_cond_call);

    registry.register(tagn::SET, vars::run_set);
    registry.register(tagn::SET_INT, vars::run_set_typed);
    registry.register(tagn::SET_NUM, vars::run_set_typed);
    registry.register(tagn::SET_STR, vars::run_set_typed);
    registry.register(tagn::GET, vars::run_get);
    registry.register(tagn::RETURN, vars::run_get);

    registry.register(tagn::LOAD_VARS, data::run_load_vars);
    registry.register(tagn::LOAD_DATA, data::run_load_data);
    registry.register(tagn::OUTPUT, data::run_output);
    registry.register(tagn::HANDLE_EXCEPTIONS, data::run_handle_exceptions);

    registry.register(tagn::ITER_MAKE, io::run_iter_make);
    registry.register(tagn::ITER_NEXT, io::run_iter_next);
    registry.register(tagn::JSON_LOAD, io::run_json_load);
    registry.register(tagn::JSON_DUMP, io::run_json_dump);
    registry.register(tagn::TEMPLATE, io::run_template);

    registry.register(tagn::CALL_OS_CMD, os::run_call_os_cmd);
}

/// Tags usable as the condition of `if`, `elif` and `when`.
pub(crate) fn is_assert_family(name: &str) -> bool {
    matches!(
        name,
        tagn::ASSERT
            | tagn::ASSERT_NOT
            | tagn::ASSERT_IN
            | tagn::ASSERT_NOT_IN
            | tagn::NOT
            | tagn::AND
            | tagn::OR
            | tagn::EQUAL
            | tagn::NOT_EQUAL
            | tagn::LESS
            | tagn::LESS_EQUAL
            | tagn::GREATER
            | tagn::GREATER_EQUAL
    )
}
