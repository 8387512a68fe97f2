use std::ffi::OsString;

use clap::Parser;
use tr_core::{mvars, TagRunError, TrValue, VarMap};
use tr_runtime::{Args, EngineOptions, TagEngine};

mod cli_args;
mod error_map;
mod logging;
mod script_check;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_set_invalid, map_cli_source_scan, map_cli_source_strip,
};
pub(crate) use logging::init_tracing;
pub(crate) use script_check::check_scripts_dir;
#[cfg(test)]
pub(crate) use script_check::ScriptReport;

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, TagRunError> {
    match cli.command {
        Mode::Run(args) => run_script(args),
        Mode::Check(args) => run_check(args),
    }
}

fn run_script(args: RunArgs) -> Result<i32, TagRunError> {
    init_tracing(args.log_level.as_deref());
    let globals = parse_globals(&args.set)?;
    let mut engine = TagEngine::new(EngineOptions {
        search_path: args.path,
        globals,
        max_depth: args.max_depth,
        ..EngineOptions::default()
    });
    let root = engine.load_script_file(&args.script)?;

    let mut scope = Args::new();
    if !args.grant.is_empty() {
        scope.grant_privileges(
            args.grant
                .iter()
                .flat_map(|grant| grant.split(','))
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        );
    }

    if engine.run_with(&root, &mut scope) {
        println!("RESULT:OK");
        return Ok(0);
    }
    println!("RESULT:FAILED");
    if let Some(debug) = scope.get_local(mvars::DEBUG) {
        println!("DEBUG_JSON:{}", json_string(&debug.to_text()));
    }
    Ok(1)
}

fn run_check(args: CheckArgs) -> Result<i32, TagRunError> {
    init_tracing(args.log_level.as_deref());
    let engine = TagEngine::default();
    let reports = check_scripts_dir(&engine, &args.scripts_dir)?;

    let mut failed = false;
    for report in &reports {
        println!("SCRIPT:{}", report.path);
        if let Some(error) = &report.error {
            failed = true;
            println!("INVALID_SCRIPT:{}:{}:{}", report.path, error.code, json_string(&error.message));
        }
        for (line, name) in &report.unknown_tags {
            failed = true;
            println!("UNKNOWN_TAG:{}:{}:{}", report.path, line, name);
        }
    }
    println!("SCRIPTS:{}", reports.len());
    println!("{}", if failed { "RESULT:FAILED" } else { "RESULT:OK" });
    Ok(if failed { 1 } else { 0 })
}

pub(crate) fn parse_globals(pairs: &[String]) -> Result<VarMap, TagRunError> {
    let mut globals = VarMap::new();
    for raw in pairs {
        let (key, value) = raw.split_once('=').ok_or_else(|| map_cli_set_invalid(raw))?;
        let key = key.trim();
        if key.is_empty() || mvars::is_reserved(key) {
            return Err(map_cli_set_invalid(raw));
        }
        globals.insert(key.to_string(), TrValue::string(value));
    }
    Ok(globals)
}

#[cfg(test)]
mod tests;
