use std::process::{Command, Stdio};

use tr_core::{Tag, TagRunError};

use super::{attrn, tagn};
use crate::args::Args;
use crate::engine::TagEngine;
use crate::registry::{RunnerResult, TagOutcome};

/// Runs `cmd` with whitespace-split `args` from the primary script directory.
///
/// Only scopes holding the `call_os_cmd` privilege may run commands. Stdout
/// and stderr are captured and logged together in one event. Succeeds iff the
/// process exits with status 0.
pub(super) fn run_call_os_cmd(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    if !args.has_privilege(tagn::CALL_OS_CMD) {
        return Err(TagRunError::new(
            "ENGINE_PRIVILEGE_DENIED",
            "\"call_os_cmd\" is not granted in this scope.",
        ));
    }

    let cmd = engine.attr_key(tag, args, attrn::CMD);
    if cmd.is_empty() {
        tracing::debug!("empty os command skipped");
        return Ok(TagOutcome::fail());
    }
    let cmd_args = engine.attr_text(tag, args, attrn::ARGS).unwrap_or_default();
    let cwd = engine.primary_dir();

    tracing::info!(cmd = %cmd, args = %cmd_args, cwd = %cwd.display(), "executing os command");
    let output = Command::new(&cmd)
        .args(cmd_args.split_whitespace())
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| {
            TagRunError::new(
                "IO_SPAWN",
                format!("Cannot start \"{}\": {}", cmd, error),
            )
        })?;

    let status = output.status.code();
    tracing::info!(
        cmd = %cmd,
        status = ?status,
        "os command finished:\n{}",
        combined_output(&output.stdout, &output.stderr)
    );
    Ok(TagOutcome::from(status == Some(0)))
}

/// Stdout followed by stderr, as one block of text.
fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    [stdout, stderr]
        .into_iter()
        .map(String::from_utf8_lossy)
        .filter(|text| !text.trim().is_empty())
        .map(|text| text.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
