use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tagrun")]
#[command(about = "Run and check tag-driven XML scripts")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Run(RunArgs),
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "script")]
    pub(crate) script: PathBuf,
    /// Extra directories searched after the script directory and the working directory.
    #[arg(long = "path")]
    pub(crate) path: Vec<PathBuf>,
    /// Global variable as `key=value`; repeatable.
    #[arg(long = "set")]
    pub(crate) set: Vec<String>,
    /// Privilege granted to the top-level scope, e.g. `call_os_cmd`; repeatable.
    #[arg(long = "grant")]
    pub(crate) grant: Vec<String>,
    #[arg(long = "max-depth")]
    pub(crate) max_depth: Option<usize>,
    /// Log filter such as `info` or `tr_runtime=debug`. Defaults to `RUST_LOG`, then `warn`.
    #[arg(long = "log-level")]
    pub(crate) log_level: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: PathBuf,
    #[arg(long = "log-level")]
    pub(crate) log_level: Option<String>,
}
