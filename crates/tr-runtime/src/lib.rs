mod args;
mod attrs;
mod engine;
mod handles;
mod output_lock;
mod registry;
mod runners;
mod scope;
mod value_path;

pub use args::Args;
pub use engine::{EngineOptions, ExceptionHook, TagEngine};
pub use handles::MemoryHandle;
pub use output_lock::OutputLocks;
pub use registry::{RunnerRegistry, RunnerResult, TagOutcome, TagRunner};
pub use runners::{attrn, register_builtin_runners, tagn};
pub use scope::{assign, lookup, substitute};
