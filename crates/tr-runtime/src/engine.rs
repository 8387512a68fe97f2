use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use tr_core::{mvars, Tag, TagRunError, TrValue, VarMap};
use tr_parser::{parse_tag_document, parse_tag_file};

use crate::args::Args;
use crate::handles::MemoryHandle;
use crate::output_lock::OutputLocks;
use crate::registry::{RunnerRegistry, RunnerResult, TagOutcome, TagRunner};
use crate::runners::register_builtin_runners;
use crate::scope::{assign, lookup, substitute};

pub(crate) const LOG_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Called first whenever a tag fails, before logging and before any
/// script-registered exception handler.
pub trait ExceptionHook: Send + Sync {
    fn internal_exception(&self, tag: &Tag, args: &Args, error: &TagRunError);
}

#[derive(Clone, Default)]
pub struct EngineOptions {
    /// Directories consulted in order for relative file references. Index 0
    /// is where `output` writes and where OS commands run.
    pub search_path: Vec<PathBuf>,
    pub globals: VarMap,
    /// Maximum nesting depth of `execute_tag`. Unbounded when `None`.
    pub max_depth: Option<usize>,
    pub output_locks: Option<Arc<OutputLocks>>,
    pub exception_hook: Option<Arc<dyn ExceptionHook>>,
}

pub struct TagEngine {
    runners: RunnerRegistry,
    globals: RefCell<VarMap>,
    procedures: RefCell<BTreeMap<String, Rc<Tag>>>,
    search_path: Vec<PathBuf>,
    max_depth: Option<usize>,
    output_locks: Arc<OutputLocks>,
    exception_hook: Option<Arc<dyn ExceptionHook>>,
    handles: BTreeMap<String, MemoryHandle>,
    trace: RefCell<Vec<String>>,
}

impl Default for TagEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl TagEngine {
    pub fn new(options: EngineOptions) -> Self {
        let mut runners = RunnerRegistry::new();
        register_builtin_runners(&mut runners);
        Self {
            runners,
            globals: RefCell::new(options.globals),
            procedures: RefCell::new(BTreeMap::new()),
            search_path: options.search_path,
            max_depth: options.max_depth,
            output_locks: options.output_locks.unwrap_or_default(),
            exception_hook: options.exception_hook,
            handles: BTreeMap::new(),
            trace: RefCell::new(Vec::new()),
        }
    }

    /// Installs `runner` for `name`, replacing any earlier runner for that name.
    pub fn register_runner(&mut self, name: impl Into<String>, runner: impl TagRunner + 'static) {
        self.runners.register(name, runner);
    }

    pub fn has_runner(&self, name: &str) -> bool {
        self.runners.contains(name)
    }

    pub fn runner_names(&self) -> Vec<String> {
        self.runners.names().map(ToString::to_string).collect()
    }

    pub fn register_handle(&mut self, name: impl Into<String>, handle: MemoryHandle) {
        self.handles.insert(name.into(), handle);
    }

    pub(crate) fn handle(&self, name: &str) -> Option<MemoryHandle> {
        self.handles.get(name).cloned()
    }

    pub fn output_locks(&self) -> &Arc<OutputLocks> {
        &self.output_locks
    }

    /// Parses a script file and points the search path at its directory.
    ///
    /// The new search path starts with the script directory and the current
    /// working directory, followed by any directories configured earlier.
    pub fn load_script_file(&mut self, path: &Path) -> Result<Tag, TagRunError> {
        let root = parse_tag_file(path)?;

        let script_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let cwd = std::env::current_dir().map_err(|error| {
            TagRunError::new(
                "IO_CWD",
                format!("Cannot read current directory: {}", error),
            )
        })?;

        let mut search_path = vec![script_dir.clone(), cwd];
        for dir in self.search_path.drain(..) {
            if !search_path.contains(&dir) {
                search_path.push(dir);
            }
        }
        self.search_path = search_path;

        let script_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.set_global(mvars::SCRIPT_NAME, TrValue::String(script_name));
        self.set_global(
            mvars::WORKING_DIR,
            TrValue::String(script_dir.display().to_string()),
        );
        tracing::debug!(script = %path.display(), "script loaded");
        Ok(root)
    }

    pub fn load_script_str(&self, source: &str) -> Result<Tag, TagRunError> {
        parse_tag_document(source)
    }

    /// Runs `root` with an empty local scope and reports whether it completed.
    pub fn run(&self, root: &Tag) -> bool {
        let mut args = Args::new();
        self.run_with(root, &mut args)
    }

    pub fn run_with(&self, root: &Tag, args: &mut Args) -> bool {
        self.execute_tag(root, args, 0).is_truthy()
    }

    /// Runs one tag. Never fails: a runner error is reported and becomes `false`.
    pub fn execute_tag(&self, tag: &Tag, args: &mut Args, depth: usize) -> TagOutcome {
        let depth = depth + 1;
        args.set(mvars::DEPTH, TrValue::Int(depth as i64));
        args.set(mvars::LOG_DATETIME, TrValue::String(log_datetime()));
        self.trace.borrow_mut().push(tag.name.clone());

        let outcome = match self.dispatch(tag, args, depth) {
            Ok(outcome) => outcome,
            Err(error) => self.handle_fault(tag, args, error.at(&tag.location)),
        };

        self.trace.borrow_mut().pop();
        outcome
    }

    fn dispatch(&self, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return Err(TagRunError::new(
                    "ENGINE_DEPTH_EXCEEDED",
                    format!("Tag depth {} exceeds the limit of {}.", depth, max_depth),
                ));
            }
        }

        let runner = self.runners.get(&tag.name).ok_or_else(|| {
            TagRunError::new(
                "ENGINE_RUNNER_NOT_FOUND",
                format!("No runner is registered for tag \"{}\".", tag.name),
            )
        })?;
        tracing::debug!(tag = %tag.name, depth, "run tag");
        runner.run(self, tag, args, depth)
    }

    fn handle_fault(&self, tag: &Tag, args: &mut Args, error: TagRunError) -> TagOutcome {
        if let Some(hook) = &self.exception_hook {
            hook.internal_exception(tag, args, &error);
        }

        let trace = self.trace.borrow().join(" > ");
        let line = error.span.as_ref().map(|span| span.start.line).unwrap_or(0);
        tracing::error!(
            tag = %tag.name,
            attrs = %tag.attrs_repr(),
            trace = %trace,
            line,
            code = %error.code,
            "{}",
            error.message
        );

        let debug = format!(
            "[{}] TAG: {}({}) | Trace: {} | Error: {}",
            log_datetime(),
            tag.name,
            tag.attrs_repr(),
            trace,
            error
        );
        args.set(mvars::DEBUG, TrValue::String(debug));

        if let Some(TrValue::Handler(handler)) = self.get_var(args, mvars::EXCEPTIONS_HANDLER) {
            let vars = self.combined_vars(args);
            if let Err(handler_error) = handler.0.handle(&vars) {
                tracing::error!(
                    code = %handler_error.code,
                    "exception handler failed: {}",
                    handler_error.message
                );
            }
        }

        TagOutcome::fail()
    }

    pub fn get_global(&self, key: &str) -> Option<TrValue> {
        self.globals.borrow().get(key).cloned()
    }

    pub fn set_global(&self, key: impl Into<String>, value: TrValue) {
        self.globals.borrow_mut().insert(key.into(), value);
    }

    /// Local-over-global read.
    pub fn get_var(&self, args: &Args, key: &str) -> Option<TrValue> {
        lookup(&args.vars, &self.globals.borrow(), key)
    }

    pub fn set_var(&self, args: &mut Args, key: &str, value: TrValue, global: bool) {
        assign(
            &mut args.vars,
            &mut self.globals.borrow_mut(),
            key,
            value,
            global,
        );
    }

    /// Assignment on behalf of a script. The privilege set cannot be written this way.
    pub fn store(
        &self,
        args: &mut Args,
        key: &str,
        value: TrValue,
        global: bool,
    ) -> Result<(), TagRunError> {
        if key == mvars::PROC_PRIVILEGE {
            return Err(TagRunError::new(
                "ENGINE_RESERVED_VAR",
                format!("Variable \"{}\" cannot be assigned by scripts.", key),
            ));
        }
        self.set_var(args, key, value, global);
        Ok(())
    }

    pub fn substitute(&self, args: &Args, text: &str) -> String {
        substitute(&args.vars, &self.globals.borrow(), text)
    }

    /// Globals overlaid with the local mapping.
    pub fn combined_vars(&self, args: &Args) -> VarMap {
        let mut vars = self.globals.borrow().clone();
        vars.extend(args.vars.iter().map(|(key, value)| (key.clone(), value.clone())));
        vars
    }

    pub(crate) fn define_procedure(&self, name: &str, body: Rc<Tag>) {
        self.procedures.borrow_mut().insert(name.to_string(), body);
    }

    pub(crate) fn procedure(&self, name: &str) -> Option<Rc<Tag>> {
        self.procedures.borrow().get(name).cloned()
    }

    pub fn procedure_names(&self) -> Vec<String> {
        self.procedures.borrow().keys().cloned().collect()
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// First existing file named `name` along the search path, or `name` itself.
    pub fn resolve_file(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| path.to_path_buf())
    }

    pub(crate) fn primary_dir(&self) -> PathBuf {
        self.search_path
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub(crate) fn log_datetime() -> String {
    chrono::Local::now().format(LOG_DATETIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tr_core::{ExceptionHandlerRef, ExceptionSink};

    #[derive(Default)]
    struct RecordingHook {
        codes: Mutex<Vec<String>>,
    }

    impl ExceptionHook for RecordingHook {
        fn internal_exception(&self, tag: &Tag, _args: &Args, error: &TagRunError) {
            self.codes.lock().push(format!("{}:{}", tag.name, error.code));
        }
    }

    #[derive(Clone, Default)]
    struct CapturingSink {
        seen: Arc<Mutex<Vec<VarMap>>>,
    }

    impl ExceptionSink for CapturingSink {
        fn handle(&self, vars: &VarMap) -> Result<(), TagRunError> {
            self.seen.lock().push(vars.clone());
            Ok(())
        }
    }

    fn fail_runner(_: &TagEngine, _: &Tag, _: &mut Args, _: usize) -> RunnerResult {
        Err(TagRunError::new("TEST_BOOM", "boom"))
    }

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("{}-{}", prefix, nanos));
        fs::create_dir_all(&path).expect("temp dir should be created");
        path
    }

    #[test]
    fn unknown_tag_becomes_false_with_debug_info() {
        let engine = TagEngine::default();
        let mut args = Args::new();
        let outcome = engine.execute_tag(&Tag::new("nope").with_attr("k", "v"), &mut args, 0);

        assert_eq!(outcome, TagOutcome::fail());
        let debug = args
            .get_local(mvars::DEBUG)
            .map(TrValue::to_text)
            .expect("debug info recorded");
        assert!(debug.contains(r#"TAG: nope({"k": "v"})"#));
        assert!(debug.contains("ENGINE_RUNNER_NOT_FOUND"));
        assert_eq!(args.get_local(mvars::DEPTH), Some(&TrValue::Int(1)));
        assert!(args.get_local(mvars::LOG_DATETIME).is_some());
    }

    #[test]
    fn fault_reaches_hook_and_registered_handler() {
        let hook = Arc::new(RecordingHook::default());
        let mut engine = TagEngine::new(EngineOptions {
            exception_hook: Some(hook.clone()),
            ..EngineOptions::default()
        });
        engine.register_runner("boom", fail_runner);
        engine.set_global("g", TrValue::from("global"));

        let sink = CapturingSink::default();
        let mut args = Args::new();
        args.set(
            mvars::EXCEPTIONS_HANDLER,
            TrValue::Handler(ExceptionHandlerRef::new(sink.clone())),
        );
        args.set("l", TrValue::from("local"));

        let root = Tag::new("sub").with_child(Tag::new("boom"));
        assert!(engine.execute_tag(&root, &mut args, 0).is_truthy());

        assert_eq!(*hook.codes.lock(), vec!["boom:TEST_BOOM".to_string()]);
        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("g"), Some(&TrValue::from("global")));
        assert_eq!(seen[0].get("l"), Some(&TrValue::from("local")));
        let debug = seen[0].get(mvars::DEBUG).map(TrValue::to_text).unwrap_or_default();
        assert!(debug.contains("Trace: sub > boom"));
    }

    #[test]
    fn max_depth_stops_runaway_nesting() {
        let engine = TagEngine::new(EngineOptions {
            max_depth: Some(2),
            ..EngineOptions::default()
        });
        let set = Tag::new("set").with_attr("key", "x").with_attr("value", "1");
        let nested = Tag::new("sub").with_attr("pass_through", "true").with_child(
            Tag::new("sub")
                .with_attr("pass_through", "true")
                .with_child(set),
        );

        let mut args = Args::new();
        assert!(engine.execute_tag(&nested, &mut args, 0).is_truthy());
        assert!(args.get_local("x").is_none());
        assert!(args.get_local(mvars::DEBUG).is_some());

        let unbounded = TagEngine::default();
        let mut args = Args::new();
        assert!(unbounded.execute_tag(&nested, &mut args, 0).is_truthy());
        assert_eq!(args.get_local("x"), Some(&TrValue::from("1")));
    }

    #[test]
    fn store_rejects_the_privilege_set() {
        let engine = TagEngine::default();
        let mut args = Args::new();
        let error = engine
            .store(&mut args, mvars::PROC_PRIVILEGE, TrValue::from("x"), false)
            .expect_err("privilege set is not assignable");
        assert_eq!(error.code, "ENGINE_RESERVED_VAR");

        engine
            .store(&mut args, "k", TrValue::Int(1), true)
            .expect("plain key");
        assert_eq!(engine.get_global("k"), Some(TrValue::Int(1)));
        assert_eq!(engine.get_var(&args, "k"), Some(TrValue::Int(1)));
    }

    #[test]
    fn load_script_file_sets_path_and_script_globals() {
        let dir = temp_dir("tagrun-engine-load");
        let script = dir.join("hello.xml");
        fs::write(&script, r#"<root><set key="x" value="1"/></root>"#).expect("write script");
        fs::write(dir.join("data.csv"), "a,b\n").expect("write data");

        let mut engine = TagEngine::default();
        let root = engine.load_script_file(&script).expect("script should load");
        assert_eq!(root.name, "root");
        assert_eq!(engine.search_path()[0], dir);
        assert_eq!(engine.get_global(mvars::SCRIPT_NAME), Some(TrValue::from("hello")));
        assert_eq!(engine.resolve_file("data.csv"), dir.join("data.csv"));
        assert_eq!(engine.resolve_file("missing.csv"), PathBuf::from("missing.csv"));
        assert!(engine.run(&root));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn runner_overrides_replace_builtins() {
        let mut engine = TagEngine::default();
        assert!(engine.has_runner("sub"));
        engine.register_runner("sub", fail_runner);
        assert!(!engine.run(&Tag::new("sub")));
    }
}
