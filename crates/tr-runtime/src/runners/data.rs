use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tr_core::{mvars, ExceptionHandlerRef, ExceptionSink, Tag, TagRunError, TrValue, VarMap};

use super::attrn;
use super::control::run_block;
use crate::args::Args;
use crate::engine::TagEngine;
use crate::output_lock::OutputLocks;
use crate::registry::{RunnerResult, TagOutcome};

const FILE_TYPE_CSV: &str = "csv";

#[derive(Debug, Clone, Copy)]
struct FieldPolicy {
    auto_strip: bool,
    allow_none: bool,
}

impl FieldPolicy {
    fn from_tag(engine: &TagEngine, tag: &Tag, args: &Args) -> Result<Self, TagRunError> {
        Ok(Self {
            auto_strip: engine.attr_bool(tag, args, attrn::AUTO_STRIP, true)?,
            allow_none: engine.attr_bool(tag, args, attrn::ALLOW_NONE, false)?,
        })
    }

    fn apply(self, field: Option<&str>) -> TrValue {
        match field {
            None if self.allow_none => TrValue::Null,
            None => TrValue::String(String::new()),
            Some(text) if self.auto_strip => TrValue::String(text.trim().to_string()),
            Some(text) => TrValue::String(text.to_string()),
        }
    }
}

/// Rows of a header-led delimited file.
#[derive(Debug, Clone, PartialEq)]
struct DataFile {
    fields: Vec<String>,
    rows: Vec<VarMap>,
    /// Physical lines after the header, blank or not.
    count: usize,
}

fn read_data_file(path: &Path, policy: FieldPolicy) -> Result<DataFile, TagRunError> {
    let source = read_text(path)?;
    let count = source.lines().count().saturating_sub(1);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source.as_bytes());
    let fields = reader
        .headers()
        .map_err(|error| csv_error(path, error))?
        .iter()
        .map(|name| name.replace(',', "_"))
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|error| csv_error(path, error))?;
        if is_blank_record(&record) {
            tracing::info!(row = index + 1, count, "skipping empty row");
            continue;
        }
        if record.get(0).map(str::trim).unwrap_or_default().is_empty() {
            tracing::info!(row = index + 1, count, "skipping row without a leading field");
            continue;
        }

        let row = fields
            .iter()
            .enumerate()
            .filter(|(_, name)| !mvars::is_reserved(name))
            .map(|(position, name)| (name.clone(), policy.apply(record.get(position))))
            .collect::<VarMap>();
        rows.push(row);
    }

    Ok(DataFile {
        fields,
        rows,
        count,
    })
}

/// `name,value` rows without a header, merged into the current scope.
pub(super) fn run_load_vars(engine: &TagEngine, tag: &Tag, args: &mut Args, _depth: usize) -> RunnerResult {
    check_file_type(engine, tag, args)?;
    check_encoding(engine, tag, args)?;
    let policy = FieldPolicy::from_tag(engine, tag, args)?;
    let name = engine.require_key(tag, args, attrn::NAME)?;
    let path = engine.resolve_file(&name);
    let source = read_text(&path)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source.as_bytes());
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|error| csv_error(&path, error))?;
        if is_blank_record(&record) {
            continue;
        }
        let var_name = record.get(0).map(str::trim).unwrap_or_default();
        if var_name.is_empty() {
            tracing::info!(row = index + 1, "skipping empty var name");
            continue;
        }
        if mvars::is_reserved(var_name) {
            tracing::warn!(row = index + 1, name = %var_name, "skipping reserved var name");
            continue;
        }
        let value = policy.apply(record.get(1));
        tracing::info!(row = index + 1, name = %var_name, "var stored");
        args.set(var_name, value);
    }
    Ok(TagOutcome::ok())
}

pub(super) fn run_load_data(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    check_file_type(engine, tag, args)?;
    check_encoding(engine, tag, args)?;
    let pass_through = engine.attr_pass_through(tag, args)?;
    let policy = FieldPolicy::from_tag(engine, tag, args)?;
    let name = engine.require_key(tag, args, attrn::NAME)?;
    let data = read_data_file(&engine.resolve_file(&name), policy)?;
    tracing::info!(count = data.count, fields = ?data.fields, "data loaded");

    args.set(mvars::LOADED_DATA_COUNT, TrValue::Int(data.count as i64));
    let cols = data.fields.join(",");
    for (index, row) in data.rows.into_iter().enumerate() {
        let mut copied;
        let scope = if pass_through {
            &mut *args
        } else {
            copied = args.clone();
            &mut copied
        };
        scope.vars.extend(row);

        let item_index = index as i64 + 1;
        let advance = match scope.get_local(mvars::LOADED_DATA_ITEM_INDEX) {
            Some(TrValue::Int(current)) => *current < item_index,
            _ => true,
        };
        if advance {
            scope.set(mvars::LOADED_DATA_ITEM_INDEX, TrValue::Int(item_index));
        }
        scope.set(mvars::LOADED_DATA_COLS, TrValue::String(cols.clone()));

        tracing::info!(row = item_index, count = data.count, "row read");
        if !run_block(engine, tag, scope, depth) {
            tracing::debug!(row = item_index, "load_data break");
            break;
        }
    }
    args.remove(mvars::LOADED_DATA_COUNT);
    Ok(TagOutcome::ok())
}

/// Writes the first child's result, or one CSV row of `cols`, under the file's output lock.
pub(super) fn run_output(engine: &TagEngine, tag: &Tag, args: &mut Args, depth: usize) -> RunnerResult {
    check_encoding(engine, tag, args)?;
    let name = engine.require_key(tag, args, attrn::NAME)?;
    let path = engine.primary_dir().join(&name);
    let newline = engine.attr_text(tag, args, attrn::NEWLINE).map(|text| unescape_newline(&text));

    if let Some(child) = tag.first_tag() {
        let data = engine.execute_tag(child, args, depth).into_value().to_text();
        let data = match &newline {
            Some(newline) => data.replace('\n', newline),
            None => data,
        };
        let append = append_mode(engine, tag, args, "w")?;
        let lock = engine.output_locks().lock_for(&path);
        let _guard = lock.lock();
        let mut file = open_output(&path, append)?;
        file.write_all(data.as_bytes())
            .map_err(|error| io_write_error(&path, error))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "data written");
        return Ok(TagOutcome::ok());
    }

    check_file_type(engine, tag, args)?;
    let cols = parse_cols(&engine.attr_key(tag, args, attrn::COLS));
    if cols.is_empty() {
        return Err(TagRunError::new(
            "ENGINE_ATTR_ILLEGAL",
            "\"output\" needs \"cols\" or a child tag producing the data.",
        ));
    }
    let append = append_mode(engine, tag, args, "a")?;
    let row = cols
        .iter()
        .map(|col| engine.get_var(args, col).unwrap_or_default().to_text())
        .collect::<Vec<_>>();

    let lock = engine.output_locks().lock_for(&path);
    let _guard = lock.lock();
    let file = open_output(&path, append)?;
    let empty = file
        .metadata()
        .map(|metadata| metadata.len() == 0)
        .unwrap_or(true);
    let mut writer = WriterBuilder::new()
        .terminator(csv_terminator(newline.as_deref()))
        .from_writer(file);
    if empty {
        writer
            .write_record(&cols)
            .map_err(|error| csv_error(&path, error))?;
    }
    writer
        .write_record(&row)
        .map_err(|error| csv_error(&path, error))?;
    writer
        .flush()
        .map_err(|error| io_write_error(&path, error))?;
    tracing::info!(path = %path.display(), "row written");
    Ok(TagOutcome::ok())
}

/// Appends failure rows to a CSV file, writing the header when the file is created.
struct CsvExceptionSink {
    path: PathBuf,
    cols: Vec<String>,
    locks: Arc<OutputLocks>,
}

impl ExceptionSink for CsvExceptionSink {
    fn handle(&self, vars: &VarMap) -> Result<(), TagRunError> {
        let lock = self.locks.lock_for(&self.path);
        let _guard = lock.lock();
        let exists = self.path.exists();
        let file = open_output(&self.path, true)?;
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::CRLF)
            .from_writer(file);
        if !exists {
            writer
                .write_record(&self.cols)
                .map_err(|error| csv_error(&self.path, error))?;
        }
        let row = self
            .cols
            .iter()
            .map(|col| vars.get(col).map(TrValue::to_text).unwrap_or_default());
        writer
            .write_record(row)
            .map_err(|error| csv_error(&self.path, error))?;
        writer
            .flush()
            .map_err(|error| io_write_error(&self.path, error))
    }
}

pub(super) fn run_handle_exceptions(
    engine: &TagEngine,
    tag: &Tag,
    args: &mut Args,
    _depth: usize,
) -> RunnerResult {
    check_file_type(engine, tag, args)?;
    let name = engine.require_key(tag, args, attrn::NAME)?;
    let mut cols = parse_cols(&engine.attr_key(tag, args, attrn::COLS));
    if engine.attr_bool(tag, args, attrn::DEBUG, false)? {
        cols.push(mvars::DEBUG.to_string());
    }
    if cols.is_empty() {
        return Err(TagRunError::new(
            "ENGINE_ATTR_ILLEGAL",
            "\"handle_exceptions\" needs \"cols\" or debug=\"true\".",
        ));
    }

    let sink = CsvExceptionSink {
        path: engine.primary_dir().join(&name),
        cols,
        locks: Arc::clone(engine.output_locks()),
    };
    tracing::debug!(path = %sink.path.display(), "exception handler installed");
    args.set(
        mvars::EXCEPTIONS_HANDLER,
        TrValue::Handler(ExceptionHandlerRef::new(sink)),
    );
    Ok(TagOutcome::ok())
}

fn check_file_type(engine: &TagEngine, tag: &Tag, args: &Args) -> Result<(), TagRunError> {
    let file_type = engine.attr_key(tag, args, attrn::TYPE);
    if file_type.is_empty() || file_type.eq_ignore_ascii_case(FILE_TYPE_CSV) {
        return Ok(());
    }
    Err(TagRunError::new(
        "ENGINE_FILE_TYPE_UNSUPPORTED",
        format!("File type \"{}\" is not supported.", file_type),
    ))
}

pub(super) fn check_encoding(engine: &TagEngine, tag: &Tag, args: &Args) -> Result<(), TagRunError> {
    let encoding = engine.attr_key(tag, args, attrn::ENCODING).to_ascii_lowercase();
    if matches!(encoding.as_str(), "" | "utf-8" | "utf8" | "utf-8-sig") {
        return Ok(());
    }
    Err(TagRunError::new(
        "ENGINE_ENCODING_UNSUPPORTED",
        format!("Encoding \"{}\" is not supported; files are read as UTF-8.", encoding),
    ))
}

fn append_mode(engine: &TagEngine, tag: &Tag, args: &Args, default: &str) -> Result<bool, TagRunError> {
    let mode = engine
        .attr_text(tag, args, attrn::MODE)
        .map(|mode| mode.trim().to_string())
        .filter(|mode| !mode.is_empty())
        .unwrap_or_else(|| default.to_string());
    if mode.contains('a') {
        Ok(true)
    } else if mode.contains('w') {
        Ok(false)
    } else {
        Err(TagRunError::new(
            "ENGINE_ATTR_ILLEGAL",
            format!("Output mode \"{}\" must be \"a\" or \"w\".", mode),
        ))
    }
}

fn open_output(path: &Path, append: bool) -> Result<fs::File, TagRunError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path).map_err(|error| {
        TagRunError::new(
            "IO_WRITE",
            format!("Cannot open \"{}\" for writing: {}", path.display(), error),
        )
    })
}

pub(super) fn read_text(path: &Path) -> Result<String, TagRunError> {
    let source = fs::read_to_string(path).map_err(|error| {
        TagRunError::new(
            "IO_READ",
            format!("Cannot read \"{}\": {}", path.display(), error),
        )
    })?;
    Ok(source.trim_start_matches('\u{feff}').to_string())
}

fn parse_cols(cols: &str) -> Vec<String> {
    cols.split(',')
        .map(str::trim)
        .filter(|col| !col.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn is_blank_record(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

fn unescape_newline(text: &str) -> String {
    text.replace("\\r", "\r").replace("\\n", "\n")
}

fn csv_terminator(newline: Option<&str>) -> Terminator {
    match newline {
        Some("\n") => Terminator::Any(b'\n'),
        Some("\r") => Terminator::Any(b'\r'),
        _ => Terminator::CRLF,
    }
}

fn csv_error(path: &Path, error: csv::Error) -> TagRunError {
    TagRunError::new(
        "CSV_ERROR",
        format!("Delimited file \"{}\": {}", path.display(), error),
    )
}

fn io_write_error(path: &Path, error: std::io::Error) -> TagRunError {
    TagRunError::new(
        "IO_WRITE",
        format!("Cannot write \"{}\": {}", path.display(), error),
    )
}
