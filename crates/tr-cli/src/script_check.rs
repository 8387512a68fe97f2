use std::path::Path;

use tr_core::{Tag, TagRunError};
use tr_parser::parse_tag_file;
use tr_runtime::TagEngine;
use walkdir::WalkDir;

use crate::{map_cli_source_scan, map_cli_source_strip};

const SCRIPT_EXTENSION: &str = "xml";

#[derive(Debug, Clone)]
pub(crate) struct ScriptReport {
    /// Relative to the scanned directory, with `/` separators.
    pub(crate) path: String,
    pub(crate) error: Option<TagRunError>,
    /// `(line, tag name)` for every tag no runner is registered for.
    pub(crate) unknown_tags: Vec<(usize, String)>,
}

pub(crate) fn check_scripts_dir(engine: &TagEngine, root: &Path) -> Result<Vec<ScriptReport>, TagRunError> {
    if !root.is_dir() {
        return Err(TagRunError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("Scripts dir \"{}\" is not a directory.", root.display()),
        ));
    }

    let mut reports = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(map_cli_source_scan)?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(SCRIPT_EXTENSION)
        {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .map_err(map_cli_source_strip)?
            .to_string_lossy()
            .replace('\\', "/");
        let report = match parse_tag_file(path) {
            Ok(tag) => {
                let mut unknown_tags = Vec::new();
                collect_unknown_tags(engine, &tag, &mut unknown_tags);
                ScriptReport {
                    path: relative,
                    error: None,
                    unknown_tags,
                }
            }
            Err(error) => ScriptReport {
                path: relative,
                error: Some(error),
                unknown_tags: Vec::new(),
            },
        };
        tracing::debug!(script = %report.path, unknown = report.unknown_tags.len(), "script checked");
        reports.push(report);
    }
    Ok(reports)
}

fn collect_unknown_tags(engine: &TagEngine, tag: &Tag, out: &mut Vec<(usize, String)>) {
    if !engine.has_runner(&tag.name) {
        out.push((tag.location.start.line, tag.name.clone()));
    }
    for child in tag.tags() {
        collect_unknown_tags(engine, child, out);
    }
}
