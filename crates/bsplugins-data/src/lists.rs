//! Plain-text lists kept beside a profile: the load order (one plugin name
//! per line) and the groups file (`name|group` per line).
//!
//! Both formats treat blank lines and lines starting with `#` as comments.
//! A missing file reads as empty.

use crate::loader::{DataLoadError, write_atomic};
use bsplugins_core::id::PluginId;
use bsplugins_core::plugin_list::PluginList;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// First line of every groups file we write.
pub const GENERATED_HEADER: &str = "# This file was automatically generated by bsplugins.";

fn read_lines(path: &Path) -> Result<Option<String>, DataLoadError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(file = %path.display(), "list file does not exist");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

// ===========================================================================
// Load order
// ===========================================================================

/// Plugin names in load order.
pub fn read_load_order(path: &Path) -> Result<Vec<String>, DataLoadError> {
    let Some(content) = read_lines(path)? else {
        return Ok(Vec::new());
    };
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !is_comment(line))
        .map(str::to_string)
        .collect())
}

pub fn write_load_order<S: AsRef<str>>(path: &Path, names: &[S]) -> Result<(), DataLoadError> {
    let mut out = String::new();
    for name in names {
        out.push_str(name.as_ref());
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())
}

/// Reorder `list` to the order stored at `path`. Unknown names are ignored
/// and unlisted plugins keep their relative order after the listed ones.
pub fn apply_load_order(list: &mut PluginList, path: &Path) -> Result<(), DataLoadError> {
    let names = read_load_order(path)?;
    if !names.is_empty() {
        list.set_load_order(&names);
    }
    Ok(())
}

pub fn save_load_order(list: &PluginList, path: &Path) -> Result<(), DataLoadError> {
    write_load_order(path, &list.load_order())
}

// ===========================================================================
// Groups
// ===========================================================================

/// One `name|group` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub plugin: String,
    pub group: String,
}

/// Parse a groups file. Lines without exactly one `|` are logged and skipped.
pub fn read_groups(path: &Path) -> Result<Vec<GroupEntry>, DataLoadError> {
    let Some(content) = read_lines(path)? else {
        return Ok(Vec::new());
    };
    Ok(parse_groups(&content, path))
}

fn parse_groups(content: &str, path: &Path) -> Vec<GroupEntry> {
    let mut entries = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim_end();
        if is_comment(line) {
            continue;
        }
        let mut fields = line.split('|');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(plugin), Some(group), None) => entries.push(GroupEntry {
                plugin: plugin.to_string(),
                group: group.to_string(),
            }),
            _ => warn!(
                file = %path.display(),
                line = number + 1,
                content = line,
                "invalid groups line"
            ),
        }
    }
    entries
}

/// Write entries with a non-empty group, after the generated-file header.
pub fn write_groups(path: &Path, entries: &[GroupEntry]) -> Result<(), DataLoadError> {
    let mut out = String::from(GENERATED_HEADER);
    out.push('\n');
    for entry in entries.iter().filter(|e| !e.group.is_empty()) {
        out.push_str(&entry.plugin);
        out.push('|');
        out.push_str(&entry.group);
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())
}

/// Reset every plugin's group, then assign the groups stored at `path`.
pub fn apply_groups(list: &mut PluginList, path: &Path) -> Result<(), DataLoadError> {
    let entries = read_groups(path)?;
    let all: Vec<PluginId> = list.ids_by_priority().to_vec();
    list.set_group(&all, "");
    for entry in entries {
        match list.find(&entry.plugin) {
            Some(id) => list.set_group(&[id], &entry.group),
            None => debug!(plugin = %entry.plugin, "groups file names an unknown plugin"),
        }
    }
    Ok(())
}

/// Write the groups of `list`, sorted by plugin name.
pub fn save_groups(list: &PluginList, path: &Path) -> Result<(), DataLoadError> {
    let mut entries: Vec<GroupEntry> = list
        .plugins()
        .map(|(_, plugin)| GroupEntry {
            plugin: plugin.name().to_string(),
            group: plugin.group().to_string(),
        })
        .collect();
    entries.sort_by_key(|e| e.plugin.to_lowercase());
    write_groups(path, &entries)
}
