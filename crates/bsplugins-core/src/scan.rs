//! Scanning plugins into a [`PluginList`].
//!
//! Each file is decoded on its own into [`PluginFacts`]; with the `parallel`
//! feature this happens on the rayon pool. The facts are then merged into
//! the override index serially, in input order, so record creation never
//! races.

use crate::config::{LoadOrderMechanism, Settings};
use crate::event::PluginEvent;
use crate::handlers::{ConflictScanner, PluginFacts};
use crate::id::{FileName, PluginId};
use crate::plugin::{ForceFlags, PluginInfo, PluginSource};
use crate::plugin_list::PluginList;
use crate::reader::{DecodeError, Reader};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// A plugin file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFile {
    pub name: FileName,
    pub path: PathBuf,
}

impl PluginFile {
    /// Name the file after the last path component.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name: FileName::new(name),
            path,
        }
    }
}

/// Outcome of a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files decoded successfully.
    pub scanned: usize,
    /// Files that could not be decoded. They stay listed without records.
    pub failed: Vec<(FileName, DecodeError)>,
}

/// Decode one file's header metadata and overridden records.
pub fn decode_plugin(
    bytes: &[u8],
    name: &FileName,
    settings: &Settings,
) -> Result<PluginFacts, DecodeError> {
    let mut scanner = ConflictScanner::new(name, settings);
    let era = Reader::with_era(settings.era()).parse(bytes, &mut scanner)?;
    Ok(scanner.finish(era))
}

fn decode_source(
    name: &FileName,
    source: &PluginSource,
    settings: &Settings,
) -> Result<PluginFacts, DecodeError> {
    let bytes = source.read()?;
    decode_plugin(&bytes, name, settings)
}

#[cfg(feature = "parallel")]
fn decode_all(
    inputs: &[(FileName, PluginSource)],
    settings: &Settings,
) -> Vec<Result<PluginFacts, DecodeError>> {
    use rayon::prelude::*;

    inputs
        .par_iter()
        .map(|(name, source)| decode_source(name, source, settings))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn decode_all(
    inputs: &[(FileName, PluginSource)],
    settings: &Settings,
) -> Vec<Result<PluginFacts, DecodeError>> {
    inputs
        .iter()
        .map(|(name, source)| decode_source(name, source, settings))
        .collect()
}

/// State carried over from the previous scan for a file seen again.
struct Previous {
    priority: usize,
    enabled: bool,
    group: String,
}

impl PluginList {
    /// Rebuild the list from `files`, given in arrival order.
    ///
    /// Files seen before keep their priority, enabled state and group;
    /// files no longer present are dropped. New files are appended in
    /// arrival order. The override index is rebuilt from scratch, then the
    /// order is repaired.
    pub fn scan(&mut self, files: &[PluginFile]) -> ScanReport {
        let inputs = files
            .iter()
            .map(|f| (f.name.clone(), PluginSource::Path(f.path.clone())))
            .collect();
        self.rebuild(inputs)
    }

    /// Like [`scan`](Self::scan) for plugins already in memory.
    pub fn scan_bytes(
        &mut self,
        files: impl IntoIterator<Item = (FileName, Vec<u8>)>,
    ) -> ScanReport {
        let inputs = files
            .into_iter()
            .map(|(name, bytes)| (name, PluginSource::Memory(Arc::from(bytes))))
            .collect();
        self.rebuild(inputs)
    }

    /// Forget every plugin and record.
    pub fn clear(&mut self) {
        self.plugins.clear();
        self.by_name.clear();
        self.by_priority.clear();
        self.index.clear();
        self.events.emit(PluginEvent::Refreshed);
        self.events.deliver();
    }

    fn force_flags(settings: &Settings, name: &FileName) -> ForceFlags {
        let loaded = settings.is_primary(name.as_str());
        let enabled = settings.is_force_enabled(name.as_str());
        ForceFlags {
            loaded,
            enabled,
            disabled: !loaded
                && !enabled
                && settings.load_order_mechanism == LoadOrderMechanism::None,
        }
    }

    fn rebuild(&mut self, mut inputs: Vec<(FileName, PluginSource)>) -> ScanReport {
        let mut seen = HashSet::new();
        inputs.retain(|(name, _)| seen.insert(name.clone()));

        let results = decode_all(&inputs, &self.settings);

        let previous: HashMap<FileName, Previous> = self
            .plugins
            .drain(..)
            .map(|p| {
                let state = Previous {
                    priority: p.priority,
                    enabled: p.enabled,
                    group: p.group,
                };
                (p.name, state)
            })
            .collect();
        let carried = previous.len();

        let light = self.settings.light_plugins_supported();
        let mut report = ScanReport::default();
        let mut sort_keys = Vec::with_capacity(inputs.len());
        let mut facts = Vec::with_capacity(inputs.len());

        for (arrival, ((name, source), result)) in inputs.into_iter().zip(results).enumerate() {
            let force = Self::force_flags(&self.settings, &name);
            let mut plugin = PluginInfo::new(name.clone(), source, force, light);

            let key = match previous.get(&name) {
                Some(prev) => {
                    plugin.enabled = plugin.resolve_enabled(prev.enabled);
                    plugin.group = prev.group.clone();
                    prev.priority
                }
                None => {
                    plugin.enabled = plugin.resolve_enabled(self.settings.enable_new_plugins);
                    carried + arrival
                }
            };

            match result {
                Ok(file_facts) => {
                    plugin.metadata = file_facts.metadata.clone();
                    report.scanned += 1;
                    facts.push(Some(file_facts));
                }
                Err(err) => {
                    error!(file = %name, error = %err, "failed to decode plugin");
                    plugin.decode_error = Some(err.to_string());
                    report.failed.push((name, err));
                    facts.push(None);
                }
            }
            sort_keys.push(key);
            self.plugins.push(plugin);
        }

        self.by_name = self
            .plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), PluginId(i)))
            .collect();
        self.by_priority = (0..self.plugins.len()).map(PluginId).collect();
        self.by_priority.sort_by_key(|id| sort_keys[id.0]);
        for (priority, id) in self.by_priority.iter().enumerate() {
            self.plugins[id.0].priority = priority;
        }

        self.index.clear();
        for plugin in &self.plugins {
            self.index.create_entry(&plugin.name);
        }
        for (plugin, file_facts) in self.plugins.iter().zip(&facts) {
            let Some(file_facts) = file_facts else {
                continue;
            };
            for fact in &file_facts.records {
                self.index.add_alternative(
                    &plugin.name,
                    &fact.path,
                    fact.form_type,
                    fact.editor_name.as_deref(),
                );
            }
            for path in &file_facts.child_groups {
                self.index.add_child_group(&plugin.name, path);
            }
        }

        self.repair_in_place();
        self.refresh_derived();
        debug!(
            plugins = self.plugins.len(),
            failed = report.failed.len(),
            records = self.index.len(),
            "plugin scan finished"
        );
        self.events.emit(PluginEvent::Refreshed);
        self.events.deliver();
        report
    }
}
