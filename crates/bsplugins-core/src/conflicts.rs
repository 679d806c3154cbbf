//! Per-plugin conflict summaries.
//!
//! A summary lists the enabled plugins that share at least one record with
//! a plugin, split by which side wins. It is computed on first request and
//! cached on the [`PluginInfo`](crate::plugin::PluginInfo) until the next
//! priority, enabled-state or scan change.

use crate::id::PluginId;
use crate::plugin_list::PluginList;
use std::collections::BTreeSet;

/// Which way a plugin's conflicts go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConflictFlag {
    #[default]
    None,
    /// Only overrides others.
    Override,
    /// Only overridden by others.
    Overridden,
    Mixed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSummary {
    overriding: BTreeSet<PluginId>,
    overridden: BTreeSet<PluginId>,
}

impl ConflictSummary {
    /// Plugins this one wins against.
    pub fn overriding(&self) -> &BTreeSet<PluginId> {
        &self.overriding
    }

    /// Plugins that win against this one.
    pub fn overridden(&self) -> &BTreeSet<PluginId> {
        &self.overridden
    }

    pub fn flag(&self) -> ConflictFlag {
        match (self.overriding.is_empty(), self.overridden.is_empty()) {
            (true, true) => ConflictFlag::None,
            (false, true) => ConflictFlag::Override,
            (true, false) => ConflictFlag::Overridden,
            (false, false) => ConflictFlag::Mixed,
        }
    }
}

impl PluginList {
    /// Conflict summary for `id`, computed on first use.
    pub fn conflicts(&self, id: PluginId) -> Option<&ConflictSummary> {
        let plugin = self.plugins.get(id.0)?;
        Some(plugin.conflicts.get_or_init(|| self.compute_conflicts(id)))
    }

    fn compute_conflicts(&self, id: PluginId) -> ConflictSummary {
        let mut summary = ConflictSummary::default();
        let plugin = &self.plugins[id.0];
        let Some(entry) = self.index.entry_by_name(&plugin.name) else {
            return summary;
        };
        let ignore_masters = self.settings.ignore_master_conflicts;

        for &record_id in entry.records() {
            let Some(record) = self.index.record(record_id) else {
                continue;
            };
            if record.ignored() {
                continue;
            }
            for &handle in record.alternatives() {
                if handle == entry.handle() {
                    continue;
                }
                let Some(other_id) = self
                    .index
                    .entry(handle)
                    .and_then(|e| self.by_name.get(e.name()).copied())
                else {
                    continue;
                };
                let other = &self.plugins[other_id.0];
                if !other.enabled {
                    continue;
                }
                if plugin.priority > other.priority {
                    if !ignore_masters || !plugin.metadata.declares_master(&other.name) {
                        summary.overriding.insert(other_id);
                    }
                } else if !ignore_masters || !other.metadata.declares_master(&plugin.name) {
                    summary.overridden.insert(other_id);
                }
            }
        }
        summary
    }
}
