//! The ordered collection of known plugins.
//!
//! [`PluginList`] owns the per-file [`PluginInfo`]s, the priority order, the
//! [`OverrideIndex`] built by the last scan and the [`EventBus`] used to
//! announce changes. Ordering operations live in `load_order`, scanning in
//! `scan` and conflict summaries in `conflicts`.

use crate::config::Settings;
use crate::event::{EventBus, PluginEvent};
use crate::field::FieldTree;
use crate::form_parser::{FormParserTable, ParseContext};
use crate::handlers::SingleRecordParser;
use crate::id::{FileName, PluginId, RecordId};
use crate::override_index::OverrideIndex;
use crate::plugin::{PluginInfo, PluginState};
use crate::reader::Reader;
use crate::record_path::RecordPath;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PluginListError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("unknown plugin id {0:?}")]
    UnknownId(PluginId),

    #[error("priority {priority} out of range for {count} plugins")]
    PriorityOutOfRange { priority: usize, count: usize },

    #[error("unknown record {0:?}")]
    UnknownRecord(RecordId),
}

// ---------------------------------------------------------------------------
// PluginList
// ---------------------------------------------------------------------------

/// Plugins, their load order and the records they provide.
///
/// Priorities are dense: `by_priority[p]` is the plugin with priority `p`.
#[derive(Debug, Default)]
pub struct PluginList {
    pub(crate) settings: Settings,
    pub(crate) plugins: Vec<PluginInfo>,
    pub(crate) by_name: HashMap<FileName, PluginId>,
    pub(crate) by_priority: Vec<PluginId>,
    pub(crate) index: OverrideIndex,
    pub(crate) events: EventBus,
}

impl PluginList {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings. Takes effect on the next scan.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn index(&self) -> &OverrideIndex {
        &self.index
    }

    /// Subscribe to or suppress change notifications.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    // -- Queries --

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugin(&self, id: PluginId) -> Option<&PluginInfo> {
        self.plugins.get(id.0)
    }

    /// Plugins in list order (not priority order).
    pub fn plugins(&self) -> impl Iterator<Item = (PluginId, &PluginInfo)> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(i, plugin)| (PluginId(i), plugin))
    }

    pub fn find(&self, name: &str) -> Option<PluginId> {
        self.by_name.get(&FileName::from(name)).copied()
    }

    pub fn plugin_by_name(&self, name: &str) -> Option<&PluginInfo> {
        self.find(name).and_then(|id| self.plugin(id))
    }

    pub(crate) fn require(&self, name: &str) -> Result<PluginId, PluginListError> {
        self.find(name)
            .ok_or_else(|| PluginListError::UnknownPlugin(name.to_string()))
    }

    pub fn priority(&self, name: &str) -> Option<usize> {
        self.plugin_by_name(name).map(PluginInfo::priority)
    }

    /// Plugin ids ordered by priority.
    pub fn ids_by_priority(&self) -> &[PluginId] {
        &self.by_priority
    }

    pub fn at_priority(&self, priority: usize) -> Option<PluginId> {
        self.by_priority.get(priority).copied()
    }

    pub fn state(&self, name: &str) -> PluginState {
        self.plugin_by_name(name)
            .map(PluginInfo::state)
            .unwrap_or(PluginState::Missing)
    }

    pub fn masters(&self, name: &str) -> Option<&[FileName]> {
        self.plugin_by_name(name).map(PluginInfo::masters)
    }

    // -- Enabled state --

    pub fn set_enabled(&mut self, id: PluginId, enable: bool) -> Result<(), PluginListError> {
        self.set_enabled_many(&[id], enable)
    }

    /// Enable or disable several plugins with a single notification.
    ///
    /// Forced plugins stay enabled and force-disabled plugins stay disabled.
    pub fn set_enabled_many(
        &mut self,
        ids: &[PluginId],
        enable: bool,
    ) -> Result<(), PluginListError> {
        self.check_ids(ids)?;
        self.apply_enabled(ids.iter().map(|&id| (id, enable)));
        Ok(())
    }

    /// Flip each plugin's enabled state.
    pub fn toggle_state(&mut self, ids: &[PluginId]) -> Result<(), PluginListError> {
        self.check_ids(ids)?;
        let changes: Vec<_> = ids
            .iter()
            .map(|&id| (id, !self.plugins[id.0].enabled))
            .collect();
        self.apply_enabled(changes);
        Ok(())
    }

    pub fn set_state(&mut self, name: &str, state: PluginState) -> Result<(), PluginListError> {
        let id = self.require(name)?;
        self.apply_enabled([(id, state == PluginState::Active)]);
        Ok(())
    }

    fn check_ids(&self, ids: &[PluginId]) -> Result<(), PluginListError> {
        match ids.iter().find(|id| id.0 >= self.plugins.len()) {
            Some(&id) => Err(PluginListError::UnknownId(id)),
            None => Ok(()),
        }
    }

    fn apply_enabled(&mut self, changes: impl IntoIterator<Item = (PluginId, bool)>) {
        let mut states = BTreeMap::new();
        for (id, enable) in changes {
            let Some(plugin) = self.plugins.get_mut(id.0) else {
                continue;
            };
            let resolved = plugin.resolve_enabled(enable);
            if plugin.enabled != resolved {
                plugin.enabled = resolved;
                states.insert(plugin.name.clone(), plugin.state());
            }
        }
        if states.is_empty() {
            return;
        }
        self.refresh_derived();
        self.events.emit(PluginEvent::StateChanged { states });
        self.events.deliver();
    }

    /// Recompute everything that depends on priority or enabled state.
    pub(crate) fn refresh_derived(&mut self) {
        self.compute_compile_indices();
        self.refresh_load_order();
        self.recompute_missing_masters();
        self.invalidate_conflicts();
    }

    pub(crate) fn invalidate_conflicts(&mut self) {
        for plugin in &mut self.plugins {
            plugin.invalidate_conflicts();
        }
    }

    // -- Groups --

    pub fn group(&self, name: &str) -> Option<&str> {
        self.plugin_by_name(name).map(PluginInfo::group)
    }

    /// Assign an opaque display group. Unknown ids are ignored.
    pub fn set_group(&mut self, ids: &[PluginId], group: &str) {
        for id in ids {
            if let Some(plugin) = self.plugins.get_mut(id.0) {
                plugin.group = group.to_string();
            }
        }
    }

    // -- Records --

    /// Mark a record as ignored for conflict summaries.
    pub fn set_record_ignored(&mut self, record: RecordId, ignored: bool) {
        self.index.set_ignored(record, ignored);
        self.invalidate_conflicts();
    }

    /// Listed plugins providing `record`, by ascending priority.
    pub fn alternatives(&self, record: RecordId) -> Vec<PluginId> {
        let Some(record) = self.index.record(record) else {
            return Vec::new();
        };
        let mut ids: Vec<PluginId> = record
            .alternatives()
            .iter()
            .filter_map(|&handle| self.index.entry(handle))
            .filter_map(|entry| self.by_name.get(entry.name()).copied())
            .collect();
        ids.sort_by_key(|id| self.plugins[id.0].priority);
        ids
    }

    /// The enabled alternative with the highest priority.
    pub fn winner(&self, record: RecordId) -> Option<PluginId> {
        self.alternatives(record)
            .into_iter()
            .rev()
            .find(|id| self.plugins[id.0].enabled)
    }

    pub fn winner_for_path(&self, path: &RecordPath) -> Option<PluginId> {
        self.winner(self.index.find(path)?)
    }

    /// Decode every listed copy of `record` into one field tree, one value
    /// column per plugin in ascending priority.
    ///
    /// A copy that cannot be read leaves its column empty.
    pub fn record_fields(&self, record: RecordId) -> Result<FieldTree, PluginListError> {
        let path = self
            .index
            .record(record)
            .map(|r| r.path().clone())
            .ok_or(PluginListError::UnknownRecord(record))?;
        let columns = self.alternatives(record);
        let mut tree = FieldTree::new(
            columns
                .iter()
                .map(|id| self.plugins[id.0].name.clone())
                .collect(),
        );
        let table = FormParserTable::for_game(self.settings.game);
        let reader = Reader::with_era(self.settings.era());

        for (column, id) in columns.iter().enumerate() {
            let plugin = &self.plugins[id.0];
            let bytes = match plugin.source.read() {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(file = %plugin.name, error = %err, "cannot re-read plugin");
                    continue;
                }
            };
            let ctx = ParseContext {
                column,
                localized: plugin.metadata.localized,
                masters: &plugin.metadata.masters,
                plugin: &plugin.name,
                game: self.settings.game,
            };
            let mut parser = SingleRecordParser::new(&mut tree, &path, table, ctx);
            if let Err(err) = reader.parse(&bytes, &mut parser) {
                warn!(file = %plugin.name, record = %path, error = %err, "cannot decode record");
            }
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::test_utils::{FormBuilder, PluginBuilder};
    use crate::type_code::TypeCode;
    use std::sync::{Arc, Mutex};

    fn setting(edid: &str, value: f32) -> FormBuilder {
        FormBuilder::new(TypeCode::GMST, 0x0000_0800)
            .edid(edid)
            .chunk(TypeCode::DATA, value.to_le_bytes().to_vec())
    }

    fn two_settings() -> PluginList {
        let x = PluginBuilder::new()
            .top_group(TypeCode::GMST, vec![setting("fGravity", 1.0)])
            .build();
        let y = PluginBuilder::new()
            .top_group(TypeCode::GMST, vec![setting("fGravity", 2.0)])
            .build();
        let mut list = PluginList::new(Settings::default());
        list.scan_bytes(vec![("X.esp".into(), x), ("Y.esp".into(), y)]);
        list
    }

    #[test]
    fn winner_follows_priority_and_enabled_state() {
        let mut list = two_settings();
        let record = list.index().find_setting("fGravity").unwrap();
        let x = list.find("X.esp").unwrap();
        let y = list.find("y.ESP").unwrap();
        assert_eq!(list.alternatives(record), [x, y]);
        assert_eq!(list.winner(record), Some(y));

        list.set_enabled(y, false).unwrap();
        assert_eq!(list.winner(record), Some(x));
        list.set_enabled(x, false).unwrap();
        assert_eq!(list.winner(record), None);
    }

    #[test]
    fn state_changes_are_batched_into_one_event() {
        let mut list = two_settings();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        list.events_mut().on_passive(
            EventKind::StateChanged,
            Box::new(move |e: &PluginEvent| {
                if let PluginEvent::StateChanged { states } = e {
                    sink.lock().unwrap().push(states.len());
                }
            }),
        );
        let ids: Vec<_> = list.ids_by_priority().to_vec();
        list.set_enabled_many(&ids, false).unwrap();
        // Already disabled: no notification.
        list.set_enabled_many(&ids, false).unwrap();
        list.toggle_state(&ids[..1]).unwrap();
        assert_eq!(*batches.lock().unwrap(), [2, 1]);
        assert_eq!(list.state("X.esp"), PluginState::Active);
        assert_eq!(list.state("Y.esp"), PluginState::Inactive);
        assert_eq!(list.state("Nope.esp"), PluginState::Missing);
    }

    #[test]
    fn load_order_index_tracks_enabled_plugins() {
        let mut list = two_settings();
        let x = list.find("X.esp").unwrap();
        let y = list.find("Y.esp").unwrap();
        assert_eq!(list.plugin(y).unwrap().load_order(), Some(1));
        list.set_state("X.esp", PluginState::Inactive).unwrap();
        assert_eq!(list.plugin(x).unwrap().load_order(), None);
        assert_eq!(list.plugin(y).unwrap().load_order(), Some(0));
        assert!(list.set_state("Nope.esp", PluginState::Active).is_err());
    }

    #[test]
    fn forced_plugins_resist_state_changes() {
        let base = PluginBuilder::new().flags(crate::format::record_flags::MASTER).build();
        let settings = Settings {
            primary_plugins: vec!["Base.esm".into()],
            ..Settings::default()
        };
        let mut list = PluginList::new(settings);
        list.scan_bytes(vec![("Base.esm".into(), base)]);
        let id = list.find("Base.esm").unwrap();
        list.set_enabled(id, false).unwrap();
        assert!(list.plugin(id).unwrap().enabled());
    }

    #[test]
    fn groups_are_opaque_strings() {
        let mut list = two_settings();
        let x = list.find("X.esp").unwrap();
        list.set_group(&[x, PluginId(99)], "Weather");
        assert_eq!(list.group("x.esp"), Some("Weather"));
        assert_eq!(list.group("Y.esp"), Some(""));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut list = two_settings();
        let err = list.set_enabled(PluginId(42), true).unwrap_err();
        assert!(matches!(err, PluginListError::UnknownId(PluginId(42))));
    }

    #[test]
    fn record_fields_has_one_column_per_alternative() {
        let list = two_settings();
        let record = list.index().find_setting("fGravity").unwrap();
        let tree = list.record_fields(record).unwrap();
        assert_eq!(tree.files().len(), 2);
        let value = tree.find_child(tree.root(), "Value").unwrap();
        assert!(tree.is_conflicted(value));
        assert!(tree.is_overriding(value, 1));
    }
}
