//! Cross-file record identity.
//!
//! Records live in a single arena and are referenced by [`RecordId`] from
//! every [`FileEntry`] that provides them. The relation is many-to-many but
//! records only hold handles, never references back into entries, so there
//! are no ownership cycles.
//!
//! Membership is mutual: a handle appears in a record's alternatives exactly
//! when that handle's entry maps some key to the record.
//! [`OverrideIndex::assert_consistent`] checks this.

use crate::id::{FileHandle, FileName, RecordId};
use crate::record::{Record, RecordKey};
use crate::record_path::{Identifier, RecordPath};
use crate::type_code::TypeCode;
use slotmap::SlotMap;
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// FileEntry
// ---------------------------------------------------------------------------

/// The records one file participates in.
#[derive(Debug, Clone)]
pub struct FileEntry {
    handle: FileHandle,
    name: FileName,
    forms: HashMap<(FileName, u32), RecordId>,
    settings: HashMap<String, RecordId>,
    default_objects: BTreeMap<TypeCode, RecordId>,
    /// Discovery order across all three maps.
    records: Vec<RecordId>,
    /// Children groups seen but not descended into.
    child_groups: Vec<RecordPath>,
}

impl FileEntry {
    fn new(handle: FileHandle, name: FileName) -> Self {
        Self {
            handle,
            name,
            forms: HashMap::new(),
            settings: HashMap::new(),
            default_objects: BTreeMap::new(),
            records: Vec::new(),
            child_groups: Vec::new(),
        }
    }

    pub fn handle(&self) -> FileHandle {
        self.handle
    }

    pub fn name(&self) -> &FileName {
        &self.name
    }

    /// Every record this file provides, in discovery order.
    pub fn records(&self) -> &[RecordId] {
        &self.records
    }

    pub fn child_groups(&self) -> &[RecordPath] {
        &self.child_groups
    }

    pub fn form(&self, owner: &FileName, object: u32) -> Option<RecordId> {
        self.forms.get(&(owner.clone(), object)).copied()
    }

    pub fn setting(&self, key: &str) -> Option<RecordId> {
        self.settings.get(key).copied()
    }

    pub fn default_object(&self, code: TypeCode) -> Option<RecordId> {
        self.default_objects.get(&code).copied()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains(&id)
    }

    fn insert(&mut self, key: &RecordKey, id: RecordId) {
        let fresh = match key {
            RecordKey::Form { owner, object } => {
                self.forms.insert((owner.clone(), *object), id).is_none()
            }
            RecordKey::Setting(name) => self.settings.insert(name.clone(), id).is_none(),
            RecordKey::DefaultObject(code) => {
                self.default_objects.insert(*code, id).is_none()
            }
        };
        if fresh {
            self.records.push(id);
        }
    }
}

// ---------------------------------------------------------------------------
// OverrideIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OverrideIndex {
    records: SlotMap<RecordId, Record>,
    entries: Vec<FileEntry>,
    by_name: HashMap<FileName, FileHandle>,
    settings: HashMap<String, RecordId>,
    default_objects: BTreeMap<TypeCode, RecordId>,
}

impl OverrideIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record and entry. Handles restart from zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Handle for `name`, assigning the next one on first sight.
    pub fn create_entry(&mut self, name: &FileName) -> FileHandle {
        if let Some(&handle) = self.by_name.get(name) {
            return handle;
        }
        let handle = FileHandle(self.entries.len() as u32);
        self.entries.push(FileEntry::new(handle, name.clone()));
        self.by_name.insert(name.clone(), handle);
        handle
    }

    pub fn handle(&self, name: &FileName) -> Option<FileHandle> {
        self.by_name.get(name).copied()
    }

    pub fn entry(&self, handle: FileHandle) -> Option<&FileEntry> {
        self.entries.get(handle.0 as usize)
    }

    pub fn entry_by_name(&self, name: &FileName) -> Option<&FileEntry> {
        self.handle(name).and_then(|h| self.entry(h))
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set_ignored(&mut self, id: RecordId, ignored: bool) {
        if let Some(record) = self.records.get_mut(id) {
            record.ignored = ignored;
        }
    }

    /// Record `plugin` as providing the record at `path`.
    ///
    /// Form records are created in their owner's entry, and the owner is
    /// always an alternative even if the owner itself was never scanned.
    /// Settings and default objects have no owner; only the files that
    /// declare them become alternatives. Returns `None` for a path without
    /// a terminal identifier.
    pub fn add_alternative(
        &mut self,
        plugin: &FileName,
        path: &RecordPath,
        form_type: TypeCode,
        editor_name: Option<&str>,
    ) -> Option<RecordId> {
        let id = match path.identifier() {
            Identifier::None => return None,
            Identifier::FormId(id) => {
                let owner = path.owner().cloned().unwrap_or_else(|| plugin.clone());
                let key = RecordKey::Form {
                    owner: owner.clone(),
                    object: id & 0x00FF_FFFF,
                };
                let owner_handle = self.create_entry(&owner);
                let existing =
                    self.entries[owner_handle.0 as usize].form(&owner, id & 0x00FF_FFFF);
                let record = match existing {
                    Some(record) => record,
                    None => {
                        let record = self
                            .records
                            .insert(Record::new(form_type, key.clone(), path.clone()));
                        self.link(owner_handle, &key, record);
                        record
                    }
                };
                if *plugin != owner {
                    let handle = self.create_entry(plugin);
                    self.link(handle, &key, record);
                }
                record
            }
            Identifier::EditorId(name) => {
                let key = RecordKey::Setting(name.clone());
                let record = match self.settings.get(name) {
                    Some(&record) => record,
                    None => {
                        let record = self
                            .records
                            .insert(Record::new(form_type, key.clone(), path.clone()));
                        self.settings.insert(name.clone(), record);
                        record
                    }
                };
                let handle = self.create_entry(plugin);
                self.link(handle, &key, record);
                record
            }
            Identifier::TypeId(code) => {
                let key = RecordKey::DefaultObject(*code);
                let record = match self.default_objects.get(code) {
                    Some(&record) => record,
                    None => {
                        let record = self
                            .records
                            .insert(Record::new(form_type, key.clone(), path.clone()));
                        self.default_objects.insert(*code, record);
                        record
                    }
                };
                let handle = self.create_entry(plugin);
                self.link(handle, &key, record);
                record
            }
        };

        if let Some(name) = editor_name.filter(|n| !n.is_empty())
            && let Some(record) = self.records.get_mut(id)
            && record.editor_name.is_none()
        {
            record.editor_name = Some(name.to_string());
        }
        Some(id)
    }

    fn link(&mut self, handle: FileHandle, key: &RecordKey, record: RecordId) {
        self.entries[handle.0 as usize].insert(key, record);
        if let Some(r) = self.records.get_mut(record) {
            r.add_alternative(handle);
        }
    }

    /// Remember a children group that was not descended into, for both the
    /// parent's owner and `plugin`.
    pub fn add_child_group(&mut self, plugin: &FileName, path: &RecordPath) {
        let owner = path
            .groups()
            .last()
            .and_then(|g| path.group_owner(g))
            .cloned();
        if let Some(owner) = &owner
            && let Some(handle) = self.handle(owner)
        {
            self.entries[handle.0 as usize].child_groups.push(path.clone());
        }
        if owner.as_ref() != Some(plugin)
            && let Some(handle) = self.handle(plugin)
        {
            self.entries[handle.0 as usize].child_groups.push(path.clone());
        }
    }

    pub fn find_form(&self, owner: &FileName, object: u32) -> Option<RecordId> {
        self.entry_by_name(owner)?.form(owner, object & 0x00FF_FFFF)
    }

    pub fn find_setting(&self, key: &str) -> Option<RecordId> {
        self.settings.get(key).copied()
    }

    pub fn find_default_object(&self, code: TypeCode) -> Option<RecordId> {
        self.default_objects.get(&code).copied()
    }

    /// Look up the record a path denotes.
    pub fn find(&self, path: &RecordPath) -> Option<RecordId> {
        match path.identifier() {
            Identifier::None => None,
            Identifier::FormId(id) => self.find_form(path.owner()?, *id),
            Identifier::EditorId(name) => self.find_setting(name),
            Identifier::TypeId(code) => self.find_default_object(*code),
        }
    }

    /// Panic if any record lists an alternative whose entry does not list
    /// the record back, or the other way round.
    pub fn assert_consistent(&self) {
        for (id, record) in &self.records {
            for &handle in record.alternatives() {
                let entry = self.entry(handle).unwrap_or_else(|| {
                    panic!(
                        "identity mismatch: record {} names unknown file {handle:?}",
                        record.path()
                    )
                });
                assert!(
                    entry.contains(id),
                    "identity mismatch: record {} lists {} but the entry does not contain it",
                    record.path(),
                    entry.name()
                );
            }
        }
        for entry in &self.entries {
            for &id in entry.records() {
                let record = self.records.get(id).unwrap_or_else(|| {
                    panic!("identity mismatch: {} holds a dangling record", entry.name())
                });
                assert!(
                    record.has_alternative(entry.handle()),
                    "identity mismatch: {} holds {} without being an alternative",
                    entry.name(),
                    record.path()
                );
            }
        }
    }
}
