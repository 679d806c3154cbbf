//! File-independent addresses for logical records.
//!
//! A [`RecordPath`] is built while walking one file, but every master index it
//! stores points into the path's own `files` list rather than the file's
//! master list. Two files that number their masters differently therefore
//! produce equal paths for the same record.

use crate::format::GroupData;
use crate::id::FileName;
use crate::masters::{resolve_owner, split_form_id};
use crate::type_code::TypeCode;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Terminal identifier of a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    #[default]
    None,
    /// Object number with the path-local file index in the top byte.
    FormId(u32),
    EditorId(String),
    TypeId(TypeCode),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordPath {
    files: SmallVec<[FileName; 2]>,
    groups: SmallVec<[GroupData; 4]>,
    identifier: Identifier,
}

impl RecordPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[FileName] {
        &self.files
    }

    pub fn groups(&self) -> &[GroupData] {
        &self.groups
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn form_id(&self) -> Option<u32> {
        match self.identifier {
            Identifier::FormId(id) => Some(id),
            _ => None,
        }
    }

    pub fn editor_id(&self) -> Option<&str> {
        match &self.identifier {
            Identifier::EditorId(id) => Some(id),
            _ => None,
        }
    }

    pub fn type_id(&self) -> Option<TypeCode> {
        match self.identifier {
            Identifier::TypeId(code) => Some(code),
            _ => None,
        }
    }

    /// Top-level form type of the path, if it starts in a top group.
    pub fn top_form_type(&self) -> Option<TypeCode> {
        self.groups
            .first()
            .filter(|g| g.has_form_type())
            .map(|g| g.form_type())
    }

    /// Owning file of the terminal form id.
    pub fn owner(&self) -> Option<&FileName> {
        let id = self.form_id()?;
        self.files.get((id >> 24) as usize)
    }

    /// Owning file of a parent reference in one of this path's groups.
    pub fn group_owner(&self, group: &GroupData) -> Option<&FileName> {
        if group.has_parent() {
            self.files.get(group.local_index() as usize)
        } else {
            None
        }
    }

    /// Register `owner` in the path-local list, returning its index.
    fn intern(&mut self, owner: &FileName) -> u8 {
        match self.files.iter().position(|f| f == owner) {
            Some(i) => i as u8,
            None => {
                self.files.push(owner.clone());
                (self.files.len() - 1) as u8
            }
        }
    }

    /// Append a group, translating its parent reference (if any) through
    /// `masters` of `file`.
    pub fn push(&mut self, mut group: GroupData, masters: &[FileName], file: &FileName) {
        let saved = std::mem::take(&mut self.identifier);
        if group.has_parent() {
            let owner = resolve_owner(group.local_index(), masters, file);
            let index = self.intern(owner);
            group.set_local_index(index);
        }
        self.groups.push(group);
        self.identifier = saved;
    }

    /// Remove the innermost group, evicting any file no longer referenced.
    pub fn pop(&mut self) -> Option<GroupData> {
        let saved = std::mem::take(&mut self.identifier);
        let group = self.groups.pop();
        self.identifier = saved;
        self.evict_unreferenced();
        group
    }

    /// Set a form id, translating its master byte through `masters` of `file`.
    pub fn set_form_id(&mut self, form_id: u32, masters: &[FileName], file: &FileName) {
        self.unset();
        let (local, object) = split_form_id(form_id);
        let owner = resolve_owner(local, masters, file);
        let index = self.intern(owner);
        self.identifier = Identifier::FormId(object | ((index as u32) << 24));
    }

    pub fn set_editor_id(&mut self, editor_id: impl Into<String>) {
        self.unset();
        self.identifier = Identifier::EditorId(editor_id.into());
    }

    pub fn set_type_id(&mut self, type_id: TypeCode) {
        self.unset();
        self.identifier = Identifier::TypeId(type_id);
    }

    /// Clear the terminal identifier.
    pub fn unset(&mut self) {
        if matches!(self.identifier, Identifier::None) {
            return;
        }
        self.identifier = Identifier::None;
        self.evict_unreferenced();
    }

    fn references(&self, index: u8) -> bool {
        let in_groups = self
            .groups
            .iter()
            .any(|g| g.has_parent() && g.local_index() == index);
        let in_id = matches!(self.identifier, Identifier::FormId(id) if (id >> 24) as u8 == index);
        in_groups || in_id
    }

    fn evict_unreferenced(&mut self) {
        let mut index = 0usize;
        while index < self.files.len() {
            if self.references(index as u8) {
                index += 1;
                continue;
            }
            self.files.remove(index);
            let removed = index as u8;
            for group in &mut self.groups {
                if group.has_parent() && group.local_index() > removed {
                    let shifted = group.local_index() - 1;
                    group.set_local_index(shifted);
                }
            }
            if let Identifier::FormId(id) = &mut self.identifier {
                let local = (*id >> 24) as u8;
                if local > removed {
                    *id = (*id & 0x00FF_FFFF) | (((local - 1) as u32) << 24);
                }
            }
        }
    }

    /// True if `group` at `depth` matches this path's group at that depth.
    pub fn group_matches(
        &self,
        depth: usize,
        group: &GroupData,
        masters: &[FileName],
        file: &FileName,
    ) -> bool {
        let Some(expected) = self.groups.get(depth) else {
            return false;
        };
        if expected.kind != group.kind {
            return false;
        }
        if group.has_parent() {
            let owner = resolve_owner(group.local_index(), masters, file);
            self.group_owner(expected) == Some(owner)
                && (expected.label & 0x00FF_FFFF) == (group.label & 0x00FF_FFFF)
        } else {
            expected.label == group.label
        }
    }

    /// True if the raw `form_id` seen in `file` denotes this path's terminal form.
    pub fn form_matches(&self, form_id: u32, masters: &[FileName], file: &FileName) -> bool {
        let Some(expected) = self.form_id() else {
            return false;
        };
        let (local, object) = split_form_id(form_id);
        object == (expected & 0x00FF_FFFF)
            && self.owner() == Some(resolve_owner(local, masters, file))
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::format::GroupKind;

        f.write_str(":/")?;
        for group in &self.groups {
            if group.has_form_type() {
                write!(f, "{}/", group.form_type())?;
            } else if group.has_parent() {
                match group.kind {
                    GroupKind::CellPersistentChildren => f.write_str("Persistent/")?,
                    GroupKind::CellTemporaryChildren => f.write_str("Temporary/")?,
                    _ => {
                        let owner = self
                            .group_owner(group)
                            .map(FileName::as_str)
                            .unwrap_or("?");
                        write!(f, "{owner}|{:06x}/", group.parent() & 0x00FF_FFFF)?;
                    }
                }
            } else if group.has_block() {
                write!(f, "{}/", group.block())?;
            } else if group.has_grid_cell() {
                let (x, y) = group.grid_cell();
                write!(f, "{x}, {y}/")?;
            }
        }
        match &self.identifier {
            Identifier::None => Ok(()),
            Identifier::FormId(id) => {
                let owner = self.owner().map(FileName::as_str).unwrap_or("?");
                write!(f, "{owner}|{:06x}", id & 0x00FF_FFFF)
            }
            Identifier::EditorId(id) => f.write_str(id),
            Identifier::TypeId(code) => write!(f, "{code}"),
        }
    }
}
