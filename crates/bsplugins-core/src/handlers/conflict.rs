//! The scan-time handler: header metadata plus every record a file provides
//! an alternative for.
//!
//! Forms outside any group other than the file header are declined rather
//! than rejected. Morrowind files hold all their records that way, and later
//! formats occasionally carry stray ones that the games ignore.

use crate::config::Settings;
use crate::cursor::Cursor;
use crate::format::{FormData, FormatEra, GroupData, record_flags};
use crate::id::FileName;
use crate::plugin::PluginMetadata;
use crate::reader::{DecodeError, ReaderHandler};
use crate::record_path::RecordPath;
use crate::type_code::TypeCode;
use tracing::warn;

/// One record a file provides an alternative for.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFact {
    pub path: RecordPath,
    pub form_type: TypeCode,
    pub editor_name: Option<String>,
}

/// Everything a scan learns from one file.
#[derive(Debug, Clone, Default)]
pub struct PluginFacts {
    pub metadata: PluginMetadata,
    pub records: Vec<RecordFact>,
    /// Children groups that were not descended into.
    pub child_groups: Vec<RecordPath>,
    pub era: Option<FormatEra>,
}

/// The `HEDR` chunk. Morrowind also stores the file type, author and
/// description here.
struct HeaderData {
    version: f32,
    records: i64,
    file_type: Option<u32>,
    author: Option<String>,
    description: Option<String>,
}

impl HeaderData {
    fn read(data: &mut Cursor<'_>, morrowind: bool) -> Result<Self, DecodeError> {
        if morrowind {
            let version = data.read_f32()?;
            let file_type = data.read_u32()?;
            let author = data.read_fixed_string(32)?;
            let description = data.read_fixed_string(256)?;
            let records = data.read_u32()?;
            Ok(Self {
                version,
                records: i64::from(records),
                file_type: Some(file_type),
                author: Some(author),
                description: Some(description),
            })
        } else {
            let version = data.read_f32()?;
            let records = data.read_i32()?;
            let _next_object_id = data.read_u32()?;
            Ok(Self {
                version,
                records: i64::from(records),
                file_type: None,
                author: None,
                description: None,
            })
        }
    }
}

/// Collects header metadata and every record that overrides a master.
///
/// Records new to the file are skipped: nothing earlier can conflict with
/// them, and later files register them through their owner. A file without
/// masters therefore only contributes settings and default objects.
pub struct ConflictScanner<'a> {
    file: &'a FileName,
    light_supported: bool,
    overlay_supported: bool,
    index_child_groups: bool,
    facts: PluginFacts,
    path: RecordPath,
    current_type: TypeCode,
    current_chunk: TypeCode,
    current_name: Option<String>,
}

impl<'a> ConflictScanner<'a> {
    pub fn new(file: &'a FileName, settings: &Settings) -> Self {
        Self {
            file,
            light_supported: settings.light_plugins_supported(),
            overlay_supported: settings.overlay_plugins_supported(),
            index_child_groups: settings.index_child_groups,
            facts: PluginFacts::default(),
            path: RecordPath::new(),
            current_type: TypeCode::default(),
            current_chunk: TypeCode::default(),
            current_name: None,
        }
    }

    pub fn finish(mut self, era: FormatEra) -> PluginFacts {
        self.facts.era = Some(era);
        self.facts
    }

    fn masters(&self) -> &[FileName] {
        &self.facts.metadata.masters
    }

    fn in_header(&self) -> bool {
        self.path.groups().is_empty()
    }

    fn record_fact(&mut self, form_type: TypeCode, editor_name: Option<String>) {
        self.facts.records.push(RecordFact {
            path: self.path.clone(),
            form_type,
            editor_name,
        });
    }

    fn header_flags(&mut self, flags: u32) {
        let meta = &mut self.facts.metadata;
        meta.master_flagged = flags & record_flags::MASTER != 0;
        meta.localized = flags & record_flags::LOCALIZED != 0;
        meta.overlay_flagged = self.overlay_supported && flags & record_flags::OVERLAY != 0;
        meta.light_flagged = if self.overlay_supported {
            flags & record_flags::SMALL_NEW != 0
        } else if self.light_supported {
            flags & record_flags::SMALL_OLD != 0
        } else {
            false
        };
    }

    fn header_data(&mut self, data: &mut Cursor<'_>) -> Result<(), DecodeError> {
        match self.current_chunk {
            TypeCode::HEDR => {
                let morrowind = self.current_type == TypeCode::TES3;
                match HeaderData::read(data, morrowind) {
                    Ok(header) => {
                        let meta = &mut self.facts.metadata;
                        meta.version = header.version;
                        meta.has_no_records = header.records == 0;
                        if let Some(file_type) = header.file_type {
                            meta.master_flagged = file_type == 1;
                        }
                        if let Some(author) = header.author.filter(|a| !a.is_empty()) {
                            meta.author = author;
                        }
                        if let Some(description) = header.description.filter(|d| !d.is_empty()) {
                            meta.description = description;
                        }
                    }
                    Err(err) => warn!(file = %self.file, error = %err, "failed to read HEDR data"),
                }
            }
            TypeCode::MAST => {
                let master = data.read_zstring()?;
                self.facts.metadata.add_master(FileName::new(master));
            }
            TypeCode::CNAM => {
                let author = data.read_zstring()?;
                if !author.is_empty() {
                    self.facts.metadata.author = author;
                }
            }
            TypeCode::SNAM => {
                let description = data.read_zstring()?;
                if !description.is_empty() {
                    self.facts.metadata.description = description;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn default_object_data(&mut self, data: &mut Cursor<'_>) -> Result<(), DecodeError> {
        while data.remaining() >= 8 {
            let slot = data.read_type_code()?;
            let _form_id = data.read_u32()?;
            if slot.is_zero() {
                continue;
            }
            if slot == TypeCode::BBBB {
                break;
            }
            self.path.set_type_id(slot);
            self.record_fact(TypeCode::DOBJ, None);
        }
        Ok(())
    }
}

impl ReaderHandler for ConflictScanner<'_> {
    fn group(&mut self, group: &GroupData) -> bool {
        if group.has_direct_parent() && !self.index_child_groups {
            self.path.push(*group, &self.facts.metadata.masters, self.file);
            self.facts.child_groups.push(self.path.clone());
            self.path.pop();
            return false;
        }
        if group.has_form_type() {
            let form_type = group.form_type();
            if self.masters().is_empty()
                && form_type != TypeCode::GMST
                && form_type != TypeCode::DOBJ
            {
                return false;
            }
            if form_type == TypeCode::NAVI {
                return false;
            }
        }
        self.path.push(*group, &self.facts.metadata.masters, self.file);
        true
    }

    fn end_group(&mut self) {
        self.path.pop();
    }

    fn form(&mut self, form: &FormData) -> bool {
        self.current_type = form.form_type;
        self.current_name = None;

        if self.in_header() {
            if form.form_type == TypeCode::TES4 || form.form_type == TypeCode::TES3 {
                self.header_flags(form.flags);
                return true;
            }
            // Ungrouped, so no record path can address it.
            return false;
        }

        match self.path.top_form_type() {
            Some(TypeCode::GMST) | Some(TypeCode::DOBJ) => true,
            _ => {
                let masters = &self.facts.metadata.masters;
                self.path.set_form_id(form.form_id, masters, self.file);
                if (form.local_index() as usize) < masters.len() {
                    true
                } else {
                    self.path.unset();
                    false
                }
            }
        }
    }

    fn end_form(&mut self) {
        let form_type = self.current_type;
        if !matches!(
            form_type,
            TypeCode::TES4 | TypeCode::TES3 | TypeCode::GMST | TypeCode::DOBJ
        ) {
            let name = self.current_name.take();
            self.record_fact(form_type, name);
        }
        self.path.unset();
        self.current_type = TypeCode::default();
        self.current_chunk = TypeCode::default();
        self.current_name = None;
    }

    fn chunk(&mut self, chunk_type: TypeCode) -> bool {
        self.current_chunk = chunk_type;
        if self.in_header() {
            matches!(
                chunk_type,
                TypeCode::HEDR | TypeCode::MAST | TypeCode::CNAM | TypeCode::SNAM
            )
        } else if self.path.top_form_type() == Some(TypeCode::DOBJ) {
            chunk_type == TypeCode::DNAM
        } else {
            chunk_type == TypeCode::EDID
        }
    }

    fn chunk_data(
        &mut self,
        _chunk_type: TypeCode,
        data: &mut Cursor<'_>,
    ) -> Result<(), DecodeError> {
        if self.in_header() {
            return self.header_data(data);
        }
        match self.path.top_form_type() {
            Some(TypeCode::DOBJ) => self.default_object_data(data),
            Some(TypeCode::GMST) => {
                let editor_id = data.read_zstring()?;
                self.path.set_editor_id(editor_id);
                self.record_fact(TypeCode::GMST, None);
                Ok(())
            }
            _ => {
                self.current_name = Some(data.read_zstring()?);
                Ok(())
            }
        }
    }
}
