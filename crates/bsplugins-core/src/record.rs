use crate::id::{FileHandle, FileName};
use crate::record_path::RecordPath;
use crate::type_code::TypeCode;
use smallvec::SmallVec;

/// What makes two records from different files the same logical record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Owning master plus the 24-bit object number.
    Form { owner: FileName, object: u32 },
    /// Game settings, keyed by editor id.
    Setting(String),
    /// Default-object slots, keyed by their type code.
    DefaultObject(TypeCode),
}

/// One logical record and every file that provides a copy of it.
///
/// The alternatives are kept in discovery order. The winner is never stored;
/// it depends on the current load order and is computed on demand.
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) form_type: TypeCode,
    pub(crate) key: RecordKey,
    pub(crate) path: RecordPath,
    pub(crate) editor_name: Option<String>,
    pub(crate) alternatives: SmallVec<[FileHandle; 4]>,
    pub(crate) ignored: bool,
}

impl Record {
    pub(crate) fn new(form_type: TypeCode, key: RecordKey, path: RecordPath) -> Self {
        Self {
            form_type,
            key,
            path,
            editor_name: None,
            alternatives: SmallVec::new(),
            ignored: false,
        }
    }

    pub fn form_type(&self) -> TypeCode {
        self.form_type
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Address of the record, as first discovered.
    pub fn path(&self) -> &RecordPath {
        &self.path
    }

    /// Editor id of the first copy that carried one.
    pub fn editor_name(&self) -> Option<&str> {
        self.editor_name.as_deref()
    }

    pub fn alternatives(&self) -> &[FileHandle] {
        &self.alternatives
    }

    pub fn has_alternative(&self, handle: FileHandle) -> bool {
        self.alternatives.contains(&handle)
    }

    /// Ignored records do not count towards conflict summaries.
    pub fn ignored(&self) -> bool {
        self.ignored
    }

    pub(crate) fn add_alternative(&mut self, handle: FileHandle) {
        if !self.alternatives.contains(&handle) {
            self.alternatives.push(handle);
        }
    }
}
