//! Header layouts and the structural descriptors handed to reader handlers.

use crate::reader::DecodeError;
use crate::type_code::TypeCode;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Format eras
// ---------------------------------------------------------------------------

/// Record header layout, which differs between engine generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatEra {
    /// 24-byte headers (Fallout 3 onwards).
    Standard,
    /// 20-byte headers without the version word.
    Oblivion,
    /// 16-byte headers, 32-bit chunk sizes, no groups or form ids.
    Morrowind,
}

impl FormatEra {
    pub const fn header_size(self) -> usize {
        match self {
            FormatEra::Standard => 24,
            FormatEra::Oblivion => 20,
            FormatEra::Morrowind => 16,
        }
    }

    pub const fn chunk_header_size(self) -> usize {
        match self {
            FormatEra::Morrowind => 8,
            _ => 6,
        }
    }

    pub const fn has_groups(self) -> bool {
        !matches!(self, FormatEra::Morrowind)
    }

    /// Work out the era from the first record header of a file.
    pub fn detect(bytes: &[u8]) -> Result<FormatEra, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::Malformed {
                offset: 0,
                reason: "file is too short to hold a record header".into(),
            });
        }
        let first = TypeCode([bytes[0], bytes[1], bytes[2], bytes[3]]);
        match first {
            TypeCode::TES3 => Ok(FormatEra::Morrowind),
            TypeCode::TES4 => {
                if bytes.len() >= 24 && bytes[20..24] == TypeCode::HEDR.0 {
                    Ok(FormatEra::Oblivion)
                } else {
                    Ok(FormatEra::Standard)
                }
            }
            other => Err(DecodeError::UnsupportedHeader(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Record flags
// ---------------------------------------------------------------------------

/// Flag bits of the form header word.
pub mod record_flags {
    pub const MASTER: u32 = 0x1;
    pub const OPTIMIZED: u32 = 0x10;
    pub const DELETED: u32 = 0x20;
    pub const LOCALIZED: u32 = 0x80;
    /// Light flag on games that also support overlay plugins.
    pub const SMALL_NEW: u32 = 0x100;
    /// Light flag on games without overlay plugins.
    pub const SMALL_OLD: u32 = 0x200;
    /// Overlay ("update") flag; shares its bit with [`SMALL_OLD`].
    pub const OVERLAY: u32 = 0x200;
    pub const PERSISTENT: u32 = 0x400;
    pub const INITIALLY_DISABLED: u32 = 0x800;
    pub const IGNORED: u32 = 0x1000;
    pub const COMPRESSED: u32 = 0x40000;
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// How a group's label is to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum GroupKind {
    Top = 0,
    WorldChildren = 1,
    InteriorCellBlock = 2,
    InteriorCellSubBlock = 3,
    ExteriorCellBlock = 4,
    ExteriorCellSubBlock = 5,
    CellChildren = 6,
    TopicChildren = 7,
    CellPersistentChildren = 8,
    CellTemporaryChildren = 9,
    /// Also used for visible-distant cell children by older titles.
    QuestChildren = 10,
}

impl TryFrom<i32> for GroupKind {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => GroupKind::Top,
            1 => GroupKind::WorldChildren,
            2 => GroupKind::InteriorCellBlock,
            3 => GroupKind::InteriorCellSubBlock,
            4 => GroupKind::ExteriorCellBlock,
            5 => GroupKind::ExteriorCellSubBlock,
            6 => GroupKind::CellChildren,
            7 => GroupKind::TopicChildren,
            8 => GroupKind::CellPersistentChildren,
            9 => GroupKind::CellTemporaryChildren,
            10 => GroupKind::QuestChildren,
            other => return Err(other),
        })
    }
}

/// A group header: the raw label plus its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupData {
    pub label: u32,
    pub kind: GroupKind,
}

impl GroupData {
    pub const fn new(label: u32, kind: GroupKind) -> Self {
        Self { label, kind }
    }

    pub const fn top(form_type: TypeCode) -> Self {
        Self::new(form_type.to_u32(), GroupKind::Top)
    }

    pub const fn has_form_type(&self) -> bool {
        matches!(self.kind, GroupKind::Top)
    }

    pub const fn has_parent(&self) -> bool {
        matches!(
            self.kind,
            GroupKind::WorldChildren
                | GroupKind::CellChildren
                | GroupKind::TopicChildren
                | GroupKind::CellPersistentChildren
                | GroupKind::CellTemporaryChildren
                | GroupKind::QuestChildren
        )
    }

    /// Children groups that immediately follow their parent form.
    pub const fn has_direct_parent(&self) -> bool {
        matches!(
            self.kind,
            GroupKind::WorldChildren
                | GroupKind::CellChildren
                | GroupKind::TopicChildren
                | GroupKind::QuestChildren
        )
    }

    pub const fn has_block(&self) -> bool {
        matches!(
            self.kind,
            GroupKind::InteriorCellBlock | GroupKind::InteriorCellSubBlock
        )
    }

    pub const fn has_grid_cell(&self) -> bool {
        matches!(
            self.kind,
            GroupKind::ExteriorCellBlock | GroupKind::ExteriorCellSubBlock
        )
    }

    pub const fn form_type(&self) -> TypeCode {
        TypeCode::from_u32(self.label)
    }

    /// Parent form id for children groups.
    pub const fn parent(&self) -> u32 {
        self.label
    }

    pub const fn block(&self) -> i32 {
        self.label as i32
    }

    /// Grid coordinates as `(x, y)`; stored as y in the low half, x in the high half.
    pub const fn grid_cell(&self) -> (i16, i16) {
        let y = (self.label & 0xFFFF) as u16 as i16;
        let x = (self.label >> 16) as u16 as i16;
        (x, y)
    }

    pub const fn local_index(&self) -> u8 {
        (self.label >> 24) as u8
    }

    /// Replace the master index byte of the parent reference. No-op for
    /// groups without a parent.
    pub fn set_local_index(&mut self, index: u8) {
        if self.has_parent() {
            self.label = (self.label & 0x00FF_FFFF) | ((index as u32) << 24);
        }
    }
}

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

/// A form header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormData {
    pub form_type: TypeCode,
    pub flags: u32,
    pub form_id: u32,
    pub data_size: u32,
}

impl FormData {
    pub const fn local_index(&self) -> u8 {
        (self.form_id >> 24) as u8
    }

    /// The 24-bit object number within the owning file.
    pub const fn object_index(&self) -> u32 {
        self.form_id & 0x00FF_FFFF
    }

    pub const fn is_compressed(&self) -> bool {
        self.flags & record_flags::COMPRESSED != 0
    }
}
