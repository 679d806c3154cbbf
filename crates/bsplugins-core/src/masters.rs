//! Translation of file-local master indices into owning file names.
//!
//! Every raw 32-bit id in a plugin carries, in its top byte, an index into
//! that file's own master list. This is the only place that index is
//! interpreted; everything downstream works with owner names.

use crate::id::FileName;

/// The file that owns an id whose master byte is `local_index`.
///
/// Index `masters.len()` names the file itself. Out-of-range indices are
/// treated the same way rather than rejected.
pub fn resolve_owner<'a>(
    local_index: u8,
    masters: &'a [FileName],
    file: &'a FileName,
) -> &'a FileName {
    masters.get(local_index as usize).unwrap_or(file)
}

/// Split a raw form id into its master byte and 24-bit object number.
pub const fn split_form_id(form_id: u32) -> (u8, u32) {
    ((form_id >> 24) as u8, form_id & 0x00FF_FFFF)
}
