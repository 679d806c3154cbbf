//! Four-byte type tags used for groups, forms and chunks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 4-byte tag such as `TES4`, `GRUP` or `EDID`.
///
/// Ordered bytewise so it can key sorted maps; copied by value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TypeCode(pub [u8; 4]);

impl TypeCode {
    pub const GRUP: TypeCode = TypeCode(*b"GRUP");
    pub const TES3: TypeCode = TypeCode(*b"TES3");
    pub const TES4: TypeCode = TypeCode(*b"TES4");
    pub const HEDR: TypeCode = TypeCode(*b"HEDR");
    pub const MAST: TypeCode = TypeCode(*b"MAST");
    pub const CNAM: TypeCode = TypeCode(*b"CNAM");
    pub const SNAM: TypeCode = TypeCode(*b"SNAM");
    pub const XXXX: TypeCode = TypeCode(*b"XXXX");
    pub const EDID: TypeCode = TypeCode(*b"EDID");
    pub const DATA: TypeCode = TypeCode(*b"DATA");
    pub const DNAM: TypeCode = TypeCode(*b"DNAM");
    pub const FULL: TypeCode = TypeCode(*b"FULL");
    pub const OBND: TypeCode = TypeCode(*b"OBND");
    pub const FNAM: TypeCode = TypeCode(*b"FNAM");
    pub const FLTV: TypeCode = TypeCode(*b"FLTV");
    pub const KSIZ: TypeCode = TypeCode(*b"KSIZ");
    pub const KWDA: TypeCode = TypeCode(*b"KWDA");
    pub const GMST: TypeCode = TypeCode(*b"GMST");
    pub const GLOB: TypeCode = TypeCode(*b"GLOB");
    pub const DOBJ: TypeCode = TypeCode(*b"DOBJ");
    pub const KYWD: TypeCode = TypeCode(*b"KYWD");
    pub const NAVI: TypeCode = TypeCode(*b"NAVI");
    pub const BBBB: TypeCode = TypeCode(*b"BBBB");

    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Build from a little-endian u32 as stored in group labels.
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub const fn is_zero(self) -> bool {
        self.to_u32() == 0
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode({self})")
    }
}

impl From<&[u8; 4]> for TypeCode {
    fn from(value: &[u8; 4]) -> Self {
        Self(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_bytewise() {
        assert!(TypeCode::EDID < TypeCode::GMST);
        assert!(TypeCode(*b"AAAA") < TypeCode(*b"AAAB"));
    }

    #[test]
    fn u32_round_trip_is_little_endian() {
        let code = TypeCode::from_u32(u32::from_le_bytes(*b"GMST"));
        assert_eq!(code, TypeCode::GMST);
        assert_eq!(code.to_u32(), u32::from_le_bytes(*b"GMST"));
    }

    #[test]
    fn display_escapes_binary() {
        assert_eq!(TypeCode::TES4.to_string(), "TES4");
        assert_eq!(TypeCode([b'A', 0, b'B', b'C']).to_string(), "A\\x00BC");
    }
}
