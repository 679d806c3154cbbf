//! Builders for synthetic plugin files.
//!
//! Shared with the other workspace crates through the `test-utils` feature.

use crate::format::{FormatEra, GroupKind, record_flags};
use crate::type_code::TypeCode;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

const HEADER_VERSION: f32 = 1.71;
const MORROWIND_VERSION: f32 = 1.3;

enum Entry {
    Form(FormBuilder),
    Group(GroupBuilder),
}

fn write_entries(out: &mut Vec<u8>, era: FormatEra, entries: &[Entry]) {
    for entry in entries {
        match entry {
            Entry::Form(form) => form.write(out, era),
            Entry::Group(group) => group.write(out, era),
        }
    }
}

fn write_chunks(era: FormatEra, chunks: &[(TypeCode, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (code, data) in chunks {
        if era == FormatEra::Morrowind {
            out.extend_from_slice(&code.0);
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        } else if data.len() > u16::MAX as usize {
            out.extend_from_slice(&TypeCode::XXXX.0);
            out.extend_from_slice(&4u16.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&code.0);
            out.extend_from_slice(&0u16.to_le_bytes());
        } else {
            out.extend_from_slice(&code.0);
            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        }
        out.extend_from_slice(data);
    }
    out
}

fn zstring(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn fixed_string(s: &str, len: usize) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(len, 0);
    bytes
}

/// Padding after the common header fields.
fn header_tail(era: FormatEra) -> &'static [u8] {
    match era {
        FormatEra::Standard => &[0; 8],
        FormatEra::Oblivion => &[0; 4],
        FormatEra::Morrowind => &[],
    }
}

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

/// A form with its chunks.
pub struct FormBuilder {
    form_type: TypeCode,
    form_id: u32,
    flags: u32,
    chunks: Vec<(TypeCode, Vec<u8>)>,
    compressed: bool,
    raw_body: Option<Vec<u8>>,
}

impl FormBuilder {
    pub fn new(form_type: TypeCode, form_id: u32) -> Self {
        Self {
            form_type,
            form_id,
            flags: 0,
            chunks: Vec::new(),
            compressed: false,
            raw_body: None,
        }
    }

    pub fn edid(self, editor_id: &str) -> Self {
        self.zstring_chunk(TypeCode::EDID, editor_id)
    }

    pub fn chunk(mut self, code: TypeCode, data: Vec<u8>) -> Self {
        self.chunks.push((code, data));
        self
    }

    pub fn zstring_chunk(self, code: TypeCode, value: &str) -> Self {
        self.chunk(code, zstring(value))
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Store the chunks zlib-compressed.
    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    /// Use `body` verbatim instead of encoding chunks.
    pub fn raw_body(mut self, body: Vec<u8>, flags: u32) -> Self {
        self.raw_body = Some(body);
        self.flags |= flags;
        self
    }

    fn body(&self, era: FormatEra) -> (Vec<u8>, u32) {
        if let Some(raw) = &self.raw_body {
            return (raw.clone(), self.flags);
        }
        let chunks = write_chunks(era, &self.chunks);
        if !self.compressed {
            return (chunks, self.flags);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&chunks).unwrap();
        let packed = encoder.finish().unwrap();
        let mut body = (chunks.len() as u32).to_le_bytes().to_vec();
        body.extend_from_slice(&packed);
        (body, self.flags | record_flags::COMPRESSED)
    }

    fn write(&self, out: &mut Vec<u8>, era: FormatEra) {
        let (body, flags) = self.body(era);
        out.extend_from_slice(&self.form_type.0);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        if era == FormatEra::Morrowind {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
        } else {
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&self.form_id.to_le_bytes());
            out.extend_from_slice(header_tail(era));
        }
        out.extend_from_slice(&body);
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A group of forms and nested groups.
pub struct GroupBuilder {
    label: u32,
    kind: GroupKind,
    entries: Vec<Entry>,
}

impl GroupBuilder {
    pub fn new(label: u32, kind: GroupKind) -> Self {
        Self {
            label,
            kind,
            entries: Vec::new(),
        }
    }

    pub fn top(form_type: TypeCode) -> Self {
        Self::new(form_type.to_u32(), GroupKind::Top)
    }

    pub fn form(mut self, form: FormBuilder) -> Self {
        self.entries.push(Entry::Form(form));
        self
    }

    pub fn group(mut self, group: GroupBuilder) -> Self {
        self.entries.push(Entry::Group(group));
        self
    }

    fn write(&self, out: &mut Vec<u8>, era: FormatEra) {
        let mut body = Vec::new();
        write_entries(&mut body, era, &self.entries);
        let size = era.header_size() + body.len();
        out.extend_from_slice(&TypeCode::GRUP.0);
        out.extend_from_slice(&(size as u32).to_le_bytes());
        out.extend_from_slice(&self.label.to_le_bytes());
        out.extend_from_slice(&(self.kind as i32).to_le_bytes());
        out.extend_from_slice(header_tail(era));
        out.extend_from_slice(&body);
    }
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// A whole plugin: header record followed by groups (or, for Morrowind,
/// bare forms).
pub struct PluginBuilder {
    era: FormatEra,
    flags: u32,
    masters: Vec<String>,
    author: Option<String>,
    description: Option<String>,
    record_count: u32,
    file_type: u32,
    entries: Vec<Entry>,
}

impl Default for PluginBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginBuilder {
    pub fn new() -> Self {
        Self {
            era: FormatEra::Standard,
            flags: 0,
            masters: Vec::new(),
            author: None,
            description: None,
            record_count: 1,
            file_type: 0,
            entries: Vec::new(),
        }
    }

    pub fn era(mut self, era: FormatEra) -> Self {
        self.era = era;
        self
    }

    /// Declare a master. Each gets its `MAST` and `DATA` chunks.
    pub fn master(mut self, name: &str) -> Self {
        self.masters.push(name.to_string());
        self
    }

    /// Header record flags.
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn record_count(mut self, count: u32) -> Self {
        self.record_count = count;
        self
    }

    /// Morrowind `HEDR` file type; 1 marks a master.
    pub fn morrowind_file_type(mut self, file_type: u32) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn top_group(self, form_type: TypeCode, forms: Vec<FormBuilder>) -> Self {
        let group = forms
            .into_iter()
            .fold(GroupBuilder::top(form_type), GroupBuilder::form);
        self.group(group)
    }

    pub fn group(mut self, group: GroupBuilder) -> Self {
        self.entries.push(Entry::Group(group));
        self
    }

    /// A form outside any group.
    pub fn form(mut self, form: FormBuilder) -> Self {
        self.entries.push(Entry::Form(form));
        self
    }

    fn header(&self) -> FormBuilder {
        let morrowind = self.era == FormatEra::Morrowind;
        let mut hedr = Vec::new();
        if morrowind {
            hedr.extend_from_slice(&MORROWIND_VERSION.to_le_bytes());
            hedr.extend_from_slice(&self.file_type.to_le_bytes());
            hedr.extend(fixed_string(self.author.as_deref().unwrap_or_default(), 32));
            hedr.extend(fixed_string(self.description.as_deref().unwrap_or_default(), 256));
            hedr.extend_from_slice(&self.record_count.to_le_bytes());
        } else {
            hedr.extend_from_slice(&HEADER_VERSION.to_le_bytes());
            hedr.extend_from_slice(&self.record_count.to_le_bytes());
            hedr.extend_from_slice(&0x800u32.to_le_bytes());
        }

        let code = if morrowind { TypeCode::TES3 } else { TypeCode::TES4 };
        let mut header = FormBuilder::new(code, 0)
            .flags(self.flags)
            .chunk(TypeCode::HEDR, hedr);
        if !morrowind {
            if let Some(author) = &self.author {
                header = header.zstring_chunk(TypeCode::CNAM, author);
            }
            if let Some(description) = &self.description {
                header = header.zstring_chunk(TypeCode::SNAM, description);
            }
        }
        for master in &self.masters {
            header = header
                .zstring_chunk(TypeCode::MAST, master)
                .chunk(TypeCode::DATA, vec![0; 8]);
        }
        header
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.header().write(&mut out, self.era);
        write_entries(&mut out, self.era, &self.entries);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layouts_match_eras() {
        let standard = PluginBuilder::new().build();
        assert_eq!(&standard[..4], b"TES4");
        assert_eq!(&standard[24..28], b"HEDR");
        assert_eq!(FormatEra::detect(&standard).unwrap(), FormatEra::Standard);

        let oblivion = PluginBuilder::new().era(FormatEra::Oblivion).build();
        assert_eq!(FormatEra::detect(&oblivion).unwrap(), FormatEra::Oblivion);

        let morrowind = PluginBuilder::new().era(FormatEra::Morrowind).build();
        assert_eq!(FormatEra::detect(&morrowind).unwrap(), FormatEra::Morrowind);
        // 16-byte header, 8-byte chunk header, 300-byte HEDR.
        assert_eq!(morrowind.len(), 16 + 8 + 300);
    }

    #[test]
    fn group_size_includes_header() {
        let bytes = PluginBuilder::new()
            .top_group(TypeCode::GLOB, vec![])
            .build();
        let group = &bytes[bytes.len() - 24..];
        assert_eq!(&group[..4], b"GRUP");
        assert_eq!(u32::from_le_bytes(group[4..8].try_into().unwrap()), 24);
    }
}
