//! Chunk decoders that turn a form's body into [`FieldTree`] values.
//!
//! A form is decoded one chunk at a time. Values that affect later chunks
//! (a global's type, a keyword count) are carried in [`FormDecodeState`]
//! between calls. Parsers are plain functions looked up by form type in a
//! table built once per game family.

use crate::config::Game;
use crate::cursor::Cursor;
use crate::field::{ConflictType, FieldId, FieldTree, FieldValue};
use crate::format::record_flags;
use crate::id::FileName;
use crate::masters::{resolve_owner, split_form_id};
use crate::reader::DecodeError;
use crate::type_code::TypeCode;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Raw chunk bytes shown for chunks without a dedicated decoder.
const MAX_RAW_BYTES: usize = 256;

/// Per-file inputs for decoding one column.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub column: usize,
    /// Strings are string-table indices rather than inline text.
    pub localized: bool,
    pub masters: &'a [FileName],
    pub plugin: &'a FileName,
    pub game: Game,
}

impl ParseContext<'_> {
    fn form_ref(&self, data: &mut Cursor<'_>) -> Result<FieldValue, DecodeError> {
        let raw = data.read_u32()?;
        if raw == 0 {
            return Ok(FieldValue::NullRef);
        }
        let (local, object) = split_form_id(raw);
        Ok(FieldValue::FormRef {
            owner: resolve_owner(local, self.masters, self.plugin).clone(),
            object,
        })
    }

    fn lstring(&self, data: &mut Cursor<'_>) -> Result<FieldValue, DecodeError> {
        if self.localized {
            data.read_u32().map(FieldValue::LString)
        } else {
            data.read_zstring().map(FieldValue::Text)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Pending {
    #[default]
    Nothing,
    GlobalType(u8),
    KeywordCount(u32),
}

/// Where the decoder is within one form.
#[derive(Debug, Clone, Default)]
pub struct FormDecodeState {
    /// Next child slot under the root. Slot 0 holds the record flags.
    index: usize,
    editor_id: Option<String>,
    pending: Pending,
}

impl FormDecodeState {
    pub fn new() -> Self {
        Self {
            index: 1,
            ..Self::default()
        }
    }

    pub fn editor_id(&self) -> Option<&str> {
        self.editor_id.as_deref()
    }

    /// Find the next root child with `signature`, starting at the current
    /// slot, or insert one there.
    fn next_field(
        &mut self,
        tree: &mut FieldTree,
        signature: TypeCode,
        name: &str,
        conflict: ConflictType,
    ) -> FieldId {
        let root = tree.root();
        let found = tree
            .children(root)
            .iter()
            .enumerate()
            .skip(self.index)
            .find(|&(_, &id)| tree.node(id).and_then(|n| n.signature()) == Some(signature))
            .map(|(i, &id)| (i, id));
        match found {
            Some((i, id)) => {
                self.index = i + 1;
                id
            }
            None => {
                let id = tree.insert_child(root, self.index, name, Some(signature), conflict);
                self.index += 1;
                id
            }
        }
    }
}

/// Decodes one chunk of a form into `tree`.
pub type FormParserFn = fn(
    &mut FieldTree,
    &mut FormDecodeState,
    &ParseContext<'_>,
    TypeCode,
    &mut Cursor<'_>,
) -> Result<(), DecodeError>;

/// Form type to chunk decoder.
#[derive(Debug)]
pub struct FormParserTable {
    parsers: HashMap<TypeCode, FormParserFn>,
}

static BASIC: LazyLock<FormParserTable> = LazyLock::new(|| FormParserTable::build(false));
static KEYWORDED: LazyLock<FormParserTable> = LazyLock::new(|| FormParserTable::build(true));

/// Item and actor records that carry keyword lists.
const KEYWORDED_TYPES: [[u8; 4]; 16] = [
    *b"ACTI", *b"ALCH", *b"AMMO", *b"ARMO", *b"BOOK", *b"CONT", *b"FLOR", *b"FURN",
    *b"INGR", *b"KEYM", *b"LCTN", *b"MGEF", *b"MISC", *b"NPC_", *b"SCRL", *b"WEAP",
];

impl FormParserTable {
    pub fn for_game(game: Game) -> &'static FormParserTable {
        if game.has_keywords() {
            &KEYWORDED
        } else {
            &BASIC
        }
    }

    fn build(keywords: bool) -> Self {
        let mut parsers: HashMap<TypeCode, FormParserFn> = HashMap::new();
        parsers.insert(TypeCode::GMST, parse_game_setting);
        parsers.insert(TypeCode::GLOB, parse_global);
        if keywords {
            parsers.insert(TypeCode::KYWD, parse_keyword);
            for code in KEYWORDED_TYPES {
                parsers.insert(TypeCode(code), parse_keyworded);
            }
        }
        Self { parsers }
    }

    /// Decoder for `form_type`; unknown types get the generic one.
    pub fn get(&self, form_type: TypeCode) -> FormParserFn {
        self.parsers
            .get(&form_type)
            .copied()
            .unwrap_or(parse_default)
    }

    pub fn has_parser(&self, form_type: TypeCode) -> bool {
        self.parsers.contains_key(&form_type)
    }
}

/// Write the form header flags into slot 0 of the root.
pub fn parse_record_flags(tree: &mut FieldTree, column: usize, flags: u32) {
    const FLAGS: [(&str, u32, ConflictType); 5] = [
        ("Deleted", record_flags::DELETED, ConflictType::Critical),
        ("Persistent", record_flags::PERSISTENT, ConflictType::Override),
        ("Initially Disabled", record_flags::INITIALLY_DISABLED, ConflictType::Override),
        ("Ignored", record_flags::IGNORED, ConflictType::Override),
        ("Compressed", record_flags::COMPRESSED, ConflictType::Ignore),
    ];

    let root = tree.root();
    let node = tree.get_or_insert_child(root, 0, "Record Flags", None, ConflictType::Override);
    for (i, (name, bit, conflict)) in FLAGS.into_iter().enumerate() {
        let child = tree.get_or_insert_child(node, i, name, None, conflict);
        if flags & bit != 0 {
            tree.set_value(child, column, FieldValue::Text(name.to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

fn parse_default(
    tree: &mut FieldTree,
    state: &mut FormDecodeState,
    ctx: &ParseContext<'_>,
    chunk: TypeCode,
    data: &mut Cursor<'_>,
) -> Result<(), DecodeError> {
    if chunk == TypeCode::EDID {
        let editor_id = data.read_zstring()?;
        let id = state.next_field(tree, chunk, "Editor ID", ConflictType::Override);
        tree.set_value(id, ctx.column, FieldValue::Text(editor_id.clone()));
        state.editor_id = Some(editor_id);
        return Ok(());
    }
    let id = state.next_field(tree, chunk, "Unknown", ConflictType::Override);
    let raw = data.bytes(data.remaining().min(MAX_RAW_BYTES))?;
    tree.set_value(id, ctx.column, FieldValue::Bytes(raw.to_vec()));
    Ok(())
}

/// `DATA` is typed by the first letter of the editor id.
fn parse_game_setting(
    tree: &mut FieldTree,
    state: &mut FormDecodeState,
    ctx: &ParseContext<'_>,
    chunk: TypeCode,
    data: &mut Cursor<'_>,
) -> Result<(), DecodeError> {
    if chunk != TypeCode::DATA {
        return parse_default(tree, state, ctx, chunk, data);
    }
    let prefix = state
        .editor_id()
        .and_then(|id| id.bytes().next())
        .map(|b| b.to_ascii_lowercase());
    let value = match prefix {
        Some(b's') => ctx.lstring(data)?,
        Some(b'i') => FieldValue::Int(data.read_i32()?.into()),
        Some(b'u') => FieldValue::UInt(data.read_u32()?.into()),
        Some(b'f') => FieldValue::Float(data.read_f32()?),
        Some(b'b') => FieldValue::Bool(data.read_u32()? != 0),
        _ => FieldValue::Bytes(data.bytes(data.remaining().min(MAX_RAW_BYTES))?.to_vec()),
    };
    let id = state.next_field(tree, chunk, "Value", ConflictType::Override);
    tree.set_value(id, ctx.column, value);
    Ok(())
}

/// `FNAM` names the type that `FLTV` is shown as.
fn parse_global(
    tree: &mut FieldTree,
    state: &mut FormDecodeState,
    ctx: &ParseContext<'_>,
    chunk: TypeCode,
    data: &mut Cursor<'_>,
) -> Result<(), DecodeError> {
    match chunk {
        TypeCode::FNAM => {
            let kind = data.read_u8()?;
            let name = match kind {
                b's' => "Short",
                b'l' => "Long",
                b'f' => "Float",
                _ => "Unknown",
            };
            state.pending = Pending::GlobalType(kind);
            let id = state.next_field(tree, chunk, "Type", ConflictType::Override);
            tree.set_value(id, ctx.column, FieldValue::Text(name.to_string()));
        }
        TypeCode::FLTV => {
            let raw = data.read_f32()?;
            let value = match state.pending {
                Pending::GlobalType(b's' | b'l') => FieldValue::Int(raw as i64),
                _ => FieldValue::Float(raw),
            };
            let id = state.next_field(tree, chunk, "Value", ConflictType::Override);
            tree.set_value(id, ctx.column, value);
        }
        _ => return parse_default(tree, state, ctx, chunk, data),
    }
    Ok(())
}

fn parse_keyword(
    tree: &mut FieldTree,
    state: &mut FormDecodeState,
    ctx: &ParseContext<'_>,
    chunk: TypeCode,
    data: &mut Cursor<'_>,
) -> Result<(), DecodeError> {
    if chunk != TypeCode::CNAM {
        return parse_default(tree, state, ctx, chunk, data);
    }
    let (r, g, b) = (data.read_u8()?, data.read_u8()?, data.read_u8()?);
    let id = state.next_field(tree, chunk, "Color", ConflictType::Override);
    tree.set_value(id, ctx.column, FieldValue::Text(format!("{r}, {g}, {b}")));
    Ok(())
}

fn parse_keyworded(
    tree: &mut FieldTree,
    state: &mut FormDecodeState,
    ctx: &ParseContext<'_>,
    chunk: TypeCode,
    data: &mut Cursor<'_>,
) -> Result<(), DecodeError> {
    match chunk {
        TypeCode::OBND => {
            let mut corners = [0i16; 6];
            for c in &mut corners {
                *c = data.read_i16()?;
            }
            let [x1, y1, z1, x2, y2, z2] = corners;
            let id = state.next_field(tree, chunk, "Object Bounds", ConflictType::Override);
            let text = format!("({x1}, {y1}, {z1}) ({x2}, {y2}, {z2})");
            tree.set_value(id, ctx.column, FieldValue::Text(text));
        }
        TypeCode::FULL => {
            let value = ctx.lstring(data)?;
            let id = state.next_field(tree, chunk, "Name", ConflictType::Translate);
            tree.set_value(id, ctx.column, value);
        }
        TypeCode::KSIZ => {
            let count = data.read_u32()?;
            state.pending = Pending::KeywordCount(count);
            let id = state.next_field(tree, chunk, "Keyword Count", ConflictType::Benign);
            tree.set_value(id, ctx.column, FieldValue::UInt(count.into()));
        }
        TypeCode::KWDA => {
            let available = data.remaining() / 4;
            let count = match state.pending {
                Pending::KeywordCount(n) => (n as usize).min(available),
                _ => available,
            };
            state.pending = Pending::Nothing;
            let list = state.next_field(tree, chunk, "Keywords", ConflictType::Override);
            for i in 0..count {
                let keyword = ctx.form_ref(data)?;
                let id = tree.get_or_insert_child(list, i, "Keyword", None, ConflictType::FormId);
                tree.set_value(id, ctx.column, keyword);
            }
        }
        _ => return parse_default(tree, state, ctx, chunk, data),
    }
    Ok(())
}
