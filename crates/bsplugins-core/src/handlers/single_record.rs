//! Locates one record in a file and decodes it into a [`FieldTree`] column.

use crate::cursor::{Cursor, latin1};
use crate::field::{ConflictType, FieldTree, FieldValue};
use crate::form_parser::{FormDecodeState, FormParserTable, ParseContext, parse_record_flags};
use crate::format::{FormData, GroupData};
use crate::masters::{resolve_owner, split_form_id};
use crate::reader::{DecodeError, ReaderHandler};
use crate::record_path::{Identifier, RecordPath};
use crate::type_code::TypeCode;

/// Walks only the groups on `path` and decodes the form it names.
///
/// Form-id paths match on the translated owner and object number. Setting
/// paths accept every form at the right depth until one's `EDID` matches.
/// Default-object paths scan `DNAM` slot lists for the wanted slot.
pub struct SingleRecordParser<'a> {
    tree: &'a mut FieldTree,
    path: &'a RecordPath,
    table: &'a FormParserTable,
    ctx: ParseContext<'a>,
    depth: usize,
    /// Set while inside a form that may be (or is) the target.
    candidate: Option<FormData>,
    /// Decoder state once the current form is known to be the target.
    decoding: Option<FormDecodeState>,
    done: bool,
}

impl<'a> SingleRecordParser<'a> {
    pub fn new(
        tree: &'a mut FieldTree,
        path: &'a RecordPath,
        table: &'a FormParserTable,
        ctx: ParseContext<'a>,
    ) -> Self {
        Self {
            tree,
            path,
            table,
            ctx,
            depth: 0,
            candidate: None,
            decoding: None,
            done: false,
        }
    }

    /// True once the target record has been decoded.
    pub fn found(&self) -> bool {
        self.done
    }

    fn at_target_depth(&self) -> bool {
        self.depth == self.path.groups().len() && self.depth > 0
    }

    fn start_decoding(&mut self, form: &FormData) {
        parse_record_flags(self.tree, self.ctx.column, form.flags);
        self.decoding = Some(FormDecodeState::new());
    }

    fn default_object_slots(
        &mut self,
        wanted: TypeCode,
        data: &mut Cursor<'_>,
    ) -> Result<(), DecodeError> {
        while data.remaining() >= 8 {
            let slot = data.read_type_code()?;
            let raw = data.read_u32()?;
            if slot == wanted {
                let value = if raw == 0 {
                    FieldValue::NullRef
                } else {
                    let (local, object) = split_form_id(raw);
                    FieldValue::FormRef {
                        owner: resolve_owner(local, self.ctx.masters, self.ctx.plugin).clone(),
                        object,
                    }
                };
                let root = self.tree.root();
                let id =
                    self.tree
                        .get_or_insert_child(root, 0, "", Some(slot), ConflictType::FormId);
                self.tree.set_value(id, self.ctx.column, value);
                self.done = true;
                break;
            }
            if slot == TypeCode::BBBB {
                break;
            }
        }
        Ok(())
    }
}

impl ReaderHandler for SingleRecordParser<'_> {
    fn group(&mut self, group: &GroupData) -> bool {
        if self.depth == self.path.groups().len() {
            return false;
        }
        if self
            .path
            .group_matches(self.depth, group, self.ctx.masters, self.ctx.plugin)
        {
            self.depth += 1;
            true
        } else {
            false
        }
    }

    fn end_group(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn form(&mut self, form: &FormData) -> bool {
        if self.done || !self.at_target_depth() {
            return false;
        }
        match self.path.identifier() {
            Identifier::FormId(_) => {
                if !self
                    .path
                    .form_matches(form.form_id, self.ctx.masters, self.ctx.plugin)
                {
                    return false;
                }
                self.candidate = Some(*form);
                self.start_decoding(form);
                true
            }
            Identifier::EditorId(_) | Identifier::TypeId(_) => {
                self.candidate = Some(*form);
                true
            }
            Identifier::None => false,
        }
    }

    fn end_form(&mut self) {
        self.candidate = None;
        if self.decoding.take().is_some() {
            self.done = true;
        }
    }

    fn chunk(&mut self, chunk_type: TypeCode) -> bool {
        if self.candidate.is_none() {
            return false;
        }
        match self.path.identifier() {
            Identifier::TypeId(_) => chunk_type == TypeCode::DNAM,
            Identifier::EditorId(_) if self.decoding.is_none() => chunk_type == TypeCode::EDID,
            _ => true,
        }
    }

    fn chunk_data(
        &mut self,
        chunk_type: TypeCode,
        data: &mut Cursor<'_>,
    ) -> Result<(), DecodeError> {
        let Some(form) = self.candidate else {
            return Ok(());
        };
        match self.path.identifier() {
            Identifier::TypeId(wanted) => return self.default_object_slots(*wanted, data),
            Identifier::EditorId(wanted) if self.decoding.is_none() => {
                if latin1(data.peek_zstring()) != *wanted {
                    self.candidate = None;
                    return Ok(());
                }
                self.start_decoding(&form);
            }
            _ => {}
        }

        if let Some(state) = self.decoding.as_mut() {
            let parser = self.table.get(form.form_type);
            parser(self.tree, state, &self.ctx, chunk_type, data)?;
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        self.done
    }
}
