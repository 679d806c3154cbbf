//! Field-level view of one record across every file that provides it.
//!
//! A [`FieldTree`] is an arena of named nodes. Each node holds one value
//! column per file, in the order given at construction (ascending
//! priority), so that a column can be compared against the ones before and
//! after it.

use crate::id::FileName;
use crate::type_code::TypeCode;
use slotmap::{SlotMap, new_key_type};
use std::fmt;

new_key_type! {
    pub struct FieldId;
}

/// How differences in a field count towards a conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConflictType {
    /// Never reported.
    Ignore,
    BenignIfAdded,
    Benign,
    #[default]
    Override,
    Translate,
    /// Like `Override`, but a file that leaves the field out does not
    /// conflict with one that sets it.
    NormalIgnoreEmpty,
    Critical,
    FormId,
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f32),
    Bool(bool),
    /// A reference resolved to its owning file.
    FormRef { owner: FileName, object: u32 },
    /// A zero reference.
    NullRef,
    /// Index into the string tables of a localized plugin.
    LString(u32),
    Bytes(Vec<u8>),
}

impl FieldValue {
    fn differs(&self, other: &FieldValue, case_sensitive: bool) -> bool {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) if !case_sensitive => {
                !a.eq_ignore_ascii_case(b)
            }
            _ => self != other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::UInt(n) => write!(f, "{n}"),
            FieldValue::Float(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::FormRef { owner, object } => write!(f, "{owner} | {object:06X}"),
            FieldValue::NullRef => f.write_str("NONE"),
            FieldValue::LString(index) => write!(f, "<lstring:{index}>"),
            FieldValue::Bytes(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    name: String,
    signature: Option<TypeCode>,
    conflict: ConflictType,
    case_sensitive: bool,
    parent: Option<FieldId>,
    children: Vec<FieldId>,
    /// Grows to the highest column written; unset columns in between are
    /// `None`.
    values: Vec<Option<FieldValue>>,
}

impl FieldNode {
    fn new(
        parent: Option<FieldId>,
        name: &str,
        signature: Option<TypeCode>,
        conflict: ConflictType,
    ) -> Self {
        Self {
            name: name.to_string(),
            signature,
            conflict,
            case_sensitive: false,
            parent,
            children: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Option<TypeCode> {
        self.signature
    }

    /// Row header: the signature, then the name if there is one.
    pub fn label(&self) -> String {
        match (self.signature, self.name.is_empty()) {
            (Some(sig), true) => sig.to_string(),
            (Some(sig), false) => format!("{sig} - {}", self.name),
            (None, _) => self.name.clone(),
        }
    }

    pub fn conflict_type(&self) -> ConflictType {
        self.conflict
    }

    pub fn parent(&self) -> Option<FieldId> {
        self.parent
    }

    pub fn children(&self) -> &[FieldId] {
        &self.children
    }

    pub fn value(&self, column: usize) -> Option<&FieldValue> {
        self.values.get(column).and_then(Option::as_ref)
    }

    fn differs(&self, a: usize, b: usize) -> bool {
        match (&self.values[a], &self.values[b]) {
            (Some(x), Some(y)) => x.differs(y, self.case_sensitive),
            (None, None) => false,
            _ => true,
        }
    }
}

/// Decoded fields of one record, one value column per file.
#[derive(Debug, Clone)]
pub struct FieldTree {
    nodes: SlotMap<FieldId, FieldNode>,
    root: FieldId,
    files: Vec<FileName>,
}

impl FieldTree {
    pub fn new(files: Vec<FileName>) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(FieldNode::new(None, "", None, ConflictType::Override));
        Self { nodes, root, files }
    }

    /// Column headers.
    pub fn files(&self) -> &[FileName] {
        &self.files
    }

    pub fn root(&self) -> FieldId {
        self.root
    }

    pub fn node(&self, id: FieldId) -> Option<&FieldNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: FieldId) -> &[FieldId] {
        match self.nodes.get(id) {
            Some(node) => &node.children,
            None => &[],
        }
    }

    pub fn value(&self, id: FieldId, column: usize) -> Option<&FieldValue> {
        self.nodes.get(id)?.value(column)
    }

    /// Reuse the child at `index` if it has the same signature (or, without
    /// a signature, the same name), otherwise insert a new one there.
    pub fn get_or_insert_child(
        &mut self,
        parent: FieldId,
        index: usize,
        name: &str,
        signature: Option<TypeCode>,
        conflict: ConflictType,
    ) -> FieldId {
        if let Some(&existing) = self.children(parent).get(index)
            && let Some(node) = self.nodes.get(existing)
        {
            let same = match signature {
                Some(sig) => node.signature == Some(sig),
                None => node.signature.is_none() && node.name == name,
            };
            if same {
                return existing;
            }
        }
        self.insert_child(parent, index, name, signature, conflict)
    }

    /// Insert a new child at `index` (clamped to the child count).
    pub fn insert_child(
        &mut self,
        parent: FieldId,
        index: usize,
        name: &str,
        signature: Option<TypeCode>,
        conflict: ConflictType,
    ) -> FieldId {
        let id = self
            .nodes
            .insert(FieldNode::new(Some(parent), name, signature, conflict));
        if let Some(node) = self.nodes.get_mut(parent) {
            let index = index.min(node.children.len());
            node.children.insert(index, id);
        }
        id
    }

    pub fn set_value(&mut self, id: FieldId, column: usize, value: FieldValue) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.values.len() <= column {
            node.values.resize(column + 1, None);
        }
        node.values[column] = Some(value);
    }

    /// Compare text values of this node exactly instead of ignoring ASCII case.
    pub fn set_case_sensitive(&mut self, id: FieldId, case_sensitive: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.case_sensitive = case_sensitive;
        }
    }

    pub fn find_child(&self, parent: FieldId, name: &str) -> Option<FieldId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&id| self.nodes[id].name == name)
    }

    pub fn find_signature(&self, parent: FieldId, signature: TypeCode) -> Option<FieldId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&id| self.nodes[id].signature == Some(signature))
    }

    pub fn child_value(&self, parent: FieldId, name: &str, column: usize) -> Option<&FieldValue> {
        self.value(self.find_child(parent, name)?, column)
    }

    // -----------------------------------------------------------------------
    // Conflict queries
    // -----------------------------------------------------------------------

    /// True if any file disagrees with the first one anywhere under `id`.
    pub fn is_conflicted(&self, id: FieldId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.conflict == ConflictType::Ignore {
            return false;
        }
        if !node.values.is_empty() {
            if self.files.len() > node.values.len()
                && node.conflict != ConflictType::NormalIgnoreEmpty
            {
                return true;
            }
            if (1..node.values.len()).any(|i| node.differs(i, 0)) {
                return true;
            }
        }
        node.children.iter().any(|&child| self.is_conflicted(child))
    }

    /// True if `column` changes something set by an earlier file.
    pub fn is_overriding(&self, id: FieldId, column: usize) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.conflict == ConflictType::Ignore {
            return false;
        }
        if !node.values.is_empty() {
            if column >= node.values.len() {
                if node.conflict != ConflictType::NormalIgnoreEmpty {
                    return true;
                }
            } else if (0..column).any(|i| node.differs(i, column)) {
                return true;
            }
        }
        node.children
            .iter()
            .any(|&child| self.is_overriding(child, column))
    }

    /// True if a later file changes something `column` sets.
    pub fn is_losing_conflict(&self, id: FieldId, column: usize) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.conflict == ConflictType::Ignore {
            return false;
        }
        if !node.values.is_empty() && column < node.values.len() {
            if self.files.len() > node.values.len()
                && node.conflict != ConflictType::NormalIgnoreEmpty
            {
                return true;
            }
            if (column + 1..node.values.len()).any(|i| node.differs(i, column)) {
                return true;
            }
        }
        node.children
            .iter()
            .any(|&child| self.is_losing_conflict(child, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(columns: usize) -> FieldTree {
        FieldTree::new((0..columns).map(|i| FileName::new(format!("{i}.esp"))).collect())
    }

    #[test]
    fn children_align_by_position_and_signature() {
        let mut tree = tree(2);
        let root = tree.root();
        let edid = Some(TypeCode::EDID);
        let a = tree.get_or_insert_child(root, 0, "Editor ID", edid, ConflictType::Override);
        let again = tree.get_or_insert_child(root, 0, "Editor ID", edid, ConflictType::Override);
        assert_eq!(a, again);

        let full = Some(TypeCode::FULL);
        let b = tree.get_or_insert_child(root, 0, "Name", full, ConflictType::Override);
        assert_ne!(a, b);
        assert_eq!(tree.children(root), [b, a]);
        assert_eq!(tree.node(a).unwrap().label(), "EDID - Editor ID");
        assert_eq!(tree.find_signature(root, TypeCode::FULL), Some(b));
    }

    #[test]
    fn equal_columns_do_not_conflict() {
        let mut tree = tree(2);
        let root = tree.root();
        let id = tree.get_or_insert_child(root, 0, "Value", None, ConflictType::Override);
        tree.set_value(id, 0, FieldValue::Int(5));
        tree.set_value(id, 1, FieldValue::Int(5));
        assert!(!tree.is_conflicted(root));
        assert!(!tree.is_overriding(id, 1));
        assert!(!tree.is_losing_conflict(id, 0));
    }

    #[test]
    fn later_change_overrides_earlier() {
        let mut tree = tree(3);
        let root = tree.root();
        let id = tree.get_or_insert_child(root, 0, "Value", None, ConflictType::Override);
        tree.set_value(id, 0, FieldValue::Float(1.0));
        tree.set_value(id, 1, FieldValue::Float(1.0));
        tree.set_value(id, 2, FieldValue::Float(2.0));
        assert!(tree.is_conflicted(root));
        assert!(tree.is_overriding(id, 2));
        assert!(!tree.is_overriding(id, 1));
        assert!(tree.is_losing_conflict(id, 0));
        assert!(tree.is_losing_conflict(id, 1));
        assert!(!tree.is_losing_conflict(id, 2));
    }

    #[test]
    fn missing_trailing_column_counts_unless_ignored_when_empty() {
        let mut tree = tree(2);
        let root = tree.root();
        let plain = tree.get_or_insert_child(root, 0, "Plain", None, ConflictType::Override);
        let lenient =
            tree.get_or_insert_child(root, 1, "Lenient", None, ConflictType::NormalIgnoreEmpty);
        tree.set_value(plain, 0, FieldValue::UInt(1));
        tree.set_value(lenient, 0, FieldValue::UInt(1));
        assert!(tree.is_conflicted(plain));
        assert!(tree.is_overriding(plain, 1));
        assert!(!tree.is_conflicted(lenient));
        assert!(!tree.is_overriding(lenient, 1));
    }

    #[test]
    fn ignored_nodes_never_conflict() {
        let mut tree = tree(2);
        let root = tree.root();
        let id = tree.get_or_insert_child(root, 0, "Flags", None, ConflictType::Ignore);
        tree.set_value(id, 0, FieldValue::Bool(true));
        tree.set_value(id, 1, FieldValue::Bool(false));
        assert!(!tree.is_conflicted(root));
    }

    #[test]
    fn text_compares_case_insensitively_by_default() {
        let mut tree = tree(2);
        let root = tree.root();
        let id = tree.get_or_insert_child(root, 0, "Name", None, ConflictType::Override);
        tree.set_value(id, 0, FieldValue::Text("Iron Sword".into()));
        tree.set_value(id, 1, FieldValue::Text("IRON SWORD".into()));
        assert!(!tree.is_conflicted(id));
        tree.set_case_sensitive(id, true);
        assert!(tree.is_conflicted(id));
    }

    #[test]
    fn values_display_like_the_editor() {
        let form = FieldValue::FormRef {
            owner: "Skyrim.esm".into(),
            object: 0x3c00,
        };
        assert_eq!(form.to_string(), "Skyrim.esm | 003C00");
        assert_eq!(FieldValue::NullRef.to_string(), "NONE");
        assert_eq!(FieldValue::LString(7).to_string(), "<lstring:7>");
        assert_eq!(FieldValue::Bytes(vec![0xab, 1]).to_string(), "AB 01");
    }
}
