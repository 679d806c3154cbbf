//! Per-file metadata and state held by the plugin list.

use crate::conflicts::ConflictSummary;
use crate::id::FileName;
use crate::reader::DecodeError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

// ---------------------------------------------------------------------------
// Metadata read from the file header
// ---------------------------------------------------------------------------

/// Facts taken from a plugin's header record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginMetadata {
    pub author: String,
    pub description: String,
    pub version: f32,
    pub master_flagged: bool,
    pub light_flagged: bool,
    pub overlay_flagged: bool,
    pub localized: bool,
    pub has_no_records: bool,
    /// Declared masters in declaration order.
    pub masters: Vec<FileName>,
}

impl PluginMetadata {
    pub fn declares_master(&self, name: &FileName) -> bool {
        self.masters.contains(name)
    }

    pub(crate) fn add_master(&mut self, name: FileName) {
        if !name.is_empty() && !self.masters.contains(&name) {
            self.masters.push(name);
        }
    }
}

// ---------------------------------------------------------------------------
// Compile index
// ---------------------------------------------------------------------------

/// The engine's runtime index for an enabled plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompileIndex {
    Regular(u16),
    /// Light plugins share slot `0xFE` (and up), 4096 per slot.
    Light { slot: u16, sub: u16 },
    /// Overlay plugins consume no slot.
    Overlay,
}

impl fmt::Display for CompileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileIndex::Regular(n) => write!(f, "{n:02X}"),
            CompileIndex::Light { slot, sub } => write!(f, "{slot:02X}:{sub:03X}"),
            CompileIndex::Overlay => f.write_str("XX"),
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginState {
    Missing,
    Inactive,
    Active,
}

/// Where a plugin's bytes come from when they need re-reading.
#[derive(Debug, Clone)]
pub enum PluginSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

impl PluginSource {
    pub fn read(&self) -> Result<Cow<'_, [u8]>, DecodeError> {
        match self {
            PluginSource::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| DecodeError::Io {
                    path: path.clone(),
                    source,
                }),
            PluginSource::Memory(bytes) => Ok(Cow::Borrowed(&bytes[..])),
        }
    }
}

// ---------------------------------------------------------------------------
// PluginInfo
// ---------------------------------------------------------------------------

/// Everything the plugin list knows about one file.
#[derive(Debug)]
pub struct PluginInfo {
    pub(crate) name: FileName,
    pub(crate) source: PluginSource,
    pub(crate) has_master_extension: bool,
    pub(crate) has_light_extension: bool,
    pub(crate) force_loaded: bool,
    pub(crate) force_enabled: bool,
    pub(crate) force_disabled: bool,
    pub(crate) metadata: PluginMetadata,
    pub(crate) missing_masters: BTreeSet<FileName>,
    pub(crate) decode_error: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) priority: usize,
    pub(crate) load_order: Option<usize>,
    pub(crate) compile_index: Option<CompileIndex>,
    pub(crate) group: String,
    pub(crate) conflicts: OnceLock<ConflictSummary>,
}

/// Engine-imposed constraints on a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceFlags {
    /// Loaded by the engine at a fixed position; implies always enabled.
    pub loaded: bool,
    pub enabled: bool,
    pub disabled: bool,
}

impl PluginInfo {
    pub(crate) fn new(
        name: FileName,
        source: PluginSource,
        force: ForceFlags,
        light_supported: bool,
    ) -> Self {
        let has_master_extension = name.has_extension(".esm");
        let has_light_extension = light_supported && name.has_extension(".esl");
        Self {
            name,
            source,
            has_master_extension,
            has_light_extension,
            force_loaded: force.loaded,
            force_enabled: force.enabled,
            force_disabled: force.disabled,
            metadata: PluginMetadata::default(),
            missing_masters: BTreeSet::new(),
            decode_error: None,
            enabled: false,
            priority: 0,
            load_order: None,
            compile_index: None,
            group: String::new(),
            conflicts: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &FileName {
        &self.name
    }

    pub fn source(&self) -> &PluginSource {
        &self.source
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn masters(&self) -> &[FileName] {
        &self.metadata.masters
    }

    pub fn missing_masters(&self) -> &BTreeSet<FileName> {
        &self.missing_masters
    }

    pub fn has_missing_masters(&self) -> bool {
        !self.missing_masters.is_empty()
    }

    /// Why the last scan could not decode this file, if it could not.
    pub fn decode_error(&self) -> Option<&str> {
        self.decode_error.as_deref()
    }

    pub fn has_master_extension(&self) -> bool {
        self.has_master_extension
    }

    pub fn has_light_extension(&self) -> bool {
        self.has_light_extension
    }

    pub fn force_loaded(&self) -> bool {
        self.force_loaded
    }

    pub fn force_enabled(&self) -> bool {
        self.force_enabled
    }

    pub fn force_disabled(&self) -> bool {
        self.force_disabled
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> PluginState {
        if self.enabled {
            PluginState::Active
        } else {
            PluginState::Inactive
        }
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    /// Position among enabled plugins; `None` while disabled.
    pub fn load_order(&self) -> Option<usize> {
        self.load_order
    }

    pub fn compile_index(&self) -> Option<CompileIndex> {
        self.compile_index
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_master_file(&self) -> bool {
        self.metadata.master_flagged || self.has_master_extension || self.has_light_extension
    }

    pub fn is_small_file(&self) -> bool {
        self.metadata.light_flagged || self.has_light_extension
    }

    pub fn is_always_enabled(&self) -> bool {
        self.force_loaded || self.force_enabled
    }

    pub fn can_be_toggled(&self) -> bool {
        !self.force_loaded && !self.force_enabled && !self.force_disabled
    }

    /// Enabled state after a request to set it to `enable`.
    pub(crate) fn resolve_enabled(&self, enable: bool) -> bool {
        (enable && !self.force_disabled) || self.is_always_enabled()
    }

    /// True if this file has to load after `other`.
    ///
    /// A declared master dependency decides first. Otherwise engine-forced
    /// files come before everything else, then master files before plain
    /// plugins.
    pub fn must_load_after(&self, other: &PluginInfo) -> bool {
        let has_master = self.metadata.declares_master(&other.name);
        let is_master = other.metadata.declares_master(&self.name);
        if has_master && !is_master {
            return true;
        }
        if is_master {
            return false;
        }
        if other.force_loaded && !self.force_loaded {
            return true;
        }
        other.is_master_file() && !self.is_master_file()
    }

    pub(crate) fn set_priority(&mut self, priority: usize) {
        self.priority = priority;
        self.invalidate_conflicts();
    }

    pub(crate) fn invalidate_conflicts(&mut self) {
        self.conflicts = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(name: &str, masters: &[&str]) -> PluginInfo {
        let mut info = PluginInfo::new(
            name.into(),
            PluginSource::Path(name.into()),
            ForceFlags::default(),
            true,
        );
        for m in masters {
            info.metadata.add_master((*m).into());
        }
        info
    }

    #[test]
    fn declared_master_forces_order() {
        let a = plugin("A.esp", &[]);
        let b = plugin("B.esp", &["a.esp"]);
        assert!(b.must_load_after(&a));
        assert!(!a.must_load_after(&b));
    }

    #[test]
    fn mutual_masters_cancel_out() {
        let a = plugin("A.esp", &["B.esp"]);
        let b = plugin("B.esp", &["A.esp"]);
        assert!(!a.must_load_after(&b));
        assert!(!b.must_load_after(&a));
    }

    #[test]
    fn master_files_load_before_plugins() {
        let esm = plugin("Base.esm", &[]);
        let esp = plugin("Mod.esp", &[]);
        assert!(esp.must_load_after(&esm));
        assert!(!esm.must_load_after(&esp));

        let esl = plugin("Small.esl", &[]);
        assert!(esl.is_master_file());
        assert!(esl.is_small_file());
    }

    #[test]
    fn forced_files_load_first() {
        let mut primary = plugin("Skyrim.esm", &[]);
        primary.force_loaded = true;
        let other = plugin("Other.esm", &[]);
        assert!(other.must_load_after(&primary));
        assert!(!primary.must_load_after(&other));
        assert!(primary.is_always_enabled());
        assert!(!primary.can_be_toggled());
    }

    #[test]
    fn light_extension_needs_support() {
        let info = PluginInfo::new(
            "Small.esl".into(),
            PluginSource::Path("Small.esl".into()),
            ForceFlags::default(),
            false,
        );
        assert!(!info.has_light_extension());
        assert!(!info.is_small_file());
    }

    #[test]
    fn force_flags_gate_enabling() {
        let mut info = plugin("Mod.esp", &[]);
        info.force_disabled = true;
        assert!(!info.resolve_enabled(true));
        info.force_disabled = false;
        info.force_enabled = true;
        assert!(info.resolve_enabled(false));
    }

    #[test]
    fn compile_index_display() {
        assert_eq!(CompileIndex::Regular(0x0A).to_string(), "0A");
        assert_eq!(CompileIndex::Light { slot: 0xFE, sub: 1 }.to_string(), "FE:001");
        assert_eq!(CompileIndex::Overlay.to_string(), "XX");
    }
}
