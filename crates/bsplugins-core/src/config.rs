//! Scan and load-order settings.
//!
//! Every field has a default so partial settings files deserialize cleanly.
//! Reading them from disk lives in `bsplugins-data`.

use crate::format::FormatEra;
use serde::{Deserialize, Serialize};

/// Supported games. Drives header-flag interpretation and field parsers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Game {
    Morrowind,
    Oblivion,
    Fallout3,
    FalloutNV,
    Skyrim,
    #[default]
    SkyrimSE,
    Fallout4,
    Starfield,
    Other,
}

impl Game {
    pub const fn supports_light_plugins(self) -> bool {
        matches!(self, Game::SkyrimSE | Game::Fallout4 | Game::Starfield)
    }

    pub const fn supports_overlay_plugins(self) -> bool {
        matches!(self, Game::Starfield)
    }

    /// Games whose records carry keyword lists (`KSIZ`/`KWDA`).
    pub const fn has_keywords(self) -> bool {
        matches!(
            self,
            Game::Skyrim | Game::SkyrimSE | Game::Fallout4 | Game::Starfield
        )
    }

    /// Header era this game writes, used when none is declared.
    pub const fn default_era(self) -> Option<FormatEra> {
        match self {
            Game::Morrowind => Some(FormatEra::Morrowind),
            Game::Oblivion => Some(FormatEra::Oblivion),
            Game::Other => None,
            _ => Some(FormatEra::Standard),
        }
    }
}

/// How the game decides which plugins load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadOrderMechanism {
    /// No user-controlled load order; only forced plugins load.
    None,
    FileTime,
    #[default]
    PluginsTxt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub game: Game,
    /// `None` auto-detects per file.
    pub format_era: Option<FormatEra>,
    /// Overrides the game's light-plugin capability.
    pub light_plugins: Option<bool>,
    /// Overrides the game's overlay-plugin capability.
    pub overlay_plugins: Option<bool>,
    /// Engine-forced plugins: always loaded first, immovable, always enabled.
    pub primary_plugins: Vec<String>,
    pub force_enabled_plugins: Vec<String>,
    pub load_order_mechanism: LoadOrderMechanism,
    /// Hide a file overriding its own declared master from conflict summaries.
    pub ignore_master_conflicts: bool,
    /// Descend into cell, world, topic and quest children groups.
    pub index_child_groups: bool,
    /// Enabled state for files seen for the first time.
    pub enable_new_plugins: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game: Game::default(),
            format_era: None,
            light_plugins: None,
            overlay_plugins: None,
            primary_plugins: Vec::new(),
            force_enabled_plugins: Vec::new(),
            load_order_mechanism: LoadOrderMechanism::default(),
            ignore_master_conflicts: false,
            index_child_groups: true,
            enable_new_plugins: true,
        }
    }
}

impl Settings {
    pub fn for_game(game: Game) -> Self {
        Self {
            game,
            ..Self::default()
        }
    }

    pub fn light_plugins_supported(&self) -> bool {
        self.light_plugins
            .unwrap_or_else(|| self.game.supports_light_plugins())
    }

    pub fn overlay_plugins_supported(&self) -> bool {
        self.overlay_plugins
            .unwrap_or_else(|| self.game.supports_overlay_plugins())
    }

    /// Era to force on the reader, if any.
    pub fn era(&self) -> Option<FormatEra> {
        self.format_era
    }

    pub fn is_primary(&self, name: &str) -> bool {
        self.primary_plugins
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }

    pub fn is_force_enabled(&self, name: &str) -> bool {
        self.force_enabled_plugins
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_game_unless_overridden() {
        let mut settings = Settings::for_game(Game::Skyrim);
        assert!(!settings.light_plugins_supported());
        settings.light_plugins = Some(true);
        assert!(settings.light_plugins_supported());

        let starfield = Settings::for_game(Game::Starfield);
        assert!(starfield.light_plugins_supported());
        assert!(starfield.overlay_plugins_supported());
    }

    #[test]
    fn defaults_index_children_and_enable_new() {
        let settings = Settings::default();
        assert!(settings.index_child_groups);
        assert!(settings.enable_new_plugins);
        assert_eq!(settings.load_order_mechanism, LoadOrderMechanism::PluginsTxt);
    }

    #[test]
    fn primary_lookup_ignores_case() {
        let settings = Settings {
            primary_plugins: vec!["Skyrim.esm".into()],
            ..Settings::default()
        };
        assert!(settings.is_primary("SKYRIM.ESM"));
        assert!(!settings.is_primary("Update.esm"));
    }

    #[test]
    fn era_defaults_per_game() {
        assert_eq!(Game::Morrowind.default_era(), Some(FormatEra::Morrowind));
        assert_eq!(Game::Oblivion.default_era(), Some(FormatEra::Oblivion));
        assert_eq!(Game::Fallout4.default_era(), Some(FormatEra::Standard));
    }
}
