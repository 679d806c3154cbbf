//! BSPlugins Core -- plugin decoding, override tracking and load ordering for
//! Bethesda-engine games.
//!
//! This crate reads the record-based plugin files (`.esm`, `.esp`, `.esl`)
//! used by the TES and Fallout engines, builds an index of which files
//! provide which logical record, and maintains the ordered, enabled set of
//! plugins a game will load.
//!
//! # Scan Pipeline
//!
//! Each call to [`plugin_list::PluginList::scan`] rebuilds the list:
//!
//! 1. **Decode** -- Every file is walked by [`reader::Reader`] with a
//!    [`handlers::ConflictScanner`], producing header metadata and the paths
//!    of records it overrides. Files decode independently (on the rayon
//!    pool with the `parallel` feature).
//! 2. **Merge** -- Facts are merged into the [`override_index::OverrideIndex`]
//!    serially, in input order.
//! 3. **Order** -- Known files keep their priority, new ones are appended,
//!    then the order is repaired so every file loads after its masters.
//! 4. **Derive** -- Compile indices, load-order positions and missing
//!    masters are recomputed and a refresh event is delivered.
//!
//! # Addressing Records
//!
//! Raw form ids are only meaningful inside the file that contains them: the
//! top byte indexes that file's own master list. [`masters::resolve_owner`]
//! translates it once; from then on a [`record_path::RecordPath`] names the
//! owner file explicitly, so the same record has the same path whichever
//! file it was read from.
//!
//! ```rust,ignore
//! let mut list = PluginList::new(Settings::for_game(Game::SkyrimSE));
//! let report = list.scan(&files);
//! let record = list.index().find_setting("fJumpHeightMin").unwrap();
//! let winner = list.winner(record);
//! ```
//!
//! # Key Types
//!
//! - [`plugin_list::PluginList`] -- Plugins, priorities, enabled state and
//!   the override index.
//! - [`override_index::OverrideIndex`] -- Logical records and the files
//!   providing each.
//! - [`record_path::RecordPath`] -- File-independent record address.
//! - [`field::FieldTree`] -- Field-by-field comparison of one record across
//!   every file that provides it.
//! - [`event::EventBus`] -- Buffered change notifications.

pub mod config;
pub mod conflicts;
pub mod cursor;
pub mod event;
pub mod field;
pub mod form_parser;
pub mod format;
pub mod handlers;
pub mod id;
pub mod load_order;
pub mod masters;
pub mod override_index;
pub mod plugin;
pub mod plugin_list;
pub mod reader;
pub mod record;
pub mod record_path;
pub mod scan;
pub mod type_code;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
