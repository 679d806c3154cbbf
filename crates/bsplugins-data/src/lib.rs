//! File formats at the edge of the plugin list: settings files, the
//! load-order list, the groups file and plugin discovery on disk.

pub mod discovery;
pub mod lists;
pub mod loader;

pub use discovery::discover_plugins;
pub use lists::{apply_groups, apply_load_order, save_groups, save_load_order};
pub use loader::{DataLoadError, load_settings, save_settings};
