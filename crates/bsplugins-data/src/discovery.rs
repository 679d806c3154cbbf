//! Finding plugin files in a data directory.

use crate::loader::DataLoadError;
use bsplugins_core::scan::PluginFile;
use std::path::Path;
use tracing::debug;

/// Extensions of files the games load as plugins.
pub const PLUGIN_EXTENSIONS: [&str; 3] = ["esp", "esm", "esl"];

pub fn is_plugin_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PLUGIN_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)))
}

/// Every plugin directly inside `dir`, sorted by file name ignoring case.
/// The result is the arrival order for a first scan.
pub fn discover_plugins(dir: &Path) -> Result<Vec<PluginFile>, DataLoadError> {
    if !dir.is_dir() {
        return Err(DataLoadError::NotADirectory {
            dir: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_plugin_file(&path) {
            files.push(PluginFile::new(path));
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(dir = %dir.display(), count = files.len(), "discovered plugins");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_plugin_extensions() {
        assert!(is_plugin_file(Path::new("Skyrim.esm")));
        assert!(is_plugin_file(Path::new("dir/Mod.ESP")));
        assert!(is_plugin_file(Path::new("Light.esl")));
        assert!(!is_plugin_file(Path::new("Skyrim - Textures.bsa")));
        assert!(!is_plugin_file(Path::new("esp")));
    }

    #[test]
    fn discovers_sorted_plugins_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta.esp", "Alpha.esm", "beta.ESL", "readme.txt", "Data.bsa"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.esp")).unwrap();

        let found = discover_plugins(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Alpha.esm", "beta.ESL", "zeta.esp"]);
        assert_eq!(found[0].path, dir.path().join("Alpha.esm"));
    }

    #[test]
    fn rejects_non_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.esp");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            discover_plugins(&file),
            Err(DataLoadError::NotADirectory { .. })
        ));
    }
}
