//! End-to-end load-order scenarios over plugins written to a temp directory.
//!
//! Covers first-scan ordering, winner resolution for settings, batch moves
//! and their notifications, damaged files in a scan, and persisting the
//! list through the collaborator file formats of `bsplugins-data`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use bsplugins_core::config::Settings;
use bsplugins_core::event::{EventKind, PluginEvent};
use bsplugins_core::field::FieldValue;
use bsplugins_core::format::record_flags;
use bsplugins_core::id::{FileName, PluginId};
use bsplugins_core::load_order::OrderingViolation;
use bsplugins_core::plugin::PluginState;
use bsplugins_core::plugin_list::PluginList;
use bsplugins_core::scan::PluginFile;
use bsplugins_core::test_utils::*;
use bsplugins_core::type_code::TypeCode;
use bsplugins_data::lists::{read_groups, read_load_order};
use bsplugins_data::{
    apply_groups, apply_load_order, discover_plugins, load_settings, save_groups,
    save_load_order,
};

fn write(dir: &Path, name: &str, bytes: Vec<u8>) -> PluginFile {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    PluginFile::new(path)
}

fn names(list: &PluginList) -> Vec<String> {
    list.load_order().iter().map(|n| n.to_string()).collect()
}

fn setting(edid: &str, value: &str) -> FormBuilder {
    FormBuilder::new(TypeCode::GMST, 0x0000_0800)
        .edid(edid)
        .zstring_chunk(TypeCode::DATA, value)
}

/// Records every `Moved` event in delivery order.
fn record_moves(list: &mut PluginList) -> Arc<Mutex<Vec<(String, usize, usize)>>> {
    let moves = Arc::new(Mutex::new(Vec::new()));
    let sink = moves.clone();
    list.events_mut().on_passive(
        EventKind::Moved,
        Box::new(move |event: &PluginEvent| {
            if let PluginEvent::Moved {
                name,
                old_priority,
                new_priority,
            } = event
            {
                sink.lock()
                    .unwrap()
                    .push((name.to_string(), *old_priority, *new_priority));
            }
        }),
    );
    moves
}

// ===========================================================================
// Scanning
// ===========================================================================

/// A has no masters, B and C both depend on A. Arriving as [C, A, B], A must
/// end up first.
#[test]
fn masters_load_first_whatever_the_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        write(dir.path(), "C.esp", PluginBuilder::new().master("A.esp").build()),
        write(dir.path(), "A.esp", PluginBuilder::new().build()),
        write(dir.path(), "B.esp", PluginBuilder::new().master("A.esp").build()),
    ];

    let mut list = PluginList::new(Settings::default());
    let report = list.scan(&files);
    assert_eq!(report.scanned, 3);
    assert!(report.failed.is_empty());

    let a = list.priority("A.esp").unwrap();
    assert!(a < list.priority("B.esp").unwrap());
    assert!(a < list.priority("C.esp").unwrap());
    // Unconstrained files keep their arrival order.
    assert_eq!(names(&list), ["A.esp", "C.esp", "B.esp"]);
    assert!(!list.repair_order());
}

#[test]
fn master_files_precede_plain_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        write(dir.path(), "Patch.esp", PluginBuilder::new().build()),
        write(dir.path(), "Flagged.esp", PluginBuilder::new().flags(record_flags::MASTER).build()),
        write(dir.path(), "Base.esm", PluginBuilder::new().build()),
    ];
    let mut list = PluginList::new(Settings::default());
    list.scan(&files);
    // Each blocker is pulled in front of the plugin it blocks.
    assert_eq!(names(&list), ["Base.esm", "Flagged.esp", "Patch.esp"]);
}

/// X and Y both declare the same setting. The later file wins; disabling it
/// hands the win back.
#[test]
fn setting_winner_follows_priority_and_state() {
    let dir = tempfile::tempdir().unwrap();
    let x = PluginBuilder::new()
        .top_group(TypeCode::GMST, vec![setting("sGlobalName", "From X")])
        .build();
    let y = PluginBuilder::new()
        .top_group(TypeCode::GMST, vec![setting("sGlobalName", "From Y")])
        .build();
    let y_file = write(dir.path(), "Y.esp", y);
    let x_file = write(dir.path(), "X.esp", x);

    let mut list = PluginList::new(Settings::default());
    list.scan(&[x_file.clone(), y_file.clone()]);
    let record = list.index().find_setting("sGlobalName").unwrap();
    let y_id = list.find("Y.esp").unwrap();
    let x_id = list.find("X.esp").unwrap();
    assert_eq!(list.winner(record), Some(y_id));

    let tree = list.record_fields(record).unwrap();
    assert_eq!(
        tree.child_value(tree.root(), "Value", 1),
        Some(&FieldValue::Text("From Y".into()))
    );

    list.set_state("Y.esp", PluginState::Inactive).unwrap();
    assert_eq!(list.winner(record), Some(x_id));

    // Scanning Y first gives X the higher priority instead.
    let mut reversed = PluginList::new(Settings::default());
    reversed.scan(&[y_file, x_file]);
    let record = reversed.index().find_setting("sGlobalName").unwrap();
    assert_eq!(reversed.winner(record), reversed.find("X.esp"));
}

#[test]
fn damaged_file_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let good = PluginBuilder::new()
        .top_group(TypeCode::GMST, vec![setting("sName", "Good")])
        .build();
    let mut damaged = good.clone();
    damaged.truncate(good.len() - 3);
    let files = [
        write(dir.path(), "Good.esp", good),
        write(dir.path(), "Damaged.esp", damaged),
        write(dir.path(), "After.esp", PluginBuilder::new().master("Good.esp").build()),
    ];

    let mut list = PluginList::new(Settings::default());
    let report = list.scan(&files);
    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, FileName::from("Damaged.esp"));

    assert_eq!(list.len(), 3);
    let damaged = list.plugin_by_name("Damaged.esp").unwrap();
    assert!(damaged.decode_error().is_some());
    let record = list.index().find_setting("sName").unwrap();
    assert_eq!(list.alternatives(record), [list.find("Good.esp").unwrap()]);
}

// ===========================================================================
// Moving
// ===========================================================================

fn four_plugins() -> PluginList {
    let mut list = PluginList::new(Settings::default());
    list.scan_bytes(
        ["A.esp", "B.esp", "C.esp", "D.esp"]
            .map(|n| (FileName::from(n), PluginBuilder::new().build())),
    );
    list
}

#[test]
fn moved_events_report_down_moves_then_up_moves() {
    let mut list = four_plugins();
    let moves = record_moves(&mut list);
    let a = list.find("A.esp").unwrap();
    let d = list.find("D.esp").unwrap();

    list.move_to_priority(&[a, d], 2, false);
    assert_eq!(names(&list), ["B.esp", "A.esp", "D.esp", "C.esp"]);
    assert_eq!(
        *moves.lock().unwrap(),
        [("A.esp".to_string(), 0, 1), ("D.esp".to_string(), 3, 2)]
    );
}

#[test]
fn block_moves_keep_their_relative_order() {
    let mut list = four_plugins();
    let b = list.find("B.esp").unwrap();
    let d = list.find("D.esp").unwrap();
    list.move_to_priority(&[d, b], 0, false);
    assert_eq!(names(&list), ["B.esp", "D.esp", "A.esp", "C.esp"]);

    list.shift_priority(&[b, d], 1);
    assert_eq!(names(&list), ["A.esp", "B.esp", "D.esp", "C.esp"]);
}

/// A batch move that would break a dependency is rejected up front; forcing
/// it anyway stops each plugin at its blocker instead of corrupting order.
#[test]
fn invalid_batch_move_is_rejected_then_clamped() {
    let mut list = PluginList::new(Settings::default());
    list.scan_bytes(vec![
        (FileName::from("A.esp"), PluginBuilder::new().build()),
        (FileName::from("B.esp"), PluginBuilder::new().master("A.esp").build()),
        (FileName::from("C.esp"), PluginBuilder::new().build()),
    ]);
    let b = list.find("B.esp").unwrap();
    let c = list.find("C.esp").unwrap();

    match list.validate_move(&[b, c], 0) {
        Err(OrderingViolation::Dependency { later, earlier }) => {
            assert_eq!(later, FileName::from("B.esp"));
            assert_eq!(earlier, FileName::from("A.esp"));
        }
        other => panic!("expected dependency violation, got {other:?}"),
    }
    assert!(list.can_move_to_priority(&[c], 0));
    assert_eq!(names(&list), ["A.esp", "B.esp", "C.esp"]);

    list.move_to_priority(&[b, c], 0, false);
    assert_eq!(names(&list), ["C.esp", "A.esp", "B.esp"]);
}

#[test]
fn disabled_plugins_lose_their_compile_index() {
    let mut list = four_plugins();
    let b = list.find("B.esp").unwrap();
    list.set_enabled(b, false).unwrap();

    let indices: Vec<Option<usize>> = list
        .ids_by_priority()
        .iter()
        .map(|&id| list.plugin(id).unwrap().load_order())
        .collect();
    assert_eq!(indices, [Some(0), None, Some(1), Some(2)]);
    assert_eq!(list.active_load_order(), ["A.esp", "C.esp", "D.esp"].map(FileName::from));
    assert!(list.set_enabled(PluginId(42), true).is_err());
}

// ===========================================================================
// Persisting through bsplugins-data
// ===========================================================================

#[test]
fn profile_round_trips_through_data_files() {
    let data = tempfile::tempdir().unwrap();
    let profile = tempfile::tempdir().unwrap();
    write(data.path(), "Skyrim.esm", PluginBuilder::new().flags(record_flags::MASTER).build());
    write(data.path(), "Armor.esp", PluginBuilder::new().master("Skyrim.esm").build());
    write(data.path(), "Weapons.esp", PluginBuilder::new().master("Skyrim.esm").build());
    write(data.path(), "Patch.esp", PluginBuilder::new().master("Armor.esp").build());
    std::fs::write(data.path().join("Skyrim - Textures.bsa"), b"").unwrap();

    let settings_path = profile.path().join("settings.toml");
    std::fs::write(
        &settings_path,
        "game = \"SkyrimSE\"\nprimary_plugins = [\"Skyrim.esm\"]\n",
    )
    .unwrap();
    let settings = load_settings(&settings_path).unwrap();

    let files = discover_plugins(data.path()).unwrap();
    assert_eq!(files.len(), 4);
    let mut list = PluginList::new(settings.clone());
    list.scan(&files);
    assert_eq!(names(&list), ["Skyrim.esm", "Armor.esp", "Patch.esp", "Weapons.esp"]);

    let weapons = list.find("Weapons.esp").unwrap();
    list.move_to_priority(&[weapons], 1, false);
    let armor = list.find("Armor.esp").unwrap();
    list.set_group(&[armor, weapons], "Gear");
    list.set_enabled(weapons, false).unwrap();

    let load_order = profile.path().join("loadorder.txt");
    let groups = profile.path().join("plugingroups.txt");
    save_load_order(&list, &load_order).unwrap();
    save_groups(&list, &groups).unwrap();
    assert_eq!(
        read_load_order(&load_order).unwrap(),
        ["Skyrim.esm", "Weapons.esp", "Armor.esp", "Patch.esp"]
    );
    assert_eq!(read_groups(&groups).unwrap().len(), 2);

    // A fresh session restores order and groups from the profile.
    let mut restored = PluginList::new(settings);
    restored.scan(&discover_plugins(data.path()).unwrap());
    apply_load_order(&mut restored, &load_order).unwrap();
    apply_groups(&mut restored, &groups).unwrap();
    assert_eq!(names(&restored), names(&list));
    assert_eq!(restored.group("Armor.esp"), Some("Gear"));
    assert_eq!(restored.group("Patch.esp"), Some(""));

    // The forced master cannot be disabled.
    let skyrim = restored.find("Skyrim.esm").unwrap();
    restored.set_enabled(skyrim, false).unwrap();
    assert_eq!(restored.state("Skyrim.esm"), PluginState::Active);
}

#[test]
fn rescan_keeps_user_state() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "A.esp", PluginBuilder::new().build());
    let b = write(dir.path(), "B.esp", PluginBuilder::new().build());
    let mut list = PluginList::new(Settings::default());
    list.scan(&[a.clone(), b.clone()]);

    let b_id = list.find("B.esp").unwrap();
    list.move_to_priority(&[b_id], 0, false);
    list.set_enabled(b_id, false).unwrap();

    let c = write(dir.path(), "C.esp", PluginBuilder::new().build());
    list.scan(&[a, b, c]);
    assert_eq!(names(&list), ["B.esp", "A.esp", "C.esp"]);
    assert_eq!(list.state("B.esp"), PluginState::Inactive);
    assert_eq!(list.state("C.esp"), PluginState::Active);
}
