//! Adversarial inputs: damaged files, hostile sizes and impossible load
//! orders. None of these should panic.

use bsplugins_core::config::Settings;
use bsplugins_core::format::record_flags;
use bsplugins_core::id::FileName;
use bsplugins_core::plugin_list::PluginList;
use bsplugins_core::reader::DecodeError;
use bsplugins_core::scan::{PluginFile, decode_plugin};
use bsplugins_core::test_utils::*;
use bsplugins_core::type_code::TypeCode;

fn settings() -> Settings {
    Settings::default()
}

fn gmst(edid: &str, value: f32) -> FormBuilder {
    FormBuilder::new(TypeCode::GMST, 0x0000_0800)
        .edid(edid)
        .chunk(TypeCode::DATA, value.to_le_bytes().to_vec())
}

/// A header-only plugin followed by a raw group header.
fn with_group_header(size: u32, kind: i32) -> Vec<u8> {
    let mut bytes = PluginBuilder::new().build();
    bytes.extend_from_slice(b"GRUP");
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.extend_from_slice(b"GMST");
    bytes.extend_from_slice(&kind.to_le_bytes());
    bytes.extend_from_slice(&[0; 8]);
    bytes
}

fn decode(bytes: &[u8]) -> Result<(), DecodeError> {
    decode_plugin(bytes, &FileName::from("Broken.esp"), &settings()).map(|_| ())
}

/// Cutting a plugin at every byte boundary never panics.
#[test]
fn truncation_at_every_offset_does_not_panic() {
    let bytes = PluginBuilder::new()
        .master("Skyrim.esm")
        .author("someone")
        .top_group(TypeCode::GMST, vec![gmst("fA", 1.0), gmst("fB", 2.0).compressed()])
        .top_group(
            TypeCode::GLOB,
            vec![FormBuilder::new(TypeCode::GLOB, 0x0000_0d00).edid("Glob")],
        )
        .build();
    assert!(decode(&bytes).is_ok());
    for cut in 0..bytes.len() {
        let _ = decode(&bytes[..cut]);
    }
}

#[test]
fn empty_file_is_malformed() {
    assert!(matches!(decode(&[]), Err(DecodeError::Malformed { .. })));
}

#[test]
fn foreign_file_is_rejected() {
    let err = decode(b"PK\x03\x04 definitely not a plugin").unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedHeader(_)));
}

/// A group whose size does not even cover its header is malformed.
#[test]
fn undersized_group_is_malformed() {
    let err = decode(&with_group_header(10, 0)).unwrap_err();
    match err {
        DecodeError::Malformed { reason, .. } => assert!(reason.contains("smaller")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_group_kind_is_malformed() {
    let err = decode(&with_group_header(24, 42)).unwrap_err();
    match err {
        DecodeError::Malformed { reason, .. } => assert!(reason.contains("42")),
        other => panic!("unexpected error: {other}"),
    }
}

/// A group claiming far more bytes than the file holds.
#[test]
fn oversized_group_is_malformed() {
    let err = decode(&with_group_header(u32::MAX, 0)).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { .. }));
}

/// A compressed body that is not a zlib stream.
#[test]
fn garbage_compressed_body_fails_to_inflate() {
    let form = FormBuilder::new(TypeCode::GMST, 0x800)
        .raw_body(vec![8, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef], record_flags::COMPRESSED);
    let bytes = PluginBuilder::new().top_group(TypeCode::GMST, vec![form]).build();
    assert!(matches!(decode(&bytes), Err(DecodeError::Decompression { .. })));
}

/// A compressed body claiming an absurd inflated size is refused, not
/// allocated.
#[test]
fn lying_decompressed_length_is_rejected() {
    let mut body = u32::MAX.to_le_bytes().to_vec();
    body.extend_from_slice(&[0x78, 0x9c, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let form = FormBuilder::new(TypeCode::GMST, 0x800).raw_body(body, record_flags::COMPRESSED);
    let bytes = PluginBuilder::new().top_group(TypeCode::GMST, vec![form]).build();
    assert!(matches!(decode(&bytes), Err(DecodeError::Decompression { .. })));
}

/// A chunk size running past the end of its form.
#[test]
fn chunk_overrunning_form_is_malformed() {
    let mut body = b"EDID".to_vec();
    body.extend_from_slice(&200u16.to_le_bytes());
    body.extend_from_slice(b"fShort\0");
    let form = FormBuilder::new(TypeCode::GMST, 0x800).raw_body(body, 0);
    let bytes = PluginBuilder::new().top_group(TypeCode::GMST, vec![form]).build();
    assert!(matches!(decode(&bytes), Err(DecodeError::Malformed { .. })));
}

/// Masters that require each other in a loop leave the order as close to
/// the input as possible instead of spinning forever.
#[test]
fn master_cycle_terminates() {
    let a = PluginBuilder::new().master("C.esp").build();
    let b = PluginBuilder::new().master("A.esp").build();
    let c = PluginBuilder::new().master("B.esp").build();
    let mut list = PluginList::new(settings());
    let report = list.scan_bytes(vec![("A.esp".into(), a), ("B.esp".into(), b), ("C.esp".into(), c)]);
    assert_eq!(report.scanned, 3);
    assert_eq!(list.len(), 3);
    let mut priorities: Vec<usize> = list.plugins().map(|(_, p)| p.priority()).collect();
    priorities.sort_unstable();
    assert_eq!(priorities, [0, 1, 2]);

    // Repairing again also terminates and loses nobody.
    list.repair_order();
    assert_eq!(list.load_order().len(), 3);
}

/// Two files naming each other as masters cancel out.
#[test]
fn mutual_masters_impose_no_order() {
    let a = PluginBuilder::new().master("B.esp").build();
    let b = PluginBuilder::new().master("A.esp").build();
    let mut list = PluginList::new(settings());
    list.scan_bytes(vec![("A.esp".into(), a), ("B.esp".into(), b)]);
    assert_eq!(list.load_order(), [FileName::from("A.esp"), FileName::from("B.esp")]);
}

/// A broken file among good ones is kept, recordless, and the rest scan.
#[test]
fn broken_file_does_not_poison_the_scan() {
    let good = PluginBuilder::new()
        .top_group(TypeCode::GMST, vec![gmst("fGravity", 1.0)])
        .build();
    let mut list = PluginList::new(settings());
    let report = list.scan_bytes(vec![
        ("Good.esp".into(), good),
        ("Broken.esp".into(), b"TES4\xff\xff".to_vec()),
    ]);
    assert_eq!(report.scanned, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, FileName::from("Broken.esp"));

    let broken = list.plugin_by_name("Broken.esp").unwrap();
    assert!(broken.decode_error().is_some());
    let record = list.index().find_setting("fGravity").unwrap();
    assert_eq!(list.alternatives(record).len(), 1);
}

/// Field decoding of a file deleted after the scan leaves its column empty.
#[test]
fn vanished_file_leaves_empty_column() {
    let dir = tempfile::tempdir().unwrap();
    let x = dir.path().join("X.esp");
    let y = dir.path().join("Y.esp");
    std::fs::write(
        &x,
        PluginBuilder::new().top_group(TypeCode::GMST, vec![gmst("fGravity", 1.0)]).build(),
    )
    .unwrap();
    std::fs::write(
        &y,
        PluginBuilder::new().top_group(TypeCode::GMST, vec![gmst("fGravity", 2.0)]).build(),
    )
    .unwrap();

    let mut list = PluginList::new(settings());
    list.scan(&[PluginFile::new(&x), PluginFile::new(&y)]);
    std::fs::remove_file(&y).unwrap();

    let record = list.index().find_setting("fGravity").unwrap();
    let tree = list.record_fields(record).unwrap();
    assert_eq!(tree.files().len(), 2);
    let value = tree.find_child(tree.root(), "Value").unwrap();
    assert!(tree.value(value, 0).is_some());
    assert!(tree.value(value, 1).is_none());
}

/// Moves with unknown ids and wild destinations are clamped or ignored.
#[test]
fn out_of_range_moves_are_harmless() {
    use bsplugins_core::id::PluginId;

    let a = PluginBuilder::new().build();
    let b = PluginBuilder::new().build();
    let mut list = PluginList::new(settings());
    list.scan_bytes(vec![("A.esp".into(), a), ("B.esp".into(), b)]);

    list.move_to_priority(&[PluginId(99)], 0, false);
    assert_eq!(list.load_order(), [FileName::from("A.esp"), FileName::from("B.esp")]);
    list.move_to_priority(&[PluginId(0)], usize::MAX, true);
    assert_eq!(list.load_order(), [FileName::from("B.esp"), FileName::from("A.esp")]);
    list.shift_priority(&[PluginId(0)], isize::MIN);
    assert_eq!(list.load_order(), [FileName::from("A.esp"), FileName::from("B.esp")]);
    assert!(list.set_priority("A.esp", 7).is_err());
}
