use std::fs;
use std::path::PathBuf;

use sim_domain::{EventId, MatrixKind, Model, Part, ResultStatus, SimulationEvent};

#[test]
fn model_json_roundtrip_sets_root() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = Model::new("crane", dir.path());
    let mut p = Part::new(1, "boom", "link_DB/boom");
    p.fe_file = Some(PathBuf::from("fe/boom.ftl"));
    p.result_files.remap_to("boom_3", "boom", [MatrixKind::Stiffness, MatrixKind::Mass]);
    m.parts.push(p);
    m.events.push(SimulationEvent::new(1, "gust", "events/gust"));

    let path = dir.path().join("crane.json");
    m.save(&path).unwrap();
    let loaded = Model::load(&path).unwrap();
    assert_eq!(loaded.root, dir.path());
    assert_eq!(loaded.parts[0].result_files, m.parts[0].result_files);
    assert_eq!(loaded.active_event(), None);
    assert!(loaded.event(EventId(1)).is_some());
}

#[test]
fn fe_checksum_changes_with_content() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("arm.ftl"), b"NODES 1 2 3").unwrap();
    let mut p = Part::new(1, "arm", "db/arm");
    p.fe_file = Some(PathBuf::from("arm.ftl"));
    let a = p.load_fe_data(dir.path()).unwrap();
    assert_eq!(p.load_fe_data(dir.path()).unwrap(), a);
    fs::write(dir.path().join("arm.ftl"), b"NODES 1 2 3 4").unwrap();
    let b = p.load_fe_data(dir.path()).unwrap();
    assert_ne!(a, b);
    assert_eq!(p.definition_checksum, Some(b));
}

#[test]
fn result_status_tracks_latest_task_dir() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    fs::create_dir_all(base.join("response_0001")).unwrap();
    fs::create_dir_all(base.join("response_0002/sub")).unwrap();
    fs::write(base.join("response_0001/old.frs"), b"x").unwrap();
    fs::write(base.join("response_0002/th_p_1.frs"), b"data").unwrap();
    fs::write(base.join("response_0002/sub/empty.frs"), b"").unwrap();

    let mut rs = ResultStatus::default();
    rs.sync_from_disk(base).unwrap();
    assert_eq!(rs.task_ver, 2);
    assert_eq!(rs.files.len(), 2);

    let purged = rs.purge_truncated(base, None).unwrap();
    assert_eq!(purged, vec![base.join("response_0002/sub/empty.frs")]);
    assert_eq!(rs.files.len(), 1);

    assert_eq!(rs.remove_all_files(base).unwrap(), 1);
    assert!(rs.is_empty());
    assert!(base.join("response_0001/old.frs").exists());
}

#[test]
fn truncated_files_from_an_earlier_run_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    fs::create_dir_all(base.join("response_0001")).unwrap();
    fs::write(base.join("response_0001/th_p_1.frs"), b"").unwrap();

    let mut rs = ResultStatus::default();
    rs.sync_from_disk(base).unwrap();
    let before = rs.clone();
    fs::write(base.join("response_0001/th_p_2.frs"), b"").unwrap();
    rs.sync_from_disk(base).unwrap();

    let purged = rs.purge_truncated(base, Some(&before)).unwrap();
    assert_eq!(purged, vec![base.join("response_0001/th_p_2.frs")]);
    assert!(base.join("response_0001/th_p_1.frs").exists());
    assert_eq!(rs.files.len(), 1);
}
