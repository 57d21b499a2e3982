use std::fs;

use catalog::{load_records, Catalog, BUILTIN_UUID};
use shared::domain::DeviceSlotIndex;

#[test]
fn authored_file_builds_gap_free_slots_and_reports_rejections() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("sensations.json");
    fs::write(
        &path,
        r#"[
            {"Uuid":"kick","Description":"Kick","Cost":"50","Prefix":"owo","sensation":"0~Kick~100,2,80,0,0,1,Kick|0,1~kick~"},
            {"Uuid":"typo","Description":"Typo","Cost":"60","Prefix":"owo","sensation":"0~Typo~100,2,80,0,0,Kick|0~typo~"},
            {"Uuid":"wave","Description":"Wave","Cost":"70","Prefix":"owo","sensation":"0~Wave~20,10,40,5,5,0,Wave|2,3&20,10,40,5,5,5,Wave|4,5~wave~"}
        ]"#,
    )
    .expect("write catalog");

    let catalog = Catalog::build(load_records(Some(&path))).expect("build");

    assert_eq!(catalog.rejected(), ["typo".to_string()]);
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.slots()[0].uuid, BUILTIN_UUID);
    assert_eq!(catalog.registry().get("owo50"), Some(DeviceSlotIndex(1)));
    assert_eq!(catalog.registry().get("owo70"), Some(DeviceSlotIndex(2)));
    assert!(catalog.registry().get("owo60").is_none());

    let configuration = catalog.configuration();
    assert_eq!(configuration.len(), 3);
    assert!(configuration[2].starts_with("2~Wave~"));
    assert!(configuration.iter().all(|code| code.ends_with('~')));

    let wave = catalog
        .slot(DeviceSlotIndex(2))
        .expect("wave slot")
        .reparse()
        .expect("reparse");
    assert_eq!(wave.total_duration().expect("duration").as_secs_f64(), 2.5);
}
