use poserepair::{
    detection::{load_detections, save_detections},
    recycle::recycle,
    repair, IdentityKey, RepairConfig, RepairError,
};
use serde_json::{json, Value};
use std::fs;

#[rustfmt::skip]
fn person(frame: &str, x: f64, y: f64, idx: i64) -> Value {
    json!({
        "image_id": frame,
        "category_id": 1,
        "keypoints": [
            x, y, 0.92,
            x - 15.0, y + 20.0, 0.88,
            x + 15.0, y + 20.0, 0.90,
            x - 8.0, y + 70.0, 0.75,
            x + 8.0, y + 70.0, 0.81,
        ],
        "score": 2.91,
        "box": [x - 20.0, y - 5.0, 40.0, 80.0],
        "idx": idx,
    })
}

#[test]
fn repair_file_round_trip_preserves_record_fields() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("alphapose-results.json");
    let output = dir.path().join("repaired.json");

    // raw ids swap at frame 2 and a stray detection appears at frame 3
    let doc = json!([
        person("0.jpg", 100.0, 100.0, 1),
        person("0.jpg", 400.0, 110.0, 2),
        person("1.jpg", 104.0, 101.0, 1),
        person("1.jpg", 396.0, 110.0, 2),
        person("2.jpg", 108.0, 102.0, 2),
        person("2.jpg", 392.0, 111.0, 1),
        person("3.jpg", 112.0, 103.0, 1),
        person("3.jpg", 900.0, 600.0, 7),
        person("3.jpg", 388.0, 111.0, 2),
    ]);
    fs::write(&input, serde_json::to_string(&doc).unwrap()).unwrap();

    let detections = load_detections(&input).unwrap();
    let result = repair(&detections, &RepairConfig::default()).unwrap();
    save_detections(&output, &result.detections, true).unwrap();

    let written: Vec<Value> = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written.len(), 8);
    assert_eq!(result.report.dropped, 1);

    for rec in &written {
        let x = rec["keypoints"][0].as_f64().unwrap();
        let expected = if x < 250.0 { 1 } else { 2 };
        assert_eq!(rec["idx"], json!(expected), "record {}", rec);
        assert_eq!(rec["score"], json!(2.91));
        assert_eq!(rec["category_id"], json!(1));
    }

    let keys: Vec<&str> = written[0]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, vec!["image_id", "category_id", "keypoints", "score", "box", "idx"]);
}

#[test]
fn repair_keeps_record_layout_and_number_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ints.json");
    let output = dir.path().join("ints-repaired.json");
    let text = r#"[{"idx":3,"image_id":"0.jpg","score":1,"keypoints":[10,20,1,30,40,1]},{"idx":3,"image_id":"1.jpg","score":1,"keypoints":[11,20,1,31,40,1]}]"#;
    fs::write(&input, text).unwrap();

    let detections = load_detections(&input).unwrap();
    let result = repair(&detections, &RepairConfig::default()).unwrap();
    save_detections(&output, &result.detections, false).unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), text);
}

#[test]
fn repair_output_feeds_back_unchanged() {
    let doc = json!([
        person("f_0.png", 50.0, 50.0, 3),
        person("f_0.png", 300.0, 60.0, 8),
        person("f_1.png", 290.0, 62.0, 3),
        person("f_1.png", 55.0, 51.0, 8),
        person("f_2.png", 60.0, 52.0, 8),
    ]);
    let detections: Vec<poserepair::Detection> = serde_json::from_value(doc).unwrap();

    let cfg = RepairConfig::default();
    let once = repair(&detections, &cfg).unwrap();
    let twice = repair(&once.detections, &cfg).unwrap();
    assert_eq!(once.detections, twice.detections);
    assert_eq!(
        once.report.identities,
        vec![IdentityKey::Index(3), IdentityKey::Index(8)]
    );
}

#[test]
fn malformed_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.json");
    fs::write(&input, r#"[{"image_id": "0.jpg", "keypoints": [1.0, 2.0]}]"#).unwrap();

    let detections = load_detections(&input).unwrap();
    let err = repair(&detections, &RepairConfig::default()).unwrap_err();
    assert!(matches!(err, RepairError::MalformedKeypoints { index: 0, .. }));

    fs::write(&input, r#"[{"keypoints": [1.0, 2.0, 0.5]}]"#).unwrap();
    assert!(matches!(load_detections(&input), Err(RepairError::Json(_))));

    let missing = dir.path().join("missing.json");
    assert!(matches!(load_detections(&missing), Err(RepairError::Io { .. })));
}

#[test]
fn recycle_file_round_trip() {
    let doc = json!([
        person("0.jpg", 100.0, 100.0, 41),
        person("0.jpg", 400.0, 100.0, 42),
        person("1.jpg", 100.0, 100.0, 41),
        person("2.jpg", 100.0, 100.0, 41),
        person("2.jpg", 250.0, 100.0, 57),
    ]);
    let detections: Vec<poserepair::Detection> = serde_json::from_value(doc).unwrap();
    let (out, report) = recycle(&detections).unwrap();

    let ids: Vec<Value> = out.iter().map(|d| d.idx().cloned().unwrap()).collect();
    assert_eq!(ids, vec![json!(0), json!(1), json!(0), json!(0), json!(1)]);
    assert_eq!(report.reused, 1);
}
