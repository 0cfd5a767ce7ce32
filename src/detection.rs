use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{RepairError, Result};
use crate::pose::Pose;

/// One person observation as it appears in AlphaPose-style output.
///
/// Only `image_id`, `keypoints` and `idx` are interpreted. The record is
/// written back exactly as read apart from `idx`, so field order and number
/// formatting survive a repair pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Detection {
    image_id: String,
    keypoints: Vec<f64>,
    idx: Option<Value>,
    record: Map<String, Value>,
}

/// The interpreted part of a record.
#[derive(Deserialize)]
struct Fields {
    image_id: String,
    keypoints: Vec<f64>,
    #[serde(default)]
    idx: Option<Value>,
}

impl TryFrom<Map<String, Value>> for Detection {
    type Error = serde_json::Error;

    fn try_from(record: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let fields: Fields = serde_json::from_value(Value::Object(record.clone()))?;
        Ok(Self {
            image_id: fields.image_id,
            keypoints: fields.keypoints,
            idx: fields.idx,
            record,
        })
    }
}

impl From<Detection> for Map<String, Value> {
    fn from(det: Detection) -> Self {
        det.record
    }
}

impl Detection {
    pub fn new(image_id: impl Into<String>, keypoints: Vec<f64>, idx: Option<Value>) -> Self {
        let image_id = image_id.into();
        let mut record = Map::new();
        record.insert("image_id".into(), Value::from(image_id.as_str()));
        record.insert("keypoints".into(), Value::from(keypoints.clone()));
        if let Some(idx) = &idx {
            record.insert("idx".into(), idx.clone());
        }
        Self {
            image_id,
            keypoints,
            idx,
            record,
        }
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn keypoints(&self) -> &[f64] {
        &self.keypoints
    }

    pub fn idx(&self) -> Option<&Value> {
        self.idx.as_ref()
    }

    /// The full record, uninterpreted fields included.
    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    /// Replace `idx`. An existing field keeps its position; a new one goes last.
    pub fn set_idx(&mut self, value: Value) {
        self.record.insert("idx".into(), value.clone());
        self.idx = Some(value);
    }

    /// Parsed keypoints, `None` if the array is not made of triples.
    pub fn pose(&self) -> Option<Pose> {
        Pose::from_flat(&self.keypoints)
    }

    /// The raw identity label, if it can serve as an identity key.
    pub fn raw_key(&self) -> Option<IdentityKey> {
        self.idx.as_ref().and_then(IdentityKey::from_value)
    }

    /// Copy of this record with `idx` replaced by `key`.
    pub fn with_identity(&self, key: &IdentityKey) -> Self {
        let mut out = self.clone();
        out.set_idx(key.to_value());
        out
    }

    pub fn frame_number(&self) -> i64 {
        frame_number(&self.image_id)
    }
}

/// Stable identifier handed out by the repair pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    Index(i64),
    Label(String),
}

impl IdentityKey {
    /// Integers, integral floats and strings are usable labels.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(IdentityKey::Index(i));
                }
                let f = n.as_f64()?;
                let in_range = f.fract() == 0.0 && f.abs() < i64::MAX as f64;
                in_range.then(|| IdentityKey::Index(f as i64))
            }
            Value::String(s) => Some(IdentityKey::Label(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            IdentityKey::Index(i) => Value::from(*i),
            IdentityKey::Label(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Index(i) => write!(f, "{}", i),
            IdentityKey::Label(s) => write!(f, "{}", s),
        }
    }
}

/// Numeric sort key of a frame identifier.
///
/// `"000123.jpg"` and `"123.png"` give 123, and digit groups may be split by
/// single underscores (`"1_000.jpg"` gives 1000). When the part before the
/// first dot is not a number, the last all-digit underscore token is used
/// (`"img_123.jpg"` gives 123). Anything else sorts as frame 0.
pub fn frame_number(image_id: &str) -> i64 {
    let base = image_id.split('.').next().unwrap_or("");
    if let Some(n) = parse_grouped_int(base) {
        return n;
    }
    base.rsplit('_')
        .find(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|part| part.parse().ok())
        .unwrap_or(0)
}

/// Signed integer with optional surrounding whitespace and `_` between digits.
fn parse_grouped_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    let well_formed = !digits.is_empty()
        && !digits.starts_with('_')
        && !digits.ends_with('_')
        && !digits.contains("__")
        && digits.bytes().all(|b| b.is_ascii_digit() || b == b'_');
    if !well_formed {
        return None;
    }
    text.replace('_', "").parse().ok()
}

/// All detections sharing one frame identifier, in input order.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image_id: String,
    pub number: i64,
    /// Positions of the detections in the input stream
    pub indices: Vec<usize>,
}

/// Group detections by `image_id` and order frames by their numeric key.
///
/// Frames sharing a key keep the order in which they first appear.
pub fn group_frames(detections: &[Detection]) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut by_id: HashMap<&str, usize> = HashMap::new();

    for (i, det) in detections.iter().enumerate() {
        let slot = *by_id.entry(det.image_id.as_str()).or_insert_with(|| {
            frames.push(Frame {
                image_id: det.image_id.clone(),
                number: det.frame_number(),
                indices: Vec::new(),
            });
            frames.len() - 1
        });
        frames[slot].indices.push(i);
    }

    frames.sort_by_key(|f| f.number);
    debug!("Grouped {} detections into {} frames", detections.len(), frames.len());
    frames
}

/// Check every record's keypoints are whole triples and parse them.
pub fn parse_poses(detections: &[Detection]) -> Result<Vec<Pose>> {
    detections
        .iter()
        .enumerate()
        .map(|(index, det)| {
            det.pose().ok_or_else(|| RepairError::MalformedKeypoints {
                index,
                image_id: det.image_id.clone(),
                len: det.keypoints.len(),
            })
        })
        .collect()
}

/// Read a JSON array of detections.
pub fn load_detections(path: impl AsRef<Path>) -> Result<Vec<Detection>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| RepairError::io(path, e))?;
    let detections: Vec<Detection> = serde_json::from_str(&data)?;
    debug!("Loaded {} detections from {:?}", detections.len(), path);
    Ok(detections)
}

/// Write detections as a JSON array.
pub fn save_detections(path: impl AsRef<Path>, detections: &[Detection], pretty: bool) -> Result<()> {
    let path = path.as_ref();
    let json = if pretty {
        serde_json::to_string_pretty(detections)?
    } else {
        serde_json::to_string(detections)?
    };
    fs::write(path, json).map_err(|e| RepairError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_number_parsing() {
        assert_eq!(frame_number("000123.jpg"), 123);
        assert_eq!(frame_number("123.png"), 123);
        assert_eq!(frame_number("img_123.jpg"), 123);
        assert_eq!(frame_number("cam_7_frame_42.jpg"), 42);
        assert_eq!(frame_number("cam_7_frame.jpg"), 7);
        assert_eq!(frame_number("abc.jpg"), 0);
        assert_eq!(frame_number(""), 0);
        assert_eq!(frame_number("55"), 55);
        assert_eq!(frame_number("-3.jpg"), -3);
    }

    #[test]
    fn test_frame_number_digit_groups() {
        assert_eq!(frame_number("1_000.jpg"), 1000);
        assert_eq!(frame_number("12_345_678.png"), 12_345_678);
        // malformed groups fall back to the last digit token
        assert_eq!(frame_number("1__000.jpg"), 0);
        assert_eq!(frame_number("_12.jpg"), 12);
        assert_eq!(frame_number("12_.jpg"), 12);
    }

    #[test]
    fn test_group_frames_orders_numerically() {
        let dets = vec![
            Detection::new("10.jpg", vec![], None),
            Detection::new("9.jpg", vec![], None),
            Detection::new("10.jpg", vec![], None),
            Detection::new("img_2.jpg", vec![], None),
        ];
        let frames = group_frames(&dets);
        let ids: Vec<&str> = frames.iter().map(|f| f.image_id.as_str()).collect();
        assert_eq!(ids, vec!["img_2.jpg", "9.jpg", "10.jpg"]);
        assert_eq!(frames[2].indices, vec![0, 2]);
    }

    #[test]
    fn test_group_frames_equal_keys_keep_first_appearance() {
        let dets = vec![
            Detection::new("b.jpg", vec![], None),
            Detection::new("a.jpg", vec![], None),
        ];
        let frames = group_frames(&dets);
        assert_eq!(frames[0].image_id, "b.jpg");
        assert_eq!(frames[1].image_id, "a.jpg");
    }

    #[test]
    fn test_identity_key_from_value() {
        assert_eq!(IdentityKey::from_value(&json!(3)), Some(IdentityKey::Index(3)));
        assert_eq!(IdentityKey::from_value(&json!(4.0)), Some(IdentityKey::Index(4)));
        assert_eq!(
            IdentityKey::from_value(&json!("p1")),
            Some(IdentityKey::Label("p1".into()))
        );
        assert_eq!(IdentityKey::from_value(&json!(1.5)), None);
        assert_eq!(IdentityKey::from_value(&json!([1, 2])), None);
        assert_eq!(IdentityKey::from_value(&Value::Null), None);
    }

    #[test]
    fn test_record_preserves_extra_fields() {
        let raw = json!({
            "image_id": "0.jpg",
            "category_id": 1,
            "keypoints": [1.0, 2.0, 0.9],
            "score": 2.7,
            "box": [1, 2, 3, 4],
            "idx": 5
        });
        let det: Detection = serde_json::from_value(raw).unwrap();
        assert_eq!(det.raw_key(), Some(IdentityKey::Index(5)));
        assert_eq!(det.record().len(), 6);

        let fixed = det.with_identity(&IdentityKey::Index(0));
        let out = serde_json::to_value(&fixed).unwrap();
        assert_eq!(out["idx"], json!(0));
        assert_eq!(out["score"], json!(2.7));
        assert_eq!(out["box"], json!([1, 2, 3, 4]));
    }

    #[test]
    fn test_record_written_back_verbatim() {
        let text = r#"{"idx":3,"image_id":"0.jpg","score":1,"keypoints":[1,2,3]}"#;
        let det: Detection = serde_json::from_str(text).unwrap();
        assert_eq!(det.keypoints(), &[1.0, 2.0, 3.0]);

        let relabelled = det.with_identity(&IdentityKey::Index(8));
        assert_eq!(
            serde_json::to_string(&relabelled).unwrap(),
            r#"{"idx":8,"image_id":"0.jpg","score":1,"keypoints":[1,2,3]}"#
        );

        let mut unlabelled: Detection =
            serde_json::from_str(r#"{"image_id":"0.jpg","keypoints":[]}"#).unwrap();
        unlabelled.set_idx(json!(2));
        assert_eq!(
            serde_json::to_string(&unlabelled).unwrap(),
            r#"{"image_id":"0.jpg","keypoints":[],"idx":2}"#
        );
    }

    #[test]
    fn test_missing_keypoints_is_an_error() {
        let result: std::result::Result<Vec<Detection>, _> =
            serde_json::from_value(json!([{"image_id": "0.jpg"}]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_poses_reports_bad_record() {
        let dets = vec![
            Detection::new("0.jpg", vec![0.0, 0.0, 1.0], None),
            Detection::new("1.jpg", vec![0.0, 0.0], None),
        ];
        match parse_poses(&dets) {
            Err(RepairError::MalformedKeypoints { index, image_id, len }) => {
                assert_eq!(index, 1);
                assert_eq!(image_id, "1.jpg");
                assert_eq!(len, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
