//! Shape report for pose JSON files, to check the layout before repairing.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RepairError, Result};

/// Entries looked at in a list file
pub const SAMPLE_SIZE: usize = 100;
/// Files reported per invocation
pub const MAX_FILES: usize = 5;

/// Shape information for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryInfo {
    pub keypoints_len: Option<usize>,
    /// `(joints, values per joint)`; the second is `None` when the first
    /// joint is not an array
    pub xyz_shape: Option<(usize, Option<usize>)>,
}

impl EntryInfo {
    pub fn is_empty(&self) -> bool {
        self.keypoints_len.is_none() && self.xyz_shape.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileSummary {
    List {
        total: usize,
        sampled: usize,
        with_keypoints: usize,
        keypoint_lengths: BTreeMap<usize, usize>,
        with_xyz: usize,
        xyz_shapes: BTreeMap<(usize, Option<usize>), usize>,
        first: EntryInfo,
    },
    Single(EntryInfo),
    EmptyList,
    Unsupported(&'static str),
}

pub fn analyze_entry(entry: &Value) -> EntryInfo {
    let keypoints_len = entry
        .get("keypoints")
        .and_then(Value::as_array)
        .map(Vec::len);
    let xyz_shape = entry
        .get("pred_xyz_jts")
        .and_then(Value::as_array)
        .map(|joints| {
            let per_joint = joints.first().and_then(Value::as_array).map(Vec::len);
            (joints.len(), per_joint)
        });
    EntryInfo {
        keypoints_len,
        xyz_shape,
    }
}

pub fn summarize(doc: &Value) -> FileSummary {
    match doc {
        Value::Array(entries) if entries.is_empty() => FileSummary::EmptyList,
        Value::Array(entries) => {
            let sample = &entries[..entries.len().min(SAMPLE_SIZE)];
            let mut keypoint_lengths = BTreeMap::new();
            let mut xyz_shapes = BTreeMap::new();
            let (mut with_keypoints, mut with_xyz) = (0, 0);

            for info in sample.iter().map(analyze_entry) {
                if let Some(len) = info.keypoints_len {
                    with_keypoints += 1;
                    *keypoint_lengths.entry(len).or_insert(0) += 1;
                }
                if let Some(shape) = info.xyz_shape {
                    with_xyz += 1;
                    *xyz_shapes.entry(shape).or_insert(0) += 1;
                }
            }

            FileSummary::List {
                total: entries.len(),
                sampled: sample.len(),
                with_keypoints,
                keypoint_lengths,
                with_xyz,
                xyz_shapes,
                first: analyze_entry(&sample[0]),
            }
        }
        Value::Object(_) => FileSummary::Single(analyze_entry(doc)),
        Value::Null => FileSummary::Unsupported("null"),
        Value::Bool(_) => FileSummary::Unsupported("boolean"),
        Value::Number(_) => FileSummary::Unsupported("number"),
        Value::String(_) => FileSummary::Unsupported("string"),
    }
}

/// Parse a file and summarize it.
pub fn inspect_file(path: impl AsRef<Path>) -> Result<FileSummary> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| RepairError::io(path, e))?;
    let doc: Value = serde_json::from_str(&data)?;
    Ok(summarize(&doc))
}

/// A directory expands to its `*.json` files, sorted; anything else is
/// taken as a file.
pub fn collect_json_files(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| RepairError::io(path, e))? {
        let entry = entry.map_err(|e| RepairError::io(path, e))?;
        let p = entry.path();
        if p.is_file() && p.extension().is_some_and(|ext| ext == "json") {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

fn layout(len: usize) -> String {
    let xy = if len % 2 == 0 { (len / 2).to_string() } else { "n/a".into() };
    let xys = if len % 3 == 0 { (len / 3).to_string() } else { "n/a".into() };
    format!("{} (xy={} joints, xy+score={} joints)", len, xy, xys)
}

fn shape(joints: usize, per_joint: Option<usize>) -> String {
    let k = per_joint.map_or("?".to_string(), |k| k.to_string());
    let smpl = if joints == 24 && per_joint.map_or(true, |k| k >= 3) {
        " (SMPL-24)"
    } else {
        ""
    };
    format!("{}x{}{}", joints, k, smpl)
}

impl fmt::Display for EntryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no 'keypoints' or 'pred_xyz_jts' fields");
        }
        let mut parts = Vec::new();
        if let Some(len) = self.keypoints_len {
            parts.push(format!("keypoints len={}", layout(len)));
        }
        if let Some((j, k)) = self.xyz_shape {
            parts.push(format!("pred_xyz_jts shape={}", shape(j, k)));
        }
        write!(f, "{}", parts.join(", "))
    }
}

impl fmt::Display for FileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSummary::List {
                total,
                sampled,
                with_keypoints,
                keypoint_lengths,
                with_xyz,
                xyz_shapes,
                first,
            } => {
                writeln!(f, "  Entries inspected: {} / {}", sampled, total)?;
                if *with_keypoints > 0 {
                    writeln!(f, "  keypoints present in {} / {} entries", with_keypoints, sampled)?;
                    for (len, count) in keypoint_lengths {
                        writeln!(f, "    - len={}: {} entries", layout(*len), count)?;
                    }
                } else {
                    writeln!(f, "  No 'keypoints' found in sampled entries.")?;
                }
                if *with_xyz > 0 {
                    writeln!(f, "  pred_xyz_jts present in {} / {} entries", with_xyz, sampled)?;
                    for ((j, k), count) in xyz_shapes {
                        writeln!(f, "    - shape={}: {} entries", shape(*j, *k), count)?;
                    }
                } else {
                    writeln!(f, "  No 'pred_xyz_jts' found in sampled entries.")?;
                }
                write!(f, "  Example (first sampled entry): {}", first)
            }
            FileSummary::Single(info) => write!(f, "  Info: {}", info),
            FileSummary::EmptyList => write!(f, "  [WARN] Empty list."),
            FileSummary::Unsupported(kind) => {
                write!(f, "  [WARN] Unsupported JSON top-level type: {}", kind)
            }
        }
    }
}
