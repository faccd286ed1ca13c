use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Operation id of multi-touch samples; every other operation is ignored.
pub const MULTI_TOUCH_OP: &str = "PutMultiTouch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: i64,
    pub y: i64,
    /// `1` = finger down, `0` = finger up.
    #[serde(default)]
    pub state: u8,
}

impl TouchPoint {
    pub fn is_down(&self) -> bool {
        self.state == 1
    }

    pub fn is_up(&self) -> bool {
        self.state == 0
    }
}

/// One touch sample. Empty `points` is a release marker with no position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedOperation {
    pub timing_ms: u64,
    pub points: Vec<TouchPoint>,
}

impl RecordedOperation {
    /// A lone touch-down sample, the start of a gesture.
    pub fn is_actionable(&self) -> bool {
        self.points.len() == 1 && self.points[0].is_down()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInfo {
    pub total_duration_ms: u64,
    pub loop_times: u32,
    pub record_width: u32,
    pub record_height: u32,
}

/// A parsed operation log, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub info: RecordInfo,
    pub operations: Vec<RecordedOperation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecordFile {
    #[serde(default)]
    record_info: RawRecordInfo,
    #[serde(default)]
    operations: Vec<RawOperation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRecordInfo {
    circle_duration: u64,
    loop_times: u32,
    resolution_width: u32,
    resolution_height: u32,
}

impl Default for RawRecordInfo {
    fn default() -> Self {
        Self {
            circle_duration: 0,
            loop_times: 1,
            resolution_width: 960,
            resolution_height: 540,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    #[serde(default)]
    operation_id: String,
    #[serde(default)]
    timing: u64,
    #[serde(default)]
    points: Vec<TouchPoint>,
}

impl OperationRecord {
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawRecordFile = serde_json::from_str(json).context("malformed record file")?;

        let mut operations: Vec<RecordedOperation> = raw
            .operations
            .into_iter()
            .filter(|op| op.operation_id == MULTI_TOUCH_OP)
            .map(|op| RecordedOperation {
                timing_ms: op.timing,
                points: op.points,
            })
            .collect();
        // Stable, so samples sharing a timestamp keep their recorded order.
        operations.sort_by_key(|op| op.timing_ms);

        Ok(Self {
            info: RecordInfo {
                total_duration_ms: raw.record_info.circle_duration,
                loop_times: raw.record_info.loop_times.max(1),
                record_width: raw.record_info.resolution_width.max(1),
                record_height: raw.record_info.resolution_height.max(1),
            },
            operations,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JobError::NotFound(format!("record file {}", path.display())).into());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read record {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse record {}", path.display()))
    }

    /// Gestures per loop, used as the progress total.
    pub fn actionable_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_actionable()).count()
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.info.record_width, self.info.record_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "recordInfo": {
            "circleDuration": 4200,
            "loopTimes": 3,
            "resolutionWidth": 960,
            "resolutionHeight": 540
        },
        "operations": [
            { "operationId": "PutMultiTouch", "timing": 100, "points": [ { "x": 17940, "y": 4380, "state": 1 } ] },
            { "operationId": "PutMultiTouch", "timing": 160, "points": [] },
            { "operationId": "PutMultiTouch", "timing": 180, "points": [ { "x": 17940, "y": 4380, "state": 0 } ] },
            { "operationId": "KeyPress", "timing": 200, "key": 4 },
            { "operationId": "PutMultiTouch", "timing": 150, "points": [ { "x": 1000, "y": 1000, "state": 1 } ] }
        ]
    }"#;

    #[test]
    fn keeps_only_multi_touch_in_timestamp_order() {
        let record = OperationRecord::parse(SAMPLE).unwrap();
        assert_eq!(record.info.loop_times, 3);
        assert_eq!(record.info.total_duration_ms, 4200);
        assert_eq!(record.resolution(), (960, 540));

        let timings: Vec<_> = record.operations.iter().map(|op| op.timing_ms).collect();
        assert_eq!(timings, vec![100, 150, 160, 180]);
        assert_eq!(record.actionable_count(), 2);
    }

    #[test]
    fn missing_info_uses_reference_defaults() {
        let record = OperationRecord::parse(r#"{ "operations": [] }"#).unwrap();
        assert_eq!(record.info.loop_times, 1);
        assert_eq!(record.resolution(), (960, 540));
        assert!(record.operations.is_empty());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = OperationRecord::load(Path::new("/nope/farm.record")).unwrap_err();
        assert!(matches!(
            JobError::from_anyhow(&err),
            JobError::NotFound(_)
        ));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(OperationRecord::parse("not json").is_err());
    }
}
