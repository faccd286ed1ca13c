use std::fmt;

use serde::{Deserialize, Serialize};

/// First ADB port handed out by the emulator host; instance `n` listens on
/// `BASE + 2n`.
const EMULATOR_BASE_PORT: u32 = 5554;

/// ADB serial for an emulator instance index, e.g. `1 -> "emulator-5556"`.
pub fn serial_for_index(index: u32) -> String {
    format!("emulator-{}", EMULATOR_BASE_PORT + index * 2)
}

/// Inverse of [`serial_for_index`]; `None` for network serials or odd ports.
pub fn index_for_serial(serial: &str) -> Option<u32> {
    let port: u32 = serial.strip_prefix("emulator-")?.parse().ok()?;
    if port < EMULATOR_BASE_PORT || (port - EMULATOR_BASE_PORT) % 2 != 0 {
        return None;
    }
    Some((port - EMULATOR_BASE_PORT) / 2)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum JobKind {
    Scan,
    FullScan,
    Macro(String),
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Scan => f.write_str("scan"),
            JobKind::FullScan => f.write_str("full_scan"),
            JobKind::Macro(filename) => write!(f, "macro:{filename}"),
        }
    }
}

/// Identity of one registry slot: which device, doing what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    pub serial: String,
    pub kind: JobKind,
}

impl JobKey {
    pub fn new(serial: impl Into<String>, kind: JobKind) -> Self {
        Self {
            serial: serial.into(),
            kind,
        }
    }

    pub fn scan(serial: impl Into<String>) -> Self {
        Self::new(serial, JobKind::Scan)
    }

    pub fn full_scan(index: u32) -> Self {
        Self::new(serial_for_index(index), JobKind::FullScan)
    }

    pub fn replay(index: u32, filename: impl Into<String>) -> Self {
        Self::new(serial_for_index(index), JobKind::Macro(filename.into()))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.serial, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_serial_are_inverse() {
        assert_eq!(serial_for_index(0), "emulator-5554");
        assert_eq!(serial_for_index(3), "emulator-5560");
        assert_eq!(index_for_serial("emulator-5556"), Some(1));
        assert_eq!(index_for_serial("emulator-5555"), None);
        assert_eq!(index_for_serial("127.0.0.1:5555"), None);
    }

    #[test]
    fn keys_render_with_kind_discriminator() {
        assert_eq!(JobKey::scan("emulator-5554").to_string(), "emulator-5554:scan");
        assert_eq!(JobKey::full_scan(2).to_string(), "emulator-5558:full_scan");
        assert_eq!(
            JobKey::replay(1, "farm.record").to_string(),
            "emulator-5556:macro:farm.record"
        );
    }
}
