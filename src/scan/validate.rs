use serde::{Deserialize, Serialize};

use super::extract::{ProfileData, Resources};

/// Highest building level the game has; anything above is a misread.
pub const MAX_BUILDING_LEVEL: u32 = 40;
const MAX_POWER: u64 = 50_000_000_000;
const MAX_RESOURCE: u64 = 1_000_000_000_000;
const MAX_PET_TOKEN: u64 = 10_000_000;
const MAX_LORD_NAME_CHARS: usize = 32;

/// Verdict on an extracted value.
///
/// `is_valid == false` means a required field is missing outright;
/// `is_reliable == false` means the value is present but implausible. Neither
/// fails the scan; both travel with the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    pub is_reliable: bool,
    pub errors: Vec<String>,
}

impl Default for Validation {
    fn default() -> Self {
        Self::ok()
    }
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            is_reliable: true,
            errors: Vec::new(),
        }
    }

    fn invalid(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(error.into());
    }

    fn doubtful(&mut self, error: impl Into<String>) {
        self.is_reliable = false;
        self.errors.push(error.into());
    }

    /// Logical AND of the flags, errors concatenated in order.
    pub fn and(mut self, other: Validation) -> Self {
        self.is_valid &= other.is_valid;
        self.is_reliable &= other.is_reliable;
        self.errors.extend(other.errors);
        self
    }

    pub fn combine(parts: impl IntoIterator<Item = Validation>) -> Self {
        parts.into_iter().fold(Self::ok(), Self::and)
    }
}

pub fn validate_profile(profile: &ProfileData) -> Validation {
    let mut v = Validation::ok();
    let name = profile.lord_name.trim();
    if name.is_empty() {
        v.invalid("lord name missing");
    } else if name.chars().count() > MAX_LORD_NAME_CHARS {
        v.doubtful(format!("lord name suspiciously long ({} chars)", name.chars().count()));
    }
    if profile.power == 0 {
        v.invalid("power missing");
    } else if profile.power > MAX_POWER {
        v.doubtful(format!("power {} out of range", profile.power));
    }
    v
}

pub fn validate_resources(resources: &Resources) -> Validation {
    let mut v = Validation::ok();
    if resources.iter().all(|(_, amount)| amount == 0) {
        v.invalid("no resource values read");
        return v;
    }
    for (name, amount) in resources.iter() {
        if amount == 0 {
            v.doubtful(format!("{name} reads as zero"));
        } else if amount > MAX_RESOURCE {
            v.doubtful(format!("{name} {amount} out of range"));
        }
    }
    v
}

pub fn validate_building_level(level: u32) -> Validation {
    let mut v = Validation::ok();
    if level == 0 {
        v.invalid("building level missing");
    } else if level > MAX_BUILDING_LEVEL {
        v.doubtful(format!("building level {level} above {MAX_BUILDING_LEVEL}"));
    }
    v
}

pub fn validate_pet_token(count: u64) -> Validation {
    let mut v = Validation::ok();
    if count > MAX_PET_TOKEN {
        v.doubtful(format!("pet token count {count} out of range"));
    }
    v
}
