use std::{fmt, str::FromStr};

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::{
    extract::{Extractor, ProfileData, Resources},
    validate::{
        validate_building_level, validate_pet_token, validate_profile, validate_resources,
        Validation,
    },
};
use crate::{device::Screen, error::JobError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Profile,
    Resources,
    Building,
    Market,
    Pet,
    /// Every extractor against whatever is on screen now; no navigation.
    Full,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Profile => "profile",
            TaskKind::Resources => "resources",
            TaskKind::Building => "building",
            TaskKind::Market => "market",
            TaskKind::Pet => "pet",
            TaskKind::Full => "full",
        }
    }

    /// Screen to navigate to before capturing.
    pub fn screen(&self) -> Option<Screen> {
        match self {
            TaskKind::Profile => Some(Screen::Profile),
            TaskKind::Resources => Some(Screen::Resources),
            TaskKind::Building => Some(Screen::Hall),
            TaskKind::Market => Some(Screen::Market),
            TaskKind::Pet => Some(Screen::PetToken),
            TaskKind::Full => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profile" => Ok(TaskKind::Profile),
            "resources" => Ok(TaskKind::Resources),
            "building" | "hall" => Ok(TaskKind::Building),
            "market" => Ok(TaskKind::Market),
            "pet" | "pet_token" => Ok(TaskKind::Pet),
            "full" | "full_scan" => Ok(TaskKind::Full),
            _ => Err(JobError::UnknownTaskKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanData {
    Profile(ProfileData),
    Resources(Resources),
    Building { level: u32 },
    Market { level: u32 },
    PetToken { count: u64 },
    Full {
        profile: ProfileData,
        resources: Resources,
        building_level: u32,
        pet_token: u64,
    },
}

/// Extracted data plus its paired validation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub data: ScanData,
    pub validation: Validation,
}

type Handler = fn(&dyn Extractor, &DynamicImage) -> Result<ScanResult>;

/// Extractor/validator pair for each task kind.
pub fn handler_for(kind: TaskKind) -> Handler {
    match kind {
        TaskKind::Profile => scan_profile,
        TaskKind::Resources => scan_resources,
        TaskKind::Building => scan_building,
        TaskKind::Market => scan_market,
        TaskKind::Pet => scan_pet,
        TaskKind::Full => scan_full,
    }
}

fn scan_profile(ex: &dyn Extractor, frame: &DynamicImage) -> Result<ScanResult> {
    let profile = ex.scan_profile(frame)?;
    Ok(ScanResult {
        validation: validate_profile(&profile),
        data: ScanData::Profile(profile),
    })
}

fn scan_resources(ex: &dyn Extractor, frame: &DynamicImage) -> Result<ScanResult> {
    let resources = ex.scan_resources(frame)?;
    Ok(ScanResult {
        validation: validate_resources(&resources),
        data: ScanData::Resources(resources),
    })
}

fn scan_building(ex: &dyn Extractor, frame: &DynamicImage) -> Result<ScanResult> {
    let level = ex.scan_building_level(frame)?;
    Ok(ScanResult {
        validation: validate_building_level(level),
        data: ScanData::Building { level },
    })
}

fn scan_market(ex: &dyn Extractor, frame: &DynamicImage) -> Result<ScanResult> {
    let level = ex.scan_building_level(frame)?;
    Ok(ScanResult {
        validation: validate_building_level(level),
        data: ScanData::Market { level },
    })
}

fn scan_pet(ex: &dyn Extractor, frame: &DynamicImage) -> Result<ScanResult> {
    let count = ex.scan_pet_token(frame)?;
    Ok(ScanResult {
        validation: validate_pet_token(count),
        data: ScanData::PetToken { count },
    })
}

fn scan_full(ex: &dyn Extractor, frame: &DynamicImage) -> Result<ScanResult> {
    let profile = ex.scan_profile(frame)?;
    let resources = ex.scan_resources(frame)?;
    let building_level = ex.scan_building_level(frame)?;
    let pet_token = ex.scan_pet_token(frame)?;

    let validation = Validation::combine([
        validate_profile(&profile),
        validate_resources(&resources),
        validate_building_level(building_level),
        validate_pet_token(pet_token),
    ]);
    Ok(ScanResult {
        data: ScanData::Full {
            profile,
            resources,
            building_level,
            pet_token,
        },
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Fixed;

    impl Extractor for Fixed {
        fn scan_profile(&self, _frame: &DynamicImage) -> Result<ProfileData> {
            Ok(ProfileData { lord_name: "Goten".into(), power: 0 })
        }
        fn scan_resources(&self, _frame: &DynamicImage) -> Result<Resources> {
            Ok(Resources { gold: 1, wood: 2, ore: 3, mana: 4 })
        }
        fn scan_building_level(&self, _frame: &DynamicImage) -> Result<u32> {
            Ok(23)
        }
        fn scan_pet_token(&self, _frame: &DynamicImage) -> Result<u64> {
            Ok(13_572)
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
    }

    #[test]
    fn parses_aliases_and_rejects_unknown_kinds() {
        assert_eq!("hall".parse::<TaskKind>().unwrap(), TaskKind::Building);
        assert_eq!(" Resources ".parse::<TaskKind>().unwrap(), TaskKind::Resources);
        assert_eq!("pet_token".parse::<TaskKind>().unwrap(), TaskKind::Pet);
        assert_eq!(
            "teleport".parse::<TaskKind>().unwrap_err(),
            JobError::UnknownTaskKind("teleport".into())
        );
    }

    #[test]
    fn only_full_skips_navigation() {
        assert_eq!(TaskKind::Full.screen(), None);
        assert_eq!(TaskKind::Market.screen(), Some(Screen::Market));
        assert_eq!(TaskKind::Building.screen(), Some(Screen::Hall));
    }

    #[test]
    fn market_uses_the_building_extractor() {
        let result = handler_for(TaskKind::Market)(&Fixed, &blank()).unwrap();
        assert_eq!(result.data, ScanData::Market { level: 23 });
        assert!(result.validation.is_valid);
    }

    #[test]
    fn full_scan_is_as_valid_as_its_weakest_field() {
        let result = handler_for(TaskKind::Full)(&Fixed, &blank()).unwrap();
        let ScanData::Full { building_level, pet_token, .. } = result.data else {
            panic!("expected full data");
        };
        assert_eq!((building_level, pet_token), (23, 13_572));
        assert!(!result.validation.is_valid);
        assert!(result.validation.is_reliable);
        assert_eq!(result.validation.errors, vec!["power missing"]);
    }
}
