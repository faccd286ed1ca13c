use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{
    device::Screen,
    error::JobError,
    full_scan::{combine, parse_scan_text, phases},
    ocr::OcrService,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub lord_name: String,
    pub power: u64,
}

/// Resource totals (the stored capacity, not the spendable amount).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub gold: u64,
    pub wood: u64,
    pub ore: u64,
    pub mana: u64,
}

impl Resources {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> {
        [
            ("gold", self.gold),
            ("wood", self.wood),
            ("ore", self.ore),
            ("mana", self.mana),
        ]
        .into_iter()
    }
}

/// Reads structured values out of a decoded screenshot. Calls block.
pub trait Extractor: Send + Sync {
    fn scan_profile(&self, frame: &DynamicImage) -> Result<ProfileData>;
    fn scan_resources(&self, frame: &DynamicImage) -> Result<Resources>;
    /// Level of whichever building screen is shown (hall or market).
    fn scan_building_level(&self, frame: &DynamicImage) -> Result<u32>;
    fn scan_pet_token(&self, frame: &DynamicImage) -> Result<u64>;
}

/// Extractor backed by the OCR service: crop the screen's region, run the same
/// preprocessing as the full-scan artifact, then parse the recognized text.
pub struct OcrExtractor {
    ocr: Arc<dyn OcrService>,
}

impl OcrExtractor {
    pub fn new(ocr: Arc<dyn OcrService>) -> Self {
        Self { ocr }
    }

    fn read(&self, frame: &DynamicImage, screen: Screen) -> Result<String> {
        let crops: Vec<DynamicImage> = phases::regions_for(screen)
            .iter()
            .filter_map(|region| region.crop(frame))
            .collect();
        // Frames smaller than the reference layout are read whole.
        let crops = if crops.is_empty() { vec![frame.clone()] } else { crops };

        let artifact = combine::combine(&crops)
            .ok_or_else(|| JobError::ExtractionFailure("nothing to read".into()))?;
        let png = combine::encode_png(&artifact)?;
        let text = self
            .ocr
            .recognize(&png)
            .with_context(|| format!("OCR of {} region failed", screen.as_str()))?;
        if text.trim().is_empty() {
            return Err(JobError::ExtractionFailure(format!(
                "OCR returned no text for {}",
                screen.as_str()
            ))
            .into());
        }
        Ok(text)
    }
}

impl Extractor for OcrExtractor {
    fn scan_profile(&self, frame: &DynamicImage) -> Result<ProfileData> {
        let parsed = parse_scan_text(&self.read(frame, Screen::Profile)?);
        Ok(ProfileData {
            lord_name: parsed.lord_name,
            power: parsed.power,
        })
    }

    fn scan_resources(&self, frame: &DynamicImage) -> Result<Resources> {
        Ok(parse_scan_text(&self.read(frame, Screen::Resources)?).resources)
    }

    fn scan_building_level(&self, frame: &DynamicImage) -> Result<u32> {
        let parsed = parse_scan_text(&self.read(frame, Screen::Hall)?);
        Ok(parsed.hall_level.max(parsed.market_level))
    }

    fn scan_pet_token(&self, frame: &DynamicImage) -> Result<u64> {
        Ok(parse_scan_text(&self.read(frame, Screen::PetToken)?).pet_token)
    }
}
