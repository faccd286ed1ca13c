use std::collections::HashMap;

use image::{DynamicImage, GenericImageView};

use crate::device::Screen;

/// Rectangle in reference-layout pixels (960x540), right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub name: &'static str,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRegion {
    pub const fn new(name: &'static str, left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            name,
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width() > 0 && self.height() > 0 && self.right <= width && self.bottom <= height
    }

    /// `None` when the region does not lie inside the frame.
    pub fn crop(&self, frame: &DynamicImage) -> Option<DynamicImage> {
        let (width, height) = frame.dimensions();
        if !self.fits(width, height) {
            return None;
        }
        Some(frame.crop_imm(self.left, self.top, self.width(), self.height()))
    }
}

/// One stop of the full-scan tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub screen: Screen,
    /// Back presses that leave the screen again.
    pub exit_backs: u32,
}

/// Capture order.
pub const PHASES: [Phase; 5] = [
    Phase { screen: Screen::Profile, exit_backs: 2 },
    Phase { screen: Screen::Resources, exit_backs: 2 },
    Phase { screen: Screen::Hall, exit_backs: 1 },
    Phase { screen: Screen::Market, exit_backs: 1 },
    Phase { screen: Screen::PetToken, exit_backs: 1 },
];

/// Order of the crops inside the combined artifact. The text parser relies on
/// resources coming first and the pet token last.
pub const COMBINE_ORDER: [Screen; 5] = [
    Screen::Resources,
    Screen::Profile,
    Screen::Hall,
    Screen::Market,
    Screen::PetToken,
];

const PROFILE_REGIONS: &[CropRegion] = &[CropRegion::new("profile_area", 100, 320, 275, 500)];
const RESOURCES_REGIONS: &[CropRegion] = &[CropRegion::new("resources_area", 300, 150, 725, 400)];
const HALL_REGIONS: &[CropRegion] = &[CropRegion::new("hall_area", 500, 200, 750, 275)];
const MARKET_REGIONS: &[CropRegion] = &[CropRegion::new("market_area", 500, 200, 750, 275)];
const PET_TOKEN_REGIONS: &[CropRegion] = &[CropRegion::new("pet_token_area", 875, 0, 950, 30)];

pub fn regions_for(screen: Screen) -> &'static [CropRegion] {
    match screen {
        Screen::Profile => PROFILE_REGIONS,
        Screen::Resources => RESOURCES_REGIONS,
        Screen::Hall => HALL_REGIONS,
        Screen::Market => MARKET_REGIONS,
        Screen::PetToken => PET_TOKEN_REGIONS,
    }
}

/// Per-screen back presses, as used by the navigator's reverse navigation.
pub fn default_exit_backs() -> HashMap<Screen, u32> {
    PHASES.iter().map(|p| (p.screen, p.exit_backs)).collect()
}
