//! Device-side collaborators: raw input, screen capture and navigation.
//!
//! Runners only see these traits; [`AdbClient`] and [`ScriptedNavigator`] are
//! the production implementations.

pub mod adb;
pub mod navigator;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use adb::AdbClient;
pub use navigator::ScriptedNavigator;

/// Game screens the scan pipelines read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Profile,
    Resources,
    Hall,
    Market,
    PetToken,
}

impl Screen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::Profile => "profile",
            Screen::Resources => "resources",
            Screen::Hall => "hall",
            Screen::Market => "market",
            Screen::PetToken => "pet_token",
        }
    }
}

/// One scripted navigation action. Waits are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavStep {
    Tap {
        x: i32,
        y: i32,
        #[serde(default)]
        wait_ms: u64,
    },
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
        #[serde(default)]
        wait_ms: u64,
    },
    Back {
        #[serde(default)]
        wait_ms: u64,
    },
    Wait {
        ms: u64,
    },
}

/// Raw touch/key input and display queries. All calls block.
pub trait DeviceInput: Send + Sync {
    fn tap(&self, serial: &str, x: i32, y: i32) -> Result<()>;
    fn swipe(&self, serial: &str, from: (i32, i32), to: (i32, i32), duration_ms: u64) -> Result<()>;
    fn back(&self, serial: &str) -> Result<()>;
    /// Live display size in pixels, `(width, height)`.
    fn resolution(&self, serial: &str) -> Result<(u32, u32)>;
}

/// Produces a screenshot artifact (encoded image bytes). `Ok(None)` means the
/// device answered but no frame came back.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self, serial: &str) -> Result<Option<Vec<u8>>>;
}

/// Moves a device to a game screen and back out of it.
pub trait Navigator: Send + Sync {
    fn navigate_to(&self, serial: &str, screen: Screen) -> Result<()>;
    fn go_back(&self, serial: &str, screen: Screen) -> Result<()>;
}
