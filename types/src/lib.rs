//! Shared configuration types for the on-screen display
//!
//! This crate contains serializable configuration types that are shared between
//! the display engine (osd-overlay) and host applications that embed it in
//! their own settings files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─────────────────────────────────────────────────────────────────────────────
// Placement
// ─────────────────────────────────────────────────────────────────────────────

/// Vertical anchor of the display on its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Top edge, pushed down by the vertical offset
    #[default]
    Top,
    /// Vertically centred, pushed up by the vertical offset
    Middle,
    /// Bottom edge, pushed up by the vertical offset
    Bottom,
}

/// Horizontal placement of each line within the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    #[serde(alias = "centre")]
    Center,
    Right,
}

/// Error returned when a placement name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlacement {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownPlacement {}

impl FromStr for Position {
    type Err = UnknownPlacement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Position::Top),
            "middle" => Ok(Position::Middle),
            "bottom" => Ok(Position::Bottom),
            _ => Err(UnknownPlacement {
                kind: "position",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Alignment {
    type Err = UnknownPlacement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" | "centre" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            _ => Err(UnknownPlacement {
                kind: "alignment",
                value: s.to_string(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serde Default Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn default_lines() -> usize {
    5
}
fn default_colour() -> String {
    "red".to_string()
}
fn default_shadow_colour() -> String {
    "black".to_string()
}
fn default_timeout_secs() -> i32 {
    5
}

// ─────────────────────────────────────────────────────────────────────────────
// Display Config
// ─────────────────────────────────────────────────────────────────────────────

/// Complete configuration of one on-screen display.
///
/// Applied once at construction; every field can also be changed afterwards
/// through the matching setter on the display itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsdConfig {
    /// Number of rows; fixed for the lifetime of the display
    #[serde(default = "default_lines")]
    pub lines: usize,
    /// Font descriptor (XLFD or "Family Size"); `None` uses the platform default
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default = "default_colour")]
    pub colour: String,
    #[serde(default = "default_shadow_colour")]
    pub shadow_colour: String,
    #[serde(default = "default_shadow_colour")]
    pub outline_colour: String,
    /// Seconds before the display hides itself; `-1` never hides
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i32,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub vertical_offset: i32,
    #[serde(default)]
    pub horizontal_offset: i32,
    /// Shadow distance in pixels; 0 disables the shadow
    #[serde(default)]
    pub shadow_offset: u32,
    /// Outline thickness in pixels; 0 disables the outline
    #[serde(default)]
    pub outline_offset: u32,
    /// Fixed number of bar segments; `None` spans 80% of the width
    #[serde(default)]
    pub bar_length: Option<u32>,
    /// Monitor name to display on; `None` picks the primary monitor
    #[serde(default)]
    pub monitor: Option<String>,
    /// Let pointer events pass through the drawn pixels as well
    #[serde(default)]
    pub click_through: bool,
}

impl Default for OsdConfig {
    fn default() -> Self {
        Self {
            lines: default_lines(),
            font: None,
            colour: default_colour(),
            shadow_colour: default_shadow_colour(),
            outline_colour: default_shadow_colour(),
            timeout_secs: default_timeout_secs(),
            position: Position::default(),
            alignment: Alignment::default(),
            vertical_offset: 0,
            horizontal_offset: 0,
            shadow_offset: 0,
            outline_offset: 0,
            bar_length: None,
            monitor: None,
            click_through: false,
        }
    }
}
