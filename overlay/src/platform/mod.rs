//! Host surface abstraction
//!
//! The engine drives a [`Surface`] (the shaped, always-on-top window) and
//! listens to an [`EventSource`] (repaint notifications from the host). The
//! X11 backend is the production implementation; [`headless`] records what
//! would have been shown and is used by tests.

use std::sync::Arc;

use crate::colour::Rgb;
use crate::error::Result;
use crate::geometry::ScreenRect;
use crate::renderer::Frame;

pub mod headless;

#[cfg(all(unix, not(target_os = "macos")))]
pub mod x11;

/// Information about a connected monitor
#[derive(Debug, Clone)]
pub struct MonitorInfo {
    /// Unique identifier for this monitor (platform-specific)
    pub id: String,
    /// Human-readable name/description
    pub name: String,
    /// X position of the monitor in virtual screen space
    pub x: i32,
    /// Y position of the monitor in virtual screen space
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl MonitorInfo {
    pub fn area(&self) -> ScreenRect {
        ScreenRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Find a monitor by ID or name, or fall back to the primary monitor
pub fn find_monitor_by_id<'a>(
    monitors: &'a [MonitorInfo],
    id: Option<&str>,
) -> Option<&'a MonitorInfo> {
    if let Some(id) = id
        && let Some(monitor) = monitors.iter().find(|m| m.id == id || m.name == id)
    {
        return Some(monitor);
    }
    monitors.iter().find(|m| m.is_primary).or(monitors.first())
}

/// Area the surface is laid out on: the chosen monitor, else the whole root
pub fn screen_area(root: ScreenRect, monitors: &[MonitorInfo], wanted: Option<&str>) -> ScreenRect {
    find_monitor_by_id(monitors, wanted)
        .map(MonitorInfo::area)
        .unwrap_or(root)
}

/// Something the host reported about the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Rows `y..y + height` need repainting; `count` more damage events follow
    Damaged { y: u32, height: u32, count: u32 },
    /// The host connection is gone
    Closed,
    /// Anything else, including wake-ups
    Other,
}

/// Blocking source of host events, shared with the event reactor
pub trait EventSource: Send + Sync {
    /// Block until the next event arrives
    fn wait(&self) -> SurfaceEvent;

    /// Make a pending or future `wait` return promptly
    fn wake(&self);
}

/// The overlay window as seen by the engine
///
/// Calls are serialized by the engine's state lock.
pub trait Surface: Send {
    /// Area of the whole root screen
    fn root_area(&self) -> ScreenRect;

    fn monitors(&self) -> Vec<MonitorInfo>;

    /// Resize the window and its backing storage
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;

    fn map(&mut self) -> Result<()>;

    fn unmap(&mut self) -> Result<()>;

    /// Copy rows `y..y + height` of the frame to the window and apply the
    /// frame's mask as the window shape
    fn present(&mut self, frame: &Frame, y: u32, height: u32) -> Result<()>;

    /// Resolve a colour name with the host's colour database
    fn lookup_colour(&mut self, name: &str) -> Option<Rgb>;

    /// Let pointer events pass through the visible pixels too
    fn set_click_through(&mut self, enabled: bool) -> Result<()>;

    fn events(&self) -> Arc<dyn EventSource>;
}

/// Open the platform's native surface
#[cfg(all(unix, not(target_os = "macos")))]
pub fn open_native(title: &str) -> Result<Box<dyn Surface>> {
    Ok(Box::new(x11::X11Surface::connect(title)?))
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
pub fn open_native(_title: &str) -> Result<Box<dyn Surface>> {
    Err(crate::error::OsdError::NoDisplay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(id: &str, x: i32, primary: bool) -> MonitorInfo {
        MonitorInfo {
            id: id.to_string(),
            name: format!("{id} name"),
            x,
            y: 0,
            width: 1920,
            height: 1080,
            is_primary: primary,
        }
    }

    const ROOT: ScreenRect = ScreenRect {
        x: 0,
        y: 0,
        width: 3840,
        height: 1080,
    };

    #[test]
    fn test_monitor_selection_order() {
        let monitors = vec![monitor("DP-1", 0, false), monitor("HDMI-1", 1920, true)];

        assert_eq!(screen_area(ROOT, &monitors, Some("DP-1")).x, 0);
        assert_eq!(screen_area(ROOT, &monitors, Some("DP-1 name")).x, 0);
        // Unknown name falls back to primary
        assert_eq!(screen_area(ROOT, &monitors, Some("VGA-9")).x, 1920);
        assert_eq!(screen_area(ROOT, &monitors, None).x, 1920);
    }

    #[test]
    fn test_first_monitor_without_primary() {
        let monitors = vec![monitor("A", 100, false), monitor("B", 2020, false)];
        assert_eq!(screen_area(ROOT, &monitors, None).x, 100);
    }

    #[test]
    fn test_root_without_monitor_info() {
        assert_eq!(screen_area(ROOT, &[], Some("DP-1")), ROOT);
    }
}
