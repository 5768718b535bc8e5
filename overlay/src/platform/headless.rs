//! Display-less backend
//!
//! [`HeadlessSurface`] keeps the window state in memory and shares it with a
//! [`HeadlessHandle`] so callers can inspect what would be on screen and
//! inject repaint requests. [`BoxShaper`] draws every glyph as a solid box
//! with fixed metrics.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::colour::{self, Rgb};
use crate::error::{OsdError, Result};
use crate::font::{FamilyName, FontDescriptor, FontMetrics, TextShaper};
use crate::geometry::ScreenRect;
use crate::mask::MaskRect;
use crate::platform::{EventSource, MonitorInfo, Surface, SurfaceEvent};
use crate::renderer::Frame;

/// Recorded window state
#[derive(Debug, Clone, Default)]
pub struct HeadlessState {
    pub mapped: bool,
    pub map_count: usize,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub click_through: bool,
    /// Refuse every resize with a host error
    pub refuse_resize: bool,
    /// Bounding shape from the last present
    pub shape: Vec<MaskRect>,
    /// `(y, height)` of every present, oldest first
    pub presents: Vec<(u32, u32)>,
}

fn lock(state: &Mutex<HeadlessState>) -> MutexGuard<'_, HeadlessState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory surface
pub struct HeadlessSurface {
    root: ScreenRect,
    monitors: Vec<MonitorInfo>,
    state: Arc<Mutex<HeadlessState>>,
    events: Arc<HeadlessEvents>,
}

/// Inspection and event-injection side of a [`HeadlessSurface`]
#[derive(Clone)]
pub struct HeadlessHandle {
    state: Arc<Mutex<HeadlessState>>,
    events: Arc<HeadlessEvents>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> (Self, HeadlessHandle) {
        Self::with_monitors(width, height, Vec::new())
    }

    pub fn with_monitors(
        width: u32,
        height: u32,
        monitors: Vec<MonitorInfo>,
    ) -> (Self, HeadlessHandle) {
        let state = Arc::new(Mutex::new(HeadlessState::default()));
        let (tx, rx) = mpsc::channel();
        let events = Arc::new(HeadlessEvents {
            tx,
            rx: Mutex::new(rx),
        });
        let surface = Self {
            root: ScreenRect {
                x: 0,
                y: 0,
                width,
                height,
            },
            monitors,
            state: state.clone(),
            events: events.clone(),
        };
        (surface, HeadlessHandle { state, events })
    }
}

impl Surface for HeadlessSurface {
    fn root_area(&self) -> ScreenRect {
        self.root
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        self.monitors.clone()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let mut state = lock(&self.state);
        if state.refuse_resize {
            return Err(OsdError::Host(format!("resize to {width}x{height} refused")));
        }
        state.width = width;
        state.height = height;
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        let mut state = lock(&self.state);
        state.x = x;
        state.y = y;
        Ok(())
    }

    fn map(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.mapped {
            state.mapped = true;
            state.map_count += 1;
        }
        Ok(())
    }

    fn unmap(&mut self) -> Result<()> {
        lock(&self.state).mapped = false;
        Ok(())
    }

    fn present(&mut self, frame: &Frame, y: u32, height: u32) -> Result<()> {
        let mut state = lock(&self.state);
        if frame.width() != state.width || frame.height() != state.height {
            return Err(OsdError::Host(format!(
                "frame {}x{} does not match surface {}x{}",
                frame.width(),
                frame.height(),
                state.width,
                state.height
            )));
        }
        state.shape = frame.mask().rects();
        state.presents.push((y, height));
        Ok(())
    }

    fn lookup_colour(&mut self, name: &str) -> Option<Rgb> {
        colour::builtin(name)
    }

    fn set_click_through(&mut self, enabled: bool) -> Result<()> {
        lock(&self.state).click_through = enabled;
        Ok(())
    }

    fn events(&self) -> Arc<dyn EventSource> {
        self.events.clone()
    }
}

impl HeadlessHandle {
    /// Snapshot of the recorded state
    pub fn state(&self) -> HeadlessState {
        lock(&self.state).clone()
    }

    pub fn is_mapped(&self) -> bool {
        lock(&self.state).mapped
    }

    pub fn clear_presents(&self) {
        lock(&self.state).presents.clear();
    }

    /// Make later resizes fail as a lost host connection would
    pub fn refuse_resize(&self, refuse: bool) {
        lock(&self.state).refuse_resize = refuse;
    }

    /// Queue a repaint request as the host would after an expose
    pub fn damage(&self, y: u32, height: u32, count: u32) {
        self.events.push(SurfaceEvent::Damaged { y, height, count });
    }

    /// Simulate the host connection going away
    pub fn close(&self) {
        self.events.push(SurfaceEvent::Closed);
    }
}

/// Channel-backed event queue
pub struct HeadlessEvents {
    tx: Sender<SurfaceEvent>,
    rx: Mutex<Receiver<SurfaceEvent>>,
}

impl HeadlessEvents {
    fn push(&self, event: SurfaceEvent) {
        // The receiver lives in this struct, so sending cannot fail
        let _ = self.tx.send(event);
    }
}

impl EventSource for HeadlessEvents {
    fn wait(&self) -> SurfaceEvent {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        rx.recv().unwrap_or(SurfaceEvent::Closed)
    }

    fn wake(&self) {
        self.push(SurfaceEvent::Other);
    }
}

/// Shaper that renders every visible character as a solid box
///
/// The ascent equals the pixel size, a quarter of it is added below the
/// baseline, and each character advances by six tenths of it. The box is one pixel
/// narrower than the advance and sits directly on the baseline.
#[derive(Debug, Clone)]
pub struct BoxShaper {
    families: Vec<String>,
    size: u32,
    metrics: FontMetrics,
}

impl Default for BoxShaper {
    fn default() -> Self {
        Self::new(["Box"])
    }
}

impl BoxShaper {
    /// Shaper that knows the generic families plus `families`
    pub fn new<I, S>(families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            families: families.into_iter().map(Into::into).collect(),
            size: 0,
            metrics: FontMetrics::default(),
        }
    }

    fn advance(&self) -> u32 {
        (self.size * 6 / 10).max(1)
    }
}

impl TextShaper for BoxShaper {
    fn load(&mut self, font: &FontDescriptor) -> Result<FontMetrics> {
        if let FamilyName::Named(name) = &font.family
            && !self.families.iter().any(|f| f.eq_ignore_ascii_case(name))
        {
            return Err(OsdError::FontNotFound {
                name: font.name.clone(),
            });
        }
        let size = font.pixel_size.round().max(1.0) as u32;
        self.size = size;
        self.metrics = FontMetrics {
            line_height: size.saturating_add(size.div_ceil(4)),
            ascent: size,
        };
        Ok(self.metrics)
    }

    fn measure(&mut self, text: &str) -> u32 {
        text.chars().count() as u32 * self.advance()
    }

    fn draw(&mut self, text: &str, x: i32, baseline: i32, plot: &mut dyn FnMut(i32, i32, u8)) {
        let advance = self.advance() as i32;
        let ascent = self.metrics.ascent as i32;
        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let left = x + i as i32 * advance;
            for py in baseline - ascent..baseline {
                for px in left..left + advance - 1 {
                    plot(px, py, 255);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_shaper_metrics() {
        let mut shaper = BoxShaper::default();
        let metrics = shaper.load(&"Box 10".parse().unwrap()).unwrap();
        assert_eq!(metrics.ascent, 10);
        assert_eq!(metrics.line_height, 13);
        assert_eq!(shaper.measure("abc"), 18);
    }

    #[test]
    fn test_box_shaper_failed_load_keeps_font() {
        let mut shaper = BoxShaper::default();
        shaper.load(&"Box 10".parse().unwrap()).unwrap();
        let err = shaper.load(&"Nonexistent 30".parse().unwrap()).unwrap_err();
        assert!(matches!(err, OsdError::FontNotFound { .. }));
        assert_eq!(shaper.measure("a"), 6);
        let mut rows = std::collections::BTreeSet::new();
        shaper.draw("a", 0, 50, &mut |_, y, _| {
            rows.insert(y);
        });
        assert_eq!(rows.len(), 10);

        // Generic families always resolve
        assert!(shaper.load(&"monospace 12".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_events_are_delivered_in_order() {
        let (surface, handle) = HeadlessSurface::new(100, 100);
        let events = surface.events();
        handle.damage(0, 10, 1);
        events.wake();
        handle.close();
        assert_eq!(
            events.wait(),
            SurfaceEvent::Damaged {
                y: 0,
                height: 10,
                count: 1
            }
        );
        assert_eq!(events.wait(), SurfaceEvent::Other);
        assert_eq!(events.wait(), SurfaceEvent::Closed);
    }

    #[test]
    fn test_map_is_recorded_once() {
        let (mut surface, handle) = HeadlessSurface::new(100, 100);
        surface.map().unwrap();
        surface.map().unwrap();
        surface.unmap().unwrap();
        let state = handle.state();
        assert!(!state.mapped);
        assert_eq!(state.map_count, 1);
    }
}
