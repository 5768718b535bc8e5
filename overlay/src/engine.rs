//! The display engine
//!
//! [`Osd`] owns the line buffer, the font, the style and the host surface
//! behind one lock, and runs two background reactors:
//!
//! - the event reactor (`osd-events`) repaints rows the host reports as damaged
//! - the timeout reactor (`osd-timeout`) hides the display when its deadline passes
//!
//! Every public operation takes the lock for its whole duration, so a
//! caller-triggered redraw and a host-triggered repaint never interleave
//! inside one row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use osd_types::{Alignment, OsdConfig, Position};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::colour::{self, Rgb};
use crate::error::{OsdError, Result};
use crate::font::{CosmicShaper, DEFAULT_FONT, FontDescriptor, FontMetrics, TextShaper};
use crate::geometry::{Layout, ScreenRect};
use crate::line::{Content, Line, LineBuffer};
use crate::platform::{self, EventSource, Surface, screen_area};
use crate::reactor;
use crate::renderer::{self, Frame, Palette};

/// Title given to the host window
pub const SURFACE_TITLE: &str = "osd";

/// Which decoration a colour setter targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColourSlot {
    Primary,
    Shadow,
    Outline,
}

impl ColourSlot {
    fn fallback(self) -> Rgb {
        match self {
            ColourSlot::Primary => Rgb::WHITE,
            ColourSlot::Shadow | ColourSlot::Outline => Rgb::BLACK,
        }
    }
}

/// A validated surface size; the host has already been resized to it
struct Prepared {
    screen: ScreenRect,
    /// Replacement frame when the size changed
    frame: Option<Frame>,
}

/// Everything guarded by the engine lock
pub(crate) struct EngineState {
    lines: LineBuffer,
    surface: Box<dyn Surface>,
    shaper: Box<dyn TextShaper>,
    font: FontDescriptor,
    metrics: FontMetrics,
    layout: Layout,
    palette: Palette,
    frame: Frame,
    screen: ScreenRect,
    monitor: Option<String>,
    pub(crate) visible: bool,
    timeout_secs: i32,
    pub(crate) deadline: Option<Instant>,
    pub(crate) shutting_down: bool,
}

impl EngineState {
    fn line_height(&self) -> u32 {
        self.layout.line_height(&self.metrics)
    }

    fn redraw_line(&mut self, index: usize) -> Result<()> {
        let line = self.lines.get(index)?.clone();
        renderer::render_line(
            &mut self.frame,
            self.shaper.as_mut(),
            &self.layout,
            &self.metrics,
            &self.palette,
            index,
            &line,
        );
        let top = self.layout.row_top(&self.metrics, index).max(0) as u32;
        self.surface.present(&self.frame, top, self.line_height())
    }

    fn redraw_all(&mut self) -> Result<()> {
        renderer::render_all(
            &mut self.frame,
            self.shaper.as_mut(),
            &self.layout,
            &self.metrics,
            &self.palette,
            self.lines.iter(),
        );
        self.surface.present(&self.frame, 0, self.frame.height())
    }

    /// Re-render the rows overlapping `y..y + height` and push them out
    pub(crate) fn repaint(&mut self, y: u32, height: u32) -> Result<()> {
        let line_height = self.line_height();
        let end = y.saturating_add(height);
        let mut span: Option<(u32, u32)> = None;
        for index in 0..self.lines.len() {
            let top = line_height * index as u32;
            let bottom = top + line_height;
            if y >= bottom || end <= top {
                continue;
            }
            let line = self.lines.get(index)?.clone();
            renderer::render_line(
                &mut self.frame,
                self.shaper.as_mut(),
                &self.layout,
                &self.metrics,
                &self.palette,
                index,
                &line,
            );
            span = Some(match span {
                Some((start, _)) => (start, bottom),
                None => (top, bottom),
            });
        }
        match span {
            Some((start, stop)) => self.surface.present(&self.frame, start, stop - start),
            None => Ok(()),
        }
    }

    /// Move the surface for `layout` and adopt it once the host accepted the move
    fn place(&mut self, layout: Layout) -> Result<()> {
        let (x, y) = layout.surface_origin(self.screen, self.frame.height());
        self.surface.move_to(x, y)?;
        self.layout = layout;
        Ok(())
    }

    fn reposition(&mut self) -> Result<()> {
        self.place(self.layout)
    }

    /// Size the host surface for `layout` and `metrics`
    ///
    /// Engine state is left untouched; on error the host keeps its old size.
    fn prepare(
        &mut self,
        layout: &Layout,
        metrics: &FontMetrics,
        monitor: Option<&str>,
    ) -> Result<Prepared> {
        let monitors = self.surface.monitors();
        let screen = screen_area(self.surface.root_area(), &monitors, monitor);

        let lines = self.lines.len();
        let (width, height) = layout
            .surface_size(metrics, screen, lines)
            .ok_or(OsdError::SurfaceTooLarge { lines })?;
        let frame = if width != self.frame.width() || height != self.frame.height() {
            let frame = Frame::new(width, height)?;
            self.surface.resize(width, height)?;
            Some(frame)
        } else {
            None
        };
        Ok(Prepared { screen, frame })
    }

    /// Install a prepared surface, then reposition and redraw
    fn commit(&mut self, prepared: Prepared) -> Result<()> {
        self.screen = prepared.screen;
        if let Some(frame) = prepared.frame {
            self.frame = frame;
        }
        tracing::debug!(
            width = self.frame.width(),
            height = self.frame.height(),
            line_height = self.line_height(),
            screen = ?self.screen,
            "Recomputed geometry"
        );
        self.reposition()?;
        self.redraw_all()
    }

    /// Switch to a new layout and monitor, or keep both if the surface cannot follow
    fn relayout(&mut self, layout: Layout, monitor: Option<String>) -> Result<()> {
        let metrics = self.metrics;
        let prepared = self.prepare(&layout, &metrics, monitor.as_deref())?;
        self.layout = layout;
        self.monitor = monitor;
        self.commit(prepared)
    }

    fn show(&mut self, on_screen: &AtomicBool) -> Result<()> {
        if self.visible {
            return Ok(());
        }
        self.surface.map()?;
        self.visible = true;
        on_screen.store(true, Ordering::Release);
        // Unmapped windows keep no contents; push the whole frame again
        self.surface.present(&self.frame, 0, self.frame.height())
    }

    fn restart_deadline(&mut self) {
        self.deadline = (self.timeout_secs > 0 && self.visible)
            .then(|| Instant::now() + Duration::from_secs(self.timeout_secs as u64));
    }

    fn resolve_colour(&mut self, name: &str) -> Option<Rgb> {
        colour::parse_numeric(name).or_else(|| self.surface.lookup_colour(name))
    }
}

/// State shared between the API handle and both reactors
pub(crate) struct Shared {
    state: Mutex<EngineState>,
    /// Signalled whenever the display becomes hidden or shuts down
    hidden: Condvar,
    /// Signalled whenever the deadline may have moved
    pub(crate) timeout_changed: Notify,
    /// Mirror of `visible` readable without the lock
    on_screen: AtomicBool,
}

impl Shared {
    pub(crate) fn new(
        line_count: usize,
        mut surface: Box<dyn Surface>,
        mut shaper: Box<dyn TextShaper>,
        font: Option<&str>,
    ) -> Result<Self> {
        if line_count == 0 {
            return Err(OsdError::InvalidLine {
                index: 0,
                line_count,
            });
        }

        let font: FontDescriptor = font.unwrap_or(DEFAULT_FONT).parse()?;
        let metrics = shaper.load(&font)?;

        let layout = Layout::default();
        let monitors = surface.monitors();
        let screen = screen_area(surface.root_area(), &monitors, None);
        let (width, height) = layout
            .surface_size(&metrics, screen, line_count)
            .ok_or(OsdError::SurfaceTooLarge { lines: line_count })?;
        surface.resize(width, height)?;
        let frame = Frame::new(width, height)?;

        let mut state = EngineState {
            lines: LineBuffer::new(line_count),
            surface,
            shaper,
            font,
            metrics,
            layout,
            palette: Palette::default(),
            frame,
            screen,
            monitor: None,
            visible: false,
            timeout_secs: -1,
            deadline: None,
            shutting_down: false,
        };
        state.reposition()?;

        tracing::info!(
            lines = line_count,
            width,
            height,
            font = %state.font,
            "Created display"
        );

        Ok(Self {
            state: Mutex::new(state),
            hidden: Condvar::new(),
            timeout_changed: Notify::new(),
            on_screen: AtomicBool::new(false),
        })
    }

    /// Take the state lock; a panic while holding it leaves the state usable
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn hide_locked(&self, state: &mut EngineState) -> Result<()> {
        state.deadline = None;
        let result = if state.visible {
            state.visible = false;
            self.on_screen.store(false, Ordering::Release);
            state.surface.unmap()
        } else {
            Ok(())
        };
        self.hidden.notify_all();
        self.timeout_changed.notify_one();
        result
    }

    /// Hide if the deadline has passed; called by the timeout reactor
    pub(crate) fn hide_if_expired(&self) {
        let mut state = self.lock();
        let expired = state.visible && state.deadline.is_some_and(|d| d <= Instant::now());
        if expired {
            tracing::debug!("Display timeout expired");
            if let Err(e) = self.hide_locked(&mut state) {
                tracing::warn!(error = %e, "Failed to hide display after timeout");
            }
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Flag shutdown and wake every waiter and the timeout reactor
    pub(crate) fn begin_shutdown(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        self.hidden.notify_all();
        self.timeout_changed.notify_one();
    }

    pub(crate) fn display(&self, index: usize, content: Content) -> Result<usize> {
        let mut state = self.lock();
        let width = match &content {
            Content::Text(text) => state.shaper.measure(text),
            _ => 0,
        };
        let result = state.lines.set(index, content, width)?;
        state.redraw_line(index)?;
        state.show(&self.on_screen)?;
        state.restart_deadline();
        self.timeout_changed.notify_one();
        Ok(result)
    }

    pub(crate) fn scroll(&self, n: usize) -> Result<()> {
        let mut state = self.lock();
        state.lines.scroll(n)?;
        state.redraw_all()
    }

    pub(crate) fn show(&self) -> Result<()> {
        self.lock().show(&self.on_screen)
    }

    pub(crate) fn hide(&self) -> Result<()> {
        let mut state = self.lock();
        self.hide_locked(&mut state)
    }

    pub(crate) fn is_on_screen(&self) -> bool {
        self.on_screen.load(Ordering::Acquire)
    }

    pub(crate) fn wait_until_hidden(&self) -> Result<()> {
        let mut state = self.lock();
        while state.visible && !state.shutting_down {
            state = self.hidden.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        Ok(())
    }

    pub(crate) fn set_font(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        let font: FontDescriptor = name.parse()?;
        let metrics = match state.shaper.load(&font) {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(font = name, error = %e, "Keeping previous font");
                return Err(e);
            }
        };
        let layout = state.layout;
        let monitor = state.monitor.clone();
        let prepared = match state.prepare(&layout, &metrics, monitor.as_deref()) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(font = name, error = %e, "Font does not fit, keeping previous font");
                let previous = state.font.clone();
                if let Err(reload) = state.shaper.load(&previous) {
                    tracing::warn!(font = %previous, error = %reload, "Failed to reload previous font");
                }
                return Err(e);
            }
        };

        tracing::debug!(font = name, ?metrics, "Font changed");
        state.font = font;
        state.metrics = metrics;
        let EngineState { lines, shaper, .. } = &mut *state;
        lines.remeasure(|text| shaper.measure(text));
        state.commit(prepared)
    }

    fn set_colour_slot(&self, slot: ColourSlot, name: &str) -> Result<()> {
        let mut state = self.lock();
        let (rgb, result) = match state.resolve_colour(name) {
            Some(rgb) => (rgb, Ok(())),
            None => {
                tracing::warn!(colour = name, ?slot, "Unknown colour, using default");
                (
                    slot.fallback(),
                    Err(OsdError::InvalidColour {
                        name: name.to_string(),
                    }),
                )
            }
        };
        match slot {
            ColourSlot::Primary => state.palette.colour = rgb,
            ColourSlot::Shadow => state.palette.shadow = rgb,
            ColourSlot::Outline => state.palette.outline = rgb,
        }
        state.redraw_all()?;
        result
    }

    pub(crate) fn set_colour(&self, name: &str) -> Result<()> {
        self.set_colour_slot(ColourSlot::Primary, name)
    }

    pub(crate) fn set_shadow_colour(&self, name: &str) -> Result<()> {
        self.set_colour_slot(ColourSlot::Shadow, name)
    }

    pub(crate) fn set_outline_colour(&self, name: &str) -> Result<()> {
        self.set_colour_slot(ColourSlot::Outline, name)
    }

    pub(crate) fn set_position(&self, position: Position) -> Result<()> {
        let mut state = self.lock();
        let layout = Layout {
            position,
            ..state.layout
        };
        state.place(layout)
    }

    pub(crate) fn set_alignment(&self, alignment: Alignment) -> Result<()> {
        let mut state = self.lock();
        let layout = Layout {
            alignment,
            ..state.layout
        };
        state.place(layout)?;
        state.redraw_all()
    }

    pub(crate) fn set_vertical_offset(&self, offset: i32) -> Result<()> {
        let mut state = self.lock();
        let layout = Layout {
            vertical_offset: offset,
            ..state.layout
        };
        state.place(layout)
    }

    pub(crate) fn set_horizontal_offset(&self, offset: i32) -> Result<()> {
        let mut state = self.lock();
        let layout = Layout {
            horizontal_offset: offset,
            ..state.layout
        };
        state.place(layout)
    }

    pub(crate) fn set_shadow_offset(&self, offset: u32) -> Result<()> {
        let mut state = self.lock();
        let layout = Layout {
            shadow_offset: offset,
            ..state.layout
        };
        let monitor = state.monitor.clone();
        state.relayout(layout, monitor)
    }

    pub(crate) fn set_outline_offset(&self, offset: u32) -> Result<()> {
        let mut state = self.lock();
        let layout = Layout {
            outline_offset: offset,
            ..state.layout
        };
        let monitor = state.monitor.clone();
        state.relayout(layout, monitor)
    }

    pub(crate) fn set_bar_length(&self, length: Option<u32>) -> Result<()> {
        let mut state = self.lock();
        state.layout.bar_length = length;
        state.redraw_all()
    }

    pub(crate) fn set_monitor(&self, monitor: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        let layout = state.layout;
        state.relayout(layout, monitor.map(str::to_string))
    }

    /// Replace every placement setting at once with a single relayout
    pub(crate) fn apply_layout(&self, layout: Layout, monitor: Option<&str>) -> Result<()> {
        self.lock().relayout(layout, monitor.map(str::to_string))
    }

    pub(crate) fn set_click_through(&self, enabled: bool) -> Result<()> {
        self.lock().surface.set_click_through(enabled)
    }

    pub(crate) fn set_timeout(&self, seconds: i32) -> Result<()> {
        let mut state = self.lock();
        state.timeout_secs = seconds;
        state.restart_deadline();
        self.timeout_changed.notify_one();
        Ok(())
    }

    pub(crate) fn line(&self, index: usize) -> Result<Line> {
        self.lock().lines.get(index).cloned()
    }

    pub(crate) fn lines(&self) -> Vec<Line> {
        self.lock().lines.iter().cloned().collect()
    }

    pub(crate) fn colour(&self) -> Rgb {
        self.lock().palette.colour
    }

    pub(crate) fn line_count(&self) -> usize {
        self.lock().lines.len()
    }

    pub(crate) fn repaint(&self, y: u32, height: u32) -> Result<()> {
        self.lock().repaint(y, height)
    }
}

struct Reactors {
    events: JoinHandle<()>,
    timeout: JoinHandle<()>,
}

/// Handle to an on-screen display
///
/// All methods take `&self` and may be called from any thread. Dropping the
/// handle stops both reactors and releases the surface; [`Osd::destroy`] does
/// the same but reports reactor failures.
pub struct Osd {
    shared: Arc<Shared>,
    events: Arc<dyn EventSource>,
    reactors: Option<Reactors>,
}

impl Osd {
    /// Open the native display with `line_count` rows and the default font
    pub fn create(line_count: usize) -> Result<Self> {
        let surface = platform::open_native(SURFACE_TITLE)?;
        Self::with_backend(line_count, surface, Box::new(CosmicShaper::new()), None)
    }

    /// Build a display on any surface and shaper
    pub fn with_backend(
        line_count: usize,
        surface: Box<dyn Surface>,
        shaper: Box<dyn TextShaper>,
        font: Option<&str>,
    ) -> Result<Self> {
        let events = surface.events();
        let shared = Arc::new(Shared::new(line_count, surface, shaper, font)?);

        let event_thread = {
            let shared = shared.clone();
            let events = events.clone();
            thread::Builder::new()
                .name("osd-events".into())
                .spawn(move || reactor::run_event_reactor(shared, events))
                .map_err(OsdError::ReactorSpawn)?
        };

        let timeout_thread = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .and_then(|runtime| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name("osd-timeout".into())
                    .spawn(move || runtime.block_on(reactor::run_timeout_reactor(shared)))
            });
        let timeout_thread = match timeout_thread {
            Ok(handle) => handle,
            Err(e) => {
                shared.begin_shutdown();
                events.wake();
                let _ = event_thread.join();
                return Err(OsdError::ReactorSpawn(e));
            }
        };

        Ok(Self {
            shared,
            events,
            reactors: Some(Reactors {
                events: event_thread,
                timeout: timeout_thread,
            }),
        })
    }

    /// Create a display and apply every setting from `config`
    ///
    /// An unresolvable font aborts construction; unknown colours fall back to
    /// defaults with a warning.
    pub fn from_config(config: &OsdConfig) -> Result<Self> {
        let surface = platform::open_native(SURFACE_TITLE)?;
        Self::from_config_with_backend(config, surface, Box::new(CosmicShaper::new()))
    }

    /// [`Osd::from_config`] on any surface and shaper
    pub fn from_config_with_backend(
        config: &OsdConfig,
        surface: Box<dyn Surface>,
        shaper: Box<dyn TextShaper>,
    ) -> Result<Self> {
        let osd = Self::with_backend(config.lines, surface, shaper, config.font.as_deref())?;

        for (name, result) in [
            ("colour", osd.set_colour(&config.colour)),
            ("shadow_colour", osd.set_shadow_colour(&config.shadow_colour)),
            ("outline_colour", osd.set_outline_colour(&config.outline_colour)),
        ] {
            match result {
                Err(OsdError::InvalidColour { .. }) => {}
                Err(e) => return Err(e),
                Ok(()) => tracing::debug!(setting = name, "Applied colour"),
            }
        }

        osd.shared
            .apply_layout(Layout::from_config(config), config.monitor.as_deref())?;
        osd.set_click_through(config.click_through)?;
        osd.set_timeout(config.timeout_secs)?;
        Ok(osd)
    }

    pub fn set_font(&self, name: &str) -> Result<()> {
        self.shared.set_font(name)
    }

    pub fn set_colour(&self, name: &str) -> Result<()> {
        self.shared.set_colour(name)
    }

    pub fn set_shadow_colour(&self, name: &str) -> Result<()> {
        self.shared.set_shadow_colour(name)
    }

    pub fn set_outline_colour(&self, name: &str) -> Result<()> {
        self.shared.set_outline_colour(name)
    }

    pub fn set_position(&self, position: Position) -> Result<()> {
        self.shared.set_position(position)
    }

    pub fn set_alignment(&self, alignment: Alignment) -> Result<()> {
        self.shared.set_alignment(alignment)
    }

    pub fn set_vertical_offset(&self, offset: i32) -> Result<()> {
        self.shared.set_vertical_offset(offset)
    }

    pub fn set_horizontal_offset(&self, offset: i32) -> Result<()> {
        self.shared.set_horizontal_offset(offset)
    }

    pub fn set_shadow_offset(&self, offset: u32) -> Result<()> {
        self.shared.set_shadow_offset(offset)
    }

    pub fn set_outline_offset(&self, offset: u32) -> Result<()> {
        self.shared.set_outline_offset(offset)
    }

    /// `None` sizes bars to 80% of the width, `Some(n)` uses `n` segments
    pub fn set_bar_length(&self, length: Option<u32>) -> Result<()> {
        self.shared.set_bar_length(length)
    }

    /// Place the display on a monitor by id or name (`None` = primary)
    pub fn set_monitor(&self, monitor: Option<&str>) -> Result<()> {
        self.shared.set_monitor(monitor)
    }

    pub fn set_click_through(&self, enabled: bool) -> Result<()> {
        self.shared.set_click_through(enabled)
    }

    /// Seconds until auto-hide after the last `display`; zero or less never hides
    pub fn set_timeout(&self, seconds: i32) -> Result<()> {
        self.shared.set_timeout(seconds)
    }

    /// Replace a row and show the display
    ///
    /// Returns the number of `char`s for text (not bytes) and the clamped
    /// value for bars.
    pub fn display(&self, line: usize, content: Content) -> Result<usize> {
        self.shared.display(line, content)
    }

    /// Drop the first `n` rows, moving the rest up
    pub fn scroll(&self, n: usize) -> Result<()> {
        self.shared.scroll(n)
    }

    pub fn is_on_screen(&self) -> bool {
        self.shared.is_on_screen()
    }

    /// Block until the display is hidden (or the engine shuts down)
    pub fn wait_until_hidden(&self) -> Result<()> {
        self.shared.wait_until_hidden()
    }

    pub fn show(&self) -> Result<()> {
        self.shared.show()
    }

    pub fn hide(&self) -> Result<()> {
        self.shared.hide()
    }

    pub fn colour(&self) -> Rgb {
        self.shared.colour()
    }

    pub fn line_count(&self) -> usize {
        self.shared.line_count()
    }

    pub fn line(&self, index: usize) -> Result<Line> {
        self.shared.line(index)
    }

    pub fn lines(&self) -> Vec<Line> {
        self.shared.lines()
    }

    /// Stop both reactors and release the surface
    pub fn destroy(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(reactors) = self.reactors.take() else {
            return Ok(());
        };
        self.shared.begin_shutdown();
        self.events.wake();

        let events = reactors.events.join();
        let timeout = reactors.timeout.join();
        tracing::info!("Display destroyed");
        events.map_err(|_| OsdError::ReactorPanicked("event"))?;
        timeout.map_err(|_| OsdError::ReactorPanicked("timeout"))?;
        Ok(())
    }
}

impl Drop for Osd {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Display shutdown failed");
        }
    }
}
