//! Surface placement and per-row layout math
//!
//! Pure functions of the current style, font metrics and screen area, so the
//! engine can recompute everything after any setter without touching the host.

use osd_types::{Alignment, OsdConfig, Position};

use crate::font::FontMetrics;

/// Horizontal gap between the surface edge and left/right aligned content
pub const MARGIN: i32 = 10;

/// Fraction of the surface width covered by an automatically sized bar
const BAR_FRACTION: f32 = 0.8;

/// Tallest surface a host window can have; X11 window sizes are 16-bit
pub const MAX_SURFACE_HEIGHT: u32 = u16::MAX as u32;

/// A rectangle in root-window coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Placement and decoration settings the geometry depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout {
    pub position: Position,
    pub alignment: Alignment,
    pub vertical_offset: i32,
    pub horizontal_offset: i32,
    pub shadow_offset: u32,
    pub outline_offset: u32,
    /// Fixed number of bar segments; `None` spans 80% of the width
    pub bar_length: Option<u32>,
}

impl Layout {
    pub fn from_config(config: &OsdConfig) -> Self {
        Self {
            position: config.position,
            alignment: config.alignment,
            vertical_offset: config.vertical_offset,
            horizontal_offset: config.horizontal_offset,
            shadow_offset: config.shadow_offset,
            outline_offset: config.outline_offset,
            bar_length: config.bar_length,
        }
    }

    /// Height of one row: font line height plus room for shadow and outline
    pub fn line_height(&self, metrics: &FontMetrics) -> u32 {
        metrics
            .line_height
            .saturating_add(self.shadow_offset)
            .saturating_add(self.outline_offset.saturating_mul(2))
            .max(1)
    }

    /// Surface size for `lines` rows on `screen`
    ///
    /// `None` when the rows would not fit in [`MAX_SURFACE_HEIGHT`].
    pub fn surface_size(
        &self,
        metrics: &FontMetrics,
        screen: ScreenRect,
        lines: usize,
    ) -> Option<(u32, u32)> {
        let rows = u32::try_from(lines.max(1)).ok()?;
        let height = self.line_height(metrics).checked_mul(rows)?;
        (height <= MAX_SURFACE_HEIGHT).then_some((screen.width.max(1), height))
    }

    /// Top-left corner of a surface of `height` pixels on `screen`
    pub fn surface_origin(&self, screen: ScreenRect, height: u32) -> (i32, i32) {
        let sh = screen.height as i32;
        let h = height as i32;
        let y = match self.position {
            Position::Top => screen.y + self.vertical_offset,
            Position::Middle => screen.y + sh / 2 - h / 2 - self.vertical_offset,
            Position::Bottom => screen.y + sh - h - self.vertical_offset,
        };
        let x = match self.alignment {
            Alignment::Left | Alignment::Center => screen.x + self.horizontal_offset,
            Alignment::Right => screen.x - self.horizontal_offset,
        };
        (x, y)
    }

    /// Left edge of content `content_width` pixels wide
    pub fn content_x(&self, surface_width: u32, content_width: u32) -> i32 {
        let w = surface_width as i32;
        let cw = content_width as i32;
        match self.alignment {
            Alignment::Left => MARGIN,
            Alignment::Center => (w - cw) / 2,
            Alignment::Right => w - cw - MARGIN,
        }
    }

    /// Top of row `index`
    pub fn row_top(&self, metrics: &FontMetrics, index: usize) -> i32 {
        let top = (self.line_height(metrics) as u64).saturating_mul(index as u64);
        top.min(i32::MAX as u64) as i32
    }

    /// Baseline of row `index`, leaving room above for the outline
    pub fn baseline(&self, metrics: &FontMetrics, index: usize) -> i32 {
        self.row_top(metrics, index)
            .saturating_add(self.outline_offset.min(i32::MAX as u32) as i32)
            .saturating_add(metrics.ascent.min(i32::MAX as u32) as i32)
    }

    /// Segment layout for a bar or slider row
    pub fn bar(&self, metrics: &FontMetrics, surface_width: u32) -> BarGeometry {
        let height = metrics.ascent.max(1);
        let pitch = (height / 2).max(1);
        let requested = match self.bar_length {
            Some(n) => n,
            None => ((surface_width as f32 * BAR_FRACTION) as u32) / pitch,
        };
        // Segments starting past the right edge are never visible
        let count = requested.min(surface_width.div_ceil(pitch));
        BarGeometry {
            x: self.content_x(surface_width, count.saturating_mul(pitch)),
            pitch,
            height,
            count,
        }
    }
}

/// Horizontal segment layout of a bar row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarGeometry {
    /// Left edge of the first segment
    pub x: i32,
    /// Distance between segment starts
    pub pitch: u32,
    /// Height of a full segment (the font ascent)
    pub height: u32,
    pub count: u32,
}

/// One filled rectangle of a bar, relative to the bar's top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BarGeometry {
    /// Number of full segments for a percentage bar
    pub fn filled(&self, value: u8) -> u32 {
        (self.count as u64 * value as u64).div_ceil(100) as u32
    }

    /// Index of the marked segment for a slider
    pub fn marker(&self, value: u8) -> u32 {
        if self.count == 0 {
            return 0;
        }
        ((value as f32 / 100.0) * (self.count - 1) as f32).round() as u32
    }

    /// Segment rectangles: tall ones are 70% of the pitch wide and full
    /// height, short ones 80% wide and a third of the height, centred.
    pub fn segments<'a>(
        &'a self,
        is_tall: impl Fn(u32) -> bool + 'a,
    ) -> impl Iterator<Item = Segment> + 'a {
        (0..self.count).map(move |i| {
            let x = self.x + (i * self.pitch) as i32;
            if is_tall(i) {
                Segment {
                    x,
                    y: 0,
                    width: ((self.pitch as f32 * 0.7) as u32).max(1),
                    height: self.height,
                }
            } else {
                let h = (self.height / 3).max(1);
                Segment {
                    x,
                    y: h as i32,
                    width: ((self.pitch as f32 * 0.8) as u32).max(1),
                    height: h,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> FontMetrics {
        FontMetrics {
            line_height: 20,
            ascent: 16,
        }
    }

    const SCREEN: ScreenRect = ScreenRect {
        x: 100,
        y: 0,
        width: 1000,
        height: 800,
    };

    #[test]
    fn test_line_height_includes_decorations() {
        let mut layout = Layout::default();
        assert_eq!(layout.line_height(&metrics()), 20);
        layout.shadow_offset = 2;
        layout.outline_offset = 1;
        assert_eq!(layout.line_height(&metrics()), 24);
        assert_eq!(layout.surface_size(&metrics(), SCREEN, 3), Some((1000, 72)));
    }

    #[test]
    fn test_vertical_positions() {
        let mut layout = Layout {
            vertical_offset: 30,
            ..Default::default()
        };
        assert_eq!(layout.surface_origin(SCREEN, 100), (100, 30));

        layout.position = Position::Bottom;
        assert_eq!(layout.surface_origin(SCREEN, 100), (100, 800 - 100 - 30));

        layout.position = Position::Middle;
        assert_eq!(layout.surface_origin(SCREEN, 100), (100, 400 - 50 - 30));
    }

    #[test]
    fn test_horizontal_offset_direction() {
        let mut layout = Layout {
            horizontal_offset: 25,
            ..Default::default()
        };
        assert_eq!(layout.surface_origin(SCREEN, 10).0, 125);
        layout.alignment = Alignment::Center;
        assert_eq!(layout.surface_origin(SCREEN, 10).0, 125);
        layout.alignment = Alignment::Right;
        assert_eq!(layout.surface_origin(SCREEN, 10).0, 75);
    }

    #[test]
    fn test_content_alignment() {
        let mut layout = Layout::default();
        assert_eq!(layout.content_x(1000, 200), MARGIN);
        layout.alignment = Alignment::Center;
        assert_eq!(layout.content_x(1000, 200), 400);
        layout.alignment = Alignment::Right;
        assert_eq!(layout.content_x(1000, 200), 790);
    }

    #[test]
    fn test_baseline_skips_outline() {
        let layout = Layout {
            outline_offset: 2,
            ..Default::default()
        };
        // line height 24
        assert_eq!(layout.row_top(&metrics(), 2), 48);
        assert_eq!(layout.baseline(&metrics(), 2), 48 + 2 + 16);
    }

    #[test]
    fn test_bar_segment_counts() {
        let layout = Layout::default();
        let bar = layout.bar(&metrics(), 1000);
        // pitch 8, 800px of bar
        assert_eq!(bar.pitch, 8);
        assert_eq!(bar.count, 100);
        assert_eq!(bar.x, MARGIN);
        assert_eq!(bar.filled(0), 0);
        assert_eq!(bar.filled(1), 1);
        assert_eq!(bar.filled(100), 100);

        let fixed = Layout {
            bar_length: Some(11),
            ..Default::default()
        }
        .bar(&metrics(), 1000);
        assert_eq!(fixed.count, 11);
        assert_eq!(fixed.filled(50), 6);
        assert_eq!(fixed.marker(0), 0);
        assert_eq!(fixed.marker(50), 5);
        assert_eq!(fixed.marker(100), 10);
    }

    #[test]
    fn test_oversized_layouts_do_not_overflow() {
        let layout = Layout {
            shadow_offset: u32::MAX,
            outline_offset: u32::MAX,
            ..Default::default()
        };
        assert_eq!(layout.line_height(&metrics()), u32::MAX);
        assert_eq!(layout.surface_size(&metrics(), SCREEN, 3), None);
        assert_eq!(layout.row_top(&metrics(), 4), i32::MAX);

        let tall = Layout {
            shadow_offset: MAX_SURFACE_HEIGHT,
            ..Default::default()
        };
        assert_eq!(tall.surface_size(&metrics(), SCREEN, 1), None);
        let fits = Layout {
            shadow_offset: MAX_SURFACE_HEIGHT - 20,
            ..Default::default()
        };
        assert_eq!(
            fits.surface_size(&metrics(), SCREEN, 1),
            Some((1000, MAX_SURFACE_HEIGHT))
        );
    }

    #[test]
    fn test_bar_length_is_capped_to_surface() {
        let bar = Layout {
            bar_length: Some(u32::MAX),
            ..Default::default()
        }
        .bar(&metrics(), 1000);
        // pitch 8: 125 segments reach the right edge
        assert_eq!(bar.count, 125);
        assert_eq!(bar.filled(100), 125);
        assert_eq!(bar.marker(100), 124);
        assert_eq!(bar.segments(|_| true).count(), 125);
    }

    #[test]
    fn test_segment_shapes() {
        let bar = BarGeometry {
            x: 10,
            pitch: 10,
            height: 15,
            count: 3,
        };
        let segments: Vec<_> = bar.segments(|i| i == 1).collect();
        assert_eq!(
            segments[0],
            Segment {
                x: 10,
                y: 5,
                width: 8,
                height: 5
            }
        );
        assert_eq!(
            segments[1],
            Segment {
                x: 20,
                y: 0,
                width: 7,
                height: 15
            }
        );
        assert_eq!(segments[2].x, 30);
    }
}
