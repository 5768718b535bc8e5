//! Software renderer for OSD rows using tiny-skia
//!
//! Every row is drawn twice over: into the content pixmap (what the pixels
//! look like) and into the [`ShapeMask`] (which pixels exist at all). All
//! rendering is done on the CPU; the host backend only copies the results.

use tiny_skia::{Paint, Pixmap, Rect, Transform};

use crate::colour::Rgb;
use crate::error::{OsdError, Result};
use crate::font::{FontMetrics, TextShaper};
use crate::geometry::{BarGeometry, Layout};
use crate::line::{Content, Line};
use crate::mask::ShapeMask;

/// Glyph coverage at or above this is part of the visible region
const MASK_THRESHOLD: u8 = 0x60;

/// Diagonal directions the outline is stamped in
const OUTLINE_DIRECTIONS: [(i32, i32); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];

/// Colours used when drawing a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub colour: Rgb,
    pub shadow: Rgb,
    pub outline: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colour: Rgb::WHITE,
            shadow: Rgb::BLACK,
            outline: Rgb::BLACK,
        }
    }
}

/// The content bitmap and its visibility mask, always the same size
pub struct Frame {
    pixmap: Pixmap,
    mask: ShapeMask,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width.max(1), height.max(1)).ok_or(OsdError::OutOfMemory)?;
        Ok(Self {
            mask: ShapeMask::new(pixmap.width(), pixmap.height()),
            pixmap,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA content
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn mask(&self) -> &ShapeMask {
        &self.mask
    }

    /// Erase `height` rows starting at `y` from both bitmaps
    pub fn clear_rows(&mut self, y: u32, height: u32) {
        let width = self.pixmap.width() as usize;
        let start = (y.min(self.height()) as usize) * width * 4;
        let end = (y.saturating_add(height).min(self.height()) as usize) * width * 4;
        self.pixmap.data_mut()[start..end].fill(0);
        self.mask.clear_rows(y, height);
    }

    /// Blend one glyph pixel into the content and mark it in the mask
    fn plot(&mut self, band: (i32, i32), x: i32, y: i32, colour: Rgb, coverage: u8) {
        if y < band.0 || y >= band.1 {
            return;
        }
        let width = self.pixmap.width() as i32;
        let height = self.pixmap.height() as i32;
        if x < 0 || x >= width || y < 0 || y >= height {
            return;
        }

        let pixel_idx = ((y * width + x) * 4) as usize;
        let data = self.pixmap.data_mut();

        let src_a = coverage as u32;
        let inv_a = 255 - src_a;
        data[pixel_idx] = ((colour.r as u32 * src_a + data[pixel_idx] as u32 * inv_a) / 255) as u8;
        data[pixel_idx + 1] =
            ((colour.g as u32 * src_a + data[pixel_idx + 1] as u32 * inv_a) / 255) as u8;
        data[pixel_idx + 2] =
            ((colour.b as u32 * src_a + data[pixel_idx + 2] as u32 * inv_a) / 255) as u8;
        data[pixel_idx + 3] = (src_a + (data[pixel_idx + 3] as u32 * inv_a) / 255) as u8;

        if coverage >= MASK_THRESHOLD {
            self.mask.set(x, y);
        }
    }

    /// Fill a solid rectangle in both bitmaps, clipped to `band`
    fn fill_rect(&mut self, band: (i32, i32), x: i32, y: i32, w: u32, h: u32, colour: Rgb) {
        let top = y.max(band.0);
        let bottom = (y + h as i32).min(band.1);
        if bottom <= top || w == 0 {
            return;
        }
        let Some(rect) = Rect::from_xywh(x as f32, top as f32, w as f32, (bottom - top) as f32)
        else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color(colour.to_color());
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
        self.mask.fill_rect(x, top, w, (bottom - top) as u32);
    }
}

/// Offsets and colours of every pass for one row, back to front
fn passes(layout: &Layout, palette: &Palette) -> Vec<(i32, i32, Rgb)> {
    let mut passes = Vec::with_capacity(6);
    let o = layout.outline_offset as i32;
    if o > 0 {
        passes.extend(
            OUTLINE_DIRECTIONS
                .iter()
                .map(|(dx, dy)| (dx * o, dy * o, palette.outline)),
        );
    }
    let s = layout.shadow_offset as i32;
    if s > 0 {
        passes.push((s, s, palette.shadow));
    }
    passes.push((0, 0, palette.colour));
    passes
}

/// Redraw row `index` of `frame` from `line`
pub fn render_line(
    frame: &mut Frame,
    shaper: &mut dyn TextShaper,
    layout: &Layout,
    metrics: &FontMetrics,
    palette: &Palette,
    index: usize,
    line: &Line,
) {
    let top = layout.row_top(metrics, index);
    let line_height = layout.line_height(metrics);
    frame.clear_rows(top.max(0) as u32, line_height);
    let band = (top, top + line_height as i32);

    match &line.content {
        Content::Blank => {}
        Content::Text(text) if text.is_empty() => {}
        Content::Text(text) => {
            let x = layout.content_x(frame.width(), line.measured_width);
            let baseline = layout.baseline(metrics, index);
            for (dx, dy, colour) in passes(layout, palette) {
                shaper.draw(text, x + dx, baseline + dy, &mut |px, py, coverage| {
                    frame.plot(band, px, py, colour, coverage)
                });
            }
        }
        Content::Percentage(value) => {
            let bar = layout.bar(metrics, frame.width());
            let filled = bar.filled(*value);
            draw_bar(frame, layout, palette, band, top, &bar, |i| i < filled);
        }
        Content::Slider(value) => {
            let bar = layout.bar(metrics, frame.width());
            let marker = bar.marker(*value);
            draw_bar(frame, layout, palette, band, top, &bar, |i| i == marker);
        }
    }
}

fn draw_bar(
    frame: &mut Frame,
    layout: &Layout,
    palette: &Palette,
    band: (i32, i32),
    top: i32,
    bar: &BarGeometry,
    is_tall: impl Fn(u32) -> bool,
) {
    let bar_top = top + layout.outline_offset as i32;
    for (dx, dy, colour) in passes(layout, palette) {
        for segment in bar.segments(&is_tall) {
            frame.fill_rect(
                band,
                segment.x + dx,
                bar_top + segment.y + dy,
                segment.width,
                segment.height,
                colour,
            );
        }
    }
}

/// Redraw every row
pub fn render_all<'a>(
    frame: &mut Frame,
    shaper: &mut dyn TextShaper,
    layout: &Layout,
    metrics: &FontMetrics,
    palette: &Palette,
    lines: impl Iterator<Item = &'a Line>,
) {
    frame.clear_rows(0, frame.height());
    for (index, line) in lines.enumerate() {
        render_line(frame, shaper, layout, metrics, palette, index, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    fn pixel(frame: &Frame, x: u32, y: u32) -> Option<Color> {
        frame
            .pixmap
            .pixel(x, y)
            .map(|p| p.demultiply())
            .map(|c| Color::from_rgba8(c.red(), c.green(), c.blue(), c.alpha()))
    }
    use crate::platform::headless::BoxShaper;

    fn setup() -> (BoxShaper, FontMetrics) {
        let mut shaper = BoxShaper::default();
        let metrics = shaper
            .load(&"Box 10".parse().expect("descriptor"))
            .expect("box font");
        (shaper, metrics)
    }

    fn text_line(shaper: &mut BoxShaper, text: &str) -> Line {
        Line {
            content: Content::text(text),
            measured_width: shaper.measure(text),
        }
    }

    fn row_has_mask(frame: &Frame, top: i32, height: u32) -> bool {
        (top..top + height as i32).any(|y| (0..frame.width() as i32).any(|x| frame.mask().get(x, y)))
    }

    #[test]
    fn test_text_draws_into_both_bitmaps() {
        let (mut shaper, metrics) = setup();
        let layout = Layout::default();
        let mut frame = Frame::new(200, layout.line_height(&metrics) * 2).unwrap();
        let line = text_line(&mut shaper, "ab");

        render_line(&mut frame, &mut shaper, &layout, &metrics, &Palette::default(), 1, &line);

        let lh = layout.line_height(&metrics);
        assert!(!row_has_mask(&frame, 0, lh));
        assert!(row_has_mask(&frame, lh as i32, lh));

        // First box glyph starts at the left margin, one pixel above the baseline
        let baseline = layout.baseline(&metrics, 1);
        assert!(frame.mask().get(10, baseline - 1));
        let p = pixel(&frame, 10, (baseline - 1) as u32).unwrap();
        assert_eq!(p, Color::WHITE);
    }

    #[test]
    fn test_shadow_and_outline_extend_mask() {
        let (mut shaper, metrics) = setup();
        let layout = Layout {
            shadow_offset: 2,
            outline_offset: 1,
            ..Default::default()
        };
        let palette = Palette {
            colour: Rgb::new(255, 0, 0),
            ..Default::default()
        };
        let mut frame = Frame::new(200, layout.line_height(&metrics)).unwrap();
        let line = text_line(&mut shaper, "a");
        render_line(&mut frame, &mut shaper, &layout, &metrics, &palette, 0, &line);

        let baseline = layout.baseline(&metrics, 0);
        // Glyph box spans x 10..(10 + advance - 1); the shadow lands two pixels right
        let glyph_right = 10 + shaper.measure("a") as i32 - 2;
        assert!(frame.mask().get(glyph_right + 2, baseline + 1));
        // Outline reaches one pixel left of the glyph
        assert!(frame.mask().get(9, baseline - 2));
        let p = pixel(&frame, 9, (baseline - 2) as u32).unwrap();
        assert_eq!(p, Color::BLACK);
        // Primary colour stays on top
        let p = pixel(&frame, 12, (baseline - 3) as u32).unwrap();
        assert_eq!(p, Color::from_rgba8(255, 0, 0, 255));
    }

    #[test]
    fn test_percentage_and_slider_segments() {
        let (mut shaper, metrics) = setup();
        let layout = Layout {
            bar_length: Some(10),
            ..Default::default()
        };
        let mut frame = Frame::new(400, layout.line_height(&metrics)).unwrap();
        let bar = layout.bar(&metrics, 400);

        let line = Line {
            content: Content::Percentage(30),
            measured_width: 0,
        };
        render_line(&mut frame, &mut shaper, &layout, &metrics, &Palette::default(), 0, &line);
        let tall = |frame: &Frame, i: u32| frame.mask().get(bar.x + (i * bar.pitch) as i32, 0);
        assert!((0..3).all(|i| tall(&frame, i)));
        assert!((3..10).all(|i| !tall(&frame, i)));
        // Short segments still occupy the middle third
        let mid = (bar.height / 3) as i32;
        assert!(frame.mask().get(bar.x + (5 * bar.pitch) as i32, mid));

        let line = Line {
            content: Content::Slider(50),
            measured_width: 0,
        };
        render_line(&mut frame, &mut shaper, &layout, &metrics, &Palette::default(), 0, &line);
        let marked: Vec<u32> = (0..10).filter(|i| tall(&frame, *i)).collect();
        assert_eq!(marked, vec![bar.marker(50)]);
    }

    #[test]
    fn test_blank_clears_row() {
        let (mut shaper, metrics) = setup();
        let layout = Layout::default();
        let mut frame = Frame::new(200, layout.line_height(&metrics)).unwrap();
        let line = text_line(&mut shaper, "xyz");
        render_line(&mut frame, &mut shaper, &layout, &metrics, &Palette::default(), 0, &line);
        assert!(!frame.mask().is_empty());

        render_line(&mut frame, &mut shaper, &layout, &metrics, &Palette::default(), 0, &Line::default());
        assert!(frame.mask().is_empty());
        assert!(frame.pixmap().data().iter().all(|b| *b == 0));
    }
}
