//! Font selection, measurement and glyph rasterization
//!
//! Fonts are named either with an X logical font description
//! (`-misc-fixed-medium-r-semicondensed--20-*-*-*-c-*-*-*`) or a plain
//! `Family Size` / `Family:size` string. The [`TextShaper`] trait is the seam
//! between the engine and whatever produces glyph coverage; [`CosmicShaper`]
//! is the production implementation built on cosmic-text.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use cosmic_text::fontdb;
use cosmic_text::{
    Attrs, Buffer, Family, FontSystem, LayoutGlyph, Metrics, Shaping, Style, SwashCache,
    SwashContent, Weight,
};

use crate::error::{OsdError, Result};

/// Pixel size used when a description leaves the size unspecified
pub const DEFAULT_PIXEL_SIZE: f32 = 20.0;

/// Font used when the caller does not pick one
pub const DEFAULT_FONT: &str = "-misc-fixed-medium-r-semicondensed--*-*-*-*-c-*-*-*";

/// Maximum entries in the width cache (LRU eviction when exceeded)
const TEXT_CACHE_MAX_ENTRIES: usize = 256;

/// Font family as requested by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyName {
    Named(String),
    Monospace,
    SansSerif,
    Serif,
}

impl FamilyName {
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "*" | "sans" | "sans-serif" | "helvetica" => FamilyName::SansSerif,
            "fixed" | "mono" | "monospace" | "courier" => FamilyName::Monospace,
            "serif" | "times" => FamilyName::Serif,
            _ => FamilyName::Named(name.trim().to_string()),
        }
    }
}

/// A parsed font request
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    /// The string this was parsed from
    pub name: String,
    pub family: FamilyName,
    pub bold: bool,
    pub italic: bool,
    pub pixel_size: f32,
}

impl fmt::Display for FontDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn not_found(name: &str) -> OsdError {
    OsdError::FontNotFound {
        name: name.to_string(),
    }
}

/// Parse a numeric XLFD field, treating `*` and empty as unspecified
fn xlfd_number(field: Option<&str>) -> Option<f32> {
    match field {
        Some("") | Some("*") | None => None,
        Some(value) => value.parse::<f32>().ok().filter(|v| v.is_finite() && *v > 0.0),
    }
}

impl FontDescriptor {
    fn parse_xlfd(name: &str) -> Result<Self> {
        // -foundry-family-weight-slant-setwidth-addstyle-pixel-point-resx-resy-spacing-avg-registry-encoding
        let fields: Vec<&str> = name.split('-').collect();
        if fields.len() < 3 {
            return Err(not_found(name));
        }
        let family = FamilyName::from_name(fields[2]);
        let weight = fields.get(3).copied().unwrap_or("*").to_ascii_lowercase();
        let slant = fields.get(4).copied().unwrap_or("*").to_ascii_lowercase();

        let pixel_size = match xlfd_number(fields.get(7).copied()) {
            Some(px) => px,
            // Point size is in decipoints at 96 dpi
            None => xlfd_number(fields.get(8).copied())
                .map(|dp| dp / 10.0 * 96.0 / 72.0)
                .unwrap_or(DEFAULT_PIXEL_SIZE),
        };

        Ok(Self {
            name: name.to_string(),
            family,
            bold: matches!(weight.as_str(), "bold" | "demibold" | "black" | "heavy"),
            italic: matches!(slant.as_str(), "i" | "o"),
            pixel_size,
        })
    }

    fn parse_plain(name: &str) -> Result<Self> {
        let (mut rest, mut pixel_size) = match name.rsplit_once(':') {
            Some((family, size)) => {
                let size: f32 = size.trim().parse().map_err(|_| not_found(name))?;
                (family.trim(), size)
            }
            None => match name.rsplit_once(char::is_whitespace) {
                Some((family, size)) if size.parse::<f32>().is_ok() => {
                    (family.trim(), size.parse::<f32>().unwrap_or(DEFAULT_PIXEL_SIZE))
                }
                _ => (name.trim(), DEFAULT_PIXEL_SIZE),
            },
        };
        if !pixel_size.is_finite() || pixel_size <= 0.0 {
            pixel_size = DEFAULT_PIXEL_SIZE;
        }

        let mut bold = false;
        let mut italic = false;
        loop {
            match rest.rsplit_once(char::is_whitespace) {
                Some((head, word)) if word.eq_ignore_ascii_case("bold") => {
                    bold = true;
                    rest = head.trim_end();
                }
                Some((head, word))
                    if word.eq_ignore_ascii_case("italic") || word.eq_ignore_ascii_case("oblique") =>
                {
                    italic = true;
                    rest = head.trim_end();
                }
                _ => break,
            }
        }

        Ok(Self {
            name: name.to_string(),
            family: FamilyName::from_name(rest),
            bold,
            italic,
            pixel_size,
        })
    }
}

impl FromStr for FontDescriptor {
    type Err = OsdError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(not_found(s));
        }
        if trimmed.starts_with('-') {
            Self::parse_xlfd(trimmed)
        } else {
            Self::parse_plain(trimmed)
        }
    }
}

/// Vertical metrics of a loaded font, in whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontMetrics {
    pub line_height: u32,
    /// Distance from the top of a line to its baseline
    pub ascent: u32,
}

/// Produces glyph metrics and coverage for the current font
///
/// `load` must leave the current font untouched when it fails.
pub trait TextShaper: Send {
    fn load(&mut self, font: &FontDescriptor) -> Result<FontMetrics>;

    /// Advance width of `text` in pixels
    fn measure(&mut self, text: &str) -> u32;

    /// Rasterize `text` with its baseline origin at `(x, baseline)`.
    /// `plot` receives pixel coordinates and a 0-255 coverage value.
    fn draw(&mut self, text: &str, x: i32, baseline: i32, plot: &mut dyn FnMut(i32, i32, u8));
}

/// Cached result of text shaping
struct CachedText {
    glyphs: Vec<LayoutGlyph>,
    width: f32,
    /// LRU tracking: incremented on each access
    last_used: u64,
}

/// Currently loaded font
struct LoadedFont {
    family: String,
    weight: Weight,
    style: Style,
    size: f32,
    line_height: f32,
}

/// cosmic-text backed shaper using the system font database
pub struct CosmicShaper {
    font_system: FontSystem,
    swash_cache: SwashCache,
    font: Option<LoadedFont>,
    /// Shaped text for the current font
    text_cache: HashMap<String, CachedText>,
    cache_access_counter: u64,
}

impl CosmicShaper {
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
            font: None,
            text_cache: HashMap::with_capacity(64),
            cache_access_counter: 0,
        }
    }

    /// Find an installed family matching the request
    fn resolve_family(&self, font: &FontDescriptor, weight: Weight, style: Style) -> Option<String> {
        let db = self.font_system.db();
        let family = match &font.family {
            FamilyName::Named(name) => Family::Name(name),
            FamilyName::Monospace => Family::Monospace,
            FamilyName::SansSerif => Family::SansSerif,
            FamilyName::Serif => Family::Serif,
        };
        let query = fontdb::Query {
            families: &[family],
            weight,
            stretch: fontdb::Stretch::Normal,
            style,
        };

        let id = db.query(&query).or_else(|| match font.family {
            // Generic families may not be configured; take any fitting face
            FamilyName::Named(_) => None,
            FamilyName::Monospace => db
                .faces()
                .find(|face| face.monospaced)
                .or_else(|| db.faces().next())
                .map(|face| face.id),
            _ => db.faces().next().map(|face| face.id),
        })?;

        db.face(id)
            .and_then(|face| face.families.first())
            .map(|(name, _)| name.clone())
    }

    fn attrs<'a>(font: &'a LoadedFont) -> Attrs<'a> {
        Attrs::new()
            .family(Family::Name(&font.family))
            .weight(font.weight)
            .style(font.style)
    }

    /// Evict least recently used entries if cache is too large
    fn evict_lru_if_needed(&mut self) {
        if self.text_cache.len() <= TEXT_CACHE_MAX_ENTRIES {
            return;
        }

        let target_size = TEXT_CACHE_MAX_ENTRIES * 3 / 4;
        let mut entries: Vec<_> = self
            .text_cache
            .iter()
            .map(|(k, v)| (k.clone(), v.last_used))
            .collect();
        entries.sort_by_key(|(_, last_used)| *last_used);

        for (key, _) in entries
            .into_iter()
            .take(self.text_cache.len() - target_size)
        {
            self.text_cache.remove(&key);
        }
    }

    /// Ensure text is shaped under the current font, returning its width
    fn ensure_cached(&mut self, text: &str) -> f32 {
        self.cache_access_counter += 1;
        let current_access = self.cache_access_counter;

        if let Some(cached) = self.text_cache.get_mut(text) {
            cached.last_used = current_access;
            return cached.width;
        }

        let Some(font) = self.font.as_ref() else {
            return 0.0;
        };

        let mut buffer = Buffer::new(
            &mut self.font_system,
            Metrics::new(font.size, font.line_height),
        );
        buffer.set_text(
            &mut self.font_system,
            text,
            &Self::attrs(font),
            Shaping::Advanced,
            None,
        );
        buffer.shape_until_scroll(&mut self.font_system, false);

        let mut glyphs = Vec::new();
        let mut width = 0.0f32;
        // Only the first line is displayed; embedded newlines are not wrapped
        if let Some(run) = buffer.layout_runs().next() {
            width = run.line_w;
            glyphs.extend(run.glyphs.iter().cloned());
        }

        self.text_cache.insert(
            text.to_string(),
            CachedText {
                glyphs,
                width,
                last_used: current_access,
            },
        );
        self.evict_lru_if_needed();
        width
    }

    /// Shape a sample string to obtain line metrics for a font
    fn probe_metrics(&mut self, font: &LoadedFont) -> FontMetrics {
        let mut buffer = Buffer::new(
            &mut self.font_system,
            Metrics::new(font.size, font.line_height),
        );
        buffer.set_text(
            &mut self.font_system,
            "Xg",
            &Self::attrs(font),
            Shaping::Advanced,
            None,
        );
        buffer.shape_until_scroll(&mut self.font_system, false);

        let (ascent, line_height) = buffer
            .layout_runs()
            .next()
            .map(|run| ((run.line_y - run.line_top).round(), run.line_height.ceil()))
            .unwrap_or((font.size.round(), font.line_height.ceil()));

        let line_height = (line_height.max(1.0)) as u32;
        let ascent = (ascent.max(0.0) as u32).min(line_height);
        FontMetrics {
            line_height,
            ascent,
        }
    }
}

impl Default for CosmicShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl TextShaper for CosmicShaper {
    fn load(&mut self, font: &FontDescriptor) -> Result<FontMetrics> {
        let weight = if font.bold { Weight::BOLD } else { Weight::NORMAL };
        let style = if font.italic {
            Style::Italic
        } else {
            Style::Normal
        };

        let family = self
            .resolve_family(font, weight, style)
            .ok_or_else(|| not_found(&font.name))?;

        let loaded = LoadedFont {
            family,
            weight,
            style,
            size: font.pixel_size,
            line_height: (font.pixel_size * 1.2).ceil(),
        };
        let metrics = self.probe_metrics(&loaded);

        tracing::debug!(
            font = %font,
            family = %loaded.family,
            size = loaded.size,
            line_height = metrics.line_height,
            "Loaded font"
        );

        self.font = Some(loaded);
        self.text_cache.clear();
        Ok(metrics)
    }

    fn measure(&mut self, text: &str) -> u32 {
        self.ensure_cached(text).ceil() as u32
    }

    fn draw(&mut self, text: &str, x: i32, baseline: i32, plot: &mut dyn FnMut(i32, i32, u8)) {
        self.ensure_cached(text);
        // Clone needed: swash_cache borrows font_system mutably
        let Some(glyphs) = self.text_cache.get(text).map(|c| c.glyphs.clone()) else {
            return;
        };

        for glyph in &glyphs {
            let physical = glyph.physical((x as f32, baseline as f32), 1.0);

            let Some(image) = self
                .swash_cache
                .get_image(&mut self.font_system, physical.cache_key)
            else {
                continue;
            };

            let left = physical.x + image.placement.left;
            let top = physical.y - image.placement.top;
            let width = image.placement.width as usize;
            let height = image.placement.height as usize;
            let stride = match image.content {
                SwashContent::Mask => 1,
                SwashContent::Color => 4,
                SwashContent::SubpixelMask => 4,
            };

            for gy in 0..height {
                for gx in 0..width {
                    let idx = (gy * width + gx) * stride;
                    let coverage = match image.content {
                        SwashContent::Mask => image.data.get(idx).copied(),
                        SwashContent::Color => image.data.get(idx + 3).copied(),
                        SwashContent::SubpixelMask => image
                            .data
                            .get(idx..idx + 3)
                            .map(|px| ((px[0] as u32 + px[1] as u32 + px[2] as u32) / 3) as u8),
                    };
                    match coverage {
                        Some(0) | None => {}
                        Some(c) => plot(left + gx as i32, top + gy as i32, c),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_xlfd() {
        let font: FontDescriptor = DEFAULT_FONT.parse().unwrap();
        assert_eq!(font.family, FamilyName::Monospace);
        assert!(!font.bold);
        assert!(!font.italic);
        assert_eq!(font.pixel_size, DEFAULT_PIXEL_SIZE);
    }

    #[test]
    fn test_parse_xlfd_sizes_and_style() {
        let font: FontDescriptor = "-adobe-helvetica-bold-o-normal--24-*-*-*-p-*-iso8859-1"
            .parse()
            .unwrap();
        assert_eq!(font.family, FamilyName::SansSerif);
        assert!(font.bold);
        assert!(font.italic);
        assert_eq!(font.pixel_size, 24.0);

        // 180 decipoints = 18pt = 24px at 96 dpi
        let font: FontDescriptor = "-*-DejaVu Sans-medium-r-*-*-*-180-*-*-*-*-*-*"
            .parse()
            .unwrap();
        assert_eq!(font.family, FamilyName::Named("DejaVu Sans".into()));
        assert_eq!(font.pixel_size, 24.0);
    }

    #[test]
    fn test_parse_plain_forms() {
        let font: FontDescriptor = "Noto Sans 18".parse().unwrap();
        assert_eq!(font.family, FamilyName::Named("Noto Sans".into()));
        assert_eq!(font.pixel_size, 18.0);

        let font: FontDescriptor = "DejaVu Sans Mono Bold Italic:32".parse().unwrap();
        assert_eq!(font.family, FamilyName::Named("DejaVu Sans Mono".into()));
        assert!(font.bold && font.italic);
        assert_eq!(font.pixel_size, 32.0);

        let font: FontDescriptor = "monospace".parse().unwrap();
        assert_eq!(font.family, FamilyName::Monospace);
        assert_eq!(font.pixel_size, DEFAULT_PIXEL_SIZE);

        // Sizes that are not finite fall back to the default
        let font: FontDescriptor = "Sans inf".parse().unwrap();
        assert_eq!(font.pixel_size, DEFAULT_PIXEL_SIZE);
        let font: FontDescriptor = "Sans:NaN".parse().unwrap();
        assert_eq!(font.pixel_size, DEFAULT_PIXEL_SIZE);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "".parse::<FontDescriptor>(),
            Err(OsdError::FontNotFound { .. })
        ));
        assert!("Sans:big".parse::<FontDescriptor>().is_err());
        assert!("-x".parse::<FontDescriptor>().is_err());
    }
}
