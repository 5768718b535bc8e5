//! Colour values and colour-name parsing
//!
//! Numeric forms (`#RGB`, `#RRGGBB`, `#RRRRGGGGBBBB`, `rgb:r/g/b`) are parsed
//! locally. Anything else is a name that must be resolved by the host's
//! colour database (see [`Surface::lookup_colour`](crate::platform::Surface::lookup_colour)).

use tiny_skia::Color;

/// An opaque 8-bit-per-channel colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to tiny_skia Color (fully opaque)
    #[inline]
    pub fn to_color(self) -> Color {
        Color::from_rgba8(self.r, self.g, self.b, 255)
    }

    /// Build from 16-bit channels as returned by X colour lookups
    pub fn from_u16(r: u16, g: u16, b: u16) -> Self {
        Self::new((r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8)
    }
}

/// Scale a hex field of 1-4 digits to 8 bits
fn scale_hex(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    let max = (1u32 << (4 * digits.len())) - 1;
    Some(((value * 255 + max / 2) / max) as u8)
}

/// Parse a numeric colour specification
///
/// Returns `None` for names, which need the host database.
pub fn parse_numeric(spec: &str) -> Option<Rgb> {
    let spec = spec.trim();

    if let Some(hex) = spec.strip_prefix('#') {
        if hex.is_empty() || hex.len() % 3 != 0 || hex.len() > 12 {
            return None;
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        // "#RGB" style fields are the most significant bits, not scaled
        let n = hex.len() / 3;
        let field = |i: usize| -> Option<u8> {
            let digits = &hex[i * n..(i + 1) * n];
            let value = u32::from_str_radix(digits, 16).ok()?;
            Some(match n {
                1 => (value << 4) as u8,
                2 => value as u8,
                _ => (value >> (4 * (n - 2))) as u8,
            })
        };
        return Some(Rgb::new(field(0)?, field(1)?, field(2)?));
    }

    let lower = spec.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("rgb:") {
        let mut parts = rest.split('/');
        let r = scale_hex(parts.next()?)?;
        let g = scale_hex(parts.next()?)?;
        let b = scale_hex(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        return Some(Rgb::new(r, g, b));
    }

    None
}

/// Small table of common colour names for hosts without a colour database
const BUILTIN_NAMES: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("orange", Rgb::new(255, 165, 0)),
    ("violet", Rgb::new(238, 130, 238)),
    ("gray", Rgb::new(190, 190, 190)),
    ("grey", Rgb::new(190, 190, 190)),
    ("lawngreen", Rgb::new(124, 252, 0)),
    ("navy", Rgb::new(0, 0, 128)),
    ("purple", Rgb::new(160, 32, 240)),
];

/// Resolve a colour name against the built-in table
///
/// Matching ignores case and spaces, like the X colour database does.
pub fn builtin(name: &str) -> Option<Rgb> {
    let key: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    BUILTIN_NAMES
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, rgb)| *rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_numeric("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(parse_numeric("#F80"), Some(Rgb::new(0xf0, 0x80, 0x00)));
        assert_eq!(parse_numeric("#ffff80000000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(parse_numeric(" #000000 "), Some(Rgb::BLACK));
    }

    #[test]
    fn test_parse_rgb_form() {
        assert_eq!(parse_numeric("rgb:ff/80/00"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(parse_numeric("RGB:f/0/f"), Some(Rgb::new(255, 0, 255)));
        assert_eq!(parse_numeric("rgb:ffff/0/8000"), Some(Rgb::new(255, 0, 128)));
    }

    #[test]
    fn test_reject_malformed() {
        assert_eq!(parse_numeric("#12345"), None);
        assert_eq!(parse_numeric("#gg0000"), None);
        assert_eq!(parse_numeric("rgb:1/2"), None);
        assert_eq!(parse_numeric("rgb:1/2/3/4"), None);
        assert_eq!(parse_numeric("red"), None);
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(builtin("Red"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(builtin("Lawn Green"), Some(Rgb::new(124, 252, 0)));
        assert_eq!(builtin("no-such-colour"), None);
    }

    #[test]
    fn test_from_u16_takes_high_byte() {
        assert_eq!(Rgb::from_u16(0xffff, 0x8000, 0x00ff), Rgb::new(255, 128, 0));
    }
}
