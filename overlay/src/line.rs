//! The line buffer: a fixed number of addressable rows
//!
//! Each row holds text, a percentage bar, a slider marker, or nothing.
//! The buffer never grows or shrinks after construction; scrolling moves
//! rows up and blanks the ones it opens at the bottom.

use std::str::FromStr;

use crate::error::{OsdError, Result};

/// Highest value a bar or slider can hold
pub const MAX_VALUE: u8 = 100;

/// What a row displays
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Content {
    #[default]
    Blank,
    Text(String),
    /// Filled bar, 0-100
    Percentage(u8),
    /// Single marker, 0-100
    Slider(u8),
}

/// The kind of a row, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Text,
    Percentage,
    Slider,
}

impl FromStr for LineKind {
    type Err = OsdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blank" => Ok(LineKind::Blank),
            "text" | "string" => Ok(LineKind::Text),
            "percentage" | "percent" => Ok(LineKind::Percentage),
            "slider" => Ok(LineKind::Slider),
            _ => Err(OsdError::UnknownCommand {
                kind: s.to_string(),
            }),
        }
    }
}

/// Clamp an arbitrary value into the 0-100 range
pub fn clamp_value(value: i64) -> u8 {
    value.clamp(0, MAX_VALUE as i64) as u8
}

impl Content {
    /// Text content
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    /// Percentage bar, clamped into 0-100
    pub fn percentage(value: i64) -> Self {
        Content::Percentage(clamp_value(value))
    }

    /// Slider marker, clamped into 0-100
    pub fn slider(value: i64) -> Self {
        Content::Slider(clamp_value(value))
    }

    /// Build content from a textual command and its argument
    ///
    /// Bar payloads must be integers; out-of-range ones are clamped.
    pub fn parse(kind: &str, payload: &str) -> Result<Self> {
        let kind: LineKind = kind.parse()?;
        let value = || {
            payload
                .trim()
                .parse::<i64>()
                .map_err(|_| OsdError::InvalidValue {
                    payload: payload.to_string(),
                })
        };
        Ok(match kind {
            LineKind::Blank => Content::Blank,
            LineKind::Text => Content::text(payload),
            LineKind::Percentage => Content::percentage(value()?),
            LineKind::Slider => Content::slider(value()?),
        })
    }

    pub fn kind(&self) -> LineKind {
        match self {
            Content::Blank => LineKind::Blank,
            Content::Text(_) => LineKind::Text,
            Content::Percentage(_) => LineKind::Percentage,
            Content::Slider(_) => LineKind::Slider,
        }
    }
}

/// One row of the display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    pub content: Content,
    /// Pixel width of the text under the current font (0 for non-text rows)
    pub measured_width: u32,
}

impl Line {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<u8> {
        match self.content {
            Content::Percentage(v) | Content::Slider(v) => Some(v),
            _ => None,
        }
    }

    fn clear(&mut self) {
        *self = Line::default();
    }
}

/// Fixed-length ordered collection of rows
#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: Box<[Line]>,
}

impl LineBuffer {
    pub fn new(count: usize) -> Self {
        Self {
            lines: vec![Line::default(); count].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.lines.len() {
            Ok(())
        } else {
            Err(OsdError::InvalidLine {
                index,
                line_count: self.lines.len(),
            })
        }
    }

    pub fn get(&self, index: usize) -> Result<&Line> {
        self.check(index)?;
        Ok(&self.lines[index])
    }

    /// Replace a row's content; `width` is the measured text width
    ///
    /// Returns the number of `char`s for text (not bytes) and the stored
    /// value for bars.
    pub fn set(&mut self, index: usize, content: Content, width: u32) -> Result<usize> {
        self.check(index)?;
        let content = match content {
            Content::Percentage(v) => Content::Percentage(v.min(MAX_VALUE)),
            Content::Slider(v) => Content::Slider(v.min(MAX_VALUE)),
            other => other,
        };
        let result = match &content {
            Content::Text(text) => text.chars().count(),
            Content::Percentage(v) | Content::Slider(v) => *v as usize,
            Content::Blank => 0,
        };
        let measured_width = if matches!(content, Content::Text(_)) {
            width
        } else {
            0
        };
        self.lines[index] = Line {
            content,
            measured_width,
        };
        Ok(result)
    }

    /// Move every row up by `n`, discarding the first `n` and blanking the last `n`
    pub fn scroll(&mut self, n: usize) -> Result<()> {
        let count = self.lines.len();
        if n == 0 || n > count {
            return Err(OsdError::InvalidScroll {
                lines: n,
                line_count: count,
            });
        }
        self.lines.rotate_left(n);
        for line in &mut self.lines[count - n..] {
            line.clear();
        }
        Ok(())
    }

    /// Recompute every text row's width with a new measuring function
    pub fn remeasure(&mut self, mut measure: impl FnMut(&str) -> u32) {
        for line in self.lines.iter_mut() {
            if let Content::Text(text) = &line.content {
                line.measured_width = measure(text);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(buffer: &LineBuffer) -> Vec<Option<String>> {
        buffer.iter().map(|l| l.text().map(String::from)).collect()
    }

    #[test]
    fn test_set_and_read_back_text() {
        let mut buffer = LineBuffer::new(3);
        assert_eq!(buffer.set(1, Content::text("héllo"), 40).unwrap(), 5);
        let line = buffer.get(1).unwrap();
        assert_eq!(line.text(), Some("héllo"));
        assert_eq!(line.measured_width, 40);

        // Empty string is a valid text value
        assert_eq!(buffer.set(1, Content::text(""), 0).unwrap(), 0);
        assert_eq!(buffer.get(1).unwrap().text(), Some(""));
    }

    #[test]
    fn test_out_of_range_leaves_buffer_untouched() {
        let mut buffer = LineBuffer::new(2);
        buffer.set(0, Content::text("keep"), 10).unwrap();
        let err = buffer.set(2, Content::text("nope"), 10).unwrap_err();
        assert!(matches!(
            err,
            OsdError::InvalidLine {
                index: 2,
                line_count: 2
            }
        ));
        assert_eq!(texts(&buffer), vec![Some("keep".into()), None]);
        assert!(buffer.get(7).is_err());
    }

    #[test]
    fn test_values_are_clamped() {
        assert_eq!(Content::percentage(-5), Content::Percentage(0));
        assert_eq!(Content::percentage(150), Content::Percentage(100));
        assert_eq!(Content::slider(42), Content::Slider(42));

        let mut buffer = LineBuffer::new(1);
        // Direct construction bypasses the helper, the buffer clamps anyway
        assert_eq!(buffer.set(0, Content::Slider(250), 0).unwrap(), 100);
        assert_eq!(buffer.get(0).unwrap().value(), Some(100));
        assert_eq!(buffer.get(0).unwrap().measured_width, 0);
    }

    #[test]
    fn test_scroll_shifts_and_blanks_tail() {
        let mut buffer = LineBuffer::new(5);
        for (i, s) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            buffer.set(i, Content::text(*s), 8).unwrap();
        }
        buffer.scroll(2).unwrap();
        assert_eq!(
            texts(&buffer),
            vec![
                Some("C".into()),
                Some("D".into()),
                Some("E".into()),
                None,
                None
            ]
        );
        assert_eq!(buffer.get(4).unwrap().content, Content::Blank);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_scroll_everything_blanks_buffer() {
        let mut buffer = LineBuffer::new(3);
        buffer.set(0, Content::percentage(30), 0).unwrap();
        buffer.scroll(3).unwrap();
        assert!(buffer.iter().all(|l| l.content == Content::Blank));
    }

    #[test]
    fn test_invalid_scroll_rejected() {
        let mut buffer = LineBuffer::new(3);
        buffer.set(0, Content::text("x"), 1).unwrap();
        assert!(matches!(
            buffer.scroll(0),
            Err(OsdError::InvalidScroll { lines: 0, .. })
        ));
        assert!(matches!(
            buffer.scroll(4),
            Err(OsdError::InvalidScroll { lines: 4, .. })
        ));
        assert_eq!(buffer.get(0).unwrap().text(), Some("x"));
    }

    #[test]
    fn test_parse_content() {
        assert_eq!(
            Content::parse("text", "hi").unwrap(),
            Content::Text("hi".into())
        );
        assert_eq!(
            Content::parse("Percentage", " 120 ").unwrap(),
            Content::Percentage(100)
        );
        assert_eq!(Content::parse("slider", "-3").unwrap(), Content::Slider(0));
        assert_eq!(Content::parse("blank", "").unwrap(), Content::Blank);
        assert!(matches!(
            Content::parse("marquee", "x"),
            Err(OsdError::UnknownCommand { kind }) if kind == "marquee"
        ));
        assert!(matches!(
            Content::parse("percentage", "half"),
            Err(OsdError::InvalidValue { payload }) if payload == "half"
        ));
        assert!(Content::parse("slider", "").is_err());
        // Numbers beyond i64 are not values either
        assert!(Content::parse("slider", "99999999999999999999").is_err());
    }

    #[test]
    fn test_remeasure_only_touches_text() {
        let mut buffer = LineBuffer::new(2);
        buffer.set(0, Content::text("abcd"), 4).unwrap();
        buffer.set(1, Content::percentage(50), 0).unwrap();
        buffer.remeasure(|s| s.len() as u32 * 10);
        assert_eq!(buffer.get(0).unwrap().measured_width, 40);
        assert_eq!(buffer.get(1).unwrap().measured_width, 0);
    }
}
