//! 1-bit visibility mask for the shaped surface
//!
//! A set pixel is part of the visible region; everything else is see-through.
//! The host backend turns the mask into rectangles with [`ShapeMask::rects`].

/// A rectangle of set pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMask {
    width: u32,
    height: u32,
    /// One byte per pixel, 0 or 1
    bits: Vec<u8>,
}

impl ShapeMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Mark a pixel visible; out-of-bounds coordinates are ignored
    #[inline]
    pub fn set(&mut self, x: i32, y: i32) {
        if let Some(i) = self.index(x, y) {
            self.bits[i] = 1;
        }
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some_and(|i| self.bits[i] != 0)
    }

    /// Mark a clipped rectangle visible
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + width as i32).min(self.width as i32);
        let y1 = (y + height as i32).min(self.height as i32);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        for py in y0..y1 {
            let row = py as usize * self.width as usize;
            self.bits[row + x0 as usize..row + x1 as usize].fill(1);
        }
    }

    /// Clear `height` rows starting at `y`
    pub fn clear_rows(&mut self, y: u32, height: u32) {
        let start = (y.min(self.height) as usize) * self.width as usize;
        let end = (y.saturating_add(height).min(self.height) as usize) * self.width as usize;
        self.bits[start..end].fill(0);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Horizontal runs of set pixels in one row as `(start, length)`
    fn row_runs(&self, y: u32) -> Vec<(u32, u32)> {
        let row = &self.bits[(y * self.width) as usize..((y + 1) * self.width) as usize];
        let mut runs = Vec::new();
        let mut start = None;
        for (x, bit) in row.iter().enumerate() {
            match (start, *bit != 0) {
                (None, true) => start = Some(x as u32),
                (Some(s), false) => {
                    runs.push((s, x as u32 - s));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push((s, self.width - s));
        }
        runs
    }

    /// Cover the set pixels with rectangles
    ///
    /// Runs that repeat unchanged on consecutive rows are merged into one
    /// taller rectangle.
    pub fn rects(&self) -> Vec<MaskRect> {
        let mut rects: Vec<MaskRect> = Vec::new();
        // (start, length, index into rects) for the previous row
        let mut open: Vec<(u32, u32, usize)> = Vec::new();

        for y in 0..self.height {
            let mut next_open = Vec::new();
            for (start, len) in self.row_runs(y) {
                let continued = open
                    .iter()
                    .find(|(s, l, _)| *s == start && *l == len)
                    .map(|(_, _, i)| *i);
                match continued {
                    Some(i) => {
                        rects[i].height += 1;
                        next_open.push((start, len, i));
                    }
                    None => {
                        rects.push(MaskRect {
                            x: start as i32,
                            y: y as i32,
                            width: len,
                            height: 1,
                        });
                        next_open.push((start, len, rects.len() - 1));
                    }
                }
            }
            open = next_open;
        }
        rects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clip() {
        let mut mask = ShapeMask::new(4, 3);
        mask.set(1, 1);
        mask.set(-1, 0);
        mask.set(4, 0);
        assert!(mask.get(1, 1));
        assert!(!mask.get(0, 0));
        assert!(!mask.get(9, 9));
    }

    #[test]
    fn test_fill_and_clear_rows() {
        let mut mask = ShapeMask::new(10, 4);
        mask.fill_rect(-2, 1, 5, 10);
        assert!(mask.get(0, 1) && mask.get(2, 3));
        assert!(!mask.get(3, 1));
        assert!(!mask.get(0, 0));

        mask.clear_rows(1, 2);
        assert!(!mask.get(0, 1) && !mask.get(0, 2));
        assert!(mask.get(0, 3));
        mask.clear_rows(3, 100);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_rects_merge_identical_rows() {
        let mut mask = ShapeMask::new(8, 4);
        mask.fill_rect(1, 0, 3, 3);
        mask.set(6, 1);
        mask.fill_rect(0, 3, 8, 1);

        let rects = mask.rects();
        assert_eq!(
            rects,
            vec![
                MaskRect {
                    x: 1,
                    y: 0,
                    width: 3,
                    height: 3
                },
                MaskRect {
                    x: 6,
                    y: 1,
                    width: 1,
                    height: 1
                },
                MaskRect {
                    x: 0,
                    y: 3,
                    width: 8,
                    height: 1
                },
            ]
        );
    }

    #[test]
    fn test_empty_mask_has_no_rects() {
        assert!(ShapeMask::new(5, 5).rects().is_empty());
    }
}
