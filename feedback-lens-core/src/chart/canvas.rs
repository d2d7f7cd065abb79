use super::glyphs::{glyph, text_width, ADVANCE, GLYPH_H, GLYPH_W};
use image::{Rgba, RgbaImage};

/// Bounds-checked drawing surface over an RGBA buffer; out-of-range pixels are dropped.
pub struct Canvas {
    img: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            img: RgbaImage::from_pixel(width, height, background),
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    /// Source-over blend of `color` onto the pixel at (x, y).
    pub fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        let dst = self.img.get_pixel_mut(x as u32, y as u32);
        let a = color[3] as u32;
        if a == 255 {
            *dst = color;
            return;
        }
        for c in 0..3 {
            dst[c] = ((color[c] as u32 * a + dst[c] as u32 * (255 - a)) / 255) as u8;
        }
        dst[3] = (a + dst[3] as u32 * (255 - a) / 255).min(255) as u8;
    }

    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        let (x0, x1) = (x0.min(x1), x0.max(x1));
        let (y0, y1) = (y0.min(y1), y0.max(y1));
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color);
            }
        }
    }

    pub fn stroke_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        self.line(x0, y0, x1, y0, color);
        self.line(x1, y0, x1, y1, color);
        self.line(x1, y1, x0, y1, color);
        self.line(x0, y1, x0, y0, color);
    }

    // Bresenham
    pub fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.blend(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Draw `text` with its top-left corner at (x, y).
    pub fn text(&mut self, x: i64, y: i64, text: &str, scale: u32, color: Rgba<u8>) {
        let s = scale.max(1) as i64;
        let mut pen = x;
        for ch in text.chars() {
            let rows = glyph(ch);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) != 0 {
                        let px = pen + col as i64 * s;
                        let py = y + row as i64 * s;
                        self.fill_rect(px, py, px + s, py + s, color);
                    }
                }
            }
            pen += ADVANCE as i64 * s;
        }
    }

    pub fn text_centered(&mut self, cx: i64, y: i64, text: &str, scale: u32, color: Rgba<u8>) {
        let w = text_width(text, scale) as i64;
        self.text(cx - w / 2, y, text, scale, color);
    }

    pub fn text_right(&mut self, right: i64, y: i64, text: &str, scale: u32, color: Rgba<u8>) {
        let w = text_width(text, scale) as i64;
        self.text(right - w, y, text, scale, color);
    }
}

pub fn glyph_height(scale: u32) -> u32 {
    GLYPH_H * scale.max(1)
}

/// Cut `text` so it fits in `max_px` at `scale`, marking the cut with a trailing '.'.
pub fn fit_text(text: &str, max_px: u32, scale: u32) -> String {
    if text_width(text, scale) <= max_px {
        return text.to_owned();
    }
    let per_char = ADVANCE * scale.max(1);
    let max_chars = ((max_px + scale) / per_char) as usize;
    if max_chars < 2 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut c = Canvas::new(4, 4, WHITE);
        c.fill_rect(-10, -10, 100, 100, BLACK);
        c.line(-5, 2, 50, 2, BLACK);
        c.text(-3, -3, "HELLO", 3, BLACK);
        assert_eq!(*c.into_image().get_pixel(0, 0), BLACK);
    }

    #[test]
    fn half_alpha_blends() {
        let mut c = Canvas::new(1, 1, WHITE);
        c.blend(0, 0, Rgba([0, 0, 0, 128]));
        let px = *c.into_image().get_pixel(0, 0);
        assert!(px[0] > 120 && px[0] < 135);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn fit_text_truncates() {
        assert_eq!(fit_text("ABC", 100, 1), "ABC");
        let cut = fit_text("ABCDEFGHIJ", 30, 1);
        assert!(text_width(&cut, 1) <= 30);
        assert!(cut.ends_with('.'));
        assert_eq!(fit_text("ABCDEFGHIJ", 3, 1), "");
    }
}
