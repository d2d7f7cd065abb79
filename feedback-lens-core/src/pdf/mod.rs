//! Page layout model and a top-down flow builder over it.
//!
//! Coordinates are in points with the origin at the top-left corner of the page; the
//! writer flips them into PDF user space when serializing.

pub mod metrics;
pub mod writer;

use feedback_lens_common::{FeedbackLensError, ReportLayoutConfig, Result};
use image::RgbImage;

pub use metrics::{text_width, truncate_to_width, wrap_text};
pub use writer::write_pdf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub font: Font,
    pub size: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub image: RgbImage,
}

#[derive(Debug, Clone)]
pub enum Element {
    Text(TextRun),
    Rect(Rect),
    Image(Placement),
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub elements: Vec<Element>,
}

impl Page {
    pub fn texts(&self) -> impl Iterator<Item = &TextRun> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text(t) => Some(t),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DocumentLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub title: String,
    pub pages: Vec<Page>,
}

impl DocumentLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Every text run, page by page, in drawing order.
    pub fn text_lines(&self) -> Vec<&str> {
        self.pages
            .iter()
            .flat_map(|p| p.texts())
            .map(|t| t.text.as_str())
            .collect()
    }

    pub fn image_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| &p.elements)
            .filter(|e| matches!(e, Element::Image(_)))
            .count()
    }
}

/// Rough equivalent of a PDF text-flow cursor: writes lines downward and breaks pages.
pub struct PageFlow {
    layout: DocumentLayout,
    margin: f32,
    cursor: f32,
    font: Font,
    size: f32,
}

const LINE_HEIGHT: f32 = 1.16;

impl PageFlow {
    pub fn new(cfg: &ReportLayoutConfig, title: &str) -> Result<Self> {
        let content_w = cfg.page_width - 2.0 * cfg.margin;
        let content_h = cfg.page_height - 2.0 * cfg.margin;
        if !(content_w > 0.0 && content_h > 0.0) {
            return Err(FeedbackLensError::Layout(format!(
                "page {}x{} leaves no room inside {}pt margins",
                cfg.page_width, cfg.page_height, cfg.margin
            )));
        }
        Ok(Self {
            layout: DocumentLayout {
                page_width: cfg.page_width,
                page_height: cfg.page_height,
                title: title.to_owned(),
                pages: vec![Page::default()],
            },
            margin: cfg.margin,
            cursor: cfg.margin,
            font: Font::Regular,
            size: 12.0,
        })
    }

    pub fn page_width(&self) -> f32 {
        self.layout.page_width
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn content_width(&self) -> f32 {
        self.layout.page_width - 2.0 * self.margin
    }

    pub fn bottom(&self) -> f32 {
        self.layout.page_height - self.margin
    }

    pub fn y(&self) -> f32 {
        self.cursor
    }

    pub fn set_y(&mut self, y: f32) {
        self.cursor = y;
    }

    pub fn font(&mut self, font: Font, size: f32) -> &mut Self {
        self.font = font;
        self.size = size;
        self
    }

    pub fn current_font(&self) -> (Font, f32) {
        (self.font, self.size)
    }

    pub fn line_height(&self) -> f32 {
        self.size * LINE_HEIGHT
    }

    pub fn move_down(&mut self, lines: f32) -> &mut Self {
        self.cursor += lines * self.line_height();
        self
    }

    pub fn new_page(&mut self) -> &mut Self {
        self.layout.pages.push(Page::default());
        self.cursor = self.margin;
        self
    }

    /// Break to a new page unless `height` more points fit above the bottom margin.
    pub fn ensure_space(&mut self, height: f32) -> &mut Self {
        if self.cursor + height > self.bottom() && self.cursor > self.margin {
            self.new_page();
        }
        self
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.text_aligned(text, Align::Left)
    }

    /// Wrapped paragraph at the cursor.
    pub fn text_aligned(&mut self, text: &str, align: Align) -> &mut Self {
        let clean = sanitize_text(text);
        let width = self.content_width();
        for line in wrap_text(&clean, self.font, self.size, width) {
            self.ensure_space(self.line_height());
            let x = match align {
                Align::Left => self.margin,
                Align::Center => {
                    self.margin + (width - text_width(&line, self.font, self.size)).max(0.0) / 2.0
                }
            };
            self.push_text(x, self.cursor, line);
            self.cursor += self.line_height();
        }
        self
    }

    /// Single line clipped to `width`, at an absolute position; the cursor does not move.
    pub fn text_at(&mut self, x: f32, y: f32, width: f32, text: &str) -> &mut Self {
        // one line per cell: line breaks become spaces
        let clean = sanitize_text(text).lines().collect::<Vec<_>>().join(" ");
        let fitted = truncate_to_width(&clean, self.font, self.size, width);
        if !fitted.is_empty() {
            self.push_text(x, y, fitted);
        }
        self
    }

    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        self.current_page().elements.push(Element::Rect(Rect {
            x,
            y,
            width,
            height,
        }));
        self
    }

    /// Image scaled to `width`, placed at the cursor.
    pub fn image(&mut self, image: RgbImage, width: f32) -> &mut Self {
        let aspect = image.height() as f32 / image.width().max(1) as f32;
        let height = width * aspect;
        self.ensure_space(height);
        let placement = Placement {
            x: self.margin,
            y: self.cursor,
            width,
            height,
            image,
        };
        self.current_page().elements.push(Element::Image(placement));
        self.cursor += height;
        self
    }

    pub fn finish(self) -> DocumentLayout {
        self.layout
    }

    fn push_text(&mut self, x: f32, y: f32, text: String) {
        let run = TextRun {
            x,
            y,
            font: self.font,
            size: self.size,
            text,
        };
        self.current_page().elements.push(Element::Text(run));
    }

    fn current_page(&mut self) -> &mut Page {
        if self.layout.pages.is_empty() {
            self.layout.pages.push(Page::default());
        }
        let last = self.layout.pages.len() - 1;
        &mut self.layout.pages[last]
    }
}

/// Map typographic punctuation to ASCII and anything outside Latin-1 to '?'.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{00A0}' => out.push(' '),
            '\u{2022}' => out.push('-'),
            '\u{2192}' => out.push_str("->"),
            '\t' => out.push(' '),
            '\r' => {}
            c if (c as u32) < 0x20 && c != '\n' => {}
            c if (c as u32) <= 0xFF => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> PageFlow {
        PageFlow::new(&ReportLayoutConfig::default(), "t").unwrap()
    }

    #[test]
    fn sanitize_maps_typography() {
        assert_eq!(sanitize_text("\u{201C}ok\u{201D} \u{2013} it\u{2019}s"), "\"ok\" - it's");
        assert_eq!(sanitize_text("caf\u{e9} \u{4e2d}"), "caf\u{e9} ?");
        assert_eq!(sanitize_text("a\tb\r\n"), "a b\n");
    }

    #[test]
    fn text_advances_cursor_and_breaks_pages() {
        let mut f = flow();
        f.font(Font::Regular, 12.0);
        for i in 0..100 {
            f.text(&format!("line {i}"));
        }
        let layout = f.finish();
        assert!(layout.page_count() > 1);
        assert_eq!(layout.text_lines().len(), 100);
        for page in &layout.pages {
            for t in page.texts() {
                assert!(t.y + t.size <= 792.0 - 50.0 + 0.01);
            }
        }
    }

    #[test]
    fn centered_text_is_centered() {
        let mut f = flow();
        f.font(Font::Bold, 24.0).text_aligned("Title", Align::Center);
        let layout = f.finish();
        let run = layout.pages[0].texts().next().unwrap();
        let w = text_width("Title", Font::Bold, 24.0);
        assert!((run.x + w / 2.0 - 306.0).abs() < 0.01);
    }

    #[test]
    fn degenerate_page_is_layout_error() {
        let cfg = ReportLayoutConfig {
            margin: 400.0,
            ..ReportLayoutConfig::default()
        };
        assert!(matches!(
            PageFlow::new(&cfg, "t"),
            Err(FeedbackLensError::Layout(_))
        ));
    }

    #[test]
    fn text_at_clips_without_moving() {
        let mut f = flow();
        let before = f.y();
        f.font(Font::Regular, 8.0)
            .text_at(50.0, 100.0, 20.0, "a value far too wide for the column");
        assert_eq!(f.y(), before);
        let layout = f.finish();
        assert!(layout.text_lines()[0].ends_with("..."));
    }

    #[test]
    fn text_at_flattens_line_breaks() {
        let mut f = flow();
        f.font(Font::Regular, 10.0)
            .text_at(50.0, 100.0, 400.0, "first line\nsecond\r\nthird");
        assert_eq!(f.finish().text_lines(), ["first line second third"]);
    }
}
