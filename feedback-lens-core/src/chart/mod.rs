pub mod canvas;
pub mod glyphs;

use canvas::{fit_text, glyph_height, Canvas};
use feedback_lens_common::{ChartConfig, FeedbackLensError, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
}

/// A named dataset in a grouped bar chart; one value per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// A single dataset (`values`, coloured per bar) or, when `series` is non-empty,
/// grouped bars with one colour and legend entry per series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub kind: ChartKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<ChartSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
}

impl ChartSpec {
    pub fn bar(title: &str, labels: Vec<String>, values: Vec<f64>) -> Self {
        Self {
            title: title.to_owned(),
            labels,
            values,
            kind: ChartKind::Bar,
            series: Vec::new(),
            y_label: None,
        }
    }

    pub fn grouped(title: &str, labels: Vec<String>, series: Vec<ChartSeries>) -> Self {
        Self {
            series,
            ..Self::bar(title, labels, Vec::new())
        }
    }

    pub fn with_y_label(mut self, label: &str) -> Self {
        self.y_label = Some(label.to_owned());
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.series.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_grouped() {
            return check_values(&self.labels, &self.values, &self.title);
        }
        if !self.values.is_empty() {
            return Err(FeedbackLensError::ChartSpec(
                "grouped chart also carries top-level values".into(),
            ));
        }
        for s in &self.series {
            check_values(&self.labels, &s.values, &s.name)?;
        }
        Ok(())
    }

    fn all_values(&self) -> Vec<f64> {
        if self.is_grouped() {
            self.series.iter().flat_map(|s| s.values.iter().copied()).collect()
        } else {
            self.values.clone()
        }
    }

    fn legend_entries(&self) -> Vec<&str> {
        if self.is_grouped() {
            self.series.iter().map(|s| s.name.as_str()).collect()
        } else {
            vec![self.title.as_str()]
        }
    }
}

fn check_values(labels: &[String], values: &[f64], dataset: &str) -> Result<()> {
    if labels.len() != values.len() {
        return Err(FeedbackLensError::ChartSpec(format!(
            "{} labels but {} values in '{dataset}'",
            labels.len(),
            values.len()
        )));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(FeedbackLensError::ChartSpec(format!(
            "value for '{}' is not finite",
            labels[i]
        )));
    }
    Ok(())
}

/// Fill (alpha 0.8) and stroke colours; series entry `i` uses `PALETTE[i % 5]`.
pub const PALETTE: [(Rgba<u8>, Rgba<u8>); 5] = [
    (Rgba([255, 99, 132, 204]), Rgba([255, 99, 132, 255])),
    (Rgba([54, 162, 235, 204]), Rgba([54, 162, 235, 255])),
    (Rgba([255, 206, 86, 204]), Rgba([255, 206, 86, 255])),
    (Rgba([75, 192, 192, 204]), Rgba([75, 192, 192, 255])),
    (Rgba([153, 102, 255, 204]), Rgba([153, 102, 255, 255])),
];

pub fn palette_at(i: usize) -> (Rgba<u8>, Rgba<u8>) {
    PALETTE[i % PALETTE.len()]
}

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([64, 64, 64, 255]);
const AXIS: Rgba<u8> = Rgba([120, 120, 120, 255]);
const GRID: Rgba<u8> = Rgba([229, 229, 229, 255]);

const MIN_WIDTH: u32 = 160;
const MIN_HEIGHT: u32 = 140;

pub struct ChartRenderer {
    width: u32,
    height: u32,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new(600, 400)
    }
}

impl ChartRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_config(cfg: &ChartConfig) -> Self {
        Self::new(cfg.width, cfg.height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// PNG-encoded chart.
    pub fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>> {
        let img = self.render_image(spec)?;
        encode_png(&img)
    }

    pub fn render_image(&self, spec: &ChartSpec) -> Result<RgbaImage> {
        spec.validate()?;
        if self.width < MIN_WIDTH || self.height < MIN_HEIGHT {
            return Err(FeedbackLensError::Render(format!(
                "canvas {}x{} is below the {MIN_WIDTH}x{MIN_HEIGHT} minimum",
                self.width, self.height
            )));
        }
        let mut canvas = Canvas::new(self.width, self.height, BACKGROUND);
        let w = self.width as i64;

        // title
        let title = fit_text(&spec.title, self.width - 20, 2);
        canvas.text_centered(w / 2, 10, &title, 2, INK);

        draw_legend(&mut canvas, &spec.legend_entries(), self.width);

        let plot = PlotArea {
            left: 56,
            right: w - 20,
            top: 60,
            bottom: self.height as i64 - 36,
        };
        let axis = YAxis::fit(&spec.all_values());
        draw_axes(&mut canvas, &plot, &axis);
        if let Some(label) = &spec.y_label {
            let text = fit_text(label, plot.left as u32 + 100, 1);
            canvas.text(4, plot.top - 12, &text, 1, INK);
        }
        match spec.kind {
            _ if spec.is_grouped() => draw_grouped_bars(&mut canvas, &plot, &axis, spec),
            ChartKind::Bar => draw_bars(&mut canvas, &plot, &axis, spec),
            ChartKind::Line => draw_line(&mut canvas, &plot, &axis, spec),
        }
        draw_x_labels(&mut canvas, &plot, &spec.labels);
        Ok(canvas.into_image())
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .map_err(|e| FeedbackLensError::Render(format!("png encoding failed: {e}")))?;
    Ok(buf)
}

struct PlotArea {
    left: i64,
    right: i64,
    top: i64,
    bottom: i64,
}

impl PlotArea {
    fn width(&self) -> i64 {
        self.right - self.left
    }
}

/// Linear value axis; always spans zero.
struct YAxis {
    lo: f64,
    hi: f64,
    step: f64,
}

impl YAxis {
    fn fit(values: &[f64]) -> Self {
        let lo = values.iter().copied().fold(0.0_f64, f64::min);
        let hi = values.iter().copied().fold(0.0_f64, f64::max);
        let span = if hi > lo { hi - lo } else { 1.0 };
        let step = nice_step(span / 5.0);
        Self {
            lo: (lo / step).floor() * step,
            hi: ((hi / step).ceil() * step).max(lo + step),
            step,
        }
    }

    fn to_px(&self, v: f64, plot: &PlotArea) -> i64 {
        let frac = (v - self.lo) / (self.hi - self.lo);
        plot.bottom - (frac * (plot.bottom - plot.top) as f64).round() as i64
    }

    fn ticks(&self) -> Vec<f64> {
        let n = ((self.hi - self.lo) / self.step).round() as usize;
        (0..=n).map(|i| self.lo + i as f64 * self.step).collect()
    }
}

// 1, 2 or 5 times a power of ten
fn nice_step(raw: f64) -> f64 {
    let mag = 10f64.powf(raw.log10().floor());
    let norm = raw / mag;
    let nice = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * mag
}

fn format_tick(v: f64, step: f64) -> String {
    if step.fract() == 0.0 {
        format!("{}", v.round() as i64)
    } else {
        let decimals = (-step.log10().floor()).max(1.0) as usize;
        format!("{v:.decimals$}")
    }
}

fn draw_axes(canvas: &mut Canvas, plot: &PlotArea, axis: &YAxis) {
    for tick in axis.ticks() {
        let y = axis.to_px(tick, plot);
        canvas.line(plot.left, y, plot.right, y, GRID);
        let label = format_tick(tick, axis.step);
        canvas.text_right(plot.left - 6, y - glyph_height(1) as i64 / 2, &label, 1, INK);
    }
    canvas.line(plot.left, plot.top, plot.left, plot.bottom, AXIS);
    let zero = axis.to_px(0.0, plot);
    canvas.line(plot.left, zero, plot.right, zero, AXIS);
}

fn slot_width(plot: &PlotArea, n: usize) -> f64 {
    plot.width() as f64 / n.max(1) as f64
}

fn draw_bars(canvas: &mut Canvas, plot: &PlotArea, axis: &YAxis, spec: &ChartSpec) {
    let slot = slot_width(plot, spec.values.len());
    let bar = (slot * 0.72).max(1.0);
    let zero = axis.to_px(0.0, plot);
    for (i, v) in spec.values.iter().enumerate() {
        let (fill, stroke) = palette_at(i);
        let x0 = plot.left + (i as f64 * slot + (slot - bar) / 2.0).round() as i64;
        let x1 = x0 + bar.round() as i64;
        let y = axis.to_px(*v, plot);
        canvas.fill_rect(x0, y, x1, zero, fill);
        canvas.stroke_rect(x0, y.min(zero), x1, y.max(zero), stroke);
    }
}

// share of a label's slot taken by its group of bars
const GROUP_SHARE: f64 = 0.8;

fn draw_grouped_bars(canvas: &mut Canvas, plot: &PlotArea, axis: &YAxis, spec: &ChartSpec) {
    let slot = slot_width(plot, spec.labels.len());
    let group = slot * GROUP_SHARE;
    let bar = group / spec.series.len() as f64;
    let zero = axis.to_px(0.0, plot);
    for (s, series) in spec.series.iter().enumerate() {
        let (fill, stroke) = palette_at(s);
        for (i, v) in series.values.iter().enumerate() {
            let start = i as f64 * slot + (slot - group) / 2.0;
            let x0 = plot.left + (start + s as f64 * bar).round() as i64;
            let x1 = (plot.left + (start + (s + 1) as f64 * bar).round() as i64 - 1).max(x0);
            let y = axis.to_px(*v, plot);
            canvas.fill_rect(x0, y, x1, zero, fill);
            canvas.stroke_rect(x0, y.min(zero), x1, y.max(zero), stroke);

            let label = format_tick(*v, 1.0);
            if glyphs::text_width(&label, 1) as i64 <= x1 - x0 + 4 {
                let top = y.min(zero) - glyph_height(1) as i64 - 2;
                canvas.text_centered((x0 + x1) / 2, top, &label, 1, INK);
            }
        }
    }
}

fn draw_line(canvas: &mut Canvas, plot: &PlotArea, axis: &YAxis, spec: &ChartSpec) {
    let slot = slot_width(plot, spec.values.len());
    let points: Vec<(i64, i64)> = spec
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = plot.left + ((i as f64 + 0.5) * slot).round() as i64;
            (x, axis.to_px(*v, plot))
        })
        .collect();
    let (_, stroke) = palette_at(0);
    for pair in points.windows(2) {
        canvas.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, stroke);
    }
    for (i, (x, y)) in points.iter().enumerate() {
        let (fill, stroke) = palette_at(i);
        canvas.fill_rect(x - 3, y - 3, x + 4, y + 4, fill);
        canvas.stroke_rect(x - 3, y - 3, x + 3, y + 3, stroke);
    }
}

const SWATCH_W: i64 = 30;
const LEGEND_GAP: i64 = 12;

/// Centred row of swatch + label pairs; entry `i` uses `palette_at(i)`.
fn draw_legend(canvas: &mut Canvas, entries: &[&str], width: u32) {
    let max_label = (width / 2 / entries.len().max(1) as u32).max(12);
    let labels: Vec<String> = entries.iter().map(|e| fit_text(e, max_label, 1)).collect();
    let widths: Vec<i64> = labels
        .iter()
        .map(|l| SWATCH_W + 6 + glyphs::text_width(l, 1) as i64)
        .collect();
    let total = widths.iter().sum::<i64>() + LEGEND_GAP * (widths.len() as i64 - 1).max(0);
    let mut lx = width as i64 / 2 - total / 2;
    for (i, (label, entry_w)) in labels.iter().zip(&widths).enumerate() {
        let (fill, stroke) = palette_at(i);
        canvas.fill_rect(lx, 34, lx + SWATCH_W, 44, fill);
        canvas.stroke_rect(lx, 34, lx + SWATCH_W, 44, stroke);
        canvas.text(lx + SWATCH_W + 6, 36, label, 1, INK);
        lx += entry_w + LEGEND_GAP;
    }
}

fn draw_x_labels(canvas: &mut Canvas, plot: &PlotArea, labels: &[String]) {
    if labels.is_empty() {
        return;
    }
    let slot = slot_width(plot, labels.len());
    let max_px = (slot - 4.0).max(0.0) as u32;
    let y = plot.bottom + 8;
    for (i, label) in labels.iter().enumerate() {
        let text = fit_text(label, max_px, 1);
        if text.is_empty() {
            continue;
        }
        let cx = plot.left + ((i as f64 + 0.5) * slot).round() as i64;
        canvas.text_centered(cx, y, &text, 1, INK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept() -> ChartSpec {
        ChartSpec::bar("Dept", vec!["X".into(), "Y".into()], vec![2.0, 1.0])
    }

    #[test]
    fn renders_png_of_fixed_size() {
        let png = ChartRenderer::default().render(&dept()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (600, 400));
    }

    #[test]
    fn length_mismatch_is_spec_error() {
        let spec = ChartSpec::bar("Dept", vec!["X".into(), "Y".into()], vec![2.0]);
        assert!(matches!(
            ChartRenderer::default().render(&spec),
            Err(FeedbackLensError::ChartSpec(_))
        ));
    }

    #[test]
    fn non_finite_is_spec_error() {
        let spec = ChartSpec::bar("Dept", vec!["X".into()], vec![f64::NAN]);
        assert!(matches!(spec.validate(), Err(FeedbackLensError::ChartSpec(_))));
    }

    #[test]
    fn bars_use_palette_in_order() {
        let img = ChartRenderer::default().render_image(&dept()).unwrap();
        // plot spans x 56..580; two slots of 262px, bars centred in each
        let first = img.get_pixel(56 + 131, 300);
        let second = img.get_pixel(56 + 262 + 131, 360);
        let blend = |c: u8| ((c as u32 * 204 + 255 * 51) / 255) as u8;
        assert_eq!(first[0], blend(255));
        assert_eq!(first[2], blend(132));
        assert_eq!(second[0], blend(54));
        assert_eq!(second[1], blend(162));
    }

    fn two_questions() -> ChartSpec {
        let series = [("4", [3.0, 1.0]), ("3", [1.0, 2.0]), ("2", [0.0, 1.0]), ("1", [0.0, 0.0])]
            .into_iter()
            .map(|(name, values)| ChartSeries { name: name.into(), values: values.to_vec() })
            .collect();
        ChartSpec::grouped("Faculty Ratings - Overall", vec!["Pace".into(), "Clarity".into()], series)
            .with_y_label("No. of Responses")
    }

    #[test]
    fn grouped_bars_take_one_colour_per_series() {
        let img = ChartRenderer::default().render_image(&two_questions()).unwrap();
        // slot 262px, group 209.6px, four bars of 52.4px starting at x 82
        let blend = |c: u8| ((c as u32 * 204 + 255 * 51) / 255) as u8;
        let score_4 = img.get_pixel(108, 340);
        let score_3 = img.get_pixel(160, 340);
        assert_eq!((score_4[0], score_4[2]), (blend(255), blend(132)));
        assert_eq!((score_3[0], score_3[1]), (blend(54), blend(162)));
        // same series in the next group keeps its colour
        let clarity_3 = img.get_pixel(56 + 262 + 104, 340);
        assert_eq!((clarity_3[0], clarity_3[1]), (blend(54), blend(162)));
    }

    #[test]
    fn grouped_series_must_match_labels() {
        let mut spec = two_questions();
        spec.series[2].values.pop();
        assert!(matches!(spec.validate(), Err(FeedbackLensError::ChartSpec(_))));
        let mut spec = two_questions();
        spec.values = vec![1.0, 2.0];
        assert!(matches!(spec.validate(), Err(FeedbackLensError::ChartSpec(_))));
    }

    #[test]
    fn grouped_spec_json_round_trip() {
        let spec = two_questions();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<ChartSpec>(&json).unwrap(), spec);
        let plain: ChartSpec =
            serde_json::from_str(r#"{"title":"t","labels":["a"],"values":[1]}"#).unwrap();
        assert!(!plain.is_grouped());
        assert_eq!(plain.y_label, None);
    }

    #[test]
    fn deterministic_output() {
        let r = ChartRenderer::default();
        assert_eq!(r.render(&dept()).unwrap(), r.render(&dept()).unwrap());
    }

    #[test]
    fn empty_and_negative_series_render() {
        let r = ChartRenderer::default();
        r.render(&ChartSpec::bar("Empty", vec![], vec![])).unwrap();
        let mut spec = ChartSpec::bar("Mixed", vec!["a".into(), "b".into()], vec![-3.0, 4.5]);
        r.render(&spec).unwrap();
        spec.kind = ChartKind::Line;
        r.render(&spec).unwrap();
    }

    #[test]
    fn many_labels_do_not_fail() {
        let labels: Vec<String> = (0..300).map(|i| format!("label number {i}")).collect();
        let values = (0..300).map(|i| i as f64).collect();
        ChartRenderer::default()
            .render(&ChartSpec::bar("Wide", labels, values))
            .unwrap();
    }

    #[test]
    fn tiny_canvas_is_render_error() {
        assert!(matches!(
            ChartRenderer::new(10, 10).render(&dept()),
            Err(FeedbackLensError::Render(_))
        ));
    }

    #[test]
    fn axis_includes_zero() {
        let axis = YAxis::fit(&[3.0, 7.0]);
        assert_eq!(axis.lo, 0.0);
        assert!(axis.hi >= 7.0);
        let axis = YAxis::fit(&[]);
        assert_eq!((axis.lo, axis.hi), (0.0, axis.step));
    }

    #[test]
    fn nice_steps() {
        assert_eq!(nice_step(0.4), 0.5);
        assert_eq!(nice_step(1.4), 2.0);
        assert_eq!(nice_step(30.0), 50.0);
    }
}
