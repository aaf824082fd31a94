//! Raster plots written alongside the heatmaps.
//!
//! Line plots of spectra (rejected pixels, average spectrum) and bar
//! histograms of per-pixel statistics, drawn straight onto an `RgbImage`
//! with a built-in bitmap font.

use image::{Rgb, RgbImage};

const PLOT_WIDTH: u32 = 800;
const PLOT_HEIGHT: u32 = 500;
const MARGIN_LEFT: u32 = 80;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 50;
const MARGIN_BOTTOM: u32 = 70;
const TEXT_SCALE: u32 = 2;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER: Rgb<u8> = Rgb([100, 100, 110]);
const GRID: Rgb<u8> = Rgb([230, 230, 235]);
const TRACE: Rgb<u8> = Rgb([26, 58, 107]);
const BAR: Rgb<u8> = Rgb([31, 119, 180]);
const TEXT: Rgb<u8> = Rgb([20, 20, 20]);

/// Equal-width bins over `[min, max]`, last bin closed
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `counts.len() + 1` bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// `None` when there are no finite values or `bins` is 0.
    ///
    /// A single distinct value is spread over `[v - 0.5, v + 0.5]`.
    pub fn from_values(values: &[f64], bins: usize) -> Option<Self> {
        let finite: Vec<f64> = values.iter().cloned().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || bins == 0 {
            return None;
        }
        let mut lo = finite.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut hi = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();

        let mut counts = vec![0; bins];
        for v in finite {
            let bin = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Some(Self { edges, counts })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }
}

/// Plot area in image coordinates
#[derive(Debug, Clone, Copy)]
struct Frame {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Frame {
    fn standard() -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: PLOT_WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            height: PLOT_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn bottom(&self) -> u32 {
        self.top + self.height
    }

    fn right(&self) -> u32 {
        self.left + self.width
    }

    /// Image point for a position given as fractions of the plot area
    fn point(&self, fx: f64, fy: f64) -> (i32, i32) {
        (
            self.left as i32 + (fx.clamp(0.0, 1.0) * self.width as f64) as i32,
            self.top as i32 + ((1.0 - fy).clamp(0.0, 1.0) * self.height as f64) as i32,
        )
    }
}

/// 3x5 glyphs, one octal digit per row, top row first
const FONT: &[(char, u16)] = &[
    ('0', 0o75557),
    ('1', 0o26227),
    ('2', 0o71747),
    ('3', 0o71717),
    ('4', 0o55711),
    ('5', 0o74717),
    ('6', 0o74757),
    ('7', 0o71222),
    ('8', 0o75757),
    ('9', 0o75717),
    ('.', 0o00002),
    ('-', 0o00700),
    ('+', 0o02720),
    ('^', 0o25000),
    ('(', 0o24442),
    (')', 0o21112),
    ('/', 0o11244),
    (':', 0o02020),
    ('_', 0o00007),
    (' ', 0o00000),
    ('A', 0o25755),
    ('B', 0o65656),
    ('C', 0o34443),
    ('D', 0o65556),
    ('E', 0o74647),
    ('F', 0o74644),
    ('G', 0o34553),
    ('H', 0o55755),
    ('I', 0o72227),
    ('J', 0o11152),
    ('K', 0o56465),
    ('L', 0o44447),
    ('M', 0o57755),
    ('N', 0o65555),
    ('O', 0o25552),
    ('P', 0o65644),
    ('Q', 0o25563),
    ('R', 0o65655),
    ('S', 0o34216),
    ('T', 0o72222),
    ('U', 0o55557),
    ('V', 0o55552),
    ('W', 0o55775),
    ('X', 0o55255),
    ('Y', 0o55222),
    ('Z', 0o71247),
];

/// Shown for characters the font lacks
const UNKNOWN_GLYPH: u16 = 0o00200;

fn glyph_bits(c: char) -> u16 {
    let c = c.to_ascii_uppercase();
    FONT.iter()
        .find(|(g, _)| *g == c)
        .map(|(_, bits)| *bits)
        .unwrap_or(UNKNOWN_GLYPH)
}

/// Glyph advance, one blank column between characters
const ADVANCE: u32 = 4;

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * ADVANCE * scale.max(1)
}

/// An `RgbImage` with clipped drawing primitives
struct Canvas {
    img: RgbImage,
}

impl Canvas {
    fn new() -> Self {
        Self {
            img: RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND),
        }
    }

    fn dot(&mut self, x: i32, y: i32, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Filled rectangle, both corners inclusive
    fn fill(&mut self, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: Rgb<u8>) {
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.dot(x, y, color);
            }
        }
    }

    /// Straight segment, sampled once per pixel along its longer axis
    fn line(&mut self, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: Rgb<u8>) {
        let steps = (x1 - x0).abs().max((y1 - y0).abs());
        if steps == 0 {
            self.dot(x0, y0, color);
            return;
        }
        let dx = (x1 - x0) as f64 / steps as f64;
        let dy = (y1 - y0) as f64 / steps as f64;
        for s in 0..=steps {
            let x = x0 as f64 + dx * s as f64;
            let y = y0 as f64 + dy * s as f64;
            self.dot(x.round() as i32, y.round() as i32, color);
        }
    }

    fn text(&mut self, text: &str, x: u32, y: u32, scale: u32, color: Rgb<u8>) {
        let scale = scale.max(1) as i32;
        let mut origin = x as i32;
        for c in text.chars() {
            let bits = glyph_bits(c);
            for row in 0..5 {
                let pattern = (bits >> (3 * (4 - row))) & 0o7;
                for col in 0..3 {
                    if pattern & (0b100 >> col) != 0 {
                        let px = origin + col * scale;
                        let py = y as i32 + row * scale;
                        self.fill((px, py), (px + scale - 1, py + scale - 1), color);
                    }
                }
            }
            origin += ADVANCE as i32 * scale;
        }
    }

    fn frame(&mut self, frame: &Frame) {
        let (l, t) = (frame.left as i32, frame.top as i32);
        let (r, b) = (frame.right() as i32, frame.bottom() as i32);
        for gi in 1..5 {
            let gy = t + (frame.height * gi / 5) as i32;
            self.fill((l + 1, gy), (r - 1, gy), GRID);
        }
        self.fill((l, t), (r, t), BORDER);
        self.fill((l, b), (r, b), BORDER);
        self.fill((l, t), (l, b), BORDER);
        self.fill((r, t), (r, b), BORDER);
    }

    /// Axis extremes, title and axis labels
    fn labels(&mut self, frame: &Frame, title: &str, axes: (&str, &str), x_range: (f64, f64), y_range: (f64, f64)) {
        let (x_label, y_label) = axes;
        let char_w = ADVANCE * TEXT_SCALE;
        let char_h = 5 * TEXT_SCALE;

        let title_x = PLOT_WIDTH.saturating_sub(text_width(title, TEXT_SCALE + 1)) / 2;
        self.text(title, title_x, 15, TEXT_SCALE + 1, TEXT);

        let tick_y = frame.bottom() + 8;
        self.text(&format!("{:.1}", x_range.0), frame.left, tick_y, TEXT_SCALE, TEXT);
        let hi = format!("{:.1}", x_range.1);
        let hi_x = frame.right().saturating_sub(text_width(&hi, TEXT_SCALE));
        self.text(&hi, hi_x, tick_y, TEXT_SCALE, TEXT);
        let x_label_x = frame.left + frame.width.saturating_sub(text_width(x_label, TEXT_SCALE)) / 2;
        self.text(x_label, x_label_x, tick_y + char_h + 12, TEXT_SCALE, TEXT);

        self.text(&format!("{:.1}", y_range.1), 4, frame.top, TEXT_SCALE, TEXT);
        self.text(&format!("{:.1}", y_range.0), 4, frame.bottom() - char_h, TEXT_SCALE, TEXT);
        // Rotated text is not supported; clip to the left margin instead
        let max_chars = ((frame.left - 8) / char_w) as usize;
        let y_label: String = y_label.chars().take(max_chars).collect();
        self.text(&y_label, 4, frame.top + frame.height / 2 - char_h / 2, TEXT_SCALE, TEXT);
    }
}

const SPECTRUM_AXES: (&str, &str) = ("Wavenumber (cm^-1)", "Intensity");

/// Line plot of `y` against `x`
pub fn render_spectrum(x: &[f64], y: &[f64], title: &str) -> RgbImage {
    let mut canvas = Canvas::new();
    let frame = Frame::standard();
    canvas.frame(&frame);

    let n = x.len().min(y.len());
    if n == 0 {
        canvas.labels(&frame, title, SPECTRUM_AXES, (0.0, 0.0), (0.0, 0.0));
        return canvas.img;
    }

    let x_min = x[..n].iter().cloned().fold(f64::INFINITY, f64::min);
    let x_max = x[..n].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let y_min = y[..n].iter().cloned().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
    let y_max = y[..n].iter().cloned().filter(|v| v.is_finite()).fold(f64::NEG_INFINITY, f64::max);
    let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };
    let y_span = if y_max > y_min { y_max - y_min } else { 1.0 };

    // Non-finite samples break the trace
    let mut prev = None;
    for (&xi, &yi) in x[..n].iter().zip(&y[..n]) {
        if !yi.is_finite() {
            prev = None;
            continue;
        }
        let point = frame.point((xi - x_min) / x_span, (yi - y_min) / y_span);
        if let Some(from) = prev {
            canvas.line(from, point, TRACE);
        }
        prev = Some(point);
    }

    canvas.labels(&frame, title, SPECTRUM_AXES, (x_min, x_max), (y_min.min(y_max), y_max));
    canvas.img
}

/// Bar chart of a histogram, x axis labelled with `unit`
pub fn render_histogram(hist: &Histogram, unit: &str) -> RgbImage {
    let mut canvas = Canvas::new();
    let frame = Frame::standard();
    canvas.frame(&frame);

    let peak = hist.counts.iter().copied().max().unwrap_or(0).max(1);
    let bins = hist.bins().max(1) as f64;
    for (i, &count) in hist.counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let (x0, top) = frame.point(i as f64 / bins, count as f64 / peak as f64);
        let (x1, bottom) = frame.point((i + 1) as f64 / bins, 0.0);
        if x1 - 1 >= x0 + 1 {
            canvas.fill((x0 + 1, top), (x1 - 1, bottom - 1), BAR);
        }
    }

    canvas.labels(&frame, unit, (unit, "Count"), (hist.min(), hist.max()), (0.0, peak as f64));
    canvas.img
}
