//! Raman map: a rectangular grid of spectra and their per-pixel results.
//!
//! Each spectrum and its [`PixelRecord`] live together in one [`Pixel`], so
//! filtering can only ever flip a record's `present` flag; entries are never
//! removed or reordered. Grid geometry is derived once at construction.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::data::map_file::{self, RawMapData};
use crate::data::material::Material;
use crate::data::spectrum::Spectrum;
use crate::export::StatisticsRow;
use crate::log::run_log::{RunLog, Step};
use crate::pipeline::analysis::{GrapheneAnalysis, PixelAnalysis, PixelStatistics};
use crate::pipeline::numeric::{self, BaselineParams, NumericError};
use crate::render::heatmap::{HeatMap, HeatMapError, HeatMapSettings};
use crate::render::plot::{self, Histogram};

#[derive(Error, Debug)]
pub enum MapError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Inconsistent map data: {0}")]
    Inconsistent(String),
    #[error("Map contains no pixels")]
    EmptyMap,
    #[error("Unknown statistic '{0}'")]
    UnknownStatistic(String),
    #[error("No included pixels for '{0}'")]
    NoIncludedPixels(String),
    #[error("Spectrum processing failed for pixel {pixel}: {source}")]
    Spectrum {
        pixel: usize,
        #[source]
        source: NumericError,
    },
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Per-pixel result entry
#[derive(Debug, Clone, PartialEq)]
pub struct PixelRecord {
    pub x: f64,
    pub y: f64,
    present: bool,
    statistics: PixelStatistics,
}

impl PixelRecord {
    fn new(x: f64, y: f64, names: &[&str]) -> Self {
        Self {
            x,
            y,
            present: true,
            statistics: names.iter().map(|n| (n.to_string(), 0.0)).collect(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Value of a statistic; 0 until the analysis pass writes it
    pub fn statistic(&self, name: &str) -> Option<f64> {
        self.statistics.get(name).copied()
    }

    pub fn statistics(&self) -> &PixelStatistics {
        &self.statistics
    }

    /// Exclusion is one-way
    fn exclude(&mut self) {
        self.present = false;
    }

    fn store(&mut self, stats: PixelStatistics) {
        for (name, value) in stats {
            self.statistics.insert(name, value);
        }
    }
}

/// A spectrum paired with its record
#[derive(Debug, Clone)]
pub struct Pixel {
    spectrum: Spectrum,
    record: PixelRecord,
}

impl Pixel {
    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    pub fn record(&self) -> &PixelRecord {
        &self.record
    }
}

/// Bounding box and raster layout of the stage coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapGeometry {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// 0 when the map has a single column
    pub x_step: f64,
    /// 0 when the map has a single row
    pub y_step: f64,
    pub unique_x: usize,
    pub unique_y: usize,
    /// Physical height / width, or row / column count when either extent is 0
    pub aspect_ratio: f64,
}

fn unique_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted.len()
}

/// `{index}_{snr}.png`, the SNR truncated toward zero
fn rejected_file_name(index: usize, snr: f64) -> String {
    format!("{}_{}.png", index, snr as i64)
}

fn cell_index(coord: f64, min: f64, step: f64) -> usize {
    if step > 0.0 {
        ((coord - min) / step).round().max(0.0) as usize
    } else {
        0
    }
}

impl MapGeometry {
    pub fn from_coordinates(x: &[f64], y: &[f64]) -> Self {
        let min_x = x.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_y = y.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_y = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let unique_x = unique_count(x);
        let unique_y = unique_count(y);

        let width = max_x - min_x;
        let height = max_y - min_y;
        let x_step = if unique_x > 1 { width / (unique_x - 1) as f64 } else { 0.0 };
        let y_step = if unique_y > 1 { height / (unique_y - 1) as f64 } else { 0.0 };
        let aspect_ratio = if width > 0.0 && height > 0.0 {
            height / width
        } else {
            unique_y as f64 / unique_x as f64
        };

        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            x_step,
            y_step,
            unique_x,
            unique_y,
            aspect_ratio,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Raster cell `(column, row)` of a stage coordinate, row 0 at minimum y
    pub fn cell(&self, x: f64, y: f64) -> (usize, usize) {
        (cell_index(x, self.min_x, self.x_step), cell_index(y, self.min_y, self.y_step))
    }
}

/// Counts from one analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalysisSummary {
    pub snr_rejected: usize,
    pub fit_failed: usize,
    pub included: usize,
}

/// A Raman map analysed by strategy `A`
#[derive(Debug)]
pub struct RamanMap<A: PixelAnalysis> {
    material: Arc<Material>,
    analysis: A,
    wavenumbers: Arc<[f64]>,
    pixels: Vec<Pixel>,
    geometry: MapGeometry,
}

pub type GrapheneMap = RamanMap<GrapheneAnalysis>;

impl RamanMap<GrapheneAnalysis> {
    pub fn graphene(data: RawMapData) -> Result<Self, MapError> {
        Self::new(data, Arc::new(Material::graphene()), GrapheneAnalysis::default())
    }
}

impl<A: PixelAnalysis> RamanMap<A> {
    pub fn new(data: RawMapData, material: Arc<Material>, analysis: A) -> Result<Self, MapError> {
        Self::with_baseline(data, material, analysis, &BaselineParams::default())
    }

    pub fn from_file(
        path: &Path,
        material: Arc<Material>,
        analysis: A,
        baseline: &BaselineParams,
    ) -> Result<Self, MapError> {
        let data = map_file::load_map_file(path)?;
        Self::with_baseline(data, material, analysis, baseline)
    }

    /// Build one spectrum and one record per intensity column
    pub fn with_baseline(
        data: RawMapData,
        material: Arc<Material>,
        analysis: A,
        baseline: &BaselineParams,
    ) -> Result<Self, MapError> {
        let RawMapData { wavenumbers, columns, x, y } = RawMapData::new(data.wavenumbers, data.columns, data.x, data.y)?;
        let geometry = MapGeometry::from_coordinates(&x, &y);
        let wavenumbers: Arc<[f64]> = wavenumbers.into();
        let names = analysis.statistic_names();

        let pixels = columns
            .into_iter()
            .enumerate()
            .map(|(i, column)| {
                let spectrum = Spectrum::with_baseline(wavenumbers.clone(), column, material.clone(), baseline)
                    .map_err(|source| MapError::Spectrum { pixel: i, source })?;
                Ok(Pixel {
                    spectrum,
                    record: PixelRecord::new(x[i], y[i], &names),
                })
            })
            .collect::<Result<Vec<_>, MapError>>()?;

        log::info!(
            "Built {} map: {} pixels on a {}x{} grid, {} wavenumbers",
            material.name(),
            pixels.len(),
            geometry.unique_x,
            geometry.unique_y,
            wavenumbers.len()
        );

        Ok(Self {
            material,
            analysis,
            wavenumbers,
            pixels,
            geometry,
        })
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn geometry(&self) -> &MapGeometry {
        &self.geometry
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    pub fn wavenumbers(&self) -> &[f64] {
        &self.wavenumbers
    }

    pub fn included_count(&self) -> usize {
        self.pixels.iter().filter(|p| p.record.present).count()
    }

    pub fn has_statistic(&self, name: &str) -> bool {
        self.analysis.statistic_info(name).is_some()
    }

    // =====================================================================
    //  Filtering and analysis
    // =====================================================================

    /// Exclude every pixel whose SNR is below `threshold`.
    ///
    /// Already excluded pixels stay excluded. When `rejected_dir` is given,
    /// each newly rejected spectrum is plotted to `{index}_{snr}.png` there.
    /// The filter always runs to completion; the first failed plot save is
    /// returned afterwards. Returns the number of newly excluded pixels.
    pub fn filter_low_snr(
        &mut self,
        threshold: f64,
        rejected_dir: Option<&Path>,
        run_log: &mut RunLog,
    ) -> Result<usize, MapError> {
        let mut rejected = 0;
        let mut save_error = None;
        for (i, pixel) in self.pixels.iter_mut().enumerate() {
            if !pixel.record.present || pixel.spectrum.snr() >= threshold {
                continue;
            }
            pixel.record.exclude();
            rejected += 1;
            log::debug!("Pixel {} rejected: SNR {:.2} < {}", i, pixel.spectrum.snr(), threshold);

            if let (Some(dir), None) = (rejected_dir, &save_error) {
                let img = plot::render_spectrum(
                    pixel.spectrum.wavenumbers(),
                    pixel.spectrum.intensities(),
                    &format!("Pixel {} SNR {:.1}", i, pixel.spectrum.snr()),
                );
                let path = dir.join(rejected_file_name(i, pixel.spectrum.snr()));
                match img.save(&path) {
                    Ok(()) => run_log.wrote(&path),
                    Err(e) => {
                        log::warn!("Could not save rejected spectrum {}: {}", path.display(), e);
                        save_error = Some(e);
                    }
                }
            }
        }

        let included = self.included_count();
        run_log
            .record(
                Step::SnrFilter,
                format!("excluded {} of {} pixels below SNR {}", rejected, self.pixels.len(), threshold),
            )
            .with_included(included)
            .with_flag(format!("--snr {}", threshold));
        match save_error {
            Some(e) => Err(e.into()),
            None => Ok(rejected),
        }
    }

    /// Filter by SNR, then fit every remaining pixel.
    ///
    /// A pixel whose analysis fails is excluded and keeps its default
    /// statistics; successful pixels get every statistic written at once.
    pub fn analyze(
        &mut self,
        threshold: f64,
        rejected_dir: Option<&Path>,
        run_log: &mut RunLog,
    ) -> Result<AnalysisSummary, MapError> {
        let snr_rejected = self.filter_low_snr(threshold, rejected_dir, run_log)?;

        let mut fit_failed = 0;
        for (i, pixel) in self.pixels.iter_mut().enumerate() {
            if !pixel.record.present {
                continue;
            }
            match self.analysis.analyze(&pixel.spectrum) {
                Some(stats) => pixel.record.store(stats),
                None => {
                    log::debug!("Pixel {} excluded: peak fit failed", i);
                    pixel.record.exclude();
                    fit_failed += 1;
                }
            }
        }

        let summary = AnalysisSummary {
            snr_rejected,
            fit_failed,
            included: self.included_count(),
        };
        log::info!(
            "{} analysis: {} included, {} below SNR, {} failed fits",
            self.material.name(),
            summary.included,
            summary.snr_rejected,
            summary.fit_failed
        );
        run_log
            .record(
                Step::PeakFitting,
                format!(
                    "{} bands {}: {} fits failed",
                    self.material.name(),
                    self.material.peaks().keys().cloned().collect::<Vec<_>>().join(", "),
                    summary.fit_failed
                ),
            )
            .with_included(summary.included);
        Ok(summary)
    }

    // =====================================================================
    //  Derived data
    // =====================================================================

    /// Values of a statistic in pixel order, optionally only included pixels
    pub fn statistic_values(&self, name: &str, included_only: bool) -> Result<Vec<f64>, MapError> {
        if !self.has_statistic(name) {
            return Err(MapError::UnknownStatistic(name.to_string()));
        }
        Ok(self
            .pixels
            .iter()
            .filter(|p| !included_only || p.record.present)
            .filter_map(|p| p.record.statistic(name))
            .collect())
    }

    /// One summary row per analysis statistic over included pixels
    pub fn category_statistics(&self) -> Result<Vec<StatisticsRow>, MapError> {
        self.analysis
            .statistic_names()
            .into_iter()
            .map(|name| {
                let values = self.statistic_values(name, true)?;
                let stats = numeric::summary_stats(&values)
                    .ok_or_else(|| MapError::NoIncludedPixels(name.to_string()))?;
                Ok(StatisticsRow {
                    measurement: name.to_string(),
                    mean: stats.mean,
                    stdev: stats.stdev,
                    max: stats.max,
                    min: stats.min,
                })
            })
            .collect()
    }

    pub fn histogram(&self, name: &str, bins: usize) -> Result<Histogram, MapError> {
        let values = self.statistic_values(name, true)?;
        Histogram::from_values(&values, bins).ok_or_else(|| MapError::NoIncludedPixels(name.to_string()))
    }

    pub fn render_histogram(&self, name: &str, unit: &str, bins: usize, path: &Path) -> Result<(), MapError> {
        let hist = self.histogram(name, bins)?;
        plot::render_histogram(&hist, unit).save(path)?;
        log::info!("Saved {} histogram to {}", name, path.display());
        Ok(())
    }

    /// Mean corrected intensities over included pixels
    pub fn average_spectrum(&self) -> Result<Vec<f64>, MapError> {
        let mut sum = vec![0.0; self.wavenumbers.len()];
        let mut count = 0usize;
        for pixel in self.pixels.iter().filter(|p| p.record.present) {
            for (s, v) in sum.iter_mut().zip(pixel.spectrum.intensities()) {
                *s += v;
            }
            count += 1;
        }
        if count == 0 {
            return Err(MapError::NoIncludedPixels("average spectrum".into()));
        }
        Ok(sum.into_iter().map(|s| s / count as f64).collect())
    }

    pub fn render_average_spectrum(&self, path: &Path) -> Result<(), MapError> {
        let average = self.average_spectrum()?;
        plot::render_spectrum(&self.wavenumbers, &average, "Average spectrum").save(path)?;
        log::info!("Saved average spectrum to {}", path.display());
        Ok(())
    }

    /// Heatmap of one statistic under the given display settings
    pub fn create_heatmap(&self, statistic: &str, settings: &HeatMapSettings) -> Result<HeatMap<'_, A>, HeatMapError> {
        let title = self
            .analysis
            .statistic_info(statistic)
            .map(|s| s.title)
            .unwrap_or(statistic);
        HeatMap::new(self, statistic, title, settings)
    }

    /// Heatmap raster resized to `width` pixels wide, aspect ratio kept
    pub fn render_heatmap(
        &self,
        statistic: &str,
        width: u32,
        settings: &HeatMapSettings,
    ) -> Result<image::RgbImage, HeatMapError> {
        let mut heatmap = self.create_heatmap(statistic, settings)?;
        heatmap.set_save_width(width);
        Ok(heatmap.resized_image())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::material::WavenumberRange;
    use crate::pipeline::fitting::LorentzianParams;
    use std::f64::consts::PI;

    /// Graphene-like spectrum with alternating +/- `noise` and peak heights
    /// scaled by `scale`.
    pub(crate) fn synthetic_column(axis: &[f64], scale: f64, noise: f64) -> Vec<f64> {
        let d = LorentzianParams::new(10_000.0 * scale, 15.0, 1350.0);
        let g = LorentzianParams::new(20_000.0 * scale, 10.0, 1582.0);
        let d2 = LorentzianParams::new(60_000.0 * scale, 15.0, 2690.0);
        axis.iter()
            .enumerate()
            .map(|(i, &x)| {
                let wiggle = (i as f64 * PI / 3.7).sin() * noise;
                100.0 + d.eval(x) + g.eval(x) + d2.eval(x) + wiggle
            })
            .collect()
    }

    pub(crate) fn fine_axis() -> Vec<f64> {
        (0..900).map(|i| 1000.0 + i as f64 * 2.0).collect()
    }

    /// 3 x 2 grid; pixel 4 is pure noise
    pub(crate) fn six_pixel_map() -> GrapheneMap {
        let axis = fine_axis();
        let mut columns = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for row in 0..2 {
            for col in 0..3 {
                let i = row * 3 + col;
                let scale = if i == 4 { 0.0 } else { 1.0 + 0.25 * i as f64 };
                columns.push(synthetic_column(&axis, scale, 2.0));
                x.push(10.0 + col as f64 * 0.5);
                y.push(-4.0 + row as f64 * 0.5);
            }
        }
        let data = RawMapData::new(axis, columns, x, y).unwrap();
        RamanMap::graphene(data).unwrap()
    }

    #[test]
    fn test_geometry() {
        let map = six_pixel_map();
        let g = map.geometry();
        assert_eq!((g.unique_x, g.unique_y), (3, 2));
        assert_eq!((g.min_x, g.max_x), (10.0, 11.0));
        assert_eq!(g.x_step, 0.5);
        assert_eq!(g.y_step, 0.5);
        assert_eq!(g.aspect_ratio, 0.5);
        assert_eq!(g.cell(11.0, -3.5), (2, 1));
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn test_single_row_geometry() {
        let g = MapGeometry::from_coordinates(&[0.0, 1.0, 2.0], &[5.0, 5.0, 5.0]);
        assert_eq!(g.unique_y, 1);
        assert_eq!(g.y_step, 0.0);
        assert_eq!(g.cell(2.0, 5.0), (2, 0));
        assert!((g.aspect_ratio - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_records_start_present_with_zeroed_statistics() {
        let map = six_pixel_map();
        for (i, p) in map.pixels().iter().enumerate() {
            assert!(p.record().is_present());
            assert_eq!(p.record().statistic("ratio_2dg"), Some(0.0));
            assert_eq!(p.spectrum().len(), map.wavenumbers().len());
            assert_eq!(p.record().x, 10.0 + (i % 3) as f64 * 0.5);
        }
    }

    #[test]
    fn test_filter_low_snr_is_monotonic() {
        let mut map = six_pixel_map();
        let mut log = RunLog::new();

        let rejected = map.filter_low_snr(15.0, None, &mut log).unwrap();
        assert_eq!(rejected, 1);
        for p in map.pixels() {
            if p.record().is_present() {
                assert!(p.spectrum().snr() >= 15.0);
            }
        }
        assert!(!map.pixels()[4].record().is_present());

        // A lower threshold never brings a pixel back
        assert_eq!(map.filter_low_snr(0.0, None, &mut log).unwrap(), 0);
        assert!(!map.pixels()[4].record().is_present());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_analyze_fills_statistics() {
        let mut map = six_pixel_map();
        let mut log = RunLog::new();
        let summary = map.analyze(15.0, None, &mut log).unwrap();
        assert_eq!(summary.snr_rejected, 1);
        assert_eq!(summary.included + summary.fit_failed, 5);
        assert_eq!(summary.included, map.included_count());
        assert!(summary.included >= 4);

        for p in map.pixels().iter().filter(|p| p.record().is_present()) {
            let g = p.record().statistic("peak_loc_g").unwrap();
            assert!((g - 1582.0).abs() < 15.8);
            let d2 = p.record().statistic("peak_loc_2d").unwrap();
            assert!((d2 - 2690.0).abs() < 26.9);
            let ratio = p.record().statistic("ratio_2dg").unwrap();
            assert!((ratio - 2.0).abs() < 0.3, "ratio {}", ratio);
        }
        // The noise pixel keeps its defaults
        assert_eq!(map.pixels()[4].record().statistic("peak_loc_g"), Some(0.0));
    }

    #[test]
    fn test_failed_fit_leaves_defaults_and_excludes() {
        // 100 cm^-1 sampling: two samples per band window
        let axis: Vec<f64> = (0..19).map(|i| 1000.0 + i as f64 * 100.0).collect();
        let columns: Vec<Vec<f64>> = (0..3)
            .map(|_| {
                (0..axis.len())
                    .map(|i| {
                        let noise = if i % 2 == 0 { 1.0 } else { -1.0 };
                        let spike = if i == 6 { 500.0 } else { 0.0 };
                        noise + spike
                    })
                    .collect()
            })
            .collect();
        let data = RawMapData::new(axis, columns, vec![0.0, 1.0, 2.0], vec![0.0; 3]).unwrap();
        let mut map = RamanMap::graphene(data).unwrap();
        let mut log = RunLog::new();
        let summary = map.analyze(0.0, None, &mut log).unwrap();

        assert_eq!(summary.fit_failed, 3);
        assert_eq!(summary.included, 0);
        for p in map.pixels() {
            assert!(!p.record().is_present());
            for name in ["peak_loc_d", "peak_loc_g", "peak_loc_2d", "fwhm_2d", "ratio_2dg", "ratio_dg"] {
                assert_eq!(p.record().statistic(name), Some(0.0));
            }
        }
        assert!(matches!(map.category_statistics(), Err(MapError::NoIncludedPixels(_))));
        assert!(map.average_spectrum().is_err());
    }

    #[test]
    fn test_one_failed_band_discards_the_others() {
        // Only 1350 and 1352 fall inside the D window on the 2 cm^-1 axis
        let material = Material::new(
            "NARROW_D",
            [
                ("D", WavenumberRange::new(1350.0, 1353.0)),
                ("G", WavenumberRange::new(1500.0, 1650.0)),
                ("2D", WavenumberRange::new(2570.0, 2800.0)),
            ],
            WavenumberRange::new(2000.0, 2400.0),
        );
        let axis = fine_axis();
        let columns = vec![synthetic_column(&axis, 1.0, 2.0)];
        let data = RawMapData::new(axis, columns, vec![0.0], vec![0.0]).unwrap();
        let mut map = RamanMap::new(data, Arc::new(material), GrapheneAnalysis::default()).unwrap();
        let summary = map.analyze(15.0, None, &mut RunLog::new()).unwrap();

        assert_eq!(summary.snr_rejected, 0);
        assert_eq!(summary.fit_failed, 1);
        assert_eq!(summary.included, 0);
        let record = map.pixels()[0].record();
        assert!(!record.is_present());
        for name in ["peak_loc_d", "peak_loc_g", "peak_loc_2d", "fwhm_2d", "ratio_2dg", "ratio_dg"] {
            assert_eq!(record.statistic(name), Some(0.0), "{name}");
        }
    }

    #[test]
    fn test_rejected_spectra_are_plotted() {
        let dir = std::env::temp_dir().join(format!("raman-rejected-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut map = six_pixel_map();
        let mut log = RunLog::new();

        assert_eq!(map.filter_low_snr(15.0, Some(&dir), &mut log).unwrap(), 1);
        let snr = map.pixels()[4].spectrum().snr();
        let expected = format!("4_{}.png", snr as i64);
        assert_eq!(rejected_file_name(4, snr), expected);

        let saved: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(saved, vec![expected.clone()]);
        assert_eq!(log.outputs, vec![dir.join(&expected)]);
        assert_eq!(log.steps[0].included, Some(5));
        let img = image::open(dir.join(&expected)).unwrap();
        assert!(img.width() > 0 && img.height() > 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_failed_plot_save_still_filters_and_logs() {
        let missing = std::env::temp_dir()
            .join(format!("raman-missing-{}", uuid::Uuid::new_v4()))
            .join("rejected");
        let mut map = six_pixel_map();
        let mut log = RunLog::new();

        assert!(matches!(
            map.filter_low_snr(15.0, Some(&missing), &mut log),
            Err(MapError::Image(_))
        ));
        assert!(!map.pixels()[4].record().is_present());
        assert_eq!(map.included_count(), 5);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_rejected_file_name_truncates() {
        assert_eq!(rejected_file_name(7, 3.99), "7_3.png");
        assert_eq!(rejected_file_name(0, 0.4), "0_0.png");
    }

    #[test]
    fn test_category_statistics_rows() {
        let mut map = six_pixel_map();
        map.analyze(15.0, None, &mut RunLog::new()).unwrap();
        let rows = map.category_statistics().unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.measurement.as_str()).collect();
        assert_eq!(names, vec!["peak_loc_d", "peak_loc_g", "peak_loc_2d", "fwhm_2d", "ratio_2dg", "ratio_dg"]);
        let g = &rows[1];
        assert!(g.min <= g.mean && g.mean <= g.max);
    }

    #[test]
    fn test_statistic_values_selection() {
        let mut map = six_pixel_map();
        map.analyze(15.0, None, &mut RunLog::new()).unwrap();
        assert_eq!(map.statistic_values("ratio_dg", false).unwrap().len(), 6);
        assert_eq!(map.statistic_values("ratio_dg", true).unwrap().len(), map.included_count());
        assert!(matches!(
            map.statistic_values("bogus", true),
            Err(MapError::UnknownStatistic(_))
        ));
    }

    #[test]
    fn test_average_spectrum_over_included_pixels() {
        let mut map = six_pixel_map();
        map.filter_low_snr(15.0, None, &mut RunLog::new()).unwrap();
        let average = map.average_spectrum().unwrap();
        assert_eq!(average.len(), map.wavenumbers().len());

        let included: Vec<&Pixel> = map.pixels().iter().filter(|p| p.record().is_present()).collect();
        let k = 300;
        let expected = included.iter().map(|p| p.spectrum().intensities()[k]).sum::<f64>() / included.len() as f64;
        assert!((average[k] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_counts_included_only() {
        let mut map = six_pixel_map();
        map.analyze(15.0, None, &mut RunLog::new()).unwrap();
        let hist = map.histogram("peak_loc_g", 10).unwrap();
        assert_eq!(hist.counts.iter().sum::<usize>(), map.included_count());
    }

    #[test]
    fn test_spectrum_error_names_pixel() {
        let axis: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let data = RawMapData::new(axis, vec![vec![1.0; 10]], vec![0.0], vec![0.0]).unwrap();
        match RamanMap::graphene(data) {
            Err(MapError::Spectrum { pixel, .. }) => assert_eq!(pixel, 0),
            other => panic!("unexpected {:?}", other.map(|m| m.len())),
        }
    }
}
