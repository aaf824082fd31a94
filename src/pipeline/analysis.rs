//! Per-material pixel analysis strategies.
//!
//! A [`PixelAnalysis`] turns one baseline-corrected spectrum into a set of
//! named statistics, or reports that the pixel cannot be characterised. The
//! map owns geometry and filtering; the strategy owns fitting and ratios.

use std::collections::BTreeMap;

use crate::data::spectrum::Spectrum;
use crate::pipeline::fitting::{self, FitConfig, LorentzianParams};

/// Named per-pixel statistics produced by an analysis
pub type PixelStatistics = BTreeMap<String, f64>;

/// Display metadata for one statistic
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticInfo {
    pub name: &'static str,
    /// Heatmap and scale-range title
    pub title: &'static str,
    /// Histogram axis label
    pub unit: &'static str,
}

pub trait PixelAnalysis {
    /// Every statistic written by [`PixelAnalysis::analyze`], in report order
    fn statistics(&self) -> &[StatisticInfo];

    /// Fit the spectrum. `None` excludes the pixel; no partial result is kept.
    fn analyze(&self, spectrum: &Spectrum) -> Option<PixelStatistics>;

    fn statistic_names(&self) -> Vec<&'static str> {
        self.statistics().iter().map(|s| s.name).collect()
    }

    fn statistic_info(&self, name: &str) -> Option<&StatisticInfo> {
        self.statistics().iter().find(|s| s.name == name)
    }
}

const GRAPHENE_STATISTICS: [StatisticInfo; 6] = [
    StatisticInfo { name: "peak_loc_d", title: "D Peak Location", unit: "D Peak Location (cm^-1)" },
    StatisticInfo { name: "peak_loc_g", title: "G Peak Location", unit: "G Peak Location (cm^-1)" },
    StatisticInfo { name: "peak_loc_2d", title: "2D Peak Location", unit: "2D Peak Location (cm^-1)" },
    StatisticInfo { name: "fwhm_2d", title: "2D FWHM", unit: "2D FWHM (cm^-1)" },
    StatisticInfo { name: "ratio_2dg", title: "2D:G Ratio", unit: "2D:G Ratio" },
    StatisticInfo { name: "ratio_dg", title: "D:G Ratio", unit: "D:G Ratio" },
];

/// How the fitter is seeded for each peak window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialGuess {
    /// Estimate from the window's tallest sample and half-maximum width
    Estimate,
    Fixed(LorentzianParams),
}

/// Graphene: fits the D, G and 2D bands.
///
/// Stores each band's center, the 2D FWHM, and the 2D:G and D:G ratios of
/// the fitted curves' maxima over their windows.
#[derive(Debug, Clone)]
pub struct GrapheneAnalysis {
    pub fit: FitConfig,
    pub initial_guess: InitialGuess,
}

impl Default for GrapheneAnalysis {
    fn default() -> Self {
        Self {
            fit: FitConfig::default(),
            initial_guess: InitialGuess::Estimate,
        }
    }
}

impl GrapheneAnalysis {
    fn fit_band(&self, spectrum: &Spectrum, band: &str) -> Option<(LorentzianParams, f64)> {
        let Some((x, y)) = spectrum.peak_window(band) else {
            log::warn!("Material {} has no '{}' window", spectrum.material().name(), band);
            return None;
        };
        let guess = match self.initial_guess {
            InitialGuess::Estimate => fitting::estimate_initial_guess(x, y),
            InitialGuess::Fixed(p) => p,
        };
        let params = fitting::fit_lorentzian_with(x, y, guess, &self.fit)?;
        let curve_max = x
            .iter()
            .map(|&xi| params.eval(xi))
            .fold(f64::NEG_INFINITY, f64::max);
        Some((params, curve_max))
    }
}

impl PixelAnalysis for GrapheneAnalysis {
    fn statistics(&self) -> &[StatisticInfo] {
        &GRAPHENE_STATISTICS
    }

    fn analyze(&self, spectrum: &Spectrum) -> Option<PixelStatistics> {
        // All three bands must fit before anything is recorded
        let (d, d_max) = self.fit_band(spectrum, "D")?;
        let (g, g_max) = self.fit_band(spectrum, "G")?;
        let (d2, d2_max) = self.fit_band(spectrum, "2D")?;

        let mut stats = PixelStatistics::new();
        stats.insert("peak_loc_d".into(), d.center);
        stats.insert("peak_loc_g".into(), g.center);
        stats.insert("peak_loc_2d".into(), d2.center);
        stats.insert("fwhm_2d".into(), d2.fwhm());
        stats.insert("ratio_2dg".into(), d2_max / g_max);
        stats.insert("ratio_dg".into(), d_max / g_max);
        Some(stats)
    }
}
