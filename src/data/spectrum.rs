//! A single pixel's Raman spectrum.
//!
//! Construction runs the whole per-spectrum pipeline in a fixed order:
//! baseline subtraction, signal-to-noise over the material's flat region,
//! then extraction of every named peak window. Nothing is mutable afterwards.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::data::material::Material;
use crate::pipeline::numeric::{self, BaselineParams, NumericError};

#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Shared, ascending axis
    wavenumbers: Arc<[f64]>,
    /// Baseline-corrected intensities
    intensities: Vec<f64>,
    material: Arc<Material>,
    snr: f64,
    peak_windows: BTreeMap<String, Range<usize>>,
}

impl Spectrum {
    /// Build with the default ALS baseline parameters
    pub fn new(
        wavenumbers: Arc<[f64]>,
        raw_intensities: Vec<f64>,
        material: Arc<Material>,
    ) -> Result<Self, NumericError> {
        Self::with_baseline(wavenumbers, raw_intensities, material, &BaselineParams::default())
    }

    pub fn with_baseline(
        wavenumbers: Arc<[f64]>,
        raw_intensities: Vec<f64>,
        material: Arc<Material>,
        baseline_params: &BaselineParams,
    ) -> Result<Self, NumericError> {
        if wavenumbers.len() != raw_intensities.len() {
            return Err(NumericError::LengthMismatch {
                wavenumbers: wavenumbers.len(),
                intensities: raw_intensities.len(),
            });
        }

        let mut intensities = raw_intensities;
        let baseline = numeric::baseline_als(&intensities, baseline_params)?;
        for (v, b) in intensities.iter_mut().zip(&baseline) {
            *v -= b;
        }

        let region = material.snr_region();
        let snr = numeric::signal_noise_ratio(&wavenumbers, &intensities, region.low, region.high)?;

        let mut peak_windows = BTreeMap::new();
        for (name, range) in material.peaks() {
            let window = numeric::subset_range(&wavenumbers, range.low, range.high)?;
            peak_windows.insert(name.clone(), window);
        }

        Ok(Self {
            wavenumbers,
            intensities,
            material,
            snr,
            peak_windows,
        })
    }

    /// Number of wavenumber samples
    pub fn len(&self) -> usize {
        self.wavenumbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavenumbers.is_empty()
    }

    pub fn wavenumbers(&self) -> &[f64] {
        &self.wavenumbers
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn snr(&self) -> f64 {
        self.snr
    }

    /// `(wavenumbers, intensities)` of a named peak window
    pub fn peak_window(&self, name: &str) -> Option<(&[f64], &[f64])> {
        self.peak_windows
            .get(name)
            .map(|r| (&self.wavenumbers[r.clone()], &self.intensities[r.clone()]))
    }

    pub fn peak_names(&self) -> impl Iterator<Item = &str> {
        self.peak_windows.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::material::WavenumberRange;

    fn axis() -> Arc<[f64]> {
        (0..200).map(|i| 1000.0 + i as f64 * 10.0).collect::<Vec<_>>().into()
    }

    fn raw(axis: &[f64]) -> Vec<f64> {
        axis.iter()
            .enumerate()
            .map(|(i, &x)| {
                let d = x - 1580.0;
                50.0 + 0.01 * x + 800.0 * 100.0 / (d * d + 100.0) + if i % 2 == 0 { 1.0 } else { -1.0 }
            })
            .collect()
    }

    #[test]
    fn test_baseline_subtracted_exactly() {
        let w = axis();
        let y = raw(&w);
        let material = Arc::new(Material::graphene());
        let spectrum = Spectrum::new(w.clone(), y.clone(), material).unwrap();

        let baseline = numeric::baseline_als(&y, &BaselineParams::default()).unwrap();
        assert_eq!(spectrum.len(), w.len());
        assert_eq!(spectrum.intensities().len(), w.len());
        for i in 0..y.len() {
            assert_eq!(spectrum.intensities()[i], y[i] - baseline[i]);
        }
    }

    #[test]
    fn test_snr_uses_corrected_intensities() {
        let w = axis();
        let y = raw(&w);
        let material = Arc::new(Material::graphene());
        let spectrum = Spectrum::new(w.clone(), y, material).unwrap();
        let expected = numeric::signal_noise_ratio(&w, spectrum.intensities(), 2000.0, 2400.0).unwrap();
        assert_eq!(spectrum.snr(), expected);
        assert!(spectrum.snr() > 15.0);
    }

    #[test]
    fn test_peak_windows() {
        let w = axis();
        let spectrum = Spectrum::new(w.clone(), raw(&w), Arc::new(Material::graphene())).unwrap();
        let names: Vec<&str> = spectrum.peak_names().collect();
        assert_eq!(names, vec!["2D", "D", "G"]);

        let (gw, gi) = spectrum.peak_window("G").unwrap();
        assert_eq!(gw.first(), Some(&1500.0));
        assert_eq!(gw.last(), Some(&1640.0));
        assert_eq!(gw.len(), gi.len());
        assert!(spectrum.peak_window("X").is_none());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let w = axis();
        let err = Spectrum::new(w, vec![0.0; 3], Arc::new(Material::graphene())).unwrap_err();
        assert!(matches!(err, NumericError::LengthMismatch { .. }));
    }

    #[test]
    fn test_missing_peak_window_fails_construction() {
        let w = axis();
        let material = Material::new(
            "OUT_OF_AXIS",
            [("far", WavenumberRange::new(5000.0, 5100.0))],
            WavenumberRange::new(2000.0, 2400.0),
        );
        let err = Spectrum::new(w.clone(), raw(&w), Arc::new(material)).unwrap_err();
        assert!(matches!(err, NumericError::EmptyRange { .. }));
    }
}
