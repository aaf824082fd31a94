use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Half-open wavenumber window `[low, high)` in cm^-1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavenumberRange {
    pub low: f64,
    pub high: f64,
}

impl WavenumberRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

/// Peak windows and the flat noise region that characterise a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    name: String,
    peaks: BTreeMap<String, WavenumberRange>,
    snr_region: WavenumberRange,
}

impl Material {
    pub fn new<I, S>(name: &str, peaks: I, snr_region: WavenumberRange) -> Self
    where
        I: IntoIterator<Item = (S, WavenumberRange)>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            peaks: peaks.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            snr_region,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peaks(&self) -> &BTreeMap<String, WavenumberRange> {
        &self.peaks
    }

    pub fn peak(&self, name: &str) -> Option<WavenumberRange> {
        self.peaks.get(name).copied()
    }

    pub fn snr_region(&self) -> WavenumberRange {
        self.snr_region
    }

    /// Graphene: D, G and 2D bands, noise sampled between G and 2D.
    pub fn graphene() -> Self {
        Self::new(
            "GRAPHENE",
            [
                ("D", WavenumberRange::new(1275.0, 1425.0)),
                ("G", WavenumberRange::new(1500.0, 1650.0)),
                ("2D", WavenumberRange::new(2570.0, 2800.0)),
            ],
            WavenumberRange::new(2000.0, 2400.0),
        )
    }
}
