//! Raman map processing.
//!
//! Loads a map export, removes each spectrum's baseline, rejects noisy
//! pixels, fits Lorentzian peaks per pixel and renders the resulting
//! statistics as heatmaps, histograms and tables.

pub mod config;
pub mod data;
pub mod export;
pub mod log;
pub mod pipeline;
pub mod render;

pub use config::AnalysisConfig;
pub use data::map::{GrapheneMap, MapError, RamanMap};
pub use data::material::Material;
pub use data::spectrum::Spectrum;
pub use pipeline::analysis::{GrapheneAnalysis, PixelAnalysis};
pub use render::heatmap::{HeatMap, HeatMapError, HeatMapSettings};
