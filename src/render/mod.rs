pub mod color;
pub mod heatmap;
pub mod plot;
