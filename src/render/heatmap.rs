//! False-colour heatmaps of one per-pixel statistic.
//!
//! A [`HeatMap`] borrows its map, so the pixel records cannot change under
//! it. Every setter validates first, then stores and recomputes both rasters
//! through [`HeatMap::calc_img`]; a rejected value leaves the previous state
//! in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::map::RamanMap;
use crate::export::ScaleRangeRow;
use crate::pipeline::analysis::PixelAnalysis;
use crate::pipeline::numeric::scale_index;
use crate::render::color::{rgb_to_bytes, ColorSpec, InvalidColorError};

/// Scalebar length to thickness ratio
const SCALEBAR_THICKNESS_RATIO: u32 = 5;

#[derive(Error, Debug)]
pub enum HeatMapError {
    #[error("Invalid scale specification: {0}")]
    InvalidScale(String),
    #[error(transparent)]
    InvalidColor(#[from] InvalidColorError),
    #[error("Gradient must have at least one step, got {0}")]
    InvalidGradient(usize),
    #[error("Unknown statistic '{0}'")]
    UnknownStatistic(String),
    #[error("No included pixels to scale '{0}'")]
    NoIncludedPixels(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Colour scale bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScaleSpec {
    /// Min and max over included pixels
    #[default]
    Auto,
    Manual { low: f64, high: f64 },
}

/// Interpolation used when the raster is scaled up for saving.
///
/// Serialised by name. Deserialisation also takes PIL's integer filter
/// codes, which older templates store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "ResizeMethodRepr")]
pub enum ResizeMethod {
    Nearest,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResizeMethodRepr {
    Code(i64),
    Name(String),
}

impl TryFrom<ResizeMethodRepr> for ResizeMethod {
    type Error = String;

    fn try_from(repr: ResizeMethodRepr) -> Result<Self, Self::Error> {
        match repr {
            ResizeMethodRepr::Code(code) => {
                Self::from_pil_code(code).ok_or_else(|| format!("unknown resize filter code {}", code))
            }
            ResizeMethodRepr::Name(name) => match name.to_ascii_uppercase().as_str() {
                "NEAREST" => Ok(Self::Nearest),
                "BILINEAR" => Ok(Self::Bilinear),
                "BICUBIC" => Ok(Self::Bicubic),
                "LANCZOS" => Ok(Self::Lanczos),
                _ => Err(format!("unknown resize method '{}'", name)),
            },
        }
    }
}

impl ResizeMethod {
    /// PIL filter constants: NEAREST 0, LANCZOS 1, BILINEAR 2, BICUBIC 3
    pub fn from_pil_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Nearest),
            1 => Some(Self::Lanczos),
            2 => Some(Self::Bilinear),
            3 => Some(Self::Bicubic),
            _ => None,
        }
    }

    pub fn filter(self) -> FilterType {
        match self {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Bilinear => FilterType::Triangle,
            ResizeMethod::Bicubic => FilterType::CatmullRom,
            ResizeMethod::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Display configuration for a new heatmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatMapSettings {
    pub scale: ScaleSpec,
    pub gradient: usize,
    pub start_color: ColorSpec,
    pub end_color: ColorSpec,
    pub resize_method: ResizeMethod,
    pub save_width: u32,
    pub filtered_color: ColorSpec,
}

impl Default for HeatMapSettings {
    fn default() -> Self {
        Self {
            scale: ScaleSpec::Auto,
            gradient: 10,
            start_color: ColorSpec::named("red", [255, 0, 0]),
            end_color: ColorSpec::named("green", [0, 128, 0]),
            resize_method: ResizeMethod::Lanczos,
            save_width: 200,
            filtered_color: ColorSpec::named("black", [0, 0, 0]),
        }
    }
}

/// Saved display settings, reloadable onto any heatmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatMapTemplate {
    pub statistic: String,
    pub min_val: f64,
    pub max_val: f64,
    pub gradient: usize,
    pub resize_method: ResizeMethod,
    pub start_col: String,
    pub end_col: String,
    pub save_width: u32,
}

impl HeatMapTemplate {
    pub fn load(path: &Path) -> Result<Self, HeatMapError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), HeatMapError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn validate_bounds(low: f64, high: f64) -> Result<(), HeatMapError> {
    if !low.is_finite() || !high.is_finite() {
        return Err(HeatMapError::InvalidScale(format!(
            "bounds must be finite, got ({}, {})",
            low, high
        )));
    }
    if low > high {
        return Err(HeatMapError::InvalidScale(format!(
            "low bound {} exceeds high bound {}",
            low, high
        )));
    }
    Ok(())
}

fn validate_gradient(gradient: usize) -> Result<(), HeatMapError> {
    if gradient == 0 {
        return Err(HeatMapError::InvalidGradient(gradient));
    }
    Ok(())
}

pub struct HeatMap<'a, A: PixelAnalysis> {
    map: &'a RamanMap<A>,
    statistic: String,
    title: String,
    scale_bottom: f64,
    scale_top: f64,
    gradient: usize,
    start_color: ColorSpec,
    end_color: ColorSpec,
    filtered_color: ColorSpec,
    resize_method: ResizeMethod,
    save_width: u32,
    image: RgbImage,
    scalebar: RgbImage,
}

impl<'a, A: PixelAnalysis> HeatMap<'a, A> {
    pub fn new(
        map: &'a RamanMap<A>,
        statistic: &str,
        title: &str,
        settings: &HeatMapSettings,
    ) -> Result<Self, HeatMapError> {
        if !map.has_statistic(statistic) {
            return Err(HeatMapError::UnknownStatistic(statistic.to_string()));
        }
        validate_gradient(settings.gradient)?;

        let mut heatmap = Self {
            map,
            statistic: statistic.to_string(),
            title: title.to_string(),
            scale_bottom: 0.0,
            scale_top: 0.0,
            gradient: settings.gradient,
            start_color: settings.start_color.clone(),
            end_color: settings.end_color.clone(),
            filtered_color: settings.filtered_color.clone(),
            resize_method: settings.resize_method,
            save_width: settings.save_width.max(1),
            image: RgbImage::new(1, 1),
            scalebar: RgbImage::new(1, 1),
        };
        let (bottom, top) = heatmap.resolve_scale(settings.scale)?;
        heatmap.scale_bottom = bottom;
        heatmap.scale_top = top;
        heatmap.calc_img();
        Ok(heatmap)
    }

    fn included_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.map
            .pixels()
            .iter()
            .map(|p| p.record())
            .filter(|r| r.is_present())
            .filter_map(|r| r.statistic(&self.statistic))
    }

    fn resolve_scale(&self, scale: ScaleSpec) -> Result<(f64, f64), HeatMapError> {
        match scale {
            ScaleSpec::Auto => {
                let (lo, hi) = self
                    .included_values()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
                if lo > hi {
                    return Err(HeatMapError::NoIncludedPixels(self.statistic.clone()));
                }
                Ok((lo, hi))
            }
            ScaleSpec::Manual { low, high } => {
                validate_bounds(low, high)?;
                Ok((low, high))
            }
        }
    }

    pub fn statistic(&self) -> &str {
        &self.statistic
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn scale_bottom(&self) -> f64 {
        self.scale_bottom
    }

    pub fn scale_top(&self) -> f64 {
        self.scale_top
    }

    pub fn gradient(&self) -> usize {
        self.gradient
    }

    pub fn start_color(&self) -> &ColorSpec {
        &self.start_color
    }

    pub fn end_color(&self) -> &ColorSpec {
        &self.end_color
    }

    pub fn filtered_color(&self) -> &ColorSpec {
        &self.filtered_color
    }

    pub fn resize_method(&self) -> ResizeMethod {
        self.resize_method
    }

    pub fn save_width(&self) -> u32 {
        self.save_width
    }

    /// Value span of one colour step; 0 for a degenerate scale
    pub fn delta(&self) -> f64 {
        (self.scale_top - self.scale_bottom) / self.gradient as f64
    }

    /// Gradient colours from start to end, one per step
    pub fn colors(&self) -> Vec<[u8; 3]> {
        self.start_color
            .range_to(&self.end_color, self.gradient)
            .into_iter()
            .map(rgb_to_bytes)
            .collect()
    }

    /// Unscaled raster, one pixel per grid cell, top row at maximum y
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// One band per colour, highest value at the top
    pub fn scalebar(&self) -> &RgbImage {
        &self.scalebar
    }

    // =====================================================================
    //  Setters
    // =====================================================================

    pub fn set_scale(&mut self, scale: ScaleSpec) -> Result<(), HeatMapError> {
        let (bottom, top) = self.resolve_scale(scale)?;
        self.scale_bottom = bottom;
        self.scale_top = top;
        self.calc_img();
        Ok(())
    }

    pub fn set_gradient(&mut self, gradient: usize) -> Result<(), HeatMapError> {
        validate_gradient(gradient)?;
        self.gradient = gradient;
        self.calc_img();
        Ok(())
    }

    pub fn set_start_color(&mut self, spec: &str) -> Result<(), InvalidColorError> {
        self.start_color = ColorSpec::parse(spec)?;
        self.calc_img();
        Ok(())
    }

    pub fn set_end_color(&mut self, spec: &str) -> Result<(), InvalidColorError> {
        self.end_color = ColorSpec::parse(spec)?;
        self.calc_img();
        Ok(())
    }

    pub fn set_filtered_color(&mut self, spec: &str) -> Result<(), InvalidColorError> {
        self.filtered_color = ColorSpec::parse(spec)?;
        self.calc_img();
        Ok(())
    }

    pub fn set_resize_method(&mut self, method: ResizeMethod) {
        self.resize_method = method;
    }

    pub fn set_save_width(&mut self, width: u32) {
        self.save_width = width.max(1);
    }

    // =====================================================================
    //  Rendering
    // =====================================================================

    /// Recompute the raster and the scalebar from the current settings
    pub fn calc_img(&mut self) {
        let geometry = self.map.geometry();
        let (width, height) = (geometry.unique_x as u32, geometry.unique_y as u32);
        let colors = self.colors();
        let max_index = colors.len().saturating_sub(1);
        let delta = self.delta();
        let filtered = Rgb(self.filtered_color.to_rgb8());

        let mut image = RgbImage::new(width, height);
        for (i, pixel) in self.map.pixels().iter().enumerate() {
            let record = pixel.record();
            let (col, row) = geometry.cell(record.x, record.y);
            if col >= width as usize || row >= height as usize {
                log::warn!(
                    "Pixel {} at ({}, {}) falls outside the {}x{} grid",
                    i,
                    record.x,
                    record.y,
                    width,
                    height
                );
                continue;
            }
            let color = if record.is_present() {
                let value = record.statistic(&self.statistic).unwrap_or(0.0);
                Rgb(colors[scale_index(value, self.scale_bottom, delta, Some(max_index))])
            } else {
                filtered
            };
            image.put_pixel(col as u32, height - row as u32 - 1, color);
        }
        self.image = image;
        self.scalebar = self.build_scalebar(&colors);
    }

    fn build_scalebar(&self, colors: &[[u8; 3]]) -> RgbImage {
        let thickness = (self.gradient as u32 / SCALEBAR_THICKNESS_RATIO).max(1);
        let length = colors.len() as u32;
        let mut bar = RgbImage::new(thickness, length);
        for (n, color) in colors.iter().enumerate() {
            for j in 0..thickness {
                bar.put_pixel(j, length - n as u32 - 1, Rgb(*color));
            }
        }
        bar
    }

    /// Output height for the save width, aspect ratio preserved
    pub fn save_height(&self) -> u32 {
        ((self.save_width as f64 * self.map.geometry().aspect_ratio) as u32).max(1)
    }

    pub fn resized_image(&self) -> RgbImage {
        imageops::resize(
            &self.image,
            self.save_width,
            self.save_height(),
            self.resize_method.filter(),
        )
    }

    /// Scalebar at the saved image's height, one fifth as wide
    pub fn resized_scalebar(&self) -> RgbImage {
        let height = self.save_height();
        let width = (height / SCALEBAR_THICKNESS_RATIO).max(1);
        imageops::resize(&self.scalebar, width, height, FilterType::Nearest)
    }

    /// Write `{statistic}.png` and `{statistic}_scalebar.png` into `dir`
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, PathBuf), HeatMapError> {
        let image_path = dir.join(format!("{}.png", self.statistic));
        let scalebar_path = dir.join(format!("{}_scalebar.png", self.statistic));
        self.resized_image().save(&image_path)?;
        self.resized_scalebar().save(&scalebar_path)?;
        log::info!(
            "Saved {} heatmap ({}x{}) to {}",
            self.statistic,
            self.save_width,
            self.save_height(),
            image_path.display()
        );
        Ok((image_path, scalebar_path))
    }

    /// Legend metadata for the scalebar-range table
    pub fn scale_range(&self) -> ScaleRangeRow {
        let geometry = self.map.geometry();
        ScaleRangeRow {
            statistic: self.title.clone(),
            scale_bot: self.scale_bottom,
            scale_top: self.scale_top,
            x_range: format!("0.0 - {:?}", geometry.width()),
            y_range: format!("0.0 - {:?}", geometry.height()),
        }
    }

    // =====================================================================
    //  Templates
    // =====================================================================

    pub fn template(&self) -> HeatMapTemplate {
        HeatMapTemplate {
            statistic: self.statistic.clone(),
            min_val: self.scale_bottom,
            max_val: self.scale_top,
            gradient: self.gradient,
            resize_method: self.resize_method,
            start_col: self.start_color.to_string(),
            end_col: self.end_color.to_string(),
            save_width: self.save_width,
        }
    }

    /// Apply every template setting or none of them
    pub fn apply_template(&mut self, template: &HeatMapTemplate) -> Result<(), HeatMapError> {
        validate_bounds(template.min_val, template.max_val)?;
        validate_gradient(template.gradient)?;
        let start = ColorSpec::parse(&template.start_col)?;
        let end = ColorSpec::parse(&template.end_col)?;

        if template.statistic != self.statistic {
            log::warn!(
                "Applying '{}' template to the '{}' heatmap",
                template.statistic,
                self.statistic
            );
        }
        self.scale_bottom = template.min_val;
        self.scale_top = template.max_val;
        self.gradient = template.gradient;
        self.start_color = start;
        self.end_color = end;
        self.resize_method = template.resize_method;
        self.save_width = template.save_width.max(1);
        self.calc_img();
        Ok(())
    }

    pub fn save_template(&self, path: &Path) -> Result<(), HeatMapError> {
        self.template().save(path)
    }

    pub fn load_template(&mut self, path: &Path) -> Result<(), HeatMapError> {
        let template = HeatMapTemplate::load(path)?;
        self.apply_template(&template)
    }
}
