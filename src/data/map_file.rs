//! Raman map export reader.
//!
//! The instrument writes one table per map: the first row holds two unused
//! cells followed by the wavenumber axis, every following row holds a pixel's
//! stage x, stage y and its intensities. `.csv` files are comma separated,
//! `.txt`/`.tsv` files tab separated.

use std::fs;
use std::path::Path;

use crate::data::map::MapError;

/// Aligned input for map construction: a shared axis, one intensity column
/// per pixel and the pixels' stage coordinates, all in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMapData {
    pub wavenumbers: Vec<f64>,
    pub columns: Vec<Vec<f64>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl RawMapData {
    /// Validate lengths and put the axis in ascending order.
    ///
    /// A descending axis is reversed together with every column.
    pub fn new(
        wavenumbers: Vec<f64>,
        columns: Vec<Vec<f64>>,
        x: Vec<f64>,
        y: Vec<f64>,
    ) -> Result<Self, MapError> {
        if columns.is_empty() {
            return Err(MapError::EmptyMap);
        }
        if x.len() != columns.len() || y.len() != columns.len() {
            return Err(MapError::Inconsistent(format!(
                "{} intensity columns but {} x and {} y coordinates",
                columns.len(),
                x.len(),
                y.len()
            )));
        }
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != wavenumbers.len()) {
            return Err(MapError::Inconsistent(format!(
                "column {} has {} samples, axis has {}",
                i,
                col.len(),
                wavenumbers.len()
            )));
        }

        let mut data = Self { wavenumbers, columns, x, y };
        if data.wavenumbers.len() > 1 && data.wavenumbers[0] > data.wavenumbers[data.wavenumbers.len() - 1] {
            log::debug!("Reversing descending wavenumber axis");
            data.wavenumbers.reverse();
            for col in data.columns.iter_mut() {
                col.reverse();
            }
        }
        Ok(data)
    }

    pub fn pixel_count(&self) -> usize {
        self.columns.len()
    }
}

fn delimiter_for(path: &Path, first_line: &str) -> char {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "csv" => ',',
        Some(ext) if ext == "txt" || ext == "tsv" => '\t',
        _ => {
            if first_line.contains('\t') {
                '\t'
            } else {
                ','
            }
        }
    }
}

fn parse_cell(cell: &str, line: usize) -> Result<f64, MapError> {
    cell.trim().parse::<f64>().map_err(|_| MapError::Parse {
        line,
        message: format!("'{}' is not a number", cell.trim()),
    })
}

/// Parse map text with the given delimiter
pub fn parse_map_text(content: &str, delimiter: char) -> Result<RawMapData, MapError> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let (header_line, header) = lines.next().ok_or(MapError::EmptyMap)?;
    let header_cells: Vec<&str> = header.split(delimiter).collect();
    if header_cells.len() < 3 {
        return Err(MapError::Parse {
            line: header_line,
            message: "header must hold two coordinate cells and at least one wavenumber".into(),
        });
    }
    let wavenumbers = header_cells[2..]
        .iter()
        .map(|c| parse_cell(c, header_line))
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = Vec::new();
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (line_no, line) in lines {
        let cells: Vec<&str> = line.split(delimiter).collect();
        if cells.len() != wavenumbers.len() + 2 {
            return Err(MapError::Parse {
                line: line_no,
                message: format!("expected {} cells, found {}", wavenumbers.len() + 2, cells.len()),
            });
        }
        x.push(parse_cell(cells[0], line_no)?);
        y.push(parse_cell(cells[1], line_no)?);
        columns.push(
            cells[2..]
                .iter()
                .map(|c| parse_cell(c, line_no))
                .collect::<Result<Vec<_>, _>>()?,
        );
    }

    RawMapData::new(wavenumbers, columns, x, y)
}

/// Read a map export from disk
pub fn load_map_file(path: &Path) -> Result<RawMapData, MapError> {
    let content = fs::read_to_string(path)?;
    let first_line = content.lines().next().unwrap_or("");
    let delimiter = delimiter_for(path, first_line);
    log::info!(
        "Reading map {} ({} separated)",
        path.display(),
        if delimiter == '\t' { "tab" } else { "comma" }
    );
    parse_map_text(&content, delimiter)
}
