//! Tabular and text exports written into a run's output directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One `statistics.csv` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub measurement: String,
    pub mean: f64,
    pub stdev: f64,
    pub max: f64,
    pub min: f64,
}

/// One `scalebar_ranges.csv` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRangeRow {
    /// Display title of the heatmap
    pub statistic: String,
    pub scale_bot: f64,
    pub scale_top: f64,
    pub x_range: String,
    pub y_range: String,
}

/// Free-text sample description saved with every run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthCharacteristics {
    pub material: String,
    pub synthesized: String,
    pub growth_method: String,
    pub growth_details: String,
}

impl GrowthCharacteristics {
    pub fn to_text(&self) -> String {
        format!(
            "MATERIAL\n----------\n{}\n\n\
             DATE/TIME SYNTHESIZED\n----------\n{}\n\n\
             GROWTH METHOD\n----------\n{}\n\n\
             GROWTH DETAILS\n----------\n{}",
            self.material, self.synthesized, self.growth_method, self.growth_details
        )
    }
}

/// Quote a CSV field only when it needs it
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn statistics_csv(rows: &[StatisticsRow]) -> String {
    let mut out = String::from("Measurement,Mean,STDev,Max,Min\n");
    for row in rows {
        out.push_str(&format!(
            "{},{:?},{:?},{:?},{:?}\n",
            csv_field(&row.measurement),
            row.mean,
            row.stdev,
            row.max,
            row.min
        ));
    }
    out
}

pub fn scale_ranges_csv(rows: &[ScaleRangeRow]) -> String {
    let mut out = String::from("statistic,scale_bot,scale_top,x-range,y-range\n");
    for row in rows {
        out.push_str(&format!(
            "{},{:?},{:?},{},{}\n",
            csv_field(&row.statistic),
            row.scale_bot,
            row.scale_top,
            csv_field(&row.x_range),
            csv_field(&row.y_range)
        ));
    }
    out
}

pub fn write_statistics_csv(rows: &[StatisticsRow], path: &Path) -> io::Result<()> {
    fs::write(path, statistics_csv(rows))?;
    log::info!("Saved {} statistic rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn write_scale_ranges_csv(rows: &[ScaleRangeRow], path: &Path) -> io::Result<()> {
    fs::write(path, scale_ranges_csv(rows))?;
    log::info!("Saved {} scalebar ranges to {}", rows.len(), path.display());
    Ok(())
}

pub fn write_growth_characteristics(info: &GrowthCharacteristics, path: &Path) -> io::Result<()> {
    fs::write(path, info.to_text())
}

/// Results directory for an input file: its stem beside it, with a
/// `_YYMMDD_HHMMSS` suffix when that name is already taken.
pub fn output_dir_for(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Everything before the first dot, so `map.v2.csv` gives `map`
    let stem = file_name.split('.').next().unwrap_or("").to_string();
    let stem = if stem.is_empty() { "raman_map".to_string() } else { stem };

    let dir = parent.join(&stem);
    if dir.exists() {
        let stamp = chrono::Local::now().format("%y%m%d_%H%M%S");
        parent.join(format!("{}_{}", stem, stamp))
    } else {
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("raman-export-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_statistics_csv_layout() {
        let rows = vec![StatisticsRow {
            measurement: "ratio_2dg".into(),
            mean: 2.5,
            stdev: 1.118,
            max: 4.0,
            min: 1.0,
        }];
        assert_eq!(
            statistics_csv(&rows),
            "Measurement,Mean,STDev,Max,Min\nratio_2dg,2.5,1.118,4.0,1.0\n"
        );
    }

    #[test]
    fn test_scale_ranges_csv_layout() {
        let rows = vec![ScaleRangeRow {
            statistic: "2D:G Ratio".into(),
            scale_bot: 0.5,
            scale_top: 3.0,
            x_range: "0.0 - 10.0".into(),
            y_range: "0.0 - 5.0".into(),
        }];
        let csv = scale_ranges_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("statistic,scale_bot,scale_top,x-range,y-range"));
        assert_eq!(lines.next(), Some("2D:G Ratio,0.5,3.0,0.0 - 10.0,0.0 - 5.0"));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_growth_characteristics_text() {
        let info = GrowthCharacteristics {
            material: "Graphene".into(),
            synthesized: "2024-03-01 10:00".into(),
            growth_method: "CVD".into(),
            growth_details: "Cu foil\n1000 C".into(),
        };
        let text = info.to_text();
        assert!(text.starts_with("MATERIAL\n----------\nGraphene\n\nDATE/TIME SYNTHESIZED\n"));
        assert!(text.ends_with("GROWTH DETAILS\n----------\nCu foil\n1000 C"));
    }

    #[test]
    fn test_output_dir_gets_timestamp_when_taken() {
        let root = temp_dir();
        let input = root.join("sample.map.csv");
        assert_eq!(output_dir_for(&input), root.join("sample"));

        fs::create_dir(root.join("sample")).unwrap();
        let taken = output_dir_for(&input);
        let name = taken.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sample_"));
        assert_eq!(name.len(), "sample_".len() + 13);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_writers_create_files() {
        let dir = temp_dir();
        write_statistics_csv(&[], &dir.join("statistics.csv")).unwrap();
        write_growth_characteristics(&GrowthCharacteristics::default(), &dir.join("growth.txt")).unwrap();
        assert_eq!(
            fs::read_to_string(dir.join("statistics.csv")).unwrap(),
            "Measurement,Mean,STDev,Max,Min\n"
        );
        assert!(dir.join("growth.txt").exists());
        fs::remove_dir_all(&dir).ok();
    }
}
