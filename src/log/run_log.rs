//! Record of one map analysis, saved next to its results.
//!
//! Each [`RunStep`] carries the step kind, a free-text detail, the number of
//! pixels still included once it finished and the command-line flag that
//! controlled it. Every file the run writes is listed under `outputs`, so a
//! results directory can be checked against its log.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const TEXT_FILE: &str = "run_log.txt";
pub const JSON_FILE: &str = "run_log.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Load,
    SnrFilter,
    PeakFitting,
    Statistics,
    Histograms,
    AverageSpectrum,
    Heatmap,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Step::Load => "load",
            Step::SnrFilter => "snr filter",
            Step::PeakFitting => "peak fitting",
            Step::Statistics => "statistics",
            Step::Histograms => "histograms",
            Step::AverageSpectrum => "average spectrum",
            Step::Heatmap => "heatmap",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    /// 1-based
    pub sequence: usize,
    pub at: DateTime<Local>,
    pub step: Step,
    pub detail: String,
    /// Pixels still included after this step, for steps that touch the map
    pub included: Option<usize>,
    pub flag: Option<String>,
}

impl RunStep {
    pub fn with_included(&mut self, included: usize) -> &mut Self {
        self.included = Some(included);
        self
    }

    pub fn with_flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.flag = Some(flag.into());
        self
    }

    fn text_line(&self) -> String {
        let mut line = format!(
            "#{:02} {}  {:<16} {}",
            self.sequence,
            self.at.format("%H:%M:%S"),
            self.step,
            self.detail
        );
        if let Some(n) = self.included {
            line.push_str(&format!(" [{} included]", n));
        }
        if let Some(flag) = &self.flag {
            line.push_str(&format!(" ({})", flag));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub started: DateTime<Local>,
    pub version: String,
    pub input: String,
    pub material: String,
    pub steps: Vec<RunStep>,
    pub outputs: Vec<PathBuf>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started: Local::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            input: String::new(),
            material: String::new(),
            steps: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn for_input(input: &Path, material: &str) -> Self {
        Self {
            input: input.display().to_string(),
            material: material.to_string(),
            ..Self::new()
        }
    }

    /// Append a step; the returned entry can be annotated in place
    pub fn record(&mut self, step: Step, detail: impl Into<String>) -> &mut RunStep {
        let detail = detail.into();
        let sequence = self.steps.len() + 1;
        log::info!("[run {:02}] {}: {}", sequence, step, detail);
        self.steps.push(RunStep {
            sequence,
            at: Local::now(),
            step,
            detail,
            included: None,
            flag: None,
        });
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    pub fn wrote(&mut self, path: &Path) {
        self.outputs.push(path.to_path_buf());
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps_of(&self, step: Step) -> impl Iterator<Item = &RunStep> {
        self.steps.iter().filter(move |s| s.step == step)
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "raman-map v{} run {}\ninput     {}\nmaterial  {}\nstarted   {}\n\n",
            self.version,
            self.run_id,
            self.input,
            self.material,
            self.started.format("%Y-%m-%d %H:%M:%S")
        );
        for step in &self.steps {
            out.push_str(&step.text_line());
            out.push('\n');
        }
        if !self.outputs.is_empty() {
            out.push_str("\noutputs\n");
            for path in &self.outputs {
                out.push_str(&format!("  {}\n", path.display()));
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write `run_log.txt` and `run_log.json` into `dir`
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        fs::write(dir.join(TEXT_FILE), self.to_text())?;
        let json = self.to_json().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(dir.join(JSON_FILE), json)?;
        log::info!("Saved run log ({} steps) to {}", self.steps.len(), dir.display());
        Ok(())
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_sequenced_and_annotated() {
        let mut log = RunLog::new();
        assert!(log.is_empty());

        log.record(Step::Load, "36 pixels on a 6x6 grid").with_included(36);
        log.record(Step::SnrFilter, "excluded 2 below SNR 15")
            .with_included(34)
            .with_flag("--snr 15");
        log.record(Step::PeakFitting, "D, G, 2D");

        assert_eq!(log.len(), 3);
        let seqs: Vec<usize> = log.steps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(log.steps[1].included, Some(34));
        assert_eq!(log.steps[1].flag.as_deref(), Some("--snr 15"));
        assert_eq!(log.steps[2].included, None);
        assert_eq!(log.steps_of(Step::SnrFilter).count(), 1);
    }

    #[test]
    fn test_text_layout() {
        let mut log = RunLog::for_input(Path::new("maps/sample.csv"), "GRAPHENE");
        log.record(Step::SnrFilter, "excluded 1 of 6").with_included(5).with_flag("--snr 15");
        log.record(Step::Heatmap, "ratio_2dg");
        log.wrote(Path::new("out/ratio_2dg.png"));

        let text = log.to_text();
        assert!(text.contains("input     maps/sample.csv\n"));
        assert!(text.contains("material  GRAPHENE\n"));
        let lines: Vec<&str> = text.lines().collect();
        let filter = lines.iter().find(|l| l.starts_with("#01 ")).unwrap();
        assert!(filter.contains("snr filter"));
        assert!(filter.ends_with("excluded 1 of 6 [5 included] (--snr 15)"));
        let heatmap = lines.iter().find(|l| l.starts_with("#02 ")).unwrap();
        assert!(heatmap.ends_with("ratio_2dg"));
        assert!(text.ends_with("outputs\n  out/ratio_2dg.png\n"));
    }

    #[test]
    fn test_no_outputs_section_when_nothing_written() {
        let mut log = RunLog::new();
        log.record(Step::Load, "1 pixel");
        assert!(!log.to_text().contains("outputs"));
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = std::env::temp_dir().join(format!("raman-runlog-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let mut log = RunLog::for_input(Path::new("map.txt"), "GRAPHENE");
        log.record(Step::AverageSpectrum, "mean of 4 spectra").with_included(4);
        log.wrote(&dir.join("average_spectrum.png"));
        log.save(&dir).unwrap();

        let parsed: RunLog = serde_json::from_str(&fs::read_to_string(dir.join(JSON_FILE)).unwrap()).unwrap();
        assert_eq!(parsed, log);
        assert!(fs::read_to_string(dir.join(TEXT_FILE)).unwrap().contains("average spectrum"));
        fs::remove_dir_all(&dir).ok();
    }
}
