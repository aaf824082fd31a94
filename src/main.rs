//! raman-map: analyse a Raman map export and write heatmaps, histograms and tables.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use raman_map::config::AnalysisConfig;
use raman_map::data::map::GrapheneMap;
use raman_map::data::material::Material;
use raman_map::export::{self, GrowthCharacteristics};
use raman_map::log::run_log::{RunLog, Step};
use raman_map::pipeline::analysis::{GrapheneAnalysis, PixelAnalysis};
use raman_map::render::heatmap::HeatMapTemplate;

/// Statistics that get a histogram and a heatmap
const MAPPED_STATISTICS: [&str; 5] = ["ratio_2dg", "ratio_dg", "peak_loc_d", "peak_loc_g", "peak_loc_2d"];

#[derive(Parser)]
#[command(
    name = "raman-map",
    version,
    about = "Fit graphene Raman maps and render per-pixel statistics"
)]
struct Cli {
    /// Map export (.csv comma separated, .txt/.tsv tab separated)
    input: PathBuf,

    /// Output directory (default: input stem beside the input)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// SNR threshold, overrides the config file
    #[arg(long)]
    snr: Option<f64>,

    /// Plot every rejected spectrum into <out>/rejected
    #[arg(long, default_value_t = false)]
    save_rejected: bool,

    /// Analysis config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Heatmap template (JSON), applied to the heatmap of its statistic
    #[arg(short, long)]
    template: Vec<PathBuf>,

    #[arg(long, default_value_t = false)]
    no_heatmaps: bool,

    #[arg(long, default_value_t = false)]
    no_histograms: bool,

    #[arg(long, default_value_t = false)]
    no_average: bool,

    #[arg(long, default_value_t = false)]
    no_stats: bool,

    /// Material designation for growth_characteristics.txt
    #[arg(long, default_value = "")]
    material: String,

    /// Date/time synthesized
    #[arg(long, default_value = "")]
    synthesized: String,

    #[arg(long, default_value = "")]
    growth_method: String,

    #[arg(long, default_value = "")]
    growth_details: String,
}

fn load_templates(paths: &[PathBuf]) -> Result<HashMap<String, HeatMapTemplate>, Box<dyn std::error::Error>> {
    let mut templates = HashMap::new();
    for path in paths {
        let template = HeatMapTemplate::load(path)?;
        log::info!("Template {} applies to '{}'", path.display(), template.statistic);
        templates.insert(template.statistic.clone(), template);
    }
    Ok(templates)
}

fn write_histograms(
    map: &GrapheneMap,
    out: &Path,
    bins: usize,
    run_log: &mut RunLog,
) -> Result<(), Box<dyn std::error::Error>> {
    for name in MAPPED_STATISTICS {
        let unit = map.analysis().statistic_info(name).map(|s| s.unit).unwrap_or(name);
        let path = out.join(format!("{}_hist.png", name));
        map.render_histogram(name, unit, bins, &path)?;
        run_log.wrote(&path);
    }
    run_log
        .record(Step::Histograms, format!("{} statistics, {} bins", MAPPED_STATISTICS.len(), bins))
        .with_included(map.included_count());
    Ok(())
}

fn write_heatmaps(
    map: &GrapheneMap,
    config: &AnalysisConfig,
    templates: &HashMap<String, HeatMapTemplate>,
    out: &Path,
    run_log: &mut RunLog,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ranges = Vec::new();
    for name in MAPPED_STATISTICS {
        let mut heatmap = map.create_heatmap(name, &config.heatmap)?;
        if let Some(template) = templates.get(name) {
            heatmap.apply_template(template)?;
        }
        let (image_path, scalebar_path) = heatmap.save(out)?;
        run_log.wrote(&image_path);
        run_log.wrote(&scalebar_path);
        ranges.push(heatmap.scale_range());
        let step = run_log.record(
            Step::Heatmap,
            format!(
                "{}: scale {} to {}, {} steps {} -> {}, width {}",
                heatmap.title(),
                heatmap.scale_bottom(),
                heatmap.scale_top(),
                heatmap.gradient(),
                heatmap.start_color(),
                heatmap.end_color(),
                heatmap.save_width()
            ),
        );
        if templates.contains_key(name) {
            step.with_flag("--template");
        }
    }
    let ranges_path = out.join("scalebar_ranges.csv");
    export::write_scale_ranges_csv(&ranges, &ranges_path)?;
    run_log.wrote(&ranges_path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    log::info!("raman-map v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(snr) = cli.snr {
        config.snr_threshold = snr;
    }
    config.save_rejected |= cli.save_rejected;
    let templates = load_templates(&cli.template)?;

    let out = cli.out.clone().unwrap_or_else(|| export::output_dir_for(&cli.input));
    fs::create_dir_all(&out)?;
    log::info!("Writing results to {}", out.display());

    let material = Arc::new(Material::graphene());
    let mut run_log = RunLog::for_input(&cli.input, material.name());

    let mut map = GrapheneMap::from_file(
        &cli.input,
        material,
        GrapheneAnalysis::default(),
        &config.baseline,
    )?;
    run_log
        .record(
            Step::Load,
            format!(
                "{}x{} grid, {} wavenumbers, ALS lambda {} p {} x{}",
                map.geometry().unique_x,
                map.geometry().unique_y,
                map.wavenumbers().len(),
                config.baseline.smoothness,
                config.baseline.asymmetry,
                config.baseline.iterations
            ),
        )
        .with_included(map.len());

    let growth = GrowthCharacteristics {
        material: cli.material.clone(),
        synthesized: cli.synthesized.clone(),
        growth_method: cli.growth_method.clone(),
        growth_details: cli.growth_details.clone(),
    };
    let growth_path = out.join("growth_characteristics.txt");
    export::write_growth_characteristics(&growth, &growth_path)?;
    run_log.wrote(&growth_path);

    let rejected_dir = if config.save_rejected {
        let dir = out.join("rejected");
        fs::create_dir_all(&dir)?;
        Some(dir)
    } else {
        None
    };
    let summary = map.analyze(config.snr_threshold, rejected_dir.as_deref(), &mut run_log)?;

    if summary.included == 0 {
        log::warn!("No pixels passed filtering and fitting; skipping statistics and images");
    } else {
        if !cli.no_stats {
            let rows = map.category_statistics()?;
            let path = out.join("statistics.csv");
            export::write_statistics_csv(&rows, &path)?;
            run_log.wrote(&path);
            run_log
                .record(Step::Statistics, format!("{} summary rows", rows.len()))
                .with_included(summary.included);
        }
        if !cli.no_histograms {
            write_histograms(&map, &out, config.histogram_bins, &mut run_log)?;
        }
        if !cli.no_average {
            let path = out.join("average_spectrum.png");
            map.render_average_spectrum(&path)?;
            run_log.wrote(&path);
            run_log
                .record(Step::AverageSpectrum, "mean of included spectra")
                .with_included(summary.included);
        }
        if !cli.no_heatmaps {
            write_heatmaps(&map, &config, &templates, &out, &mut run_log)?;
        }
    }

    run_log.save(&out)?;
    log::info!(
        "Done: {} of {} pixels included ({} below SNR {}, {} failed fits)",
        summary.included,
        map.len(),
        summary.snr_rejected,
        config.snr_threshold,
        summary.fit_failed
    );
    Ok(())
}
