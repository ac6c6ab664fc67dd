use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use hydrate_alert::config::AppConfig;
use hydrate_alert::downloader::safe_file_name;
use hydrate_alert::graph::{ChartKind, ChartOutcome};
use hydrate_alert::loader::load_table;
use hydrate_alert::risk::RiskBand;
use hydrate_alert::saving::{load_model, save_model};
use hydrate_alert::state::{AppState, ModelStatus};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hydrate formation risk analysis for gas injection data", long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the model on the historical data and report its metrics
    Train {
        /// Write the fitted model to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Score CSV files and write exports and charts
    Analyze {
        /// CSV files; each is stored under its file stem
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Use a saved model instead of training
        #[arg(long)]
        model: Option<PathBuf>,

        /// Chart to render (repeatable), e.g. `time-series` or `timeline`
        #[arg(long = "chart", value_parser = parse_chart)]
        charts: Vec<ChartKind>,

        /// Output directory (defaults to the configured one)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also write an XLSX export
        #[arg(long)]
        xlsx: bool,
    },

    /// List available chart types
    Charts,
}

fn parse_chart(value: &str) -> Result<ChartKind, String> {
    value.parse::<ChartKind>().map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Train { save } => train(config, save.as_deref()),
        Command::Analyze {
            files,
            model,
            charts,
            out,
            xlsx,
        } => {
            let out_dir = out.unwrap_or_else(|| config.output_dir.clone());
            analyze(config, &files, model.as_deref(), &charts, &out_dir, xlsx);
            Ok(())
        }
        Command::Charts => {
            for kind in ChartKind::ALL {
                let required = kind.required_columns();
                let required = if required.is_empty() {
                    "any numeric column".to_string()
                } else {
                    required.join(", ")
                };
                println!("{:<14} {:<30} needs: {}", kind.slug(), kind.label(), required);
            }
            Ok(())
        }
    }
}

fn train(config: AppConfig, save: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = AppState::new(config);
    let model = match state.model() {
        ModelStatus::Ready(model) => model,
        ModelStatus::Failed(reason) => return Err(reason.clone().into()),
        ModelStatus::NotTrained => return Err("model was not trained".into()),
    };

    println!("Model {}", model.id());
    println!(
        "  trained on {} rows, evaluated on {}",
        model.n_train(),
        model.test_rows().len()
    );
    println!(
        "  MSE: {:.4}  R²: {:.4}",
        model.metrics().mse,
        model.metrics().r2
    );
    println!("  Feature importance:");
    for (name, importance) in model.feature_importance_ranking() {
        println!("    {:<40} {:.4}", name, importance);
    }

    if let Some(path) = save {
        save_model(model, path)?;
    }
    Ok(())
}

fn analyze(
    config: AppConfig,
    files: &[PathBuf],
    model: Option<&Path>,
    charts: &[ChartKind],
    out_dir: &Path,
    xlsx: bool,
) {
    let mut state = AppState::new(config);

    if let Some(path) = model {
        match load_model(path) {
            Ok(model) => state.install_model(model),
            Err(e) => error!("{}; falling back to training", e),
        }
    }

    for file in files {
        let name = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        match load_table(file).and_then(|table| state.add_dataset(&name, table)) {
            Ok(_) => {}
            Err(e) => error!("Error loading {}: {}", file.display(), e),
        }
    }

    let names: Vec<String> = state.dataset_names().iter().map(|n| n.to_string()).collect();
    let mut failures = 0;
    for name in &names {
        if let Err(e) = analyze_dataset(&mut state, name, charts, out_dir, xlsx) {
            error!("{}: {}", name, e);
            failures += 1;
        }
    }

    let overview = state.overview();
    info!(
        "Analyzed {} datasets ({} rows), {} failed; model {}",
        overview.datasets.len(),
        overview.total_rows,
        failures,
        overview.model
    );
}

fn analyze_dataset(
    state: &mut AppState,
    name: &str,
    charts: &[ChartKind],
    out_dir: &Path,
    xlsx: bool,
) -> hydrate_alert::Result<()> {
    // scoring failures are reported; exports and charts still go out unscored
    match state.summary(name) {
        Ok(Some(summary)) => {
            println!("{}", name);
            println!("  Max predicted likelihood:  {:.2}", summary.max);
            println!("  Mean predicted likelihood: {:.2}", summary.mean);
            println!(
                "  High risk points:          {} of {}",
                summary.high_risk_points, summary.total
            );
            println!("  {}", summary.alert);
            if let Ok(Some(levels)) = state.risk_levels(name) {
                let counts: Vec<String> = RiskBand::ALL
                    .iter()
                    .map(|band| {
                        let n = levels.iter().filter(|l| *l == band).count();
                        format!("{} {}", band, n)
                    })
                    .collect();
                println!("  Risk levels: {}", counts.join(", "));
            }
        }
        Ok(None) => println!(
            "{}: predictions unavailable, the model could not be trained; try again later",
            name
        ),
        Err(e) => println!("{}: predictions unavailable: {}", name, e),
    }

    if let Err(e) = state.export_csv(name).and_then(|export| export.write_to(out_dir)) {
        error!("CSV export of {}: {}", name, e);
    }
    if xlsx {
        if let Err(e) = state.export_xlsx(name).and_then(|export| export.write_to(out_dir)) {
            error!("XLSX export of {}: {}", name, e);
        }
    }

    for &kind in charts {
        match state.chart(name, kind) {
            Ok(ChartOutcome::Rendered(chart)) => {
                let path = out_dir.join(safe_file_name(&format!("{}_{}.svg", name, kind.slug())));
                chart.save(&path)?;
                info!("Wrote {}", path.display());
            }
            Ok(ChartOutcome::Unavailable(reason)) => {
                warn!("{} for {} is not available: {}", kind, name, reason)
            }
            Err(e) => error!("{} for {}: {}", kind, name, e),
        }
    }
    Ok(())
}
