use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod columns;
mod controller;
mod dataset;
mod domain;
mod grid;
mod inputter;
mod model;
mod preferences;
mod theme;
mod ui;

use controller::Controller;
use domain::{PTVConfig, PTVError};
use grid::PageSize;
use model::{Model, Status};
use preferences::FilePreferenceStore;
use ui::TableUI;

/// Browse, search and export the employee table in the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file with an array of employee records. Uses the bundled dataset if omitted.
    path: Option<String>,

    /// Rows per page (10, 25 or 50)
    #[arg(long, default_value_t = 10)]
    page_size: u16,

    /// Directory employees.csv is written to
    #[arg(long, default_value = ".")]
    export_dir: String,

    /// Preference file holding the theme mode
    #[arg(long)]
    preferences: Option<String>,

    /// Log file, RUST_LOG controls the level
    #[arg(long, conflicts_with = "no_log")]
    log_file: Option<String>,

    /// Do not write a log file
    #[arg(long)]
    no_log: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            ratatui::restore();
            error!("Exiting with error: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn expand_path(path: &str) -> Result<PathBuf, PTVError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| PTVError::LoadingFailed(format!("Cannot expand {path}: {e}")))
}

fn build_config(args: &Args) -> Result<PTVConfig, PTVError> {
    let mut cfg = PTVConfig::default()
        .with_page_size(PageSize::from_rows(args.page_size)?)
        .with_export_dir(expand_path(&args.export_dir)?);
    if !args.no_log {
        cfg = cfg.with_log_file(match &args.log_file {
            Some(path) => expand_path(path)?,
            None => std::env::temp_dir().join("ptv.log"),
        });
    }
    if let Some(path) = &args.preferences {
        cfg = cfg.with_preferences_path(expand_path(path)?);
    }
    Ok(cfg)
}

fn init_tracing(cfg: &PTVConfig) -> Result<(), PTVError> {
    let Some(path) = &cfg.log_file else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: Args) -> Result<(), PTVError> {
    let cfg = build_config(&args)?;
    init_tracing(&cfg)?;
    info!("Starting ptv with {:?}", cfg);

    let records = match &args.path {
        Some(path) => dataset::from_path(&expand_path(path)?)?,
        None => dataset::bundled(),
    };
    let preferences = FilePreferenceStore::new(
        cfg.preferences_path
            .clone()
            .unwrap_or_else(FilePreferenceStore::default_path),
    );

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(
        &cfg,
        records,
        Box::new(preferences),
        size.width as usize,
        size.height as usize,
    );
    let mut ui = TableUI::new(&cfg);
    let controller = Controller::new(&cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Result<PTVConfig, PTVError> {
        build_config(&Args::try_parse_from(args).unwrap())
    }

    #[test]
    fn logs_to_temp_dir_by_default() {
        let cfg = config(&["ptv"]).unwrap();
        assert_eq!(cfg.log_file, Some(std::env::temp_dir().join("ptv.log")));
        assert_eq!(cfg.page_size, PageSize::Ten);
        assert_eq!(cfg.preferences_path, None);
    }

    #[test]
    fn no_log_disables_the_log_file() {
        let cfg = config(&["ptv", "--no-log"]).unwrap();
        assert_eq!(cfg.log_file, None);
        assert!(init_tracing(&cfg).is_ok());
        assert!(Args::try_parse_from(["ptv", "--no-log", "--log-file", "x.log"]).is_err());
    }

    #[test]
    fn options_are_expanded_and_validated() {
        let cfg = config(&[
            "ptv",
            "--page-size",
            "50",
            "--export-dir",
            "out",
            "--log-file",
            "logs/ptv.log",
            "--preferences",
            "prefs.toml",
        ])
        .unwrap();
        assert_eq!(cfg.page_size, PageSize::Fifty);
        assert_eq!(cfg.export_dir, PathBuf::from("out"));
        assert_eq!(cfg.log_file, Some(PathBuf::from("logs/ptv.log")));
        assert_eq!(cfg.preferences_path, Some(PathBuf::from("prefs.toml")));

        assert!(matches!(
            config(&["ptv", "--page-size", "20"]),
            Err(PTVError::InvalidPageSize(20))
        ));
    }
}
