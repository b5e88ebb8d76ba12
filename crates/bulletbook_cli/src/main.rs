//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the default JSON store and run the daily recurrence pass.
//! - Print desk stats for a quick local sanity check.
//!
//! Usage: `bulletbook [DATA_DIR]`. Defaults to `$HOME/.bulletbook`.

use bulletbook_core::model::clock::today;
use bulletbook_core::{
    default_log_level, init_logging, CoreConfig, DeskService, FileRunMarker, JsonFileStore,
    LogEventSink,
};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_DIR_NAME: &str = ".bulletbook";
const MARKER_FILE_NAME: &str = "run_markers.json";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("bulletbook: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let data_dir = resolve_data_dir()?;
    let config = CoreConfig::default();

    let log_dir = data_dir.join("logs");
    if let Err(err) = init_logging(default_log_level(), &log_dir.to_string_lossy()) {
        eprintln!("bulletbook: logging disabled: {err}");
    }

    let store = JsonFileStore::open(&data_dir, &config.default_context)?;
    let marker = FileRunMarker::new(store.root().join(MARKER_FILE_NAME));
    let mut service = DeskService::with_events(&store, &config, LogEventSink)?;

    if let Some(report) = service.schedule_recurring(&marker, today())? {
        println!(
            "recurring: created={} skipped={} errors={}",
            report.created.len(),
            report.skipped.len(),
            report.errors.len()
        );
        for (id, err) in &report.errors {
            eprintln!("bulletbook: archived item {id}: {err}");
        }
    }

    let stats = service.stats();
    println!("bulletbook_core version={}", bulletbook_core::core_version());
    println!("context={} items={}", config.default_context, service.desk().len());
    println!(
        "done={} in_progress={} pending={} notes={} complete={}%",
        stats.complete,
        stats.in_progress,
        stats.pending,
        stats.notes,
        stats.percent_complete()
    );
    service.flush()?;

    info!(
        "event=cli_run module=cli status=ok data_dir={}",
        data_dir.display()
    );
    Ok(())
}

fn resolve_data_dir() -> Result<PathBuf, Box<dyn Error>> {
    let dir = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => {
            let home = std::env::var_os("HOME").ok_or("HOME is not set; pass a data directory")?;
            PathBuf::from(home).join(DEFAULT_DIR_NAME)
        }
    };
    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}
