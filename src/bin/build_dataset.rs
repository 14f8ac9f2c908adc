use std::path::PathBuf;
use std::process::ExitCode;

use carousel_dataset::{
    build_dataset, init_logging, log_run_failed, log_run_finish, log_run_start,
    logging_config_from_env, DatasetConfig,
};
use clap::Parser;

/// Build the carousel training dataset from prints, taps and payments.
#[derive(Debug, Parser)]
#[command(name = "build_dataset", version)]
struct Args {
    /// Directory holding prints.json, taps.json and pays.csv
    #[arg(long = "input_dir", visible_alias = "input-dir", default_value = ".")]
    input_dir: PathBuf,

    /// Path of the CSV to write
    #[arg(long, default_value = "dataset_ready.csv")]
    output: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let logging_cfg = logging_config_from_env();
    if let Err(err) = init_logging(&logging_cfg) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    log_run_start(&logging_cfg, &args.input_dir, &args.output);

    match build_dataset(&args.input_dir, &args.output, &DatasetConfig::default()) {
        Ok(report) => {
            log_run_finish(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log_run_failed(&err);
            ExitCode::FAILURE
        }
    }
}
