use std::{env, process, sync::Arc};

use log::{error, info};
use trainer::{TrainingConfig, data::Dataset};

fn main() {
    env_logger::init();

    // Read the arguments to determine whether to train or test
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <train|test> <dataset.csv> [config.json]", args[0]);
        process::exit(1);
    }

    let mode = &args[1];
    let cfg = match args.get(3) {
        Some(path) => TrainingConfig::from_json_file(path),
        None => Ok(TrainingConfig::default()),
    };
    let cfg = cfg.unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}");
        process::exit(1);
    });

    let dataset = match Dataset::from_csv(&args[2]) {
        Ok(dataset) => Arc::new(dataset),
        Err(e) => {
            eprintln!("Error loading dataset {}: {e}", args[2]);
            process::exit(1);
        }
    };
    info!(
        "loaded {} samples of {} features from {}",
        dataset.len(),
        dataset.width(),
        args[2]
    );

    let run = match mode.as_str() {
        "train" => trainer::train_all(&cfg, dataset),
        "test" => trainer::test_all(&cfg, dataset),
        _ => {
            eprintln!("Unknown mode: {mode}. You must use 'train' or 'test'.");
            process::exit(1);
        }
    };

    match run {
        Ok(reporter) if reporter.failures().is_empty() => info!("{mode} finished"),
        Ok(reporter) => {
            error!("{} classifiers failed", reporter.failures().len());
            process::exit(2);
        }
        Err(e) => {
            error!("{mode} failed: {e}");
            process::exit(1);
        }
    }
}
