use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use manet_core::error::ExperimentError;
use manet_output::logger::initiate_logger;

use crate::produce::config::read_config;
use crate::produce::setdest::Setdest;

mod produce;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
struct CliArgs {
    #[arg(short = 'c', long, value_name = "Movement Configuration File")]
    config: String,
}

fn run(file_path: &Path) -> Result<PathBuf, ExperimentError> {
    let config = read_config(file_path)?;
    let config_dir = file_path.parent().unwrap_or(Path::new("."));
    initiate_logger(config_dir, &config.log_settings)?;
    let setdest = Setdest::new(&config, config_dir)?;
    setdest.write()?;
    Ok(setdest.output_file().to_path_buf())
}

fn main() -> ExitCode {
    let config_file = CliArgs::parse().config;
    let start = std::time::Instant::now();
    match run(Path::new(&config_file)) {
        Ok(output_file) => {
            info!("Movement generation finished in {} ms.", start.elapsed().as_millis());
            println!("Movements written to {}", output_file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Movement generation failed: {}", e);
            eprintln!("Movement generation failed: {}", e);
            ExitCode::from(1)
        }
    }
}
