use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use manet_aodv::simulation::config::{ExperimentConfig, Override};
use manet_aodv::simulation::experiment::{Experiment, ExperimentOutcome};
use manet_core::error::ExperimentError;
use manet_output::logger::initiate_logger;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
struct CliArgs {
    #[arg(short = 'c', long, value_name = "CONFIG_FILE")]
    config: String,
    /// Overrides a configuration value, for example `--set node_count=50`.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<Override>,
}

fn run(args: &CliArgs) -> Result<ExperimentOutcome, ExperimentError> {
    let config = ExperimentConfig::from_file(Path::new(&args.config), &args.overrides)?;
    let log_file = initiate_logger(config.config_dir(), &config.base().log_settings)?;
    println!("Logging to {}", log_file.display());

    let routed = Experiment::new(config)
        .build_topology()?
        .install_fabric()?
        .install_routing()?;
    let ready = match routed.traffic_enabled() {
        true => routed.install_traffic()?,
        false => routed.skip_traffic()?,
    };
    ready.run()
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let start = std::time::Instant::now();
    match run(&args) {
        Ok(outcome) => {
            for stats in outcome.flows.flows.iter() {
                println!(
                    "Flow {} ({} -> {}): tx {} rx {} lost {}",
                    stats.flow_id,
                    stats.source,
                    stats.sink,
                    stats.tx_packets,
                    stats.rx_packets,
                    stats.lost_packets
                );
            }
            println!("Report written to {}", outcome.report_path.display());
            println!("Simulation finished in {} ms.", start.elapsed().as_millis());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Experiment failed: {}", e);
            eprintln!("Experiment failed: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}
