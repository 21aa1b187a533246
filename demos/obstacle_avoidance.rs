// Three-link arm under operational space control, avoiding an obstacle that
// follows the pointer. Runs until Ctrl-C unless --max-steps is given.

use clap::Parser;
use std::path::PathBuf;
use threelink_osc::config::DemoConfig;
use threelink_osc::demo::{run_until_ctrl_c, DemoError, ObstacleAvoidanceDemo};
use threelink_osc::init_logging;

use log::{error, info};

#[derive(Parser, Debug)]
#[command(about = "Three-link arm obstacle avoidance demo")]
struct Args {
    /// JSON file overriding the default demo configuration
    config: Option<PathBuf>,

    #[arg(long)]
    max_steps: Option<u64>,

    /// Write the recorded trajectory here (.csv or .json)
    #[arg(long)]
    out: Option<PathBuf>,
}

async fn obstacle_avoidance(args: Args) -> Result<(), DemoError> {
    let config = match &args.config {
        Some(path) => DemoConfig::from_file(path)?,
        None => DemoConfig::default(),
    };

    let demo = ObstacleAvoidanceDemo::threelink(config)?;
    let (_, summary) = run_until_ctrl_c(demo, args.max_steps).await?;

    info!(
        "Ran {} steps, reached {} targets{}",
        summary.steps,
        summary.targets_reached,
        if summary.interrupted { " (interrupted)" } else { "" }
    );

    if let Some(out) = args.out {
        match out.extension().and_then(|ext| ext.to_str()) {
            Some("json") => summary.log.write_json(&out)?,
            _ => summary.log.write_csv(&out)?,
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    if let Err(err) = obstacle_avoidance(Args::parse()).await {
        error!("{}", err);
        std::process::exit(1);
    }
}
