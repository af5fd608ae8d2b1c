//! Validation runner for the PBF solver.
//!
//! Runs the scenarios headless, exports trajectories, and reports analytic
//! metrics.
//!
//! Usage:
//!   cargo run -p ripple_validation -- [OPTIONS]
//!
//! Options:
//!   --scenario <NAME>    Run a specific scenario (or "all")
//!   --output-dir <PATH>  Output directory for results

use ripple_validation::harness::*;
use ripple_validation::metrics::TrajectoryMetrics;
use ripple_validation::scenarios::{
    free_fall::{free_fall_scenario, FreeFallParams},
    resting_lattice::{resting_lattice_scenario, RestingLatticeParams},
};
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    let mut scenario_filter = "all".to_string();
    let mut output_dir = PathBuf::from("validation_results");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                if i < args.len() {
                    scenario_filter = args[i].clone();
                }
            }
            "--output-dir" => {
                i += 1;
                if i < args.len() {
                    output_dir = PathBuf::from(&args[i]);
                }
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                return;
            }
        }
        i += 1;
    }

    std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    pollster::block_on(run_scenarios(&scenario_filter, &output_dir));
}

async fn run_scenarios(scenario_filter: &str, output_dir: &PathBuf) {
    let harness = match ValidationHarness::new().await {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Failed to initialize GPU: {e}");
            eprintln!("Make sure a compatible GPU adapter is available.");
            return;
        }
    };

    let scenarios: Vec<(&str, ScenarioConfig)> = vec![
        ("free_fall", free_fall_scenario(FreeFallParams::default())),
        (
            "resting_lattice",
            resting_lattice_scenario(RestingLatticeParams::default()),
        ),
    ];

    for (name, config) in scenarios {
        if scenario_filter != "all" && scenario_filter != name {
            continue;
        }

        println!("\nRunning scenario: {name}");
        println!("  Particles: {}", config.particles.len());
        println!("  Steps: {}", config.total_steps);

        match harness.run_scenario(config).await {
            Ok(trajectory) => {
                let metrics = TrajectoryMetrics::analyze(&trajectory);
                println!("{}", metrics.report());

                let json_path = output_dir.join(format!("{name}.json"));
                if let Err(e) = trajectory.export_json(&json_path) {
                    eprintln!("  Failed to export JSON: {e}");
                } else {
                    println!("  Exported: {}", json_path.display());
                }

                let csv_dir = output_dir.join(format!("{name}_csv"));
                if let Err(e) = trajectory.export_csv(&csv_dir) {
                    eprintln!("  Failed to export CSV: {e}");
                } else {
                    println!("  Exported CSV to: {}", csv_dir.display());
                }
            }
            Err(e) => {
                eprintln!("  Simulation failed: {e}");
            }
        }
    }

    println!("\nValidation runs complete.");
}

fn print_help() {
    println!(
        r#"
PBF solver validation runner

Usage:
  cargo run -p ripple_validation -- [OPTIONS]

Options:
  --scenario <NAME>     Run a specific scenario. Options:
                          all (default), free_fall, resting_lattice
  --output-dir <PATH>   Output directory for results (default: validation_results)
  --help, -h            Show this help message
"#
    );
}
