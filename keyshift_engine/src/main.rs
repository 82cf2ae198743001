// Keyshift CLI: run a transform pipeline over a chart file.
//
// Reads a chart as JSON (`{ "keys": 4, "beat_length": 500.0, "events": [...] }`),
// applies the steps from a pipeline config and writes the result as JSON.
// Without `--config` the chart gets a single column conversion with default
// options (7 keys).
//
// Usage:
//   cargo run -p keyshift_engine -- <input.json> [--out PATH] [--config PATH] [--seed N]
//
// Set RUST_LOG=keyshift_engine=debug to see every transform step.

use std::path::{Path, PathBuf};

use keyshift_engine::column_count::ColumnCountOptions;
use keyshift_engine::config::PipelineConfig;
use keyshift_engine::pipeline::{Chart, Transform, resolve_seed, run};
use keyshift_engine::Result;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = args.get(1).filter(|s| !s.starts_with("--")) else {
        eprintln!("Usage: keyshift <input.json> [--out PATH] [--config PATH] [--seed N]");
        std::process::exit(1);
    };

    if let Err(e) = convert_file(Path::new(input), &args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn convert_file(input: &Path, args: &[String]) -> Result<()> {
    let output: PathBuf = parse_flag::<String>(args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("keyshift.json"));

    let config = match parse_flag::<String>(args, "--config") {
        Some(path) => PipelineConfig::load(Path::new(&path))?,
        None => PipelineConfig {
            seed: None,
            steps: vec![Transform::ColumnCount(ColumnCountOptions::default())],
        },
    };
    let seed = resolve_seed(parse_flag(args, "--seed").or(config.seed));

    let chart: Chart = serde_json::from_str(&std::fs::read_to_string(input)?)?;

    println!("=== Keyshift ===");
    println!("Input: {} ({} keys, {} notes)", input.display(), chart.keys, chart.events.len());
    println!("Seed: {}", seed);
    for (i, step) in config.steps.iter().enumerate() {
        println!("  [{}] {}", i + 1, step.name());
    }

    let result = run(&chart, &config.steps, Some(seed))?;
    let holds = result.events.iter().filter(|e| e.is_hold()).count();

    std::fs::write(&output, serde_json::to_string_pretty(&result)?)?;
    println!(
        "Output: {} ({} keys, {} notes, {} holds)",
        output.display(),
        result.keys,
        result.events.len(),
        holds
    );
    Ok(())
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
